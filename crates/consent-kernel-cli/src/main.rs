//! consentctl - command-line access to a Consent Kernel database.
//!
//! Each invocation opens the database, runs one operation and prints its
//! result as JSON. Failed consent operations exit with the error's numeric
//! code; other failures exit with 1.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context as _, Result};
use clap::Parser;
use consent_kernel::store::SqliteStore;
use consent_kernel::{BlockHeight, Kernel, KernelError, Principal, TracingAudit};
use serde_json::json;
use tracing::debug;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;

use commands::{Command, Context};
use config::CliConfig;

/// consentctl - manage time-bounded, revocable consent grants
#[derive(Parser, Debug)]
#[command(name = "consentctl")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database path (overrides the config file)
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Principal performing the operation
    #[arg(long, global = true)]
    caller: Option<Principal>,

    /// Logical time (block height) of the operation
    #[arg(long, global = true, default_value_t = 0)]
    at: BlockHeight,

    #[command(subcommand)]
    command: Command,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let code = exit_code(&err);
            let body = json!({ "code": code, "error": format!("{:#}", err) });
            eprintln!("{}", body);
            ExitCode::from(code)
        },
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => CliConfig::from_file(path)?,
        None => CliConfig::default(),
    }
    .merge(cli.database.clone(), cli.log_level.clone());

    // Initialize logging
    let filter =
        EnvFilter::try_new(config.log_level()).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let database = config.database();
    debug!(database = %database.display(), "opening consent store");
    let store = SqliteStore::open(&database)
        .with_context(|| format!("failed to open database {}", database.display()))?;
    let kernel = Kernel::open(store, TracingAudit, config.kernel.clone()).await?;

    let ctx = Context {
        caller: cli.caller,
        at: cli.at,
    };
    let output = commands::execute(&kernel, &ctx, cli.command).await?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

/// The process exit code for a failed run.
fn exit_code(err: &anyhow::Error) -> u8 {
    err.downcast_ref::<KernelError>()
        .map(KernelError::code)
        .and_then(|code| u8::try_from(code).ok())
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use consent_kernel::ConsentError;

    #[test]
    fn test_cli_parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "consentctl",
            "grant",
            "u1",
            "u2",
            "vaccinations",
            "500",
            "--caller",
            "u1",
            "--at",
            "7",
        ])
        .unwrap();
        assert_eq!(cli.at, 7);
        assert_eq!(cli.caller.unwrap().as_str(), "u1");
        assert!(matches!(cli.command, Command::Grant { duration: 500, .. }));
    }

    #[test]
    fn test_cli_rejects_oversized_category() {
        let long = "x".repeat(33);
        let parsed = Cli::try_parse_from(["consentctl", "add-category", long.as_str()]);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_batch_categories_repeat() {
        let cli = Cli::try_parse_from([
            "consentctl",
            "batch-grant",
            "u2",
            "10",
            "--category",
            "allergies",
            "--category",
            "imaging",
        ])
        .unwrap();
        match cli.command {
            Command::BatchGrant { categories, .. } => assert_eq!(categories.len(), 2),
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_exit_codes() {
        let consent = anyhow::Error::from(KernelError::from(ConsentError::InvalidDuration));
        assert_eq!(exit_code(&consent), 31);

        let config = anyhow::Error::from(KernelError::Config("bad".into()));
        assert_eq!(exit_code(&config), 1);

        assert_eq!(exit_code(&anyhow::anyhow!("no caller")), 1);
    }

    #[tokio::test]
    async fn test_state_persists_between_invocations() {
        let dir = tempfile::tempdir().unwrap();
        let database = dir.path().join("consent.db");
        let ctx = Context {
            caller: Some(Principal::new("u1").unwrap()),
            at: 0,
        };

        {
            let kernel = Kernel::open(
                SqliteStore::open(&database).unwrap(),
                TracingAudit,
                Default::default(),
            )
            .await
            .unwrap();
            let cli = Cli::try_parse_from(["consentctl", "delegate-add", "d1"]).unwrap();
            commands::execute(&kernel, &ctx, cli.command).await.unwrap();
        }

        let kernel = Kernel::open(
            SqliteStore::open(&database).unwrap(),
            TracingAudit,
            Default::default(),
        )
        .await
        .unwrap();
        let cli = Cli::try_parse_from(["consentctl", "list-delegates", "u1"]).unwrap();
        let out = commands::execute(&kernel, &ctx, cli.command).await.unwrap();
        assert_eq!(out["delegates"], json!(["d1"]));
    }
}
