//! Subcommands and their JSON output.

use anyhow::{anyhow, Result};
use clap::Subcommand;
use consent_kernel::store::Store;
use consent_kernel::{AccessAudit, BatchReport, BlockHeight, Call, Category, Kernel, Principal};
use serde_json::{json, Value};

pub mod consents;
pub mod registry;
pub mod templates;

/// Who is calling, and at what logical time.
#[derive(Debug, Clone)]
pub struct Context {
    pub caller: Option<Principal>,
    pub at: BlockHeight,
}

impl Context {
    /// The call context for a mutating operation.
    pub fn call(&self) -> Result<Call> {
        let caller = self
            .caller
            .clone()
            .ok_or_else(|| anyhow!("--caller is required for this command"))?;
        Ok(Call::new(caller, self.at))
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    // === Consents ===
    /// Grant a consent as the granter
    Grant {
        granter: Principal,
        grantee: Principal,
        category: Category,
        duration: u64,
        #[arg(long)]
        notes: Option<String>,
    },

    /// Grant a consent on behalf of a granter, as one of its delegates
    GrantAsDelegate {
        granter: Principal,
        grantee: Principal,
        category: Category,
        duration: u64,
        #[arg(long)]
        notes: Option<String>,
    },

    /// Revoke a consent
    Revoke {
        granter: Principal,
        grantee: Principal,
        category: Category,
    },

    /// Extend an active consent
    Renew {
        granter: Principal,
        grantee: Principal,
        category: Category,
        extra: u64,
    },

    /// Check that a consent is valid at --at
    Check {
        granter: Principal,
        grantee: Principal,
        category: Category,
    },

    /// Show a consent record, valid or not
    Details {
        granter: Principal,
        grantee: Principal,
        category: Category,
    },

    /// Show the retained history of a consent
    HistoryGet {
        granter: Principal,
        grantee: Principal,
        category: Category,
    },

    /// Verify history chains (one key, or all when no key is given)
    HistoryVerify {
        #[arg(requires_all = ["grantee", "category"])]
        granter: Option<Principal>,
        grantee: Option<Principal>,
        category: Option<Category>,
    },

    // === Categories ===
    /// Register a new category
    AddCategory { category: Category },

    /// Whether a label is a registered category
    IsValidCategory { label: String },

    /// List registered categories
    Categories,

    // === Delegation ===
    /// Add a delegate for the caller
    DelegateAdd { delegate: Principal },

    /// Remove a delegate of the caller
    DelegateRemove { delegate: Principal },

    /// List a granter's delegates in insertion order
    ListDelegates { granter: Principal },

    // === Templates and batches ===
    /// Create a named consent template
    TemplateCreate {
        name: String,
        duration: u64,
        #[arg(long = "category", required = true)]
        categories: Vec<Category>,
        #[arg(long, default_value = "")]
        description: String,
    },

    /// Grant every category of a template, as the caller
    TemplateApply { grantee: Principal, name: String },

    /// Show a template
    TemplateGet { name: String },

    /// Grant several categories to one grantee, as the caller
    BatchGrant {
        grantee: Principal,
        duration: u64,
        #[arg(long = "category", required = true)]
        categories: Vec<Category>,
        #[arg(long)]
        notes: Option<String>,
    },

    /// Revoke several categories from one grantee, as the caller
    BatchRevoke {
        grantee: Principal,
        #[arg(long = "category", required = true)]
        categories: Vec<Category>,
    },
}

/// Run `command` against `kernel` and render its result.
pub async fn execute<S: Store, A: AccessAudit>(
    kernel: &Kernel<S, A>,
    ctx: &Context,
    command: Command,
) -> Result<Value> {
    match command {
        Command::Grant {
            granter,
            grantee,
            category,
            duration,
            notes,
        } => {
            consents::grant(kernel, ctx, &granter, &grantee, &category, duration, notes, false)
                .await
        },
        Command::GrantAsDelegate {
            granter,
            grantee,
            category,
            duration,
            notes,
        } => {
            consents::grant(kernel, ctx, &granter, &grantee, &category, duration, notes, true)
                .await
        },
        Command::Revoke {
            granter,
            grantee,
            category,
        } => consents::revoke(kernel, ctx, &granter, &grantee, &category).await,
        Command::Renew {
            granter,
            grantee,
            category,
            extra,
        } => consents::renew(kernel, ctx, &granter, &grantee, &category, extra).await,
        Command::Check {
            granter,
            grantee,
            category,
        } => consents::check(kernel, ctx, &granter, &grantee, &category).await,
        Command::Details {
            granter,
            grantee,
            category,
        } => consents::details(kernel, granter, grantee, category).await,
        Command::HistoryGet {
            granter,
            grantee,
            category,
        } => consents::history(kernel, granter, grantee, category).await,
        Command::HistoryVerify {
            granter,
            grantee,
            category,
        } => consents::verify(kernel, granter, grantee, category).await,
        Command::AddCategory { category } => registry::add_category(kernel, ctx, category).await,
        Command::IsValidCategory { label } => registry::is_valid_category(kernel, &label).await,
        Command::Categories => registry::categories(kernel).await,
        Command::DelegateAdd { delegate } => registry::add_delegate(kernel, ctx, delegate).await,
        Command::DelegateRemove { delegate } => {
            registry::remove_delegate(kernel, ctx, &delegate).await
        },
        Command::ListDelegates { granter } => registry::list_delegates(kernel, &granter).await,
        Command::TemplateCreate {
            name,
            duration,
            categories,
            description,
        } => templates::create(kernel, ctx, &name, categories, duration, &description).await,
        Command::TemplateApply { grantee, name } => {
            templates::apply(kernel, ctx, &grantee, &name).await
        },
        Command::TemplateGet { name } => templates::get(kernel, &name).await,
        Command::BatchGrant {
            grantee,
            duration,
            categories,
            notes,
        } => templates::batch_grant(kernel, ctx, &grantee, &categories, duration, notes).await,
        Command::BatchRevoke {
            grantee,
            categories,
        } => templates::batch_revoke(kernel, ctx, &grantee, &categories).await,
    }
}

/// Per-item outcomes of a batch, with error codes for the failures.
pub fn report_json(report: &BatchReport) -> Value {
    let items: Vec<Value> = report
        .outcomes
        .iter()
        .map(|item| match &item.result {
            Ok(()) => json!({ "category": item.category, "ok": true }),
            Err(err) => json!({
                "category": item.category,
                "ok": false,
                "code": err.kind().code(),
                "error": err.to_string(),
            }),
        })
        .collect();

    json!({
        "succeeded": report.succeeded(),
        "failed": report.failed(),
        "items": items,
    })
}
