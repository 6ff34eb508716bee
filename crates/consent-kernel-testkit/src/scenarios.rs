//! Golden scenarios: step lists with expected outcomes.
//!
//! Each scenario runs against a fresh [`Engine`] or a fresh [`Kernel`] and
//! must produce exactly the expected outcome at every step. The same list
//! drives the engine unit tests and the kernel integration tests, so both
//! layers are held to identical behavior.

use std::fmt;

use consent_kernel::{Kernel, KernelError};
use consent_kernel_core::{
    AccessAudit, BlockHeight, Call, Consent, ConsentError, ConsentKey, Engine, ErrorKind,
    Principal, MAX_HISTORY,
};
use consent_kernel_store::Store;

use crate::fixtures::{categories, category, principal};

/// What a step does.
#[derive(Debug, Clone)]
pub enum Action {
    Grant {
        granter: &'static str,
        grantee: &'static str,
        category: &'static str,
        duration: u64,
    },
    GrantAsDelegate {
        granter: &'static str,
        grantee: &'static str,
        category: &'static str,
        duration: u64,
    },
    Revoke {
        granter: &'static str,
        grantee: &'static str,
        category: &'static str,
    },
    Renew {
        granter: &'static str,
        grantee: &'static str,
        category: &'static str,
        extra: u64,
    },
    /// Check validity at the step's height.
    Check {
        granter: &'static str,
        grantee: &'static str,
        category: &'static str,
    },
    AddCategory {
        category: &'static str,
    },
    AddDelegate {
        delegate: &'static str,
    },
    RemoveDelegate {
        delegate: &'static str,
    },
    ListDelegates {
        granter: &'static str,
    },
    CreateTemplate {
        name: &'static str,
        categories: Vec<&'static str>,
        duration: u64,
    },
    HistoryLen {
        granter: &'static str,
        grantee: &'static str,
        category: &'static str,
    },
}

/// The expected result of a step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expect {
    Ok,
    /// Success, and the resulting record has this expiry.
    Expiry(BlockHeight),
    Err(ErrorKind),
    HistoryLen(usize),
    Delegates(Vec<&'static str>),
}

#[derive(Debug, Clone)]
pub struct Step {
    pub caller: &'static str,
    pub at: BlockHeight,
    pub action: Action,
    pub expect: Expect,
}

fn step(caller: &'static str, at: BlockHeight, action: Action, expect: Expect) -> Step {
    Step {
        caller,
        at,
        action,
        expect,
    }
}

#[derive(Debug, Clone)]
pub struct GoldenScenario {
    pub name: &'static str,
    pub steps: Vec<Step>,
}

/// What a step actually produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Unit,
    Consent(Consent),
    HistoryLen(usize),
    Delegates(Vec<Principal>),
}

/// A step whose outcome did not match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioFailure {
    pub scenario: &'static str,
    pub step: usize,
    pub expected: Expect,
    pub actual: String,
}

impl fmt::Display for ScenarioFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} step {}: expected {:?}, got {}",
            self.scenario, self.step, self.expected, self.actual
        )
    }
}

impl std::error::Error for ScenarioFailure {}

fn outcome_matches(expect: &Expect, actual: &std::result::Result<Outcome, ErrorKind>) -> bool {
    match (expect, actual) {
        (Expect::Ok, Ok(_)) => true,
        (Expect::Expiry(e), Ok(Outcome::Consent(c))) => c.expiry == *e,
        (Expect::Err(kind), Err(actual)) => kind == actual,
        (Expect::HistoryLen(n), Ok(Outcome::HistoryLen(m))) => n == m,
        (Expect::Delegates(ids), Ok(Outcome::Delegates(list))) => {
            ids.len() == list.len() && ids.iter().zip(list).all(|(id, p)| *id == p.as_str())
        }
        _ => false,
    }
}

fn key(granter: &str, grantee: &str, label: &str) -> ConsentKey {
    ConsentKey::new(principal(granter), principal(grantee), category(label))
}

fn run_on_engine_step<A: AccessAudit>(
    engine: &mut Engine<A>,
    step: &Step,
) -> std::result::Result<Outcome, ConsentError> {
    let call = Call::new(principal(step.caller), step.at);
    let consent = |r: consent_kernel_core::Result<Consent>| r.map(Outcome::Consent);
    let unit = |r: consent_kernel_core::Result<()>| r.map(|_| Outcome::Unit);

    match &step.action {
        Action::Grant {
            granter,
            grantee,
            category: label,
            duration,
        } => consent(engine.grant(
            &call,
            &principal(granter),
            &principal(grantee),
            &category(label),
            *duration,
            None,
        )),
        Action::GrantAsDelegate {
            granter,
            grantee,
            category: label,
            duration,
        } => consent(engine.grant_as_delegate(
            &call,
            &principal(granter),
            &principal(grantee),
            &category(label),
            *duration,
            None,
        )),
        Action::Revoke {
            granter,
            grantee,
            category: label,
        } => unit(engine.revoke(
            &call,
            &principal(granter),
            &principal(grantee),
            &category(label),
        )),
        Action::Renew {
            granter,
            grantee,
            category: label,
            extra,
        } => consent(engine.renew(
            &call,
            &principal(granter),
            &principal(grantee),
            &category(label),
            *extra,
        )),
        Action::Check {
            granter,
            grantee,
            category: label,
        } => consent(engine.check(
            &principal(granter),
            &principal(grantee),
            &category(label),
            step.at,
        )),
        Action::AddCategory { category: label } => {
            unit(engine.add_category(&call, category(label)))
        }
        Action::AddDelegate { delegate } => unit(engine.add_delegate(&call, principal(delegate))),
        Action::RemoveDelegate { delegate } => {
            unit(engine.remove_delegate(&call, &principal(delegate)))
        }
        Action::ListDelegates { granter } => Ok(Outcome::Delegates(
            engine.list_delegates(&principal(granter)),
        )),
        Action::CreateTemplate {
            name,
            categories: labels,
            duration,
        } => engine
            .create_template(&call, name, categories(labels), *duration, "")
            .map(|_| Outcome::Unit),
        Action::HistoryLen {
            granter,
            grantee,
            category: label,
        } => Ok(Outcome::HistoryLen(
            engine.get_history(&key(granter, grantee, label)).len(),
        )),
    }
}

async fn run_on_kernel_step<S: Store, A: AccessAudit>(
    kernel: &Kernel<S, A>,
    step: &Step,
) -> std::result::Result<Outcome, KernelError> {
    let call = Call::new(principal(step.caller), step.at);

    Ok(match &step.action {
        Action::Grant {
            granter,
            grantee,
            category: label,
            duration,
        } => Outcome::Consent(
            kernel
                .grant(
                    &call,
                    &principal(granter),
                    &principal(grantee),
                    &category(label),
                    *duration,
                    None,
                )
                .await?,
        ),
        Action::GrantAsDelegate {
            granter,
            grantee,
            category: label,
            duration,
        } => Outcome::Consent(
            kernel
                .grant_as_delegate(
                    &call,
                    &principal(granter),
                    &principal(grantee),
                    &category(label),
                    *duration,
                    None,
                )
                .await?,
        ),
        Action::Revoke {
            granter,
            grantee,
            category: label,
        } => {
            kernel
                .revoke(&call, &principal(granter), &principal(grantee), &category(label))
                .await?;
            Outcome::Unit
        }
        Action::Renew {
            granter,
            grantee,
            category: label,
            extra,
        } => Outcome::Consent(
            kernel
                .renew(
                    &call,
                    &principal(granter),
                    &principal(grantee),
                    &category(label),
                    *extra,
                )
                .await?,
        ),
        Action::Check {
            granter,
            grantee,
            category: label,
        } => Outcome::Consent(
            kernel
                .check(&principal(granter), &principal(grantee), &category(label), step.at)
                .await?,
        ),
        Action::AddCategory { category: label } => {
            kernel.add_category(&call, category(label)).await?;
            Outcome::Unit
        }
        Action::AddDelegate { delegate } => {
            kernel.add_delegate(&call, principal(delegate)).await?;
            Outcome::Unit
        }
        Action::RemoveDelegate { delegate } => {
            kernel.remove_delegate(&call, &principal(delegate)).await?;
            Outcome::Unit
        }
        Action::ListDelegates { granter } => {
            Outcome::Delegates(kernel.list_delegates(&principal(granter)).await)
        }
        Action::CreateTemplate {
            name,
            categories: labels,
            duration,
        } => {
            kernel
                .create_template(&call, name, categories(labels), *duration, "")
                .await?;
            Outcome::Unit
        }
        Action::HistoryLen {
            granter,
            grantee,
            category: label,
        } => Outcome::HistoryLen(kernel.get_history(&key(granter, grantee, label)).await.len()),
    })
}

fn judge(
    scenario: &GoldenScenario,
    index: usize,
    step: &Step,
    actual: std::result::Result<Outcome, ErrorKind>,
) -> std::result::Result<(), ScenarioFailure> {
    if outcome_matches(&step.expect, &actual) {
        Ok(())
    } else {
        Err(ScenarioFailure {
            scenario: scenario.name,
            step: index,
            expected: step.expect.clone(),
            actual: format!("{:?}", actual),
        })
    }
}

/// Run `scenario` against `engine`.
pub fn run_on_engine<A: AccessAudit>(
    scenario: &GoldenScenario,
    engine: &mut Engine<A>,
) -> std::result::Result<(), ScenarioFailure> {
    for (index, step) in scenario.steps.iter().enumerate() {
        let actual = run_on_engine_step(engine, step).map_err(|e| e.kind());
        judge(scenario, index, step, actual)?;
    }
    Ok(())
}

/// Run `scenario` against `kernel`. Storage failures are reported as
/// mismatches.
pub async fn run_on_kernel<S: Store, A: AccessAudit>(
    scenario: &GoldenScenario,
    kernel: &Kernel<S, A>,
) -> std::result::Result<(), ScenarioFailure> {
    for (index, step) in scenario.steps.iter().enumerate() {
        let actual = match run_on_kernel_step(kernel, step).await {
            Ok(outcome) => Ok(outcome),
            Err(err) => match err.kind() {
                Some(kind) => Err(kind),
                None => {
                    return Err(ScenarioFailure {
                        scenario: scenario.name,
                        step: index,
                        expected: step.expect.clone(),
                        actual: err.to_string(),
                    })
                }
            },
        };
        judge(scenario, index, step, actual)?;
    }
    Ok(())
}

/// Every golden scenario.
pub fn all_scenarios() -> Vec<GoldenScenario> {
    vec![
        GoldenScenario {
            name: "unknown category rejected until added",
            steps: vec![
                step(
                    "u1",
                    0,
                    Action::Grant {
                        granter: "u1",
                        grantee: "u2",
                        category: "dental",
                        duration: 10,
                    },
                    Expect::Err(ErrorKind::InvalidCategory),
                ),
                step(
                    "admin",
                    0,
                    Action::AddCategory { category: "dental" },
                    Expect::Ok,
                ),
                step(
                    "admin",
                    0,
                    Action::AddCategory { category: "dental" },
                    Expect::Err(ErrorKind::Conflict),
                ),
                step(
                    "u1",
                    0,
                    Action::Grant {
                        granter: "u1",
                        grantee: "u2",
                        category: "dental",
                        duration: 10,
                    },
                    Expect::Expiry(10),
                ),
            ],
        },
        GoldenScenario {
            name: "vaccinations valid through expiry",
            steps: vec![
                step(
                    "u1",
                    0,
                    Action::Grant {
                        granter: "u1",
                        grantee: "u2",
                        category: "vaccinations",
                        duration: 500,
                    },
                    Expect::Expiry(500),
                ),
                step("u2", 0, check("u1", "u2", "vaccinations"), Expect::Ok),
                step("u2", 500, check("u1", "u2", "vaccinations"), Expect::Ok),
                step(
                    "u2",
                    501,
                    check("u1", "u2", "vaccinations"),
                    Expect::Err(ErrorKind::ConsentExpiredOrInactive),
                ),
            ],
        },
        GoldenScenario {
            name: "revoke before expiry",
            steps: vec![
                step(
                    "u1",
                    0,
                    Action::Grant {
                        granter: "u1",
                        grantee: "u2",
                        category: "imaging",
                        duration: 100,
                    },
                    Expect::Ok,
                ),
                step(
                    "u1",
                    10,
                    Action::Revoke {
                        granter: "u1",
                        grantee: "u2",
                        category: "imaging",
                    },
                    Expect::Ok,
                ),
                step(
                    "u2",
                    20,
                    check("u1", "u2", "imaging"),
                    Expect::Err(ErrorKind::ConsentExpiredOrInactive),
                ),
                step(
                    "u1",
                    30,
                    Action::Grant {
                        granter: "u1",
                        grantee: "u2",
                        category: "imaging",
                        duration: 100,
                    },
                    Expect::Err(ErrorKind::Conflict),
                ),
            ],
        },
        GoldenScenario {
            name: "renew extends from prior expiry",
            steps: vec![
                step(
                    "u1",
                    0,
                    Action::Grant {
                        granter: "u1",
                        grantee: "u2",
                        category: "medications",
                        duration: 100,
                    },
                    Expect::Expiry(100),
                ),
                step(
                    "u1",
                    50,
                    Action::Renew {
                        granter: "u1",
                        grantee: "u2",
                        category: "medications",
                        extra: 100,
                    },
                    Expect::Expiry(200),
                ),
                step("u2", 151, check("u1", "u2", "medications"), Expect::Ok),
            ],
        },
        GoldenScenario {
            name: "renew after expiry rejected",
            steps: vec![
                step(
                    "u1",
                    0,
                    Action::Grant {
                        granter: "u1",
                        grantee: "u2",
                        category: "medications",
                        duration: 100,
                    },
                    Expect::Ok,
                ),
                step(
                    "u1",
                    101,
                    Action::Renew {
                        granter: "u1",
                        grantee: "u2",
                        category: "medications",
                        extra: 100,
                    },
                    Expect::Err(ErrorKind::ConsentExpiredOrInactive),
                ),
            ],
        },
        history_cap_scenario(),
        delegate_list_scenario(),
        GoldenScenario {
            name: "template creation rejections",
            steps: vec![
                step(
                    "u1",
                    0,
                    Action::CreateTemplate {
                        name: "bad-category",
                        categories: vec!["allergies", "dental"],
                        duration: 10,
                    },
                    Expect::Err(ErrorKind::InvalidCategory),
                ),
                step(
                    "u1",
                    0,
                    Action::CreateTemplate {
                        name: "too-many",
                        categories: vec!["allergies"; 11],
                        duration: 10,
                    },
                    Expect::Err(ErrorKind::InvalidTemplate),
                ),
                step(
                    "u1",
                    0,
                    Action::CreateTemplate {
                        name: "zero",
                        categories: vec!["allergies"],
                        duration: 0,
                    },
                    Expect::Err(ErrorKind::InvalidDuration),
                ),
                step(
                    "u1",
                    0,
                    Action::CreateTemplate {
                        name: "ok",
                        categories: vec!["allergies"],
                        duration: 10,
                    },
                    Expect::Ok,
                ),
                step(
                    "u2",
                    0,
                    Action::CreateTemplate {
                        name: "ok",
                        categories: vec!["imaging"],
                        duration: 10,
                    },
                    Expect::Err(ErrorKind::Conflict),
                ),
            ],
        },
        GoldenScenario {
            name: "delegate grants lab results",
            steps: vec![
                step("u1", 0, Action::AddDelegate { delegate: "d" }, Expect::Ok),
                step(
                    "d",
                    1,
                    Action::GrantAsDelegate {
                        granter: "u1",
                        grantee: "u2",
                        category: "lab-results",
                        duration: 500,
                    },
                    Expect::Expiry(501),
                ),
                step("u2", 1, check("u1", "u2", "lab-results"), Expect::Ok),
                step(
                    "d2",
                    2,
                    Action::GrantAsDelegate {
                        granter: "u1",
                        grantee: "u2",
                        category: "lab-results",
                        duration: 500,
                    },
                    Expect::Err(ErrorKind::NotDelegated),
                ),
                step(
                    "d2",
                    2,
                    Action::Revoke {
                        granter: "u1",
                        grantee: "u2",
                        category: "lab-results",
                    },
                    Expect::Err(ErrorKind::NotAuthorized),
                ),
                step(
                    "u1",
                    3,
                    Action::RemoveDelegate { delegate: "d" },
                    Expect::Ok,
                ),
                step(
                    "d",
                    4,
                    Action::Revoke {
                        granter: "u1",
                        grantee: "u2",
                        category: "lab-results",
                    },
                    Expect::Err(ErrorKind::NotAuthorized),
                ),
            ],
        },
    ]
}

fn check(granter: &'static str, grantee: &'static str, label: &'static str) -> Action {
    Action::Check {
        granter,
        grantee,
        category: label,
    }
}

/// A grant followed by 60 renewals leaves exactly the newest 50 entries.
fn history_cap_scenario() -> GoldenScenario {
    let mut steps = vec![step(
        "u1",
        0,
        Action::Grant {
            granter: "u1",
            grantee: "u2",
            category: "allergies",
            duration: 10,
        },
        Expect::Ok,
    )];
    for i in 1..=60u64 {
        steps.push(step(
            "u1",
            i,
            Action::Renew {
                granter: "u1",
                grantee: "u2",
                category: "allergies",
                extra: 1,
            },
            Expect::Expiry(10 + i),
        ));
    }
    steps.push(step(
        "u2",
        61,
        Action::HistoryLen {
            granter: "u1",
            grantee: "u2",
            category: "allergies",
        },
        Expect::HistoryLen(MAX_HISTORY),
    ));
    GoldenScenario {
        name: "history capped at fifty",
        steps,
    }
}

const DELEGATES: [&str; 11] = [
    "d0", "d1", "d2", "d3", "d4", "d5", "d6", "d7", "d8", "d9", "d10",
];

/// Capacity, duplicates, absent removal and order preservation.
fn delegate_list_scenario() -> GoldenScenario {
    let mut steps: Vec<Step> = DELEGATES[..10]
        .iter()
        .map(|d| step("u1", 0, Action::AddDelegate { delegate: *d }, Expect::Ok))
        .collect();
    steps.extend([
        step(
            "u1",
            0,
            Action::AddDelegate { delegate: DELEGATES[10] },
            Expect::Err(ErrorKind::CapacityExceeded),
        ),
        step(
            "u1",
            0,
            Action::RemoveDelegate { delegate: "zz" },
            Expect::Err(ErrorKind::NotFound),
        ),
        step("u1", 0, Action::RemoveDelegate { delegate: "d4" }, Expect::Ok),
        step(
            "u1",
            0,
            Action::AddDelegate { delegate: "d3" },
            Expect::Err(ErrorKind::Conflict),
        ),
        step(
            "u1",
            0,
            Action::ListDelegates { granter: "u1" },
            Expect::Delegates(vec!["d0", "d1", "d2", "d3", "d5", "d6", "d7", "d8", "d9"]),
        ),
    ]);
    GoldenScenario {
        name: "delegate list bounds",
        steps,
    }
}

/// Run every scenario against a fresh engine, collecting failures.
pub fn verify_all_scenarios() -> Vec<ScenarioFailure> {
    all_scenarios()
        .iter()
        .filter_map(|s| run_on_engine(s, &mut Engine::default()).err())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_scenarios_pass_on_engine() {
        let failures = verify_all_scenarios();
        assert!(failures.is_empty(), "{:?}", failures);
    }

    #[test]
    fn test_mismatch_is_reported() {
        let scenario = GoldenScenario {
            name: "wrong expectation",
            steps: vec![step(
                "u1",
                0,
                Action::Grant {
                    granter: "u1",
                    grantee: "u2",
                    category: "allergies",
                    duration: 0,
                },
                Expect::Ok,
            )],
        };
        let failure = run_on_engine(&scenario, &mut Engine::default()).unwrap_err();
        assert_eq!(failure.step, 0);
        assert!(failure.actual.contains("InvalidDuration"));
    }

    #[tokio::test]
    async fn test_all_scenarios_pass_on_kernel() {
        for scenario in all_scenarios() {
            let kernel = crate::fixtures::memory_kernel().await;
            run_on_kernel(&scenario, &kernel).await.unwrap();
        }
    }
}
