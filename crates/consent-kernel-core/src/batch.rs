//! Sequential grant/revoke over a list of categories.
//!
//! The caller is always the granter. Items run in order and each one goes
//! through the ordinary [`ConsentStore`] entry point, so every item is
//! checked, audited and logged on its own. A failing item does not stop
//! the rest and does not fail the call; its error is returned in the
//! [`BatchReport`].

use crate::audit::AccessAudit;
use crate::bounded::BoundedVec;
use crate::consent::ConsentStore;
use crate::error::{ConsentError, Result, Subject};
use crate::types::{Call, Category, Principal};

/// Maximum number of categories in one batch.
pub const MAX_BATCH: usize = 10;

/// A category list that fits in one batch.
pub type BatchList = BoundedVec<Category, MAX_BATCH>;

/// Outcome of a single item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemOutcome {
    pub category: Category,
    pub result: std::result::Result<(), ConsentError>,
}

/// Per-category outcomes of a batch or template application, in order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub outcomes: Vec<ItemOutcome>,
}

impl BatchReport {
    pub(crate) fn record(&mut self, category: &Category, result: Result<()>) {
        self.outcomes.push(ItemOutcome {
            category: category.clone(),
            result,
        });
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    /// Whether every item succeeded.
    pub fn is_complete(&self) -> bool {
        self.outcomes.iter().all(|o| o.result.is_ok())
    }

    /// The items that failed, with their errors.
    pub fn failures(&self) -> impl Iterator<Item = (&Category, &ConsentError)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (&o.category, e)))
    }
}

/// Reject lists over [`MAX_BATCH`] before any item runs.
pub fn bounded_list(categories: &[Category]) -> Result<BatchList> {
    BatchList::try_from(categories.to_vec())
        .map_err(|_| ConsentError::CapacityExceeded(Subject::Batch))
}

/// Grant `categories` to `grantee` with the caller as granter.
pub fn batch_grant<A: AccessAudit>(
    store: &mut ConsentStore<A>,
    call: &Call,
    grantee: &Principal,
    categories: &[Category],
    duration: u64,
    notes: Option<&str>,
) -> Result<BatchReport> {
    let list = bounded_list(categories)?;
    let mut report = BatchReport::default();
    for category in list.iter() {
        let result = store
            .grant(call, &call.caller, grantee, category, duration, notes)
            .map(|_| ());
        report.record(category, result);
    }
    Ok(report)
}

/// Revoke `categories` from `grantee` with the caller as granter.
pub fn batch_revoke<A: AccessAudit>(
    store: &mut ConsentStore<A>,
    call: &Call,
    grantee: &Principal,
    categories: &[Category],
) -> Result<BatchReport> {
    let list = bounded_list(categories)?;
    let mut report = BatchReport::default();
    for category in list.iter() {
        let result = store.revoke(call, &call.caller, grantee, category);
        report.record(category, result);
    }
    Ok(report)
}
