//! Per-granter delegate sets.
//!
//! A delegate may grant, revoke and renew on behalf of its granter.
//! Authorization is the union of "is the granter" and "is a current
//! delegate"; there is no hierarchy and delegates cannot re-delegate.

use std::collections::HashMap;

use crate::bounded::BoundedVec;
use crate::error::{ConsentError, Result, Subject};
use crate::types::Principal;

/// Maximum number of delegates per granter.
pub const MAX_DELEGATES: usize = 10;

/// Ordered, duplicate-free delegate list for one granter.
pub type DelegateList = BoundedVec<Principal, MAX_DELEGATES>;

#[derive(Debug, Clone, Default)]
pub struct DelegationRegistry {
    by_granter: HashMap<Principal, DelegateList>,
}

impl DelegationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from persisted `(granter, delegates)` rows.
    pub fn from_parts(lists: impl IntoIterator<Item = (Principal, DelegateList)>) -> Self {
        Self {
            by_granter: lists
                .into_iter()
                .filter(|(_, list)| !list.is_empty())
                .collect(),
        }
    }

    /// Add `delegate` to the end of `granter`'s list.
    pub fn add_delegate(&mut self, granter: &Principal, delegate: Principal) -> Result<()> {
        if &delegate == granter {
            return Err(ConsentError::InvalidInput(
                "a granter cannot delegate to themself".into(),
            ));
        }

        let list = self.by_granter.entry(granter.clone()).or_default();
        if list.is_full() {
            return Err(ConsentError::CapacityExceeded(Subject::DelegateList(
                granter.clone(),
            )));
        }
        if list.contains(&delegate) {
            return Err(ConsentError::Conflict(Subject::Delegate {
                granter: granter.clone(),
                delegate,
            }));
        }

        list.try_push(delegate).map_err(|_| {
            ConsentError::CapacityExceeded(Subject::DelegateList(granter.clone()))
        })
    }

    /// Remove `delegate`, keeping the relative order of the others.
    pub fn remove_delegate(&mut self, granter: &Principal, delegate: &Principal) -> Result<()> {
        let removed = self
            .by_granter
            .get_mut(granter)
            .and_then(|list| list.remove_first(|d| d == delegate));

        if removed.is_none() {
            return Err(ConsentError::NotFound(Subject::Delegate {
                granter: granter.clone(),
                delegate: delegate.clone(),
            }));
        }

        if self.by_granter.get(granter).is_some_and(|l| l.is_empty()) {
            self.by_granter.remove(granter);
        }
        Ok(())
    }

    /// Whether `caller` is currently a delegate of `granter`.
    pub fn is_delegate(&self, granter: &Principal, caller: &Principal) -> bool {
        self.by_granter
            .get(granter)
            .is_some_and(|list| list.contains(caller))
    }

    /// Whether `caller` may act for `granter`.
    pub fn is_authorized(&self, granter: &Principal, caller: &Principal) -> bool {
        caller == granter || self.is_delegate(granter, caller)
    }

    /// Delegates of `granter` in insertion order.
    pub fn delegates_of(&self, granter: &Principal) -> &[Principal] {
        self.by_granter
            .get(granter)
            .map(|list| list.as_slice())
            .unwrap_or(&[])
    }

    /// Iterate over every non-empty delegate list.
    pub fn iter(&self) -> impl Iterator<Item = (&Principal, &DelegateList)> {
        self.by_granter.iter()
    }
}
