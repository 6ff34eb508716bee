//! Structured records of state changes, for external observers.
//!
//! Nothing inside the kernel reads these back; they exist for indexers and
//! for the persistence layer, which uses them to find the rows an
//! operation touched.

use serde::{Deserialize, Serialize};

use crate::types::{BlockHeight, Category, ConsentKey, Principal};

/// One state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ConsentEvent {
    CategoriesBootstrapped {
        categories: Vec<Category>,
    },
    CategoryAdded {
        category: Category,
    },
    DelegateAdded {
        granter: Principal,
        delegate: Principal,
    },
    DelegateRemoved {
        granter: Principal,
        delegate: Principal,
    },
    ConsentGranted {
        key: ConsentKey,
        expiry: BlockHeight,
        /// The acting principal: the granter or one of its delegates.
        by: Principal,
    },
    ConsentRevoked {
        key: ConsentKey,
        by: Principal,
    },
    ConsentRenewed {
        key: ConsentKey,
        old_expiry: BlockHeight,
        new_expiry: BlockHeight,
        by: Principal,
    },
    TemplateCreated {
        name: String,
        categories: Vec<Category>,
        duration: u64,
    },
    TemplateApplied {
        name: String,
        granter: Principal,
        grantee: Principal,
        succeeded: usize,
        failed: usize,
    },
    BatchGranted {
        granter: Principal,
        grantee: Principal,
        succeeded: usize,
        failed: usize,
    },
    BatchRevoked {
        granter: Principal,
        grantee: Principal,
        succeeded: usize,
        failed: usize,
    },
}

impl ConsentEvent {
    /// Short kebab-case name of the event kind.
    pub fn kind(&self) -> &'static str {
        match self {
            ConsentEvent::CategoriesBootstrapped { .. } => "categories-bootstrapped",
            ConsentEvent::CategoryAdded { .. } => "category-added",
            ConsentEvent::DelegateAdded { .. } => "delegate-added",
            ConsentEvent::DelegateRemoved { .. } => "delegate-removed",
            ConsentEvent::ConsentGranted { .. } => "consent-granted",
            ConsentEvent::ConsentRevoked { .. } => "consent-revoked",
            ConsentEvent::ConsentRenewed { .. } => "consent-renewed",
            ConsentEvent::TemplateCreated { .. } => "template-created",
            ConsentEvent::TemplateApplied { .. } => "template-applied",
            ConsentEvent::BatchGranted { .. } => "batch-granted",
            ConsentEvent::BatchRevoked { .. } => "batch-revoked",
        }
    }
}

/// An event stamped with the logical time of the call that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub at: BlockHeight,
    #[serde(flatten)]
    pub event: ConsentEvent,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serializes_with_kind_tag() {
        let record = EventRecord {
            at: 7,
            event: ConsentEvent::CategoryAdded {
                category: Category::new("dental").unwrap(),
            },
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["kind"], "category-added");
        assert_eq!(json["at"], 7);
        assert_eq!(json["category"], "dental");
        assert_eq!(record.event.kind(), "category-added");
    }
}
