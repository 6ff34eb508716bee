//! Error types for the Consent Kernel Core.

use std::fmt;

use thiserror::Error;

use crate::types::{Category, ConsentKey, Principal};

/// What a coarse error kind (`Conflict`, `NotFound`, `CapacityExceeded`)
/// refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Subject {
    Consent(ConsentKey),
    Category(Category),
    Template(String),
    Delegate {
        granter: Principal,
        delegate: Principal,
    },
    DelegateList(Principal),
    Batch,
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Subject::Consent(key) => write!(f, "consent {}", key),
            Subject::Category(c) => write!(f, "category {}", c),
            Subject::Template(name) => write!(f, "template {}", name),
            Subject::Delegate { granter, delegate } => {
                write!(f, "delegate {} of {}", delegate, granter)
            }
            Subject::DelegateList(granter) => write!(f, "delegate list of {}", granter),
            Subject::Batch => f.write_str("batch category list"),
        }
    }
}

/// Errors returned by consent operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConsentError {
    #[error("{caller} is not authorized to act for {granter}")]
    NotAuthorized { caller: Principal, granter: Principal },

    #[error("{caller} is not a delegate of {granter}")]
    NotDelegated { caller: Principal, granter: Principal },

    #[error("invalid category: {0:?}")]
    InvalidCategory(String),

    #[error("duration must be a positive number of blocks that does not overflow")]
    InvalidDuration,

    #[error("conflict: {0} already exists")]
    Conflict(Subject),

    #[error("not found: {0}")]
    NotFound(Subject),

    #[error("consent is expired or inactive")]
    ConsentExpiredOrInactive,

    #[error("template not found: {0}")]
    TemplateNotFound(String),

    #[error("capacity exceeded: {0}")]
    CapacityExceeded(Subject),

    #[error("invalid template: {0}")]
    InvalidTemplate(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("access audit rejected the operation: {0}")]
    AuditFailed(String),

    #[error("history chain for {key} is broken at seq {seq}")]
    HistoryCorrupted { key: ConsentKey, seq: u64 },
}

/// Flat error kind with stable numeric codes.
///
/// | Range | Purpose |
/// |-------|---------|
/// | 10-19 | Authorization |
/// | 20-29 | Not found |
/// | 30-39 | Validation |
/// | 40-49 | State |
/// | 50-59 | Collaborators / integrity |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ErrorKind {
    NotAuthorized = 10,
    NotDelegated = 11,
    NotFound = 20,
    TemplateNotFound = 21,
    InvalidCategory = 30,
    InvalidDuration = 31,
    InvalidTemplate = 32,
    InvalidInput = 33,
    Conflict = 40,
    ConsentExpiredOrInactive = 41,
    CapacityExceeded = 42,
    AuditFailed = 50,
    HistoryCorrupted = 51,
}

impl ErrorKind {
    pub fn code(self) -> u32 {
        self as u32
    }
}

impl ConsentError {
    /// The flat kind of this error, dropping its context.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConsentError::NotAuthorized { .. } => ErrorKind::NotAuthorized,
            ConsentError::NotDelegated { .. } => ErrorKind::NotDelegated,
            ConsentError::InvalidCategory(_) => ErrorKind::InvalidCategory,
            ConsentError::InvalidDuration => ErrorKind::InvalidDuration,
            ConsentError::Conflict(_) => ErrorKind::Conflict,
            ConsentError::NotFound(_) => ErrorKind::NotFound,
            ConsentError::ConsentExpiredOrInactive => ErrorKind::ConsentExpiredOrInactive,
            ConsentError::TemplateNotFound(_) => ErrorKind::TemplateNotFound,
            ConsentError::CapacityExceeded(_) => ErrorKind::CapacityExceeded,
            ConsentError::InvalidTemplate(_) => ErrorKind::InvalidTemplate,
            ConsentError::InvalidInput(_) => ErrorKind::InvalidInput,
            ConsentError::AuditFailed(_) => ErrorKind::AuditFailed,
            ConsentError::HistoryCorrupted { .. } => ErrorKind::HistoryCorrupted,
        }
    }
}

/// Result type for consent operations.
pub type Result<T> = std::result::Result<T, ConsentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_stable() {
        assert_eq!(ErrorKind::NotAuthorized.code(), 10);
        assert_eq!(ErrorKind::NotDelegated.code(), 11);
        assert_eq!(ErrorKind::NotFound.code(), 20);
        assert_eq!(ErrorKind::InvalidCategory.code(), 30);
        assert_eq!(ErrorKind::Conflict.code(), 40);
        assert_eq!(ErrorKind::ConsentExpiredOrInactive.code(), 41);
        assert_eq!(ErrorKind::CapacityExceeded.code(), 42);
        assert_eq!(ErrorKind::AuditFailed.code(), 50);
    }

    #[test]
    fn test_conflict_carries_subject() {
        let err = ConsentError::Conflict(Subject::Template("onboarding".into()));
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(err.to_string(), "conflict: template onboarding already exists");
    }
}
