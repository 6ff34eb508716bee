//! Boundary to the external access-audit log.
//!
//! `grant` and `revoke` report every access change to an [`AccessAudit`]
//! after the change is computed and before it is committed. A rejection
//! aborts the whole operation.

use thiserror::Error;

use crate::types::{Category, Principal};

/// Returned by an audit sink that refuses to record an access change.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct AuditError(pub String);

/// The external audit collaborator.
pub trait AccessAudit: Send {
    /// Record that `accessor` changed access to `owner`'s `category`.
    ///
    /// `success` is the outcome of the grant or revoke being recorded.
    fn log_access(
        &mut self,
        accessor: &Principal,
        owner: &Principal,
        category: &Category,
        success: bool,
    ) -> Result<(), AuditError>;
}

/// An audit sink that accepts and discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullAudit;

impl AccessAudit for NullAudit {
    fn log_access(
        &mut self,
        _accessor: &Principal,
        _owner: &Principal,
        _category: &Category,
        _success: bool,
    ) -> Result<(), AuditError> {
        Ok(())
    }
}

impl<A: AccessAudit + ?Sized> AccessAudit for Box<A> {
    fn log_access(
        &mut self,
        accessor: &Principal,
        owner: &Principal,
        category: &Category,
        success: bool,
    ) -> Result<(), AuditError> {
        (**self).log_access(accessor, owner, category, success)
    }
}
