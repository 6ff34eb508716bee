//! Audit sinks for tests.

use consent_kernel_core::{AccessAudit, AuditError, Category, Principal};

/// One accepted `log_access` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessRecord {
    pub accessor: Principal,
    pub owner: Principal,
    pub category: Category,
    pub success: bool,
}

/// Keeps every access change it is told about, in order.
#[derive(Debug, Clone, Default)]
pub struct RecordingAudit {
    pub records: Vec<AccessRecord>,
}

impl RecordingAudit {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AccessAudit for RecordingAudit {
    fn log_access(
        &mut self,
        accessor: &Principal,
        owner: &Principal,
        category: &Category,
        success: bool,
    ) -> Result<(), AuditError> {
        self.records.push(AccessRecord {
            accessor: accessor.clone(),
            owner: owner.clone(),
            category: category.clone(),
            success,
        });
        Ok(())
    }
}

/// Accepts the first `allow` calls, then rejects every call until
/// re-armed.
#[derive(Debug, Clone, Default)]
pub struct FailingAudit {
    pub allow: usize,
    pub rejected: usize,
}

impl FailingAudit {
    /// Reject every call.
    pub fn always() -> Self {
        Self::after(0)
    }

    /// Accept `allow` calls, then reject.
    pub fn after(allow: usize) -> Self {
        Self { allow, rejected: 0 }
    }

    /// Accept `allow` more calls.
    pub fn rearm(&mut self, allow: usize) {
        self.allow = allow;
    }
}

impl AccessAudit for FailingAudit {
    fn log_access(
        &mut self,
        _accessor: &Principal,
        _owner: &Principal,
        _category: &Category,
        _success: bool,
    ) -> Result<(), AuditError> {
        if self.allow == 0 {
            self.rejected += 1;
            return Err(AuditError("audit log unavailable".into()));
        }
        self.allow -= 1;
        Ok(())
    }
}
