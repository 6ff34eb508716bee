//! Audit sink that writes one structured log line per access change.

use consent_kernel_core::{AccessAudit, AuditError, Category, Principal};

/// Records access changes through `tracing` under the `consent_audit`
/// target. Never rejects.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAudit;

impl AccessAudit for TracingAudit {
    fn log_access(
        &mut self,
        accessor: &Principal,
        owner: &Principal,
        category: &Category,
        success: bool,
    ) -> Result<(), AuditError> {
        tracing::info!(
            target: "consent_audit",
            accessor = %accessor,
            owner = %owner,
            category = %category,
            success,
            "access changed"
        );
        Ok(())
    }
}
