//! Test fixtures and helpers.
//!
//! Common setup code for unit and integration tests. Helpers here panic on
//! malformed literals.

use consent_kernel::{Kernel, KernelConfig};
use consent_kernel_core::{
    AccessAudit, BlockHeight, Call, Category, Consent, ConsentKey, Engine, Principal, Result,
};
use consent_kernel_store::{MemoryStore, Store};

use crate::audit::RecordingAudit;

/// Build a principal from a literal.
pub fn principal(id: &str) -> Principal {
    Principal::new(id).expect("fixture principal must be 1-64 bytes")
}

/// Build a category from a literal. Validity against a registry is not
/// checked.
pub fn category(label: &str) -> Category {
    Category::new(label).expect("fixture category must be 1-32 bytes")
}

pub fn categories(labels: &[&str]) -> Vec<Category> {
    labels.iter().map(|l| category(l)).collect()
}

/// An engine with four named parties.
///
/// `delegate` is a delegate of `owner` from the start; `outsider` is not.
pub struct TestFixture<A: AccessAudit = RecordingAudit> {
    pub engine: Engine<A>,
    pub owner: Principal,
    pub grantee: Principal,
    pub delegate: Principal,
    pub outsider: Principal,
}

impl TestFixture<RecordingAudit> {
    pub fn new() -> Self {
        Self::with_audit(RecordingAudit::new())
    }
}

impl Default for TestFixture<RecordingAudit> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: AccessAudit> TestFixture<A> {
    pub fn with_audit(audit: A) -> Self {
        let mut engine = Engine::new(audit);
        let owner = principal("owner");
        let delegate = principal("delegate");
        engine
            .add_delegate(&Call::new(owner.clone(), 0), delegate.clone())
            .expect("fresh engine accepts a delegate");
        engine.take_events();

        Self {
            engine,
            owner,
            grantee: principal("grantee"),
            delegate,
            outsider: principal("outsider"),
        }
    }

    pub fn call(&self, caller: &Principal, at: BlockHeight) -> Call {
        Call::new(caller.clone(), at)
    }

    /// The consent key owner -> grantee for `label`.
    pub fn key(&self, label: &str) -> ConsentKey {
        ConsentKey::new(self.owner.clone(), self.grantee.clone(), category(label))
    }

    /// Owner grants `label` to grantee.
    pub fn grant(&mut self, label: &str, duration: u64, at: BlockHeight) -> Result<Consent> {
        let call = self.call(&self.owner, at);
        let (owner, grantee) = (self.owner.clone(), self.grantee.clone());
        self.engine
            .grant(&call, &owner, &grantee, &category(label), duration, None)
    }

    /// Whether owner -> grantee for `label` is valid at `now`.
    pub fn is_valid(&self, label: &str, now: BlockHeight) -> bool {
        self.engine
            .check(&self.owner, &self.grantee, &category(label), now)
            .is_ok()
    }
}

/// Distinct principals `party-0`, `party-1`, ...
pub fn multi_party_principals(count: usize) -> Vec<Principal> {
    (0..count).map(|i| principal(&format!("party-{}", i))).collect()
}

/// Open a kernel over `store` with a recording audit sink.
pub async fn open_kernel<S: Store>(store: S) -> Kernel<S, RecordingAudit> {
    Kernel::open(store, RecordingAudit::new(), KernelConfig::default())
        .await
        .expect("kernel opens over a consistent store")
}

/// A kernel over a fresh in-memory store.
pub async fn memory_kernel() -> Kernel<MemoryStore, RecordingAudit> {
    open_kernel(MemoryStore::new()).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixture_delegate_is_authorized() {
        let mut fx = TestFixture::new();
        let call = fx.call(&fx.delegate, 1);
        let (owner, grantee) = (fx.owner.clone(), fx.grantee.clone());
        fx.engine
            .grant_as_delegate(&call, &owner, &grantee, &category("imaging"), 10, None)
            .unwrap();
        assert!(fx.is_valid("imaging", 11));
        assert_eq!(fx.engine.audit_mut().records.len(), 1);
    }

    #[test]
    fn test_multi_party_distinct() {
        let parties = multi_party_principals(3);
        assert_ne!(parties[0], parties[1]);
        assert_ne!(parties[1], parties[2]);
    }

    #[tokio::test]
    async fn test_memory_kernel_bootstraps() {
        let kernel = memory_kernel().await;
        assert!(kernel.is_valid_category("genetics").await);
    }
}
