//! The Kernel: serialized, persisted access to the consent engine.
//!
//! Every operation takes one global lock, so callers observe a total
//! order. A mutating call runs the engine transition, derives the rows it
//! touched and persists them before the lock is released. When the store
//! rejects a write the engine is reloaded from the store, so memory and
//! disk never disagree.

use std::sync::Arc;

use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

use consent_kernel_core::{
    AccessAudit, BatchReport, BlockHeight, Call, Category, Consent, ConsentError, ConsentKey,
    Engine, EngineSnapshot, EventRecord, HistoryEntry, Principal, Template,
};
use consent_kernel_store::Store;

use crate::audit::TracingAudit;
use crate::changes::changeset_for;
use crate::config::KernelConfig;
use crate::error::{KernelError, Result};

/// Caller recorded for configuration-driven changes made while opening.
const SYSTEM_PRINCIPAL: &str = "kernel";

/// The main Kernel struct.
pub struct Kernel<S: Store, A: AccessAudit = TracingAudit> {
    store: Arc<S>,
    engine: Mutex<Engine<A>>,
    events: broadcast::Sender<EventRecord>,
    config: KernelConfig,
}

impl<S: Store, A: AccessAudit> Kernel<S, A> {
    /// Load state from `store`, verify it, and persist the category
    /// bootstrap and configured extra categories if they are new.
    pub async fn open(store: S, audit: A, config: KernelConfig) -> Result<Self> {
        if config.event_channel_capacity == 0 {
            return Err(KernelError::Config(
                "event_channel_capacity must be at least 1".into(),
            ));
        }

        let snapshot = store.load_snapshot().await?;
        let fresh = snapshot.is_empty();
        let mut engine = Engine::from_snapshot(snapshot, audit)?;

        let system = Call::new(Principal::new(SYSTEM_PRINCIPAL)?, 0);
        for label in &config.extra_categories {
            let category = Category::new(label.as_str())?;
            if !engine.is_valid_category(category.as_str()) {
                engine.add_category(&system, category)?;
            }
        }

        let events = engine.take_events();
        if !events.is_empty() {
            store.apply(&changeset_for(&engine, &events)).await?;
        }

        let (tx, _) = broadcast::channel(config.event_channel_capacity);
        info!(
            fresh,
            consents = engine.consents().consents().count(),
            categories = engine.categories().len(),
            "consent kernel opened"
        );

        Ok(Self {
            store: Arc::new(store),
            engine: Mutex::new(engine),
            events: tx,
            config,
        })
    }

    /// Get the store reference.
    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    /// Subscribe to events of every successful state change.
    pub fn subscribe(&self) -> broadcast::Receiver<EventRecord> {
        self.events.subscribe()
    }

    /// Run `f` against the audit sink under the kernel lock.
    pub async fn with_audit<R>(&self, f: impl FnOnce(&mut A) -> R) -> R {
        let mut engine = self.engine.lock().await;
        f(engine.audit_mut())
    }

    /// Copy of the current state.
    pub async fn snapshot(&self) -> EngineSnapshot {
        self.engine.lock().await.snapshot()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Transition plumbing
    // ─────────────────────────────────────────────────────────────────────────

    async fn mutate<T>(
        &self,
        op: &'static str,
        f: impl FnOnce(&mut Engine<A>) -> consent_kernel_core::Result<T>,
    ) -> Result<T> {
        let mut engine = self.engine.lock().await;
        let outcome = f(&mut engine);
        let events = engine.take_events();

        // Rejected calls leave no events; anything emitted is persisted
        // regardless of the outcome.
        if !events.is_empty() {
            self.persist(&mut engine, events).await?;
        }

        outcome.map_err(|e| {
            warn!(op, code = e.kind().code(), error = %e, "operation rejected");
            KernelError::from(e)
        })
    }

    async fn persist(&self, engine: &mut Engine<A>, events: Vec<EventRecord>) -> Result<()> {
        let changes = changeset_for(engine, &events);
        if let Err(err) = self.store.apply(&changes).await {
            warn!(error = %err, "persisting changes failed; reloading from store");
            let snapshot = self.store.load_snapshot().await?;
            engine.restore(snapshot)?;
            return Err(err.into());
        }
        debug!(rows = changes.len(), "changes persisted");

        for record in events {
            info!(at = record.at, kind = record.event.kind(), "state changed");
            // No subscribers is fine.
            let _ = self.events.send(record);
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Categories
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn add_category(&self, call: &Call, category: Category) -> Result<()> {
        self.mutate("add-category", |e| e.add_category(call, category))
            .await
    }

    pub async fn is_valid_category(&self, label: &str) -> bool {
        self.engine.lock().await.is_valid_category(label)
    }

    pub async fn categories(&self) -> Vec<Category> {
        self.engine.lock().await.categories()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Delegation
    // ─────────────────────────────────────────────────────────────────────────

    /// Make `delegate` a delegate of the caller.
    pub async fn add_delegate(&self, call: &Call, delegate: Principal) -> Result<()> {
        self.mutate("delegate-add", |e| e.add_delegate(call, delegate))
            .await
    }

    /// Remove `delegate` from the caller's delegates.
    pub async fn remove_delegate(&self, call: &Call, delegate: &Principal) -> Result<()> {
        self.mutate("delegate-remove", |e| e.remove_delegate(call, delegate))
            .await
    }

    pub async fn list_delegates(&self, granter: &Principal) -> Vec<Principal> {
        self.engine.lock().await.list_delegates(granter)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Consents
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn grant(
        &self,
        call: &Call,
        granter: &Principal,
        grantee: &Principal,
        category: &Category,
        duration: u64,
        notes: Option<&str>,
    ) -> Result<Consent> {
        self.mutate("grant", |e| {
            e.grant(call, granter, grantee, category, duration, notes)
        })
        .await
    }

    pub async fn grant_as_delegate(
        &self,
        call: &Call,
        granter: &Principal,
        grantee: &Principal,
        category: &Category,
        duration: u64,
        notes: Option<&str>,
    ) -> Result<Consent> {
        self.mutate("grant-as-delegate", |e| {
            e.grant_as_delegate(call, granter, grantee, category, duration, notes)
        })
        .await
    }

    pub async fn revoke(
        &self,
        call: &Call,
        granter: &Principal,
        grantee: &Principal,
        category: &Category,
    ) -> Result<()> {
        self.mutate("revoke", |e| e.revoke(call, granter, grantee, category))
            .await
    }

    pub async fn renew(
        &self,
        call: &Call,
        granter: &Principal,
        grantee: &Principal,
        category: &Category,
        extra: u64,
    ) -> Result<Consent> {
        self.mutate("renew", |e| e.renew(call, granter, grantee, category, extra))
            .await
    }

    /// Succeeds iff the consent is present, active and `now <= expiry`.
    pub async fn check(
        &self,
        granter: &Principal,
        grantee: &Principal,
        category: &Category,
        now: BlockHeight,
    ) -> Result<Consent> {
        let result = self
            .engine
            .lock()
            .await
            .check(granter, grantee, category, now);
        debug!(%granter, %grantee, %category, now, valid = result.is_ok(), "consent checked");
        Ok(result?)
    }

    pub async fn get_details(&self, key: &ConsentKey) -> Option<Consent> {
        self.engine.lock().await.get_details(key)
    }

    pub async fn get_history(&self, key: &ConsentKey) -> Vec<HistoryEntry> {
        self.engine.lock().await.get_history(key)
    }

    /// Re-verify the hash chain of one key, or of every key when `key` is
    /// `None`.
    pub async fn verify_history(&self, key: Option<&ConsentKey>) -> Result<()> {
        let engine = self.engine.lock().await;
        let result = match key {
            Some(key) => engine.verify_history(key),
            None => engine.consents().history().verify_all(),
        };
        result.map_err(|e: ConsentError| {
            warn!(error = %e, "history verification failed");
            KernelError::from(e)
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Templates
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn create_template(
        &self,
        call: &Call,
        name: &str,
        categories: Vec<Category>,
        duration: u64,
        description: &str,
    ) -> Result<Template> {
        self.mutate("template-create", |e| {
            e.create_template(call, name, categories, duration, description)
        })
        .await
    }

    /// Grant every category of template `name` from the caller to `grantee`.
    pub async fn apply_template(
        &self,
        call: &Call,
        grantee: &Principal,
        name: &str,
    ) -> Result<BatchReport> {
        self.mutate("template-apply", |e| e.apply_template(call, grantee, name))
            .await
    }

    pub async fn get_template(&self, name: &str) -> Option<Template> {
        self.engine.lock().await.get_template(name)
    }

    pub async fn template_names(&self) -> Vec<String> {
        self.engine
            .lock()
            .await
            .templates()
            .names()
            .map(str::to_owned)
            .collect()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Batches
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn batch_grant(
        &self,
        call: &Call,
        grantee: &Principal,
        categories: &[Category],
        duration: u64,
        notes: Option<&str>,
    ) -> Result<BatchReport> {
        self.mutate("batch-grant", |e| {
            e.batch_grant(call, grantee, categories, duration, notes)
        })
        .await
    }

    pub async fn batch_revoke(
        &self,
        call: &Call,
        grantee: &Principal,
        categories: &[Category],
    ) -> Result<BatchReport> {
        self.mutate("batch-revoke", |e| e.batch_revoke(call, grantee, categories))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use consent_kernel_core::{ConsentEvent, NullAudit};
    use consent_kernel_store::MemoryStore;

    fn p(id: &str) -> Principal {
        Principal::new(id).unwrap()
    }

    fn c(label: &str) -> Category {
        Category::new(label).unwrap()
    }

    async fn kernel() -> Kernel<MemoryStore, NullAudit> {
        Kernel::open(MemoryStore::new(), NullAudit, KernelConfig::default())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_open_persists_bootstrap() {
        let kernel = kernel().await;
        assert_eq!(kernel.store().list_categories().await.unwrap().len(), 8);
        assert!(kernel.store().load_snapshot().await.unwrap().categories_initialized);
    }

    #[tokio::test]
    async fn test_extra_categories_from_config() {
        let config = KernelConfig {
            extra_categories: vec!["dental".into(), "allergies".into()],
            ..KernelConfig::default()
        };
        let kernel = Kernel::open(MemoryStore::new(), NullAudit, config)
            .await
            .unwrap();
        assert!(kernel.is_valid_category("dental").await);
        assert_eq!(kernel.categories().await.len(), 9);
    }

    #[tokio::test]
    async fn test_zero_channel_capacity_rejected() {
        let config = KernelConfig {
            event_channel_capacity: 0,
            ..KernelConfig::default()
        };
        let result = Kernel::open(MemoryStore::new(), NullAudit, config).await;
        assert!(matches!(result, Err(KernelError::Config(_))));
    }

    #[tokio::test]
    async fn test_grant_is_persisted_and_published() {
        let kernel = kernel().await;
        let mut events = kernel.subscribe();
        let call = Call::new(p("u1"), 0);

        kernel
            .grant(&call, &p("u1"), &p("u2"), &c("vaccinations"), 500, None)
            .await
            .unwrap();

        let key = ConsentKey::new(p("u1"), p("u2"), c("vaccinations"));
        let stored = kernel.store().get_consent(&key).await.unwrap().unwrap();
        assert_eq!(stored.expiry, 500);

        let record = events.recv().await.unwrap();
        assert!(matches!(record.event, ConsentEvent::ConsentGranted { .. }));
    }

    #[tokio::test]
    async fn test_rejection_surfaces_consent_error() {
        let kernel = kernel().await;
        let call = Call::new(p("u1"), 0);
        let err = kernel
            .grant(&call, &p("u1"), &p("u2"), &c("dental"), 10, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            KernelError::Consent(ConsentError::InvalidCategory(_))
        ));
    }

    #[tokio::test]
    async fn test_check_is_lazy_about_expiry() {
        let kernel = kernel().await;
        let call = Call::new(p("u1"), 0);
        kernel
            .grant(&call, &p("u1"), &p("u2"), &c("vaccinations"), 500, None)
            .await
            .unwrap();
        assert!(kernel
            .check(&p("u1"), &p("u2"), &c("vaccinations"), 500)
            .await
            .is_ok());
        assert!(kernel
            .check(&p("u1"), &p("u2"), &c("vaccinations"), 501)
            .await
            .is_err());
    }
}
