//! A store wrapper that can be told to fail writes.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use consent_kernel_core::{
    Category, Consent, ConsentKey, EngineSnapshot, History, Principal, Template,
};
use consent_kernel_store::{Changeset, Result, Store, StoreError};

/// Delegates to `S`, except that [`Store::apply`] fails while
/// `fail_writes` is set.
pub struct FlakyStore<S> {
    inner: S,
    fail_writes: AtomicBool,
}

impl<S: Store> FlakyStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            fail_writes: AtomicBool::new(false),
        }
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

#[async_trait]
impl<S: Store> Store for FlakyStore<S> {
    async fn load_snapshot(&self) -> Result<EngineSnapshot> {
        self.inner.load_snapshot().await
    }

    async fn apply(&self, changes: &Changeset) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "injected write failure",
            )));
        }
        self.inner.apply(changes).await
    }

    async fn get_consent(&self, key: &ConsentKey) -> Result<Option<Consent>> {
        self.inner.get_consent(key).await
    }

    async fn get_history(&self, key: &ConsentKey) -> Result<Option<History>> {
        self.inner.get_history(key).await
    }

    async fn get_delegates(&self, granter: &Principal) -> Result<Vec<Principal>> {
        self.inner.get_delegates(granter).await
    }

    async fn get_template(&self, name: &str) -> Result<Option<Template>> {
        self.inner.get_template(name).await
    }

    async fn list_categories(&self) -> Result<Vec<Category>> {
        self.inner.list_categories().await
    }
}
