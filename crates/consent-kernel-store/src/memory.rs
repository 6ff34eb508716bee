//! In-memory implementation of the Store trait.
//!
//! Same semantics as SQLite, nothing persisted. Used by tests and by
//! embedders that keep state elsewhere. `consentctl` always opens a
//! `SqliteStore`.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use consent_kernel_core::{
    Category, Consent, ConsentKey, EngineSnapshot, History, Principal, Template,
};

use crate::error::{Result, StoreError};
use crate::traits::{Changeset, Store};

/// In-memory store. Thread-safe via RwLock.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    consents: BTreeMap<ConsentKey, Consent>,
    categories: BTreeSet<Category>,
    categories_initialized: bool,
    delegations: BTreeMap<Principal, Vec<Principal>>,
    templates: BTreeMap<String, Template>,
    history: BTreeMap<ConsentKey, History>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryStoreInner>> {
        self.inner
            .read()
            .map_err(|e| StoreError::Task(format!("lock poisoned: {}", e)))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryStoreInner>> {
        self.inner
            .write()
            .map_err(|e| StoreError::Task(format!("lock poisoned: {}", e)))
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn load_snapshot(&self) -> Result<EngineSnapshot> {
        let inner = self.read()?;
        Ok(EngineSnapshot {
            consents: inner
                .consents
                .iter()
                .map(|(k, c)| (k.clone(), c.clone()))
                .collect(),
            categories: inner.categories.iter().cloned().collect(),
            categories_initialized: inner.categories_initialized,
            delegations: inner
                .delegations
                .iter()
                .map(|(g, d)| (g.clone(), d.clone()))
                .collect(),
            templates: inner.templates.values().cloned().collect(),
            history: inner
                .history
                .iter()
                .map(|(k, h)| (k.clone(), h.clone()))
                .collect(),
        })
    }

    async fn apply(&self, changes: &Changeset) -> Result<()> {
        let mut inner = self.write()?;

        // Reject before touching anything so a failed apply changes nothing.
        if let Some(t) = changes
            .templates
            .iter()
            .find(|t| inner.templates.contains_key(&t.name))
        {
            return Err(StoreError::Conflict(format!("template {}", t.name)));
        }

        for (key, consent) in &changes.consents {
            inner.consents.insert(key.clone(), consent.clone());
        }
        inner.categories.extend(changes.categories.iter().cloned());
        if changes.categories_initialized {
            inner.categories_initialized = true;
        }
        for (granter, delegates) in &changes.delegations {
            if delegates.is_empty() {
                inner.delegations.remove(granter);
            } else {
                inner.delegations.insert(granter.clone(), delegates.clone());
            }
        }
        for template in &changes.templates {
            inner.templates.insert(template.name.clone(), template.clone());
        }
        for (key, history) in &changes.history {
            inner.history.insert(key.clone(), history.clone());
        }

        tracing::debug!(rows = changes.len(), "applied changeset in memory");
        Ok(())
    }

    async fn get_consent(&self, key: &ConsentKey) -> Result<Option<Consent>> {
        Ok(self.read()?.consents.get(key).cloned())
    }

    async fn get_history(&self, key: &ConsentKey) -> Result<Option<History>> {
        Ok(self.read()?.history.get(key).cloned())
    }

    async fn get_delegates(&self, granter: &Principal) -> Result<Vec<Principal>> {
        Ok(self
            .read()?
            .delegations
            .get(granter)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_template(&self, name: &str) -> Result<Option<Template>> {
        Ok(self.read()?.templates.get(name).cloned())
    }

    async fn list_categories(&self) -> Result<Vec<Category>> {
        Ok(self.read()?.categories.iter().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use consent_kernel_core::{Call, Engine};

    fn p(id: &str) -> Principal {
        Principal::new(id).unwrap()
    }

    fn c(label: &str) -> Category {
        Category::new(label).unwrap()
    }

    fn sample_engine() -> Engine {
        let mut engine = Engine::default();
        let call = Call::new(p("u1"), 1);
        engine.add_delegate(&call, p("d")).unwrap();
        engine
            .grant(&call, &p("u1"), &p("u2"), &c("allergies"), 10, None)
            .unwrap();
        engine
            .create_template(&call, "basic", vec![c("imaging")], 5, "")
            .unwrap();
        engine
    }

    #[tokio::test]
    async fn test_apply_then_load() {
        let store = MemoryStore::new();
        let snapshot = sample_engine().snapshot();
        store.apply(&Changeset::from(snapshot.clone())).await.unwrap();

        assert_eq!(store.load_snapshot().await.unwrap(), snapshot);
        assert_eq!(store.get_delegates(&p("u1")).await.unwrap(), vec![p("d")]);
        assert_eq!(store.list_categories().await.unwrap().len(), 8);
    }

    #[tokio::test]
    async fn test_empty_delegate_list_removes_row() {
        let store = MemoryStore::new();
        let mut changes = Changeset::default();
        changes.delegations.push((p("u1"), vec![p("a"), p("b")]));
        store.apply(&changes).await.unwrap();

        let mut changes = Changeset::default();
        changes.delegations.push((p("u1"), Vec::new()));
        store.apply(&changes).await.unwrap();

        assert!(store.get_delegates(&p("u1")).await.unwrap().is_empty());
        assert!(store.load_snapshot().await.unwrap().delegations.is_empty());
    }

    #[tokio::test]
    async fn test_template_write_once() {
        let store = MemoryStore::new();
        let changes = Changeset::from(sample_engine().snapshot());
        store.apply(&changes).await.unwrap();

        let mut again = Changeset::default();
        again.templates = changes.templates.clone();
        again.categories.push(c("dental"));
        assert!(matches!(
            store.apply(&again).await,
            Err(StoreError::Conflict(_))
        ));
        // The rejected changeset left nothing behind.
        assert!(!store
            .list_categories()
            .await
            .unwrap()
            .contains(&c("dental")));
    }
}
