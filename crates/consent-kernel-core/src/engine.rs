//! The engine: every consent verb behind one owner.
//!
//! `Engine` is synchronous and single-threaded. Each call is a complete
//! transition `(state, op) -> (state', result)`; the events it produced are
//! left in an outbox until [`Engine::take_events`] drains them.

use std::collections::HashMap;

use crate::audit::{AccessAudit, NullAudit};
use crate::batch::{self, BatchReport};
use crate::category::CategoryRegistry;
use crate::consent::{Consent, ConsentStore};
use crate::delegation::{DelegateList, DelegationRegistry};
use crate::error::{ConsentError, Result, Subject};
use crate::event::{ConsentEvent, EventRecord};
use crate::history::{HistoryEntry, HistoryLog};
use crate::snapshot::EngineSnapshot;
use crate::template::{Template, TemplateStore};
use crate::types::{BlockHeight, Call, Category, ConsentKey, Principal};

/// A validated snapshot, split into the engine's components.
struct StateParts {
    consents: HashMap<ConsentKey, Consent>,
    categories: CategoryRegistry,
    delegations: DelegationRegistry,
    history: HistoryLog,
    templates: TemplateStore,
}

impl TryFrom<EngineSnapshot> for StateParts {
    type Error = ConsentError;

    fn try_from(snapshot: EngineSnapshot) -> Result<Self> {
        let mut delegations = Vec::with_capacity(snapshot.delegations.len());
        for (granter, delegates) in snapshot.delegations {
            let list = DelegateList::try_from(delegates).map_err(|_| {
                ConsentError::CapacityExceeded(Subject::DelegateList(granter.clone()))
            })?;
            delegations.push((granter, list));
        }

        let history = HistoryLog::from_parts(snapshot.history);
        history.verify_all()?;

        Ok(Self {
            consents: snapshot.consents.into_iter().collect(),
            categories: CategoryRegistry::from_parts(
                snapshot.categories,
                snapshot.categories_initialized,
            ),
            delegations: DelegationRegistry::from_parts(delegations),
            history,
            templates: TemplateStore::from_parts(snapshot.templates),
        })
    }
}

pub struct Engine<A: AccessAudit = NullAudit> {
    consents: ConsentStore<A>,
    templates: TemplateStore,
}

impl Default for Engine<NullAudit> {
    fn default() -> Self {
        Self::new(NullAudit)
    }
}

impl<A: AccessAudit> Engine<A> {
    /// A fresh engine with the default categories seeded.
    pub fn new(audit: A) -> Self {
        Self {
            consents: ConsentStore::new(audit),
            templates: TemplateStore::new(),
        }
    }

    /// Rebuild an engine from persisted tables, re-verifying every history
    /// chain.
    pub fn from_snapshot(snapshot: EngineSnapshot, audit: A) -> Result<Self> {
        let parts = StateParts::try_from(snapshot)?;
        Ok(Self {
            consents: ConsentStore::from_parts(
                parts.consents,
                parts.categories,
                parts.delegations,
                parts.history,
                audit,
            ),
            templates: parts.templates,
        })
    }

    /// Replace the current state with `snapshot`, keeping the audit sink.
    ///
    /// On error the current state is left untouched.
    pub fn restore(&mut self, snapshot: EngineSnapshot) -> Result<()> {
        let parts = StateParts::try_from(snapshot)?;
        self.consents.replace_state(
            parts.consents,
            parts.categories,
            parts.delegations,
            parts.history,
        );
        self.templates = parts.templates;
        Ok(())
    }

    /// Copy every table out, in a deterministic order.
    pub fn snapshot(&self) -> EngineSnapshot {
        let mut snapshot = EngineSnapshot {
            consents: self
                .consents
                .consents()
                .map(|(k, c)| (k.clone(), c.clone()))
                .collect(),
            categories: self.consents.categories().labels().cloned().collect(),
            categories_initialized: self.consents.categories().is_initialized(),
            delegations: self
                .consents
                .delegations()
                .iter()
                .map(|(g, list)| (g.clone(), list.to_vec()))
                .collect(),
            templates: self.templates.iter().cloned().collect(),
            history: self
                .consents
                .history()
                .iter()
                .map(|(k, h)| (k.clone(), h.clone()))
                .collect(),
        };
        snapshot.normalize();
        snapshot
    }

    /// Drain the events recorded since the last call.
    pub fn take_events(&mut self) -> Vec<EventRecord> {
        self.consents.take_events()
    }

    pub fn consents(&self) -> &ConsentStore<A> {
        &self.consents
    }

    pub fn templates(&self) -> &TemplateStore {
        &self.templates
    }

    pub fn audit_mut(&mut self) -> &mut A {
        self.consents.audit_mut()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Categories
    // ─────────────────────────────────────────────────────────────────────────

    pub fn add_category(&mut self, call: &Call, category: Category) -> Result<()> {
        self.consents.add_category(call, category)
    }

    pub fn is_valid_category(&self, label: &str) -> bool {
        self.consents.is_valid_category(label)
    }

    pub fn categories(&self) -> Vec<Category> {
        self.consents.categories().labels().cloned().collect()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Delegation
    // ─────────────────────────────────────────────────────────────────────────

    pub fn add_delegate(&mut self, call: &Call, delegate: Principal) -> Result<()> {
        self.consents.add_delegate(call, delegate)
    }

    pub fn remove_delegate(&mut self, call: &Call, delegate: &Principal) -> Result<()> {
        self.consents.remove_delegate(call, delegate)
    }

    pub fn list_delegates(&self, granter: &Principal) -> Vec<Principal> {
        self.consents.delegates_of(granter).to_vec()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Consents
    // ─────────────────────────────────────────────────────────────────────────

    pub fn grant(
        &mut self,
        call: &Call,
        granter: &Principal,
        grantee: &Principal,
        category: &Category,
        duration: u64,
        notes: Option<&str>,
    ) -> Result<Consent> {
        self.consents
            .grant(call, granter, grantee, category, duration, notes)
    }

    pub fn grant_as_delegate(
        &mut self,
        call: &Call,
        granter: &Principal,
        grantee: &Principal,
        category: &Category,
        duration: u64,
        notes: Option<&str>,
    ) -> Result<Consent> {
        self.consents
            .grant_as_delegate(call, granter, grantee, category, duration, notes)
    }

    pub fn revoke(
        &mut self,
        call: &Call,
        granter: &Principal,
        grantee: &Principal,
        category: &Category,
    ) -> Result<()> {
        self.consents.revoke(call, granter, grantee, category)
    }

    pub fn renew(
        &mut self,
        call: &Call,
        granter: &Principal,
        grantee: &Principal,
        category: &Category,
        extra: u64,
    ) -> Result<Consent> {
        self.consents.renew(call, granter, grantee, category, extra)
    }

    pub fn check(
        &self,
        granter: &Principal,
        grantee: &Principal,
        category: &Category,
        now: BlockHeight,
    ) -> Result<Consent> {
        self.consents
            .check(granter, grantee, category, now)
            .cloned()
    }

    pub fn get_details(&self, key: &ConsentKey) -> Option<Consent> {
        self.consents.get_details(key).cloned()
    }

    pub fn get_history(&self, key: &ConsentKey) -> Vec<HistoryEntry> {
        self.consents.get_history(key).to_vec()
    }

    /// Re-verify one key's history chain.
    pub fn verify_history(&self, key: &ConsentKey) -> Result<()> {
        self.consents.history().verify(key)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Templates
    // ─────────────────────────────────────────────────────────────────────────

    pub fn create_template(
        &mut self,
        call: &Call,
        name: &str,
        categories: Vec<Category>,
        duration: u64,
        description: &str,
    ) -> Result<Template> {
        let template = self
            .templates
            .create(
                self.consents.categories(),
                name,
                categories,
                duration,
                description,
            )?
            .clone();
        self.consents.emit(
            call.at,
            ConsentEvent::TemplateCreated {
                name: template.name.clone(),
                categories: template.categories.to_vec(),
                duration: template.duration,
            },
        );
        Ok(template)
    }

    pub fn apply_template(
        &mut self,
        call: &Call,
        grantee: &Principal,
        name: &str,
    ) -> Result<BatchReport> {
        let report = self.templates.apply(&mut self.consents, call, grantee, name)?;
        self.consents.emit(
            call.at,
            ConsentEvent::TemplateApplied {
                name: name.to_owned(),
                granter: call.caller.clone(),
                grantee: grantee.clone(),
                succeeded: report.succeeded(),
                failed: report.failed(),
            },
        );
        Ok(report)
    }

    pub fn get_template(&self, name: &str) -> Option<Template> {
        self.templates.get(name).cloned()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Batches
    // ─────────────────────────────────────────────────────────────────────────

    pub fn batch_grant(
        &mut self,
        call: &Call,
        grantee: &Principal,
        categories: &[Category],
        duration: u64,
        notes: Option<&str>,
    ) -> Result<BatchReport> {
        let report =
            batch::batch_grant(&mut self.consents, call, grantee, categories, duration, notes)?;
        self.consents.emit(
            call.at,
            ConsentEvent::BatchGranted {
                granter: call.caller.clone(),
                grantee: grantee.clone(),
                succeeded: report.succeeded(),
                failed: report.failed(),
            },
        );
        Ok(report)
    }

    pub fn batch_revoke(
        &mut self,
        call: &Call,
        grantee: &Principal,
        categories: &[Category],
    ) -> Result<BatchReport> {
        let report = batch::batch_revoke(&mut self.consents, call, grantee, categories)?;
        self.consents.emit(
            call.at,
            ConsentEvent::BatchRevoked {
                granter: call.caller.clone(),
                grantee: grantee.clone(),
                succeeded: report.succeeded(),
                failed: report.failed(),
            },
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(id: &str) -> Principal {
        Principal::new(id).unwrap()
    }

    fn c(label: &str) -> Category {
        Category::new(label).unwrap()
    }

    fn populated() -> Engine {
        let mut engine = Engine::default();
        let call = Call::new(p("u1"), 5);
        engine.add_category(&call, c("dental")).unwrap();
        engine.add_delegate(&call, p("d")).unwrap();
        engine
            .grant(&call, &p("u1"), &p("u2"), &c("dental"), 100, Some("cleaning"))
            .unwrap();
        engine.renew(&call, &p("u1"), &p("u2"), &c("dental"), 10).unwrap();
        engine
            .create_template(&call, "basic", vec![c("allergies")], 20, "")
            .unwrap();
        engine
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let engine = populated();
        let snapshot = engine.snapshot();

        let restored = Engine::from_snapshot(snapshot.clone(), NullAudit).unwrap();
        assert_eq!(restored.snapshot(), snapshot);
        assert!(restored.is_valid_category("dental"));
        assert_eq!(restored.list_delegates(&p("u1")), vec![p("d")]);
        assert_eq!(
            restored.check(&p("u1"), &p("u2"), &c("dental"), 110).unwrap().expiry,
            115
        );
    }

    #[test]
    fn test_restore_does_not_rebootstrap() {
        let mut restored = Engine::from_snapshot(populated().snapshot(), NullAudit).unwrap();
        assert!(restored.take_events().is_empty());
    }

    #[test]
    fn test_restore_rejects_tampered_history() {
        let mut snapshot = populated().snapshot();
        let (_, window) = &mut snapshot.history[0];
        let mut entries = window.entries.to_vec();
        entries[0].at += 1;
        window.entries = entries.try_into().unwrap();

        let err = Engine::from_snapshot(snapshot, NullAudit).err().unwrap();
        assert!(matches!(err, ConsentError::HistoryCorrupted { seq: 0, .. }));
    }

    #[test]
    fn test_restore_in_place_keeps_audit_and_drops_pending_events() {
        let saved = populated().snapshot();
        let mut engine = populated();
        engine
            .grant(&Call::new(p("u9"), 7), &p("u9"), &p("u2"), &c("imaging"), 3, None)
            .unwrap();

        engine.restore(saved.clone()).unwrap();
        assert_eq!(engine.snapshot(), saved);
        assert!(engine.take_events().is_empty());
    }

    #[test]
    fn test_restore_rejects_oversized_delegate_list() {
        let mut snapshot = EngineSnapshot::default();
        let delegates = (0..11).map(|i| p(&format!("d{}", i))).collect();
        snapshot.delegations.push((p("u1"), delegates));
        assert!(matches!(
            Engine::from_snapshot(snapshot, NullAudit).err().unwrap(),
            ConsentError::CapacityExceeded(Subject::DelegateList(_))
        ));
    }

    #[test]
    fn test_engine_emits_batch_and_template_events() {
        let mut engine = populated();
        engine.take_events();
        let call = Call::new(p("u3"), 9);

        engine.apply_template(&call, &p("u4"), "basic").unwrap();
        engine
            .batch_grant(&call, &p("u5"), &[c("imaging"), c("nope")], 10, None)
            .unwrap();

        let kinds: Vec<&str> = engine.take_events().iter().map(|e| e.event.kind()).collect();
        assert_eq!(
            kinds,
            vec!["consent-granted", "template-applied", "consent-granted", "batch-granted"]
        );
    }
}
