//! Derive the rows an operation touched from the events it emitted.

use std::collections::BTreeSet;

use consent_kernel_core::{
    AccessAudit, Category, ConsentEvent, ConsentKey, Engine, EventRecord, Principal,
};
use consent_kernel_store::Changeset;

/// Build the changeset for `events`, reading current row values from
/// `engine`. Each touched row appears once.
pub fn changeset_for<A: AccessAudit>(engine: &Engine<A>, events: &[EventRecord]) -> Changeset {
    let mut keys: BTreeSet<&ConsentKey> = BTreeSet::new();
    let mut granters: BTreeSet<&Principal> = BTreeSet::new();
    let mut categories: BTreeSet<&Category> = BTreeSet::new();
    let mut templates: BTreeSet<&str> = BTreeSet::new();
    let mut changes = Changeset::default();

    for record in events {
        match &record.event {
            ConsentEvent::CategoriesBootstrapped { categories: seeded } => {
                categories.extend(seeded);
                changes.categories_initialized = true;
            }
            ConsentEvent::CategoryAdded { category } => {
                categories.insert(category);
                changes.categories_initialized = true;
            }
            ConsentEvent::DelegateAdded { granter, .. }
            | ConsentEvent::DelegateRemoved { granter, .. } => {
                granters.insert(granter);
            }
            ConsentEvent::ConsentGranted { key, .. }
            | ConsentEvent::ConsentRevoked { key, .. }
            | ConsentEvent::ConsentRenewed { key, .. } => {
                keys.insert(key);
            }
            ConsentEvent::TemplateCreated { name, .. } => {
                templates.insert(name.as_str());
            }
            // Summaries; the grants and revokes inside carry their own events.
            ConsentEvent::TemplateApplied { .. }
            | ConsentEvent::BatchGranted { .. }
            | ConsentEvent::BatchRevoked { .. } => {}
        }
    }

    changes.categories = categories.into_iter().cloned().collect();
    changes.delegations = granters
        .into_iter()
        .map(|g| (g.clone(), engine.list_delegates(g)))
        .collect();
    changes.templates = templates
        .into_iter()
        .filter_map(|name| engine.get_template(name))
        .collect();
    for key in keys {
        if let Some(consent) = engine.get_details(key) {
            changes.consents.push((key.clone(), consent));
        }
        if let Some(window) = engine.consents().history().window(key) {
            changes.history.push((key.clone(), window.clone()));
        }
    }
    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use consent_kernel_core::Call;

    fn p(id: &str) -> Principal {
        Principal::new(id).unwrap()
    }

    fn c(label: &str) -> Category {
        Category::new(label).unwrap()
    }

    #[test]
    fn test_bootstrap_changeset() {
        let mut engine = Engine::default();
        let events = engine.take_events();
        let changes = changeset_for(&engine, &events);
        assert!(changes.categories_initialized);
        assert_eq!(changes.categories.len(), 8);
        assert!(changes.consents.is_empty());
    }

    #[test]
    fn test_touched_rows_deduplicated() {
        let mut engine = Engine::default();
        engine.take_events();
        let call = Call::new(p("u1"), 1);
        engine
            .grant(&call, &p("u1"), &p("u2"), &c("allergies"), 10, None)
            .unwrap();
        engine.renew(&call, &p("u1"), &p("u2"), &c("allergies"), 5).unwrap();
        engine.add_delegate(&call, p("d")).unwrap();
        engine.remove_delegate(&call, &p("d")).unwrap();

        let events = engine.take_events();
        let changes = changeset_for(&engine, &events);
        assert_eq!(changes.consents.len(), 1);
        assert_eq!(changes.consents[0].1.expiry, 16);
        assert_eq!(changes.history[0].1.entries.len(), 2);
        // The list is empty again, which tells the store to drop its rows.
        assert_eq!(changes.delegations, vec![(p("u1"), Vec::new())]);
    }

    #[test]
    fn test_batch_summary_adds_no_rows() {
        let mut engine = Engine::default();
        engine.take_events();
        let call = Call::new(p("u1"), 1);
        engine
            .batch_grant(&call, &p("u2"), &[c("nope")], 10, None)
            .unwrap();
        let events = engine.take_events();
        assert_eq!(events.len(), 1);
        assert!(changeset_for(&engine, &events).is_empty());
    }
}
