//! Owned, serializable copy of the persisted tables.
//!
//! Stores load into and save from this shape; the engine rebuilds itself
//! from it. Rows are kept in a deterministic order so two snapshots of the
//! same state compare equal.

use serde::{Deserialize, Serialize};

use crate::consent::Consent;
use crate::history::History;
use crate::template::Template;
use crate::types::{Category, ConsentKey, Principal};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineSnapshot {
    pub consents: Vec<(ConsentKey, Consent)>,
    pub categories: Vec<Category>,
    pub categories_initialized: bool,
    /// Delegate lists in insertion order, keyed by granter.
    pub delegations: Vec<(Principal, Vec<Principal>)>,
    pub templates: Vec<Template>,
    pub history: Vec<(ConsentKey, History)>,
}

impl EngineSnapshot {
    /// Sort every table by key.
    pub fn normalize(&mut self) {
        self.consents.sort_by(|a, b| a.0.cmp(&b.0));
        self.categories.sort();
        self.delegations.sort_by(|a, b| a.0.cmp(&b.0));
        self.templates.sort_by(|a, b| a.name.cmp(&b.name));
        self.history.sort_by(|a, b| a.0.cmp(&b.0));
    }

    /// Whether nothing has ever been written.
    pub fn is_empty(&self) -> bool {
        !self.categories_initialized
            && self.categories.is_empty()
            && self.consents.is_empty()
            && self.delegations.is_empty()
            && self.templates.is_empty()
            && self.history.is_empty()
    }
}
