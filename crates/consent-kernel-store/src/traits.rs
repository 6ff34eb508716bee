//! Store trait: the abstract interface for consent persistence.
//!
//! The kernel never issues row-level writes. After each operation it
//! describes the rows that changed as a [`Changeset`] and hands it to
//! [`Store::apply`], which must persist all of it or none of it.

use async_trait::async_trait;
use consent_kernel_core::{
    Category, Consent, ConsentKey, EngineSnapshot, History, Principal, Template,
};

use crate::error::Result;

/// The rows one kernel operation touched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Changeset {
    /// Consent records to insert or overwrite.
    pub consents: Vec<(ConsentKey, Consent)>,
    /// Category labels to insert.
    pub categories: Vec<Category>,
    /// Set the category bootstrap flag.
    pub categories_initialized: bool,
    /// Full replacement delegate lists; an empty list deletes the row set.
    pub delegations: Vec<(Principal, Vec<Principal>)>,
    /// Templates to insert. Templates are write-once.
    pub templates: Vec<Template>,
    /// Full replacement history windows.
    pub history: Vec<(ConsentKey, History)>,
}

impl Changeset {
    pub fn is_empty(&self) -> bool {
        self.consents.is_empty()
            && self.categories.is_empty()
            && !self.categories_initialized
            && self.delegations.is_empty()
            && self.templates.is_empty()
            && self.history.is_empty()
    }

    /// Number of rows in the changeset, counting each window and list once.
    pub fn len(&self) -> usize {
        self.consents.len()
            + self.categories.len()
            + usize::from(self.categories_initialized)
            + self.delegations.len()
            + self.templates.len()
            + self.history.len()
    }
}

impl From<EngineSnapshot> for Changeset {
    /// Every row of a snapshot, for seeding an empty store.
    fn from(snapshot: EngineSnapshot) -> Self {
        Self {
            consents: snapshot.consents,
            categories: snapshot.categories,
            categories_initialized: snapshot.categories_initialized,
            delegations: snapshot.delegations,
            templates: snapshot.templates,
            history: snapshot.history,
        }
    }
}

/// The Store trait: async interface for consent persistence.
///
/// All methods are async to support both sync (SQLite) and async backends.
/// For SQLite, we use `spawn_blocking` internally to avoid blocking the runtime.
#[async_trait]
pub trait Store: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Whole-state Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Load every table. Rows come back in key order.
    async fn load_snapshot(&self) -> Result<EngineSnapshot>;

    /// Persist a changeset atomically.
    async fn apply(&self, changes: &Changeset) -> Result<()>;

    // ─────────────────────────────────────────────────────────────────────────
    // Point Reads
    // ─────────────────────────────────────────────────────────────────────────

    /// Get one consent record.
    async fn get_consent(&self, key: &ConsentKey) -> Result<Option<Consent>>;

    /// Get the retained history window of one key.
    async fn get_history(&self, key: &ConsentKey) -> Result<Option<History>>;

    /// Delegates of `granter` in insertion order.
    async fn get_delegates(&self, granter: &Principal) -> Result<Vec<Principal>>;

    /// Get a template by name.
    async fn get_template(&self, name: &str) -> Result<Option<Template>>;

    /// All stored category labels, sorted.
    async fn list_categories(&self) -> Result<Vec<Category>>;
}
