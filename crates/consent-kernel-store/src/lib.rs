//! # Consent Kernel Store
//!
//! Persistence for the Consent Kernel. The kernel keeps its working state
//! in memory and writes every operation's effect through the [`Store`]
//! trait as one atomic [`Changeset`].
//!
//! ## Key Types
//!
//! - [`Store`] - The async trait for all storage operations
//! - [`Changeset`] - The rows one kernel operation touched
//! - [`SqliteStore`] - SQLite-based persistent storage
//! - [`MemoryStore`] - In-memory storage for tests
//!
//! ## Usage
//!
//! ```rust,no_run
//! use consent_kernel_store::{SqliteStore, Store};
//!
//! async fn example() {
//!     let store = SqliteStore::open("consent.db").unwrap();
//!     let snapshot = store.load_snapshot().await.unwrap();
//!     println!("{} consents on disk", snapshot.consents.len());
//! }
//! ```
//!
//! ## Tables
//!
//! `consents`, `categories`, `delegations`, `templates` and `history`, plus
//! `registry_meta` (the category bootstrap flag), `history_heads` (per-key
//! sequence counters and chain heads) and `schema_migrations`.

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{Changeset, Store};
