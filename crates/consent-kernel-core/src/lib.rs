//! # Consent Kernel Core
//!
//! The consent state machine: time-bounded, revocable, delegable grants
//! between a granter and a grantee over named record categories, with a
//! bounded, hash-chained history per grant relationship.
//!
//! This crate does no I/O. Time is a logical clock supplied by the caller
//! on every operation, and the only external collaborator is the
//! [`AccessAudit`] sink.
//!
//! ## Key Types
//!
//! - [`Engine`] - Every verb behind one owner, plus snapshots and events
//! - [`ConsentStore`] - Grant, revoke, renew and check
//! - [`TemplateStore`] - Named, write-once grant bundles
//! - [`HistoryLog`] - Per-key bounded history window
//! - [`BoundedVec`] - Capacity-checked ordered container

pub mod audit;
pub mod batch;
pub mod bounded;
pub mod canonical;
pub mod category;
pub mod consent;
pub mod delegation;
pub mod digest;
pub mod engine;
pub mod error;
pub mod event;
pub mod history;
pub mod snapshot;
pub mod template;
pub mod types;

pub use audit::{AccessAudit, AuditError, NullAudit};
pub use batch::{BatchReport, ItemOutcome, MAX_BATCH};
pub use bounded::{BoundedVec, CapacityError};
pub use category::{CategoryRegistry, DEFAULT_CATEGORIES};
pub use consent::{Consent, ConsentStore};
pub use delegation::{DelegateList, DelegationRegistry, MAX_DELEGATES};
pub use digest::Digest;
pub use engine::Engine;
pub use error::{ConsentError, ErrorKind, Result, Subject};
pub use event::{ConsentEvent, EventRecord};
pub use history::{History, HistoryAction, HistoryEntry, HistoryLog, MAX_DETAILS_LEN, MAX_HISTORY};
pub use snapshot::EngineSnapshot;
pub use template::{Template, TemplateStore, MAX_TEMPLATE_CATEGORIES};
pub use types::{BlockHeight, Call, Category, ConsentKey, Principal};
