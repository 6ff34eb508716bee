//! # Consent Kernel
//!
//! Time-bounded, revocable, delegable consent grants with a bounded,
//! tamper-evident history per grant relationship.
//!
//! ## Overview
//!
//! The [`Kernel`] wraps the synchronous consent [`Engine`] with:
//!
//! - **Serialization**: one lock, so concurrent callers see a total order
//! - **Persistence**: every transition is written through a [`store::Store`]
//! - **Events**: every state change is logged and broadcast to subscribers
//!
//! ## Usage
//!
//! ```rust,no_run
//! use consent_kernel::{Call, Category, Kernel, KernelConfig, Principal, TracingAudit};
//! use consent_kernel::store::SqliteStore;
//!
//! async fn example() {
//!     let store = SqliteStore::open("consent.db").unwrap();
//!     let kernel = Kernel::open(store, TracingAudit, KernelConfig::default())
//!         .await
//!         .unwrap();
//!
//!     let owner = Principal::new("patient-1").unwrap();
//!     let clinic = Principal::new("clinic-7").unwrap();
//!     let labs = Category::new("lab-results").unwrap();
//!
//!     let call = Call::new(owner.clone(), 100);
//!     kernel.grant(&call, &owner, &clinic, &labs, 500, None).await.unwrap();
//!     assert!(kernel.check(&owner, &clinic, &labs, 600).await.is_ok());
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `consent_kernel::core` - The state machine and its types
//! - `consent_kernel::store` - Storage abstraction and SQLite

pub mod audit;
pub mod changes;
pub mod config;
pub mod error;
pub mod kernel;

// Re-export component crates
pub use consent_kernel_core as core;
pub use consent_kernel_store as store;

pub use audit::TracingAudit;
pub use config::KernelConfig;
pub use error::{KernelError, Result};
pub use kernel::Kernel;

// Re-export commonly used core types
pub use consent_kernel_core::{
    AccessAudit, BatchReport, BlockHeight, Call, Category, Consent, ConsentError, ConsentEvent,
    ConsentKey, Engine, ErrorKind, EventRecord, HistoryAction, HistoryEntry, NullAudit, Principal,
    Subject, Template,
};
