//! # Consent Kernel Testkit
//!
//! Testing utilities for the Consent Kernel.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Golden scenarios**: Step lists with expected outcomes, run against both the
//!   engine and the async kernel
//! - **Generators**: Proptest strategies for random operation sequences
//! - **Fixtures**: Helper structs for setting up test parties
//! - **Collaborator doubles**: Recording and failing audit sinks, and a store
//!   whose writes can be made to fail
//!
//! ## Golden Scenarios
//!
//! ```rust
//! use consent_kernel_core::Engine;
//! use consent_kernel_testkit::scenarios::{all_scenarios, run_on_engine};
//!
//! for scenario in all_scenarios() {
//!     run_on_engine(&scenario, &mut Engine::default()).unwrap();
//! }
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use consent_kernel_core::{Engine, NullAudit};
//! use consent_kernel_testkit::generators::{run_ops, timed_ops};
//!
//! proptest! {
//!     #[test]
//!     fn history_always_verifies(ops in timed_ops(100)) {
//!         let mut engine = Engine::new(NullAudit);
//!         run_ops(&mut engine, &ops);
//!         prop_assert!(engine.consents().history().verify_all().is_ok());
//!     }
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! ```rust
//! use consent_kernel_testkit::fixtures::TestFixture;
//!
//! let mut fixture = TestFixture::new();
//! fixture.grant("allergies", 100, 0).unwrap();
//! assert!(fixture.is_valid("allergies", 100));
//! ```

pub mod audit;
pub mod fixtures;
pub mod generators;
pub mod scenarios;
pub mod store;

pub use audit::{AccessRecord, FailingAudit, RecordingAudit};
pub use fixtures::{
    categories, category, memory_kernel, multi_party_principals, open_kernel, principal,
    TestFixture,
};
pub use generators::{apply_op, run_ops, timed_ops, Op};
pub use scenarios::{
    all_scenarios, run_on_engine, run_on_kernel, verify_all_scenarios, GoldenScenario,
    ScenarioFailure,
};
pub use store::FlakyStore;
