//! Golden scenarios against the kernel over both stores.

use consent_kernel::store::{MemoryStore, SqliteStore, Store};
use consent_kernel_core::Engine;
use consent_kernel_testkit::{all_scenarios, open_kernel, run_on_engine, run_on_kernel};

#[tokio::test]
async fn test_scenarios_on_memory_store() {
    for scenario in all_scenarios() {
        let kernel = open_kernel(MemoryStore::new()).await;
        if let Err(failure) = run_on_kernel(&scenario, &kernel).await {
            panic!("{}", failure);
        }
    }
}

#[tokio::test]
async fn test_scenarios_on_sqlite_store() {
    for scenario in all_scenarios() {
        let kernel = open_kernel(SqliteStore::open_memory().unwrap()).await;
        if let Err(failure) = run_on_kernel(&scenario, &kernel).await {
            panic!("{}", failure);
        }
    }
}

#[tokio::test]
async fn test_kernel_state_matches_engine_after_scenarios() {
    for scenario in all_scenarios() {
        let mut engine = Engine::default();
        run_on_engine(&scenario, &mut engine).unwrap();

        let kernel = open_kernel(SqliteStore::open_memory().unwrap()).await;
        run_on_kernel(&scenario, &kernel).await.unwrap();

        let mut persisted = kernel.store().load_snapshot().await.unwrap();
        persisted.normalize();
        let mut expected = engine.snapshot();
        expected.normalize();
        assert_eq!(persisted, expected, "{}", scenario.name);
    }
}
