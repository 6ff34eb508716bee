//! Kernel behavior across restarts and collaborator failures.

use consent_kernel::store::{MemoryStore, SqliteStore, Store};
use consent_kernel::{
    Call, ConsentEvent, ErrorKind, HistoryAction, Kernel, KernelConfig, KernelError,
};
use consent_kernel_testkit::{
    category, categories, memory_kernel, open_kernel, principal, AccessRecord, FailingAudit,
    FlakyStore, RecordingAudit,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("consent_kernel=debug,consent_audit=info")
        .with_test_writer()
        .try_init();
}

#[tokio::test]
async fn test_state_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("consent.db");
    let (owner, clinic, delegate) = (principal("u1"), principal("clinic"), principal("d"));
    let labs = category("lab-results");

    {
        let kernel = open_kernel(SqliteStore::open(&path).unwrap()).await;
        kernel
            .add_delegate(&Call::new(owner.clone(), 0), delegate.clone())
            .await
            .unwrap();
        kernel
            .grant(&Call::new(owner.clone(), 10), &owner, &clinic, &labs, 100, Some("annual"))
            .await
            .unwrap();
        kernel
            .renew(&Call::new(delegate.clone(), 50), &owner, &clinic, &labs, 40)
            .await
            .unwrap();
        kernel
            .create_template(
                &Call::new(owner.clone(), 60),
                "checkup",
                categories(&["allergies", "imaging"]),
                30,
                "routine checkup",
            )
            .await
            .unwrap();
    }

    let kernel = open_kernel(SqliteStore::open(&path).unwrap()).await;
    let consent = kernel.check(&owner, &clinic, &labs, 150).await.unwrap();
    assert_eq!(consent.expiry, 150);
    assert_eq!(kernel.list_delegates(&owner).await, vec![delegate]);

    let key = consent_kernel::ConsentKey::new(owner.clone(), clinic.clone(), labs);
    let history = kernel.get_history(&key).await;
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].action, HistoryAction::Granted);
    assert_eq!(history[1].action, HistoryAction::Renewed);
    kernel.verify_history(None).await.unwrap();

    let template = kernel.get_template("checkup").await.unwrap();
    assert_eq!(template.duration, 30);
}

#[tokio::test]
async fn test_reopen_does_not_rebootstrap() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("consent.db");

    {
        let kernel = open_kernel(SqliteStore::open(&path).unwrap()).await;
        kernel
            .add_category(&Call::new(principal("admin"), 0), category("dental"))
            .await
            .unwrap();
    }

    let kernel = open_kernel(SqliteStore::open(&path).unwrap()).await;
    let mut events = kernel.subscribe();
    assert!(kernel.is_valid_category("dental").await);
    assert_eq!(kernel.categories().await.len(), 9);
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_extra_categories_are_persisted() {
    let config = KernelConfig {
        extra_categories: vec!["dental".into(), "allergies".into()],
        ..KernelConfig::default()
    };
    let kernel = Kernel::open(MemoryStore::new(), RecordingAudit::new(), config)
        .await
        .unwrap();

    assert!(kernel.is_valid_category("dental").await);
    assert_eq!(kernel.categories().await.len(), 9);
    let persisted = kernel.store().list_categories().await.unwrap();
    assert_eq!(persisted.len(), 9);
}

#[tokio::test]
async fn test_audit_failure_leaves_no_trace() {
    let kernel = Kernel::open(MemoryStore::new(), FailingAudit::always(), KernelConfig::default())
        .await
        .unwrap();
    let mut events = kernel.subscribe();
    let (owner, clinic) = (principal("u1"), principal("clinic"));
    let imaging = category("imaging");

    let err = kernel
        .grant(&Call::new(owner.clone(), 0), &owner, &clinic, &imaging, 10, None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::AuditFailed));

    let key = consent_kernel::ConsentKey::new(owner.clone(), clinic.clone(), imaging.clone());
    assert!(kernel.get_details(&key).await.is_none());
    assert!(kernel.get_history(&key).await.is_empty());
    assert!(kernel.store().get_consent(&key).await.unwrap().is_none());
    assert!(events.try_recv().is_err());
    assert_eq!(kernel.with_audit(|a| a.rejected).await, 1);

    // Once the sink recovers the same grant goes through.
    kernel.with_audit(|a| a.rearm(1)).await;
    kernel
        .grant(&Call::new(owner.clone(), 1), &owner, &clinic, &imaging, 10, None)
        .await
        .unwrap();
    assert!(kernel.check(&owner, &clinic, &imaging, 11).await.is_ok());
}

#[tokio::test]
async fn test_audit_records_each_access_change() {
    let kernel = memory_kernel().await;
    let (owner, clinic, delegate) = (principal("u1"), principal("clinic"), principal("d"));
    let (labs, meds) = (category("lab-results"), category("medications"));
    let record = |accessor: &consent_kernel::Principal, category: &consent_kernel::Category| {
        AccessRecord {
            accessor: accessor.clone(),
            owner: owner.clone(),
            category: category.clone(),
            success: true,
        }
    };

    kernel
        .add_delegate(&Call::new(owner.clone(), 0), delegate.clone())
        .await
        .unwrap();
    kernel
        .grant(&Call::new(owner.clone(), 1), &owner, &clinic, &labs, 100, None)
        .await
        .unwrap();
    kernel
        .grant_as_delegate(&Call::new(delegate.clone(), 2), &owner, &clinic, &meds, 100, None)
        .await
        .unwrap();
    kernel
        .revoke(&Call::new(owner.clone(), 3), &owner, &clinic, &labs)
        .await
        .unwrap();

    let records = kernel.with_audit(|a| a.records.clone()).await;
    assert_eq!(
        records,
        vec![record(&owner, &labs), record(&delegate, &meds), record(&owner, &labs)]
    );

    // Renewal extends existing access and is not audited.
    kernel
        .renew(&Call::new(delegate.clone(), 4), &owner, &clinic, &meds, 50)
        .await
        .unwrap();
    assert_eq!(kernel.with_audit(|a| a.records.len()).await, 3);
}

#[tokio::test]
async fn test_revoke_audit_failure_keeps_consent_active() {
    let kernel = Kernel::open(MemoryStore::new(), FailingAudit::after(1), KernelConfig::default())
        .await
        .unwrap();
    let (owner, clinic) = (principal("u1"), principal("clinic"));
    let meds = category("medications");

    kernel
        .grant(&Call::new(owner.clone(), 0), &owner, &clinic, &meds, 10, None)
        .await
        .unwrap();
    let err = kernel
        .revoke(&Call::new(owner.clone(), 1), &owner, &clinic, &meds)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::AuditFailed));
    assert!(kernel.check(&owner, &clinic, &meds, 5).await.is_ok());

    let key = consent_kernel::ConsentKey::new(owner, clinic, meds);
    assert_eq!(kernel.get_history(&key).await.len(), 1);
    assert!(kernel.store().get_consent(&key).await.unwrap().unwrap().active);
}

#[tokio::test]
async fn test_store_failure_rolls_back_memory() {
    init_tracing();
    let kernel = open_kernel(FlakyStore::new(MemoryStore::new())).await;
    let (owner, clinic) = (principal("u1"), principal("clinic"));
    let genetics = category("genetics");

    kernel.store().set_fail_writes(true);
    let err = kernel
        .grant(&Call::new(owner.clone(), 0), &owner, &clinic, &genetics, 10, None)
        .await
        .unwrap_err();
    assert!(matches!(err, KernelError::Store(_)));
    assert_eq!(err.kind(), None);
    assert_eq!(err.code(), 1);

    let key = consent_kernel::ConsentKey::new(owner.clone(), clinic.clone(), genetics.clone());
    assert!(kernel.get_details(&key).await.is_none());
    assert!(kernel.get_history(&key).await.is_empty());

    kernel.store().set_fail_writes(false);
    let consent = kernel
        .grant(&Call::new(owner.clone(), 2), &owner, &clinic, &genetics, 10, None)
        .await
        .unwrap();
    assert_eq!(consent.expiry, 12);
    assert_eq!(kernel.get_history(&key).await.len(), 1);
    kernel.verify_history(Some(&key)).await.unwrap();
}

#[tokio::test]
async fn test_events_broadcast_in_order() {
    let kernel = open_kernel(MemoryStore::new()).await;
    let mut events = kernel.subscribe();
    let (owner, clinic) = (principal("u1"), principal("clinic"));

    let report = kernel
        .batch_grant(
            &Call::new(owner.clone(), 5),
            &clinic,
            &categories(&["allergies", "dental"]),
            20,
            None,
        )
        .await
        .unwrap();
    assert_eq!(report.succeeded(), 1);
    assert_eq!(report.failed(), 1);

    let first = events.recv().await.unwrap();
    assert_eq!(first.at, 5);
    assert!(matches!(first.event, ConsentEvent::ConsentGranted { .. }));

    let second = events.recv().await.unwrap();
    match second.event {
        ConsentEvent::BatchGranted {
            succeeded, failed, ..
        } => {
            assert_eq!((succeeded, failed), (1, 1));
        }
        other => panic!("unexpected event {:?}", other),
    }

    // Rejections are not broadcast.
    kernel
        .revoke(&Call::new(clinic.clone(), 6), &owner, &clinic, &category("allergies"))
        .await
        .unwrap_err();
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_template_apply_reports_partial_success() {
    let kernel = open_kernel(SqliteStore::open_memory().unwrap()).await;
    let (owner, clinic) = (principal("u1"), principal("clinic"));

    kernel
        .create_template(
            &Call::new(owner.clone(), 0),
            "intake",
            categories(&["allergies", "medications"]),
            50,
            "new patient intake",
        )
        .await
        .unwrap();
    kernel
        .grant(&Call::new(owner.clone(), 0), &owner, &clinic, &category("allergies"), 5, None)
        .await
        .unwrap();

    let report = kernel
        .apply_template(&Call::new(owner.clone(), 1), &clinic, "intake")
        .await
        .unwrap();
    assert_eq!(report.succeeded(), 1);
    let failures: Vec<_> = report.failures().collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].0.as_str(), "allergies");

    let meds = kernel
        .check(&owner, &clinic, &category("medications"), 51)
        .await
        .unwrap();
    assert_eq!(meds.expiry, 51);

    let err = kernel
        .apply_template(&Call::new(owner, 2), &clinic, "missing")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::TemplateNotFound));
}
