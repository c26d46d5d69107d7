//! End-to-end user flows.

use super::harness::{draft, record, Harness, EMAIL, PASSWORD};
use crate::RuntimeError;
use auth_session::{SessionStatus, VerificationEmail, PASSWORD_RESET_NOTICE};
use ledger_sync::testing::StoreOp;
use ledger_sync::{DeleteOutcome, SyncError, SyncStatus};
use rust_decimal::Decimal;

#[tokio::test]
async fn test_totals_follow_optimistic_create() {
    let h = Harness::new();
    let user_id = h.provider.add_account(EMAIL, PASSWORD, true);
    h.store
        .seed(&user_id, vec![record("a", 50, 0), record("b", 30, 1)]);

    h.runtime.log_in(EMAIL, PASSWORD).await.unwrap();
    assert_eq!(h.runtime.total(), Decimal::from(80));

    let gate = h.store.hold_next(StoreOp::Create);
    let (created, ()) = tokio::join!(h.runtime.create_entry(draft(40, "Fuel")), async {
        gate.entered().await;
        let ledger = h.runtime.ledger();
        assert_eq!(ledger.total, Decimal::from(120));
        assert_eq!(ledger.sync_status, SyncStatus::Syncing);
        gate.release();
    });

    let created = created.unwrap();
    assert_eq!(h.runtime.total(), Decimal::from(120));
    assert_eq!(h.store.records(&user_id).len(), 3);
    assert!(h.runtime.entries().iter().any(|e| e.id == created.id));
}

#[tokio::test]
async fn test_unverified_login_then_verification() {
    let h = Harness::new();
    h.provider.add_account(EMAIL, PASSWORD, false);

    let session = h.runtime.log_in(EMAIL, PASSWORD).await.unwrap();
    assert_eq!(session.status, SessionStatus::AwaitingVerification);

    // The ledger is usable before verification
    h.runtime.create_entry(draft(5, "Coffee")).await.unwrap();

    assert!(!h.runtime.check_verification().await.unwrap());
    h.provider.set_verified(EMAIL, true);
    assert!(h.runtime.check_verification().await.unwrap());
    assert_eq!(h.runtime.session().status, SessionStatus::Authenticated);
    assert_eq!(h.runtime.entries().len(), 1);
}

#[tokio::test]
async fn test_second_delete_while_first_in_flight() {
    let h = Harness::new();
    let user_id = h.provider.add_account(EMAIL, PASSWORD, true);
    h.store.seed(&user_id, vec![record("a", 50, 0)]);
    h.runtime.log_in(EMAIL, PASSWORD).await.unwrap();

    let gate = h.store.hold_next(StoreOp::Delete);
    let (first, ()) = tokio::join!(h.runtime.delete_entry("a"), async {
        gate.entered().await;
        assert!(h.runtime.entries().is_empty());
        let second = h.runtime.delete_entry("a").await.unwrap();
        assert_eq!(second, DeleteOutcome::NoOp);
        gate.release();
    });

    assert_eq!(first.unwrap(), DeleteOutcome::Deleted);
    assert!(h.runtime.entries().is_empty());
    assert_eq!(h.store.calls(StoreOp::Delete), 1);
    assert!(h.store.records(&user_id).is_empty());
}

#[tokio::test]
async fn test_logout_during_create_leaves_ledger_empty() {
    let h = Harness::new();
    h.signed_in().await;

    let gate = h.store.hold_next(StoreOp::Create);
    let (created, ()) = tokio::join!(h.runtime.create_entry(draft(40, "Fuel")), async {
        gate.entered().await;
        assert_eq!(h.runtime.entries().len(), 1);
        h.runtime.log_out().await.unwrap();
        assert!(h.runtime.entries().is_empty());
        gate.release();
    });

    assert!(matches!(
        created,
        Err(RuntimeError::Sync(SyncError::SessionChanged))
    ));
    let ledger = h.runtime.ledger();
    assert!(ledger.entries.is_empty());
    assert_eq!(ledger.total, Decimal::ZERO);
    assert_eq!(h.runtime.session().status, SessionStatus::Anonymous);
    assert!(!h.credentials.has_session().unwrap());
}

#[tokio::test]
async fn test_restart_restores_session_and_ledger() {
    let h = Harness::new();
    h.signed_in().await;
    h.runtime.create_entry(draft(25, "Cinema")).await.unwrap();
    h.runtime.shutdown();

    let restarted = h.restarted();
    let session = restarted.start().await.unwrap();
    assert_eq!(session.status, SessionStatus::Authenticated);
    assert_eq!(restarted.total(), Decimal::from(25));
}

#[tokio::test]
async fn test_start_without_stored_session() {
    let h = Harness::new();
    let session = h.runtime.start().await.unwrap();
    assert_eq!(session.status, SessionStatus::Anonymous);
    assert_eq!(h.store.calls(StoreOp::List), 0);
}

#[tokio::test]
async fn test_signup_then_resend_verification() {
    let h = Harness::new();
    let session = h
        .runtime
        .sign_up(EMAIL, PASSWORD, PASSWORD)
        .await
        .unwrap();
    assert_eq!(session.status, SessionStatus::AwaitingVerification);

    assert_eq!(
        h.runtime.send_verification_email().await.unwrap(),
        VerificationEmail::Sent
    );
}

#[tokio::test]
async fn test_password_reset_message_is_uniform() {
    let h = Harness::new();
    h.provider.add_account(EMAIL, PASSWORD, true);

    let known = h.runtime.request_password_reset(EMAIL).await.unwrap();
    let unknown = h
        .runtime
        .request_password_reset("nobody@example.com")
        .await
        .unwrap();
    assert_eq!(known, PASSWORD_RESET_NOTICE);
    assert_eq!(unknown, PASSWORD_RESET_NOTICE);
}

#[tokio::test]
async fn test_export_lists_visible_entries() {
    let h = Harness::new();
    let user_id = h.provider.add_account(EMAIL, PASSWORD, true);
    h.store
        .seed(&user_id, vec![record("a", 50, 0), record("b", 30, 1)]);
    h.runtime.log_in(EMAIL, PASSWORD).await.unwrap();

    let csv = h.runtime.export_csv();
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0], crate::CSV_HEADER);
    assert!(lines[1].starts_with("30,record b,Food,"));
    assert!(lines[2].starts_with("50,record a,Food,"));
}
