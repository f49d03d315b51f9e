mod common;

use assert_matches::assert_matches;
use booking_checkout_api::{
    entities::{BookingStatus, PaymentStatus},
    repositories::WebhookEventLedger,
    services::{
        webhook_reconciliation::{OUTCOME_IGNORED, OUTCOME_RECONCILE},
        AlertSeverity, WebhookError,
    },
    webhooks::{signature_header, SignatureError},
};
use chrono::Utc;
use common::*;
use futures::future::join_all;

#[tokio::test]
async fn concurrent_duplicate_deliveries_apply_once() {
    let app = TestApp::new().await;
    let booking = app.seed_in_progress_booking().await;
    let reference = booking.payment_reference.clone().unwrap();
    let (body, header) = signed_event(
        "evt_concurrent",
        "payment_intent.succeeded",
        &reference,
        AUTHORIZED_AMOUNT,
        Utc::now().timestamp(),
    );

    let receiver = app.state.services.webhooks.clone();
    let deliveries = (0..5).map(|_| receiver.handle(&body, Some(header.as_str())));
    let acks: Vec<_> = join_all(deliveries)
        .await
        .into_iter()
        .map(Result::unwrap)
        .collect();

    assert!(acks.iter().all(|ack| ack.received));
    assert_eq!(acks.iter().filter(|ack| !ack.duplicate).count(), 1);

    let recorded = app.ledger.find("evt_concurrent").await.unwrap().unwrap();
    assert_eq!(recorded.processing_outcome, OUTCOME_RECONCILE);

    let stored = app.booking(booking.id).await;
    assert_eq!(stored.booking_status(), Some(BookingStatus::Completed));
    assert_eq!(stored.amount_captured, Some(AUTHORIZED_AMOUNT));
}

#[tokio::test]
async fn stale_event_is_rejected_and_not_recorded() {
    let app = TestApp::new().await;
    let (body, header) = signed_event(
        "evt_stale",
        "payment_intent.succeeded",
        "pi_unknown",
        100,
        Utc::now().timestamp() - 600,
    );

    let err = app
        .state
        .services
        .webhooks
        .handle(&body, Some(header.as_str()))
        .await
        .unwrap_err();

    assert_matches!(err, WebhookError::StaleTimestamp { .. });
    assert!(app.ledger.find("evt_stale").await.unwrap().is_none());
}

#[tokio::test]
async fn invalid_signature_is_rejected_and_not_recorded() {
    let app = TestApp::new().await;
    let (body, _) = signed_event(
        "evt_forged",
        "payment_intent.succeeded",
        "pi_unknown",
        100,
        Utc::now().timestamp(),
    );
    let forged = signature_header("whsec_someone_else", Utc::now().timestamp(), &body).unwrap();

    let err = app
        .state
        .services
        .webhooks
        .handle(&body, Some(forged.as_str()))
        .await
        .unwrap_err();

    assert_matches!(err, WebhookError::InvalidSignature(SignatureError::Mismatch));
    assert!(app.ledger.find("evt_forged").await.unwrap().is_none());
}

#[tokio::test]
async fn missing_signature_is_rejected() {
    let app = TestApp::new().await;
    let (body, _) = signed_event(
        "evt_unsigned",
        "payment_intent.succeeded",
        "pi_unknown",
        100,
        Utc::now().timestamp(),
    );

    let err = app
        .state
        .services
        .webhooks
        .handle(&body, None)
        .await
        .unwrap_err();
    assert_matches!(err, WebhookError::MissingSignature);
}

#[tokio::test]
async fn unhandled_event_type_is_recorded_as_ignored() {
    let app = TestApp::new().await;
    let (body, header) = signed_event(
        "evt_refund",
        "charge.refunded",
        "pi_unknown",
        100,
        Utc::now().timestamp(),
    );

    let ack = app
        .state
        .services
        .webhooks
        .handle(&body, Some(header.as_str()))
        .await
        .unwrap();

    assert!(!ack.duplicate);
    let recorded = app.ledger.find("evt_refund").await.unwrap().unwrap();
    assert_eq!(recorded.processing_outcome, OUTCOME_IGNORED);
    assert_eq!(recorded.event_type, "charge.refunded");
}

#[tokio::test]
async fn webhook_after_check_out_leaves_booking_untouched() {
    let app = TestApp::new().await;
    let booking = app.seed_in_progress_booking().await;
    let reference = booking.payment_reference.clone().unwrap();

    app.state
        .services
        .checkout
        .check_out(
            booking.id,
            booking_checkout_api::services::CheckOutRequest {
                location: booking_checkout_api::services::GeoPoint::new(51.5072, -0.1276),
                completion_notes: None,
            },
        )
        .await
        .unwrap();
    let completed = app.booking(booking.id).await;

    let (body, header) = signed_event(
        "evt_after_checkout",
        "payment_intent.succeeded",
        &reference,
        1,
        Utc::now().timestamp(),
    );
    let ack = app
        .state
        .services
        .webhooks
        .handle(&body, Some(header.as_str()))
        .await
        .unwrap();

    assert!(!ack.duplicate);
    let stored = app.booking(booking.id).await;
    assert_eq!(stored.amount_captured, completed.amount_captured);
    assert_eq!(stored.checked_out_at, completed.checked_out_at);
    assert_eq!(stored.payment_status, Some(PaymentStatus::Captured.to_string()));
}

#[tokio::test]
async fn payment_failure_for_in_progress_booking_alerts_admins() {
    let app = TestApp::new().await;
    let booking = app.seed_in_progress_booking().await;
    let reference = booking.payment_reference.clone().unwrap();
    let (body, header) = signed_event(
        "evt_failed",
        "payment_intent.payment_failed",
        &reference,
        0,
        Utc::now().timestamp(),
    );

    app.state
        .services
        .webhooks
        .handle(&body, Some(header.as_str()))
        .await
        .unwrap();

    let alerts = app.notifier.alerts();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].severity, AlertSeverity::High);
    assert_eq!(alerts[0].booking_id, Some(booking.id));
    assert_eq!(
        app.booking(booking.id).await.booking_status(),
        Some(BookingStatus::InProgress)
    );
}

#[tokio::test]
async fn purge_removes_only_replayed_events() {
    let app = TestApp::new().await;
    for event_id in ["evt_replay_1", "evt_replay_2", "evt_live_1"] {
        let (body, header) =
            signed_event(event_id, "charge.refunded", "pi_x", 1, Utc::now().timestamp());
        app.state
            .services
            .webhooks
            .handle(&body, Some(header.as_str()))
            .await
            .unwrap();
    }

    assert_eq!(app.ledger.purge_by_prefix("evt_replay_").await.unwrap(), 2);
    assert!(app.ledger.find("evt_live_1").await.unwrap().is_some());
}
