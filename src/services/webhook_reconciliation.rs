use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use sea_orm::DbErr;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};
use utoipa::ToSchema;

use crate::entities::booking::Model as BookingModel;
use crate::entities::{BookingStatus, PaymentStatus};
use crate::metrics::{
    self, WEBHOOK_DUPLICATE, WEBHOOK_RECEIVED, WEBHOOK_RECONCILED, WEBHOOK_REJECTED,
};
use crate::repositories::{
    BookingStore, CompletionFields, LedgerInsert, NewWebhookEvent, WebhookEventLedger,
};
use crate::services::checkout::actual_duration_minutes;
use crate::services::completion_effects::PostCompletionEffects;
use crate::services::completion_writer::{CompletionWriter, PersistenceError};
use crate::services::notifications::{AdminAlert, AlertSeverity, Notifier};
use crate::webhooks::{SignatureError, SignatureHeader};

pub const EVENT_SUCCEEDED: &str = "payment_intent.succeeded";
pub const EVENT_PAYMENT_FAILED: &str = "payment_intent.payment_failed";
pub const EVENT_CANCELED: &str = "payment_intent.canceled";

pub const OUTCOME_RECONCILE: &str = "reconcile";
pub const OUTCOME_IGNORED: &str = "ignored";

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("missing signature header")]
    MissingSignature,

    #[error("invalid signature: {0}")]
    InvalidSignature(#[from] SignatureError),

    #[error("timestamp outside tolerance ({age_secs}s)")]
    StaleTimestamp { age_secs: i64 },

    #[error("malformed event payload: {0}")]
    MalformedPayload(String),

    #[error("failed to record event: {0}")]
    Ledger(#[source] DbErr),
}

impl WebhookError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Ledger(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

/// Acknowledgement returned to the processor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct WebhookAck {
    pub received: bool,
    /// True when this event id had already been recorded
    pub duplicate: bool,
    pub event_id: String,
}

#[derive(Debug, Deserialize)]
struct ProcessorEvent {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    data: EventData,
}

#[derive(Debug, Default, Deserialize)]
struct EventData {
    #[serde(default)]
    object: Value,
}

impl ProcessorEvent {
    fn payment_reference(&self) -> Option<&str> {
        self.data.object.get("id").and_then(Value::as_str)
    }

    fn amount_received(&self) -> Option<i64> {
        self.data.object.get("amount_received").and_then(Value::as_i64)
    }
}

#[derive(Debug, Error)]
enum ReconcileError {
    #[error("storage error: {0}")]
    Store(#[from] DbErr),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error("event has no payment intent id")]
    MissingReference,

    #[error("event has no amount_received")]
    MissingAmount,
}

/// Authenticates processor events, records each event id once and applies
/// the matching booking effect for the first delivery only.
#[derive(Clone)]
pub struct WebhookReceiver {
    ledger: Arc<dyn WebhookEventLedger>,
    bookings: Arc<dyn BookingStore>,
    writer: CompletionWriter,
    effects: PostCompletionEffects,
    notifier: Arc<dyn Notifier>,
    secret: String,
    tolerance_secs: i64,
}

impl WebhookReceiver {
    pub fn new(
        ledger: Arc<dyn WebhookEventLedger>,
        bookings: Arc<dyn BookingStore>,
        writer: CompletionWriter,
        effects: PostCompletionEffects,
        notifier: Arc<dyn Notifier>,
        secret: impl Into<String>,
        tolerance_secs: u64,
    ) -> Self {
        Self {
            ledger,
            bookings,
            writer,
            effects,
            notifier,
            secret: secret.into(),
            tolerance_secs: i64::try_from(tolerance_secs).unwrap_or(i64::MAX),
        }
    }

    pub async fn handle(
        &self,
        body: &[u8],
        signature: Option<&str>,
    ) -> Result<WebhookAck, WebhookError> {
        self.handle_at(body, signature, Utc::now()).await
    }

    #[instrument(skip(self, body, signature))]
    pub async fn handle_at(
        &self,
        body: &[u8],
        signature: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<WebhookAck, WebhookError> {
        let event = match self.authenticate(body, signature, now) {
            Ok(event) => event,
            Err(err) => {
                metrics::increment_counter(WEBHOOK_REJECTED);
                warn!(error = %err, "payment webhook rejected");
                return Err(err);
            }
        };
        metrics::increment_counter(WEBHOOK_RECEIVED);

        let outcome = match event.event_type.as_str() {
            EVENT_SUCCEEDED | EVENT_PAYMENT_FAILED | EVENT_CANCELED => OUTCOME_RECONCILE,
            _ => OUTCOME_IGNORED,
        };

        let payload = serde_json::from_slice(body).unwrap_or(Value::Null);
        let inserted = self
            .ledger
            .record(NewWebhookEvent {
                event_id: event.id.clone(),
                event_type: event.event_type.clone(),
                received_at: now,
                payload,
                processing_outcome: outcome.to_string(),
            })
            .await
            .map_err(|e| {
                error!(event_id = %event.id, error = %e, "failed to record webhook event");
                WebhookError::Ledger(e)
            })?;

        if inserted == LedgerInsert::Duplicate {
            metrics::increment_counter(WEBHOOK_DUPLICATE);
            info!(event_id = %event.id, "duplicate webhook delivery ignored");
            return Ok(WebhookAck {
                received: true,
                duplicate: true,
                event_id: event.id,
            });
        }

        if outcome == OUTCOME_RECONCILE {
            if let Err(err) = self.apply(&event, now).await {
                error!(
                    event_id = %event.id,
                    event_type = %event.event_type,
                    error = %err,
                    "webhook recorded but its effect could not be applied"
                );
            }
        } else {
            debug!(event_id = %event.id, event_type = %event.event_type, "event type ignored");
        }

        Ok(WebhookAck {
            received: true,
            duplicate: false,
            event_id: event.id,
        })
    }

    /// Signature first, then freshness, then payload shape.
    fn authenticate(
        &self,
        body: &[u8],
        signature: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<ProcessorEvent, WebhookError> {
        let header = signature
            .filter(|value| !value.trim().is_empty())
            .ok_or(WebhookError::MissingSignature)?;
        let header = SignatureHeader::parse(header)?;
        header.verify(&self.secret, body)?;

        check_freshness(now.timestamp(), header.timestamp, self.tolerance_secs)?;

        serde_json::from_slice(body).map_err(|e| WebhookError::MalformedPayload(e.to_string()))
    }

    async fn apply(&self, event: &ProcessorEvent, now: DateTime<Utc>) -> Result<(), ReconcileError> {
        let reference = event
            .payment_reference()
            .ok_or(ReconcileError::MissingReference)?;

        let Some(booking) = self.bookings.find_by_payment_reference(reference).await? else {
            info!(event_id = %event.id, payment_reference = reference, "no booking for payment intent");
            return Ok(());
        };

        match event.event_type.as_str() {
            EVENT_SUCCEEDED => self.reconcile_success(event, booking, reference, now).await,
            _ => {
                self.alert_payment_problem(event, &booking, reference).await;
                Ok(())
            }
        }
    }

    async fn reconcile_success(
        &self,
        event: &ProcessorEvent,
        booking: BookingModel,
        reference: &str,
        now: DateTime<Utc>,
    ) -> Result<(), ReconcileError> {
        let status = booking.booking_status();
        if status == Some(BookingStatus::Completed) {
            debug!(booking_id = %booking.id, "booking already completed");
            return Ok(());
        }

        let (Some(BookingStatus::InProgress), Some(checked_in_at)) = (status, booking.checked_in_at)
        else {
            info!(
                booking_id = %booking.id,
                status = %booking.status,
                "payment succeeded for a booking that is not checked in; leaving it"
            );
            return Ok(());
        };

        let amount = event.amount_received().ok_or(ReconcileError::MissingAmount)?;
        let completion = CompletionFields {
            checked_out_at: now,
            check_out_latitude: None,
            check_out_longitude: None,
            actual_duration_minutes: actual_duration_minutes(checked_in_at, now),
            amount_captured: amount,
            payment_status: PaymentStatus::Captured,
            completion_notes: None,
        };

        let written = self
            .writer
            .write_completion(booking.id, reference, completion)
            .await?;

        if written.newly_completed {
            metrics::increment_counter(WEBHOOK_RECONCILED);
            info!(booking_id = %booking.id, amount, "booking completed from payment webhook");
            self.effects.spawn(written.booking);
        }
        Ok(())
    }

    async fn alert_payment_problem(&self, event: &ProcessorEvent, booking: &BookingModel, reference: &str) {
        if booking.booking_status() != Some(BookingStatus::InProgress) {
            debug!(booking_id = %booking.id, "payment problem for a booking no longer in progress");
            return;
        }

        warn!(
            booking_id = %booking.id,
            payment_reference = reference,
            event_type = %event.event_type,
            "payment problem reported for an in-progress booking"
        );

        let alert = AdminAlert {
            severity: AlertSeverity::High,
            title: format!("{} for in-progress booking", event.event_type),
            booking_id: Some(booking.id),
            message: "The processor reported a payment problem while the service is still in progress."
                .to_string(),
            context: json!({
                "event_id": event.id,
                "payment_reference": reference,
                "amount_authorized": booking.amount_authorized,
                "processor_status": event.data.object.get("status"),
            }),
        };

        if let Err(err) = self.notifier.notify_admins(alert).await {
            warn!(booking_id = %booking.id, error = %err, "payment problem alert not delivered");
        }
    }
}

/// Rejects a signed timestamp further than `tolerance_secs` from `now_secs`
/// in either direction.
fn check_freshness(now_secs: i64, signed_at: i64, tolerance_secs: i64) -> Result<(), WebhookError> {
    let age_secs = now_secs.saturating_sub(signed_at);
    if age_secs.unsigned_abs() > tolerance_secs.unsigned_abs() {
        return Err(WebhookError::StaleTimestamp { age_secs });
    }
    Ok(())
}
