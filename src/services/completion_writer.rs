use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::entities::booking::Model as BookingModel;
use crate::metrics::{self, CHECKOUT_PERSISTENCE_CRITICAL};
use crate::middleware_helpers::retry::{with_retry, DbRetryPolicy, RetryConfig};
use crate::repositories::{BookingStore, CompletionFields, CompletionWrite};
use crate::services::notifications::{AdminAlert, AlertSeverity, Notifier};

pub const CRITICAL_ALERT_TITLE: &str = "payment captured but booking not marked complete";

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("completion write failed after {attempts} attempts: {last_error}")]
    Exhausted { attempts: u32, last_error: String },

    #[error("booking {0} disappeared before completion could be written")]
    BookingMissing(Uuid),
}

/// Booking state after a completion write.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedBooking {
    pub booking: BookingModel,
    /// False when another path had already completed the booking.
    pub newly_completed: bool,
}

/// Writes the final booking state after a successful capture, retrying
/// transient storage failures and escalating when they persist.
#[derive(Clone)]
pub struct CompletionWriter {
    store: Arc<dyn BookingStore>,
    notifier: Arc<dyn Notifier>,
    retry: RetryConfig,
}

impl CompletionWriter {
    pub fn new(store: Arc<dyn BookingStore>, notifier: Arc<dyn Notifier>, retry: RetryConfig) -> Self {
        Self {
            store,
            notifier,
            retry,
        }
    }

    /// Marks the booking completed. A booking already completed by the other
    /// path is returned unchanged.
    #[instrument(skip(self, completion), fields(amount_captured = completion.amount_captured))]
    pub async fn write_completion(
        &self,
        booking_id: Uuid,
        payment_reference: &str,
        completion: CompletionFields,
    ) -> Result<CompletedBooking, PersistenceError> {
        let store = self.store.clone();
        let outcome = with_retry(&self.retry, DbRetryPolicy, |attempt| {
            let store = store.clone();
            let fields = completion.clone();
            async move {
                if attempt > 1 {
                    info!(%booking_id, attempt, "retrying booking completion write");
                }
                store.complete(booking_id, &fields).await
            }
        })
        .await;

        match outcome {
            Ok(CompletionWrite::Completed(booking)) => Ok(CompletedBooking {
                booking,
                newly_completed: true,
            }),
            Ok(CompletionWrite::AlreadyCompleted(booking)) => {
                info!(%booking_id, "booking already completed; leaving existing record");
                Ok(CompletedBooking {
                    booking,
                    newly_completed: false,
                })
            }
            Ok(CompletionWrite::Missing) => {
                let err = PersistenceError::BookingMissing(booking_id);
                self.escalate(booking_id, payment_reference, &completion, 1, &err)
                    .await;
                Err(err)
            }
            Err(failure) => {
                let err = PersistenceError::Exhausted {
                    attempts: failure.attempts,
                    last_error: failure.error.to_string(),
                };
                self.escalate(booking_id, payment_reference, &completion, failure.attempts, &err)
                    .await;
                Err(err)
            }
        }
    }

    async fn escalate(
        &self,
        booking_id: Uuid,
        payment_reference: &str,
        fields: &CompletionFields,
        attempts: u32,
        err: &PersistenceError,
    ) {
        metrics::increment_counter(CHECKOUT_PERSISTENCE_CRITICAL);
        error!(
            severity = "critical",
            %booking_id,
            payment_reference,
            amount_captured = fields.amount_captured,
            checked_out_at = %fields.checked_out_at,
            attempts,
            error = %err,
            "payment captured but booking completion was not persisted; manual reconciliation required"
        );

        let alert = AdminAlert {
            severity: AlertSeverity::Critical,
            title: CRITICAL_ALERT_TITLE.to_string(),
            booking_id: Some(booking_id),
            message: format!(
                "Payment {} was captured ({} minor units) but booking {} could not be marked complete. Do not refund automatically; reconcile manually.",
                payment_reference, fields.amount_captured, booking_id
            ),
            context: json!({
                "booking_id": booking_id,
                "payment_reference": payment_reference,
                "amount_captured": fields.amount_captured,
                "checked_out_at": fields.checked_out_at,
                "actual_duration_minutes": fields.actual_duration_minutes,
                "attempts": attempts,
                "error": err.to_string(),
            }),
        };

        if let Err(notify_err) = self.notifier.notify_admins(alert).await {
            warn!(%booking_id, error = %notify_err, "critical persistence alert not delivered");
        }
    }
}
