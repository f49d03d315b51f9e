use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::entities::booking::Model as BookingModel;
use crate::entities::{BookingStatus, PaymentStatus};
use crate::errors::CheckoutError;
use crate::metrics::{self, CHECKOUT_COMPLETED, CHECKOUT_INTERNAL_ERRORS, CHECKOUT_REJECTED};
use crate::repositories::{BookingStore, CompletionFields};
use crate::services::completion_effects::PostCompletionEffects;
use crate::services::completion_writer::CompletionWriter;
use crate::services::geolocation::{GeoPoint, GpsProximityVerifier, VerificationResult};
use crate::services::payment_capture::PaymentCaptureGateway;

/// Check-out request submitted by the professional.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CheckOutRequest {
    /// Where the professional is when checking out
    pub location: GeoPoint,
    #[validate(length(max = 2000))]
    pub completion_notes: Option<String>,
}

/// Result of a completed check-out.
#[derive(Debug, Clone)]
pub struct CheckOutOutcome {
    pub booking: BookingModel,
    pub gps_verification: VerificationResult,
    pub captured_amount: i64,
}

/// Whole minutes between check-in and check-out, rounded to nearest.
pub fn actual_duration_minutes(checked_in_at: DateTime<Utc>, checked_out_at: DateTime<Utc>) -> i32 {
    let millis = (checked_out_at - checked_in_at).num_milliseconds().max(0);
    (millis as f64 / 60_000.0).round() as i32
}

/// Runs a booking check-out: preconditions, advisory location check,
/// payment capture, completion write, then background effects.
#[derive(Clone)]
pub struct CheckoutOrchestrator {
    bookings: Arc<dyn BookingStore>,
    verifier: GpsProximityVerifier,
    gateway: PaymentCaptureGateway,
    writer: CompletionWriter,
    effects: PostCompletionEffects,
}

impl CheckoutOrchestrator {
    pub fn new(
        bookings: Arc<dyn BookingStore>,
        verifier: GpsProximityVerifier,
        gateway: PaymentCaptureGateway,
        writer: CompletionWriter,
        effects: PostCompletionEffects,
    ) -> Self {
        Self {
            bookings,
            verifier,
            gateway,
            writer,
            effects,
        }
    }

    pub async fn check_out(
        &self,
        booking_id: Uuid,
        request: CheckOutRequest,
    ) -> Result<CheckOutOutcome, CheckoutError> {
        self.check_out_at(booking_id, request, Utc::now()).await
    }

    #[instrument(skip(self, request))]
    pub async fn check_out_at(
        &self,
        booking_id: Uuid,
        request: CheckOutRequest,
        now: DateTime<Utc>,
    ) -> Result<CheckOutOutcome, CheckoutError> {
        let result = self.run(booking_id, request, now).await;

        match &result {
            Ok(outcome) => {
                metrics::increment_counter(CHECKOUT_COMPLETED);
                info!(
                    %booking_id,
                    captured_amount = outcome.captured_amount,
                    gps_verified = outcome.gps_verification.verified,
                    "check-out completed"
                );
            }
            Err(err @ (CheckoutError::Validation(_) | CheckoutError::NotFound(_))) => {
                metrics::increment_counter(CHECKOUT_REJECTED);
                warn!(%booking_id, error = %err, "check-out rejected");
            }
            Err(err @ CheckoutError::Internal(_)) => {
                metrics::increment_counter(CHECKOUT_INTERNAL_ERRORS);
                error!(%booking_id, error = %err, "check-out failed on a storage error");
            }
            // Capture and persistence failures are logged where they happen.
            Err(_) => {}
        }

        result
    }

    async fn run(
        &self,
        booking_id: Uuid,
        request: CheckOutRequest,
        now: DateTime<Utc>,
    ) -> Result<CheckOutOutcome, CheckoutError> {
        request
            .validate()
            .map_err(|e| CheckoutError::Validation(e.to_string()))?;

        let booking = self
            .bookings
            .find_by_id(booking_id)
            .await?
            .ok_or(CheckoutError::NotFound(booking_id))?;

        let (checked_in_at, payment_reference) = preconditions(&booking)?;
        let actual_duration = actual_duration_minutes(checked_in_at, now);

        let gps_verification = self.verifier.verify_booking(&booking, request.location).await;

        let captured = self
            .gateway
            .capture(
                &booking,
                &payment_reference,
                booking.capturable_amount().unwrap_or_default(),
            )
            .await
            .map_err(CheckoutError::CaptureFailed)?;

        let location = request.location.is_valid().then_some(request.location);
        let completion = CompletionFields {
            checked_out_at: now,
            check_out_latitude: location.map(|p| p.latitude),
            check_out_longitude: location.map(|p| p.longitude),
            actual_duration_minutes: actual_duration,
            amount_captured: captured.captured_amount,
            payment_status: PaymentStatus::Captured,
            completion_notes: request.completion_notes,
        };

        let written = self
            .writer
            .write_completion(booking.id, &payment_reference, completion)
            .await
            .map_err(CheckoutError::PersistenceAfterCapture)?;

        if written.newly_completed {
            self.effects.spawn(written.booking.clone());
        }

        Ok(CheckOutOutcome {
            booking: written.booking,
            gps_verification,
            captured_amount: captured.captured_amount,
        })
    }
}

/// Ordered check-out preconditions. Returns the check-in time and payment reference.
fn preconditions(booking: &BookingModel) -> Result<(DateTime<Utc>, String), CheckoutError> {
    if booking.booking_status() != Some(BookingStatus::InProgress) {
        return Err(CheckoutError::Validation(format!(
            "cannot check out of booking with status {}",
            booking.status
        )));
    }

    let checked_in_at = booking.checked_in_at.ok_or_else(|| {
        CheckoutError::Validation("cannot check out without checking in".to_string())
    })?;

    let payment_reference = booking
        .payment_reference
        .clone()
        .filter(|reference| !reference.trim().is_empty())
        .ok_or_else(|| CheckoutError::Validation("no payment intent found".to_string()))?;

    Ok((checked_in_at, payment_reference))
}
