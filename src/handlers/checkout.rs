use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    routing::post,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::Instrument;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    entities::booking::Model as BookingModel,
    errors::CheckoutError,
    services::{CheckOutRequest, VerificationResult},
    tracing::{current_request_id, scope_request_id},
    AppState,
};

/// Booking as returned after check-out.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BookingView {
    pub id: Uuid,
    pub status: String,
    pub professional_id: Uuid,
    pub customer_id: Uuid,
    pub checked_in_at: Option<DateTime<Utc>>,
    pub checked_out_at: Option<DateTime<Utc>>,
    pub actual_duration_minutes: Option<i32>,
    pub amount_authorized: i64,
    pub amount_captured: Option<i64>,
    pub currency: String,
    pub payment_status: Option<String>,
    pub completion_notes: Option<String>,
}

impl From<BookingModel> for BookingView {
    fn from(model: BookingModel) -> Self {
        Self {
            id: model.id,
            status: model.status,
            professional_id: model.professional_id,
            customer_id: model.customer_id,
            checked_in_at: model.checked_in_at,
            checked_out_at: model.checked_out_at,
            actual_duration_minutes: model.actual_duration_minutes,
            amount_authorized: model.amount_authorized,
            amount_captured: model.amount_captured,
            currency: model.currency,
            payment_status: model.payment_status,
            completion_notes: model.completion_notes,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CheckOutResponse {
    pub success: bool,
    pub booking: BookingView,
    pub gps_verification: VerificationResult,
}

pub fn checkout_routes() -> Router<AppState> {
    Router::new().route("/bookings/:id/check-out", post(check_out_booking))
}

/// Complete a booking: capture the authorized payment and record the check-out
#[utoipa::path(
    post,
    path = "/api/v1/bookings/{id}/check-out",
    params(("id" = Uuid, Path, description = "Booking ID")),
    request_body = CheckOutRequest,
    responses(
        (status = 200, description = "Payment captured and booking completed", body = CheckOutResponse),
        (status = 400, description = "Booking is not eligible for check-out", body = crate::errors::CheckoutFailure),
        (status = 404, description = "Booking not found", body = crate::errors::CheckoutFailure),
        (status = 402, description = "Payment capture failed", body = crate::errors::CheckoutFailure),
        (status = 500, description = "Payment captured but completion could not be recorded", body = crate::errors::CheckoutFailure)
    ),
    tag = "Bookings"
)]
pub async fn check_out_booking(
    State(state): State<AppState>,
    path: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<CheckOutRequest>, JsonRejection>,
) -> Result<Json<CheckOutResponse>, CheckoutError> {
    let Path(id) = path.map_err(|e| CheckoutError::Validation(e.body_text()))?;
    let Json(request) = body.map_err(|e| CheckoutError::Validation(e.body_text()))?;
    let orchestrator = state.services.checkout.clone();
    let request_id = current_request_id().unwrap_or_default();

    // Once capture starts the workflow must finish even if the client goes away,
    // so it runs on its own task.
    let task = tokio::spawn(
        scope_request_id(request_id, async move {
            orchestrator.check_out(id, request).await
        })
        .in_current_span(),
    );

    let outcome = task
        .await
        .map_err(|e| CheckoutError::Internal(format!("check-out task failed: {}", e)))??;

    Ok(Json(CheckOutResponse {
        success: true,
        booking: outcome.booking.into(),
        gps_verification: outcome.gps_verification,
    }))
}
