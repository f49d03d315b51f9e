use axum::{extract::State, http::HeaderMap, routing::post, Json, Router};
use bytes::Bytes;

use crate::{
    services::{WebhookAck, WebhookError},
    webhooks::SIGNATURE_HEADER,
    AppState,
};

pub fn webhook_routes() -> Router<AppState> {
    Router::new().route("/payments/webhook", post(payment_webhook))
}

/// Receive a signed payment processor event
#[utoipa::path(
    post,
    path = "/api/v1/payments/webhook",
    request_body = String,
    params(("Stripe-Signature" = String, Header, description = "t={timestamp},v1={hmac}")),
    responses(
        (status = 200, description = "Event recorded, or already recorded", body = WebhookAck),
        (status = 400, description = "Signature or timestamp rejected", body = crate::errors::WebhookRejection)
    ),
    tag = "Payments"
)]
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, WebhookError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    let ack = state.services.webhooks.handle(&body, signature).await?;
    Ok(Json(ack))
}
