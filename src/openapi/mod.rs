use axum::{routing::get, Json, Router};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Booking Check-Out API",
        version = "0.1.0",
        description = r#"
# Booking Check-Out API

Completes household-service bookings: captures the authorized payment hold,
records the check-out and reconciles payment state from processor webhooks.

## Error Handling

Check-out failures use a classified body:

```json
{
  "success": false,
  "error": "payment could not be captured",
  "error_class": "capture_failed"
}
```

Rejected webhook deliveries return `{"received": false, "error": "..."}` with status 400.
        "#,
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "Bookings", description = "Booking check-out"),
        (name = "Payments", description = "Payment processor webhooks")
    ),
    paths(
        crate::handlers::checkout::check_out_booking,
        crate::handlers::payment_webhooks::payment_webhook,
    ),
    components(
        schemas(
            crate::handlers::checkout::BookingView,
            crate::handlers::checkout::CheckOutResponse,
            crate::services::CheckOutRequest,
            crate::services::GeoPoint,
            crate::services::VerificationResult,
            crate::services::WebhookAck,
            crate::errors::CheckoutFailure,
            crate::errors::ErrorClass,
            crate::errors::WebhookRejection,
            crate::errors::ErrorResponse
        )
    )
)]
pub struct ApiDocV1;

/// Serves the generated document at `/api-docs/openapi.json`.
pub fn openapi_routes<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new().route(
        "/api-docs/openapi.json",
        get(|| async { Json(ApiDocV1::openapi()) }),
    )
}
