use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::entities::booking::Model as BookingModel;
use crate::metrics::{self, CAPTURE_DURATION, CHECKOUT_CAPTURE_FAILED};
use crate::repositories::PartyDirectory;
use crate::services::notifications::{AdminAlert, AlertSeverity, Notifier};

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("payment declined: {0}")]
    Declined(String),

    #[error("capture rejected by processor: {0}")]
    Rejected(String),

    #[error("payment processor unavailable: {0}")]
    Unavailable(String),

    #[error("unexpected processor response: {0}")]
    InvalidResponse(String),

    #[error("invalid capture amount {0}")]
    InvalidAmount(i64),
}

/// Processor confirmation of a capture.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CaptureReceipt {
    #[serde(rename = "id")]
    pub payment_reference: String,
    pub status: String,
    /// Amount actually charged, in minor units
    pub amount_received: i64,
    pub currency: String,
}

#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    /// Captures `amount` of the authorized hold on `payment_reference`.
    /// The processor deduplicates calls that share `idempotency_key`.
    async fn capture(
        &self,
        payment_reference: &str,
        amount: i64,
        idempotency_key: &str,
    ) -> Result<CaptureReceipt, CaptureError>;
}

#[derive(Debug, Deserialize)]
struct ProcessorErrorBody {
    error: ProcessorErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ProcessorErrorDetail {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    decline_code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Client for a Stripe-compatible `payment_intents/{id}/capture` endpoint.
#[derive(Clone)]
pub struct StripeProcessor {
    client: reqwest::Client,
    base_url: String,
    secret_key: String,
}

impl StripeProcessor {
    pub fn new(
        base_url: impl Into<String>,
        secret_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, CaptureError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CaptureError::Unavailable(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            secret_key: secret_key.into(),
        })
    }

    fn translate_error(status: reqwest::StatusCode, body: &str) -> CaptureError {
        if status.is_server_error() {
            return CaptureError::Unavailable(format!("processor returned {}", status));
        }

        match serde_json::from_str::<ProcessorErrorBody>(body) {
            Ok(ProcessorErrorBody { error: detail }) => {
                let message = detail
                    .message
                    .clone()
                    .or_else(|| detail.code.clone())
                    .unwrap_or_else(|| status.to_string());
                let declined = detail.kind.as_deref() == Some("card_error")
                    || detail.decline_code.is_some()
                    || detail.code.as_deref() == Some("card_declined");
                if declined {
                    CaptureError::Declined(message)
                } else {
                    CaptureError::Rejected(message)
                }
            }
            Err(_) => CaptureError::Rejected(format!("processor returned {}", status)),
        }
    }
}

#[async_trait]
impl PaymentProcessor for StripeProcessor {
    #[instrument(skip(self, idempotency_key))]
    async fn capture(
        &self,
        payment_reference: &str,
        amount: i64,
        idempotency_key: &str,
    ) -> Result<CaptureReceipt, CaptureError> {
        let url = format!(
            "{}/v1/payment_intents/{}/capture",
            self.base_url, payment_reference
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.secret_key)
            .header("Idempotency-Key", idempotency_key)
            .form(&[("amount_to_capture", amount.to_string())])
            .send()
            .await
            .map_err(|e| CaptureError::Unavailable(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| CaptureError::Unavailable(e.to_string()))?;

        if !status.is_success() {
            return Err(Self::translate_error(status, &body));
        }

        let receipt: CaptureReceipt = serde_json::from_str(&body)
            .map_err(|e| CaptureError::InvalidResponse(e.to_string()))?;
        if receipt.status != "succeeded" {
            return Err(CaptureError::Rejected(format!(
                "payment intent is {}",
                receipt.status
            )));
        }
        Ok(receipt)
    }
}

/// Idempotency key shared by every capture attempt for a booking's check-out.
pub fn idempotency_key(booking_id: Uuid) -> String {
    format!("booking-{}-checkout-capture", booking_id)
}

/// Successful capture as seen by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedPayment {
    pub captured_amount: i64,
    pub receipt: CaptureReceipt,
}

/// Wraps the processor capture with amount checks, the per-booking
/// idempotency key and operator alerting. Never retries.
#[derive(Clone)]
pub struct PaymentCaptureGateway {
    processor: Arc<dyn PaymentProcessor>,
    notifier: Arc<dyn Notifier>,
    parties: Arc<dyn PartyDirectory>,
}

impl PaymentCaptureGateway {
    pub fn new(
        processor: Arc<dyn PaymentProcessor>,
        notifier: Arc<dyn Notifier>,
        parties: Arc<dyn PartyDirectory>,
    ) -> Self {
        Self {
            processor,
            notifier,
            parties,
        }
    }

    #[instrument(skip(self, booking), fields(booking_id = %booking.id))]
    pub async fn capture(
        &self,
        booking: &BookingModel,
        payment_reference: &str,
        amount: i64,
    ) -> Result<CapturedPayment, CaptureError> {
        let result = self.try_capture(booking, payment_reference, amount).await;

        match &result {
            Ok(captured) => info!(
                booking_id = %booking.id,
                payment_reference,
                captured_amount = captured.captured_amount,
                "payment captured"
            ),
            Err(err) => {
                metrics::increment_counter(CHECKOUT_CAPTURE_FAILED);
                error!(
                    booking_id = %booking.id,
                    payment_reference,
                    amount,
                    severity = "critical",
                    error = %err,
                    "payment capture failed"
                );
                self.alert_capture_failure(booking, payment_reference, amount, err)
                    .await;
            }
        }

        result
    }

    async fn try_capture(
        &self,
        booking: &BookingModel,
        payment_reference: &str,
        amount: i64,
    ) -> Result<CapturedPayment, CaptureError> {
        let within_hold = booking
            .capturable_amount()
            .is_some_and(|limit| amount <= limit);
        if amount <= 0 || !within_hold {
            return Err(CaptureError::InvalidAmount(amount));
        }

        let key = idempotency_key(booking.id);
        let started = Instant::now();
        let receipt = self
            .processor
            .capture(payment_reference, amount, &key)
            .await;
        metrics::observe_duration(CAPTURE_DURATION, started.elapsed());

        let receipt = receipt?;
        Ok(CapturedPayment {
            captured_amount: receipt.amount_received,
            receipt,
        })
    }

    async fn party_name(&self, id: Uuid) -> String {
        match self.parties.find_profile(id).await {
            Ok(Some(profile)) => profile.full_name,
            Ok(None) => "unknown".to_string(),
            Err(err) => {
                warn!(party_id = %id, error = %err, "could not load party profile for alert");
                "unknown".to_string()
            }
        }
    }

    async fn alert_capture_failure(
        &self,
        booking: &BookingModel,
        payment_reference: &str,
        amount: i64,
        err: &CaptureError,
    ) {
        let customer = self.party_name(booking.customer_id).await;
        let professional = self.party_name(booking.professional_id).await;

        let alert = AdminAlert {
            severity: AlertSeverity::High,
            title: "payment capture failed at check-out".to_string(),
            booking_id: Some(booking.id),
            message: err.to_string(),
            context: json!({
                "booking_id": booking.id,
                "payment_reference": payment_reference,
                "attempted_amount": amount,
                "currency": booking.currency,
                "customer_name": customer,
                "professional_name": professional,
            }),
        };

        if let Err(notify_err) = self.notifier.notify_admins(alert).await {
            warn!(booking_id = %booking.id, error = %notify_err, "capture failure alert not delivered");
        }
    }
}
