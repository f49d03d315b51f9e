//! Check-out workflow services and their outbound collaborators.

pub mod checkout;
pub mod completion_effects;
pub mod completion_writer;
pub mod geolocation;
pub mod notifications;
pub mod payment_capture;
pub mod webhook_reconciliation;

pub use checkout::{CheckOutOutcome, CheckOutRequest, CheckoutOrchestrator};
pub use completion_effects::PostCompletionEffects;
pub use completion_writer::{CompletedBooking, CompletionWriter, PersistenceError};
pub use geolocation::{GeoPoint, GpsProximityVerifier, VerificationResult};
pub use notifications::{AdminAlert, AlertSeverity, Notifier};
pub use payment_capture::{CaptureError, PaymentCaptureGateway, PaymentProcessor};
pub use webhook_reconciliation::{WebhookAck, WebhookError, WebhookReceiver};
