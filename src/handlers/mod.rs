pub mod checkout;
pub mod health;
pub mod payment_webhooks;

use sea_orm::DatabaseConnection;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::errors::ServiceError;
use crate::repositories::{
    BookingRepository, BookingStore, EarningsRepository, EarningsStore, PartyDirectory,
    ProfileRepository, RebookAssignmentRepository, RebookAssignmentStore, WebhookEventLedger,
    WebhookEventRepository,
};
use crate::services::{
    geolocation::{AddressResolver, HttpGeocoder},
    notifications::{HttpNotifier, Notifier},
    payment_capture::{PaymentProcessor, StripeProcessor},
    CheckoutOrchestrator, CompletionWriter, GpsProximityVerifier, PaymentCaptureGateway,
    PostCompletionEffects, WebhookReceiver,
};

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Stores and outbound clients the services are built from. Tests swap
/// individual entries for fakes.
#[derive(Clone)]
pub struct Collaborators {
    pub bookings: Arc<dyn BookingStore>,
    pub ledger: Arc<dyn WebhookEventLedger>,
    pub parties: Arc<dyn PartyDirectory>,
    pub earnings: Arc<dyn EarningsStore>,
    pub rebook: Arc<dyn RebookAssignmentStore>,
    pub processor: Arc<dyn PaymentProcessor>,
    pub notifier: Arc<dyn Notifier>,
    pub resolver: Arc<dyn AddressResolver>,
}

impl Collaborators {
    /// Database-backed stores plus HTTP clients for the processor, geocoder and notifier.
    pub fn from_config(
        db: Arc<DatabaseConnection>,
        config: &AppConfig,
    ) -> Result<Self, ServiceError> {
        let timeout = config.processor_timeout();
        let processor = StripeProcessor::new(
            config.processor.base_url.clone(),
            config.processor.secret_key.clone(),
            timeout,
        )
        .map_err(|e| ServiceError::InternalError(e.to_string()))?;
        let geocoder = HttpGeocoder::new(config.checkout.geocoder_url.clone(), timeout)
            .map_err(|e| ServiceError::InternalError(e.to_string()))?;
        let notifier = HttpNotifier::new(config.notifications.clone(), timeout)
            .map_err(|e| ServiceError::InternalError(e.to_string()))?;

        Ok(Self {
            bookings: Arc::new(BookingRepository::new(db.clone())),
            ledger: Arc::new(WebhookEventRepository::new(db.clone())),
            parties: Arc::new(ProfileRepository::new(db.clone())),
            earnings: Arc::new(EarningsRepository::new(db.clone())),
            rebook: Arc::new(RebookAssignmentRepository::new(db)),
            processor: Arc::new(processor),
            notifier: Arc::new(notifier),
            resolver: Arc::new(geocoder),
        })
    }
}

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub checkout: Arc<CheckoutOrchestrator>,
    pub webhooks: Arc<WebhookReceiver>,
}

impl AppServices {
    pub fn new(collaborators: Collaborators, config: &AppConfig) -> Self {
        let Collaborators {
            bookings,
            ledger,
            parties,
            earnings,
            rebook,
            processor,
            notifier,
            resolver,
        } = collaborators;

        let writer = CompletionWriter::new(
            bookings.clone(),
            notifier.clone(),
            config.persistence_retry(),
        );
        let effects = PostCompletionEffects::new(
            earnings,
            rebook,
            parties.clone(),
            notifier.clone(),
            config.checkout.rebook_experiment_enabled,
        );
        let verifier = GpsProximityVerifier::new(resolver, config.checkout.gps_max_distance_meters);
        let gateway = PaymentCaptureGateway::new(processor, notifier.clone(), parties);

        let checkout = CheckoutOrchestrator::new(
            bookings.clone(),
            verifier,
            gateway,
            writer.clone(),
            effects.clone(),
        );
        let webhooks = WebhookReceiver::new(
            ledger,
            bookings,
            writer,
            effects,
            notifier,
            config.payment_webhook_secret.clone(),
            config.payment_webhook_tolerance_secs,
        );

        Self {
            checkout: Arc::new(checkout),
            webhooks: Arc::new(webhooks),
        }
    }
}
