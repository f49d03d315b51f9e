use sha2::{Digest, Sha256};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn, Instrument};
use uuid::Uuid;

use crate::entities::booking::Model as BookingModel;
use crate::entities::profile::Model as ProfileModel;
use crate::metrics::{self, SIDE_EFFECT_FAILURES};
use crate::repositories::{EarningsStore, PartyDirectory, RebookAssignmentStore};
use crate::services::notifications::{EmailMessage, Notifier, PushMessage};

pub const VARIANT_CONTROL: &str = "control";
pub const VARIANT_NUDGE: &str = "nudge";

/// Deterministic experiment bucket for a customer.
pub fn rebook_variant(customer_id: Uuid) -> &'static str {
    let digest = Sha256::digest(customer_id.as_bytes());
    if digest[0] % 2 == 0 {
        VARIANT_CONTROL
    } else {
        VARIANT_NUDGE
    }
}

fn format_amount(minor_units: i64, currency: &str) -> String {
    format!(
        "{}.{:02} {}",
        minor_units / 100,
        (minor_units % 100).abs(),
        currency.to_uppercase()
    )
}

/// Best-effort work that follows a completed check-out. Every failure is
/// logged and counted, none is returned.
#[derive(Clone)]
pub struct PostCompletionEffects {
    earnings: Arc<dyn EarningsStore>,
    rebook: Arc<dyn RebookAssignmentStore>,
    parties: Arc<dyn PartyDirectory>,
    notifier: Arc<dyn Notifier>,
    rebook_experiment_enabled: bool,
}

impl PostCompletionEffects {
    pub fn new(
        earnings: Arc<dyn EarningsStore>,
        rebook: Arc<dyn RebookAssignmentStore>,
        parties: Arc<dyn PartyDirectory>,
        notifier: Arc<dyn Notifier>,
        rebook_experiment_enabled: bool,
    ) -> Self {
        Self {
            earnings,
            rebook,
            parties,
            notifier,
            rebook_experiment_enabled,
        }
    }

    /// Runs the effects on a background task.
    pub fn spawn(&self, booking: BookingModel) -> JoinHandle<()> {
        let effects = self.clone();
        let span = tracing::info_span!("post_completion", booking_id = %booking.id);
        tokio::spawn(async move { effects.run(&booking).await }.instrument(span))
    }

    pub async fn run(&self, booking: &BookingModel) {
        self.update_earnings(booking).await;
        self.assign_rebook_variant(booking).await;
        self.notify_parties(booking).await;
    }

    fn record_failure(booking_id: Uuid, effect: &str, error: &dyn std::fmt::Display) {
        metrics::increment_counter(SIDE_EFFECT_FAILURES);
        warn!(%booking_id, effect, error = %error, "post-completion effect failed");
    }

    async fn update_earnings(&self, booking: &BookingModel) {
        let amount = booking.amount_captured.unwrap_or(0);
        let minutes = i64::from(booking.actual_duration_minutes.unwrap_or(0));

        if let Err(err) = self
            .earnings
            .record_completed_job(booking.professional_id, amount, minutes)
            .await
        {
            Self::record_failure(booking.id, "earnings", &err);
        }
    }

    async fn assign_rebook_variant(&self, booking: &BookingModel) {
        if !self.rebook_experiment_enabled {
            debug!(booking_id = %booking.id, "rebook experiment disabled");
            return;
        }

        let variant = rebook_variant(booking.customer_id);
        match self
            .rebook
            .assign(booking.id, booking.customer_id, variant)
            .await
        {
            Ok(true) => info!(booking_id = %booking.id, variant, "rebook nudge variant assigned"),
            Ok(false) => debug!(booking_id = %booking.id, "rebook nudge variant already assigned"),
            Err(err) => Self::record_failure(booking.id, "rebook_assignment", &err),
        }
    }

    async fn load_party(&self, booking_id: Uuid, id: Uuid) -> Option<ProfileModel> {
        match self.parties.find_profile(id).await {
            Ok(profile) => profile,
            Err(err) => {
                Self::record_failure(booking_id, "load_profile", &err);
                None
            }
        }
    }

    async fn notify_parties(&self, booking: &BookingModel) {
        let amount = format_amount(booking.amount_captured.unwrap_or(0), &booking.currency);

        if let Some(customer) = self.load_party(booking.id, booking.customer_id).await {
            let subject = "Your service is complete".to_string();
            let body = format!(
                "Hi {}, your booking {} is complete and {} has been charged.",
                customer.full_name, booking.id, amount
            );
            self.deliver(booking.id, &customer, subject, body).await;
        }

        if let Some(professional) = self.load_party(booking.id, booking.professional_id).await {
            let subject = "Job completed".to_string();
            let body = format!(
                "Nice work {}. Booking {} is complete; {} was captured.",
                professional.full_name, booking.id, amount
            );
            self.deliver(booking.id, &professional, subject, body).await;
        }
    }

    async fn deliver(&self, booking_id: Uuid, party: &ProfileModel, subject: String, body: String) {
        let email = EmailMessage {
            to: party.email.clone(),
            subject: subject.clone(),
            body: body.clone(),
        };
        if let Err(err) = self.notifier.send_email(email).await {
            Self::record_failure(booking_id, "email", &err);
        }

        if let Some(token) = party.push_token.clone() {
            let push = PushMessage {
                token,
                title: subject,
                body,
            };
            if let Err(err) = self.notifier.send_push(push).await {
                Self::record_failure(booking_id, "push", &err);
            }
        }
    }
}
