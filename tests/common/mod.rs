#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::Router;
use booking_checkout_api::{
    build_router,
    config::AppConfig,
    db,
    entities::{
        booking::{self, Model as BookingModel},
        profile::{self, Model as ProfileModel},
        professional_earnings, rebook_nudge_assignment, BookingStatus, PaymentStatus,
    },
    handlers::{AppServices, Collaborators},
    repositories::{
        BookingRepository, BookingStore, CompletionFields, CompletionWrite, EarningsRepository,
        EarningsStore, PartyDirectory, ProfileRepository, RebookAssignmentRepository,
        RebookAssignmentStore, WebhookEventRepository,
    },
    services::{
        geolocation::{AddressResolver, GeocodingError},
        notifications::{EmailMessage, NotificationError, PushMessage},
        payment_capture::CaptureReceipt,
        AdminAlert, CaptureError, GeoPoint, Notifier, PaymentProcessor,
    },
    webhooks::signature_header,
    AppState,
};
use chrono::{Duration, Utc};
use sea_orm::{DbErr, RuntimeErr, Set};
use serde_json::{json, Value};
use uuid::Uuid;

pub const WEBHOOK_SECRET: &str = "whsec_test_signing_secret_0123456789";
pub const AUTHORIZED_AMOUNT: i64 = 15_000;

/// Service address used by seeded bookings.
pub fn home_address() -> Value {
    json!({
        "street": "12 Harbour Road",
        "city": "London",
        "latitude": 51.5072,
        "longitude": -0.1276
    })
}

pub fn test_config() -> AppConfig {
    AppConfig::new(
        "sqlite::memory:".to_string(),
        WEBHOOK_SECRET.to_string(),
        "test".to_string(),
    )
}

/// Processor fake that deduplicates by idempotency key the way Stripe does.
#[derive(Default)]
pub struct FakeProcessor {
    pub calls: Mutex<Vec<(String, i64, String)>>,
    captures: Mutex<HashMap<String, CaptureReceipt>>,
    decline: bool,
}

impl FakeProcessor {
    pub fn declining() -> Self {
        Self {
            decline: true,
            ..Default::default()
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn keys(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(_, _, key)| key.clone())
            .collect()
    }

    /// Distinct charges actually taken.
    pub fn charge_count(&self) -> usize {
        self.captures.lock().unwrap().len()
    }
}

#[async_trait]
impl PaymentProcessor for FakeProcessor {
    async fn capture(
        &self,
        payment_reference: &str,
        amount: i64,
        idempotency_key: &str,
    ) -> Result<CaptureReceipt, CaptureError> {
        self.calls.lock().unwrap().push((
            payment_reference.to_string(),
            amount,
            idempotency_key.to_string(),
        ));
        if self.decline {
            return Err(CaptureError::Declined("card_declined".to_string()));
        }

        let mut captures = self.captures.lock().unwrap();
        let receipt = captures
            .entry(idempotency_key.to_string())
            .or_insert_with(|| CaptureReceipt {
                payment_reference: payment_reference.to_string(),
                status: "succeeded".to_string(),
                amount_received: amount,
                currency: "usd".to_string(),
            });
        Ok(receipt.clone())
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub alerts: Mutex<Vec<AdminAlert>>,
    pub emails: Mutex<Vec<EmailMessage>>,
    pub pushes: Mutex<Vec<PushMessage>>,
}

impl RecordingNotifier {
    pub fn alerts(&self) -> Vec<AdminAlert> {
        self.alerts.lock().unwrap().clone()
    }

    pub fn email_count(&self) -> usize {
        self.emails.lock().unwrap().len()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify_admins(&self, alert: AdminAlert) -> Result<(), NotificationError> {
        self.alerts.lock().unwrap().push(alert);
        Ok(())
    }

    async fn send_email(&self, message: EmailMessage) -> Result<(), NotificationError> {
        self.emails.lock().unwrap().push(message);
        Ok(())
    }

    async fn send_push(&self, message: PushMessage) -> Result<(), NotificationError> {
        self.pushes.lock().unwrap().push(message);
        Ok(())
    }
}

/// Resolver that never leaves the process.
pub struct StaticResolver(pub Option<GeoPoint>);

#[async_trait]
impl AddressResolver for StaticResolver {
    async fn resolve(&self, _address: &Value) -> Result<Option<GeoPoint>, GeocodingError> {
        Ok(self.0)
    }
}

/// Booking store kept in memory. With `failing_writes` every completion
/// write fails with a connection error and the attempt time is recorded.
/// With `failing_reads` every lookup fails.
#[derive(Default)]
pub struct InMemoryBookings {
    bookings: Mutex<HashMap<Uuid, BookingModel>>,
    failing_writes: bool,
    failing_reads: bool,
    pub write_attempts: Mutex<Vec<tokio::time::Instant>>,
}

impl InMemoryBookings {
    pub fn failing_writes() -> Self {
        Self {
            failing_writes: true,
            ..Default::default()
        }
    }

    pub fn failing_reads() -> Self {
        Self {
            failing_reads: true,
            ..Default::default()
        }
    }

    pub fn put(&self, booking: BookingModel) {
        self.bookings.lock().unwrap().insert(booking.id, booking);
    }

    pub fn get(&self, id: Uuid) -> Option<BookingModel> {
        self.bookings.lock().unwrap().get(&id).cloned()
    }

    pub fn attempts(&self) -> Vec<tokio::time::Instant> {
        self.write_attempts.lock().unwrap().clone()
    }
}

#[async_trait]
impl BookingStore for InMemoryBookings {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<BookingModel>, DbErr> {
        if self.failing_reads {
            return Err(DbErr::Conn(RuntimeErr::Internal(
                "connection refused".to_string(),
            )));
        }
        Ok(self.get(id))
    }

    async fn find_by_payment_reference(
        &self,
        payment_reference: &str,
    ) -> Result<Option<BookingModel>, DbErr> {
        Ok(self
            .bookings
            .lock()
            .unwrap()
            .values()
            .find(|b| b.payment_reference.as_deref() == Some(payment_reference))
            .cloned())
    }

    async fn complete(&self, id: Uuid, fields: &CompletionFields) -> Result<CompletionWrite, DbErr> {
        self.write_attempts
            .lock()
            .unwrap()
            .push(tokio::time::Instant::now());
        if self.failing_writes {
            return Err(DbErr::Conn(RuntimeErr::Internal(
                "database is locked".to_string(),
            )));
        }

        let mut bookings = self.bookings.lock().unwrap();
        let Some(booking) = bookings.get_mut(&id) else {
            return Ok(CompletionWrite::Missing);
        };
        if booking.is_completed() {
            return Ok(CompletionWrite::AlreadyCompleted(booking.clone()));
        }
        booking.status = BookingStatus::Completed.to_string();
        booking.checked_out_at = Some(fields.checked_out_at);
        booking.actual_duration_minutes = Some(fields.actual_duration_minutes);
        booking.amount_captured = Some(fields.amount_captured);
        booking.payment_status = Some(fields.payment_status.to_string());
        booking.check_out_latitude = fields.check_out_latitude;
        booking.check_out_longitude = fields.check_out_longitude;
        booking.completion_notes = fields.completion_notes.clone();
        Ok(CompletionWrite::Completed(booking.clone()))
    }
}

#[derive(Default)]
pub struct InMemoryParties(pub Mutex<HashMap<Uuid, ProfileModel>>);

#[async_trait]
impl PartyDirectory for InMemoryParties {
    async fn find_profile(&self, id: Uuid) -> Result<Option<ProfileModel>, DbErr> {
        Ok(self.0.lock().unwrap().get(&id).cloned())
    }
}

#[derive(Default)]
pub struct NoopEarnings;

#[async_trait]
impl EarningsStore for NoopEarnings {
    async fn record_completed_job(
        &self,
        _professional_id: Uuid,
        _amount: i64,
        _minutes: i64,
    ) -> Result<(), DbErr> {
        Ok(())
    }

    async fn find(
        &self,
        _professional_id: Uuid,
    ) -> Result<Option<professional_earnings::Model>, DbErr> {
        Ok(None)
    }
}

#[derive(Default)]
pub struct NoopRebook;

#[async_trait]
impl RebookAssignmentStore for NoopRebook {
    async fn assign(
        &self,
        _booking_id: Uuid,
        _customer_id: Uuid,
        _variant: &str,
    ) -> Result<bool, DbErr> {
        Ok(true)
    }

    async fn find(
        &self,
        _booking_id: Uuid,
    ) -> Result<Option<rebook_nudge_assignment::Model>, DbErr> {
        Ok(None)
    }
}

/// An in-progress booking, checked in 95 minutes ago, not yet persisted.
pub fn in_progress_booking(customer_id: Uuid, professional_id: Uuid) -> BookingModel {
    let now = Utc::now();
    let id = Uuid::new_v4();
    BookingModel {
        id,
        status: BookingStatus::InProgress.to_string(),
        professional_id,
        customer_id,
        scheduled_start: now - Duration::minutes(100),
        duration_minutes: 90,
        checked_in_at: Some(now - Duration::minutes(95)),
        checked_out_at: None,
        actual_duration_minutes: None,
        amount_authorized: AUTHORIZED_AMOUNT,
        time_extension_amount: 0,
        amount_captured: None,
        currency: "usd".to_string(),
        address: home_address(),
        payment_reference: Some(format!("pi_{}", id.simple())),
        payment_status: Some(PaymentStatus::Authorized.to_string()),
        check_out_latitude: None,
        check_out_longitude: None,
        completion_notes: None,
        created_at: now,
        updated_at: None,
    }
}

pub fn profile(name: &str) -> ProfileModel {
    let id = Uuid::new_v4();
    ProfileModel {
        id,
        full_name: name.to_string(),
        email: format!("{}@example.com", id.simple()),
        push_token: Some(format!("push-{}", id.simple())),
        created_at: Utc::now(),
    }
}

/// Signed body for a `payment_intent.*` event.
pub fn signed_event(
    event_id: &str,
    event_type: &str,
    payment_reference: &str,
    amount_received: i64,
    signed_at: i64,
) -> (Vec<u8>, String) {
    let body = serde_json::to_vec(&json!({
        "id": event_id,
        "type": event_type,
        "data": {
            "object": {
                "id": payment_reference,
                "object": "payment_intent",
                "status": "succeeded",
                "amount_received": amount_received
            }
        }
    }))
    .unwrap();
    let header = signature_header(WEBHOOK_SECRET, signed_at, &body).unwrap();
    (body, header)
}

/// Application over an in-memory SQLite database with the processor,
/// notifier and geocoder replaced by fakes.
pub struct TestApp {
    pub state: AppState,
    pub processor: Arc<FakeProcessor>,
    pub notifier: Arc<RecordingNotifier>,
    pub bookings: BookingRepository,
    pub profiles: ProfileRepository,
    pub earnings: EarningsRepository,
    pub ledger: WebhookEventRepository,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_processor(FakeProcessor::default()).await
    }

    pub async fn with_processor(processor: FakeProcessor) -> Self {
        let pool = Arc::new(db::connect_in_memory().await.unwrap());
        db::run_migrations(&pool).await.unwrap();
        let config = test_config();

        let processor = Arc::new(processor);
        let notifier = Arc::new(RecordingNotifier::default());
        let collaborators = Collaborators {
            bookings: Arc::new(BookingRepository::new(pool.clone())),
            ledger: Arc::new(WebhookEventRepository::new(pool.clone())),
            parties: Arc::new(ProfileRepository::new(pool.clone())),
            earnings: Arc::new(EarningsRepository::new(pool.clone())),
            rebook: Arc::new(RebookAssignmentRepository::new(pool.clone())),
            processor: processor.clone(),
            notifier: notifier.clone(),
            resolver: Arc::new(StaticResolver(Some(GeoPoint::new(51.5072, -0.1276)))),
        };
        let services = AppServices::new(collaborators, &config);

        Self {
            state: AppState {
                db: pool.clone(),
                config,
                services,
            },
            processor,
            notifier,
            bookings: BookingRepository::new(pool.clone()),
            profiles: ProfileRepository::new(pool.clone()),
            earnings: EarningsRepository::new(pool.clone()),
            ledger: WebhookEventRepository::new(pool),
        }
    }

    pub fn router(&self) -> Router {
        build_router(self.state.clone())
    }

    /// Persists a customer, a professional and an in-progress booking between them.
    pub async fn seed_in_progress_booking(&self) -> BookingModel {
        let customer = self.seed_profile("Ada Customer").await;
        let professional = self.seed_profile("Pat Professional").await;
        let booking = in_progress_booking(customer.id, professional.id);
        self.seed_booking(booking).await
    }

    pub async fn seed_profile(&self, name: &str) -> ProfileModel {
        let model = profile(name);
        self.profiles
            .insert(profile::ActiveModel {
                id: Set(model.id),
                full_name: Set(model.full_name),
                email: Set(model.email),
                push_token: Set(model.push_token),
                created_at: Set(model.created_at),
            })
            .await
            .unwrap()
    }

    pub async fn seed_booking(&self, model: BookingModel) -> BookingModel {
        self.bookings
            .insert(booking::ActiveModel {
                id: Set(model.id),
                status: Set(model.status),
                professional_id: Set(model.professional_id),
                customer_id: Set(model.customer_id),
                scheduled_start: Set(model.scheduled_start),
                duration_minutes: Set(model.duration_minutes),
                checked_in_at: Set(model.checked_in_at),
                checked_out_at: Set(model.checked_out_at),
                actual_duration_minutes: Set(model.actual_duration_minutes),
                amount_authorized: Set(model.amount_authorized),
                time_extension_amount: Set(model.time_extension_amount),
                amount_captured: Set(model.amount_captured),
                currency: Set(model.currency),
                address: Set(model.address),
                payment_reference: Set(model.payment_reference),
                payment_status: Set(model.payment_status),
                check_out_latitude: Set(model.check_out_latitude),
                check_out_longitude: Set(model.check_out_longitude),
                completion_notes: Set(model.completion_notes),
                ..Default::default()
            })
            .await
            .unwrap()
    }

    pub async fn booking(&self, id: Uuid) -> BookingModel {
        self.bookings.find_by_id(id).await.unwrap().unwrap()
    }
}
