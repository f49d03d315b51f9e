use sea_orm::{DatabaseConnection, DbErr, SqlErr};
use std::sync::Arc;

pub mod booking_repository;
pub mod earnings_repository;
pub mod profile_repository;
pub mod rebook_assignment_repository;
pub mod webhook_event_repository;

pub use booking_repository::{BookingRepository, BookingStore, CompletionFields, CompletionWrite};
pub use earnings_repository::{EarningsRepository, EarningsStore};
pub use profile_repository::{PartyDirectory, ProfileRepository};
pub use rebook_assignment_repository::{RebookAssignmentRepository, RebookAssignmentStore};
pub use webhook_event_repository::{
    LedgerInsert, NewWebhookEvent, WebhookEventLedger, WebhookEventRepository,
};

/// Repository trait for common database operations
pub trait Repository {
    fn get_db(&self) -> &DatabaseConnection;
}

#[derive(Debug, Clone)]
pub struct BaseRepository {
    db: Arc<DatabaseConnection>,
}

impl BaseRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

impl Repository for BaseRepository {
    fn get_db(&self) -> &DatabaseConnection {
        &self.db
    }
}

/// True when `err` is a unique or primary key violation.
///
/// Falls back to the raw driver codes (2067/1555 SQLite, 23505 Postgres)
/// when the error was not classified by sea-orm.
pub fn is_unique_violation(err: &DbErr) -> bool {
    if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) {
        return true;
    }
    let message = err.to_string();
    message.contains("UNIQUE constraint failed")
        || message.contains("duplicate key value")
        || message.contains("(code: 2067)")
        || message.contains("(code: 1555)")
        || message.contains("23505")
}
