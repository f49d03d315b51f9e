use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait,
    QueryFilter, TransactionTrait,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::entities::booking::{self, Column, Entity as Booking, Model as BookingModel};
use crate::entities::{BookingStatus, PaymentStatus};
use crate::repositories::Repository;

use super::BaseRepository;

/// Fields written by the single completion update.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionFields {
    pub checked_out_at: DateTime<Utc>,
    pub check_out_latitude: Option<f64>,
    pub check_out_longitude: Option<f64>,
    pub actual_duration_minutes: i32,
    pub amount_captured: i64,
    pub payment_status: PaymentStatus,
    pub completion_notes: Option<String>,
}

/// Result of a completion update.
#[derive(Debug, Clone, PartialEq)]
pub enum CompletionWrite {
    /// This write moved the booking to `completed`.
    Completed(BookingModel),
    /// Another writer completed the booking first; nothing was changed.
    AlreadyCompleted(BookingModel),
    /// No booking with that id.
    Missing,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BookingStore: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<BookingModel>, DbErr>;

    async fn find_by_payment_reference(
        &self,
        payment_reference: &str,
    ) -> Result<Option<BookingModel>, DbErr>;

    /// Atomically marks the booking completed unless it already is. The
    /// update and the read of the resulting row commit together, so a failed
    /// call never leaves a completed row behind.
    async fn complete(&self, id: Uuid, fields: &CompletionFields)
        -> Result<CompletionWrite, DbErr>;
}

/// Repository for booking rows
#[derive(Debug, Clone)]
pub struct BookingRepository {
    base: BaseRepository,
}

impl BookingRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            base: BaseRepository::new(db),
        }
    }

    /// Inserts a booking; used by seeding and tests.
    pub async fn insert(&self, booking: booking::ActiveModel) -> Result<BookingModel, DbErr> {
        booking.insert(self.base.get_db()).await
    }
}

#[async_trait]
impl BookingStore for BookingRepository {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<BookingModel>, DbErr> {
        Booking::find_by_id(id).one(self.base.get_db()).await
    }

    async fn find_by_payment_reference(
        &self,
        payment_reference: &str,
    ) -> Result<Option<BookingModel>, DbErr> {
        Booking::find()
            .filter(Column::PaymentReference.eq(payment_reference))
            .one(self.base.get_db())
            .await
    }

    async fn complete(
        &self,
        id: Uuid,
        fields: &CompletionFields,
    ) -> Result<CompletionWrite, DbErr> {
        let completed = BookingStatus::Completed.to_string();
        let txn = self.base.get_db().begin().await?;

        let result = Booking::update_many()
            .col_expr(Column::Status, Expr::value(completed.clone()))
            .col_expr(Column::CheckedOutAt, Expr::value(fields.checked_out_at))
            .col_expr(Column::CheckOutLatitude, Expr::value(fields.check_out_latitude))
            .col_expr(Column::CheckOutLongitude, Expr::value(fields.check_out_longitude))
            .col_expr(
                Column::ActualDurationMinutes,
                Expr::value(fields.actual_duration_minutes),
            )
            .col_expr(Column::AmountCaptured, Expr::value(fields.amount_captured))
            .col_expr(
                Column::PaymentStatus,
                Expr::value(fields.payment_status.to_string()),
            )
            .col_expr(
                Column::CompletionNotes,
                Expr::value(fields.completion_notes.clone()),
            )
            .col_expr(Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(Column::Id.eq(id))
            .filter(Column::Status.ne(completed))
            .exec(&txn)
            .await?;

        // Dropping `txn` on an early return rolls the update back.
        let current = Booking::find_by_id(id).one(&txn).await?;
        let write = match current {
            Some(model) if result.rows_affected > 0 => CompletionWrite::Completed(model),
            Some(model) if model.is_completed() => CompletionWrite::AlreadyCompleted(model),
            Some(_) => return Err(DbErr::RecordNotUpdated),
            None => CompletionWrite::Missing,
        };
        txn.commit().await?;
        Ok(write)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use sea_orm::Set;
    use serde_json::json;

    async fn repository() -> BookingRepository {
        let pool = db::connect_in_memory().await.unwrap();
        db::run_migrations(&pool).await.unwrap();
        BookingRepository::new(Arc::new(pool))
    }

    fn in_progress_booking(id: Uuid) -> booking::ActiveModel {
        let now = Utc::now();
        booking::ActiveModel {
            id: Set(id),
            status: Set(BookingStatus::InProgress.to_string()),
            professional_id: Set(Uuid::new_v4()),
            customer_id: Set(Uuid::new_v4()),
            scheduled_start: Set(now),
            duration_minutes: Set(120),
            checked_in_at: Set(Some(now - chrono::Duration::minutes(95))),
            checked_out_at: Set(None),
            actual_duration_minutes: Set(None),
            amount_authorized: Set(15_000),
            time_extension_amount: Set(0),
            amount_captured: Set(None),
            currency: Set("usd".to_string()),
            address: Set(json!("12 Harbour Road")),
            payment_reference: Set(Some("pi_repo_test".to_string())),
            payment_status: Set(Some(PaymentStatus::Authorized.to_string())),
            check_out_latitude: Set(None),
            check_out_longitude: Set(None),
            completion_notes: Set(None),
            ..Default::default()
        }
    }

    fn fields() -> CompletionFields {
        CompletionFields {
            checked_out_at: Utc::now(),
            check_out_latitude: Some(51.5),
            check_out_longitude: Some(-0.12),
            actual_duration_minutes: 95,
            amount_captured: 15_000,
            payment_status: PaymentStatus::Captured,
            completion_notes: Some("left keys with concierge".to_string()),
        }
    }

    #[tokio::test]
    async fn completes_once_then_reports_already_completed() {
        let repo = repository().await;
        let id = Uuid::new_v4();
        repo.insert(in_progress_booking(id)).await.unwrap();

        let first = repo.complete(id, &fields()).await.unwrap();
        let CompletionWrite::Completed(model) = first else {
            panic!("expected completion, got {:?}", first);
        };
        assert!(model.is_completed());
        assert_eq!(model.amount_captured, Some(15_000));
        assert_eq!(model.payment_status.as_deref(), Some("captured"));
        assert!(model.checked_out_at.is_some());

        let mut second_fields = fields();
        second_fields.amount_captured = 1;
        let second = repo.complete(id, &second_fields).await.unwrap();
        let CompletionWrite::AlreadyCompleted(model) = second else {
            panic!("expected already completed, got {:?}", second);
        };
        assert_eq!(model.amount_captured, Some(15_000));
    }

    #[tokio::test]
    async fn missing_booking_is_reported() {
        let repo = repository().await;
        assert_eq!(
            repo.complete(Uuid::new_v4(), &fields()).await.unwrap(),
            CompletionWrite::Missing
        );
    }

    #[tokio::test]
    async fn finds_by_payment_reference() {
        let repo = repository().await;
        let id = Uuid::new_v4();
        repo.insert(in_progress_booking(id)).await.unwrap();

        let found = repo.find_by_payment_reference("pi_repo_test").await.unwrap();
        assert_eq!(found.map(|b| b.id), Some(id));
    }
}
