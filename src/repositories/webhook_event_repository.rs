use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{sea_query::Expr, DatabaseConnection, DbErr, EntityTrait, QueryFilter, Set, Value};
use serde_json::Value as JsonValue;
use std::sync::Arc;

use crate::entities::webhook_event::{self, Entity as WebhookEvent, Model};
use crate::repositories::{is_unique_violation, Repository};

use super::BaseRepository;

/// Ledger row to insert for a verified event.
#[derive(Debug, Clone)]
pub struct NewWebhookEvent {
    pub event_id: String,
    pub event_type: String,
    pub received_at: DateTime<Utc>,
    pub payload: JsonValue,
    pub processing_outcome: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerInsert {
    Inserted,
    /// The event id was already recorded by an earlier delivery.
    Duplicate,
}

#[async_trait]
pub trait WebhookEventLedger: Send + Sync {
    /// Inserts the event. The primary key on `event_id` decides concurrent races.
    async fn record(&self, event: NewWebhookEvent) -> Result<LedgerInsert, DbErr>;

    async fn find(&self, event_id: &str) -> Result<Option<Model>, DbErr>;

    /// Deletes every row whose event id starts with `prefix`. The prefix is
    /// compared literally; `%` and `_` are not wildcards.
    async fn purge_by_prefix(&self, prefix: &str) -> Result<u64, DbErr>;
}

#[derive(Debug, Clone)]
pub struct WebhookEventRepository {
    base: BaseRepository,
}

impl WebhookEventRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            base: BaseRepository::new(db),
        }
    }
}

#[async_trait]
impl WebhookEventLedger for WebhookEventRepository {
    async fn record(&self, event: NewWebhookEvent) -> Result<LedgerInsert, DbErr> {
        let row = webhook_event::ActiveModel {
            event_id: Set(event.event_id),
            event_type: Set(event.event_type),
            received_at: Set(event.received_at),
            payload: Set(event.payload),
            processing_outcome: Set(event.processing_outcome),
        };

        match WebhookEvent::insert(row)
            .exec_without_returning(self.base.get_db())
            .await
        {
            Ok(_) => Ok(LedgerInsert::Inserted),
            Err(err) if is_unique_violation(&err) => Ok(LedgerInsert::Duplicate),
            Err(err) => Err(err),
        }
    }

    async fn find(&self, event_id: &str) -> Result<Option<Model>, DbErr> {
        WebhookEvent::find_by_id(event_id.to_string())
            .one(self.base.get_db())
            .await
    }

    async fn purge_by_prefix(&self, prefix: &str) -> Result<u64, DbErr> {
        if prefix.is_empty() {
            return Err(DbErr::Custom(
                "refusing to purge webhook events with an empty prefix".to_string(),
            ));
        }

        let prefix_len = i32::try_from(prefix.chars().count())
            .map_err(|_| DbErr::Custom("purge prefix is too long".to_string()))?;
        let result = WebhookEvent::delete_many()
            .filter(Expr::cust_with_values(
                "substr(event_id, 1, ?) = ?",
                [Value::from(prefix_len), Value::from(prefix.to_string())],
            ))
            .exec(self.base.get_db())
            .await?;
        Ok(result.rows_affected)
    }
}
