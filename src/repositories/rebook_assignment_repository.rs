use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{DatabaseConnection, DbErr, EntityTrait, Set};
use std::sync::Arc;
use uuid::Uuid;

use crate::entities::rebook_nudge_assignment::{self, Entity as RebookNudgeAssignment, Model};
use crate::repositories::{is_unique_violation, Repository};

use super::BaseRepository;

#[async_trait]
pub trait RebookAssignmentStore: Send + Sync {
    /// Records the variant for a booking. Returns false if one was already assigned.
    async fn assign(&self, booking_id: Uuid, customer_id: Uuid, variant: &str)
        -> Result<bool, DbErr>;

    async fn find(&self, booking_id: Uuid) -> Result<Option<Model>, DbErr>;
}

#[derive(Debug, Clone)]
pub struct RebookAssignmentRepository {
    base: BaseRepository,
}

impl RebookAssignmentRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            base: BaseRepository::new(db),
        }
    }
}

#[async_trait]
impl RebookAssignmentStore for RebookAssignmentRepository {
    async fn assign(
        &self,
        booking_id: Uuid,
        customer_id: Uuid,
        variant: &str,
    ) -> Result<bool, DbErr> {
        let row = rebook_nudge_assignment::ActiveModel {
            booking_id: Set(booking_id),
            customer_id: Set(customer_id),
            variant: Set(variant.to_string()),
            assigned_at: Set(Utc::now()),
        };

        match RebookNudgeAssignment::insert(row)
            .exec_without_returning(self.base.get_db())
            .await
        {
            Ok(_) => Ok(true),
            Err(err) if is_unique_violation(&err) => Ok(false),
            Err(err) => Err(err),
        }
    }

    async fn find(&self, booking_id: Uuid) -> Result<Option<Model>, DbErr> {
        RebookNudgeAssignment::find_by_id(booking_id)
            .one(self.base.get_db())
            .await
    }
}
