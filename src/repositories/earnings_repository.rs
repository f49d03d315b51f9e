use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, Set,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::entities::professional_earnings::{
    self, Column, Entity as ProfessionalEarnings, Model,
};
use crate::repositories::{is_unique_violation, Repository};

use super::BaseRepository;

#[async_trait]
pub trait EarningsStore: Send + Sync {
    /// Adds one completed job to the professional's running totals.
    async fn record_completed_job(
        &self,
        professional_id: Uuid,
        amount: i64,
        minutes: i64,
    ) -> Result<(), DbErr>;

    async fn find(&self, professional_id: Uuid) -> Result<Option<Model>, DbErr>;
}

#[derive(Debug, Clone)]
pub struct EarningsRepository {
    base: BaseRepository,
}

impl EarningsRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            base: BaseRepository::new(db),
        }
    }

    async fn increment(&self, professional_id: Uuid, amount: i64, minutes: i64) -> Result<u64, DbErr> {
        let result = ProfessionalEarnings::update_many()
            .col_expr(
                Column::LifetimeEarnings,
                Expr::col(Column::LifetimeEarnings).add(amount),
            )
            .col_expr(Column::CompletedJobs, Expr::col(Column::CompletedJobs).add(1))
            .col_expr(
                Column::TotalMinutesWorked,
                Expr::col(Column::TotalMinutesWorked).add(minutes),
            )
            .col_expr(Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(Column::ProfessionalId.eq(professional_id))
            .exec(self.base.get_db())
            .await?;
        Ok(result.rows_affected)
    }
}

#[async_trait]
impl EarningsStore for EarningsRepository {
    async fn record_completed_job(
        &self,
        professional_id: Uuid,
        amount: i64,
        minutes: i64,
    ) -> Result<(), DbErr> {
        if self.increment(professional_id, amount, minutes).await? > 0 {
            return Ok(());
        }

        let row = professional_earnings::ActiveModel {
            professional_id: Set(professional_id),
            lifetime_earnings: Set(amount),
            completed_jobs: Set(1),
            total_minutes_worked: Set(minutes),
            updated_at: Set(Utc::now()),
        };

        match ProfessionalEarnings::insert(row)
            .exec_without_returning(self.base.get_db())
            .await
        {
            Ok(_) => Ok(()),
            // A concurrent completion created the row first.
            Err(err) if is_unique_violation(&err) => {
                self.increment(professional_id, amount, minutes).await.map(|_| ())
            }
            Err(err) => Err(err),
        }
    }

    async fn find(&self, professional_id: Uuid) -> Result<Option<Model>, DbErr> {
        ProfessionalEarnings::find_by_id(professional_id)
            .one(self.base.get_db())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    #[tokio::test]
    async fn completed_jobs_accumulate() {
        let pool = db::connect_in_memory().await.unwrap();
        db::run_migrations(&pool).await.unwrap();
        let repo = EarningsRepository::new(Arc::new(pool));
        let professional = Uuid::new_v4();

        repo.record_completed_job(professional, 12_000, 120).await.unwrap();
        repo.record_completed_job(professional, 8_000, 90).await.unwrap();

        let totals = repo.find(professional).await.unwrap().unwrap();
        assert_eq!(totals.lifetime_earnings, 20_000);
        assert_eq!(totals.completed_jobs, 2);
        assert_eq!(totals.total_minutes_worked, 210);
    }
}
