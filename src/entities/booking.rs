use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{entity::prelude::*, ActiveValue::Set};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;
use uuid::Uuid;

/// Lifecycle of a booking. Stored as snake_case text.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr, ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BookingStatus {
    PendingPayment,
    Confirmed,
    InProgress,
    Completed,
    Cancelled,
}

/// Processor-side state of the booking's payment intent.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr, ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PaymentStatus {
    Authorized,
    Captured,
    Failed,
    Canceled,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "bookings")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub status: String,
    pub professional_id: Uuid,
    pub customer_id: Uuid,
    pub scheduled_start: DateTime<Utc>,
    pub duration_minutes: i32,
    pub checked_in_at: Option<DateTime<Utc>>,
    pub checked_out_at: Option<DateTime<Utc>>,
    pub actual_duration_minutes: Option<i32>,
    /// Authorized hold, in minor units.
    pub amount_authorized: i64,
    pub time_extension_amount: i64,
    pub amount_captured: Option<i64>,
    pub currency: String,
    /// Structured address object or a free-form string.
    pub address: Json,
    pub payment_reference: Option<String>,
    pub payment_status: Option<String>,
    pub check_out_latitude: Option<f64>,
    pub check_out_longitude: Option<f64>,
    #[sea_orm(column_type = "Text", nullable)]
    pub completion_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::profile::Entity",
        from = "Column::ProfessionalId",
        to = "super::profile::Column::Id"
    )]
    Professional,
    #[sea_orm(
        belongs_to = "super::profile::Entity",
        from = "Column::CustomerId",
        to = "super::profile::Column::Id"
    )]
    Customer,
}

#[async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C: ConnectionTrait>(self, _db: &C, insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let mut active_model = self;
        let now = Utc::now();

        if insert {
            active_model.created_at = Set(now);
        }
        active_model.updated_at = Set(Some(now));

        Ok(active_model)
    }
}

impl Model {
    /// Parsed status; `None` when the column holds an unknown value.
    pub fn booking_status(&self) -> Option<BookingStatus> {
        self.status.parse().ok()
    }

    pub fn is_completed(&self) -> bool {
        self.booking_status() == Some(BookingStatus::Completed)
    }

    /// Amount the check-out captures: the authorized hold plus any time
    /// extension. `None` when the stored amounts overflow.
    pub fn capturable_amount(&self) -> Option<i64> {
        self.amount_authorized.checked_add(self.time_extension_amount)
    }
}
