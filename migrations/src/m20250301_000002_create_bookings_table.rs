use sea_orm_migration::prelude::*;

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m20250301_000002_create_bookings_table"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Bookings::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Bookings::Id).uuid().primary_key().not_null())
                    .col(ColumnDef::new(Bookings::Status).string().not_null())
                    .col(ColumnDef::new(Bookings::ProfessionalId).uuid().not_null())
                    .col(ColumnDef::new(Bookings::CustomerId).uuid().not_null())
                    .col(
                        ColumnDef::new(Bookings::ScheduledStart)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Bookings::DurationMinutes)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Bookings::CheckedInAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Bookings::CheckedOutAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Bookings::ActualDurationMinutes)
                            .integer()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Bookings::AmountAuthorized)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Bookings::TimeExtensionAmount)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(Bookings::AmountCaptured).big_integer().null())
                    .col(
                        ColumnDef::new(Bookings::Currency)
                            .string()
                            .not_null()
                            .default("usd"),
                    )
                    .col(ColumnDef::new(Bookings::Address).json_binary().not_null())
                    .col(ColumnDef::new(Bookings::PaymentReference).string().null())
                    .col(ColumnDef::new(Bookings::PaymentStatus).string().null())
                    .col(ColumnDef::new(Bookings::CheckOutLatitude).double().null())
                    .col(ColumnDef::new(Bookings::CheckOutLongitude).double().null())
                    .col(ColumnDef::new(Bookings::CompletionNotes).text().null())
                    .col(
                        ColumnDef::new(Bookings::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Bookings::UpdatedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_bookings_payment_reference")
                    .table(Bookings::Table)
                    .col(Bookings::PaymentReference)
                    .if_not_exists()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Bookings::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Bookings {
    Table,
    Id,
    Status,
    ProfessionalId,
    CustomerId,
    ScheduledStart,
    DurationMinutes,
    CheckedInAt,
    CheckedOutAt,
    ActualDurationMinutes,
    AmountAuthorized,
    TimeExtensionAmount,
    AmountCaptured,
    Currency,
    Address,
    PaymentReference,
    PaymentStatus,
    CheckOutLatitude,
    CheckOutLongitude,
    CompletionNotes,
    CreatedAt,
    UpdatedAt,
}
