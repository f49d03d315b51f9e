use sea_orm_migration::prelude::*;

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m20250301_000004_create_professional_earnings_table"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ProfessionalEarnings::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ProfessionalEarnings::ProfessionalId)
                            .uuid()
                            .primary_key()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ProfessionalEarnings::LifetimeEarnings)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(ProfessionalEarnings::CompletedJobs)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(ProfessionalEarnings::TotalMinutesWorked)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(ProfessionalEarnings::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ProfessionalEarnings::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum ProfessionalEarnings {
    Table,
    ProfessionalId,
    LifetimeEarnings,
    CompletedJobs,
    TotalMinutesWorked,
    UpdatedAt,
}
