use sea_orm_migration::prelude::*;

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m20250301_000005_create_rebook_nudge_assignments_table"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(RebookNudgeAssignments::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(RebookNudgeAssignments::BookingId)
                            .uuid()
                            .primary_key()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(RebookNudgeAssignments::CustomerId)
                            .uuid()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(RebookNudgeAssignments::Variant)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(RebookNudgeAssignments::AssignedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(
                Table::drop()
                    .table(RebookNudgeAssignments::Table)
                    .to_owned(),
            )
            .await
    }
}

#[derive(DeriveIden)]
enum RebookNudgeAssignments {
    Table,
    BookingId,
    CustomerId,
    Variant,
    AssignedAt,
}
