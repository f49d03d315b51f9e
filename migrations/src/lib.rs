pub use sea_orm_migration::prelude::*;

mod m20250301_000001_create_profiles_table;
mod m20250301_000002_create_bookings_table;
mod m20250301_000003_create_webhook_events_table;
mod m20250301_000004_create_professional_earnings_table;
mod m20250301_000005_create_rebook_nudge_assignments_table;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250301_000001_create_profiles_table::Migration),
            Box::new(m20250301_000002_create_bookings_table::Migration),
            Box::new(m20250301_000003_create_webhook_events_table::Migration),
            Box::new(m20250301_000004_create_professional_earnings_table::Migration),
            Box::new(m20250301_000005_create_rebook_nudge_assignments_table::Migration),
        ]
    }
}
