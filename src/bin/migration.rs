use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use migrations::{Migrator, MigratorTrait};
use tracing::info;

use booking_checkout_api::{config, db};

/// Apply or roll back the booking schema
#[derive(Parser)]
#[command(name = "migration", version)]
struct Cli {
    /// Database URL; defaults to DATABASE_URL, then to the application config
    #[arg(long, global = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Apply all pending migrations (default)
    Up,
    /// Roll back the last `steps` migrations
    Down {
        #[arg(long, default_value_t = 1)]
        steps: u32,
    },
    /// Print applied and pending migrations
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    config::init_tracing("info", false);

    let url = match cli
        .database_url
        .clone()
        .or_else(|| std::env::var("DATABASE_URL").ok())
    {
        Some(url) => url,
        None => {
            config::load_config()
                .context("no --database-url or DATABASE_URL and configuration failed to load")?
                .database_url
        }
    };

    let pool = db::establish_connection_with_config(&db::DbConfig {
        url,
        ..Default::default()
    })
    .await?;

    match cli.command.unwrap_or(Command::Up) {
        Command::Up => {
            info!("Starting database migration");
            db::run_migrations(&pool).await?;
        }
        Command::Down { steps } => {
            info!("Rolling back {} migration(s)", steps);
            Migrator::down(&pool, Some(steps)).await?;
        }
        Command::Status => {
            Migrator::status(&pool).await?;
        }
    }

    info!("Migration command completed successfully");
    Ok(())
}
