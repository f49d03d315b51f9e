use std::{fs, path::PathBuf, sync::Arc};

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use futures::future::join_all;
use serde_json::Value;

use booking_checkout_api::{
    config, db,
    repositories::{WebhookEventLedger, WebhookEventRepository},
    webhooks::{signature_header, SIGNATURE_HEADER},
};

/// Sign and replay payment processor events, or clean up replayed ones
#[derive(Parser)]
#[command(name = "webhook-replay", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Post signed copies of an event to a running receiver
    Send(SendArgs),
    /// Delete ledger rows whose event id starts with a prefix
    Purge(PurgeArgs),
}

#[derive(Args)]
struct SendArgs {
    /// Webhook endpoint, e.g. http://localhost:8080/api/v1/payments/webhook
    #[arg(long)]
    url: String,
    /// Signing secret shared with the receiver
    #[arg(long)]
    secret: String,
    /// JSON file holding the event body
    #[arg(long)]
    event: PathBuf,
    /// Number of concurrent deliveries
    #[arg(long, default_value_t = 1)]
    copies: usize,
    /// Backdate the signature timestamp by this many seconds
    #[arg(long, default_value_t = 0)]
    age_secs: i64,
}

#[derive(Args)]
struct PurgeArgs {
    #[arg(long)]
    prefix: String,
    /// Database URL; defaults to DATABASE_URL, then to the application config
    #[arg(long)]
    database_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    config::init_tracing("warn", false);

    match Cli::parse().command {
        Command::Send(args) => send(args).await,
        Command::Purge(args) => purge(args).await,
    }
}

async fn send(args: SendArgs) -> Result<()> {
    if args.copies == 0 {
        bail!("--copies must be at least 1");
    }

    let body = fs::read(&args.event)
        .with_context(|| format!("failed to read {}", args.event.display()))?;
    serde_json::from_slice::<Value>(&body).context("event file is not valid JSON")?;

    let timestamp = Utc::now().timestamp() - args.age_secs;
    let header = signature_header(&args.secret, timestamp, &body)?;
    let client = reqwest::Client::new();

    let deliveries = (0..args.copies).map(|copy| {
        let request = client
            .post(&args.url)
            .header(SIGNATURE_HEADER, header.clone())
            .header("content-type", "application/json")
            .body(body.clone());
        async move {
            let response = request.send().await?;
            let status = response.status();
            let payload: Value = response.json().await.unwrap_or(Value::Null);
            Ok::<_, reqwest::Error>((copy, status, payload))
        }
    });

    let mut accepted = 0;
    let mut duplicates = 0;
    for result in join_all(deliveries).await {
        match result {
            Ok((copy, status, payload)) => {
                let duplicate = payload
                    .get("duplicate")
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                if status.is_success() {
                    accepted += 1;
                    if duplicate {
                        duplicates += 1;
                    }
                }
                println!("copy {}: {} duplicate={} {}", copy, status, duplicate, payload);
            }
            Err(err) => println!("delivery failed: {}", err),
        }
    }

    println!(
        "{} accepted, {} processed, {} duplicates",
        accepted,
        accepted - duplicates,
        duplicates
    );
    Ok(())
}

async fn purge(args: PurgeArgs) -> Result<()> {
    if args.prefix.trim().is_empty() {
        bail!("refusing to purge with an empty prefix");
    }

    let url = match args
        .database_url
        .or_else(|| std::env::var("DATABASE_URL").ok())
    {
        Some(url) => url,
        None => config::load_config()?.database_url,
    };
    let pool = db::establish_connection_with_config(&db::DbConfig {
        url,
        ..Default::default()
    })
    .await?;

    let ledger = WebhookEventRepository::new(Arc::new(pool));
    let removed = ledger.purge_by_prefix(&args.prefix).await?;
    println!("removed {} webhook event(s) with prefix {:?}", removed, args.prefix);
    Ok(())
}
