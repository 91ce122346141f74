//! Probe: raw Roblox endpoint responses
//!
//! Hits every endpoint the monitor polls with the configured cookie and
//! prints for each:
//! - Latency
//! - Raw response body
//! - Top-level fields present
//! - For transaction totals, metrics missing from or unknown to the monitor

use std::path::PathBuf;
use std::time::Instant;

use anyhow::Result;
use clap::Parser;
use serde_json::Value;

use robux_monitor::api::{ApiError, RobloxClient};
use robux_monitor::config::{self, AppConfig, Timeframe};
use robux_monitor::throttle::RateLimiter;
use robux_monitor::types::TRANSACTION_METRICS;

#[derive(Parser)]
#[command(
    name = "probe_endpoints",
    about = "Dump raw responses of the polled Roblox endpoints"
)]
struct Args {
    /// Config file holding the session cookie
    #[arg(long)]
    config: Option<PathBuf>,

    /// Timeframe for the transaction totals (defaults to the configured one)
    #[arg(long)]
    timeframe: Option<Timeframe>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let args = Args::parse();

    let config_path = args.config.unwrap_or_else(config::default_config_path);
    let mut app_config = AppConfig::load(&config_path)?;
    app_config.apply_env_overrides();
    let timeframe = match args.timeframe {
        Some(tf) => tf,
        None => app_config.parsed_timeframe()?,
    };

    let client = RobloxClient::new(&app_config.cookie, RateLimiter::shared())?;

    println!("=== Probe: Roblox endpoints ===");
    println!("Config: {}", config_path.display());
    println!("Timeframe: {timeframe}");
    println!();

    // 1. Authenticated user
    println!("--- 1. Authenticated user ---");
    let url = format!("{}/v1/users/authenticated", client.users_base());
    let Some(body) = probe(&client, "authenticated-user", &url).await? else {
        println!("=== Probe stopped: cannot continue without a user id ===");
        return Ok(());
    };
    let Some(user_id) = body.get("id").and_then(Value::as_u64) else {
        println!("Response has no numeric 'id', stopping");
        return Ok(());
    };
    println!();

    // 2. Transaction totals
    println!("--- 2. Transaction totals ---");
    let url = format!(
        "{}/v2/users/{user_id}/transaction-totals?timeFrame={timeframe}&transactionType=summary",
        client.economy_base()
    );
    if let Some(body) = probe(&client, "transaction-totals", &url).await? {
        if let Some(obj) = body.as_object() {
            let missing: Vec<&str> = TRANSACTION_METRICS
                .iter()
                .copied()
                .filter(|k| !obj.contains_key(*k))
                .collect();
            let unknown: Vec<&str> = obj
                .keys()
                .map(String::as_str)
                .filter(|k| !TRANSACTION_METRICS.contains(k))
                .collect();
            println!("Missing metrics (treated as 0): {missing:?}");
            println!("Unknown metrics (ignored): {unknown:?}");
        }
    }
    println!();

    // 3. Currency
    println!("--- 3. Currency ---");
    let url = format!("{}/v1/users/{user_id}/currency", client.economy_base());
    probe(&client, "currency", &url).await?;
    println!();

    // 4. Profile
    println!("--- 4. User profile ---");
    let url = format!("{}/v1/users/{user_id}", client.users_base());
    probe(&client, "user-profile", &url).await?;
    println!();

    println!("=== Probe Complete ===");
    Ok(())
}

/// Fetch and print one endpoint. `None` when the request failed.
async fn probe(client: &RobloxClient, endpoint: &'static str, url: &str) -> Result<Option<Value>> {
    println!("GET {url}");
    let start = Instant::now();
    let result = client.get_raw(endpoint, url).await;
    println!("Latency: {:?}", start.elapsed());

    match result {
        Ok(body) => {
            println!("{}", serde_json::to_string_pretty(&body)?);
            if let Some(obj) = body.as_object() {
                println!("Fields present:");
                for key in obj.keys() {
                    println!("  - {key}");
                }
            }
            Ok(Some(body))
        }
        Err(e @ ApiError::Unauthorized { .. }) => {
            println!("Error: {e}");
            println!("Run `setup` with a fresh cookie.");
            Ok(None)
        }
        Err(e) => {
            println!("Error: {e}");
            Ok(None)
        }
    }
}
