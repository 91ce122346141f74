use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::watch;
use tracing::{info, warn};

use robux_monitor::api::RobloxClient;
use robux_monitor::config::{self, AppConfig};
use robux_monitor::monitor::{Monitor, MonitorSettings, StopReason, Tick};
use robux_monitor::notifier::Notifier;
use robux_monitor::snapshot::SnapshotStore;
use robux_monitor::throttle::RateLimiter;

#[derive(Parser)]
#[command(
    name = "robux-monitor",
    about = "Watch a Roblox account's transactions and balance, report changes to Discord"
)]
struct Args {
    /// Config file (default: ~/.roblox_transaction_history/config.json)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Snapshot directory (default: ~/.roblox_transaction_history/transaction_info)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Run a single check and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Ok(path) = dotenvy::dotenv() {
        info!("Loaded environment from {}", path.display());
    }

    let args = Args::parse();

    let config_path = args.config.unwrap_or_else(config::default_config_path);
    let mut app_config = AppConfig::load_or_init(&config_path)?;
    info!("Loaded config from {}", config_path.display());

    let overridden = app_config.apply_env_overrides();
    if !overridden.is_empty() {
        info!("Environment overrides: {}", overridden.join(", "));
    }
    app_config
        .validate()
        .context("run `setup` to fix the configuration")?;
    for line in app_config.summary() {
        info!("  {line}");
    }

    let store = SnapshotStore::new(args.data_dir.unwrap_or_else(config::default_snapshot_dir));
    store.init()?;

    let limiter = RateLimiter::shared();
    let client = RobloxClient::new(&app_config.cookie, limiter.clone())?;

    info!("Authenticating...");
    let user = match client.authenticated_user().await {
        Ok(user) => user,
        Err(e) if e.is_unauthorized() => {
            anyhow::bail!("{e}. Run `setup` with a fresh .ROBLOSECURITY cookie");
        }
        Err(e) => return Err(e).context("authentication failed"),
    };
    info!("Authenticated as {} (id {})", user.name, user.id);

    let notifier = Notifier::new(
        &app_config.webhook_url,
        &app_config.emoji_name,
        &app_config.emoji_id,
        limiter,
    );
    let settings = MonitorSettings::from_config(&app_config)?;
    let mut monitor = Monitor::new(client, store, notifier, settings);

    if args.once {
        return match monitor.tick().await? {
            Tick::AuthExpired => {
                anyhow::bail!("session cookie expired. Run `setup` with a fresh cookie")
            }
            Tick::Unavailable => anyhow::bail!("remote API unavailable, nothing was checked"),
            Tick::Checked(report) => {
                if !report.has_changes() {
                    info!("No changes");
                }
                Ok(())
            }
        };
    }

    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {e}");
            // Keep the sender alive so the loop keeps running.
            std::future::pending::<()>().await;
        }
        info!("Shutdown signal received");
        let _ = stop_tx.send(true);
    });

    info!("Press Ctrl+C to stop.");
    match monitor.run(stop_rx).await {
        StopReason::Requested => Ok(()),
        StopReason::AuthExpired => {
            anyhow::bail!("session cookie expired. Run `setup` with a fresh cookie")
        }
    }
}
