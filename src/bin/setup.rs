//! setup: interactive configuration for the Robux monitor.
//!
//! Prompts for every config value (secrets with hidden input), keeps the
//! current value when the answer is empty, validates the result, checks
//! the session cookie against the users API and writes `config.json`.
//!
//! Use `--cookie` only for scripted use; it leaks into shell history.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;

use robux_monitor::api::RobloxClient;
use robux_monitor::config::{self, AppConfig, Timeframe, effective_interval_secs, sanitize};
use robux_monitor::throttle::RateLimiter;

#[derive(Parser)]
#[command(
    name = "setup",
    about = "Create or update the monitor configuration and verify the session cookie"
)]
struct Cli {
    /// Config file to write (default: ~/.roblox_transaction_history/config.json)
    #[arg(long)]
    config: Option<PathBuf>,

    /// .ROBLOSECURITY cookie. If omitted, reads interactively with hidden input.
    #[arg(long)]
    cookie: Option<String>,

    /// Save without checking the cookie against the users API
    #[arg(long)]
    skip_verify: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.unwrap_or_else(config::default_config_path);
    let mut app_config = AppConfig::load(&config_path)?;

    println!("=== Robux Monitor Setup ===");
    println!("Press Enter to keep the current value.\n");

    // ── Step 1: Secrets ────────────────────────────────────────────
    app_config.webhook_url = prompt_secret("Discord webhook URL", &app_config.webhook_url)?;
    app_config.cookie = match cli.cookie {
        Some(cookie) => sanitize(cookie.trim()),
        None => prompt_secret(".ROBLOSECURITY cookie", &app_config.cookie)?,
    };

    // ── Step 2: Display and polling ────────────────────────────────
    app_config.emoji_id = prompt_line("Discord emoji id", &app_config.emoji_id)?;
    app_config.emoji_name = prompt_line("Discord emoji name", &app_config.emoji_name)?;
    app_config.check_interval = prompt_line(
        "Check interval in seconds (min 10)",
        &app_config.check_interval,
    )?;
    let choices = Timeframe::ALL.map(|t| t.as_str()).join("/");
    app_config.timeframe = prompt_line(
        &format!("Totals timeframe ({choices})"),
        &app_config.timeframe,
    )?;
    println!();

    // ── Step 3: Validate ───────────────────────────────────────────
    println!("Validating configuration...");
    app_config.validate()?;
    let secs = effective_interval_secs(&app_config.check_interval);
    if app_config.check_interval.trim() != secs.to_string() {
        println!("  Check interval raised to the {secs}s minimum");
        app_config.check_interval = secs.to_string();
    }
    println!("  Configuration is valid");
    println!();

    // ── Step 4: Verify the cookie ──────────────────────────────────
    if cli.skip_verify {
        println!("Skipping cookie verification");
    } else {
        println!("Verifying session cookie...");
        let client = RobloxClient::new(&app_config.cookie, RateLimiter::shared())?;
        match client.authenticated_user().await {
            Ok(user) => println!("  Authenticated as {} (id {})", user.name, user.id),
            Err(e) if e.is_unauthorized() => {
                bail!("the cookie was rejected, copy a fresh .ROBLOSECURITY value and retry")
            }
            Err(e) => return Err(e).context("could not verify the cookie"),
        }
    }
    println!();

    // ── Step 5: Save ───────────────────────────────────────────────
    println!("Saving {}...", config_path.display());
    app_config.save(&config_path)?;
    println!("  Config saved (owner read/write only)");
    println!();

    // ── Summary ────────────────────────────────────────────────────
    println!("=== Setup Complete ===");
    println!();
    for line in app_config.summary() {
        println!("  {line}");
    }
    println!();
    println!("Next steps:");
    println!("  cargo run --bin robux-monitor");

    Ok(())
}

fn prompt_secret(label: &str, current: &str) -> Result<String> {
    let hint = if current.is_empty() {
        ""
    } else {
        " [keep current]"
    };
    let answer = rpassword::prompt_password(format!("{label}{hint}: "))
        .with_context(|| format!("failed to read {label}"))?;
    Ok(keep_or_replace(&answer, current))
}

fn prompt_line(label: &str, current: &str) -> Result<String> {
    if current.is_empty() {
        print!("{label}: ");
    } else {
        print!("{label} [{current}]: ");
    }
    io::stdout().flush()?;

    let mut answer = String::new();
    io::stdin()
        .lock()
        .read_line(&mut answer)
        .with_context(|| format!("failed to read {label}"))?;
    Ok(keep_or_replace(&answer, current))
}

fn keep_or_replace(answer: &str, current: &str) -> String {
    let answer = answer.trim();
    if answer.is_empty() {
        current.to_string()
    } else {
        sanitize(answer)
    }
}
