use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, info, warn};
use url::Url;

use crate::engine::net_delta;
use crate::throttle::RateLimiter;
use crate::types::{AccountStatus, Change, Direction, TotalsDiff};

pub const COLOR_GREEN: u32 = 0x00ff00;
pub const COLOR_RED: u32 = 0xff0000;

/// Hosts that serve Discord incoming webhooks.
const WEBHOOK_HOSTS: [&str; 4] = [
    "discord.com",
    "discordapp.com",
    "canary.discord.com",
    "ptb.discord.com",
];

const WEBHOOK_PATH_PREFIX: &str = "/api/webhooks/";

/// Webhook delivery timeout.
const SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// True when `url` is an https Discord webhook URL.
pub fn is_discord_webhook_url(url: &str) -> bool {
    let Ok(parsed) = Url::parse(url.trim()) else {
        return false;
    };
    parsed.scheme() == "https"
        && parsed
            .host_str()
            .is_some_and(|host| WEBHOOK_HOSTS.contains(&host))
        && parsed.path().starts_with(WEBHOOK_PATH_PREFIX)
}

/// Abbreviate large numbers with K/M/B/T/Q suffixes, keeping the sign.
pub fn abbreviate_number(num: i64) -> String {
    const UNITS: [(f64, &str); 5] = [
        (1e15, "Q"),
        (1e12, "T"),
        (1e9, "B"),
        (1e6, "M"),
        (1e3, "K"),
    ];
    let abs = num.unsigned_abs() as f64;
    for (limit, suffix) in UNITS {
        if abs >= limit {
            return format!("{:.2}{suffix}", num as f64 / limit);
        }
    }
    num.to_string()
}

/// Render a custom emoji reference for an embed.
pub fn format_emoji(name: &str, id: &str) -> String {
    if id.is_empty() {
        format!(":{name}:")
    } else {
        format!("<:{name}:{id}>")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

impl EmbedField {
    fn new(name: impl Into<String>, value: impl Into<String>, inline: bool) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            inline,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbedFooter {
    pub text: String,
}

/// One Discord embed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Embed {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub color: u32,
    pub fields: Vec<EmbedField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<EmbedFooter>,
    pub timestamp: String,
}

impl Embed {
    fn new(title: impl Into<String>, color: u32) -> Self {
        Self {
            title: title.into(),
            description: None,
            color,
            fields: Vec::new(),
            footer: None,
            timestamp: Utc::now().to_rfc3339(),
        }
    }

    fn description(mut self, text: impl Into<String>) -> Self {
        self.description = Some(text.into());
        self
    }

    fn footer(mut self, text: impl Into<String>) -> Self {
        self.footer = Some(EmbedFooter { text: text.into() });
        self
    }

    fn field(mut self, field: EmbedField) -> Self {
        self.fields.push(field);
        self
    }
}

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    embeds: [&'a Embed; 1],
}

// ── Embed builders ─────────────────────────────────────────────────

/// One field per changed metric; green unless the totals went down overall.
pub fn transactions_embed(diff: &TotalsDiff, emoji: &str, timeframe: &str) -> Embed {
    let color = if net_delta(diff) >= 0 {
        COLOR_GREEN
    } else {
        COLOR_RED
    };
    diff.iter().fold(
        Embed::new(":bell: Roblox Transaction Data Changed!", color)
            .description(format!("The transaction totals ({timeframe}) have been updated"))
            .footer("Roblox Transaction Monitor"),
        |embed, (metric, change)| {
            embed.field(EmbedField::new(
                metric.as_str(),
                format!(
                    "From {emoji} {} To {emoji} {}",
                    abbreviate_number(change.old),
                    abbreviate_number(change.new)
                ),
                false,
            ))
        },
    )
}

pub fn balance_embed(change: Change, emoji: &str) -> Embed {
    let color = match change.direction() {
        Direction::Decrease => COLOR_RED,
        _ => COLOR_GREEN,
    };
    Embed::new(":bell: Robux Balance Changed!", color)
        .description("The Robux balance has changed")
        .field(EmbedField::new(
            "Before",
            format!("{emoji} {}", abbreviate_number(change.old)),
            true,
        ))
        .field(EmbedField::new(
            "After",
            format!("{emoji} {}", abbreviate_number(change.new)),
            true,
        ))
        .footer("Roblox Balance Monitor")
}

pub fn status_embed(current: &AccountStatus, previous: Option<&AccountStatus>) -> Embed {
    let (color, label) = if current.is_banned {
        (COLOR_RED, ":no_entry: BANNED")
    } else {
        (COLOR_GREEN, ":white_check_mark: ACTIVE")
    };
    let mut embed = Embed::new(":warning: Roblox Account Status Update :warning:", color)
        .field(EmbedField::new("Username", current.username.as_str(), true))
        .field(EmbedField::new("Account Created", current.created_at.as_str(), true))
        .field(EmbedField::new("Status", label, false))
        .footer("Roblox Account Status Monitor");
    if previous.is_some_and(|prev| prev != current) {
        embed = embed.description("Account status has changed!");
    }
    embed
}

pub fn unhealthy_embed(streak: u32, reason: &str, endpoints: &[String]) -> Embed {
    let failures = streak.to_string();
    Embed::new(":warning: Roblox API Connectivity Failure :warning:", COLOR_RED)
        .description("Roblox services have been unreachable for several consecutive checks")
        .field(EmbedField::new(":exclamation: Failure Details", reason, false))
        .field(EmbedField::new(":hourglass: Consecutive Failures", failures, true))
        .field(EmbedField::new(
            ":desktop: System",
            format!("{} {}", std::env::consts::OS, std::env::consts::ARCH),
            true,
        ))
        .field(EmbedField::new(":link: Endpoints Checked", endpoints.join("\n"), false))
        .footer("Roblox Transaction Monitor - Automatic API Health Check")
}

pub fn recovered_embed(downtime: Duration) -> Embed {
    Embed::new(":bell: Roblox API Connectivity Alert", COLOR_GREEN)
        .description("Roblox API Downtime Status: **RECOVERED**")
        .field(EmbedField::new(
            "Downtime Duration",
            format!("{:.2} seconds", downtime.as_secs_f64()),
            false,
        ))
}

// ── Delivery ───────────────────────────────────────────────────────

/// Sends embeds to a Discord webhook.
///
/// Delivery problems are logged and swallowed; senders only get a `bool`.
#[derive(Debug, Clone)]
pub struct Notifier {
    http: Client,
    webhook_url: Option<String>,
    emoji: String,
    limiter: Arc<RateLimiter>,
}

impl Notifier {
    /// Notifier for a Discord webhook. Any other URL disables delivery.
    pub fn new(
        webhook_url: &str,
        emoji_name: &str,
        emoji_id: &str,
        limiter: Arc<RateLimiter>,
    ) -> Self {
        let url = webhook_url.trim();
        let webhook_url = if is_discord_webhook_url(url) {
            Some(url.to_string())
        } else {
            warn!("Webhook URL is not a Discord webhook, notifications are disabled");
            None
        };
        Self::build(webhook_url, emoji_name, emoji_id, limiter)
    }

    /// Notifier that posts to `webhook_url` without the Discord host check.
    pub fn new_unchecked(
        webhook_url: &str,
        emoji_name: &str,
        emoji_id: &str,
        limiter: Arc<RateLimiter>,
    ) -> Self {
        Self::build(Some(webhook_url.to_string()), emoji_name, emoji_id, limiter)
    }

    fn build(
        webhook_url: Option<String>,
        emoji_name: &str,
        emoji_id: &str,
        limiter: Arc<RateLimiter>,
    ) -> Self {
        let http = Client::builder()
            .timeout(SEND_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                warn!("Falling back to default HTTP client for webhooks: {e}");
                Client::new()
            });
        Self {
            http,
            webhook_url,
            emoji: format_emoji(emoji_name, emoji_id),
            limiter,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.webhook_url.is_some()
    }

    pub fn emoji(&self) -> &str {
        &self.emoji
    }

    pub async fn transactions_changed(&self, diff: &TotalsDiff, timeframe: &str) -> bool {
        if diff.is_empty() {
            return false;
        }
        self.send(&transactions_embed(diff, &self.emoji, timeframe)).await
    }

    pub async fn balance_changed(&self, change: Change) -> bool {
        self.send(&balance_embed(change, &self.emoji)).await
    }

    pub async fn account_status(
        &self,
        current: &AccountStatus,
        previous: Option<&AccountStatus>,
    ) -> bool {
        self.send(&status_embed(current, previous)).await
    }

    pub async fn service_unhealthy(&self, streak: u32, reason: &str, endpoints: &[String]) -> bool {
        self.send(&unhealthy_embed(streak, reason, endpoints)).await
    }

    pub async fn service_recovered(&self, downtime: Duration) -> bool {
        self.send(&recovered_embed(downtime)).await
    }

    /// POST one embed. Returns whether the webhook accepted it.
    pub async fn send(&self, embed: &Embed) -> bool {
        let Some(url) = &self.webhook_url else {
            debug!("Notifier disabled, dropping \"{}\"", embed.title);
            return false;
        };

        self.limiter.acquire().await;
        let payload = WebhookPayload { embeds: [embed] };
        match self.http.post(url).json(&payload).send().await {
            Ok(resp) if resp.status().is_success() => {
                info!("Webhook notification sent: {}", embed.title);
                true
            }
            Ok(resp) => {
                warn!(
                    "Webhook rejected \"{}\" with HTTP {}",
                    embed.title,
                    resp.status()
                );
                false
            }
            Err(e) => {
                warn!("Failed to send webhook \"{}\": {e}", embed.title);
                false
            }
        }
    }
}
