use std::time::{Duration, Instant};

use anyhow::Result;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::api::{ApiError, RobloxClient};
use crate::config::{AppConfig, Timeframe};
use crate::engine::{balance_change, diff_totals, status_changed};
use crate::health::{HealthAlert, HealthTracker};
use crate::notifier::{Notifier, abbreviate_number};
use crate::reporter::report_event;
use crate::snapshot::SnapshotStore;
use crate::types::{AccountStatus, Change, MonitorEvent, RemoteState, TotalsDiff};

/// Wait after an unexpected error before the next attempt.
pub const RETRY_DELAY: Duration = Duration::from_secs(5);

/// Minimum time between two account status notifications.
pub const STATUS_NOTIFY_COOLDOWN: Duration = Duration::from_secs(15 * 60);

/// Loop timing and reporting options.
#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub interval: Duration,
    pub timeframe: Timeframe,
    pub retry_delay: Duration,
    pub status_cooldown: Duration,
}

impl MonitorSettings {
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        Ok(Self {
            interval: config.interval(),
            timeframe: config.parsed_timeframe()?,
            retry_delay: RETRY_DELAY,
            status_cooldown: STATUS_NOTIFY_COOLDOWN,
        })
    }
}

/// What one successful check found.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleReport {
    pub transaction_changes: TotalsDiff,
    pub balance_change: Option<Change>,
    pub status_notified: bool,
}

impl CycleReport {
    pub fn has_changes(&self) -> bool {
        !self.transaction_changes.is_empty() || self.balance_change.is_some()
    }
}

/// Result of a single poll.
#[derive(Debug, Clone, PartialEq)]
pub enum Tick {
    /// Remote state fetched, compared and persisted.
    Checked(CycleReport),
    /// The remote API failed; nothing was compared or persisted.
    Unavailable,
    /// The session cookie was rejected.
    AuthExpired,
}

/// Why [`Monitor::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Requested,
    AuthExpired,
}

/// The fetch → diff → notify → persist loop.
pub struct Monitor {
    client: RobloxClient,
    store: SnapshotStore,
    notifier: Notifier,
    settings: MonitorSettings,
    health: HealthTracker,
    user_id: Option<u64>,
    last_status: Option<AccountStatus>,
    last_status_notice: Option<Instant>,
}

impl Monitor {
    pub fn new(
        client: RobloxClient,
        store: SnapshotStore,
        notifier: Notifier,
        settings: MonitorSettings,
    ) -> Self {
        Self {
            client,
            store,
            notifier,
            settings,
            health: HealthTracker::default(),
            user_id: None,
            last_status: None,
            last_status_notice: None,
        }
    }

    pub fn with_health_tracker(mut self, health: HealthTracker) -> Self {
        self.health = health;
        self
    }

    pub fn settings(&self) -> &MonitorSettings {
        &self.settings
    }

    pub fn last_status(&self) -> Option<&AccountStatus> {
        self.last_status.as_ref()
    }

    /// Poll until `stop` flips to `true` or the session cookie is rejected.
    ///
    /// The flag is checked before every poll and raced against every sleep;
    /// a poll already in flight is allowed to finish.
    pub async fn run(&mut self, mut stop: watch::Receiver<bool>) -> StopReason {
        info!(
            "Monitoring started (interval: {}s, timeframe: {})",
            self.settings.interval.as_secs(),
            self.settings.timeframe
        );

        loop {
            if *stop.borrow_and_update() {
                info!("Monitoring stopped");
                return StopReason::Requested;
            }

            let wait = match self.tick().await {
                Ok(Tick::AuthExpired) => {
                    error!("Monitoring halted: the session cookie must be renewed");
                    return StopReason::AuthExpired;
                }
                Ok(_) => self.settings.interval,
                Err(e) => {
                    error!("Error in monitoring loop: {e:#}");
                    self.settings.retry_delay
                }
            };

            debug!("Next check in {}s", wait.as_secs());
            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                changed = stop.changed() => {
                    if changed.is_err() {
                        info!("Stop handle dropped, monitoring stopped");
                        return StopReason::Requested;
                    }
                }
            }
        }
    }

    /// One poll: fetch remote state, then diff, notify and persist.
    pub async fn tick(&mut self) -> Result<Tick> {
        let remote = match self.fetch_remote().await {
            Ok(remote) => remote,
            Err(e) if e.is_unauthorized() => {
                error!("{e}");
                report_event(&MonitorEvent::AuthExpired {
                    timestamp: now_rfc3339(),
                });
                return Ok(Tick::AuthExpired);
            }
            Err(e) => {
                warn!("Skipping check, remote API unavailable: {e}");
                if let Some(alert) = self.health.record_failure(Instant::now(), &e.to_string()) {
                    self.raise(alert).await;
                }
                return Ok(Tick::Unavailable);
            }
        };

        if let Some(alert) = self.health.record_success(Instant::now()) {
            self.raise(alert).await;
        }
        self.user_id = Some(remote.user_id);

        let report = self.apply(remote).await?;
        Ok(Tick::Checked(report))
    }

    async fn fetch_remote(&self) -> Result<RemoteState, ApiError> {
        let user = self.client.authenticated_user().await?;
        let totals = self
            .client
            .transaction_totals(user.id, self.settings.timeframe)
            .await?;
        let balance = self.client.balance(user.id).await?;
        let status = match self.client.account_status(user.id).await {
            Ok(status) => Some(status),
            Err(e) if e.is_unauthorized() => return Err(e),
            Err(e) => {
                warn!("Account status check failed: {e}");
                None
            }
        };

        Ok(RemoteState {
            user_id: user.id,
            totals,
            balance,
            status,
        })
    }

    /// Diff, notify and persist each value in turn.
    ///
    /// A notice goes out before its snapshot is written. If the write fails
    /// the error is returned and the next poll notifies the same change again.
    async fn apply(&mut self, remote: RemoteState) -> Result<CycleReport> {
        let mut report = CycleReport::default();

        let previous = self.store.load_transactions();
        let changes = diff_totals(&previous, &remote.totals);
        if changes.is_empty() {
            debug!("No transaction changes");
        } else {
            info!("Detected {} transaction change(s)", changes.len());
            for (metric, change) in &changes {
                info!(
                    "  {metric}: {} -> {}",
                    abbreviate_number(change.old),
                    abbreviate_number(change.new)
                );
            }
            report_event(&MonitorEvent::TransactionsChanged {
                timestamp: now_rfc3339(),
                timeframe: self.settings.timeframe.to_string(),
                changes: changes.clone(),
            });
            self.notifier
                .transactions_changed(&changes, self.settings.timeframe.as_str())
                .await;
            if let Err(e) = self.store.save_transactions(&remote.totals) {
                warn!("Transaction changes were notified but not saved, expect a repeat notice");
                return Err(e);
            }
        }
        report.transaction_changes = changes;

        let last_balance = self.store.load_balance();
        if let Some(change) = balance_change(last_balance, remote.balance) {
            let verb = if change.new > change.old {
                "increased"
            } else {
                "decreased"
            };
            info!(
                "Robux {verb}: {} -> {}",
                abbreviate_number(change.old),
                abbreviate_number(change.new)
            );
            report_event(&MonitorEvent::BalanceChanged {
                timestamp: now_rfc3339(),
                change,
            });
            self.notifier.balance_changed(change).await;
            if let Err(e) = self.store.save_balance(remote.balance) {
                warn!("Balance change was notified but not saved, expect a repeat notice");
                return Err(e);
            }
            report.balance_change = Some(change);
        }

        if let Some(status) = remote.status {
            report.status_notified = self.check_status(status, Instant::now()).await;
        }

        Ok(report)
    }

    /// Compare the account status against the last one seen.
    ///
    /// A change inside the cooldown window is not recorded, so it is
    /// reported by the first poll after the window closes.
    async fn check_status(&mut self, current: AccountStatus, now: Instant) -> bool {
        if !status_changed(self.last_status.as_ref(), &current) {
            return false;
        }
        if let Some(at) = self.last_status_notice {
            if now.saturating_duration_since(at) < self.settings.status_cooldown {
                info!("Skipping account status notification due to cooldown");
                return false;
            }
        }

        let label = if current.is_banned {
            "BANNED"
        } else {
            "ACTIVE"
        };
        info!("Account {label}: {}", current.username);
        report_event(&MonitorEvent::AccountStatusChanged {
            timestamp: now_rfc3339(),
            previous: self.last_status.clone(),
            current: current.clone(),
        });
        self.notifier
            .account_status(&current, self.last_status.as_ref())
            .await;
        self.last_status_notice = Some(now);
        self.last_status = Some(current);
        true
    }

    async fn raise(&self, alert: HealthAlert) {
        match alert {
            HealthAlert::Unhealthy { streak, reason } => {
                report_event(&MonitorEvent::ServiceUnhealthy {
                    timestamp: now_rfc3339(),
                    streak,
                    reason: reason.clone(),
                });
                self.notifier
                    .service_unhealthy(streak, &reason, &self.endpoints())
                    .await;
            }
            HealthAlert::Recovered { downtime } => {
                report_event(&MonitorEvent::ServiceRecovered {
                    timestamp: now_rfc3339(),
                    downtime_secs: downtime.as_secs_f64(),
                });
                self.notifier.service_recovered(downtime).await;
            }
        }
    }

    /// The endpoints polled each tick, for outage reports.
    fn endpoints(&self) -> Vec<String> {
        let user = self
            .user_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "{userId}".to_string());
        vec![
            format!("{}/v1/users/authenticated", self.client.users_base()),
            format!(
                "{}/v2/users/{user}/transaction-totals?timeFrame={}&transactionType=summary",
                self.client.economy_base(),
                self.settings.timeframe
            ),
            format!("{}/v1/users/{user}/currency", self.client.economy_base()),
        ]
    }
}

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}
