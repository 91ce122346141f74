use std::time::{Duration, Instant};

use tracing::{info, warn};

/// Consecutive failed polls before the service is declared unhealthy.
pub const FAILURE_THRESHOLD: u32 = 3;

/// Minimum time between two "unhealthy" alerts for the same outage.
pub const ALERT_COOLDOWN: Duration = Duration::from_secs(15 * 60);

/// Alert produced by [`HealthTracker`] for the notifier.
#[derive(Debug, Clone, PartialEq)]
pub enum HealthAlert {
    Unhealthy { streak: u32, reason: String },
    Recovered { downtime: Duration },
}

/// Tracks consecutive poll failures and decides when to raise an alert.
#[derive(Debug)]
pub struct HealthTracker {
    threshold: u32,
    cooldown: Duration,
    streak: u32,
    /// When the failing streak began (first failed poll).
    outage_started: Option<Instant>,
    /// Set once the streak reached the threshold.
    declared: bool,
    last_alert: Option<Instant>,
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new(FAILURE_THRESHOLD, ALERT_COOLDOWN)
    }
}

impl HealthTracker {
    pub fn new(threshold: u32, cooldown: Duration) -> Self {
        Self {
            threshold: threshold.max(1),
            cooldown,
            streak: 0,
            outage_started: None,
            declared: false,
            last_alert: None,
        }
    }

    pub fn streak(&self) -> u32 {
        self.streak
    }

    pub fn is_unhealthy(&self) -> bool {
        self.declared
    }

    /// Record a failed poll at `now`.
    pub fn record_failure(&mut self, now: Instant, reason: &str) -> Option<HealthAlert> {
        self.streak = self.streak.saturating_add(1);
        self.outage_started.get_or_insert(now);

        if self.streak < self.threshold {
            return None;
        }
        self.declared = true;

        let cooled_down = self
            .last_alert
            .is_none_or(|at| now.saturating_duration_since(at) >= self.cooldown);
        if !cooled_down {
            return None;
        }

        warn!(
            "Remote API unhealthy after {} consecutive failures: {reason}",
            self.streak
        );
        self.last_alert = Some(now);
        Some(HealthAlert::Unhealthy {
            streak: self.streak,
            reason: reason.to_string(),
        })
    }

    /// Record a successful poll at `now`.
    pub fn record_success(&mut self, now: Instant) -> Option<HealthAlert> {
        let started = self.outage_started.take();
        let was_declared = std::mem::replace(&mut self.declared, false);
        self.streak = 0;
        self.last_alert = None;

        let started = started.filter(|_| was_declared)?;
        let downtime = now.saturating_duration_since(started);
        info!("Remote API recovered after {:.1}s", downtime.as_secs_f64());
        Some(HealthAlert::Recovered { downtime })
    }
}
