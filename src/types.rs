use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The fixed set of metrics returned by the transaction-totals summary.
pub const TRANSACTION_METRICS: [&str; 25] = [
    "salesTotal",
    "purchasesTotal",
    "affiliateSalesTotal",
    "groupPayoutsTotal",
    "currencyPurchasesTotal",
    "premiumStipendsTotal",
    "tradeSystemEarningsTotal",
    "tradeSystemCostsTotal",
    "premiumPayoutsTotal",
    "groupPremiumPayoutsTotal",
    "adSpendTotal",
    "developerExchangeTotal",
    "pendingRobuxTotal",
    "incomingRobuxTotal",
    "outgoingRobuxTotal",
    "individualToGroupTotal",
    "csAdjustmentTotal",
    "adsRevsharePayoutsTotal",
    "groupAdsRevsharePayoutsTotal",
    "subscriptionsRevshareTotal",
    "groupSubscriptionsRevshareTotal",
    "subscriptionsRevshareOutgoingTotal",
    "groupSubscriptionsRevshareOutgoingTotal",
    "publishingAdvanceRebatesTotal",
    "affiliatePayoutTotal",
];

/// Transaction totals keyed by metric name.
///
/// Always holds every entry of [`TRANSACTION_METRICS`]; metrics missing from
/// the source default to zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<String, Value>")]
pub struct TransactionTotals(BTreeMap<String, i64>);

impl TransactionTotals {
    /// All metrics at zero (the first-run snapshot).
    pub fn zeroed() -> Self {
        Self(
            TRANSACTION_METRICS
                .iter()
                .map(|k| (k.to_string(), 0))
                .collect(),
        )
    }

    /// Build from arbitrary `(metric, value)` pairs. Unknown metrics are
    /// dropped, missing ones are zero.
    pub fn from_pairs<I, K>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, i64)>,
        K: AsRef<str>,
    {
        let mut totals = Self::zeroed();
        for (key, value) in pairs {
            if let Some(slot) = totals.0.get_mut(key.as_ref()) {
                *slot = value;
            }
        }
        totals
    }

    pub fn get(&self, metric: &str) -> i64 {
        self.0.get(metric).copied().unwrap_or(0)
    }

    pub fn set(&mut self, metric: &str, value: i64) {
        if let Some(slot) = self.0.get_mut(metric) {
            *slot = value;
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, i64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

impl Default for TransactionTotals {
    fn default() -> Self {
        Self::zeroed()
    }
}

impl From<BTreeMap<String, Value>> for TransactionTotals {
    fn from(raw: BTreeMap<String, Value>) -> Self {
        Self::from_pairs(raw.into_iter().map(|(k, v)| (k, v.as_i64().unwrap_or(0))))
    }
}

/// An `(old, new)` pair for a single value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    pub old: i64,
    pub new: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Increase,
    Decrease,
    Unchanged,
}

impl Change {
    pub fn new(old: i64, new: i64) -> Self {
        Self { old, new }
    }

    pub fn delta(&self) -> i64 {
        self.new.saturating_sub(self.old)
    }

    pub fn direction(&self) -> Direction {
        match self.new.cmp(&self.old) {
            std::cmp::Ordering::Greater => Direction::Increase,
            std::cmp::Ordering::Less => Direction::Decrease,
            std::cmp::Ordering::Equal => Direction::Unchanged,
        }
    }
}

/// Changed metrics only, keyed by metric name.
pub type TotalsDiff = BTreeMap<String, Change>;

/// Public profile state of the monitored account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountStatus {
    pub is_banned: bool,
    pub username: String,
    pub created_at: String,
}

/// Everything fetched from the remote API in one tick.
#[derive(Debug, Clone)]
pub struct RemoteState {
    pub user_id: u64,
    pub totals: TransactionTotals,
    pub balance: i64,
    /// `None` when the profile lookup failed for a reason other than auth.
    pub status: Option<AccountStatus>,
}

/// Machine-readable event emitted for every detected change.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MonitorEvent {
    TransactionsChanged {
        timestamp: String,
        timeframe: String,
        changes: TotalsDiff,
    },
    BalanceChanged {
        timestamp: String,
        change: Change,
    },
    AccountStatusChanged {
        timestamp: String,
        previous: Option<AccountStatus>,
        current: AccountStatus,
    },
    ServiceUnhealthy {
        timestamp: String,
        streak: u32,
        reason: String,
    },
    ServiceRecovered {
        timestamp: String,
        downtime_secs: f64,
    },
    AuthExpired {
        timestamp: String,
    },
}
