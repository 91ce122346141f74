pub mod api;
pub mod config;
pub mod engine;
pub mod health;
pub mod monitor;
pub mod notifier;
pub mod reporter;
pub mod snapshot;
pub mod throttle;
pub mod types;

/// Roblox users API base URL (authenticated-user lookup, profiles)
pub const USERS_API_BASE: &str = "https://users.roblox.com";

/// Roblox economy API base URL (transaction totals, currency balance)
pub const ECONOMY_API_BASE: &str = "https://economy.roblox.com";

/// Name of the session cookie every Roblox request is authenticated with.
pub const SESSION_COOKIE: &str = ".ROBLOSECURITY";
