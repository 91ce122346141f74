use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::notifier::is_discord_webhook_url;
use crate::snapshot::write_json_atomic;

/// Application directory name, created under the user's home directory.
pub const APP_DIR_NAME: &str = ".roblox_transaction_history";

/// Config file name inside the application directory.
pub const CONFIG_FILE_NAME: &str = "config.json";

/// Snapshot subdirectory inside the application directory.
pub const SNAPSHOT_DIR_NAME: &str = "transaction_info";

/// Shortest poll interval the monitor will honor.
pub const MIN_INTERVAL_SECS: u64 = 10;

/// Interval used when `CHECK_INTERVAL` is not an integer.
pub const FALLBACK_INTERVAL_SECS: u64 = 60;

/// Every genuine `.ROBLOSECURITY` value starts with this banner.
pub const COOKIE_PREFIX: &str = "_|WARNING:-DO-NOT-SHARE-THIS";

const KEY_WEBHOOK_URL: &str = "DISCORD_WEBHOOK_URL";
const KEY_COOKIE: &str = "ROBLOSECURITY";
const KEY_EMOJI_ID: &str = "DISCORD_EMOJI_ID";
const KEY_EMOJI_NAME: &str = "DISCORD_EMOJI_NAME";
const KEY_INTERVAL: &str = "CHECK_INTERVAL";
const KEY_TIMEFRAME: &str = "TOTAL_CHECKS_TYPE";

/// `~/.roblox_transaction_history/` (falls back to the working directory
/// when no home directory is known).
pub fn app_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
}

pub fn default_config_path() -> PathBuf {
    app_dir().join(CONFIG_FILE_NAME)
}

pub fn default_snapshot_dir() -> PathBuf {
    app_dir().join(SNAPSHOT_DIR_NAME)
}

/// Reporting window for the transaction-totals endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Timeframe {
    #[default]
    Day,
    Week,
    Month,
    Year,
}

impl Timeframe {
    pub const ALL: [Timeframe; 4] = [Self::Day, Self::Week, Self::Month, Self::Year];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Day => "Day",
            Self::Week => "Week",
            Self::Month => "Month",
            Self::Year => "Year",
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Timeframe {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|tf| tf.as_str() == s.trim())
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "invalid {KEY_TIMEFRAME} {s:?}, must be one of: Day, Week, Month, Year"
                )
            })
    }
}

/// Settings persisted to `config.json`.
///
/// Every value is stored as a string under the key names the file has
/// always used, so files written by older versions keep loading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(rename = "DISCORD_WEBHOOK_URL")]
    pub webhook_url: String,
    #[serde(rename = "ROBLOSECURITY")]
    pub cookie: String,
    #[serde(rename = "DISCORD_EMOJI_ID")]
    pub emoji_id: String,
    #[serde(rename = "DISCORD_EMOJI_NAME")]
    pub emoji_name: String,
    #[serde(rename = "CHECK_INTERVAL")]
    pub check_interval: String,
    #[serde(rename = "TOTAL_CHECKS_TYPE")]
    pub timeframe: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            webhook_url: String::new(),
            cookie: String::new(),
            emoji_id: String::new(),
            emoji_name: "robux".to_string(),
            check_interval: FALLBACK_INTERVAL_SECS.to_string(),
            timeframe: Timeframe::Day.to_string(),
        }
    }
}

impl AppConfig {
    fn fields_mut(&mut self) -> [(&'static str, &mut String); 6] {
        [
            (KEY_WEBHOOK_URL, &mut self.webhook_url),
            (KEY_COOKIE, &mut self.cookie),
            (KEY_EMOJI_ID, &mut self.emoji_id),
            (KEY_EMOJI_NAME, &mut self.emoji_name),
            (KEY_INTERVAL, &mut self.check_interval),
            (KEY_TIMEFRAME, &mut self.timeframe),
        ]
    }

    /// Load config from the given JSON file path.
    ///
    /// A missing file yields the defaults. Missing keys are back-filled with
    /// their defaults; numbers are accepted where strings are expected. A
    /// file that is not a JSON object is logged and replaced by defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = Self::default();
        if !path.exists() {
            debug!("No config at {}, using defaults", path.display());
            return Ok(config);
        }

        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let raw: Map<String, Value> = match serde_json::from_str(&contents) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Invalid config {}: {e}, using defaults", path.display());
                return Ok(config);
            }
        };

        for (key, slot) in config.fields_mut() {
            match raw.get(key) {
                Some(Value::String(s)) => *slot = sanitize(s),
                Some(Value::Number(n)) => *slot = n.to_string(),
                Some(other) => {
                    warn!("Ignoring non-string {key} ({other}), using default {slot:?}");
                }
                None => {
                    warn!("Missing key {key} in config, using default {slot:?}");
                }
            }
        }
        Ok(config)
    }

    /// Load config and write it straight back, so the file on disk always
    /// carries every key.
    pub fn load_or_init(path: &Path) -> Result<Self> {
        let existed = path.exists();
        let config = Self::load(path)?;
        config.save(path)?;
        if !existed {
            info!("Created {} with default values", path.display());
        }
        Ok(config)
    }

    /// Write config to the given JSON file path.
    ///
    /// The parent directory is created owner-only and the file itself is
    /// readable by the owner only, since it holds the session cookie.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            create_private_dir(parent)?;
        }
        write_json_atomic(path, self, Some(0o600))
    }

    /// Replace values with same-named environment variables, when set.
    ///
    /// Returns the keys that were overridden.
    pub fn apply_env_overrides(&mut self) -> Vec<&'static str> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides<F>(&mut self, lookup: F) -> Vec<&'static str>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut applied = Vec::new();
        for (key, slot) in self.fields_mut() {
            if let Some(value) = lookup(key).filter(|v| !v.trim().is_empty()) {
                *slot = sanitize(value.trim());
                applied.push(key);
            }
        }
        applied
    }

    /// Poll interval actually used by the monitor.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(effective_interval_secs(&self.check_interval))
    }

    pub fn parsed_timeframe(&self) -> Result<Timeframe> {
        self.timeframe.parse()
    }

    /// Every problem that would stop the monitor from starting.
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();

        if self.webhook_url.is_empty() {
            problems.push(format!("{KEY_WEBHOOK_URL} is required"));
        } else if !is_discord_webhook_url(&self.webhook_url) {
            problems.push(format!("{KEY_WEBHOOK_URL} is not a Discord webhook URL"));
        }

        if self.cookie.is_empty() {
            problems.push(format!("{KEY_COOKIE} is required"));
        } else if !is_valid_cookie(&self.cookie) {
            problems.push(format!(
                "{KEY_COOKIE} has an invalid format, it must start with '{COOKIE_PREFIX}'"
            ));
        }

        if self.emoji_id.is_empty() {
            problems.push(format!("{KEY_EMOJI_ID} is required"));
        } else if !is_valid_emoji_id(&self.emoji_id) {
            problems.push(format!("{KEY_EMOJI_ID} must be numeric"));
        }

        if self.emoji_name.trim().is_empty() {
            problems.push(format!("{KEY_EMOJI_NAME} is required"));
        }

        if self.check_interval.trim().parse::<u64>().is_err() {
            problems.push(format!("{KEY_INTERVAL} must be a whole number of seconds"));
        }

        if let Err(e) = self.parsed_timeframe() {
            problems.push(e.to_string());
        }

        problems
    }

    /// Fail with every problem listed when the config cannot be used.
    pub fn validate(&self) -> Result<()> {
        let problems = self.problems();
        if problems.is_empty() {
            return Ok(());
        }
        anyhow::bail!("invalid configuration:\n  - {}", problems.join("\n  - "))
    }

    /// Human-readable summary with secrets censored.
    pub fn summary(&self) -> Vec<String> {
        vec![
            format!("Webhook:   {}", censor(&self.webhook_url, 20, 10)),
            format!("Cookie:    {}", censor(&self.cookie, 30, 10)),
            format!("Emoji:     {}:{}", self.emoji_name, self.emoji_id),
            format!("Interval:  {}s", self.interval().as_secs()),
            format!("Timeframe: {}", self.timeframe),
        ]
    }
}

/// Parse a poll interval in seconds, clamped to [`MIN_INTERVAL_SECS`].
pub fn effective_interval_secs(raw: &str) -> u64 {
    match raw.trim().parse::<u64>() {
        Ok(secs) => secs.max(MIN_INTERVAL_SECS),
        Err(_) => FALLBACK_INTERVAL_SECS,
    }
}

pub fn is_valid_cookie(cookie: &str) -> bool {
    cookie.trim().starts_with(COOKIE_PREFIX)
}

pub fn is_valid_emoji_id(id: &str) -> bool {
    !id.is_empty() && id.chars().all(|c| c.is_ascii_digit())
}

/// Strip control characters that sneak in when pasting values.
pub fn sanitize(input: &str) -> String {
    input.chars().filter(|c| !c.is_control()).collect()
}

/// Keep the first `show_start` and last `show_end` characters.
pub fn censor(text: &str, show_start: usize, show_end: usize) -> String {
    let len = text.chars().count();
    if len == 0 {
        return String::new();
    }
    if len <= show_start + show_end {
        return "*".repeat(len);
    }
    let head: String = text.chars().take(show_start).collect();
    let tail: String = text.chars().skip(len - show_end).collect();
    format!("{head}...{tail}")
}

fn create_private_dir(dir: &Path) -> Result<()> {
    if dir.as_os_str().is_empty() || dir.exists() {
        return Ok(());
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        std::fs::DirBuilder::new()
            .recursive(true)
            .mode(0o700)
            .create(dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
    }
    #[cfg(not(unix))]
    std::fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const COOKIE: &str = "_|WARNING:-DO-NOT-SHARE-THIS.--Sharing-this-will-allow-someone|_abc";

    fn valid_config() -> AppConfig {
        AppConfig {
            webhook_url: "https://discord.com/api/webhooks/123/token".to_string(),
            cookie: COOKIE.to_string(),
            emoji_id: "1234567890".to_string(),
            emoji_name: "robux".to_string(),
            check_interval: "60".to_string(),
            timeframe: "Week".to_string(),
        }
    }

    #[test]
    fn load_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load(&dir.path().join("config.json")).unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.emoji_name, "robux");
        assert_eq!(config.check_interval, "60");
        assert_eq!(config.timeframe, "Day");
    }

    #[test]
    fn load_backfills_missing_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"ROBLOSECURITY": "abc", "CHECK_INTERVAL": 30}"#).unwrap();

        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.cookie, "abc");
        assert_eq!(config.check_interval, "30");
        assert_eq!(config.emoji_name, "robux");
        assert_eq!(config.timeframe, "Day");
    }

    #[test]
    fn load_or_init_writes_every_key_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, r#"{"DISCORD_EMOJI_ID": "42"}"#).unwrap();

        AppConfig::load_or_init(&path).unwrap();

        let on_disk: HashMap<String, String> =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(on_disk.len(), 6);
        assert_eq!(on_disk["DISCORD_EMOJI_ID"], "42");
        assert_eq!(on_disk["TOTAL_CHECKS_TYPE"], "Day");
    }

    #[test]
    fn load_malformed_json_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert_eq!(AppConfig::load(&path).unwrap(), AppConfig::default());
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app").join("config.json");
        let config = valid_config();
        config.save(&path).unwrap();
        assert_eq!(AppConfig::load(&path).unwrap(), config);
        assert!(!path.with_extension("tmp").exists());
    }

    #[cfg(unix)]
    #[test]
    fn save_restricts_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let app = dir.path().join("app");
        let path = app.join("config.json");
        valid_config().save(&path).unwrap();

        let file_mode = std::fs::metadata(&path).unwrap().permissions().mode();
        let dir_mode = std::fs::metadata(&app).unwrap().permissions().mode();
        assert_eq!(file_mode & 0o777, 0o600);
        assert_eq!(dir_mode & 0o777, 0o700);
    }

    #[cfg(unix)]
    #[test]
    fn save_over_stale_temp_file_keeps_cookie_private() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let stale = path.with_extension("tmp");
        std::fs::write(&stale, "{").unwrap();
        std::fs::set_permissions(&stale, std::fs::Permissions::from_mode(0o644)).unwrap();

        valid_config().save(&path).unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        assert_eq!(AppConfig::load(&path).unwrap(), valid_config());
    }

    #[test]
    fn interval_is_clamped_to_floor() {
        assert_eq!(effective_interval_secs("3"), 10);
        assert_eq!(effective_interval_secs("0"), 10);
        assert_eq!(effective_interval_secs("10"), 10);
        assert_eq!(effective_interval_secs(" 45 "), 45);
        assert_eq!(effective_interval_secs("soon"), 60);
        assert_eq!(effective_interval_secs("-5"), 60);

        let mut config = valid_config();
        config.check_interval = "5".to_string();
        assert_eq!(config.interval(), Duration::from_secs(10));
    }

    #[test]
    fn timeframe_parsing() {
        assert_eq!("Month".parse::<Timeframe>().unwrap(), Timeframe::Month);
        assert_eq!(Timeframe::Year.to_string(), "Year");
        assert!("day".parse::<Timeframe>().is_err());
        assert!("Fortnight".parse::<Timeframe>().is_err());
    }

    #[test]
    fn valid_config_has_no_problems() {
        assert!(valid_config().problems().is_empty());
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn default_config_reports_every_required_field() {
        let problems = AppConfig::default().problems();
        assert_eq!(problems.len(), 3);
        assert!(problems.iter().any(|p| p.contains("DISCORD_WEBHOOK_URL")));
        assert!(problems.iter().any(|p| p.contains("ROBLOSECURITY")));
        assert!(problems.iter().any(|p| p.contains("DISCORD_EMOJI_ID")));
    }

    #[test]
    fn problems_cover_bad_formats() {
        let config = AppConfig {
            webhook_url: "https://example.com/hook".to_string(),
            cookie: "not-a-cookie".to_string(),
            emoji_id: "12ab".to_string(),
            emoji_name: " ".to_string(),
            check_interval: "often".to_string(),
            timeframe: "Decade".to_string(),
        };
        assert_eq!(config.problems().len(), 6);
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("TOTAL_CHECKS_TYPE"));
        assert!(err.contains("must start with"));
    }

    #[test]
    fn overrides_replace_non_empty_values() {
        let mut config = AppConfig::default();
        let env: HashMap<&str, &str> =
            HashMap::from([("ROBLOSECURITY", " secret "), ("CHECK_INTERVAL", "")]);
        let applied = config.apply_overrides(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(applied, vec!["ROBLOSECURITY"]);
        assert_eq!(config.cookie, "secret");
        assert_eq!(config.check_interval, "60");
    }

    #[test]
    fn censor_hides_the_middle() {
        assert_eq!(censor("", 3, 2), "");
        assert_eq!(censor("short", 3, 2), "*****");
        assert_eq!(censor("abcdefghij", 3, 2), "abc...ij");
    }

    #[test]
    fn sanitize_strips_control_characters() {
        assert_eq!(sanitize("ab\u{7}c\n"), "abc");
    }

    #[test]
    fn summary_censors_secrets() {
        let summary = valid_config().summary().join("\n");
        assert!(!summary.contains(COOKIE));
        assert!(summary.contains("Timeframe: Week"));
    }
}
