use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::types::TransactionTotals;

/// File holding the last-seen transaction totals.
pub const TRANSACTIONS_FILE: &str = "last_transaction_data.json";

/// File holding the last-seen currency balance.
pub const BALANCE_FILE: &str = "last_robux.json";

#[derive(Debug, Default, Serialize, Deserialize)]
struct BalanceRecord {
    #[serde(default)]
    robux: i64,
}

/// Last-known remote values, persisted as two JSON files in one directory.
///
/// Reads never fail: a missing or unreadable file yields the zero
/// snapshot. Writes go through [`write_json_atomic`].
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Create the snapshot directory and seed the transaction file with
    /// zeroes if it does not exist yet.
    pub fn init(&self) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create {}", self.dir.display()))?;
        if !self.transactions_path().exists() {
            self.save_transactions(&TransactionTotals::zeroed())?;
            debug!("Seeded {}", self.transactions_path().display());
        }
        Ok(())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn transactions_path(&self) -> PathBuf {
        self.dir.join(TRANSACTIONS_FILE)
    }

    pub fn balance_path(&self) -> PathBuf {
        self.dir.join(BALANCE_FILE)
    }

    pub fn load_transactions(&self) -> TransactionTotals {
        read_json_or_default(&self.transactions_path())
    }

    pub fn save_transactions(&self, totals: &TransactionTotals) -> Result<()> {
        write_json_atomic(&self.transactions_path(), totals, None)
    }

    pub fn load_balance(&self) -> i64 {
        read_json_or_default::<BalanceRecord>(&self.balance_path()).robux
    }

    pub fn save_balance(&self, robux: i64) -> Result<()> {
        write_json_atomic(&self.balance_path(), &BalanceRecord { robux }, None)
    }
}

fn read_json_or_default<T: DeserializeOwned + Default>(path: &Path) -> T {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return T::default(),
        Err(e) => {
            warn!("Failed to read {}: {e}, using defaults", path.display());
            return T::default();
        }
    };
    match serde_json::from_str(&contents) {
        Ok(value) => value,
        Err(e) => {
            warn!("Malformed snapshot {}: {e}, using defaults", path.display());
            T::default()
        }
    }
}

/// Serialize `value` as pretty JSON to `path` atomically.
///
/// Writes a sibling `.tmp` file, syncs it, then renames it over `path`.
/// The temp file is removed if any step fails. `mode` sets Unix
/// permissions on the written file, including when a stale temp file
/// from an interrupted write is still present.
pub fn write_json_atomic<T: Serialize + ?Sized>(
    path: &Path,
    value: &T,
    mode: Option<u32>,
) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("failed to serialize JSON")?;

    let temp_path = path.with_extension("tmp");
    let cleanup = |e: std::io::Error| {
        let _ = fs::remove_file(&temp_path);
        e
    };

    match fs::remove_file(&temp_path) {
        Ok(()) => debug!("Removed stale {}", temp_path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            return Err(e).with_context(|| format!("failed to remove {}", temp_path.display()));
        }
    }

    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        if let Some(mode) = mode {
            options.mode(mode);
        }
    }

    let mut file = options
        .open(&temp_path)
        .with_context(|| format!("failed to create {}", temp_path.display()))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Some(mode) = mode {
            file.set_permissions(fs::Permissions::from_mode(mode))
                .map_err(cleanup)
                .with_context(|| format!("failed to chmod {}", temp_path.display()))?;
        }
    }
    #[cfg(not(unix))]
    let _ = mode;

    file.write_all(json.as_bytes())
        .and_then(|_| file.sync_all())
        .map_err(cleanup)
        .with_context(|| format!("failed to write {}", temp_path.display()))?;
    drop(file);

    fs::rename(&temp_path, path)
        .map_err(cleanup)
        .with_context(|| format!("failed to replace {}", path.display()))?;
    Ok(())
}
