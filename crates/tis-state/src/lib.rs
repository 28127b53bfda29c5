//! tis-state
//!
//! Durable reconciliation state shared between runs:
//!
//! - `existing_indicators_hash.json`: fingerprint -> remote indicator id
//!   (the KnownIndicatorMap), pretty JSON.
//! - `expiration_date.txt`: one `YYYY-MM-DD` date, the expiration stamped on
//!   every indicator submitted until that date is reached.
//!
//! Missing or corrupt artifacts are replaced by fresh defaults, never surfaced
//! as errors. Once the stored expiration date is on or before today the whole
//! map is dropped and a new date computed: remote indicators expire on that
//! date, so everything has to be resubmitted from scratch.

use anyhow::{Context, Result};
use chrono::{Duration, NaiveDate};
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use tis_config::SyncConfig;

pub const KNOWN_INDICATORS_FILE_NAME: &str = "existing_indicators_hash.json";
pub const EXPIRATION_DATE_FILE_NAME: &str = "expiration_date.txt";
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Fingerprint -> remote indicator id. Ordered so the persisted file is stable.
pub type KnownIndicatorMap = BTreeMap<String, String>;

/// How the in-memory state came to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateOrigin {
    /// Both artifacts read and the expiration date still in the future.
    Loaded,
    /// At least one artifact was absent or unreadable and was replaced.
    Fresh,
    /// The stored expiration date has elapsed; full resync baseline.
    Expired,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedState {
    pub known: KnownIndicatorMap,
    pub expiration_date: NaiveDate,
    pub origin: StateOrigin,
}

#[derive(Debug, Clone)]
pub struct StateStore {
    known_path: PathBuf,
    expiration_path: PathBuf,
    log_dir: PathBuf,
    days_to_expire: i64,
}

impl StateStore {
    pub fn new(state_dir: impl AsRef<Path>, log_dir: impl AsRef<Path>, days_to_expire: i64) -> Self {
        let state_dir = state_dir.as_ref();
        Self {
            known_path: state_dir.join(KNOWN_INDICATORS_FILE_NAME),
            expiration_path: state_dir.join(EXPIRATION_DATE_FILE_NAME),
            log_dir: log_dir.as_ref().to_path_buf(),
            days_to_expire,
        }
    }

    pub fn from_config(cfg: &SyncConfig) -> Self {
        Self::new(&cfg.state_dir, &cfg.log_dir, cfg.days_to_expire)
    }

    pub fn known_path(&self) -> &Path {
        &self.known_path
    }

    pub fn expiration_path(&self) -> &Path {
        &self.expiration_path
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    /// `today + days_to_expire`, or an error when that leaves the calendar.
    pub fn next_expiration_date(&self, today: NaiveDate) -> Result<NaiveDate> {
        Duration::try_days(self.days_to_expire)
            .and_then(|days| today.checked_add_signed(days))
            .with_context(|| {
                format!(
                    "expiration date out of range: {} + {} days",
                    today.format(DATE_FORMAT),
                    self.days_to_expire
                )
            })
    }

    /// [`StateStore::load`], after creating the log directory. Nothing is
    /// written to the state artifacts until [`StateStore::close`].
    pub fn open(&self, today: NaiveDate) -> Result<LoadedState> {
        fs::create_dir_all(&self.log_dir)
            .with_context(|| format!("create log dir failed: {}", self.log_dir.display()))?;
        self.load(today)
    }

    /// Read both artifacts, applying first-run, corruption and expiry resets.
    /// Touches nothing on disk.
    pub fn load(&self, today: NaiveDate) -> Result<LoadedState> {
        let mut origin = StateOrigin::Loaded;

        let mut known = match read_optional(&self.known_path)? {
            Some(raw) => match serde_json::from_str::<KnownIndicatorMap>(&raw) {
                Ok(map) => map,
                Err(e) => {
                    warn!(
                        path = %self.known_path.display(),
                        error = %e,
                        "known indicator map is corrupt; starting from an empty map"
                    );
                    origin = StateOrigin::Fresh;
                    KnownIndicatorMap::new()
                }
            },
            None => {
                origin = StateOrigin::Fresh;
                KnownIndicatorMap::new()
            }
        };

        let mut expiration_date = match read_optional(&self.expiration_path)? {
            Some(raw) => match NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT) {
                Ok(d) => d,
                Err(e) => {
                    warn!(
                        path = %self.expiration_path.display(),
                        error = %e,
                        "expiration date is unreadable; computing a new one"
                    );
                    origin = StateOrigin::Fresh;
                    self.next_expiration_date(today)?
                }
            },
            None => {
                origin = StateOrigin::Fresh;
                self.next_expiration_date(today)?
            }
        };

        if expiration_date <= today {
            info!(
                expired_on = %expiration_date.format(DATE_FORMAT),
                dropped = known.len(),
                "expiration date reached; resetting known indicators"
            );
            known.clear();
            expiration_date = self.next_expiration_date(today)?;
            origin = StateOrigin::Expired;
        }

        Ok(LoadedState {
            known,
            expiration_date,
            origin,
        })
    }

    /// Overwrite both artifacts with the given values.
    /// Each file is written to a sibling temp file and renamed into place, so a
    /// crash mid-write leaves the previous contents intact.
    pub fn close(&self, known: &KnownIndicatorMap, expiration_date: NaiveDate) -> Result<()> {
        let date = expiration_date.format(DATE_FORMAT).to_string();
        write_replace(&self.expiration_path, date.as_bytes())?;

        let json = serde_json::to_string_pretty(known).context("serialize known indicators failed")?;
        write_replace(&self.known_path, json.as_bytes())?;
        Ok(())
    }
}

/// `Ok(None)` when the file does not exist; other IO errors propagate.
fn read_optional(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(s) => Ok(Some(s)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        // Non-UTF-8 content is corruption, not an IO failure.
        Err(e) if e.kind() == ErrorKind::InvalidData => Ok(Some(String::new())),
        Err(e) => Err(e).with_context(|| format!("read state file failed: {}", path.display())),
    }
}

fn write_replace(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("create state dir failed: {}", parent.display()))?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    fs::write(&tmp, bytes).with_context(|| format!("write state file failed: {}", tmp.display()))?;
    fs::rename(&tmp, path)
        .with_context(|| format!("replace state file failed: {}", path.display()))?;
    Ok(())
}
