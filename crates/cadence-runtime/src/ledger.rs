//! Usage ledger: the persisted usage history file.
//!
//! Every write is a full read-modify-write of the file, replaced atomically.
//! A file that fails to parse or fails its consistency check is reported as
//! [`LedgerError::Corrupt`] and never overwritten.
//!
//! Writers inside one process are serialized by a mutex. There is no
//! cross-process lock: one controller process at a time is assumed.
//! Async callers go through [`UsageLedger::record_async`], which keeps the
//! file I/O and the lock wait off the runtime's worker threads.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

use cadence_core::persist::write_atomic;
use cadence_core::usage::{UsageError, HISTORY_VERSION};
use cadence_core::{TokenUsage, UsageHistory, UsageRecord, UsageWindow};

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Failed to access usage history at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Usage history at {path} is corrupt: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("Usage history version {0} is not supported (expected {expected})", expected = HISTORY_VERSION)]
    UnsupportedVersion(u64),

    #[error(transparent)]
    Usage(#[from] UsageError),

    #[error("Usage recording task did not finish: {0}")]
    Interrupted(String),
}

/// File-backed usage ledger. Clones share the same write lock.
#[derive(Debug, Clone)]
pub struct UsageLedger {
    path: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl UsageLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record one successful call at the current time.
    pub fn add_execution(&self, ceremony: &str, usage: TokenUsage) -> Result<(), LedgerError> {
        self.record(&UsageRecord::new(ceremony, usage, Utc::now()))
    }

    /// Record one successful call.
    pub fn record(&self, record: &UsageRecord) -> Result<(), LedgerError> {
        let _guard = self.write_lock.lock();

        let mut history = self.load()?;
        history.apply(record)?;
        history.last_updated = Some(Utc::now());

        let json = serde_json::to_vec_pretty(&history).map_err(|e| LedgerError::Corrupt {
            path: self.path.clone(),
            reason: format!("could not serialize: {}", e),
        })?;
        write_atomic(&self.path, &json).map_err(|source| LedgerError::Io {
            path: self.path.clone(),
            source,
        })?;

        tracing::debug!(
            ceremony = %record.ceremony,
            input_tokens = record.input_tokens,
            output_tokens = record.output_tokens,
            path = %self.path.display(),
            "Usage recorded"
        );
        Ok(())
    }

    /// [`record`](Self::record) on the blocking pool.
    pub async fn record_async(&self, record: UsageRecord) -> Result<(), LedgerError> {
        let ledger = self.clone();
        tokio::task::spawn_blocking(move || ledger.record(&record))
            .await
            .map_err(|e| LedgerError::Interrupted(e.to_string()))?
    }

    /// Read and check the current history. A missing file is empty history.
    pub fn load(&self) -> Result<UsageHistory, LedgerError> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(UsageHistory::new()),
            Err(source) => {
                return Err(LedgerError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        if contents.trim().is_empty() {
            return Err(self.corrupt("file is empty"));
        }

        let raw: serde_json::Value =
            serde_json::from_str(&contents).map_err(|e| self.corrupt(format!("not valid JSON: {}", e)))?;

        match raw.get("version").and_then(|v| v.as_u64()) {
            Some(v) if v == u64::from(HISTORY_VERSION) => {}
            Some(v) => return Err(LedgerError::UnsupportedVersion(v)),
            None => return Err(self.corrupt("missing version")),
        }

        let history: UsageHistory =
            serde_json::from_value(raw).map_err(|e| self.corrupt(format!("unexpected shape: {}", e)))?;
        history.verify().map_err(|reason| self.corrupt(reason))?;

        Ok(history)
    }

    fn corrupt(&self, reason: impl Into<String>) -> LedgerError {
        LedgerError::Corrupt {
            path: self.path.clone(),
            reason: reason.into(),
        }
    }

    pub fn global_all_time(&self) -> Result<UsageWindow, LedgerError> {
        Ok(self.load()?.global_all_time())
    }

    pub fn global_day(&self, at: DateTime<Utc>) -> Result<UsageWindow, LedgerError> {
        Ok(self.load()?.global_day(at))
    }

    pub fn global_week(&self, at: DateTime<Utc>) -> Result<UsageWindow, LedgerError> {
        Ok(self.load()?.global_week(at))
    }

    pub fn global_month(&self, at: DateTime<Utc>) -> Result<UsageWindow, LedgerError> {
        Ok(self.load()?.global_month(at))
    }

    pub fn ceremony_all_time(&self, ceremony: &str) -> Result<UsageWindow, LedgerError> {
        Ok(self.load()?.ceremony_all_time(ceremony))
    }

    pub fn ceremony_day(&self, ceremony: &str, at: DateTime<Utc>) -> Result<UsageWindow, LedgerError> {
        Ok(self.load()?.ceremony_day(ceremony, at))
    }

    pub fn ceremony_week(&self, ceremony: &str, at: DateTime<Utc>) -> Result<UsageWindow, LedgerError> {
        Ok(self.load()?.ceremony_week(ceremony, at))
    }

    pub fn ceremony_month(&self, ceremony: &str, at: DateTime<Utc>) -> Result<UsageWindow, LedgerError> {
        Ok(self.load()?.ceremony_month(ceremony, at))
    }
}
