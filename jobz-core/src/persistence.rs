//! Snapshot persistence for engine runtime state.
//!
//! The engine never touches storage on the hot path. It hands out an
//! [`EngineSnapshot`] (progress, rate-limit counters, multiplier grants) and
//! a [`ProgressStore`] writes it wherever the host wants. The bundled
//! [`JsonFileStore`] writes one JSON document:
//!
//! ```json
//! { "checksum": "1c291ca3", "saved_at": "...", "snapshot": { ... } }
//! ```
//!
//! - Written to a sibling temp file, then renamed over the target.
//! - Optional CRC-32 of the snapshot body detects save corruption.
//! - Numbered backups (`<file>.1`, `<file>.2`, ...) rotate on every save.

use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::PersistenceConfig;
use crate::error::{JobzError, Result};
use crate::governor::{RateKey, RateLimitState};
use crate::metrics::spans;
use crate::multiplier::MultiplierGrant;
use crate::progress::ProgressRecord;

/// Current snapshot format version.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Everything mutable the engine holds, at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSnapshot {
    /// Format version.
    pub version: u32,
    /// When the snapshot was taken.
    pub taken_at: DateTime<Utc>,
    /// Per-(actor, category) progress.
    pub progress: Vec<ProgressRecord>,
    /// Rate-limit counters.
    pub rate_limits: Vec<(RateKey, RateLimitState)>,
    /// Multiplier grants, expired or not.
    pub grants: Vec<MultiplierGrant>,
}

impl EngineSnapshot {
    /// An empty snapshot.
    #[must_use]
    pub fn empty(taken_at: DateTime<Utc>) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            taken_at,
            progress: Vec::new(),
            rate_limits: Vec::new(),
            grants: Vec::new(),
        }
    }
}

/// Where snapshots go. Implementations may block; the engine calls them off
/// the hot path (see [`crate::scheduler`]).
pub trait ProgressStore: Send + Sync {
    /// Persist a snapshot, replacing the previous one.
    ///
    /// # Errors
    /// Implementation-defined I/O or serialization failures.
    fn save(&self, snapshot: &EngineSnapshot) -> Result<()>;

    /// Load the last snapshot, if any.
    ///
    /// # Errors
    /// Implementation-defined I/O or serialization failures.
    fn load(&self) -> Result<Option<EngineSnapshot>>;
}

// ---------------------------------------------------------------------------
// CRC-32 checksum helper
// ---------------------------------------------------------------------------

/// CRC-32 (ISO 3309) of `data` as lowercase hex.
fn crc32_hex(data: &[u8]) -> String {
    const POLY: u32 = 0xEDB8_8320;
    let mut crc: u32 = 0xFFFF_FFFF;
    for &byte in data {
        crc ^= u32::from(byte);
        for _ in 0..8 {
            if crc & 1 == 1 {
                crc = (crc >> 1) ^ POLY;
            } else {
                crc >>= 1;
            }
        }
    }
    format!("{:08x}", !crc)
}

// ---------------------------------------------------------------------------
// JsonFileStore
// ---------------------------------------------------------------------------

#[derive(Serialize, Deserialize)]
struct Envelope {
    checksum: Option<String>,
    saved_at: DateTime<Utc>,
    snapshot: serde_json::Value,
}

/// A [`ProgressStore`] writing one JSON file.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
    checksum_enabled: bool,
    backup_count: u32,
}

impl JsonFileStore {
    /// A store writing to `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, config: &PersistenceConfig) -> Self {
        Self {
            path: path.into(),
            checksum_enabled: config.checksum_enabled,
            backup_count: config.backup_count,
        }
    }

    /// Build from config, if a path is configured.
    #[must_use]
    pub fn from_config(config: &PersistenceConfig) -> Option<Self> {
        config.path.as_ref().map(|p| Self::new(p.clone(), config))
    }

    /// Target file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of backup number `n` (1 is the newest).
    #[must_use]
    pub fn backup_path(&self, n: u32) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(format!(".{n}"));
        PathBuf::from(name)
    }

    fn rotate_backups(&self) -> Result<()> {
        let max = self.backup_count;
        if max == 0 || !self.path.exists() {
            return Ok(());
        }
        for i in (1..max).rev() {
            let src = self.backup_path(i);
            if src.exists() {
                std::fs::rename(&src, self.backup_path(i + 1))?;
            }
        }
        std::fs::copy(&self.path, self.backup_path(1))?;
        Ok(())
    }
}

impl ProgressStore for JsonFileStore {
    fn save(&self, snapshot: &EngineSnapshot) -> Result<()> {
        let _span = tracing::debug_span!(spans::PERSIST_SAVE).entered();
        let start = Instant::now();

        let body = serde_json::to_value(snapshot).map_err(|e| JobzError::Serialization(e.to_string()))?;
        let checksum = if self.checksum_enabled {
            let bytes = serde_json::to_vec(&body).map_err(|e| JobzError::Serialization(e.to_string()))?;
            Some(crc32_hex(&bytes))
        } else {
            None
        };
        let envelope = Envelope {
            checksum,
            saved_at: Utc::now(),
            snapshot: body,
        };
        let json = serde_json::to_vec_pretty(&envelope).map_err(|e| JobzError::Serialization(e.to_string()))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        self.rotate_backups()?;

        let mut tmp = self.path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        std::fs::write(&tmp, &json)?;
        std::fs::rename(&tmp, &self.path)?;

        debug!(
            path = %self.path.display(),
            progress = snapshot.progress.len(),
            rate_limits = snapshot.rate_limits.len(),
            grants = snapshot.grants.len(),
            bytes = json.len(),
            elapsed_us = start.elapsed().as_micros(),
            "Saved engine snapshot"
        );
        Ok(())
    }

    fn load(&self) -> Result<Option<EngineSnapshot>> {
        let _span = tracing::debug_span!(spans::PERSIST_LOAD).entered();
        let data = match std::fs::read(&self.path) {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let envelope: Envelope =
            serde_json::from_slice(&data).map_err(|e| JobzError::Serialization(e.to_string()))?;

        if self.checksum_enabled {
            if let Some(expected) = &envelope.checksum {
                let bytes =
                    serde_json::to_vec(&envelope.snapshot).map_err(|e| JobzError::Serialization(e.to_string()))?;
                let actual = crc32_hex(&bytes);
                if *expected != actual {
                    warn!(
                        path = %self.path.display(),
                        expected = %expected,
                        actual = %actual,
                        "Checksum mismatch; possible save corruption"
                    );
                }
            }
        }

        let snapshot: EngineSnapshot =
            serde_json::from_value(envelope.snapshot).map_err(|e| JobzError::Serialization(e.to_string()))?;
        if snapshot.version > SNAPSHOT_VERSION {
            return Err(JobzError::Serialization(format!(
                "snapshot version {} is newer than supported version {SNAPSHOT_VERSION}",
                snapshot.version
            )));
        }
        info!(
            path = %self.path.display(),
            saved_at = %envelope.saved_at,
            progress = snapshot.progress.len(),
            "Loaded engine snapshot"
        );
        Ok(Some(snapshot))
    }
}
