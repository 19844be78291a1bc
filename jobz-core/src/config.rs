//! Configuration for the JOBZ reward engine.
//!
//! Maps directly to `jobz.toml`. Every section has defaults, so an empty
//! document is a valid (if category-less) configuration.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use crate::action::ActionConfig;
use crate::error::{JobzError, Result};
use crate::multiplier::TierTable;
use crate::types::Outcome;

/// Top-level configuration, loadable from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobzConfig {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,
    /// Rate-limit reset scheduling.
    #[serde(default)]
    pub limits: LimitsConfig,
    /// Multiplier sweeping and privilege tiers.
    #[serde(default)]
    pub multipliers: MultiplierConfig,
    /// Snapshot persistence.
    #[serde(default)]
    pub persistence: PersistenceConfig,
    /// Default messages.
    #[serde(default)]
    pub messages: MessagesConfig,
    /// Categories ("jobs") by name.
    #[serde(default)]
    pub categories: BTreeMap<String, CategoryConfig>,
}

impl JobzConfig {
    /// Load configuration from a TOML string.
    ///
    /// # Errors
    /// Returns `JobzError::Config` if the TOML is invalid.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str).map_err(|e| JobzError::Config(e.to_string()))
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Serialise back to TOML.
    ///
    /// # Errors
    /// Returns `JobzError::Serialization` if a value cannot be represented.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| JobzError::Serialization(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// General system settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Whether the engine pays anything at all.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Emit logs as JSON lines instead of human-readable text.
    #[serde(default)]
    pub json_logs: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            log_level: default_log_level(),
            json_logs: false,
        }
    }
}

/// Scheduled bulk reset of every rate-limit counter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Whether the daily reset runs.
    #[serde(default = "default_true")]
    pub bulk_reset_enabled: bool,
    /// Wall-clock time of the daily reset, `HH:MM` in UTC.
    #[serde(default = "default_reset_time")]
    pub daily_reset_time: String,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            bulk_reset_enabled: true,
            daily_reset_time: default_reset_time(),
        }
    }
}

impl LimitsConfig {
    /// Parsed reset time.
    ///
    /// # Errors
    /// Returns `JobzError::Config` unless the value is a valid `HH:MM`.
    pub fn reset_time(&self) -> Result<NaiveTime> {
        NaiveTime::parse_from_str(self.daily_reset_time.trim(), "%H:%M").map_err(|e| {
            JobzError::Config(format!(
                "limits.daily_reset_time `{}` is not HH:MM: {e}",
                self.daily_reset_time
            ))
        })
    }
}

/// Multiplier registry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultiplierConfig {
    /// Seconds between expiry sweeps.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
    /// Expired grants are kept this long before the sweep removes them.
    #[serde(default = "default_expiry_grace")]
    pub expiry_grace_secs: u64,
    /// Privilege tier table.
    #[serde(default)]
    pub tiers: TierTable,
}

impl Default for MultiplierConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: default_sweep_interval(),
            expiry_grace_secs: default_expiry_grace(),
            tiers: TierTable::default(),
        }
    }
}

impl MultiplierConfig {
    /// Longest accepted expiry grace.
    pub const MAX_EXPIRY_GRACE_SECS: u64 = 366 * 24 * 60 * 60;

    /// Parsed expiry grace.
    ///
    /// # Errors
    /// Returns `JobzError::Config` when the grace exceeds
    /// [`Self::MAX_EXPIRY_GRACE_SECS`].
    pub fn expiry_grace(&self) -> Result<chrono::Duration> {
        if self.expiry_grace_secs > Self::MAX_EXPIRY_GRACE_SECS {
            return Err(JobzError::Config(format!(
                "multipliers.expiry_grace_secs {} exceeds {}",
                self.expiry_grace_secs,
                Self::MAX_EXPIRY_GRACE_SECS
            )));
        }
        // Bounded above, so the conversion cannot fail.
        Ok(chrono::Duration::seconds(i64::try_from(self.expiry_grace_secs).unwrap_or(0)))
    }
}

/// Snapshot persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Snapshot file. No autosave without one.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Seconds between autosaves. 0 disables autosave.
    #[serde(default = "default_autosave_interval")]
    pub autosave_interval_secs: u64,
    /// Store and verify a CRC-32 of the snapshot body.
    #[serde(default = "default_true")]
    pub checksum_enabled: bool,
    /// Rotated backups kept next to the snapshot file.
    #[serde(default = "default_backup_count")]
    pub backup_count: u32,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            path: None,
            autosave_interval_secs: default_autosave_interval(),
            checksum_enabled: true,
            backup_count: default_backup_count(),
        }
    }
}

/// Fallback outcomes used when a category does not configure its own.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagesConfig {
    /// Emitted on level-up.
    #[serde(default = "default_level_up")]
    pub level_up: Outcome,
    /// Emitted when a rate limit blocks a reward.
    #[serde(default = "default_cooldown")]
    pub cooldown: Outcome,
}

impl Default for MessagesConfig {
    fn default() -> Self {
        Self {
            level_up: default_level_up(),
            cooldown: default_cooldown(),
        }
    }
}

/// One category ("job").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryConfig {
    /// Name shown in messages. Defaults to the table key.
    #[serde(default)]
    pub display_name: Option<String>,
    /// Administratively disable without deleting.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Level cap.
    #[serde(default = "default_max_level")]
    pub max_level: u32,
    /// Level curve.
    #[serde(default)]
    pub curve: CurveConfig,
    /// Rate-limit policy. No policy means unlimited.
    #[serde(default)]
    pub rate_limit: Option<RateLimitConfig>,
    /// Level-up outcome overriding `messages.level_up`.
    #[serde(default)]
    pub level_up: Option<Outcome>,
    /// Reward lines, evaluated in order.
    #[serde(default)]
    pub actions: Vec<ActionConfig>,
}

impl Default for CategoryConfig {
    fn default() -> Self {
        Self {
            display_name: None,
            enabled: true,
            max_level: default_max_level(),
            curve: CurveConfig::default(),
            rate_limit: None,
            level_up: None,
            actions: Vec::new(),
        }
    }
}

/// Exactly one of `table` or `formula`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CurveConfig {
    /// Total points required for level 1, 2, ...
    #[serde(default)]
    pub table: Option<Vec<f64>>,
    /// Equation in `level`, e.g. `100 * level ^ 2`.
    #[serde(default)]
    pub formula: Option<String>,
}

/// Per-category rate-limit policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Actions rewarded per period. 0 disables the limit.
    pub max_actions: u32,
    /// Cooldown armed when the quota fills. Absent: blocked until the next bulk reset.
    #[serde(default)]
    pub cooldown_minutes: Option<u64>,
    /// Withhold experience while limited.
    #[serde(default = "default_true")]
    pub block_xp: bool,
    /// Withhold currency while limited.
    #[serde(default = "default_true")]
    pub block_currency: bool,
    /// Outcome overriding `messages.cooldown`.
    #[serde(default)]
    pub message: Option<Outcome>,
}

// ---------------------------------------------------------------------------
// Default helpers
// ---------------------------------------------------------------------------

fn default_true() -> bool { true }
fn default_log_level() -> String { "info".to_string() }
fn default_reset_time() -> String { "00:00".to_string() }
fn default_sweep_interval() -> u64 { 60 }
fn default_expiry_grace() -> u64 { 300 }
fn default_autosave_interval() -> u64 { 300 }
fn default_backup_count() -> u32 { 3 }
fn default_max_level() -> u32 { 50 }

fn default_level_up() -> Outcome {
    Outcome {
        message: Some("{player} reached level {level} in {category}!".to_string()),
        sound: Some("entity.player.levelup".to_string()),
        ..Outcome::default()
    }
}

fn default_cooldown() -> Outcome {
    Outcome::message("You have reached the {category} limit. Try again in {remaining}.")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config = JobzConfig::from_toml("").expect("empty config");
        assert!(config.general.enabled);
        assert_eq!(config.limits.daily_reset_time, "00:00");
        assert_eq!(config.multipliers.sweep_interval_secs, 60);
        assert!(config.categories.is_empty());
        assert!(config.messages.level_up.message.is_some());
    }

    #[test]
    fn full_category_parses() {
        let config = JobzConfig::from_toml(
            r#"
            [limits]
            daily_reset_time = "04:30"

            [multipliers.tiers]
            permission_prefix = "vip."
            factors = [1.0, 2.0]

            [categories.mining]
            display_name = "Miner"
            max_level = 100
            curve = { formula = "100 * level ^ 2" }
            rate_limit = { max_actions = 500, cooldown_minutes = 30, block_currency = false }

            [[categories.mining.actions]]
            target = "STONE"
            xp = 1.0
            currency = 0.1

            [[categories.mining.actions]]
            target = "*_ORE"
            xp = 5.0
            "#,
        )
        .expect("config");

        assert_eq!(config.limits.reset_time().ok(), NaiveTime::from_hms_opt(4, 30, 0));
        assert_eq!(config.multipliers.tiers.factors, vec![1.0, 2.0]);
        let mining = &config.categories["mining"];
        assert_eq!(mining.max_level, 100);
        assert_eq!(mining.actions.len(), 2);
        let limit = mining.rate_limit.as_ref().expect("rate limit");
        assert!(limit.block_xp);
        assert!(!limit.block_currency);
        assert_eq!(limit.cooldown_minutes, Some(30));
    }

    #[test]
    fn bad_reset_time_is_reported() {
        let limits = LimitsConfig {
            bulk_reset_enabled: true,
            daily_reset_time: "25:99".into(),
        };
        assert!(matches!(limits.reset_time(), Err(JobzError::Config(_))));
    }

    #[test]
    fn oversized_expiry_grace_is_reported() {
        let config = JobzConfig::from_toml("[multipliers]\nexpiry_grace_secs = 9223372036854775807").expect("config");
        assert!(matches!(config.multipliers.expiry_grace(), Err(JobzError::Config(_))));
        assert_eq!(
            MultiplierConfig::default().expiry_grace().ok(),
            Some(chrono::Duration::seconds(300))
        );
    }

    #[test]
    fn malformed_document_is_an_error() {
        assert!(JobzConfig::from_toml("categories = 3").is_err());
    }

    #[test]
    fn toml_roundtrip() {
        let config = JobzConfig::default();
        let text = config.to_toml().expect("serialise");
        let back = JobzConfig::from_toml(&text).expect("parse");
        assert_eq!(back.persistence.backup_count, config.persistence.backup_count);
    }
}
