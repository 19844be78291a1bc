//! Loading configuration into the immutable catalog the resolver reads.
//!
//! Loading is forgiving: a malformed definition is skipped, a broken rule is
//! dropped from its tree, a broken curve disables only its category. Every
//! such decision is logged and collected in a [`LoadReport`].

use std::collections::HashMap;
use std::fmt;

use chrono::Duration;
use tracing::{info, warn};

use crate::action::ActionDefinition;
use crate::condition::ConditionFactory;
use crate::config::{CategoryConfig, JobzConfig, MessagesConfig, RateLimitConfig};
use crate::curve::LevelCurve;
use crate::error::{CurveSource, JobzError};
use crate::governor::RateLimitPolicy;
use crate::metrics::spans;
use crate::multiplier::TierTable;
use crate::types::Outcome;

/// One problem found while loading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigIssue {
    /// Where: `category`, `category/pattern`, `multipliers.tiers`, ...
    pub scope: String,
    /// What went wrong.
    pub detail: String,
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.scope, self.detail)
    }
}

/// Summary of a configuration load.
#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    /// Categories ready to pay.
    pub active: Vec<String>,
    /// Categories kept but non-functional, with the reason.
    pub disabled: Vec<(String, String)>,
    /// Skipped units and warnings.
    pub issues: Vec<ConfigIssue>,
}

impl LoadReport {
    /// Whether everything loaded without a single issue.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.disabled.is_empty() && self.issues.is_empty()
    }

    fn issue(&mut self, scope: impl Into<String>, detail: impl Into<String>) {
        let issue = ConfigIssue {
            scope: scope.into(),
            detail: detail.into(),
        };
        warn!(scope = %issue.scope, detail = %issue.detail, "Configuration issue");
        self.issues.push(issue);
    }
}

/// Rate-limit policy of a category, resolved from config.
#[derive(Debug, Clone)]
pub struct CategoryLimit {
    /// Quota and cooldown.
    pub policy: RateLimitPolicy,
    /// Withhold experience while limited.
    pub block_xp: bool,
    /// Withhold currency while limited.
    pub block_currency: bool,
    /// Cooldown outcome overriding the default.
    pub message: Option<Outcome>,
}

/// Whether a category may pay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CategoryStatus {
    /// Ready.
    Active,
    /// Loaded but non-functional.
    Disabled(String),
}

/// A loaded category.
#[derive(Debug, Clone)]
pub struct Category {
    key: String,
    display_name: String,
    status: CategoryStatus,
    max_level: u32,
    curve: Option<LevelCurve>,
    limit: Option<CategoryLimit>,
    level_up: Option<Outcome>,
    actions: Vec<ActionDefinition>,
}

impl Category {
    /// Lower-cased lookup key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Name for messages.
    #[must_use]
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Active or disabled.
    #[must_use]
    pub fn status(&self) -> &CategoryStatus {
        &self.status
    }

    /// The validated curve, `None` when disabled.
    #[must_use]
    pub fn curve(&self) -> Option<&LevelCurve> {
        match self.status {
            CategoryStatus::Active => self.curve.as_ref(),
            CategoryStatus::Disabled(_) => None,
        }
    }

    /// Level cap.
    #[must_use]
    pub fn max_level(&self) -> u32 {
        self.max_level
    }

    /// Rate-limit policy.
    #[must_use]
    pub fn limit(&self) -> Option<&CategoryLimit> {
        self.limit.as_ref()
    }

    /// Level-up outcome override.
    #[must_use]
    pub fn level_up(&self) -> Option<&Outcome> {
        self.level_up.as_ref()
    }

    /// Reward lines in configured order.
    #[must_use]
    pub fn actions(&self) -> &[ActionDefinition] {
        &self.actions
    }

    /// Definitions matching a context, in order.
    pub fn matching<'a>(
        &'a self,
        ctx: &'a crate::types::ActionContext,
    ) -> impl Iterator<Item = &'a ActionDefinition> + 'a {
        self.actions.iter().filter(move |def| def.matches(ctx))
    }

    fn load(key: &str, config: &CategoryConfig, factory: &ConditionFactory, report: &mut LoadReport) -> Self {
        let max_level = if config.max_level == 0 {
            report.issue(key, "max_level 0 treated as 1");
            1
        } else {
            config.max_level
        };

        let mut actions = Vec::with_capacity(config.actions.len());
        let mut tree_issues = Vec::new();
        for (idx, action) in config.actions.iter().enumerate() {
            match ActionDefinition::from_config(action, factory, key, &mut tree_issues) {
                Ok(def) => actions.push(def),
                Err(err) => report.issue(format!("{key}/actions[{idx}]"), format!("skipped: {err}")),
            }
        }
        for issue in tree_issues {
            report.issues.push(ConfigIssue {
                scope: key.to_string(),
                detail: issue,
            });
        }

        let limit = config
            .rate_limit
            .as_ref()
            .and_then(|limit| resolve_limit(key, limit, report));

        let curve = build_curve(key, config, max_level);
        let status = match (&curve, config.enabled) {
            (_, false) => CategoryStatus::Disabled("disabled in configuration".to_string()),
            (Ok(_), true) => CategoryStatus::Active,
            (Err(err), true) => {
                warn!(category = key, error = %err, "Category disabled");
                CategoryStatus::Disabled(err.to_string())
            }
        };

        Self {
            key: key.to_string(),
            display_name: config.display_name.clone().unwrap_or_else(|| key.to_string()),
            status,
            max_level,
            curve: curve.ok(),
            limit,
            level_up: config.level_up.clone(),
            actions,
        }
    }
}

fn resolve_limit(key: &str, config: &RateLimitConfig, report: &mut LoadReport) -> Option<CategoryLimit> {
    if config.max_actions == 0 {
        report.issue(key, "rate_limit.max_actions is 0; rate limiting disabled");
        return None;
    }
    let cooldown = config
        .cooldown_minutes
        .map(|m| Duration::try_minutes(i64::try_from(m).unwrap_or(i64::MAX)).unwrap_or(Duration::MAX));
    Some(CategoryLimit {
        policy: RateLimitPolicy {
            max_actions: config.max_actions,
            cooldown,
        },
        block_xp: config.block_xp,
        block_currency: config.block_currency,
        message: config.message.clone(),
    })
}

fn build_curve(key: &str, config: &CategoryConfig, max_level: u32) -> crate::error::Result<LevelCurve> {
    let curve = match (&config.curve.table, &config.curve.formula) {
        (Some(table), None) => LevelCurve::Table(table.clone()),
        (None, Some(expr)) => LevelCurve::formula(expr).map_err(|err| JobzError::CurveValidation {
            category: key.to_string(),
            origin: CurveSource::Formula(expr.clone()),
            detail: err.to_string(),
        })?,
        (Some(_), Some(_)) => {
            return Err(JobzError::Config(format!(
                "category `{key}` sets both curve.table and curve.formula"
            )));
        }
        (None, None) => {
            return Err(JobzError::Config(format!("category `{key}` has no curve")));
        }
    };
    curve.validate(key, max_level)?;
    Ok(curve)
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

/// Everything the resolver needs from configuration, immutable once built.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    enabled: bool,
    categories: HashMap<String, Category>,
    tiers: TierTable,
    messages: MessagesConfig,
}

impl Catalog {
    /// Build a catalog, never failing on per-unit problems.
    #[must_use]
    pub fn load(config: &JobzConfig, factory: &ConditionFactory) -> (Self, LoadReport) {
        let _span = tracing::info_span!(spans::CONFIG_LOAD).entered();
        let mut report = LoadReport::default();

        let tiers = match config.multipliers.tiers.validate() {
            Ok(()) => config.multipliers.tiers.clone(),
            Err(err) => {
                report.issue("multipliers.tiers", format!("{err}; tier multipliers disabled"));
                TierTable {
                    factors: Vec::new(),
                    ..config.multipliers.tiers.clone()
                }
            }
        };
        if let Err(err) = config.limits.reset_time() {
            report.issue("limits", err.to_string());
        }
        if let Err(err) = config.multipliers.expiry_grace() {
            report.issue("multipliers", format!("{err}; default grace used"));
        }

        let mut categories = HashMap::with_capacity(config.categories.len());
        for (name, category_config) in &config.categories {
            let key = name.trim().to_ascii_lowercase();
            if categories.contains_key(&key) {
                report.issue(name.as_str(), "duplicate category name (case-insensitive); skipped");
                continue;
            }
            let category = Category::load(&key, category_config, factory, &mut report);
            match category.status() {
                CategoryStatus::Active => report.active.push(key.clone()),
                CategoryStatus::Disabled(reason) => report.disabled.push((key.clone(), reason.clone())),
            }
            categories.insert(key, category);
        }
        report.active.sort();
        report.disabled.sort();

        info!(
            active = report.active.len(),
            disabled = report.disabled.len(),
            issues = report.issues.len(),
            "Configuration loaded"
        );

        (
            Self {
                enabled: config.general.enabled,
                categories,
                tiers,
                messages: config.messages.clone(),
            },
            report,
        )
    }

    /// Whether the engine pays at all.
    #[must_use]
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Category by name (case-insensitive).
    #[must_use]
    pub fn category(&self, name: &str) -> Option<&Category> {
        if let Some(cat) = self.categories.get(name) {
            return Some(cat);
        }
        self.categories.get(&name.trim().to_ascii_lowercase())
    }

    /// Every loaded category.
    pub fn categories(&self) -> impl Iterator<Item = &Category> {
        self.categories.values()
    }

    /// Privilege tier table.
    #[must_use]
    pub fn tiers(&self) -> &TierTable {
        &self.tiers
    }

    /// Fallback messages.
    #[must_use]
    pub fn messages(&self) -> &MessagesConfig {
        &self.messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load(src: &str) -> (Catalog, LoadReport) {
        let config = JobzConfig::from_toml(src).expect("config");
        Catalog::load(&config, &ConditionFactory::new())
    }

    #[test]
    fn broken_curve_disables_only_its_category() {
        let (catalog, report) = load(
            r#"
            [categories.mining]
            curve = { formula = "100 * level" }
            [[categories.mining.actions]]
            target = "STONE"
            xp = 1.0

            [categories.fishing]
            curve = { formula = "ln(level - 5)" }
            [[categories.fishing.actions]]
            target = "COD"
            xp = 1.0

            [categories.farming]
            curve = { table = [0.0, 10.0, 5.0] }
            "#,
        );
        assert_eq!(report.active, vec!["mining".to_string()]);
        assert_eq!(report.disabled.len(), 2);
        let fishing = &report.disabled.iter().find(|(k, _)| k == "fishing").expect("fishing").1;
        assert!(fishing.contains("equation"), "{fishing}");
        let farming = &report.disabled.iter().find(|(k, _)| k == "farming").expect("farming").1;
        assert!(farming.contains("curve table"), "{farming}");

        let fishing = catalog.category("FISHING").expect("still loaded");
        assert!(fishing.curve().is_none());
        assert_eq!(fishing.actions().len(), 1);
    }

    #[test]
    fn deeply_nested_formula_disables_its_category() {
        let nested = format!("{}level{}", "(".repeat(100_000), ")".repeat(100_000));
        let (catalog, report) = load(&format!(
            r#"
            [categories.mining]
            curve = {{ table = [0.0, 100.0] }}

            [categories.alchemy]
            curve = {{ formula = "{nested}" }}
            "#
        ));
        assert_eq!(report.active, vec!["mining".to_string()]);
        assert_eq!(report.disabled.len(), 1);
        assert_eq!(report.disabled[0].0, "alchemy");
        assert!(catalog.category("alchemy").is_some_and(|c| c.curve().is_none()));
    }

    #[test]
    fn malformed_units_are_skipped() {
        let (catalog, report) = load(
            r#"
            [categories.mining]
            curve = { table = [0.0, 100.0] }
            rate_limit = { max_actions = 0 }

            [[categories.mining.actions]]
            target = "ST*ONE"
            xp = 1.0

            [[categories.mining.actions]]
            target = "STONE"
            xp = 1.0
            [categories.mining.actions.conditions]
            [[categories.mining.actions.conditions.rules]]
            type = "moon_phase"
            [[categories.mining.actions.conditions.rules]]
            type = "permission"
            permission = "jobs.mining"
            "#,
        );
        let mining = catalog.category("mining").expect("mining");
        assert_eq!(mining.actions().len(), 1);
        assert!(mining.limit().is_none());
        assert_eq!(report.issues.len(), 3, "{:?}", report.issues);
        assert!(!report.is_clean());
    }

    #[test]
    fn missing_or_double_curve_disables() {
        let (_, report) = load(
            r#"
            [categories.a]
            [categories.b]
            curve = { table = [0.0], formula = "level" }
            [categories.c]
            enabled = false
            curve = { table = [0.0, 1.0] }
            "#,
        );
        assert!(report.active.is_empty());
        assert_eq!(report.disabled.len(), 3);
    }

    #[test]
    fn invalid_tier_table_is_reported() {
        let (catalog, report) = load("[multipliers.tiers]\nfactors = [1.0, -1.0]");
        assert!(catalog.tiers().factors.is_empty());
        assert_eq!(report.issues.len(), 1);
    }
}
