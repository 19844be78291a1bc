//! Action definitions: what a category pays for, and under which conditions.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::condition::{ConditionFactory, ConditionTree, ConditionTreeConfig};
use crate::error::{JobzError, Result};
use crate::pattern::TargetPattern;
use crate::types::{ActionContext, Outcome, keys};

/// An action definition as written in configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActionConfig {
    /// Target pattern (`STONE`, `LOG_*`, `*_ORE`, `ns:id`, `*`).
    pub target: String,
    /// Only match contexts whose `action` attribute equals this (case-insensitive).
    #[serde(default)]
    pub action: Option<String>,
    /// Base experience.
    #[serde(default)]
    pub xp: f64,
    /// Base currency.
    #[serde(default)]
    pub currency: f64,
    /// Multiply the base reward by the context `quantity` attribute.
    #[serde(default)]
    pub scale_by_quantity: bool,
    /// Requirements.
    #[serde(default)]
    pub conditions: Option<ConditionTreeConfig>,
    /// Emitted after a successful payout.
    #[serde(default)]
    pub effects: Option<Outcome>,
    /// Emitted when the requirements deny without an outcome of their own,
    /// and merged into rate-limit denials.
    #[serde(default)]
    pub deny: Option<Outcome>,
    /// Override the category's block-xp flag when rate limited.
    #[serde(default)]
    pub block_xp: Option<bool>,
    /// Override the category's block-currency flag when rate limited.
    #[serde(default)]
    pub block_currency: Option<bool>,
}

/// Base payout of one definition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Reward {
    /// Experience points.
    pub xp: f64,
    /// Currency.
    pub currency: f64,
}

impl Reward {
    /// Scale both components.
    #[must_use]
    pub fn scaled(self, factor: f64) -> Self {
        Self {
            xp: self.xp * factor,
            currency: self.currency * factor,
        }
    }

    /// Whether anything would be paid.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.xp == 0.0 && self.currency == 0.0
    }
}

/// A configured, immutable reward line.
#[derive(Debug, Clone)]
pub struct ActionDefinition {
    pattern: TargetPattern,
    action: Option<String>,
    reward: Reward,
    scale_by_quantity: bool,
    conditions: Option<ConditionTree>,
    effects: Option<Outcome>,
    on_deny: Option<Outcome>,
    block_xp: Option<bool>,
    block_currency: Option<bool>,
}

impl ActionDefinition {
    /// A bare definition paying `reward` for `pattern`.
    #[must_use]
    pub fn new(pattern: TargetPattern, reward: Reward) -> Self {
        Self {
            pattern,
            action: None,
            reward,
            scale_by_quantity: false,
            conditions: None,
            effects: None,
            on_deny: None,
            block_xp: None,
            block_currency: None,
        }
    }

    /// Attach requirements.
    #[must_use]
    pub fn with_conditions(mut self, tree: ConditionTree) -> Self {
        self.conditions = Some(tree);
        self
    }

    /// Attach payout effects.
    #[must_use]
    pub fn with_effects(mut self, effects: Outcome) -> Self {
        self.effects = Some(effects);
        self
    }

    /// Attach a deny outcome.
    #[must_use]
    pub fn with_deny(mut self, deny: Outcome) -> Self {
        self.on_deny = Some(deny);
        self
    }

    /// Build from config.
    ///
    /// Rules inside the condition tree that fail to build are dropped and
    /// reported in `issues`; the definition itself survives.
    ///
    /// # Errors
    /// Returns [`JobzError::Pattern`] for a malformed target and
    /// [`JobzError::Config`] for non-finite rewards.
    pub fn from_config(
        config: &ActionConfig,
        factory: &ConditionFactory,
        scope: &str,
        issues: &mut Vec<String>,
    ) -> Result<Self> {
        let pattern = TargetPattern::parse(&config.target)?;
        if !config.xp.is_finite() || !config.currency.is_finite() {
            return Err(JobzError::Config(format!(
                "reward for `{}` must be finite (xp = {}, currency = {})",
                config.target, config.xp, config.currency
            )));
        }
        let scope = format!("{scope}/{pattern}");
        let conditions = config
            .conditions
            .as_ref()
            .map(|tree| ConditionTree::from_config(tree, factory, &scope, issues));

        if let (Some(tree), Some(_)) = (&conditions, &config.deny) {
            if tree.shared_deny().is_some() {
                warn!(
                    scope = %scope,
                    "Both a definition deny outcome and a shared condition deny outcome are configured; \
                     the shared outcome wins"
                );
                issues.push(format!(
                    "{scope}: ambiguous deny configuration, shared condition outcome takes precedence"
                ));
            }
        }

        Ok(Self {
            pattern,
            action: config.action.as_ref().map(|a| a.trim().to_ascii_lowercase()),
            reward: Reward {
                xp: config.xp,
                currency: config.currency,
            },
            scale_by_quantity: config.scale_by_quantity,
            conditions,
            effects: config.effects.clone(),
            on_deny: config.deny.clone(),
            block_xp: config.block_xp,
            block_currency: config.block_currency,
        })
    }

    /// Whether this definition applies to a context.
    #[must_use]
    pub fn matches(&self, ctx: &ActionContext) -> bool {
        if let Some(kind) = &self.action {
            if !ctx.action().eq_ignore_ascii_case(kind) {
                return false;
            }
        }
        self.pattern.matches(ctx)
    }

    /// The target pattern; also the rate-limit key component.
    #[must_use]
    pub fn pattern(&self) -> &TargetPattern {
        &self.pattern
    }

    /// Base reward for a context, after quantity scaling.
    ///
    /// A missing, non-positive or non-finite quantity counts as one. A
    /// quantity large enough to overflow the amounts is ignored as well.
    #[must_use]
    pub fn base_reward(&self, ctx: &ActionContext) -> Reward {
        if !self.scale_by_quantity {
            return self.reward;
        }
        let qty = ctx.number(keys::QUANTITY);
        if !(qty.is_finite() && qty > 0.0) {
            return self.reward;
        }
        let scaled = self.reward.scaled(qty);
        if scaled.xp.is_finite() && scaled.currency.is_finite() {
            scaled
        } else {
            self.reward
        }
    }

    /// Requirements, if any.
    #[must_use]
    pub fn conditions(&self) -> Option<&ConditionTree> {
        self.conditions.as_ref()
    }

    /// Effects emitted after a payout.
    #[must_use]
    pub fn effects(&self) -> Option<&Outcome> {
        self.effects.as_ref()
    }

    /// The definition's own deny outcome.
    #[must_use]
    pub fn deny_outcome(&self) -> Option<&Outcome> {
        self.on_deny.as_ref()
    }

    /// Effective (block xp, block currency) flags when rate limited.
    #[must_use]
    pub fn blocks(&self, category_xp: bool, category_currency: bool) -> (bool, bool) {
        (
            self.block_xp.unwrap_or(category_xp),
            self.block_currency.unwrap_or(category_currency),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(src: &str) -> Result<ActionDefinition> {
        let cfg: ActionConfig = toml::from_str(src).expect("action config");
        let mut issues = Vec::new();
        ActionDefinition::from_config(&cfg, &ConditionFactory::new(), "mining", &mut issues)
    }

    #[test]
    fn action_kind_filter() {
        let def = build("target = \"STONE\"\naction = \"Break\"\nxp = 1.0").expect("valid");
        assert!(def.matches(&ActionContext::new("stone").with_action("break")));
        assert!(!def.matches(&ActionContext::new("stone").with_action("place")));
        assert!(!def.matches(&ActionContext::new("stone")));
    }

    #[test]
    fn quantity_scaling() {
        let def = build("target = \"WHEAT\"\nxp = 2.0\ncurrency = 0.5\nscale_by_quantity = true").expect("valid");
        let r = def.base_reward(&ActionContext::new("WHEAT").with_number(keys::QUANTITY, 4.0));
        assert!((r.xp - 8.0).abs() < f64::EPSILON);
        assert!((r.currency - 2.0).abs() < f64::EPSILON);
        let r = def.base_reward(&ActionContext::new("WHEAT"));
        assert!((r.xp - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn non_finite_quantity_counts_as_one() {
        let def = build("target = \"WHEAT\"\nxp = 2.0\ncurrency = 0.5\nscale_by_quantity = true").expect("valid");
        for ctx in [
            ActionContext::new("WHEAT").with_number(keys::QUANTITY, f64::INFINITY),
            ActionContext::new("WHEAT").with_number(keys::QUANTITY, f64::NAN),
            ActionContext::new("WHEAT").with_text(keys::QUANTITY, "inf"),
            ActionContext::new("WHEAT").with_text(keys::QUANTITY, "NaN"),
            ActionContext::new("WHEAT").with_number(keys::QUANTITY, f64::MAX),
        ] {
            let r = def.base_reward(&ctx);
            assert!((r.xp - 2.0).abs() < f64::EPSILON, "{ctx:?}");
            assert!((r.currency - 0.5).abs() < f64::EPSILON, "{ctx:?}");
        }
        let r = def.base_reward(&ActionContext::new("WHEAT").with_text(keys::QUANTITY, "3"));
        assert!((r.xp - 6.0).abs() < f64::EPSILON);
    }

    #[test]
    fn malformed_definitions_are_rejected() {
        assert!(matches!(build("target = \"ST*ONE\"\nxp = 1.0"), Err(JobzError::Pattern { .. })));
        assert!(matches!(build("target = \"STONE\"\nxp = nan"), Err(JobzError::Config(_))));
    }

    #[test]
    fn ambiguous_deny_configuration_is_reported() {
        let cfg: ActionConfig = toml::from_str(
            r#"
            target = "DIAMOND_ORE"
            xp = 10.0
            deny = { message = "definition deny" }
            [conditions]
            deny = { message = "shared deny" }
            [[conditions.rules]]
            type = "permission"
            permission = "jobs.diamond"
            "#,
        )
        .expect("action config");
        let mut issues = Vec::new();
        let def = ActionDefinition::from_config(&cfg, &ConditionFactory::new(), "mining", &mut issues)
            .expect("valid");
        assert_eq!(issues.len(), 1);
        assert!(issues[0].contains("ambiguous"));
        assert!(def.conditions().is_some());
    }

    #[test]
    fn per_action_block_overrides() {
        let def = build("target = \"STONE\"\nxp = 1.0\nblock_currency = false").expect("valid");
        assert_eq!(def.blocks(true, true), (true, false));
    }
}
