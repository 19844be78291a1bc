//! Condition rules and trees.
//!
//! A [`ConditionRule`] pairs one testable predicate (a [`Condition`]) with the
//! outcomes to emit when it accepts or denies. Rules are built from config
//! by the [`ConditionFactory`], keyed by their `type` tag; unknown tags are
//! dropped with a warning. A [`ConditionTree`] combines rules and nested
//! trees with short-circuiting AND/OR logic.

pub mod builtin;
pub mod tree;

pub use tree::{ConditionTree, ConditionTreeConfig, Logic};

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::actor::Actor;
use crate::error::{EvalError, JobzError, Result};
use crate::types::{ActionContext, Outcome};

/// One testable predicate over an actor and an action context.
pub trait Condition: Send + Sync + fmt::Debug {
    /// Type tag, for diagnostics.
    fn kind(&self) -> &str;

    /// Whether the condition holds.
    ///
    /// # Errors
    /// Returns [`EvalError`] when a lookup fails. The caller treats that as "not met".
    fn is_met(&self, actor: &dyn Actor, ctx: &ActionContext) -> std::result::Result<bool, EvalError>;
}

/// The resolved result of evaluating a rule or a tree.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Verdict {
    /// Whether the action may proceed.
    pub allowed: bool,
    /// Effects to emit for this verdict. Empty means "no effect".
    pub outcome: Outcome,
}

impl Verdict {
    /// Allow with no effect.
    #[must_use]
    pub fn allow() -> Self {
        Self {
            allowed: true,
            outcome: Outcome::default(),
        }
    }

    /// Deny with no effect.
    #[must_use]
    pub fn deny() -> Self {
        Self::default()
    }
}

/// A condition with its accept and deny outcomes.
#[derive(Debug, Clone)]
pub struct ConditionRule {
    condition: Arc<dyn Condition>,
    invert: bool,
    on_accept: Option<Outcome>,
    on_deny: Option<Outcome>,
}

impl ConditionRule {
    /// Wrap a condition with optional outcomes.
    #[must_use]
    pub fn new(condition: Arc<dyn Condition>, on_accept: Option<Outcome>, on_deny: Option<Outcome>) -> Self {
        Self {
            condition,
            invert: false,
            on_accept,
            on_deny,
        }
    }

    /// Flip the condition's result. Evaluation errors still deny.
    #[must_use]
    pub fn inverted(mut self, invert: bool) -> Self {
        self.invert = invert;
        self
    }

    /// The wrapped condition's type tag.
    #[must_use]
    pub fn kind(&self) -> &str {
        self.condition.kind()
    }

    /// Outcome configured for acceptance.
    #[must_use]
    pub fn accept_outcome(&self) -> Option<&Outcome> {
        self.on_accept.as_ref()
    }

    /// Outcome configured for denial.
    #[must_use]
    pub fn deny_outcome(&self) -> Option<&Outcome> {
        self.on_deny.as_ref()
    }

    /// Evaluate, degrading evaluation failures to "not met".
    pub fn is_met(&self, actor: &dyn Actor, ctx: &ActionContext) -> bool {
        match self.condition.is_met(actor, ctx) {
            Ok(met) => met != self.invert,
            Err(err) => {
                warn!(
                    actor = %actor.id(),
                    condition = self.condition.kind(),
                    error = %err,
                    "Condition evaluation failed; treating as not met"
                );
                crate::metrics::COUNTERS.record_evaluation_error();
                false
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Configuration & Factory
// ---------------------------------------------------------------------------

/// A rule as written in configuration.
///
/// Every key other than `type`, `invert`, `accept` and `deny` is a
/// variant-specific parameter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleConfig {
    /// Variant tag (`permission`, `placeholder`, `held_item`, ...).
    #[serde(rename = "type")]
    pub kind: String,
    /// Flip the result.
    #[serde(default)]
    pub invert: bool,
    /// Emitted when the rule passes.
    #[serde(default)]
    pub accept: Option<Outcome>,
    /// Emitted when the rule fails.
    #[serde(default)]
    pub deny: Option<Outcome>,
    /// Variant parameters.
    #[serde(flatten)]
    pub params: BTreeMap<String, toml::Value>,
}

impl RuleConfig {
    /// A required string parameter.
    ///
    /// # Errors
    /// Returns [`JobzError::InvalidRule`] if missing or not a string.
    pub fn str_param(&self, key: &str) -> Result<&str> {
        self.params
            .get(key)
            .and_then(toml::Value::as_str)
            .ok_or_else(|| self.invalid(format!("missing string parameter `{key}`")))
    }

    /// A required parameter that may be a single string or a list of strings.
    ///
    /// # Errors
    /// Returns [`JobzError::InvalidRule`] if missing, empty, or of another type.
    pub fn list_param(&self, key: &str) -> Result<Vec<String>> {
        let list = match self.params.get(key) {
            Some(toml::Value::String(s)) => vec![s.clone()],
            Some(toml::Value::Array(items)) => items
                .iter()
                .map(|v| v.as_str().map(str::to_string))
                .collect::<Option<Vec<_>>>()
                .ok_or_else(|| self.invalid(format!("`{key}` must contain only strings")))?,
            _ => return Err(self.invalid(format!("missing parameter `{key}`"))),
        };
        if list.is_empty() {
            return Err(self.invalid(format!("`{key}` is empty")));
        }
        Ok(list)
    }

    /// A required integer parameter.
    ///
    /// # Errors
    /// Returns [`JobzError::InvalidRule`] if missing or not an integer.
    pub fn int_param(&self, key: &str) -> Result<i64> {
        self.params
            .get(key)
            .and_then(toml::Value::as_integer)
            .ok_or_else(|| self.invalid(format!("missing integer parameter `{key}`")))
    }

    /// An error attributed to this rule's tag.
    #[must_use]
    pub fn invalid(&self, reason: String) -> JobzError {
        JobzError::InvalidRule {
            kind: self.kind.clone(),
            reason,
        }
    }
}

type Builder = Arc<dyn Fn(&RuleConfig, &ConditionFactory) -> Result<Arc<dyn Condition>> + Send + Sync>;

/// Builds [`ConditionRule`]s from config, keyed by type tag.
///
/// All built-in variants are pre-registered. Hosts add their own either as
/// a whole new tag ([`register`](Self::register)) or as a named predicate
/// reachable through `type = "custom", name = "..."`
/// ([`register_custom`](Self::register_custom)).
#[derive(Clone)]
pub struct ConditionFactory {
    builders: HashMap<String, Builder>,
    customs: HashMap<String, Arc<dyn Condition>>,
}

impl fmt::Debug for ConditionFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tags: Vec<_> = self.builders.keys().collect();
        tags.sort();
        let mut customs: Vec<_> = self.customs.keys().collect();
        customs.sort();
        f.debug_struct("ConditionFactory")
            .field("tags", &tags)
            .field("customs", &customs)
            .finish()
    }
}

impl Default for ConditionFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl ConditionFactory {
    /// A factory with every built-in variant registered.
    #[must_use]
    pub fn new() -> Self {
        let mut factory = Self {
            builders: HashMap::new(),
            customs: HashMap::new(),
        };
        builtin::register_all(&mut factory);
        factory
    }

    /// Register (or replace) a builder for a type tag. Tags are case-insensitive.
    pub fn register<F>(&mut self, tag: &str, build: F)
    where
        F: Fn(&RuleConfig, &ConditionFactory) -> Result<Arc<dyn Condition>> + Send + Sync + 'static,
    {
        self.builders.insert(normalize_tag(tag), Arc::new(build));
    }

    /// Register a named predicate for `type = "custom"` rules.
    pub fn register_custom(&mut self, name: &str, condition: Arc<dyn Condition>) {
        self.customs.insert(name.to_ascii_lowercase(), condition);
    }

    /// Look up a named custom predicate.
    #[must_use]
    pub fn custom(&self, name: &str) -> Option<Arc<dyn Condition>> {
        self.customs.get(&name.to_ascii_lowercase()).cloned()
    }

    /// Build one rule.
    ///
    /// # Errors
    /// Returns [`JobzError::UnknownCondition`] for unregistered tags and
    /// [`JobzError::InvalidRule`] for bad parameters.
    pub fn build(&self, config: &RuleConfig) -> Result<ConditionRule> {
        let builder = self
            .builders
            .get(&normalize_tag(&config.kind))
            .ok_or_else(|| JobzError::UnknownCondition(config.kind.clone()))?;
        let condition = builder(config, self)?;
        Ok(ConditionRule::new(condition, config.accept.clone(), config.deny.clone()).inverted(config.invert))
    }

    /// Build one rule, logging and dropping it on failure.
    #[must_use]
    pub fn build_or_skip(&self, config: &RuleConfig, scope: &str, issues: &mut Vec<String>) -> Option<ConditionRule> {
        match self.build(config) {
            Ok(rule) => Some(rule),
            Err(err) => {
                warn!(scope, error = %err, "Skipping condition rule");
                issues.push(format!("{scope}: {err}"));
                None
            }
        }
    }
}

fn normalize_tag(tag: &str) -> String {
    tag.trim().to_ascii_lowercase().replace('-', "_")
}
