//! AND/OR condition trees with short-circuit evaluation.
//!
//! AND: the first failing rule denies with that rule's deny outcome. If all
//! rules pass, the first passing rule that carries an accept outcome supplies
//! the tree's accept outcome; children are then evaluated in order and the
//! first child that denies returns its own verdict unchanged.
//!
//! OR: the first passing rule or child allows with its accept outcome. If
//! nothing passes, the earliest failure's deny outcome is returned.
//!
//! A tree may carry shared `accept`/`deny` outcomes (a named condition with
//! shared messaging). When present they replace the individual outcomes of
//! the tree's own rules.

use serde::{Deserialize, Serialize};

use crate::actor::Actor;
use crate::types::{ActionContext, Outcome};

use super::{ConditionFactory, ConditionRule, RuleConfig, Verdict};

/// How a tree combines its rules and children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Logic {
    /// Every rule and child must pass.
    #[default]
    And,
    /// Any rule or child may pass.
    Or,
}

/// A tree as written in configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConditionTreeConfig {
    /// Optional name, for diagnostics.
    pub name: Option<String>,
    /// Combination logic.
    pub logic: Logic,
    /// Rules, evaluated in order.
    pub rules: Vec<RuleConfig>,
    /// Nested trees, evaluated after the rules.
    pub children: Vec<ConditionTreeConfig>,
    /// Shared accept outcome, overriding the rules' own.
    pub accept: Option<Outcome>,
    /// Shared deny outcome, overriding the rules' own.
    pub deny: Option<Outcome>,
}

/// A resolved condition tree.
#[derive(Debug, Clone, Default)]
pub struct ConditionTree {
    name: Option<String>,
    logic: Logic,
    rules: Vec<ConditionRule>,
    children: Vec<ConditionTree>,
    shared_accept: Option<Outcome>,
    shared_deny: Option<Outcome>,
}

impl ConditionTree {
    /// An empty tree with the given logic.
    #[must_use]
    pub fn new(logic: Logic) -> Self {
        Self {
            logic,
            ..Self::default()
        }
    }

    /// Append a rule.
    #[must_use]
    pub fn with_rule(mut self, rule: ConditionRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Append a child tree.
    #[must_use]
    pub fn with_child(mut self, child: ConditionTree) -> Self {
        self.children.push(child);
        self
    }

    /// Set shared outcomes.
    #[must_use]
    pub fn with_shared(mut self, accept: Option<Outcome>, deny: Option<Outcome>) -> Self {
        self.shared_accept = accept;
        self.shared_deny = deny;
        self
    }

    /// Build from config. Rules that fail to build are dropped and reported in `issues`.
    #[must_use]
    pub fn from_config(
        config: &ConditionTreeConfig,
        factory: &ConditionFactory,
        scope: &str,
        issues: &mut Vec<String>,
    ) -> Self {
        let scope = match &config.name {
            Some(name) => format!("{scope}/{name}"),
            None => scope.to_string(),
        };
        Self {
            name: config.name.clone(),
            logic: config.logic,
            rules: config
                .rules
                .iter()
                .filter_map(|r| factory.build_or_skip(r, &scope, issues))
                .collect(),
            children: config
                .children
                .iter()
                .map(|c| Self::from_config(c, factory, &scope, issues))
                .collect(),
            shared_accept: config.accept.clone(),
            shared_deny: config.deny.clone(),
        }
    }

    /// Optional diagnostic name.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Whether the tree has neither rules nor children.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty() && self.children.is_empty()
    }

    /// Shared deny outcome, if configured.
    #[must_use]
    pub fn shared_deny(&self) -> Option<&Outcome> {
        self.shared_deny.as_ref()
    }

    /// Evaluate against an actor and context.
    ///
    /// An empty tree allows with no effect, whatever its logic.
    #[must_use]
    pub fn evaluate(&self, actor: &dyn Actor, ctx: &ActionContext) -> Verdict {
        if self.is_empty() {
            return Verdict::allow();
        }
        match self.logic {
            Logic::And => self.evaluate_and(actor, ctx),
            Logic::Or => self.evaluate_or(actor, ctx),
        }
    }

    fn accept_of<'a>(&'a self, rule: &'a ConditionRule) -> Option<&'a Outcome> {
        self.shared_accept.as_ref().or(rule.accept_outcome())
    }

    fn deny_of<'a>(&'a self, rule: &'a ConditionRule) -> Option<&'a Outcome> {
        self.shared_deny.as_ref().or(rule.deny_outcome())
    }

    fn evaluate_and(&self, actor: &dyn Actor, ctx: &ActionContext) -> Verdict {
        let mut accepted: Option<Outcome> = None;

        for rule in &self.rules {
            if !rule.is_met(actor, ctx) {
                return Verdict {
                    allowed: false,
                    outcome: self.deny_of(rule).cloned().unwrap_or_default(),
                };
            }
            if accepted.is_none() {
                accepted = self.accept_of(rule).cloned();
            }
        }

        for child in &self.children {
            let verdict = child.evaluate(actor, ctx);
            if !verdict.allowed {
                return verdict;
            }
            if accepted.is_none() && !verdict.outcome.is_empty() {
                accepted = Some(verdict.outcome);
            }
        }

        Verdict {
            allowed: true,
            outcome: accepted.or_else(|| self.shared_accept.clone()).unwrap_or_default(),
        }
    }

    fn evaluate_or(&self, actor: &dyn Actor, ctx: &ActionContext) -> Verdict {
        let mut first_denial: Option<Outcome> = None;

        for rule in &self.rules {
            if rule.is_met(actor, ctx) {
                return Verdict {
                    allowed: true,
                    outcome: self.accept_of(rule).cloned().unwrap_or_default(),
                };
            }
            if first_denial.is_none() {
                first_denial = self.deny_of(rule).cloned();
            }
        }

        for child in &self.children {
            let verdict = child.evaluate(actor, ctx);
            if verdict.allowed {
                return verdict;
            }
            if first_denial.is_none() && !verdict.outcome.is_empty() {
                first_denial = Some(verdict.outcome);
            }
        }

        Verdict {
            allowed: false,
            outcome: first_denial.or_else(|| self.shared_deny.clone()).unwrap_or_default(),
        }
    }
}
