//! Stackable, time-boxed reward multipliers plus the static privilege tier.
//!
//! Grants are scoped to all actors or one actor, and to all categories or
//! one category. Every active grant that applies multiplies into the total.
//! A grant past its expiry is ignored immediately and removed later by
//! [`MultiplierRegistry::sweep_expired`].

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::actor::Actor;
use crate::clock::SharedClock;
use crate::error::{JobzError, Result};
use crate::types::{ActorId, GrantId};

/// Who a grant applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "scope", content = "actor", rename_all = "snake_case")]
pub enum GrantTarget {
    /// Every actor.
    All,
    /// One actor.
    Actor(ActorId),
}

impl GrantTarget {
    fn applies_to(&self, actor: ActorId) -> bool {
        match self {
            Self::All => true,
            Self::Actor(id) => *id == actor,
        }
    }
}

/// A time-boxed multiplicative bonus. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiplierGrant {
    /// Identifier, for revocation.
    pub id: GrantId,
    /// Who benefits.
    pub target: GrantTarget,
    /// Category scope. `None` means every category.
    pub category: Option<String>,
    /// Multiplicative factor (> 0).
    pub factor: f64,
    /// When the grant was created.
    pub started_at: DateTime<Utc>,
    /// When the grant stops applying.
    pub expires_at: DateTime<Utc>,
    /// Free-form reason shown to actors.
    pub reason: String,
    /// Who issued the grant.
    pub granted_by: String,
}

impl MultiplierGrant {
    /// Whether the grant applies at `now`.
    #[must_use]
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        now >= self.started_at && now < self.expires_at
    }

    /// Whether the grant applies to an (actor, category) pair, ignoring time.
    #[must_use]
    pub fn covers(&self, actor: ActorId, category: &str) -> bool {
        self.target.applies_to(actor)
            && self
                .category
                .as_deref()
                .is_none_or(|scope| scope.eq_ignore_ascii_case(category))
    }
}

/// Parameters of a new grant.
#[derive(Debug, Clone)]
pub struct GrantRequest {
    /// Who benefits.
    pub target: GrantTarget,
    /// Category scope. `None` means every category.
    pub category: Option<String>,
    /// Multiplicative factor.
    pub factor: f64,
    /// How long the grant lasts.
    pub duration: Duration,
    /// Reason.
    pub reason: String,
    /// Issuer.
    pub granted_by: String,
}

impl GrantRequest {
    /// A request with no category scope, reason or issuer.
    #[must_use]
    pub fn new(target: GrantTarget, factor: f64, duration: Duration) -> Self {
        Self {
            target,
            category: None,
            factor,
            duration,
            reason: String::new(),
            granted_by: String::new(),
        }
    }

    /// Restrict to one category.
    #[must_use]
    pub fn in_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Attach a reason.
    #[must_use]
    pub fn because(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    /// Record the issuer.
    #[must_use]
    pub fn granted_by(mut self, who: impl Into<String>) -> Self {
        self.granted_by = who.into();
        self
    }
}

/// Selects the category scope of grants to revoke.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CategoryFilter {
    /// Any scope.
    Any,
    /// Only grants that apply to every category.
    Global,
    /// Only grants scoped to this category.
    Named(String),
}

impl CategoryFilter {
    fn accepts(&self, scope: Option<&str>) -> bool {
        match (self, scope) {
            (Self::Any, _) | (Self::Global, None) => true,
            (Self::Named(want), Some(have)) => want.eq_ignore_ascii_case(have),
            _ => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Concurrent store of multiplier grants.
pub struct MultiplierRegistry {
    grants: DashMap<GrantId, MultiplierGrant>,
    clock: SharedClock,
}

impl std::fmt::Debug for MultiplierRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiplierRegistry")
            .field("grants", &self.grants.len())
            .finish_non_exhaustive()
    }
}

impl MultiplierRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new(clock: SharedClock) -> Self {
        Self {
            grants: DashMap::new(),
            clock,
        }
    }

    /// Record a new grant starting now.
    ///
    /// # Errors
    /// Returns [`JobzError::InvalidGrant`] if the factor is not a positive
    /// finite number or the duration is not positive.
    pub fn grant(&self, request: GrantRequest) -> Result<MultiplierGrant> {
        if !request.factor.is_finite() || request.factor <= 0.0 {
            return Err(JobzError::InvalidGrant(format!(
                "factor must be positive and finite, got {}",
                request.factor
            )));
        }
        if request.duration <= Duration::zero() {
            return Err(JobzError::InvalidGrant(format!(
                "duration must be positive, got {}s",
                request.duration.num_seconds()
            )));
        }
        let started_at = self.clock.now();
        let expires_at = started_at
            .checked_add_signed(request.duration)
            .ok_or_else(|| JobzError::InvalidGrant("duration is out of range".to_string()))?;
        let grant = MultiplierGrant {
            id: GrantId::new(),
            target: request.target,
            category: request.category.map(|c| c.to_ascii_lowercase()),
            factor: request.factor,
            started_at,
            expires_at,
            reason: request.reason,
            granted_by: request.granted_by,
        };
        info!(
            grant = %grant.id,
            target = ?grant.target,
            category = grant.category.as_deref().unwrap_or("*"),
            factor = grant.factor,
            expires_at = %grant.expires_at,
            "Multiplier granted"
        );
        self.grants.insert(grant.id, grant.clone());
        Ok(grant)
    }

    /// Remove one grant.
    pub fn revoke(&self, id: GrantId) -> Option<MultiplierGrant> {
        let removed = self.grants.remove(&id).map(|(_, g)| g);
        if removed.is_some() {
            info!(grant = %id, "Multiplier revoked");
        }
        removed
    }

    /// Remove every grant with exactly this target whose category scope passes `filter`.
    pub fn revoke_matching(&self, target: GrantTarget, filter: &CategoryFilter) -> Vec<MultiplierGrant> {
        let ids: Vec<GrantId> = self
            .grants
            .iter()
            .filter(|g| g.target == target && filter.accepts(g.category.as_deref()))
            .map(|g| g.id)
            .collect();
        ids.into_iter().filter_map(|id| self.revoke(id)).collect()
    }

    /// Product of every active grant covering `(actor, category)`. 1.0 when none apply.
    #[must_use]
    pub fn total_factor(&self, actor: ActorId, category: &str) -> f64 {
        let now = self.clock.now();
        self.grants
            .iter()
            .filter(|g| g.is_active(now) && g.covers(actor, category))
            .map(|g| g.factor)
            .product()
    }

    /// Active grants benefiting `actor` (or every active grant for `None`), oldest first.
    #[must_use]
    pub fn active_grants(&self, actor: Option<ActorId>) -> Vec<MultiplierGrant> {
        let now = self.clock.now();
        let mut out: Vec<MultiplierGrant> = self
            .grants
            .iter()
            .filter(|g| g.is_active(now) && actor.is_none_or(|a| g.target.applies_to(a)))
            .map(|g| g.clone())
            .collect();
        out.sort_by_key(|g| g.started_at);
        out
    }

    /// Remove grants that expired more than `grace` ago. Returns them.
    ///
    /// A grace reaching before the representable range removes nothing.
    pub fn sweep_expired(&self, grace: Duration) -> Vec<MultiplierGrant> {
        let Some(cutoff) = self.clock.now().checked_sub_signed(grace) else {
            debug!(grace_secs = grace.num_seconds(), "Expiry grace out of range; nothing swept");
            return Vec::new();
        };
        let mut removed = Vec::new();
        self.grants.retain(|_, g| {
            if g.expires_at <= cutoff {
                removed.push(g.clone());
                false
            } else {
                true
            }
        });
        if !removed.is_empty() {
            debug!(count = removed.len(), "Swept expired multiplier grants");
        }
        removed
    }

    /// Drop every grant.
    pub fn clear(&self) {
        self.grants.clear();
    }

    /// Number of stored grants, expired or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.grants.len()
    }

    /// Whether nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.grants.is_empty()
    }

    /// Every stored grant, for persistence.
    #[must_use]
    pub fn snapshot(&self) -> Vec<MultiplierGrant> {
        self.grants.iter().map(|g| g.clone()).collect()
    }

    /// Replace all grants.
    pub fn restore(&self, grants: impl IntoIterator<Item = MultiplierGrant>) {
        self.grants.clear();
        for grant in grants {
            self.grants.insert(grant.id, grant);
        }
    }
}

// ---------------------------------------------------------------------------
// Tier Multiplier
// ---------------------------------------------------------------------------

fn default_tier_prefix() -> String {
    "jobz.tier.".to_string()
}

fn default_tier_factors() -> Vec<f64> {
    vec![1.0, 1.1, 1.25, 1.5]
}

fn default_exempt_permission() -> Option<String> {
    Some("jobz.tier.exempt".to_string())
}

/// Static multiplier derived from the actor's highest privilege tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierTable {
    /// Permission prefix; tier `n` is `<prefix><n>`.
    #[serde(default = "default_tier_prefix")]
    pub permission_prefix: String,
    /// Factor for tier 1, 2, ... in order.
    #[serde(default = "default_tier_factors")]
    pub factors: Vec<f64>,
    /// Actors holding this permission get no tier multiplier.
    #[serde(default = "default_exempt_permission")]
    pub exempt_permission: Option<String>,
}

impl Default for TierTable {
    fn default() -> Self {
        Self {
            permission_prefix: default_tier_prefix(),
            factors: default_tier_factors(),
            exempt_permission: default_exempt_permission(),
        }
    }
}

impl TierTable {
    /// The tier factor for an actor. Highest held tier wins; no tier or an
    /// exemption yields 1.0. Tiers never stack.
    #[must_use]
    pub fn factor_for(&self, actor: &dyn Actor) -> f64 {
        if let Some(exempt) = &self.exempt_permission {
            if actor.has_permission(exempt) {
                return 1.0;
            }
        }
        (1..=self.factors.len())
            .rev()
            .find(|tier| actor.has_permission(&format!("{}{tier}", self.permission_prefix)))
            .map_or(1.0, |tier| self.factors[tier - 1])
    }

    /// Check every factor is positive and finite.
    ///
    /// # Errors
    /// Returns [`JobzError::Config`] naming the first bad tier.
    pub fn validate(&self) -> Result<()> {
        match self.factors.iter().position(|f| !f.is_finite() || *f <= 0.0) {
            Some(idx) => Err(JobzError::Config(format!(
                "tier {} factor must be positive and finite, got {}",
                idx + 1,
                self.factors[idx]
            ))),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::actor::ActorProfile;
    use crate::clock::ManualClock;

    fn setup() -> (ManualClock, MultiplierRegistry) {
        let clock = ManualClock::default();
        let registry = MultiplierRegistry::new(Arc::new(clock.clone()));
        (clock, registry)
    }

    #[test]
    fn global_and_category_grants_stack() {
        let (_clock, reg) = setup();
        let a = ActorId::new();
        reg.grant(GrantRequest::new(GrantTarget::Actor(a), 1.5, Duration::hours(1)))
            .expect("grant");
        reg.grant(GrantRequest::new(GrantTarget::Actor(a), 2.0, Duration::hours(1)).in_category("mining"))
            .expect("grant");

        assert!((reg.total_factor(a, "mining") - 3.0).abs() < 1e-9);
        assert!((reg.total_factor(a, "farming") - 1.5).abs() < 1e-9);
        assert!((reg.total_factor(ActorId::new(), "mining") - 1.0).abs() < 1e-9);
    }

    #[test]
    fn expired_grants_are_inert_before_sweep() {
        let (clock, reg) = setup();
        let a = ActorId::new();
        reg.grant(GrantRequest::new(GrantTarget::All, 2.0, Duration::minutes(10)))
            .expect("grant");
        assert!((reg.total_factor(a, "mining") - 2.0).abs() < 1e-9);

        clock.advance(Duration::minutes(10));
        assert!((reg.total_factor(a, "mining") - 1.0).abs() < 1e-9);
        assert_eq!(reg.len(), 1);
        assert!(reg.active_grants(Some(a)).is_empty());

        // Within grace: kept. Past grace: removed and returned.
        assert!(reg.sweep_expired(Duration::minutes(5)).is_empty());
        clock.advance(Duration::minutes(5));
        let swept = reg.sweep_expired(Duration::minutes(5));
        assert_eq!(swept.len(), 1);
        assert!(reg.is_empty());
    }

    #[test]
    fn invalid_grants_are_rejected() {
        let (_clock, reg) = setup();
        for factor in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let req = GrantRequest::new(GrantTarget::All, factor, Duration::hours(1));
            assert!(matches!(reg.grant(req), Err(JobzError::InvalidGrant(_))));
        }
        let req = GrantRequest::new(GrantTarget::All, 2.0, Duration::zero());
        assert!(matches!(reg.grant(req), Err(JobzError::InvalidGrant(_))));
    }

    #[test]
    fn revoke_by_id_and_selector() {
        let (_clock, reg) = setup();
        let a = ActorId::new();
        let g1 = reg
            .grant(GrantRequest::new(GrantTarget::Actor(a), 2.0, Duration::hours(1)))
            .expect("grant");
        reg.grant(GrantRequest::new(GrantTarget::Actor(a), 2.0, Duration::hours(1)).in_category("Mining"))
            .expect("grant");
        reg.grant(GrantRequest::new(GrantTarget::All, 2.0, Duration::hours(1)).in_category("mining"))
            .expect("grant");

        let revoked = reg.revoke_matching(GrantTarget::Actor(a), &CategoryFilter::Named("MINING".into()));
        assert_eq!(revoked.len(), 1);
        assert_eq!(reg.revoke(g1.id).map(|g| g.id), Some(g1.id));
        assert!(reg.revoke(g1.id).is_none());
        assert_eq!(reg.active_grants(Some(a)).len(), 1);
        assert_eq!(reg.revoke_matching(GrantTarget::All, &CategoryFilter::Global).len(), 0);
        assert_eq!(reg.revoke_matching(GrantTarget::All, &CategoryFilter::Any).len(), 1);
    }

    #[test]
    fn tier_highest_wins_and_exemption_applies() {
        let tiers = TierTable::default();
        let plain = ActorProfile::new("plain");
        assert!((tiers.factor_for(&plain) - 1.0).abs() < f64::EPSILON);

        let tiered = ActorProfile::new("vip")
            .with_permission("jobz.tier.2")
            .with_permission("jobz.tier.3");
        assert!((tiers.factor_for(&tiered) - 1.25).abs() < f64::EPSILON);

        // A wildcard holder would otherwise match every tier.
        let op = ActorProfile::new("op").with_permission("*");
        assert!((tiers.factor_for(&op) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn oversized_grace_sweeps_nothing() {
        let (clock, reg) = setup();
        reg.grant(GrantRequest::new(GrantTarget::All, 2.0, Duration::seconds(5)))
            .expect("grant");
        clock.advance(Duration::minutes(1));
        assert!(reg.sweep_expired(Duration::MAX).is_empty());
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.sweep_expired(Duration::zero()).len(), 1);
    }

    #[test]
    fn tier_validation() {
        let mut tiers = TierTable::default();
        assert!(tiers.validate().is_ok());
        tiers.factors.push(-2.0);
        assert!(tiers.validate().is_err());
    }
}
