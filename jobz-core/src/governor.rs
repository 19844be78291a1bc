//! Per-actor rate limiting: "max actions per period, then cooldown".
//!
//! State lives in one flat [`DashMap`] keyed by `(actor, category, pattern)`.
//! `DashMap` shards internally, so unrelated actors never contend on the same
//! lock, and [`DashMap::entry`] holds the shard lock for the whole
//! read-modify-write, so two simultaneous actions by one actor can never
//! both take the last slot.
//!
//! ```text
//!  Idle ──consume──▶ Active ──consume reaches max──▶ Throttled
//!   ▲                                                   │
//!   └──── manual reset / bulk reset / cooldown expiry ───┘
//! ```

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::clock::SharedClock;
use crate::types::ActorId;

/// Wildcard accepted by [`RateLimitGovernor::reset`] for category or pattern.
pub const WILDCARD: &str = "*";

/// Composite key of one rate-limit counter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RateKey {
    /// Who acted.
    pub actor: ActorId,
    /// Category the action counted against.
    pub category: Arc<str>,
    /// Pattern of the definition that matched.
    pub pattern: Arc<str>,
}

impl RateKey {
    /// Build a key.
    #[must_use]
    pub fn new(actor: ActorId, category: &str, pattern: &str) -> Self {
        Self {
            actor,
            category: Arc::from(category),
            pattern: Arc::from(pattern),
        }
    }
}

/// Mutable counter for one key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitState {
    /// Actions consumed in the current period.
    pub count: u32,
    /// Denials continue until this instant. `None` while not cooling down.
    pub cooldown_until: Option<DateTime<Utc>>,
}

/// A category's rate-limit policy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimitPolicy {
    /// Actions allowed per period. Always at least 1.
    pub max_actions: u32,
    /// Cooldown armed once the quota fills. `None` means "until the next reset".
    pub cooldown: Option<Duration>,
}

/// Result of [`RateLimitGovernor::check_and_consume`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    /// The action consumed a slot.
    Allowed {
        /// Slots left in this period.
        remaining: u32,
    },
    /// The quota is exhausted.
    Denied {
        /// When the cooldown ends, if it is time-boxed.
        until: Option<DateTime<Utc>>,
    },
}

impl RateDecision {
    /// Whether the action may be rewarded.
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }
}

/// Tracks consumed counts and cooldowns for every `(actor, category, pattern)`.
pub struct RateLimitGovernor {
    states: DashMap<RateKey, RateLimitState>,
    clock: SharedClock,
}

impl std::fmt::Debug for RateLimitGovernor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimitGovernor")
            .field("tracked_keys", &self.states.len())
            .finish_non_exhaustive()
    }
}

impl RateLimitGovernor {
    /// An empty governor.
    #[must_use]
    pub fn new(clock: SharedClock) -> Self {
        Self {
            states: DashMap::new(),
            clock,
        }
    }

    /// Gate one action.
    ///
    /// An active cooldown always denies. An expired cooldown resets the key to
    /// idle first. A full quota arms the cooldown and denies. Otherwise the
    /// count is incremented, and if that fills the quota the cooldown is armed
    /// immediately: this action succeeds, the next one is blocked.
    pub fn check_and_consume(&self, key: &RateKey, policy: &RateLimitPolicy) -> RateDecision {
        let now = self.clock.now();
        let max = policy.max_actions.max(1);
        let mut state = self.states.entry(key.clone()).or_default();

        if let Some(until) = state.cooldown_until {
            if now < until {
                return RateDecision::Denied { until: Some(until) };
            }
            debug!(actor = %key.actor, category = %key.category, pattern = %key.pattern, "Cooldown expired");
            *state = RateLimitState::default();
        }

        // An unrepresentable expiry degrades to "until the next reset".
        let arm = |now: DateTime<Utc>| policy.cooldown.and_then(|d| now.checked_add_signed(d));

        if state.count >= max {
            state.cooldown_until = arm(now);
            return RateDecision::Denied {
                until: state.cooldown_until,
            };
        }

        state.count += 1;
        if state.count >= max {
            state.cooldown_until = arm(now);
            debug!(
                actor = %key.actor,
                category = %key.category,
                pattern = %key.pattern,
                until = ?state.cooldown_until,
                "Quota filled; cooldown armed"
            );
        }
        RateDecision::Allowed {
            remaining: max - state.count,
        }
    }

    /// Current state for a key, if it has ever been observed.
    #[must_use]
    pub fn state(&self, key: &RateKey) -> Option<RateLimitState> {
        self.states.get(key).map(|s| *s)
    }

    /// Reset every key for `actor` whose category and pattern match.
    /// `*` matches everything. Returns the number of entries reset.
    pub fn reset(&self, actor: ActorId, category: &str, pattern: &str) -> usize {
        let matches = |value: &str, selector: &str| selector == WILDCARD || value.eq_ignore_ascii_case(selector);
        let mut removed = 0;
        self.states.retain(|key, _| {
            let hit = key.actor == actor && matches(&key.category, category) && matches(&key.pattern, pattern);
            if hit {
                removed += 1;
            }
            !hit
        });
        info!(actor = %actor, category, pattern, removed, "Manual rate-limit reset");
        removed
    }

    /// Reset every known key to idle. Returns the number of entries reset.
    pub fn reset_all(&self) -> usize {
        let count = self.states.len();
        self.states.clear();
        count
    }

    /// Number of tracked keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Whether nothing is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Copy of every tracked state, for persistence.
    #[must_use]
    pub fn snapshot(&self) -> Vec<(RateKey, RateLimitState)> {
        self.states.iter().map(|e| (e.key().clone(), *e.value())).collect()
    }

    /// Replace all tracked state.
    pub fn restore(&self, entries: impl IntoIterator<Item = (RateKey, RateLimitState)>) {
        self.states.clear();
        for (key, state) in entries {
            self.states.insert(key, state);
        }
    }
}
