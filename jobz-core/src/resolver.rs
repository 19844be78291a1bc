//! The reward resolver: one entry point per qualifying action.
//!
//! ```text
//!  process(actor, category, ctx)
//!    └─ for every matching definition, in order
//!         1. condition tree      → deny: emit deny outcome, next definition
//!         2. rate-limit governor → deny: withhold reward, emit cooldown outcome
//!         3. max level           → withhold reward
//!         4. tier × grants       → scale reward
//!         5. progress + curve    → level-up outcome
//!         6. definition effects  (after the amounts are known)
//! ```
//!
//! `process` is synchronous and bounded. Per-key state lives in sharded
//! concurrent maps, and the catalog is an immutable `Arc` swapped on reload,
//! so unrelated actors never serialize on a shared lock.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::{debug, info, trace, warn};

use crate::action::{ActionDefinition, Reward};
use crate::actor::Actor;
use crate::clock::{SharedClock, SystemClock};
use crate::condition::ConditionFactory;
use crate::config::{JobzConfig, MultiplierConfig};
use crate::error::{JobzError, Result};
use crate::governor::{RateDecision, RateKey, RateLimitGovernor};
use crate::metrics::{COUNTERS, EngineCounters, LatencyMonitor, spans};
use crate::multiplier::{CategoryFilter, GrantRequest, GrantTarget, MultiplierGrant, MultiplierRegistry};
use crate::persistence::{EngineSnapshot, ProgressStore, SNAPSHOT_VERSION};
use crate::progress::{ActorProgress, ProgressBook, ProgressRecord};
use crate::registry::{Catalog, Category, LoadReport};
use crate::types::{ActionContext, ActorId, EffectDirective, GrantId, Outcome, TextVars};

/// Capacity of the notice channel. Slow subscribers miss old notices.
const NOTICE_CAPACITY: usize = 256;

/// Aggregate decision for one action.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolutionResult {
    /// Experience awarded across all matched definitions.
    pub final_xp: f64,
    /// Currency awarded across all matched definitions.
    pub final_currency: f64,
    /// Whether any definition pushed the actor over a level threshold.
    pub leveled_up: bool,
    /// Level after the last level-up, if any.
    pub new_level: Option<u32>,
    /// Directives for the presentation layer, in emission order.
    pub effects: Vec<EffectDirective>,
    /// Whether the adapter should cancel the originating event.
    pub suppress_event: bool,
    /// Number of definitions that matched the context.
    pub matched: usize,
}

impl ResolutionResult {
    /// Whether anything was paid.
    #[must_use]
    pub fn is_rewarded(&self) -> bool {
        self.final_xp != 0.0 || self.final_currency != 0.0
    }

    fn emit(&mut self, outcome: &Outcome, vars: &TextVars<'_>) {
        self.suppress_event |= outcome.suppress_event;
        let directive = outcome.render(vars);
        if !directive.is_empty() {
            self.effects.push(directive);
        }
    }
}

/// Events for the presentation layer that are not tied to one `process` call.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineNotice {
    /// A bulk reset returned every rate-limit counter to idle.
    RateLimitsReset {
        /// Entries reset.
        count: usize,
    },
    /// The sweeper removed an expired grant.
    MultiplierExpired(MultiplierGrant),
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Assembles a [`RewardEngine`].
pub struct EngineBuilder {
    config: JobzConfig,
    factory: ConditionFactory,
    clock: SharedClock,
}

impl EngineBuilder {
    /// Start from a configuration, the built-in conditions and the system clock.
    #[must_use]
    pub fn new(config: JobzConfig) -> Self {
        Self {
            config,
            factory: ConditionFactory::new(),
            clock: Arc::new(SystemClock),
        }
    }

    /// Use a factory with host-registered conditions.
    #[must_use]
    pub fn with_factory(mut self, factory: ConditionFactory) -> Self {
        self.factory = factory;
        self
    }

    /// Use another clock.
    #[must_use]
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    /// Load the configuration and build the engine.
    #[must_use]
    pub fn build(self) -> (RewardEngine, LoadReport) {
        let (catalog, report) = Catalog::load(&self.config, &self.factory);
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);
        let engine = RewardEngine {
            catalog: RwLock::new(Arc::new(catalog)),
            config: RwLock::new(Arc::new(self.config)),
            factory: self.factory,
            governor: RateLimitGovernor::new(Arc::clone(&self.clock)),
            multipliers: MultiplierRegistry::new(Arc::clone(&self.clock)),
            progress: ProgressBook::new(),
            clock: self.clock,
            notices,
            latency: LatencyMonitor::new(0.5),
        };
        (engine, report)
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// The reward engine. Share it behind an `Arc`; every method takes `&self`.
pub struct RewardEngine {
    catalog: RwLock<Arc<Catalog>>,
    config: RwLock<Arc<JobzConfig>>,
    factory: ConditionFactory,
    governor: RateLimitGovernor,
    multipliers: MultiplierRegistry,
    progress: ProgressBook,
    clock: SharedClock,
    notices: broadcast::Sender<EngineNotice>,
    latency: LatencyMonitor,
}

impl std::fmt::Debug for RewardEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RewardEngine")
            .field("governor", &self.governor)
            .field("multipliers", &self.multipliers)
            .field("progress_entries", &self.progress.len())
            .finish_non_exhaustive()
    }
}

impl RewardEngine {
    /// Build with the built-in conditions and the system clock.
    #[must_use]
    pub fn new(config: JobzConfig) -> (Self, LoadReport) {
        EngineBuilder::new(config).build()
    }

    /// Builder for custom conditions or clocks.
    #[must_use]
    pub fn builder(config: JobzConfig) -> EngineBuilder {
        EngineBuilder::new(config)
    }

    /// Resolve one action.
    pub fn process(&self, actor: &dyn Actor, category: &str, ctx: &ActionContext) -> ResolutionResult {
        let _timing = self.latency.begin();
        let _span = tracing::debug_span!(spans::PROCESS, actor = %actor.id(), category, target = ctx.target()).entered();
        EngineCounters::bump(&COUNTERS.actions_processed);

        let catalog = self.catalog.read().clone();
        let mut result = ResolutionResult::default();
        if !catalog.enabled() {
            return result;
        }
        let Some(cat) = catalog.category(category).filter(|c| c.curve().is_some()) else {
            EngineCounters::bump(&COUNTERS.inactive_category_hits);
            debug!(category, "Action for unknown or disabled category ignored");
            return result;
        };

        for def in cat.matching(ctx) {
            result.matched += 1;
            self.resolve_line(&catalog, cat, def, actor, ctx, &mut result);
        }

        trace!(
            matched = result.matched,
            xp = result.final_xp,
            currency = result.final_currency,
            leveled_up = result.leveled_up,
            suppress = result.suppress_event,
            "Action resolved"
        );
        result
    }

    fn resolve_line(
        &self,
        catalog: &Catalog,
        cat: &Category,
        def: &ActionDefinition,
        actor: &dyn Actor,
        ctx: &ActionContext,
        result: &mut ResolutionResult,
    ) {
        let Some(curve) = cat.curve() else { return };
        let actor_id = actor.id();
        let before = self.progress.get_on(actor_id, cat.key(), curve, cat.max_level());
        let mut vars = TextVars {
            player: actor.name(),
            category: cat.display_name(),
            target: ctx.target(),
            level: Some(before.level),
            ..TextVars::default()
        };

        // Requirements.
        if let Some(tree) = def.conditions() {
            let verdict = {
                let _span = tracing::trace_span!(spans::CONDITIONS, pattern = def.pattern().as_str()).entered();
                tree.evaluate(actor, ctx)
            };
            if !verdict.allowed {
                EngineCounters::bump(&COUNTERS.condition_denials);
                let outcome = if verdict.outcome.is_empty() {
                    def.deny_outcome().cloned().unwrap_or_default()
                } else {
                    verdict.outcome
                };
                debug!(pattern = def.pattern().as_str(), "Requirements denied");
                result.emit(&outcome, &vars);
                return;
            }
            result.emit(&verdict.outcome, &vars);
        }

        let mut reward = def.base_reward(ctx);
        let mut paid_line = true;

        // Rate limit.
        if let Some(limit) = cat.limit() {
            let key = RateKey::new(actor_id, cat.key(), def.pattern().as_str());
            if let RateDecision::Denied { until } = self.governor.check_and_consume(&key, &limit.policy) {
                EngineCounters::bump(&COUNTERS.rate_limited);
                paid_line = false;
                let (block_xp, block_currency) = def.blocks(limit.block_xp, limit.block_currency);
                if block_xp {
                    reward.xp = 0.0;
                }
                if block_currency {
                    reward.currency = 0.0;
                }
                let outcome = limit.message.as_ref().unwrap_or(&catalog.messages().cooldown);
                vars.remaining = Some(format_remaining(until, self.clock.now()));
                result.emit(outcome, &vars);
                vars.remaining = None;
                if def.deny_outcome().is_some_and(|d| d.suppress_event) {
                    result.suppress_event = true;
                }
                debug!(pattern = def.pattern().as_str(), until = ?until, "Rate limited");
            }
        }

        // Level cap.
        if before.level >= cat.max_level() {
            EngineCounters::bump(&COUNTERS.max_level_skips);
            reward = Reward::default();
            paid_line = false;
        }

        // Multipliers.
        if !reward.is_zero() {
            let factor = catalog.tiers().factor_for(actor) * self.multipliers.total_factor(actor_id, cat.key());
            reward = reward.scaled(factor);
            if !(reward.xp.is_finite() && reward.currency.is_finite()) {
                warn!(actor = %actor_id, category = cat.key(), factor, "Reward overflowed; nothing paid");
                reward = Reward::default();
            }
        }

        // Progress.
        vars.xp = Some(reward.xp);
        vars.currency = Some(reward.currency);
        if reward.xp != 0.0 {
            let change = self
                .progress
                .add_points(actor_id, cat.key(), reward.xp, curve, cat.max_level());
            vars.level = Some(change.new_level);
            if change.leveled_up() {
                EngineCounters::bump(&COUNTERS.level_ups);
                result.leveled_up = true;
                result.new_level = Some(change.new_level);
                info!(
                    actor = %actor_id,
                    category = cat.key(),
                    from = change.old_level,
                    to = change.new_level,
                    "Level up"
                );
                let outcome = cat.level_up().unwrap_or(&catalog.messages().level_up);
                result.emit(outcome, &vars);
            }
        }
        if !reward.is_zero() {
            EngineCounters::bump(&COUNTERS.rewards_granted);
        }
        result.final_xp += reward.xp;
        result.final_currency += reward.currency;

        // Definition effects, once the amounts are known.
        if paid_line {
            if let Some(effects) = def.effects() {
                result.emit(effects, &vars);
            }
        }
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Progress of an actor in a category. An untouched actor sits at the
    /// category curve's starting level.
    #[must_use]
    pub fn progress(&self, actor: ActorId, category: &str) -> ActorProgress {
        let key = category.to_ascii_lowercase();
        let catalog = self.catalog();
        match catalog.category(&key).and_then(|cat| cat.curve().map(|c| (c, cat.max_level()))) {
            Some((curve, max_level)) => self.progress.get_on(actor, &key, curve, max_level),
            None => self.progress.get(actor, &key),
        }
    }

    /// Current level of an actor in a category.
    #[must_use]
    pub fn level(&self, actor: ActorId, category: &str) -> u32 {
        self.progress(actor, category).level
    }

    /// Product of active grants for an actor in a category (tier excluded).
    #[must_use]
    pub fn total_factor(&self, actor: ActorId, category: &str) -> f64 {
        self.multipliers.total_factor(actor, category)
    }

    /// Tier multiplier an actor would receive.
    #[must_use]
    pub fn tier_factor(&self, actor: &dyn Actor) -> f64 {
        self.catalog.read().tiers().factor_for(actor)
    }

    /// Active grants benefiting an actor, or all active grants for `None`.
    #[must_use]
    pub fn active_grants(&self, actor: Option<ActorId>) -> Vec<MultiplierGrant> {
        self.multipliers.active_grants(actor)
    }

    /// The catalog currently in effect.
    #[must_use]
    pub fn catalog(&self) -> Arc<Catalog> {
        self.catalog.read().clone()
    }

    /// The configuration currently in effect.
    #[must_use]
    pub fn config(&self) -> Arc<JobzConfig> {
        self.config.read().clone()
    }

    /// The engine's clock.
    #[must_use]
    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }

    /// Timing of recent `process` calls.
    #[must_use]
    pub fn latency(&self) -> &LatencyMonitor {
        &self.latency
    }

    /// Receive engine notices.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<EngineNotice> {
        self.notices.subscribe()
    }

    // ------------------------------------------------------------------
    // Administration
    // ------------------------------------------------------------------

    /// Reset rate-limit counters for `actor`; `*` is a wildcard for either
    /// selector. Returns the number of entries reset.
    pub fn reset_rate_limits(&self, actor: ActorId, category: &str, pattern: &str) -> usize {
        self.governor.reset(actor, category, pattern)
    }

    /// Reset every rate-limit counter and notify subscribers.
    pub fn bulk_reset(&self) -> usize {
        let _span = tracing::info_span!(spans::RATE_LIMIT_RESET).entered();
        let count = self.governor.reset_all();
        EngineCounters::bump(&COUNTERS.bulk_resets);
        info!(count, "Bulk rate-limit reset");
        let _ = self.notices.send(EngineNotice::RateLimitsReset { count });
        count
    }

    /// Issue a multiplier grant.
    ///
    /// # Errors
    /// Returns [`JobzError::InvalidGrant`] for a non-positive factor or duration.
    pub fn grant_multiplier(&self, request: GrantRequest) -> Result<MultiplierGrant> {
        self.multipliers.grant(request)
    }

    /// Revoke one grant.
    pub fn revoke_multiplier(&self, id: GrantId) -> Option<MultiplierGrant> {
        self.multipliers.revoke(id)
    }

    /// Revoke grants by target and category scope.
    pub fn revoke_multipliers(&self, target: GrantTarget, filter: &CategoryFilter) -> Vec<MultiplierGrant> {
        self.multipliers.revoke_matching(target, filter)
    }

    /// Remove grants expired longer than the configured grace and notify subscribers.
    pub fn sweep_multipliers(&self) -> Vec<MultiplierGrant> {
        let _span = tracing::debug_span!(spans::MULTIPLIER_SWEEP).entered();
        let grace = self
            .config
            .read()
            .multipliers
            .expiry_grace()
            .unwrap_or_else(|_| secs(MultiplierConfig::default().expiry_grace_secs));
        let removed = self.multipliers.sweep_expired(grace);
        if !removed.is_empty() {
            EngineCounters::add(&COUNTERS.grants_expired, removed.len() as u64);
            info!(count = removed.len(), "Expired multipliers removed");
            for grant in &removed {
                let _ = self.notices.send(EngineNotice::MultiplierExpired(grant.clone()));
            }
        }
        removed
    }

    /// Overwrite an actor's points in a category.
    ///
    /// # Errors
    /// Returns [`JobzError::Config`] if the category is unknown or disabled.
    pub fn set_points(&self, actor: ActorId, category: &str, points: f64) -> Result<()> {
        let catalog = self.catalog();
        let cat = catalog
            .category(category)
            .ok_or_else(|| JobzError::Config(format!("unknown category `{category}`")))?;
        let curve = cat
            .curve()
            .ok_or_else(|| JobzError::Config(format!("category `{category}` is disabled")))?;
        self.progress.set_points(actor, cat.key(), points, curve, cat.max_level());
        Ok(())
    }

    /// Drop an actor's progress in every category.
    pub fn forget_actor(&self, actor: ActorId) -> usize {
        self.progress.forget(actor)
    }

    /// Clear all runtime state: rate limits, progress and grants.
    pub fn clear_state(&self) {
        self.governor.reset_all();
        self.progress.clear();
        self.multipliers.clear();
        info!("Engine runtime state cleared");
    }

    /// Load a new configuration, swap the catalog atomically, clear runtime state.
    ///
    /// Hosts that want to keep progress take a [`snapshot`](Self::snapshot)
    /// first and [`restore`](Self::restore) it afterwards.
    pub fn reload(&self, config: JobzConfig) -> LoadReport {
        let (catalog, report) = Catalog::load(&config, &self.factory);
        *self.catalog.write() = Arc::new(catalog);
        *self.config.write() = Arc::new(config);
        self.clear_state();
        info!(active = report.active.len(), disabled = report.disabled.len(), "Configuration reloaded");
        report
    }

    // ------------------------------------------------------------------
    // Snapshots
    // ------------------------------------------------------------------

    /// Copy all runtime state.
    #[must_use]
    pub fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            version: SNAPSHOT_VERSION,
            taken_at: self.clock.now(),
            progress: self.progress.snapshot(),
            rate_limits: self.governor.snapshot(),
            grants: self.multipliers.snapshot(),
        }
    }

    /// Replace all runtime state. Levels are recomputed against the current
    /// curves, so restoring after a curve change stays consistent.
    pub fn restore(&self, snapshot: EngineSnapshot) {
        let catalog = self.catalog();
        let records: Vec<ProgressRecord> = snapshot
            .progress
            .into_iter()
            .map(|mut record| {
                if let Some(cat) = catalog.category(&record.category) {
                    if let Some(curve) = cat.curve() {
                        record.progress.level = curve.level_for_points(record.progress.points, cat.max_level());
                    }
                }
                record
            })
            .collect();
        info!(
            progress = records.len(),
            rate_limits = snapshot.rate_limits.len(),
            grants = snapshot.grants.len(),
            "Restoring engine state"
        );
        self.progress.restore(records);
        self.governor.restore(snapshot.rate_limits);
        self.multipliers.restore(snapshot.grants);
    }

    /// Snapshot and write to a store.
    ///
    /// # Errors
    /// Propagates the store's error.
    pub fn save_to(&self, store: &dyn ProgressStore) -> Result<()> {
        store.save(&self.snapshot())?;
        EngineCounters::bump(&COUNTERS.saves_completed);
        Ok(())
    }

    /// Restore from a store. Returns whether a snapshot existed.
    ///
    /// # Errors
    /// Propagates the store's error.
    pub fn load_from(&self, store: &dyn ProgressStore) -> Result<bool> {
        match store.load()? {
            Some(snapshot) => {
                self.restore(snapshot);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

pub(crate) fn secs(n: u64) -> Duration {
    Duration::try_seconds(i64::try_from(n).unwrap_or(i64::MAX)).unwrap_or(Duration::MAX)
}

/// Human-readable time left on a cooldown.
fn format_remaining(until: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    let Some(until) = until else {
        return "the next reset".to_string();
    };
    let total = (until - now).num_seconds().max(0);
    let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);
    match (h, m) {
        (0, 0) => format!("{s}s"),
        (0, _) => format!("{m}m {s}s"),
        _ => format!("{h}h {m}m"),
    }
}
