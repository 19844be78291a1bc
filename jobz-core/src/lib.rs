//! # JOBZ Core Library
//!
//! Game-agnostic reward engine for "jobs" style progression. An adapter
//! turns a game event into an [`ActionContext`] and asks the
//! [`RewardEngine`] what the acting player earns:
//!
//! - **Action definitions** match targets by pattern (`STONE`, `LOG_*`,
//!   `*_ORE`, `minecraft:stone`)
//! - **Condition trees** gate rewards on permissions, placeholders, held
//!   items, time of day, weather and host-registered checks
//! - **Rate limits** cap rewarded actions per actor and arm cooldowns
//! - **Multipliers** stack privilege tiers and timed grants
//! - **Level curves** map accumulated points to levels, from a table or an
//!   equation in `level`
//!
//! The engine never talks to the game. It returns a [`ResolutionResult`]
//! with amounts, level changes and [`EffectDirective`]s for the
//! presentation layer to carry out.
//!
//! ## Performance Contract
//!
//! `process` is synchronous, allocation-light and lock-sharded:
//! - Unrelated actors never contend on a shared lock
//! - Configuration reloads swap an immutable catalog atomically
//! - Background sweeps and saves run on tokio tasks, off the hot path

#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod action;
pub mod actor;
pub mod clock;
pub mod condition;
pub mod config;
pub mod curve;
pub mod error;
pub mod formula;
pub mod governor;
pub mod metrics;
pub mod multiplier;
pub mod pattern;
pub mod persistence;
pub mod progress;
pub mod registry;
pub mod resolver;
pub mod scheduler;
pub mod telemetry;
pub mod types;

pub use action::{ActionDefinition, Reward};
pub use actor::{Actor, ActorProfile};
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use condition::{Condition, ConditionFactory, ConditionRule, ConditionTree, Logic, Verdict};
pub use config::JobzConfig;
pub use curve::LevelCurve;
pub use error::{JobzError, Result};
pub use governor::{RateDecision, RateKey, RateLimitGovernor, RateLimitPolicy};
pub use multiplier::{GrantRequest, GrantTarget, MultiplierGrant, MultiplierRegistry};
pub use pattern::TargetPattern;
pub use persistence::{EngineSnapshot, JsonFileStore, ProgressStore};
pub use registry::{Catalog, LoadReport};
pub use resolver::{EngineBuilder, EngineNotice, ResolutionResult, RewardEngine};
pub use types::*;
