//! JOBZ Benchmark Suite
//!
//! Hot-path latency targets:
//!   process_single_match ............. < 5μs
//!   process_conditioned_rate_limited . < 10μs
//!   process_1000_actors_random ....... < 5ms
//!   level_for_points_formula ......... < 2μs

use std::sync::Arc;

use chrono::Duration;
use criterion::{Criterion, black_box, criterion_group, criterion_main};
use rand::{Rng, SeedableRng, rngs::StdRng};

use jobz_core::{
    ActionContext, ActorProfile, GrantRequest, GrantTarget, JobzConfig, LevelCurve, RewardEngine,
};

const CONFIG: &str = r#"
    [multipliers]
    sweep_interval_secs = 0

    [categories.mining]
    max_level = 100
    curve = { formula = "100 * level ^ 2 + 50 * level" }
    rate_limit = { max_actions = 1000000, cooldown_minutes = 60 }

    [[categories.mining.actions]]
    target = "STONE"
    xp = 1.0
    currency = 0.05

    [[categories.mining.actions]]
    target = "*_ORE"
    xp = 8.0
    currency = 1.0
    effects = { message = "+{xp} xp", sound = "entity.experience_orb.pickup" }

    [[categories.mining.actions]]
    target = "DIAMOND_ORE"
    xp = 50.0
    [categories.mining.actions.conditions]
    logic = "and"
    [[categories.mining.actions.conditions.rules]]
    type = "permission"
    permission = "jobs.mining.diamond"
    [[categories.mining.actions.conditions.rules]]
    type = "held_item"
    items = ["*_PICKAXE"]
"#;

const TARGETS: [&str; 6] = ["STONE", "IRON_ORE", "GOLD_ORE", "DIAMOND_ORE", "DIRT", "COAL_ORE"];

fn engine() -> Arc<RewardEngine> {
    let config = JobzConfig::from_toml(CONFIG).unwrap_or_default();
    let (engine, _report) = RewardEngine::new(config);
    engine
        .grant_multiplier(GrantRequest::new(GrantTarget::All, 1.5, Duration::hours(24)).in_category("mining"))
        .ok();
    Arc::new(engine)
}

/// Benchmark: one action matching one unconditioned definition (target: < 5μs).
fn bench_single_match(c: &mut Criterion) {
    let engine = engine();
    let actor = ActorProfile::new("Steve");
    let ctx = ActionContext::new("STONE");
    c.bench_function("process_single_match", |b| {
        b.iter(|| black_box(engine.process(&actor, "mining", black_box(&ctx))));
    });
}

/// Benchmark: condition tree + rate limit + effects rendering (target: < 10μs).
fn bench_conditioned(c: &mut Criterion) {
    let engine = engine();
    let actor = ActorProfile::new("Steve")
        .with_permission("jobs.mining.diamond")
        .with_permission("jobz.tier.3")
        .holding("DIAMOND_PICKAXE");
    let ctx = ActionContext::new("DIAMOND_ORE");
    c.bench_function("process_conditioned_rate_limited", |b| {
        b.iter(|| black_box(engine.process(&actor, "mining", black_box(&ctx))));
    });
}

/// Benchmark: 1000 distinct actors with random targets (target: < 5ms).
fn bench_many_actors(c: &mut Criterion) {
    let engine = engine();
    let actors: Vec<ActorProfile> = (0..1000).map(|i| ActorProfile::new(format!("player{i}"))).collect();
    let mut rng = StdRng::seed_from_u64(42);
    let contexts: Vec<ActionContext> = (0..1000)
        .map(|_| ActionContext::new(TARGETS[rng.gen_range(0..TARGETS.len())]))
        .collect();

    c.bench_function("process_1000_actors_random", |b| {
        b.iter(|| {
            for (actor, ctx) in actors.iter().zip(&contexts) {
                black_box(engine.process(actor, "mining", ctx));
            }
        });
    });
}

/// Benchmark: level lookup on an equation curve (target: < 2μs).
fn bench_level_lookup(c: &mut Criterion) {
    let Ok(curve) = LevelCurve::formula("100 * level ^ 2 + 50 * level") else {
        return;
    };
    c.bench_function("level_for_points_formula", |b| {
        b.iter(|| black_box(curve.level_for_points(black_box(123_456.0), 100)));
    });
}

criterion_group!(
    benches,
    bench_single_match,
    bench_conditioned,
    bench_many_actors,
    bench_level_lookup,
);
criterion_main!(benches);
