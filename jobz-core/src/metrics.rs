//! Runtime metrics & instrumentation.
//!
//! Lock-free atomic counters incremented on the hot path, a latency monitor
//! for `process` calls, and span names for profiling. Counters are exported
//! as Prometheus text for server dashboards.
//!
//! Counters are `AtomicU64` with relaxed ordering. Latencies land in a
//! fixed log-scale histogram of atomic buckets, so concurrent `process`
//! calls never serialise on the monitor.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

// ---------------------------------------------------------------------------
// Global Counters (lock-free)
// ---------------------------------------------------------------------------

/// Process-wide counters. Every engine instance reports here.
pub static COUNTERS: EngineCounters = EngineCounters::new();

/// Atomic counters for high-frequency events.
pub struct EngineCounters {
    /// `process` invocations.
    pub actions_processed: AtomicU64,
    /// Definitions that paid a non-zero reward.
    pub rewards_granted: AtomicU64,
    /// Definitions whose condition tree denied.
    pub condition_denials: AtomicU64,
    /// Definitions blocked by the rate-limit governor.
    pub rate_limited: AtomicU64,
    /// Definitions skipped because the actor is at max level.
    pub max_level_skips: AtomicU64,
    /// Level transitions.
    pub level_ups: AtomicU64,
    /// Conditions that failed to evaluate.
    pub evaluation_errors: AtomicU64,
    /// Actions against unknown or disabled categories.
    pub inactive_category_hits: AtomicU64,
    /// Multiplier grants removed by the sweeper.
    pub grants_expired: AtomicU64,
    /// Bulk rate-limit resets.
    pub bulk_resets: AtomicU64,
    /// Snapshots persisted.
    pub saves_completed: AtomicU64,
}

impl EngineCounters {
    /// Create a new set of zeroed counters.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            actions_processed: AtomicU64::new(0),
            rewards_granted: AtomicU64::new(0),
            condition_denials: AtomicU64::new(0),
            rate_limited: AtomicU64::new(0),
            max_level_skips: AtomicU64::new(0),
            level_ups: AtomicU64::new(0),
            evaluation_errors: AtomicU64::new(0),
            inactive_category_hits: AtomicU64::new(0),
            grants_expired: AtomicU64::new(0),
            bulk_resets: AtomicU64::new(0),
            saves_completed: AtomicU64::new(0),
        }
    }

    /// Count one condition evaluation failure.
    pub fn record_evaluation_error(&self) {
        self.evaluation_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    /// Snapshot all counters for export.
    #[must_use]
    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            actions_processed: self.actions_processed.load(Ordering::Relaxed),
            rewards_granted: self.rewards_granted.load(Ordering::Relaxed),
            condition_denials: self.condition_denials.load(Ordering::Relaxed),
            rate_limited: self.rate_limited.load(Ordering::Relaxed),
            max_level_skips: self.max_level_skips.load(Ordering::Relaxed),
            level_ups: self.level_ups.load(Ordering::Relaxed),
            evaluation_errors: self.evaluation_errors.load(Ordering::Relaxed),
            inactive_category_hits: self.inactive_category_hits.load(Ordering::Relaxed),
            grants_expired: self.grants_expired.load(Ordering::Relaxed),
            bulk_resets: self.bulk_resets.load(Ordering::Relaxed),
            saves_completed: self.saves_completed.load(Ordering::Relaxed),
        }
    }
}

impl Default for EngineCounters {
    fn default() -> Self {
        Self::new()
    }
}

/// A snapshot of counter values at a point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
    /// `process` invocations.
    pub actions_processed: u64,
    /// Non-zero payouts.
    pub rewards_granted: u64,
    /// Condition denials.
    pub condition_denials: u64,
    /// Rate-limited definitions.
    pub rate_limited: u64,
    /// Max-level skips.
    pub max_level_skips: u64,
    /// Level transitions.
    pub level_ups: u64,
    /// Condition evaluation failures.
    pub evaluation_errors: u64,
    /// Actions against unknown or disabled categories.
    pub inactive_category_hits: u64,
    /// Grants removed by the sweeper.
    pub grants_expired: u64,
    /// Bulk rate-limit resets.
    pub bulk_resets: u64,
    /// Snapshots persisted.
    pub saves_completed: u64,
}

impl CounterSnapshot {
    /// Format as Prometheus-compatible text.
    #[must_use]
    pub fn to_prometheus(&self) -> String {
        let rows: [(&str, &str, u64); 11] = [
            ("actions_processed", "Actions passed to the resolver", self.actions_processed),
            ("rewards_granted", "Reward lines that paid out", self.rewards_granted),
            ("condition_denials", "Reward lines denied by conditions", self.condition_denials),
            ("rate_limited", "Reward lines blocked by rate limits", self.rate_limited),
            ("max_level_skips", "Reward lines skipped at max level", self.max_level_skips),
            ("level_ups", "Level transitions", self.level_ups),
            ("evaluation_errors", "Condition evaluation failures", self.evaluation_errors),
            ("inactive_category_hits", "Actions against inactive categories", self.inactive_category_hits),
            ("grants_expired", "Multiplier grants swept", self.grants_expired),
            ("bulk_resets", "Scheduled rate-limit resets", self.bulk_resets),
            ("saves_completed", "Snapshots persisted", self.saves_completed),
        ];
        let mut out = String::new();
        for (name, help, value) in rows {
            out.push_str(&format!(
                "# HELP jobz_{name}_total {help}\n# TYPE jobz_{name}_total counter\njobz_{name}_total {value}\n"
            ));
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Latency Monitor
// ---------------------------------------------------------------------------

/// Buckets per doubling of latency.
const STEPS_PER_OCTAVE: f64 = 4.0;
/// Bucket `i` holds samples up to `2^(i / 4)` microseconds; the last one
/// also takes everything slower (about 40 minutes and up).
const BUCKETS: usize = 128;

/// Tracks how long `process` calls take against a soft budget.
///
/// Samples are binned into log-scale buckets about 19% wide, so reported
/// percentiles are the upper edge of the bucket they fall in (never above
/// the true maximum). Statistics cover every sample since creation.
///
/// Usage:
/// ```rust,no_run
/// # use jobz_core::metrics::LatencyMonitor;
/// let monitor = LatencyMonitor::new(0.5); // 0.5ms budget
/// let guard = monitor.begin();
/// // ... resolve an action ...
/// drop(guard);
/// ```
pub struct LatencyMonitor {
    budget_ms: f64,
    buckets: [AtomicU64; BUCKETS],
    count: AtomicU64,
    over_budget: AtomicU64,
    max_ns: AtomicU64,
}

impl LatencyMonitor {
    /// Create a new monitor with the given budget (milliseconds).
    #[must_use]
    pub fn new(budget_ms: f64) -> Self {
        Self {
            budget_ms,
            buckets: [const { AtomicU64::new(0) }; BUCKETS],
            count: AtomicU64::new(0),
            over_budget: AtomicU64::new(0),
            max_ns: AtomicU64::new(0),
        }
    }

    /// Begin timing. The guard records elapsed time on drop.
    pub fn begin(&self) -> LatencyGuard<'_> {
        LatencyGuard {
            monitor: self,
            start: Instant::now(),
        }
    }

    /// Record a timing manually (milliseconds). Negative or NaN timings
    /// count as zero.
    pub fn record(&self, ms: f64) {
        let ms = if ms > 0.0 { ms } else { 0.0 };
        self.buckets[bucket_for(ms)].fetch_add(1, Ordering::Relaxed);
        if ms > self.budget_ms {
            self.over_budget.fetch_add(1, Ordering::Relaxed);
        }
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
        let ns = (ms * 1e6).min(u64::MAX as f64) as u64;
        self.max_ns.fetch_max(ns, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    /// P50, P99 and max over every recorded sample.
    ///
    /// Reads race with concurrent writers, so a snapshot taken under load
    /// may be off by the samples recorded while it was taken.
    #[must_use]
    pub fn percentiles(&self) -> LatencyPercentiles {
        let counts: Vec<u64> = self.buckets.iter().map(|b| b.load(Ordering::Relaxed)).collect();
        let n: u64 = counts.iter().sum();
        if n == 0 {
            return LatencyPercentiles::default();
        }
        #[allow(clippy::cast_precision_loss)]
        let max = self.max_ns.load(Ordering::Relaxed) as f64 / 1e6;
        let at = |q: f64| {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
            let rank = ((q * n as f64).ceil() as u64).clamp(1, n);
            let mut seen = 0;
            for (i, c) in counts.iter().enumerate() {
                seen += c;
                if seen >= rank {
                    return bucket_upper_ms(i).min(max);
                }
            }
            max
        };
        #[allow(clippy::cast_precision_loss)]
        let over_budget_ratio = (self.over_budget.load(Ordering::Relaxed) as f64 / n as f64).min(1.0);
        LatencyPercentiles {
            p50: at(0.5),
            p99: at(0.99),
            max,
            over_budget_ratio,
        }
    }

    /// Total number of samples recorded.
    #[must_use]
    pub fn sample_count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }
}

fn bucket_for(ms: f64) -> usize {
    let us = ms * 1000.0;
    if us <= 1.0 {
        return 0;
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let idx = (us.log2() * STEPS_PER_OCTAVE).ceil() as usize;
    idx.min(BUCKETS - 1)
}

fn bucket_upper_ms(idx: usize) -> f64 {
    #[allow(clippy::cast_precision_loss)]
    let exp = idx as f64 / STEPS_PER_OCTAVE;
    exp.exp2() / 1000.0
}

/// RAII guard that records elapsed time when dropped.
pub struct LatencyGuard<'a> {
    monitor: &'a LatencyMonitor,
    start: Instant,
}

impl Drop for LatencyGuard<'_> {
    fn drop(&mut self) {
        self.monitor.record(self.start.elapsed().as_secs_f64() * 1000.0);
    }
}

/// Percentile statistics for recorded latencies.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LatencyPercentiles {
    /// Median in milliseconds.
    pub p50: f64,
    /// 99th percentile in milliseconds.
    pub p99: f64,
    /// Maximum observed.
    pub max: f64,
    /// Share of samples over budget (0.0-1.0).
    pub over_budget_ratio: f64,
}

// ---------------------------------------------------------------------------
// Tracing Span Names
// ---------------------------------------------------------------------------

/// Span names used with `tracing::span!`.
pub mod spans {
    /// One `process` call.
    pub const PROCESS: &str = "jobz::process";
    /// Condition tree evaluation.
    pub const CONDITIONS: &str = "jobz::conditions";
    /// Configuration load.
    pub const CONFIG_LOAD: &str = "jobz::config::load";
    /// Multiplier sweep.
    pub const MULTIPLIER_SWEEP: &str = "jobz::multiplier::sweep";
    /// Bulk rate-limit reset.
    pub const RATE_LIMIT_RESET: &str = "jobz::governor::reset";
    /// Persistence save.
    pub const PERSIST_SAVE: &str = "jobz::persist::save";
    /// Persistence load.
    pub const PERSIST_LOAD: &str = "jobz::persist::load";
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_snapshot_and_export() {
        let counters = EngineCounters::new();
        EngineCounters::bump(&counters.actions_processed);
        EngineCounters::add(&counters.rate_limited, 3);
        counters.record_evaluation_error();

        let snap = counters.snapshot();
        assert_eq!(snap.actions_processed, 1);
        assert_eq!(snap.rate_limited, 3);
        assert_eq!(snap.evaluation_errors, 1);

        let text = snap.to_prometheus();
        assert!(text.contains("jobz_rate_limited_total 3"));
        assert!(text.contains("# TYPE jobz_level_ups_total counter"));
    }

    #[test]
    fn latency_percentiles() {
        let monitor = LatencyMonitor::new(1.0);
        assert_eq!(monitor.percentiles(), LatencyPercentiles::default());
        for ms in [0.1, 0.2, 0.3, 2.0] {
            monitor.record(ms);
        }
        let p = monitor.percentiles();
        assert_eq!(monitor.sample_count(), 4);
        assert!((p.max - 2.0).abs() < 1e-9);
        assert!((p.over_budget_ratio - 0.25).abs() < f64::EPSILON);
        // Second-smallest sample, reported at its bucket's upper edge.
        assert!(p.p50 >= 0.2 && p.p50 < 0.2 * 1.2, "{p:?}");
        assert!((p.p99 - 2.0).abs() < 1e-9);
    }

    #[test]
    fn odd_timings_stay_in_range() {
        let monitor = LatencyMonitor::new(1.0);
        monitor.record(f64::NAN);
        monitor.record(-3.0);
        monitor.record(f64::INFINITY);
        let p = monitor.percentiles();
        assert_eq!(monitor.sample_count(), 3);
        // Both clamped samples sit in the lowest bucket (up to 1us).
        assert!(p.p50 <= 0.001 + 1e-12, "{p:?}");
        assert!(p.p99.is_finite());
        assert!((p.over_budget_ratio - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn concurrent_recording_loses_nothing() {
        let monitor = LatencyMonitor::new(1.0);
        std::thread::scope(|scope| {
            for t in 0..8 {
                let monitor = &monitor;
                scope.spawn(move || {
                    for i in 0..1000 {
                        monitor.record(if (i + t) % 10 == 0 { 5.0 } else { 0.05 });
                    }
                });
            }
        });
        assert_eq!(monitor.sample_count(), 8000);
        let p = monitor.percentiles();
        assert!((p.over_budget_ratio - 0.1).abs() < 1e-9);
        assert!((p.max - 5.0).abs() < 1e-9);
        assert!(p.p50 < 0.06, "{p:?}");
    }

    #[test]
    fn guard_records_on_drop() {
        let monitor = LatencyMonitor::new(10.0);
        drop(monitor.begin());
        assert_eq!(monitor.sample_count(), 1);
    }
}
