//! Background sweepers owned by the engine's lifecycle.
//!
//! Three optional tokio tasks, started together by [`Sweepers::start`] and
//! stopped together by [`Sweepers::shutdown`] or by dropping the handle:
//!
//! - **daily reset**: returns every rate-limit counter to idle at
//!   `limits.daily_reset_time` (UTC)
//! - **multiplier sweep**: removes expired grants every
//!   `multipliers.sweep_interval_secs`
//! - **autosave**: writes a snapshot to a [`ProgressStore`] every
//!   `persistence.autosave_interval_secs`, on the blocking pool, plus once
//!   more at shutdown
//!
//! The sweeps only touch the engine through its `&self` API, which uses
//! per-key locking, so they never race a concurrent `process` call.

use std::sync::Arc;

use chrono::{DateTime, NaiveTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::metrics::{COUNTERS, EngineCounters};
use crate::persistence::ProgressStore;
use crate::resolver::RewardEngine;

/// Time from `now` until the next occurrence of `at` (UTC), never zero.
#[must_use]
pub fn until_next(at: NaiveTime, now: DateTime<Utc>) -> chrono::Duration {
    let today = now.date_naive().and_time(at).and_utc();
    if today > now {
        today - now
    } else {
        today + chrono::Duration::days(1) - now
    }
}

/// Handles of the running sweeper tasks.
#[derive(Debug)]
pub struct Sweepers {
    shutdown: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl Sweepers {
    /// Spawn the sweepers enabled in the engine's configuration.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn start(engine: Arc<RewardEngine>, store: Option<Arc<dyn ProgressStore>>) -> Self {
        let config = engine.config();
        let (shutdown, _) = watch::channel(false);
        let mut handles = Vec::new();

        if config.limits.bulk_reset_enabled {
            match config.limits.reset_time() {
                Ok(at) => handles.push(tokio::spawn(daily_reset(
                    Arc::clone(&engine),
                    at,
                    shutdown.subscribe(),
                ))),
                Err(err) => warn!(error = %err, "Daily rate-limit reset not scheduled"),
            }
        }

        if config.multipliers.sweep_interval_secs > 0 {
            let period = std::time::Duration::from_secs(config.multipliers.sweep_interval_secs);
            handles.push(tokio::spawn(multiplier_sweep(
                Arc::clone(&engine),
                period,
                shutdown.subscribe(),
            )));
        }

        match store {
            Some(store) if config.persistence.autosave_interval_secs > 0 => {
                let period = std::time::Duration::from_secs(config.persistence.autosave_interval_secs);
                handles.push(tokio::spawn(autosave(
                    Arc::clone(&engine),
                    store,
                    period,
                    shutdown.subscribe(),
                )));
            }
            Some(_) => debug!("Autosave interval is 0; autosave disabled"),
            None => {}
        }

        info!(tasks = handles.len(), "Sweepers started");
        Self { shutdown, handles }
    }

    /// Number of running tasks.
    #[must_use]
    pub fn task_count(&self) -> usize {
        self.handles.len()
    }

    /// Signal every task to stop and wait for them.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown.send(true);
        for handle in std::mem::take(&mut self.handles) {
            if let Err(err) = handle.await {
                error!(error = %err, "Sweeper task failed");
            }
        }
        info!("Sweepers stopped");
    }
}

impl Drop for Sweepers {
    /// Signals the same stop as [`Sweepers::shutdown`] without waiting. The
    /// tasks wind down on their own, the final autosave included.
    fn drop(&mut self) {
        if !self.handles.is_empty() {
            let _ = self.shutdown.send(true);
            warn!(tasks = self.handles.len(), "Sweepers dropped without shutdown; stopping in background");
        }
    }
}

async fn daily_reset(engine: Arc<RewardEngine>, at: NaiveTime, mut shutdown: watch::Receiver<bool>) {
    loop {
        let wait = until_next(at, engine.clock().now())
            .to_std()
            .unwrap_or(std::time::Duration::from_secs(1));
        debug!(in_secs = wait.as_secs(), "Next daily rate-limit reset scheduled");
        tokio::select! {
            () = tokio::time::sleep(wait) => {
                engine.bulk_reset();
            }
            _ = shutdown.changed() => break,
        }
    }
}

async fn multiplier_sweep(engine: Arc<RewardEngine>, period: std::time::Duration, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                engine.sweep_multipliers();
            }
            _ = shutdown.changed() => break,
        }
    }
}

async fn autosave(
    engine: Arc<RewardEngine>,
    store: Arc<dyn ProgressStore>,
    period: std::time::Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = ticker.tick() => save_snapshot(&engine, &store).await,
            _ = shutdown.changed() => {
                save_snapshot(&engine, &store).await;
                break;
            }
        }
    }
}

async fn save_snapshot(engine: &RewardEngine, store: &Arc<dyn ProgressStore>) {
    let snapshot = engine.snapshot();
    let store = Arc::clone(store);
    match tokio::task::spawn_blocking(move || store.save(&snapshot)).await {
        Ok(Ok(())) => EngineCounters::bump(&COUNTERS.saves_completed),
        Ok(Err(err)) => error!(error = %err, "Autosave failed"),
        Err(err) => error!(error = %err, "Autosave task panicked"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn next_reset_today_or_tomorrow() {
        let at = NaiveTime::from_hms_opt(4, 0, 0).expect("time");
        let before = Utc.with_ymd_and_hms(2026, 3, 1, 3, 30, 0).single().expect("date");
        assert_eq!(until_next(at, before), chrono::Duration::minutes(30));

        let after = Utc.with_ymd_and_hms(2026, 3, 1, 4, 0, 0).single().expect("date");
        assert_eq!(until_next(at, after), chrono::Duration::hours(24));
    }
}
