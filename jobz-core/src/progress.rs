//! Per-(actor, category) accumulated points and the cached level.
//!
//! The level is always recomputed from points through the category's
//! [`LevelCurve`] under the entry lock, so it can never drift from points.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::curve::LevelCurve;
use crate::types::ActorId;

/// Progress of one actor in one category.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ActorProgress {
    /// Accumulated points.
    pub points: f64,
    /// Cached level, a pure function of `points`.
    pub level: u32,
}

impl Default for ActorProgress {
    fn default() -> Self {
        Self { points: 0.0, level: 1 }
    }
}

impl ActorProgress {
    /// Zero points at whatever level the curve grants for nothing.
    #[must_use]
    pub fn starting(curve: &LevelCurve, max_level: u32) -> Self {
        Self {
            points: 0.0,
            level: curve.level_for_points(0.0, max_level),
        }
    }
}

/// Result of [`ProgressBook::add_points`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelChange {
    /// Level before the update.
    pub old_level: u32,
    /// Level after the update.
    pub new_level: u32,
    /// Points after the update.
    pub points: f64,
}

impl LevelChange {
    /// Whether the update crossed at least one threshold.
    #[must_use]
    pub fn leveled_up(&self) -> bool {
        self.new_level > self.old_level
    }
}

/// Concurrent progress store.
#[derive(Debug, Default)]
pub struct ProgressBook {
    entries: DashMap<(ActorId, String), ActorProgress>,
}

impl ProgressBook {
    /// An empty book.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current progress, or the starting state if never touched.
    #[must_use]
    pub fn get(&self, actor: ActorId, category: &str) -> ActorProgress {
        self.entries
            .get(&(actor, category.to_string()))
            .map(|p| *p)
            .unwrap_or_default()
    }

    /// Current level.
    #[must_use]
    pub fn level(&self, actor: ActorId, category: &str) -> u32 {
        self.get(actor, category).level
    }

    /// Current progress, or the curve's starting state if never touched.
    #[must_use]
    pub fn get_on(&self, actor: ActorId, category: &str, curve: &LevelCurve, max_level: u32) -> ActorProgress {
        self.entries
            .get(&(actor, category.to_string()))
            .map_or_else(|| ActorProgress::starting(curve, max_level), |p| *p)
    }

    /// Add points and recompute the level atomically. Non-finite points
    /// leave the entry untouched.
    pub fn add_points(
        &self,
        actor: ActorId,
        category: &str,
        points: f64,
        curve: &LevelCurve,
        max_level: u32,
    ) -> LevelChange {
        let mut entry = self
            .entries
            .entry((actor, category.to_string()))
            .or_insert_with(|| ActorProgress::starting(curve, max_level));
        let old_level = entry.level;
        if points.is_finite() {
            entry.points = (entry.points + points).max(0.0);
        }
        entry.level = curve.level_for_points(entry.points, max_level);
        LevelChange {
            old_level,
            new_level: entry.level,
            points: entry.points,
        }
    }

    /// Overwrite an actor's points, recomputing the level.
    pub fn set_points(&self, actor: ActorId, category: &str, points: f64, curve: &LevelCurve, max_level: u32) {
        let points = points.max(0.0);
        self.entries.insert(
            (actor, category.to_string()),
            ActorProgress {
                points,
                level: curve.level_for_points(points, max_level),
            },
        );
    }

    /// Forget every category of one actor.
    pub fn forget(&self, actor: ActorId) -> usize {
        let before = self.entries.len();
        self.entries.retain(|(id, _), _| *id != actor);
        before - self.entries.len()
    }

    /// Drop everything.
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Number of tracked (actor, category) pairs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Copy of every entry, for persistence.
    #[must_use]
    pub fn snapshot(&self) -> Vec<ProgressRecord> {
        self.entries
            .iter()
            .map(|e| ProgressRecord {
                actor: e.key().0,
                category: e.key().1.clone(),
                progress: *e.value(),
            })
            .collect()
    }

    /// Replace all entries.
    pub fn restore(&self, records: impl IntoIterator<Item = ProgressRecord>) {
        self.entries.clear();
        for r in records {
            self.entries.insert((r.actor, r.category), r.progress);
        }
    }
}

/// One serialised progress entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressRecord {
    /// Actor.
    pub actor: ActorId,
    /// Category key.
    pub category: String,
    /// Progress.
    pub progress: ActorProgress,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_follows_points() {
        let book = ProgressBook::new();
        let curve = LevelCurve::Table(vec![0.0, 100.0, 250.0]);
        let a = ActorId::new();

        assert_eq!(book.level(a, "mining"), 1);
        let change = book.add_points(a, "mining", 99.0, &curve, 50);
        assert!(!change.leveled_up());
        let change = book.add_points(a, "mining", 1.0, &curve, 50);
        assert!(change.leveled_up());
        assert_eq!((change.old_level, change.new_level), (1, 2));
        let change = book.add_points(a, "mining", 1000.0, &curve, 3);
        assert_eq!(change.new_level, 3);
        assert_eq!(book.level(a, "farming"), 1);
    }

    #[test]
    fn untouched_entries_start_where_the_curve_says() {
        let book = ProgressBook::new();
        let curve = LevelCurve::formula("10 * level - 20").expect("formula");
        let a = ActorId::new();

        assert_eq!(book.get_on(a, "mining", &curve, 50), ActorProgress { points: 0.0, level: 2 });
        let change = book.add_points(a, "mining", 5.0, &curve, 50);
        assert_eq!((change.old_level, change.new_level), (2, 2));
        assert!(!change.leveled_up());
        let change = book.add_points(a, "mining", 5.0, &curve, 50);
        assert_eq!((change.old_level, change.new_level), (2, 3));
    }

    #[test]
    fn non_finite_points_are_ignored() {
        let book = ProgressBook::new();
        let curve = LevelCurve::Table(vec![0.0, 100.0, 250.0]);
        let a = ActorId::new();
        book.add_points(a, "mining", 120.0, &curve, 50);

        for bad in [f64::INFINITY, f64::NEG_INFINITY, f64::NAN] {
            let change = book.add_points(a, "mining", bad, &curve, 50);
            assert!((change.points - 120.0).abs() < f64::EPSILON);
            assert_eq!(change.new_level, 2);
        }
    }

    #[test]
    fn snapshot_restore_and_forget() {
        let book = ProgressBook::new();
        let curve = LevelCurve::Table(vec![0.0, 10.0]);
        let a = ActorId::new();
        let b = ActorId::new();
        book.set_points(a, "mining", 15.0, &curve, 10);
        book.set_points(a, "farming", 1.0, &curve, 10);
        book.set_points(b, "mining", 3.0, &curve, 10);

        let other = ProgressBook::new();
        other.restore(book.snapshot());
        assert_eq!(other.get(a, "mining"), ActorProgress { points: 15.0, level: 2 });
        assert_eq!(other.forget(a), 2);
        assert_eq!(other.len(), 1);
    }
}
