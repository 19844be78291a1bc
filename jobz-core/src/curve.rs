//! Level progression curves.
//!
//! A curve maps a level to the total points required to reach it. The
//! inverse, [`LevelCurve::level_for_points`], is a binary search over that
//! mapping, so the two can never disagree.
//!
//! Curves must be validated before a category may use them: any NaN,
//! infinite, negative or decreasing value disables the category.

use crate::error::{CurveSource, JobzError, Result};
use crate::formula::Formula;

/// Levels every curve is sampled at during validation, on top of the
/// contiguous monotonicity sweep.
pub const VALIDATION_SAMPLES: [u32; 3] = [1, 10, 50];

/// Upper bound of the contiguous monotonicity sweep.
const MONOTONIC_SWEEP_LIMIT: u32 = 1_000;

/// Total-points-per-level mapping.
#[derive(Debug, Clone, PartialEq)]
pub enum LevelCurve {
    /// `table[i]` is the total required to reach level `i + 1`.
    /// Levels past the end extrapolate linearly from the last step.
    Table(Vec<f64>),
    /// `points = f(level)`.
    Formula(Formula),
}

impl LevelCurve {
    /// Build a curve from an equation string.
    ///
    /// # Errors
    /// Returns [`JobzError::Formula`] if the equation does not parse.
    pub fn formula(expr: &str) -> Result<Self> {
        Formula::parse(expr).map(Self::Formula)
    }

    /// Which source a diagnostic should blame.
    #[must_use]
    pub fn origin(&self) -> CurveSource {
        match self {
            Self::Table(_) => CurveSource::Table,
            Self::Formula(f) => CurveSource::Formula(f.source().to_string()),
        }
    }

    /// Total points required to reach `level`. Levels below 1 read as level 1.
    #[must_use]
    pub fn points_for_level(&self, level: u32) -> f64 {
        let level = level.max(1);
        match self {
            Self::Table(table) => table_points(table, level),
            Self::Formula(f) => f.eval(f64::from(level)),
        }
    }

    /// The largest level `L` in `[1, max_level]` with `points_for_level(L) <= points`.
    ///
    /// Clamped to 1 when even level 1 is out of reach.
    #[must_use]
    pub fn level_for_points(&self, points: f64, max_level: u32) -> u32 {
        let max_level = max_level.max(1);
        if points.is_nan() {
            return 1;
        }
        // Invariant: points_for_level(lo) <= points (or lo == 1), hi is unreachable.
        let (mut lo, mut hi) = (1_u32, max_level.saturating_add(1));
        while hi - lo > 1 {
            let mid = lo + (hi - lo) / 2;
            if self.points_for_level(mid) <= points {
                lo = mid;
            } else {
                hi = mid;
            }
        }
        lo
    }

    /// Check the curve is usable for a category with the given max level.
    ///
    /// Every level from 2 up to `max_level` (capped) must cost strictly more
    /// than the one before, so `level_for_points` inverts `points_for_level`.
    ///
    /// # Errors
    /// Returns [`JobzError::CurveValidation`] naming the category, whether the
    /// table or the equation was at fault, and the first bad level.
    pub fn validate(&self, category: &str, max_level: u32) -> Result<()> {
        let fail = |detail: String| JobzError::CurveValidation {
            category: category.to_string(),
            origin: self.origin(),
            detail,
        };

        if let Self::Table(table) = self {
            if table.is_empty() {
                return Err(fail("table is empty".to_string()));
            }
        }

        let check = |level: u32| -> Result<f64> {
            let v = self.points_for_level(level);
            if v.is_nan() {
                Err(fail(format!("level {level} evaluates to NaN")))
            } else if v.is_infinite() {
                Err(fail(format!("level {level} evaluates to an infinite value")))
            } else if v < 0.0 {
                Err(fail(format!("level {level} evaluates to a negative value ({v})")))
            } else {
                Ok(v)
            }
        };

        for level in VALIDATION_SAMPLES {
            check(level)?;
        }

        let sweep = max_level.clamp(1, MONOTONIC_SWEEP_LIMIT);
        let mut previous = check(1)?;
        for level in 2..=sweep {
            let current = check(level)?;
            if current <= previous {
                return Err(fail(format!(
                    "level {level} requires no more points ({current}) than level {} ({previous})",
                    level - 1
                )));
            }
            previous = current;
        }
        Ok(())
    }
}

fn table_points(table: &[f64], level: u32) -> f64 {
    let idx = (level - 1) as usize;
    if let Some(v) = table.get(idx) {
        return *v;
    }
    match table {
        [] => f64::NAN,
        [only] => *only,
        [.., prev, last] => {
            let step = last - prev;
            let beyond = (idx - (table.len() - 1)) as f64;
            last + step * beyond
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quadratic() -> LevelCurve {
        LevelCurve::formula("100 * (level - 1) ^ 2").expect("parses")
    }

    #[test]
    fn level_for_points_inverts_points_for_level() {
        let curve = quadratic();
        for level in 1..=60 {
            let pts = curve.points_for_level(level);
            assert_eq!(curve.level_for_points(pts, 100), level);
            if level > 1 {
                assert_eq!(curve.level_for_points(pts - 0.5, 100), level - 1);
            }
        }
    }

    #[test]
    fn level_is_clamped() {
        let curve = quadratic();
        assert_eq!(curve.level_for_points(-5.0, 50), 1);
        assert_eq!(curve.level_for_points(f64::MAX, 50), 50);
        assert_eq!(curve.level_for_points(f64::NAN, 50), 1);

        // Level 1 itself costs points here.
        let steep = LevelCurve::formula("50 * level").expect("parses");
        assert_eq!(steep.level_for_points(10.0, 20), 1);
    }

    #[test]
    fn table_lookup_and_extrapolation() {
        let curve = LevelCurve::Table(vec![0.0, 100.0, 250.0]);
        assert!((curve.points_for_level(1)).abs() < f64::EPSILON);
        assert!((curve.points_for_level(3) - 250.0).abs() < f64::EPSILON);
        assert!((curve.points_for_level(5) - 550.0).abs() < f64::EPSILON);
        assert_eq!(curve.level_for_points(260.0, 10), 3);
        assert_eq!(curve.level_for_points(400.0, 10), 4);
        assert!(curve.validate("mining", 50).is_ok());
    }

    #[test]
    fn validation_rejects_bad_equations() {
        let nan = LevelCurve::formula("sqrt(0 - level)").expect("parses");
        let err = nan.validate("mining", 50).expect_err("NaN curve");
        assert!(matches!(
            err,
            JobzError::CurveValidation { origin: CurveSource::Formula(_), .. }
        ));

        let inf = LevelCurve::formula("1 / (level - 10)").expect("parses");
        assert!(inf.validate("mining", 50).is_err());

        let negative = LevelCurve::formula("level - 5").expect("parses");
        assert!(negative.validate("mining", 50).is_err());

        let decreasing = LevelCurve::formula("1000 - level").expect("parses");
        assert!(decreasing.validate("mining", 50).is_err());
    }

    #[test]
    fn validation_rejects_bad_tables() {
        let err = LevelCurve::Table(vec![]).validate("farming", 10).expect_err("empty");
        assert!(matches!(
            err,
            JobzError::CurveValidation { origin: CurveSource::Table, .. }
        ));
        assert!(LevelCurve::Table(vec![0.0, 50.0, 20.0]).validate("farming", 10).is_err());
        assert!(LevelCurve::Table(vec![0.0, f64::NAN]).validate("farming", 10).is_err());
    }

    #[test]
    fn plateaus_are_rejected() {
        let mut table = vec![0.0, 100.0];
        table.extend(std::iter::repeat_n(100.0, 8));
        table.push(200.0);
        let err = LevelCurve::Table(table).validate("mining", 100).expect_err("plateau");
        assert!(matches!(
            err,
            JobzError::CurveValidation { origin: CurveSource::Table, .. }
        ));

        // A flat last step would extrapolate every later level to the same total.
        assert!(LevelCurve::Table(vec![0.0, 100.0, 100.0]).validate("mining", 2).is_ok());
        assert!(LevelCurve::Table(vec![0.0, 100.0, 100.0]).validate("mining", 3).is_err());
        assert!(LevelCurve::Table(vec![0.0, 100.0, 200.0]).validate("mining", 50).is_ok());

        let stepped = LevelCurve::formula("100 * floor(level / 2)").expect("parses");
        assert!(stepped.validate("mining", 10).is_err());
    }

    #[test]
    fn samples_beyond_max_level_are_still_checked() {
        // Fine up to level 5, broken at 50.
        let curve = LevelCurve::formula("1 / (50 - level) + level").expect("parses");
        assert!(curve.validate("fishing", 5).is_err());
    }
}
