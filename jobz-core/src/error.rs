//! Error types for the JOBZ core library.
//!
//! Nothing in here ever reaches an actor. Configuration problems disable the
//! smallest affected unit, evaluation problems degrade to "rule not met".

use thiserror::Error;

/// Where a broken level curve came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CurveSource {
    /// A `table = [...]` of required points per level.
    Table,
    /// A `formula = "..."` expression.
    Formula(String),
}

impl std::fmt::Display for CurveSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Table => write!(f, "curve table"),
            Self::Formula(expr) => write!(f, "equation `{expr}`"),
        }
    }
}

/// Top-level error type for all JOBZ operations.
#[derive(Error, Debug)]
pub enum JobzError {
    /// Configuration error (unreadable document, contradictory section).
    #[error("Configuration error: {0}")]
    Config(String),

    /// A target pattern could not be parsed.
    #[error("Malformed target pattern `{pattern}`: {reason}")]
    Pattern {
        /// The offending pattern as written.
        pattern: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A condition rule named a type tag nobody registered.
    #[error("Unknown condition type `{0}`")]
    UnknownCondition(String),

    /// A condition rule had a known tag but unusable parameters.
    #[error("Invalid `{kind}` condition: {reason}")]
    InvalidRule {
        /// The rule's type tag.
        kind: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A curve formula failed to parse or evaluate.
    #[error("Formula error in `{expression}`: {reason}")]
    Formula {
        /// The expression as written.
        expression: String,
        /// Parser or evaluator diagnostic.
        reason: String,
    },

    /// A level curve produced NaN, infinite, negative or decreasing values.
    #[error("Category `{category}` disabled: {origin} failed validation ({detail})")]
    CurveValidation {
        /// The category the curve was attached to.
        category: String,
        /// Whether the table or the equation was at fault.
        origin: CurveSource,
        /// What went wrong, including the sampled level.
        detail: String,
    },

    /// A multiplier grant was rejected (non-positive factor or duration).
    #[error("Invalid multiplier grant: {0}")]
    InvalidGrant(String),

    /// Serialization or deserialization failure.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure raised by a condition while it is being evaluated.
///
/// The engine never propagates this; the rule simply counts as not met.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EvalError {
    /// A third-party lookup (placeholder service, custom block registry) failed.
    #[error("lookup failed: {0}")]
    Lookup(String),

    /// The actor or context does not expose the data the rule needs.
    #[error("unavailable: {0}")]
    Unavailable(String),
}

/// Convenience Result type alias.
pub type Result<T> = std::result::Result<T, JobzError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn curve_diagnostic_names_the_source() {
        let table = JobzError::CurveValidation {
            category: "mining".into(),
            origin: CurveSource::Table,
            detail: "level 10 is NaN".into(),
        };
        assert!(table.to_string().contains("curve table"));

        let formula = JobzError::CurveValidation {
            category: "mining".into(),
            origin: CurveSource::Formula("level / 0".into()),
            detail: "level 1 is infinite".into(),
        };
        let text = formula.to_string();
        assert!(text.contains("equation `level / 0`"));
        assert!(text.contains("mining"));
    }
}
