//! Target pattern matching for action definitions.
//!
//! Supported forms, all case-insensitive:
//!
//! | Pattern      | Matches                                              |
//! |--------------|------------------------------------------------------|
//! | `*`          | everything                                           |
//! | `STONE`      | exactly `stone`                                      |
//! | `STONE_*`    | `stone_bricks`, `stone_slab`, and the bare stem `stone` |
//! | `*_ORE`      | `iron_ore`, `gold_ore`, and the bare stem `ore`      |
//! | `*WOOL*`     | anything containing `wool`                           |
//! | `ns:id`      | only the context's namespaced id, never the target   |
//!
//! Namespaced patterns accept the same wildcard forms after the namespace
//! (`itemsadder:*`, `mythic:*_ore`).

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{JobzError, Result};
use crate::types::ActionContext;

/// Characters that may separate a stem from its variant suffix.
const SEPARATORS: [char; 4] = ['_', '-', '.', ':'];

/// The wildcard shape of a pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Glob {
    Any,
    Exact(String),
    Prefix(String),
    Suffix(String),
    Contains(String),
}

impl Glob {
    fn parse(raw: &str, original: &str) -> Result<Self> {
        let lower = raw.to_ascii_lowercase();
        if lower == "*" {
            return Ok(Self::Any);
        }
        let leading = lower.starts_with('*');
        let trailing = lower.ends_with('*');
        let core = lower.trim_start_matches('*').trim_end_matches('*');
        if core.is_empty() {
            return Ok(Self::Any);
        }
        if core.contains('*') {
            return Err(JobzError::Pattern {
                pattern: original.to_string(),
                reason: "wildcards are only allowed at the start or end".to_string(),
            });
        }
        let core = core.to_string();
        Ok(match (leading, trailing) {
            (false, false) => Self::Exact(core),
            (false, true) => Self::Prefix(core),
            (true, false) => Self::Suffix(core),
            (true, true) => Self::Contains(core),
        })
    }

    fn matches(&self, candidate: &str) -> bool {
        let candidate = candidate.as_bytes();
        match self {
            Self::Any => true,
            Self::Exact(p) => candidate.eq_ignore_ascii_case(p.as_bytes()),
            Self::Prefix(p) => {
                starts_with_ci(candidate, p.as_bytes())
                    || stem(p, |s| s.strip_suffix(SEPARATORS))
                        .is_some_and(|s| candidate.eq_ignore_ascii_case(s.as_bytes()))
            }
            Self::Suffix(p) => {
                ends_with_ci(candidate, p.as_bytes())
                    || stem(p, |s| s.strip_prefix(SEPARATORS))
                        .is_some_and(|s| candidate.eq_ignore_ascii_case(s.as_bytes()))
            }
            Self::Contains(p) => {
                let needle = p.as_bytes();
                candidate.len() >= needle.len()
                    && candidate
                        .windows(needle.len())
                        .any(|w| w.eq_ignore_ascii_case(needle))
            }
        }
    }
}

fn stem<'a>(pattern: &'a str, strip: impl Fn(&'a str) -> Option<&'a str>) -> Option<&'a str> {
    strip(pattern).filter(|s| !s.is_empty())
}

fn starts_with_ci(haystack: &[u8], prefix: &[u8]) -> bool {
    haystack.len() >= prefix.len() && haystack[..prefix.len()].eq_ignore_ascii_case(prefix)
}

fn ends_with_ci(haystack: &[u8], suffix: &[u8]) -> bool {
    haystack.len() >= suffix.len()
        && haystack[haystack.len() - suffix.len()..].eq_ignore_ascii_case(suffix)
}

/// A parsed, validated target pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TargetPattern {
    raw: String,
    glob: Glob,
    namespaced: bool,
}

impl TargetPattern {
    /// Parse a pattern as written in configuration.
    ///
    /// # Errors
    /// Returns [`JobzError::Pattern`] for empty patterns, an empty namespace
    /// or id, and wildcards in the middle of a pattern.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(JobzError::Pattern {
                pattern: raw.to_string(),
                reason: "pattern is empty".to_string(),
            });
        }

        let namespaced = trimmed.contains(':') && trimmed != "*";
        if namespaced {
            let (ns, id) = trimmed.split_once(':').unwrap_or((trimmed, ""));
            if ns.is_empty() || id.is_empty() {
                return Err(JobzError::Pattern {
                    pattern: raw.to_string(),
                    reason: "namespaced pattern needs both a namespace and an id".to_string(),
                });
            }
        }

        Ok(Self {
            raw: trimmed.to_string(),
            glob: Glob::parse(trimmed, raw)?,
            namespaced,
        })
    }

    /// The pattern as written (trimmed). Used as the rate-limit key component.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Whether this pattern targets the namespaced identifier.
    #[must_use]
    pub fn is_namespaced(&self) -> bool {
        self.namespaced
    }

    /// Match against a bare identifier, ignoring the namespaced rule.
    #[must_use]
    pub fn matches_str(&self, candidate: &str) -> bool {
        self.glob.matches(candidate)
    }

    /// Match against an action context.
    ///
    /// Namespaced patterns only ever look at the namespaced id; plain
    /// patterns only ever look at the default target.
    #[must_use]
    pub fn matches(&self, ctx: &ActionContext) -> bool {
        if self.namespaced {
            ctx.namespaced_id().is_some_and(|id| self.glob.matches(id))
        } else {
            self.glob.matches(ctx.target())
        }
    }
}

impl fmt::Display for TargetPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl TryFrom<String> for TargetPattern {
    type Error = JobzError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<TargetPattern> for String {
    fn from(value: TargetPattern) -> Self {
        value.raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pat(s: &str) -> TargetPattern {
        TargetPattern::parse(s).expect("valid pattern")
    }

    fn target(s: &str) -> ActionContext {
        ActionContext::new(s)
    }

    #[test]
    fn exact_is_case_insensitive() {
        assert!(pat("STONE").matches(&target("stone")));
        assert!(pat("stone").matches(&target("STONE")));
        assert!(!pat("STONE").matches(&target("STONE_BRICKS")));
    }

    #[test]
    fn prefix_matches_variants_and_stem() {
        let p = pat("STONE_*");
        assert!(p.matches(&target("STONE")));
        assert!(p.matches(&target("stone_bricks")));
        assert!(!p.matches(&target("IRON_ORE")));
        assert!(!p.matches(&target("STONEWALL")));
    }

    #[test]
    fn prefix_without_separator_is_plain_prefix() {
        let p = pat("STONE*");
        assert!(p.matches(&target("STONEWALL")));
        assert!(p.matches(&target("STONE")));
    }

    #[test]
    fn suffix_matches() {
        let p = pat("*_ORE");
        assert!(p.matches(&target("IRON_ORE")));
        assert!(p.matches(&target("deepslate_gold_ore")));
        assert!(p.matches(&target("ORE")));
        assert!(!p.matches(&target("ORE_BLOCK")));
    }

    #[test]
    fn contains_matches() {
        assert!(pat("*wool*").matches(&target("RED_WOOL_SLAB")));
        assert!(!pat("*wool*").matches(&target("COTTON")));
    }

    #[test]
    fn star_matches_everything() {
        let p = pat("*");
        assert!(p.matches(&target("anything")));
        assert!(p.matches(&target("")));
        assert!(!p.is_namespaced());
    }

    #[test]
    fn namespaced_only_checks_namespaced_id() {
        let p = pat("itemsadder:ruby_ore");
        assert!(p.is_namespaced());
        // Default target string never matches a namespaced pattern.
        assert!(!p.matches(&target("itemsadder:ruby_ore")));
        assert!(p.matches(&target("STONE").with_namespaced_id("ItemsAdder:Ruby_Ore")));
        assert!(!p.matches(&target("STONE").with_namespaced_id("itemsadder:sapphire_ore")));
    }

    #[test]
    fn namespaced_wildcards() {
        let p = pat("mythic:*");
        assert!(p.matches(&target("ZOMBIE").with_namespaced_id("mythic:skeleton_king")));
        assert!(!p.matches(&target("ZOMBIE")));
    }

    #[test]
    fn plain_pattern_ignores_namespaced_id() {
        let p = pat("RUBY_ORE");
        assert!(!p.matches(&target("STONE").with_namespaced_id("ruby_ore")));
    }

    #[test]
    fn malformed_patterns_are_rejected() {
        assert!(TargetPattern::parse("").is_err());
        assert!(TargetPattern::parse("   ").is_err());
        assert!(TargetPattern::parse("STO*NE").is_err());
        assert!(TargetPattern::parse(":id").is_err());
        assert!(TargetPattern::parse("ns:").is_err());
    }

    #[test]
    fn serde_round_trips_through_the_raw_string() {
        let p: TargetPattern = serde_json::from_str("\"  LOG_* \"").expect("parse");
        assert_eq!(p.as_str(), "LOG_*");
        assert_eq!(serde_json::to_string(&p).expect("ser"), "\"LOG_*\"");
        assert!(serde_json::from_str::<TargetPattern>("\"a*b\"").is_err());
    }
}
