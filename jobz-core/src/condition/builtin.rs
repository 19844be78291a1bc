//! Built-in condition variants.
//!
//! | Tag           | Parameters                                   |
//! |---------------|----------------------------------------------|
//! | `permission`  | `permission`                                 |
//! | `placeholder` | `placeholder`, `operator`, `value`           |
//! | `held_item`   | `items` (target patterns)                    |
//! | `world`       | `worlds`                                     |
//! | `time`        | `from`, `to` (ticks, may wrap midnight)      |
//! | `weather`     | `weather` (`clear`, `rain`, `thunder`)       |
//! | `biome`       | `biomes`                                     |
//! | `custom`      | `name` (registered predicate)                |

use std::sync::Arc;

use crate::actor::Actor;
use crate::error::{EvalError, Result};
use crate::pattern::TargetPattern;
use crate::types::{ActionContext, Weather};

use super::{Condition, ConditionFactory, RuleConfig};

/// Ticks in one in-game day.
pub const TICKS_PER_DAY: u32 = 24_000;

/// Register every built-in variant on a factory.
pub fn register_all(factory: &mut ConditionFactory) {
    factory.register("permission", |cfg, _| {
        Ok(Arc::new(Permission {
            node: cfg.str_param("permission")?.to_string(),
        }))
    });
    factory.register("placeholder", |cfg, _| Ok(Arc::new(Placeholder::from_config(cfg)?)));
    factory.register("held_item", |cfg, _| {
        let items = cfg
            .list_param("items")?
            .iter()
            .map(|p| TargetPattern::parse(p))
            .collect::<Result<Vec<_>>>()?;
        Ok(Arc::new(HeldItem { items }))
    });
    factory.register("world", |cfg, _| {
        Ok(Arc::new(NameIn {
            kind: "world",
            names: cfg.list_param("worlds")?,
            read: actor_world,
        }))
    });
    factory.register("biome", |cfg, _| {
        Ok(Arc::new(NameIn {
            kind: "biome",
            names: cfg.list_param("biomes")?,
            read: actor_biome,
        }))
    });
    factory.register("time", |cfg, _| Ok(Arc::new(TimeOfDay::from_config(cfg)?)));
    factory.register("time_of_day", |cfg, _| Ok(Arc::new(TimeOfDay::from_config(cfg)?)));
    factory.register("weather", |cfg, _| {
        let allowed = cfg
            .list_param("weather")?
            .iter()
            .map(|tag| {
                Weather::parse(tag).ok_or_else(|| cfg.invalid(format!("unknown weather `{tag}`")))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Arc::new(WeatherIs { allowed }))
    });
    factory.register("custom", |cfg, factory| {
        let name = cfg.str_param("name")?;
        factory
            .custom(name)
            .ok_or_else(|| cfg.invalid(format!("no custom condition registered as `{name}`")))
    });
}

// ---------------------------------------------------------------------------
// Variants
// ---------------------------------------------------------------------------

/// Actor holds a privilege node.
#[derive(Debug)]
pub struct Permission {
    node: String,
}

impl Condition for Permission {
    fn kind(&self) -> &str {
        "permission"
    }

    fn is_met(&self, actor: &dyn Actor, _ctx: &ActionContext) -> std::result::Result<bool, EvalError> {
        Ok(actor.has_permission(&self.node))
    }
}

/// How a placeholder value is compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    /// Case-insensitive equality.
    Equals,
    /// Case-insensitive inequality.
    NotEquals,
    /// Case-insensitive substring.
    Contains,
    /// Case-insensitive prefix.
    StartsWith,
    /// Numeric `>`.
    Greater,
    /// Numeric `>=`.
    GreaterOrEqual,
    /// Numeric `<`.
    Less,
    /// Numeric `<=`.
    LessOrEqual,
}

impl CompareOp {
    fn parse(s: &str) -> Option<Self> {
        Some(match s.trim().to_ascii_lowercase().as_str() {
            "=" | "==" | "equals" | "eq" => Self::Equals,
            "!=" | "not_equals" | "ne" => Self::NotEquals,
            "contains" => Self::Contains,
            "starts_with" | "startswith" => Self::StartsWith,
            ">" | "gt" => Self::Greater,
            ">=" | "ge" | "gte" => Self::GreaterOrEqual,
            "<" | "lt" => Self::Less,
            "<=" | "le" | "lte" => Self::LessOrEqual,
            _ => return None,
        })
    }

    fn is_numeric(self) -> bool {
        matches!(
            self,
            Self::Greater | Self::GreaterOrEqual | Self::Less | Self::LessOrEqual
        )
    }

    fn compare(self, actual: &str, expected: &str) -> std::result::Result<bool, EvalError> {
        if self.is_numeric() {
            let parse = |s: &str| {
                s.trim()
                    .parse::<f64>()
                    .map_err(|_| EvalError::Unavailable(format!("`{s}` is not a number")))
            };
            let (a, b) = (parse(actual)?, parse(expected)?);
            return Ok(match self {
                Self::Greater => a > b,
                Self::GreaterOrEqual => a >= b,
                Self::Less => a < b,
                _ => a <= b,
            });
        }
        let (a, b) = (actual.to_lowercase(), expected.to_lowercase());
        Ok(match self {
            Self::Equals => a == b,
            Self::NotEquals => a != b,
            Self::Contains => a.contains(&b),
            _ => a.starts_with(&b),
        })
    }
}

/// A placeholder resolved through the actor compares against a literal.
#[derive(Debug)]
pub struct Placeholder {
    key: String,
    op: CompareOp,
    value: String,
}

impl Placeholder {
    fn from_config(cfg: &RuleConfig) -> Result<Self> {
        let op_text = cfg.params.get("operator").and_then(toml::Value::as_str).unwrap_or("equals");
        let op = CompareOp::parse(op_text)
            .ok_or_else(|| cfg.invalid(format!("unknown operator `{op_text}`")))?;
        let value = match cfg.params.get("value") {
            Some(toml::Value::String(s)) => s.clone(),
            Some(toml::Value::Integer(i)) => i.to_string(),
            Some(toml::Value::Float(f)) => f.to_string(),
            Some(toml::Value::Boolean(b)) => b.to_string(),
            _ => return Err(cfg.invalid("missing parameter `value`".to_string())),
        };
        if op.is_numeric() && value.trim().parse::<f64>().is_err() {
            return Err(cfg.invalid(format!("operator `{op_text}` needs a numeric value")));
        }
        Ok(Self {
            key: cfg.str_param("placeholder")?.to_string(),
            op,
            value,
        })
    }
}

impl Condition for Placeholder {
    fn kind(&self) -> &str {
        "placeholder"
    }

    fn is_met(&self, actor: &dyn Actor, _ctx: &ActionContext) -> std::result::Result<bool, EvalError> {
        let Some(actual) = actor.placeholder(&self.key)? else {
            return Err(EvalError::Unavailable(format!("placeholder `{}` is not resolvable", self.key)));
        };
        self.op.compare(&actual, &self.value)
    }
}

/// The actor's main-hand item matches one of a set of patterns.
#[derive(Debug)]
pub struct HeldItem {
    items: Vec<TargetPattern>,
}

impl Condition for HeldItem {
    fn kind(&self) -> &str {
        "held_item"
    }

    fn is_met(&self, actor: &dyn Actor, _ctx: &ActionContext) -> std::result::Result<bool, EvalError> {
        let held = actor.held_item().unwrap_or("");
        Ok(self.items.iter().any(|p| p.matches_str(held)))
    }
}

/// A named property of the actor (world, biome) is in a list.
pub struct NameIn {
    kind: &'static str,
    names: Vec<String>,
    read: fn(&dyn Actor) -> Option<String>,
}

impl std::fmt::Debug for NameIn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NameIn")
            .field("kind", &self.kind)
            .field("names", &self.names)
            .finish()
    }
}

impl Condition for NameIn {
    fn kind(&self) -> &str {
        self.kind
    }

    fn is_met(&self, actor: &dyn Actor, _ctx: &ActionContext) -> std::result::Result<bool, EvalError> {
        Ok((self.read)(actor).is_some_and(|value| self.names.iter().any(|n| n.eq_ignore_ascii_case(&value))))
    }
}

fn actor_world(actor: &dyn Actor) -> Option<String> {
    actor.world().map(str::to_string)
}

fn actor_biome(actor: &dyn Actor) -> Option<String> {
    actor.biome().map(str::to_string)
}

/// World time falls in `[from, to]`; wraps midnight when `from > to`.
#[derive(Debug)]
pub struct TimeOfDay {
    from: u32,
    to: u32,
}

impl TimeOfDay {
    fn from_config(cfg: &RuleConfig) -> Result<Self> {
        let read = |key: &str| -> Result<u32> {
            let v = cfg.int_param(key)?;
            u32::try_from(v)
                .ok()
                .filter(|t| *t < TICKS_PER_DAY)
                .ok_or_else(|| cfg.invalid(format!("`{key}` must be within 0..{TICKS_PER_DAY}")))
        };
        Ok(Self {
            from: read("from")?,
            to: read("to")?,
        })
    }

    /// Whether a tick falls inside the window.
    #[must_use]
    pub fn contains(&self, tick: u32) -> bool {
        let tick = tick % TICKS_PER_DAY;
        if self.from <= self.to {
            (self.from..=self.to).contains(&tick)
        } else {
            tick >= self.from || tick <= self.to
        }
    }
}

impl Condition for TimeOfDay {
    fn kind(&self) -> &str {
        "time"
    }

    fn is_met(&self, actor: &dyn Actor, _ctx: &ActionContext) -> std::result::Result<bool, EvalError> {
        actor
            .world_time()
            .map(|t| self.contains(t))
            .ok_or_else(|| EvalError::Unavailable("world time".to_string()))
    }
}

/// Current weather is one of a set.
#[derive(Debug)]
pub struct WeatherIs {
    allowed: Vec<Weather>,
}

impl Condition for WeatherIs {
    fn kind(&self) -> &str {
        "weather"
    }

    fn is_met(&self, actor: &dyn Actor, _ctx: &ActionContext) -> std::result::Result<bool, EvalError> {
        actor
            .weather()
            .map(|w| self.allowed.contains(&w))
            .ok_or_else(|| EvalError::Unavailable("weather".to_string()))
    }
}
