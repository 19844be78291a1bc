//! Core type definitions shared by every JOBZ subsystem.
//!
//! All types are serializable; the ones that cross the adapter boundary
//! (context in, directives out) carry no engine-internal state.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Identity Types
// ---------------------------------------------------------------------------

/// Unique identifier for an actor (a connected player).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActorId(pub Uuid);

impl ActorId {
    /// Create a new random actor ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ActorId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a multiplier grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GrantId(pub Uuid);

impl GrantId {
    /// Create a new random grant ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for GrantId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for GrantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Action Context
// ---------------------------------------------------------------------------

/// Well-known context keys placed by adapters.
pub mod keys {
    /// Default target identifier (block/entity/item type).
    pub const TARGET: &str = "target";
    /// Namespaced identifier supplied by content plugins (`ns:id`).
    pub const NAMESPACED_ID: &str = "namespacedId";
    /// Kind of action (`break`, `place`, `kill`, ...).
    pub const ACTION: &str = "action";
    /// Number of items/entities involved.
    pub const QUANTITY: &str = "quantity";
    /// Monetary cost attached to the action.
    pub const COST: &str = "cost";
    /// Level attribute of the target (enchant level, mob level).
    pub const LEVEL: &str = "level";
    /// Interaction sub-type (left/right click, shift, ...).
    pub const INTERACTION_TYPE: &str = "interactionType";
}

/// A typed value in an [`ActionContext`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ContextValue {
    /// Boolean attribute.
    Flag(bool),
    /// Numeric attribute.
    Number(f64),
    /// Free-form text attribute.
    Text(String),
}

/// Immutable per-invocation mapping from string keys to typed values.
///
/// Absent attributes read as neutral values: empty string, zero, `false`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionContext {
    values: HashMap<String, ContextValue>,
}

impl ActionContext {
    /// Create a context for the given target identifier.
    #[must_use]
    pub fn new(target: impl Into<String>) -> Self {
        let mut values = HashMap::new();
        values.insert(keys::TARGET.to_string(), ContextValue::Text(target.into()));
        Self { values }
    }

    /// Attach a namespaced identifier (`ns:id`).
    #[must_use]
    pub fn with_namespaced_id(self, id: impl Into<String>) -> Self {
        self.with_text(keys::NAMESPACED_ID, id)
    }

    /// Attach the action kind (`break`, `place`, ...).
    #[must_use]
    pub fn with_action(self, action: impl Into<String>) -> Self {
        self.with_text(keys::ACTION, action)
    }

    /// Attach a text attribute.
    #[must_use]
    pub fn with_text(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), ContextValue::Text(value.into()));
        self
    }

    /// Attach a numeric attribute.
    #[must_use]
    pub fn with_number(mut self, key: impl Into<String>, value: f64) -> Self {
        self.values.insert(key.into(), ContextValue::Number(value));
        self
    }

    /// Attach a boolean attribute.
    #[must_use]
    pub fn with_flag(mut self, key: impl Into<String>, value: bool) -> Self {
        self.values.insert(key.into(), ContextValue::Flag(value));
        self
    }

    /// The default target identifier, or `""`.
    #[must_use]
    pub fn target(&self) -> &str {
        self.text(keys::TARGET)
    }

    /// The namespaced identifier, if an adapter supplied a non-empty one.
    #[must_use]
    pub fn namespaced_id(&self) -> Option<&str> {
        Some(self.text(keys::NAMESPACED_ID)).filter(|id| !id.is_empty())
    }

    /// The action kind, or `""`.
    #[must_use]
    pub fn action(&self) -> &str {
        self.text(keys::ACTION)
    }

    /// Text attribute, or `""` when absent or not text.
    #[must_use]
    pub fn text(&self, key: &str) -> &str {
        match self.values.get(key) {
            Some(ContextValue::Text(s)) => s,
            _ => "",
        }
    }

    /// Numeric attribute, or `0.0` when absent or not finite. Numeric text
    /// is parsed.
    #[must_use]
    pub fn number(&self, key: &str) -> f64 {
        let n = match self.values.get(key) {
            Some(ContextValue::Number(n)) => *n,
            Some(ContextValue::Text(s)) => s.trim().parse().unwrap_or(0.0),
            Some(ContextValue::Flag(b)) => f64::from(u8::from(*b)),
            None => 0.0,
        };
        if n.is_finite() { n } else { 0.0 }
    }

    /// Boolean attribute, or `false` when absent.
    #[must_use]
    pub fn flag(&self, key: &str) -> bool {
        matches!(self.values.get(key), Some(ContextValue::Flag(true)))
    }

    /// Raw access to a value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&ContextValue> {
        self.values.get(key)
    }
}

// ---------------------------------------------------------------------------
// World State
// ---------------------------------------------------------------------------

/// Weather in the actor's world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Weather {
    /// No precipitation.
    Clear,
    /// Rain or snow.
    Rain,
    /// Thunderstorm.
    Thunder,
}

impl Weather {
    /// Parse a config tag (`clear`, `sun`, `rain`, `storm`, `thunder`).
    #[must_use]
    pub fn parse(tag: &str) -> Option<Self> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "clear" | "sun" | "sunny" => Some(Self::Clear),
            "rain" | "raining" | "snow" => Some(Self::Rain),
            "thunder" | "storm" | "thunderstorm" => Some(Self::Thunder),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Outcomes & Directives
// ---------------------------------------------------------------------------

/// How the presentation layer should show a message. A hint only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayMode {
    /// Chat line.
    #[default]
    Chat,
    /// Action bar above the hotbar.
    ActionBar,
    /// Boss bar at the top of the screen.
    BossBar,
    /// Title/subtitle.
    Title,
}

/// A configured bundle of side effects: what happens when a rule accepts
/// or denies, when an actor levels up, or when a definition pays out.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Outcome {
    /// Message text, with `{placeholder}` substitution.
    pub message: Option<String>,
    /// Sound identifier.
    pub sound: Option<String>,
    /// Commands for the host to run, with substitution.
    pub commands: Vec<String>,
    /// Ask the adapter to cancel the originating game event.
    pub suppress_event: bool,
    /// Presentation hint for `message`.
    pub display: DisplayMode,
}

impl Outcome {
    /// An outcome carrying only a message.
    #[must_use]
    pub fn message(text: impl Into<String>) -> Self {
        Self {
            message: Some(text.into()),
            ..Self::default()
        }
    }

    /// Whether there is nothing to emit (suppression alone still counts).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.message.is_none() && self.sound.is_none() && self.commands.is_empty() && !self.suppress_event
    }

    /// Render into a directive, substituting placeholders.
    #[must_use]
    pub fn render(&self, vars: &TextVars<'_>) -> EffectDirective {
        EffectDirective {
            message: self.message.as_deref().map(|m| vars.apply(m)),
            sound: self.sound.clone(),
            commands: self.commands.iter().map(|c| vars.apply(c)).collect(),
            display: self.display,
        }
    }
}

/// An instruction to the presentation layer. Produced, never executed, by the core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectDirective {
    /// Rendered message text.
    pub message: Option<String>,
    /// Sound identifier.
    pub sound: Option<String>,
    /// Rendered commands.
    pub commands: Vec<String>,
    /// Presentation hint.
    pub display: DisplayMode,
}

impl EffectDirective {
    /// Whether the directive carries anything to show or run.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.message.is_none() && self.sound.is_none() && self.commands.is_empty()
    }
}

/// Values available for `{placeholder}` substitution in outcome text.
#[derive(Debug, Clone, Default)]
pub struct TextVars<'a> {
    /// `{player}`
    pub player: &'a str,
    /// `{category}`
    pub category: &'a str,
    /// `{target}`
    pub target: &'a str,
    /// `{level}`
    pub level: Option<u32>,
    /// `{xp}`
    pub xp: Option<f64>,
    /// `{currency}`
    pub currency: Option<f64>,
    /// `{remaining}` (human readable cooldown)
    pub remaining: Option<String>,
}

impl TextVars<'_> {
    /// Substitute every known placeholder present in `text`.
    #[must_use]
    pub fn apply(&self, text: &str) -> String {
        if !text.contains('{') {
            return text.to_string();
        }
        let mut out = text
            .replace("{player}", self.player)
            .replace("{category}", self.category)
            .replace("{target}", self.target);
        if let Some(level) = self.level {
            out = out.replace("{level}", &level.to_string());
        }
        if let Some(xp) = self.xp {
            out = out.replace("{xp}", &format_amount(xp));
        }
        if let Some(currency) = self.currency {
            out = out.replace("{currency}", &format_amount(currency));
        }
        if let Some(remaining) = &self.remaining {
            out = out.replace("{remaining}", remaining);
        }
        out
    }
}

/// Format an amount with at most two decimals, dropping a trailing `.00`.
#[must_use]
pub fn format_amount(value: f64) -> String {
    let rounded = (value * 100.0).round() / 100.0;
    if (rounded.fract()).abs() < f64::EPSILON {
        format!("{rounded:.0}")
    } else {
        format!("{rounded:.2}")
    }
}
