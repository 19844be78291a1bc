//! The actor seam: what the engine may ask about whoever performed an action.
//!
//! Adapters implement [`Actor`] over their native player handle. Everything
//! except identity and permissions is optional; a rule whose data is missing
//! simply does not pass.

use std::collections::{HashMap, HashSet};

use crate::error::EvalError;
use crate::types::{ActorId, Weather};

/// Read-only view of an actor for the duration of one `process` call.
pub trait Actor: Send + Sync {
    /// Stable identity.
    fn id(&self) -> ActorId;

    /// Display name used for `{player}` substitution.
    fn name(&self) -> &str;

    /// Whether the actor holds a privilege node.
    fn has_permission(&self, node: &str) -> bool;

    /// Resolve a placeholder (`%vault_rank%` style) through a third-party service.
    ///
    /// # Errors
    /// Returns [`EvalError`] when the lookup itself fails.
    fn placeholder(&self, key: &str) -> Result<Option<String>, EvalError> {
        let _ = key;
        Ok(None)
    }

    /// Identifier of the item in the actor's main hand.
    fn held_item(&self) -> Option<&str> {
        None
    }

    /// Name of the world the actor is in.
    fn world(&self) -> Option<&str> {
        None
    }

    /// Biome at the actor's position.
    fn biome(&self) -> Option<&str> {
        None
    }

    /// Weather in the actor's world.
    fn weather(&self) -> Option<Weather> {
        None
    }

    /// Time of day in game ticks (`0..24000`).
    fn world_time(&self) -> Option<u32> {
        None
    }
}

/// A plain-data [`Actor`], for hosts that snapshot player state up front and for tests.
#[derive(Debug, Clone, Default)]
pub struct ActorProfile {
    /// Identity.
    pub id: ActorId,
    /// Display name.
    pub name: String,
    /// Held privilege nodes. A literal `*` grants every node.
    pub permissions: HashSet<String>,
    /// Pre-resolved placeholders.
    pub placeholders: HashMap<String, String>,
    /// Main-hand item.
    pub held_item: Option<String>,
    /// Current world.
    pub world: Option<String>,
    /// Current biome.
    pub biome: Option<String>,
    /// Current weather.
    pub weather: Option<Weather>,
    /// Current time of day in ticks.
    pub world_time: Option<u32>,
}

impl ActorProfile {
    /// A profile with a fresh id and no privileges.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: ActorId::new(),
            name: name.into(),
            ..Self::default()
        }
    }

    /// Grant a permission node.
    #[must_use]
    pub fn with_permission(mut self, node: impl Into<String>) -> Self {
        self.permissions.insert(node.into());
        self
    }

    /// Set a resolved placeholder value.
    #[must_use]
    pub fn with_placeholder(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.placeholders.insert(key.into(), value.into());
        self
    }

    /// Set the held item.
    #[must_use]
    pub fn holding(mut self, item: impl Into<String>) -> Self {
        self.held_item = Some(item.into());
        self
    }

    /// Set the world name.
    #[must_use]
    pub fn in_world(mut self, world: impl Into<String>) -> Self {
        self.world = Some(world.into());
        self
    }

    /// Set the biome.
    #[must_use]
    pub fn in_biome(mut self, biome: impl Into<String>) -> Self {
        self.biome = Some(biome.into());
        self
    }

    /// Set weather and time of day.
    #[must_use]
    pub fn at(mut self, weather: Weather, world_time: u32) -> Self {
        self.weather = Some(weather);
        self.world_time = Some(world_time);
        self
    }
}

impl Actor for ActorProfile {
    fn id(&self) -> ActorId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn has_permission(&self, node: &str) -> bool {
        self.permissions.contains("*") || self.permissions.contains(node)
    }

    fn placeholder(&self, key: &str) -> Result<Option<String>, EvalError> {
        Ok(self.placeholders.get(key).cloned())
    }

    fn held_item(&self) -> Option<&str> {
        self.held_item.as_deref()
    }

    fn world(&self) -> Option<&str> {
        self.world.as_deref()
    }

    fn biome(&self) -> Option<&str> {
        self.biome.as_deref()
    }

    fn weather(&self) -> Option<Weather> {
        self.weather
    }

    fn world_time(&self) -> Option<u32> {
        self.world_time
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_grants_every_node() {
        let admin = ActorProfile::new("admin").with_permission("*");
        assert!(admin.has_permission("jobs.anything"));

        let player = ActorProfile::new("p").with_permission("jobs.join");
        assert!(player.has_permission("jobs.join"));
        assert!(!player.has_permission("jobs.admin"));
    }
}
