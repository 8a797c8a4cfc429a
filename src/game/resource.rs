//! Resource ledger module
//!
//! Tracks transient per-player resources (health, energy, mana, ...):
//! - Values are clamped into `[0, max]` on every mutation
//! - Every successful mutation publishes a `ResourceChanged` event
//! - Depletion and low-water checks are level-triggered: they are
//!   re-evaluated and re-fired on every qualifying mutation, not only on
//!   the transition into the condition

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::{debug, info};

use crate::events::{EventBus, GameEvent};
use crate::game::PlayerId;

/// Ratio at or below which a resource counts as low
pub const DEFAULT_LOW_THRESHOLD: f64 = 0.2;

/// A single tracked resource
#[derive(Debug, Clone, Copy)]
pub struct ResourceEntry {
    pub current: i64,
    pub max: i64,
    pub last_updated: DateTime<Utc>,
}

impl ResourceEntry {
    fn new(current: i64, max: i64) -> Self {
        Self {
            current: current.clamp(0, max),
            max,
            last_updated: Utc::now(),
        }
    }

    /// Current value as a fraction of max (0 when max is 0)
    pub fn ratio(&self) -> f64 {
        if self.max <= 0 {
            0.0
        } else {
            self.current as f64 / self.max as f64
        }
    }
}

/// A (key, max) pair used to seed a player's resources
#[derive(Debug, Clone)]
pub struct ResourceDefault {
    pub key: String,
    pub max: i64,
}

/// Per-player resource tracking
pub struct ResourceLedger {
    players: DashMap<PlayerId, HashMap<String, ResourceEntry>>,
    defaults: Vec<ResourceDefault>,
    low_threshold: f64,
    events: Arc<EventBus>,
}

impl ResourceLedger {
    /// Create a new ledger seeding `defaults` on initialize
    pub fn new(defaults: Vec<ResourceDefault>, low_threshold: f64, events: Arc<EventBus>) -> Self {
        Self {
            players: DashMap::new(),
            defaults,
            low_threshold,
            events,
        }
    }

    /// Ledger with the standard health/energy/mana defaults
    pub fn with_standard_defaults(events: Arc<EventBus>) -> Self {
        Self::new(
            vec![
                ResourceDefault {
                    key: "Health".to_string(),
                    max: 100,
                },
                ResourceDefault {
                    key: "Energy".to_string(),
                    max: 100,
                },
                ResourceDefault {
                    key: "Mana".to_string(),
                    max: 50,
                },
            ],
            DEFAULT_LOW_THRESHOLD,
            events,
        )
    }

    /// Seed a player's resources at full values. Re-initializing an
    /// existing player resets their state.
    pub fn initialize(&self, player_id: PlayerId) {
        let mut resources = HashMap::with_capacity(self.defaults.len());
        for default in &self.defaults {
            resources.insert(default.key.clone(), ResourceEntry::new(default.max, default.max));
        }
        self.players.insert(player_id, resources);
        debug!(player = %player_id, resources = self.defaults.len(), "Initialized player resources");
    }

    /// Check if a player has any resource state
    pub fn is_tracked(&self, player_id: PlayerId) -> bool {
        self.players.contains_key(&player_id)
    }

    /// Get the current value of a resource
    pub fn get(&self, player_id: PlayerId, key: &str) -> Option<i64> {
        self.players
            .get(&player_id)
            .and_then(|r| r.get(key).map(|e| e.current))
    }

    /// Get the maximum value of a resource
    pub fn get_max(&self, player_id: PlayerId, key: &str) -> Option<i64> {
        self.players
            .get(&player_id)
            .and_then(|r| r.get(key).map(|e| e.max))
    }

    /// Get a snapshot of a resource entry
    pub fn get_entry(&self, player_id: PlayerId, key: &str) -> Option<ResourceEntry> {
        self.players
            .get(&player_id)
            .and_then(|r| r.get(key).copied())
    }

    /// Set a resource to `value`, clamped into `[0, max]`; returns the
    /// stored value
    pub fn set(&self, player_id: PlayerId, key: &str, value: i64) -> Option<i64> {
        self.apply(player_id, key, |_, max| Some(value.clamp(0, max)))
    }

    /// Update a resource ceiling; a stored value above the new max is
    /// clamped down (publishing the change)
    pub fn set_max(&self, player_id: PlayerId, key: &str, new_max: i64) -> Option<i64> {
        let new_max = new_max.max(0);
        let needs_clamp = {
            let mut player = self.players.get_mut(&player_id)?;
            let entry = player.get_mut(key)?;
            entry.max = new_max;
            entry.last_updated = Utc::now();
            entry.current > new_max
        };

        if needs_clamp {
            self.apply(player_id, key, |_, max| Some(max))?;
        }
        self.get_max(player_id, key)
    }

    /// Add `delta` (possibly negative) to a resource; returns the stored
    /// value
    pub fn modify(&self, player_id: PlayerId, key: &str, delta: i64) -> Option<i64> {
        self.apply(player_id, key, |current, max| {
            Some((current + delta).clamp(0, max))
        })
    }

    /// Check if a resource holds at least `amount`
    pub fn has_enough(&self, player_id: PlayerId, key: &str, amount: i64) -> bool {
        self.get(player_id, key).map_or(false, |v| v >= amount)
    }

    /// Spend `amount` from a resource; fails without mutating when the
    /// balance is insufficient. The sufficiency check and the deduction
    /// share one critical section, so two racing consumes can never both
    /// succeed against the same balance.
    pub fn consume(&self, player_id: PlayerId, key: &str, amount: i64) -> bool {
        if amount < 0 {
            return false;
        }
        self.apply(player_id, key, |current, max| {
            if current < amount {
                return None;
            }
            Some((current - amount).clamp(0, max))
        })
        .is_some()
    }

    /// Restore a resource to its maximum
    pub fn restore_to_max(&self, player_id: PlayerId, key: &str) -> Option<i64> {
        self.apply(player_id, key, |_, max| Some(max))
    }

    /// Remove all resource state for a player
    pub fn cleanup(&self, player_id: PlayerId) {
        if self.players.remove(&player_id).is_some() {
            info!(player = %player_id, "Cleaned up player resources");
        }
    }

    /// Apply a mutation and publish the resulting events.
    ///
    /// The closure runs under the entry's write guard and may return `None`
    /// to reject the mutation without touching the entry. The threshold
    /// checks are evaluated fresh on every mutation: repeated mutations
    /// while a condition holds re-fire its event each time.
    fn apply(
        &self,
        player_id: PlayerId,
        key: &str,
        f: impl FnOnce(i64, i64) -> Option<i64>,
    ) -> Option<i64> {
        let (new_value, max) = {
            let mut player = self.players.get_mut(&player_id)?;
            let entry = player.get_mut(key)?;
            entry.current = f(entry.current, entry.max)?.clamp(0, entry.max);
            entry.last_updated = Utc::now();
            (entry.current, entry.max)
        };

        let percentage = if max > 0 {
            new_value as f64 / max as f64 * 100.0
        } else {
            0.0
        };

        self.events.publish(GameEvent::ResourceChanged {
            player_id,
            resource: key.to_string(),
            new_value,
            max,
            percentage,
        });

        if new_value == 0 {
            self.events.publish(GameEvent::ResourceDepleted {
                player_id,
                resource: key.to_string(),
            });
        }

        let ratio = if max > 0 { new_value as f64 / max as f64 } else { 0.0 };
        if ratio <= self.low_threshold {
            self.events.publish(GameEvent::ResourceLow {
                player_id,
                resource: key.to_string(),
                percentage,
            });
        }

        Some(new_value)
    }
}
