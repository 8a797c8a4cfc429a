//! NPC module
//!
//! Spawned NPC entities: static per-type definitions (stats plus loot
//! table binding) and the live spawned instances. Death resolution lives
//! in `combat`; this module owns the entity records and their visuals.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::error::{GameError, Result};
use crate::game::visual::{VisualHandle, WorldVisuals};
use crate::game::{NpcId, Position};

/// Static per-type NPC stats
#[derive(Debug, Clone)]
pub struct NpcDefinition {
    pub type_key: String,
    pub name: String,
    pub max_health: i64,
    pub attack: i64,
    pub defense: i64,
    /// Chance in [0, 1] that this NPC's own attacks land
    pub accuracy: f64,
    /// Loot table resolved on death; `None` drops nothing
    pub loot_table: Option<String>,
    pub experience_reward: i64,
}

/// A live NPC instance in the world
#[derive(Debug, Clone)]
pub struct SpawnedNpc {
    pub id: NpcId,
    pub type_key: String,
    pub name: String,
    pub health: i64,
    pub max_health: i64,
    pub defense: i64,
    pub alive: bool,
    pub position: Position,
    pub spawned_at: DateTime<Utc>,
    pub loot_table: Option<String>,
    pub experience_reward: i64,
    /// Handle to the NPC's visual, absent if creation failed
    pub visual: Option<VisualHandle>,
}

/// Outcome of applying damage to an NPC
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DamageOutcome {
    pub remaining_health: i64,
    /// True only on the mutation that brought health to zero
    pub died: bool,
}

/// Owns NPC type definitions and every spawned instance
pub struct NpcManager {
    definitions: RwLock<HashMap<String, NpcDefinition>>,
    spawned: DashMap<NpcId, SpawnedNpc>,
    next_id: AtomicU64,
    visuals: Arc<dyn WorldVisuals>,
}

impl NpcManager {
    /// Create a manager with no definitions registered
    pub fn new(visuals: Arc<dyn WorldVisuals>) -> Self {
        Self {
            definitions: RwLock::new(HashMap::new()),
            spawned: DashMap::new(),
            next_id: AtomicU64::new(1),
            visuals,
        }
    }

    /// Create a manager seeded with the built-in NPC types
    pub fn with_builtin_definitions(visuals: Arc<dyn WorldVisuals>) -> Self {
        let manager = Self::new(visuals);
        manager.register(NpcDefinition {
            type_key: "forest_wolf".to_string(),
            name: "Forest Wolf".to_string(),
            max_health: 40,
            attack: 8,
            defense: 2,
            accuracy: 0.7,
            loot_table: Some("forest_wolf".to_string()),
            experience_reward: 25,
        });
        manager.register(NpcDefinition {
            type_key: "cave_bandit".to_string(),
            name: "Cave Bandit".to_string(),
            max_health: 70,
            attack: 12,
            defense: 5,
            accuracy: 0.75,
            loot_table: Some("cave_bandit".to_string()),
            experience_reward: 60,
        });
        manager.register(NpcDefinition {
            type_key: "ember_golem".to_string(),
            name: "Ember Golem".to_string(),
            max_health: 220,
            attack: 25,
            defense: 15,
            accuracy: 0.6,
            loot_table: Some("ember_golem".to_string()),
            experience_reward: 250,
        });
        manager
    }

    /// Register (or replace) an NPC type definition
    pub fn register(&self, definition: NpcDefinition) {
        debug!(type_key = %definition.type_key, "Registered NPC definition");
        self.definitions
            .write()
            .insert(definition.type_key.clone(), definition);
    }

    /// Look up a type definition
    pub fn definition(&self, type_key: &str) -> Option<NpcDefinition> {
        self.definitions.read().get(type_key).cloned()
    }

    /// Spawn an NPC of a registered type at a position.
    ///
    /// Visual creation faults are caught and logged; the NPC exists
    /// without a handle rather than failing the spawn.
    pub fn spawn(&self, type_key: &str, position: Position) -> Result<NpcId> {
        let definition = self
            .definition(type_key)
            .ok_or_else(|| GameError::UnknownNpcType(type_key.to_string()))?;

        let visual = match self.visuals.spawn(&format!("npc_{type_key}"), position) {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!(type_key = type_key, error = %e, "Failed to create NPC visual");
                None
            }
        };

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.spawned.insert(
            id,
            SpawnedNpc {
                id,
                type_key: definition.type_key,
                name: definition.name,
                health: definition.max_health,
                max_health: definition.max_health,
                defense: definition.defense,
                alive: true,
                position,
                spawned_at: Utc::now(),
                loot_table: definition.loot_table,
                experience_reward: definition.experience_reward,
                visual,
            },
        );

        info!(id = id, type_key = type_key, position = %position, "NPC spawned");
        Ok(id)
    }

    /// Get a snapshot of a spawned NPC
    pub fn get(&self, id: NpcId) -> Option<SpawnedNpc> {
        self.spawned.get(&id).map(|n| n.clone())
    }

    /// Apply damage, clamping health at zero. Reports `died: true` only on
    /// the mutation that brought health to zero; a dead NPC takes no
    /// further damage.
    pub fn apply_damage(&self, id: NpcId, amount: i64) -> Option<DamageOutcome> {
        let mut npc = self.spawned.get_mut(&id)?;
        if !npc.alive {
            return Some(DamageOutcome {
                remaining_health: 0,
                died: false,
            });
        }

        npc.health = (npc.health - amount.max(0)).max(0);
        let died = npc.health == 0;
        if died {
            npc.alive = false;
            info!(id = id, type_key = %npc.type_key, "NPC died");
        }

        Some(DamageOutcome {
            remaining_health: npc.health,
            died,
        })
    }

    /// Remove a spawned NPC, destroying its visual. Idempotent: a missing
    /// id reports `false`.
    pub fn despawn(&self, id: NpcId) -> bool {
        match self.spawned.remove(&id) {
            Some((_, npc)) => {
                if let Some(handle) = npc.visual {
                    self.visuals.destroy(handle);
                }
                debug!(id = id, type_key = %npc.type_key, "NPC despawned");
                true
            }
            None => false,
        }
    }

    /// Spawned NPCs still alive
    pub fn count_alive(&self) -> usize {
        self.spawned.iter().filter(|n| n.alive).count()
    }

    /// All spawned NPCs, dead ones included
    pub fn count(&self) -> usize {
        self.spawned.len()
    }

    /// Alive NPCs within `radius` of `position` (linear scan)
    pub fn list_near(&self, position: Position, radius: f32) -> Vec<SpawnedNpc> {
        self.spawned
            .iter()
            .filter(|n| n.alive && n.position.within_radius(&position, radius))
            .map(|n| n.clone())
            .collect()
    }
}
