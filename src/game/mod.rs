//! Game module
//!
//! Contains the game-state services:
//! - `loot_table` - weighted loot generation over static table definitions
//! - `loot_drop` - time-boxed loot drops in the world
//! - `message` - time-boxed queued messages with per-recipient history
//! - `resource` - per-player resource tracking
//! - `profile` - durable player profiles
//! - `persistence` - key/value persistence backends
//! - `validation` - stateless input validators
//! - `npc` - spawned NPC entities
//! - `combat` - damage resolution and NPC death orchestration
//! - `timed` - the shared keyed-store-with-expiry pattern
//! - `visual` - world-representation collaborator boundary

pub mod combat;
pub mod loot_drop;
pub mod loot_table;
pub mod message;
pub mod npc;
pub mod persistence;
pub mod profile;
pub mod resource;
pub mod timed;
pub mod validation;
pub mod visual;

use serde::{Deserialize, Serialize};

/// Unique identifier for a player
pub type PlayerId = uuid::Uuid;

/// Unique identifier for a spawned NPC
pub type NpcId = u64;

/// A position in the game world
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Position {
    /// Create a new position
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Euclidean distance to another position
    pub fn distance_to(&self, other: &Position) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    /// Check if within `radius` of another position
    pub fn within_radius(&self, other: &Position, radius: f32) -> bool {
        self.distance_to(other) <= radius
    }

    /// Check that every coordinate is a finite number
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.1}, {:.1}, {:.1})", self.x, self.y, self.z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance() {
        let a = Position::new(0.0, 0.0, 0.0);
        let b = Position::new(3.0, 4.0, 0.0);
        assert!((a.distance_to(&b) - 5.0).abs() < f32::EPSILON);
        assert!(a.within_radius(&b, 5.0));
        assert!(!a.within_radius(&b, 4.9));
    }

    #[test]
    fn test_is_finite() {
        assert!(Position::new(1.0, 2.0, 3.0).is_finite());
        assert!(!Position::new(f32::NAN, 0.0, 0.0).is_finite());
        assert!(!Position::new(0.0, f32::INFINITY, 0.0).is_finite());
    }
}
