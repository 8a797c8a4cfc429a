//! Loot drop module
//!
//! Time-boxed loot pickups in the world:
//! - Created when an NPC's loot resolves, collected by players
//! - Each drop carries a 60 second lifetime; a 10 second background sweep
//!   removes everything past its expiry
//! - Removal (collection or expiry) destroys the drop's visual through the
//!   world-representation collaborator
//! - Spatial queries are a linear scan with a Euclidean distance filter

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tokio::time::{interval, Duration as TokioDuration, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::events::{EventBus, GameEvent};
use crate::game::timed::{TimedEntry, TimedStore};
use crate::game::visual::{VisualHandle, WorldVisuals};
use crate::game::Position;

/// Default loot drop lifetime in seconds
pub const LOOT_TTL_SECS: u64 = 60;

/// Default seconds between expiry sweeps
pub const LOOT_SWEEP_INTERVAL_SECS: u64 = 10;

/// A loot pickup lying in the world
#[derive(Debug, Clone)]
pub struct LootDrop {
    pub item_id: String,
    pub quantity: u32,
    pub position: Position,
    /// Handle to the pickup's visual, absent if creation failed
    pub visual: Option<VisualHandle>,
}

/// A loot drop snapshot with its lifetime stamps
pub type LootDropEntry = TimedEntry<LootDrop>;

/// Manages all loot drops in the world
pub struct LootDropStore {
    store: TimedStore<LootDrop>,
    visuals: Arc<dyn WorldVisuals>,
    events: Arc<EventBus>,
    sweep_interval_secs: u64,
}

impl LootDropStore {
    /// Create a new loot drop store
    pub fn new(
        ttl_secs: u64,
        sweep_interval_secs: u64,
        visuals: Arc<dyn WorldVisuals>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            store: TimedStore::new(ttl_secs),
            visuals,
            events,
            sweep_interval_secs,
        }
    }

    /// Create a drop in the world; returns its id, or `None` for a zero
    /// quantity.
    ///
    /// Visual creation faults are caught and logged - the drop still exists
    /// without a handle rather than crashing the service.
    pub fn create(&self, item_id: impl Into<String>, quantity: u32, position: Position) -> Option<u64> {
        if quantity == 0 {
            return None;
        }
        let item_id = item_id.into();

        let visual = match self.visuals.spawn(&format!("loot_{item_id}"), position) {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!(item_id = %item_id, error = %e, "Failed to create loot visual");
                None
            }
        };

        let id = self.store.insert(LootDrop {
            item_id: item_id.clone(),
            quantity,
            position,
            visual,
        });

        debug!(id = id, item_id = %item_id, quantity = quantity, position = %position, "Loot drop created");
        self.events.publish(GameEvent::LootSpawned {
            drop_id: id,
            item_id,
            quantity,
        });

        Some(id)
    }

    /// Get a drop by id
    pub fn get(&self, id: u64) -> Option<LootDropEntry> {
        self.store.get(id)
    }

    /// Collect a drop, removing it from the world; returns its item and
    /// quantity. Collecting a missing id reports `None`, not an error.
    pub fn collect(&self, id: u64) -> Option<(String, u32)> {
        let entry = self.store.remove(id)?;
        if let Some(handle) = entry.payload.visual {
            self.visuals.destroy(handle);
        }

        info!(id = id, item_id = %entry.payload.item_id, quantity = entry.payload.quantity, "Loot drop collected");
        Some((entry.payload.item_id, entry.payload.quantity))
    }

    /// All drops within `radius` of `position` (linear scan)
    pub fn list_near(&self, position: Position, radius: f32) -> Vec<LootDropEntry> {
        self.store
            .list_where(|e| e.payload.position.within_radius(&position, radius))
    }

    /// Snapshot of every live drop
    pub fn list_all(&self) -> Vec<LootDropEntry> {
        self.store.list()
    }

    /// Number of live drops
    pub fn count(&self) -> usize {
        self.store.count()
    }

    /// Remove every drop expired at `now`, destroying visuals and
    /// publishing expiry events; returns how many were removed
    pub fn sweep_expired(&self, now: DateTime<Utc>) -> usize {
        let removed = self.store.sweep_expired(now);
        for entry in &removed {
            if let Some(handle) = entry.payload.visual {
                self.visuals.destroy(handle);
            }
            self.events.publish(GameEvent::LootExpired { drop_id: entry.id });
            debug!(id = entry.id, item_id = %entry.payload.item_id, "Loot drop expired");
        }
        removed.len()
    }

    /// Run the periodic expiry sweep until the shutdown signal arrives
    pub async fn run_sweeper(self: Arc<Self>, mut shutdown_rx: broadcast::Receiver<()>) {
        info!(
            interval_secs = self.sweep_interval_secs,
            "Starting loot expiry sweeper"
        );

        let mut sweep = interval(TokioDuration::from_secs(self.sweep_interval_secs));
        sweep.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = sweep.tick() => {
                    let removed = self.sweep_expired(Utc::now());
                    if removed > 0 {
                        debug!(removed = removed, "Loot sweep removed expired drops");
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Loot expiry sweeper shutting down");
                    break;
                }
            }
        }
    }
}
