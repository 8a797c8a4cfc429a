//! Player profile module
//!
//! Durable per-player records loaded on join and saved on leave:
//! - `load` distinguishes "new player" (default profile) from "fetch
//!   failed" (absent result, no default substitution)
//! - `save` rolls the elapsed session time into the profile's play-time
//!   accounting before writing; a failed write is logged, not retried
//! - Experience grants level the profile up and publish `PlayerLevelUp`

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::events::{EventBus, GameEvent};
use crate::game::persistence::PersistenceBackend;
use crate::game::validation;
use crate::game::PlayerId;

/// An item stack in a profile's inventory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryItem {
    pub item_id: String,
    pub quantity: u32,
}

/// Durable per-player record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerProfile {
    pub player_id: PlayerId,
    pub name: String,
    pub level: u32,
    pub experience: i64,
    /// Currency balances; every value stays >= 0
    pub currency: HashMap<String, i64>,
    pub inventory: Vec<InventoryItem>,
    pub settings: HashMap<String, String>,
    pub last_login: DateTime<Utc>,
    pub total_play_time_secs: u64,
}

impl PlayerProfile {
    /// Synthesize a fresh profile for a player never seen before
    pub fn new_default(player_id: PlayerId, name: impl Into<String>, starting_gold: i64) -> Self {
        let mut currency = HashMap::new();
        currency.insert("gold".to_string(), starting_gold);

        Self {
            player_id,
            name: name.into(),
            level: 1,
            experience: 0,
            currency,
            inventory: Vec::new(),
            settings: HashMap::new(),
            last_login: Utc::now(),
            total_play_time_secs: 0,
        }
    }

    /// Cumulative experience required to reach a level
    pub fn experience_for_level(level: u32) -> i64 {
        if level <= 1 {
            return 0;
        }
        let steps = (level - 1) as i64;
        100 * steps * steps
    }

    /// Balance of a currency (0 when never granted)
    pub fn balance(&self, currency: &str) -> i64 {
        self.currency.get(currency).copied().unwrap_or(0)
    }
}

/// Asynchronous load/save of player profiles with session-time accounting
pub struct ProfileStore {
    backend: Arc<dyn PersistenceBackend>,
    cache: DashMap<PlayerId, PlayerProfile>,
    /// Session-start clock readings, reset on every save
    sessions: DashMap<PlayerId, Instant>,
    events: Arc<EventBus>,
    starting_gold: i64,
    currency_ceiling: i64,
}

impl ProfileStore {
    /// Create a new profile store
    pub fn new(
        backend: Arc<dyn PersistenceBackend>,
        events: Arc<EventBus>,
        starting_gold: i64,
        currency_ceiling: i64,
    ) -> Self {
        Self {
            backend,
            cache: DashMap::new(),
            sessions: DashMap::new(),
            events,
            starting_gold,
            currency_ceiling,
        }
    }

    fn save_key(player_id: PlayerId) -> String {
        format!("Player_{player_id}")
    }

    /// Load a player's profile, caching it and starting the session clock.
    ///
    /// A missing record synthesizes a default profile (a new player); a
    /// backend failure returns `None` so the caller can tell the two
    /// apart and decide its own fallback.
    pub async fn load(&self, player_id: PlayerId, name: &str) -> Option<PlayerProfile> {
        let key = Self::save_key(player_id);

        let profile = match self.backend.get(&key).await {
            Ok(Some(value)) => match serde_json::from_value::<PlayerProfile>(value) {
                Ok(mut profile) => {
                    profile.last_login = Utc::now();
                    debug!(player = %player_id, level = profile.level, "Loaded player profile");
                    profile
                }
                Err(e) => {
                    error!(player = %player_id, error = %e, "Failed to deserialize player profile");
                    return None;
                }
            },
            Ok(None) => {
                info!(player = %player_id, name = name, "Creating default profile for new player");
                PlayerProfile::new_default(player_id, name, self.starting_gold)
            }
            Err(e) => {
                error!(player = %player_id, error = %e, "Failed to fetch player profile");
                return None;
            }
        };

        self.cache.insert(player_id, profile.clone());
        self.sessions.insert(player_id, Instant::now());
        Some(profile)
    }

    /// Get the cached profile for an online player
    pub fn get_cached(&self, player_id: PlayerId) -> Option<PlayerProfile> {
        self.cache.get(&player_id).map(|p| p.clone())
    }

    /// Check if a player's profile is cached
    pub fn is_cached(&self, player_id: PlayerId) -> bool {
        self.cache.contains_key(&player_id)
    }

    /// Save a cached profile back to persistence.
    ///
    /// Elapsed session time is rolled into `total_play_time_secs` and the
    /// session clock reset before the write. A write failure is logged and
    /// reported as `false`; there is no retry.
    pub async fn save(&self, player_id: PlayerId) -> bool {
        // Roll session time into the profile before persisting
        let profile = {
            let Some(mut profile) = self.cache.get_mut(&player_id) else {
                warn!(player = %player_id, "Save requested for player with no cached profile");
                return false;
            };
            if let Some(mut started) = self.sessions.get_mut(&player_id) {
                profile.total_play_time_secs += started.elapsed().as_secs();
                *started = Instant::now();
            }
            profile.clone()
        };

        let key = Self::save_key(player_id);
        let value = match serde_json::to_value(&profile) {
            Ok(value) => value,
            Err(e) => {
                error!(player = %player_id, error = %e, "Failed to serialize player profile");
                return false;
            }
        };

        match self.backend.set(&key, value).await {
            Ok(()) => {
                debug!(player = %player_id, play_time_secs = profile.total_play_time_secs, "Saved player profile");
                true
            }
            Err(e) => {
                error!(player = %player_id, error = %e, "Failed to save player profile");
                false
            }
        }
    }

    /// Evict a player's cached profile and session clock
    pub fn cleanup(&self, player_id: PlayerId) {
        self.cache.remove(&player_id);
        self.sessions.remove(&player_id);
        debug!(player = %player_id, "Evicted cached profile");
    }

    /// Save then evict; the eviction happens even when the save fails
    pub async fn unload(&self, player_id: PlayerId) -> bool {
        let saved = self.save(player_id).await;
        self.cleanup(player_id);
        saved
    }

    /// Grant experience; publishes `PlayerLevelUp` for every level gained
    /// and returns the new level when at least one was gained
    pub fn add_experience(&self, player_id: PlayerId, amount: i64) -> Option<u32> {
        if amount <= 0 {
            return None;
        }

        // The cache guard is dropped before publishing: a level-up handler
        // must be able to read this player's profile during dispatch
        let levels_gained = {
            let mut profile = self.cache.get_mut(&player_id)?;
            profile.experience += amount;

            let mut gained = Vec::new();
            while profile.experience >= PlayerProfile::experience_for_level(profile.level + 1) {
                profile.level += 1;
                gained.push(profile.level);
            }
            gained
        };

        let new_level = *levels_gained.last()?;
        for level in levels_gained {
            info!(player = %player_id, level = level, "Player leveled up");
            self.events.publish(GameEvent::PlayerLevelUp {
                player_id,
                new_level: level,
            });
        }

        Some(new_level)
    }

    /// Adjust a currency balance by `delta`. The transaction is validated
    /// against the current balance and the configured ceiling; an invalid
    /// transaction mutates nothing and returns `None`.
    pub fn adjust_currency(&self, player_id: PlayerId, currency: &str, delta: i64) -> Option<i64> {
        let mut profile = self.cache.get_mut(&player_id)?;
        let balance = profile.balance(currency);

        let check = validation::validate_currency_change(balance, delta, self.currency_ceiling);
        if !check.valid {
            warn!(
                player = %player_id,
                currency = currency,
                delta = delta,
                reason = check.reason.as_deref().unwrap_or("unknown"),
                "Rejected currency transaction"
            );
            return None;
        }

        let new_balance = balance + delta;
        profile.currency.insert(currency.to_string(), new_balance);
        Some(new_balance)
    }

    /// Add an item stack to a cached profile's inventory, merging with an
    /// existing stack of the same item
    pub fn add_item(&self, player_id: PlayerId, item_id: &str, quantity: u32) -> bool {
        if quantity == 0 {
            return false;
        }
        let Some(mut profile) = self.cache.get_mut(&player_id) else {
            return false;
        };

        if let Some(stack) = profile.inventory.iter_mut().find(|i| i.item_id == item_id) {
            stack.quantity += quantity;
        } else {
            profile.inventory.push(InventoryItem {
                item_id: item_id.to_string(),
                quantity,
            });
        }
        true
    }

    /// Remove up to `quantity` of an item; fails without mutating when the
    /// profile holds less than requested
    pub fn remove_item(&self, player_id: PlayerId, item_id: &str, quantity: u32) -> bool {
        let Some(mut profile) = self.cache.get_mut(&player_id) else {
            return false;
        };

        let Some(index) = profile.inventory.iter().position(|i| i.item_id == item_id) else {
            return false;
        };
        if profile.inventory[index].quantity < quantity {
            return false;
        }

        profile.inventory[index].quantity -= quantity;
        if profile.inventory[index].quantity == 0 {
            profile.inventory.remove(index);
        }
        true
    }

    /// Set a settings key on a cached profile
    pub fn update_setting(&self, player_id: PlayerId, key: &str, value: &str) -> bool {
        let Some(mut profile) = self.cache.get_mut(&player_id) else {
            return false;
        };
        profile.settings.insert(key.to_string(), value.to_string());
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventTopic;
    use crate::game::persistence::{BackendResult, MemoryStore};
    use async_trait::async_trait;

    fn store() -> (ProfileStore, Arc<EventBus>) {
        let events = Arc::new(EventBus::default());
        let store = ProfileStore::new(
            Arc::new(MemoryStore::new()),
            events.clone(),
            100,
            1_000_000_000,
        );
        (store, events)
    }

    #[tokio::test]
    async fn test_load_synthesizes_default_for_new_player() {
        let (store, _) = store();
        let player = PlayerId::new_v4();

        let profile = store.load(player, "Arden").await.unwrap();
        assert_eq!(profile.level, 1);
        assert_eq!(profile.experience, 0);
        assert_eq!(profile.balance("gold"), 100);
        assert!(profile.inventory.is_empty());
        assert!(store.is_cached(player));
    }

    #[tokio::test]
    async fn test_save_load_roundtrip() {
        let (store, _) = store();
        let player = PlayerId::new_v4();

        store.load(player, "Arden").await.unwrap();
        store.add_experience(player, 150);
        store.add_item(player, "wolf_pelt", 3);
        store.update_setting(player, "music", "off");
        assert!(store.save(player).await);
        store.cleanup(player);
        assert!(!store.is_cached(player));

        let profile = store.load(player, "Arden").await.unwrap();
        assert_eq!(profile.level, 2);
        assert_eq!(profile.experience, 150);
        assert_eq!(profile.inventory[0].quantity, 3);
        assert_eq!(profile.settings.get("music").map(String::as_str), Some("off"));
    }

    #[tokio::test]
    async fn test_fetch_failure_returns_absent_not_default() {
        struct FailingBackend;

        #[async_trait]
        impl PersistenceBackend for FailingBackend {
            async fn get(&self, _key: &str) -> BackendResult<Option<serde_json::Value>> {
                Err(crate::error::PersistenceError::Unavailable)
            }
            async fn set(&self, _key: &str, _value: serde_json::Value) -> BackendResult<()> {
                Err(crate::error::PersistenceError::Unavailable)
            }
        }

        let events = Arc::new(EventBus::default());
        let store = ProfileStore::new(Arc::new(FailingBackend), events, 100, 1_000_000_000);
        let player = PlayerId::new_v4();

        // A failed fetch must not be mistaken for a new player
        assert!(store.load(player, "Arden").await.is_none());
        assert!(!store.is_cached(player));
    }

    #[tokio::test]
    async fn test_save_failure_reported_not_escalated() {
        struct WriteFailBackend;

        #[async_trait]
        impl PersistenceBackend for WriteFailBackend {
            async fn get(&self, _key: &str) -> BackendResult<Option<serde_json::Value>> {
                Ok(None)
            }
            async fn set(&self, _key: &str, _value: serde_json::Value) -> BackendResult<()> {
                Err(crate::error::PersistenceError::Unavailable)
            }
        }

        let events = Arc::new(EventBus::default());
        let store = ProfileStore::new(Arc::new(WriteFailBackend), events, 100, 1_000_000_000);
        let player = PlayerId::new_v4();

        store.load(player, "Arden").await.unwrap();
        assert!(!store.save(player).await);

        // Unload still evicts after the failed save attempt
        assert!(!store.unload(player).await);
        assert!(!store.is_cached(player));
    }

    #[tokio::test]
    async fn test_experience_levels_and_publishes() {
        let (store, events) = store();
        let player = PlayerId::new_v4();
        store.load(player, "Arden").await.unwrap();

        // 100 xp reaches level 2, 400 reaches level 3
        assert_eq!(store.add_experience(player, 450), Some(3));

        let level_ups = events.history_for(EventTopic::PlayerLevelUp);
        assert_eq!(level_ups.len(), 2);
        match &level_ups[1].event {
            GameEvent::PlayerLevelUp { new_level, .. } => assert_eq!(*new_level, 3),
            other => panic!("unexpected event: {:?}", other),
        }

        // Not enough for the next level: no further event
        assert_eq!(store.add_experience(player, 10), None);
        assert_eq!(events.history_for(EventTopic::PlayerLevelUp).len(), 2);
    }

    #[tokio::test]
    async fn test_level_up_handler_can_read_profile() {
        let events = Arc::new(EventBus::default());
        let store = Arc::new(ProfileStore::new(
            Arc::new(MemoryStore::new()),
            events.clone(),
            100,
            1_000_000_000,
        ));
        let player = PlayerId::new_v4();
        store.load(player, "Arden").await.unwrap();

        // A subscriber reading the leveling player's own profile must not
        // block the dispatch
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let handler_store = store.clone();
        let handler_seen = seen.clone();
        events.subscribe(
            EventTopic::PlayerLevelUp,
            Arc::new(move |event| {
                if let GameEvent::PlayerLevelUp {
                    player_id,
                    new_level,
                } = event
                {
                    let profile = handler_store
                        .get_cached(*player_id)
                        .expect("profile readable during dispatch");
                    handler_seen.lock().push((*new_level, profile.level));
                }
                Ok(())
            }),
        );

        assert_eq!(store.add_experience(player, 450), Some(3));

        let seen = seen.lock();
        assert_eq!(seen.len(), 2);
        // The mutation is complete before dispatch starts
        assert!(seen.iter().all(|(_, cached)| *cached == 3));
    }

    #[tokio::test]
    async fn test_currency_invariants() {
        let (store, _) = store();
        let player = PlayerId::new_v4();
        store.load(player, "Arden").await.unwrap();

        // Debit beyond the balance rejected, nothing mutated
        assert!(store.adjust_currency(player, "gold", -101).is_none());
        assert_eq!(store.get_cached(player).unwrap().balance("gold"), 100);

        assert_eq!(store.adjust_currency(player, "gold", -100), Some(0));
        assert_eq!(store.adjust_currency(player, "gold", 50), Some(50));

        // Ceiling enforced
        let events = Arc::new(EventBus::default());
        let capped = ProfileStore::new(Arc::new(MemoryStore::new()), events, 100, 120);
        capped.load(player, "Arden").await.unwrap();
        assert!(capped.adjust_currency(player, "gold", 21).is_none());
        assert_eq!(capped.adjust_currency(player, "gold", 20), Some(120));
    }

    #[tokio::test]
    async fn test_inventory_helpers() {
        let (store, _) = store();
        let player = PlayerId::new_v4();
        store.load(player, "Arden").await.unwrap();

        assert!(store.add_item(player, "arrow", 10));
        assert!(store.add_item(player, "arrow", 5));
        assert!(!store.add_item(player, "arrow", 0));

        let profile = store.get_cached(player).unwrap();
        assert_eq!(profile.inventory.len(), 1);
        assert_eq!(profile.inventory[0].quantity, 15);

        assert!(!store.remove_item(player, "arrow", 16));
        assert!(store.remove_item(player, "arrow", 15));
        assert!(store.get_cached(player).unwrap().inventory.is_empty());
    }

    #[test]
    fn test_experience_curve() {
        assert_eq!(PlayerProfile::experience_for_level(1), 0);
        assert_eq!(PlayerProfile::experience_for_level(2), 100);
        assert_eq!(PlayerProfile::experience_for_level(3), 400);
        assert_eq!(PlayerProfile::experience_for_level(5), 1600);
    }
}
