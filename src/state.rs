//! Application state module
//!
//! Wires the game-state services together and owns the shutdown channel
//! the background sweepers listen on. Player join/leave orchestration
//! lives here because it crosses several services.

use std::sync::Arc;

use dashmap::DashMap;
use sqlx::postgres::PgPool;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::events::EventBus;
use crate::game::combat::CombatSystem;
use crate::game::loot_drop::LootDropStore;
use crate::game::loot_table::LootTableRegistry;
use crate::game::message::{MessageQueue, MessageTransport, NullTransport, Severity};
use crate::game::npc::NpcManager;
use crate::game::persistence::{MemoryStore, PersistenceBackend, PostgresStore};
use crate::game::profile::{PlayerProfile, ProfileStore};
use crate::game::resource::{ResourceDefault, ResourceLedger};
use crate::game::validation;
use crate::game::visual::{NullVisuals, WorldVisuals};
use crate::game::PlayerId;

/// Shared application state for the whole server
pub struct AppState {
    pub config: ServerConfig,
    pub events: Arc<EventBus>,
    pub loot_tables: Arc<LootTableRegistry>,
    pub resources: Arc<ResourceLedger>,
    pub loot_drops: Arc<LootDropStore>,
    pub messages: Arc<MessageQueue>,
    pub profiles: Arc<ProfileStore>,
    pub npcs: Arc<NpcManager>,
    pub combat: Arc<CombatSystem>,
    /// Players currently online, by display name
    online: DashMap<PlayerId, String>,
    /// Broadcast channel the background sweepers listen on for shutdown
    pub shutdown_tx: broadcast::Sender<()>,
}

impl AppState {
    /// Create application state with in-memory persistence and no engine
    /// runtime attached (tests, headless runs)
    pub fn new(config: ServerConfig) -> Self {
        Self::with_collaborators(
            config,
            Arc::new(MemoryStore::new()),
            Arc::new(NullVisuals::default()),
            Arc::new(NullTransport),
        )
    }

    /// Create application state persisting to PostgreSQL
    pub fn with_persistence(config: ServerConfig, pool: PgPool) -> Self {
        Self::with_collaborators(
            config,
            Arc::new(PostgresStore::new(pool)),
            Arc::new(NullVisuals::default()),
            Arc::new(NullTransport),
        )
    }

    /// Create application state over explicit collaborators
    pub fn with_collaborators(
        config: ServerConfig,
        backend: Arc<dyn PersistenceBackend>,
        visuals: Arc<dyn WorldVisuals>,
        transport: Arc<dyn MessageTransport>,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(4);
        let events = Arc::new(EventBus::new(config.events.history_capacity));

        let resources = Arc::new(ResourceLedger::new(
            vec![
                ResourceDefault {
                    key: "Health".to_string(),
                    max: config.resources.health,
                },
                ResourceDefault {
                    key: "Energy".to_string(),
                    max: config.resources.energy,
                },
                ResourceDefault {
                    key: "Mana".to_string(),
                    max: config.resources.mana,
                },
            ],
            config.resources.low_threshold,
            events.clone(),
        ));

        let loot_drops = Arc::new(LootDropStore::new(
            config.loot.ttl_secs,
            config.loot.sweep_interval_secs,
            visuals.clone(),
            events.clone(),
        ));

        let messages = Arc::new(MessageQueue::new(
            config.messages.ttl_secs,
            config.messages.sweep_interval_secs,
            config.messages.history_capacity,
            transport,
        ));

        let profiles = Arc::new(ProfileStore::new(
            backend,
            events.clone(),
            config.economy.starting_gold,
            config.economy.currency_ceiling,
        ));

        let loot_tables = Arc::new(LootTableRegistry::with_builtin_tables());
        let npcs = Arc::new(NpcManager::with_builtin_definitions(visuals));
        let combat = Arc::new(CombatSystem::new(
            npcs.clone(),
            loot_tables.clone(),
            loot_drops.clone(),
            events.clone(),
            config.loot.corpse_despawn_secs,
        ));

        Self {
            config,
            events,
            loot_tables,
            resources,
            loot_drops,
            messages,
            profiles,
            npcs,
            combat,
            online: DashMap::new(),
            shutdown_tx,
        }
    }

    /// Spawn the background expiry sweepers; each one stops when the
    /// shutdown channel fires
    pub fn spawn_sweepers(&self) {
        tokio::spawn(
            self.loot_drops
                .clone()
                .run_sweeper(self.shutdown_tx.subscribe()),
        );
        tokio::spawn(
            self.messages
                .clone()
                .run_sweeper(self.shutdown_tx.subscribe()),
        );
    }

    /// Bring a player online: validate the name, load (or default) the
    /// profile, seed resources and queue a welcome message.
    ///
    /// Returns `None` when the name is rejected or the profile fetch
    /// failed; a failed fetch is not replaced with a default profile.
    pub async fn handle_player_join(
        &self,
        player_id: PlayerId,
        name: &str,
    ) -> Option<PlayerProfile> {
        let verdict = validation::validate_player_name(name);
        if !verdict.valid {
            warn!(
                player = %player_id,
                name = name,
                reason = verdict.reason.as_deref().unwrap_or("unknown"),
                "Rejected player name on join"
            );
            return None;
        }

        let profile = self.profiles.load(player_id, name).await?;
        self.online.insert(player_id, name.to_string());
        self.resources.initialize(player_id);
        self.messages.send(
            player_id,
            "Welcome",
            format!("Welcome to {}!", self.config.server_name),
            Severity::Info,
        );

        info!(player = %player_id, name = name, level = profile.level, "Player joined");
        Some(profile)
    }

    /// Take a player offline: save the profile (logged on failure, no
    /// retry) and evict every piece of session state
    pub async fn handle_player_leave(&self, player_id: PlayerId) -> bool {
        self.online.remove(&player_id);
        let saved = self.profiles.unload(player_id).await;
        self.resources.cleanup(player_id);
        info!(player = %player_id, saved = saved, "Player left");
        saved
    }

    /// Number of players currently online
    pub fn online_count(&self) -> usize {
        self.online.len()
    }

    /// Save every online player's profile; used during shutdown
    pub async fn save_all(&self) -> usize {
        let player_ids: Vec<PlayerId> = self.online.iter().map(|e| *e.key()).collect();
        let mut saved = 0;
        for player_id in player_ids {
            if self.profiles.save(player_id).await {
                saved += 1;
            }
        }
        saved
    }

    /// Signal every background task to stop
    pub fn shutdown(&self) {
        info!("Broadcasting shutdown to background tasks");
        let _ = self.shutdown_tx.send(());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> AppState {
        AppState::new(ServerConfig::default())
    }

    #[tokio::test]
    async fn test_join_seeds_profile_resources_and_welcome() {
        let state = state();
        let player = PlayerId::new_v4();

        let profile = state.handle_player_join(player, "Arden").await.unwrap();
        assert_eq!(profile.level, 1);
        assert_eq!(state.resources.get(player, "Health"), Some(100));
        assert_eq!(state.resources.get(player, "Mana"), Some(50));

        let queued = state.messages.list_for(player);
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].payload.title, "Welcome");
    }

    #[tokio::test]
    async fn test_join_rejects_bad_name() {
        let state = state();
        let player = PlayerId::new_v4();

        assert!(state.handle_player_join(player, "ab").await.is_none());
        assert!(state.handle_player_join(player, "admin_guy").await.is_none());
        assert!(state.resources.get(player, "Health").is_none());
    }

    #[tokio::test]
    async fn test_leave_saves_and_evicts() {
        let state = state();
        let player = PlayerId::new_v4();

        state.handle_player_join(player, "Arden").await.unwrap();
        state.profiles.add_item(player, "wolf_pelt", 1);

        assert!(state.handle_player_leave(player).await);
        assert!(!state.profiles.is_cached(player));
        assert!(state.resources.get(player, "Health").is_none());

        // The save is durable: rejoining restores the mutated profile
        let profile = state.handle_player_join(player, "Arden").await.unwrap();
        assert_eq!(profile.inventory[0].item_id, "wolf_pelt");
    }

    #[tokio::test]
    async fn test_save_all_flushes_online_players() {
        let state = state();
        let a = PlayerId::new_v4();
        let b = PlayerId::new_v4();

        state.handle_player_join(a, "Arden").await.unwrap();
        state.handle_player_join(b, "Brynn").await.unwrap();
        assert_eq!(state.online_count(), 2);

        assert_eq!(state.save_all().await, 2);

        state.handle_player_leave(a).await;
        assert_eq!(state.online_count(), 1);
        assert_eq!(state.save_all().await, 1);
    }

    #[tokio::test]
    async fn test_shutdown_reaches_sweepers() {
        let state = state();
        let mut rx = state.shutdown_tx.subscribe();
        state.shutdown();
        assert!(rx.recv().await.is_ok());
    }
}
