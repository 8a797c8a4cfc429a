//! Combat module
//!
//! Damage resolution and NPC death orchestration. A kill resolves the
//! NPC's loot table, deposits the drops at its last known position and
//! schedules a one-shot corpse removal after a fixed delay.

use std::sync::Arc;

use rand::Rng;
use tokio::time::{sleep, Duration};
use tracing::{debug, info, warn};

use crate::error::{GameError, Result};
use crate::events::{EventBus, GameEvent};
use crate::game::loot_drop::LootDropStore;
use crate::game::loot_table::{self, LootTableRegistry};
use crate::game::npc::NpcManager;
use crate::game::{NpcId, PlayerId};

/// Default seconds before a defeated NPC's corpse is removed
pub const CORPSE_DESPAWN_SECS: u64 = 5;

/// Damage dealt by an attack; always at least 1 so a hit is never free
pub fn calculate_damage(attack: i64, defense: i64) -> i64 {
    (attack - defense).max(1)
}

/// Bernoulli hit trial, true with probability `accuracy`
pub fn check_hit(accuracy: f64, rng: &mut impl Rng) -> bool {
    rng.gen::<f64>() < accuracy
}

/// Outcome of a player's attack on an NPC
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttackOutcome {
    pub hit: bool,
    pub damage: i64,
    pub remaining_health: i64,
    pub defeated: bool,
    /// Ids of the loot drops deposited on a kill
    pub drop_ids: Vec<u64>,
    /// Experience granted on a kill
    pub experience: i64,
}

impl AttackOutcome {
    fn miss(remaining_health: i64) -> Self {
        Self {
            hit: false,
            damage: 0,
            remaining_health,
            defeated: false,
            drop_ids: Vec::new(),
            experience: 0,
        }
    }
}

/// Resolves attacks and orchestrates NPC death
pub struct CombatSystem {
    npcs: Arc<NpcManager>,
    loot_tables: Arc<LootTableRegistry>,
    drops: Arc<LootDropStore>,
    events: Arc<EventBus>,
    corpse_despawn_secs: u64,
}

impl CombatSystem {
    /// Create a new combat system
    pub fn new(
        npcs: Arc<NpcManager>,
        loot_tables: Arc<LootTableRegistry>,
        drops: Arc<LootDropStore>,
        events: Arc<EventBus>,
        corpse_despawn_secs: u64,
    ) -> Self {
        Self {
            npcs,
            loot_tables,
            drops,
            events,
            corpse_despawn_secs,
        }
    }

    /// Resolve a player's attack against an NPC.
    ///
    /// On a kill: the NPC is marked dead, `NpcDefeated` is published, its
    /// loot table resolves into drops at the NPC's last known position,
    /// and a one-shot corpse removal is scheduled after the configured
    /// delay.
    pub fn attack_npc(
        &self,
        player_id: PlayerId,
        npc_id: NpcId,
        attack: i64,
        accuracy: f64,
        rng: &mut impl Rng,
    ) -> Result<AttackOutcome> {
        let npc = self.npcs.get(npc_id).ok_or(GameError::NpcNotFound(npc_id))?;
        if !npc.alive {
            return Err(GameError::InvalidAction("target is already dead".to_string()).into());
        }

        if !check_hit(accuracy, rng) {
            debug!(player = %player_id, npc = npc_id, "Attack missed");
            return Ok(AttackOutcome::miss(npc.health));
        }

        let damage = calculate_damage(attack, npc.defense);
        let outcome = self
            .npcs
            .apply_damage(npc_id, damage)
            .ok_or(GameError::NpcNotFound(npc_id))?;

        debug!(
            player = %player_id,
            npc = npc_id,
            damage = damage,
            remaining = outcome.remaining_health,
            "Attack landed"
        );

        let mut drop_ids = Vec::new();
        let mut experience = 0;
        if outcome.died {
            info!(player = %player_id, npc = npc_id, type_key = %npc.type_key, "NPC defeated");
            self.events.publish(GameEvent::NpcDefeated { npc_id, player_id });

            drop_ids = self.deposit_loot(&npc, rng);
            experience = npc.experience_reward;
            self.schedule_corpse_despawn(npc_id);
        }

        Ok(AttackOutcome {
            hit: true,
            damage,
            remaining_health: outcome.remaining_health,
            defeated: outcome.died,
            drop_ids,
            experience,
        })
    }

    /// Resolve the NPC's loot table into drops at its position
    fn deposit_loot(&self, npc: &crate::game::npc::SpawnedNpc, rng: &mut impl Rng) -> Vec<u64> {
        let Some(table_name) = npc.loot_table.as_deref() else {
            return Vec::new();
        };
        let Some(table) = self.loot_tables.get(table_name) else {
            warn!(npc = npc.id, table = table_name, "NPC references a missing loot table");
            return Vec::new();
        };

        let loot = loot_table::generate(&table, 1.0, rng);
        loot.stacks
            .iter()
            .filter_map(|stack| self.drops.create(&stack.item_id, stack.quantity, npc.position))
            .collect()
    }

    /// One-shot deferred corpse removal, distinct from the recurring
    /// expiry sweeps
    fn schedule_corpse_despawn(&self, npc_id: NpcId) {
        let npcs = self.npcs.clone();
        let delay = self.corpse_despawn_secs;
        tokio::spawn(async move {
            sleep(Duration::from_secs(delay)).await;
            if npcs.despawn(npc_id) {
                debug!(npc = npc_id, "Corpse removed");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::visual::NullVisuals;
    use crate::game::Position;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    struct Harness {
        combat: CombatSystem,
        npcs: Arc<NpcManager>,
        drops: Arc<LootDropStore>,
        events: Arc<EventBus>,
    }

    fn harness() -> Harness {
        let visuals = Arc::new(NullVisuals::default());
        let events = Arc::new(EventBus::default());
        let npcs = Arc::new(NpcManager::with_builtin_definitions(visuals.clone()));
        let drops = Arc::new(LootDropStore::new(60, 10, visuals, events.clone()));
        let loot_tables = Arc::new(LootTableRegistry::with_builtin_tables());
        let combat = CombatSystem::new(
            npcs.clone(),
            loot_tables,
            drops.clone(),
            events.clone(),
            CORPSE_DESPAWN_SECS,
        );
        Harness {
            combat,
            npcs,
            drops,
            events,
        }
    }

    #[test]
    fn test_damage_formula_floors_at_one() {
        assert_eq!(calculate_damage(10, 3), 7);
        assert_eq!(calculate_damage(5, 5), 1);
        assert_eq!(calculate_damage(1, 100), 1);
    }

    #[test]
    fn test_check_hit_extremes() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..100 {
            assert!(check_hit(1.0, &mut rng));
            assert!(!check_hit(0.0, &mut rng));
        }
    }

    #[tokio::test]
    async fn test_attack_miss_leaves_npc_untouched() {
        let h = harness();
        let npc_id = h.npcs.spawn("forest_wolf", Position::default()).unwrap();
        let mut rng = StdRng::seed_from_u64(1);

        let outcome = h
            .combat
            .attack_npc(PlayerId::new_v4(), npc_id, 10, 0.0, &mut rng)
            .unwrap();
        assert!(!outcome.hit);
        assert_eq!(outcome.damage, 0);
        assert_eq!(h.npcs.get(npc_id).unwrap().health, 40);
    }

    #[tokio::test]
    async fn test_attack_whittles_health() {
        let h = harness();
        let npc_id = h.npcs.spawn("forest_wolf", Position::default()).unwrap();
        let mut rng = StdRng::seed_from_u64(1);

        // attack 12 vs defense 2 lands 10 per hit
        let outcome = h
            .combat
            .attack_npc(PlayerId::new_v4(), npc_id, 12, 1.0, &mut rng)
            .unwrap();
        assert!(outcome.hit);
        assert_eq!(outcome.damage, 10);
        assert_eq!(outcome.remaining_health, 30);
        assert!(!outcome.defeated);
        assert!(outcome.drop_ids.is_empty());
    }

    #[tokio::test]
    async fn test_kill_publishes_and_deposits_loot() {
        let h = harness();
        let position = Position::new(12.0, 0.0, -4.0);
        let npc_id = h.npcs.spawn("forest_wolf", position).unwrap();
        let player = PlayerId::new_v4();
        let mut rng = StdRng::seed_from_u64(7);

        let outcome = h
            .combat
            .attack_npc(player, npc_id, 1000, 1.0, &mut rng)
            .unwrap();
        assert!(outcome.defeated);
        assert_eq!(outcome.remaining_health, 0);
        assert_eq!(outcome.experience, 25);

        // forest_wolf guarantees a wolf_pelt, so at least one drop lands
        assert!(!outcome.drop_ids.is_empty());
        for id in &outcome.drop_ids {
            let entry = h.drops.get(*id).unwrap();
            assert_eq!(entry.payload.position, position);
        }

        let defeated = h.events.history_for(crate::events::EventTopic::NpcDefeated);
        assert_eq!(defeated.len(), 1);
        match &defeated[0].event {
            GameEvent::NpcDefeated {
                npc_id: event_npc,
                player_id,
            } => {
                assert_eq!(*event_npc, npc_id);
                assert_eq!(*player_id, player);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_attacking_corpse_rejected() {
        let h = harness();
        let npc_id = h.npcs.spawn("forest_wolf", Position::default()).unwrap();
        let mut rng = StdRng::seed_from_u64(3);

        h.combat
            .attack_npc(PlayerId::new_v4(), npc_id, 1000, 1.0, &mut rng)
            .unwrap();
        assert!(h
            .combat
            .attack_npc(PlayerId::new_v4(), npc_id, 10, 1.0, &mut rng)
            .is_err());
    }

    #[tokio::test]
    async fn test_attack_missing_npc_rejected() {
        let h = harness();
        let mut rng = StdRng::seed_from_u64(3);
        assert!(h
            .combat
            .attack_npc(PlayerId::new_v4(), 9999, 10, 1.0, &mut rng)
            .is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_corpse_despawns_after_delay() {
        let h = harness();
        let npc_id = h.npcs.spawn("forest_wolf", Position::default()).unwrap();
        let mut rng = StdRng::seed_from_u64(9);

        h.combat
            .attack_npc(PlayerId::new_v4(), npc_id, 1000, 1.0, &mut rng)
            .unwrap();

        // Corpse lingers until the one-shot delay elapses
        assert!(h.npcs.get(npc_id).is_some());
        tokio::time::sleep(Duration::from_secs(CORPSE_DESPAWN_SECS + 1)).await;
        tokio::task::yield_now().await;
        assert!(h.npcs.get(npc_id).is_none());
    }
}
