//! Event bus module
//!
//! Synchronous publish/subscribe hub connecting the game services:
//! - Closed set of typed event variants (no string topics, no blind casts)
//! - Dispatch in subscription order, completing before `publish` returns
//! - A faulting handler is logged and skipped; the rest still run
//! - Bounded ring buffer of recent events for introspection/replay

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tracing::{debug, trace, warn};

use crate::game::{NpcId, PlayerId};

/// Default number of events retained in the history ring buffer
pub const DEFAULT_HISTORY_CAPACITY: usize = 1000;

/// Topic tags for the closed event set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EventTopic {
    PlayerLevelUp,
    NpcDefeated,
    ResourceChanged,
    ResourceDepleted,
    ResourceLow,
    LootSpawned,
    LootExpired,
}

/// Game events carried over the bus
#[derive(Debug, Clone, Serialize)]
pub enum GameEvent {
    /// A player reached a new level
    PlayerLevelUp { player_id: PlayerId, new_level: u32 },
    /// An NPC was killed by a player
    NpcDefeated { npc_id: NpcId, player_id: PlayerId },
    /// A player resource changed value
    ResourceChanged {
        player_id: PlayerId,
        resource: String,
        new_value: i64,
        max: i64,
        percentage: f64,
    },
    /// A player resource hit zero
    ResourceDepleted { player_id: PlayerId, resource: String },
    /// A player resource is at or below the low-water ratio
    ResourceLow {
        player_id: PlayerId,
        resource: String,
        percentage: f64,
    },
    /// A loot drop entered the world
    LootSpawned {
        drop_id: u64,
        item_id: String,
        quantity: u32,
    },
    /// A loot drop expired without being collected
    LootExpired { drop_id: u64 },
}

impl GameEvent {
    /// Get the topic tag for this event
    pub fn topic(&self) -> EventTopic {
        match self {
            GameEvent::PlayerLevelUp { .. } => EventTopic::PlayerLevelUp,
            GameEvent::NpcDefeated { .. } => EventTopic::NpcDefeated,
            GameEvent::ResourceChanged { .. } => EventTopic::ResourceChanged,
            GameEvent::ResourceDepleted { .. } => EventTopic::ResourceDepleted,
            GameEvent::ResourceLow { .. } => EventTopic::ResourceLow,
            GameEvent::LootSpawned { .. } => EventTopic::LootSpawned,
            GameEvent::LootExpired { .. } => EventTopic::LootExpired,
        }
    }
}

/// A recorded event in the history ring buffer
#[derive(Debug, Clone)]
pub struct EventRecord {
    pub topic: EventTopic,
    pub event: GameEvent,
    pub timestamp: DateTime<Utc>,
}

/// Token returned by `subscribe`, used to unsubscribe later
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionToken(u64);

/// Handler invoked for each published event on a subscribed topic
pub type EventHandler = Arc<dyn Fn(&GameEvent) -> anyhow::Result<()> + Send + Sync>;

struct Subscriber {
    token: SubscriptionToken,
    handler: EventHandler,
}

/// Synchronous publish/subscribe hub with bounded history
pub struct EventBus {
    /// Subscribers per topic, in subscription order
    subscribers: RwLock<HashMap<EventTopic, Vec<Subscriber>>>,
    /// Ring buffer of the most recent published events
    history: Mutex<VecDeque<EventRecord>>,
    /// Maximum history entries before the oldest is evicted
    history_capacity: usize,
    /// Next subscription token to assign
    next_token: AtomicU64,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl EventBus {
    /// Create a new event bus retaining up to `history_capacity` events
    pub fn new(history_capacity: usize) -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            history: Mutex::new(VecDeque::with_capacity(history_capacity.min(1024))),
            history_capacity,
            next_token: AtomicU64::new(1),
        }
    }

    /// Subscribe a handler to a topic
    pub fn subscribe(&self, topic: EventTopic, handler: EventHandler) -> SubscriptionToken {
        let token = SubscriptionToken(self.next_token.fetch_add(1, Ordering::SeqCst));
        let mut subscribers = self.subscribers.write();
        subscribers
            .entry(topic)
            .or_default()
            .push(Subscriber { token, handler });

        trace!(?topic, token = token.0, "Subscribed event handler");
        token
    }

    /// Remove a subscription; returns false if the token was not found
    pub fn unsubscribe(&self, token: SubscriptionToken) -> bool {
        let mut subscribers = self.subscribers.write();
        for subs in subscribers.values_mut() {
            let before = subs.len();
            subs.retain(|s| s.token != token);
            if subs.len() < before {
                trace!(token = token.0, "Unsubscribed event handler");
                return true;
            }
        }
        false
    }

    /// Publish an event to all current subscribers of its topic.
    ///
    /// Dispatch is synchronous and in subscription order; it completes
    /// before this method returns. A handler error is logged and does not
    /// stop the remaining handlers. Publishing with no subscribers only
    /// records the event in the history buffer.
    pub fn publish(&self, event: GameEvent) {
        let topic = event.topic();

        // Record first so the history reflects publish order
        self.record(topic, &event);

        // Snapshot handlers so a handler can subscribe/unsubscribe without
        // deadlocking against the dispatch
        let handlers: Vec<EventHandler> = {
            let subscribers = self.subscribers.read();
            match subscribers.get(&topic) {
                Some(subs) => subs.iter().map(|s| Arc::clone(&s.handler)).collect(),
                None => Vec::new(),
            }
        };

        if handlers.is_empty() {
            trace!(?topic, "Published event with no subscribers");
            return;
        }

        for handler in &handlers {
            if let Err(e) = handler(&event) {
                warn!(?topic, error = %e, "Event handler failed; continuing dispatch");
            }
        }

        debug!(?topic, handlers = handlers.len(), "Published event");
    }

    /// Append to the bounded history ring
    fn record(&self, topic: EventTopic, event: &GameEvent) {
        let mut history = self.history.lock();
        if history.len() >= self.history_capacity {
            history.pop_front();
        }
        history.push_back(EventRecord {
            topic,
            event: event.clone(),
            timestamp: Utc::now(),
        });
    }

    /// Number of subscribers currently registered for a topic
    pub fn subscriber_count(&self, topic: EventTopic) -> usize {
        self.subscribers
            .read()
            .get(&topic)
            .map(|s| s.len())
            .unwrap_or(0)
    }

    /// Snapshot of the recorded history, oldest first
    pub fn history(&self) -> Vec<EventRecord> {
        self.history.lock().iter().cloned().collect()
    }

    /// Snapshot of the recorded history for a single topic, oldest first
    pub fn history_for(&self, topic: EventTopic) -> Vec<EventRecord> {
        self.history
            .lock()
            .iter()
            .filter(|r| r.topic == topic)
            .cloned()
            .collect()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("history_capacity", &self.history_capacity)
            .field("history_len", &self.history.lock().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn level_up(player_id: PlayerId, new_level: u32) -> GameEvent {
        GameEvent::PlayerLevelUp {
            player_id,
            new_level,
        }
    }

    #[test]
    fn test_publish_with_no_subscribers() {
        let bus = EventBus::default();
        // Must not panic or error
        bus.publish(level_up(PlayerId::new_v4(), 2));
        assert_eq!(bus.history().len(), 1);
    }

    #[test]
    fn test_dispatch_in_subscription_order() {
        let bus = EventBus::default();
        let order = Arc::new(Mutex::new(Vec::new()));

        for i in 0..3 {
            let order = Arc::clone(&order);
            bus.subscribe(
                EventTopic::PlayerLevelUp,
                Arc::new(move |_| {
                    order.lock().push(i);
                    Ok(())
                }),
            );
        }

        bus.publish(level_up(PlayerId::new_v4(), 5));
        assert_eq!(*order.lock(), vec![0, 1, 2]);
    }

    #[test]
    fn test_faulting_handler_does_not_stop_dispatch() {
        let bus = EventBus::default();
        let delivered = Arc::new(AtomicUsize::new(0));

        let d1 = Arc::clone(&delivered);
        bus.subscribe(
            EventTopic::PlayerLevelUp,
            Arc::new(move |_| {
                d1.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        );
        bus.subscribe(
            EventTopic::PlayerLevelUp,
            Arc::new(|_| anyhow::bail!("handler exploded")),
        );
        let d2 = Arc::clone(&delivered);
        bus.subscribe(
            EventTopic::PlayerLevelUp,
            Arc::new(move |_| {
                d2.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        );

        bus.publish(level_up(PlayerId::new_v4(), 3));
        assert_eq!(delivered.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_unsubscribe() {
        let bus = EventBus::default();
        let delivered = Arc::new(AtomicUsize::new(0));

        let d = Arc::clone(&delivered);
        let token = bus.subscribe(
            EventTopic::NpcDefeated,
            Arc::new(move |_| {
                d.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        );

        assert!(bus.unsubscribe(token));
        assert!(!bus.unsubscribe(token)); // Second removal reports failure

        bus.publish(GameEvent::NpcDefeated {
            npc_id: 1,
            player_id: PlayerId::new_v4(),
        });
        assert_eq!(delivered.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_subscriber_only_receives_its_topic() {
        let bus = EventBus::default();
        let delivered = Arc::new(AtomicUsize::new(0));

        let d = Arc::clone(&delivered);
        bus.subscribe(
            EventTopic::ResourceDepleted,
            Arc::new(move |_| {
                d.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        );

        bus.publish(level_up(PlayerId::new_v4(), 2));
        assert_eq!(delivered.load(Ordering::SeqCst), 0);

        bus.publish(GameEvent::ResourceDepleted {
            player_id: PlayerId::new_v4(),
            resource: "Health".to_string(),
        });
        assert_eq!(delivered.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_history_ring_evicts_oldest() {
        let bus = EventBus::new(3);
        let player = PlayerId::new_v4();

        for level in 1..=5 {
            bus.publish(level_up(player, level));
        }

        let history = bus.history();
        assert_eq!(history.len(), 3);
        // Oldest entries (levels 1 and 2) are gone
        match &history[0].event {
            GameEvent::PlayerLevelUp { new_level, .. } => assert_eq!(*new_level, 3),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_history_for_topic() {
        let bus = EventBus::default();
        let player = PlayerId::new_v4();

        bus.publish(level_up(player, 2));
        bus.publish(GameEvent::LootExpired { drop_id: 7 });
        bus.publish(level_up(player, 3));

        assert_eq!(bus.history_for(EventTopic::PlayerLevelUp).len(), 2);
        assert_eq!(bus.history_for(EventTopic::LootExpired).len(), 1);
        assert_eq!(bus.history_for(EventTopic::NpcDefeated).len(), 0);
    }
}
