//! Message queue module
//!
//! Time-boxed messages bound for remote clients:
//! - Direct (single recipient) or broadcast delivery through the transport
//!   collaborator
//! - Each message carries a 300 second lifetime; a 30 second background
//!   sweep drops everything past its expiry
//! - A separate bounded per-recipient history (capacity 50, FIFO) acts as
//!   an append-only audit log independent of queue expiry or cancellation

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::time::{interval, Duration as TokioDuration, MissedTickBehavior};
use tracing::{debug, info, trace};

use crate::game::timed::{TimedEntry, TimedStore};
use crate::game::PlayerId;

/// Default message lifetime in seconds
pub const MESSAGE_TTL_SECS: u64 = 300;

/// Default seconds between expiry sweeps
pub const MESSAGE_SWEEP_INTERVAL_SECS: u64 = 30;

/// Default per-recipient history capacity
pub const MESSAGE_HISTORY_CAPACITY: usize = 50;

/// Presentation tag on a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// A message queued for delivery
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedMessage {
    /// Recipient; `None` means broadcast to everyone
    pub recipient: Option<PlayerId>,
    pub title: String,
    pub content: String,
    pub severity: Severity,
}

impl QueuedMessage {
    /// Check if this is a broadcast message
    pub fn is_broadcast(&self) -> bool {
        self.recipient.is_none()
    }
}

/// A queued message snapshot with its lifetime stamps
pub type QueuedMessageEntry = TimedEntry<QueuedMessage>;

/// An entry in a recipient's delivery history
#[derive(Debug, Clone)]
pub struct MessageRecord {
    pub message_id: u64,
    pub title: String,
    pub severity: Severity,
    pub sent_at: DateTime<Utc>,
}

/// Transport collaborator delivering messages to remote clients
pub trait MessageTransport: Send + Sync {
    /// Hand a fully formed message over for delivery
    fn deliver(&self, id: u64, message: &QueuedMessage);
}

/// No-op transport used when no client transport is attached
#[derive(Debug, Default)]
pub struct NullTransport;

impl MessageTransport for NullTransport {
    fn deliver(&self, id: u64, message: &QueuedMessage) {
        trace!(
            id = id,
            broadcast = message.is_broadcast(),
            title = %message.title,
            "Null transport delivery"
        );
    }
}

/// Manages queued messages and per-recipient delivery history
pub struct MessageQueue {
    store: TimedStore<QueuedMessage>,
    /// Append-only audit log per recipient; survives queue expiry/removal
    history: DashMap<PlayerId, VecDeque<MessageRecord>>,
    history_capacity: usize,
    transport: Arc<dyn MessageTransport>,
    sweep_interval_secs: u64,
}

impl MessageQueue {
    /// Create a new message queue
    pub fn new(
        ttl_secs: u64,
        sweep_interval_secs: u64,
        history_capacity: usize,
        transport: Arc<dyn MessageTransport>,
    ) -> Self {
        Self {
            store: TimedStore::new(ttl_secs),
            history: DashMap::new(),
            history_capacity,
            transport,
            sweep_interval_secs,
        }
    }

    /// Queue a message for a single recipient; returns its id
    pub fn send(
        &self,
        recipient: PlayerId,
        title: impl Into<String>,
        content: impl Into<String>,
        severity: Severity,
    ) -> u64 {
        self.enqueue(QueuedMessage {
            recipient: Some(recipient),
            title: title.into(),
            content: content.into(),
            severity,
        })
    }

    /// Queue a broadcast message for every connected client; returns its id
    pub fn broadcast(
        &self,
        title: impl Into<String>,
        content: impl Into<String>,
        severity: Severity,
    ) -> u64 {
        self.enqueue(QueuedMessage {
            recipient: None,
            title: title.into(),
            content: content.into(),
            severity,
        })
    }

    fn enqueue(&self, message: QueuedMessage) -> u64 {
        let id = self.store.insert(message.clone());

        // Direct messages get an audit record; broadcasts have no single
        // recipient to attribute the record to
        if let Some(recipient) = message.recipient {
            self.record_history(recipient, id, &message);
        }

        self.transport.deliver(id, &message);

        debug!(
            id = id,
            broadcast = message.is_broadcast(),
            severity = ?message.severity,
            "Message queued"
        );
        id
    }

    fn record_history(&self, recipient: PlayerId, id: u64, message: &QueuedMessage) {
        let mut history = self.history.entry(recipient).or_default();
        if history.len() >= self.history_capacity {
            history.pop_front();
        }
        history.push_back(MessageRecord {
            message_id: id,
            title: message.title.clone(),
            severity: message.severity,
            sent_at: Utc::now(),
        });
    }

    /// Get a queued message by id
    pub fn get(&self, id: u64) -> Option<QueuedMessageEntry> {
        self.store.get(id)
    }

    /// Cancel a queued message. Idempotent: cancelling a missing id
    /// reports `false`, not an error.
    pub fn cancel(&self, id: u64) -> bool {
        let removed = self.store.remove(id).is_some();
        if removed {
            debug!(id = id, "Message cancelled");
        }
        removed
    }

    /// Snapshot of every live queued message
    pub fn list_all(&self) -> Vec<QueuedMessageEntry> {
        self.store.list()
    }

    /// Live queued messages visible to a player (direct plus broadcasts)
    pub fn list_for(&self, player_id: PlayerId) -> Vec<QueuedMessageEntry> {
        self.store
            .list_where(|e| e.payload.recipient.map_or(true, |r| r == player_id))
    }

    /// Delivery history for a recipient, oldest first
    pub fn history_for(&self, player_id: PlayerId) -> Vec<MessageRecord> {
        self.history
            .get(&player_id)
            .map(|h| h.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of live queued messages
    pub fn count(&self) -> usize {
        self.store.count()
    }

    /// Drop every message expired at `now`; returns how many were removed
    pub fn sweep_expired(&self, now: DateTime<Utc>) -> usize {
        let removed = self.store.sweep_expired(now);
        for entry in &removed {
            debug!(id = entry.id, title = %entry.payload.title, "Message expired");
        }
        removed.len()
    }

    /// Run the periodic expiry sweep until the shutdown signal arrives
    pub async fn run_sweeper(self: Arc<Self>, mut shutdown_rx: broadcast::Receiver<()>) {
        info!(
            interval_secs = self.sweep_interval_secs,
            "Starting message expiry sweeper"
        );

        let mut sweep = interval(TokioDuration::from_secs(self.sweep_interval_secs));
        sweep.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = sweep.tick() => {
                    let removed = self.sweep_expired(Utc::now());
                    if removed > 0 {
                        debug!(removed = removed, "Message sweep removed expired entries");
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Message expiry sweeper shutting down");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn queue() -> MessageQueue {
        MessageQueue::new(
            MESSAGE_TTL_SECS,
            MESSAGE_SWEEP_INTERVAL_SECS,
            MESSAGE_HISTORY_CAPACITY,
            Arc::new(NullTransport),
        )
    }

    #[test]
    fn test_send_and_get() {
        let queue = queue();
        let player = PlayerId::new_v4();
        let id = queue.send(player, "Welcome", "Hello adventurer", Severity::Info);

        let entry = queue.get(id).unwrap();
        assert_eq!(entry.payload.recipient, Some(player));
        assert_eq!(entry.payload.title, "Welcome");
        assert_eq!(entry.payload.severity, Severity::Info);
        assert!(entry.expires_at > entry.created_at);
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let queue = queue();
        let id = queue.broadcast("Maintenance", "Restart in 5 minutes", Severity::Warning);

        assert!(queue.cancel(id));
        assert!(!queue.cancel(id));
        assert!(!queue.cancel(9999));
    }

    #[test]
    fn test_list_for_includes_broadcasts() {
        let queue = queue();
        let p1 = PlayerId::new_v4();
        let p2 = PlayerId::new_v4();

        queue.send(p1, "Direct", "just for you", Severity::Info);
        queue.send(p2, "Other", "not for you", Severity::Info);
        queue.broadcast("Everyone", "world event", Severity::Info);

        let visible = queue.list_for(p1);
        assert_eq!(visible.len(), 2);
        assert_eq!(queue.list_all().len(), 3);
    }

    #[test]
    fn test_history_caps_at_capacity_fifo() {
        let queue = MessageQueue::new(300, 30, 50, Arc::new(NullTransport));
        let player = PlayerId::new_v4();

        for i in 0..51 {
            queue.send(player, format!("msg {i}"), "body", Severity::Info);
        }

        let history = queue.history_for(player);
        assert_eq!(history.len(), 50);
        // The oldest entry (msg 0) was evicted
        assert_eq!(history[0].title, "msg 1");
        assert_eq!(history[49].title, "msg 50");
    }

    #[test]
    fn test_history_survives_expiry_and_cancel() {
        let queue = queue();
        let player = PlayerId::new_v4();

        let cancelled = queue.send(player, "first", "body", Severity::Info);
        queue.send(player, "second", "body", Severity::Error);

        queue.cancel(cancelled);
        let removed = queue.sweep_expired(Utc::now() + Duration::seconds(301));
        assert_eq!(removed, 1);
        assert_eq!(queue.count(), 0);

        // Both messages remain in the audit log
        let history = queue.history_for(player);
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].title, "first");
        assert_eq!(history[1].severity, Severity::Error);
    }

    #[test]
    fn test_broadcast_not_recorded_in_history() {
        let queue = queue();
        let player = PlayerId::new_v4();

        queue.broadcast("Everyone", "world event", Severity::Info);
        assert!(queue.history_for(player).is_empty());
    }

    #[test]
    fn test_expiry_boundary() {
        let queue = queue();
        let player = PlayerId::new_v4();
        let id = queue.send(player, "timed", "body", Severity::Info);
        let created = queue.get(id).unwrap().created_at;

        assert_eq!(queue.sweep_expired(created + Duration::seconds(299)), 0);
        assert!(queue.get(id).is_some());

        assert_eq!(queue.sweep_expired(created + Duration::seconds(300)), 1);
        assert!(queue.get(id).is_none());
    }

    #[test]
    fn test_transport_receives_messages() {
        use parking_lot::Mutex;

        #[derive(Default)]
        struct RecordingTransport {
            delivered: Mutex<Vec<u64>>,
        }
        impl MessageTransport for RecordingTransport {
            fn deliver(&self, id: u64, _message: &QueuedMessage) {
                self.delivered.lock().push(id);
            }
        }

        let transport = Arc::new(RecordingTransport::default());
        let queue = MessageQueue::new(300, 30, 50, transport.clone());

        let a = queue.send(PlayerId::new_v4(), "a", "body", Severity::Info);
        let b = queue.broadcast("b", "body", Severity::Warning);

        assert_eq!(*transport.delivered.lock(), vec![a, b]);
    }
}
