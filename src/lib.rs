//! Emberfall Game Server Library
//!
//! This library provides the server-side game-state services for an
//! Emberfall world: event dispatch, loot generation, per-player
//! resources, timed world entities and durable player profiles.
//!
//! ## Modules
//!
//! - `config` - Server configuration management
//! - `error` - Error types and result definitions
//! - `events` - Synchronous in-process event bus
//! - `game` - Game-state services (loot, resources, profiles, combat)
//! - `state` - Application state wiring and player session orchestration

pub mod config;
pub mod error;
pub mod events;
pub mod game;
pub mod state;

// Re-export commonly used types
pub use config::ServerConfig;
pub use error::{EmberfallError, Result};
pub use events::{EventBus, EventTopic, GameEvent};
pub use state::AppState;

/// Server version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
