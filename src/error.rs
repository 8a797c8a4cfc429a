//! Error handling module
//!
//! Defines custom error types for the Emberfall server.
//!
//! Lookup misses (unknown player, entity, table or message id) are not
//! errors: those are reported as `Option`/`bool` results by the services.
//! The types here cover genuine failures - persistence, configuration,
//! serialization - that a caller has to recover from explicitly.

use std::io;

use thiserror::Error;

/// Main error type for the Emberfall server
#[derive(Error, Debug)]
pub enum EmberfallError {
    /// Game logic errors
    #[error("Game error: {0}")]
    Game(#[from] GameError),

    /// Persistence errors
    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Game logic errors
#[derive(Error, Debug)]
pub enum GameError {
    #[error("Player not found: {0}")]
    PlayerNotFound(uuid::Uuid),

    #[error("NPC not found: {0}")]
    NpcNotFound(u64),

    #[error("Unknown NPC type: {0}")]
    UnknownNpcType(String),

    #[error("Loot table not found: {0}")]
    LootTableNotFound(String),

    #[error("Invalid quantity: {0}")]
    InvalidQuantity(i64),

    #[error("Invalid resource value for {key}: {value}")]
    InvalidResourceValue { key: String, value: i64 },

    #[error("Invalid action: {0}")]
    InvalidAction(String),
}

/// Persistence-specific errors
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Corrupt record for key {key}: {reason}")]
    CorruptRecord { key: String, reason: String },

    #[error("Backend unavailable")]
    Unavailable,
}

/// Result type alias for Emberfall operations
pub type Result<T> = std::result::Result<T, EmberfallError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = GameError::NpcNotFound(42);
        assert_eq!(err.to_string(), "NPC not found: 42");

        let err = GameError::LootTableNotFound("forest_wolf".to_string());
        assert_eq!(err.to_string(), "Loot table not found: forest_wolf");

        let err = PersistenceError::CorruptRecord {
            key: "Player_abc".to_string(),
            reason: "truncated".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Corrupt record for key Player_abc: truncated"
        );
    }

    #[test]
    fn test_error_conversion() {
        let game: EmberfallError = GameError::InvalidQuantity(-5).into();
        assert!(matches!(game, EmberfallError::Game(_)));

        let persistence: EmberfallError = PersistenceError::Unavailable.into();
        assert!(matches!(persistence, EmberfallError::Persistence(_)));
    }
}
