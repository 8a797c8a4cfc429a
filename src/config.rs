//! Server configuration module
//!
//! Handles loading and parsing of server configuration from files and
//! environment variables.

use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Path to the configuration file
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Server name displayed to players
    #[serde(default = "default_server_name")]
    pub server_name: String,

    /// World ID (1-255)
    #[serde(default = "default_world_id")]
    pub world_id: u8,

    /// Loot drop lifetime settings
    #[serde(default)]
    pub loot: LootConfig,

    /// Queued message settings
    #[serde(default)]
    pub messages: MessageConfig,

    /// Per-player resource defaults
    #[serde(default)]
    pub resources: ResourceConfig,

    /// Economy limits and starting currency
    #[serde(default)]
    pub economy: EconomyConfig,

    /// Event bus settings
    #[serde(default)]
    pub events: EventConfig,

    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Enable debug logging
    #[serde(default)]
    pub debug: bool,
}

/// Loot drop settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LootConfig {
    /// Seconds a loot drop stays in the world before expiring
    #[serde(default = "default_loot_ttl")]
    pub ttl_secs: u64,

    /// Seconds between expiry sweeps
    #[serde(default = "default_loot_sweep")]
    pub sweep_interval_secs: u64,

    /// Seconds a dead NPC lingers before its entity is removed
    #[serde(default = "default_corpse_despawn")]
    pub corpse_despawn_secs: u64,
}

/// Queued message settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageConfig {
    /// Seconds a queued message stays deliverable
    #[serde(default = "default_message_ttl")]
    pub ttl_secs: u64,

    /// Seconds between expiry sweeps
    #[serde(default = "default_message_sweep")]
    pub sweep_interval_secs: u64,

    /// Maximum history entries kept per recipient
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
}

/// Per-player resource defaults seeded on join
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceConfig {
    /// Starting/maximum health
    #[serde(default = "default_health")]
    pub health: i64,

    /// Starting/maximum energy
    #[serde(default = "default_energy")]
    pub energy: i64,

    /// Starting/maximum mana
    #[serde(default = "default_mana")]
    pub mana: i64,

    /// Ratio at or below which a resource counts as low
    #[serde(default = "default_low_threshold")]
    pub low_threshold: f64,
}

/// Economy limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EconomyConfig {
    /// Hard ceiling on any single currency balance
    #[serde(default = "default_currency_ceiling")]
    pub currency_ceiling: i64,

    /// Gold granted to a freshly created profile
    #[serde(default = "default_starting_gold")]
    pub starting_gold: i64,
}

/// Event bus settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventConfig {
    /// Number of recent events retained for introspection
    #[serde(default = "default_event_history")]
    pub history_capacity: usize,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database host
    #[serde(default = "default_db_host")]
    pub host: String,

    /// Database port
    #[serde(default = "default_db_port")]
    pub port: u16,

    /// Database name
    #[serde(default = "default_db_name")]
    pub database: String,

    /// Database username
    #[serde(default = "default_db_user")]
    pub username: String,

    /// Database password
    #[serde(default)]
    pub password: String,

    /// Maximum connection pool size
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
}

// Default value functions
fn default_server_name() -> String {
    "Emberfall".to_string()
}

fn default_world_id() -> u8 {
    1
}

fn default_loot_ttl() -> u64 {
    60
}

fn default_loot_sweep() -> u64 {
    10
}

fn default_corpse_despawn() -> u64 {
    5
}

fn default_message_ttl() -> u64 {
    300
}

fn default_message_sweep() -> u64 {
    30
}

fn default_history_capacity() -> usize {
    50
}

fn default_health() -> i64 {
    100
}

fn default_energy() -> i64 {
    100
}

fn default_mana() -> i64 {
    50
}

fn default_low_threshold() -> f64 {
    0.2
}

fn default_currency_ceiling() -> i64 {
    1_000_000_000
}

fn default_starting_gold() -> i64 {
    100
}

fn default_event_history() -> usize {
    1000
}

fn default_db_host() -> String {
    "localhost".to_string()
}

fn default_db_port() -> u16 {
    5432
}

fn default_db_name() -> String {
    "emberfall".to_string()
}

fn default_db_user() -> String {
    "emberfall".to_string()
}

fn default_pool_size() -> u32 {
    10
}

impl Default for LootConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_loot_ttl(),
            sweep_interval_secs: default_loot_sweep(),
            corpse_despawn_secs: default_corpse_despawn(),
        }
    }
}

impl Default for MessageConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_message_ttl(),
            sweep_interval_secs: default_message_sweep(),
            history_capacity: default_history_capacity(),
        }
    }
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            health: default_health(),
            energy: default_energy(),
            mana: default_mana(),
            low_threshold: default_low_threshold(),
        }
    }
}

impl Default for EconomyConfig {
    fn default() -> Self {
        Self {
            currency_ceiling: default_currency_ceiling(),
            starting_gold: default_starting_gold(),
        }
    }
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            history_capacity: default_event_history(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: default_db_host(),
            port: default_db_port(),
            database: default_db_name(),
            username: default_db_user(),
            password: String::new(),
            pool_size: default_pool_size(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            config_path: PathBuf::from("config/server.toml"),
            server_name: default_server_name(),
            world_id: default_world_id(),
            loot: LootConfig::default(),
            messages: MessageConfig::default(),
            resources: ResourceConfig::default(),
            economy: EconomyConfig::default(),
            events: EventConfig::default(),
            database: DatabaseConfig::default(),
            debug: false,
        }
    }
}

impl ServerConfig {
    /// Load configuration from file and environment variables
    pub async fn load() -> Result<Self> {
        // Determine config path from environment or use default
        let config_path = env::var("EMBERFALL_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config/server.toml"));

        // Try to load from file
        let mut config = if config_path.exists() {
            let content = tokio::fs::read_to_string(&config_path)
                .await
                .with_context(|| {
                    format!("Failed to read config file: {}", config_path.display())
                })?;

            toml::from_str(&content).with_context(|| {
                format!("Failed to parse config file: {}", config_path.display())
            })?
        } else {
            tracing::warn!(
                "Config file not found at {}, using defaults",
                config_path.display()
            );
            Self::default()
        };

        config.config_path = config_path;

        // Override with environment variables
        config.apply_env_overrides();

        // Validate configuration
        config.validate()?;

        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("EMBERFALL_SERVER_NAME") {
            self.server_name = val;
        }
        if let Ok(val) = env::var("EMBERFALL_WORLD_ID") {
            if let Ok(id) = val.parse() {
                self.world_id = id;
            }
        }
        if let Ok(val) = env::var("EMBERFALL_LOOT_TTL_SECS") {
            if let Ok(secs) = val.parse() {
                self.loot.ttl_secs = secs;
            }
        }
        if let Ok(val) = env::var("EMBERFALL_MESSAGE_TTL_SECS") {
            if let Ok(secs) = val.parse() {
                self.messages.ttl_secs = secs;
            }
        }
        if let Ok(val) = env::var("EMBERFALL_DEBUG") {
            self.debug = val.to_lowercase() == "true" || val == "1";
        }

        // Database overrides
        if let Ok(val) = env::var("EMBERFALL_DATABASE_HOST") {
            self.database.host = val;
        }
        if let Ok(val) = env::var("EMBERFALL_DATABASE_PORT") {
            if let Ok(port) = val.parse() {
                self.database.port = port;
            }
        }
        if let Ok(val) = env::var("EMBERFALL_DATABASE_NAME") {
            self.database.database = val;
        }
        if let Ok(val) = env::var("EMBERFALL_DATABASE_USER") {
            self.database.username = val;
        }
        if let Ok(val) = env::var("EMBERFALL_DATABASE_PASSWORD") {
            self.database.password = val;
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        // World ID must be 1-255
        if self.world_id == 0 {
            anyhow::bail!("World ID must be between 1 and 255");
        }

        // Lifetimes must be positive and longer than their sweep interval
        if self.loot.ttl_secs == 0 || self.messages.ttl_secs == 0 {
            anyhow::bail!("TTLs must be greater than zero");
        }
        if self.loot.sweep_interval_secs == 0 || self.messages.sweep_interval_secs == 0 {
            anyhow::bail!("Sweep intervals must be greater than zero");
        }
        if self.loot.sweep_interval_secs > self.loot.ttl_secs {
            anyhow::bail!("Loot sweep interval must not exceed the loot TTL");
        }
        if self.messages.sweep_interval_secs > self.messages.ttl_secs {
            anyhow::bail!("Message sweep interval must not exceed the message TTL");
        }

        // Resource thresholds must be sane ratios
        if !(0.0..=1.0).contains(&self.resources.low_threshold) {
            anyhow::bail!("Resource low threshold must be between 0.0 and 1.0");
        }
        if self.resources.health <= 0 {
            anyhow::bail!("Default health must be positive");
        }

        // Economy limits
        if self.economy.currency_ceiling <= 0 {
            anyhow::bail!("Currency ceiling must be positive");
        }
        if self.economy.starting_gold < 0 {
            anyhow::bail!("Starting gold cannot be negative");
        }

        if self.events.history_capacity == 0 || self.messages.history_capacity == 0 {
            anyhow::bail!("History capacities must be greater than zero");
        }

        Ok(())
    }

    /// Get the database connection URL
    pub fn database_url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.database.username,
            self.database.password,
            self.database.host,
            self.database.port,
            self.database.database
        )
    }
}
