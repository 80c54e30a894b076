//! Server configuration.

use std::path::Path;
use std::sync::Arc;

use derive_getters::Getters;
use derive_more::{Display, Error};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::store::{GameStore, MemoryGameStore, SqliteGameStore, StoreError};
use crate::sync::{RelayChannel, ReplicatedChannel, SyncChannel, SyncMode};

/// Database URL selecting the in-memory store.
pub const MEMORY_DATABASE: &str = ":memory:";

/// Everything `serve` needs to start.
#[derive(Debug, Clone, PartialEq, Eq, Getters, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Interface to bind.
    #[serde(default = "default_host")]
    host: String,

    /// Port to bind.
    #[serde(default = "default_port")]
    port: u16,

    /// SQLite path, or `:memory:` for the in-memory store.
    #[serde(default = "default_database_url")]
    database_url: String,

    /// Propagation strategy.
    #[serde(default)]
    sync_mode: SyncMode,

    /// Per-game buffer size of the sync channel.
    #[serde(default = "default_channel_capacity")]
    channel_capacity: usize,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_database_url() -> String {
    "othello.db".to_string()
}

fn default_channel_capacity() -> usize {
    64
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            database_url: default_database_url(),
            sync_mode: SyncMode::default(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl ServerConfig {
    /// Loads configuration from a TOML file. Missing keys take defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed.
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        debug!("Loading config from file");
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::new(format!("Failed to read config file: {}", e)))?;
        let config = Self::from_toml(&content)?;
        info!(
            port = config.port,
            database_url = %config.database_url,
            "Config loaded successfully"
        );
        Ok(config)
    }

    /// Parses configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the text is not valid configuration.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content)
            .map_err(|e| ConfigError::new(format!("Failed to parse config: {}", e)))
    }

    /// Applies `DATABASE_URL` and `PORT` from the environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `PORT` is not a port number.
    #[instrument(skip(self))]
    pub fn with_env(mut self) -> Result<Self, ConfigError> {
        if let Ok(url) = std::env::var("DATABASE_URL") {
            debug!(database_url = %url, "DATABASE_URL from environment");
            self.database_url = url;
        }
        if let Ok(port) = std::env::var("PORT") {
            self.port = port
                .parse()
                .map_err(|_| ConfigError::new(format!("PORT is not a port number: {}", port)))?;
        }
        Ok(self)
    }

    /// Overrides individual values, typically from command-line flags.
    pub fn with_overrides(
        mut self,
        host: Option<String>,
        port: Option<u16>,
        database_url: Option<String>,
        sync_mode: Option<SyncMode>,
    ) -> Self {
        if let Some(host) = host {
            self.host = host;
        }
        if let Some(port) = port {
            self.port = port;
        }
        if let Some(url) = database_url {
            self.database_url = url;
        }
        if let Some(mode) = sync_mode {
            self.sync_mode = mode;
        }
        self
    }

    /// Opens the configured store.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the database cannot be opened or migrated.
    #[instrument(skip(self), fields(database_url = %self.database_url))]
    pub fn open_store(&self) -> Result<Arc<dyn GameStore>, StoreError> {
        if self.database_url == MEMORY_DATABASE {
            info!("Using in-memory store");
            return Ok(Arc::new(MemoryGameStore::new()));
        }
        Ok(Arc::new(SqliteGameStore::open(&self.database_url)?))
    }

    /// Builds the configured sync channel.
    #[instrument(skip(self), fields(mode = %self.sync_mode))]
    pub fn sync_channel(&self) -> Arc<dyn SyncChannel> {
        match self.sync_mode {
            SyncMode::Relay => Arc::new(RelayChannel::new(self.channel_capacity)),
            SyncMode::Replicated => Arc::new(ReplicatedChannel::new(self.channel_capacity)),
        }
    }
}

/// Configuration error.
#[derive(Debug, Clone, Display, Error)]
#[display("Config error: {} at {}:{}", message, file, line)]
pub struct ConfigError {
    /// Error message.
    pub message: String,
    /// Line number where error occurred.
    pub line: u32,
    /// Source file where error occurred.
    pub file: &'static str,
}

impl ConfigError {
    /// Creates a new config error with caller location tracking.
    #[track_caller]
    #[instrument(skip(message))]
    pub fn new(message: impl Into<String>) -> Self {
        let loc = std::panic::Location::caller();
        Self {
            message: message.into(),
            line: loc.line(),
            file: loc.file(),
        }
    }
}
