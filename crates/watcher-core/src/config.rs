//! Configuration types for the watcher system
//!
//! This module defines all configuration structures used throughout the crate.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main watcher configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WatcherConfig {
    /// Upstream post platform configuration
    pub upstream: UpstreamConfig,

    /// Messaging bot configuration
    pub messaging: MessagingConfig,

    /// Subscription store configuration
    pub store: StoreConfig,

    /// Who may use the bot
    #[serde(default)]
    pub access: AccessConfig,

    /// Timers and intervals
    #[serde(default)]
    pub timeouts: TimeoutConfig,

    /// Optional engine settings
    #[serde(default)]
    pub engine: EngineConfig,
}

impl WatcherConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        self.upstream.validate()?;
        self.messaging.validate()?;
        self.store.validate()?;
        self.timeouts.validate()?;
        self.engine.validate()?;
        Ok(())
    }
}

/// Upstream (Twitter API v2) configuration
#[derive(Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// App bearer token
    pub bearer_token: String,

    /// Language filter appended to every stream rule (empty disables it)
    #[serde(default = "default_stream_language")]
    pub stream_language: String,
}

impl UpstreamConfig {
    /// Validate the upstream configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.bearer_token.is_empty() {
            return Err(crate::Error::config("Twitter bearer token cannot be empty"));
        }
        if !self
            .stream_language
            .chars()
            .all(|c| c.is_ascii_alphabetic() || c == '-')
        {
            return Err(crate::Error::config(format!(
                "Invalid stream language '{}'",
                self.stream_language
            )));
        }
        Ok(())
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            bearer_token: String::new(),
            stream_language: default_stream_language(),
        }
    }
}

impl std::fmt::Debug for UpstreamConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamConfig")
            .field("bearer_token", &"<redacted>")
            .field("stream_language", &self.stream_language)
            .finish()
    }
}

/// Messaging bot (Telegram) configuration
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct MessagingConfig {
    /// Bot API token
    pub bot_token: String,
}

impl MessagingConfig {
    /// Validate the messaging configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.bot_token.is_empty() {
            return Err(crate::Error::config("Telegram bot token cannot be empty"));
        }
        Ok(())
    }
}

impl std::fmt::Debug for MessagingConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessagingConfig")
            .field("bot_token", &"<redacted>")
            .finish()
    }
}

/// Subscription store configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreConfig {
    /// SQLite database file
    Sqlite {
        /// Path to the database file
        path: String,
    },

    /// In-memory store (not persistent)
    Memory,
}

impl StoreConfig {
    /// Validate the store configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            StoreConfig::Sqlite { path } if path.is_empty() => {
                Err(crate::Error::config("SQLite store path cannot be empty"))
            }
            _ => Ok(()),
        }
    }

    /// Get the store type name
    pub fn type_name(&self) -> &str {
        match self {
            StoreConfig::Sqlite { .. } => "sqlite",
            StoreConfig::Memory => "memory",
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig::Sqlite {
            path: "watcher.db".to_string(),
        }
    }
}

/// Access control lists (chat handles, case-insensitive)
///
/// The block list wins over the allow list. An empty allow list admits
/// everyone who is not blocked.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessConfig {
    #[serde(default)]
    pub allowed: Vec<String>,

    #[serde(default)]
    pub blocked: Vec<String>,
}

impl AccessConfig {
    /// Check whether a handle may use the bot
    pub fn permits(&self, handle: &str) -> bool {
        if self.blocked.iter().any(|b| b.eq_ignore_ascii_case(handle)) {
            return false;
        }
        self.allowed.is_empty() || self.allowed.iter().any(|a| a.eq_ignore_ascii_case(handle))
    }
}

/// Timer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Interval of the scheduled resolve-all reload (in seconds)
    #[serde(default = "default_resolve_interval_secs")]
    pub resolve_interval_secs: u64,

    /// Sleep before retrying a failed outbound message (in seconds)
    #[serde(default = "default_backoff_secs")]
    pub backoff_secs: u64,

    /// Maximum wait for a database connection (in seconds)
    #[serde(default = "default_database_timeout_secs")]
    pub database_timeout_secs: u64,

    /// Debounce window after each stream rebuild (in seconds)
    ///
    /// Reload requests arriving inside the window collapse into at most one
    /// rebuild when the window ends.
    #[serde(default = "default_drop_window_secs")]
    pub drop_window_secs: u64,

    /// Pause before reconnecting after a stream fault (in seconds)
    #[serde(default = "default_fault_pause_secs")]
    pub fault_pause_secs: u64,
}

impl TimeoutConfig {
    /// Validate the timer configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.resolve_interval_secs == 0 {
            return Err(crate::Error::config("Resolve interval must be > 0"));
        }
        if self.drop_window_secs == 0 {
            return Err(crate::Error::config("Drop window must be > 0"));
        }
        if self.database_timeout_secs == 0 {
            return Err(crate::Error::config("Database timeout must be > 0"));
        }
        Ok(())
    }

    pub fn resolve_interval(&self) -> Duration {
        Duration::from_secs(self.resolve_interval_secs)
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_secs(self.backoff_secs)
    }

    pub fn database_timeout(&self) -> Duration {
        Duration::from_secs(self.database_timeout_secs)
    }

    pub fn drop_window(&self) -> Duration {
        Duration::from_secs(self.drop_window_secs)
    }

    pub fn fault_pause(&self) -> Duration {
        Duration::from_secs(self.fault_pause_secs)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            resolve_interval_secs: default_resolve_interval_secs(),
            backoff_secs: default_backoff_secs(),
            database_timeout_secs: default_database_timeout_secs(),
            drop_window_secs: default_drop_window_secs(),
            fault_pause_secs: default_fault_pause_secs(),
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Delivery attempts per outbound message before it is dropped
    #[serde(default = "default_send_tries")]
    pub send_tries: u8,

    /// Capacity of the reload signal channel
    #[serde(default = "default_reload_channel_capacity")]
    pub reload_channel_capacity: usize,

    /// Capacity of the command reply queue
    ///
    /// Also the backlog at which the sender stops taking new posts until
    /// queued messages are delivered.
    #[serde(default = "default_outbound_channel_capacity")]
    pub outbound_channel_capacity: usize,

    /// Capacity of the classified post channel
    #[serde(default = "default_post_channel_capacity")]
    pub post_channel_capacity: usize,

    /// Capacity of the engine event channel
    ///
    /// When full, new events are dropped (with a warning log).
    ///
    /// Default: 1000 events
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl EngineConfig {
    /// Validate the engine configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.send_tries == 0 {
            return Err(crate::Error::config("Send tries must be > 0"));
        }
        if self.reload_channel_capacity == 0
            || self.outbound_channel_capacity == 0
            || self.post_channel_capacity == 0
            || self.event_channel_capacity == 0
        {
            return Err(crate::Error::config("Channel capacities must be > 0"));
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            send_tries: default_send_tries(),
            reload_channel_capacity: default_reload_channel_capacity(),
            outbound_channel_capacity: default_outbound_channel_capacity(),
            post_channel_capacity: default_post_channel_capacity(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

fn default_stream_language() -> String {
    "en".to_string()
}

fn default_resolve_interval_secs() -> u64 {
    6 * 60 * 60
}

fn default_backoff_secs() -> u64 {
    5
}

fn default_database_timeout_secs() -> u64 {
    180
}

fn default_drop_window_secs() -> u64 {
    60
}

fn default_fault_pause_secs() -> u64 {
    5
}

fn default_send_tries() -> u8 {
    2
}

fn default_reload_channel_capacity() -> usize {
    64
}

fn default_outbound_channel_capacity() -> usize {
    256
}

fn default_post_channel_capacity() -> usize {
    256
}

fn default_event_channel_capacity() -> usize {
    1000
}
