// # watcherd - Watcher Daemon
//
// This is a THIN integration layer. All reload, resolution and delivery
// logic lives in watcher-core; this binary only wires the Twitter and
// Telegram clients into the engine.
//
// The watcherd daemon is responsible for:
// 1. Reading configuration from environment variables
// 2. Initializing logging and the runtime
// 3. Opening the subscription store and verifying credentials
// 4. Running the watcher until SIGINT/SIGTERM
//
// ## Configuration
//
// All configuration is done via environment variables:
//
// ### Credentials
// - `WATCHER_TWITTER_BEARER_TOKEN`: Twitter API v2 app bearer token
// - `WATCHER_TELEGRAM_TOKEN`: Telegram bot token
//
// ### Subscription Store
// - `WATCHER_STORE_TYPE`: Type of store (sqlite, memory)
// - `WATCHER_STORE_PATH`: Path to the SQLite database (for sqlite store)
// - `WATCHER_DATABASE_TIMEOUT_SECS`: Maximum wait for a database connection
//
// ### Access
// - `WATCHER_ALLOWED`: Comma-separated chat handles allowed to use the bot
// - `WATCHER_BLOCKED`: Comma-separated chat handles refused by the bot
//
// ### Timers
// - `WATCHER_RESOLVE_INTERVAL_SECS`: Interval of the scheduled full resolve
// - `WATCHER_BACKOFF_SECS`: Pause before retrying a failed message
// - `WATCHER_DROP_WINDOW_SECS`: Debounce window after each stream rebuild
// - `WATCHER_FAULT_PAUSE_SECS`: Pause before reconnecting a faulted stream
//
// ### Misc
// - `WATCHER_STREAM_LANGUAGE`: Language filter for stream rules (empty disables)
// - `WATCHER_LOG_LEVEL`: trace, debug, info, warn, error
//
// ## Example
//
// ```bash
// export WATCHER_TWITTER_BEARER_TOKEN=your_bearer_token
// export WATCHER_TELEGRAM_TOKEN=123456:your_bot_token
// export WATCHER_STORE_PATH=/var/lib/watcher/watcher.db
//
// watcherd
// ```

use anyhow::{Context, Result};
use std::env;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{Level, debug, error, info};
use tracing_subscriber::FmtSubscriber;

use watcher_core::config::{
    AccessConfig, MessagingConfig, StoreConfig, TimeoutConfig, UpstreamConfig,
};
use watcher_core::{
    MemorySubscriptionStore, MessagingBot, SqliteSubscriptionStore, SubscriptionStore,
    UpstreamClient, Watcher, WatcherConfig,
};
use watcher_telegram::TelegramBot;
use watcher_twitter::TwitterClient;

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WatcherExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<WatcherExitCode> for ExitCode {
    fn from(code: WatcherExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Application configuration
struct Config {
    twitter_bearer_token: String,
    telegram_token: String,
    store_type: String,
    store_path: Option<String>,
    allowed: Vec<String>,
    blocked: Vec<String>,
    resolve_interval_secs: Option<u64>,
    backoff_secs: Option<u64>,
    drop_window_secs: Option<u64>,
    fault_pause_secs: Option<u64>,
    database_timeout_secs: Option<u64>,
    stream_language: Option<String>,
    log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let secs = |key: &str| -> Result<Option<u64>> {
            match get(key) {
                Some(value) if !value.trim().is_empty() => value
                    .trim()
                    .parse()
                    .map(Some)
                    .with_context(|| format!("{} must be a whole number of seconds. Got: {}", key, value)),
                _ => Ok(None),
            }
        };

        Ok(Self {
            twitter_bearer_token: get("WATCHER_TWITTER_BEARER_TOKEN").unwrap_or_default(),
            telegram_token: get("WATCHER_TELEGRAM_TOKEN").unwrap_or_default(),
            store_type: get("WATCHER_STORE_TYPE").unwrap_or_else(|| "sqlite".to_string()),
            store_path: get("WATCHER_STORE_PATH"),
            allowed: split_list(get("WATCHER_ALLOWED")),
            blocked: split_list(get("WATCHER_BLOCKED")),
            resolve_interval_secs: secs("WATCHER_RESOLVE_INTERVAL_SECS")?,
            backoff_secs: secs("WATCHER_BACKOFF_SECS")?,
            drop_window_secs: secs("WATCHER_DROP_WINDOW_SECS")?,
            fault_pause_secs: secs("WATCHER_FAULT_PAUSE_SECS")?,
            database_timeout_secs: secs("WATCHER_DATABASE_TIMEOUT_SECS")?,
            stream_language: get("WATCHER_STREAM_LANGUAGE"),
            log_level: get("WATCHER_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }

    /// Validate the configuration
    ///
    /// Checks required credentials, enumerations and numeric ranges so the
    /// daemon fails before touching the network.
    fn validate(&self) -> Result<()> {
        if self.twitter_bearer_token.is_empty() {
            anyhow::bail!(
                "WATCHER_TWITTER_BEARER_TOKEN is required. \
                Set it via: export WATCHER_TWITTER_BEARER_TOKEN=your_bearer_token"
            );
        }

        if self.telegram_token.is_empty() {
            anyhow::bail!(
                "WATCHER_TELEGRAM_TOKEN is required. \
                Set it via: export WATCHER_TELEGRAM_TOKEN=123456:your_bot_token"
            );
        }

        // Bot tokens look like "<bot id>:<secret>"
        if !self.telegram_token.contains(':') {
            anyhow::bail!(
                "WATCHER_TELEGRAM_TOKEN does not look like a bot token. \
                Expected the form <bot id>:<secret> as issued by @BotFather."
            );
        }

        for (key, token) in [
            ("WATCHER_TWITTER_BEARER_TOKEN", &self.twitter_bearer_token),
            ("WATCHER_TELEGRAM_TOKEN", &self.telegram_token),
        ] {
            let lower = token.to_lowercase();
            if lower.contains("your_") || lower.contains("replace_me") || lower == "token" {
                anyhow::bail!(
                    "{} appears to be a placeholder. Use the real credential.",
                    key
                );
            }
        }

        match self.store_type.as_str() {
            "sqlite" => {
                if let Some(ref path) = self.store_path {
                    if path.is_empty() {
                        anyhow::bail!(
                            "WATCHER_STORE_PATH cannot be empty when WATCHER_STORE_TYPE=sqlite"
                        );
                    }

                    if let Some(parent) = std::path::Path::new(path).parent()
                        && !parent.as_os_str().is_empty()
                        && !parent.exists()
                    {
                        anyhow::bail!(
                            "WATCHER_STORE_PATH parent directory does not exist: {}. \
                                Create it first: mkdir -p {}",
                            parent.display(),
                            parent.display()
                        );
                    }
                }
            }
            "memory" => {}
            _ => anyhow::bail!(
                "WATCHER_STORE_TYPE '{}' is not supported. \
                Supported types: sqlite, memory",
                self.store_type
            ),
        }

        for handle in self.allowed.iter().chain(&self.blocked) {
            if !handle.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                anyhow::bail!(
                    "Access list entry '{}' is not a valid chat handle. \
                    Use handles without '@', separated by commas.",
                    handle
                );
            }
        }

        if let Some(interval) = self.resolve_interval_secs
            && !(60..=7 * 24 * 3600).contains(&interval)
        {
            anyhow::bail!(
                "WATCHER_RESOLVE_INTERVAL_SECS must be between 60 and 604800 seconds. Got: {}",
                interval
            );
        }

        if let Some(window) = self.drop_window_secs
            && !(1..=3600).contains(&window)
        {
            anyhow::bail!(
                "WATCHER_DROP_WINDOW_SECS must be between 1 and 3600 seconds. Got: {}",
                window
            );
        }

        if let Some(backoff) = self.backoff_secs
            && backoff > 300
        {
            anyhow::bail!(
                "WATCHER_BACKOFF_SECS must be at most 300 seconds. Got: {}",
                backoff
            );
        }

        if let Some(pause) = self.fault_pause_secs
            && pause > 300
        {
            anyhow::bail!(
                "WATCHER_FAULT_PAUSE_SECS must be at most 300 seconds. Got: {}",
                pause
            );
        }

        if let Some(timeout) = self.database_timeout_secs
            && timeout == 0
        {
            anyhow::bail!("WATCHER_DATABASE_TIMEOUT_SECS must be greater than 0");
        }

        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "WATCHER_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }

        Ok(())
    }

    /// Convert into the engine configuration
    fn to_watcher_config(&self) -> WatcherConfig {
        let mut timeouts = TimeoutConfig::default();
        if let Some(secs) = self.resolve_interval_secs {
            timeouts.resolve_interval_secs = secs;
        }
        if let Some(secs) = self.backoff_secs {
            timeouts.backoff_secs = secs;
        }
        if let Some(secs) = self.drop_window_secs {
            timeouts.drop_window_secs = secs;
        }
        if let Some(secs) = self.fault_pause_secs {
            timeouts.fault_pause_secs = secs;
        }
        if let Some(secs) = self.database_timeout_secs {
            timeouts.database_timeout_secs = secs;
        }

        let mut upstream = UpstreamConfig {
            bearer_token: self.twitter_bearer_token.clone(),
            ..UpstreamConfig::default()
        };
        if let Some(ref language) = self.stream_language {
            upstream.stream_language = language.trim().to_string();
        }

        let store = match self.store_type.as_str() {
            "memory" => StoreConfig::Memory,
            _ => match self.store_path {
                Some(ref path) => StoreConfig::Sqlite { path: path.clone() },
                None => StoreConfig::default(),
            },
        };

        WatcherConfig {
            upstream,
            messaging: MessagingConfig {
                bot_token: self.telegram_token.clone(),
            },
            store,
            access: AccessConfig {
                allowed: self.allowed.clone(),
                blocked: self.blocked.clone(),
            },
            timeouts,
            engine: Default::default(),
        }
    }
}

/// Split a comma-separated handle list, dropping blanks and leading '@'
fn split_list(value: Option<String>) -> Vec<String> {
    value
        .unwrap_or_default()
        .split(',')
        .map(|s| s.trim().trim_start_matches('@').to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn main() -> ExitCode {
    // Load configuration from environment
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return WatcherExitCode::ConfigError.into();
        }
    };

    // Validate configuration
    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {}", e);
        return WatcherExitCode::ConfigError.into();
    }

    // Initialize tracing
    let log_level = match config.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return WatcherExitCode::ConfigError.into();
    }

    info!("Starting watcherd daemon");

    let watcher_config = config.to_watcher_config();
    if let Err(e) = watcher_config.validate() {
        error!("Configuration validation error: {}", e);
        return WatcherExitCode::ConfigError.into();
    }

    // Enter tokio runtime
    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return WatcherExitCode::RuntimeError.into();
        }
    };

    rt.block_on(async {
        let watcher = match build_watcher(watcher_config).await {
            Ok(watcher) => watcher,
            Err(e) => {
                error!("Startup failed: {:#}", e);
                return WatcherExitCode::ConfigError;
            }
        };

        match watcher.run().await {
            Ok(()) => WatcherExitCode::CleanShutdown,
            Err(e) if e.is_fatal() => {
                error!("Watcher stopped on a configuration error: {}", e);
                WatcherExitCode::ConfigError
            }
            Err(e) => {
                error!("Daemon error: {}", e);
                WatcherExitCode::RuntimeError
            }
        }
    })
    .into()
}

/// Open the store, verify credentials and assemble the watcher
///
/// Engine events are drained into the debug log.
async fn build_watcher(config: WatcherConfig) -> Result<Watcher> {
    let store: Arc<dyn SubscriptionStore> = match &config.store {
        StoreConfig::Sqlite { path } => {
            info!("Opening SQLite subscription store at {}", path);
            Arc::new(
                SqliteSubscriptionStore::connect(path, config.timeouts.database_timeout())
                    .await
                    .context("Failed to open subscription store")?,
            )
        }
        StoreConfig::Memory => {
            info!("Using in-memory subscription store (subscriptions are not persisted)");
            Arc::new(MemorySubscriptionStore::new())
        }
    };

    let upstream = TwitterClient::new(config.upstream.bearer_token.clone())
        .context("Failed to create Twitter client")?;
    upstream
        .verify()
        .await
        .context("Twitter credential check failed")?;

    let bot = TelegramBot::new(config.messaging.bot_token.clone())
        .context("Failed to create Telegram bot")?;
    bot.verify()
        .await
        .context("Telegram credential check failed")?;

    info!(
        "Credentials verified (upstream: {}, bot: {})",
        upstream.client_name(),
        bot.bot_name()
    );
    if config.access.allowed.is_empty() {
        info!("No allow list configured; every unblocked chat may use the bot");
    }

    let (watcher, mut events) = Watcher::new(store, Arc::new(upstream), Arc::new(bot), config)?;

    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            debug!("Engine event: {:?}", event);
        }
    });

    Ok(watcher)
}
