// # watcher-core
//
// Core library for the stream-to-chat watcher bridge.
//
// ## Architecture Overview
//
// This library subscribes to a live post stream for a set of tracked accounts
// and forwards matching posts to chat subscribers:
// - **UpstreamClient**: Trait for identity lookup and the filtered post stream
// - **MessagingBot**: Trait for inbound chat commands and outbound messages
// - **SubscriptionStore**: Trait for the durable (subscriber, account) mapping
// - **NameResolver**: Resolves tracked account names to platform IDs
// - **SessionManager**: Builds the stream filter and owns the live connection
// - **ReloadCoordinator**: Debounced reload state machine around the session
// - **Watcher**: Wires the coordinator, command receiver and sender together
//
// ## Design Principles
//
// 1. **Single Owner**: Only the coordinator touches the stream session
// 2. **Message Passing**: Workers talk over bounded channels, never shared state
// 3. **Debounced Reloads**: At most one rebuild per drop window
// 4. **Library-First**: The daemon is a thin layer over this crate
// 5. **Best Effort**: Delivery is bounded-retry, never exactly-once

pub mod traits;
pub mod engine;
pub mod config;
pub mod error;
pub mod store;
pub mod resolver;
pub mod session;
pub mod classifier;
pub mod dispatch;
pub mod commands;

// Re-export core types for convenience
pub use traits::{MessagingBot, SubscriptionStore, UpstreamClient};
pub use engine::{EngineEvent, ReloadLevel, Watcher};
pub use config::WatcherConfig;
pub use error::{Error, Result};
pub use store::{MemorySubscriptionStore, SqliteSubscriptionStore};
pub use resolver::NameResolver;
pub use session::{FilterSpec, SessionManager};
