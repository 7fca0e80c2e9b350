// # Subscription Store Trait
//
// Defines the interface for the durable subscriber/account mapping.
//
// ## Purpose
//
// The store records which chats follow which tracked accounts, and the
// platform ID each account name resolved to. The stream filter is rebuilt
// from it on every reload, so nothing about the live stream is persisted.
//
// ## Implementations
//
// - In-memory: `MemorySubscriptionStore` (tests, ephemeral deployments)
// - SQLite: `SqliteSubscriptionStore`

use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// One externally tracked account
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TrackedAccount {
    /// Internal surrogate ID
    pub id: i64,
    /// Canonical name (case-insensitive unique)
    pub name: String,
    /// Resolved platform ID, 0 while unresolved
    pub resolved_id: u64,
    /// When the resolution was last written
    pub last_resolved: Option<DateTime<Utc>>,
}

impl TrackedAccount {
    /// Whether the platform ID is still unknown
    pub fn is_unresolved(&self) -> bool {
        self.resolved_id == 0
    }
}

/// One subscription as seen by a chat
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    /// Account name
    pub name: String,
    /// Resolved platform ID, 0 while unresolved
    pub resolved_id: u64,
    /// Optional keyword filter for this association
    pub keywords: Option<String>,
}

/// One subscriber of a resolved account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscriber {
    /// Chat to deliver to
    pub chat_id: i64,
    /// Optional keyword filter for this association
    pub keywords: Option<String>,
}

/// Trait for subscription store implementations
///
/// # Thread Safety
///
/// All methods must be safe to call concurrently from multiple workers.
///
/// # Invariants
///
/// - Account names are unique ignoring ASCII case
/// - A (chat, account) association exists at most once
/// - Accounts without subscribers are pruned after removals
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Subscribe a chat to an account, creating the account if needed
    ///
    /// Re-adding an existing association replaces its keyword filter.
    ///
    /// # Returns
    ///
    /// The account's resolved ID (0 if not resolved yet)
    async fn add_subscription(
        &self,
        chat_id: i64,
        name: &str,
        keywords: Option<&str>,
    ) -> Result<u64, crate::Error>;

    /// Remove one association; missing associations are not an error
    async fn remove_subscription(&self, chat_id: i64, name: &str) -> Result<(), crate::Error>;

    /// Remove every association of a chat
    async fn remove_all(&self, chat_id: i64) -> Result<(), crate::Error>;

    /// List the subscriptions of a chat
    async fn list_for_chat(&self, chat_id: i64) -> Result<Vec<Subscription>, crate::Error>;

    /// List tracked accounts
    ///
    /// With `force_all` every account is returned, otherwise only the
    /// unresolved ones.
    async fn all_tracked_accounts(&self, force_all: bool)
    -> Result<Vec<TrackedAccount>, crate::Error>;

    /// Write back a resolution (and possibly a new name) for an account
    async fn update_resolution(
        &self,
        id: i64,
        resolved_id: u64,
        name: &str,
    ) -> Result<(), crate::Error>;

    /// Resolved IDs that have at least one subscriber
    async fn distinct_watched_resolved_ids(&self) -> Result<Vec<u64>, crate::Error>;

    /// Subscribers of the account with the given resolved ID
    async fn subscribers_for_resolved_id(
        &self,
        resolved_id: u64,
    ) -> Result<Vec<Subscriber>, crate::Error>;

    /// Release underlying resources on shutdown
    async fn close(&self) -> Result<(), crate::Error> {
        Ok(())
    }
}
