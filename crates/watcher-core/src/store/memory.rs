// # Memory Subscription Store
//
// In-memory implementation of SubscriptionStore.
//
// ## Purpose
//
// Provides a simple, fast store that doesn't persist across restarts.
// Useful for testing and for throwaway deployments where subscribers can
// re-add their accounts.
//
// ## Crash Behavior
//
// - All subscriptions are lost on restart/crash
// - The stream starts sessionless until someone subscribes again

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use async_trait::async_trait;

use crate::traits::subscription_store::{Subscriber, Subscription, SubscriptionStore, TrackedAccount};
use crate::Error;

#[derive(Debug, Default)]
struct Inner {
    next_id: i64,
    accounts: BTreeMap<i64, TrackedAccount>,
    /// (chat, account id) -> keyword filter
    subscriptions: BTreeMap<(i64, i64), Option<String>>,
}

impl Inner {
    fn find_by_name(&self, name: &str) -> Option<i64> {
        self.accounts
            .values()
            .find(|account| account.name.eq_ignore_ascii_case(name))
            .map(|account| account.id)
    }

    fn subscriber_count(&self, account_id: i64) -> usize {
        self.subscriptions
            .keys()
            .filter(|(_, mapping)| *mapping == account_id)
            .count()
    }

    fn prune(&mut self) {
        let watched: BTreeSet<i64> = self.subscriptions.keys().map(|(_, id)| *id).collect();
        self.accounts.retain(|id, _| watched.contains(id));
    }
}

/// In-memory subscription store implementation
///
/// All state lives in maps protected by a RwLock.
///
/// # Example
///
/// ```rust,no_run
/// use watcher_core::store::MemorySubscriptionStore;
/// use watcher_core::traits::SubscriptionStore;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = MemorySubscriptionStore::new();
///
///     let resolved = store.add_subscription(555, "alice", None).await?;
///     assert_eq!(resolved, 0);
///
///     let list = store.list_for_chat(555).await?;
///     assert_eq!(list[0].name, "alice");
///
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemorySubscriptionStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemorySubscriptionStore {
    /// Create a new empty memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tracked accounts
    pub async fn account_count(&self) -> usize {
        self.inner.read().await.accounts.len()
    }

    /// Number of (chat, account) associations
    pub async fn subscription_count(&self) -> usize {
        self.inner.read().await.subscriptions.len()
    }

    /// Look up a tracked account by name
    pub async fn account(&self, name: &str) -> Option<TrackedAccount> {
        let guard = self.inner.read().await;
        guard
            .find_by_name(name)
            .and_then(|id| guard.accounts.get(&id).cloned())
    }
}

#[async_trait]
impl SubscriptionStore for MemorySubscriptionStore {
    async fn add_subscription(
        &self,
        chat_id: i64,
        name: &str,
        keywords: Option<&str>,
    ) -> Result<u64, Error> {
        let mut guard = self.inner.write().await;

        let account_id = match guard.find_by_name(name) {
            Some(id) => id,
            None => {
                guard.next_id += 1;
                let id = guard.next_id;
                guard.accounts.insert(
                    id,
                    TrackedAccount {
                        id,
                        name: name.to_string(),
                        resolved_id: 0,
                        last_resolved: None,
                    },
                );
                id
            }
        };

        guard
            .subscriptions
            .insert((chat_id, account_id), keywords.map(str::to_string));

        Ok(guard
            .accounts
            .get(&account_id)
            .map(|account| account.resolved_id)
            .unwrap_or_default())
    }

    async fn remove_subscription(&self, chat_id: i64, name: &str) -> Result<(), Error> {
        let mut guard = self.inner.write().await;
        if let Some(account_id) = guard.find_by_name(name) {
            guard.subscriptions.remove(&(chat_id, account_id));
            if guard.subscriber_count(account_id) == 0 {
                guard.accounts.remove(&account_id);
            }
        }
        Ok(())
    }

    async fn remove_all(&self, chat_id: i64) -> Result<(), Error> {
        let mut guard = self.inner.write().await;
        guard.subscriptions.retain(|(chat, _), _| *chat != chat_id);
        guard.prune();
        Ok(())
    }

    async fn list_for_chat(&self, chat_id: i64) -> Result<Vec<Subscription>, Error> {
        let guard = self.inner.read().await;
        let mut list: Vec<Subscription> = guard
            .subscriptions
            .iter()
            .filter(|((chat, _), _)| *chat == chat_id)
            .filter_map(|((_, account_id), keywords)| {
                guard.accounts.get(account_id).map(|account| Subscription {
                    name: account.name.clone(),
                    resolved_id: account.resolved_id,
                    keywords: keywords.clone(),
                })
            })
            .collect();
        list.sort_by(|a, b| a.name.to_ascii_lowercase().cmp(&b.name.to_ascii_lowercase()));
        Ok(list)
    }

    async fn all_tracked_accounts(&self, force_all: bool) -> Result<Vec<TrackedAccount>, Error> {
        let mut guard = self.inner.write().await;
        guard.prune();
        Ok(guard
            .accounts
            .values()
            .filter(|account| force_all || account.is_unresolved())
            .cloned()
            .collect())
    }

    async fn update_resolution(&self, id: i64, resolved_id: u64, name: &str) -> Result<(), Error> {
        let mut guard = self.inner.write().await;

        if !guard.accounts.contains_key(&id) {
            return Err(Error::store(format!("tracked account {} does not exist", id)));
        }

        // A rename onto a name that is already tracked merges the two rows.
        let target = match guard.find_by_name(name) {
            Some(existing) if existing != id => {
                let moved: Vec<((i64, i64), Option<String>)> = guard
                    .subscriptions
                    .iter()
                    .filter(|((_, account), _)| *account == id)
                    .map(|(key, keywords)| (*key, keywords.clone()))
                    .collect();
                for ((chat, _), keywords) in moved {
                    guard.subscriptions.remove(&(chat, id));
                    guard.subscriptions.entry((chat, existing)).or_insert(keywords);
                }
                guard.accounts.remove(&id);
                existing
            }
            _ => id,
        };

        if let Some(account) = guard.accounts.get_mut(&target) {
            account.resolved_id = resolved_id;
            account.name = name.to_string();
            account.last_resolved = Some(chrono::Utc::now());
        }
        guard.prune();
        Ok(())
    }

    async fn distinct_watched_resolved_ids(&self) -> Result<Vec<u64>, Error> {
        let guard = self.inner.read().await;
        let ids: BTreeSet<u64> = guard
            .subscriptions
            .keys()
            .filter_map(|(_, account_id)| guard.accounts.get(account_id))
            .map(|account| account.resolved_id)
            .filter(|resolved| *resolved != 0)
            .collect();
        Ok(ids.into_iter().collect())
    }

    async fn subscribers_for_resolved_id(&self, resolved_id: u64) -> Result<Vec<Subscriber>, Error> {
        let guard = self.inner.read().await;
        let mut seen = BTreeSet::new();
        Ok(guard
            .subscriptions
            .iter()
            .filter(|((_, account_id), _)| {
                guard
                    .accounts
                    .get(account_id)
                    .is_some_and(|account| account.resolved_id == resolved_id)
            })
            .filter(|((chat, _), _)| seen.insert(*chat))
            .map(|((chat, _), keywords)| Subscriber {
                chat_id: *chat,
                keywords: keywords.clone(),
            })
            .collect())
    }
}
