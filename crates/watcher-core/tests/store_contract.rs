//! Architectural Contract Test: Subscription Store Semantics
//!
//! This test verifies that every SubscriptionStore implementation behaves
//! identically, so the engine never depends on which one is configured.
//!
//! Constraints verified:
//! - Account names are unique ignoring case
//! - Re-adding an association replaces its keywords instead of duplicating it
//! - Accounts without subscribers are pruned
//! - A rename onto an existing name merges the two accounts
//! - Unresolved accounts never appear in the stream filter
//!
//! If this test fails, someone has added:
//! - Store-specific behavior the engine relies on
//! - Case-sensitive name handling in one backend

use std::time::Duration;
use watcher_core::traits::SubscriptionStore;
use watcher_core::{MemorySubscriptionStore, SqliteSubscriptionStore};

async fn account_id(store: &dyn SubscriptionStore, name: &str) -> i64 {
    store
        .all_tracked_accounts(true)
        .await
        .unwrap()
        .into_iter()
        .find(|account| account.name.eq_ignore_ascii_case(name))
        .map(|account| account.id)
        .unwrap_or_else(|| panic!("{} is not tracked", name))
}

async fn exercise(store: &dyn SubscriptionStore) {
    // Case-insensitive names, keywords replaced on re-add.
    assert_eq!(store.add_subscription(1, "Alice", None).await.unwrap(), 0);
    store.add_subscription(1, "alice", Some("rust")).await.unwrap();
    store.add_subscription(2, "ALICE", None).await.unwrap();
    store.add_subscription(2, "bob", None).await.unwrap();

    let list = store.list_for_chat(1).await.unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0].name, "Alice");
    assert_eq!(list[0].keywords.as_deref(), Some("rust"));
    assert_eq!(store.all_tracked_accounts(true).await.unwrap().len(), 2);

    // Unresolved accounts are not streamed.
    assert!(store.distinct_watched_resolved_ids().await.unwrap().is_empty());
    assert_eq!(store.all_tracked_accounts(false).await.unwrap().len(), 2);

    let alice = account_id(store, "alice").await;
    store.update_resolution(alice, 10, "Alice").await.unwrap();
    assert_eq!(store.distinct_watched_resolved_ids().await.unwrap(), vec![10]);
    assert_eq!(store.all_tracked_accounts(false).await.unwrap().len(), 1);
    assert_eq!(store.add_subscription(3, "alice", None).await.unwrap(), 10);

    let mut subscribers = store.subscribers_for_resolved_id(10).await.unwrap();
    subscribers.sort_by_key(|s| s.chat_id);
    let chats: Vec<i64> = subscribers.iter().map(|s| s.chat_id).collect();
    assert_eq!(chats, vec![1, 2, 3]);
    assert_eq!(subscribers[0].keywords.as_deref(), Some("rust"));

    // Rename bob onto alice's name: the rows merge.
    let bob = account_id(store, "bob").await;
    store.update_resolution(bob, 10, "alice").await.unwrap();
    assert_eq!(store.all_tracked_accounts(true).await.unwrap().len(), 1);
    let chats: Vec<i64> = {
        let mut s = store.subscribers_for_resolved_id(10).await.unwrap();
        s.sort_by_key(|s| s.chat_id);
        s.into_iter().map(|s| s.chat_id).collect()
    };
    assert_eq!(chats, vec![1, 2, 3]);

    // Removals prune orphans; removing a missing association is fine.
    store.remove_subscription(9, "nobody").await.unwrap();
    store.remove_subscription(1, "ALICE").await.unwrap();
    store.remove_all(2).await.unwrap();
    assert_eq!(store.all_tracked_accounts(true).await.unwrap().len(), 1);
    store.remove_subscription(3, "alice").await.unwrap();
    assert!(store.all_tracked_accounts(true).await.unwrap().is_empty());
    assert!(store.distinct_watched_resolved_ids().await.unwrap().is_empty());

    // Updating a row that no longer exists is an error.
    assert!(store.update_resolution(alice, 11, "alice").await.is_err());
}

#[tokio::test]
async fn memory_store_contract() {
    let store = MemorySubscriptionStore::new();
    exercise(&store).await;
}

#[tokio::test]
async fn sqlite_store_contract() {
    let store = SqliteSubscriptionStore::connect(":memory:", Duration::from_secs(5))
        .await
        .unwrap();
    exercise(&store).await;
    store.close().await.unwrap();
}

#[tokio::test]
async fn sqlite_store_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("watcher.db");
    let path = path.to_str().unwrap();

    let store = SqliteSubscriptionStore::connect(path, Duration::from_secs(5))
        .await
        .unwrap();
    store.add_subscription(555, "alice", Some("news")).await.unwrap();
    let alice = account_id(&store, "alice").await;
    store.update_resolution(alice, 10, "alice").await.unwrap();
    store.close().await.unwrap();

    let reopened = SqliteSubscriptionStore::connect(path, Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(reopened.distinct_watched_resolved_ids().await.unwrap(), vec![10]);
    let list = reopened.list_for_chat(555).await.unwrap();
    assert_eq!(list[0].keywords.as_deref(), Some("news"));
    reopened.close().await.unwrap();
}
