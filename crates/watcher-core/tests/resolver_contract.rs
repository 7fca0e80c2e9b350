//! Architectural Contract Test: Name Resolution
//!
//! This test verifies that name resolution reconciles the store with the
//! upstream identity lookup without ever aborting on partial failure.
//!
//! Constraints verified:
//! - Resolving keeps the stored name and records the platform ID
//! - A renamed account keeps its internal ID and its subscribers
//! - A failed write leaves that row untouched and the rest resolved
//! - Only unresolved accounts are looked up unless a full pass is forced
//!
//! If this test fails, someone has added:
//! - Name matching that is case-sensitive
//! - Renames handled as remove + add (losing subscribers)
//! - Early returns on the first failed write

mod common;

use common::*;
use std::sync::Arc;
use watcher_core::NameResolver;
use watcher_core::resolver::ResolveReport;
use watcher_core::traits::SubscriptionStore;

#[tokio::test]
async fn resolves_name_to_platform_id() {
    let store = TrackingStore::new();
    store.add_subscription(1, "Example", None).await.unwrap();
    let upstream = ControlledUpstream::new().with_identity("example", 42);

    let resolver = NameResolver::new(Arc::new(store.clone()), Arc::new(upstream));
    let report = resolver.resolve(false).await.unwrap();

    assert_eq!(report.requested, 1);
    assert_eq!(report.resolved, 1);
    assert_eq!(report.renamed, 0);

    let account = store.inner.account("example").await.unwrap();
    assert_eq!(account.resolved_id, 42);
    assert_eq!(account.name, "Example", "stored casing is kept");
    assert!(account.last_resolved.is_some());
}

#[tokio::test]
async fn rename_keeps_account_and_subscribers() {
    let store = TrackingStore::new();
    store.add_subscription(1, "old_name", Some("rust")).await.unwrap();
    store.add_subscription(2, "old_name", None).await.unwrap();
    let account = store.inner.account("old_name").await.unwrap();
    store.update_resolution(account.id, 99, "old_name").await.unwrap();

    let upstream = ControlledUpstream::new().with_rename("old_name", 99, "new_name");
    let resolver = NameResolver::new(Arc::new(store.clone()), Arc::new(upstream));
    let report = resolver.resolve(true).await.unwrap();

    assert_eq!(report.renamed, 1);
    assert!(store.inner.account("old_name").await.is_none());

    let renamed = store.inner.account("new_name").await.unwrap();
    assert_eq!(renamed.id, account.id);
    assert_eq!(renamed.resolved_id, 99);

    let subscribers = store.subscribers_for_resolved_id(99).await.unwrap();
    assert_eq!(subscribers.len(), 2);
    assert!(
        subscribers
            .iter()
            .any(|s| s.chat_id == 1 && s.keywords.as_deref() == Some("rust"))
    );
}

#[tokio::test]
async fn failed_write_is_partial_and_non_fatal() {
    let store = TrackingStore::new();
    store.add_subscription(1, "alice", None).await.unwrap();
    store.add_subscription(1, "bob", None).await.unwrap();
    store.fail_updates_for("alice");

    let upstream = ControlledUpstream::new()
        .with_identity("alice", 10)
        .with_identity("bob", 20);
    let resolver = NameResolver::new(Arc::new(store.clone()), Arc::new(upstream));
    let report = resolver.resolve(false).await.unwrap();

    assert_eq!(
        report,
        ResolveReport {
            requested: 2,
            resolved: 1,
            renamed: 0,
            failed_lookups: 0,
            failed_writes: 1,
        }
    );
    assert_eq!(store.inner.account("alice").await.unwrap().resolved_id, 0);
    assert_eq!(store.inner.account("bob").await.unwrap().resolved_id, 20);
}

#[tokio::test]
async fn unknown_names_stay_unresolved() {
    let store = TrackingStore::new();
    store.add_subscription(1, "ghost", None).await.unwrap();

    let resolver = NameResolver::new(
        Arc::new(store.clone()),
        Arc::new(ControlledUpstream::new()),
    );
    let report = resolver.resolve(false).await.unwrap();

    assert_eq!(report.requested, 1);
    assert_eq!(report.resolved, 0);
    assert_eq!(store.inner.account("ghost").await.unwrap().resolved_id, 0);
}

#[tokio::test]
async fn missing_pass_skips_resolved_accounts() {
    let store = TrackingStore::new();
    store.add_subscription(1, "alice", None).await.unwrap();
    store.add_subscription(1, "bob", None).await.unwrap();
    let alice = store.inner.account("alice").await.unwrap();
    store.update_resolution(alice.id, 10, "alice").await.unwrap();

    let upstream = ControlledUpstream::new().with_identity("bob", 20);
    let resolver = NameResolver::new(Arc::new(store.clone()), Arc::new(upstream.clone()));

    let report = resolver.resolve(false).await.unwrap();
    assert_eq!(report.requested, 1);

    let report = resolver.resolve(true).await.unwrap();
    assert_eq!(report.requested, 2);
    assert_eq!(report.resolved, 0, "nothing changed on the forced pass");
    assert_eq!(upstream.lookup_calls(), 2);
}

#[tokio::test]
async fn store_read_failure_is_an_error() {
    let store = TrackingStore::new();
    store.set_failing(true);

    let resolver = NameResolver::new(Arc::new(store), Arc::new(ControlledUpstream::new()));
    assert!(resolver.resolve(true).await.is_err());
}
