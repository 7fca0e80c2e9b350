//! Test doubles and common utilities for contract tests
//!
//! This module provides minimal test doubles that verify the watcher's
//! architectural constraints without talking to real services.

#![allow(dead_code)]

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::Stream;
use watcher_core::config::{AccessConfig, StoreConfig, WatcherConfig};
use watcher_core::error::{Error, Result};
use watcher_core::session::FilterSpec;
use watcher_core::traits::{
    Identity, InboundMessage, MessagingBot, Post, StreamMessage, StreamSession, Subscriber,
    Subscription, SubscriptionStore, TrackedAccount, UpstreamClient,
};
use watcher_core::{EngineEvent, MemorySubscriptionStore};

/// An upstream whose lookups and stream are driven by the test
#[derive(Clone, Default)]
pub struct ControlledUpstream {
    /// (name the lookup answers to, identity returned)
    identities: Arc<Mutex<Vec<(String, Identity)>>>,
    lookup_calls: Arc<AtomicUsize>,
    opened: Arc<Mutex<Vec<FilterSpec>>>,
    live: Arc<Mutex<Option<mpsc::Sender<StreamMessage>>>>,
    overlaps: Arc<AtomicUsize>,
    fail_open: Arc<AtomicBool>,
    lookup_delay: Arc<Mutex<Option<Duration>>>,
}

impl ControlledUpstream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer lookups of `name` with `id`
    pub fn with_identity(self, name: &str, id: u64) -> Self {
        self.identities
            .lock()
            .unwrap()
            .push((name.to_string(), Identity::new(id, name)));
        self
    }

    /// Answer lookups of `old` with `id` under the name `new`
    pub fn with_rename(self, old: &str, id: u64, new: &str) -> Self {
        self.identities
            .lock()
            .unwrap()
            .push((old.to_string(), Identity::new(id, new)));
        self
    }

    /// Make every lookup take `delay` before answering
    pub fn with_lookup_delay(self, delay: Duration) -> Self {
        *self.lookup_delay.lock().unwrap() = Some(delay);
        self
    }

    /// Make every following open_stream call fail with an auth error
    pub fn fail_opens(&self, fail: bool) {
        self.fail_open.store(fail, Ordering::SeqCst);
    }

    pub fn lookup_calls(&self) -> usize {
        self.lookup_calls.load(Ordering::SeqCst)
    }

    pub fn open_count(&self) -> usize {
        self.opened.lock().unwrap().len()
    }

    pub fn opened_specs(&self) -> Vec<FilterSpec> {
        self.opened.lock().unwrap().clone()
    }

    /// Sessions opened while the previous one was still open
    pub fn overlaps(&self) -> usize {
        self.overlaps.load(Ordering::SeqCst)
    }

    /// Whether a session is currently open
    pub fn is_live(&self) -> bool {
        self.live
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(|tx| !tx.is_closed())
    }

    /// Push a message onto the live session
    pub fn push(&self, message: StreamMessage) -> bool {
        let tx = self.live.lock().unwrap().clone();
        tx.is_some_and(|tx| tx.try_send(message).is_ok())
    }

    /// Drop the live session's sender, which the coordinator sees as a fault
    pub fn disconnect(&self) {
        self.live.lock().unwrap().take();
    }
}

#[async_trait::async_trait]
impl UpstreamClient for ControlledUpstream {
    async fn lookup_identities(&self, names: &[String]) -> Result<Vec<Identity>> {
        self.lookup_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.lookup_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self
            .identities
            .lock()
            .unwrap()
            .iter()
            .filter(|(name, _)| names.iter().any(|n| n.eq_ignore_ascii_case(name)))
            .map(|(_, identity)| identity.clone())
            .collect())
    }

    async fn open_stream(&self, spec: &FilterSpec) -> Result<StreamSession> {
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(Error::auth("stream rules rejected"));
        }

        let (tx, rx) = mpsc::channel(64);
        let mut live = self.live.lock().unwrap();
        if live.as_ref().is_some_and(|previous| !previous.is_closed()) {
            self.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        *live = Some(tx);
        self.opened.lock().unwrap().push(spec.clone());

        Ok(StreamSession::from_channel(rx))
    }

    fn client_name(&self) -> &'static str {
        "controlled"
    }
}

/// A messaging bot that records sends and lets the test inject commands
#[derive(Clone)]
pub struct RecordingBot {
    sent: Arc<Mutex<Vec<(i64, String)>>>,
    attempts: Arc<AtomicUsize>,
    failures: Arc<AtomicUsize>,
    inbound_tx: mpsc::UnboundedSender<InboundMessage>,
    inbound_rx: Arc<Mutex<Option<mpsc::UnboundedReceiver<InboundMessage>>>>,
}

impl RecordingBot {
    pub fn new() -> Self {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        Self {
            sent: Arc::new(Mutex::new(Vec::new())),
            attempts: Arc::new(AtomicUsize::new(0)),
            failures: Arc::new(AtomicUsize::new(0)),
            inbound_tx,
            inbound_rx: Arc::new(Mutex::new(Some(inbound_rx))),
        }
    }

    /// Inject an inbound chat message
    pub fn say(&self, chat_id: i64, sender: &str, text: &str) {
        let _ = self.inbound_tx.send(InboundMessage::new(chat_id, sender, text));
    }

    /// Fail the next `n` send attempts
    pub fn fail_next(&self, n: usize) {
        self.failures.store(n, Ordering::SeqCst);
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<(i64, String)> {
        self.sent.lock().unwrap().clone()
    }

    /// Delivered post notifications (not command replies)
    pub fn notifications(&self) -> Vec<(i64, String)> {
        self.sent()
            .into_iter()
            .filter(|(_, text)| text.starts_with("New Tweet from"))
            .collect()
    }
}

#[async_trait::async_trait]
impl MessagingBot for RecordingBot {
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(Error::messaging("injected send failure"));
        }
        self.sent.lock().unwrap().push((chat_id, text.to_string()));
        Ok(())
    }

    fn updates(&self) -> Pin<Box<dyn Stream<Item = InboundMessage> + Send + 'static>> {
        match self.inbound_rx.lock().unwrap().take() {
            Some(rx) => Box::pin(tokio_stream::wrappers::UnboundedReceiverStream::new(rx)),
            None => Box::pin(tokio_stream::pending::<InboundMessage>()),
        }
    }

    fn bot_name(&self) -> &'static str {
        "recording"
    }
}

/// A memory store that counts closes and can be switched into failure
#[derive(Clone, Default)]
pub struct TrackingStore {
    pub inner: MemorySubscriptionStore,
    failing: Arc<AtomicBool>,
    fail_updates_for: Arc<Mutex<Option<String>>>,
    closes: Arc<AtomicUsize>,
}

impl TrackingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every operation fail
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Make update_resolution fail for one account name
    pub fn fail_updates_for(&self, name: &str) {
        *self.fail_updates_for.lock().unwrap() = Some(name.to_string());
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::store("database is unavailable"));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl SubscriptionStore for TrackingStore {
    async fn add_subscription(&self, chat_id: i64, name: &str, keywords: Option<&str>) -> Result<u64> {
        self.check()?;
        self.inner.add_subscription(chat_id, name, keywords).await
    }

    async fn remove_subscription(&self, chat_id: i64, name: &str) -> Result<()> {
        self.check()?;
        self.inner.remove_subscription(chat_id, name).await
    }

    async fn remove_all(&self, chat_id: i64) -> Result<()> {
        self.check()?;
        self.inner.remove_all(chat_id).await
    }

    async fn list_for_chat(&self, chat_id: i64) -> Result<Vec<Subscription>> {
        self.check()?;
        self.inner.list_for_chat(chat_id).await
    }

    async fn all_tracked_accounts(&self, force_all: bool) -> Result<Vec<TrackedAccount>> {
        self.check()?;
        self.inner.all_tracked_accounts(force_all).await
    }

    async fn update_resolution(&self, id: i64, resolved_id: u64, name: &str) -> Result<()> {
        self.check()?;
        let blocked = self.fail_updates_for.lock().unwrap().clone();
        if let Some(blocked) = blocked {
            let accounts = self.inner.all_tracked_accounts(true).await?;
            if accounts.iter().any(|a| a.id == id && a.name.eq_ignore_ascii_case(&blocked)) {
                return Err(Error::store("row is locked"));
            }
        }
        self.inner.update_resolution(id, resolved_id, name).await
    }

    async fn distinct_watched_resolved_ids(&self) -> Result<Vec<u64>> {
        self.check()?;
        self.inner.distinct_watched_resolved_ids().await
    }

    async fn subscribers_for_resolved_id(&self, resolved_id: u64) -> Result<Vec<Subscriber>> {
        self.check()?;
        self.inner.subscribers_for_resolved_id(resolved_id).await
    }

    async fn close(&self) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Helper to create a minimal WatcherConfig for testing
pub fn test_config() -> WatcherConfig {
    let mut config = WatcherConfig::new();
    config.upstream.bearer_token = "test-bearer".to_string();
    config.messaging.bot_token = "123:test".to_string();
    config.store = StoreConfig::Memory;
    config.access = AccessConfig::default();
    config.timeouts.backoff_secs = 1;
    config.timeouts.drop_window_secs = 60;
    config.timeouts.fault_pause_secs = 5;
    config.engine.event_channel_capacity = 1000;
    config
}

/// A post authored by `author_id`
pub fn post(id: &str, author_id: u64, author: &str, text: &str) -> Post {
    Post {
        id: id.to_string(),
        author_id,
        author_name: author.to_string(),
        text: text.to_string(),
        ..Default::default()
    }
}

/// Poll `condition` until it holds, failing the test after `limit`
pub async fn wait_until(limit: Duration, mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + limit;
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met within {:?}",
            limit
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Drain every event currently buffered
pub fn drain(rx: &mut mpsc::Receiver<EngineEvent>) -> Vec<EngineEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Levels of every ReloadStarted event
pub fn reload_levels(events: &[EngineEvent]) -> Vec<watcher_core::ReloadLevel> {
    events
        .iter()
        .filter_map(|event| match event {
            EngineEvent::ReloadStarted { level } => Some(*level),
            _ => None,
        })
        .collect()
}
