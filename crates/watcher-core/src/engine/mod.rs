//! Core watcher engine
//!
//! The Watcher wires the long-lived workers together:
//! - The reload coordinator owns the stream session
//! - The receiver turns chat commands into store updates and reload signals
//! - The sender dispatches posts and delivers chat messages
//! - The scheduler requests a full re-resolve on a fixed interval
//!
//! ## Architecture
//!
//! ```text
//!  ┌────────────┐  ReloadLevel   ┌──────────────────┐  StreamSession  ┌────────────────┐
//!  │  Receiver  │───────────────►│ ReloadCoordinator│◄────────────────│ UpstreamClient │
//!  └────────────┘                └──────────────────┘                 └────────────────┘
//!        ▲   │                     ▲        │
//!        │   │ replies   Scheduler─┘        │ ClassifiedPost
//!        │   ▼                              ▼
//!  ┌────────────┐  OutboundMessage  ┌──────────────┐
//!  │MessagingBot│◄──────────────────│    Sender    │──► SubscriptionStore
//!  └────────────┘                   └──────────────┘
//! ```
//!
//! ## Shutdown
//!
//! One `CancellationToken` stops everything. It is cancelled by the signal
//! handler, by the caller of [`Watcher::run_until`], or by the coordinator
//! when a session cannot be opened. All workers are joined before the store
//! is closed.

pub mod coordinator;
pub mod window;
mod workers;

pub use coordinator::{CoordinatorState, ReloadCoordinator};
pub use window::{DropWindow, ReloadLevel, SignalDecision};

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::classifier::SkipReason;
use crate::commands::CommandHandler;
use crate::config::WatcherConfig;
use crate::dispatch::Dispatcher;
use crate::error::{Error, Result};
use crate::session::SessionManager;
use crate::traits::{MessagingBot, Post, SubscriptionStore, UpstreamClient};
use workers::{ReceiverWorker, SenderWorker, run_scheduler};

/// Events emitted by the Watcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// Engine started
    Started,

    /// A stream rebuild started
    ReloadStarted { level: ReloadLevel },

    /// A reload request arrived inside a drop window and was collapsed
    ReloadCollapsed {
        level: ReloadLevel,
        /// Level the window will rebuild at when it closes
        next: ReloadLevel,
    },

    /// A new stream session is live
    SessionOpened { accounts: usize, rules: usize },

    /// Nothing to stream (or the filter could not be built)
    SessionIdle,

    /// The live session failed; a reconnect is scheduled
    StreamFault { reason: String },

    /// A post passed classification and was handed to dispatch
    PostForwarded { post_id: String },

    /// A classified post was lost because the dispatch queue was full
    PostDropped { post_id: String },

    /// A post was filtered out
    PostSkipped { post_id: String, reason: SkipReason },

    /// A post was queued for this many chats
    PostDispatched { post_id: String, chats: usize },

    /// A chat command was answered
    CommandHandled { chat_id: i64 },

    /// A message reached the messaging bot
    MessageSent { chat_id: i64 },

    /// A message was given up on
    MessageDropped { chat_id: i64, error: String },

    /// Engine stopped
    Stopped { reason: String },
}

/// A post that passed classification, with its display text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedPost {
    pub post: Post,
    pub text: String,
}

/// Non-blocking handle for emitting engine events
#[derive(Debug, Clone)]
pub(crate) struct EventSink {
    tx: mpsc::Sender<EngineEvent>,
}

impl EventSink {
    /// Emit an engine event, dropping it if the channel is full
    pub(crate) fn emit(&self, event: EngineEvent) {
        if let Err(TrySendError::Full(_)) = self.tx.try_send(event) {
            warn!("Event channel full, dropping event. Consider increasing event_channel_capacity.");
        }
    }
}

/// The stream-to-chat watcher
///
/// ## Lifecycle
///
/// 1. Create with [`Watcher::new()`]
/// 2. Start with [`Watcher::run()`] (OS signals) or [`Watcher::run_until()`]
/// 3. Runs until cancelled or a fatal stream error
pub struct Watcher {
    store: Arc<dyn SubscriptionStore>,
    upstream: Arc<dyn UpstreamClient>,
    bot: Arc<dyn MessagingBot>,
    config: WatcherConfig,
    events: EventSink,
}

impl Watcher {
    /// Create a new watcher
    ///
    /// # Parameters
    ///
    /// - `store`: Subscription store implementation
    /// - `upstream`: Upstream post platform client
    /// - `bot`: Messaging bot client
    /// - `config`: Watcher configuration
    ///
    /// # Returns
    ///
    /// A tuple of (watcher, event_receiver) where event_receiver yields engine events
    pub fn new(
        store: Arc<dyn SubscriptionStore>,
        upstream: Arc<dyn UpstreamClient>,
        bot: Arc<dyn MessagingBot>,
        config: WatcherConfig,
    ) -> Result<(Self, mpsc::Receiver<EngineEvent>)> {
        config.validate()?;

        let (tx, rx) = mpsc::channel(config.engine.event_channel_capacity);

        let watcher = Self {
            store,
            upstream,
            bot,
            config,
            events: EventSink { tx },
        };

        Ok((watcher, rx))
    }

    /// Run until SIGINT/SIGTERM
    ///
    /// # Returns
    ///
    /// - `Ok(())`: Clean shutdown
    /// - `Err(Error)`: Fatal error
    pub async fn run(&self) -> Result<()> {
        let token = CancellationToken::new();
        let signal_token = token.clone();
        let signals = tokio::spawn(async move {
            tokio::select! {
                _ = signal_token.cancelled() => {}
                _ = shutdown_signal() => {
                    info!("Shutdown signal received");
                    signal_token.cancel();
                }
            }
        });

        let result = self.run_until(token.clone()).await;
        token.cancel();
        let _ = signals.await;
        result
    }

    /// Run until `token` is cancelled
    ///
    /// The token may also be cancelled from inside (fatal stream errors), so
    /// callers sharing it observe the shutdown too.
    pub async fn run_until(&self, token: CancellationToken) -> Result<()> {
        self.events.emit(EngineEvent::Started);
        info!(
            "Watcher started (upstream: {}, bot: {})",
            self.upstream.client_name(),
            self.bot.bot_name()
        );

        let engine = &self.config.engine;
        let (reload_tx, reload_rx) = mpsc::channel(engine.reload_channel_capacity);
        let (outbound_tx, outbound_rx) = mpsc::channel(engine.outbound_channel_capacity);
        let (posts_tx, posts_rx) = mpsc::channel(engine.post_channel_capacity);

        let sessions = SessionManager::new(
            self.store.clone(),
            self.upstream.clone(),
            self.config.upstream.stream_language.clone(),
        );
        let coordinator = ReloadCoordinator::new(
            sessions,
            reload_rx,
            posts_tx,
            self.events.clone(),
            token.clone(),
            self.config.timeouts.drop_window(),
            self.config.timeouts.fault_pause(),
        );

        let sender = SenderWorker {
            bot: self.bot.clone(),
            dispatcher: Dispatcher::new(self.store.clone(), engine.send_tries),
            outbound_rx,
            posts_rx,
            queue_limit: engine.outbound_channel_capacity,
            backoff: self.config.timeouts.backoff(),
            events: self.events.clone(),
            token: token.clone(),
        };

        let receiver = ReceiverWorker {
            bot: self.bot.clone(),
            handler: CommandHandler::new(self.store.clone(), self.config.access.clone(), reload_tx.clone()),
            outbound_tx,
            send_tries: engine.send_tries,
            events: self.events.clone(),
            token: token.clone(),
        };

        let coordinator = tokio::spawn(coordinator.run());
        let workers = [
            tokio::spawn(sender.run()),
            tokio::spawn(receiver.run()),
            tokio::spawn(run_scheduler(
                reload_tx,
                self.config.timeouts.resolve_interval(),
                token.clone(),
            )),
        ];

        let result = match coordinator.await {
            Ok(result) => result,
            Err(e) => Err(Error::Other(format!("reload coordinator panicked: {}", e))),
        };

        // Whatever stopped the coordinator stops everyone else.
        token.cancel();
        for worker in workers {
            if let Err(e) = worker.await {
                error!("Worker ended abnormally: {}", e);
            }
        }

        if let Err(e) = self.store.close().await {
            error!("Failed to close subscription store: {}", e);
        }

        let reason = match &result {
            Ok(()) => "Shutdown signal".to_string(),
            Err(e) => e.to_string(),
        };
        info!("Watcher stopped: {}", reason);
        self.events.emit(EngineEvent::Stopped { reason });

        result
    }
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = sigterm.recv() => {}
                _ = tokio::signal::ctrl_c() => {}
            }
        }
        Err(e) => {
            warn!("Failed to install SIGTERM handler: {}", e);
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
