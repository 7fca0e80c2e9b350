// # Reload Coordinator
//
// Sole owner of the live stream session. Serializes every reload request
// (commands, the resolve schedule, stream faults) through the drop window,
// so at most one rebuild happens per window.
//
// ## Transitions
//
// | State              | Input              | Effect                                          |
// |--------------------|--------------------|-------------------------------------------------|
// | Idle / Streaming   | signal(l)          | close, build, open, enter Dropping              |
// | Dropping           | signal(l)          | collapsed = max(collapsed, l)                   |
// | Dropping           | tick, collapsed l  | rebuild at l, fresh window                      |
// | Dropping           | tick, nothing      | back to Idle / Streaming                        |
// | Streaming          | fault              | close, after the fault pause signal(Current)    |
// | any                | cancel             | close, Terminating                              |
//
// Cancellation is also observed while a rebuild is resolving or opening.
//
// A failed session open is fatal: the process-wide token is cancelled and
// the error returned.

use std::future::pending;
use std::pin::Pin;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, Interval, MissedTickBehavior, Sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use super::window::{DropWindow, ReloadLevel, SignalDecision};
use super::{ClassifiedPost, EngineEvent, EventSink};
use crate::classifier::{Classification, classify};
use crate::error::Result;
use crate::session::SessionManager;
use crate::traits::{StreamMessage, StreamSession};

/// Coordinator state, derived from the session and the drop window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    /// No session and no window
    Idle,
    /// A session is live and no window is open
    Streaming,
    /// Reload signals are being collapsed
    Dropping,
    /// Shutting down
    Terminating,
}

/// Owns the stream session and the debounce window
pub struct ReloadCoordinator {
    sessions: SessionManager,
    reload_rx: mpsc::Receiver<ReloadLevel>,
    posts_tx: mpsc::Sender<ClassifiedPost>,
    events: EventSink,
    token: CancellationToken,
    fault_pause: Duration,
    drop_window: Duration,
    session: Option<StreamSession>,
    window: DropWindow,
    ticker: Interval,
    reconnect: Option<Pin<Box<Sleep>>>,
    terminating: bool,
}

impl ReloadCoordinator {
    /// Create a coordinator
    ///
    /// # Parameters
    ///
    /// - `sessions`: Filter builder and session opener
    /// - `reload_rx`: Reload signals from every other worker
    /// - `posts_tx`: Classified posts for the sender worker
    /// - `drop_window`: Debounce window after each rebuild
    /// - `fault_pause`: Pause before reconnecting after a fault
    pub(crate) fn new(
        sessions: SessionManager,
        reload_rx: mpsc::Receiver<ReloadLevel>,
        posts_tx: mpsc::Sender<ClassifiedPost>,
        events: EventSink,
        token: CancellationToken,
        drop_window: Duration,
        fault_pause: Duration,
    ) -> Self {
        let mut ticker = tokio::time::interval_at(Instant::now() + drop_window, drop_window);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            sessions,
            reload_rx,
            posts_tx,
            events,
            token,
            fault_pause,
            drop_window,
            session: None,
            window: DropWindow::new(),
            ticker,
            reconnect: None,
            terminating: false,
        }
    }

    /// Current state
    pub fn state(&self) -> CoordinatorState {
        if self.terminating {
            CoordinatorState::Terminating
        } else if self.window.is_dropping() {
            CoordinatorState::Dropping
        } else if self.session.is_some() {
            CoordinatorState::Streaming
        } else {
            CoordinatorState::Idle
        }
    }

    /// Run until cancelled or a session cannot be opened
    ///
    /// # Returns
    ///
    /// - `Ok(())`: Cancelled
    /// - `Err(Error)`: Fatal open failure (the token has been cancelled)
    pub async fn run(mut self) -> Result<()> {
        debug!("Starting reload coordinator");

        let result = match self.build(ReloadLevel::ResolveAll).await {
            Ok(()) => self.event_loop().await,
            Err(e) => Err(e),
        };

        self.terminating = true;
        let session = self.session.take();
        self.sessions.close_session(session).await;
        self.reconnect = None;

        if let Err(e) = &result {
            error!("Reload coordinator stopped on fatal error: {}", e);
            self.token.cancel();
        } else {
            debug!("Reload coordinator stopped");
        }
        result
    }

    async fn event_loop(&mut self) -> Result<()> {
        loop {
            tokio::select! {
                biased;

                _ = self.token.cancelled() => {
                    debug!("Reload coordinator cancelled");
                    return Ok(());
                }

                _ = self.ticker.tick() => {
                    self.on_tick().await?;
                }

                Some(level) = self.reload_rx.recv() => {
                    self.on_signal(level).await?;
                }

                message = next_message(&mut self.session) => {
                    self.on_message(message).await;
                }

                _ = wait_reconnect(&mut self.reconnect) => {
                    self.reconnect = None;
                    debug!("Fault pause elapsed, reconnecting");
                    self.on_signal(ReloadLevel::Current).await?;
                }
            }
        }
    }

    async fn on_tick(&mut self) -> Result<()> {
        if !self.window.is_dropping() {
            return Ok(());
        }
        match self.window.on_tick() {
            Some(level) => {
                debug!("Drop window closed with collapsed {:?} request", level);
                self.rebuild(level).await
            }
            None => {
                trace!("Drop complete, accepting reload requests ({:?})", self.state());
                Ok(())
            }
        }
    }

    async fn on_signal(&mut self, level: ReloadLevel) -> Result<()> {
        match self.window.on_signal(level) {
            SignalDecision::Rebuild(level) => self.rebuild(level).await,
            SignalDecision::Collapsed { next } => {
                trace!("Ignoring dropped reload request ({:?}, next {:?})", level, next);
                self.events.emit(EngineEvent::ReloadCollapsed { level, next });
                Ok(())
            }
        }
    }

    /// Rebuild and open a fresh drop window
    async fn rebuild(&mut self, level: ReloadLevel) -> Result<()> {
        self.build(level).await?;
        self.window.on_rebuilt();
        self.ticker.reset();
        trace!("Dropping reload requests for {:?}", self.drop_window);
        Ok(())
    }

    /// Replace the session: close the old one fully, then build and open
    async fn build(&mut self, level: ReloadLevel) -> Result<()> {
        info!("Reloading stream ({:?})", level);
        self.events.emit(EngineEvent::ReloadStarted { level });

        // A rebuild supersedes a pending fault reconnect.
        self.reconnect = None;
        let previous = self.session.take();
        self.sessions.close_session(previous).await;

        // Resolving and opening can take many round trips; shutdown wins.
        let token = self.token.clone();
        let built = tokio::select! {
            biased;
            _ = token.cancelled() => {
                debug!("Reload abandoned for shutdown while building the filter");
                return Ok(());
            }
            built = self.sessions.build_filter(level.resolve_first(), level.resolve_all()) => built,
        };

        let spec = match built {
            Ok(Some(spec)) => spec,
            Ok(None) => {
                self.events.emit(EngineEvent::SessionIdle);
                return Ok(());
            }
            Err(e) => {
                error!("Failed to build stream filter, staying without a stream: {}", e);
                self.events.emit(EngineEvent::SessionIdle);
                return Ok(());
            }
        };

        let session = tokio::select! {
            biased;
            _ = token.cancelled() => {
                debug!("Reload abandoned for shutdown while opening the stream");
                return Ok(());
            }
            opened = self.sessions.open_session(&spec) => opened?,
        };
        self.session = Some(session);
        self.events.emit(EngineEvent::SessionOpened {
            accounts: spec.ids.len(),
            rules: spec.rules.len(),
        });
        Ok(())
    }

    async fn on_message(&mut self, message: Option<StreamMessage>) {
        match message {
            Some(StreamMessage::Post(post)) => match classify(&post) {
                Classification::Deliver(text) => {
                    let post_id = post.id.clone();
                    match self.posts_tx.try_send(ClassifiedPost { post, text }) {
                        Ok(()) => self.events.emit(EngineEvent::PostForwarded { post_id }),
                        Err(e) => {
                            warn!("Dispatch queue unavailable, dropping post {}: {}", post_id, e);
                            self.events.emit(EngineEvent::PostDropped { post_id });
                        }
                    }
                }
                Classification::Skip(reason) => {
                    self.events.emit(EngineEvent::PostSkipped {
                        post_id: post.id,
                        reason,
                    });
                }
            },
            Some(StreamMessage::Notice(notice)) => {
                info!("Stream notice: {}", notice);
            }
            Some(StreamMessage::RateLimit { dropped }) => {
                warn!("Stream is rate limited, {} posts withheld", dropped);
            }
            Some(StreamMessage::Unknown(payload)) => {
                warn!("Unrecognized stream message: {}", payload);
            }
            Some(StreamMessage::Disconnect { reason }) => self.on_fault(reason).await,
            None => self.on_fault("stream channel closed".to_string()).await,
        }
    }

    /// Drop the broken session and arm the fixed-pause reconnect
    async fn on_fault(&mut self, reason: String) {
        error!("Stream disconnected: {}", reason);
        let broken = self.session.take();
        self.sessions.close_session(broken).await;
        self.reconnect = Some(Box::pin(tokio::time::sleep(self.fault_pause)));
        self.events.emit(EngineEvent::StreamFault { reason });
    }
}

async fn next_message(session: &mut Option<StreamSession>) -> Option<StreamMessage> {
    match session {
        Some(session) => session.next().await,
        None => pending().await,
    }
}

async fn wait_reconnect(reconnect: &mut Option<Pin<Box<Sleep>>>) {
    match reconnect {
        Some(sleep) => sleep.as_mut().await,
        None => pending().await,
    }
}
