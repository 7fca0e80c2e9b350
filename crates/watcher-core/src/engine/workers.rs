// # Workers
//
// The long-lived tasks around the coordinator:
//
// - **sender**: fans classified posts out and delivers queued messages
//   with bounded retry
// - **receiver**: turns inbound chat messages into commands and replies
// - **scheduler**: requests a resolve-all reload on a fixed interval
//
// Each one exits at the next blocking point once the token is cancelled.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

use super::window::ReloadLevel;
use super::{ClassifiedPost, EngineEvent, EventSink};
use crate::commands::CommandHandler;
use crate::dispatch::{Dispatcher, OutboundMessage};
use crate::traits::MessagingBot;

pub(crate) struct SenderWorker {
    pub bot: Arc<dyn MessagingBot>,
    pub dispatcher: Dispatcher,
    /// Command replies from the receiver worker
    pub outbound_rx: mpsc::Receiver<OutboundMessage>,
    pub posts_rx: mpsc::Receiver<ClassifiedPost>,
    /// Stop taking new posts while this many messages wait for delivery
    pub queue_limit: usize,
    pub backoff: Duration,
    pub events: EventSink,
    pub token: CancellationToken,
}

impl SenderWorker {
    pub async fn run(mut self) {
        debug!("Starting sender worker");
        // Fan-out and retries land here, so a post reaches every qualifying
        // chat no matter how many there are.
        let mut queue: VecDeque<OutboundMessage> = VecDeque::new();
        loop {
            tokio::select! {
                biased;

                _ = self.token.cancelled() => break,

                Some(message) = self.outbound_rx.recv() => queue.push_back(message),

                Some(classified) = self.posts_rx.recv(), if queue.len() < self.queue_limit => {
                    let ClassifiedPost { post, text } = classified;
                    trace!("Received post {} from {}", post.id, post.author_name);
                    match self.dispatcher.dispatch(&post, &text).await {
                        Ok(messages) => {
                            let chats = messages.len();
                            queue.extend(messages);
                            self.events.emit(EngineEvent::PostDispatched { post_id: post.id, chats });
                        }
                        Err(e) => error!("Failed to look up subscribers for post {}: {}", post.id, e),
                    }
                }

                _ = std::future::ready(()), if !queue.is_empty() => {
                    let Some(message) = queue.pop_front() else {
                        continue;
                    };
                    match self.deliver(message).await {
                        Delivery::Done => {}
                        Delivery::Retry(message) => queue.push_back(message),
                        Delivery::Cancelled => break,
                    }
                }
            }
        }
        if !queue.is_empty() {
            debug!("Sender worker discarding {} undelivered message(s)", queue.len());
        }
        debug!("Sender worker stopped");
    }

    /// One delivery attempt, with the retry backoff on failure
    async fn deliver(&self, mut message: OutboundMessage) -> Delivery {
        let error = match self.bot.send_message(message.chat_id, &message.text).await {
            Ok(()) => {
                self.events.emit(EngineEvent::MessageSent { chat_id: message.chat_id });
                return Delivery::Done;
            }
            Err(e) => e,
        };

        warn!("Failed to send message to chat {} via {}: {}", message.chat_id, self.bot.bot_name(), error);
        if message.tries <= 1 {
            error!("Dropping message to chat {}: send failed too many times", message.chat_id);
            self.events.emit(EngineEvent::MessageDropped {
                chat_id: message.chat_id,
                error: error.to_string(),
            });
            return Delivery::Done;
        }
        message.tries -= 1;

        trace!("Sleeping for {:?} before retrying chat {}", self.backoff, message.chat_id);
        tokio::select! {
            _ = self.token.cancelled() => Delivery::Cancelled,
            _ = tokio::time::sleep(self.backoff) => Delivery::Retry(message),
        }
    }
}

/// Outcome of one delivery attempt
enum Delivery {
    /// Sent, or given up on
    Done,
    /// Failed with attempts left; goes to the back of the queue
    Retry(OutboundMessage),
    Cancelled,
}

pub(crate) struct ReceiverWorker {
    pub bot: Arc<dyn MessagingBot>,
    pub handler: CommandHandler,
    pub outbound_tx: mpsc::Sender<OutboundMessage>,
    pub send_tries: u8,
    pub events: EventSink,
    pub token: CancellationToken,
}

impl ReceiverWorker {
    pub async fn run(mut self) {
        debug!("Starting receiver worker");
        let mut updates = self.bot.updates();
        loop {
            let message = tokio::select! {
                biased;

                _ = self.token.cancelled() => break,

                next = updates.next() => match next {
                    Some(message) => message,
                    None => {
                        error!("Inbound message stream from {} ended", self.bot.bot_name());
                        self.token.cancelled().await;
                        break;
                    }
                },
            };

            trace!("Received message from '{}' in chat {}", message.sender, message.chat_id);
            let reply = self.handler.handle(&message).await;
            self.events.emit(EngineEvent::CommandHandled { chat_id: message.chat_id });

            let outbound = OutboundMessage::new(message.chat_id, reply, self.send_tries);
            tokio::select! {
                _ = self.token.cancelled() => break,
                sent = self.outbound_tx.send(outbound) => {
                    if sent.is_err() {
                        warn!("Outbound queue closed, dropping reply to chat {}", message.chat_id);
                    }
                }
            }
        }
        debug!("Receiver worker stopped");
    }
}

/// Request a resolve-all reload every `interval`
pub(crate) async fn run_scheduler(
    reload_tx: mpsc::Sender<ReloadLevel>,
    interval: Duration,
    token: CancellationToken,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {
                debug!("Scheduled resolve of all tracked accounts");
                tokio::select! {
                    _ = token.cancelled() => break,
                    sent = reload_tx.send(ReloadLevel::ResolveAll) => {
                        if sent.is_err() {
                            break;
                        }
                    }
                }
            }
        }
    }
    debug!("Resolve scheduler stopped");
}
