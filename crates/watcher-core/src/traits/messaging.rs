// # Messaging Bot Trait
//
// Defines the interface for the chat side of the bridge: a stream of inbound
// command messages and a single-shot outbound send.
//
// ## Implementations
//
// - Telegram Bot API: `watcher-telegram` crate

use async_trait::async_trait;
use std::pin::Pin;
use tokio_stream::Stream;

/// An inbound chat message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Chat the message was sent from (replies go here)
    pub chat_id: i64,
    /// Handle of the sender, used for access control
    pub sender: String,
    /// Raw message text
    pub text: String,
}

impl InboundMessage {
    pub fn new(chat_id: i64, sender: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            chat_id,
            sender: sender.into(),
            text: text.into(),
        }
    }
}

/// Trait for messaging bot implementations
///
/// `send_message` is single-shot: it makes one API call and reports the
/// outcome. Retry and backoff are owned by the sender worker.
#[async_trait]
pub trait MessagingBot: Send + Sync {
    /// Send a text message to a chat
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), crate::Error>;

    /// Stream of inbound messages
    ///
    /// The stream runs until the consumer drops it. Any background task
    /// feeding it must stop once the consumer is gone.
    fn updates(&self) -> Pin<Box<dyn Stream<Item = InboundMessage> + Send + 'static>>;

    /// Check that the bot credentials are accepted
    async fn verify(&self) -> Result<(), crate::Error> {
        Ok(())
    }

    /// Bot name (for logging)
    fn bot_name(&self) -> &'static str;
}
