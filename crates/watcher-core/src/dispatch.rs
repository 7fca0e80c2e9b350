//! Delivery dispatch
//!
//! Fans a classified post out to the chats subscribed to its author and
//! builds one outbound message per qualifying chat. The sender worker owns
//! the actual bot call and its bounded retry.

use std::sync::Arc;
use tracing::trace;

use crate::error::Result;
use crate::traits::{Post, SubscriptionStore};

/// Maximum length of a keyword filter
pub const MAX_KEYWORDS_LENGTH: usize = 256;

/// A per-subscription keyword filter
///
/// Comma-separated terms, matched case-insensitively as substrings. Terms
/// prefixed with `-` exclude. Any exclude match disqualifies, otherwise one
/// include match qualifies. No include terms means everything qualifies.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeywordFilter {
    include: Vec<String>,
    exclude: Vec<String>,
}

impl KeywordFilter {
    pub fn parse(raw: &str) -> Self {
        let mut filter = Self::default();
        for term in raw.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            match term.strip_prefix('-') {
                Some(negated) => {
                    let negated = negated.trim();
                    if !negated.is_empty() {
                        filter.exclude.push(negated.to_lowercase());
                    }
                }
                None => filter.include.push(term.to_lowercase()),
            }
        }
        filter
    }

    pub fn matches(&self, text: &str) -> bool {
        let text = text.to_lowercase();
        if self.exclude.iter().any(|term| text.contains(term.as_str())) {
            return false;
        }
        self.include.is_empty() || self.include.iter().any(|term| text.contains(term.as_str()))
    }
}

/// A queued message for the messaging bot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub chat_id: i64,
    pub text: String,
    /// Attempts left before the message is dropped
    pub tries: u8,
}

impl OutboundMessage {
    pub fn new(chat_id: i64, text: impl Into<String>, tries: u8) -> Self {
        Self {
            chat_id,
            text: text.into(),
            tries,
        }
    }
}

/// Render the chat message for a forwarded post
pub fn format_post_message(author: &str, text: &str, post_id: &str) -> String {
    format!(
        "New Tweet from @{}!\n\n{}\n\nhttps://twitter.com/{}/status/{}",
        author, text, author, post_id
    )
}

/// Fans classified posts out to subscriber chats
#[derive(Clone)]
pub struct Dispatcher {
    store: Arc<dyn SubscriptionStore>,
    send_tries: u8,
}

impl Dispatcher {
    pub fn new(store: Arc<dyn SubscriptionStore>, send_tries: u8) -> Self {
        Self { store, send_tries }
    }

    /// Build one outbound message per qualifying subscriber
    ///
    /// Nothing is dropped here: the caller owns every returned message and
    /// gives each one its full set of delivery attempts.
    ///
    /// # Returns
    ///
    /// The messages to deliver, in subscriber order
    pub async fn dispatch(&self, post: &Post, text: &str) -> Result<Vec<OutboundMessage>> {
        let subscribers = self.store.subscribers_for_resolved_id(post.author_id).await?;
        let message = format_post_message(&post.author_name, text, &post.id);

        let mut outbound = Vec::with_capacity(subscribers.len());
        for subscriber in subscribers {
            if subscriber.chat_id == 0 {
                continue;
            }
            if let Some(keywords) = subscriber.keywords.as_deref()
                && !KeywordFilter::parse(keywords).matches(text)
            {
                trace!("Post {} filtered out for chat {} by keywords", post.id, subscriber.chat_id);
                continue;
            }

            trace!("Queueing post {} from {} for chat {}", post.id, post.author_name, subscriber.chat_id);
            outbound.push(OutboundMessage::new(subscriber.chat_id, message.clone(), self.send_tries));
        }

        Ok(outbound)
    }
}
