//! Post classification
//!
//! Decides whether a stream post is forwarded, and extracts its display text.
//! Skips are expected and frequent, so they are traced but never errors.

use tracing::trace;

use crate::traits::Post;

/// Why a post was not forwarded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// No text at all
    Empty,
    /// Reply to another post
    Reply,
    /// Retweet
    Retweet,
    /// Quote retweet
    Quote,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let reason = match self {
            SkipReason::Empty => "empty",
            SkipReason::Reply => "reply",
            SkipReason::Retweet => "retweet",
            SkipReason::Quote => "quote",
        };
        f.write_str(reason)
    }
}

/// Classifier outcome
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// Forward with this display text
    Deliver(String),
    /// Drop the post
    Skip(SkipReason),
}

/// Classify a post
///
/// Rules apply in order: empty body, reply, retweet, quote. Anything left
/// is delivered with its short links expanded.
pub fn classify(post: &Post) -> Classification {
    let reason = if post.text.trim().is_empty() {
        Some(SkipReason::Empty)
    } else if post.text.starts_with('@')
        || post.in_reply_to.as_deref().is_some_and(|id| !id.is_empty())
    {
        Some(SkipReason::Reply)
    } else if post.retweet || post.text.starts_with("RT @") {
        Some(SkipReason::Retweet)
    } else if post.quote {
        Some(SkipReason::Quote)
    } else {
        None
    };

    match reason {
        Some(reason) => {
            trace!("Skipping post {} from {}: {}", post.id, post.author_name, reason);
            Classification::Skip(reason)
        }
        None => Classification::Deliver(expand_urls(post)),
    }
}

fn expand_urls(post: &Post) -> String {
    post.urls
        .iter()
        .filter(|url| !url.short.is_empty() && !url.expanded.is_empty())
        .fold(post.text.clone(), |text, url| text.replace(&url.short, &url.expanded))
}
