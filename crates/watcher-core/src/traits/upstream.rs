// # Upstream Client Trait
//
// Defines the interface for the upstream post platform: resolving account
// names to stable platform IDs, and opening the filtered live post stream.
//
// ## Implementations
//
// - Twitter API v2: `watcher-twitter` crate
//
// ## Usage
//
// ```rust,ignore
// use watcher_core::UpstreamClient;
//
// let identities = client.lookup_identities(&["alice".to_string()]).await?;
//
// let mut session = client.open_stream(&spec).await?;
// while let Some(message) = session.next().await {
//     println!("{:?}", message);
// }
// session.close().await;
// ```

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::session::FilterSpec;

/// A resolved platform identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Stable numeric platform ID
    pub id: u64,
    /// Current screen name as reported by the platform
    pub screen_name: String,
}

impl Identity {
    pub fn new(id: u64, screen_name: impl Into<String>) -> Self {
        Self {
            id,
            screen_name: screen_name.into(),
        }
    }
}

/// A shortened link embedded in a post body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlEntity {
    /// The shortened form as it appears in the text
    pub short: String,
    /// The expanded target URL
    pub expanded: String,
}

/// A post delivered by the stream
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Post {
    /// Platform post ID
    pub id: String,
    /// Resolved ID of the author
    pub author_id: u64,
    /// Screen name of the author
    pub author_name: String,
    /// Raw post body
    pub text: String,
    /// ID of the post this one replies to, if any
    pub in_reply_to: Option<String>,
    /// Whether the post is a retweet
    pub retweet: bool,
    /// Whether the post is a quote retweet
    pub quote: bool,
    /// Short links found in the body
    pub urls: Vec<UrlEntity>,
}

/// One decoded message from the upstream stream
///
/// The stream carries several message kinds; consumers must match
/// exhaustively rather than inspect payloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamMessage {
    /// A post matching the filter
    Post(Post),
    /// Informational system notice
    Notice(String),
    /// The platform withheld posts due to rate limits
    RateLimit {
        /// Number of posts the platform reports as dropped
        dropped: u64,
    },
    /// The connection is gone (hard disconnect or transport error)
    Disconnect {
        /// Human-readable reason
        reason: String,
    },
    /// A payload the decoder did not recognise
    Unknown(String),
}

/// A live upstream connection
///
/// Owns the inbound message channel and the handle used to stop the
/// background reader. Dropping a session cancels its reader; [`close`]
/// additionally waits for the reader to exit and drains buffered messages.
///
/// [`close`]: StreamSession::close
#[derive(Debug)]
pub struct StreamSession {
    messages: mpsc::Receiver<StreamMessage>,
    token: CancellationToken,
    reader: Option<JoinHandle<()>>,
}

impl StreamSession {
    /// Create a session backed by a reader task
    ///
    /// The reader must stop once `token` is cancelled.
    pub fn new(
        messages: mpsc::Receiver<StreamMessage>,
        token: CancellationToken,
        reader: JoinHandle<()>,
    ) -> Self {
        Self {
            messages,
            token,
            reader: Some(reader),
        }
    }

    /// Create a session fed directly by a channel, with no reader task
    pub fn from_channel(messages: mpsc::Receiver<StreamMessage>) -> Self {
        Self {
            messages,
            token: CancellationToken::new(),
            reader: None,
        }
    }

    /// Token cancelled when this session is closed
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Receive the next message
    ///
    /// Returns `None` once the sender side is gone, which callers treat as
    /// a fault.
    pub async fn next(&mut self) -> Option<StreamMessage> {
        self.messages.recv().await
    }

    /// Stop the reader, wait for it to exit and drain anything buffered
    pub async fn close(mut self) {
        self.token.cancel();
        self.messages.close();

        if let Some(reader) = self.reader.take()
            && let Err(e) = reader.await
        {
            tracing::warn!("Stream reader task ended abnormally: {}", e);
        }

        let mut drained = 0usize;
        while self.messages.try_recv().is_ok() {
            drained += 1;
        }
        if drained > 0 {
            tracing::trace!("Discarded {} buffered stream messages on close", drained);
        }
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Trait for upstream platform clients
///
/// # Responsibilities
///
/// - Perform identity lookups, one API call per invocation
/// - Open exactly one live connection per [`open_stream`] call
/// - Decode stream payloads into [`StreamMessage`]
///
/// Clients must not retry or reconnect on their own. Reconnection cadence
/// is owned by the reload coordinator; a transient connection problem is
/// reported as [`StreamMessage::Disconnect`] on the session instead.
///
/// [`open_stream`]: UpstreamClient::open_stream
#[async_trait]
pub trait UpstreamClient: Send + Sync {
    /// Resolve account names to platform identities
    ///
    /// Names the platform does not know are simply absent from the result.
    /// Callers keep batches within [`lookup_batch_limit`].
    ///
    /// [`lookup_batch_limit`]: UpstreamClient::lookup_batch_limit
    async fn lookup_identities(&self, names: &[String]) -> Result<Vec<Identity>, crate::Error>;

    /// Open a filtered stream for the given spec
    ///
    /// # Returns
    ///
    /// - `Ok(StreamSession)`: A live (or immediately disconnecting) session
    /// - `Err(Error)`: The stream cannot be constructed at all (credentials,
    ///   rejected rules). Callers treat this as fatal.
    async fn open_stream(&self, spec: &FilterSpec) -> Result<StreamSession, crate::Error>;

    /// Check that the configured credentials are accepted
    async fn verify(&self) -> Result<(), crate::Error> {
        Ok(())
    }

    /// Maximum number of names per lookup call
    fn lookup_batch_limit(&self) -> usize {
        100
    }

    /// Client name (for logging)
    fn client_name(&self) -> &'static str;
}
