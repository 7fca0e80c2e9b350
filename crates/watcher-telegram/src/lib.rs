// # Telegram Messaging Bot
//
// This crate provides the Telegram Bot API implementation of `MessagingBot`.
//
// ## Inbound
//
// A background task long-polls `getUpdates`, tracking the update offset, and
// forwards text messages as `InboundMessage`s. The task stops as soon as the
// consumer drops the stream.
//
// ## Outbound
//
// `send_message` makes exactly one `sendMessage` call. Retries are owned by
// the watcher's sender worker.
//
// ## Security
//
// The bot token is part of every request URL. It never appears in logs,
// Debug output or error messages (request errors are stripped of their URL).

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use std::pin::Pin;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::Stream;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, trace, warn};
use watcher_core::traits::{InboundMessage, MessagingBot};
use watcher_core::{Error, Result};

/// Telegram Bot API base URL
const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Telegram `sendMessage` text limit (characters)
const TELEGRAM_MESSAGE_LIMIT: usize = 4096;

/// Timeout for ordinary API calls
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Server-side long-poll duration for `getUpdates` (seconds)
const LONG_POLL_SECS: u64 = 30;

/// Pause after a failed `getUpdates` call
const POLL_ERROR_PAUSE: Duration = Duration::from_secs(5);

/// Inbound messages buffered ahead of the receiver worker
const INBOUND_CHANNEL_CAPACITY: usize = 64;

/// Telegram Bot API client
///
/// # Security
///
/// The Debug implementation does NOT expose the bot token.
#[derive(Clone)]
pub struct TelegramBot {
    /// Bot token
    /// ⚠️ NEVER log this value
    token: String,

    /// API base URL (overridable for tests)
    api_base: String,

    client: reqwest::Client,
}

// Custom Debug implementation that hides the bot token
impl std::fmt::Debug for TelegramBot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramBot")
            .field("token", &"<REDACTED>")
            .field("api_base", &self.api_base)
            .finish()
    }
}

impl TelegramBot {
    /// Create a new Telegram bot client
    ///
    /// # Parameters
    ///
    /// - `token`: Bot token issued by BotFather
    ///
    /// # Returns
    ///
    /// - `Ok(TelegramBot)`: Client ready to use
    /// - `Err(Error)`: Empty token or the HTTP client could not be built
    pub fn new(token: impl Into<String>) -> Result<Self> {
        Self::with_base_url(token, TELEGRAM_API_BASE)
    }

    /// Create a client talking to a different API host
    pub fn with_base_url(token: impl Into<String>, api_base: impl Into<String>) -> Result<Self> {
        let token = token.into();
        if token.is_empty() {
            return Err(Error::config("Telegram bot token cannot be empty"));
        }

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::http(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            token,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.token, method)
    }

    /// One long-poll round
    ///
    /// # API Call
    ///
    /// ```http
    /// POST /bot<token>/getUpdates
    /// {"offset": 42, "timeout": 30, "allowed_updates": ["message"]}
    /// ```
    async fn get_updates(&self, offset: i64) -> Result<Vec<Update>> {
        let payload = json!({
            "offset": offset,
            "timeout": LONG_POLL_SECS,
            "allowed_updates": ["message"],
        });

        let response = self
            .client
            .post(self.method_url("getUpdates"))
            .timeout(Duration::from_secs(LONG_POLL_SECS) + DEFAULT_HTTP_TIMEOUT)
            .json(&payload)
            .send()
            .await
            .map_err(request_error)?;

        let body: ApiResponse<Vec<Update>> = parse(response, "getUpdates").await?;
        Ok(body.result.unwrap_or_default())
    }
}

#[async_trait]
impl MessagingBot for TelegramBot {
    /// Send a text message
    ///
    /// # API Call
    ///
    /// ```http
    /// POST /bot<token>/sendMessage
    /// {"chat_id": 555, "text": "..."}
    /// ```
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<()> {
        let payload = json!({
            "chat_id": chat_id,
            "text": truncate_message(text, TELEGRAM_MESSAGE_LIMIT),
        });

        let response = self
            .client
            .post(self.method_url("sendMessage"))
            .json(&payload)
            .send()
            .await
            .map_err(request_error)?;

        let _: ApiResponse<serde_json::Value> = parse(response, "sendMessage").await?;
        trace!("Message sent to chat {}", chat_id);
        Ok(())
    }

    fn updates(&self) -> Pin<Box<dyn Stream<Item = InboundMessage> + Send + 'static>> {
        let (tx, rx) = mpsc::channel(INBOUND_CHANNEL_CAPACITY);
        let bot = self.clone();

        tokio::spawn(async move {
            info!("Starting Telegram update polling");
            let mut offset: i64 = 0;

            loop {
                let polled = tokio::select! {
                    _ = tx.closed() => break,
                    polled = bot.get_updates(offset) => polled,
                };

                let updates = match polled {
                    Ok(updates) => updates,
                    Err(e) => {
                        warn!("Telegram getUpdates failed: {}", e);
                        tokio::select! {
                            _ = tx.closed() => break,
                            _ = tokio::time::sleep(POLL_ERROR_PAUSE) => continue,
                        }
                    }
                };

                for update in updates {
                    offset = offset.max(update.update_id + 1);
                    let Some(message) = update.into_inbound() else {
                        continue;
                    };
                    if tx.send(message).await.is_err() {
                        debug!("Update consumer dropped, stopping polling");
                        return;
                    }
                }
            }
            debug!("Telegram update polling stopped");
        });

        Box::pin(ReceiverStream::new(rx))
    }

    /// Check the bot token with `getMe`
    async fn verify(&self) -> Result<()> {
        let response = self
            .client
            .get(self.method_url("getMe"))
            .send()
            .await
            .map_err(request_error)?;

        let body: ApiResponse<BotUser> = parse(response, "getMe").await?;
        if let Some(user) = body.result {
            info!("Telegram bot authorized as @{}", user.username.unwrap_or_default());
        }
        Ok(())
    }

    fn bot_name(&self) -> &'static str {
        "telegram"
    }
}

/// Strip the URL (which carries the token) from a request error
fn request_error(error: reqwest::Error) -> Error {
    Error::http(format!("HTTP request failed: {}", error.without_url()))
}

/// Check the status and decode the Bot API envelope
async fn parse<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
    method: &str,
) -> Result<ApiResponse<T>> {
    let status = response.status();
    let text = response.text().await.map_err(request_error)?;
    let body: ApiResponse<T> = match serde_json::from_str(&text) {
        Ok(body) => body,
        Err(e) if status.is_success() => {
            return Err(Error::messaging(format!("{}: failed to parse response: {}", method, e)));
        }
        Err(_) => ApiResponse {
            ok: false,
            result: None,
            description: Some(text.chars().take(200).collect()),
            parameters: None,
        },
    };

    if status.is_success() && body.ok {
        return Ok(body);
    }
    Err(status_error(status, &body, method))
}

fn status_error<T>(status: StatusCode, body: &ApiResponse<T>, method: &str) -> Error {
    let description = body.description.as_deref().unwrap_or("no description");
    match status.as_u16() {
        401 => Error::auth(format!("{}: bot token rejected. Status: {}", method, status)),
        429 => {
            let retry_after = body
                .parameters
                .as_ref()
                .and_then(|p| p.retry_after)
                .unwrap_or_default();
            Error::rate_limited(format!("{}: retry after {}s", method, retry_after))
        }
        500..=599 => Error::http(format!("Telegram server error (transient): {} - {}", status, description)),
        _ => Error::messaging(format!("{} failed: {} - {}", method, status, description)),
    }
}

/// Truncate a message to fit within the Telegram character limit
fn truncate_message(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let suffix = "\n\n[truncated]";
    let budget = limit - suffix.len();
    let truncated: String = text.chars().take(budget).collect();
    format!("{truncated}{suffix}")
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    #[serde(default)]
    ok: bool,
    result: Option<T>,
    description: Option<String>,
    parameters: Option<ResponseParameters>,
}

#[derive(Debug, Default, Deserialize)]
struct ResponseParameters {
    retry_after: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct BotUser {
    username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    message: Option<Message>,
}

#[derive(Debug, Deserialize)]
struct Message {
    chat: Chat,
    from: Option<Sender>,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Chat {
    id: i64,
    username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Sender {
    username: Option<String>,
}

impl Update {
    /// Text messages only; the chat's handle is used for access control
    fn into_inbound(self) -> Option<InboundMessage> {
        let message = self.message?;
        let text = message.text?;
        let sender = message
            .chat
            .username
            .or_else(|| message.from.and_then(|from| from.username))
            .unwrap_or_default();
        Some(InboundMessage::new(message.chat.id, sender, text))
    }
}
