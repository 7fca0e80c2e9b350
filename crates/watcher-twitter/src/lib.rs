// # Twitter Upstream Client
//
// This crate provides the Twitter API v2 implementation of `UpstreamClient`.
//
// ## Responsibilities
//
// - Resolve screen names to user IDs (`GET /2/users/by`)
// - Replace the filtered-stream rule set with the one built for a session
// - Connect to the filtered stream and decode its newline-delimited JSON
//
// ## Constraints
//
// - One connection per `open_stream` call. No reconnects, no retries: the
//   reload coordinator owns reconnection cadence.
// - Credential and rule errors fail the open. A rate-limited or failing
//   server yields a session that reports a disconnect instead.
// - The bearer token never appears in logs or Debug output.
//
// ## API Reference
//
// - User lookup: GET `/2/users/by?usernames=..`
// - Stream rules: GET/POST `/2/tweets/search/stream/rules`
// - Filtered stream: GET `/2/tweets/search/stream`

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use watcher_core::session::FilterSpec;
use watcher_core::traits::{Identity, Post, StreamMessage, StreamSession, UpstreamClient, UrlEntity};
use watcher_core::{Error, Result};

/// Twitter API base URL
const TWITTER_API_BASE: &str = "https://api.twitter.com";

/// Timeout for REST calls (lookups, rules)
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Connect timeout for the stream (the body itself never times out)
const STREAM_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// The stream sends a keep-alive newline every 20 seconds
const KEEP_ALIVE_TIMEOUT: Duration = Duration::from_secs(90);

/// Decoded messages buffered between the reader and the coordinator
const STREAM_CHANNEL_CAPACITY: usize = 256;

/// Maximum usernames per lookup call
const LOOKUP_LIMIT: usize = 100;

/// Tag attached to every rule this client creates
const RULE_TAG: &str = "watcher";

const STREAM_FIELDS: &str = "tweet.fields=author_id,referenced_tweets,in_reply_to_user_id,entities\
                             &expansions=author_id&user.fields=username";

/// Twitter API v2 client
///
/// # Security
///
/// The Debug implementation does NOT expose the bearer token.
pub struct TwitterClient {
    /// App-only bearer token
    /// ⚠️ NEVER log this value
    bearer_token: String,

    /// API base URL (overridable for tests)
    api_base: String,

    /// Client for REST calls, with a request timeout
    client: reqwest::Client,

    /// Client for the long-lived stream, with a connect timeout only
    stream_client: reqwest::Client,
}

// Custom Debug implementation that hides the bearer token
impl std::fmt::Debug for TwitterClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TwitterClient")
            .field("bearer_token", &"<REDACTED>")
            .field("api_base", &self.api_base)
            .finish()
    }
}

impl TwitterClient {
    /// Create a new Twitter client
    ///
    /// # Parameters
    ///
    /// - `bearer_token`: App-only bearer token with filtered-stream access
    ///
    /// # Returns
    ///
    /// - `Ok(TwitterClient)`: Client ready to use
    /// - `Err(Error)`: Empty token or the HTTP client could not be built
    pub fn new(bearer_token: impl Into<String>) -> Result<Self> {
        Self::with_base_url(bearer_token, TWITTER_API_BASE)
    }

    /// Create a client talking to a different API host
    pub fn with_base_url(bearer_token: impl Into<String>, api_base: impl Into<String>) -> Result<Self> {
        let bearer_token = bearer_token.into();
        if bearer_token.is_empty() {
            return Err(Error::config("Twitter bearer token cannot be empty"));
        }

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::http(format!("Failed to build HTTP client: {}", e)))?;
        let stream_client = reqwest::Client::builder()
            .connect_timeout(STREAM_CONNECT_TIMEOUT)
            .build()
            .map_err(|e| Error::http(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            bearer_token,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            client,
            stream_client,
        })
    }

    fn rules_url(&self) -> String {
        format!("{}/2/tweets/search/stream/rules", self.api_base)
    }

    fn stream_url(&self) -> String {
        format!("{}/2/tweets/search/stream?{}", self.api_base, STREAM_FIELDS)
    }

    /// Fetch the currently installed stream rules
    ///
    /// # API Call
    ///
    /// ```http
    /// GET /2/tweets/search/stream/rules
    /// Authorization: Bearer <token>
    /// ```
    async fn current_rules(&self) -> Result<Vec<Rule>> {
        let response = self
            .client
            .get(self.rules_url())
            .bearer_auth(&self.bearer_token)
            .send()
            .await
            .map_err(|e| Error::http(format!("HTTP request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(failure(response, "Rule listing").await);
        }

        let rules: RulesResponse = response
            .json()
            .await
            .map_err(|e| Error::upstream(format!("Failed to parse rules response: {}", e)))?;
        Ok(rules.data)
    }

    /// Post a rule change and check that every rule was accepted
    ///
    /// # API Call
    ///
    /// ```http
    /// POST /2/tweets/search/stream/rules
    /// {"delete": {"ids": ["..."]}}  or  {"add": [{"value": "...", "tag": "watcher"}]}
    /// ```
    async fn post_rules(&self, payload: serde_json::Value, what: &str) -> Result<()> {
        let response = self
            .client
            .post(self.rules_url())
            .bearer_auth(&self.bearer_token)
            .json(&payload)
            .send()
            .await
            .map_err(|e| Error::http(format!("HTTP request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(failure(response, what).await);
        }

        let result: RulesResponse = response
            .json()
            .await
            .map_err(|e| Error::upstream(format!("Failed to parse rules response: {}", e)))?;
        if let Some(problem) = result.errors.first() {
            return Err(Error::upstream(format!("{} rejected: {}", what, problem.describe())));
        }
        Ok(())
    }

    /// Make the installed rule set equal to the filter's rules
    async fn sync_rules(&self, spec: &FilterSpec) -> Result<()> {
        let existing = self.current_rules().await?;
        let plan = RulePlan::new(&existing, &spec.rules);
        debug!(
            "Syncing stream rules: {} kept, {} deleted, {} added",
            existing.len() - plan.delete.len(),
            plan.delete.len(),
            plan.add.len()
        );

        if !plan.delete.is_empty() {
            let payload = serde_json::json!({ "delete": { "ids": plan.delete } });
            self.post_rules(payload, "Rule deletion").await?;
        }
        if !plan.add.is_empty() {
            let add: Vec<serde_json::Value> = plan
                .add
                .iter()
                .map(|value| serde_json::json!({ "value": value, "tag": RULE_TAG }))
                .collect();
            self.post_rules(serde_json::json!({ "add": add }), "Rule creation").await?;
        }
        Ok(())
    }
}

#[async_trait]
impl UpstreamClient for TwitterClient {
    /// Resolve screen names to user IDs
    ///
    /// Unknown or suspended names come back in the `errors` array and are
    /// simply left out of the result.
    ///
    /// # API Call
    ///
    /// ```http
    /// GET /2/users/by?usernames=alice,bob&user.fields=id,username
    /// ```
    async fn lookup_identities(&self, names: &[String]) -> Result<Vec<Identity>> {
        if names.is_empty() {
            return Ok(Vec::new());
        }
        if names.len() > LOOKUP_LIMIT {
            return Err(Error::invalid_input(format!(
                "At most {} names per lookup, got {}",
                LOOKUP_LIMIT,
                names.len()
            )));
        }

        let url = format!(
            "{}/2/users/by?usernames={}&user.fields=id,username",
            self.api_base,
            names.join(",")
        );
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.bearer_token)
            .send()
            .await
            .map_err(|e| Error::http(format!("HTTP request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(failure(response, "User lookup").await);
        }

        let users: UsersResponse = response
            .json()
            .await
            .map_err(|e| Error::upstream(format!("Failed to parse lookup response: {}", e)))?;

        for problem in &users.errors {
            debug!("Lookup problem: {}", problem.describe());
        }

        Ok(users
            .data
            .into_iter()
            .filter_map(|user| match user.id.parse::<u64>() {
                Ok(id) => Some(Identity::new(id, user.username)),
                Err(_) => {
                    warn!("Ignoring user '{}' with non-numeric ID '{}'", user.username, user.id);
                    None
                }
            })
            .collect())
    }

    async fn open_stream(&self, spec: &FilterSpec) -> Result<StreamSession> {
        info!("Opening filtered stream for {} accounts ({} rules)", spec.ids.len(), spec.rules.len());

        if let Err(e) = self.sync_rules(spec).await {
            if is_transient(&e) {
                warn!("Stream rules could not be synced: {}", e);
                return Ok(disconnected(e.to_string()));
            }
            return Err(e);
        }

        let response = match self
            .stream_client
            .get(self.stream_url())
            .bearer_auth(&self.bearer_token)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return Ok(disconnected(format!("Stream connect failed: {}", e))),
        };

        if !response.status().is_success() {
            let error = failure(response, "Stream connect").await;
            if is_transient(&error) {
                return Ok(disconnected(error.to_string()));
            }
            return Err(error);
        }

        let (tx, rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);
        let token = CancellationToken::new();
        let reader = tokio::spawn(read_stream(response, tx, token.clone()));
        debug!("Filtered stream connected");

        Ok(StreamSession::new(rx, token, reader))
    }

    /// Check the bearer token by listing stream rules
    async fn verify(&self) -> Result<()> {
        self.current_rules().await.map(|rules| {
            debug!("Twitter credentials accepted ({} rules installed)", rules.len());
        })
    }

    fn lookup_batch_limit(&self) -> usize {
        LOOKUP_LIMIT
    }

    fn client_name(&self) -> &'static str {
        "twitter"
    }
}

/// Read the stream body line by line until it ends or the session is closed
async fn read_stream(
    response: reqwest::Response,
    tx: mpsc::Sender<StreamMessage>,
    token: CancellationToken,
) {
    let mut body = Box::pin(response.bytes_stream());
    let mut buffer: Vec<u8> = Vec::new();

    let reason = loop {
        let next = tokio::select! {
            _ = token.cancelled() => return,
            next = tokio::time::timeout(KEEP_ALIVE_TIMEOUT, body.next()) => next,
        };

        let chunk = match next {
            Err(_) => break Error::stream(format!("no data within {:?}", KEEP_ALIVE_TIMEOUT)),
            Ok(None) => break Error::stream("closed by server"),
            Ok(Some(Err(e))) => break Error::stream(format!("read failed: {}", e)),
            Ok(Some(Ok(chunk))) => chunk,
        };
        buffer.extend_from_slice(&chunk);

        while let Some(end) = buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = buffer.drain(..=end).collect();
            let Some(message) = decode_line(&String::from_utf8_lossy(&line)) else {
                trace!("Stream keep-alive");
                continue;
            };

            let last = matches!(message, StreamMessage::Disconnect { .. });
            tokio::select! {
                _ = token.cancelled() => return,
                sent = tx.send(message) => {
                    if sent.is_err() {
                        return;
                    }
                }
            }
            if last {
                return;
            }
        }
    };

    debug!("Stream reader stopping: {}", reason);
    tokio::select! {
        _ = token.cancelled() => {}
        _ = tx.send(StreamMessage::Disconnect { reason: reason.to_string() }) => {}
    }
}

/// A session whose only message is a disconnect
fn disconnected(reason: String) -> StreamSession {
    let (tx, rx) = mpsc::channel(1);
    let _ = tx.try_send(StreamMessage::Disconnect { reason });
    StreamSession::from_channel(rx)
}

fn is_transient(error: &Error) -> bool {
    matches!(error, Error::RateLimited(_) | Error::Http(_) | Error::Network(_))
}

/// Map a failed response to an error
async fn failure(response: reqwest::Response, what: &str) -> Error {
    let status = response.status();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Unable to read error response".to_string());
    status_error(status, &body, what)
}

fn status_error(status: StatusCode, body: &str, what: &str) -> Error {
    match status.as_u16() {
        401 | 403 => Error::auth(format!(
            "{}: invalid bearer token or missing access. Status: {}",
            what, status
        )),
        429 => Error::rate_limited(format!("{}: rate limit exceeded. Status: {}", what, status)),
        500..=599 => Error::http(format!("Twitter server error (transient): {} - {}", status, body)),
        _ => Error::upstream(format!("{} failed: {} - {}", what, status, body)),
    }
}

/// Difference between installed and wanted rules
#[derive(Debug, Default, PartialEq, Eq)]
struct RulePlan {
    /// IDs of installed rules that are no longer wanted
    delete: Vec<String>,
    /// Wanted rule values that are not installed
    add: Vec<String>,
}

impl RulePlan {
    fn new(existing: &[Rule], wanted: &[String]) -> Self {
        let delete = existing
            .iter()
            .filter(|rule| !wanted.contains(&rule.value))
            .map(|rule| rule.id.clone())
            .collect();
        let add = wanted
            .iter()
            .filter(|value| !existing.iter().any(|rule| &rule.value == *value))
            .cloned()
            .collect();
        Self { delete, add }
    }
}

/// Decode one line of the filtered stream
///
/// # Returns
///
/// `None` for keep-alive (blank) lines, otherwise the decoded message.
/// Payloads that are not JSON, or that carry nothing known, decode to
/// [`StreamMessage::Unknown`].
pub fn decode_line(line: &str) -> Option<StreamMessage> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let envelope: StreamEnvelope = match serde_json::from_str(line) {
        Ok(envelope) => envelope,
        Err(_) => return Some(StreamMessage::Unknown(line.to_string())),
    };

    if let Some(tweet) = envelope.data {
        return Some(StreamMessage::Post(tweet.into_post(&envelope.includes.users)));
    }
    if let Some(limit) = envelope.limit {
        return Some(StreamMessage::RateLimit { dropped: limit.track });
    }
    if let Some(problem) = envelope.errors.first() {
        let reason = problem.describe();
        if problem.is_disconnect() {
            return Some(StreamMessage::Disconnect { reason });
        }
        return Some(StreamMessage::Notice(reason));
    }
    Some(StreamMessage::Unknown(line.to_string()))
}

#[derive(Debug, Default, Deserialize)]
struct UsersResponse {
    #[serde(default)]
    data: Vec<User>,
    #[serde(default)]
    errors: Vec<Problem>,
}

#[derive(Debug, Clone, Deserialize)]
struct User {
    id: String,
    username: String,
}

#[derive(Debug, Default, Deserialize)]
struct RulesResponse {
    #[serde(default)]
    data: Vec<Rule>,
    #[serde(default)]
    errors: Vec<Problem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
struct Rule {
    id: String,
    value: String,
}

#[derive(Debug, Default, Deserialize)]
struct Problem {
    title: Option<String>,
    detail: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
}

impl Problem {
    fn describe(&self) -> String {
        match (&self.title, &self.detail) {
            (Some(title), Some(detail)) => format!("{}: {}", title, detail),
            (Some(text), None) | (None, Some(text)) => text.clone(),
            (None, None) => self.kind.clone().unwrap_or_else(|| "unknown problem".to_string()),
        }
    }

    fn is_disconnect(&self) -> bool {
        let mentions = |text: &Option<String>| {
            text.as_deref().is_some_and(|t| {
                let t = t.to_ascii_lowercase();
                t.contains("operational-disconnect") || t.contains("connectionexception")
            })
        };
        mentions(&self.title) || mentions(&self.kind)
    }
}

#[derive(Debug, Default, Deserialize)]
struct StreamEnvelope {
    data: Option<Tweet>,
    #[serde(default)]
    includes: Includes,
    #[serde(default)]
    errors: Vec<Problem>,
    limit: Option<Limit>,
}

#[derive(Debug, Default, Deserialize)]
struct Includes {
    #[serde(default)]
    users: Vec<User>,
}

#[derive(Debug, Deserialize)]
struct Limit {
    #[serde(default)]
    track: u64,
}

#[derive(Debug, Deserialize)]
struct Tweet {
    id: String,
    #[serde(default)]
    text: String,
    author_id: Option<String>,
    in_reply_to_user_id: Option<String>,
    #[serde(default)]
    referenced_tweets: Vec<Reference>,
    entities: Option<Entities>,
}

#[derive(Debug, Deserialize)]
struct Reference {
    #[serde(rename = "type")]
    kind: String,
    id: String,
}

#[derive(Debug, Default, Deserialize)]
struct Entities {
    #[serde(default)]
    urls: Vec<Url>,
}

#[derive(Debug, Deserialize)]
struct Url {
    url: String,
    expanded_url: Option<String>,
}

impl Tweet {
    fn into_post(self, users: &[User]) -> Post {
        let author_id = self
            .author_id
            .as_deref()
            .and_then(|id| id.parse::<u64>().ok())
            .unwrap_or_default();
        let author_name = self
            .author_id
            .as_deref()
            .and_then(|id| users.iter().find(|user| user.id == id))
            .map(|user| user.username.clone())
            .unwrap_or_default();

        let reference = |kind: &str| self.referenced_tweets.iter().find(|r| r.kind == kind);
        let in_reply_to = reference("replied_to")
            .map(|r| r.id.clone())
            .or_else(|| self.in_reply_to_user_id.clone());
        let retweet = reference("retweeted").is_some();
        let quote = reference("quoted").is_some();

        let urls = self
            .entities
            .map(|entities| {
                entities
                    .urls
                    .into_iter()
                    .filter_map(|url| {
                        url.expanded_url.map(|expanded| UrlEntity {
                            short: url.url,
                            expanded,
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        Post {
            id: self.id,
            author_id,
            author_name,
            text: self.text,
            in_reply_to,
            retweet,
            quote,
            urls,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keep_alive_lines_are_skipped() {
        assert_eq!(decode_line(""), None);
        assert_eq!(decode_line("\r\n"), None);
        assert_eq!(decode_line("   "), None);
    }

    #[test]
    fn test_decode_post_with_author() {
        let line = r#"{
            "data": {
                "id": "1001",
                "text": "hello https://t.co/x",
                "author_id": "10",
                "entities": {"urls": [{"url": "https://t.co/x", "expanded_url": "https://example.com"}]}
            },
            "includes": {"users": [{"id": "10", "username": "alice"}]},
            "matching_rules": [{"id": "1", "tag": "watcher"}]
        }"#;

        let Some(StreamMessage::Post(post)) = decode_line(line) else {
            panic!("expected a post");
        };
        assert_eq!(post.id, "1001");
        assert_eq!(post.author_id, 10);
        assert_eq!(post.author_name, "alice");
        assert_eq!(post.in_reply_to, None);
        assert!(!post.retweet && !post.quote);
        assert_eq!(
            post.urls,
            vec![UrlEntity {
                short: "https://t.co/x".to_string(),
                expanded: "https://example.com".to_string(),
            }]
        );
    }

    #[test]
    fn test_decode_references() {
        let reply = r#"{"data":{"id":"1","text":"hi","author_id":"10",
            "referenced_tweets":[{"type":"replied_to","id":"7"}]}}"#;
        let Some(StreamMessage::Post(post)) = decode_line(reply) else {
            panic!("expected a post");
        };
        assert_eq!(post.in_reply_to.as_deref(), Some("7"));
        assert_eq!(post.author_name, "", "author is unknown without includes");

        let retweet = r#"{"data":{"id":"2","text":"RT @bob: hi","author_id":"10",
            "referenced_tweets":[{"type":"retweeted","id":"8"}]}}"#;
        let Some(StreamMessage::Post(post)) = decode_line(retweet) else {
            panic!("expected a post");
        };
        assert!(post.retweet);

        let quote = r#"{"data":{"id":"3","text":"look","author_id":"10",
            "referenced_tweets":[{"type":"quoted","id":"9"}]}}"#;
        let Some(StreamMessage::Post(post)) = decode_line(quote) else {
            panic!("expected a post");
        };
        assert!(post.quote);
    }

    #[test]
    fn test_decode_operational_disconnect() {
        let line = r#"{"errors":[{"title":"operational-disconnect",
            "disconnect_type":"UpstreamOperationalDisconnect",
            "detail":"This stream has been disconnected upstream for operational reasons.",
            "type":"https://api.twitter.com/2/problems/operational-disconnect"}]}"#;
        assert!(matches!(decode_line(line), Some(StreamMessage::Disconnect { .. })));

        let line = r#"{"title":"ConnectionException","detail":"too many connections",
            "type":"https://api.twitter.com/2/problems/streaming-connection","errors":[
            {"title":"ConnectionException","detail":"This stream is currently at the maximum allowed connection limit."}]}"#;
        assert!(matches!(decode_line(line), Some(StreamMessage::Disconnect { .. })));
    }

    #[test]
    fn test_decode_notice_limit_and_unknown() {
        let notice = r#"{"errors":[{"title":"Not Found Error","detail":"Could not find tweet"}]}"#;
        assert_eq!(
            decode_line(notice),
            Some(StreamMessage::Notice("Not Found Error: Could not find tweet".to_string()))
        );

        assert_eq!(
            decode_line(r#"{"limit":{"track":42}}"#),
            Some(StreamMessage::RateLimit { dropped: 42 })
        );

        assert_eq!(
            decode_line("not json"),
            Some(StreamMessage::Unknown("not json".to_string()))
        );
        assert_eq!(
            decode_line(r#"{"something":"else"}"#),
            Some(StreamMessage::Unknown(r#"{"something":"else"}"#.to_string()))
        );
    }

    #[test]
    fn test_rule_plan() {
        let existing = vec![
            Rule { id: "1".to_string(), value: "(from:1) lang:en".to_string() },
            Rule { id: "2".to_string(), value: "(from:2) lang:en".to_string() },
        ];
        let wanted = vec!["(from:2) lang:en".to_string(), "(from:3) lang:en".to_string()];

        let plan = RulePlan::new(&existing, &wanted);
        assert_eq!(plan.delete, vec!["1".to_string()]);
        assert_eq!(plan.add, vec!["(from:3) lang:en".to_string()]);

        assert_eq!(RulePlan::new(&existing[1..], &wanted[..1]), RulePlan::default());
    }

    #[test]
    fn test_status_mapping() {
        assert!(status_error(StatusCode::UNAUTHORIZED, "", "Stream connect").is_fatal());
        assert!(status_error(StatusCode::FORBIDDEN, "", "Stream connect").is_fatal());

        let limited = status_error(StatusCode::TOO_MANY_REQUESTS, "", "Stream connect");
        assert!(is_transient(&limited));
        let server = status_error(StatusCode::SERVICE_UNAVAILABLE, "busy", "Stream connect");
        assert!(is_transient(&server));

        let rejected = status_error(StatusCode::BAD_REQUEST, "bad rule", "Rule creation");
        assert!(!is_transient(&rejected));
        assert!(!rejected.is_fatal());
    }

    #[tokio::test]
    async fn test_disconnected_session_yields_one_disconnect() {
        let mut session = disconnected("rate limited".to_string());
        assert_eq!(
            session.next().await,
            Some(StreamMessage::Disconnect { reason: "rate limited".to_string() })
        );
        assert_eq!(session.next().await, None);
    }

    #[test]
    fn test_empty_token_rejected() {
        assert!(TwitterClient::new("").is_err());
    }

    #[test]
    fn test_stream_url_requests_classification_fields() {
        let client = TwitterClient::with_base_url("token", "http://localhost:8080/").unwrap();
        let url = client.stream_url();
        assert!(url.starts_with("http://localhost:8080/2/tweets/search/stream?"));
        assert!(url.contains("referenced_tweets"));
        assert!(url.contains("expansions=author_id"));
        assert!(url.contains("user.fields=username"));
    }

    #[test]
    fn test_bearer_token_not_exposed_in_debug() {
        let client = TwitterClient::new("secret_bearer_12345").unwrap();
        let debug_str = format!("{:?}", client);
        assert!(!debug_str.contains("secret_bearer"));
        assert!(debug_str.contains("TwitterClient"));
    }
}
