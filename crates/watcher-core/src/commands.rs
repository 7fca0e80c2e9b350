//! Chat command handling
//!
//! Parses inbound chat messages into subscription commands, applies them to
//! the store and requests stream reloads. The handler is owned by the
//! receiver worker, which makes it the only owner of the pending
//! confirmation set.
//!
//! ## Commands
//!
//! | Command                          | Effect                                  |
//! |----------------------------------|-----------------------------------------|
//! | `/list`                          | List the chat's subscriptions           |
//! | `/add @a,@b [keywords]`          | Subscribe, optionally keyword filtered  |
//! | `/remove @a,@b`                  | Unsubscribe                             |
//! | `/remove clear`, `/remove all`   | Ask to clear everything                 |
//! | `/clear`                         | Same as `/remove all`                   |
//! | `confirm`                        | Execute a pending clear                 |

use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, trace};

use crate::config::AccessConfig;
use crate::dispatch::MAX_KEYWORDS_LENGTH;
use crate::engine::ReloadLevel;
use crate::traits::{InboundMessage, SubscriptionStore};

/// Maximum length of a handle, without the leading `@`
pub const MAX_HANDLE_LENGTH: usize = 15;

pub const DENIED: &str = "I'm sorry but my permissions do not allow you to use this service.";
pub const STORE_ERROR: &str = "I'm sorry, there seems to have been an error trying to process your request.\nPlease try again later.";
pub const UPDATED: &str = "Awesome! Your following list was updated!";
pub const CLEARED: &str = "Awesome! I have cleared your following list!";
pub const CONFIRM_CLEAR: &str = "This will remove every user I am following for you.\nReply \"confirm\" to continue.";
pub const NOTHING_TO_CONFIRM: &str = "There is nothing waiting for your confirmation.";
pub const EMPTY_LIST: &str = "There are currently no users that I am following for you.";
pub const KEYWORDS_TOO_LONG: &str = "I'm sorry, keyword lists cannot be longer than 256 characters.";
pub const USAGE: &str = "I'm sorry I don't understand that command.

Please use a command from the following list:
/list
/add <@username1,@usernameN,..> [keyword1,-keywordN,..]
/remove <@username1,@usernameN,..|clear|all>
/clear";

/// A parsed chat command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    List,
    Add {
        /// Handles without the leading `@`
        names: Vec<String>,
        keywords: Option<String>,
    },
    Remove {
        /// Handles without the leading `@`
        names: Vec<String>,
    },
    /// Request to remove everything (needs confirmation)
    Clear,
    Confirm,
}

/// A user input problem, reported back to the chat
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    Unknown,
    InvalidHandle(String),
    KeywordsTooLong,
}

impl CommandError {
    /// Corrective message for the chat
    pub fn message(&self) -> String {
        match self {
            CommandError::Unknown => USAGE.to_string(),
            CommandError::InvalidHandle(token) => format!(
                "The username \"{}\" is not a valid Twitter username!\n\n\
                 Twitter names must start with \"@\", be at most 15 characters long \
                 and contain no special characters or spaces.",
                token
            ),
            CommandError::KeywordsTooLong => KEYWORDS_TOO_LONG.to_string(),
        }
    }
}

fn is_visible(c: char) -> bool {
    ('!'..='~').contains(&c)
}

/// Validate one `@handle`
///
/// Surrounding whitespace and non-printable characters are ignored.
///
/// # Returns
///
/// The handle without `@`, or the offending (trimmed) token.
pub fn validate_handle(raw: &str) -> Result<String, CommandError> {
    let token = raw.trim_matches(|c: char| !is_visible(c));
    let valid = token.strip_prefix('@').filter(|name| {
        (1..=MAX_HANDLE_LENGTH).contains(&name.len())
            && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
    });
    match valid {
        Some(name) => Ok(name.to_string()),
        None => Err(CommandError::InvalidHandle(token.to_string())),
    }
}

fn parse_handles(list: &str) -> Result<Vec<String>, CommandError> {
    let mut names: Vec<String> = Vec::new();
    for raw in list.split(',') {
        let name = validate_handle(raw)?;
        if !names.iter().any(|n| n.eq_ignore_ascii_case(&name)) {
            names.push(name);
        }
    }
    Ok(names)
}

/// Split `/add` arguments into the handle list and trailing keywords
///
/// The handle list may contain spaces after commas, so it extends over every
/// token that starts with `@` or `,`, or follows a token ending in `,`.
fn split_add_args(args: &str) -> (String, Option<String>) {
    let mut handles = String::new();
    let mut rest: Vec<&str> = Vec::new();
    for token in args.split_whitespace() {
        let in_list = rest.is_empty()
            && ((handles.is_empty() && token.starts_with('@'))
                || handles.ends_with(',')
                || (!handles.is_empty() && token.starts_with(',')));
        if in_list {
            handles.push_str(token);
        } else {
            rest.push(token);
        }
    }
    let keywords = rest.join(" ");
    (handles, (!keywords.is_empty()).then_some(keywords))
}

/// Parse a chat message into a command
pub fn parse(text: &str) -> Result<Command, CommandError> {
    let text = text.trim();
    if text.eq_ignore_ascii_case("confirm") {
        return Ok(Command::Confirm);
    }

    let (word, args) = match text.split_once(char::is_whitespace) {
        Some((word, args)) => (word, args.trim()),
        None => (text, ""),
    };
    // Group chats address bots as "/command@botname".
    let word = word.split('@').next().unwrap_or_default().to_ascii_lowercase();

    match word.as_str() {
        "/list" => Ok(Command::List),
        "/clear" => Ok(Command::Clear),
        "/remove" => {
            if args.eq_ignore_ascii_case("all") || args.eq_ignore_ascii_case("clear") {
                return Ok(Command::Clear);
            }
            if args.is_empty() {
                return Err(CommandError::Unknown);
            }
            Ok(Command::Remove {
                names: parse_handles(args)?,
            })
        }
        "/add" => {
            let (handles, keywords) = split_add_args(args);
            if handles.is_empty() {
                return match keywords {
                    Some(token) => Err(CommandError::InvalidHandle(
                        token.split_whitespace().next().unwrap_or_default().to_string(),
                    )),
                    None => Err(CommandError::Unknown),
                };
            }
            if keywords.as_ref().is_some_and(|k| k.chars().count() > MAX_KEYWORDS_LENGTH) {
                return Err(CommandError::KeywordsTooLong);
            }
            Ok(Command::Add {
                names: parse_handles(&handles)?,
                keywords,
            })
        }
        _ => Err(CommandError::Unknown),
    }
}

/// Applies chat commands to the subscription store
pub struct CommandHandler {
    store: Arc<dyn SubscriptionStore>,
    access: AccessConfig,
    reload_tx: mpsc::Sender<ReloadLevel>,
    pending: HashSet<i64>,
}

impl CommandHandler {
    pub fn new(
        store: Arc<dyn SubscriptionStore>,
        access: AccessConfig,
        reload_tx: mpsc::Sender<ReloadLevel>,
    ) -> Self {
        Self {
            store,
            access,
            reload_tx,
            pending: HashSet::new(),
        }
    }

    /// Handle one inbound message
    ///
    /// # Returns
    ///
    /// The reply text for the originating chat
    pub async fn handle(&mut self, message: &InboundMessage) -> String {
        if !self.access.permits(&message.sender) {
            debug!("Denied command from '{}' in chat {}", message.sender, message.chat_id);
            return DENIED.to_string();
        }

        let command = match parse(&message.text) {
            Ok(command) => command,
            Err(e) => {
                self.pending.remove(&message.chat_id);
                trace!("Rejected command from chat {}: {:?}", message.chat_id, e);
                return e.message();
            }
        };

        // Any other command supersedes a pending clear.
        let confirmed = self.pending.remove(&message.chat_id);

        match command {
            Command::List => self.list(message.chat_id).await,
            Command::Add { names, keywords } => {
                self.add(message.chat_id, &names, keywords.as_deref()).await
            }
            Command::Remove { names } => self.remove(message.chat_id, &names).await,
            Command::Clear => {
                self.pending.insert(message.chat_id);
                CONFIRM_CLEAR.to_string()
            }
            Command::Confirm if confirmed => self.clear(message.chat_id).await,
            Command::Confirm => NOTHING_TO_CONFIRM.to_string(),
        }
    }

    /// Whether a chat has a clear waiting for confirmation
    pub fn is_pending(&self, chat_id: i64) -> bool {
        self.pending.contains(&chat_id)
    }

    async fn list(&self, chat_id: i64) -> String {
        let subscriptions = match self.store.list_for_chat(chat_id).await {
            Ok(subscriptions) => subscriptions,
            Err(e) => {
                error!("Failed to list subscriptions for chat {}: {}", chat_id, e);
                return STORE_ERROR.to_string();
            }
        };
        if subscriptions.is_empty() {
            return EMPTY_LIST.to_string();
        }

        let mut reply = String::from("I am currently following these users:\n");
        for subscription in subscriptions.iter().filter(|s| !s.name.is_empty()) {
            let line = match subscription.keywords.as_deref() {
                Some(keywords) => format!("- @{} [{}]\n", subscription.name, keywords),
                None => format!("- @{}\n", subscription.name),
            };
            reply.push_str(&line);
        }
        reply
    }

    async fn add(&self, chat_id: i64, names: &[String], keywords: Option<&str>) -> String {
        let mut unresolved = false;
        for name in names {
            match self.store.add_subscription(chat_id, name, keywords).await {
                Ok(resolved_id) => unresolved |= resolved_id == 0,
                Err(e) => {
                    error!("Failed to add subscription '{}' for chat {}: {}", name, chat_id, e);
                    return STORE_ERROR.to_string();
                }
            }
        }

        let level = if unresolved {
            ReloadLevel::ResolveMissing
        } else {
            ReloadLevel::Current
        };
        self.request_reload(level).await;
        UPDATED.to_string()
    }

    async fn remove(&self, chat_id: i64, names: &[String]) -> String {
        for name in names {
            if let Err(e) = self.store.remove_subscription(chat_id, name).await {
                error!("Failed to remove subscription '{}' for chat {}: {}", name, chat_id, e);
                return STORE_ERROR.to_string();
            }
        }
        self.request_reload(ReloadLevel::Current).await;
        UPDATED.to_string()
    }

    async fn clear(&self, chat_id: i64) -> String {
        if let Err(e) = self.store.remove_all(chat_id).await {
            error!("Failed to clear subscriptions for chat {}: {}", chat_id, e);
            return STORE_ERROR.to_string();
        }
        self.request_reload(ReloadLevel::Current).await;
        CLEARED.to_string()
    }

    async fn request_reload(&self, level: ReloadLevel) {
        if self.reload_tx.send(level).await.is_err() {
            debug!("Reload coordinator gone, dropping {:?} request", level);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemorySubscriptionStore;

    #[test]
    fn test_validate_handle() {
        assert_eq!(validate_handle("@alice").unwrap(), "alice");
        assert_eq!(validate_handle(" @Under_Score1 \n").unwrap(), "Under_Score1");
        assert_eq!(validate_handle("@abcdefghijklmno").unwrap(), "abcdefghijklmno");

        for bad in ["alice", "@", "@abcdefghijklmnop", "@al-ice", "@al ice", "@ålice", ""] {
            assert!(validate_handle(bad).is_err(), "{:?} should be rejected", bad);
        }
    }

    #[test]
    fn test_invalid_handle_message_names_token() {
        let err = parse("/add @good,bad!").unwrap_err();
        assert_eq!(err, CommandError::InvalidHandle("bad!".to_string()));
        assert!(err.message().contains("\"bad!\""));
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(parse("/LIST"), Ok(Command::List));
        assert_eq!(parse("/list@watcher_bot"), Ok(Command::List));
        assert_eq!(parse("/clear"), Ok(Command::Clear));
        assert_eq!(parse("/remove ALL"), Ok(Command::Clear));
        assert_eq!(parse(" Confirm "), Ok(Command::Confirm));
        assert_eq!(
            parse("/remove @a, @b"),
            Ok(Command::Remove {
                names: vec!["a".to_string(), "b".to_string()]
            })
        );
        assert_eq!(parse("/follow @a"), Err(CommandError::Unknown));
        assert_eq!(parse("/add"), Err(CommandError::Unknown));
    }

    #[test]
    fn test_parse_add_with_keywords() {
        assert_eq!(
            parse("/add @a, @B,@a sports,-breaking news"),
            Ok(Command::Add {
                names: vec!["a".to_string(), "B".to_string()],
                keywords: Some("sports,-breaking news".to_string()),
            })
        );
        assert_eq!(
            parse("/add @a"),
            Ok(Command::Add {
                names: vec!["a".to_string()],
                keywords: None,
            })
        );
    }

    #[test]
    fn test_keywords_length_bound() {
        let ok = format!("/add @a {}", "k".repeat(256));
        assert!(parse(&ok).is_ok());
        let long = format!("/add @a {}", "k".repeat(257));
        assert_eq!(parse(&long), Err(CommandError::KeywordsTooLong));
    }

    #[tokio::test]
    async fn test_add_requests_resolve_when_unresolved() {
        let store = Arc::new(MemorySubscriptionStore::new());
        let (tx, mut rx) = mpsc::channel(8);
        let mut handler = CommandHandler::new(store.clone(), AccessConfig::default(), tx);

        let reply = handler.handle(&InboundMessage::new(555, "user", "/add @alice")).await;
        assert_eq!(reply, UPDATED);
        assert_eq!(rx.recv().await, Some(ReloadLevel::ResolveMissing));

        let account = store.account("alice").await.unwrap();
        store.update_resolution(account.id, 42, "alice").await.unwrap();
        handler.handle(&InboundMessage::new(556, "user", "/add @Alice")).await;
        assert_eq!(rx.recv().await, Some(ReloadLevel::Current));
    }

    #[tokio::test]
    async fn test_clear_needs_confirmation() {
        let store = Arc::new(MemorySubscriptionStore::new());
        let (tx, mut rx) = mpsc::channel(8);
        let mut handler = CommandHandler::new(store.clone(), AccessConfig::default(), tx);
        store.add_subscription(1, "alice", None).await.unwrap();

        assert_eq!(handler.handle(&InboundMessage::new(1, "u", "/remove all")).await, CONFIRM_CLEAR);
        assert!(handler.is_pending(1));
        assert_eq!(store.subscription_count().await, 1);

        // Superseded by another command.
        handler.handle(&InboundMessage::new(1, "u", "/list")).await;
        assert!(!handler.is_pending(1));
        assert_eq!(handler.handle(&InboundMessage::new(1, "u", "confirm")).await, NOTHING_TO_CONFIRM);

        handler.handle(&InboundMessage::new(1, "u", "/clear")).await;
        assert_eq!(handler.handle(&InboundMessage::new(1, "u", "confirm")).await, CLEARED);
        assert_eq!(store.subscription_count().await, 0);
        assert_eq!(rx.recv().await, Some(ReloadLevel::Current));
    }

    #[tokio::test]
    async fn test_denied_sender() {
        let store = Arc::new(MemorySubscriptionStore::new());
        let (tx, _rx) = mpsc::channel(8);
        let access = AccessConfig {
            allowed: vec![],
            blocked: vec!["mallory".to_string()],
        };
        let mut handler = CommandHandler::new(store, access, tx);

        let reply = handler.handle(&InboundMessage::new(1, "Mallory", "/list")).await;
        assert_eq!(reply, DENIED);
    }

    #[tokio::test]
    async fn test_list_format() {
        let store = Arc::new(MemorySubscriptionStore::new());
        let (tx, _rx) = mpsc::channel(8);
        let mut handler = CommandHandler::new(store.clone(), AccessConfig::default(), tx);

        assert_eq!(handler.handle(&InboundMessage::new(1, "u", "/list")).await, EMPTY_LIST);

        store.add_subscription(1, "alice", None).await.unwrap();
        store.add_subscription(1, "bob", Some("rust")).await.unwrap();
        let reply = handler.handle(&InboundMessage::new(1, "u", "/list")).await;
        assert_eq!(
            reply,
            "I am currently following these users:\n- @alice\n- @bob [rust]\n"
        );
    }
}
