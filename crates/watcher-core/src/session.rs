//! Stream session management
//!
//! Builds the stream filter from the current store state and opens or closes
//! the single live upstream connection. The reload coordinator is the only
//! caller; it owns whatever session this module hands out.

use std::sync::Arc;
use tracing::{debug, error, info};

use crate::error::Result;
use crate::resolver::NameResolver;
use crate::traits::{StreamSession, SubscriptionStore, UpstreamClient};

/// Maximum length of one stream rule
pub const MAX_RULE_LENGTH: usize = 510;

const CONTENT_FILTER: &str = "-is:reply -is:retweet -is:quote";

/// The rule set describing which posts the stream should deliver
///
/// Resolved IDs are packed into `(from:A OR from:B ...)` clauses, each
/// followed by the content filter and an optional language filter, with no
/// clause longer than [`MAX_RULE_LENGTH`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterSpec {
    /// Resolved IDs covered by the rules
    pub ids: Vec<u64>,
    /// One rule per OR-clause
    pub rules: Vec<String>,
}

impl FilterSpec {
    /// Build the rule set for the given resolved IDs
    ///
    /// # Returns
    ///
    /// `None` if there are no non-zero IDs, since the upstream rejects an
    /// empty filter.
    pub fn build(ids: &[u64], language: &str) -> Option<Self> {
        let mut ids: Vec<u64> = ids.iter().copied().filter(|id| *id != 0).collect();
        ids.sort_unstable();
        ids.dedup();
        if ids.is_empty() {
            return None;
        }

        let suffix = if language.is_empty() {
            format!(" {}", CONTENT_FILTER)
        } else {
            format!(" {} lang:{}", CONTENT_FILTER, language)
        };
        // Room left for the terms inside "(" and ")".
        let budget = MAX_RULE_LENGTH.saturating_sub(suffix.len() + 2);

        let mut rules = Vec::new();
        let mut clause = String::new();
        for id in &ids {
            let term = format!("from:{}", id);
            if !clause.is_empty() && clause.len() + " OR ".len() + term.len() > budget {
                rules.push(format!("({}){}", clause, suffix));
                clause.clear();
            }
            if !clause.is_empty() {
                clause.push_str(" OR ");
            }
            clause.push_str(&term);
        }
        if !clause.is_empty() {
            rules.push(format!("({}){}", clause, suffix));
        }

        Some(Self { ids, rules })
    }
}

/// Builds filters and opens/closes upstream sessions
#[derive(Clone)]
pub struct SessionManager {
    store: Arc<dyn SubscriptionStore>,
    upstream: Arc<dyn UpstreamClient>,
    resolver: NameResolver,
    language: String,
}

impl SessionManager {
    pub fn new(
        store: Arc<dyn SubscriptionStore>,
        upstream: Arc<dyn UpstreamClient>,
        language: impl Into<String>,
    ) -> Self {
        Self {
            resolver: NameResolver::new(store.clone(), upstream.clone()),
            store,
            upstream,
            language: language.into(),
        }
    }

    /// Build the filter from the current subscriptions
    ///
    /// # Parameters
    ///
    /// - `resolve_first`: Run the name resolver before reading IDs
    /// - `resolve_all`: Re-resolve every account, not only unresolved ones
    ///
    /// # Returns
    ///
    /// - `Ok(Some(spec))`: At least one watched account is resolved
    /// - `Ok(None)`: Nothing to stream; the caller must stay sessionless
    /// - `Err(Error)`: The store could not be read
    pub async fn build_filter(&self, resolve_first: bool, resolve_all: bool) -> Result<Option<FilterSpec>> {
        if resolve_first
            && let Err(e) = self.resolver.resolve(resolve_all).await
        {
            error!("Name resolve failed, building filter from stored IDs: {}", e);
        }

        let ids = self.store.distinct_watched_resolved_ids().await?;
        match FilterSpec::build(&ids, &self.language) {
            Some(spec) => {
                debug!("Watch list generated, subscribing to {} accounts in {} rules", spec.ids.len(), spec.rules.len());
                Ok(Some(spec))
            }
            None => {
                debug!("Watch list is empty, not starting stream");
                Ok(None)
            }
        }
    }

    /// Open exactly one upstream connection for the given filter
    pub async fn open_session(&self, spec: &FilterSpec) -> Result<StreamSession> {
        let session = self.upstream.open_stream(spec).await?;
        info!("Stream opened via {} for {} accounts", self.upstream.client_name(), spec.ids.len());
        Ok(session)
    }

    /// Close a session, if there is one, and wait for its reader to exit
    pub async fn close_session(&self, session: Option<StreamSession>) {
        if let Some(session) = session {
            session.close().await;
            debug!("Stream session closed");
        }
    }
}
