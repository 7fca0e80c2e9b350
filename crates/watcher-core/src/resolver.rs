//! Name resolution
//!
//! Maps tracked account names to the stable numeric IDs the upstream
//! platform uses, and picks up accounts that were renamed since the last
//! resolution.
//!
//! ## Flow
//!
//! 1. Read tracked accounts (all, or only the unresolved ones)
//! 2. Look names up in batches bounded by the client's per-call limit
//! 3. Reconcile returned identities against the stored names
//! 4. Write every changed account back, one row at a time
//!
//! Lookup and write failures are logged and skipped. Rows that could not be
//! updated stay as they were and are picked up by the next resolve.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, trace, warn};

use crate::error::Result;
use crate::traits::{SubscriptionStore, TrackedAccount, UpstreamClient};

/// Hard ceiling on names per lookup call
pub const MAX_LOOKUP_BATCH: usize = 100;

/// Outcome of one resolve pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolveReport {
    /// Accounts considered
    pub requested: usize,
    /// Accounts whose resolved ID changed
    pub resolved: usize,
    /// Accounts whose name changed
    pub renamed: usize,
    /// Lookup batches that failed
    pub failed_lookups: usize,
    /// Write-backs that failed
    pub failed_writes: usize,
}

#[derive(Debug)]
struct Staged {
    account: TrackedAccount,
    resolved_id: u64,
    new_name: Option<String>,
}

impl Staged {
    fn changed(&self) -> bool {
        self.resolved_id != self.account.resolved_id || self.new_name.is_some()
    }
}

/// Resolves tracked account names against the upstream identity lookup
#[derive(Clone)]
pub struct NameResolver {
    store: Arc<dyn SubscriptionStore>,
    upstream: Arc<dyn UpstreamClient>,
}

impl NameResolver {
    pub fn new(store: Arc<dyn SubscriptionStore>, upstream: Arc<dyn UpstreamClient>) -> Self {
        Self { store, upstream }
    }

    /// Run one resolve pass
    ///
    /// # Parameters
    ///
    /// - `force_all`: Re-resolve every tracked account instead of only the
    ///   unresolved ones
    ///
    /// # Returns
    ///
    /// - `Ok(ResolveReport)`: The pass ran (possibly with partial failures)
    /// - `Err(Error)`: The tracked accounts could not be read
    pub async fn resolve(&self, force_all: bool) -> Result<ResolveReport> {
        debug!("Starting name resolve (force_all: {})", force_all);

        let accounts: Vec<TrackedAccount> = self
            .store
            .all_tracked_accounts(force_all)
            .await?
            .into_iter()
            .filter(|account| !account.name.is_empty())
            .collect();

        let mut report = ResolveReport {
            requested: accounts.len(),
            ..Default::default()
        };
        if accounts.is_empty() {
            trace!("No tracked accounts need resolving");
            return Ok(report);
        }

        let identities = self.lookup(&accounts, &mut report).await;
        let staged = reconcile(accounts, &identities);

        for entry in staged.iter().filter(|entry| entry.changed()) {
            let name = entry.new_name.as_deref().unwrap_or(&entry.account.name);
            match self
                .store
                .update_resolution(entry.account.id, entry.resolved_id, name)
                .await
            {
                Ok(()) => {
                    if entry.resolved_id != entry.account.resolved_id {
                        report.resolved += 1;
                    }
                    if entry.new_name.is_some() {
                        report.renamed += 1;
                    }
                }
                Err(e) => {
                    error!("Failed to update resolution of '{}': {}", entry.account.name, e);
                    report.failed_writes += 1;
                }
            }
        }

        debug!(
            "Name resolve complete: {} requested, {} resolved, {} renamed",
            report.requested, report.resolved, report.renamed
        );
        Ok(report)
    }

    /// Look up all names, returning resolved ID -> returned screen name
    async fn lookup(
        &self,
        accounts: &[TrackedAccount],
        report: &mut ResolveReport,
    ) -> HashMap<u64, String> {
        let batch = self.upstream.lookup_batch_limit().clamp(1, MAX_LOOKUP_BATCH);
        let mut identities: HashMap<u64, String> = HashMap::with_capacity(accounts.len());

        for chunk in accounts.chunks(batch) {
            let names: Vec<String> = chunk.iter().map(|account| account.name.clone()).collect();
            let found = match self.upstream.lookup_identities(&names).await {
                Ok(found) => found,
                Err(e) => {
                    error!(
                        "Identity lookup via {} failed for {} names: {}",
                        self.upstream.client_name(),
                        names.len(),
                        e
                    );
                    report.failed_lookups += 1;
                    continue;
                }
            };

            for identity in found {
                if let Some(previous) = identities.insert(identity.id, identity.screen_name.clone())
                    && !previous.eq_ignore_ascii_case(&identity.screen_name)
                {
                    warn!(
                        "Duplicate resolved ID {} returned for '{}' and '{}'",
                        identity.id, previous, identity.screen_name
                    );
                }
            }
        }

        identities
    }
}

/// Match returned identities against stored accounts
///
/// A case-insensitive name match sets the resolved ID. A stored account
/// already bound to a returned ID under a different name is a rename.
fn reconcile(accounts: Vec<TrackedAccount>, identities: &HashMap<u64, String>) -> Vec<Staged> {
    let mut staged: Vec<Staged> = accounts
        .into_iter()
        .map(|account| Staged {
            resolved_id: account.resolved_id,
            account,
            new_name: None,
        })
        .collect();

    for (id, returned) in identities {
        for entry in staged.iter_mut() {
            if returned.eq_ignore_ascii_case(&entry.account.name) {
                trace!("Resolved '{}' to {}", entry.account.name, id);
                entry.resolved_id = *id;
            } else if entry.account.resolved_id == *id {
                warn!("Found new name for {}: {} => {}", id, entry.account.name, returned);
                entry.new_name = Some(returned.clone());
            }
        }
    }

    staged
}
