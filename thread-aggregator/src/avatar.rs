use crate::profile_cache::ProfileCache;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use threadline_core::{degrade, AccountsApi, RawAccount};
use tracing::debug;

/// Resolves avatars for many handles with a single accounts request.
#[derive(Clone)]
pub struct AvatarBatchResolver {
    accounts: Arc<dyn AccountsApi>,
    cache: Arc<ProfileCache>,
}

impl AvatarBatchResolver {
    pub fn new(accounts: Arc<dyn AccountsApi>, cache: Arc<ProfileCache>) -> Self {
        Self { accounts, cache }
    }

    pub fn cache(&self) -> &Arc<ProfileCache> {
        &self.cache
    }

    /// Populates the cache for every handle not yet looked up.
    ///
    /// Issues at most one request. Every handle sent ends up recorded, as
    /// `Absent` when the account is missing, its metadata is malformed or the
    /// request failed, so it is never looked up again this session. Returns
    /// the number of handles that were sent.
    pub async fn resolve<I, S>(&self, handles: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let to_resolve = self.cache.unknown(handles);
        if to_resolve.is_empty() {
            return 0;
        }

        let names: Vec<String> = to_resolve.iter().cloned().collect();
        debug!("Resolving avatars for {} handles", names.len());

        let target = format!("accounts {}", names.join(","));
        let accounts = degrade(self.accounts.get_accounts(&names).await, &target, Vec::new)
            .into_inner();

        self.cache.record_all(collect_avatars(&to_resolve, accounts));
        names.len()
    }
}

fn collect_avatars(
    requested: &BTreeSet<String>,
    accounts: Vec<RawAccount>,
) -> HashMap<String, Option<String>> {
    let mut results: HashMap<String, Option<String>> = requested
        .iter()
        .map(|handle| (handle.clone(), None))
        .collect();

    for account in accounts {
        if let Some(slot) = results.get_mut(&account.name) {
            *slot = extract_avatar(&account);
        }
    }
    results
}

/// Reads `profile.profile_image` from an account's metadata, preferring
/// `posting_json_metadata` over `json_metadata`. Malformed JSON or a blank
/// image yields `None`.
pub fn extract_avatar(account: &RawAccount) -> Option<String> {
    [&account.posting_json_metadata, &account.json_metadata]
        .into_iter()
        .find_map(|metadata| profile_image(metadata))
}

fn profile_image(metadata: &str) -> Option<String> {
    if metadata.trim().is_empty() {
        return None;
    }
    let parsed: Value = serde_json::from_str(metadata).ok()?;
    let image = parsed.get("profile")?.get("profile_image")?.as_str()?.trim();
    (!image.is_empty()).then(|| image.to_string())
}
