use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};

/// Result of looking a handle up in the [`ProfileCache`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheLookup {
    /// Looked up, avatar found.
    Avatar(String),
    /// Looked up, no avatar.
    Absent,
    /// Never looked up in this session.
    Unknown,
}

/// Session-scoped map from author handle to avatar URL.
///
/// Entries are never evicted and carry no TTL: avatars change rarely
/// compared to the length of a session, and a stale avatar is harmless.
/// `record` is idempotent and last-write-wins, so concurrent batches that
/// resolve overlapping handles need no coordination beyond the lock.
/// Handles are trimmed on every read and write.
#[derive(Debug, Default)]
pub struct ProfileCache {
    entries: RwLock<HashMap<String, Option<String>>>,
}

impl ProfileCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, handle: &str) -> CacheLookup {
        match self.entries.read().get(normalize(handle)) {
            Some(Some(url)) => CacheLookup::Avatar(url.clone()),
            Some(None) => CacheLookup::Absent,
            None => CacheLookup::Unknown,
        }
    }

    /// The cached avatar, treating both `Absent` and `Unknown` as none.
    pub fn avatar_url(&self, handle: &str) -> Option<String> {
        self.entries.read().get(normalize(handle)).cloned().flatten()
    }

    pub fn contains(&self, handle: &str) -> bool {
        self.entries.read().contains_key(normalize(handle))
    }

    pub fn record(&self, handle: &str, avatar_url: Option<String>) {
        self.entries
            .write()
            .insert(normalize(handle).to_string(), avatar_url);
    }

    pub fn record_all<I>(&self, results: I)
    where
        I: IntoIterator<Item = (String, Option<String>)>,
    {
        let mut entries = self.entries.write();
        for (handle, avatar_url) in results {
            entries.insert(normalize(&handle).to_string(), avatar_url);
        }
    }

    /// Deduplicated, non-empty handles from `handles` that were never looked up.
    pub fn unknown<I, S>(&self, handles: I) -> BTreeSet<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let entries = self.entries.read();
        handles
            .into_iter()
            .map(|handle| normalize(handle.as_ref()).to_string())
            .filter(|handle| !handle.is_empty() && !entries.contains_key(handle))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

fn normalize(handle: &str) -> &str {
    handle.trim()
}
