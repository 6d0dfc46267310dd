#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use thread_aggregator::{
    AvatarBatchResolver, ChildFetcher, ProfileCache, RootFetcher, TreeBuilder,
};
use threadline_core::{
    AccountsApi, ContentApi, ContentApiError, CoreError, NodeKey, RawAccount, RawContent,
};
use tokio::sync::Notify;

/// Routes the crate's `tracing` output through the test harness so degraded
/// fetches show up in failing test logs. Safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("thread_aggregator=debug")),
        )
        .with_test_writer()
        .try_init();
}

/// Holds one listing call after it has read its replies.
#[derive(Default)]
pub struct ListingGate {
    /// Signalled once the held call has its snapshot.
    pub entered: Notify,
    /// Lets the held call return.
    pub release: Notify,
}

/// In-memory content API. Listings return shallow records; `get_content`
/// returns the full record.
#[derive(Default)]
pub struct MockContentApi {
    records: RwLock<HashMap<NodeKey, RawContent>>,
    replies: RwLock<HashMap<NodeKey, Vec<NodeKey>>>,
    failing_records: RwLock<HashSet<NodeKey>>,
    failing_listings: RwLock<HashSet<NodeKey>>,
    listing_gate: Mutex<Option<Arc<ListingGate>>>,
    listing_calls: AtomicUsize,
    content_calls: AtomicUsize,
}

impl MockContentApi {
    pub fn new() -> Self {
        init_tracing();
        Self::default()
    }

    /// The next `get_content_replies` call snapshots its replies, then waits
    /// on the returned gate before answering.
    pub fn hold_next_listing(&self) -> Arc<ListingGate> {
        let gate = Arc::new(ListingGate::default());
        *self.listing_gate.lock() = Some(gate.clone());
        gate
    }

    pub fn add_post(&self, author: &str, permlink: &str, created: &str) {
        let record = full_record(author, permlink, "", "", created);
        self.records.write().insert(record.key(), record);
    }

    pub fn add_reply(&self, parent: (&str, &str), author: &str, permlink: &str, created: &str) {
        let record = full_record(author, permlink, parent.0, parent.1, created);
        let key = record.key();
        self.records.write().insert(key.clone(), record);
        self.replies
            .write()
            .entry(NodeKey::new(parent.0, parent.1))
            .or_default()
            .push(key);
    }

    /// Lists `child` again under `parent` without creating a new record.
    pub fn link_existing(&self, parent: (&str, &str), child: (&str, &str)) {
        self.replies
            .write()
            .entry(NodeKey::new(parent.0, parent.1))
            .or_default()
            .push(NodeKey::new(child.0, child.1));
    }

    pub fn remove_reply(&self, parent: (&str, &str), author: &str, permlink: &str) {
        let key = NodeKey::new(author, permlink);
        self.records.write().remove(&key);
        if let Some(children) = self.replies.write().get_mut(&NodeKey::new(parent.0, parent.1)) {
            children.retain(|child| child != &key);
        }
    }

    /// Removes the record but keeps it listed under its parent.
    pub fn drop_record(&self, author: &str, permlink: &str) {
        self.records.write().remove(&NodeKey::new(author, permlink));
    }

    /// Stores `record` under `author/permlink`, whatever the record says.
    pub fn insert_record(&self, author: &str, permlink: &str, record: RawContent) {
        self.records
            .write()
            .insert(NodeKey::new(author, permlink), record);
    }

    pub fn fail_record(&self, author: &str, permlink: &str) {
        self.failing_records
            .write()
            .insert(NodeKey::new(author, permlink));
    }

    pub fn heal_record(&self, author: &str, permlink: &str) {
        self.failing_records
            .write()
            .remove(&NodeKey::new(author, permlink));
    }

    pub fn fail_listing(&self, author: &str, permlink: &str) {
        self.failing_listings
            .write()
            .insert(NodeKey::new(author, permlink));
    }

    pub fn listing_calls(&self) -> usize {
        self.listing_calls.load(Ordering::SeqCst)
    }

    pub fn content_calls(&self) -> usize {
        self.content_calls.load(Ordering::SeqCst)
    }
}

pub fn full_record(
    author: &str,
    permlink: &str,
    parent_author: &str,
    parent_permlink: &str,
    created: &str,
) -> RawContent {
    RawContent {
        author: author.to_string(),
        permlink: permlink.to_string(),
        parent_author: parent_author.to_string(),
        parent_permlink: parent_permlink.to_string(),
        category: "test".to_string(),
        title: if parent_author.is_empty() {
            format!("Title of {}", permlink)
        } else {
            String::new()
        },
        body: format!("body of {}", permlink),
        created: created.to_string(),
        net_votes: 1,
        pending_payout_value: "0.100 HBD".to_string(),
        ..Default::default()
    }
}

#[async_trait]
impl ContentApi for MockContentApi {
    async fn get_content(
        &self,
        author: &str,
        permlink: &str,
    ) -> Result<Option<RawContent>, CoreError> {
        self.content_calls.fetch_add(1, Ordering::SeqCst);
        let key = NodeKey::new(author, permlink);
        if self.failing_records.read().contains(&key) {
            return Err(CoreError::ContentApi(ContentApiError::RequestTimeout));
        }
        Ok(self.records.read().get(&key).cloned())
    }

    async fn get_content_replies(
        &self,
        author: &str,
        permlink: &str,
    ) -> Result<Vec<RawContent>, CoreError> {
        self.listing_calls.fetch_add(1, Ordering::SeqCst);
        let key = NodeKey::new(author, permlink);
        if self.failing_listings.read().contains(&key) {
            return Err(CoreError::ContentApi(ContentApiError::EndpointUnavailable {
                endpoint: "mock".to_string(),
            }));
        }
        let children = self.replies.read().get(&key).cloned().unwrap_or_default();

        let gate = self.listing_gate.lock().take();
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }

        Ok(children
            .into_iter()
            .map(|child| RawContent {
                author: child.author,
                permlink: child.permlink,
                parent_author: author.to_string(),
                parent_permlink: permlink.to_string(),
                ..Default::default()
            })
            .collect())
    }
}

/// In-memory accounts API recording every batch it receives.
#[derive(Default)]
pub struct MockAccountsApi {
    accounts: RwLock<HashMap<String, RawAccount>>,
    failing: AtomicBool,
    batches: Mutex<Vec<Vec<String>>>,
}

impl MockAccountsApi {
    pub fn new() -> Self {
        init_tracing();
        Self::default()
    }

    pub fn add_avatar(&self, name: &str, url: &str) {
        let metadata = format!(r#"{{"profile":{{"profile_image":"{}"}}}}"#, url);
        self.add_metadata(name, &metadata);
    }

    pub fn add_metadata(&self, name: &str, posting_json_metadata: &str) {
        self.accounts.write().insert(
            name.to_string(),
            RawAccount {
                name: name.to_string(),
                json_metadata: String::new(),
                posting_json_metadata: posting_json_metadata.to_string(),
            },
        );
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.batches.lock().len()
    }

    pub fn batches(&self) -> Vec<Vec<String>> {
        self.batches.lock().clone()
    }
}

#[async_trait]
impl AccountsApi for MockAccountsApi {
    async fn get_accounts(&self, names: &[String]) -> Result<Vec<RawAccount>, CoreError> {
        self.batches.lock().push(names.to_vec());
        if self.failing.load(Ordering::SeqCst) {
            return Err(CoreError::ContentApi(ContentApiError::ServerError {
                status_code: 502,
            }));
        }
        let accounts = self.accounts.read();
        Ok(names
            .iter()
            .filter_map(|name| accounts.get(name).cloned())
            .collect())
    }
}

/// Root `alice/p1` with replies `bob/p2` and `carol/p3`; `bob/p2` has reply `alice/p4`.
pub fn scenario_content() -> Arc<MockContentApi> {
    let content = Arc::new(MockContentApi::new());
    content.add_post("alice", "p1", "2021-01-01T00:00:00");
    content.add_reply(("alice", "p1"), "bob", "p2", "2021-01-01T01:00:00");
    content.add_reply(("alice", "p1"), "carol", "p3", "2021-01-01T02:00:00");
    content.add_reply(("bob", "p2"), "alice", "p4", "2021-01-01T03:00:00");
    content
}

pub fn scenario_accounts() -> Arc<MockAccountsApi> {
    let accounts = Arc::new(MockAccountsApi::new());
    accounts.add_avatar("alice", "https://img/alice.png");
    accounts.add_avatar("bob", "https://img/bob.png");
    accounts.add_avatar("carol", "https://img/carol.png");
    accounts
}

pub struct Harness {
    pub cache: Arc<ProfileCache>,
    pub avatars: AvatarBatchResolver,
    pub root_fetcher: RootFetcher,
    pub tree_builder: TreeBuilder,
}

pub fn harness(content: &Arc<MockContentApi>, accounts: &Arc<MockAccountsApi>) -> Harness {
    let cache = Arc::new(ProfileCache::new());
    let avatars = AvatarBatchResolver::new(accounts.clone(), cache.clone());
    let root_fetcher = RootFetcher::new(content.clone(), avatars.clone());
    let tree_builder = TreeBuilder::new(ChildFetcher::new(content.clone()), avatars.clone());
    Harness {
        cache,
        avatars,
        root_fetcher,
        tree_builder,
    }
}
