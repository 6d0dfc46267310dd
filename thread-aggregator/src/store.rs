use crate::avatar::AvatarBatchResolver;
use crate::fetcher::{ChildFetcher, RootFetcher};
use crate::profile_cache::ProfileCache;
use crate::tree::{replace_node, sort_newest_first, TreeBuilder};
use parking_lot::RwLock;
use serde::ser::{SerializeStruct, Serializer};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use threadline_core::{
    AccountsApi, AppConfig, CommentNode, ContentApi, ContentNode, CoreError, ErrorDescriptor,
    ErrorExt, NodeKey, NodePatch, ThreadError,
};
use tracing::{debug, info, warn};

/// Per-side fetch lifecycle: `Idle → Loading → {Ready | Failed}`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadPhase {
    #[default]
    Idle,
    Loading,
    Ready,
    Failed,
}

/// Snapshot of everything the UI renders for one thread.
///
/// Root and tree are tracked independently: a failure on one side never
/// clears the other.
#[derive(Debug, Clone, Default)]
pub struct AggregateState {
    pub root: Option<Arc<ContentNode>>,
    pub tree: Vec<Arc<CommentNode>>,
    pub root_phase: LoadPhase,
    pub tree_phase: LoadPhase,
    pub root_error: Option<ErrorDescriptor>,
    pub tree_error: Option<ErrorDescriptor>,
}

impl AggregateState {
    pub fn root_loading(&self) -> bool {
        self.root_phase == LoadPhase::Loading
    }

    pub fn tree_loading(&self) -> bool {
        self.tree_phase == LoadPhase::Loading
    }
}

/// Serialized with the derived `root_loading`/`tree_loading` flags alongside
/// the phases.
impl Serialize for AggregateState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("AggregateState", 8)?;
        state.serialize_field("root", &self.root)?;
        state.serialize_field("tree", &self.tree)?;
        state.serialize_field("root_phase", &self.root_phase)?;
        state.serialize_field("tree_phase", &self.tree_phase)?;
        state.serialize_field("root_loading", &self.root_loading())?;
        state.serialize_field("tree_loading", &self.tree_loading())?;
        state.serialize_field("root_error", &self.root_error)?;
        state.serialize_field("tree_error", &self.tree_error)?;
        state.end()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct StoreOptions {
    pub max_depth: u32,
    pub hydrate_children: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for StoreOptions {
    fn from(config: &AppConfig) -> Self {
        Self {
            max_depth: config.max_depth,
            hydrate_children: config.hydrate_children,
        }
    }
}

/// Owns the aggregated state of one thread and the fetchers that fill it.
pub struct AggregateStore {
    key: NodeKey,
    root_fetcher: RootFetcher,
    tree_builder: TreeBuilder,
    state: RwLock<AggregateState>,
    root_generation: AtomicU64,
    tree_generation: AtomicU64,
}

impl AggregateStore {
    pub fn new(key: NodeKey, root_fetcher: RootFetcher, tree_builder: TreeBuilder) -> Self {
        Self {
            key,
            root_fetcher,
            tree_builder,
            state: RwLock::new(AggregateState::default()),
            root_generation: AtomicU64::new(0),
            tree_generation: AtomicU64::new(0),
        }
    }

    /// Wires root and tree fetching to the same collaborators and profile cache.
    pub fn from_sources(
        key: NodeKey,
        content: Arc<dyn ContentApi>,
        accounts: Arc<dyn AccountsApi>,
        cache: Arc<ProfileCache>,
        options: StoreOptions,
    ) -> Self {
        let avatars = AvatarBatchResolver::new(accounts, cache);
        let root_fetcher = RootFetcher::new(content.clone(), avatars.clone());
        let children = ChildFetcher::new(content).with_hydration(options.hydrate_children);
        let tree_builder = TreeBuilder::new(children, avatars).with_max_depth(options.max_depth);
        Self::new(key, root_fetcher, tree_builder)
    }

    pub fn key(&self) -> &NodeKey {
        &self.key
    }

    pub fn state(&self) -> AggregateState {
        self.state.read().clone()
    }

    pub fn root(&self) -> Option<Arc<ContentNode>> {
        self.state.read().root.clone()
    }

    pub fn tree(&self) -> Vec<Arc<CommentNode>> {
        self.state.read().tree.clone()
    }

    pub async fn fetch_root(&self) -> Result<Arc<ContentNode>, CoreError> {
        let generation = self.root_generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.write().root_phase = LoadPhase::Loading;

        let result = self
            .root_fetcher
            .fetch(&self.key.author, &self.key.permlink)
            .await
            .map(Arc::new);

        let mut state = self.state.write();
        if self.root_generation.load(Ordering::SeqCst) != generation {
            debug!("Discarding superseded root fetch for {}", self.key);
            return result;
        }

        match result {
            Ok(root) => {
                state.root = Some(root.clone());
                state.root_error = None;
                state.root_phase = LoadPhase::Ready;
                Ok(root)
            }
            Err(error) => {
                error.log_warn();
                // Deleted content is gone; a transient failure keeps the last good root.
                if matches!(error, CoreError::Thread(ThreadError::RootNotFound { .. })) {
                    state.root = None;
                }
                state.root_error = Some(ErrorDescriptor::from(&error));
                state.root_phase = LoadPhase::Failed;
                Err(error)
            }
        }
    }

    pub async fn fetch_tree(&self) -> Result<Vec<Arc<CommentNode>>, CoreError> {
        self.fetch_tree_with_depth(self.tree_builder.max_depth())
            .await
    }

    /// Rebuilds the whole tree; top-level replies end up newest first while
    /// nested replies keep fetch order.
    pub async fn fetch_tree_with_depth(
        &self,
        max_depth: u32,
    ) -> Result<Vec<Arc<CommentNode>>, CoreError> {
        let generation = self.tree_generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.write().tree_phase = LoadPhase::Loading;

        let result = self
            .tree_builder
            .build_with_depth(&self.key.author, &self.key.permlink, max_depth)
            .await
            .map(|mut tree| {
                sort_newest_first(&mut tree);
                tree
            });

        let mut state = self.state.write();
        if self.tree_generation.load(Ordering::SeqCst) != generation {
            debug!("Discarding superseded tree fetch for {}", self.key);
            return result;
        }

        match result {
            Ok(tree) => {
                state.tree = tree.clone();
                state.tree_error = None;
                state.tree_phase = LoadPhase::Ready;
                Ok(tree)
            }
            Err(error) => {
                error.log_warn();
                state.tree_error = Some(ErrorDescriptor::from(&error));
                state.tree_phase = LoadPhase::Failed;
                Err(error)
            }
        }
    }

    /// Refetches root and tree concurrently. Neither side cancels the other;
    /// outcomes land in the state.
    pub async fn refresh_all(&self) {
        let (root, tree) = futures::join!(self.fetch_root(), self.fetch_tree());
        info!(
            "Refreshed {}: root {}, tree {}",
            self.key,
            if root.is_ok() { "ok" } else { "failed" },
            match &tree {
                Ok(tree) => format!("{} top-level replies", tree.len()),
                Err(_) => "failed".to_string(),
            }
        );
    }

    /// Applies `patch` to the node `author/permlink` without any network call.
    ///
    /// A match on the root replaces only the root. A match in the tree copies
    /// the path down to the node and shares every other subtree. Returns
    /// false when nothing matches.
    pub fn update_node(&self, author: &str, permlink: &str, patch: &NodePatch) -> bool {
        let mut state = self.state.write();

        if let Some(root) = state.root.as_ref().filter(|root| root.key().matches(author, permlink)) {
            let patched = Arc::new(patch.apply_to_content(root));
            state.root = Some(patched);
            return true;
        }

        match replace_node(&state.tree, author, permlink, |node| patch.apply_to_comment(node)) {
            Some(tree) => {
                state.tree = tree;
                true
            }
            None => {
                warn!("No node @{}/{} to update", author, permlink);
                false
            }
        }
    }
}
