use crate::avatar::AvatarBatchResolver;
use crate::fetcher::{validate_key, ChildFetcher};
use crate::profile_cache::ProfileCache;
use futures::future::{join_all, BoxFuture, FutureExt};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use threadline_core::{
    degrade, CommentNode, CoreError, NodeKey, RawContent, ThreadError, DEFAULT_MAX_DEPTH,
};
use tracing::debug;

/// Materialises the reply tree under a post.
///
/// Expansion is level-parallel and depth-sequential: the replies of one
/// parent are hydrated together, their authors' avatars are resolved in one
/// batch, and only then does each reply expand its own replies, all
/// siblings concurrently.
#[derive(Clone)]
pub struct TreeBuilder {
    children: ChildFetcher,
    avatars: AvatarBatchResolver,
    max_depth: u32,
}

impl TreeBuilder {
    pub fn new(children: ChildFetcher, avatars: AvatarBatchResolver) -> Self {
        Self {
            children,
            avatars,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub fn with_max_depth(mut self, max_depth: u32) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }

    pub async fn build(
        &self,
        author: &str,
        permlink: &str,
    ) -> Result<Vec<Arc<CommentNode>>, CoreError> {
        self.build_with_depth(author, permlink, self.max_depth).await
    }

    /// Builds the tree with nodes at depth `0..=max_depth`.
    ///
    /// Fails only when the replies of the root itself cannot be listed;
    /// failures further down leave the affected node with no replies.
    pub async fn build_with_depth(
        &self,
        author: &str,
        permlink: &str,
        max_depth: u32,
    ) -> Result<Vec<Arc<CommentNode>>, CoreError> {
        validate_key(author, permlink)?;

        let root = NodeKey::new(author, permlink);
        let listing = self
            .children
            .list(author, permlink)
            .await
            .map_err(|source| ThreadError::TreeFetchFailure {
                author: author.to_string(),
                permlink: permlink.to_string(),
                source: Box::new(source),
            })?;

        let traversal = Traversal {
            builder: self,
            max_depth,
            seen: Mutex::new(HashSet::from([root.clone()])),
        };
        let tree = traversal.build_level(&root, listing, 0).await;

        debug!(
            "Built tree for @{}/{}: {} nodes",
            author,
            permlink,
            node_count(&tree)
        );
        Ok(tree)
    }

    fn cache(&self) -> &ProfileCache {
        self.avatars.cache()
    }
}

struct Traversal<'a> {
    builder: &'a TreeBuilder,
    max_depth: u32,
    seen: Mutex<HashSet<NodeKey>>,
}

impl Traversal<'_> {
    fn expand(&self, parent: NodeKey, depth: u32) -> BoxFuture<'_, Vec<Arc<CommentNode>>> {
        async move {
            if depth > self.max_depth {
                return Vec::new();
            }

            let listing = self
                .builder
                .children
                .list(&parent.author, &parent.permlink)
                .await;
            let listing = degrade(listing, &format!("replies of {}", parent), Vec::new)
                .into_inner();
            self.build_level(&parent, listing, depth).await
        }
        .boxed()
    }

    async fn build_level(
        &self,
        parent: &NodeKey,
        listing: Vec<RawContent>,
        depth: u32,
    ) -> Vec<Arc<CommentNode>> {
        // Claim before hydrating so repeated keys never cost a record fetch.
        let claimed = self.claim(listing);
        if claimed.is_empty() {
            return Vec::new();
        }
        let records = self.builder.children.hydrate_all(parent, claimed).await;

        // Barrier: every author of this level is cached before any node is built.
        self.builder
            .avatars
            .resolve(records.iter().map(|record| record.author.as_str()))
            .await;

        let branches = records.into_iter().map(|record| async move {
            let avatar_url = self.builder.cache().avatar_url(&record.author);
            let replies = self.expand(record.key(), depth + 1).await;
            Arc::new(CommentNode::from_raw(record, depth, avatar_url, replies))
        });
        join_all(branches).await
    }

    /// Drops records without an author and any record already placed in the tree.
    fn claim(&self, listing: Vec<RawContent>) -> Vec<RawContent> {
        let mut seen = self.seen.lock();
        listing
            .into_iter()
            .filter(|record| {
                if record.author.is_empty() {
                    debug!("Skipping reply without author");
                    return false;
                }
                let fresh = seen.insert(record.key());
                if !fresh {
                    debug!("Skipping duplicate reply {}", record.key());
                }
                fresh
            })
            .collect()
    }
}

/// Sorts top-level replies newest first. Ties keep fetch order.
pub fn sort_newest_first(tree: &mut [Arc<CommentNode>]) {
    tree.sort_by(|a, b| b.created.cmp(&a.created));
}

pub fn node_count(tree: &[Arc<CommentNode>]) -> usize {
    tree.iter().map(|node| 1 + node_count(&node.replies)).sum()
}

pub fn find_node<'t>(
    tree: &'t [Arc<CommentNode>],
    author: &str,
    permlink: &str,
) -> Option<&'t Arc<CommentNode>> {
    tree.iter().find_map(|node| {
        if node.is(author, permlink) {
            Some(node)
        } else {
            find_node(&node.replies, author, permlink)
        }
    })
}

/// Depth-first, pre-order walk over every node.
pub fn walk(tree: &[Arc<CommentNode>]) -> impl Iterator<Item = &CommentNode> {
    let mut stack: Vec<&CommentNode> = tree.iter().rev().map(|node| node.as_ref()).collect();
    std::iter::from_fn(move || {
        let node = stack.pop()?;
        stack.extend(node.replies.iter().rev().map(|child| child.as_ref()));
        Some(node)
    })
}

/// Rewrites the tree with the node `author/permlink` replaced by `patched`.
///
/// Only the path from the top level to that node is copied; every other
/// subtree is shared with `tree`. Returns `None` when no node matches.
pub fn replace_node<F>(
    tree: &[Arc<CommentNode>],
    author: &str,
    permlink: &str,
    patched: F,
) -> Option<Vec<Arc<CommentNode>>>
where
    F: FnOnce(&CommentNode) -> CommentNode,
{
    let mut patched = Some(patched);
    replace_in(tree, author, permlink, &mut patched)
}

fn replace_in<F>(
    nodes: &[Arc<CommentNode>],
    author: &str,
    permlink: &str,
    patched: &mut Option<F>,
) -> Option<Vec<Arc<CommentNode>>>
where
    F: FnOnce(&CommentNode) -> CommentNode,
{
    for (index, node) in nodes.iter().enumerate() {
        let replacement = if node.is(author, permlink) {
            patched.take().map(|apply| Arc::new(apply(node)))
        } else {
            replace_in(&node.replies, author, permlink, patched).map(|replies| {
                let mut parent = CommentNode::clone(node);
                parent.replies = replies;
                Arc::new(parent)
            })
        };

        if let Some(replacement) = replacement {
            let mut rewritten = nodes.to_vec();
            rewritten[index] = replacement;
            return Some(rewritten);
        }
    }
    None
}
