use crate::avatar::AvatarBatchResolver;
use futures::future::join_all;
use std::sync::Arc;
use threadline_core::{
    degrade, ContentApi, ContentNode, CoreError, NodeKey, RawContent, RecoveryResult,
    ThreadError,
};
use tracing::{debug, info};

pub(crate) fn validate_key(author: &str, permlink: &str) -> Result<(), CoreError> {
    if author.trim().is_empty() {
        return Err(CoreError::InvalidInput {
            message: "author must not be empty".to_string(),
        });
    }
    if permlink.trim().is_empty() {
        return Err(CoreError::InvalidInput {
            message: "permlink must not be empty".to_string(),
        });
    }
    Ok(())
}

/// Retrieves the direct replies of one content item.
#[derive(Clone)]
pub struct ChildFetcher {
    content: Arc<dyn ContentApi>,
    hydrate: bool,
}

impl ChildFetcher {
    pub fn new(content: Arc<dyn ContentApi>) -> Self {
        Self {
            content,
            hydrate: true,
        }
    }

    /// When disabled, listing records are trusted as full records.
    pub fn with_hydration(mut self, hydrate: bool) -> Self {
        self.hydrate = hydrate;
        self
    }

    /// One listing call; records may be shallow.
    pub async fn list(&self, author: &str, permlink: &str) -> Result<Vec<RawContent>, CoreError> {
        self.content.get_content_replies(author, permlink).await
    }

    /// Fetches the full record behind a shallow listing entry, keeping the
    /// shallow record if that fails.
    pub async fn hydrate(&self, shallow: RawContent) -> RecoveryResult<RawContent> {
        let key = shallow.key();
        let result = self
            .content
            .get_content(&key.author, &key.permlink)
            .await
            .and_then(|record| match record {
                Some(full) if !full.author.is_empty() => Ok(full),
                _ => Err(CoreError::NotFound {
                    resource: key.to_string(),
                }),
            });
        degrade(result, &key.to_string(), || shallow)
    }

    /// Lists the replies of `author/permlink` and hydrates them in parallel.
    ///
    /// Only the listing call can fail; a failed hydration degrades that one
    /// child to its shallow record.
    pub async fn fetch(&self, author: &str, permlink: &str) -> Result<Vec<RawContent>, CoreError> {
        let listing = self.list(author, permlink).await?;
        Ok(self
            .hydrate_all(&NodeKey::new(author, permlink), listing)
            .await)
    }

    /// Hydrates an already listed set of replies to `parent`, one request per
    /// record, all in flight together.
    pub async fn hydrate_all(&self, parent: &NodeKey, listing: Vec<RawContent>) -> Vec<RawContent> {
        if !self.hydrate || listing.is_empty() {
            return listing;
        }

        let hydrated = join_all(listing.into_iter().map(|shallow| self.hydrate(shallow))).await;
        let degraded = hydrated.iter().filter(|r| r.is_degraded()).count();
        if degraded > 0 {
            info!(
                "{} of {} replies to {} kept shallow records",
                degraded,
                hydrated.len(),
                parent
            );
        }
        hydrated.into_iter().map(RecoveryResult::into_inner).collect()
    }
}

/// Fetches and enriches the root post.
#[derive(Clone)]
pub struct RootFetcher {
    content: Arc<dyn ContentApi>,
    avatars: AvatarBatchResolver,
}

impl RootFetcher {
    pub fn new(content: Arc<dyn ContentApi>, avatars: AvatarBatchResolver) -> Self {
        Self { content, avatars }
    }

    pub async fn fetch(&self, author: &str, permlink: &str) -> Result<ContentNode, CoreError> {
        validate_key(author, permlink)?;

        let record = self
            .content
            .get_content(author, permlink)
            .await?
            .filter(|record| !record.author.is_empty())
            .ok_or_else(|| ThreadError::RootNotFound {
                author: author.to_string(),
                permlink: permlink.to_string(),
            })?;

        self.avatars.resolve([record.author.as_str()]).await;
        let avatar_url = self.avatars.cache().avatar_url(&record.author);

        debug!("Fetched root {}", NodeKey::new(author, permlink));
        Ok(ContentNode::from_raw(record, avatar_url))
    }
}
