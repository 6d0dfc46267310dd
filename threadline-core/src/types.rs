use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

const API_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// A content record as returned by the condenser API.
///
/// Listing calls may return records with only the identifying fields
/// populated, so every field falls back to its default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawContent {
    pub author: String,
    pub permlink: String,
    pub parent_author: String,
    pub parent_permlink: String,
    pub category: String,
    pub title: String,
    pub body: String,
    pub created: String,
    pub json_metadata: String,
    pub net_votes: i64,
    pub children: i64,
    pub pending_payout_value: String,
    pub total_payout_value: String,
    pub curator_payout_value: String,
    pub active_votes: Vec<Value>,
}

impl RawContent {
    pub fn key(&self) -> NodeKey {
        NodeKey::new(&self.author, &self.permlink)
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        parse_timestamp(&self.created)
    }

    /// Sum of pending, author and curator payouts.
    pub fn payout(&self) -> f64 {
        parse_asset(&self.pending_payout_value)
            + parse_asset(&self.total_payout_value)
            + parse_asset(&self.curator_payout_value)
    }

    pub fn vote_count(&self) -> u32 {
        if self.active_votes.is_empty() {
            self.net_votes.clamp(0, u32::MAX as i64) as u32
        } else {
            self.active_votes.len() as u32
        }
    }

    pub fn reply_count(&self) -> u32 {
        self.children.clamp(0, u32::MAX as i64) as u32
    }

    pub fn tags(&self) -> Vec<String> {
        let tags: Vec<String> = serde_json::from_str::<Value>(&self.json_metadata)
            .ok()
            .and_then(|metadata| metadata.get("tags").cloned())
            .and_then(|tags| match tags {
                Value::Array(items) => Some(
                    items
                        .into_iter()
                        .filter_map(|tag| tag.as_str().map(str::to_string))
                        .filter(|tag| !tag.is_empty())
                        .collect(),
                ),
                _ => None,
            })
            .unwrap_or_default();

        if tags.is_empty() && !self.category.is_empty() {
            vec![self.category.clone()]
        } else {
            tags
        }
    }
}

/// Raw account record from the batched accounts lookup.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawAccount {
    pub name: String,
    pub json_metadata: String,
    pub posting_json_metadata: String,
}

/// Identity of a content item: `(author, permlink)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeKey {
    pub author: String,
    pub permlink: String,
}

impl NodeKey {
    pub fn new(author: &str, permlink: &str) -> Self {
        Self {
            author: author.to_string(),
            permlink: permlink.to_string(),
        }
    }

    pub fn matches(&self, author: &str, permlink: &str) -> bool {
        self.author == author && self.permlink == permlink
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}/{}", self.author, self.permlink)
    }
}

/// The root post of a thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentNode {
    pub author: String,
    pub permlink: String,
    pub title: String,
    pub body: String,
    pub created: DateTime<Utc>,
    pub vote_count: u32,
    pub reply_count: u32,
    pub payout: f64,
    pub avatar_url: Option<String>,
    pub active_votes: Vec<Value>,
    pub category: Option<String>,
    pub tags: Vec<String>,
}

impl ContentNode {
    pub fn from_raw(raw: RawContent, avatar_url: Option<String>) -> Self {
        let created = raw.created_at();
        let payout = raw.payout();
        let vote_count = raw.vote_count();
        let reply_count = raw.reply_count();
        let tags = raw.tags();

        Self {
            author: raw.author,
            permlink: raw.permlink,
            title: raw.title,
            body: raw.body,
            created,
            vote_count,
            reply_count,
            payout,
            avatar_url,
            active_votes: raw.active_votes,
            category: Some(raw.category).filter(|c| !c.is_empty()),
            tags,
        }
    }

    pub fn key(&self) -> NodeKey {
        NodeKey::new(&self.author, &self.permlink)
    }
}

/// A reply anywhere below the root post.
///
/// `depth` is relative to the root: its direct replies sit at depth 0.
/// Subtrees are held behind `Arc` so a patched tree can share every
/// untouched branch with the previous one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentNode {
    pub author: String,
    pub permlink: String,
    pub parent_author: String,
    pub parent_permlink: String,
    pub body: String,
    pub created: DateTime<Utc>,
    pub vote_count: u32,
    pub reply_count: u32,
    pub payout: f64,
    pub avatar_url: Option<String>,
    pub active_votes: Vec<Value>,
    pub depth: u32,
    pub replies: Vec<Arc<CommentNode>>,
}

impl CommentNode {
    pub fn from_raw(
        raw: RawContent,
        depth: u32,
        avatar_url: Option<String>,
        replies: Vec<Arc<CommentNode>>,
    ) -> Self {
        let created = raw.created_at();
        let payout = raw.payout();
        let vote_count = raw.vote_count();
        let reply_count = raw.reply_count();

        Self {
            author: raw.author,
            permlink: raw.permlink,
            parent_author: raw.parent_author,
            parent_permlink: raw.parent_permlink,
            body: raw.body,
            created,
            vote_count,
            reply_count,
            payout,
            avatar_url,
            active_votes: raw.active_votes,
            depth,
            replies,
        }
    }

    pub fn key(&self) -> NodeKey {
        NodeKey::new(&self.author, &self.permlink)
    }

    pub fn is(&self, author: &str, permlink: &str) -> bool {
        self.author == author && self.permlink == permlink
    }
}

/// Partial field update applied by optimistic local patches.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodePatch {
    pub title: Option<String>,
    pub body: Option<String>,
    pub vote_count: Option<u32>,
    pub reply_count: Option<u32>,
    pub payout: Option<f64>,
    pub avatar_url: Option<Option<String>>,
    pub active_votes: Option<Vec<Value>>,
}

impl NodePatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_vote_count(mut self, vote_count: u32) -> Self {
        self.vote_count = Some(vote_count);
        self
    }

    pub fn with_reply_count(mut self, reply_count: u32) -> Self {
        self.reply_count = Some(reply_count);
        self
    }

    pub fn with_payout(mut self, payout: f64) -> Self {
        self.payout = Some(payout.max(0.0));
        self
    }

    pub fn with_avatar_url(mut self, avatar_url: Option<String>) -> Self {
        self.avatar_url = Some(avatar_url);
        self
    }

    pub fn with_active_votes(mut self, active_votes: Vec<Value>) -> Self {
        self.active_votes = Some(active_votes);
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Returns a patched copy of `node`. `title` has no counterpart on a
    /// comment and is ignored here.
    pub fn apply_to_comment(&self, node: &CommentNode) -> CommentNode {
        let mut patched = node.clone();
        if let Some(body) = &self.body {
            patched.body = body.clone();
        }
        if let Some(vote_count) = self.vote_count {
            patched.vote_count = vote_count;
        }
        if let Some(reply_count) = self.reply_count {
            patched.reply_count = reply_count;
        }
        if let Some(payout) = self.payout {
            patched.payout = payout;
        }
        if let Some(avatar_url) = &self.avatar_url {
            patched.avatar_url = avatar_url.clone();
        }
        if let Some(active_votes) = &self.active_votes {
            patched.active_votes = active_votes.clone();
        }
        patched
    }

    pub fn apply_to_content(&self, node: &ContentNode) -> ContentNode {
        let mut patched = node.clone();
        if let Some(title) = &self.title {
            patched.title = title.clone();
        }
        if let Some(body) = &self.body {
            patched.body = body.clone();
        }
        if let Some(vote_count) = self.vote_count {
            patched.vote_count = vote_count;
        }
        if let Some(reply_count) = self.reply_count {
            patched.reply_count = reply_count;
        }
        if let Some(payout) = self.payout {
            patched.payout = payout;
        }
        if let Some(avatar_url) = &self.avatar_url {
            patched.avatar_url = avatar_url.clone();
        }
        if let Some(active_votes) = &self.active_votes {
            patched.active_votes = active_votes.clone();
        }
        patched
    }
}

/// Parses the API's naive UTC timestamps (`2016-07-04T00:00:00`), accepting
/// RFC 3339 as well. Unparsable input maps to the Unix epoch.
pub fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    NaiveDateTime::parse_from_str(raw, API_TIME_FORMAT)
        .map(|naive| Utc.from_utc_datetime(&naive))
        .or_else(|_| DateTime::parse_from_rfc3339(raw).map(|dt| dt.with_timezone(&Utc)))
        .unwrap_or_default()
}

/// Parses an asset string such as `"1.234 HBD"` into its amount.
pub fn parse_asset(raw: &str) -> f64 {
    raw.split_whitespace()
        .next()
        .and_then(|amount| amount.parse::<f64>().ok())
        .filter(|amount| amount.is_finite())
        .map(|amount| amount.max(0.0))
        .unwrap_or(0.0)
}
