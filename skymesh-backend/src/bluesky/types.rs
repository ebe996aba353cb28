//! AT Protocol records and views used by the bridge.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Collection NSID for posts
pub const POST_COLLECTION: &str = "app.bsky.feed.post";

/// Strong reference to a post
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostRef {
    pub uri: String,
    pub cid: String,
}

impl PostRef {
    pub fn new(uri: impl Into<String>, cid: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            cid: cid.into(),
        }
    }

    /// Record key: the last path segment of the AT URI
    pub fn rkey(&self) -> &str {
        self.uri.rsplit('/').next().unwrap_or(&self.uri)
    }
}

/// The account a session is logged in as
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub did: String,
    pub handle: String,
}

// =====================================================
// Notifications
// =====================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationAuthor {
    pub did: String,
    pub handle: String,
}

/// The subset of a post record the bridge reads
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PostRecord {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub facets: Vec<Facet>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub uri: String,
    pub cid: String,
    pub author: NotificationAuthor,
    pub reason: String,
    #[serde(default)]
    pub record: PostRecord,
    pub indexed_at: String,
}

impl Notification {
    /// `indexedAt` as a timestamp; `None` if the platform sent something unparseable
    pub fn indexed_at(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.indexed_at)
            .ok()
            .map(|t| t.with_timezone(&Utc))
    }

    /// Whether the post's rich text explicitly mentions `did`
    pub fn mentions_did(&self, did: &str) -> bool {
        self.record.facets.iter().any(|facet| {
            facet
                .features
                .iter()
                .any(|f| matches!(f, FacetFeature::Mention { did: d } if d == did))
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListNotificationsResponse {
    #[serde(default)]
    pub notifications: Vec<Notification>,
}

/// A post that mentions or replies to the bot, as handed to the mention handler
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mention {
    pub id: String,
    pub uri: String,
    pub cid: String,
    pub text: String,
    pub author_handle: String,
    pub author_did: String,
    pub created_at: DateTime<Utc>,
}

impl Mention {
    pub fn from_notification(notification: &Notification, indexed_at: DateTime<Utc>) -> Self {
        let post = PostRef::new(&notification.uri, &notification.cid);
        Self {
            id: post.rkey().to_string(),
            uri: notification.uri.clone(),
            cid: notification.cid.clone(),
            text: notification.record.text.clone(),
            author_handle: notification.author.handle.clone(),
            author_did: notification.author.did.clone(),
            created_at: indexed_at,
        }
    }

    pub fn post_ref(&self) -> PostRef {
        PostRef::new(&self.uri, &self.cid)
    }
}

// =====================================================
// Rich text facets
// =====================================================

/// UTF-8 byte range a facet applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ByteSlice {
    pub byte_start: usize,
    pub byte_end: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "$type")]
pub enum FacetFeature {
    #[serde(rename = "app.bsky.richtext.facet#mention")]
    Mention { did: String },
    #[serde(rename = "app.bsky.richtext.facet#link")]
    Link { uri: String },
    #[serde(rename = "app.bsky.richtext.facet#tag")]
    Tag { tag: String },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Facet {
    pub index: ByteSlice,
    #[serde(default)]
    pub features: Vec<FacetFeature>,
}

// =====================================================
// Post creation
// =====================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplyRef {
    pub root: PostRef,
    pub parent: PostRef,
}

/// A post record ready to be written to the repo
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPost {
    #[serde(rename = "$type")]
    pub record_type: &'static str,
    pub text: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub facets: Vec<Facet>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply: Option<ReplyRef>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub langs: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl NewPost {
    pub fn reply(text: String, facets: Vec<Facet>, reply: ReplyRef, langs: Vec<String>) -> Self {
        Self {
            record_type: POST_COLLECTION,
            text,
            facets,
            reply: Some(reply),
            langs,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct CreateRecordResponse {
    pub uri: String,
    pub cid: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CreateSessionResponse {
    pub access_jwt: String,
    pub refresh_jwt: String,
    pub did: String,
    pub handle: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ResolveHandleResponse {
    pub did: String,
}

/// `app.bsky.feed.getPostThread` output, reduced to the anchor post
#[derive(Debug, Deserialize)]
pub(crate) struct GetPostThreadResponse {
    pub thread: ThreadView,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "$type")]
pub(crate) enum ThreadView {
    #[serde(rename = "app.bsky.feed.defs#threadViewPost")]
    Post { post: PostView },
    #[serde(rename = "app.bsky.feed.defs#notFoundPost")]
    NotFound { uri: String },
    #[serde(rename = "app.bsky.feed.defs#blockedPost")]
    Blocked { uri: String },
}

#[derive(Debug, Deserialize)]
pub(crate) struct PostView {
    pub uri: String,
    pub cid: String,
}

/// XRPC error body
#[derive(Debug, Default, Deserialize)]
pub(crate) struct XrpcErrorBody {
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub message: String,
}
