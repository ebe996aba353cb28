//! Bluesky (AT Protocol) integration: session, rich text facets and the
//! mention poller.

pub mod facets;
pub mod poller;
pub mod session;
pub mod types;

pub use poller::{MentionHandler, MentionPoller, PollerHandle, PollerState};
pub use session::BlueskySession;
pub use types::{Identity, Mention, NewPost, Notification, PostRef};

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BlueskyError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("XRPC error ({status}) {error}: {message}")]
    Xrpc {
        status: u16,
        error: String,
        message: String,
    },
    #[error("rate limited by the PDS")]
    RateLimited,
    #[error("not logged in")]
    NotLoggedIn,
    #[error("post not found: {0}")]
    PostNotFound(String),
    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl BlueskyError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited)
            || matches!(self, Self::Xrpc { error, .. } if error == "RateLimitExceeded")
    }
}

/// Source of the account's notifications
#[async_trait]
pub trait NotificationFeed: Send + Sync {
    /// Authenticate once and return the account identity
    async fn login(&self) -> Result<Identity, BlueskyError>;

    /// Most recent `limit` notifications, newest first
    async fn list_notifications(&self, limit: u32) -> Result<Vec<Notification>, BlueskyError>;
}

/// Reads and writes posts on behalf of the logged-in account
#[async_trait]
pub trait PostClient: Send + Sync {
    /// Canonical reference of the post at `uri`, read fresh from the platform
    async fn get_post(&self, uri: &str) -> Result<PostRef, BlueskyError>;

    /// DID for `handle`, `None` if the handle does not resolve
    async fn resolve_handle(&self, handle: &str) -> Result<Option<String>, BlueskyError>;

    async fn create_post(&self, post: &NewPost) -> Result<PostRef, BlueskyError>;
}
