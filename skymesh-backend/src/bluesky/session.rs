//! Authenticated XRPC session against a Bluesky PDS.
//!
//! Constructed once at startup and shared by `Arc` between the poller and the
//! reply publisher. Lifecycle is LoggedOut → LoggedIn → LoggedOut; tokens are
//! never refreshed.

use super::types::{
    CreateRecordResponse, CreateSessionResponse, GetPostThreadResponse, Identity,
    ListNotificationsResponse, NewPost, Notification, PostRef, ResolveHandleResponse, ThreadView,
    XrpcErrorBody, POST_COLLECTION,
};
use super::{BlueskyError, NotificationFeed, PostClient};
use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;

#[derive(Debug, Clone)]
struct AuthSession {
    access_jwt: String,
    refresh_jwt: String,
    did: String,
    handle: String,
}

pub struct BlueskySession {
    client: reqwest::Client,
    service: String,
    identifier: String,
    app_password: String,
    auth: RwLock<Option<AuthSession>>,
}

impl BlueskySession {
    pub fn new(
        client: reqwest::Client,
        service: &str,
        identifier: &str,
        app_password: &str,
    ) -> Self {
        Self {
            client,
            service: service.trim_end_matches('/').to_string(),
            identifier: identifier.to_string(),
            app_password: app_password.to_string(),
            auth: RwLock::new(None),
        }
    }

    #[cfg(test)]
    pub fn is_logged_in(&self) -> bool {
        self.auth.read().is_some()
    }

    /// Identity of the logged-in account
    pub fn identity(&self) -> Option<Identity> {
        self.auth.read().as_ref().map(|a| Identity {
            did: a.did.clone(),
            handle: a.handle.clone(),
        })
    }

    /// Create a session with the configured identifier and app password
    pub async fn login(&self) -> Result<Identity, BlueskyError> {
        let body = serde_json::json!({
            "identifier": self.identifier,
            "password": self.app_password,
        });

        let response = self
            .client
            .post(self.xrpc_url("com.atproto.server.createSession"))
            .json(&body)
            .send()
            .await?;
        let session: CreateSessionResponse = decode(response).await?;

        log::info!("Bluesky: Logged in as @{} ({})", session.handle, session.did);

        let identity = Identity {
            did: session.did.clone(),
            handle: session.handle.clone(),
        };
        *self.auth.write() = Some(AuthSession {
            access_jwt: session.access_jwt,
            refresh_jwt: session.refresh_jwt,
            did: session.did,
            handle: session.handle,
        });
        Ok(identity)
    }

    /// Delete the server-side session. Local state is cleared even if the call fails.
    pub async fn logout(&self) -> Result<(), BlueskyError> {
        let Some(auth) = self.auth.write().take() else {
            return Ok(());
        };

        let response = self
            .client
            .post(self.xrpc_url("com.atproto.server.deleteSession"))
            .bearer_auth(&auth.refresh_jwt)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(error_from_response(status, &body));
        }

        log::info!("Bluesky: Logged out @{}", auth.handle);
        Ok(())
    }

    pub async fn list_notifications(&self, limit: u32) -> Result<Vec<Notification>, BlueskyError> {
        let limit = limit.to_string();
        let page: ListNotificationsResponse = self
            .xrpc_get(
                "app.bsky.notification.listNotifications",
                &[("limit", limit.as_str())],
            )
            .await?;
        Ok(page.notifications)
    }

    pub async fn get_post(&self, uri: &str) -> Result<PostRef, BlueskyError> {
        let result: Result<GetPostThreadResponse, BlueskyError> = self
            .xrpc_get(
                "app.bsky.feed.getPostThread",
                &[("uri", uri), ("depth", "0"), ("parentHeight", "0")],
            )
            .await;

        match result {
            Ok(GetPostThreadResponse {
                thread: ThreadView::Post { post },
            }) => Ok(PostRef::new(post.uri, post.cid)),
            Ok(GetPostThreadResponse {
                thread: ThreadView::NotFound { uri } | ThreadView::Blocked { uri },
            }) => Err(BlueskyError::PostNotFound(uri)),
            Err(BlueskyError::Xrpc { error, .. }) if error == "NotFound" => {
                Err(BlueskyError::PostNotFound(uri.to_string()))
            }
            Err(e) => Err(e),
        }
    }

    pub async fn resolve_handle(&self, handle: &str) -> Result<Option<String>, BlueskyError> {
        let result: Result<ResolveHandleResponse, BlueskyError> = self
            .xrpc_get("com.atproto.identity.resolveHandle", &[("handle", handle)])
            .await;

        match result {
            Ok(resolved) => Ok(Some(resolved.did)),
            // unknown handles come back as 400 InvalidRequest
            Err(BlueskyError::Xrpc { status: 400, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn create_post(&self, post: &NewPost) -> Result<PostRef, BlueskyError> {
        let auth = self.auth()?;
        let body = serde_json::json!({
            "repo": auth.did,
            "collection": POST_COLLECTION,
            "record": post,
        });

        let response = self
            .client
            .post(self.xrpc_url("com.atproto.repo.createRecord"))
            .bearer_auth(&auth.access_jwt)
            .json(&body)
            .send()
            .await?;
        let created: CreateRecordResponse = decode(response).await?;

        log::debug!("Bluesky: Created post {}", created.uri);
        Ok(PostRef::new(created.uri, created.cid))
    }

    fn xrpc_url(&self, nsid: &str) -> String {
        format!("{}/xrpc/{}", self.service, nsid)
    }

    fn auth(&self) -> Result<AuthSession, BlueskyError> {
        self.auth.read().clone().ok_or(BlueskyError::NotLoggedIn)
    }

    async fn xrpc_get<T: DeserializeOwned>(
        &self,
        nsid: &str,
        params: &[(&str, &str)],
    ) -> Result<T, BlueskyError> {
        let auth = self.auth()?;
        let response = self
            .client
            .get(self.xrpc_url(nsid))
            .bearer_auth(&auth.access_jwt)
            .query(params)
            .send()
            .await?;
        decode(response).await
    }
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, BlueskyError> {
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        return Err(error_from_response(status, &body));
    }
    Ok(serde_json::from_str(&body)?)
}

/// Map a non-success XRPC response onto a typed error
fn error_from_response(status: StatusCode, body: &str) -> BlueskyError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return BlueskyError::RateLimited;
    }

    let parsed: XrpcErrorBody = serde_json::from_str(body).unwrap_or_default();
    let message = if parsed.message.is_empty() {
        body.trim().to_string()
    } else {
        parsed.message
    };
    let error = if parsed.error.is_empty() {
        status
            .canonical_reason()
            .unwrap_or("UnknownError")
            .to_string()
    } else {
        parsed.error
    };

    BlueskyError::Xrpc {
        status: status.as_u16(),
        error,
        message,
    }
}

#[async_trait]
impl NotificationFeed for BlueskySession {
    async fn login(&self) -> Result<Identity, BlueskyError> {
        BlueskySession::login(self).await
    }

    async fn list_notifications(&self, limit: u32) -> Result<Vec<Notification>, BlueskyError> {
        BlueskySession::list_notifications(self, limit).await
    }
}

#[async_trait]
impl PostClient for BlueskySession {
    async fn get_post(&self, uri: &str) -> Result<PostRef, BlueskyError> {
        BlueskySession::get_post(self, uri).await
    }

    async fn resolve_handle(&self, handle: &str) -> Result<Option<String>, BlueskyError> {
        BlueskySession::resolve_handle(self, handle).await
    }

    async fn create_post(&self, post: &NewPost) -> Result<PostRef, BlueskyError> {
        BlueskySession::create_post(self, post).await
    }
}
