//! Process-wide HTTP client.

use once_cell::sync::Lazy;
use std::time::Duration;

const USER_AGENT: &str = concat!("skymesh/", env!("CARGO_PKG_VERSION"));

static SHARED_CLIENT: Lazy<reqwest::Client> = Lazy::new(|| {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(30))
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
});

/// Shared client with a 30s request timeout; clone it rather than building new ones.
///
/// Requests that need a longer deadline (Agent Mesh answers) override it per request.
pub fn shared_client() -> &'static reqwest::Client {
    &SHARED_CLIENT
}
