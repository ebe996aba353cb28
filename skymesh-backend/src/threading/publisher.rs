//! Publishes a thread plan as linked reply posts.

use super::plan::{Pause, ReplyParent, ThreadPlan};
use crate::bluesky::facets::detect_facets;
use crate::bluesky::types::{NewPost, PostRef, ReplyRef};
use crate::bluesky::{BlueskyError, PostClient};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Delays taken between posts to stay under the PDS write rate limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    pub post_delay: Duration,
    pub part_delay: Duration,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            post_delay: Duration::from_millis(2000),
            part_delay: Duration::from_millis(3000),
        }
    }
}

impl Pacing {
    fn delay_for(&self, pause: Pause) -> Duration {
        match pause {
            Pause::None => Duration::ZERO,
            Pause::BetweenPosts => self.post_delay,
            Pause::BetweenParts => self.part_delay,
        }
    }
}

/// Publishing stopped partway. Posts already created stay up.
#[derive(Debug, Error)]
#[error(
    "publishing stopped at post {} of {total} ({}): {source}",
    .index + 1,
    describe_last(.posted)
)]
pub struct PublishError {
    /// Zero-based plan entry that failed
    pub index: usize,
    pub total: usize,
    /// References of the posts created before the failure, in plan order
    pub posted: Vec<PostRef>,
    #[source]
    pub source: BlueskyError,
}

fn describe_last(posted: &[PostRef]) -> String {
    match posted.last() {
        Some(post) => format!("last posted {}", post.uri),
        None => "nothing posted".to_string(),
    }
}

impl PublishError {
    pub fn last_posted(&self) -> Option<&PostRef> {
        self.posted.last()
    }

    /// Plan index of the last post that was created
    pub fn last_posted_index(&self) -> Option<usize> {
        self.index.checked_sub(1)
    }
}

pub struct ReplyPublisher {
    client: Arc<dyn PostClient>,
    pacing: Pacing,
    refetch_chain_parents: bool,
    langs: Vec<String>,
}

impl ReplyPublisher {
    pub fn new(client: Arc<dyn PostClient>, pacing: Pacing, langs: Vec<String>) -> Self {
        Self {
            client,
            pacing,
            refetch_chain_parents: false,
            langs,
        }
    }

    /// Re-read chain predecessors from the platform instead of reusing the
    /// reference returned when they were created
    pub fn with_refetch_chain_parents(mut self, refetch: bool) -> Self {
        self.refetch_chain_parents = refetch;
        self
    }

    /// Create every post of `plan` in order, replying under `mention`.
    ///
    /// The mention is read fresh before each post that replies to it directly,
    /// and its latest reference is the root of every post. Stops at the first
    /// failure without removing what was already posted.
    pub async fn publish(
        &self,
        mention: &PostRef,
        plan: &ThreadPlan,
    ) -> Result<Vec<PostRef>, PublishError> {
        let total = plan.len();
        let mut posted: Vec<PostRef> = Vec::with_capacity(total);
        let mut latest_mention: Option<PostRef> = None;

        log::info!(
            "Publisher: Replying to {} as {} ({} posts)",
            mention.uri,
            plan.strategy,
            total
        );

        for (index, entry) in plan.entries.iter().enumerate() {
            let delay = self.pacing.delay_for(entry.pause);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            let text = entry.text();
            let result = self
                .publish_entry(mention, entry.parent, &text, &posted, &mut latest_mention)
                .await;

            match result {
                Ok(post) => {
                    log::debug!("Publisher: Posted {}/{} {}", index + 1, total, post.uri);
                    posted.push(post);
                }
                Err(source) => {
                    log::error!(
                        "Publisher: Failed at post {}/{} for {}: {}",
                        index + 1,
                        total,
                        mention.uri,
                        source
                    );
                    return Err(PublishError {
                        index,
                        total,
                        posted,
                        source,
                    });
                }
            }
        }

        log::info!("Publisher: Published {} posts under {}", posted.len(), mention.uri);
        Ok(posted)
    }

    async fn publish_entry(
        &self,
        mention: &PostRef,
        parent: ReplyParent,
        text: &str,
        posted: &[PostRef],
        latest_mention: &mut Option<PostRef>,
    ) -> Result<PostRef, BlueskyError> {
        let parent = match parent {
            ReplyParent::Mention => {
                let fresh = self.client.get_post(&mention.uri).await?;
                *latest_mention = Some(fresh.clone());
                fresh
            }
            ReplyParent::Entry(i) => {
                let previous = posted
                    .get(i)
                    .ok_or_else(|| BlueskyError::PostNotFound(format!("plan entry {}", i)))?;
                if self.refetch_chain_parents {
                    self.client.get_post(&previous.uri).await?
                } else {
                    previous.clone()
                }
            }
        };

        let root = match latest_mention.clone() {
            Some(r) => r,
            None => {
                let fresh = self.client.get_post(&mention.uri).await?;
                *latest_mention = Some(fresh.clone());
                fresh
            }
        };

        let facets = detect_facets(text, self.client.as_ref()).await;
        let post = NewPost::reply(
            text.to_string(),
            facets,
            ReplyRef { root, parent },
            self.langs.clone(),
        );

        self.client.create_post(&post).await
    }
}
