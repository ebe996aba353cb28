//! Mention handler that answers questions through Agent Mesh and replies
//! on Bluesky, keeping the dashboard informed along the way.

use crate::agent_mesh::{AgentMeshError, QuestionAnswerer};
use crate::bluesky::{Mention, MentionHandler};
use crate::conversations::ConversationStore;
use crate::gateway::{EventBroadcaster, GatewayEvent};
use crate::text::{extract_question, markdown_to_plaintext};
use crate::threading::{plan_reply, PlanError, PublishError, ReplyPublisher, ThreadLimits};
use async_trait::async_trait;
use chrono::Utc;
use skymesh_types::Conversation;
use std::sync::Arc;
use thiserror::Error;

/// Why a mention could not be answered
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error(transparent)]
    AgentMesh(#[from] AgentMeshError),
    #[error("Failed to plan reply: {0}")]
    Plan(#[from] PlanError),
    #[error("Failed to publish reply: {0}")]
    Publish(#[from] PublishError),
}

pub struct MentionBridge {
    answerer: Arc<dyn QuestionAnswerer>,
    publisher: ReplyPublisher,
    conversations: Arc<ConversationStore>,
    broadcaster: Arc<EventBroadcaster>,
    limits: ThreadLimits,
}

impl MentionBridge {
    pub fn new(
        answerer: Arc<dyn QuestionAnswerer>,
        publisher: ReplyPublisher,
        conversations: Arc<ConversationStore>,
        broadcaster: Arc<EventBroadcaster>,
        limits: ThreadLimits,
    ) -> Self {
        Self {
            answerer,
            publisher,
            conversations,
            broadcaster,
            limits,
        }
    }

    fn record(&self, conversation: &Conversation, event: fn(&Conversation) -> GatewayEvent) {
        self.conversations.upsert(conversation.clone());
        self.broadcaster.broadcast(event(conversation));
    }

    /// Mark the conversation failed, tell the dashboard, hand the error back
    fn fail(&self, conversation: &mut Conversation, error: HandlerError) -> HandlerError {
        conversation.fail(error.to_string());
        self.record(conversation, GatewayEvent::error);
        error
    }
}

#[async_trait]
impl MentionHandler for MentionBridge {
    async fn handle_mention(&self, mention: Mention) -> Result<(), HandlerError> {
        let question = extract_question(&mention.text);
        if question.is_empty() {
            log::info!("Bridge: No question in {} from @{}", mention.uri, mention.author_handle);
            return Ok(());
        }

        log::info!("Bridge: Question from @{}: {}", mention.author_handle, question);

        let mut conversation = Conversation::processing(
            &mention.id,
            &mention.uri,
            &mention.author_handle,
            &question,
            Utc::now(),
        );
        self.record(&conversation, GatewayEvent::new_question);

        let answer = match self.answerer.ask(&question).await {
            Ok(answer) => answer,
            Err(e) => return Err(self.fail(&mut conversation, e.into())),
        };

        conversation.complete(answer.clone(), Utc::now());
        self.record(&conversation, GatewayEvent::new_response);

        let text = markdown_to_plaintext(&answer);
        let plan = match plan_reply(&text, self.limits) {
            Ok(plan) => plan,
            Err(e) => return Err(self.fail(&mut conversation, e.into())),
        };

        match self.publisher.publish(&mention.post_ref(), &plan).await {
            Ok(posted) => {
                log::info!(
                    "Bridge: Replied to {} with {} post(s)",
                    mention.id,
                    posted.len()
                );
                Ok(())
            }
            Err(e) => Err(self.fail(&mut conversation, e.into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent_mesh::MockAnswerer;
    use crate::bluesky::types::{NewPost, PostRef};
    use crate::bluesky::{BlueskyError, PostClient};
    use crate::threading::Pacing;
    use parking_lot::Mutex;
    use skymesh_types::ConversationStatus;
    use std::time::Duration;

    #[derive(Default)]
    struct FakeBluesky {
        created: Mutex<Vec<NewPost>>,
        reject_posts: bool,
    }

    #[async_trait]
    impl PostClient for FakeBluesky {
        async fn get_post(&self, uri: &str) -> Result<PostRef, BlueskyError> {
            Ok(PostRef::new(uri, "cid-mention"))
        }

        async fn resolve_handle(&self, _handle: &str) -> Result<Option<String>, BlueskyError> {
            Ok(None)
        }

        async fn create_post(&self, post: &NewPost) -> Result<PostRef, BlueskyError> {
            if self.reject_posts {
                return Err(BlueskyError::Xrpc {
                    status: 400,
                    error: "InvalidRequest".to_string(),
                    message: "Record/text must not be longer than 300 graphemes".to_string(),
                });
            }
            let mut created = self.created.lock();
            created.push(post.clone());
            Ok(PostRef::new(format!("at://bot/post/{}", created.len()), "cid"))
        }
    }

    struct Harness {
        bridge: MentionBridge,
        answerer: Arc<MockAnswerer>,
        bluesky: Arc<FakeBluesky>,
        conversations: Arc<ConversationStore>,
        events: tokio::sync::mpsc::Receiver<GatewayEvent>,
    }

    fn harness(answers: Vec<Result<String, AgentMeshError>>, bluesky: FakeBluesky) -> Harness {
        let answerer = Arc::new(MockAnswerer::new(answers));
        let bluesky = Arc::new(bluesky);
        let conversations = Arc::new(ConversationStore::new(50));
        let broadcaster = Arc::new(EventBroadcaster::new());
        let (_id, events) = broadcaster.subscribe();

        let pacing = Pacing {
            post_delay: Duration::ZERO,
            part_delay: Duration::ZERO,
        };
        let publisher = ReplyPublisher::new(bluesky.clone(), pacing, vec!["en".to_string()]);
        let bridge = MentionBridge::new(
            answerer.clone(),
            publisher,
            conversations.clone(),
            broadcaster,
            ThreadLimits::default(),
        );

        Harness {
            bridge,
            answerer,
            bluesky,
            conversations,
            events,
        }
    }

    fn mention(text: &str) -> Mention {
        Mention {
            id: "3kabc".to_string(),
            uri: "at://did:plc:alice/app.bsky.feed.post/3kabc".to_string(),
            cid: "cid-old".to_string(),
            text: text.to_string(),
            author_handle: "alice.bsky.social".to_string(),
            author_did: "did:plc:alice".to_string(),
            created_at: Utc::now(),
        }
    }

    fn drain(events: &mut tokio::sync::mpsc::Receiver<GatewayEvent>) -> Vec<String> {
        let mut names = Vec::new();
        while let Ok(event) = events.try_recv() {
            names.push(event.event);
        }
        names
    }

    #[tokio::test]
    async fn test_answer_is_cleaned_and_posted() {
        let mut h = harness(
            vec![Ok("**Rust** is a [language](https://rust-lang.org).".to_string())],
            FakeBluesky::default(),
        );

        h.bridge
            .handle_mention(mention("@bot.example.com what is rust?"))
            .await
            .unwrap();

        assert_eq!(*h.answerer.questions.lock(), vec!["what is rust?".to_string()]);

        let created = h.bluesky.created.lock();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].text, "Rust is a language (https://rust-lang.org).");
        // link facet detected on the cleaned text
        assert_eq!(created[0].facets.len(), 1);

        let conv = h.conversations.get("3kabc").unwrap();
        assert_eq!(conv.status, ConversationStatus::Completed);
        assert_eq!(conv.author, "alice.bsky.social");
        assert_eq!(conv.response.as_deref(), Some("**Rust** is a [language](https://rust-lang.org)."));

        assert_eq!(drain(&mut h.events), vec!["new_question", "new_response"]);
    }

    #[tokio::test]
    async fn test_mention_without_question_is_ignored() {
        let mut h = harness(Vec::new(), FakeBluesky::default());

        h.bridge.handle_mention(mention("@bot.example.com  ")).await.unwrap();

        assert!(h.answerer.questions.lock().is_empty());
        assert!(h.conversations.is_empty());
        assert!(drain(&mut h.events).is_empty());
    }

    #[tokio::test]
    async fn test_agent_mesh_failure_is_recorded() {
        let mut h = harness(
            vec![Err(AgentMeshError::Status {
                status: 500,
                body: "boom".to_string(),
            })],
            FakeBluesky::default(),
        );

        let err = h
            .bridge
            .handle_mention(mention("@bot.example.com why?"))
            .await
            .unwrap_err();
        assert!(matches!(err, HandlerError::AgentMesh(_)));

        let conv = h.conversations.get("3kabc").unwrap();
        assert_eq!(conv.status, ConversationStatus::Error);
        assert_eq!(
            conv.error.as_deref(),
            Some("Failed to get response from Agent Mesh: status 500: boom")
        );
        assert!(h.bluesky.created.lock().is_empty());
        assert_eq!(drain(&mut h.events), vec!["new_question", "error"]);
    }

    #[tokio::test]
    async fn test_publish_failure_turns_completed_into_error() {
        let mut h = harness(
            vec![Ok("short answer".to_string())],
            FakeBluesky {
                reject_posts: true,
                ..Default::default()
            },
        );

        let err = h
            .bridge
            .handle_mention(mention("@bot.example.com why?"))
            .await
            .unwrap_err();
        assert!(matches!(err, HandlerError::Publish(_)));

        let conv = h.conversations.get("3kabc").unwrap();
        assert_eq!(conv.status, ConversationStatus::Error);
        // the answer is kept even though it never made it to Bluesky
        assert_eq!(conv.response.as_deref(), Some("short answer"));
        let error = conv.error.unwrap();
        assert!(error.starts_with("Failed to publish reply: publishing stopped at post 1 of 1"));
        assert!(error.contains("(nothing posted)"));
        assert_eq!(drain(&mut h.events), vec!["new_question", "new_response", "error"]);
    }

    #[tokio::test]
    async fn test_long_answer_is_threaded() {
        let answer = "This sentence is exactly fifty graphemes long, ok. ".repeat(12);
        let h = harness(vec![Ok(answer)], FakeBluesky::default());

        h.bridge
            .handle_mention(mention("@bot.example.com explain"))
            .await
            .unwrap();

        let created = h.bluesky.created.lock();
        assert_eq!(created.len(), 3);
        assert!(created[0].text.starts_with("(1/3) "));
        assert!(created[2].text.starts_with("(3/3) "));
    }
}
