//! Shared types for the skymesh backend and its dashboard clients.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =====================================================
// Domain Types
// =====================================================

/// Processing state of a question received from Bluesky
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationStatus {
    Processing,
    Completed,
    Error,
}

impl ConversationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }
}

/// One mention → answer exchange, as shown on the dashboard.
///
/// Field names are camelCase on the wire to match the dashboard client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    pub post_id: String,
    pub post_uri: String,
    pub author: String,
    pub question: String,
    pub timestamp: DateTime<Utc>,
    pub status: ConversationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Conversation {
    /// A freshly received question, still waiting for its answer
    pub fn processing(
        post_id: &str,
        post_uri: &str,
        author: &str,
        question: &str,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: post_id.to_string(),
            post_id: post_id.to_string(),
            post_uri: post_uri.to_string(),
            author: author.to_string(),
            question: question.to_string(),
            timestamp,
            status: ConversationStatus::Processing,
            response: None,
            completed_at: None,
            error: None,
        }
    }

    pub fn complete(&mut self, response: String, completed_at: DateTime<Utc>) {
        self.status = ConversationStatus::Completed;
        self.response = Some(response);
        self.completed_at = Some(completed_at);
        self.error = None;
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = ConversationStatus::Error;
        self.error = Some(error.into());
    }

    /// Milliseconds between receipt and completion, if completed
    pub fn response_time_ms(&self) -> Option<i64> {
        self.completed_at
            .map(|done| (done - self.timestamp).num_milliseconds())
    }
}

/// Payload of the `handle_update` dashboard event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandleUpdate {
    pub handle: String,
}

/// Aggregate numbers shown in the dashboard header
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationStats {
    pub total_questions: usize,
    pub total_responses: usize,
    pub total_errors: usize,
    pub avg_response_time_ms: Option<i64>,
}

// =====================================================
// Service Status
// =====================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub running: bool,
    pub uptime_secs: u64,
    pub handle: String,
    pub poller_state: String,
    pub watermark: Option<DateTime<Utc>>,
    pub poll_interval_ms: u64,
    pub stats: ConversationStats,
}

// =====================================================
// API Response Envelope
// =====================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}
