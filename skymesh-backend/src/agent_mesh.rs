//! Agent Mesh question-answering client.

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentMeshError {
    #[error("Failed to get response from Agent Mesh: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Failed to get response from Agent Mesh: status {status}: {body}")]
    Status { status: u16, body: String },
}

/// Answers a free-text question
#[async_trait]
pub trait QuestionAnswerer: Send + Sync {
    async fn ask(&self, question: &str) -> Result<String, AgentMeshError>;
}

pub struct AgentMeshClient {
    client: reqwest::Client,
    api_url: String,
    timeout: Duration,
}

impl AgentMeshClient {
    pub fn new(client: reqwest::Client, api_url: &str, timeout: Duration) -> Self {
        Self {
            client,
            api_url: api_url.to_string(),
            timeout,
        }
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }
}

#[async_trait]
impl QuestionAnswerer for AgentMeshClient {
    async fn ask(&self, question: &str) -> Result<String, AgentMeshError> {
        log::info!("AgentMesh: Asking {}: {}", self.api_url, question);

        let form = reqwest::multipart::Form::new()
            .text("prompt", question.to_string())
            .text("stream", "false");

        let response = self
            .client
            .post(&self.api_url)
            .timeout(self.timeout)
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                log::error!("AgentMesh: No response received: {}", e);
                e
            })?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            log::error!("AgentMesh: Response status {}: {}", status, body);
            return Err(AgentMeshError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let answer = extract_answer(&body);
        log::debug!("AgentMesh: Answer ({} chars)", answer.len());
        Ok(answer)
    }
}

/// Pull the answer text out of an Agent Mesh response body.
///
/// Tries `response.content`, then `response` (as a string, or its JSON), then
/// the whole body. Empty strings, zero, `false` and `null` count as absent at
/// each step.
pub fn extract_answer(body: &str) -> String {
    let data: Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(_) => return body.to_string(),
    };

    if let Some(response) = data.get("response").filter(|v| is_present(v)) {
        if let Some(content) = response.get("content").filter(|v| is_present(v)) {
            return value_to_text(content);
        }
        return value_to_text(response);
    }

    value_to_text(&data)
}

fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Scripted answerer for tests
#[cfg(test)]
pub struct MockAnswerer {
    answers: parking_lot::Mutex<std::collections::VecDeque<Result<String, AgentMeshError>>>,
    pub questions: parking_lot::Mutex<Vec<String>>,
}

#[cfg(test)]
impl MockAnswerer {
    pub fn new(answers: Vec<Result<String, AgentMeshError>>) -> Self {
        Self {
            answers: parking_lot::Mutex::new(answers.into()),
            questions: parking_lot::Mutex::new(Vec::new()),
        }
    }
}

#[cfg(test)]
#[async_trait]
impl QuestionAnswerer for MockAnswerer {
    async fn ask(&self, question: &str) -> Result<String, AgentMeshError> {
        self.questions.lock().push(question.to_string());
        self.answers
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok("(mock exhausted)".to_string()))
    }
}
