//! OpenAI Assistants API client.

use crate::error::ConversationError;
use crate::service::{
    AssistantId, AssistantService, AssistantSpec, RunId, RunInfo, RunStatus, ThreadId,
};
use crate::usage::TokenUsage;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Debug, Clone)]
pub struct OpenAIConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub timeout_secs: u64,
}

impl OpenAIConfig {
    /// Reads `OPENAI_API_KEY`, `OPENAI_MODEL` and `OPENAI_BASE_URL`.
    pub fn from_env() -> Result<Self, ConversationError> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .ok()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| ConversationError::Config("OPENAI_API_KEY is not set".into()))?;
        Ok(Self {
            api_key,
            model: std::env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4".to_string()),
            base_url: std::env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
            timeout_secs: 60,
        })
    }
}

pub struct OpenAIAssistants {
    client: Client,
    config: OpenAIConfig,
}

#[derive(Deserialize)]
struct Created {
    id: String,
}

#[derive(Deserialize)]
struct RunObject {
    status: RunStatus,
}

#[derive(Deserialize)]
struct List<T> {
    data: Vec<T>,
}

#[derive(Deserialize)]
pub(crate) struct MessageObject {
    role: String,
    #[serde(default)]
    content: Vec<ContentPart>,
}

#[derive(Deserialize)]
struct ContentPart {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<TextPart>,
}

#[derive(Deserialize)]
struct TextPart {
    value: String,
}

#[derive(Deserialize)]
struct RunListEntry {
    id: String,
    status: RunStatus,
    created_at: Option<i64>,
    completed_at: Option<i64>,
    usage: Option<TokenUsage>,
}

/// Joined text parts of the newest message, when it comes from the assistant.
pub(crate) fn assistant_text(messages: &[MessageObject]) -> Option<String> {
    let newest = messages.first().filter(|m| m.role == "assistant")?;
    let text: Vec<&str> = newest
        .content
        .iter()
        .filter(|part| part.kind == "text")
        .filter_map(|part| part.text.as_ref().map(|t| t.value.as_str()))
        .collect();
    (!text.is_empty()).then(|| text.join("\n"))
}

impl OpenAIAssistants {
    pub fn new(config: OpenAIConfig) -> Result<Self, ConversationError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ConversationError::Config(e.to_string()))?;
        Ok(Self { client, config })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("OpenAI-Beta", "assistants=v2")
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, ConversationError> {
        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(|e| ConversationError::Transport(e.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(ConversationError::Api { status, message });
        }
        Ok(response)
    }

    async fn decode<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ConversationError> {
        self.send(request)
            .await?
            .json()
            .await
            .map_err(|e| ConversationError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl AssistantService for OpenAIAssistants {
    async fn create_assistant(&self, spec: &AssistantSpec) -> Result<AssistantId, ConversationError> {
        let body = serde_json::json!({
            "name": spec.name,
            "instructions": spec.instructions,
            "model": spec.model,
        });
        let created: Created = self
            .decode(self.client.post(self.url("assistants")).json(&body))
            .await?;
        debug!(assistant = %created.id, "created assistant");
        Ok(AssistantId(created.id))
    }

    async fn create_thread(&self) -> Result<ThreadId, ConversationError> {
        let created: Created = self
            .decode(self.client.post(self.url("threads")).json(&serde_json::json!({})))
            .await?;
        Ok(ThreadId(created.id))
    }

    async fn add_message(&self, thread: &ThreadId, content: &str) -> Result<(), ConversationError> {
        let body = serde_json::json!({ "role": "user", "content": content });
        self.send(
            self.client
                .post(self.url(&format!("threads/{thread}/messages")))
                .json(&body),
        )
        .await?;
        Ok(())
    }

    async fn create_run(
        &self,
        thread: &ThreadId,
        assistant: &AssistantId,
    ) -> Result<RunId, ConversationError> {
        let body = serde_json::json!({ "assistant_id": assistant.as_str() });
        let created: Created = self
            .decode(
                self.client
                    .post(self.url(&format!("threads/{thread}/runs")))
                    .json(&body),
            )
            .await?;
        Ok(RunId(created.id))
    }

    async fn run_status(&self, thread: &ThreadId, run: &RunId) -> Result<RunStatus, ConversationError> {
        let run: RunObject = self
            .decode(self.client.get(self.url(&format!("threads/{thread}/runs/{run}"))))
            .await?;
        Ok(run.status)
    }

    async fn latest_message(&self, thread: &ThreadId) -> Result<Option<String>, ConversationError> {
        let list: List<MessageObject> = self
            .decode(
                self.client
                    .get(self.url(&format!("threads/{thread}/messages")))
                    .query(&[("limit", "1"), ("order", "desc")]),
            )
            .await?;
        Ok(assistant_text(&list.data))
    }

    async fn delete_thread(&self, thread: &ThreadId) -> Result<(), ConversationError> {
        self.send(self.client.delete(self.url(&format!("threads/{thread}"))))
            .await?;
        Ok(())
    }

    async fn list_runs(&self, thread: &ThreadId, limit: usize) -> Result<Vec<RunInfo>, ConversationError> {
        let limit = limit.clamp(1, 100).to_string();
        let list: List<RunListEntry> = self
            .decode(
                self.client
                    .get(self.url(&format!("threads/{thread}/runs")))
                    .query(&[("limit", limit.as_str()), ("order", "desc")]),
            )
            .await?;
        Ok(list
            .data
            .into_iter()
            .map(|r| RunInfo {
                id: RunId(r.id),
                status: r.status,
                created_at: r.created_at,
                completed_at: r.completed_at,
                usage: r.usage,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assistant_text_joins_text_parts() {
        let raw = r#"{"data": [{"role": "assistant", "content": [
            {"type": "text", "text": {"value": "first", "annotations": []}},
            {"type": "image_file", "image_file": {"file_id": "f"}},
            {"type": "text", "text": {"value": "second", "annotations": []}}
        ]}]}"#;
        let list: List<MessageObject> = serde_json::from_str(raw).unwrap();
        assert_eq!(assistant_text(&list.data).as_deref(), Some("first\nsecond"));
    }

    #[test]
    fn test_user_message_is_not_a_reply() {
        let raw = r#"{"data": [{"role": "user", "content": [
            {"type": "text", "text": {"value": "question"}}
        ]}]}"#;
        let list: List<MessageObject> = serde_json::from_str(raw).unwrap();
        assert_eq!(assistant_text(&list.data), None);
    }

    #[test]
    fn test_run_list_decodes_usage() {
        let raw = r#"{"data": [{"id": "run_1", "status": "completed", "created_at": 10,
            "completed_at": 12, "usage": {"prompt_tokens": 3, "completion_tokens": 4, "total_tokens": 7}},
            {"id": "run_2", "status": "in_progress", "created_at": 13, "completed_at": null, "usage": null}]}"#;
        let list: List<RunListEntry> = serde_json::from_str(raw).unwrap();
        assert_eq!(list.data.len(), 2);
        assert_eq!(list.data[0].usage.map(|u| u.total_tokens), Some(7));
        assert_eq!(list.data[1].status, RunStatus::InProgress);
    }
}
