//! The assistant service contract.

use crate::error::ConversationError;
use crate::usage::TokenUsage;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! string_id {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id!(AssistantId);
string_id!(ThreadId);
string_id!(RunId);

/// Standing configuration of an assistant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssistantSpec {
    pub name: String,
    pub instructions: String,
    pub model: String,
}

impl AssistantSpec {
    pub fn new(name: &str, instructions: &str, model: &str) -> Self {
        Self {
            name: name.to_string(),
            instructions: instructions.to_string(),
            model: model.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    InProgress,
    RequiresAction,
    Cancelling,
    Cancelled,
    Failed,
    Completed,
    Incomplete,
    Expired,
}

impl RunStatus {
    /// `completed`, `cancelled`, `failed`, `expired` and `incomplete` end a run.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunStatus::Completed
                | RunStatus::Cancelled
                | RunStatus::Failed
                | RunStatus::Expired
                | RunStatus::Incomplete
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Queued => "queued",
            RunStatus::InProgress => "in_progress",
            RunStatus::RequiresAction => "requires_action",
            RunStatus::Cancelling => "cancelling",
            RunStatus::Cancelled => "cancelled",
            RunStatus::Failed => "failed",
            RunStatus::Completed => "completed",
            RunStatus::Incomplete => "incomplete",
            RunStatus::Expired => "expired",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A run as listed by the service, for usage accounting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunInfo {
    pub id: RunId,
    pub status: RunStatus,
    /// Unix seconds.
    pub created_at: Option<i64>,
    /// Unix seconds.
    pub completed_at: Option<i64>,
    pub usage: Option<TokenUsage>,
}

/// Conversation-oriented reasoning service.
#[async_trait]
pub trait AssistantService: Send + Sync {
    async fn create_assistant(&self, spec: &AssistantSpec) -> Result<AssistantId, ConversationError>;

    async fn create_thread(&self) -> Result<ThreadId, ConversationError>;

    /// Append a user message to the thread.
    async fn add_message(&self, thread: &ThreadId, content: &str) -> Result<(), ConversationError>;

    /// Start processing the thread.
    async fn create_run(
        &self,
        thread: &ThreadId,
        assistant: &AssistantId,
    ) -> Result<RunId, ConversationError>;

    async fn run_status(&self, thread: &ThreadId, run: &RunId) -> Result<RunStatus, ConversationError>;

    /// Text of the most recent assistant message, if any.
    async fn latest_message(&self, thread: &ThreadId) -> Result<Option<String>, ConversationError>;

    async fn delete_thread(&self, thread: &ThreadId) -> Result<(), ConversationError>;

    /// Most recent runs first.
    async fn list_runs(&self, thread: &ThreadId, limit: usize) -> Result<Vec<RunInfo>, ConversationError>;
}
