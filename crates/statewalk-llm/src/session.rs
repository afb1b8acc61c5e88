//! Explicit conversation handles.

use crate::error::ConversationError;
use crate::extract::extract_json;
use crate::poll::{wait_for_run, PollPolicy};
use crate::service::{AssistantId, AssistantService, AssistantSpec, ThreadId};
use crate::usage::{usage_within, TokenUsage};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// How many recent runs are inspected for usage accounting.
const USAGE_RUN_LIMIT: usize = 100;

/// One assistant plus one thread. Messages accumulate in the thread, so every
/// `ask` sees the whole conversation so far.
pub struct Session {
    service: Arc<dyn AssistantService>,
    assistant: AssistantId,
    thread: ThreadId,
    policy: PollPolicy,
    cancel: CancellationToken,
}

impl Session {
    pub async fn open(
        service: Arc<dyn AssistantService>,
        spec: &AssistantSpec,
        policy: PollPolicy,
    ) -> Result<Self, ConversationError> {
        let assistant = service.create_assistant(spec).await?;
        let thread = service.create_thread().await?;
        debug!(assistant = %assistant, thread = %thread, name = %spec.name, "opened session");
        Ok(Self {
            service,
            assistant,
            thread,
            policy,
            cancel: CancellationToken::new(),
        })
    }

    /// Share an outer token so a caller can abort every pending wait.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn assistant_id(&self) -> &AssistantId {
        &self.assistant
    }

    pub fn thread_id(&self) -> &ThreadId {
        &self.thread
    }

    /// Add context without requesting a reply.
    pub async fn say(&self, text: &str) -> Result<(), ConversationError> {
        self.service.add_message(&self.thread, text).await
    }

    /// Run the thread as it stands and return the newest reply.
    pub async fn reply(&self) -> Result<String, ConversationError> {
        let run = self.service.create_run(&self.thread, &self.assistant).await?;
        wait_for_run(self.service.as_ref(), &self.thread, &run, &self.policy, &self.cancel).await?;
        self.service
            .latest_message(&self.thread)
            .await?
            .ok_or(ConversationError::NoReply)
    }

    pub async fn ask(&self, text: &str) -> Result<String, ConversationError> {
        self.say(text).await?;
        self.reply().await
    }

    /// Ask and decode the ```json block of the reply.
    pub async fn ask_json<T: DeserializeOwned>(&self, text: &str) -> Result<T, ConversationError> {
        let reply = self.ask(text).await?;
        extract_json(&reply)
    }

    /// Tokens spent by this session's runs inside `[tmin, tmax)`.
    pub async fn usage(
        &self,
        tmin: DateTime<Utc>,
        tmax: DateTime<Utc>,
    ) -> Result<TokenUsage, ConversationError> {
        let runs = self.service.list_runs(&self.thread, USAGE_RUN_LIMIT).await?;
        Ok(usage_within(&runs, tmin, tmax))
    }

    /// Delete the thread. Failures are logged, not returned: the conversation
    /// is over either way.
    pub async fn close(self) {
        if let Err(e) = self.service.delete_thread(&self.thread).await {
            warn!(thread = %self.thread, error = %e, "failed to delete thread");
        }
    }
}
