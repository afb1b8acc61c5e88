use crate::service::RunStatus;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConversationError {
    #[error("network error: {0}")]
    Transport(String),
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("invalid service response: {0}")]
    InvalidResponse(String),
    #[error("run ended with status {0}")]
    RunEnded(RunStatus),
    #[error("run did not finish after {attempts} polls ({elapsed:?})")]
    Timeout { attempts: u32, elapsed: Duration },
    #[error("wait cancelled")]
    Cancelled,
    #[error("no assistant reply in thread")]
    NoReply,
    #[error("reply has no ```{0} block")]
    MissingBlock(String),
    #[error("malformed JSON in reply: {0}")]
    Json(#[from] serde_json::Error),
    #[error("configuration error: {0}")]
    Config(String),
}

impl ConversationError {
    /// The service never produced a usable run: timeout, non-completed
    /// terminal status or cancellation.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            ConversationError::RunEnded(_)
                | ConversationError::Timeout { .. }
                | ConversationError::Cancelled
                | ConversationError::Transport(_)
        )
    }

    /// The reply arrived but could not be parsed into the expected block.
    pub fn is_malformed(&self) -> bool {
        matches!(
            self,
            ConversationError::MissingBlock(_) | ConversationError::Json(_)
        )
    }
}
