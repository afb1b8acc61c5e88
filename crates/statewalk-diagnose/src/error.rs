use crate::config::ConfigError;
use statewalk_graph::GraphError;
use statewalk_llm::ConversationError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DiagnoseError {
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error(transparent)]
    Conversation(#[from] ConversationError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("no event references an entity for message: {0}")]
    NoSourceKind(String),
    #[error("malformed path: {0}")]
    MalformedPath(String),
    #[error("malformed result row: {0}")]
    MalformedRow(String),
    #[error("locator gave no usable answer after {attempts} attempts: {last}")]
    LocatorExhausted { attempts: u32, last: String },
}

impl DiagnoseError {
    /// The reasoning service timed out, ended a run abnormally, or was
    /// unreachable.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, DiagnoseError::Conversation(e) if e.is_unavailable())
    }
}
