use thiserror::Error;

/// Errors raised by graph backends.
///
/// Absence of data is never an error: lookups that find nothing return empty
/// collections. `Syntax` is kept separate from `Execution` because callers
/// feed the two back to the query generator with different wording.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("syntax error: {0}")]
    Syntax(String),
    #[error("query execution failed: {0}")]
    Execution(String),
    #[error("graph backend unavailable: {0}")]
    Unavailable(String),
    #[error("invalid backend response: {0}")]
    InvalidResponse(String),
    #[error("invalid timestamp '{0}'")]
    InvalidTimestamp(String),
    #[error("invalid interval: tmin {tmin} is after tmax {tmax}")]
    InvalidInterval { tmin: String, tmax: String },
    #[error("snapshot error: {0}")]
    Snapshot(String),
    #[error("configuration error: {0}")]
    Config(String),
}

impl GraphError {
    /// True for rejections caused by the query text itself.
    pub fn is_syntax(&self) -> bool {
        matches!(self, GraphError::Syntax(_))
    }
}
