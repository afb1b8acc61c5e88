//! Statewalk LLM: conversation sessions with reasoning services
//!
//! Reasoning services are conversation-oriented: an assistant holds standing
//! instructions, a thread accumulates messages, and a run processes the
//! thread asynchronously until it reaches a terminal status.
//!
//! ```text
//!   Session::open ──► create_assistant, create_thread
//!        │
//!   say(text)  ──► add_message
//!   ask(text)  ──► add_message ─► create_run ─► poll run_status ─► latest_message
//!        │                                     (PollPolicy, deadline, cancel)
//!   close()    ──► delete_thread
//! ```
//!
//! A [`Session`] is an explicit handle owned by the caller; nothing here
//! keeps conversation state globally.

pub mod error;
pub mod extract;
#[cfg(feature = "openai")]
pub mod openai;
pub mod poll;
pub mod scripted;
pub mod service;
pub mod session;
pub mod usage;

pub use error::ConversationError;
pub use extract::{extract_cypher, extract_json, fenced_block};
pub use poll::{wait_for_run, PollPolicy};
pub use scripted::{RunScript, ScriptedAssistant};
pub use service::{AssistantId, AssistantService, AssistantSpec, RunId, RunInfo, RunStatus, ThreadId};
pub use session::Session;
pub use usage::{usage_within, TokenUsage};
