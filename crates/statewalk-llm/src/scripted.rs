//! In-process assistant service driven by scripted runs.
//!
//! Each created run takes the next queued [`RunScript`]. When the queue is
//! empty the optional responder computes a reply from the thread's latest
//! user message; without one the run fails.

use crate::error::ConversationError;
use crate::service::{
    AssistantId, AssistantService, AssistantSpec, RunId, RunInfo, RunStatus, ThreadId,
};
use crate::usage::TokenUsage;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use uuid::Uuid;

/// Statuses a run reports on successive polls, and the reply posted once it
/// reports `completed`. The last status repeats once the list is exhausted.
#[derive(Debug, Clone, PartialEq)]
pub struct RunScript {
    pub statuses: Vec<RunStatus>,
    pub reply: String,
    pub usage: Option<TokenUsage>,
}

impl RunScript {
    pub fn new(statuses: Vec<RunStatus>, reply: impl Into<String>) -> Self {
        Self {
            statuses,
            reply: reply.into(),
            usage: None,
        }
    }

    pub fn completed(reply: impl Into<String>) -> Self {
        Self::new(vec![RunStatus::Completed], reply)
    }

    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = Some(usage);
        self
    }
}

type Responder = dyn Fn(&str) -> String + Send + Sync;

#[derive(Default)]
struct ThreadState {
    user_messages: Vec<String>,
    replies: Vec<String>,
    runs: Vec<RunId>,
}

struct RunState {
    thread: ThreadId,
    script: RunScript,
    cursor: usize,
    created_at: i64,
    completed_at: Option<i64>,
}

pub struct ScriptedAssistant {
    queue: Mutex<VecDeque<RunScript>>,
    responder: Option<Box<Responder>>,
    threads: Mutex<HashMap<ThreadId, ThreadState>>,
    runs: Mutex<HashMap<RunId, RunState>>,
    sent: Mutex<Vec<String>>,
    assistants: Mutex<Vec<AssistantSpec>>,
    runs_created: AtomicUsize,
    status_checks: AtomicUsize,
}

impl Default for ScriptedAssistant {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedAssistant {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            responder: None,
            threads: Mutex::new(HashMap::new()),
            runs: Mutex::new(HashMap::new()),
            sent: Mutex::new(Vec::new()),
            assistants: Mutex::new(Vec::new()),
            runs_created: AtomicUsize::new(0),
            status_checks: AtomicUsize::new(0),
        }
    }

    /// Runs complete immediately with these replies, in order.
    pub fn replies<S: Into<String>>(replies: impl IntoIterator<Item = S>) -> Self {
        let assistant = Self::new();
        for reply in replies {
            assistant.push_reply(reply);
        }
        assistant
    }

    pub fn with_responder(mut self, responder: impl Fn(&str) -> String + Send + Sync + 'static) -> Self {
        self.responder = Some(Box::new(responder));
        self
    }

    pub fn push_reply(&self, reply: impl Into<String>) {
        self.push_run(RunScript::completed(reply));
    }

    pub fn push_run(&self, script: RunScript) {
        self.queue.lock().push_back(script);
    }

    /// Every user message added to any thread, in order.
    pub fn messages(&self) -> Vec<String> {
        self.sent.lock().clone()
    }

    pub fn assistants(&self) -> Vec<AssistantSpec> {
        self.assistants.lock().clone()
    }

    pub fn runs_created(&self) -> usize {
        self.runs_created.load(Ordering::SeqCst)
    }

    pub fn status_checks(&self) -> usize {
        self.status_checks.load(Ordering::SeqCst)
    }

    pub fn open_threads(&self) -> usize {
        self.threads.lock().len()
    }

    pub fn pending_scripts(&self) -> usize {
        self.queue.lock().len()
    }

    fn next_script(&self, last_message: Option<&str>) -> RunScript {
        if let Some(script) = self.queue.lock().pop_front() {
            return script;
        }
        match (&self.responder, last_message) {
            (Some(responder), Some(message)) => RunScript::completed(responder(message)),
            _ => RunScript::new(vec![RunStatus::Failed], ""),
        }
    }
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

fn unknown_thread(thread: &ThreadId) -> ConversationError {
    ConversationError::Api {
        status: 404,
        message: format!("No thread found with id '{thread}'"),
    }
}

#[async_trait]
impl AssistantService for ScriptedAssistant {
    async fn create_assistant(&self, spec: &AssistantSpec) -> Result<AssistantId, ConversationError> {
        self.assistants.lock().push(spec.clone());
        Ok(AssistantId(format!("asst_{}", Uuid::new_v4().simple())))
    }

    async fn create_thread(&self) -> Result<ThreadId, ConversationError> {
        let id = ThreadId(format!("thread_{}", Uuid::new_v4().simple()));
        self.threads.lock().insert(id.clone(), ThreadState::default());
        Ok(id)
    }

    async fn add_message(&self, thread: &ThreadId, content: &str) -> Result<(), ConversationError> {
        let mut threads = self.threads.lock();
        let state = threads.get_mut(thread).ok_or_else(|| unknown_thread(thread))?;
        state.user_messages.push(content.to_string());
        self.sent.lock().push(content.to_string());
        Ok(())
    }

    async fn create_run(
        &self,
        thread: &ThreadId,
        _assistant: &AssistantId,
    ) -> Result<RunId, ConversationError> {
        let last = {
            let threads = self.threads.lock();
            let state = threads.get(thread).ok_or_else(|| unknown_thread(thread))?;
            state.user_messages.last().cloned()
        };
        let script = self.next_script(last.as_deref());
        let id = RunId(format!("run_{}", Uuid::new_v4().simple()));

        self.runs.lock().insert(
            id.clone(),
            RunState {
                thread: thread.clone(),
                script,
                cursor: 0,
                created_at: now(),
                completed_at: None,
            },
        );
        if let Some(state) = self.threads.lock().get_mut(thread) {
            state.runs.push(id.clone());
        }
        self.runs_created.fetch_add(1, Ordering::SeqCst);
        Ok(id)
    }

    async fn run_status(&self, thread: &ThreadId, run: &RunId) -> Result<RunStatus, ConversationError> {
        self.status_checks.fetch_add(1, Ordering::SeqCst);

        let mut runs = self.runs.lock();
        let state = runs
            .get_mut(run)
            .filter(|r| &r.thread == thread)
            .ok_or_else(|| ConversationError::Api {
                status: 404,
                message: format!("No run found with id '{run}'"),
            })?;

        let statuses = &state.script.statuses;
        let status = match statuses.len() {
            0 => RunStatus::Completed,
            n => statuses[state.cursor.min(n - 1)],
        };
        state.cursor += 1;

        if status == RunStatus::Completed && state.completed_at.is_none() {
            state.completed_at = Some(now());
            if let Some(thread_state) = self.threads.lock().get_mut(thread) {
                thread_state.replies.push(state.script.reply.clone());
            }
        }
        Ok(status)
    }

    async fn latest_message(&self, thread: &ThreadId) -> Result<Option<String>, ConversationError> {
        let threads = self.threads.lock();
        let state = threads.get(thread).ok_or_else(|| unknown_thread(thread))?;
        Ok(state.replies.last().cloned())
    }

    async fn delete_thread(&self, thread: &ThreadId) -> Result<(), ConversationError> {
        self.threads
            .lock()
            .remove(thread)
            .map(|_| ())
            .ok_or_else(|| unknown_thread(thread))
    }

    async fn list_runs(&self, thread: &ThreadId, limit: usize) -> Result<Vec<RunInfo>, ConversationError> {
        let ids = {
            let threads = self.threads.lock();
            let state = threads.get(thread).ok_or_else(|| unknown_thread(thread))?;
            state.runs.clone()
        };
        let runs = self.runs.lock();
        Ok(ids
            .iter()
            .rev()
            .take(limit)
            .filter_map(|id| {
                runs.get(id).map(|r| RunInfo {
                    id: id.clone(),
                    status: match r.completed_at {
                        Some(_) => RunStatus::Completed,
                        None => RunStatus::InProgress,
                    },
                    created_at: Some(r.created_at),
                    completed_at: r.completed_at,
                    usage: r.completed_at.and(r.script.usage),
                })
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reply_posted_on_completion() {
        let assistant = ScriptedAssistant::new();
        assistant.push_run(RunScript::new(
            vec![RunStatus::InProgress, RunStatus::Completed],
            "hello",
        ));
        let spec = AssistantSpec::new("a", "", "m");
        let asst = assistant.create_assistant(&spec).await.unwrap();
        let thread = assistant.create_thread().await.unwrap();
        assistant.add_message(&thread, "hi").await.unwrap();
        let run = assistant.create_run(&thread, &asst).await.unwrap();

        assert_eq!(assistant.run_status(&thread, &run).await.unwrap(), RunStatus::InProgress);
        assert_eq!(assistant.latest_message(&thread).await.unwrap(), None);
        assert_eq!(assistant.run_status(&thread, &run).await.unwrap(), RunStatus::Completed);
        assert_eq!(
            assistant.latest_message(&thread).await.unwrap().as_deref(),
            Some("hello")
        );
        assert_eq!(assistant.messages(), vec!["hi".to_string()]);
    }

    #[tokio::test]
    async fn test_responder_used_when_queue_empty() {
        let assistant = ScriptedAssistant::new().with_responder(|msg| format!("echo: {msg}"));
        let asst = assistant
            .create_assistant(&AssistantSpec::new("a", "", "m"))
            .await
            .unwrap();
        let thread = assistant.create_thread().await.unwrap();
        assistant.add_message(&thread, "ping").await.unwrap();
        let run = assistant.create_run(&thread, &asst).await.unwrap();
        assistant.run_status(&thread, &run).await.unwrap();
        assert_eq!(
            assistant.latest_message(&thread).await.unwrap().as_deref(),
            Some("echo: ping")
        );
    }

    #[tokio::test]
    async fn test_unscripted_run_fails() {
        let assistant = ScriptedAssistant::new();
        let asst = assistant
            .create_assistant(&AssistantSpec::new("a", "", "m"))
            .await
            .unwrap();
        let thread = assistant.create_thread().await.unwrap();
        let run = assistant.create_run(&thread, &asst).await.unwrap();
        assert_eq!(assistant.run_status(&thread, &run).await.unwrap(), RunStatus::Failed);
    }

    #[tokio::test]
    async fn test_deleted_thread_is_gone() {
        let assistant = ScriptedAssistant::new();
        let thread = assistant.create_thread().await.unwrap();
        assert_eq!(assistant.open_threads(), 1);
        assistant.delete_thread(&thread).await.unwrap();
        assert_eq!(assistant.open_threads(), 0);
        assert!(assistant.add_message(&thread, "late").await.is_err());
    }
}
