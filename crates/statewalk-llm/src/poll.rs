//! Bounded waiting for runs to reach a terminal status.
//!
//! Waits use `tokio::time`, so tests drive them with a paused clock instead
//! of real sleeps.

use crate::error::ConversationError;
use crate::service::{AssistantService, RunId, RunStatus, ThreadId};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Delay schedule and bounds for polling a run.
///
/// The n-th wait is `initial_delay + (n - 1) * step`, capped at `max_delay`.
/// Polling stops after `max_attempts` checks or once `deadline` has elapsed
/// since the wait began, whichever comes first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollPolicy {
    pub initial_delay: Duration,
    pub step: Duration,
    pub max_delay: Duration,
    pub max_attempts: u32,
    pub deadline: Option<Duration>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(5),
            step: Duration::from_secs(5),
            max_delay: Duration::from_secs(60),
            max_attempts: 120,
            deadline: Some(Duration::from_secs(60 * 60)),
        }
    }
}

impl PollPolicy {
    /// Same delay between every check.
    pub fn fixed(delay: Duration, max_attempts: u32) -> Self {
        Self {
            initial_delay: delay,
            step: Duration::ZERO,
            max_delay: delay,
            max_attempts,
            deadline: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Wait before the 1-based `attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let grown = self
            .step
            .saturating_mul(attempt.saturating_sub(1))
            .saturating_add(self.initial_delay);
        grown.min(self.max_delay)
    }
}

/// Poll `run` until it completes.
///
/// `completed` returns `Ok`; any other terminal status is
/// [`ConversationError::RunEnded`]; exhausting attempts or the deadline is
/// [`ConversationError::Timeout`]; a triggered `cancel` is
/// [`ConversationError::Cancelled`].
pub async fn wait_for_run(
    service: &dyn AssistantService,
    thread: &ThreadId,
    run: &RunId,
    policy: &PollPolicy,
    cancel: &CancellationToken,
) -> Result<(), ConversationError> {
    let started = Instant::now();
    let deadline = policy.deadline.map(|d| started + d);

    for attempt in 1..=policy.max_attempts {
        let mut delay = policy.delay_for(attempt);
        if let Some(deadline) = deadline {
            delay = delay.min(deadline.saturating_duration_since(Instant::now()));
        }
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!(run = %run, "run wait cancelled");
                return Err(ConversationError::Cancelled);
            }
            _ = tokio::time::sleep(delay) => {}
        }

        let status = service.run_status(thread, run).await?;
        debug!(run = %run, attempt, elapsed = ?started.elapsed(), status = %status, "polled run");
        match status {
            RunStatus::Completed => return Ok(()),
            s if s.is_terminal() => {
                warn!(run = %run, status = %s, "run ended without completing");
                return Err(ConversationError::RunEnded(s));
            }
            _ => {}
        }

        if deadline.is_some_and(|d| Instant::now() >= d) {
            warn!(run = %run, attempt, "run deadline reached");
            return Err(ConversationError::Timeout {
                attempts: attempt,
                elapsed: started.elapsed(),
            });
        }
    }

    warn!(run = %run, attempts = policy.max_attempts, "run polling exhausted");
    Err(ConversationError::Timeout {
        attempts: policy.max_attempts,
        elapsed: started.elapsed(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scripted::{RunScript, ScriptedAssistant};
    use crate::service::AssistantSpec;

    async fn start(assistant: &ScriptedAssistant) -> (ThreadId, RunId) {
        let spec = AssistantSpec::new("poller", "", "test");
        let id = assistant.create_assistant(&spec).await.unwrap();
        let thread = assistant.create_thread().await.unwrap();
        let run = assistant.create_run(&thread, &id).await.unwrap();
        (thread, run)
    }

    #[test]
    fn test_delay_schedule_grows_and_caps() {
        let policy = PollPolicy {
            initial_delay: Duration::from_secs(5),
            step: Duration::from_secs(5),
            max_delay: Duration::from_secs(12),
            max_attempts: 10,
            deadline: None,
        };
        assert_eq!(policy.delay_for(1), Duration::from_secs(5));
        assert_eq!(policy.delay_for(2), Duration::from_secs(10));
        assert_eq!(policy.delay_for(3), Duration::from_secs(12));
    }

    #[tokio::test(start_paused = true)]
    async fn test_completes_after_scripted_statuses() {
        let assistant = ScriptedAssistant::new();
        assistant.push_run(RunScript::new(
            vec![RunStatus::Queued, RunStatus::InProgress, RunStatus::Completed],
            "done",
        ));
        let (thread, run) = start(&assistant).await;

        let before = Instant::now();
        let policy = PollPolicy::fixed(Duration::from_secs(5), 10);
        wait_for_run(&assistant, &thread, &run, &policy, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(before.elapsed(), Duration::from_secs(15));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_run_is_not_retried() {
        let assistant = ScriptedAssistant::new();
        assistant.push_run(RunScript::new(vec![RunStatus::Failed], ""));
        let (thread, run) = start(&assistant).await;

        let err = wait_for_run(
            &assistant,
            &thread,
            &run,
            &PollPolicy::fixed(Duration::from_secs(1), 10),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ConversationError::RunEnded(RunStatus::Failed)));
        assert_eq!(assistant.status_checks(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempts_exhausted_is_timeout() {
        let assistant = ScriptedAssistant::new();
        assistant.push_run(RunScript::new(vec![RunStatus::InProgress], ""));
        let (thread, run) = start(&assistant).await;

        let err = wait_for_run(
            &assistant,
            &thread,
            &run,
            &PollPolicy::fixed(Duration::from_secs(2), 3),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ConversationError::Timeout { attempts: 3, .. }));
        assert!(err.is_unavailable());
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_stops_polling_early() {
        let assistant = ScriptedAssistant::new();
        assistant.push_run(RunScript::new(vec![RunStatus::InProgress], ""));
        let (thread, run) = start(&assistant).await;

        let before = Instant::now();
        let policy = PollPolicy::fixed(Duration::from_secs(10), 100)
            .with_deadline(Duration::from_secs(25));
        let err = wait_for_run(&assistant, &thread, &run, &policy, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ConversationError::Timeout { attempts: 3, .. }));
        assert_eq!(before.elapsed(), Duration::from_secs(25));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_interrupts_wait() {
        let assistant = ScriptedAssistant::new();
        assistant.push_run(RunScript::new(vec![RunStatus::InProgress], ""));
        let (thread, run) = start(&assistant).await;

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = wait_for_run(
            &assistant,
            &thread,
            &run,
            &PollPolicy::default(),
            &cancel,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ConversationError::Cancelled));
        assert_eq!(assistant.status_checks(), 0);
    }
}
