//! Per-entity clue collection and the summarizing report.

use crate::config::{ReportConfig, StateConfig};
use crate::error::DiagnoseError;
use crate::prompts;
use crate::report::{Clue, ClueOutcome, EntityClues, Report, Summary};
use crate::resolver::StateResolver;
use serde_json::{Map, Value};
use statewalk_graph::{effective_kind, identifying_value, parse_instant, GraphBackend, Instant, Node, Row};
use statewalk_llm::{extract_json, Session};
use tracing::{debug, info, warn};

pub struct ClueAggregator<'a> {
    backend: &'a dyn GraphBackend,
    resolver: StateResolver<'a>,
    session: &'a Session,
    config: &'a ReportConfig,
}

impl<'a> ClueAggregator<'a> {
    pub fn new(
        backend: &'a dyn GraphBackend,
        states: &StateConfig,
        config: &'a ReportConfig,
        session: &'a Session,
    ) -> Self {
        Self {
            backend,
            resolver: StateResolver::new(backend, states),
            session,
            config,
        }
    }

    /// Give the analyzer session its standing rule and task.
    pub async fn prime(&self) -> Result<(), DiagnoseError> {
        self.session.say(prompts::STATE_RULE).await?;
        self.session.say(prompts::TASK_PROMPT).await?;
        Ok(())
    }

    /// Walk one path instance: a clue per non-event entity, then a summary.
    ///
    /// Reasoning-service failures end in a `Failed` report carrying the clues
    /// gathered so far; graph failures are returned as errors.
    pub async fn build_report(&self, row: &Row, message: &str) -> Result<Report, DiagnoseError> {
        let event = row
            .event_node()
            .ok_or_else(|| DiagnoseError::MalformedRow("no event node with a message".into()))?;
        let message = event.text_prop("message").unwrap_or_else(|| message.to_string());
        let raw_ts = event
            .text_prop("timestamp")
            .ok_or_else(|| DiagnoseError::MalformedRow("event has no timestamp".into()))?;
        let at = parse_instant(&raw_ts)?;

        let mut clues = Vec::new();
        let mut kinds = Vec::new();
        for node in row.nodes().filter(|n| !n.is_event()) {
            let (Some(kind), Some(id)) = (effective_kind(node), node.id()) else {
                warn!(node = %node.element_id, "entity without kind or id skipped");
                continue;
            };
            kinds.push(kind.to_string());
            match self.entity_clues(node, kind, &id, at, &message).await {
                Ok(entry) => clues.push(entry),
                Err(DiagnoseError::Conversation(e)) => {
                    warn!(kind, id = %id, error = %e, "state judgment failed");
                    return Ok(Report::pending(clues).failed(e, None));
                }
                Err(e) => return Err(e),
            }
        }

        Ok(self.summarize(Report::pending(clues), &kinds).await)
    }

    async fn entity_clues(
        &self,
        node: &Node,
        kind: &str,
        id: &str,
        at: Instant,
        message: &str,
    ) -> Result<EntityClues, DiagnoseError> {
        let mut entry = EntityClues::new(kind, id);
        let states = self.resolver.resolve_at(kind, id, at).await?;

        if states.is_empty() {
            let name = self.entity_name(node, kind, id).await?;
            let text = prompts::absence_clue(kind, id, &name);
            info!(kind, id, name = %name, "entity has no state");
            self.session.say(&text).await?;
            entry.clues.push(Clue {
                outcome: ClueOutcome::StateAbsent,
                text,
            });
            return Ok(entry);
        }

        for state in &states {
            let state_kind = state.kind().unwrap_or(kind);
            let fields = self.important_fields(state);
            let reply = self
                .session
                .ask(&prompts::semantic_prompt(state_kind, message, &fields))
                .await?;
            let state_id = state.id().unwrap_or_else(|| state.element_id.clone());
            debug!(kind = state_kind, id = %state_id, "state judged");
            entry.clues.push(Clue {
                outcome: ClueOutcome::StateJudged,
                text: format!("{}({}): {}", state_kind.to_uppercase(), state_id, reply),
            });
        }
        Ok(entry)
    }

    /// Authoritative name of the entity, preferring the stored entity node.
    async fn entity_name(&self, node: &Node, kind: &str, id: &str) -> Result<String, DiagnoseError> {
        let stored = self.backend.entity(kind, id).await?;
        Ok(stored
            .as_ref()
            .and_then(identifying_value)
            .or_else(|| identifying_value(node))
            .unwrap_or_else(|| id.to_string()))
    }

    /// Allow-listed fields of a state as a JSON object.
    fn important_fields(&self, state: &Node) -> String {
        let fields: Map<String, Value> = self
            .config
            .important_fields
            .iter()
            .filter_map(|f| state.prop(f).map(|v| (f.clone(), v.clone())))
            .collect();
        Value::Object(fields).to_string()
    }

    async fn summarize(&self, report: Report, kinds: &[String]) -> Report {
        let mut prompt = prompts::summary_prompt(kinds);
        let mut last_reply = None;
        let mut last_error = String::new();

        for attempt in 1..=self.config.max_parse_attempts {
            let reply = match self.session.ask(&prompt).await {
                Ok(reply) => reply,
                Err(e) => {
                    warn!(attempt, error = %e, "summary request failed");
                    return report.failed(e, last_reply);
                }
            };
            match extract_json::<Summary>(&reply) {
                Ok(summary) => {
                    info!(attempt, kinds = summary.summary.len(), "report summarized");
                    return report.summarized(summary);
                }
                Err(e) => {
                    warn!(attempt, error = %e, "summary reply unparseable");
                    last_error = e.to_string();
                    prompt = prompts::summary_json_correction(&last_error);
                    last_reply = Some(reply);
                }
            }
        }
        report.failed(
            format!(
                "no parseable summary after {} attempts: {last_error}",
                self.config.max_parse_attempts
            ),
            last_reply,
        )
    }
}
