//! Query synthesis: generative attempts with repair feedback, then a
//! deterministic template.
//!
//! Both synthesizers implement [`QuerySynthesizer`]; [`SynthesisLoop`] is the
//! policy that decides when to give up on the generative one.

use crate::error::DiagnoseError;
use crate::filter::filter_compatible;
use crate::metapath::Metapath;
use crate::prompts;
use async_trait::async_trait;
use serde::Serialize;
use statewalk_graph::chain::{NodePattern, PatternChain, Predicate, RelPattern, ReturnItem};
use statewalk_graph::{ChainQuery, Clause, GraphBackend, GraphError, Params, Row};
use statewalk_llm::{extract_cypher, Session};
use tracing::{debug, info, warn};

#[async_trait]
pub trait QuerySynthesizer: Send + Sync {
    fn name(&self) -> &'static str;

    /// Produce query text selecting instances of `metapath` for `message`.
    async fn synthesize(&self, metapath: &Metapath, message: &str) -> Result<String, DiagnoseError>;

    /// Told that the previous query could not be used.
    async fn report_failure(&self, _syntax: bool, _detail: &str) -> Result<(), DiagnoseError> {
        Ok(())
    }
}

// ============================================================================
// Template
// ============================================================================

/// Deterministic expansion of a metapath: one anchored Event filter, one
/// MATCH per segment, every alias returned in node/relationship order.
pub struct TemplateSynthesizer;

impl TemplateSynthesizer {
    pub fn build(&self, metapath: &Metapath, message: &str) -> Result<ChainQuery, DiagnoseError> {
        // kind -> alias, in order of first appearance
        let mut aliases: Vec<(String, String)> = vec![("EVENT".into(), "evt".into())];
        let mut next = 1;
        for seg in &metapath.segments {
            for kind in [&seg.src_kind, &seg.dest_kind] {
                if !aliases.iter().any(|(k, _)| k == kind) {
                    aliases.push((kind.clone(), format!("n{next}")));
                    next += 1;
                }
            }
        }
        if aliases.len() != metapath.segments.len() + 1 {
            return Err(DiagnoseError::MalformedPath(format!(
                "{} distinct kinds for {} segments",
                aliases.len(),
                metapath.segments.len()
            )));
        }
        let alias_of = |kind: &str| {
            aliases
                .iter()
                .find(|(k, _)| k == kind)
                .map(|(_, a)| a.clone())
                .unwrap_or_default()
        };

        let mut clauses = vec![
            Clause::Match {
                patterns: vec![PatternChain {
                    start: NodePattern::new("evt", "EVENT"),
                    steps: Vec::new(),
                }],
                predicates: vec![Predicate::contains("evt", "message", message)],
            },
            Clause::With(vec!["evt".into()]),
            Clause::Limit(1),
        ];
        for (i, seg) in metapath.segments.iter().enumerate() {
            let rel = format!("r{}", i + 1);
            clauses.push(Clause::Match {
                patterns: vec![PatternChain {
                    start: NodePattern::new(alias_of(&seg.src_kind), seg.src_kind.as_str()),
                    steps: vec![(
                        RelPattern::outgoing(rel.as_str(), seg.rel_type.as_str()),
                        NodePattern::new(alias_of(&seg.dest_kind), seg.dest_kind.as_str()),
                    )],
                }],
                predicates: vec![Predicate::eq(rel.as_str(), "key", seg.key.as_str())],
            });
        }

        let mut items = Vec::with_capacity(aliases.len() * 2);
        for (i, (_, alias)) in aliases.iter().enumerate() {
            if i > 0 {
                items.push(ReturnItem {
                    alias: format!("r{i}"),
                    property: None,
                });
            }
            items.push(ReturnItem {
                alias: alias.clone(),
                property: None,
            });
        }
        clauses.push(Clause::Return {
            distinct: false,
            items,
        });
        Ok(ChainQuery { clauses })
    }
}

#[async_trait]
impl QuerySynthesizer for TemplateSynthesizer {
    fn name(&self) -> &'static str {
        "template"
    }

    async fn synthesize(&self, metapath: &Metapath, message: &str) -> Result<String, DiagnoseError> {
        Ok(self.build(metapath, message)?.to_string())
    }
}

// ============================================================================
// Generative
// ============================================================================

/// Asks the query-generator session for a ```cypher block.
pub struct GenerativeSynthesizer<'s> {
    session: &'s Session,
}

impl<'s> GenerativeSynthesizer<'s> {
    pub fn new(session: &'s Session) -> Self {
        Self { session }
    }

    /// Register the generation template in the session's thread.
    pub async fn prime(&self) -> Result<(), DiagnoseError> {
        self.session.say(prompts::GENERATION_LABEL).await?;
        self.session.say(prompts::GENERATION_TEMPLATE).await?;
        Ok(())
    }
}

#[async_trait]
impl QuerySynthesizer for GenerativeSynthesizer<'_> {
    fn name(&self) -> &'static str {
        "generative"
    }

    async fn synthesize(&self, metapath: &Metapath, message: &str) -> Result<String, DiagnoseError> {
        let reply = self
            .session
            .ask(&prompts::generation_prompt(metapath, message))
            .await?;
        let query = extract_cypher(&reply)?;
        debug!(query = %query, "generated query");
        Ok(query)
    }

    async fn report_failure(&self, syntax: bool, detail: &str) -> Result<(), DiagnoseError> {
        self.session
            .say(&prompts::repair_message(syntax, detail))
            .await?;
        Ok(())
    }
}

// ============================================================================
// Loop
// ============================================================================

#[derive(Debug, Clone, Default, Serialize)]
pub struct Synthesis {
    /// Last query produced by the generative synthesizer.
    pub query: Option<String>,
    pub attempts: u32,
    pub fallback_query: Option<String>,
    /// Rows returned before filtering by the query whose rows were kept.
    pub raw_rows: usize,
    #[serde(skip)]
    pub rows: Vec<Row>,
}

impl Synthesis {
    pub fn used_fallback(&self) -> bool {
        self.fallback_query.is_some()
    }

    /// The query whose rows were kept.
    pub fn final_query(&self) -> Option<&str> {
        self.fallback_query.as_deref().or(self.query.as_deref())
    }
}

fn failure_detail(error: &GraphError) -> String {
    match error {
        GraphError::Syntax(detail) | GraphError::Execution(detail) => detail.clone(),
        other => other.to_string(),
    }
}

pub struct SynthesisLoop<'a> {
    backend: &'a dyn GraphBackend,
    generative: &'a dyn QuerySynthesizer,
    fallback: &'a dyn QuerySynthesizer,
    max_attempts: u32,
}

impl<'a> SynthesisLoop<'a> {
    pub fn new(
        backend: &'a dyn GraphBackend,
        generative: &'a dyn QuerySynthesizer,
        fallback: &'a dyn QuerySynthesizer,
        max_attempts: u32,
    ) -> Self {
        Self {
            backend,
            generative,
            fallback,
            max_attempts,
        }
    }

    /// Synthesize, execute and filter. The fallback runs when every
    /// generative attempt failed or the executed query kept no rows.
    pub async fn run(&self, metapath: &Metapath, message: &str) -> Result<Synthesis, DiagnoseError> {
        let mut outcome = Synthesis::default();
        let mut executed = false;

        for attempt in 1..=self.max_attempts {
            outcome.attempts = attempt;
            let (syntax, detail) = match self.generative.synthesize(metapath, message).await {
                Ok(query) => match self.backend.run_query(&query, &Params::new()).await {
                    Ok(rows) => {
                        info!(attempt, rows = rows.len(), "generated query executed");
                        outcome.raw_rows = rows.len();
                        outcome.rows = filter_compatible(rows);
                        outcome.query = Some(query);
                        executed = true;
                        break;
                    }
                    Err(e @ GraphError::Unavailable(_)) => return Err(e.into()),
                    Err(e) => {
                        warn!(attempt, error = %e, "generated query rejected");
                        outcome.query = Some(query);
                        (e.is_syntax(), failure_detail(&e))
                    }
                },
                Err(e) if e.is_unavailable() => {
                    warn!(attempt, error = %e, "query generator unavailable");
                    break;
                }
                Err(e @ DiagnoseError::Conversation(_)) => {
                    warn!(attempt, error = %e, "query generator reply unusable");
                    (false, e.to_string())
                }
                Err(e) => return Err(e),
            };

            if attempt < self.max_attempts {
                if let Err(e) = self.generative.report_failure(syntax, &detail).await {
                    warn!(error = %e, "could not send repair feedback");
                    break;
                }
            }
        }

        if executed && !outcome.rows.is_empty() {
            return Ok(outcome);
        }
        info!(
            executed,
            attempts = outcome.attempts,
            synthesizer = self.fallback.name(),
            "falling back to template query"
        );
        let query = self.fallback.synthesize(metapath, message).await?;
        let rows = self.backend.run_query(&query, &Params::new()).await?;
        outcome.raw_rows = rows.len();
        outcome.rows = filter_compatible(rows);
        outcome.fallback_query = Some(query);
        Ok(outcome)
    }
}
