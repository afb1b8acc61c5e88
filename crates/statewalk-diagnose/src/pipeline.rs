//! The orchestrating diagnoser.
//!
//! One call diagnoses one message, strictly in sequence:
//! classify → locate → find paths → synthesize per path → report per row.
//! Every call opens its own sessions and closes them before returning.

use crate::aggregator::ClueAggregator;
use crate::config::DiagnosisConfig;
use crate::error::DiagnoseError;
use crate::locator::{DestinationLocator, EventKindClassifier, KindClassifier, Located};
use crate::metapath::Metapath;
use crate::path_finder::{PathFinder, Strategy};
use crate::prompts;
use crate::report::Report;
use crate::synthesis::{GenerativeSynthesizer, Synthesis, SynthesisLoop, TemplateSynthesizer};
use chrono::{DateTime, Utc};
use serde::Serialize;
use statewalk_graph::{GraphBackend, KindCatalog};
use statewalk_llm::{AssistantService, AssistantSpec, ConversationError, Session, TokenUsage};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize)]
pub struct PathAnalysis {
    /// The metagraph path, e.g. `(Pod) -[ReferInternal]- (PersistentVolumeClaim)`.
    pub path: String,
    pub metapath: String,
    pub synthesis: Synthesis,
    pub reports: Vec<Report>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Diagnosis {
    pub message: String,
    pub source_kind: String,
    pub located: Located,
    pub locator_attempts: u32,
    pub preferred_kinds: Vec<String>,
    pub strategy: Option<Strategy>,
    pub analyses: Vec<PathAnalysis>,
    pub token_usage: TokenUsage,
    pub elapsed_secs: f64,
}

impl Diagnosis {
    pub fn reports(&self) -> impl Iterator<Item = &Report> {
        self.analyses.iter().flat_map(|a| a.reports.iter())
    }
}

/// Outcome of one message in a batch.
#[derive(Debug, Clone, Serialize)]
pub struct BatchEntry {
    pub message: String,
    pub diagnosis: Option<Diagnosis>,
    pub error: Option<String>,
}

struct Sessions {
    locator: Session,
    generator: Session,
    analyzer: Session,
}

impl Sessions {
    async fn open(
        service: &Arc<dyn AssistantService>,
        config: &DiagnosisConfig,
        cancel: &CancellationToken,
    ) -> Result<Self, ConversationError> {
        let policy = config.polling.policy();
        let specs = [
            AssistantSpec::new(prompts::LOCATOR_NAME, prompts::LOCATOR_INSTRUCTIONS, &config.model),
            AssistantSpec::new(prompts::GENERATOR_NAME, prompts::GENERATOR_INSTRUCTIONS, &config.model),
            AssistantSpec::new(prompts::ANALYZER_NAME, prompts::ANALYZER_INSTRUCTIONS, &config.model),
        ];

        let mut opened = Vec::with_capacity(specs.len());
        for spec in &specs {
            match Session::open(service.clone(), spec, policy.clone()).await {
                Ok(session) => opened.push(session.with_cancellation(cancel.clone())),
                Err(e) => {
                    for session in opened {
                        session.close().await;
                    }
                    return Err(e);
                }
            }
        }
        let mut opened = opened.into_iter();
        match (opened.next(), opened.next(), opened.next()) {
            (Some(locator), Some(generator), Some(analyzer)) => Ok(Self {
                locator,
                generator,
                analyzer,
            }),
            _ => Err(ConversationError::Config("assistant sessions incomplete".into())),
        }
    }

    async fn usage(&self, tmin: DateTime<Utc>, tmax: DateTime<Utc>) -> TokenUsage {
        let mut total = TokenUsage::default();
        for session in [&self.locator, &self.generator, &self.analyzer] {
            match session.usage(tmin, tmax).await {
                Ok(usage) => total += usage,
                Err(e) => warn!(thread = %session.thread_id(), error = %e, "token usage unavailable"),
            }
        }
        total
    }

    async fn close(self) {
        self.locator.close().await;
        self.generator.close().await;
        self.analyzer.close().await;
    }
}

pub struct Diagnoser {
    metagraph: Arc<dyn GraphBackend>,
    stategraph: Arc<dyn GraphBackend>,
    assistants: Arc<dyn AssistantService>,
    classifier: Option<Arc<dyn KindClassifier>>,
    config: DiagnosisConfig,
    cancel: CancellationToken,
}

impl Diagnoser {
    pub fn new(
        metagraph: Arc<dyn GraphBackend>,
        stategraph: Arc<dyn GraphBackend>,
        assistants: Arc<dyn AssistantService>,
        config: DiagnosisConfig,
    ) -> Self {
        Self {
            metagraph,
            stategraph,
            assistants,
            classifier: None,
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Replace the default event-based source-kind lookup.
    pub fn with_classifier(mut self, classifier: Arc<dyn KindClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &DiagnosisConfig {
        &self.config
    }

    async fn source_kind(&self, message: &str) -> Result<String, DiagnoseError> {
        let kind = match &self.classifier {
            Some(classifier) => classifier.classify(message).await?,
            None => {
                EventKindClassifier::new(self.stategraph.as_ref())
                    .classify(message)
                    .await?
            }
        };
        kind.ok_or_else(|| DiagnoseError::NoSourceKind(message.to_string()))
    }

    pub async fn diagnose(&self, message: &str) -> Result<Diagnosis, DiagnoseError> {
        let started = std::time::Instant::now();
        let tmin = Utc::now();
        info!(message, "diagnosing");

        let src = self.source_kind(message).await?;
        let catalog = self.metagraph.kind_catalog().await?;

        let sessions = Sessions::open(&self.assistants, &self.config, &self.cancel).await?;
        let result = self.run(&sessions, &catalog, message, &src).await;
        let tmax = Utc::now() + chrono::Duration::seconds(1);
        let usage = sessions.usage(tmin, tmax).await;
        sessions.close().await;

        let mut diagnosis = result?;
        diagnosis.token_usage = usage;
        diagnosis.elapsed_secs = started.elapsed().as_secs_f64();
        info!(
            paths = diagnosis.analyses.len(),
            reports = diagnosis.reports().count(),
            elapsed = diagnosis.elapsed_secs,
            "diagnosis finished"
        );
        Ok(diagnosis)
    }

    async fn run(
        &self,
        sessions: &Sessions,
        catalog: &KindCatalog,
        message: &str,
        src: &str,
    ) -> Result<Diagnosis, DiagnoseError> {
        let generator = GenerativeSynthesizer::new(&sessions.generator);
        generator.prime().await?;
        let aggregator = ClueAggregator::new(
            self.stategraph.as_ref(),
            &self.config.states,
            &self.config.report,
            &sessions.analyzer,
        );
        aggregator.prime().await?;

        let locator = DestinationLocator::new(
            &sessions.locator,
            catalog,
            self.config.report.max_parse_attempts,
        );
        let (located, locator_attempts) = locator.locate(message, src).await?;
        let preferred = located.preferred_kinds(src, catalog);

        let discovery = PathFinder::new(self.metagraph.as_ref(), &self.config.paths)
            .find(src, &located.destination_kind, &preferred)
            .await?;
        if discovery.is_empty() {
            info!(src, dest = %located.destination_kind, "no explainable path");
        }

        let template = TemplateSynthesizer;
        let synthesis_loop = SynthesisLoop::new(
            self.stategraph.as_ref(),
            &generator,
            &template,
            self.config.synthesis.max_attempts,
        );

        let mut analyses = Vec::with_capacity(discovery.paths.len());
        for path in &discovery.paths {
            let metapath = match Metapath::extend(path) {
                Ok(m) => m,
                Err(e) => {
                    warn!(path = %path, error = %e, "path skipped");
                    continue;
                }
            };
            let synthesis = synthesis_loop.run(&metapath, message).await?;
            let mut reports = Vec::with_capacity(synthesis.rows.len());
            for row in &synthesis.rows {
                reports.push(aggregator.build_report(row, message).await?);
            }
            analyses.push(PathAnalysis {
                path: path.to_string(),
                metapath: metapath.to_string(),
                synthesis,
                reports,
            });
        }

        Ok(Diagnosis {
            message: message.to_string(),
            source_kind: src.to_string(),
            located,
            locator_attempts,
            preferred_kinds: preferred,
            strategy: discovery.strategy,
            analyses,
            token_usage: TokenUsage::default(),
            elapsed_secs: 0.0,
        })
    }

    /// Diagnose each message in turn; one failure does not stop the batch.
    pub async fn diagnose_batch(&self, messages: &[String]) -> Vec<BatchEntry> {
        let mut entries = Vec::with_capacity(messages.len());
        for message in messages {
            if self.cancel.is_cancelled() {
                warn!(remaining = messages.len() - entries.len(), "batch cancelled");
                break;
            }
            let entry = match self.diagnose(message).await {
                Ok(diagnosis) => BatchEntry {
                    message: message.clone(),
                    diagnosis: Some(diagnosis),
                    error: None,
                },
                Err(e) => {
                    warn!(message = %message, error = %e, "diagnosis failed");
                    BatchEntry {
                        message: message.clone(),
                        diagnosis: None,
                        error: Some(e.to_string()),
                    }
                }
            };
            entries.push(entry);
        }
        entries
    }
}
