//! Source-kind classification and destination locating.

use crate::error::DiagnoseError;
use crate::prompts;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use statewalk_graph::{GraphBackend, KindCatalog, Params};
use statewalk_llm::{extract_json, Session};
use tracing::{info, warn};

/// Events whose state message contains `$message`, followed to the entity
/// they involve.
pub const SOURCE_KIND_QUERY: &str = "MATCH (n1:Event)-[s1:HasEvent]->(N1:EVENT)
WHERE N1.message CONTAINS $message
WITH n1, N1, s1
MATCH (n1:Event)-[r1:ReferInternal]->(n2)
WHERE r1.key = 'involvedObject_uid'
RETURN DISTINCT n2.kind2
LIMIT 5";

/// Resolves an error message to the kind of its primary subject.
#[async_trait]
pub trait KindClassifier: Send + Sync {
    async fn classify(&self, message: &str) -> Result<Option<String>, DiagnoseError>;
}

/// Looks the message up among stored events.
pub struct EventKindClassifier<'a> {
    backend: &'a dyn GraphBackend,
}

impl<'a> EventKindClassifier<'a> {
    pub fn new(backend: &'a dyn GraphBackend) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl KindClassifier for EventKindClassifier<'_> {
    async fn classify(&self, message: &str) -> Result<Option<String>, DiagnoseError> {
        let mut params = Params::new();
        params.insert("message".into(), Value::String(message.to_string()));
        let rows = self.backend.run_query(SOURCE_KIND_QUERY, &params).await?;
        let kind = rows
            .iter()
            .filter_map(|row| row.get("n2.kind2")?.as_scalar()?.as_str())
            .next()
            .map(str::to_string);
        match &kind {
            Some(k) => info!(kind = %k, candidates = rows.len(), "classified source kind"),
            None => warn!("no event matches message"),
        }
        Ok(kind)
    }
}

/// A fixed answer, for callers that already know the subject kind.
pub struct FixedKind(pub String);

#[async_trait]
impl KindClassifier for FixedKind {
    async fn classify(&self, _message: &str) -> Result<Option<String>, DiagnoseError> {
        Ok(Some(self.0.clone()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathEdge {
    #[serde(rename = "Edge", default)]
    pub edge: Option<u32>,
    #[serde(default)]
    pub start: String,
    #[serde(default)]
    pub end: String,
}

/// The locator's answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Located {
    #[serde(default)]
    pub source_kind: String,
    pub destination_kind: String,
    #[serde(default)]
    pub relevant_resources: Vec<String>,
    #[serde(default)]
    pub primary_path: Vec<PathEdge>,
}

impl Located {
    /// Relevant resources other than the endpoints, restricted to known
    /// kinds, in answer order.
    pub fn preferred_kinds(&self, src: &str, catalog: &KindCatalog) -> Vec<String> {
        let mut kinds: Vec<String> = Vec::new();
        for r in &self.relevant_resources {
            if r != src && *r != self.destination_kind && catalog.contains(r) && !kinds.contains(r)
            {
                kinds.push(r.clone());
            }
        }
        kinds
    }
}

/// Asks the locator session for the destination kind of an error.
pub struct DestinationLocator<'a> {
    session: &'a Session,
    catalog: &'a KindCatalog,
    max_attempts: u32,
}

impl<'a> DestinationLocator<'a> {
    pub fn new(session: &'a Session, catalog: &'a KindCatalog, max_attempts: u32) -> Self {
        Self {
            session,
            catalog,
            max_attempts,
        }
    }

    /// Returns the answer and the number of attempts it took. Unparseable
    /// replies are answered with a correction request; service failures end
    /// the search.
    pub async fn locate(&self, message: &str, src: &str) -> Result<(Located, u32), DiagnoseError> {
        let mut prompt = prompts::locator_prompt(self.catalog, src, message);
        let mut last = String::new();

        for attempt in 1..=self.max_attempts {
            let reply = self.session.ask(&prompt).await?;
            match extract_json::<Located>(&reply) {
                Ok(located) => {
                    if !self.catalog.contains(&located.destination_kind) {
                        warn!(dest = %located.destination_kind, "destination kind not in catalog");
                    }
                    info!(attempt, dest = %located.destination_kind, "located destination");
                    return Ok((located, attempt));
                }
                Err(e) => {
                    warn!(attempt, error = %e, "locator reply unparseable");
                    last = e.to_string();
                    prompt = prompts::locator_json_correction(&last);
                }
            }
        }
        Err(DiagnoseError::LocatorExhausted {
            attempts: self.max_attempts,
            last,
        })
    }
}
