//! Graph and assistant backends selected from flags and the environment.

use anyhow::{Context, Result};
use statewalk_graph::{GraphBackend, GraphStore};
use statewalk_llm::AssistantService;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Which graph a backend serves. Neo4j settings for the metagraph use the
/// `META_` prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphRole {
    Meta,
    State,
}

impl GraphRole {
    fn env_prefix(self) -> &'static str {
        match self {
            GraphRole::Meta => "META_",
            GraphRole::State => "",
        }
    }

    fn name(self) -> &'static str {
        match self {
            GraphRole::Meta => "metagraph",
            GraphRole::State => "stategraph",
        }
    }
}

/// A snapshot file when given, otherwise the Neo4j server from the
/// environment.
pub fn graph(role: GraphRole, snapshot: Option<&Path>) -> Result<Arc<dyn GraphBackend>> {
    if let Some(path) = snapshot {
        let store = GraphStore::load_json(path)
            .with_context(|| format!("loading {} snapshot {}", role.name(), path.display()))?;
        info!(
            graph = role.name(),
            nodes = store.node_count(),
            relationships = store.relationship_count(),
            "snapshot loaded"
        );
        return Ok(Arc::new(store));
    }
    remote_graph(role)
}

#[cfg(feature = "neo4j")]
fn remote_graph(role: GraphRole) -> Result<Arc<dyn GraphBackend>> {
    use statewalk_graph::neo4j::{Neo4jBackend, Neo4jConfig};

    let config = Neo4jConfig::from_env(role.env_prefix())?;
    info!(graph = role.name(), url = %config.url, database = %config.database, "using neo4j");
    Ok(Arc::new(Neo4jBackend::new(config)?))
}

#[cfg(not(feature = "neo4j"))]
fn remote_graph(role: GraphRole) -> Result<Arc<dyn GraphBackend>> {
    Err(anyhow::anyhow!(
        "no --{} snapshot given and neo4j support is not compiled in (prefix {})",
        role.name(),
        role.env_prefix()
    ))
}

#[cfg(feature = "openai")]
pub fn assistants() -> Result<Arc<dyn AssistantService>> {
    use statewalk_llm::openai::{OpenAIAssistants, OpenAIConfig};

    let service = OpenAIAssistants::new(OpenAIConfig::from_env()?)?;
    info!(model = service.model(), "using openai assistants");
    Ok(Arc::new(service))
}

#[cfg(not(feature = "openai"))]
pub fn assistants() -> Result<Arc<dyn AssistantService>> {
    Err(anyhow::anyhow!("assistant support is not compiled in"))
}
