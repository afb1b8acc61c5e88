//! Neo4j backend over the transactional HTTP endpoint.
//!
//! Every call is a single auto-commit transaction:
//! `POST {url}/db/{database}/tx/commit` with
//! `resultDataContents: ["row", "graph"]`. Row values are decoded through
//! their `meta` entries and the `graph` section, so nodes, relationships and
//! paths arrive with labels, types and element ids intact.

use crate::backend::{GraphBackend, KindCatalog, PathPattern, StateLookup};
use crate::cypher;
use crate::error::GraphError;
use crate::model::{GraphPath, GraphValue, Node, Params, Properties, Relationship, Row};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone)]
pub struct Neo4jConfig {
    /// HTTP base URL, e.g. `http://localhost:7474`.
    pub url: String,
    pub user: String,
    pub password: String,
    pub database: String,
    pub timeout_secs: u64,
}

impl Neo4jConfig {
    pub fn new(url: &str, user: &str, password: &str) -> Self {
        Self {
            url: url.trim_end_matches('/').to_string(),
            user: user.to_string(),
            password: password.to_string(),
            database: "neo4j".to_string(),
            timeout_secs: 60,
        }
    }

    /// Load from `{prefix}NEO4J_URL`, `{prefix}NEO4J_USER`,
    /// `{prefix}NEO4J_PASSWORD` and `{prefix}NEO4J_DATABASE`. Prefixed
    /// variables fall back to the unprefixed ones.
    pub fn from_env(prefix: &str) -> Result<Self, GraphError> {
        let var = |name: &str| {
            std::env::var(format!("{prefix}{name}"))
                .or_else(|_| std::env::var(name))
                .ok()
        };
        let url = var("NEO4J_URL").ok_or_else(|| {
            GraphError::Config(format!("{prefix}NEO4J_URL is not set"))
        })?;
        let mut config = Self::new(
            &url,
            &var("NEO4J_USER").unwrap_or_else(|| "neo4j".to_string()),
            &var("NEO4J_PASSWORD").unwrap_or_default(),
        );
        if let Some(database) = var("NEO4J_DATABASE") {
            config.database = database;
        }
        Ok(config)
    }

    fn commit_url(&self) -> String {
        format!("{}/db/{}/tx/commit", self.url, self.database)
    }
}

// ============================================================================
// Wire format
// ============================================================================

#[derive(Debug, Deserialize)]
struct TxResponse {
    #[serde(default)]
    results: Vec<TxResult>,
    #[serde(default)]
    errors: Vec<TxError>,
}

#[derive(Debug, Deserialize)]
struct TxResult {
    #[serde(default)]
    columns: Vec<String>,
    #[serde(default)]
    data: Vec<TxRow>,
}

#[derive(Debug, Deserialize)]
struct TxRow {
    #[serde(default)]
    row: Vec<Value>,
    #[serde(default)]
    meta: Vec<Value>,
    #[serde(default)]
    graph: TxGraph,
}

#[derive(Debug, Default, Deserialize)]
struct TxGraph {
    #[serde(default)]
    nodes: Vec<TxNode>,
    #[serde(default)]
    relationships: Vec<TxRelationship>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TxNode {
    id: String,
    element_id: Option<String>,
    #[serde(default)]
    labels: Vec<String>,
    #[serde(default)]
    properties: Properties,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TxRelationship {
    id: String,
    element_id: Option<String>,
    #[serde(rename = "type")]
    rel_type: String,
    start_node: String,
    end_node: String,
    #[serde(default)]
    properties: Properties,
}

#[derive(Debug, Deserialize)]
struct TxError {
    code: String,
    message: String,
}

fn classify(error: &TxError) -> GraphError {
    if error.code.contains("SyntaxError") {
        GraphError::Syntax(error.message.clone())
    } else {
        GraphError::Execution(format!("{}: {}", error.code, error.message))
    }
}

fn meta_id(meta: &Value) -> Option<String> {
    match meta.get("id")? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Resolves `meta` references against one row's `graph` section.
struct GraphLookup<'a> {
    nodes: HashMap<&'a str, &'a TxNode>,
    relationships: HashMap<&'a str, &'a TxRelationship>,
}

impl<'a> GraphLookup<'a> {
    fn new(graph: &'a TxGraph) -> Self {
        Self {
            nodes: graph.nodes.iter().map(|n| (n.id.as_str(), n)).collect(),
            relationships: graph
                .relationships
                .iter()
                .map(|r| (r.id.as_str(), r))
                .collect(),
        }
    }

    fn element_id_of_node(&self, id: &str) -> String {
        self.nodes
            .get(id)
            .and_then(|n| n.element_id.clone())
            .unwrap_or_else(|| id.to_string())
    }

    fn node(&self, id: &str) -> Result<Node, GraphError> {
        let n = self
            .nodes
            .get(id)
            .ok_or_else(|| GraphError::InvalidResponse(format!("node {id} missing from graph")))?;
        Ok(Node {
            element_id: n.element_id.clone().unwrap_or_else(|| n.id.clone()),
            labels: n.labels.clone(),
            properties: n.properties.clone(),
        })
    }

    fn relationship(&self, id: &str) -> Result<Relationship, GraphError> {
        let r = self.relationships.get(id).ok_or_else(|| {
            GraphError::InvalidResponse(format!("relationship {id} missing from graph"))
        })?;
        Ok(Relationship {
            element_id: r.element_id.clone().unwrap_or_else(|| r.id.clone()),
            rel_type: r.rel_type.clone(),
            start: self.element_id_of_node(&r.start_node),
            end: self.element_id_of_node(&r.end_node),
            properties: r.properties.clone(),
        })
    }

    fn value(&self, raw: &Value, meta: &Value) -> Result<GraphValue, GraphError> {
        match meta {
            Value::Array(parts) => {
                let mut path = GraphPath::default();
                for part in parts {
                    let id = meta_id(part)
                        .ok_or_else(|| GraphError::InvalidResponse("path meta without id".into()))?;
                    match part.get("type").and_then(Value::as_str) {
                        Some("node") => path.nodes.push(self.node(&id)?),
                        Some("relationship") => path.relationships.push(self.relationship(&id)?),
                        other => {
                            return Err(GraphError::InvalidResponse(format!(
                                "unexpected path element type {other:?}"
                            )))
                        }
                    }
                }
                Ok(GraphValue::Path(path))
            }
            Value::Object(_) => {
                let id = meta_id(meta)
                    .ok_or_else(|| GraphError::InvalidResponse("meta without id".into()))?;
                match meta.get("type").and_then(Value::as_str) {
                    Some("node") => Ok(GraphValue::Node(self.node(&id)?)),
                    Some("relationship") => Ok(GraphValue::Relationship(self.relationship(&id)?)),
                    _ => Ok(GraphValue::Scalar(raw.clone())),
                }
            }
            _ => Ok(GraphValue::Scalar(raw.clone())),
        }
    }
}

fn decode(response: TxResponse) -> Result<Vec<Row>, GraphError> {
    if let Some(error) = response.errors.first() {
        return Err(classify(error));
    }
    let Some(result) = response.results.into_iter().next() else {
        return Ok(Vec::new());
    };
    let mut rows = Vec::with_capacity(result.data.len());
    for data in &result.data {
        let lookup = GraphLookup::new(&data.graph);
        let mut row = Row::new();
        for (i, column) in result.columns.iter().enumerate() {
            let raw = data.row.get(i).unwrap_or(&Value::Null);
            let meta = data.meta.get(i).unwrap_or(&Value::Null);
            row.push(column.clone(), lookup.value(raw, meta)?);
        }
        rows.push(row);
    }
    Ok(rows)
}

// ============================================================================
// Backend
// ============================================================================

pub struct Neo4jBackend {
    client: Client,
    config: Neo4jConfig,
}

impl Neo4jBackend {
    pub fn new(config: Neo4jConfig) -> Result<Self, GraphError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| GraphError::Config(format!("failed to create HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &Neo4jConfig {
        &self.config
    }

    async fn commit(&self, query: &str, params: &Params) -> Result<Vec<Row>, GraphError> {
        let body = json!({
            "statements": [{
                "statement": query,
                "parameters": params,
                "resultDataContents": ["row", "graph"],
            }]
        });
        debug!(database = %self.config.database, "neo4j commit");

        let response = self
            .client
            .post(self.config.commit_url())
            .basic_auth(&self.config.user, Some(&self.config.password))
            .header("Accept", "application/json;charset=UTF-8")
            .json(&body)
            .send()
            .await
            .map_err(|e| GraphError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(GraphError::Unavailable(format!("HTTP {status}: {text}")));
        }

        let parsed: TxResponse = response
            .json()
            .await
            .map_err(|e| GraphError::InvalidResponse(e.to_string()))?;
        decode(parsed)
    }
}

fn column<'a>(row: &'a Row, name: &str) -> Result<&'a GraphValue, GraphError> {
    row.get(name)
        .ok_or_else(|| GraphError::InvalidResponse(format!("missing column '{name}'")))
}

#[async_trait]
impl GraphBackend for Neo4jBackend {
    async fn run_query(&self, query: &str, params: &Params) -> Result<Vec<Row>, GraphError> {
        self.commit(query, params).await
    }

    async fn match_paths(&self, pattern: &PathPattern) -> Result<Vec<GraphPath>, GraphError> {
        let (query, params) = cypher::path_pattern(pattern);
        let rows = self.commit(&query, &params).await?;
        rows.iter()
            .map(|row| {
                column(row, "path")?
                    .as_path()
                    .cloned()
                    .ok_or_else(|| GraphError::InvalidResponse("path column is not a path".into()))
            })
            .collect()
    }

    async fn states(&self, lookup: &StateLookup) -> Result<Vec<Node>, GraphError> {
        let (query, params) = cypher::state_lookup(lookup);
        let rows = self.commit(&query, &params).await?;
        Ok(rows
            .iter()
            .filter_map(|row| row.get("state").and_then(GraphValue::as_node).cloned())
            .collect())
    }

    async fn entity(&self, kind: &str, id: &str) -> Result<Option<Node>, GraphError> {
        let (query, params) = cypher::entity_lookup(kind, id);
        let rows = self.commit(&query, &params).await?;
        Ok(rows
            .first()
            .and_then(|row| row.get("entity"))
            .and_then(GraphValue::as_node)
            .cloned())
    }

    async fn kind_catalog(&self) -> Result<KindCatalog, GraphError> {
        let rows = self.commit(cypher::KIND_CATALOG_QUERY, &Params::new()).await?;
        let mut catalog = KindCatalog::default();
        for row in &rows {
            let text = |name: &str| {
                row.get(name)
                    .and_then(GraphValue::as_scalar)
                    .and_then(Value::as_str)
                    .map(str::to_string)
            };
            match (text("category").as_deref(), text("kind")) {
                (Some("NativeEntity"), Some(kind)) => catalog.native.push(kind),
                (Some("ExternalEntity"), Some(kind)) => catalog.external.push(kind),
                _ => {}
            }
        }
        catalog.native.sort();
        catalog.native.dedup();
        catalog.external.sort();
        catalog.external.dedup();
        Ok(catalog)
    }
}
