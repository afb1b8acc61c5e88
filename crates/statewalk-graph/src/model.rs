//! Property-graph values returned by backends.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};

/// Node/relationship properties, ordered for stable output.
pub type Properties = BTreeMap<String, Value>;

/// Query parameters (`$name` references).
pub type Params = BTreeMap<String, Value>;

/// Convert a JSON object into a property map. Non-objects yield an empty map.
pub fn props(value: Value) -> Properties {
    match value {
        Value::Object(map) => map.into_iter().collect(),
        _ => Properties::new(),
    }
}

/// Render a property value as plain text (strings unquoted, null as `None`).
pub(crate) fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

// ============================================================================
// Nodes
// ============================================================================

/// A graph node: entity, state snapshot, or event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub element_id: String,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub properties: Properties,
}

impl Node {
    pub fn new(element_id: impl Into<String>) -> Self {
        Self {
            element_id: element_id.into(),
            labels: Vec::new(),
            properties: Properties::new(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.labels.push(label.into());
        self
    }

    pub fn with_prop(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }

    pub fn prop(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    /// String property, only when stored as a string.
    pub fn str_prop(&self, key: &str) -> Option<&str> {
        self.properties.get(key).and_then(Value::as_str)
    }

    /// Any non-null property rendered as text.
    pub fn text_prop(&self, key: &str) -> Option<String> {
        self.properties.get(key).and_then(value_text)
    }

    /// Boolean flag stored either as a JSON bool or as the string `"true"`.
    pub fn flag(&self, key: &str) -> bool {
        match self.properties.get(key) {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
            _ => false,
        }
    }

    /// Primary kind tag (`kind`).
    pub fn kind(&self) -> Option<&str> {
        self.str_prop("kind")
    }

    /// Resolved kind of native entities (`kind2`).
    pub fn resolved_kind(&self) -> Option<&str> {
        self.str_prop("kind2")
    }

    pub fn id(&self) -> Option<String> {
        self.text_prop("id")
    }

    pub fn tag(&self) -> Option<&str> {
        self.str_prop("tag")
    }

    pub fn is_native(&self) -> bool {
        self.flag("isNative")
    }

    pub fn is_atomic(&self) -> bool {
        self.flag("isAtomic")
    }

    /// Event nodes carry `kind = "Event"` (or `kind2 = "Event"` on the
    /// resolved side).
    pub fn is_event(&self) -> bool {
        self.kind() == Some(crate::EVENT_KIND) || self.resolved_kind() == Some(crate::EVENT_KIND)
    }
}

// ============================================================================
// Relationships
// ============================================================================

/// A typed, directed relationship.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub element_id: String,
    #[serde(rename = "type")]
    pub rel_type: String,
    /// Element id of the start node.
    pub start: String,
    /// Element id of the end node.
    pub end: String,
    #[serde(default)]
    pub properties: Properties,
}

impl Relationship {
    pub fn str_prop(&self, key: &str) -> Option<&str> {
        self.properties.get(key).and_then(Value::as_str)
    }

    pub fn src_kind(&self) -> Option<&str> {
        self.str_prop("srcKind")
    }

    pub fn dest_kind(&self) -> Option<&str> {
        self.str_prop("destKind")
    }

    /// The matching property asserted by chained queries (`r.key = ...`).
    pub fn key(&self) -> Option<&str> {
        self.str_prop("key")
    }
}

// ============================================================================
// Paths
// ============================================================================

/// Alternating node/relationship sequence. Nodes are ordered from the start
/// of the traversal; relationships keep their stored direction.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GraphPath {
    pub nodes: Vec<Node>,
    pub relationships: Vec<Relationship>,
}

impl GraphPath {
    /// Number of relationships (hops).
    pub fn len(&self) -> usize {
        self.relationships.len()
    }

    pub fn is_empty(&self) -> bool {
        self.relationships.is_empty()
    }

    pub fn start(&self) -> Option<&Node> {
        self.nodes.first()
    }

    pub fn end(&self) -> Option<&Node> {
        self.nodes.last()
    }

    /// Nodes strictly between the endpoints.
    pub fn interior(&self) -> &[Node] {
        if self.nodes.len() <= 2 {
            return &[];
        }
        &self.nodes[1..self.nodes.len() - 1]
    }

    /// No node appears twice.
    pub fn is_simple(&self) -> bool {
        let mut seen = HashSet::new();
        self.nodes.iter().all(|n| seen.insert(n.element_id.as_str()))
    }

    /// Kind tags in traversal order (missing kinds render as `?`).
    pub fn kinds(&self) -> Vec<String> {
        self.nodes
            .iter()
            .map(|n| n.kind().unwrap_or("?").to_string())
            .collect()
    }
}

impl std::fmt::Display for GraphPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, node) in self.nodes.iter().enumerate() {
            if i > 0 {
                let rel = self
                    .relationships
                    .get(i - 1)
                    .map(|r| r.rel_type.as_str())
                    .unwrap_or("?");
                write!(f, " -[{rel}]- ")?;
            }
            write!(f, "({})", node.kind().unwrap_or("?"))?;
        }
        Ok(())
    }
}

// ============================================================================
// Result rows
// ============================================================================

/// One value of a result column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "value_type", content = "value", rename_all = "snake_case")]
pub enum GraphValue {
    Node(Node),
    Relationship(Relationship),
    Path(GraphPath),
    Scalar(Value),
}

impl GraphValue {
    pub fn as_node(&self) -> Option<&Node> {
        match self {
            GraphValue::Node(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_relationship(&self) -> Option<&Relationship> {
        match self {
            GraphValue::Relationship(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_path(&self) -> Option<&GraphPath> {
        match self {
            GraphValue::Path(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_scalar(&self) -> Option<&Value> {
        match self {
            GraphValue::Scalar(v) => Some(v),
            _ => None,
        }
    }
}

/// An ordered mapping from result alias to value.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Row {
    pub columns: Vec<(String, GraphValue)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, alias: impl Into<String>, value: GraphValue) {
        self.columns.push((alias.into(), value));
    }

    pub fn with(mut self, alias: impl Into<String>, value: GraphValue) -> Self {
        self.push(alias, value);
        self
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn get(&self, alias: &str) -> Option<&GraphValue> {
        self.columns
            .iter()
            .find(|(a, _)| a == alias)
            .map(|(_, v)| v)
    }

    pub fn values(&self) -> impl Iterator<Item = &GraphValue> {
        self.columns.iter().map(|(_, v)| v)
    }

    /// Node-valued columns in projection order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.values().filter_map(GraphValue::as_node)
    }

    /// The list-final column when it holds a node.
    pub fn terminal_node(&self) -> Option<&Node> {
        self.columns.last().and_then(|(_, v)| v.as_node())
    }

    /// The first event node carrying a `message`.
    pub fn event_node(&self) -> Option<&Node> {
        self.nodes()
            .find(|n| n.kind() == Some(crate::EVENT_KIND) && n.prop("message").is_some())
    }
}
