//! Indexed in-memory property graph.
//!
//! Holds the metagraph or stategraph entirely in memory:
//! - labels and relationship types are interned to typed 4-byte ids
//! - label and `kind` indexes are roaring bitmaps over node ids
//! - forward/backward adjacency lists give O(degree) expansion
//!
//! Used by tests, fixtures and offline CLI runs. Loaded from a JSON
//! [`GraphSnapshot`].

use crate::backend::{GraphBackend, KindCatalog, PathPattern, StateLookup};
use crate::chain::{self, Direction};
use crate::error::GraphError;
use crate::model::{props, GraphPath, Node, Params, Properties, Relationship, Row};
use crate::temporal::Interval;
use crate::HAS_STATE;
use ahash::AHashMap;
use async_trait::async_trait;
use roaring::RoaringBitmap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use tracing::{debug, warn};

// ============================================================================
// Vocabulary
// ============================================================================

/// Dense id drawn from one [`Symbols`] table.
pub trait SymbolId: Copy + Eq {
    fn from_index(index: u32) -> Self;
    fn index(self) -> u32;
}

/// Node label id. Only comparable with other labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LabelId(u32);

/// Relationship-type id, distinct from [`LabelId`] so the two tables
/// cannot be mixed up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RelTypeId(u32);

impl SymbolId for LabelId {
    fn from_index(index: u32) -> Self {
        Self(index)
    }
    fn index(self) -> u32 {
        self.0
    }
}

impl SymbolId for RelTypeId {
    fn from_index(index: u32) -> Self {
        Self(index)
    }
    fn index(self) -> u32 {
        self.0
    }
}

/// Append-only name table. Ids are assigned in first-seen order.
#[derive(Debug, Clone)]
pub struct Symbols<I> {
    ids: AHashMap<String, I>,
    names: Vec<String>,
}

impl<I: SymbolId> Symbols<I> {
    pub fn new() -> Self {
        Self {
            ids: AHashMap::new(),
            names: Vec::new(),
        }
    }

    pub fn intern(&mut self, name: &str) -> I {
        if let Some(&id) = self.ids.get(name) {
            return id;
        }
        let id = I::from_index(self.names.len() as u32);
        self.ids.insert(name.to_string(), id);
        self.names.push(name.to_string());
        id
    }

    /// Id of a name already seen; unknown names never match anything.
    pub fn get(&self, name: &str) -> Option<I> {
        self.ids.get(name).copied()
    }

    pub fn name(&self, id: I) -> Option<&str> {
        self.names.get(id.index() as usize).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl<I: SymbolId> Default for Symbols<I> {
    fn default() -> Self {
        Self::new()
    }
}

/// Labels and relationship types seen by one graph.
#[derive(Debug, Clone, Default)]
pub struct Vocabulary {
    pub labels: Symbols<LabelId>,
    pub rel_types: Symbols<RelTypeId>,
}

// ============================================================================
// Snapshots
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: String,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub properties: Properties,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipRecord {
    #[serde(rename = "type")]
    pub rel_type: String,
    /// Record id of the start node.
    pub start: String,
    /// Record id of the end node.
    pub end: String,
    #[serde(default)]
    pub properties: Properties,
}

/// Serialized graph: `{"nodes": [...], "relationships": [...]}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    #[serde(default)]
    pub nodes: Vec<NodeRecord>,
    #[serde(default)]
    pub relationships: Vec<RelationshipRecord>,
}

// ============================================================================
// Store
// ============================================================================

struct StoredNode {
    node: Node,
    labels: Vec<LabelId>,
}

struct StoredRel {
    rel: Relationship,
    rel_type: RelTypeId,
    start: u32,
    end: u32,
}

pub struct GraphStore {
    vocabulary: Vocabulary,
    nodes: Vec<StoredNode>,
    relationships: Vec<StoredRel>,
    by_element_id: AHashMap<String, u32>,
    /// label -> node ids
    label_index: AHashMap<LabelId, RoaringBitmap>,
    /// `kind` property -> node ids
    kind_index: AHashMap<String, RoaringBitmap>,
    /// node -> outgoing relationship ids
    outgoing: Vec<Vec<u32>>,
    /// node -> incoming relationship ids
    incoming: Vec<Vec<u32>>,
}

impl GraphStore {
    pub fn new() -> Self {
        Self {
            vocabulary: Vocabulary::default(),
            nodes: Vec::new(),
            relationships: Vec::new(),
            by_element_id: AHashMap::new(),
            label_index: AHashMap::new(),
            kind_index: AHashMap::new(),
            outgoing: Vec::new(),
            incoming: Vec::new(),
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn relationship_count(&self) -> usize {
        self.relationships.len()
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    /// Insert a node. Element ids must be unique.
    pub fn insert_node(&mut self, node: Node) -> Result<u32, GraphError> {
        if self.by_element_id.contains_key(&node.element_id) {
            return Err(GraphError::Snapshot(format!(
                "duplicate node id '{}'",
                node.element_id
            )));
        }
        let idx = self.nodes.len() as u32;
        let labels: Vec<LabelId> = node
            .labels
            .iter()
            .map(|l| self.vocabulary.labels.intern(l))
            .collect();
        for label in &labels {
            self.label_index.entry(*label).or_default().insert(idx);
        }
        if let Some(kind) = node.kind() {
            self.kind_index.entry(kind.to_string()).or_default().insert(idx);
        }
        self.by_element_id.insert(node.element_id.clone(), idx);
        self.nodes.push(StoredNode { node, labels });
        self.outgoing.push(Vec::new());
        self.incoming.push(Vec::new());
        Ok(idx)
    }

    /// Convenience: insert a node from a JSON property object.
    pub fn add_node(
        &mut self,
        element_id: &str,
        labels: &[&str],
        properties: Value,
    ) -> Result<u32, GraphError> {
        let mut node = Node::new(element_id);
        node.labels = labels.iter().map(|l| l.to_string()).collect();
        node.properties = props(properties);
        self.insert_node(node)
    }

    /// Insert a relationship between two existing nodes (by element id).
    pub fn add_relationship(
        &mut self,
        rel_type: &str,
        start: &str,
        end: &str,
        properties: Value,
    ) -> Result<u32, GraphError> {
        let start_idx = self.index_of(start)?;
        let end_idx = self.index_of(end)?;
        let idx = self.relationships.len() as u32;
        let rel = Relationship {
            element_id: format!("r{idx}"),
            rel_type: rel_type.to_string(),
            start: start.to_string(),
            end: end.to_string(),
            properties: props(properties),
        };
        let rel_type = self.vocabulary.rel_types.intern(rel_type);
        self.outgoing[start_idx as usize].push(idx);
        self.incoming[end_idx as usize].push(idx);
        self.relationships.push(StoredRel {
            rel,
            rel_type,
            start: start_idx,
            end: end_idx,
        });
        Ok(idx)
    }

    fn index_of(&self, element_id: &str) -> Result<u32, GraphError> {
        self.by_element_id
            .get(element_id)
            .copied()
            .ok_or_else(|| GraphError::Snapshot(format!("unknown node id '{element_id}'")))
    }

    // ------------------------------------------------------------------------
    // Snapshots
    // ------------------------------------------------------------------------

    pub fn from_snapshot(snapshot: GraphSnapshot) -> Result<Self, GraphError> {
        let mut store = Self::new();
        for record in snapshot.nodes {
            store.insert_node(Node {
                element_id: record.id,
                labels: record.labels,
                properties: record.properties,
            })?;
        }
        for record in snapshot.relationships {
            store.add_relationship(
                &record.rel_type,
                &record.start,
                &record.end,
                Value::Object(record.properties.into_iter().collect()),
            )?;
        }
        debug!(
            nodes = store.node_count(),
            relationships = store.relationship_count(),
            "graph snapshot loaded"
        );
        Ok(store)
    }

    pub fn from_json_str(json: &str) -> Result<Self, GraphError> {
        let snapshot: GraphSnapshot =
            serde_json::from_str(json).map_err(|e| GraphError::Snapshot(e.to_string()))?;
        Self::from_snapshot(snapshot)
    }

    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, GraphError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| GraphError::Snapshot(format!("{}: {e}", path.display())))?;
        Self::from_json_str(&text)
    }

    pub fn to_snapshot(&self) -> GraphSnapshot {
        GraphSnapshot {
            nodes: self
                .nodes
                .iter()
                .map(|n| NodeRecord {
                    id: n.node.element_id.clone(),
                    labels: n.node.labels.clone(),
                    properties: n.node.properties.clone(),
                })
                .collect(),
            relationships: self
                .relationships
                .iter()
                .map(|r| RelationshipRecord {
                    rel_type: r.rel.rel_type.clone(),
                    start: r.rel.start.clone(),
                    end: r.rel.end.clone(),
                    properties: r.rel.properties.clone(),
                })
                .collect(),
        }
    }

    // ------------------------------------------------------------------------
    // Index access
    // ------------------------------------------------------------------------

    pub fn node(&self, idx: u32) -> Option<&Node> {
        self.nodes.get(idx as usize).map(|n| &n.node)
    }

    pub fn relationship(&self, idx: u32) -> Option<&Relationship> {
        self.relationships.get(idx as usize).map(|r| &r.rel)
    }

    /// Node ids carrying `label`.
    pub fn nodes_with_label(&self, label: &str) -> RoaringBitmap {
        self.vocabulary
            .labels
            .get(label)
            .and_then(|id| self.label_index.get(&id))
            .cloned()
            .unwrap_or_default()
    }

    /// Node ids whose `kind` property equals `kind`.
    pub fn nodes_of_kind(&self, kind: &str) -> RoaringBitmap {
        self.kind_index.get(kind).cloned().unwrap_or_default()
    }

    pub(crate) fn all_nodes(&self) -> impl Iterator<Item = u32> {
        0..self.nodes.len() as u32
    }

    pub(crate) fn node_has_label(&self, idx: u32, label: &str) -> bool {
        match (self.vocabulary.labels.get(label), self.nodes.get(idx as usize)) {
            (Some(id), Some(n)) => n.labels.contains(&id),
            _ => false,
        }
    }

    pub(crate) fn rel_has_type(&self, idx: u32, rel_type: &str) -> bool {
        match (
            self.vocabulary.rel_types.get(rel_type),
            self.relationships.get(idx as usize),
        ) {
            (Some(id), Some(r)) => r.rel_type == id,
            _ => false,
        }
    }

    fn node_kind(&self, idx: u32) -> Option<&str> {
        self.nodes.get(idx as usize).and_then(|n| n.node.kind())
    }

    /// `(relationship, neighbour)` pairs around `idx` in insertion order.
    /// `Either` lists outgoing before incoming and reports self-loops once.
    pub(crate) fn incident(&self, idx: u32, direction: Direction) -> Vec<(u32, u32)> {
        let mut out = Vec::new();
        if matches!(direction, Direction::Outgoing | Direction::Either) {
            if let Some(rels) = self.outgoing.get(idx as usize) {
                out.extend(rels.iter().map(|&r| (r, self.relationships[r as usize].end)));
            }
        }
        if matches!(direction, Direction::Incoming | Direction::Either) {
            if let Some(rels) = self.incoming.get(idx as usize) {
                out.extend(
                    rels.iter()
                        .filter(|&&r| {
                            direction == Direction::Incoming
                                || self.relationships[r as usize].start != idx
                        })
                        .map(|&r| (r, self.relationships[r as usize].start)),
                );
            }
        }
        out
    }

    fn build_path(&self, nodes: &[u32], rels: &[u32]) -> GraphPath {
        GraphPath {
            nodes: nodes
                .iter()
                .filter_map(|&n| self.node(n).cloned())
                .collect(),
            relationships: rels
                .iter()
                .filter_map(|&r| self.relationship(r).cloned())
                .collect(),
        }
    }

    // ------------------------------------------------------------------------
    // Typed requests
    // ------------------------------------------------------------------------

    /// Execute chained-MATCH query text.
    pub fn query(&self, text: &str, params: &Params) -> Result<Vec<Row>, GraphError> {
        let query = chain::parse(text)?;
        chain::execute(self, &query, params)
    }

    /// All paths matching `pattern`, ordered by start node then expansion
    /// order.
    pub fn find_paths(&self, pattern: &PathPattern) -> Vec<GraphPath> {
        match pattern {
            PathPattern::Bounded(b) => {
                let direction = if b.directed {
                    Direction::Outgoing
                } else {
                    Direction::Either
                };
                let search = BoundedSearch {
                    store: self,
                    dest: &b.dest,
                    min_hops: b.min_hops.max(1),
                    max_hops: b.max_hops,
                    direction,
                    excluded: &b.excluded_kinds,
                    preferred: &b.preferred,
                };
                let mut out = Vec::new();
                for start in self.nodes_of_kind(&b.src).iter() {
                    let mut nodes = vec![start];
                    let mut rels = Vec::new();
                    search.extend(&mut nodes, &mut rels, &mut out);
                }
                out
            }
            PathPattern::Direct { src, dest } => {
                let mut out = Vec::new();
                for start in self.nodes_of_kind(src).iter() {
                    for (rel, other) in self.incident(start, Direction::Either) {
                        if other != start && self.node_kind(other) == Some(dest.as_str()) {
                            out.push(self.build_path(&[start, other], &[rel]));
                        }
                    }
                }
                out
            }
            PathPattern::Bridge { src, via, dest } => {
                let mut out = Vec::new();
                for start in self.nodes_of_kind(src).iter() {
                    for (r1, mid) in self.incident(start, Direction::Either) {
                        if self.node_kind(mid) != Some(via.as_str()) {
                            continue;
                        }
                        for (r2, end) in self.incident(mid, Direction::Either) {
                            if r2 != r1
                                && end != start
                                && self.node_kind(end) == Some(dest.as_str())
                            {
                                out.push(self.build_path(&[start, mid, end], &[r1, r2]));
                            }
                        }
                    }
                }
                out
            }
        }
    }

    /// The entity labelled `kind` whose `id` is `id`.
    pub fn find_entity(&self, kind: &str, id: &str) -> Option<&Node> {
        self.nodes_with_label(kind)
            .iter()
            .filter_map(|idx| self.node(idx))
            .find(|n| n.id().as_deref() == Some(id))
    }

    /// State snapshots of an entity accepted by the lookup's selector.
    pub fn find_states(&self, lookup: &StateLookup) -> Vec<Node> {
        let state_label = lookup.state_label();
        let mut out = Vec::new();
        for entity in self.nodes_with_label(&lookup.entity_kind).iter() {
            let matches_id = self
                .node(entity)
                .and_then(Node::id)
                .is_some_and(|id| id == lookup.entity_id);
            if !matches_id {
                continue;
            }
            for (rel, state) in self.incident(entity, Direction::Outgoing) {
                if !self.rel_has_type(rel, HAS_STATE) || !self.node_has_label(state, &state_label)
                {
                    continue;
                }
                let Some(validity) = self.validity(rel) else {
                    continue;
                };
                if lookup.selector.accepts(&validity, lookup.bounds) {
                    if let Some(node) = self.node(state) {
                        out.push(node.clone());
                    }
                    if out.len() >= lookup.limit {
                        return out;
                    }
                }
            }
        }
        out
    }

    fn validity(&self, rel: u32) -> Option<Interval> {
        let r = self.relationship(rel)?;
        let (tmin, tmax) = (r.str_prop("tmin")?, r.str_prop("tmax")?);
        match Interval::parse(tmin, tmax) {
            Ok(interval) => Some(interval),
            Err(e) => {
                warn!(relationship = %r.element_id, error = %e, "skipping state with unreadable validity");
                None
            }
        }
    }

    /// Kinds of metagraph nodes whose `category` is `NativeEntity` or
    /// `ExternalEntity`.
    pub fn catalog(&self) -> KindCatalog {
        let mut catalog = KindCatalog::default();
        for stored in &self.nodes {
            let node = &stored.node;
            let Some(kind) = node.kind() else {
                continue;
            };
            match node.str_prop("category") {
                Some("NativeEntity") => catalog.native.push(kind.to_string()),
                Some("ExternalEntity") => catalog.external.push(kind.to_string()),
                _ => {}
            }
        }
        for list in [&mut catalog.native, &mut catalog.external] {
            list.sort();
            list.dedup();
        }
        catalog
    }
}

impl Default for GraphStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Depth-first enumeration of simple paths within a hop window.
struct BoundedSearch<'a> {
    store: &'a GraphStore,
    dest: &'a str,
    min_hops: usize,
    max_hops: usize,
    direction: Direction,
    excluded: &'a [String],
    preferred: &'a [String],
}

impl BoundedSearch<'_> {
    fn extend(&self, nodes: &mut Vec<u32>, rels: &mut Vec<u32>, out: &mut Vec<GraphPath>) {
        let Some(&current) = nodes.last() else {
            return;
        };
        for (rel, next) in self.store.incident(current, self.direction) {
            if nodes.contains(&next) {
                continue;
            }
            nodes.push(next);
            rels.push(rel);
            let hops = rels.len();
            if hops >= self.min_hops
                && self.store.node_kind(next) == Some(self.dest)
                && self.interior_preferred(&nodes[1..nodes.len() - 1])
            {
                out.push(self.store.build_path(nodes, rels));
            }
            if hops < self.max_hops && !self.is_excluded(next) {
                self.extend(nodes, rels, out);
            }
            nodes.pop();
            rels.pop();
        }
    }

    fn is_excluded(&self, idx: u32) -> bool {
        self.store
            .node_kind(idx)
            .is_some_and(|k| self.excluded.iter().any(|e| e == k))
    }

    fn interior_preferred(&self, interior: &[u32]) -> bool {
        self.preferred.is_empty()
            || interior.iter().any(|&n| {
                self.store
                    .node_kind(n)
                    .is_some_and(|k| self.preferred.iter().any(|p| p == k))
            })
    }
}

#[async_trait]
impl GraphBackend for GraphStore {
    async fn run_query(&self, query: &str, params: &Params) -> Result<Vec<Row>, GraphError> {
        self.query(query, params)
    }

    async fn match_paths(&self, pattern: &PathPattern) -> Result<Vec<GraphPath>, GraphError> {
        Ok(self.find_paths(pattern))
    }

    async fn states(&self, lookup: &StateLookup) -> Result<Vec<Node>, GraphError> {
        Ok(self.find_states(lookup))
    }

    async fn entity(&self, kind: &str, id: &str) -> Result<Option<Node>, GraphError> {
        Ok(self.find_entity(kind, id).cloned())
    }

    async fn kind_catalog(&self) -> Result<KindCatalog, GraphError> {
        Ok(self.catalog())
    }
}
