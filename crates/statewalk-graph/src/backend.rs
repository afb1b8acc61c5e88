//! The graph backend contract.

use crate::error::GraphError;
use crate::model::{GraphPath, Node, Params, Row};
use crate::temporal::{Bounds, Instant, Interval};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

// ============================================================================
// Path patterns
// ============================================================================

/// Hop-bounded simple path between two kinds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundedPattern {
    pub src: String,
    pub dest: String,
    pub min_hops: usize,
    pub max_hops: usize,
    /// Follow relationship direction when true.
    pub directed: bool,
    /// Kinds that may not appear strictly between the endpoints.
    pub excluded_kinds: Vec<String>,
    /// When non-empty, at least one interior node must have one of these kinds.
    pub preferred: Vec<String>,
}

/// A typed path request against the metagraph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PathPattern {
    Bounded(BoundedPattern),
    /// Any single relationship between the kinds, direction ignored.
    Direct { src: String, dest: String },
    /// `src - via - dest`, direction ignored.
    Bridge {
        src: String,
        via: String,
        dest: String,
    },
}

impl PathPattern {
    pub fn src(&self) -> &str {
        match self {
            PathPattern::Bounded(b) => &b.src,
            PathPattern::Direct { src, .. } | PathPattern::Bridge { src, .. } => src,
        }
    }

    pub fn dest(&self) -> &str {
        match self {
            PathPattern::Bounded(b) => &b.dest,
            PathPattern::Direct { dest, .. } | PathPattern::Bridge { dest, .. } => dest,
        }
    }
}

// ============================================================================
// State lookups
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TemporalSelector {
    /// States whose interval contains the instant.
    At(Instant),
    /// States whose interval overlaps the window.
    Window(Interval),
}

impl TemporalSelector {
    pub fn accepts(&self, validity: &Interval, bounds: Bounds) -> bool {
        match self {
            TemporalSelector::At(t) => validity.contains(*t, bounds),
            TemporalSelector::Window(w) => validity.overlaps(w, bounds),
        }
    }
}

/// State snapshots of one entity, selected in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateLookup {
    /// Effective kind of the entity; the state label is its upper-case form.
    pub entity_kind: String,
    pub entity_id: String,
    pub selector: TemporalSelector,
    pub bounds: Bounds,
    pub limit: usize,
}

impl StateLookup {
    pub fn state_label(&self) -> String {
        self.entity_kind.to_uppercase()
    }
}

// ============================================================================
// Kind catalog
// ============================================================================

/// Native and external kinds declared by the metagraph, each sorted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindCatalog {
    pub native: Vec<String>,
    pub external: Vec<String>,
}

impl KindCatalog {
    pub fn contains(&self, kind: &str) -> bool {
        self.native.iter().any(|k| k == kind) || self.external.iter().any(|k| k == kind)
    }

    pub fn is_empty(&self) -> bool {
        self.native.is_empty() && self.external.is_empty()
    }
}

// ============================================================================
// Backend trait
// ============================================================================

/// Read-only access to a property graph.
///
/// `run_query` accepts query text; the typed methods carry the same
/// semantics on every backend whether rendered to Cypher or executed
/// natively.
#[async_trait]
pub trait GraphBackend: Send + Sync {
    /// Execute query text.
    async fn run_query(&self, query: &str, params: &Params) -> Result<Vec<Row>, GraphError>;

    /// All paths matching a typed pattern.
    async fn match_paths(&self, pattern: &PathPattern) -> Result<Vec<GraphPath>, GraphError>;

    /// State snapshots of an entity (at most `lookup.limit`).
    async fn states(&self, lookup: &StateLookup) -> Result<Vec<Node>, GraphError>;

    /// The entity node labelled `kind` with the given `id`.
    async fn entity(&self, kind: &str, id: &str) -> Result<Option<Node>, GraphError>;

    /// Native/external kinds declared by the graph.
    async fn kind_catalog(&self) -> Result<KindCatalog, GraphError>;
}
