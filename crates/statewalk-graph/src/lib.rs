//! Statewalk Graph: typed property-graph access for root-cause diagnosis
//!
//! The diagnosis pipeline reads two graphs:
//!
//! ```text
//! ┌──────────────────────────────┐        ┌──────────────────────────────┐
//! │          METAGRAPH           │        │          STATEGRAPH          │
//! │  one node per entity kind    │        │  Entity ──HasState(tmin,tmax)│
//! │  typed relationships (key)   │        │     │        ──► STATE       │
//! │  category: Native/External   │        │  Event ──ReferInternal──► …  │
//! └──────────────┬───────────────┘        └──────────────┬───────────────┘
//!                │ match_paths                            │ run_query / states
//!                └────────────────┐      ┌────────────────┘
//!                             ┌───▼──────▼───┐
//!                             │ GraphBackend │  (Neo4j HTTP | in-memory)
//!                             └──────────────┘
//! ```
//!
//! Both backends expose the same contract. Typed requests (`PathPattern`,
//! `StateLookup`) are rendered to Cypher for Neo4j and executed natively by
//! [`GraphStore`]. Free-form queries produced by the synthesis loop use the
//! chained-MATCH dialect in [`chain`], which the in-memory store parses and
//! executes itself.
//!
//! ## Module Organization
//!
//! - `model`: nodes, relationships, paths, result rows
//! - `identity`: identifying-field lookup per entity category
//! - `temporal`: validity intervals and instant parsing
//! - `backend`: the `GraphBackend` contract and its request types
//! - `cypher`: Cypher rendering for typed requests
//! - `chain`: chained-MATCH dialect (AST, parser, executor)
//! - `store`: indexed in-memory graph
//! - `neo4j`: Neo4j transactional HTTP backend (feature `neo4j`)

pub mod backend;
pub mod chain;
pub mod cypher;
pub mod error;
pub mod identity;
pub mod model;
#[cfg(feature = "neo4j")]
pub mod neo4j;
pub mod store;
pub mod temporal;

pub use backend::{
    BoundedPattern, GraphBackend, KindCatalog, PathPattern, StateLookup, TemporalSelector,
};
pub use chain::{ChainQuery, Clause};
pub use error::GraphError;
pub use identity::{effective_kind, identifying_value, EntityCategory};
pub use model::{props, GraphPath, GraphValue, Node, Params, Properties, Relationship, Row};
pub use store::{GraphSnapshot, GraphStore, NodeRecord, RelationshipRecord};
pub use temporal::{format_instant, parse_instant, Bounds, Instant, Interval};

/// Label of the relationship linking an entity to its state snapshots.
pub const HAS_STATE: &str = "HasState";

/// Kind tag carried by event nodes.
pub const EVENT_KIND: &str = "Event";

/// Kind tag carried by namespace nodes.
pub const NAMESPACE_KIND: &str = "Namespace";
