//! Typed shortest-path discovery over the metagraph.
//!
//! Four strategies are tried in order and the first non-empty one wins:
//!
//! 1. directed, 1..=3 hops, no excluded kinds inside, preferred kinds honoured
//! 2. the same, direction ignored
//! 3. any single relationship between the kinds
//! 4. `src - Namespace - dest`
//!
//! Only the shortest paths of the winning strategy are returned.

use crate::config::PathConfig;
use serde::{Deserialize, Serialize};
use statewalk_graph::{BoundedPattern, GraphBackend, GraphError, GraphPath, PathPattern};
use std::fmt;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    DirectedBounded,
    UndirectedBounded,
    Direct,
    Bridge,
}

impl Strategy {
    pub const ALL: [Strategy; 4] = [
        Strategy::DirectedBounded,
        Strategy::UndirectedBounded,
        Strategy::Direct,
        Strategy::Bridge,
    ];
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Strategy::DirectedBounded => "directed bounded",
            Strategy::UndirectedBounded => "undirected bounded",
            Strategy::Direct => "single hop",
            Strategy::Bridge => "namespace bridge",
        })
    }
}

/// Paths found by the first productive strategy.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PathDiscovery {
    pub strategy: Option<Strategy>,
    pub paths: Vec<GraphPath>,
}

impl PathDiscovery {
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

pub struct PathFinder<'a> {
    backend: &'a dyn GraphBackend,
    config: &'a PathConfig,
}

impl<'a> PathFinder<'a> {
    pub fn new(backend: &'a dyn GraphBackend, config: &'a PathConfig) -> Self {
        Self { backend, config }
    }

    /// The request issued for `strategy`.
    pub fn pattern(
        &self,
        strategy: Strategy,
        src: &str,
        dest: &str,
        preferred: &[String],
    ) -> PathPattern {
        let bounded = |directed| {
            PathPattern::Bounded(BoundedPattern {
                src: src.to_string(),
                dest: dest.to_string(),
                min_hops: self.config.min_hops,
                max_hops: self.config.max_hops,
                directed,
                excluded_kinds: self.config.excluded_kinds.clone(),
                preferred: preferred
                    .iter()
                    .filter(|k| **k != self.config.bridge_kind)
                    .cloned()
                    .collect(),
            })
        };
        match strategy {
            Strategy::DirectedBounded => bounded(true),
            Strategy::UndirectedBounded => bounded(false),
            Strategy::Direct => PathPattern::Direct {
                src: src.to_string(),
                dest: dest.to_string(),
            },
            Strategy::Bridge => PathPattern::Bridge {
                src: src.to_string(),
                via: self.config.bridge_kind.clone(),
                dest: dest.to_string(),
            },
        }
    }

    /// Shortest paths from `src` to `dest`. An empty discovery means no
    /// explainable path exists.
    pub async fn find(
        &self,
        src: &str,
        dest: &str,
        preferred: &[String],
    ) -> Result<PathDiscovery, GraphError> {
        for strategy in Strategy::ALL {
            let pattern = self.pattern(strategy, src, dest, preferred);
            let paths = self.backend.match_paths(&pattern).await?;
            if paths.is_empty() {
                debug!(src, dest, %strategy, "no path");
                continue;
            }
            let paths = shortest(paths);
            info!(src, dest, %strategy, count = paths.len(), hops = paths[0].len(), "found paths");
            for path in &paths {
                debug!(path = %path, "candidate path");
            }
            return Ok(PathDiscovery {
                strategy: Some(strategy),
                paths,
            });
        }
        warn!(src, dest, "no path between kinds under any strategy");
        Ok(PathDiscovery::default())
    }
}

/// Keep only the paths of minimal length.
pub fn shortest(paths: Vec<GraphPath>) -> Vec<GraphPath> {
    let Some(min) = paths.iter().map(GraphPath::len).min() else {
        return paths;
    };
    paths.into_iter().filter(|p| p.len() == min).collect()
}
