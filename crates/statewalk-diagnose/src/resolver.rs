//! Temporal state resolution for a single entity.

use crate::config::StateConfig;
use statewalk_graph::{
    Bounds, GraphBackend, GraphError, Instant, Interval, Node, StateLookup, TemporalSelector,
};
use tracing::{debug, info};

pub struct StateResolver<'a> {
    backend: &'a dyn GraphBackend,
    cap: usize,
    bounds: Bounds,
}

impl<'a> StateResolver<'a> {
    pub fn new(backend: &'a dyn GraphBackend, config: &StateConfig) -> Self {
        Self {
            backend,
            cap: config.cap,
            bounds: config.bounds,
        }
    }

    /// States valid at `instant`. Empty when the entity has none.
    pub async fn resolve_at(
        &self,
        kind: &str,
        id: &str,
        instant: Instant,
    ) -> Result<Vec<Node>, GraphError> {
        self.resolve(kind, id, TemporalSelector::At(instant)).await
    }

    /// States overlapping `window`.
    pub async fn resolve_window(
        &self,
        kind: &str,
        id: &str,
        window: Interval,
    ) -> Result<Vec<Node>, GraphError> {
        self.resolve(kind, id, TemporalSelector::Window(window)).await
    }

    async fn resolve(
        &self,
        kind: &str,
        id: &str,
        selector: TemporalSelector,
    ) -> Result<Vec<Node>, GraphError> {
        let lookup = StateLookup {
            entity_kind: kind.to_string(),
            entity_id: id.to_string(),
            selector,
            bounds: self.bounds,
            limit: self.cap,
        };
        let mut states = self.backend.states(&lookup).await?;
        states.truncate(self.cap);

        match states.len() {
            0 => info!(kind, id, "entity has no state in range"),
            1 => debug!(kind, id, "resolved state"),
            n => info!(kind, id, count = n, "entity has overlapping states"),
        }
        Ok(states)
    }
}
