//! Binding-table execution of chained-MATCH queries over a [`GraphStore`].
//!
//! Each clause maps a table of bindings (alias → node/relationship) to a new
//! table. Relationships are unique within one `MATCH`, as in Cypher. A
//! predicate over a missing property is false.

use super::{ChainQuery, Clause, Literal, NodePattern, Op, PatternChain, Predicate, RelPattern};
use crate::error::GraphError;
use crate::model::{GraphValue, Params, Row};
use crate::store::GraphStore;
use ahash::AHashMap;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bound {
    Node(u32),
    Rel(u32),
}

type Binding = AHashMap<String, Bound>;

pub(crate) fn execute(
    store: &GraphStore,
    query: &ChainQuery,
    params: &Params,
) -> Result<Vec<Row>, GraphError> {
    let mut table: Vec<Binding> = vec![Binding::new()];
    let mut rows: Option<Vec<Row>> = None;

    for clause in &query.clauses {
        match clause {
            Clause::Match {
                patterns,
                predicates,
            } => {
                let matcher = Matcher {
                    store,
                    predicates,
                    params,
                };
                let mut next = Vec::new();
                for binding in &table {
                    matcher.run(binding, patterns, &mut next)?;
                }
                table = next;
            }
            Clause::With(aliases) => {
                table = table
                    .into_iter()
                    .map(|b| {
                        aliases
                            .iter()
                            .filter_map(|a| b.get(a).map(|v| (a.clone(), *v)))
                            .collect()
                    })
                    .collect();
            }
            Clause::Limit(n) => match rows.as_mut() {
                Some(rows) => rows.truncate(*n),
                None => table.truncate(*n),
            },
            Clause::Return { distinct, items } => {
                let mut out: Vec<Row> = Vec::with_capacity(table.len());
                for binding in &table {
                    let mut row = Row::new();
                    for item in items {
                        let bound = binding.get(&item.alias).copied().ok_or_else(|| {
                            GraphError::Execution(format!("Variable `{}` not bound", item.alias))
                        })?;
                        row.push(item.column(), project(store, bound, item.property.as_deref()));
                    }
                    if !*distinct || !out.contains(&row) {
                        out.push(row);
                    }
                }
                rows = Some(out);
            }
        }
    }

    rows.ok_or_else(|| GraphError::Execution("query produced no RETURN".into()))
}

fn project(store: &GraphStore, bound: Bound, property: Option<&str>) -> GraphValue {
    match (bound, property) {
        (Bound::Node(n), None) => store
            .node(n)
            .cloned()
            .map_or(GraphValue::Scalar(Value::Null), GraphValue::Node),
        (Bound::Rel(r), None) => store
            .relationship(r)
            .cloned()
            .map_or(GraphValue::Scalar(Value::Null), GraphValue::Relationship),
        (bound, Some(key)) => {
            GraphValue::Scalar(property_of(store, bound, key).cloned().unwrap_or(Value::Null))
        }
    }
}

fn property_of<'a>(store: &'a GraphStore, bound: Bound, key: &str) -> Option<&'a Value> {
    match bound {
        Bound::Node(n) => store.node(n)?.properties.get(key),
        Bound::Rel(r) => store.relationship(r)?.properties.get(key),
    }
}

struct Matcher<'a> {
    store: &'a GraphStore,
    predicates: &'a [Predicate],
    params: &'a Params,
}

impl Matcher<'_> {
    /// Extend `seed` with every match of `patterns`, appending to `out`.
    fn run(
        &self,
        seed: &Binding,
        patterns: &[PatternChain],
        out: &mut Vec<Binding>,
    ) -> Result<(), GraphError> {
        // predicates over aliases bound by earlier clauses
        for (alias, bound) in seed {
            if !self.admits(alias, *bound)? {
                return Ok(());
            }
        }
        let mut binding = seed.clone();
        let mut used = Vec::new();
        self.match_chains(patterns, &mut binding, &mut used, out)
    }

    fn match_chains(
        &self,
        chains: &[PatternChain],
        binding: &mut Binding,
        used: &mut Vec<u32>,
        out: &mut Vec<Binding>,
    ) -> Result<(), GraphError> {
        let Some((chain, rest)) = chains.split_first() else {
            out.push(binding.clone());
            return Ok(());
        };
        for start in self.node_candidates(&chain.start, binding) {
            let added = self.bind(&chain.start.alias, Bound::Node(start), binding)?;
            if let Some(added) = added {
                self.match_steps(start, &chain.steps, rest, binding, used, out)?;
                if added {
                    Self::unbind(&chain.start.alias, binding);
                }
            }
        }
        Ok(())
    }

    fn match_steps(
        &self,
        current: u32,
        steps: &[(RelPattern, NodePattern)],
        rest: &[PatternChain],
        binding: &mut Binding,
        used: &mut Vec<u32>,
        out: &mut Vec<Binding>,
    ) -> Result<(), GraphError> {
        let Some(((rel_pat, node_pat), remaining)) = steps.split_first() else {
            return self.match_chains(rest, binding, used, out);
        };
        for (rel, next) in self.store.incident(current, rel_pat.direction) {
            if used.contains(&rel) {
                continue;
            }
            if let Some(t) = &rel_pat.rel_type {
                if !self.store.rel_has_type(rel, t) {
                    continue;
                }
            }
            if let Some(l) = &node_pat.label {
                if !self.store.node_has_label(next, l) {
                    continue;
                }
            }
            let Some(rel_added) = self.bind(&rel_pat.alias, Bound::Rel(rel), binding)? else {
                continue;
            };
            if let Some(node_added) = self.bind(&node_pat.alias, Bound::Node(next), binding)? {
                used.push(rel);
                self.match_steps(next, remaining, rest, binding, used, out)?;
                used.pop();
                if node_added {
                    Self::unbind(&node_pat.alias, binding);
                }
            }
            if rel_added {
                Self::unbind(&rel_pat.alias, binding);
            }
        }
        Ok(())
    }

    fn node_candidates(&self, pattern: &NodePattern, binding: &Binding) -> Vec<u32> {
        if let Some(Bound::Node(n)) = pattern.alias.as_ref().and_then(|a| binding.get(a)) {
            let fits = pattern
                .label
                .as_ref()
                .map_or(true, |l| self.store.node_has_label(*n, l));
            return if fits { vec![*n] } else { Vec::new() };
        }
        match &pattern.label {
            Some(l) => self.store.nodes_with_label(l).iter().collect(),
            None => self.store.all_nodes().collect(),
        }
    }

    /// Bind `alias` to `value`.
    ///
    /// Returns `Some(true)` when newly bound, `Some(false)` when already bound
    /// to the same value, `None` when the binding conflicts or a predicate
    /// rejects it.
    fn bind(
        &self,
        alias: &Option<String>,
        value: Bound,
        binding: &mut Binding,
    ) -> Result<Option<bool>, GraphError> {
        let Some(alias) = alias else {
            return Ok(Some(false));
        };
        match binding.get(alias) {
            Some(existing) if *existing == value => Ok(Some(false)),
            Some(_) => Ok(None),
            None => {
                if !self.admits(alias, value)? {
                    return Ok(None);
                }
                binding.insert(alias.clone(), value);
                Ok(Some(true))
            }
        }
    }

    fn unbind(alias: &Option<String>, binding: &mut Binding) {
        if let Some(alias) = alias {
            binding.remove(alias);
        }
    }

    fn admits(&self, alias: &str, value: Bound) -> Result<bool, GraphError> {
        for p in self.predicates.iter().filter(|p| p.alias == alias) {
            let expected = self.resolve(&p.value)?;
            let Some(actual) = property_of(self.store, value, &p.property) else {
                return Ok(false);
            };
            let ok = match p.op {
                Op::Eq => values_equal(actual, expected),
                Op::Contains => match (actual.as_str(), expected.as_str()) {
                    (Some(haystack), Some(needle)) => haystack.contains(needle),
                    _ => false,
                },
            };
            if !ok {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn resolve<'v>(&'v self, literal: &'v Literal) -> Result<&'v Value, GraphError> {
        match literal {
            Literal::Value(v) => Ok(v),
            Literal::Param(name) => self
                .params
                .get(name)
                .ok_or_else(|| GraphError::Execution(format!("Expected parameter(s): {name}"))),
        }
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

#[cfg(test)]
mod tests {
    use crate::model::Params;
    use crate::store::GraphStore;
    use serde_json::json;

    fn stategraph() -> GraphStore {
        let mut g = GraphStore::new();
        g.add_node(
            "evt-state",
            &["EVENT"],
            json!({"message": "persistentvolumeclaim \"data-pvc\" not found", "timestamp": "2020-12-12T06:00:00Z"}),
        )
        .unwrap();
        g.add_node("evt", &["Event"], json!({"kind": "Event", "id": "e1"}))
            .unwrap();
        g.add_node("pod", &["Pod"], json!({"kind": "Pod", "id": "p1"})).unwrap();
        g.add_node("other", &["Pod"], json!({"kind": "Pod", "id": "p2"}))
            .unwrap();
        g.add_relationship("HasEvent", "evt", "evt-state", json!({"key": "metadata_uid"}))
            .unwrap();
        g.add_relationship(
            "ReferInternal",
            "evt",
            "pod",
            json!({"key": "involvedObject_uid"}),
        )
        .unwrap();
        g
    }

    #[test]
    fn test_chained_match_returns_alternating_columns() {
        let g = stategraph();
        let rows = g
            .query(
                "MATCH (evt:EVENT) WHERE evt.message CONTAINS 'data-pvc' WITH evt LIMIT 1
                 MATCH (n1:Event)-[r1:HasEvent]->(evt:EVENT) WHERE r1.key = 'metadata_uid'
                 MATCH (n1)-[r2:ReferInternal]->(n2:Pod) WHERE r2.key = 'involvedObject_uid'
                 RETURN evt, r1, n1, r2, n2",
                &Params::new(),
            )
            .unwrap();
        assert_eq!(rows.len(), 1);
        let columns: Vec<&str> = rows[0].columns.iter().map(|(c, _)| c.as_str()).collect();
        assert_eq!(columns, vec!["evt", "r1", "n1", "r2", "n2"]);
        assert_eq!(rows[0].terminal_node().and_then(|n| n.id()).as_deref(), Some("p1"));
    }

    #[test]
    fn test_no_match_yields_empty() {
        let g = stategraph();
        let rows = g
            .query(
                "MATCH (evt:EVENT) WHERE evt.message CONTAINS 'secret' RETURN evt",
                &Params::new(),
            )
            .unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_params_and_missing_param() {
        let g = stategraph();
        let mut params = Params::new();
        params.insert("podId".into(), json!("p2"));
        let rows = g
            .query("MATCH (p:Pod) WHERE p.id = $podId RETURN p.id", &params)
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("p.id").and_then(|v| v.as_scalar()), Some(&json!("p2")));

        let err = g
            .query("MATCH (p:Pod) WHERE p.id = $podId RETURN p", &Params::new())
            .unwrap_err();
        assert!(!err.is_syntax());
    }

    #[test]
    fn test_relationship_unique_within_match() {
        let mut g = GraphStore::new();
        g.add_node("a", &["A"], json!({})).unwrap();
        g.add_node("b", &["B"], json!({})).unwrap();
        g.add_relationship("T", "a", "b", json!({})).unwrap();
        let rows = g
            .query("MATCH (x:A)-[r:T]-(y:B)-[s:T]-(z:A) RETURN x, z", &Params::new())
            .unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_distinct_and_trailing_limit() {
        let g = stategraph();
        let rows = g
            .query("MATCH (p:Pod) RETURN DISTINCT p.kind", &Params::new())
            .unwrap();
        assert_eq!(rows.len(), 1);
        let rows = g.query("MATCH (p:Pod) RETURN p LIMIT 1", &Params::new()).unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn test_missing_property_is_false() {
        let g = stategraph();
        let rows = g
            .query("MATCH (p:Pod) WHERE p.nodeName = 'node-1' RETURN p", &Params::new())
            .unwrap();
        assert!(rows.is_empty());
    }
}
