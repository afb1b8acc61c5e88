//! Chained-MATCH query dialect.
//!
//! The subset of Cypher that query synthesis produces:
//!
//! ```text
//! MATCH (evt:EVENT)
//! WHERE evt.message CONTAINS 'configmap "es-conf" not found'
//! WITH evt
//! LIMIT 1
//! MATCH (n1:Event)-[r1:HasEvent]->(evt:EVENT)
//! WHERE r1.key = 'metadata_uid'
//! MATCH (n1)-[r2:ReferInternal]->(n2:Pod)
//! WHERE r2.key = 'involvedObject_uid'
//! RETURN evt, r1, n1, r2, n2
//! ```
//!
//! Queries are parsed into a [`ChainQuery`], scope-checked, and either
//! rendered back to text (Neo4j) or executed against a
//! [`GraphStore`](crate::store::GraphStore).

mod exec;
mod parser;

pub(crate) use exec::execute;
pub use parser::parse;

use crate::cypher::{label, quote};
use crate::error::GraphError;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub struct ChainQuery {
    pub clauses: Vec<Clause>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Clause {
    Match {
        patterns: Vec<PatternChain>,
        predicates: Vec<Predicate>,
    },
    With(Vec<String>),
    Limit(usize),
    Return {
        distinct: bool,
        items: Vec<ReturnItem>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct PatternChain {
    pub start: NodePattern,
    pub steps: Vec<(RelPattern, NodePattern)>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct NodePattern {
    pub alias: Option<String>,
    pub label: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Outgoing,
    Incoming,
    Either,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RelPattern {
    pub alias: Option<String>,
    pub rel_type: Option<String>,
    pub direction: Direction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Eq,
    Contains,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Value(Value),
    Param(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub alias: String,
    pub property: String,
    pub op: Op,
    pub value: Literal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReturnItem {
    pub alias: String,
    pub property: Option<String>,
}

impl ReturnItem {
    pub fn column(&self) -> String {
        match &self.property {
            Some(p) => format!("{}.{}", self.alias, p),
            None => self.alias.clone(),
        }
    }
}

// ============================================================================
// Builders
// ============================================================================

impl NodePattern {
    pub fn new(alias: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            alias: Some(alias.into()),
            label: Some(label.into()),
        }
    }
}

impl RelPattern {
    pub fn outgoing(alias: impl Into<String>, rel_type: impl Into<String>) -> Self {
        Self {
            alias: Some(alias.into()),
            rel_type: Some(rel_type.into()),
            direction: Direction::Outgoing,
        }
    }
}

impl Predicate {
    pub fn eq(alias: impl Into<String>, property: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            alias: alias.into(),
            property: property.into(),
            op: Op::Eq,
            value: Literal::Value(value.into()),
        }
    }

    pub fn contains(
        alias: impl Into<String>,
        property: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        Self {
            alias: alias.into(),
            property: property.into(),
            op: Op::Contains,
            value: Literal::Value(value.into()),
        }
    }
}

// ============================================================================
// Scope checking
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VarKind {
    Node,
    Rel,
}

fn declare(
    scope: &mut HashMap<String, VarKind>,
    alias: &Option<String>,
    kind: VarKind,
) -> Result<(), GraphError> {
    let Some(alias) = alias else {
        return Ok(());
    };
    match scope.get(alias) {
        Some(existing) if *existing != kind => Err(GraphError::Syntax(format!(
            "Type mismatch: `{alias}` defined as {existing:?}, used as {kind:?}"
        ))),
        _ => {
            scope.insert(alias.clone(), kind);
            Ok(())
        }
    }
}

fn require(scope: &HashMap<String, VarKind>, alias: &str) -> Result<(), GraphError> {
    if scope.contains_key(alias) {
        Ok(())
    } else {
        Err(GraphError::Syntax(format!("Variable `{alias}` not defined")))
    }
}

impl ChainQuery {
    /// Reject undefined variables, node/relationship alias clashes, and
    /// queries that do not conclude with `RETURN`.
    pub fn check_scope(&self) -> Result<(), GraphError> {
        let mut scope: HashMap<String, VarKind> = HashMap::new();
        let mut returned = false;
        for clause in &self.clauses {
            match clause {
                Clause::Match {
                    patterns,
                    predicates,
                } => {
                    if returned {
                        return Err(GraphError::Syntax("MATCH cannot follow RETURN".into()));
                    }
                    for chain in patterns {
                        declare(&mut scope, &chain.start.alias, VarKind::Node)?;
                        for (rel, node) in &chain.steps {
                            declare(&mut scope, &rel.alias, VarKind::Rel)?;
                            declare(&mut scope, &node.alias, VarKind::Node)?;
                        }
                    }
                    for p in predicates {
                        require(&scope, &p.alias)?;
                    }
                }
                Clause::With(aliases) => {
                    if returned {
                        return Err(GraphError::Syntax("WITH cannot follow RETURN".into()));
                    }
                    let mut next = HashMap::new();
                    for alias in aliases {
                        require(&scope, alias)?;
                        next.insert(alias.clone(), scope[alias]);
                    }
                    scope = next;
                }
                Clause::Limit(_) => {}
                Clause::Return { items, .. } => {
                    for item in items {
                        require(&scope, &item.alias)?;
                    }
                    returned = true;
                }
            }
        }
        if !returned {
            return Err(GraphError::Syntax(
                "Query cannot conclude with MATCH (must be a RETURN clause)".into(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Rendering
// ============================================================================

impl fmt::Display for NodePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        if let Some(alias) = &self.alias {
            write!(f, "{alias}")?;
        }
        if let Some(l) = &self.label {
            write!(f, ":{}", label(l))?;
        }
        write!(f, ")")
    }
}

impl fmt::Display for RelPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut inner = self.alias.clone().unwrap_or_default();
        if let Some(t) = &self.rel_type {
            inner.push(':');
            inner.push_str(&label(t));
        }
        match self.direction {
            Direction::Outgoing => write!(f, "-[{inner}]->"),
            Direction::Incoming => write!(f, "<-[{inner}]-"),
            Direction::Either => write!(f, "-[{inner}]-"),
        }
    }
}

impl fmt::Display for PatternChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.start)?;
        for (rel, node) in &self.steps {
            write!(f, "{rel}{node}")?;
        }
        Ok(())
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Value(Value::String(s)) => write!(f, "{}", quote(s)),
            Literal::Value(v) => write!(f, "{v}"),
            Literal::Param(name) => write!(f, "${name}"),
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self.op {
            Op::Eq => "=",
            Op::Contains => "CONTAINS",
        };
        write!(f, "{}.{} {} {}", self.alias, self.property, op, self.value)
    }
}

fn join<T: fmt::Display>(items: &[T], sep: &str) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(sep)
}

impl fmt::Display for Clause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Clause::Match {
                patterns,
                predicates,
            } => {
                write!(f, "MATCH {}", join(patterns, ", "))?;
                if !predicates.is_empty() {
                    write!(f, "\nWHERE {}", join(predicates, " AND "))?;
                }
                Ok(())
            }
            Clause::With(aliases) => write!(f, "WITH {}", aliases.join(", ")),
            Clause::Limit(n) => write!(f, "LIMIT {n}"),
            Clause::Return { distinct, items } => {
                let cols: Vec<String> = items.iter().map(ReturnItem::column).collect();
                if *distinct {
                    write!(f, "RETURN DISTINCT {}", cols.join(", "))
                } else {
                    write!(f, "RETURN {}", cols.join(", "))
                }
            }
        }
    }
}

impl fmt::Display for ChainQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", join(&self.clauses, "\n"))
    }
}

impl std::str::FromStr for ChainQuery {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse(s)
    }
}
