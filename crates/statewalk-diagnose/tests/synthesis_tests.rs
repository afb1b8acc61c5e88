//! Path Finding and Query Synthesis E2E Tests

mod common;

use async_trait::async_trait;
use common::*;
use parking_lot::Mutex;
use statewalk_diagnose::config::PathConfig;
use statewalk_diagnose::*;
use statewalk_graph::{
    GraphBackend, GraphError, GraphPath, GraphStore, KindCatalog, Node, Params, PathPattern, Row,
    StateLookup,
};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Records every path request before delegating to the store.
struct CountingBackend {
    inner: GraphStore,
    requests: Mutex<Vec<PathPattern>>,
}

impl CountingBackend {
    fn new(inner: GraphStore) -> Self {
        Self {
            inner,
            requests: Mutex::new(Vec::new()),
        }
    }

    fn requests(&self) -> Vec<PathPattern> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl GraphBackend for CountingBackend {
    async fn run_query(&self, query: &str, params: &Params) -> Result<Vec<Row>, GraphError> {
        self.inner.run_query(query, params).await
    }

    async fn match_paths(&self, pattern: &PathPattern) -> Result<Vec<GraphPath>, GraphError> {
        self.requests.lock().push(pattern.clone());
        self.inner.match_paths(pattern).await
    }

    async fn states(&self, lookup: &StateLookup) -> Result<Vec<Node>, GraphError> {
        self.inner.states(lookup).await
    }

    async fn entity(&self, kind: &str, id: &str) -> Result<Option<Node>, GraphError> {
        self.inner.entity(kind, id).await
    }

    async fn kind_catalog(&self) -> Result<KindCatalog, GraphError> {
        self.inner.kind_catalog().await
    }
}

/// Replies with a fixed list of queries, repeating the last one.
struct Canned {
    queries: Vec<&'static str>,
    calls: AtomicUsize,
    feedback: Mutex<Vec<(bool, String)>>,
}

impl Canned {
    fn new(queries: Vec<&'static str>) -> Self {
        Self {
            queries,
            calls: AtomicUsize::new(0),
            feedback: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QuerySynthesizer for Canned {
    fn name(&self) -> &'static str {
        "canned"
    }

    async fn synthesize(&self, _metapath: &Metapath, _message: &str) -> Result<String, DiagnoseError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        let idx = n.min(self.queries.len() - 1);
        Ok(self.queries[idx].to_string())
    }

    async fn report_failure(&self, syntax: bool, detail: &str) -> Result<(), DiagnoseError> {
        self.feedback.lock().push((syntax, detail.to_string()));
        Ok(())
    }
}

/// The template, counted.
#[derive(Default)]
struct CountingTemplate {
    calls: AtomicUsize,
}

#[async_trait]
impl QuerySynthesizer for CountingTemplate {
    fn name(&self) -> &'static str {
        "template"
    }

    async fn synthesize(&self, metapath: &Metapath, message: &str) -> Result<String, DiagnoseError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        TemplateSynthesizer.synthesize(metapath, message).await
    }
}

const POD_ONLY_QUERY: &str = "MATCH (evt:EVENT)
WHERE evt.message CONTAINS 'No such file'
MATCH (n1:Event)-[r1:HasEvent]->(evt:EVENT)
MATCH (n1:Event)-[r2:ReferInternal]->(n2:Pod)
RETURN evt, r1, n1, r2, n2";

const MISSING_PARAM_QUERY: &str = "MATCH (evt:EVENT) WHERE evt.message CONTAINS $message RETURN evt";

// ============================================================================
// Path Finder Tests
// ============================================================================

#[tokio::test]
async fn test_first_productive_strategy_stops_search() {
    let backend = CountingBackend::new(metagraph());
    let config = PathConfig::default();
    let discovery = PathFinder::new(&backend, &config)
        .find("Pod", "nfs", &[])
        .await
        .unwrap();

    assert_eq!(discovery.strategy, Some(Strategy::DirectedBounded));
    assert_eq!(discovery.paths.len(), 1);
    assert_eq!(
        discovery.paths[0].kinds(),
        vec!["Pod", "PersistentVolumeClaim", "PersistentVolume", "nfs"]
    );
    assert_eq!(backend.requests().len(), 1, "later strategies never issued");
}

#[tokio::test]
async fn test_reversed_kinds_need_undirected_search() {
    let backend = CountingBackend::new(metagraph());
    let config = PathConfig::default();
    let discovery = PathFinder::new(&backend, &config)
        .find("nfs", "Pod", &[])
        .await
        .unwrap();
    assert_eq!(discovery.strategy, Some(Strategy::UndirectedBounded));
    assert_eq!(backend.requests().len(), 2);
}

#[tokio::test]
async fn test_namespace_bridge_is_last_resort() {
    let backend = CountingBackend::new(metagraph());
    let config = PathConfig::default();
    let discovery = PathFinder::new(&backend, &config)
        .find("Pod", "ConfigMap", &[])
        .await
        .unwrap();

    // Namespace may not sit inside a bounded path, and no edge joins the kinds.
    assert_eq!(discovery.strategy, Some(Strategy::Bridge));
    assert_eq!(discovery.paths[0].kinds(), vec!["Pod", "Namespace", "ConfigMap"]);
    let requests = backend.requests();
    assert_eq!(requests.len(), 4);
    assert!(matches!(requests[2], PathPattern::Direct { .. }));
}

#[tokio::test]
async fn test_no_path_under_any_strategy() {
    let backend = CountingBackend::new(metagraph());
    let config = PathConfig::default();
    let discovery = PathFinder::new(&backend, &config)
        .find("Pod", "Secret", &[])
        .await
        .unwrap();
    assert!(discovery.is_empty());
    assert_eq!(discovery.strategy, None);
    assert_eq!(backend.requests().len(), 4);
}

#[tokio::test]
async fn test_preferred_kind_restricts_bounded_paths() {
    let backend = CountingBackend::new(metagraph());
    let config = PathConfig::default();
    let discovery = PathFinder::new(&backend, &config)
        .find("Pod", "nfs", &["ConfigMap".to_string()])
        .await
        .unwrap();
    // no bounded path passes through a ConfigMap, and no other strategy joins Pod and nfs
    assert!(discovery.is_empty());
}

// ============================================================================
// Synthesis Loop Tests
// ============================================================================

#[tokio::test]
async fn test_three_syntax_failures_invoke_fallback_once() {
    let store = stategraph();
    let generative = Canned::new(vec![BROKEN_QUERY]);
    let template = CountingTemplate::default();
    let metapath = nfs_metapath();

    let synthesis = SynthesisLoop::new(&store, &generative, &template, 3)
        .run(&metapath, MESSAGE)
        .await
        .unwrap();

    assert_eq!(generative.calls(), 3);
    assert_eq!(template.calls.load(Ordering::SeqCst), 1);
    assert_eq!(synthesis.attempts, 3);

    let feedback = generative.feedback.lock().clone();
    assert_eq!(feedback.len(), 2, "no repair request after the last attempt");
    assert!(feedback.iter().all(|(syntax, _)| *syntax));

    let fallback = synthesis.fallback_query.as_deref().unwrap();
    assert_eq!(fallback.matches("MATCH").count(), metapath.segments.len() + 1);
    assert_eq!(synthesis.rows.len(), 1);
    assert_eq!(synthesis.query.as_deref(), Some(BROKEN_QUERY));
}

#[tokio::test]
async fn test_repaired_query_stops_loop() {
    let store = stategraph();
    let good = TemplateSynthesizer
        .build(&nfs_metapath(), MESSAGE)
        .unwrap()
        .to_string();
    let good: &'static str = Box::leak(good.into_boxed_str());
    let generative = Canned::new(vec![MISSING_PARAM_QUERY, good]);
    let template = CountingTemplate::default();

    let synthesis = SynthesisLoop::new(&store, &generative, &template, 3)
        .run(&nfs_metapath(), MESSAGE)
        .await
        .unwrap();

    assert_eq!(synthesis.attempts, 2);
    assert!(!synthesis.used_fallback());
    assert_eq!(template.calls.load(Ordering::SeqCst), 0);
    let feedback = generative.feedback.lock().clone();
    assert_eq!(feedback.len(), 1);
    assert!(!feedback[0].0, "execution errors are not syntax errors");
    assert!(feedback[0].1.contains("message"));
}

#[tokio::test]
async fn test_filtered_out_rows_trigger_fallback() {
    let store = stategraph();
    let generative = Canned::new(vec![POD_ONLY_QUERY]);
    let template = CountingTemplate::default();

    let synthesis = SynthesisLoop::new(&store, &generative, &template, 3)
        .run(&nfs_metapath(), MESSAGE)
        .await
        .unwrap();

    // the Pod is not named by the message, so its row is dropped
    assert_eq!(generative.calls(), 1);
    assert_eq!(template.calls.load(Ordering::SeqCst), 1);
    assert!(synthesis.used_fallback());
    assert_eq!(synthesis.rows.len(), 1);
    assert_eq!(
        synthesis.rows[0].terminal_node().and_then(Node::id).as_deref(),
        Some("nfs-1")
    );
}

#[tokio::test]
async fn test_fallback_without_rows_is_empty_not_error() {
    let store = stategraph();
    let generative = Canned::new(vec![BROKEN_QUERY]);
    let template = CountingTemplate::default();

    let synthesis = SynthesisLoop::new(&store, &generative, &template, 3)
        .run(&nfs_metapath(), "message nobody logged")
        .await
        .unwrap();
    assert!(synthesis.used_fallback());
    assert_eq!(synthesis.raw_rows, 0);
    assert!(synthesis.rows.is_empty());
}

// ============================================================================
// Filter Tests
// ============================================================================

#[test]
fn test_filter_keeps_rows_naming_their_destination() {
    let store = stategraph();
    let full = TemplateSynthesizer
        .build(&nfs_metapath(), MESSAGE)
        .unwrap()
        .to_string();
    let kept = store.query(&full, &Params::new()).unwrap();
    assert_eq!(kept.len(), 1);
    assert!(kept.iter().all(message_compatible));

    let pod_rows = store.query(POD_ONLY_QUERY, &Params::new()).unwrap();
    assert_eq!(pod_rows.len(), 1);
    assert!(!message_compatible(&pod_rows[0]));
    assert!(filter_compatible(pod_rows).is_empty());
}
