use proptest::prelude::*;
use serde_json::json;
use statewalk_graph::{
    BoundedPattern, Bounds, GraphStore, Interval, PathPattern, StateLookup, TemporalSelector,
    HAS_STATE,
};

const KINDS: &[&str] = &["A", "B", "C", "Event", "Namespace"];
const MAX_NODES: usize = 9;

fn graph_strategy() -> impl Strategy<Value = (Vec<usize>, Vec<(usize, usize)>)> {
    (2usize..=MAX_NODES).prop_flat_map(|n| {
        (
            prop::collection::vec(0usize..KINDS.len(), n),
            prop::collection::vec((0usize..n, 0usize..n), 0..n * 3),
        )
    })
}

fn build(kinds: &[usize], edges: &[(usize, usize)]) -> GraphStore {
    let mut g = GraphStore::new();
    for (i, k) in kinds.iter().enumerate() {
        let kind = KINDS[*k];
        g.add_node(&format!("n{i}"), &[kind], json!({"kind": kind}))
            .unwrap();
    }
    for (from, to) in edges {
        g.add_relationship("T", &format!("n{from}"), &format!("n{to}"), json!({"key": "k"}))
            .unwrap();
    }
    g
}

fn bounded(directed: bool, preferred: Vec<String>) -> PathPattern {
    PathPattern::Bounded(BoundedPattern {
        src: "A".into(),
        dest: "C".into(),
        min_hops: 1,
        max_hops: 3,
        directed,
        excluded_kinds: vec!["Event".into(), "Namespace".into()],
        preferred,
    })
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        failure_persistence: None,
        ..ProptestConfig::default()
    })]

    #[test]
    fn bounded_paths_are_simple_and_avoid_excluded_interior(
        (kinds, edges) in graph_strategy(),
        directed in any::<bool>(),
    ) {
        let g = build(&kinds, &edges);
        for path in g.find_paths(&bounded(directed, vec![])) {
            prop_assert!(path.is_simple());
            prop_assert!((1..=3).contains(&path.len()));
            prop_assert_eq!(path.nodes.len(), path.len() + 1);
            prop_assert_eq!(path.start().and_then(|n| n.kind()), Some("A"));
            prop_assert_eq!(path.end().and_then(|n| n.kind()), Some("C"));
            for node in path.interior() {
                prop_assert!(node.kind() != Some("Event") && node.kind() != Some("Namespace"));
            }
        }
    }

    #[test]
    fn directed_paths_follow_stored_direction((kinds, edges) in graph_strategy()) {
        let g = build(&kinds, &edges);
        for path in g.find_paths(&bounded(true, vec![])) {
            for (i, rel) in path.relationships.iter().enumerate() {
                prop_assert_eq!(&rel.start, &path.nodes[i].element_id);
                prop_assert_eq!(&rel.end, &path.nodes[i + 1].element_id);
            }
        }
    }

    #[test]
    fn preferred_kinds_narrow_the_result((kinds, edges) in graph_strategy()) {
        let g = build(&kinds, &edges);
        let all = g.find_paths(&bounded(false, vec![]));
        let preferred = g.find_paths(&bounded(false, vec!["B".into()]));
        prop_assert!(preferred.len() <= all.len());
        for path in &preferred {
            prop_assert!(path.interior().iter().any(|n| n.kind() == Some("B")));
            prop_assert!(all.contains(path));
        }
    }

    #[test]
    fn path_search_is_deterministic((kinds, edges) in graph_strategy(), directed in any::<bool>()) {
        let g = build(&kinds, &edges);
        prop_assert_eq!(
            g.find_paths(&bounded(directed, vec![])),
            g.find_paths(&bounded(directed, vec![]))
        );
    }

    #[test]
    fn half_open_resolution_includes_tmin_excludes_tmax(
        tmin in 0i64..1_000_000,
        width in 1i64..100_000,
        offset in 0i64..100_000,
    ) {
        let tmax = tmin + width;
        let t = tmin + offset % width;
        let at = |s: i64| chrono::DateTime::from_timestamp(s, 0).unwrap();

        let mut g = GraphStore::new();
        g.add_node("e", &["Secret"], json!({"id": "s-1", "kind": "Secret"})).unwrap();
        g.add_node("s", &["SECRET"], json!({"kind": "Secret"})).unwrap();
        g.add_relationship(
            HAS_STATE,
            "e",
            "s",
            json!({
                "tmin": statewalk_graph::format_instant(at(tmin)),
                "tmax": statewalk_graph::format_instant(at(tmax)),
            }),
        )
        .unwrap();

        let lookup = |instant| StateLookup {
            entity_kind: "Secret".into(),
            entity_id: "s-1".into(),
            selector: TemporalSelector::At(instant),
            bounds: Bounds::HalfOpen,
            limit: 10,
        };
        prop_assert_eq!(g.find_states(&lookup(at(t))).len(), 1);
        prop_assert!(g.find_states(&lookup(at(tmax))).is_empty());

        let validity = Interval::new(at(tmin), at(tmax)).unwrap();
        prop_assert!(validity.contains(at(tmin), Bounds::HalfOpen));
        prop_assert!(!validity.contains(at(tmax), Bounds::HalfOpen));
    }
}
