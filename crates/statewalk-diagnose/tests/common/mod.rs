//! Shared fixtures: a volume-mount failure on a Pod backed by an nfs export
//! that has no state.

#![allow(dead_code)]

use serde_json::json;
use statewalk_diagnose::{DiagnosisConfig, Metapath, Segment};
use statewalk_graph::GraphStore;
use statewalk_llm::ScriptedAssistant;

pub const MESSAGE: &str = "MountVolume.SetUp failed for volume \"pv-nfs\" : mount failed: exit status 32 \
mounting 10.0.0.5:/mnt/k8s_nfs_pv/data failed, reason given by server: No such file or directory";

pub const NFS_PATH: &str = "/mnt/k8s_nfs_pv/data";

pub fn metagraph() -> GraphStore {
    let mut g = GraphStore::new();
    for (id, kind, category) in [
        ("pod", "Pod", "NativeEntity"),
        ("pvc", "PersistentVolumeClaim", "NativeEntity"),
        ("pv", "PersistentVolume", "NativeEntity"),
        ("ns", "Namespace", "NativeEntity"),
        ("cm", "ConfigMap", "NativeEntity"),
        ("nfs", "nfs", "ExternalEntity"),
        ("event", "Event", "EventEntity"),
    ] {
        g.add_node(id, &[kind], json!({"kind": kind, "category": category}))
            .unwrap();
    }
    for (rel, start, end, src, dest, key) in [
        ("ReferInternal", "pod", "pvc", "Pod", "PersistentVolumeClaim", "spec_volumes_persistentVolumeClaim_claimName"),
        ("ReferInternal", "pvc", "pv", "PersistentVolumeClaim", "PersistentVolume", "spec_volumeName"),
        ("ReferExternal", "pv", "nfs", "PersistentVolume", "nfs", "spec_nfs_path"),
        ("ReferInternal", "pod", "ns", "Pod", "Namespace", "metadata_namespace"),
        ("ReferInternal", "cm", "ns", "ConfigMap", "Namespace", "metadata_namespace"),
        ("ReferInternal", "event", "pod", "Event", "Pod", "involvedObject_uid"),
    ] {
        g.add_relationship(rel, start, end, json!({"srcKind": src, "destKind": dest, "key": key}))
            .unwrap();
    }
    g
}

fn native(kind: &str, id: &str, name: &str) -> serde_json::Value {
    json!({"kind": kind, "kind2": kind, "id": id, "isNative": "true", "name2": name})
}

pub fn stategraph() -> GraphStore {
    stategraph_at("2020-12-12T06:00:00Z", "2020-12-12T05:00:00Z", "2020-12-12T07:00:00Z")
}

/// The same graph with the event stamped `timestamp` and every state valid
/// over `[tmin, tmax)`, all in their stored string form.
pub fn stategraph_at(timestamp: &str, tmin: &str, tmax: &str) -> GraphStore {
    let mut g = GraphStore::new();
    g.add_node(
        "evt-s",
        &["EVENT"],
        json!({"kind": "Event", "message": MESSAGE, "timestamp": timestamp}),
    )
    .unwrap();
    g.add_node("evt", &["Event"], json!({"kind": "Event", "kind2": "Event", "id": "e-1"}))
        .unwrap();
    g.add_node("pod", &["Pod"], native("Pod", "pod-1", "web-0")).unwrap();
    g.add_node(
        "pvc",
        &["PersistentVolumeClaim"],
        native("PersistentVolumeClaim", "pvc-1", "data-web-0"),
    )
    .unwrap();
    g.add_node("pv", &["PersistentVolume"], native("PersistentVolume", "pv-1", "pv-nfs"))
        .unwrap();
    g.add_node(
        "nfs",
        &["nfs"],
        json!({"kind": "nfs", "tag": "nfs", "id": "nfs-1", "path": NFS_PATH}),
    )
    .unwrap();

    g.add_node(
        "pod-s",
        &["POD"],
        json!({"kind": "Pod", "id": "pod-s", "status": {"phase": "Pending"}}),
    )
    .unwrap();
    g.add_node(
        "pvc-s",
        &["PERSISTENTVOLUMECLAIM"],
        json!({"kind": "PersistentVolumeClaim", "id": "pvc-s", "status": {"phase": "Bound"}}),
    )
    .unwrap();
    g.add_node(
        "pv-s",
        &["PERSISTENTVOLUME"],
        json!({
            "kind": "PersistentVolume",
            "id": "pv-s",
            "spec": {"nfs": {"server": "10.0.0.5", "path": NFS_PATH}},
            "status": {"phase": "Bound"}
        }),
    )
    .unwrap();

    g.add_relationship("HasEvent", "evt", "evt-s", json!({"key": "metadata_uid"}))
        .unwrap();
    g.add_relationship("ReferInternal", "evt", "pod", json!({"key": "involvedObject_uid"}))
        .unwrap();
    g.add_relationship(
        "ReferInternal",
        "pod",
        "pvc",
        json!({"key": "spec_volumes_persistentVolumeClaim_claimName"}),
    )
    .unwrap();
    g.add_relationship("ReferInternal", "pvc", "pv", json!({"key": "spec_volumeName"}))
        .unwrap();
    g.add_relationship("ReferExternal", "pv", "nfs", json!({"key": "spec_nfs_path"}))
        .unwrap();
    for (entity, state) in [("pod", "pod-s"), ("pvc", "pvc-s"), ("pv", "pv-s")] {
        g.add_relationship("HasState", entity, state, json!({"tmin": tmin, "tmax": tmax}))
            .unwrap();
    }
    g
}

/// The Pod → nfs path anchored on its event.
pub fn nfs_metapath() -> Metapath {
    Metapath {
        segments: vec![
            Segment::new("HasEvent", "Event", "EVENT", "metadata_uid"),
            Segment::new("ReferInternal", "Event", "Pod", "involvedObject_uid"),
            Segment::new(
                "ReferInternal",
                "Pod",
                "PersistentVolumeClaim",
                "spec_volumes_persistentVolumeClaim_claimName",
            ),
            Segment::new("ReferInternal", "PersistentVolumeClaim", "PersistentVolume", "spec_volumeName"),
            Segment::new("ReferExternal", "PersistentVolume", "nfs", "spec_nfs_path"),
        ],
    }
}

/// Polling tight enough for paused-clock tests.
pub fn config() -> DiagnosisConfig {
    let mut config = DiagnosisConfig::default();
    config.polling.initial_delay_ms = 10;
    config.polling.step_ms = 0;
    config.polling.max_delay_ms = 10;
    config.polling.max_attempts = 20;
    config.polling.deadline_secs = None;
    config
}

pub const LOCATOR_REPLY: &str = "The volume's nfs export is missing.\n```json\n{\n  \
\"SourceKind\": \"Pod\",\n  \"DestinationKind\": \"nfs\",\n  \
\"RelevantResources\": [\"PersistentVolumeClaim\", \"PersistentVolume\", \"Namespace\"],\n  \
\"PrimaryPath\": [{\"Edge\": 1, \"start\": \"Pod\", \"end\": \"PersistentVolumeClaim\"}]\n}\n```";

pub const SUMMARY_REPLY: &str = "```json\n{\n  \"summary\": [\n    \
{\"kind\": \"Pod\", \"explanation\": \"mount fails\", \"relevance_score\": \"3/10\"},\n    \
{\"kind\": \"nfs\", \"explanation\": \"exported directory missing\", \"relevance_score\": 10}\n  ],\n  \
\"conclusion\": \"the nfs directory /mnt/k8s_nfs_pv/data does not exist\",\n  \
\"resolution\": \"mkdir -p /mnt/k8s_nfs_pv/data on 10.0.0.5\"\n}\n```";

pub const BROKEN_QUERY: &str = "MATCH (evt:EVENT WHERE evt.message = 'x' RETURN evt";

/// Answers each assistant by the shape of its prompt. The query generator
/// always replies with `query`.
pub fn assistant(query: impl Into<String>) -> ScriptedAssistant {
    let query = query.into();
    ScriptedAssistant::new().with_responder(move |prompt| {
        if prompt.starts_with("The predefined k8s API resource kinds") {
            LOCATOR_REPLY.to_string()
        } else if prompt.starts_with("Let's use generation-template-1") {
            format!("```cypher\n{query}\n```")
        } else if prompt.starts_with("The following JSON comes from a") {
            "The object is consistent; nothing points at the mount failure.".to_string()
        } else if prompt.starts_with("Based on the previous analysis of") {
            SUMMARY_REPLY.to_string()
        } else {
            "noted".to_string()
        }
    })
}
