//! Diagnoser E2E Tests

mod common;

use common::*;
use statewalk_diagnose::*;
use statewalk_graph::{GraphBackend, GraphStore};
use statewalk_llm::{AssistantService, ScriptedAssistant};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

fn diagnoser(assistant: Arc<ScriptedAssistant>) -> Diagnoser {
    diagnoser_over(stategraph(), assistant)
}

fn diagnoser_over(store: GraphStore, assistant: Arc<ScriptedAssistant>) -> Diagnoser {
    let metagraph: Arc<dyn GraphBackend> = Arc::new(metagraph());
    let stategraph: Arc<dyn GraphBackend> = Arc::new(store);
    let service: Arc<dyn AssistantService> = assistant;
    Diagnoser::new(metagraph, stategraph, service, config())
}

// ============================================================================
// Full Scenario
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_nfs_mount_failure_falls_back_and_reports_absent_export() {
    let assistant = Arc::new(assistant(BROKEN_QUERY));
    let diagnosis = diagnoser(assistant.clone()).diagnose(MESSAGE).await.unwrap();

    assert_eq!(diagnosis.source_kind, "Pod");
    assert_eq!(diagnosis.located.destination_kind, "nfs");
    assert_eq!(diagnosis.locator_attempts, 1);
    assert_eq!(
        diagnosis.preferred_kinds,
        vec!["PersistentVolumeClaim", "PersistentVolume", "Namespace"]
    );
    assert_eq!(diagnosis.strategy, Some(Strategy::DirectedBounded));
    assert_eq!(diagnosis.analyses.len(), 1);

    let analysis = &diagnosis.analyses[0];
    assert_eq!(analysis.metapath, nfs_metapath().to_string());
    assert_eq!(analysis.synthesis.attempts, 3);
    assert!(analysis.synthesis.used_fallback());
    assert_eq!(analysis.reports.len(), 1);

    let report = &analysis.reports[0];
    assert_eq!(report.status, ReportStatus::Summarized);
    let keys: Vec<&str> = report.clues.iter().map(|c| c.key.as_str()).collect();
    assert_eq!(
        keys,
        vec![
            "Pod(pod-1)",
            "PersistentVolumeClaim(pvc-1)",
            "PersistentVolume(pv-1)",
            "nfs(nfs-1)"
        ]
    );

    let nfs = &report.clues[3];
    assert!(nfs.is_absent());
    assert!(nfs.clues[0].text.contains(NFS_PATH));
    assert!(nfs.clues[0].text.contains("STATE (NFS)"));

    let pv = &report.clues[2];
    assert!(!pv.is_absent());
    assert!(pv.clues[0].text.starts_with("PERSISTENTVOLUME(pv-s): "));

    assert_eq!(report.score_of("nfs"), Some(10));
    assert_eq!(report.score_of("Pod"), Some(3));

    // the absence clue is also shared with the analyzer
    assert!(assistant
        .messages()
        .iter()
        .any(|m| m.contains("we confirm that /mnt/k8s_nfs_pv/data does not exist")));
    assert_eq!(assistant.assistants().len(), 3);
    assert_eq!(assistant.open_threads(), 0, "sessions closed");
}

#[tokio::test(start_paused = true)]
async fn test_generated_query_used_when_it_runs() {
    let query = TemplateSynthesizer
        .build(&nfs_metapath(), MESSAGE)
        .unwrap()
        .to_string();
    let assistant = Arc::new(assistant(query.clone()));
    let diagnosis = diagnoser(assistant.clone()).diagnose(MESSAGE).await.unwrap();

    let synthesis = &diagnosis.analyses[0].synthesis;
    assert_eq!(synthesis.attempts, 1);
    assert!(!synthesis.used_fallback());
    assert_eq!(synthesis.final_query(), Some(query.as_str()));
    assert_eq!(synthesis.raw_rows, 1);
    assert!(!assistant
        .messages()
        .iter()
        .any(|m| m.contains("generate a corrected version")));
}

#[tokio::test(start_paused = true)]
async fn test_millisecond_timestamps_resolve_states() {
    // event stamped exactly on the states' tmin, all with a space separator
    let store = stategraph_at(
        "2020-12-13 15:30:02.013",
        "2020-12-13 15:30:02.013",
        "2020-12-13 16:30:02.013",
    );
    let assistant = Arc::new(assistant(BROKEN_QUERY));
    let diagnosis = diagnoser_over(store, assistant).diagnose(MESSAGE).await.unwrap();

    let report = &diagnosis.analyses[0].reports[0];
    assert_eq!(report.status, ReportStatus::Summarized);
    for key in ["Pod(pod-1)", "PersistentVolumeClaim(pvc-1)", "PersistentVolume(pv-1)"] {
        let clue = report.clues.iter().find(|c| c.key == key).unwrap();
        assert!(!clue.is_absent(), "{key} has a state at the event instant");
    }
    assert!(report.clues[3].is_absent());
}

#[tokio::test(start_paused = true)]
async fn test_event_at_state_tmax_finds_no_state() {
    let store = stategraph_at(
        "2020-12-13 16:30:02.013",
        "2020-12-13 15:30:02.013",
        "2020-12-13 16:30:02.013",
    );
    let assistant = Arc::new(assistant(BROKEN_QUERY));
    let diagnosis = diagnoser_over(store, assistant).diagnose(MESSAGE).await.unwrap();

    let report = &diagnosis.analyses[0].reports[0];
    let pod = report.clues.iter().find(|c| c.key == "Pod(pod-1)").unwrap();
    assert!(pod.is_absent());
}

// ============================================================================
// Failure Paths
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_unknown_message_has_no_source_kind() {
    let assistant = Arc::new(assistant(BROKEN_QUERY));
    let err = diagnoser(assistant.clone())
        .diagnose("Back-off pulling image \"busybox:nope\"")
        .await
        .unwrap_err();
    assert!(matches!(err, DiagnoseError::NoSourceKind(_)));
    assert_eq!(assistant.runs_created(), 0, "no assistant consulted");
}

#[tokio::test(start_paused = true)]
async fn test_unparseable_locator_replies_exhaust() {
    let assistant = Arc::new(ScriptedAssistant::new().with_responder(|_| "I am not sure.".into()));
    let err = diagnoser(assistant.clone()).diagnose(MESSAGE).await.unwrap_err();
    assert!(matches!(err, DiagnoseError::LocatorExhausted { attempts: 3, .. }));
    assert_eq!(assistant.runs_created(), 3);
    assert_eq!(assistant.open_threads(), 0, "sessions closed on failure");
}

#[tokio::test(start_paused = true)]
async fn test_unreachable_destination_yields_no_analyses() {
    let assistant = Arc::new(ScriptedAssistant::new().with_responder(|prompt| {
        if prompt.starts_with("The predefined k8s API resource kinds") {
            "```json\n{\"SourceKind\": \"Pod\", \"DestinationKind\": \"Secret\"}\n```".into()
        } else {
            "noted".into()
        }
    }));
    let diagnosis = diagnoser(assistant).diagnose(MESSAGE).await.unwrap();
    assert_eq!(diagnosis.strategy, None);
    assert!(diagnosis.analyses.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_fixed_classifier_bypasses_event_lookup() {
    let assistant = Arc::new(assistant(BROKEN_QUERY));
    let diagnosis = diagnoser(assistant)
        .with_classifier(Arc::new(FixedKind("Pod".into())))
        .diagnose(MESSAGE)
        .await
        .unwrap();
    assert_eq!(diagnosis.source_kind, "Pod");
    assert_eq!(diagnosis.reports().count(), 1);
}

// ============================================================================
// Batches
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_batch_records_failures_and_continues() {
    let assistant = Arc::new(assistant(BROKEN_QUERY));
    let entries = diagnoser(assistant)
        .diagnose_batch(&["no such event".to_string(), MESSAGE.to_string()])
        .await;

    assert_eq!(entries.len(), 2);
    assert!(entries[0].diagnosis.is_none());
    assert!(entries[0].error.as_deref().unwrap().contains("no event references an entity"));
    assert!(entries[1].error.is_none());
    assert_eq!(entries[1].diagnosis.as_ref().unwrap().analyses.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_batch_stops_early() {
    let cancel = CancellationToken::new();
    cancel.cancel();
    let assistant = Arc::new(assistant(BROKEN_QUERY));
    let entries = diagnoser(assistant)
        .with_cancellation(cancel)
        .diagnose_batch(&[MESSAGE.to_string()])
        .await;
    assert!(entries.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_diagnosis_serializes() {
    let assistant = Arc::new(assistant(BROKEN_QUERY));
    let diagnosis = diagnoser(assistant).diagnose(MESSAGE).await.unwrap();
    let json = serde_json::to_value(&diagnosis).unwrap();
    assert_eq!(json["strategy"], "directed_bounded");
    assert_eq!(json["located"]["DestinationKind"], "nfs");
    assert_eq!(
        json["analyses"][0]["reports"][0]["clues"][3]["clues"][0]["outcome"],
        "STATE_ABSENT"
    );
    assert!(json["analyses"][0]["synthesis"].get("rows").is_none());
}
