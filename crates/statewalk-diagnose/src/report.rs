//! Clues and scored root-cause reports.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClueOutcome {
    /// No state at the event time: the entity does not exist.
    StateAbsent,
    /// A state was found and judged by the analyzer.
    StateJudged,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Clue {
    pub outcome: ClueOutcome,
    pub text: String,
}

/// Clues for one visited entity, keyed `"{kind}({id})"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityClues {
    pub key: String,
    pub kind: String,
    pub id: String,
    pub clues: Vec<Clue>,
}

impl EntityClues {
    pub fn new(kind: &str, id: &str) -> Self {
        Self {
            key: format!("{kind}({id})"),
            kind: kind.to_string(),
            id: id.to_string(),
            clues: Vec::new(),
        }
    }

    pub fn is_absent(&self) -> bool {
        self.clues.iter().any(|c| c.outcome == ClueOutcome::StateAbsent)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KindScore {
    pub kind: String,
    #[serde(default)]
    pub explanation: String,
    #[serde(deserialize_with = "deserialize_score")]
    pub relevance_score: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    #[serde(default)]
    pub summary: Vec<KindScore>,
    #[serde(default)]
    pub conclusion: String,
    #[serde(default)]
    pub resolution: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Pending,
    Summarized,
    Failed,
}

/// Report for one path instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub status: ReportStatus,
    pub clues: Vec<EntityClues>,
    pub summary: Option<Summary>,
    /// Last raw summarizing reply, kept when it could not be parsed.
    pub raw_reply: Option<String>,
    pub error: Option<String>,
}

impl Report {
    pub fn pending(clues: Vec<EntityClues>) -> Self {
        Self {
            status: ReportStatus::Pending,
            clues,
            summary: None,
            raw_reply: None,
            error: None,
        }
    }

    pub fn summarized(mut self, summary: Summary) -> Self {
        self.status = ReportStatus::Summarized;
        self.summary = Some(summary);
        self.error = None;
        self
    }

    pub fn failed(mut self, error: impl ToString, raw_reply: Option<String>) -> Self {
        self.status = ReportStatus::Failed;
        self.error = Some(error.to_string());
        self.raw_reply = raw_reply;
        self
    }

    /// Clue texts by entity key.
    pub fn clue_map(&self) -> BTreeMap<&str, Vec<&str>> {
        self.clues
            .iter()
            .map(|e| (e.key.as_str(), e.clues.iter().map(|c| c.text.as_str()).collect()))
            .collect()
    }

    pub fn score_of(&self, kind: &str) -> Option<u8> {
        self.summary
            .as_ref()?
            .summary
            .iter()
            .find(|s| s.kind == kind)
            .map(|s| s.relevance_score)
    }
}

/// Parse `8`, `"8"`, `"8/10"` or `"7.5 / 10"` into `0..=10`.
pub fn parse_score(raw: &str) -> Option<u8> {
    let numerator = raw.split('/').next()?.trim();
    let value: f64 = numerator.parse().ok()?;
    clamp_score(value)
}

fn clamp_score(value: f64) -> Option<u8> {
    value.is_finite().then(|| value.round().clamp(0.0, 10.0) as u8)
}

fn deserialize_score<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u8, D::Error> {
    let value = Value::deserialize(deserializer)?;
    let score = match &value {
        Value::Number(n) => n.as_f64().and_then(clamp_score),
        Value::String(s) => parse_score(s),
        _ => None,
    };
    score.ok_or_else(|| serde::de::Error::custom(format!("invalid relevance score {value}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_score_forms() {
        assert_eq!(parse_score("8"), Some(8));
        assert_eq!(parse_score("8/10"), Some(8));
        assert_eq!(parse_score(" 7.5 / 10"), Some(8));
        assert_eq!(parse_score("12"), Some(10));
        assert_eq!(parse_score("-3"), Some(0));
        assert_eq!(parse_score("high"), None);
    }

    #[test]
    fn test_summary_json() {
        let raw = r#"{
            "summary": [
                {"kind": "Pod", "explanation": "mount fails", "relevance_score": "6/10"},
                {"kind": "nfs", "explanation": "path missing", "relevance_score": 10}
            ],
            "conclusion": "the exported directory does not exist",
            "resolution": "mkdir -p /mnt/k8s_nfs_pv/data"
        }"#;
        let summary: Summary = serde_json::from_str(raw).unwrap();
        let report = Report::pending(Vec::new()).summarized(summary);
        assert_eq!(report.status, ReportStatus::Summarized);
        assert_eq!(report.score_of("Pod"), Some(6));
        assert_eq!(report.score_of("nfs"), Some(10));
        assert_eq!(report.score_of("Node"), None);
    }

    #[test]
    fn test_unparseable_score_rejected() {
        let raw = r#"{"summary": [{"kind": "Pod", "relevance_score": "very"}]}"#;
        assert!(serde_json::from_str::<Summary>(raw).is_err());
    }

    #[test]
    fn test_clue_map_keys() {
        let mut pvc = EntityClues::new("PersistentVolumeClaim", "7");
        pvc.clues.push(Clue {
            outcome: ClueOutcome::StateJudged,
            text: "PERSISTENTVOLUMECLAIM(s7): bound".into(),
        });
        let report = Report::pending(vec![pvc]);
        let map = report.clue_map();
        assert_eq!(
            map.get("PersistentVolumeClaim(7)"),
            Some(&vec!["PERSISTENTVOLUMECLAIM(s7): bound"])
        );
    }
}
