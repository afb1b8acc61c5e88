//! Keep only result rows whose destination is mentioned by the event.

use statewalk_graph::{effective_kind, identifying_value, Row};
use tracing::{debug, warn};

/// True when the row's terminal node is named by its event message, either
/// through its identifying value or through its kind/tag label.
pub fn message_compatible(row: &Row) -> bool {
    let Some(message) = row
        .event_node()
        .and_then(|event| event.text_prop("message"))
    else {
        return false;
    };
    let Some(dest) = row.terminal_node() else {
        return false;
    };

    let named = identifying_value(dest).is_some_and(|v| !v.is_empty() && message.contains(&v));
    let labelled = effective_kind(dest).is_some_and(|k| !k.is_empty() && message.contains(k));
    named || labelled
}

pub fn filter_compatible(rows: Vec<Row>) -> Vec<Row> {
    let total = rows.len();
    let kept: Vec<Row> = rows.into_iter().filter(message_compatible).collect();
    if kept.is_empty() && total > 0 {
        warn!(total, "no result row is compatible with its event message");
    } else {
        debug!(total, kept = kept.len(), "filtered result rows");
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use statewalk_graph::{GraphValue, Node};

    fn event(message: &str) -> Node {
        Node::new("evt")
            .with_prop("kind", "Event")
            .with_prop("message", message)
    }

    fn row(event: Node, dest: Node) -> Row {
        Row::new()
            .with("evt", GraphValue::Node(event))
            .with("n1", GraphValue::Node(dest))
    }

    fn nfs(path: &str) -> Node {
        Node::new("nfs")
            .with_prop("isNative", "false")
            .with_prop("tag", "nfs")
            .with_prop("path", path)
    }

    #[test]
    fn test_identifying_value_in_message() {
        let r = row(
            event("mount failed: /mnt/k8s_nfs_pv/data: No such file or directory"),
            nfs("/mnt/k8s_nfs_pv/data"),
        );
        assert!(message_compatible(&r));
    }

    #[test]
    fn test_unrelated_destination_rejected() {
        let r = row(
            event("configmap \"es-conf\" not found"),
            Node::new("cm")
                .with_prop("isNative", "true")
                .with_prop("kind2", "ConfigMap")
                .with_prop("name2", "other-conf"),
        );
        assert!(!message_compatible(&r));
        assert!(filter_compatible(vec![r]).is_empty());
    }

    #[test]
    fn test_kind_label_in_message() {
        let r = row(
            event("Error: ConfigMap is missing"),
            Node::new("cm")
                .with_prop("isNative", "true")
                .with_prop("kind2", "ConfigMap")
                .with_prop("name2", "unmentioned"),
        );
        assert!(message_compatible(&r));
    }

    #[test]
    fn test_row_without_event_rejected() {
        let r = Row::new().with("n1", GraphValue::Node(nfs("/data")));
        assert!(!message_compatible(&r));
    }

    #[test]
    fn test_filter_preserves_order() {
        let rows = vec![
            row(event("path /a missing"), nfs("/a")),
            row(event("path /a missing"), nfs("/zzz")),
            row(event("path /b missing"), nfs("/b")),
        ];
        let kept = filter_compatible(rows);
        assert_eq!(kept.len(), 2);
        assert_eq!(
            kept[1].terminal_node().and_then(|n| n.str_prop("path")),
            Some("/b")
        );
    }
}
