//! Cypher rendering for typed backend requests.

use crate::backend::{PathPattern, StateLookup, TemporalSelector};
use crate::model::Params;
use crate::temporal::{format_instant, Bounds};
use crate::HAS_STATE;
use serde_json::json;

/// Quote a string as a single-quoted Cypher literal.
pub fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

/// Render a label or relationship type, backtick-escaping when needed.
pub fn label(name: &str) -> String {
    let mut chars = name.chars();
    let simple = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if simple {
        name.to_string()
    } else {
        format!("`{}`", name.replace('`', "``"))
    }
}

/// Query listing metagraph kinds by category.
pub const KIND_CATALOG_QUERY: &str = "MATCH (n1)
WHERE n1.category IN ['NativeEntity', 'ExternalEntity']
RETURN n1.category AS category, n1.kind AS kind";

/// Render a path pattern. Every query returns a single `path` column.
pub fn path_pattern(pattern: &PathPattern) -> (String, Params) {
    let mut params = Params::new();
    params.insert("srcKind".into(), json!(pattern.src()));
    params.insert("destKind".into(), json!(pattern.dest()));

    let query = match pattern {
        PathPattern::Bounded(b) => {
            let arrow = if b.directed { "->" } else { "-" };
            params.insert("excludedKinds".into(), json!(b.excluded_kinds));
            params.insert("preferredKinds".into(), json!(b.preferred));
            format!(
                "MATCH path = (n1)-[*{min}..{max}]{arrow}(n2)
WHERE n1.kind = $srcKind AND n2.kind = $destKind
AND all(node IN nodes(path) WHERE single(x IN nodes(path) WHERE x = node))
AND all(node IN nodes(path)[1..-1] WHERE NOT node.kind IN $excludedKinds)
AND (size($preferredKinds) = 0
     OR any(node IN nodes(path)[1..-1] WHERE node.kind IN $preferredKinds))
RETURN path",
                min = b.min_hops,
                max = b.max_hops,
            )
        }
        PathPattern::Direct { .. } => "MATCH path = (n1)-[r1]-(n2)
WHERE n1.kind = $srcKind AND n2.kind = $destKind AND n1 <> n2
RETURN path"
            .to_string(),
        PathPattern::Bridge { via, .. } => {
            params.insert("viaKind".into(), json!(via));
            "MATCH path = (n1)-[r1]-(n2)-[r2]-(n3)
WHERE n1.kind = $srcKind AND n2.kind = $viaKind AND n3.kind = $destKind AND n1 <> n3
RETURN path"
                .to_string()
        }
    };
    (query, params)
}

/// Stored `tmin`/`tmax` may use a space or `T` separator, so both sides are
/// compared as temporal values rather than strings.
fn stored_instant(prop: &str) -> String {
    format!("datetime(replace(toString(r1.{prop}), ' ', 'T'))")
}

/// Render a state lookup. Returns a single `state` column.
pub fn state_lookup(lookup: &StateLookup) -> (String, Params) {
    let mut params = Params::new();
    params.insert("entityId".into(), json!(lookup.entity_id));

    let (lower, upper) = match lookup.bounds {
        Bounds::HalfOpen => ("<=", ">"),
        Bounds::Closed => ("<=", ">="),
    };
    let (tmin, tmax) = (stored_instant("tmin"), stored_instant("tmax"));
    let window = match lookup.selector {
        TemporalSelector::At(t) => {
            params.insert("t".into(), json!(format_instant(t)));
            format!("{tmin} {lower} datetime($t) AND {tmax} {upper} datetime($t)")
        }
        TemporalSelector::Window(w) => {
            params.insert("tmin".into(), json!(format_instant(w.tmin)));
            params.insert("tmax".into(), json!(format_instant(w.tmax)));
            // strict on the window's end for half-open overlap
            let lower = if lookup.bounds == Bounds::HalfOpen { "<" } else { "<=" };
            format!("{tmin} {lower} datetime($tmax) AND {tmax} {upper} datetime($tmin)")
        }
    };

    let query = format!(
        "MATCH (n1:{entity})-[r1:{rel}]->(n2:{state})
WHERE n1.id = $entityId
AND {window}
RETURN n2 AS state
LIMIT {limit}",
        entity = label(&lookup.entity_kind),
        rel = HAS_STATE,
        state = label(&lookup.state_label()),
        limit = lookup.limit,
    );
    (query, params)
}

/// Render an entity lookup. Returns a single `entity` column.
pub fn entity_lookup(kind: &str, id: &str) -> (String, Params) {
    let mut params = Params::new();
    params.insert("entityId".into(), json!(id));
    let query = format!(
        "MATCH (n1:{})
WHERE n1.id = $entityId
RETURN n1 AS entity
LIMIT 1",
        label(kind)
    );
    (query, params)
}
