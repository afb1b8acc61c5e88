//! Extended metapaths: a discovered path prefixed with its Event anchor.
//!
//! Rendered one segment per line as `relType, srcKind, destKind, key;`:
//!
//! ```text
//! HasEvent, Event, EVENT, metadata_uid;
//! ReferInternal, Event, Pod, involvedObject_uid;
//! ReferInternal, Pod, PersistentVolumeClaim, spec_volumes_persistentVolumeClaim_claimName;
//! ```

use crate::error::DiagnoseError;
use serde::{Deserialize, Serialize};
use statewalk_graph::GraphPath;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub rel_type: String,
    pub src_kind: String,
    pub dest_kind: String,
    pub key: String,
}

impl Segment {
    pub fn new(rel_type: &str, src_kind: &str, dest_kind: &str, key: &str) -> Self {
        Self {
            rel_type: rel_type.to_string(),
            src_kind: src_kind.to_string(),
            dest_kind: dest_kind.to_string(),
            key: key.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metapath {
    pub segments: Vec<Segment>,
}

impl Metapath {
    /// Anchor `path` on the Event that references its first node.
    pub fn extend(path: &GraphPath) -> Result<Self, DiagnoseError> {
        let src = path
            .start()
            .and_then(|n| n.kind())
            .ok_or_else(|| DiagnoseError::MalformedPath("path start has no kind".into()))?;

        let mut segments = vec![
            Segment::new("HasEvent", "Event", "EVENT", "metadata_uid"),
            Segment::new("ReferInternal", "Event", src, "involvedObject_uid"),
        ];
        for rel in &path.relationships {
            let (Some(src_kind), Some(dest_kind), Some(key)) =
                (rel.src_kind(), rel.dest_kind(), rel.key())
            else {
                return Err(DiagnoseError::MalformedPath(format!(
                    "relationship {} ({}) lacks srcKind/destKind/key",
                    rel.element_id, rel.rel_type
                )));
            };
            segments.push(Segment::new(&rel.rel_type, src_kind, dest_kind, key));
        }
        Ok(Self { segments })
    }

    /// Segments after the Event anchor.
    pub fn path_segments(&self) -> &[Segment] {
        self.segments.get(2..).unwrap_or(&[])
    }
}

impl fmt::Display for Metapath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for s in &self.segments {
            writeln!(f, "{}, {}, {}, {};", s.rel_type, s.src_kind, s.dest_kind, s.key)?;
        }
        Ok(())
    }
}

impl FromStr for Metapath {
    type Err = DiagnoseError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let segments = text
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                let parts: Vec<&str> = s.split(',').map(str::trim).collect();
                match parts.as_slice() {
                    [rel, src, dest, key] if parts.iter().all(|p| !p.is_empty()) => {
                        Ok(Segment::new(rel, src, dest, key))
                    }
                    _ => Err(DiagnoseError::MalformedPath(format!(
                        "segment '{s}' is not 'relType, srcKind, destKind, key'"
                    ))),
                }
            })
            .collect::<Result<Vec<_>, _>>()?;
        if segments.is_empty() {
            return Err(DiagnoseError::MalformedPath("no segments".into()));
        }
        Ok(Self { segments })
    }
}
