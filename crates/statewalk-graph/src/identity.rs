//! Identifying-field selection.
//!
//! Every entity has exactly one authoritative identifying field, chosen by
//! category: native entities use `name2`, atomic entities `val`, and external
//! entities a field keyed by their `tag`. New external tags are added to
//! [`EXTERNAL_TAG_FIELDS`].

use crate::model::Node;

/// External tag → identifying field.
pub const EXTERNAL_TAG_FIELDS: &[(&str, &str)] = &[
    ("nfs", "path"),
    ("hostPath", "path"),
    ("container", "containerName"),
    ("image", "imageName"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityCategory {
    Native,
    Atomic,
    External {
        tag: &'static str,
        field: &'static str,
    },
}

impl EntityCategory {
    /// Classify a node. Precedence: native, then atomic, then tag table.
    /// Unknown tags yield `None`.
    pub fn of(node: &Node) -> Option<Self> {
        if node.is_native() {
            return Some(Self::Native);
        }
        if node.is_atomic() {
            return Some(Self::Atomic);
        }
        let tag = node.tag()?;
        EXTERNAL_TAG_FIELDS
            .iter()
            .find(|(t, _)| *t == tag)
            .map(|&(tag, field)| Self::External { tag, field })
    }

    pub fn identifying_field(self) -> &'static str {
        match self {
            Self::Native => "name2",
            Self::Atomic => "val",
            Self::External { field, .. } => field,
        }
    }
}

/// Value of the node's authoritative identifying field.
pub fn identifying_value(node: &Node) -> Option<String> {
    let category = EntityCategory::of(node)?;
    node.text_prop(category.identifying_field())
}

/// Kind used for state lookup and labelling: `kind2` for native entities,
/// `tag` otherwise.
pub fn effective_kind(node: &Node) -> Option<&str> {
    if node.is_native() {
        node.resolved_kind()
    } else {
        node.tag()
    }
}
