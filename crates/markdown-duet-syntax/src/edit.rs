//! What the parser reports back after an edit.
//!
//! An edit either produced fresh top-level blocks covering the edited lines
//! ([`EditResult::Added`]) or removed blocks without replacing them
//! ([`EditResult::Removed`]). [`RawEditResult`] is the loose wire form an
//! external parser hands over; converting it enforces that exactly one of the
//! two is present.

use serde::{Deserialize, Serialize};

use crate::error::SyntaxError;
use crate::node::NodeId;

/// Lines (1-based, inclusive) and node ids of blocks an edit removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemovedNodeRange {
    pub line_range: [usize; 2],
    /// First and last removed block ids in the tree as it was before the edit.
    pub id_range: Option<[NodeId; 2]>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditResult {
    /// Top-level blocks of the new tree covering the edited lines.
    Added { nodes: Vec<NodeId> },
    Removed(RemovedNodeRange),
}

impl EditResult {
    pub fn added_nodes(&self) -> &[NodeId] {
        match self {
            EditResult::Added { nodes } => nodes,
            EditResult::Removed(_) => &[],
        }
    }

    pub fn removed_range(&self) -> Option<&RemovedNodeRange> {
        match self {
            EditResult::Added { .. } => None,
            EditResult::Removed(range) => Some(range),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEditResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub added_nodes: Option<Vec<NodeId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub removed_node_range: Option<RemovedNodeRange>,
}

impl TryFrom<RawEditResult> for EditResult {
    type Error = SyntaxError;

    fn try_from(raw: RawEditResult) -> Result<Self, Self::Error> {
        let added = raw.added_nodes.filter(|nodes| !nodes.is_empty());
        match (added, raw.removed_node_range) {
            (Some(nodes), None) => Ok(EditResult::Added { nodes }),
            (None, Some(range)) => Ok(EditResult::Removed(range)),
            (Some(_), Some(_)) => {
                log::error!("edit result carries both added nodes and a removed range");
                Err(SyntaxError::MalformedEditResult(
                    "both addedNodes and removedNodeRange are set".into(),
                ))
            }
            (None, None) => {
                log::error!("edit result carries neither added nodes nor a removed range");
                Err(SyntaxError::MalformedEditResult(
                    "neither addedNodes nor removedNodeRange is set".into(),
                ))
            }
        }
    }
}

impl From<EditResult> for RawEditResult {
    fn from(result: EditResult) -> Self {
        match result {
            EditResult::Added { nodes } => RawEditResult {
                added_nodes: Some(nodes),
                removed_node_range: None,
            },
            EditResult::Removed(range) => RawEditResult {
                added_nodes: None,
                removed_node_range: Some(range),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_removed_range_from_json() {
        let raw: RawEditResult = serde_json::from_str(
            r#"{"removedNodeRange":{"lineRange":[3,5],"idRange":[4,4]}}"#,
        )
        .unwrap();
        let result = EditResult::try_from(raw).unwrap();
        assert_eq!(
            result,
            EditResult::Removed(RemovedNodeRange {
                line_range: [3, 5],
                id_range: Some([NodeId(4), NodeId(4)]),
            })
        );
    }

    #[test]
    fn rejects_both_fields() {
        let raw = RawEditResult {
            added_nodes: Some(vec![NodeId(1)]),
            removed_node_range: Some(RemovedNodeRange {
                line_range: [1, 1],
                id_range: None,
            }),
        };
        assert!(matches!(
            EditResult::try_from(raw),
            Err(SyntaxError::MalformedEditResult(_))
        ));
    }

    #[test]
    fn rejects_neither_field() {
        let raw: RawEditResult = serde_json::from_str(r#"{"addedNodes":[]}"#).unwrap();
        assert!(EditResult::try_from(raw).is_err());
    }

    #[test]
    fn wire_form_omits_absent_field() {
        let raw = RawEditResult::from(EditResult::Added {
            nodes: vec![NodeId(2), NodeId(3)],
        });
        assert_eq!(
            serde_json::to_string(&raw).unwrap(),
            r#"{"addedNodes":[2,3]}"#
        );
    }
}
