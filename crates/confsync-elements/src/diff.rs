//! Detailed change computation
//!
//! Path-addressed differences between two value trees. Lists are compared by
//! index, so a pure reorder shows up as a modification at every shifted index.

use std::collections::BTreeSet;

use crate::change::Change;
use crate::element::InstanceElement;
use crate::ids::ElemId;
use crate::value::{Value, Values};

/// One path-addressed difference.
#[derive(Debug, Clone, PartialEq)]
pub struct DetailedChange {
    pub id: ElemId,
    pub change: Change<Value>,
}

impl DetailedChange {
    /// Path below the enclosing top-level element.
    pub fn path(&self) -> Vec<String> {
        self.id.create_top_level_parent_id().1
    }
}

/// Compare two value maps rooted at `root`.
///
/// Output is ordered by key (maps) and index (lists), depth first.
pub fn detailed_compare(before: &Values, after: &Values, root: &ElemId) -> Vec<DetailedChange> {
    let mut out = Vec::new();
    compare_maps(before, after, root, &mut out);
    out
}

/// Compare the values of two snapshots of the same instance.
pub fn detailed_compare_instances(
    before: &InstanceElement,
    after: &InstanceElement,
) -> Vec<DetailedChange> {
    detailed_compare(&before.value, &after.value, &after.elem_id)
}

/// Compare two arbitrary values rooted at `id`.
pub fn compare_values(before: &Value, after: &Value, id: &ElemId) -> Vec<DetailedChange> {
    let mut out = Vec::new();
    compare(Some(before), Some(after), id, &mut out);
    out
}

fn compare(
    before: Option<&Value>,
    after: Option<&Value>,
    id: &ElemId,
    out: &mut Vec<DetailedChange>,
) {
    match (before, after) {
        (None, None) => {}
        (None, Some(after)) => out.push(DetailedChange {
            id: id.clone(),
            change: Change::Addition {
                after: after.clone(),
            },
        }),
        (Some(before), None) => out.push(DetailedChange {
            id: id.clone(),
            change: Change::Removal {
                before: before.clone(),
            },
        }),
        (Some(before), Some(after)) if before == after => {}
        (Some(Value::Map(before)), Some(Value::Map(after))) => compare_maps(before, after, id, out),
        (Some(Value::List(before)), Some(Value::List(after))) => {
            for idx in 0..before.len().max(after.len()) {
                compare(
                    before.get(idx),
                    after.get(idx),
                    &id.create_nested_id([idx.to_string()]),
                    out,
                );
            }
        }
        (Some(before), Some(after)) => out.push(DetailedChange {
            id: id.clone(),
            change: Change::Modification {
                before: before.clone(),
                after: after.clone(),
            },
        }),
    }
}

fn compare_maps(before: &Values, after: &Values, id: &ElemId, out: &mut Vec<DetailedChange>) {
    let keys: BTreeSet<&String> = before.keys().chain(after.keys()).collect();
    for key in keys {
        compare(
            before.get(key),
            after.get(key),
            &id.create_nested_id([key.as_str()]),
            out,
        );
    }
}
