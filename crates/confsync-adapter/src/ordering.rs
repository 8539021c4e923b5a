//! Child ordering
//!
//! Parents hold an ordered list of references to their children. The remote
//! API only knows an absolute `position` per child, so a changed order list is
//! deployed as one synthetic child modification per list entry.

use chrono::{DateTime, FixedOffset};
use std::cmp::Ordering;
use tracing::{debug, instrument};

use confsync_elements::change::{Change, InstanceChange};
use confsync_elements::diagnostics::Diagnostic;
use confsync_elements::diff::detailed_compare_instances;
use confsync_elements::element::InstanceElement;
use confsync_elements::ids::ElemId;
use confsync_elements::value::{Value, Values};

use crate::config::ChildOrderRule;
use crate::deployment::{deploy_changes, ChangeHandler};
use crate::filter::{DeployResult, FilterDeployOutput};

fn parse_timestamp(value: Option<&Value>) -> Option<DateTime<FixedOffset>> {
    value
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
}

/// Sort children lowest position first; ties go to the newest `created_at`.
///
/// Children without a position sort last.
pub fn order_children_by_position(
    children: &mut [&InstanceElement],
    position_field: &str,
    created_at_field: &str,
) {
    children.sort_by(|a, b| {
        let pos_a = a.get(position_field).and_then(Value::as_i64);
        let pos_b = b.get(position_field).and_then(Value::as_i64);
        let by_position = match (pos_a, pos_b) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        by_position.then_with(|| {
            let created_a = parse_timestamp(a.get(created_at_field));
            let created_b = parse_timestamp(b.get(created_at_field));
            created_b.cmp(&created_a)
        })
    });
}

fn order_list<'a>(instance: &'a InstanceElement, order_field: &str) -> &'a [Value] {
    instance
        .get(order_field)
        .and_then(Value::as_list)
        .map_or(&[], Vec::as_slice)
}

/// How a parent change relates to its order list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderChangeKind {
    /// Only the order list changed.
    OrderOnly,
    /// The order list and other fields changed.
    Mixed,
    /// The order list is untouched.
    NoOrder,
}

/// Classify a change of a parent against its order field.
pub fn classify_order_change(change: &InstanceChange, order_field: &str) -> OrderChangeKind {
    let Change::Modification { before, after } = change else {
        return OrderChangeKind::NoOrder;
    };
    let details = detailed_compare_instances(before, after);
    let order_details = details
        .iter()
        .filter(|d| d.path().first().is_some_and(|p| p == order_field))
        .count();
    if order_details == 0 {
        OrderChangeKind::NoOrder
    } else if order_details == details.len() {
        OrderChangeKind::OrderOnly
    } else {
        OrderChangeKind::Mixed
    }
}

/// Build one `{id, position}` modification per entry of the order list,
/// positioned at its list index. Children already at their index are
/// rewritten too.
pub fn synthesize_position_changes(
    change: &InstanceChange,
    rule: &ChildOrderRule,
) -> Result<Vec<InstanceChange>, String> {
    let parent = change.data();
    let not_a_reference = || {
        format!(
            "Error updating {} positions of '{}' - some values in the list are not a reference",
            rule.order_field,
            parent.elem_id.name()
        )
    };
    let child_type = ElemId::type_id(parent.elem_id.adapter(), rule.child_type.as_str());

    let mut synthetic = Vec::new();
    for (index, item) in order_list(parent, &rule.order_field).iter().enumerate() {
        let reference = item.as_reference().ok_or_else(not_a_reference)?;
        let id = reference.target_id().cloned().ok_or_else(not_a_reference)?;
        let stored = reference
            .resolved_value()
            .and_then(|target| target.get(&rule.position_field))
            .cloned()
            .filter(|position| !position.is_null());
        let position = Value::from(index as u64);

        let child = |position: Option<Value>| {
            let mut value = Values::new();
            value.insert("id".to_string(), id.clone());
            if let Some(position) = position {
                value.insert(rule.position_field.clone(), position);
            }
            let mut child = InstanceElement::new(reference.elem_id.name(), &child_type, value);
            child.elem_id = reference.elem_id.clone();
            child
        };
        synthetic.push(Change::Modification {
            before: child(stored.clone()),
            after: child(Some(position)),
        });
    }
    Ok(synthetic)
}

/// Deploy the order lists of parent changes matching `rule`.
///
/// Order-only changes are applied once every synthetic child change succeeds.
/// Mixed changes deploy their synthetic changes and still continue as
/// leftovers so their other fields reach the next stage.
#[instrument(skip(changes, rule, handler), fields(parent_type = %rule.parent_type))]
pub async fn deploy_order_changes(
    changes: Vec<InstanceChange>,
    rule: &ChildOrderRule,
    handler: &dyn ChangeHandler,
    max_concurrency: usize,
) -> FilterDeployOutput {
    let mut output = FilterDeployOutput::default();
    for change in changes {
        let kind = if change.data().type_name() == rule.parent_type {
            classify_order_change(&change, &rule.order_field)
        } else {
            OrderChangeKind::NoOrder
        };
        if kind == OrderChangeKind::NoOrder {
            output.leftover_changes.push(change);
            continue;
        }

        let synthetic = match synthesize_position_changes(&change, rule) {
            Ok(synthetic) => synthetic,
            Err(message) => {
                output
                    .deploy_result
                    .errors
                    .push(Diagnostic::error(change.elem_id(), message));
                continue;
            }
        };
        debug!(
            parent = %change.elem_id(),
            children = synthetic.len(),
            "Deploying child positions"
        );
        let DeployResult { errors, .. } = deploy_changes(synthetic, handler, max_concurrency).await;
        let failed = !errors.is_empty();
        output.deploy_result.errors.extend(errors);

        match kind {
            OrderChangeKind::Mixed => output.leftover_changes.push(change),
            _ if failed => {}
            _ => output.deploy_result.applied_changes.push(change),
        }
    }
    output
}
