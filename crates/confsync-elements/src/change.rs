//! Change model
//!
//! A change pairs optional before/after snapshots. Exactly one of addition,
//! removal and modification holds, enforced by the enum itself.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::element::InstanceElement;
use crate::ids::{ElemId, Identified};

/// Change classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeAction {
    Add,
    Modify,
    Remove,
}

impl ChangeAction {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeAction::Add => "add",
            ChangeAction::Modify => "modify",
            ChangeAction::Remove => "remove",
        }
    }
}

impl fmt::Display for ChangeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A before/after pair, serialized as `{action, data: {before?, after?}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", content = "data")]
pub enum Change<T> {
    #[serde(rename = "add")]
    Addition { after: T },
    #[serde(rename = "remove")]
    Removal { before: T },
    #[serde(rename = "modify")]
    Modification { before: T, after: T },
}

/// A change of an instance, the unit the deploy pipeline works on.
pub type InstanceChange = Change<InstanceElement>;

impl<T> Change<T> {
    /// Build a change from optional snapshots; `None` when both are absent.
    pub fn to_change(before: Option<T>, after: Option<T>) -> Option<Self> {
        match (before, after) {
            (None, None) => None,
            (None, Some(after)) => Some(Change::Addition { after }),
            (Some(before), None) => Some(Change::Removal { before }),
            (Some(before), Some(after)) => Some(Change::Modification { before, after }),
        }
    }

    pub fn action(&self) -> ChangeAction {
        match self {
            Change::Addition { .. } => ChangeAction::Add,
            Change::Modification { .. } => ChangeAction::Modify,
            Change::Removal { .. } => ChangeAction::Remove,
        }
    }

    pub fn is_addition(&self) -> bool {
        matches!(self, Change::Addition { .. })
    }

    pub fn is_removal(&self) -> bool {
        matches!(self, Change::Removal { .. })
    }

    pub fn is_modification(&self) -> bool {
        matches!(self, Change::Modification { .. })
    }

    /// The effective snapshot: `after` for additions and modifications, `before` for removals.
    pub fn data(&self) -> &T {
        match self {
            Change::Addition { after } | Change::Modification { after, .. } => after,
            Change::Removal { before } => before,
        }
    }

    pub fn data_mut(&mut self) -> &mut T {
        match self {
            Change::Addition { after } | Change::Modification { after, .. } => after,
            Change::Removal { before } => before,
        }
    }

    pub fn before(&self) -> Option<&T> {
        match self {
            Change::Removal { before } | Change::Modification { before, .. } => Some(before),
            Change::Addition { .. } => None,
        }
    }

    pub fn after(&self) -> Option<&T> {
        match self {
            Change::Addition { after } | Change::Modification { after, .. } => Some(after),
            Change::Removal { .. } => None,
        }
    }

    pub fn after_mut(&mut self) -> Option<&mut T> {
        match self {
            Change::Addition { after } | Change::Modification { after, .. } => Some(after),
            Change::Removal { .. } => None,
        }
    }

    /// Apply `f` to every present snapshot.
    pub fn apply_to_data<F: FnMut(&mut T)>(&mut self, mut f: F) {
        match self {
            Change::Addition { after } => f(after),
            Change::Removal { before } => f(before),
            Change::Modification { before, after } => {
                f(before);
                f(after);
            }
        }
    }

    /// Fallible variant of [`Change::apply_to_data`]; stops at the first error.
    pub fn try_apply_to_data<E, F>(&mut self, mut f: F) -> Result<(), E>
    where
        F: FnMut(&mut T) -> Result<(), E>,
    {
        match self {
            Change::Addition { after } => f(after),
            Change::Removal { before } => f(before),
            Change::Modification { before, after } => {
                f(before)?;
                f(after)
            }
        }
    }

    /// Map every snapshot into another type.
    pub fn map<U, F: FnMut(T) -> U>(self, mut f: F) -> Change<U> {
        match self {
            Change::Addition { after } => Change::Addition { after: f(after) },
            Change::Removal { before } => Change::Removal { before: f(before) },
            Change::Modification { before, after } => Change::Modification {
                before: f(before),
                after: f(after),
            },
        }
    }
}

impl<T: Identified> Change<T> {
    pub fn elem_id(&self) -> &ElemId {
        self.data().elem_id()
    }
}

impl<T: Identified> Identified for Change<T> {
    fn elem_id(&self) -> &ElemId {
        self.data().elem_id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::values_from_json;
    use serde_json::json;

    fn group(name: &str, id: i64) -> InstanceElement {
        InstanceElement::new(
            name,
            &ElemId::type_id("zendesk", "group"),
            values_from_json(json!({"id": id, "name": name})),
        )
    }

    #[test]
    fn test_to_change_classification() {
        assert!(Change::<i32>::to_change(None, None).is_none());
        assert_eq!(Change::to_change(None, Some(1)).unwrap().action(), ChangeAction::Add);
        assert_eq!(Change::to_change(Some(1), None).unwrap().action(), ChangeAction::Remove);
        let modify = Change::to_change(Some(1), Some(2)).unwrap();
        assert_eq!(modify.action(), ChangeAction::Modify);
        assert_eq!(*modify.data(), 2);
        assert_eq!(modify.before(), Some(&1));
    }

    #[test]
    fn test_apply_to_data_touches_both_sides() {
        let mut change = Change::Modification {
            before: group("a", 1),
            after: group("a", 2),
        };
        change.apply_to_data(|inst| {
            inst.value.remove("name");
        });
        assert!(change.before().unwrap().get("name").is_none());
        assert!(change.after().unwrap().get("name").is_none());
        assert_eq!(change.elem_id().full_name(), "zendesk.group.instance.a");
    }

    #[test]
    fn test_wire_format() {
        let change = Change::Addition { after: 5 };
        assert_eq!(
            serde_json::to_value(&change).unwrap(),
            json!({"action": "add", "data": {"after": 5}})
        );
        let parsed: Change<i32> =
            serde_json::from_value(json!({"action": "modify", "data": {"before": 1, "after": 2}}))
                .unwrap();
        assert_eq!(parsed, Change::Modification { before: 1, after: 2 });
    }
}
