//! User-visible diagnostics

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ids::ElemId;

/// Diagnostic severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Error => "Error",
            Severity::Warning => "Warning",
            Severity::Info => "Info",
        };
        write!(f, "{s}")
    }
}

/// An element-scoped message surfaced to the caller instead of a raised error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostic {
    #[serde(rename = "elemID", default, skip_serializing_if = "Option::is_none")]
    pub elem_id: Option<ElemId>,
    pub severity: Severity,
    pub message: String,
    pub detailed_message: String,
}

impl Diagnostic {
    pub fn new(elem_id: Option<ElemId>, severity: Severity, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            elem_id,
            severity,
            detailed_message: message.clone(),
            message,
        }
    }

    pub fn error(elem_id: &ElemId, message: impl Into<String>) -> Self {
        Self::new(Some(elem_id.clone()), Severity::Error, message)
    }

    pub fn warning(elem_id: &ElemId, message: impl Into<String>) -> Self {
        Self::new(Some(elem_id.clone()), Severity::Warning, message)
    }

    pub fn info(elem_id: &ElemId, message: impl Into<String>) -> Self {
        Self::new(Some(elem_id.clone()), Severity::Info, message)
    }

    #[must_use]
    pub fn with_detailed_message(mut self, detailed: impl Into<String>) -> Self {
        self.detailed_message = detailed.into();
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.elem_id {
            Some(id) => write!(f, "[{}] {}: {}", self.severity, id, self.message),
            None => write!(f, "[{}] {}", self.severity, self.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_format() {
        let id = ElemId::instance_id("zendesk", "group", "support");
        let diag = Diagnostic::error(&id, "cannot remove the default group")
            .with_detailed_message("group support is marked as default");
        assert_eq!(
            serde_json::to_value(&diag).unwrap(),
            json!({
                "elemID": "zendesk.group.instance.support",
                "severity": "Error",
                "message": "cannot remove the default group",
                "detailedMessage": "group support is marked as default"
            })
        );
        assert!(diag.is_error());
        assert!(!Diagnostic::warning(&id, "x").is_error());
    }
}
