//! Adapter error types
//!
//! Errors raised by the pipeline, the deployment router and the API client,
//! with transient/permanent classification.

use thiserror::Error;

use confsync_elements::error::ElementError;
use confsync_elements::ids::ElemId;

use crate::client::HttpError;
use crate::filter::FilterPhase;

/// Error that can occur during fetch or deploy.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// The API client reported a failed request.
    #[error(transparent)]
    Http(#[from] HttpError),

    /// A value-tree algorithm failed.
    #[error(transparent)]
    Element(#[from] ElementError),

    /// A single change could not be deployed.
    #[error("{message}")]
    DeployChange { elem_id: String, message: String },

    /// A filter hook failed.
    #[error("filter {filter} failed during {phase}: {message}")]
    FilterHook {
        filter: String,
        phase: FilterPhase,
        message: String,
    },

    /// Adapter configuration is invalid.
    #[error("invalid configuration: {message}")]
    Configuration { message: String },

    /// Failed to read a configuration file.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse YAML configuration.
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Failed to convert a payload.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AdapterError {
    /// Check if this error is transient (may succeed on retry).
    pub fn is_transient(&self) -> bool {
        match self {
            AdapterError::Http(e) => e.is_transient(),
            _ => false,
        }
    }

    /// Get an error code for classification.
    pub fn error_code(&self) -> &'static str {
        match self {
            AdapterError::Http(_) => "HTTP_ERROR",
            AdapterError::Element(e) => e.error_code(),
            AdapterError::DeployChange { .. } => "DEPLOY_CHANGE_FAILED",
            AdapterError::FilterHook { .. } => "FILTER_HOOK_FAILED",
            AdapterError::Configuration { .. } => "INVALID_CONFIGURATION",
            AdapterError::Io(_) => "IO_ERROR",
            AdapterError::Yaml(_) => "YAML_ERROR",
            AdapterError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Create a deploy change error.
    pub fn deploy_change(elem_id: &ElemId, message: impl Into<String>) -> Self {
        AdapterError::DeployChange {
            elem_id: elem_id.full_name(),
            message: message.into(),
        }
    }

    /// Create a filter hook error.
    pub fn filter_hook(
        filter: impl Into<String>,
        phase: FilterPhase,
        message: impl Into<String>,
    ) -> Self {
        AdapterError::FilterHook {
            filter: filter.into(),
            phase,
            message: message.into(),
        }
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        AdapterError::Configuration {
            message: message.into(),
        }
    }
}

/// Result type for adapter operations.
pub type AdapterResult<T> = Result<T, AdapterError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(AdapterError::from(HttpError::new(Some(503), "unavailable")).is_transient());
        assert!(AdapterError::from(HttpError::new(Some(429), "slow down")).is_transient());
        assert!(AdapterError::from(HttpError::new(None, "connection reset")).is_transient());
        assert!(!AdapterError::from(HttpError::new(Some(422), "invalid")).is_transient());
        assert!(!AdapterError::configuration("bad").is_transient());
    }

    #[test]
    fn test_error_codes() {
        let id = ElemId::instance_id("zendesk", "group", "support");
        assert_eq!(
            AdapterError::deploy_change(&id, "boom").error_code(),
            "DEPLOY_CHANGE_FAILED"
        );
        assert_eq!(
            AdapterError::from(ElementError::unresolved(&id)).error_code(),
            "UNRESOLVED_REFERENCE"
        );
        assert_eq!(
            AdapterError::filter_hook("list_coercion", FilterPhase::OnFetch, "x").to_string(),
            "filter list_coercion failed during on_fetch: x"
        );
    }
}
