//! # Adapter Core
//!
//! Fetch normalization and deployment for SaaS configuration adapters.
//!
//! A fetch hands raw elements to an ordered list of filters that coerce value
//! shapes, turn raw ids and links into references and synthesize derived
//! elements. A deploy runs change validators, then the same filters in reverse
//! role: pre-deploy hooks put changes back into API shape, deploy hooks claim
//! and deploy the changes they own, and whatever is left goes to a generic
//! endpoint-table deployer. On-deploy hooks restore the model shape of the
//! applied changes.
//!
//! ## Architecture
//!
//! ```text
//!            ┌───────────────┐     ┌────────────────┐
//!  changes ─►│  Validators   │────►│ FilterPipeline │
//!            └───────────────┘     └───────┬────────┘
//!                                          │ pre_deploy
//!                                          ▼
//!                   ┌──────────────┬──────────────┬──────────────┐
//!                   │ child_order  │order_instance│ removal_last │  deploy
//!                   └──────┬───────┴──────┬───────┴──────┬───────┘
//!                          │   leftover   │              │
//!                          ▼              ▼              ▼
//!                   ┌──────────────────────────────────────────┐
//!                   │           ApiChangeDeployer              │
//!                   └──────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use confsync_adapter::prelude::*;
//!
//! let config = AdapterConfig::from_file("zendesk.yaml")?;
//! let adapter = Adapter::from_config(config, Arc::new(InMemoryElementSource::new()))?;
//!
//! let fetched = adapter.fetch(raw_elements).await;
//! let deployed = adapter.deploy(changes).await;
//! for error in &deployed.errors {
//!     eprintln!("{}", error.message);
//! }
//! ```

pub mod adapter;
pub mod client;
pub mod config;
pub mod deployment;
pub mod error;
pub mod filter;
pub mod filters;
pub mod ordering;
pub mod pipeline;
pub mod validators;

pub use adapter::Adapter;
pub use error::{AdapterError, AdapterResult};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::adapter::Adapter;

    // Client
    pub use crate::client::{ApiClient, ApiResponse, HttpError, HttpMethod, RestApiClient};

    // Configuration
    pub use crate::config::{
        AdapterConfig, ApiDefinitions, AuthConfig, ClientConfig, EndpointDef, FilterSettings,
        LocaleRule, TypeApiDefinition, ValidatorSettings,
    };

    // Deployment
    pub use crate::deployment::{
        deploy_changes, deploy_removals_last, route_changes, ApiChangeDeployer, ChangeHandler,
    };

    // Error handling
    pub use crate::error::{AdapterError, AdapterResult};

    // Filters
    pub use crate::filter::{
        creator, DeployResult, Filter, FilterContext, FilterCreator, FilterDeployOutput,
        FilterPhase,
    };
    pub use crate::filters::default_filters;
    pub use crate::pipeline::{FetchResult, FilterPipeline};

    // Validators
    pub use crate::validators::{default_validators, ChangeValidator};

    pub use confsync_elements::prelude::*;

    pub use async_trait::async_trait;
}
