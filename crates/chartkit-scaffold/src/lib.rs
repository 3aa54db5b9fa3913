//! Helm chart acquisition for operator scaffolding
//!
//! Turns a chart reference into a dependency-complete [`Chart`] and the
//! custom resource that will drive it:
//!
//! - an empty reference scaffolds Helm's default chart
//! - an existing path is loaded as an archive or a chart directory
//! - anything else is fetched from a chart repository
//!
//! All work happens in a temporary [`Workspace`] that is removed before
//! [`ChartScaffolder::create_chart`] returns.
//!
//! ## Example
//!
//! ```rust,no_run
//! use chartkit_scaffold::{ChartScaffolder, CreateOptions, ProjectConfig};
//! use chartkit_repo::Settings;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let scaffolder = ChartScaffolder::new(Settings::from_env()?);
//! let opts = CreateOptions {
//!     chart: "bitnami/nginx".to_string(),
//!     ..Default::default()
//! };
//!
//! let acquired = scaffolder
//!     .create_chart(&ProjectConfig::new("example.com"), &opts)
//!     .await?;
//! assert_eq!(acquired.resource.gvk.kind, "Nginx");
//! # Ok(())
//! # }
//! ```

pub mod acquire;
pub mod error;
pub mod identity;
pub mod pipeline;
pub mod source;
pub mod workspace;

pub use acquire::{ChartAcquirer, reload_chart};
pub use error::{AcquireError, Result};
pub use identity::{
    Api, DEFAULT_CRD_VERSION, DEFAULT_GROUP, DEFAULT_VERSION, Gvk, HELM_CHARTS_DIR, ProjectConfig,
    Resource, derive_resource, pluralize, to_upper_camel,
};
pub use pipeline::{ChartAcquisition, ChartScaffolder, CreateOptions, create_chart, save_to_project};
pub use source::ChartSource;
pub use workspace::Workspace;

pub use chartkit_core::Chart;
