//! chartkit Core - Chart model for operator scaffolding
//!
//! This crate provides the foundational types used throughout chartkit:
//! - `Chart`: An in-memory Helm chart tree (metadata, templates, sub-charts)
//! - `ChartMetadata` / `Dependency`: The `Chart.yaml` document
//! - `ChartLock`: The `Chart.lock` document with a Helm-compatible digest
//! - `archive`: Reading and writing packaged `.tgz` charts
//! - `scaffold`: Helm's default chart template

pub mod archive;
pub mod chart;
pub mod error;
pub mod ignore;
pub mod lock;
pub mod save;
pub mod scaffold;
pub mod version;

pub use chart::{Chart, ChartFile, ChartMetadata, ChartType, Dependency, Maintainer};
pub use error::{CoreError, Result};
pub use lock::{ChartLock, LockedDependency};
pub use save::save_dir;
pub use version::{VersionConstraint, parse_lenient};
