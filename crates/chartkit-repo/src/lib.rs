//! chartkit Repository Management
//!
//! This crate fetches charts and their dependencies:
//!
//! - **Settings**: Helm-compatible locations of `repositories.yaml` and the index cache
//! - **Getters**: scheme-dispatched fetching (`http`, `https`, `file`)
//! - **Downloader**: `repo/chart` and URL references resolved through repository indexes
//! - **Manager**: `Chart.lock` driven dependency build and update
//!
//! ## Example
//!
//! ```rust,no_run
//! use chartkit_repo::{Getters, Manager, Settings};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let settings = Settings::from_env()?;
//! let getters = Getters::all();
//! let mut out = Vec::new();
//!
//! Manager::new("./mychart", &settings, &getters, &mut out)
//!     .build()
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Security Notes
//!
//! - Credentials are never sent after cross-origin redirects
//! - Downloads are checked against the index digest when one is published

pub mod config;
pub mod credentials;
pub mod downloader;
pub mod error;
pub mod getter;
pub mod index;
pub mod manager;
pub mod resolver;
pub mod settings;

pub use config::{Repository, RepositoryConfig};
pub use credentials::{Credentials, ScopedCredentials, SecureHttpClient, TlsOptions};
pub use downloader::{ChartDownloader, IndexLoader, ResolvedChart, fetch_index};
pub use error::{RepoError, Result};
pub use getter::{FileGetter, Getter, GetterOptions, Getters, HttpGetter};
pub use index::{ChartVersion, IndexFile};
pub use manager::Manager;
pub use resolver::{DependencySource, Resolver};
pub use settings::Settings;
