//! Acquisition pipeline errors
//!
//! Every variant names the stage that failed and the input that triggered
//! it. The underlying cause is kept as the error source.

use chartkit_core::CoreError;
use chartkit_repo::RepoError;
use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug, Diagnostic)]
pub enum AcquireError {
    /// The temporary workspace could not be allocated
    #[error("failed to create temporary chart directory")]
    #[diagnostic(code(chartkit::scaffold::workspace))]
    Workspace(#[source] std::io::Error),

    /// Repository settings could not be determined
    #[error("failed to load repository settings")]
    #[diagnostic(code(chartkit::scaffold::settings))]
    Settings(#[source] RepoError),

    /// The default chart template could not be written
    #[error("failed to scaffold default chart")]
    #[diagnostic(code(chartkit::scaffold::scaffold))]
    Scaffold(#[source] CoreError),

    /// A chart on disk is malformed
    #[error("failed to load chart from {}", path.display())]
    #[diagnostic(code(chartkit::scaffold::load))]
    Load {
        path: PathBuf,
        #[source]
        source: CoreError,
    },

    /// Repository lookup or download failed
    #[error("failed to fetch chart {reference}")]
    #[diagnostic(
        code(chartkit::scaffold::fetch),
        help("check the chart reference and the repositories configured in repositories.yaml")
    )]
    Fetch {
        reference: String,
        #[source]
        source: RepoError,
    },

    /// One or more declared dependencies could not be resolved
    #[error("failed to fetch chart dependencies for {}", path.display())]
    #[diagnostic(code(chartkit::scaffold::dependency))]
    Dependency {
        path: PathBuf,
        #[source]
        source: RepoError,
        /// Dependency manager output captured during the build
        #[help]
        output: Option<String>,
    },

    /// The project could not be written to
    #[error("failed to write chart into project {}", path.display())]
    #[diagnostic(code(chartkit::scaffold::project))]
    Project {
        path: PathBuf,
        #[source]
        source: CoreError,
    },

    /// The PROJECT file could not be read
    #[error("failed to read project configuration {}", path.display())]
    #[diagnostic(code(chartkit::scaffold::config))]
    Config {
        path: PathBuf,
        message: String,
    },
}

impl AcquireError {
    pub(crate) fn load(path: impl Into<PathBuf>, source: CoreError) -> Self {
        Self::Load {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn fetch(reference: impl Into<String>, source: impl Into<RepoError>) -> Self {
        Self::Fetch {
            reference: reference.into(),
            source: source.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AcquireError>;
