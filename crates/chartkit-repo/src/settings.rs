//! Environment settings shared by every repository operation
//!
//! Paths follow Helm's layout so an existing `helm repo add` setup is picked
//! up as is.

use std::path::{Path, PathBuf};

use crate::error::{RepoError, Result};

pub const REPOSITORY_CONFIG_ENV: &str = "HELM_REPOSITORY_CONFIG";
pub const REPOSITORY_CACHE_ENV: &str = "HELM_REPOSITORY_CACHE";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Path to `repositories.yaml`
    pub repository_config: PathBuf,

    /// Directory holding cached repository indexes
    pub repository_cache: PathBuf,

    /// Parent directory for temporary workspaces (system temp dir when unset)
    pub workspace_root: Option<PathBuf>,
}

impl Settings {
    pub fn new(repository_config: impl Into<PathBuf>, repository_cache: impl Into<PathBuf>) -> Self {
        Self {
            repository_config: repository_config.into(),
            repository_cache: repository_cache.into(),
            workspace_root: None,
        }
    }

    /// Resolve settings from the environment, falling back to the user's
    /// config and cache directories
    pub fn from_env() -> Result<Self> {
        let repository_config = match std::env::var_os(REPOSITORY_CONFIG_ENV) {
            Some(path) => PathBuf::from(path),
            None => dirs::config_dir()
                .ok_or_else(|| RepoError::InvalidConfig {
                    message: "Could not determine config directory".to_string(),
                })?
                .join("helm")
                .join("repositories.yaml"),
        };

        let repository_cache = match std::env::var_os(REPOSITORY_CACHE_ENV) {
            Some(path) => PathBuf::from(path),
            None => dirs::cache_dir()
                .ok_or_else(|| RepoError::InvalidConfig {
                    message: "Could not determine cache directory".to_string(),
                })?
                .join("helm")
                .join("repository"),
        };

        Ok(Self::new(repository_config, repository_cache))
    }

    pub fn with_workspace_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.workspace_root = Some(root.into());
        self
    }

    /// Cached index location for a named repository
    pub fn index_cache_path(&self, repo_name: &str) -> PathBuf {
        self.repository_cache.join(format!("{}-index.yaml", repo_name))
    }

    pub fn workspace_root(&self) -> Option<&Path> {
        self.workspace_root.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_cache_path() {
        let settings = Settings::new("/cfg/repositories.yaml", "/cache/repository");
        assert_eq!(
            settings.index_cache_path("stable"),
            PathBuf::from("/cache/repository/stable-index.yaml")
        );
    }

    #[test]
    fn test_workspace_root() {
        let settings = Settings::new("a", "b");
        assert!(settings.workspace_root().is_none());

        let settings = settings.with_workspace_root("/tmp/ws");
        assert_eq!(settings.workspace_root(), Some(Path::new("/tmp/ws")));
    }
}
