//! Dependency resolution
//!
//! Turns the dependencies requested in `Chart.yaml` into exact versions,
//! producing the entries of `Chart.lock`.

use chartkit_core::chart::CHARTS_DIR;
use chartkit_core::{Chart, Dependency, LockedDependency, VersionConstraint, parse_lenient};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

use crate::config::{Repository, RepositoryConfig};
use crate::downloader::IndexLoader;
use crate::error::{RepoError, Result};

/// Prefix of repository names synthesized for URLs absent from `repositories.yaml`
const MANAGER_KEY_PREFIX: &str = "helm-manager-";

/// Where a dependency is obtained from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DependencySource {
    /// No repository: the chart must already be under `charts/`
    Vendored,
    /// `file://` reference to a chart directory
    Local(PathBuf),
    /// A chart repository, configured or synthesized from its URL
    Repository(Repository),
}

impl DependencySource {
    /// Classify a dependency's `repository` field
    pub fn classify(repository: &str, chart_path: &Path, config: &RepositoryConfig) -> Result<Self> {
        if repository.is_empty() {
            return Ok(Self::Vendored);
        }

        if let Some(path) = repository.strip_prefix("file://") {
            let path = Path::new(path);
            let path = if path.is_absolute() {
                path.to_path_buf()
            } else {
                chart_path.join(path)
            };
            return Ok(Self::Local(path));
        }

        if repository.starts_with("oci://") {
            return Err(RepoError::UnsupportedScheme {
                scheme: "oci".to_string(),
            });
        }

        if let Some(name) = repository
            .strip_prefix('@')
            .or_else(|| repository.strip_prefix("alias:"))
        {
            return config.require(name).cloned().map(Self::Repository);
        }

        if repository.starts_with("http://") || repository.starts_with("https://") {
            let repo = config
                .find_by_url(repository)
                .cloned()
                .unwrap_or_else(|| Repository::new(manager_key(repository), repository));
            return Ok(Self::Repository(repo));
        }

        Err(RepoError::InvalidRepositoryUrl {
            url: repository.to_string(),
            reason: "expected an http(s):// or file:// URL, or a @name / alias:name reference"
                .to_string(),
        })
    }
}

/// Repository name used to cache the index of an unconfigured repository URL
pub fn manager_key(url: &str) -> String {
    let digest = Sha256::digest(url.trim_end_matches('/').as_bytes());
    format!("{}{}", MANAGER_KEY_PREFIX, hex::encode(digest))
}

/// Check whether a dependency is vendored under `charts/`, either as a
/// `charts/<name>` directory or as an archive of a chart with that name
pub fn is_vendored(chart_path: &Path, name: &str) -> bool {
    let charts_dir = chart_path.join(CHARTS_DIR);
    if charts_dir.join(name).exists() {
        return true;
    }
    archives_in(&charts_dir)
        .iter()
        .any(|(_, chart)| chart.name() == name)
}

/// Every loadable `.tgz` archive directly under `dir`
pub(crate) fn archives_in(dir: &Path) -> Vec<(PathBuf, Chart)> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };

    let mut archives: Vec<(PathBuf, Chart)> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "tgz"))
        .filter_map(|path| match Chart::load(&path) {
            Ok(chart) => Some((path, chart)),
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "skipping unreadable archive");
                None
            }
        })
        .collect();
    archives.sort_by(|a, b| a.0.cmp(&b.0));
    archives
}

pub struct Resolver<'p> {
    chart_path: &'p Path,
}

impl<'p> Resolver<'p> {
    pub fn new(chart_path: &'p Path) -> Self {
        Self { chart_path }
    }

    /// Resolve every requested dependency to an exact version
    ///
    /// Repository indexes are fetched fresh once per loader.
    pub async fn resolve(
        &self,
        requested: &[Dependency],
        config: &RepositoryConfig,
        indexes: &mut IndexLoader<'_>,
    ) -> Result<Vec<LockedDependency>> {
        let mut locked = Vec::with_capacity(requested.len());

        for dep in requested {
            let constraint = VersionConstraint::parse(&dep.version).map_err(|e| {
                RepoError::ResolutionFailed {
                    message: format!(
                        "dependency \"{}\" has an invalid version/constraint format: {}",
                        dep.name, e
                    ),
                }
            })?;

            let version = match DependencySource::classify(&dep.repository, self.chart_path, config)? {
                DependencySource::Vendored => {
                    if !is_vendored(self.chart_path, &dep.name) {
                        return Err(RepoError::DependencyMissing {
                            name: dep.name.clone(),
                        });
                    }
                    dep.version.clone()
                }
                DependencySource::Local(path) => {
                    let chart = Chart::load(&path)?;
                    let matches = parse_lenient(chart.version())
                        .is_some_and(|v| constraint.matches(&v));
                    if !matches {
                        return Err(RepoError::ResolutionFailed {
                            message: format!(
                                "can't get a valid version for dependency {}",
                                dep.name
                            ),
                        });
                    }
                    chart.version().to_string()
                }
                DependencySource::Repository(repo) => {
                    let index = if indexes.is_loaded(&repo) {
                        indexes.cached(&repo).await?
                    } else {
                        indexes.refresh(&repo).await?
                    };

                    if !index.has(&dep.name) {
                        return Err(RepoError::ChartNotFound {
                            name: dep.name.clone(),
                            version: dep.version.clone(),
                            repo: repo.url.clone(),
                        });
                    }

                    index
                        .versions(&dep.name)
                        .iter()
                        .filter(|cv| !cv.removed)
                        .find(|cv| {
                            parse_lenient(cv.version()).is_some_and(|v| constraint.matches(&v))
                        })
                        .map(|cv| cv.version().to_string())
                        .ok_or_else(|| RepoError::ResolutionFailed {
                            message: format!(
                                "can't get a valid version for repositories {}. Try changing the version constraint in Chart.yaml",
                                dep.name
                            ),
                        })?
                }
            };

            tracing::debug!(dependency = %dep.name, constraint = %constraint, version = %version, "resolved dependency");
            locked.push(LockedDependency::new(&dep.name, version, &dep.repository));
        }

        Ok(locked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config() -> RepositoryConfig {
        let mut config = RepositoryConfig::default();
        config.update(Repository::new("stable", "https://charts.example.com/stable"));
        config
    }

    #[test]
    fn test_classify() {
        let chart = Path::new("/work/app");
        let config = config();

        assert_eq!(
            DependencySource::classify("", chart, &config).unwrap(),
            DependencySource::Vendored
        );
        assert_eq!(
            DependencySource::classify("file://../lib", chart, &config).unwrap(),
            DependencySource::Local(PathBuf::from("/work/app/../lib"))
        );
        assert_eq!(
            DependencySource::classify("file:///abs/lib", chart, &config).unwrap(),
            DependencySource::Local(PathBuf::from("/abs/lib"))
        );

        for reference in ["@stable", "alias:stable", "https://charts.example.com/stable/"] {
            match DependencySource::classify(reference, chart, &config).unwrap() {
                DependencySource::Repository(repo) => assert_eq!(repo.name, "stable"),
                other => panic!("unexpected source for {}: {:?}", reference, other),
            }
        }
    }

    #[test]
    fn test_classify_unconfigured_url() {
        let source =
            DependencySource::classify("https://other.example.com", Path::new("."), &config()).unwrap();
        match source {
            DependencySource::Repository(repo) => {
                assert!(repo.name.starts_with(MANAGER_KEY_PREFIX));
                assert_eq!(repo.name, manager_key("https://other.example.com/"));
            }
            other => panic!("unexpected source: {:?}", other),
        }
    }

    #[test]
    fn test_classify_errors() {
        let chart = Path::new(".");
        assert!(matches!(
            DependencySource::classify("oci://registry.example.com/charts", chart, &config()),
            Err(RepoError::UnsupportedScheme { .. })
        ));
        assert!(matches!(
            DependencySource::classify("@missing", chart, &config()),
            Err(RepoError::RepositoryNotFound { .. })
        ));
        assert!(DependencySource::classify("ftp://x", chart, &config()).is_err());
    }

    #[test]
    fn test_is_vendored() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join("charts/common")).unwrap();
        assert!(is_vendored(temp.path(), "common"));
        assert!(!is_vendored(temp.path(), "redis"));
    }

    #[tokio::test]
    async fn test_resolve_local_and_vendored() {
        let temp = TempDir::new().unwrap();
        let parent = temp.path().join("parent");
        std::fs::create_dir_all(parent.join("charts/common")).unwrap();
        chartkit_core::scaffold::create("lib", temp.path()).unwrap();

        let requested = vec![
            Dependency::new("lib", "^0.1.0", "file://../lib"),
            Dependency::new("common", "1.x", ""),
        ];

        let settings = crate::Settings::new(temp.path().join("r.yaml"), temp.path().join("cache"));
        let getters = crate::Getters::all();
        let mut indexes = IndexLoader::new(&settings, &getters);

        let locked = Resolver::new(&parent)
            .resolve(&requested, &RepositoryConfig::default(), &mut indexes)
            .await
            .unwrap();

        assert_eq!(
            locked,
            vec![
                LockedDependency::new("lib", "0.1.0", "file://../lib"),
                LockedDependency::new("common", "1.x", ""),
            ]
        );
    }

    #[tokio::test]
    async fn test_resolve_local_version_mismatch() {
        let temp = TempDir::new().unwrap();
        let parent = temp.path().join("parent");
        std::fs::create_dir_all(&parent).unwrap();
        chartkit_core::scaffold::create("lib", temp.path()).unwrap();

        let requested = vec![Dependency::new("lib", "^2.0.0", "file://../lib")];
        let settings = crate::Settings::new(temp.path().join("r.yaml"), temp.path().join("cache"));
        let getters = crate::Getters::all();
        let mut indexes = IndexLoader::new(&settings, &getters);

        let err = Resolver::new(&parent)
            .resolve(&requested, &RepositoryConfig::default(), &mut indexes)
            .await
            .unwrap_err();
        assert!(matches!(err, RepoError::ResolutionFailed { .. }));
    }
}
