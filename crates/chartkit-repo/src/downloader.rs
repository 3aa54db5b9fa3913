//! Chart reference resolution and download
//!
//! A reference is either an absolute URL to an archive or
//! `<repoName>/<chartName>`, looked up in the named repository's index.

use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use url::Url;

use crate::config::{Repository, RepositoryConfig};
use crate::error::{RepoError, Result};
use crate::getter::{GetterOptions, Getters};
use crate::index::{IndexFile, resolve_reference_url};
use crate::settings::Settings;

/// A chart location ready to download
#[derive(Debug, Clone)]
pub struct ResolvedChart {
    pub url: Url,
    pub options: GetterOptions,
    /// Expected archive digest from the index
    pub digest: Option<String>,
}

// ============ Index loading ============

/// Fetch a repository's `index.yaml`
pub async fn fetch_index(getters: &Getters, repo: &Repository) -> Result<IndexFile> {
    let index_url = repo.index_url();
    let url = Url::parse(&index_url).map_err(|e| RepoError::InvalidRepositoryUrl {
        url: repo.url.clone(),
        reason: e.to_string(),
    })?;
    let options = GetterOptions::for_repository(repo, &index_url);
    let data = getters.fetch(&url, &options).await?;
    IndexFile::from_bytes(&data, &index_url)
}

/// Loads repository indexes once per operation, backed by the on-disk cache
pub struct IndexLoader<'a> {
    settings: &'a Settings,
    getters: &'a Getters,
    loaded: HashMap<String, IndexFile>,
}

impl<'a> IndexLoader<'a> {
    pub fn new(settings: &'a Settings, getters: &'a Getters) -> Self {
        Self {
            settings,
            getters,
            loaded: HashMap::new(),
        }
    }

    /// Index for `repo`, read from the cache when present, fetched and
    /// cached otherwise
    pub async fn cached(&mut self, repo: &Repository) -> Result<&IndexFile> {
        if !self.loaded.contains_key(&repo.name) {
            let path = self.settings.index_cache_path(&repo.name);
            let index = match IndexFile::load(&path) {
                Ok(index) => index,
                Err(e) => {
                    if path.exists() {
                        tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable index cache");
                    }
                    self.fetch_and_store(repo).await?
                }
            };
            self.loaded.insert(repo.name.clone(), index);
        }
        Ok(&self.loaded[&repo.name])
    }

    /// Fetch a fresh index for `repo` and write it to the cache
    pub async fn refresh(&mut self, repo: &Repository) -> Result<&IndexFile> {
        let index = self.fetch_and_store(repo).await?;
        self.loaded.insert(repo.name.clone(), index);
        Ok(&self.loaded[&repo.name])
    }

    /// Whether `repo`'s index was already loaded by this loader
    pub fn is_loaded(&self, repo: &Repository) -> bool {
        self.loaded.contains_key(&repo.name)
    }

    async fn fetch_and_store(&self, repo: &Repository) -> Result<IndexFile> {
        let index = fetch_index(self.getters, repo).await?;
        let path = self.settings.index_cache_path(&repo.name);
        index.save(&path)?;
        tracing::debug!(repo = %repo.name, path = %path.display(), "cached repository index");
        Ok(index)
    }
}

// ============ Downloader ============

pub struct ChartDownloader<'a> {
    settings: &'a Settings,
    getters: &'a Getters,
    indexes: IndexLoader<'a>,
}

impl<'a> ChartDownloader<'a> {
    pub fn new(settings: &'a Settings, getters: &'a Getters) -> Self {
        Self {
            settings,
            getters,
            indexes: IndexLoader::new(settings, getters),
        }
    }

    fn repositories(&self) -> Result<RepositoryConfig> {
        RepositoryConfig::load(&self.settings.repository_config)
    }

    /// Resolve a chart reference to a download location
    ///
    /// An empty `version` selects the latest stable release.
    pub async fn resolve_chart_version(
        &mut self,
        reference: &str,
        version: &str,
    ) -> Result<ResolvedChart> {
        if let Ok(url) = Url::parse(reference) {
            if (url.has_host() || url.scheme() == "file") && !url.path().trim_matches('/').is_empty() {
                let config = self.repositories()?;
                let options = config
                    .repositories
                    .iter()
                    .find(|r| reference.starts_with(r.url.trim_end_matches('/')))
                    .map(|r| GetterOptions::for_repository(r, reference))
                    .unwrap_or_default();
                return Ok(ResolvedChart {
                    url,
                    options,
                    digest: None,
                });
            }
        }

        let (repo_name, chart_name) =
            reference
                .split_once('/')
                .ok_or_else(|| RepoError::InvalidRepositoryUrl {
                    url: reference.to_string(),
                    reason: "non-absolute URLs should be in form of repo_name/path_to_chart"
                        .to_string(),
                })?;

        let config = self.repositories()?;
        let repo = config.require(repo_name)?.clone();
        let index = self.indexes.cached(&repo).await?;

        let cv = index
            .get(chart_name, version)
            .ok_or_else(|| chart_not_found(chart_name, version, &repo.name))?;
        resolve_entry(&repo, cv.download_url(), chart_name, cv.digest.clone())
    }

    /// Locate a chart in the repository at `repo_url` by fetching its index
    pub async fn find_chart_in_repo_url(
        &self,
        repo_url: &str,
        chart_name: &str,
        version: &str,
    ) -> Result<ResolvedChart> {
        let config = self.repositories()?;
        let repo = config
            .find_by_url(repo_url)
            .cloned()
            .unwrap_or_else(|| Repository::new(repo_url, repo_url));

        let index = fetch_index(self.getters, &repo).await?;
        let cv = index
            .get(chart_name, version)
            .ok_or_else(|| chart_not_found(chart_name, version, repo_url))?;
        resolve_entry(&repo, cv.download_url(), chart_name, cv.digest.clone())
    }

    /// Resolve `reference` and download it into `dest`
    pub async fn download_to(
        &mut self,
        reference: &str,
        version: &str,
        dest: &Path,
    ) -> Result<PathBuf> {
        let resolved = self.resolve_chart_version(reference, version).await?;
        self.download_resolved(&resolved, dest).await
    }

    /// Download a resolved chart into `dest`, named after the URL's last segment
    pub async fn download_resolved(&self, resolved: &ResolvedChart, dest: &Path) -> Result<PathBuf> {
        let file_name = resolved
            .url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|name| !name.is_empty())
            .ok_or_else(|| RepoError::InvalidRepositoryUrl {
                url: resolved.url.to_string(),
                reason: "URL does not name a file".to_string(),
            })?
            .to_string();

        let path = dest.join(&file_name);
        self.download_file(resolved, &path).await?;
        Ok(path)
    }

    /// Download a resolved chart to exactly `path`
    pub async fn download_file(&self, resolved: &ResolvedChart, path: &Path) -> Result<()> {
        let data = self.getters.fetch(&resolved.url, &resolved.options).await?;

        if let Some(expected) = &resolved.digest {
            let actual = hex::encode(Sha256::digest(&data));
            if !digest_matches(expected, &actual) {
                return Err(RepoError::IntegrityCheckFailed {
                    name: resolved.url.to_string(),
                    expected: expected.clone(),
                    actual,
                });
            }
        }

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, &data)?;
        tracing::debug!(url = %resolved.url, path = %path.display(), "downloaded chart");
        Ok(())
    }

    /// Access the index loader shared with this downloader
    pub fn indexes(&mut self) -> &mut IndexLoader<'a> {
        &mut self.indexes
    }
}

fn chart_not_found(name: &str, version: &str, repo: &str) -> RepoError {
    RepoError::ChartNotFound {
        name: name.to_string(),
        version: if version.is_empty() {
            "latest".to_string()
        } else {
            version.to_string()
        },
        repo: repo.to_string(),
    }
}

/// Build the download location for an index entry of `repo`
pub(crate) fn resolve_entry(
    repo: &Repository,
    url: Option<&str>,
    chart_name: &str,
    digest: Option<String>,
) -> Result<ResolvedChart> {
    let url = url.ok_or_else(|| RepoError::InvalidIndex {
        message: format!("chart \"{}\" has no downloadable URLs", chart_name),
    })?;
    let url = resolve_reference_url(&repo.url, url)?;
    let options = GetterOptions::for_repository(repo, url.as_str());
    Ok(ResolvedChart {
        url,
        options,
        digest: digest.filter(|d| !d.is_empty()),
    })
}

fn digest_matches(expected: &str, actual: &str) -> bool {
    let normalize = |d: &str| {
        d.trim()
            .to_lowercase()
            .replace("sha256:", "")
            .replace("sha256-", "")
    };
    normalize(expected) == normalize(actual)
}
