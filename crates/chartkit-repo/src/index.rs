//! Repository index (`index.yaml`)

use chartkit_core::{ChartMetadata, VersionConstraint, parse_lenient};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::Path;
use url::Url;

use crate::error::{RepoError, Result};

/// Repository index
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexFile {
    #[serde(default)]
    pub api_version: String,

    #[serde(default = "Utc::now")]
    pub generated: DateTime<Utc>,

    /// Chart versions by chart name, highest version first once sorted
    #[serde(default)]
    pub entries: BTreeMap<String, Vec<ChartVersion>>,
}

/// One published version of a chart
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartVersion {
    #[serde(flatten)]
    pub metadata: ChartMetadata,

    /// Download locations; relative entries resolve against the repository URL
    #[serde(default)]
    pub urls: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "is_false")]
    pub removed: bool,

    /// Hex SHA-256 of the archive
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

fn is_false(b: &bool) -> bool {
    !*b
}

impl ChartVersion {
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn version(&self) -> &str {
        &self.metadata.version
    }

    /// Primary download URL
    pub fn download_url(&self) -> Option<&str> {
        self.urls.first().map(String::as_str)
    }
}

impl IndexFile {
    /// Parse an index, sorting every entry list by descending version
    pub fn from_bytes(data: &[u8], source: &str) -> Result<Self> {
        let mut index: Self =
            serde_yaml::from_slice(data).map_err(|e| RepoError::InvalidIndex {
                message: format!("{}: {}", source, e),
            })?;
        if index.api_version.is_empty() {
            return Err(RepoError::InvalidIndex {
                message: format!("{}: no API version specified", source),
            });
        }
        index.sort_entries();
        Ok(index)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read(path)?;
        Self::from_bytes(&data, &path.display().to_string())
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_yaml::to_string(self)?)?;
        Ok(())
    }

    fn sort_entries(&mut self) {
        for versions in self.entries.values_mut() {
            versions.sort_by(|a, b| compare_versions(b.version(), a.version()));
        }
    }

    /// Whether the index lists a chart
    pub fn has(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Get the highest version of `name` satisfying `version`
    ///
    /// An empty `version` selects the latest stable release. An exact string
    /// match always wins, which allows non-SemVer versions to be pinned.
    pub fn get(&self, name: &str, version: &str) -> Option<&ChartVersion> {
        let versions = self.entries.get(name)?;
        let constraint = VersionConstraint::parse(version).ok();

        versions.iter().filter(|cv| !cv.removed).find(|cv| {
            if !version.is_empty() && cv.version() == version {
                return true;
            }
            match (&constraint, parse_lenient(cv.version())) {
                (Some(constraint), Some(v)) => constraint.matches(&v),
                _ => false,
            }
        })
    }

    /// Every listed version of `name`, highest first
    pub fn versions(&self, name: &str) -> &[ChartVersion] {
        self.entries.get(name).map(Vec::as_slice).unwrap_or_default()
    }
}

fn compare_versions(a: &str, b: &str) -> Ordering {
    match (parse_lenient(a), parse_lenient(b)) {
        (Some(va), Some(vb)) => va.cmp(&vb),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        (None, None) => a.cmp(b),
    }
}

/// Resolve a chart URL from an index against the repository URL
///
/// Absolute chart URLs are returned as is. The repository URL is treated as
/// a directory and its query string is carried over.
pub fn resolve_reference_url(repo_url: &str, chart_url: &str) -> Result<Url> {
    if let Ok(absolute) = Url::parse(chart_url) {
        return Ok(absolute);
    }

    let mut base = Url::parse(repo_url).map_err(|e| RepoError::InvalidRepositoryUrl {
        url: repo_url.to_string(),
        reason: e.to_string(),
    })?;
    let query = base.query().map(str::to_string);
    let dir_path = format!("{}/", base.path().trim_end_matches('/'));
    base.set_path(&dir_path);
    base.set_query(None);

    let mut resolved = base.join(chart_url)?;
    if resolved.query().is_none() {
        resolved.set_query(query.as_deref());
    }
    Ok(resolved)
}
