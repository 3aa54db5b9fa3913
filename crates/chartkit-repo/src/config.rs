//! Repository configuration (`repositories.yaml`)
//!
//! The file layout is Helm's, so repositories added with `helm repo add`
//! are usable directly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::credentials::{Credentials, ScopedCredentials, TlsOptions};
use crate::error::{RepoError, Result};

/// Repository configuration file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryConfig {
    #[serde(default = "default_api_version")]
    pub api_version: String,

    #[serde(default = "Utc::now")]
    pub generated: DateTime<Utc>,

    #[serde(default)]
    pub repositories: Vec<Repository>,
}

fn default_api_version() -> String {
    "v1".to_string()
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            api_version: default_api_version(),
            generated: Utc::now(),
            repositories: Vec::new(),
        }
    }
}

impl RepositoryConfig {
    /// Load configuration; a missing file is an empty configuration
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load_from(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get a repository by name
    pub fn get(&self, name: &str) -> Option<&Repository> {
        self.repositories.iter().find(|r| r.name == name)
    }

    /// Get a repository by name, failing when it is not configured
    pub fn require(&self, name: &str) -> Result<&Repository> {
        self.get(name).ok_or_else(|| RepoError::RepositoryNotFound {
            name: name.to_string(),
        })
    }

    /// Find a repository whose URL matches, ignoring trailing slashes
    pub fn find_by_url(&self, url: &str) -> Option<&Repository> {
        let url = url.trim_end_matches('/');
        self.repositories
            .iter()
            .find(|r| r.url.trim_end_matches('/') == url)
    }

    /// Add or replace a repository
    pub fn update(&mut self, repo: Repository) {
        match self.repositories.iter_mut().find(|r| r.name == repo.name) {
            Some(existing) => *existing = repo,
            None => self.repositories.push(repo),
        }
    }

    /// Remove a repository by name
    pub fn remove(&mut self, name: &str) -> Result<Repository> {
        let idx = self
            .repositories
            .iter()
            .position(|r| r.name == name)
            .ok_or_else(|| RepoError::RepositoryNotFound {
                name: name.to_string(),
            })?;
        Ok(self.repositories.remove(idx))
    }

    pub fn names(&self) -> Vec<&str> {
        self.repositories.iter().map(|r| r.name.as_str()).collect()
    }
}

/// Repository entry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    pub name: String,

    pub url: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub username: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub password: String,

    #[serde(default, rename = "certFile", skip_serializing_if = "Option::is_none")]
    pub cert_file: Option<PathBuf>,

    #[serde(default, rename = "keyFile", skip_serializing_if = "Option::is_none")]
    pub key_file: Option<PathBuf>,

    #[serde(default, rename = "caFile", skip_serializing_if = "Option::is_none")]
    pub ca_file: Option<PathBuf>,

    #[serde(default)]
    pub insecure_skip_tls_verify: bool,

    /// Send credentials to chart URLs on other domains too
    #[serde(default)]
    pub pass_credentials_all: bool,
}

impl Repository {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            ..Self::default()
        }
    }

    /// Location of the repository's `index.yaml`
    pub fn index_url(&self) -> String {
        format!("{}/index.yaml", self.url.trim_end_matches('/'))
    }

    pub fn credentials(&self) -> Option<Credentials> {
        if self.username.is_empty() && self.password.is_empty() {
            None
        } else {
            Some(Credentials::basic(&self.username, &self.password))
        }
    }

    /// Credentials scoped for a request to `target`
    ///
    /// Credentials are bound to the repository URL; with
    /// `pass_credentials_all` they also cover the target's origin.
    pub fn scoped_credentials(&self, target: &str) -> ScopedCredentials {
        let mut scoped = ScopedCredentials::default();
        if let Some(creds) = self.credentials() {
            if self.pass_credentials_all {
                if let Ok(url) = url::Url::parse(target) {
                    scoped.add(url.origin().ascii_serialization().as_str(), creds.clone());
                }
            }
            scoped.add(&self.url, creds);
        }
        scoped
    }

    pub fn tls_options(&self) -> TlsOptions {
        // Helm writes unset paths as empty strings
        let non_empty = |p: &Option<PathBuf>| p.clone().filter(|p| !p.as_os_str().is_empty());
        TlsOptions {
            ca_file: non_empty(&self.ca_file),
            cert_file: non_empty(&self.cert_file),
            key_file: non_empty(&self.key_file),
            insecure_skip_tls_verify: self.insecure_skip_tls_verify,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const REPOSITORIES_YAML: &str = r#"apiVersion: ""
generated: "2024-01-01T00:00:00Z"
repositories:
- caFile: ""
  certFile: ""
  insecure_skip_tls_verify: false
  keyFile: ""
  name: bitnami
  pass_credentials_all: false
  password: ""
  url: https://charts.bitnami.com/bitnami
  username: ""
- name: private
  url: https://charts.example.com/
  username: admin
  password: secret
  pass_credentials_all: true
"#;

    #[test]
    fn test_parse_helm_repositories_file() {
        let config: RepositoryConfig = serde_yaml::from_str(REPOSITORIES_YAML).unwrap();
        assert_eq!(config.names(), vec!["bitnami", "private"]);

        let bitnami = config.get("bitnami").unwrap();
        assert!(bitnami.credentials().is_none());
        assert_eq!(bitnami.index_url(), "https://charts.bitnami.com/bitnami/index.yaml");

        let private = config.find_by_url("https://charts.example.com").unwrap();
        assert_eq!(private.name, "private");
        assert!(private.pass_credentials_all);
        assert!(private.credentials().is_some());
        assert!(bitnami.tls_options().ca_file.is_none());
    }

    #[test]
    fn test_require_missing() {
        let config = RepositoryConfig::default();
        let err = config.require("myrepo").unwrap_err();
        assert!(err.to_string().contains("no repo named \"myrepo\""));
    }

    #[test]
    fn test_missing_file_is_empty() {
        let temp = TempDir::new().unwrap();
        let config = RepositoryConfig::load(&temp.path().join("repositories.yaml")).unwrap();
        assert!(config.repositories.is_empty());
    }

    #[test]
    fn test_update_save_load() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("helm/repositories.yaml");

        let mut config = RepositoryConfig::default();
        config.update(Repository::new("stable", "https://a.example.com"));
        config.update(Repository::new("stable", "https://b.example.com"));
        config.save_to(&path).unwrap();

        let loaded = RepositoryConfig::load(&path).unwrap();
        assert_eq!(loaded.repositories.len(), 1);
        assert_eq!(loaded.get("stable").unwrap().url, "https://b.example.com");

        let mut loaded = loaded;
        loaded.remove("stable").unwrap();
        assert!(loaded.remove("stable").is_err());
    }

    #[test]
    fn test_scoped_credentials() {
        let mut repo = Repository::new("private", "https://charts.example.com");
        repo.username = "admin".to_string();
        repo.password = "secret".to_string();

        let scoped = repo.scoped_credentials("https://cdn.example.net/app-1.0.0.tgz");
        assert!(scoped.for_url("https://charts.example.com/index.yaml").is_some());
        assert!(scoped.for_url("https://cdn.example.net/app-1.0.0.tgz").is_none());

        repo.pass_credentials_all = true;
        let scoped = repo.scoped_credentials("https://cdn.example.net/app-1.0.0.tgz");
        assert!(scoped.for_url("https://cdn.example.net/app-1.0.0.tgz").is_some());
    }
}
