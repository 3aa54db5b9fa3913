//! `Chart.lock` format
//!
//! The digest is computed exactly as Helm computes it, so lock files written
//! here are accepted by `helm dependency build` and vice versa.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;

use crate::chart::Dependency;
use crate::error::{CoreError, Result};

/// Lock file contents
///
/// Fields are declared in the key order Helm writes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartLock {
    /// Resolved dependencies, in declaration order
    #[serde(default)]
    pub dependencies: Vec<LockedDependency>,

    /// `sha256:<hex>` over the requested and resolved dependency lists
    pub digest: String,

    pub generated: DateTime<Utc>,
}

/// A dependency pinned to an exact version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockedDependency {
    pub name: String,

    /// Repository as written in `Chart.yaml`
    #[serde(default)]
    pub repository: String,

    /// Exact resolved version
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
}

impl LockedDependency {
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        repository: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            repository: repository.into(),
        }
    }
}

impl ChartLock {
    /// Create a lock for `locked`, digesting it together with the requested dependencies
    pub fn new(requested: &[Dependency], locked: Vec<LockedDependency>) -> Result<Self> {
        let digest = hash_req(requested, &locked)?;
        Ok(Self {
            dependencies: locked,
            digest,
            generated: Utc::now(),
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read(path)?;
        serde_yaml::from_slice(&content).map_err(|source| CoreError::YamlParse {
            file: path.display().to_string(),
            source,
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, serde_yaml::to_string(self)?)?;
        Ok(())
    }

    /// Whether the requested dependencies changed since this lock was written
    pub fn is_outdated(&self, requested: &[Dependency]) -> Result<bool> {
        Ok(hash_req(requested, &self.dependencies)? != self.digest)
    }

    /// Get a locked dependency by name
    pub fn get(&self, name: &str) -> Option<&LockedDependency> {
        self.dependencies.iter().find(|d| d.name == name)
    }
}

// ============ Digest ============

/// Field layout of a dependency in Helm's JSON encoding
#[derive(Serialize)]
struct HashDependency<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    version: &'a str,
    repository: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    condition: Option<&'a str>,
    #[serde(skip_serializing_if = "<[_]>::is_empty")]
    tags: &'a [String],
    #[serde(skip_serializing_if = "is_false")]
    enabled: bool,
    #[serde(rename = "import-values", skip_serializing_if = "<[_]>::is_empty")]
    import_values: &'a [serde_yaml::Value],
    #[serde(skip_serializing_if = "Option::is_none")]
    alias: Option<&'a str>,
}

fn is_false(b: &bool) -> bool {
    !*b
}

impl<'a> From<&'a Dependency> for HashDependency<'a> {
    fn from(dep: &'a Dependency) -> Self {
        Self {
            name: &dep.name,
            version: &dep.version,
            repository: &dep.repository,
            condition: dep.condition.as_deref().filter(|c| !c.is_empty()),
            tags: &dep.tags,
            enabled: dep.enabled,
            import_values: &dep.import_values,
            alias: dep.alias.as_deref().filter(|a| !a.is_empty()),
        }
    }
}

impl<'a> From<&'a LockedDependency> for HashDependency<'a> {
    fn from(dep: &'a LockedDependency) -> Self {
        Self {
            name: &dep.name,
            version: &dep.version,
            repository: &dep.repository,
            condition: None,
            tags: &[],
            enabled: false,
            import_values: &[],
            alias: None,
        }
    }
}

/// Compute the lock digest for a requested and a resolved dependency list
///
/// A chart without dependencies encodes its request list as `null`, the way
/// an absent list is encoded when Helm reads `Chart.yaml`.
pub fn hash_req(requested: &[Dependency], locked: &[LockedDependency]) -> Result<String> {
    let requested: Option<Vec<HashDependency<'_>>> = if requested.is_empty() {
        None
    } else {
        Some(requested.iter().map(HashDependency::from).collect())
    };
    let locked: Vec<HashDependency<'_>> = locked.iter().map(HashDependency::from).collect();

    let json = go_html_escape(&serde_json::to_string(&(requested, locked))?);
    let digest = Sha256::digest(json.as_bytes());
    Ok(format!("sha256:{}", hex::encode(digest)))
}

/// Apply the escaping Go's `encoding/json` performs by default
fn go_html_escape(json: &str) -> String {
    let mut out = String::with_capacity(json.len());
    for ch in json.chars() {
        match ch {
            '<' => out.push_str("\\u003c"),
            '>' => out.push_str("\\u003e"),
            '&' => out.push_str("\\u0026"),
            '\u{2028}' => out.push_str("\\u2028"),
            '\u{2029}' => out.push_str("\\u2029"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn requested() -> Vec<Dependency> {
        vec![Dependency::new("redis", "^17.0.0", "https://charts.example.com")]
    }

    fn locked() -> Vec<LockedDependency> {
        vec![LockedDependency::new("redis", "17.3.2", "https://charts.example.com")]
    }

    #[test]
    fn test_hash_is_sha256_prefixed() {
        let digest = hash_req(&requested(), &locked()).unwrap();
        assert!(digest.starts_with("sha256:"));
        assert_eq!(digest.len(), "sha256:".len() + 64);
    }

    #[test]
    fn test_hash_encoding_layout() {
        let req = requested();
        let hashed: Vec<HashDependency<'_>> = req.iter().map(HashDependency::from).collect();
        let json = serde_json::to_string(&hashed).unwrap();
        assert_eq!(
            json,
            r#"[{"name":"redis","version":"^17.0.0","repository":"https://charts.example.com"}]"#
        );
    }

    #[test]
    fn test_hash_escapes_like_go() {
        assert_eq!(
            go_html_escape(r#"">=1.0.0 <2.0.0""#),
            r#""\u003e=1.0.0 \u003c2.0.0""#
        );
        assert_eq!(go_html_escape("a&b"), "a\\u0026b");
    }

    #[test]
    fn test_empty_request_encodes_as_null() {
        let empty: [Dependency; 0] = [];
        let json = serde_json::to_string(&(
            Option::<Vec<HashDependency<'_>>>::None,
            Vec::<HashDependency<'_>>::new(),
        ))
        .unwrap();
        assert_eq!(json, "[null,[]]");
        assert!(hash_req(&empty, &[]).is_ok());
    }

    #[test]
    fn test_is_outdated() {
        let lock = ChartLock::new(&requested(), locked()).unwrap();
        assert!(!lock.is_outdated(&requested()).unwrap());

        let changed = vec![Dependency::new("redis", "^18.0.0", "https://charts.example.com")];
        assert!(lock.is_outdated(&changed).unwrap());
    }

    #[test]
    fn test_save_and_load() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("Chart.lock");

        let lock = ChartLock::new(&requested(), locked()).unwrap();
        lock.save(&path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("dependencies:\n- name: redis\n  repository: https://charts.example.com\n  version: 17.3.2\ndigest: sha256:"));

        let loaded = ChartLock::load(&path).unwrap();
        assert_eq!(loaded, lock);
        assert_eq!(loaded.get("redis").unwrap().version, "17.3.2");
    }
}
