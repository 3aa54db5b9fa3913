//! Chart definition and loading
//!
//! A chart is loaded from either a directory or a packaged `.tgz` archive.
//! Both paths funnel through [`Chart::from_files`], so a chart read from an
//! archive and the same chart read from its unpacked directory are equal.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use crate::archive;
use crate::error::{CoreError, Result};
use crate::ignore::IgnoreRules;
use crate::lock::ChartLock;
use crate::version::parse_lenient;

pub const API_VERSION_V1: &str = "v1";
pub const API_VERSION_V2: &str = "v2";

pub const CHART_FILE: &str = "Chart.yaml";
pub const LOCK_FILE: &str = "Chart.lock";
/// Dependency list of `apiVersion: v1` charts
pub const REQUIREMENTS_FILE: &str = "requirements.yaml";
/// Lock file of `apiVersion: v1` charts
pub const REQUIREMENTS_LOCK_FILE: &str = "requirements.lock";
pub const VALUES_FILE: &str = "values.yaml";
pub const SCHEMA_FILE: &str = "values.schema.json";
pub const IGNORE_FILE: &str = ".helmignore";
pub const TEMPLATES_DIR: &str = "templates";
pub const CHARTS_DIR: &str = "charts";

/// `Chart.yaml` contents
///
/// Fields are declared in alphabetical order so the serialized document
/// matches the key order Helm writes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartMetadata {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,

    /// API version (v1 or v2)
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub api_version: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_version: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<Dependency>,

    #[serde(default, skip_serializing_if = "is_false")]
    pub deprecated: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub home: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kube_version: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub maintainers: Vec<Maintainer>,

    /// Chart name (required)
    #[serde(default)]
    pub name: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<String>,

    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub chart_type: Option<ChartType>,

    /// Chart version (required, SemVer)
    #[serde(default)]
    pub version: String,
}

/// Chart type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartType {
    #[default]
    Application,
    Library,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Maintainer {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// A dependency declared in `Chart.yaml`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dependency {
    /// Name used for the sub-chart once installed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,

    /// Values path toggling the dependency at render time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,

    #[serde(default, skip_serializing_if = "is_false")]
    pub enabled: bool,

    #[serde(default, rename = "import-values", skip_serializing_if = "Vec::is_empty")]
    pub import_values: Vec<serde_yaml::Value>,

    pub name: String,

    /// Repository URL, `@name`/`alias:name` reference, `file://` path, or empty
    #[serde(default)]
    pub repository: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    /// Version constraint
    #[serde(default)]
    pub version: String,
}

impl Dependency {
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        repository: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            repository: repository.into(),
            ..Self::default()
        }
    }

    /// Get the effective name (alias if set, otherwise name)
    #[inline]
    pub fn effective_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

fn is_false(b: &bool) -> bool {
    !*b
}

/// A file inside a chart, named by its slash-separated path relative to the
/// chart root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartFile {
    pub name: String,
    pub data: Vec<u8>,
}

impl ChartFile {
    pub fn new(name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
        }
    }
}

/// An in-memory chart tree
#[derive(Debug, Clone, PartialEq)]
pub struct Chart {
    pub metadata: ChartMetadata,

    /// Parsed `Chart.lock`, if the chart carries one
    pub lock: Option<ChartLock>,

    /// Raw `values.yaml`
    pub values: Option<ChartFile>,

    /// Raw `values.schema.json`
    pub schema: Option<ChartFile>,

    /// Files under `templates/`, sorted by name
    pub templates: Vec<ChartFile>,

    /// Every other file, sorted by name
    pub files: Vec<ChartFile>,

    /// Sub-charts found under `charts/`, sorted by name
    pub dependencies: Vec<Chart>,
}

impl Chart {
    /// Load a chart from a directory or a packaged archive
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let meta = std::fs::metadata(path).map_err(|_| CoreError::ChartNotFound {
            path: path.display().to_string(),
        })?;

        if meta.is_dir() {
            Self::load_dir(path)
        } else {
            Self::load_archive(path)
        }
    }

    /// Load a chart from an unpacked directory, honouring `.helmignore`
    pub fn load_dir(root: &Path) -> Result<Self> {
        let rules = IgnoreRules::load(&root.join(IGNORE_FILE))?;
        let mut files = Vec::new();

        let walker = walkdir::WalkDir::new(root)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| match relative_name(root, entry.path()) {
                Some(name) => !rules.ignored(&name, entry.file_type().is_dir()),
                None => true,
            });

        for entry in walker {
            let entry = entry.map_err(|e| CoreError::Io(e.into()))?;
            if entry.file_type().is_dir() {
                continue;
            }
            let Some(name) = relative_name(root, entry.path()) else {
                continue;
            };
            files.push(ChartFile::new(name, std::fs::read(entry.path())?));
        }

        Self::from_files(files).map_err(|e| annotate(e, root))
    }

    /// Load a chart from a `.tgz` archive
    pub fn load_archive(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let files = archive::read_archive_files(file)?;
        Self::from_files(files).map_err(|e| annotate(e, path))
    }

    /// Assemble a chart from its files
    pub fn from_files(files: Vec<ChartFile>) -> Result<Self> {
        let mut metadata: Option<ChartMetadata> = None;
        let mut lock = None;
        let mut values = None;
        let mut schema = None;
        let mut templates = Vec::new();
        let mut other = Vec::new();
        let mut subcharts: BTreeMap<String, Vec<ChartFile>> = BTreeMap::new();
        let mut requirements = None;
        let mut requirements_lock = None;

        for file in files {
            match file.name.as_str() {
                CHART_FILE => {
                    let parsed: ChartMetadata =
                        serde_yaml::from_slice(&file.data).map_err(|source| {
                            CoreError::YamlParse {
                                file: CHART_FILE.to_string(),
                                source,
                            }
                        })?;
                    metadata = Some(parsed);
                }
                LOCK_FILE => {
                    let parsed: ChartLock =
                        serde_yaml::from_slice(&file.data).map_err(|source| {
                            CoreError::YamlParse {
                                file: LOCK_FILE.to_string(),
                                source,
                            }
                        })?;
                    lock = Some(parsed);
                }
                VALUES_FILE => {
                    serde_yaml::from_slice::<serde_yaml::Value>(&file.data).map_err(
                        |source| CoreError::YamlParse {
                            file: VALUES_FILE.to_string(),
                            source,
                        },
                    )?;
                    values = Some(file);
                }
                REQUIREMENTS_FILE => requirements = Some(file),
                REQUIREMENTS_LOCK_FILE => requirements_lock = Some(file),
                SCHEMA_FILE => schema = Some(file),
                name if name.starts_with("templates/") => templates.push(file),
                name if name.starts_with("charts/") => {
                    let rest = &name["charts/".len()..];
                    // Entries with a leading `.` or `_` are never sub-charts
                    if rest.starts_with(['.', '_']) {
                        continue;
                    }
                    let key = rest.split('/').next().unwrap_or(rest).to_string();
                    subcharts.entry(key).or_default().push(file);
                }
                _ => other.push(file),
            }
        }

        let mut metadata = metadata.ok_or_else(|| CoreError::invalid("Chart.yaml file is missing"))?;
        if metadata.api_version.is_empty() {
            metadata.api_version = API_VERSION_V1.to_string();
        }

        if metadata.api_version == API_VERSION_V1 {
            if let Some(file) = requirements {
                let parsed: Requirements = parse_yaml(&file, REQUIREMENTS_FILE)?;
                metadata.dependencies = parsed.dependencies;
                other.push(file);
            }
            if let Some(file) = requirements_lock {
                lock = Some(parse_yaml(&file, REQUIREMENTS_LOCK_FILE)?);
            }
        } else {
            for file in requirements.into_iter().chain(requirements_lock) {
                tracing::warn!(
                    file = %file.name,
                    "dependencies are declared in Chart.yaml since apiVersion v2, ignoring"
                );
                other.push(file);
            }
        }
        validate_metadata(&metadata)?;

        let mut dependencies = Vec::with_capacity(subcharts.len());
        for (key, files) in subcharts {
            dependencies.push(load_subchart(&key, files)?);
        }
        dependencies.sort_by(|a, b| a.name().cmp(b.name()));

        templates.sort_by(|a, b| a.name.cmp(&b.name));
        other.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(Self {
            metadata,
            lock,
            values,
            schema,
            templates,
            files: other,
            dependencies,
        })
    }

    /// Chart name from `Chart.yaml`
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// Chart version from `Chart.yaml`
    pub fn version(&self) -> &str {
        &self.metadata.version
    }

    /// Name of the lock file for this chart's apiVersion
    pub fn lock_file_name(&self) -> &'static str {
        if self.metadata.api_version == API_VERSION_V1 {
            REQUIREMENTS_LOCK_FILE
        } else {
            LOCK_FILE
        }
    }

    /// Sub-charts loaded from `charts/`
    pub fn dependencies(&self) -> &[Chart] {
        &self.dependencies
    }

    /// Template file names, relative to the chart root
    pub fn template_names(&self) -> Vec<&str> {
        self.templates.iter().map(|t| t.name.as_str()).collect()
    }

    /// Find a sub-chart by name
    pub fn dependency(&self, name: &str) -> Option<&Chart> {
        self.dependencies.iter().find(|c| c.name() == name)
    }
}

/// `requirements.yaml` of a v1 chart
#[derive(Deserialize)]
struct Requirements {
    #[serde(default)]
    dependencies: Vec<Dependency>,
}

fn parse_yaml<T: serde::de::DeserializeOwned>(file: &ChartFile, name: &str) -> Result<T> {
    serde_yaml::from_slice(&file.data).map_err(|source| CoreError::YamlParse {
        file: name.to_string(),
        source,
    })
}

fn load_subchart(key: &str, files: Vec<ChartFile>) -> Result<Chart> {
    if key.ends_with(".tgz") {
        let archive = files
            .into_iter()
            .find(|f| f.name == format!("charts/{key}"))
            .ok_or_else(|| CoreError::invalid(format!("malformed sub-chart archive charts/{key}")))?;
        let inner = archive::read_archive_files(std::io::Cursor::new(archive.data))?;
        return Chart::from_files(inner)
            .map_err(|e| CoreError::invalid(format!("error unpacking {key} in charts/: {e}")));
    }

    let prefix = format!("charts/{key}/");
    let inner: Vec<ChartFile> = files
        .into_iter()
        .filter_map(|f| {
            f.name
                .strip_prefix(&prefix)
                .map(|rest| ChartFile::new(rest.to_string(), f.data.clone()))
        })
        .collect();

    // Stray files directly under charts/ are not charts
    if inner.is_empty() {
        return Err(CoreError::invalid(format!(
            "charts/{key} is neither a chart directory nor a .tgz archive"
        )));
    }

    Chart::from_files(inner)
        .map_err(|e| CoreError::invalid(format!("error unpacking {key} in charts/: {e}")))
}

fn validate_metadata(metadata: &ChartMetadata) -> Result<()> {
    if metadata.api_version != API_VERSION_V1 && metadata.api_version != API_VERSION_V2 {
        return Err(CoreError::invalid(format!(
            "apiVersion '{}' is not valid. The value must be either \"v1\" or \"v2\"",
            metadata.api_version
        )));
    }
    if metadata.name.is_empty() {
        return Err(CoreError::MissingField {
            field: "chart.metadata.name".to_string(),
        });
    }
    if metadata.name.contains(['/', '\\']) || metadata.name == "." || metadata.name == ".." {
        return Err(CoreError::InvalidChartName {
            name: metadata.name.clone(),
            reason: "chart names cannot contain path elements".to_string(),
        });
    }
    if metadata.version.is_empty() {
        return Err(CoreError::MissingField {
            field: "chart.metadata.version".to_string(),
        });
    }
    if parse_lenient(&metadata.version).is_none() {
        return Err(CoreError::InvalidVersion(format!(
            "version '{}' is not a valid SemVer",
            metadata.version
        )));
    }
    if metadata.api_version == API_VERSION_V1 && metadata.chart_type == Some(ChartType::Library) {
        return Err(CoreError::invalid("library charts require apiVersion v2"));
    }

    let mut seen = HashSet::new();
    for dep in &metadata.dependencies {
        if dep.name.is_empty() {
            return Err(CoreError::MissingField {
                field: "dependencies.name".to_string(),
            });
        }
        if !seen.insert(dep.effective_name()) {
            return Err(CoreError::invalid(format!(
                "more than one dependency with name or alias '{}'",
                dep.effective_name()
            )));
        }
    }

    Ok(())
}

/// Slash-separated path of `path` below `root`; `None` for the root itself
fn relative_name(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    if relative.as_os_str().is_empty() {
        return None;
    }
    Some(
        relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/"),
    )
}

fn annotate(err: CoreError, path: &Path) -> CoreError {
    match err {
        CoreError::InvalidChart { message } => CoreError::InvalidChart {
            message: format!("{}: {}", path.display(), message),
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const CHART_YAML: &str = r#"apiVersion: v2
name: myapp
version: 1.0.0
description: My application
dependencies:
  - name: redis
    version: "^17.0.0"
    repository: https://charts.example.com
    alias: cache
"#;

    fn write_chart(dir: &Path) {
        std::fs::create_dir_all(dir.join("templates")).unwrap();
        std::fs::write(dir.join("Chart.yaml"), CHART_YAML).unwrap();
        std::fs::write(dir.join("values.yaml"), "replicaCount: 1\n").unwrap();
        std::fs::write(dir.join("templates/deployment.yaml"), "kind: Deployment\n").unwrap();
        std::fs::write(dir.join("README.md"), "# myapp\n").unwrap();
    }

    #[test]
    fn test_metadata_deserialize() {
        let meta: ChartMetadata = serde_yaml::from_str(CHART_YAML).unwrap();
        assert_eq!(meta.name, "myapp");
        assert_eq!(meta.version, "1.0.0");
        assert_eq!(meta.dependencies.len(), 1);
        assert_eq!(meta.dependencies[0].effective_name(), "cache");
        assert!(meta.chart_type.is_none());
    }

    #[test]
    fn test_metadata_serialize_sorted_keys() {
        let meta = ChartMetadata {
            api_version: "v2".to_string(),
            name: "demo".to_string(),
            version: "0.1.0".to_string(),
            description: Some("Demo".to_string()),
            chart_type: Some(ChartType::Application),
            app_version: Some("1.16.0".to_string()),
            ..Default::default()
        };

        let yaml = serde_yaml::to_string(&meta).unwrap();
        insta::assert_snapshot!(yaml, @r"
        apiVersion: v2
        appVersion: 1.16.0
        description: Demo
        name: demo
        type: application
        version: 0.1.0
        ");
    }

    #[test]
    fn test_load_dir() {
        let temp = TempDir::new().unwrap();
        write_chart(temp.path());

        let chart = Chart::load(temp.path()).unwrap();
        assert_eq!(chart.name(), "myapp");
        assert_eq!(chart.template_names(), vec!["templates/deployment.yaml"]);
        assert!(chart.values.is_some());
        assert_eq!(chart.files.len(), 1);
        assert_eq!(chart.files[0].name, "README.md");
        assert!(chart.dependencies().is_empty());
    }

    #[test]
    fn test_v1_requirements_merged() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("Chart.yaml"), "apiVersion: v1\nname: legacy\nversion: 1.0.0\n").unwrap();
        std::fs::write(
            temp.path().join("requirements.yaml"),
            "dependencies:\n  - name: redis\n    version: 1.x\n    repository: \"@stable\"\n",
        )
        .unwrap();
        let lock = ChartLock::new(&[], vec![crate::LockedDependency::new("redis", "1.2.0", "@stable")]).unwrap();
        lock.save(&temp.path().join("requirements.lock")).unwrap();

        let chart = Chart::load(temp.path()).unwrap();
        assert_eq!(chart.metadata.dependencies.len(), 1);
        assert_eq!(chart.metadata.dependencies[0].repository, "@stable");
        assert_eq!(chart.lock.as_ref().unwrap().get("redis").unwrap().version, "1.2.0");
        assert_eq!(chart.lock_file_name(), "requirements.lock");

        let out = TempDir::new().unwrap();
        let saved = crate::save_dir(&chart, out.path()).unwrap();
        assert!(saved.join("requirements.yaml").is_file());
        assert!(saved.join("requirements.lock").is_file());
        assert!(!saved.join("Chart.lock").exists());
        assert_eq!(Chart::load(&saved).unwrap().metadata.dependencies, chart.metadata.dependencies);
    }

    #[test]
    fn test_v2_requirements_ignored() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("Chart.yaml"), "apiVersion: v2\nname: modern\nversion: 1.0.0\n").unwrap();
        std::fs::write(
            temp.path().join("requirements.yaml"),
            "dependencies:\n  - name: redis\n    version: 1.x\n",
        )
        .unwrap();

        let chart = Chart::load(temp.path()).unwrap();
        assert!(chart.metadata.dependencies.is_empty());
        assert_eq!(chart.files[0].name, "requirements.yaml");
        assert_eq!(chart.lock_file_name(), "Chart.lock");
    }

    #[test]
    fn test_load_dir_with_subchart_directory() {
        let temp = TempDir::new().unwrap();
        write_chart(temp.path());
        let sub = temp.path().join("charts/redis");
        std::fs::create_dir_all(&sub).unwrap();
        std::fs::write(sub.join("Chart.yaml"), "apiVersion: v2\nname: redis\nversion: 17.0.0\n").unwrap();

        let chart = Chart::load(temp.path()).unwrap();
        assert_eq!(chart.dependencies().len(), 1);
        assert_eq!(chart.dependency("redis").unwrap().version(), "17.0.0");
    }

    #[test]
    fn test_missing_chart_yaml() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("values.yaml"), "a: 1\n").unwrap();

        let err = Chart::load(temp.path()).unwrap_err();
        assert!(err.to_string().contains("Chart.yaml file is missing"));
    }

    #[test]
    fn test_missing_path() {
        let err = Chart::load("/definitely/not/here").unwrap_err();
        assert!(matches!(err, CoreError::ChartNotFound { .. }));
    }

    #[test]
    fn test_invalid_version() {
        let files = vec![ChartFile::new("Chart.yaml", "apiVersion: v2\nname: x\nversion: latest\n")];
        assert!(matches!(Chart::from_files(files), Err(CoreError::InvalidVersion(_))));
    }

    #[test]
    fn test_invalid_api_version() {
        let files = vec![ChartFile::new("Chart.yaml", "apiVersion: v3\nname: x\nversion: 1.0.0\n")];
        assert!(Chart::from_files(files).is_err());
    }

    #[test]
    fn test_default_api_version_is_v1() {
        let files = vec![ChartFile::new("Chart.yaml", "name: x\nversion: 1.0.0\n")];
        let chart = Chart::from_files(files).unwrap();
        assert_eq!(chart.metadata.api_version, API_VERSION_V1);
    }

    #[test]
    fn test_duplicate_dependency_names() {
        let yaml = "apiVersion: v2\nname: x\nversion: 1.0.0\ndependencies:\n  - name: a\n    version: 1.0.0\n  - name: a\n    version: 2.0.0\n";
        let files = vec![ChartFile::new("Chart.yaml", yaml)];
        assert!(Chart::from_files(files).is_err());
    }

    #[test]
    fn test_helmignore_respected() {
        let temp = TempDir::new().unwrap();
        write_chart(temp.path());
        std::fs::write(temp.path().join(".helmignore"), "*.md\n").unwrap();

        let chart = Chart::load(temp.path()).unwrap();
        assert!(chart.files.iter().all(|f| f.name != "README.md"));
        assert!(chart.files.iter().any(|f| f.name == ".helmignore"));
    }
}
