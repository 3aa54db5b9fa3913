//! Resource identity of a chart-backed API
//!
//! A chart becomes one custom resource. Unset group, version and kind are
//! defaulted here; the values are otherwise passed through untouched.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{AcquireError, Result};

/// Directory of an operator project holding its charts
pub const HELM_CHARTS_DIR: &str = "helm-charts";

/// API group used when none is given
pub const DEFAULT_GROUP: &str = "charts";

/// API version used when none is given
pub const DEFAULT_VERSION: &str = "v1alpha1";

/// `apiextensions.k8s.io` version used when none is given
pub const DEFAULT_CRD_VERSION: &str = "v1";

/// Group, version and kind of a resource
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gvk {
    #[serde(default)]
    pub group: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub kind: String,
}

impl Gvk {
    pub fn new(
        group: impl Into<String>,
        version: impl Into<String>,
        kind: impl Into<String>,
    ) -> Self {
        Self {
            group: group.into(),
            version: version.into(),
            kind: kind.into(),
        }
    }
}

/// CRD settings of a resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Api {
    pub crd_version: String,
    pub namespaced: bool,
}

/// A fully defaulted resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    #[serde(flatten)]
    pub gvk: Gvk,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub domain: String,

    pub plural: String,

    /// Go package path; chart resources have none
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    pub api: Api,

    pub controller: bool,
}

impl Resource {
    /// Group qualified with the domain, e.g. `charts.example.com`
    pub fn qualified_group(&self) -> String {
        match (self.gvk.group.is_empty(), self.domain.is_empty()) {
            (_, true) => self.gvk.group.clone(),
            (true, false) => self.domain.clone(),
            (false, false) => format!("{}.{}", self.gvk.group, self.domain),
        }
    }

    /// `apiVersion` of the resource's objects
    pub fn api_version(&self) -> String {
        format!("{}/{}", self.qualified_group(), self.gvk.version)
    }
}

/// Project settings read from a kubebuilder `PROJECT` file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectConfig {
    #[serde(default)]
    pub domain: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub project_name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub repo: String,
}

impl ProjectConfig {
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            ..Default::default()
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let config_error = |message: String| AcquireError::Config {
            path: path.to_path_buf(),
            message,
        };
        let content = std::fs::read_to_string(path).map_err(|e| config_error(e.to_string()))?;
        serde_yaml::from_str(&content).map_err(|e| config_error(e.to_string()))
    }
}

/// Fill in an identity for the chart named `chart_name`
///
/// Explicit values win, except for the domain: the project's domain is
/// always used, and `domain` only applies to a project without one. The CRD
/// version falls back to [`DEFAULT_CRD_VERSION`].
pub fn derive_resource(
    chart_name: &str,
    gvk: &Gvk,
    domain: &str,
    crd_version: &str,
    cfg: &ProjectConfig,
) -> Resource {
    let or_default = |value: &str, default: &str| {
        if value.is_empty() {
            default.to_string()
        } else {
            value.to_string()
        }
    };

    let gvk = Gvk {
        group: or_default(&gvk.group, DEFAULT_GROUP),
        version: or_default(&gvk.version, DEFAULT_VERSION),
        kind: or_default(&gvk.kind, &to_upper_camel(chart_name)),
    };

    Resource {
        plural: pluralize(&gvk.kind.to_lowercase()),
        gvk,
        domain: or_default(&cfg.domain, domain),
        path: None,
        api: Api {
            crd_version: or_default(crd_version, DEFAULT_CRD_VERSION),
            namespaced: true,
        },
        controller: true,
    }
}

/// Convert a chart name to an upper camel case kind
///
/// `-`, `_`, `.` and spaces start a new word, as does anything following a
/// digit. Other characters are dropped.
pub fn to_upper_camel(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut cap_next = true;

    for c in name.trim().chars() {
        if c.is_ascii_alphabetic() {
            out.push(if cap_next { c.to_ascii_uppercase() } else { c });
            cap_next = false;
        } else if c.is_ascii_digit() {
            out.push(c);
            cap_next = true;
        } else {
            cap_next = matches!(c, '_' | ' ' | '-' | '.');
        }
    }

    out
}

const UNCOUNTABLE: &[&str] = &[
    "data",
    "equipment",
    "fish",
    "information",
    "metadata",
    "news",
    "series",
    "sheep",
    "species",
];

const IRREGULAR: &[(&str, &str)] = &[
    ("child", "children"),
    ("foot", "feet"),
    ("man", "men"),
    ("mouse", "mice"),
    ("person", "people"),
    ("tooth", "teeth"),
    ("woman", "women"),
];

/// English plural of a lower-cased word
pub fn pluralize(word: &str) -> String {
    if word.is_empty() || UNCOUNTABLE.contains(&word) {
        return word.to_string();
    }
    if let Some((_, plural)) = IRREGULAR.iter().find(|(singular, _)| *singular == word) {
        return plural.to_string();
    }

    let consonant_before = |suffix_len: usize| {
        word[..word.len() - suffix_len]
            .chars()
            .last()
            .is_some_and(|c| !"aeiou".contains(c))
    };

    if ["s", "x", "z", "ch", "sh"].iter().any(|s| word.ends_with(s)) {
        format!("{}es", word)
    } else if word.ends_with('y') && consonant_before(1) {
        format!("{}ies", &word[..word.len() - 1])
    } else if word.ends_with("fe") {
        format!("{}ves", &word[..word.len() - 2])
    } else if word.ends_with('f') && !word.ends_with("ff") {
        format!("{}ves", &word[..word.len() - 1])
    } else {
        format!("{}s", word)
    }
}
