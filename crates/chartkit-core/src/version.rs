//! Chart version parsing with Helm's constraint semantics
//!
//! Helm accepts versions such as `v1.2` and treats a bare constraint like
//! `1.2.3` as an exact match, whereas `semver::VersionReq` reads it as a
//! caret requirement. This module bridges the two.

use regex::Regex;
use semver::{Version, VersionReq};
use std::fmt;
use std::sync::LazyLock;

use crate::error::{CoreError, Result};

static LEADING_V: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(^|[=<>~^,\s])[vV](\d)").expect("valid regex"));

/// Parse a version leniently: a leading `v` is dropped and missing minor or
/// patch components are filled with zero.
pub fn parse_lenient(input: &str) -> Option<Version> {
    let trimmed = input.trim();
    let trimmed = trimmed
        .strip_prefix('v')
        .or_else(|| trimmed.strip_prefix('V'))
        .unwrap_or(trimmed);

    if let Ok(version) = Version::parse(trimmed) {
        return Some(version);
    }

    let split_at = trimmed.find(['-', '+']).unwrap_or(trimmed.len());
    let (core, rest) = trimmed.split_at(split_at);
    let parts: Vec<&str> = core.split('.').collect();
    if parts.is_empty() || parts.len() > 3 || parts.iter().any(|p| p.parse::<u64>().is_err()) {
        return None;
    }

    let mut padded = parts.join(".");
    for _ in parts.len()..3 {
        padded.push_str(".0");
    }
    Version::parse(&format!("{padded}{rest}")).ok()
}

/// A version constraint as written in `Chart.yaml` dependencies
#[derive(Debug, Clone)]
pub struct VersionConstraint {
    raw: String,
    alternatives: Vec<VersionReq>,
}

impl VersionConstraint {
    /// Parse a constraint. An empty string matches any stable version.
    pub fn parse(input: &str) -> Result<Self> {
        let raw = input.trim().to_string();
        if raw.is_empty() {
            return Ok(Self {
                raw,
                alternatives: vec![VersionReq::STAR],
            });
        }

        let alternatives = raw
            .split("||")
            .map(|alt| normalize_alternative(alt).and_then(|req| parse_req(&req, input)))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { raw, alternatives })
    }

    /// Check whether a version satisfies any alternative
    pub fn matches(&self, version: &Version) -> bool {
        self.alternatives.iter().any(|req| req.matches(version))
    }

    /// Whether this constraint accepts everything
    pub fn is_any(&self) -> bool {
        self.raw.is_empty() || self.raw == "*"
    }

    /// The constraint as written
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for VersionConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

fn parse_req(req: &str, original: &str) -> Result<VersionReq> {
    VersionReq::parse(req).map_err(|e| {
        CoreError::InvalidVersion(format!("invalid constraint '{}': {}", original, e))
    })
}

fn normalize_alternative(alt: &str) -> Result<String> {
    let alt = LEADING_V.replace_all(alt.trim(), "$1$2").to_string();
    if alt.is_empty() {
        return Err(CoreError::InvalidVersion("empty constraint alternative".to_string()));
    }

    // Hyphen range: "1.2 - 1.4.5"
    if let Some((low, high)) = alt.split_once(" - ") {
        return Ok(format!(">={}, <={}", low.trim(), high.trim()));
    }

    // Comparators are separated by commas or whitespace; an operator may be
    // split from its version, as in ">= 1.0.0"
    let mut comparators = Vec::new();
    let mut operator = String::new();
    for token in alt
        .split(|ch: char| ch == ',' || ch.is_whitespace())
        .filter(|t| !t.is_empty())
    {
        if token.chars().all(|ch| "=<>!~^".contains(ch)) {
            operator.push_str(token);
            continue;
        }
        comparators.push(normalize_comparator(&format!("{operator}{token}")));
        operator.clear();
    }
    if !operator.is_empty() {
        return Err(CoreError::InvalidVersion(format!(
            "operator '{}' is not followed by a version in '{}'",
            operator, alt
        )));
    }

    Ok(comparators.join(", "))
}

fn normalize_comparator(comparator: &str) -> String {
    let c = comparator.replace(['x', 'X'], "*");
    if c.starts_with(|ch: char| ch.is_ascii_digit()) && !c.contains('*') {
        format!("={c}")
    } else {
        c
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    #[test]
    fn test_parse_lenient() {
        assert_eq!(parse_lenient("1.2.3"), Some(v("1.2.3")));
        assert_eq!(parse_lenient("v1.2.3"), Some(v("1.2.3")));
        assert_eq!(parse_lenient("1.2"), Some(v("1.2.0")));
        assert_eq!(parse_lenient("2"), Some(v("2.0.0")));
        assert_eq!(parse_lenient("1.2-beta.1"), Some(v("1.2.0-beta.1")));
        assert_eq!(parse_lenient("latest"), None);
        assert_eq!(parse_lenient(""), None);
    }

    #[test]
    fn test_bare_version_is_exact() {
        let c = VersionConstraint::parse("1.2.3").unwrap();
        assert!(c.matches(&v("1.2.3")));
        assert!(!c.matches(&v("1.2.4")));
        assert!(!c.matches(&v("1.3.0")));
    }

    #[test]
    fn test_caret_and_tilde() {
        let caret = VersionConstraint::parse("^1.2.0").unwrap();
        assert!(caret.matches(&v("1.9.0")));
        assert!(!caret.matches(&v("2.0.0")));

        let tilde = VersionConstraint::parse("~1.2.0").unwrap();
        assert!(tilde.matches(&v("1.2.9")));
        assert!(!tilde.matches(&v("1.3.0")));
    }

    #[test]
    fn test_wildcards_and_leading_v() {
        let c = VersionConstraint::parse("1.2.x").unwrap();
        assert!(c.matches(&v("1.2.7")));
        assert!(!c.matches(&v("1.3.0")));

        let c = VersionConstraint::parse(">=v1.0.0").unwrap();
        assert!(c.matches(&v("1.0.0")));
    }

    #[test]
    fn test_alternatives_and_ranges() {
        let c = VersionConstraint::parse("^1.0.0 || ^3.0.0").unwrap();
        assert!(c.matches(&v("1.4.0")));
        assert!(!c.matches(&v("2.0.0")));
        assert!(c.matches(&v("3.1.0")));

        let c = VersionConstraint::parse("1.2 - 1.4.5").unwrap();
        assert!(c.matches(&v("1.3.0")));
        assert!(!c.matches(&v("1.4.6")));

        let c = VersionConstraint::parse(">= 1.0.0, < 2.0.0").unwrap();
        assert!(c.matches(&v("1.5.0")));
        assert!(!c.matches(&v("2.0.0")));

        let c = VersionConstraint::parse(">=1.0.0 <2.0.0").unwrap();
        assert!(c.matches(&v("1.5.0")));
        assert!(!c.matches(&v("2.0.0")));
        assert!(!c.matches(&v("0.9.0")));

        let c = VersionConstraint::parse(">= 1.0.0 < 2.0.0 || 3.x").unwrap();
        assert!(c.matches(&v("1.0.0")));
        assert!(!c.matches(&v("2.5.0")));
        assert!(c.matches(&v("3.2.1")));
    }

    #[test]
    fn test_empty_matches_stable_only() {
        let c = VersionConstraint::parse("").unwrap();
        assert!(c.is_any());
        assert!(c.matches(&v("9.9.9")));
        assert!(!c.matches(&v("1.0.0-rc.1")));
    }

    #[test]
    fn test_invalid_constraint() {
        assert!(VersionConstraint::parse(">=abc").is_err());
        assert!(VersionConstraint::parse("1.0.0 >=").is_err());
    }
}
