//! `.helmignore` rules
//!
//! Patterns follow Helm's rules: blank lines and `#` comments are skipped,
//! `!` negates, a trailing `/` restricts a rule to directories, and a pattern
//! without `/` is matched against the base name only. The last matching rule
//! wins.

use glob::{MatchOptions, Pattern};
use std::path::Path;

use crate::error::{CoreError, Result};

/// Always-on rule hiding dotfiles inside `templates/`
const DEFAULT_RULE: &str = "templates/.?*";

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

#[derive(Debug, Clone)]
struct Rule {
    pattern: Pattern,
    negate: bool,
    dir_only: bool,
    basename: bool,
}

impl Rule {
    fn matches(&self, name: &str, is_dir: bool) -> bool {
        if self.dir_only && !is_dir {
            return false;
        }
        let target = if self.basename {
            name.rsplit('/').next().unwrap_or(name)
        } else {
            name
        };
        self.pattern.matches_with(target, MATCH_OPTIONS)
    }
}

/// Parsed set of ignore rules
#[derive(Debug, Clone)]
pub struct IgnoreRules {
    rules: Vec<Rule>,
}

impl Default for IgnoreRules {
    fn default() -> Self {
        let mut rules = Self { rules: Vec::new() };
        // The default rule is a constant known to parse
        let _ = rules.add(DEFAULT_RULE);
        rules
    }
}

impl IgnoreRules {
    /// Load rules from a `.helmignore` file; a missing file yields the default rules
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::parse(&content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn parse(content: &str) -> Result<Self> {
        let mut rules = Self::default();
        for line in content.lines() {
            rules.add(line)?;
        }
        Ok(rules)
    }

    fn add(&mut self, line: &str) -> Result<()> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Ok(());
        }
        if line == "!" {
            return Err(CoreError::invalid("invalid .helmignore rule: '!'"));
        }

        let (negate, rest) = match line.strip_prefix('!') {
            Some(rest) => (true, rest),
            None => (false, line),
        };
        let (dir_only, rest) = match rest.strip_suffix('/') {
            Some(rest) => (true, rest),
            None => (false, rest),
        };
        let rest = rest.trim_start_matches('/');
        let basename = !rest.contains('/');

        let pattern = Pattern::new(rest).map_err(|e| {
            CoreError::invalid(format!("invalid .helmignore rule '{}': {}", line, e))
        })?;

        self.rules.push(Rule {
            pattern,
            negate,
            dir_only,
            basename,
        });
        Ok(())
    }

    /// Whether a slash-separated path relative to the chart root is ignored
    pub fn ignored(&self, name: &str, is_dir: bool) -> bool {
        let mut ignored = false;
        for rule in &self.rules {
            if rule.matches(name, is_dir) {
                ignored = !rule.negate;
            }
        }
        ignored
    }
}
