//! Route template compilation.
//!
//! A template such as `/users/{id}/GET` is turned into an anchored regular
//! expression: literal text is escaped, and every `{name}` segment becomes a named
//! capture group matching one or more characters other than `/`.
use std::collections::{HashMap, HashSet};

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

/// Variables extracted from a matched path, keyed by their template name.
pub type PathVars = HashMap<String, String>;

/// `{name}` where name contains neither braces nor the path separator.
static VARIABLE_SEGMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([^{}/]+)\}").expect("valid regex"));

static VARIABLE_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid regex"));

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MatcherError {
    #[error("variable '{name}' appears more than once in template '{template}'")]
    DuplicateVariable { template: String, name: String },

    #[error("invalid variable name '{name}' in template '{template}'")]
    InvalidVariableName { template: String, name: String },

    #[error("template '{template}' could not be compiled: {reason}")]
    Compile { template: String, reason: String },
}

/// Compiled form of a route template.
#[derive(Debug, Clone)]
pub struct PathMatcher {
    template: String,
    regex: Regex,
    variables: Vec<String>,
}

impl PathMatcher {
    pub fn compile(template: &str) -> Result<Self, MatcherError> {
        let mut pattern = String::with_capacity(template.len() * 2 + 2);
        let mut variables = Vec::new();
        let mut seen = HashSet::new();
        let mut cursor = 0;

        pattern.push('^');
        for caps in VARIABLE_SEGMENT.captures_iter(template) {
            let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            let name = name.as_str();

            if !VARIABLE_NAME.is_match(name) {
                return Err(MatcherError::InvalidVariableName {
                    template: template.to_string(),
                    name: name.to_string(),
                });
            }
            if !seen.insert(name) {
                return Err(MatcherError::DuplicateVariable {
                    template: template.to_string(),
                    name: name.to_string(),
                });
            }

            pattern.push_str(&regex::escape(&template[cursor..whole.start()]));
            pattern.push_str(&format!("(?P<{name}>[^/]+)"));
            variables.push(name.to_string());
            cursor = whole.end();
        }
        pattern.push_str(&regex::escape(&template[cursor..]));
        pattern.push('$');

        let regex = Regex::new(&pattern).map_err(|e| MatcherError::Compile {
            template: template.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            template: template.to_string(),
            regex,
            variables,
        })
    }

    /// Full-string match. Returns the bound variables, or `None` on mismatch.
    pub fn captures(&self, candidate: &str) -> Option<PathVars> {
        let caps = self.regex.captures(candidate)?;
        Some(
            self.variables
                .iter()
                .filter_map(|name| {
                    caps.name(name)
                        .map(|m| (name.clone(), m.as_str().to_string()))
                })
                .collect(),
        )
    }

    pub fn is_match(&self, candidate: &str) -> bool {
        self.regex.is_match(candidate)
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    /// Variable names in template order.
    pub fn variables(&self) -> &[String] {
        &self.variables
    }
}
