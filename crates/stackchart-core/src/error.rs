//! Core error types

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Invalid project configuration:\n{}", format_issues(.issues))]
    Validation { issues: Vec<String> },

    #[error("Failed to resolve {owner} `{key}`: {source}")]
    Reference {
        owner: String,
        key: String,
        #[source]
        source: ResolveError,
    },

    #[error("Failed to parse project configuration: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl CoreError {
    /// Create a validation error holding a single issue
    pub fn validation(issue: impl Into<String>) -> Self {
        Self::Validation {
            issues: vec![issue.into()],
        }
    }

    /// The underlying resolution failure, if this error came from one
    pub fn resolve_error(&self) -> Option<&ResolveError> {
        match self {
            Self::Reference { source, .. } => Some(source),
            _ => None,
        }
    }
}

fn format_issues(issues: &[String]) -> String {
    issues
        .iter()
        .map(|issue| format!("  - {}", issue))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Failure while expanding a reference expression
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("reference `{expression}` does not match any configuration value{}", format_hint(.suggestion))]
    NotFound {
        expression: String,
        suggestion: Option<String>,
    },

    #[error("reference cycle detected: {}", .path.join(" -> "))]
    Cycle { path: Vec<String> },

    #[error("reference `{expression}` targets a value declared for scope `{declared}`, not `{active}`")]
    ScopeViolation {
        expression: String,
        declared: String,
        active: String,
    },

    #[error("reference `{expression}` exceeds the maximum nesting depth of {depth}")]
    DepthExceeded { expression: String, depth: usize },

    #[error("reference `{expression}` is malformed (expected `${{path}}` or `${{scope:path}}`)")]
    Malformed { expression: String },
}

fn format_hint(suggestion: &Option<String>) -> String {
    match suggestion {
        Some(path) => format!(" (did you mean `{}`?)", path),
        None => String::new(),
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
