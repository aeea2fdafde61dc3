//! Error types for grammar construction and emission

use thiserror::Error;

/// Errors raised while building, validating or emitting a grammar.
///
/// Every structural variant is a defect in the static grammar definition and
/// halts emission; `location` names the offending site, for example
/// `moduleFieldFunc > patterns[3] > begin`.
#[derive(Debug, Error)]
pub enum GrammarError {
    #[error("rule registered twice: {name}")]
    DuplicateRule { name: String },
    #[error("invalid rule name: {name:?}")]
    InvalidRuleName { name: String },
    #[error("{location}: reference to unknown rule #{reference}")]
    UnresolvedReference { location: String, reference: String },
    #[error("{location}: {field} tags group {index} but the pattern has {groups} capture group(s)")]
    CaptureOutOfRange {
        location: String,
        field: &'static str,
        index: usize,
        groups: usize,
    },
    #[error("{location}: invalid {field} pattern: {message}")]
    InvalidPattern {
        location: String,
        field: &'static str,
        message: String,
    },
    #[error("{location}: invalid scope name {scope:?}")]
    InvalidScope { location: String, scope: String },
    #[error("grammar has no entry patterns")]
    EmptyEntryPoint,
    #[error("failed to serialize grammar as JSON")]
    Json(#[from] serde_json::Error),
    #[error("failed to serialize grammar as YAML")]
    Yaml(#[from] serde_yaml::Error),
    #[error("failed to load configuration")]
    Config(#[from] config::ConfigError),
}

impl GrammarError {
    pub fn unresolved(location: impl Into<String>, reference: impl Into<String>) -> Self {
        GrammarError::UnresolvedReference {
            location: location.into(),
            reference: reference.into(),
        }
    }

    pub fn invalid_pattern(
        location: impl Into<String>,
        field: &'static str,
        message: impl Into<String>,
    ) -> Self {
        GrammarError::InvalidPattern {
            location: location.into(),
            field,
            message: message.into(),
        }
    }
}
