/*
    errors.rs - Error types for the subentry subsystem

    Both kinds are raised synchronously when a subentry is added or
    modified, so the store rejects the write and never holds an invalid
    subentry:
    - Parse: malformed subtree specification (or its filter / base DN)
    - Configuration: unsupported or inconsistent subentry settings
*/

use thiserror::Error;

/// Errors that can occur while classifying or indexing a subentry
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubentryError {
    /// Malformed subtree specification
    #[error("Parse error at \"{token}\": {reason}")]
    Parse { token: String, reason: String },

    /// An RFC 3672 subentry without a subtree specification
    #[error("Subentry {0} has no subtreeSpecification")]
    MissingSpecification(String),

    /// Unsupported conflict behavior or inconsistent inheritance settings
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl SubentryError {
    pub fn parse(token: impl Into<String>, reason: impl Into<String>) -> Self {
        SubentryError::Parse {
            token: token.into(),
            reason: reason.into(),
        }
    }
}

/// Result type for subentry operations
pub type SubentryResult<T> = Result<T, SubentryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_names_token() {
        let err = SubentryError::parse("bsae", "unknown keyword");
        assert_eq!(err.to_string(), "Parse error at \"bsae\": unknown keyword");
    }

    #[test]
    fn test_configuration_error_display() {
        let message = "unsupported collectiveConflictBehavior \"x\"";
        let err = SubentryError::Configuration(message.to_string());
        assert!(err.to_string().starts_with("Configuration error"));
    }
}
