// Allow unused assignments for diagnostic fields - they're used by the macros
#![allow(unused_assignments)]

use miette::Diagnostic;
use thiserror::Error;

/// Core error type for rebalance inputs
#[derive(Error, Debug, Diagnostic)]
pub enum CoreError {
    /// Label selector could not be parsed
    #[error("Invalid label selector '{selector}': {reason}")]
    #[diagnostic(
        code(rebalance::invalid_selector),
        help("Use key=value, key!=value, 'key in (a,b)', 'key notin (a,b)', key, !key, key>N or key<N, separated by commas")
    )]
    InvalidSelector {
        #[allow(unused)]
        selector: String,
        #[allow(unused)]
        reason: String,
    },

    /// Resource quantity could not be parsed
    #[error("Invalid {resource} quantity '{value}'")]
    #[diagnostic(
        code(rebalance::invalid_quantity),
        help("Quantities follow the Kubernetes format, e.g. '250m', '2', '512Mi', '1Gi'")
    )]
    InvalidQuantity {
        #[allow(unused)]
        resource: String,
        #[allow(unused)]
        value: String,
    },

    /// Configuration value out of range or malformed
    #[error("Invalid configuration: {message}")]
    #[diagnostic(code(rebalance::invalid_config), help("{suggestion}"))]
    InvalidConfig {
        #[allow(unused)]
        message: String,
        #[allow(unused)]
        suggestion: String,
    },
}

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, CoreError>;

impl CoreError {
    /// Create an InvalidSelector error
    pub fn invalid_selector(selector: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidSelector {
            selector: selector.into(),
            reason: reason.into(),
        }
    }

    /// Create an InvalidQuantity error
    pub fn invalid_quantity(resource: impl Into<String>, value: impl Into<String>) -> Self {
        Self::InvalidQuantity {
            resource: resource.into(),
            value: value.into(),
        }
    }

    /// Create an InvalidConfig error
    pub fn invalid_config(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = CoreError::invalid_selector("app in (", "unterminated value list");
        assert!(matches!(err, CoreError::InvalidSelector { .. }));
        assert_eq!(
            err.to_string(),
            "Invalid label selector 'app in (': unterminated value list"
        );

        let err = CoreError::invalid_config("count must be greater than zero", "Pass --count 1 or more");
        assert!(matches!(err, CoreError::InvalidConfig { .. }));
    }
}
