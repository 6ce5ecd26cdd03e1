use miette::Diagnostic;
use thiserror::Error;

/// Error type for cluster API access
#[derive(Error, Debug, Diagnostic)]
pub enum ClusterError {
    /// The request never produced a response
    #[error("{operation} request failed: {message}")]
    #[diagnostic(
        code(rebalance::cluster::request_failed),
        help("Check that the API server is reachable (try `kubectl get nodes`) and that --server points at it")
    )]
    RequestFailed {
        #[allow(unused)]
        operation: String,
        #[allow(unused)]
        message: String,
    },

    /// The API server answered with a non-success status
    #[error("{operation} failed with status {status}: {message}")]
    #[diagnostic(
        code(rebalance::cluster::api_status),
        help("Verify the credentials have permission for this operation")
    )]
    ApiStatus {
        #[allow(unused)]
        operation: String,
        #[allow(unused)]
        status: u16,
        #[allow(unused)]
        message: String,
    },

    /// The response body could not be decoded
    #[error("Failed to decode {operation} response: {message}")]
    #[diagnostic(
        code(rebalance::cluster::decode_failed),
        help("The API server returned an unexpected payload. Check the server version")
    )]
    Decode {
        #[allow(unused)]
        operation: String,
        #[allow(unused)]
        message: String,
    },

    /// The kubeconfig could not be read or lacks a usable context
    #[error("Failed to load kubeconfig '{path}': {message}")]
    #[diagnostic(
        code(rebalance::cluster::kubeconfig),
        help("Pass --kubeconfig, set KUBECONFIG, or point --server at `kubectl proxy`")
    )]
    Kubeconfig {
        #[allow(unused)]
        path: String,
        #[allow(unused)]
        message: String,
    },
}

/// Result type alias for cluster operations
pub type Result<T> = std::result::Result<T, ClusterError>;

impl ClusterError {
    pub fn request_failed(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::RequestFailed {
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn api_status(operation: impl Into<String>, status: u16, message: impl Into<String>) -> Self {
        Self::ApiStatus {
            operation: operation.into(),
            status,
            message: message.into(),
        }
    }

    pub fn decode(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn kubeconfig(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Kubeconfig {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Short reason suitable for a per-pod outcome
    pub fn reason(&self) -> String {
        match self {
            Self::ApiStatus {
                status: 429,
                message,
                ..
            } => format!("disruption budget: {}", message),
            Self::ApiStatus {
                status: 404,
                message,
                ..
            } => format!("not found: {}", message),
            Self::ApiStatus { message, .. }
            | Self::RequestFailed { message, .. }
            | Self::Decode { message, .. }
            | Self::Kubeconfig { message, .. } => message.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason() {
        let err = ClusterError::api_status("evict pod web/php-1", 429, "Cannot evict pod");
        assert_eq!(err.reason(), "disruption budget: Cannot evict pod");

        let err = ClusterError::api_status("evict pod web/php-1", 404, "pods \"php-1\" not found");
        assert_eq!(err.reason(), "not found: pods \"php-1\" not found");

        let err = ClusterError::request_failed("list nodes", "connection refused");
        assert_eq!(err.reason(), "connection refused");
        assert_eq!(err.to_string(), "list nodes request failed: connection refused");
    }
}
