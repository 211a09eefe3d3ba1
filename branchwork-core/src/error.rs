//! Error types for branchwork

use thiserror::Error;

use crate::gateway::GatewayError;

/// Result type alias for branchwork operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for branchwork operations
#[derive(Error, Debug)]
pub enum Error {
    /// A branch, path or commit does not exist on the remote
    #[error("Not found: {0}")]
    NotFound(String),

    /// Commit rejected locally because the target branch is protected
    #[error("Operation not allowed: the branch '{0}' is protected")]
    ProtectedBranch(String),

    /// Network or remote-side failure that is not a "not found"
    #[error("Transport error: {0}")]
    Transport(String),

    /// The commit object exists but the branch update may or may not have applied
    #[error(
        "Commit {commit} was created but updating branch '{branch}' did not confirm ({reason}); \
         re-check the branch head before retrying"
    )]
    AmbiguousCommitOutcome {
        branch: String,
        commit: String,
        reason: String,
    },

    /// The branch moved away from the head the commit was built on
    #[error("Branch '{branch}' no longer points at {expected}; nothing was committed")]
    StaleBranch { branch: String, expected: String },

    /// A requested file change was rejected before reaching the remote
    #[error("Invalid file change: {0}")]
    InvalidChange(String),

    /// File content could not be decoded from the remote transfer encoding
    #[error("Failed to decode {path}: {reason}")]
    Decode { path: String, reason: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Check if this error reports an absent branch, path or commit
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}

impl From<GatewayError> for Error {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::NotFound(what) => Error::NotFound(what),
            other => Error::Transport(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_not_found_stays_typed() {
        let err: Error = GatewayError::NotFound("heads/feature".to_string()).into();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_gateway_failures_become_transport() {
        let err: Error = GatewayError::Timeout.into();
        assert!(matches!(err, Error::Transport(_)));

        let err: Error = GatewayError::Conflict("Reference already exists".to_string()).into();
        assert!(matches!(err, Error::Transport(_)));
    }

    #[test]
    fn test_protected_branch_message() {
        let err = Error::ProtectedBranch("main".to_string());
        assert_eq!(
            err.to_string(),
            "Operation not allowed: the branch 'main' is protected"
        );
    }
}
