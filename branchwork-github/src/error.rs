//! Error types for GitHub operations

use branchwork_core::GatewayError;
use thiserror::Error;

/// Result type for GitHub client setup
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while building a GitHub client
#[derive(Error, Debug)]
pub enum Error {
    /// GitHub API error
    #[error("GitHub API error: {0}")]
    Api(#[from] octocrab::Error),

    /// Authentication error
    #[error("GitHub authentication error: {0}")]
    Auth(String),

    /// Invalid client configuration
    #[error("Invalid GitHub client configuration: {0}")]
    Config(String),
}

/// Classify an octocrab failure for the workspace
pub(crate) fn classify(err: octocrab::Error) -> GatewayError {
    match err {
        octocrab::Error::GitHub { source, .. } => {
            let message = source.message;
            match source.status_code.as_u16() {
                404 => GatewayError::NotFound(message),
                // The commits API answers 422 for unknown SHAs
                422 if message.contains("No commit found") => GatewayError::NotFound(message),
                // Only these 422s mean another writer got there first
                422 if is_ref_race(&message) => GatewayError::Conflict(message),
                409 => GatewayError::Conflict(message),
                429 => GatewayError::RateLimited,
                403 if message.to_lowercase().contains("rate limit") => GatewayError::RateLimited,
                401 | 403 => GatewayError::Auth(message),
                status => {
                    GatewayError::Transport(format!("GitHub returned {}: {}", status, message))
                }
            }
        }
        other => GatewayError::Transport(other.to_string()),
    }
}

fn is_ref_race(message: &str) -> bool {
    let message = message.to_lowercase();
    message.contains("already exists") || message.contains("not a fast forward")
}
