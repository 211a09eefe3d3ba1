//! Branchwork GitHub - GitHub gateway for branchwork workspaces
//!
//! [`GitHubClient`] implements [`branchwork_core::RepositoryGateway`] over the
//! GitHub REST API using octocrab.

pub mod client;
pub mod error;
pub mod gateway;
pub mod pr;

pub use client::GitHubClient;
pub use error::{Error, Result};
