//! Branchwork Core - branch-scoped repository workspaces
//!
//! This crate lets an automated agent read a hosted repository and write to
//! it through a branch-scoped [`Workspace`]: list and read files, and commit
//! a set of file changes as one atomic commit on a branch that is created on
//! demand. The hosting provider is reached through the [`RepositoryGateway`]
//! trait.

pub mod commit;
pub mod config;
pub mod error;
pub mod gateway;
pub mod guard;
pub mod memory;
pub mod pull_request;
pub mod reader;
pub mod repository;
pub mod secrets;
pub mod tools;
pub mod workspace;

pub use commit::{CommitBuilder, CommitPhase, CommitReceipt, FileChange};
pub use config::{Config, ConfigOverrides};
pub use error::{Error, Result};
pub use gateway::{GatewayError, RepositoryGateway};
pub use guard::ProtectedBranches;
pub use pull_request::EnsuredPullRequest;
pub use reader::{DirectoryListing, FileRead, ReadStatus};
pub use repository::{RepoSlug, RepositoryHandle};
pub use secrets::Secrets;
pub use tools::RepositoryTools;
pub use workspace::{Checkout, Workspace};
