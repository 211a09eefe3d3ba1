//! Branch-scoped workspace
//!
//! A [`Workspace`] holds the one branch that file operations act on. It is
//! session state: use one workspace per logical task. `checkout` takes
//! `&mut self`, so a workspace cannot be switched to another branch while an
//! operation borrowed from it is still running.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::CommitConfig;
use crate::gateway::{with_timeout, GatewayError, ObjectId, RepositoryGateway, Signature};
use crate::repository::{RepoSlug, RepositoryHandle};
use crate::{Error, Result};

/// What `checkout` had to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Checkout {
    /// The branch was already on the remote
    Existing,
    /// The branch was created from the base branch head
    Created { from: ObjectId },
}

impl Checkout {
    pub fn was_created(&self) -> bool {
        matches!(self, Checkout::Created { .. })
    }
}

/// Repository workspace bound to an active branch
pub struct Workspace {
    handle: RepositoryHandle,
    gateway: Arc<dyn RepositoryGateway>,
    active: String,
    identity: Signature,
    request_timeout: Option<Duration>,
}

impl Workspace {
    /// Create a workspace whose active branch is the base branch
    pub fn new(handle: RepositoryHandle, gateway: Arc<dyn RepositoryGateway>) -> Self {
        Self {
            active: handle.base_branch().to_string(),
            handle,
            gateway,
            identity: CommitConfig::default().identity(),
            request_timeout: None,
        }
    }

    /// Set the author/committer used for commits
    pub fn with_identity(mut self, identity: Signature) -> Self {
        self.identity = identity;
        self
    }

    /// Bound every remote call by `timeout`
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn handle(&self) -> &RepositoryHandle {
        &self.handle
    }

    pub fn identity(&self) -> &Signature {
        &self.identity
    }

    /// The branch file operations currently act on
    pub fn current_branch(&self) -> &str {
        &self.active
    }

    pub(crate) fn slug(&self) -> &RepoSlug {
        self.handle.slug()
    }

    pub(crate) fn gateway(&self) -> &dyn RepositoryGateway {
        self.gateway.as_ref()
    }

    pub(crate) fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout
    }

    /// Run a gateway call under the configured deadline
    pub(crate) async fn call<T, F>(&self, call: F) -> std::result::Result<T, GatewayError>
    where
        F: Future<Output = std::result::Result<T, GatewayError>>,
    {
        with_timeout(self.request_timeout, call).await
    }

    /// Check whether `name` has a head reference on the remote
    ///
    /// Only a "not found" answer means `false`; other failures propagate.
    pub async fn branch_exists(&self, name: &str) -> Result<bool> {
        debug!(repo = %self.slug(), branch = name, "Checking branch");

        match self.call(self.gateway.get_ref(self.slug(), name)).await {
            Ok(_) => Ok(true),
            Err(GatewayError::NotFound(_)) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// List all branch names
    pub async fn list_branches(&self) -> Result<Vec<String>> {
        debug!(repo = %self.slug(), "Listing branches");

        let branches = self.call(self.gateway.list_branches(self.slug())).await?;
        debug!(count = branches.len(), "Fetched branches");
        Ok(branches)
    }

    /// Make `name` the active branch, creating it from the base branch if absent
    ///
    /// The active branch only changes when this succeeds. Checking out an
    /// existing branch performs no remote mutation.
    pub async fn checkout(&mut self, name: &str) -> Result<Checkout> {
        if name.trim().is_empty() {
            return Err(Error::Other("Branch name must not be empty".to_string()));
        }

        let outcome = if self.branch_exists(name).await? {
            Checkout::Existing
        } else {
            self.create_branch(name).await?
        };

        self.active = name.to_string();
        debug!(branch = name, ?outcome, "Checked out branch");
        Ok(outcome)
    }

    async fn create_branch(&self, name: &str) -> Result<Checkout> {
        let base = self.handle.base_branch();
        let from = self
            .call(self.gateway.get_ref(self.slug(), base))
            .await
            .map_err(|e| match e {
                GatewayError::NotFound(_) => {
                    Error::NotFound(format!("base branch '{}' of {}", base, self.slug()))
                }
                other => other.into(),
            })?;

        match self
            .call(self.gateway.create_ref(self.slug(), name, &from))
            .await
        {
            Ok(()) => {
                info!(repo = %self.slug(), branch = name, base, sha = %from, "Created branch");
                Ok(Checkout::Created { from })
            }
            // Only an existing branch explains the conflict; confirm it
            Err(GatewayError::Conflict(reason)) => {
                if self.branch_exists(name).await? {
                    debug!(branch = name, %reason, "Branch appeared concurrently");
                    Ok(Checkout::Existing)
                } else {
                    warn!(branch = name, %reason, "Branch creation rejected");
                    Err(Error::Transport(format!(
                        "creating branch '{}' was rejected: {}",
                        name, reason
                    )))
                }
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl std::fmt::Debug for Workspace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workspace")
            .field("repo", self.slug())
            .field("active", &self.active)
            .field("base", &self.handle.base_branch())
            .finish_non_exhaustive()
    }
}
