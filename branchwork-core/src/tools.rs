//! Agent-facing repository operations
//!
//! Each operation names its branch explicitly and checks it out first, so a
//! caller never depends on which branch a previous call left active.

use tracing::info;

use crate::commit::{CommitReceipt, FileChange};
use crate::pull_request::EnsuredPullRequest;
use crate::reader::FileRead;
use crate::workspace::Workspace;
use crate::Result;

/// Branch-explicit operations over one workspace
#[derive(Debug)]
pub struct RepositoryTools {
    workspace: Workspace,
}

impl RepositoryTools {
    pub fn new(workspace: Workspace) -> Self {
        Self { workspace }
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn workspace_mut(&mut self) -> &mut Workspace {
        &mut self.workspace
    }

    pub fn into_workspace(self) -> Workspace {
        self.workspace
    }

    /// Branch names, as offered to callers choosing a branch
    pub async fn branches(&self) -> Result<Vec<String>> {
        self.workspace.list_branches().await
    }

    /// File paths (no directories) on `branch`
    pub async fn list_files(&mut self, branch: &str) -> Result<Vec<String>> {
        self.workspace.checkout(branch).await?;
        self.workspace.list_files(true).await
    }

    /// Contents of `paths` on `branch`, one result per distinct path
    pub async fn read_files<S: AsRef<str>>(
        &mut self,
        branch: &str,
        paths: &[S],
    ) -> Result<Vec<FileRead>> {
        self.workspace.checkout(branch).await?;
        Ok(self.workspace.read_files(paths).await)
    }

    /// Commit `files` to `branch` as one commit, creating the branch if needed
    ///
    /// Protected branches are refused before anything is sent to the remote.
    pub async fn commit_files(
        &mut self,
        branch: &str,
        files: &[FileChange],
        message: &str,
    ) -> Result<CommitReceipt> {
        self.workspace.handle().protected().check(branch)?;
        let checkout = self.workspace.checkout(branch).await?;
        if checkout.was_created() {
            info!(branch, "Committing to newly created branch");
        }
        self.workspace.commit(files, message).await
    }

    /// Open (or find) the pull request from `branch` into the base branch
    pub async fn open_pull_request(
        &mut self,
        branch: &str,
        title: &str,
        body: &str,
    ) -> Result<EnsuredPullRequest> {
        self.workspace.checkout(branch).await?;
        self.workspace.ensure_pull_request(title, body).await
    }
}
