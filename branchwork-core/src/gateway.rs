//! Remote repository gateway
//!
//! The content-addressed object operations a hosting provider exposes:
//! references, blobs, trees, commits, file contents and pull requests.
//! Reads are idempotent. `create_blob`, `create_tree`, `create_commit`,
//! `create_ref` and `create_pull_request` are not, and must not be retried
//! blindly.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::repository::RepoSlug;

/// Hex object id of a blob, tree or commit
pub type ObjectId = String;

/// File mode for regular, non-executable files
pub const REGULAR_FILE_MODE: &str = "100644";

/// Errors reported by a gateway
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    /// The referenced object, path or ref does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// The remote refused a write because of the current state (ref exists, not a fast-forward)
    #[error("conflict: {0}")]
    Conflict(String),

    /// The call did not complete in time; its effect is unknown
    #[error("request timed out")]
    Timeout,

    /// Authentication failed or lacks permission
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Rate limit exceeded
    #[error("rate limited")]
    RateLimited,

    /// Any other network or API failure
    #[error("{0}")]
    Transport(String),
}

/// Kind of an entry in a tree listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Blob,
    Tree,
    Commit,
}

/// One entry of a tree listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeEntry {
    pub path: String,
    pub kind: EntryKind,
    pub sha: ObjectId,
}

/// Tree listing as reported by the remote
#[derive(Debug, Clone, Default)]
pub struct TreeListing {
    pub sha: ObjectId,
    pub entries: Vec<TreeEntry>,
    /// The remote stopped listing before the end of the tree
    pub truncated: bool,
}

/// Entry of a new tree: `path` mapped to an existing blob
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewTreeEntry {
    pub path: String,
    pub mode: String,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    pub sha: ObjectId,
}

impl NewTreeEntry {
    /// Regular file entry pointing at `blob`
    pub fn file(path: impl Into<String>, blob: ObjectId) -> Self {
        Self {
            path: path.into(),
            mode: REGULAR_FILE_MODE.to_string(),
            kind: EntryKind::Blob,
            sha: blob,
        }
    }
}

/// Commit object as read from the remote
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitObject {
    pub sha: ObjectId,
    pub tree: ObjectId,
    pub parents: Vec<ObjectId>,
}

/// Author or committer identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub name: String,
    pub email: String,
}

/// Commit object to create
#[derive(Debug, Clone)]
pub struct NewCommit {
    pub message: String,
    pub tree: ObjectId,
    pub parents: Vec<ObjectId>,
    pub author: Signature,
    pub committer: Signature,
}

/// Reference update, optionally conditional on the current target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefUpdate {
    pub sha: ObjectId,
    /// Only apply if the ref still points here
    pub expected: Option<ObjectId>,
}

/// Kind of an entry in a directory listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    File,
    Dir,
    Symlink,
    Submodule,
}

/// One entry of a single-level directory listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub path: String,
    pub kind: ContentKind,
}

/// Result of a content read
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Contents {
    File {
        sha: ObjectId,
        /// Content in transfer encoding, see `encoding`
        content: String,
        encoding: String,
    },
    Directory(Vec<DirectoryEntry>),
}

/// Commit metadata from a history listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitSummary {
    pub sha: ObjectId,
    pub message: String,
    pub author: Option<String>,
    pub date: Option<DateTime<Utc>>,
}

/// PR state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrState {
    Open,
    Closed,
}

/// Pull request as seen on the remote
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    pub title: String,
    pub body: String,
    pub state: PrState,
    /// Source branch name
    pub head: String,
    /// Target branch name
    pub base: String,
    pub url: Option<String>,
}

/// Filter for listing pull requests
#[derive(Debug, Clone)]
pub struct PullRequestQuery {
    pub state: PrState,
    /// `owner:branch`
    pub head: String,
    pub base: String,
}

/// Pull request to create
#[derive(Debug, Clone)]
pub struct NewPullRequest {
    pub title: String,
    pub head: String,
    pub base: String,
    pub body: String,
}

/// Capability to read and write a hosted repository's objects
#[async_trait]
pub trait RepositoryGateway: Send + Sync {
    /// Resolve `heads/<branch>` to a commit id
    async fn get_ref(&self, repo: &RepoSlug, branch: &str) -> Result<ObjectId, GatewayError>;

    /// Create `refs/heads/<branch>` at `sha`
    async fn create_ref(&self, repo: &RepoSlug, branch: &str, sha: &str)
        -> Result<(), GatewayError>;

    /// Move `heads/<branch>` to `update.sha`
    async fn update_ref(
        &self,
        repo: &RepoSlug,
        branch: &str,
        update: &RefUpdate,
    ) -> Result<(), GatewayError>;

    /// Read the tree of a branch, commit or tree id
    async fn get_tree(
        &self,
        repo: &RepoSlug,
        tree_ish: &str,
        recursive: bool,
    ) -> Result<TreeListing, GatewayError>;

    async fn get_commit(&self, repo: &RepoSlug, sha: &str) -> Result<CommitObject, GatewayError>;

    async fn create_blob(&self, repo: &RepoSlug, content: &[u8]) -> Result<ObjectId, GatewayError>;

    /// Create a tree layering `entries` over `base_tree`
    async fn create_tree(
        &self,
        repo: &RepoSlug,
        base_tree: &str,
        entries: &[NewTreeEntry],
    ) -> Result<ObjectId, GatewayError>;

    async fn create_commit(
        &self,
        repo: &RepoSlug,
        commit: &NewCommit,
    ) -> Result<ObjectId, GatewayError>;

    /// Read a file or directory at `git_ref` (branch or commit id)
    async fn get_content(
        &self,
        repo: &RepoSlug,
        path: &str,
        git_ref: &str,
    ) -> Result<Contents, GatewayError>;

    async fn list_branches(&self, repo: &RepoSlug) -> Result<Vec<String>, GatewayError>;

    /// Commits reachable from `branch`, newest first
    async fn list_commits(
        &self,
        repo: &RepoSlug,
        branch: &str,
    ) -> Result<Vec<CommitSummary>, GatewayError>;

    /// Paths changed by commit `sha`
    async fn commit_files(&self, repo: &RepoSlug, sha: &str) -> Result<Vec<String>, GatewayError>;

    async fn list_pull_requests(
        &self,
        repo: &RepoSlug,
        query: &PullRequestQuery,
    ) -> Result<Vec<PullRequest>, GatewayError>;

    async fn create_pull_request(
        &self,
        repo: &RepoSlug,
        request: &NewPullRequest,
    ) -> Result<PullRequest, GatewayError>;
}

/// Run a gateway call under an optional deadline
pub async fn with_timeout<T, F>(limit: Option<Duration>, call: F) -> Result<T, GatewayError>
where
    F: Future<Output = Result<T, GatewayError>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, call)
            .await
            .unwrap_or(Err(GatewayError::Timeout)),
        None => call.await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_tree_entry_serializes_type_field() {
        let entry = NewTreeEntry::file("src/lib.rs", "abc".to_string());
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["mode"], "100644");
        assert_eq!(json["type"], "blob");
        assert_eq!(json["sha"], "abc");
    }

    #[tokio::test]
    async fn test_with_timeout_expires() {
        let result: Result<(), GatewayError> =
            with_timeout(Some(Duration::from_millis(10)), async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;
        assert_eq!(result, Err(GatewayError::Timeout));
    }

    #[tokio::test]
    async fn test_with_timeout_passes_result_through() {
        let result = with_timeout(Some(Duration::from_secs(5)), async { Ok(7) }).await;
        assert_eq!(result, Ok(7));

        let result: Result<u8, _> =
            with_timeout(None, async { Err(GatewayError::RateLimited) }).await;
        assert_eq!(result, Err(GatewayError::RateLimited));
    }
}
