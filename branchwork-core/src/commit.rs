//! Atomic multi-file commits
//!
//! A commit runs through a fixed sequence of phases:
//!
//! ```text
//! Started -> ParentResolved -> BlobsCreated -> TreeCreated -> CommitCreated -> RefUpdated
//! ```
//!
//! Nothing is visible on the branch until the final reference update, so a
//! failure in any earlier phase leaves the branch untouched. Objects created
//! before a failed update are unreachable and left for the remote to collect.
//!
//! The reference update is conditional on the head observed when the parent
//! was resolved. If the branch moved in between, the update is rejected and
//! the caller gets [`Error::StaleBranch`]. Commits are never retried here.

use std::collections::HashSet;
use std::time::Duration;

use futures::future::join_all;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, info, warn};

use crate::gateway::{
    with_timeout, GatewayError, NewCommit, NewTreeEntry, ObjectId, RefUpdate, RepositoryGateway,
    Signature,
};
use crate::guard::ProtectedBranches;
use crate::repository::RepoSlug;
use crate::workspace::Workspace;
use crate::{Error, Result};

/// A requested file write
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FileChange {
    /// Repository-relative path
    pub path: String,
    #[serde(deserialize_with = "text_bytes")]
    pub content: Vec<u8>,
}

fn text_bytes<'de, D>(deserializer: D) -> std::result::Result<Vec<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    String::deserialize(deserializer).map(String::into_bytes)
}

impl FileChange {
    pub fn new(path: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }

    /// Reject paths the remote would misinterpret
    pub fn validate(&self) -> Result<()> {
        let path = self.path.as_str();
        if path.is_empty() {
            return Err(Error::InvalidChange("path must not be empty".to_string()));
        }
        if path.starts_with('/') || path.ends_with('/') {
            return Err(Error::InvalidChange(format!(
                "path '{}' must be relative and name a file",
                path
            )));
        }
        if path
            .split('/')
            .any(|segment| segment.is_empty() || segment == "." || segment == "..")
        {
            return Err(Error::InvalidChange(format!(
                "path '{}' contains an empty, '.' or '..' segment",
                path
            )));
        }
        Ok(())
    }
}

/// Keep only the last change for each path, in order of those last occurrences
pub fn collapse_duplicates(changes: &[FileChange]) -> Vec<&FileChange> {
    let mut seen = HashSet::new();
    let mut kept: Vec<&FileChange> = changes
        .iter()
        .rev()
        .filter(|change| seen.insert(change.path.as_str()))
        .collect();
    kept.reverse();
    kept
}

/// Progress of a commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitPhase {
    Started,
    ParentResolved { parent: ObjectId, base_tree: ObjectId },
    BlobsCreated { count: usize },
    TreeCreated { tree: ObjectId },
    CommitCreated { commit: ObjectId },
    RefUpdated { commit: ObjectId },
}

impl CommitPhase {
    /// Whether the branch may have been changed
    pub fn may_have_landed(&self) -> bool {
        matches!(
            self,
            CommitPhase::CommitCreated { .. } | CommitPhase::RefUpdated { .. }
        )
    }
}

/// Result of a commit that landed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitReceipt {
    pub branch: String,
    pub commit: ObjectId,
    pub parent: ObjectId,
    pub tree: ObjectId,
    /// Paths written, after collapsing duplicates
    pub paths: Vec<String>,
}

/// Builds one commit on top of a branch head and advances the branch to it
///
/// Branches in the protected set are refused before any remote call.
pub struct CommitBuilder<'a> {
    gateway: &'a dyn RepositoryGateway,
    repo: &'a RepoSlug,
    protected: &'a ProtectedBranches,
    identity: &'a Signature,
    timeout: Option<Duration>,
    phase: CommitPhase,
}

impl<'a> CommitBuilder<'a> {
    pub fn new(
        gateway: &'a dyn RepositoryGateway,
        repo: &'a RepoSlug,
        protected: &'a ProtectedBranches,
        identity: &'a Signature,
    ) -> Self {
        Self {
            gateway,
            repo,
            protected,
            identity,
            timeout: None,
            phase: CommitPhase::Started,
        }
    }

    /// Bound each remote call
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Last phase reached
    pub fn phase(&self) -> &CommitPhase {
        &self.phase
    }

    fn advance(&mut self, phase: CommitPhase) {
        debug!(repo = %self.repo, ?phase, "Commit phase");
        self.phase = phase;
    }

    /// Commit `changes` to `branch` as a single commit
    ///
    /// Returns the new commit id, or an error with the branch unchanged,
    /// except for [`Error::AmbiguousCommitOutcome`] where the branch state
    /// must be re-read before doing anything else.
    pub async fn commit(
        &mut self,
        branch: &str,
        changes: &[FileChange],
        message: &str,
    ) -> Result<CommitReceipt> {
        self.protected.check(branch)?;
        if changes.is_empty() {
            return Err(Error::InvalidChange("no file changes to commit".to_string()));
        }
        if message.trim().is_empty() {
            return Err(Error::InvalidChange("commit message must not be empty".to_string()));
        }
        for change in changes {
            change.validate()?;
        }
        let changes = collapse_duplicates(changes);

        let result = self.run(branch, &changes, message).await;
        if let Err(e) = &result {
            if !self.phase.may_have_landed() {
                warn!(
                    repo = %self.repo,
                    branch,
                    phase = ?self.phase,
                    error = %e,
                    "Commit failed, branch unchanged"
                );
            }
        }
        result
    }

    async fn run(
        &mut self,
        branch: &str,
        changes: &[&FileChange],
        message: &str,
    ) -> Result<CommitReceipt> {
        let (gateway, repo, timeout) = (self.gateway, self.repo, self.timeout);

        let parent = with_timeout(timeout, gateway.get_ref(repo, branch))
            .await
            .map_err(|e| match e {
                GatewayError::NotFound(_) => {
                    Error::NotFound(format!("branch '{}' has no head", branch))
                }
                other => other.into(),
            })?;
        let base_tree = with_timeout(timeout, gateway.get_commit(repo, &parent))
            .await?
            .tree;
        self.advance(CommitPhase::ParentResolved {
            parent: parent.clone(),
            base_tree: base_tree.clone(),
        });

        // Blobs are independent of each other; upload them all at once
        let uploads = changes.iter().map(|change| {
            with_timeout(timeout, gateway.create_blob(repo, &change.content))
        });
        let blobs = join_all(uploads)
            .await
            .into_iter()
            .zip(changes)
            .map(|(blob, change)| {
                blob.map(|sha| NewTreeEntry::file(&change.path, sha))
                    .map_err(|e| {
                        warn!(path = %change.path, error = %e, "Blob creation failed");
                        Error::from(e)
                    })
            })
            .collect::<Result<Vec<_>>>()?;
        self.advance(CommitPhase::BlobsCreated { count: blobs.len() });

        let tree = with_timeout(timeout, gateway.create_tree(repo, &base_tree, &blobs)).await?;
        self.advance(CommitPhase::TreeCreated { tree: tree.clone() });

        let new_commit = NewCommit {
            message: message.to_string(),
            tree: tree.clone(),
            parents: vec![parent.clone()],
            author: self.identity.clone(),
            committer: self.identity.clone(),
        };
        let commit = with_timeout(timeout, gateway.create_commit(repo, &new_commit)).await?;
        self.advance(CommitPhase::CommitCreated {
            commit: commit.clone(),
        });

        let update = RefUpdate {
            sha: commit.clone(),
            expected: Some(parent.clone()),
        };
        with_timeout(timeout, gateway.update_ref(repo, branch, &update))
            .await
            .map_err(|e| classify_ref_update(branch, &parent, &commit, e))?;
        self.advance(CommitPhase::RefUpdated {
            commit: commit.clone(),
        });

        info!(
            repo = %repo,
            branch,
            commit = %commit,
            parent = %parent,
            count = changes.len(),
            "Committed files"
        );

        Ok(CommitReceipt {
            branch: branch.to_string(),
            commit,
            parent,
            tree,
            paths: changes.iter().map(|c| c.path.clone()).collect(),
        })
    }
}

/// Map a failed reference update onto the commit outcome it implies
fn classify_ref_update(branch: &str, parent: &str, commit: &str, err: GatewayError) -> Error {
    match err {
        GatewayError::Conflict(_) => Error::StaleBranch {
            branch: branch.to_string(),
            expected: parent.to_string(),
        },
        GatewayError::NotFound(_) => {
            Error::NotFound(format!("branch '{}' disappeared before update", branch))
        }
        GatewayError::Timeout | GatewayError::Transport(_) => {
            warn!(branch, commit, error = %err, "Branch update outcome unknown");
            Error::AmbiguousCommitOutcome {
                branch: branch.to_string(),
                commit: commit.to_string(),
                reason: err.to_string(),
            }
        }
        // Rejected before being applied
        GatewayError::Auth(_) | GatewayError::RateLimited => err.into(),
    }
}

impl Workspace {
    /// Commit `changes` to the active branch as one commit
    ///
    /// Protected branches are rejected before any remote call.
    pub async fn commit(&self, changes: &[FileChange], message: &str) -> Result<CommitReceipt> {
        let branch = self.current_branch();
        let protected = self.handle().protected();

        CommitBuilder::new(self.gateway(), self.slug(), protected, self.identity())
            .with_timeout(self.request_timeout())
            .commit(branch, changes, message)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CommitConfig;
    use crate::memory::{FailOn, MemoryGateway, MockOperation};
    use crate::workspace::tests::workspace;

    fn change(path: &str, content: &str) -> FileChange {
        FileChange::new(path, content)
    }

    async fn feature_workspace(gateway: &MemoryGateway) -> Workspace {
        let mut ws = workspace(gateway);
        ws.checkout("feature/x").await.unwrap();
        gateway.clear_operations();
        ws
    }

    fn seeded() -> MemoryGateway {
        let gateway = MemoryGateway::new();
        gateway.seed_branch("main", &[("README.md", "old"), ("docs/guide.md", "guide")]);
        gateway
    }

    #[test]
    fn test_validate_paths() {
        assert!(change("src/lib.rs", "").validate().is_ok());
        for bad in ["", "/abs", "dir/", "a//b", "./a", "a/../b"] {
            assert!(
                matches!(change(bad, "").validate(), Err(Error::InvalidChange(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_collapse_duplicates_last_write_wins() {
        let changes = vec![change("a", "1"), change("b", "x"), change("a", "2")];
        let kept = collapse_duplicates(&changes);
        assert_eq!(kept, vec![&changes[1], &changes[2]]);
    }

    #[test]
    fn test_file_change_from_json() {
        let change: FileChange =
            serde_json::from_str(r#"{"path": "a.txt", "content": "hi"}"#).unwrap();
        assert_eq!(change.content, b"hi");
    }

    #[tokio::test]
    async fn test_commit_scenario_feature_branch() {
        let gateway = seeded();
        let mut ws = workspace(&gateway);
        ws.checkout("feature/x").await.unwrap();
        let prior = gateway.branch_head("feature/x").unwrap();

        let receipt = ws
            .commit(&[change("README.md", "new")], "update readme")
            .await
            .unwrap();

        assert_eq!(receipt.parent, prior);
        assert_eq!(gateway.branch_head("feature/x"), Some(receipt.commit.clone()));
        assert_eq!(gateway.commit(&receipt.commit).unwrap().parents, vec![prior]);
        assert_eq!(
            gateway.commit_message(&receipt.commit).as_deref(),
            Some("update readme")
        );
        assert_eq!(ws.read_file("README.md").await.unwrap(), b"new");

        ws.checkout("main").await.unwrap();
        assert_eq!(ws.read_file("README.md").await.unwrap(), b"old");
    }

    #[tokio::test]
    async fn test_commit_preserves_unrelated_paths() {
        let gateway = seeded();
        let ws = feature_workspace(&gateway).await;

        ws.commit(
            &[change("src/new.rs", "fn new() {}"), change("README.md", "new")],
            "add source",
        )
        .await
        .unwrap();

        let files = ws.list_files(true).await.unwrap();
        assert_eq!(files, vec!["README.md", "docs/guide.md", "src/new.rs"]);
        assert_eq!(ws.read_file("docs/guide.md").await.unwrap(), b"guide");
        assert_eq!(ws.read_file("src/new.rs").await.unwrap(), b"fn new() {}");
    }

    #[tokio::test]
    async fn test_commit_duplicate_paths_last_write_wins() {
        let gateway = seeded();
        let ws = feature_workspace(&gateway).await;

        let receipt = ws
            .commit(&[change("a", "1"), change("a", "2")], "dupes")
            .await
            .unwrap();

        assert_eq!(receipt.paths, vec!["a"]);
        assert_eq!(ws.read_file("a").await.unwrap(), b"2");
        let blobs = gateway
            .operations()
            .into_iter()
            .filter(|op| matches!(op, MockOperation::CreateBlob { .. }))
            .count();
        assert_eq!(blobs, 1);
    }

    #[tokio::test]
    async fn test_commit_is_one_commit_with_one_parent() {
        let gateway = seeded();
        let ws = feature_workspace(&gateway).await;

        let receipt = ws
            .commit(
                &[change("a", "1"), change("b", "2"), change("c", "3")],
                "three files",
            )
            .await
            .unwrap();

        let commits = ws.list_commits(None).await.unwrap();
        assert_eq!(commits.len(), 2);
        assert_eq!(commits[0].sha, receipt.commit);
        assert_eq!(ws.commit_files(&receipt.commit).await.unwrap(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_commit_uses_service_identity() {
        let gateway = seeded();
        let ws = feature_workspace(&gateway)
            .await
            .with_identity(Signature {
                name: "Release Bot".to_string(),
                email: "bot@example.com".to_string(),
            });

        let receipt = ws.commit(&[change("a", "1")], "msg").await.unwrap();
        assert_eq!(gateway.commit_author(&receipt.commit).as_deref(), Some("Release Bot"));
    }

    #[tokio::test]
    async fn test_blob_failure_leaves_branch_unchanged() {
        let gateway = seeded();
        let ws = feature_workspace(&gateway).await;
        let before = gateway.branch_head("feature/x");
        gateway.fail_on(FailOn::CreateBlob {
            content: Some(b"two".to_vec()),
            error: GatewayError::Transport("500".to_string()),
        });

        let err = ws
            .commit(
                &[change("one", "one"), change("two", "two"), change("three", "three")],
                "partial",
            )
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Transport(_)));
        assert_eq!(gateway.branch_head("feature/x"), before);
        assert!(!gateway.operations().iter().any(|op| matches!(
            op,
            MockOperation::CreateTree { .. }
                | MockOperation::CreateCommit { .. }
                | MockOperation::UpdateRef { .. }
        )));
        assert_eq!(ws.list_commits(None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_protected_branch_rejected_without_remote_calls() {
        let gateway = seeded();
        let ws = workspace(&gateway);
        assert_eq!(ws.current_branch(), "main");

        let err = ws.commit(&[change("a", "1")], "msg").await.unwrap_err();

        assert!(matches!(err, Error::ProtectedBranch(ref b) if b == "main"));
        assert!(gateway.operations().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_requests_rejected_without_remote_calls() {
        let gateway = seeded();
        let ws = feature_workspace(&gateway).await;

        assert!(matches!(ws.commit(&[], "msg").await, Err(Error::InvalidChange(_))));
        assert!(matches!(
            ws.commit(&[change("a", "1")], "  ").await,
            Err(Error::InvalidChange(_))
        ));
        assert!(matches!(
            ws.commit(&[change("a", "1"), change("", "x")], "msg").await,
            Err(Error::InvalidChange(_))
        ));
        assert!(gateway.operations().is_empty());
    }

    #[tokio::test]
    async fn test_missing_branch_head_is_not_found() {
        let gateway = seeded();
        let repo = RepoSlug::new("acme", "widgets");
        let identity = CommitConfig::default().identity();

        let protected = ProtectedBranches::default();

        let err = CommitBuilder::new(&gateway, &repo, &protected, &identity)
            .commit("feature/x", &[change("a", "1")], "msg")
            .await
            .unwrap_err();

        assert!(err.is_not_found());
        assert!(gateway.branch_head("feature/x").is_none());
        assert!(gateway.mutations().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_advance_is_stale() {
        let gateway = seeded();
        let ws = feature_workspace(&gateway).await;
        let moved = gateway.seed_branch("elsewhere", &[("x", "y")]);
        gateway.race_update_ref(&moved);

        let err = ws.commit(&[change("a", "1")], "msg").await.unwrap_err();

        assert!(matches!(err, Error::StaleBranch { ref branch, .. } if branch == "feature/x"));
        assert_eq!(gateway.branch_head("feature/x"), Some(moved));
    }

    #[tokio::test]
    async fn test_ref_update_timeout_is_ambiguous() {
        let gateway = seeded();
        let ws = feature_workspace(&gateway)
            .await
            .with_request_timeout(Duration::from_millis(50));
        let before = gateway.branch_head("feature/x");
        gateway.stall_update_ref();

        let err = ws.commit(&[change("a", "1")], "msg").await.unwrap_err();

        match err {
            Error::AmbiguousCommitOutcome { branch, commit, .. } => {
                assert_eq!(branch, "feature/x");
                assert!(gateway.commit(&commit).is_some());
            }
            other => panic!("expected ambiguous outcome, got {other:?}"),
        }
        assert_eq!(gateway.branch_head("feature/x"), before);
    }

    #[tokio::test]
    async fn test_ref_update_transport_error_is_ambiguous() {
        let gateway = seeded();
        let ws = feature_workspace(&gateway).await;
        gateway.fail_on(FailOn::UpdateRef(GatewayError::Transport("connection reset".to_string())));

        let err = ws.commit(&[change("a", "1")], "msg").await.unwrap_err();
        assert!(matches!(err, Error::AmbiguousCommitOutcome { .. }));
    }

    #[tokio::test]
    async fn test_ref_update_auth_error_is_definite() {
        let gateway = seeded();
        let ws = feature_workspace(&gateway).await;
        gateway.fail_on(FailOn::UpdateRef(GatewayError::Auth("no push access".to_string())));

        let err = ws.commit(&[change("a", "1")], "msg").await.unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
    }

    #[tokio::test]
    async fn test_builder_phases() {
        let gateway = seeded();
        let _ws = feature_workspace(&gateway).await;
        let repo = RepoSlug::new("acme", "widgets");
        let identity = Signature {
            name: "n".to_string(),
            email: "e".to_string(),
        };
        gateway.fail_on(FailOn::CreateTree(GatewayError::Transport("500".to_string())));

        let protected = ProtectedBranches::default();

        let mut builder = CommitBuilder::new(&gateway, &repo, &protected, &identity);
        assert_eq!(builder.phase(), &CommitPhase::Started);
        assert!(builder.commit("feature/x", &[change("a", "1")], "m").await.is_err());
        assert_eq!(builder.phase(), &CommitPhase::BlobsCreated { count: 1 });
        assert!(!builder.phase().may_have_landed());
    }

    #[tokio::test]
    async fn test_builder_refuses_protected_branch() {
        let gateway = seeded();
        let repo = RepoSlug::new("acme", "widgets");
        let identity = CommitConfig::default().identity();
        let protected = ProtectedBranches::new(["main"]);
        let before = gateway.branch_head("main");

        let mut builder = CommitBuilder::new(&gateway, &repo, &protected, &identity);
        let err = builder
            .commit("main", &[change("README.md", "new")], "msg")
            .await
            .unwrap_err();

        assert!(matches!(err, Error::ProtectedBranch(ref b) if b == "main"));
        assert_eq!(builder.phase(), &CommitPhase::Started);
        assert!(gateway.operations().is_empty());
        assert_eq!(gateway.branch_head("main"), before);
    }
}
