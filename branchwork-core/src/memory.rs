//! In-memory gateway
//!
//! A deterministic [`RepositoryGateway`] holding one repository's refs,
//! commits, trees and blobs in memory. Every call is recorded so tests can
//! assert exactly which remote operations happened, and failures can be
//! injected per operation.
//!
//! Trees are stored flat (`path -> blob id`); directory entries are derived
//! when listing.
//!
//! # Example
//!
//! ```
//! use branchwork_core::memory::MemoryGateway;
//!
//! let gateway = MemoryGateway::new();
//! gateway.seed_branch("main", &[("README.md", "hello")]);
//!
//! assert!(gateway.branch_head("main").is_some());
//! assert_eq!(gateway.file_at("main", "README.md").unwrap(), b"hello");
//! ```

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use chrono::{DateTime, Utc};

use crate::gateway::{
    CommitObject, CommitSummary, ContentKind, Contents, DirectoryEntry, EntryKind, GatewayError,
    NewCommit, NewPullRequest, NewTreeEntry, ObjectId, PrState, PullRequest, PullRequestQuery,
    RefUpdate, RepositoryGateway, TreeEntry, TreeListing,
};
use crate::repository::RepoSlug;

/// In-memory repository gateway.
///
/// Thread-safe via internal `Arc<Mutex<...>>` wrapping; clones share state.
#[derive(Debug, Clone, Default)]
pub struct MemoryGateway {
    inner: Arc<Mutex<MemoryInner>>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    refs: BTreeMap<String, ObjectId>,
    commits: HashMap<ObjectId, StoredCommit>,
    trees: HashMap<ObjectId, BTreeMap<String, ObjectId>>,
    blobs: HashMap<ObjectId, Vec<u8>>,
    pulls: Vec<PullRequest>,
    next_id: u64,
    failures: Vec<FailOn>,
    stall_update_ref: bool,
    race_create_ref: bool,
    race_update_ref: Option<ObjectId>,
    operations: Vec<MockOperation>,
}

#[derive(Debug, Clone)]
struct StoredCommit {
    tree: ObjectId,
    parents: Vec<ObjectId>,
    message: String,
    author: String,
    date: DateTime<Utc>,
}

/// Configuration for which operation should fail.
#[derive(Debug, Clone)]
pub enum FailOn {
    GetRef(GatewayError),
    CreateRef(GatewayError),
    UpdateRef(GatewayError),
    GetTree(GatewayError),
    GetCommit(GatewayError),
    /// Fail blob creation; only for blobs with this content when `content` is set
    CreateBlob {
        content: Option<Vec<u8>>,
        error: GatewayError,
    },
    CreateTree(GatewayError),
    CreateCommit(GatewayError),
    GetContent(GatewayError),
    ListPullRequests(GatewayError),
}

/// Recorded operation for test verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockOperation {
    GetRef { branch: String },
    CreateRef { branch: String, sha: ObjectId },
    UpdateRef { branch: String, sha: ObjectId, expected: Option<ObjectId> },
    GetTree { tree_ish: String, recursive: bool },
    GetCommit { sha: ObjectId },
    CreateBlob { size: usize },
    CreateTree { base_tree: ObjectId, paths: Vec<String> },
    CreateCommit { tree: ObjectId, parents: Vec<ObjectId>, message: String },
    GetContent { path: String, git_ref: String },
    ListBranches,
    ListCommits { branch: String },
    CommitFiles { sha: ObjectId },
    ListPullRequests { head: String, base: String },
    CreatePullRequest { head: String, base: String, title: String },
}

impl MockOperation {
    /// Whether this operation writes to the repository
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            MockOperation::CreateRef { .. }
                | MockOperation::UpdateRef { .. }
                | MockOperation::CreateBlob { .. }
                | MockOperation::CreateTree { .. }
                | MockOperation::CreateCommit { .. }
                | MockOperation::CreatePullRequest { .. }
        )
    }
}

impl MemoryGateway {
    /// Create an empty repository with no branches.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create `branch` with a single root commit holding `files`.
    ///
    /// Replaces the branch if it already exists. Not recorded as an operation.
    pub fn seed_branch(&self, branch: &str, files: &[(&str, &str)]) -> ObjectId {
        let mut inner = self.lock();
        let mut tree = BTreeMap::new();
        for (path, content) in files {
            let blob = inner.store_blob(content.as_bytes());
            tree.insert(path.to_string(), blob);
        }
        let tree_id = inner.store_tree(tree);
        let commit = inner.store_commit(StoredCommit {
            tree: tree_id,
            parents: Vec::new(),
            message: "Initial commit".to_string(),
            author: "seed".to_string(),
            date: Utc::now(),
        });
        inner.refs.insert(branch.to_string(), commit.clone());
        commit
    }

    /// Point `branch` at an existing commit. Not recorded as an operation.
    pub fn set_branch(&self, branch: &str, sha: &str) {
        self.lock().refs.insert(branch.to_string(), sha.to_string());
    }

    /// Add an existing pull request.
    pub fn add_pull_request(&self, pr: PullRequest) {
        self.lock().pulls.push(pr);
    }

    /// Make the given operation fail until failures are cleared.
    pub fn fail_on(&self, failure: FailOn) {
        self.lock().failures.push(failure);
    }

    pub fn clear_failures(&self) {
        let mut inner = self.lock();
        inner.failures.clear();
        inner.stall_update_ref = false;
        inner.race_create_ref = false;
        inner.race_update_ref = None;
    }

    /// Make reference updates hang instead of completing.
    pub fn stall_update_ref(&self) {
        self.lock().stall_update_ref = true;
    }

    /// Have another writer create the branch just before each `create_ref`
    pub fn race_create_ref(&self) {
        self.lock().race_create_ref = true;
    }

    /// Have another writer move the branch to `sha` just before each `update_ref`
    pub fn race_update_ref(&self, sha: &str) {
        self.lock().race_update_ref = Some(sha.to_string());
    }

    pub fn operations(&self) -> Vec<MockOperation> {
        self.lock().operations.clone()
    }

    pub fn clear_operations(&self) {
        self.lock().operations.clear();
    }

    /// Recorded operations that wrote to the repository
    pub fn mutations(&self) -> Vec<MockOperation> {
        self.lock()
            .operations
            .iter()
            .filter(|op| op.is_mutation())
            .cloned()
            .collect()
    }

    pub fn branch_head(&self, branch: &str) -> Option<ObjectId> {
        self.lock().refs.get(branch).cloned()
    }

    pub fn commit(&self, sha: &str) -> Option<CommitObject> {
        self.lock().commits.get(sha).map(|c| CommitObject {
            sha: sha.to_string(),
            tree: c.tree.clone(),
            parents: c.parents.clone(),
        })
    }

    pub fn commit_message(&self, sha: &str) -> Option<String> {
        self.lock().commits.get(sha).map(|c| c.message.clone())
    }

    pub fn commit_author(&self, sha: &str) -> Option<String> {
        self.lock().commits.get(sha).map(|c| c.author.clone())
    }

    /// Content of `path` at the head of `branch`
    pub fn file_at(&self, branch: &str, path: &str) -> Option<Vec<u8>> {
        let inner = self.lock();
        let tree = inner.tree_for(branch).ok()?;
        let blob = tree.get(path)?;
        inner.blobs.get(blob).cloned()
    }

    pub fn blob_count(&self) -> usize {
        self.lock().blobs.len()
    }

    pub fn pull_requests(&self) -> Vec<PullRequest> {
        self.lock().pulls.clone()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryInner> {
        // A panicking test thread must not wedge the others
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Record `op` and return the injected failure, if any
    fn record(
        &self,
        op: MockOperation,
        fails: impl Fn(&FailOn) -> Option<GatewayError>,
    ) -> Result<(), GatewayError> {
        let mut inner = self.lock();
        inner.operations.push(op);
        match inner.failures.iter().find_map(fails) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl MemoryInner {
    fn next_object_id(&mut self) -> ObjectId {
        self.next_id += 1;
        format!("{:040x}", self.next_id)
    }

    fn store_blob(&mut self, content: &[u8]) -> ObjectId {
        if let Some((id, _)) = self.blobs.iter().find(|(_, c)| c.as_slice() == content) {
            return id.clone();
        }
        let id = self.next_object_id();
        self.blobs.insert(id.clone(), content.to_vec());
        id
    }

    fn store_tree(&mut self, tree: BTreeMap<String, ObjectId>) -> ObjectId {
        let id = self.next_object_id();
        self.trees.insert(id.clone(), tree);
        id
    }

    fn store_commit(&mut self, commit: StoredCommit) -> ObjectId {
        let id = self.next_object_id();
        self.commits.insert(id.clone(), commit);
        id
    }

    /// Resolve a branch name, commit id or tree id to a tree id
    fn resolve_tree(&self, tree_ish: &str) -> Result<ObjectId, GatewayError> {
        let commit = self
            .refs
            .get(tree_ish)
            .map(String::as_str)
            .unwrap_or(tree_ish);
        if let Some(c) = self.commits.get(commit) {
            return Ok(c.tree.clone());
        }
        if self.trees.contains_key(tree_ish) {
            return Ok(tree_ish.to_string());
        }
        Err(GatewayError::NotFound(tree_ish.to_string()))
    }

    fn tree_for(&self, tree_ish: &str) -> Result<&BTreeMap<String, ObjectId>, GatewayError> {
        let id = self.resolve_tree(tree_ish)?;
        self.trees
            .get(&id)
            .ok_or_else(|| GatewayError::NotFound(tree_ish.to_string()))
    }
}

/// Entries of a flat tree, with parent directories derived from paths
fn list_tree(files: &BTreeMap<String, ObjectId>, recursive: bool) -> Vec<TreeEntry> {
    let mut entries: BTreeMap<String, TreeEntry> = BTreeMap::new();
    for (path, blob) in files {
        let segments: Vec<&str> = path.split('/').collect();
        for depth in 1..segments.len() {
            let dir = segments[..depth].join("/");
            entries.entry(dir.clone()).or_insert_with(|| TreeEntry {
                sha: format!("tree:{}", dir),
                path: dir,
                kind: EntryKind::Tree,
            });
        }
        entries.insert(
            path.clone(),
            TreeEntry {
                path: path.clone(),
                kind: EntryKind::Blob,
                sha: blob.clone(),
            },
        );
    }
    entries
        .into_values()
        .filter(|e| recursive || !e.path.contains('/'))
        .collect()
}

fn changed_paths(
    before: &BTreeMap<String, ObjectId>,
    after: &BTreeMap<String, ObjectId>,
) -> Vec<String> {
    let all: BTreeSet<&String> = before.keys().chain(after.keys()).collect();
    all.into_iter()
        .filter(|path| before.get(*path) != after.get(*path))
        .cloned()
        .collect()
}

#[async_trait]
impl RepositoryGateway for MemoryGateway {
    async fn get_ref(&self, _repo: &RepoSlug, branch: &str) -> Result<ObjectId, GatewayError> {
        self.record(
            MockOperation::GetRef {
                branch: branch.to_string(),
            },
            |f| match f {
                FailOn::GetRef(e) => Some(e.clone()),
                _ => None,
            },
        )?;
        self.branch_head(branch)
            .ok_or_else(|| GatewayError::NotFound(format!("heads/{}", branch)))
    }

    async fn create_ref(
        &self,
        _repo: &RepoSlug,
        branch: &str,
        sha: &str,
    ) -> Result<(), GatewayError> {
        self.record(
            MockOperation::CreateRef {
                branch: branch.to_string(),
                sha: sha.to_string(),
            },
            |f| match f {
                FailOn::CreateRef(e) => Some(e.clone()),
                _ => None,
            },
        )?;
        let mut inner = self.lock();
        if inner.race_create_ref {
            inner.refs.insert(branch.to_string(), sha.to_string());
        }
        if inner.refs.contains_key(branch) {
            return Err(GatewayError::Conflict("Reference already exists".to_string()));
        }
        if !inner.commits.contains_key(sha) {
            return Err(GatewayError::NotFound(format!("commit {}", sha)));
        }
        inner.refs.insert(branch.to_string(), sha.to_string());
        Ok(())
    }

    async fn update_ref(
        &self,
        _repo: &RepoSlug,
        branch: &str,
        update: &RefUpdate,
    ) -> Result<(), GatewayError> {
        self.record(
            MockOperation::UpdateRef {
                branch: branch.to_string(),
                sha: update.sha.clone(),
                expected: update.expected.clone(),
            },
            |f| match f {
                FailOn::UpdateRef(e) => Some(e.clone()),
                _ => None,
            },
        )?;

        let stall = self.lock().stall_update_ref;
        if stall {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }

        let mut inner = self.lock();
        if let Some(moved) = inner.race_update_ref.clone() {
            inner.refs.insert(branch.to_string(), moved);
        }
        let current = inner
            .refs
            .get(branch)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(format!("heads/{}", branch)))?;
        if let Some(expected) = &update.expected {
            if *expected != current {
                return Err(GatewayError::Conflict(
                    "Update is not a fast forward".to_string(),
                ));
            }
        }
        if !inner.commits.contains_key(&update.sha) {
            return Err(GatewayError::NotFound(format!("commit {}", update.sha)));
        }
        inner.refs.insert(branch.to_string(), update.sha.clone());
        Ok(())
    }

    async fn get_tree(
        &self,
        _repo: &RepoSlug,
        tree_ish: &str,
        recursive: bool,
    ) -> Result<TreeListing, GatewayError> {
        self.record(
            MockOperation::GetTree {
                tree_ish: tree_ish.to_string(),
                recursive,
            },
            |f| match f {
                FailOn::GetTree(e) => Some(e.clone()),
                _ => None,
            },
        )?;
        let inner = self.lock();
        let sha = inner.resolve_tree(tree_ish)?;
        let files = inner.tree_for(&sha)?;
        Ok(TreeListing {
            entries: list_tree(files, recursive),
            sha,
            truncated: false,
        })
    }

    async fn get_commit(&self, _repo: &RepoSlug, sha: &str) -> Result<CommitObject, GatewayError> {
        self.record(
            MockOperation::GetCommit {
                sha: sha.to_string(),
            },
            |f| match f {
                FailOn::GetCommit(e) => Some(e.clone()),
                _ => None,
            },
        )?;
        self.commit(sha)
            .ok_or_else(|| GatewayError::NotFound(format!("commit {}", sha)))
    }

    async fn create_blob(
        &self,
        _repo: &RepoSlug,
        content: &[u8],
    ) -> Result<ObjectId, GatewayError> {
        self.record(
            MockOperation::CreateBlob {
                size: content.len(),
            },
            |f| match f {
                FailOn::CreateBlob { content: None, error } => Some(error.clone()),
                FailOn::CreateBlob {
                    content: Some(c),
                    error,
                } if c.as_slice() == content => Some(error.clone()),
                _ => None,
            },
        )?;
        Ok(self.lock().store_blob(content))
    }

    async fn create_tree(
        &self,
        _repo: &RepoSlug,
        base_tree: &str,
        entries: &[NewTreeEntry],
    ) -> Result<ObjectId, GatewayError> {
        self.record(
            MockOperation::CreateTree {
                base_tree: base_tree.to_string(),
                paths: entries.iter().map(|e| e.path.clone()).collect(),
            },
            |f| match f {
                FailOn::CreateTree(e) => Some(e.clone()),
                _ => None,
            },
        )?;
        let mut inner = self.lock();
        let mut tree = inner
            .trees
            .get(base_tree)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(format!("tree {}", base_tree)))?;
        for entry in entries {
            if !inner.blobs.contains_key(&entry.sha) {
                return Err(GatewayError::NotFound(format!("blob {}", entry.sha)));
            }
            tree.insert(entry.path.clone(), entry.sha.clone());
        }
        Ok(inner.store_tree(tree))
    }

    async fn create_commit(
        &self,
        _repo: &RepoSlug,
        commit: &NewCommit,
    ) -> Result<ObjectId, GatewayError> {
        self.record(
            MockOperation::CreateCommit {
                tree: commit.tree.clone(),
                parents: commit.parents.clone(),
                message: commit.message.clone(),
            },
            |f| match f {
                FailOn::CreateCommit(e) => Some(e.clone()),
                _ => None,
            },
        )?;
        let mut inner = self.lock();
        if !inner.trees.contains_key(&commit.tree) {
            return Err(GatewayError::NotFound(format!("tree {}", commit.tree)));
        }
        if let Some(missing) = commit
            .parents
            .iter()
            .find(|p| !inner.commits.contains_key(*p))
        {
            return Err(GatewayError::NotFound(format!("commit {}", missing)));
        }
        Ok(inner.store_commit(StoredCommit {
            tree: commit.tree.clone(),
            parents: commit.parents.clone(),
            message: commit.message.clone(),
            author: commit.author.name.clone(),
            date: Utc::now(),
        }))
    }

    async fn get_content(
        &self,
        _repo: &RepoSlug,
        path: &str,
        git_ref: &str,
    ) -> Result<Contents, GatewayError> {
        self.record(
            MockOperation::GetContent {
                path: path.to_string(),
                git_ref: git_ref.to_string(),
            },
            |f| match f {
                FailOn::GetContent(e) => Some(e.clone()),
                _ => None,
            },
        )?;
        let inner = self.lock();
        let files = inner.tree_for(git_ref)?;
        let path = path.trim_matches('/');

        if let Some(blob) = files.get(path) {
            let content = inner.blobs.get(blob).cloned().unwrap_or_default();
            return Ok(Contents::File {
                sha: blob.clone(),
                content: base64::engine::general_purpose::STANDARD.encode(content),
                encoding: "base64".to_string(),
            });
        }

        let prefix = if path.is_empty() {
            String::new()
        } else {
            format!("{}/", path)
        };
        let mut children: BTreeMap<String, ContentKind> = BTreeMap::new();
        for file in files.keys() {
            if let Some(rest) = file.strip_prefix(&prefix) {
                match rest.split_once('/') {
                    Some((dir, _)) => {
                        children.insert(format!("{}{}", prefix, dir), ContentKind::Dir);
                    }
                    None => {
                        children.insert(file.clone(), ContentKind::File);
                    }
                }
            }
        }
        if children.is_empty() {
            return Err(GatewayError::NotFound(path.to_string()));
        }
        Ok(Contents::Directory(
            children
                .into_iter()
                .map(|(path, kind)| DirectoryEntry { path, kind })
                .collect(),
        ))
    }

    async fn list_branches(&self, _repo: &RepoSlug) -> Result<Vec<String>, GatewayError> {
        self.record(MockOperation::ListBranches, |_| None)?;
        Ok(self.lock().refs.keys().cloned().collect())
    }

    async fn list_commits(
        &self,
        _repo: &RepoSlug,
        branch: &str,
    ) -> Result<Vec<CommitSummary>, GatewayError> {
        self.record(
            MockOperation::ListCommits {
                branch: branch.to_string(),
            },
            |_| None,
        )?;
        let inner = self.lock();
        let mut next = inner.refs.get(branch).cloned();
        if next.is_none() && inner.commits.contains_key(branch) {
            next = Some(branch.to_string());
        }
        let Some(mut sha) = next else {
            return Err(GatewayError::NotFound(branch.to_string()));
        };

        let mut history = Vec::new();
        while let Some(commit) = inner.commits.get(&sha) {
            history.push(CommitSummary {
                sha: sha.clone(),
                message: commit.message.clone(),
                author: Some(commit.author.clone()),
                date: Some(commit.date),
            });
            match commit.parents.first() {
                Some(parent) => sha = parent.clone(),
                None => break,
            }
        }
        Ok(history)
    }

    async fn commit_files(&self, _repo: &RepoSlug, sha: &str) -> Result<Vec<String>, GatewayError> {
        self.record(
            MockOperation::CommitFiles {
                sha: sha.to_string(),
            },
            |_| None,
        )?;
        let inner = self.lock();
        let commit = inner
            .commits
            .get(sha)
            .ok_or_else(|| GatewayError::NotFound(format!("commit {}", sha)))?;
        let empty = BTreeMap::new();
        let after = inner.trees.get(&commit.tree).unwrap_or(&empty);
        let before = commit
            .parents
            .first()
            .and_then(|p| inner.commits.get(p))
            .and_then(|p| inner.trees.get(&p.tree))
            .unwrap_or(&empty);
        Ok(changed_paths(before, after))
    }

    async fn list_pull_requests(
        &self,
        _repo: &RepoSlug,
        query: &PullRequestQuery,
    ) -> Result<Vec<PullRequest>, GatewayError> {
        self.record(
            MockOperation::ListPullRequests {
                head: query.head.clone(),
                base: query.base.clone(),
            },
            |f| match f {
                FailOn::ListPullRequests(e) => Some(e.clone()),
                _ => None,
            },
        )?;
        let head = query
            .head
            .split_once(':')
            .map(|(_, branch)| branch)
            .unwrap_or(&query.head);
        Ok(self
            .lock()
            .pulls
            .iter()
            .filter(|pr| pr.state == query.state && pr.head == head && pr.base == query.base)
            .cloned()
            .collect())
    }

    async fn create_pull_request(
        &self,
        repo: &RepoSlug,
        request: &NewPullRequest,
    ) -> Result<PullRequest, GatewayError> {
        self.record(
            MockOperation::CreatePullRequest {
                head: request.head.clone(),
                base: request.base.clone(),
                title: request.title.clone(),
            },
            |_| None,
        )?;
        let mut inner = self.lock();
        let number = inner.pulls.iter().map(|pr| pr.number).max().unwrap_or(0) + 1;
        let pr = PullRequest {
            number,
            title: request.title.clone(),
            body: request.body.clone(),
            state: PrState::Open,
            head: request.head.clone(),
            base: request.base.clone(),
            url: Some(format!("https://github.com/{}/pull/{}", repo, number)),
        };
        inner.pulls.push(pr.clone());
        Ok(pr)
    }
}
