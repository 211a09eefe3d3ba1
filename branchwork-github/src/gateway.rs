//! Repository gateway over the GitHub REST API
//!
//! Git data endpoints (`git/refs`, `git/blobs`, `git/trees`, `git/commits`)
//! carry the object model; `contents`, `branches`, `commits` and `pulls`
//! cover the rest.

use async_trait::async_trait;
use base64::Engine;
use branchwork_core::gateway::{
    CommitObject, CommitSummary, ContentKind, Contents, DirectoryEntry, EntryKind, NewCommit,
    NewPullRequest, NewTreeEntry, ObjectId, PullRequest, PullRequestQuery, RefUpdate, Signature,
    TreeEntry, TreeListing,
};
use branchwork_core::{GatewayError, RepoSlug, RepositoryGateway};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::client::repo_route;
use crate::error::classify;
use crate::GitHubClient;

#[derive(Debug, Deserialize)]
struct ShaOnly {
    sha: ObjectId,
}

#[derive(Debug, Deserialize)]
struct RefResponse {
    object: ShaOnly,
}

#[derive(Debug, Serialize)]
struct CreateRefRequest<'a> {
    #[serde(rename = "ref")]
    git_ref: String,
    sha: &'a str,
}

#[derive(Debug, Serialize)]
struct UpdateRefRequest<'a> {
    sha: &'a str,
    force: bool,
}

#[derive(Debug, Serialize)]
struct CreateBlobRequest {
    content: String,
    encoding: &'static str,
}

#[derive(Debug, Deserialize)]
struct TreeItem {
    path: String,
    #[serde(rename = "type")]
    kind: EntryKind,
    sha: ObjectId,
}

#[derive(Debug, Deserialize)]
struct TreeResponse {
    sha: ObjectId,
    tree: Vec<TreeItem>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Debug, Serialize)]
struct CreateTreeRequest<'a> {
    base_tree: &'a str,
    tree: &'a [NewTreeEntry],
}

#[derive(Debug, Deserialize)]
struct GitCommitResponse {
    sha: ObjectId,
    tree: ShaOnly,
    parents: Vec<ShaOnly>,
}

#[derive(Debug, Serialize)]
struct CreateCommitRequest<'a> {
    message: &'a str,
    tree: &'a str,
    parents: &'a [ObjectId],
    author: &'a Signature,
    committer: &'a Signature,
}

#[derive(Debug, Deserialize)]
struct ContentItem {
    path: String,
    sha: ObjectId,
    #[serde(rename = "type")]
    kind: ContentKind,
    content: Option<String>,
    encoding: Option<String>,
}

/// A directory answers with an array, anything else with one object
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ContentResponse {
    Directory(Vec<ContentItem>),
    Entry(ContentItem),
}

#[derive(Debug, Deserialize)]
struct CommitAuthor {
    name: Option<String>,
    date: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct CommitDetail {
    message: String,
    author: Option<CommitAuthor>,
}

#[derive(Debug, Deserialize)]
struct CommitListItem {
    sha: ObjectId,
    commit: CommitDetail,
}

#[derive(Debug, Deserialize)]
struct ChangedFile {
    filename: String,
}

#[derive(Debug, Deserialize)]
struct CommitWithFiles {
    #[serde(default)]
    files: Vec<ChangedFile>,
}

fn heads<'a>(branch: &'a str) -> impl Iterator<Item = &'a str> {
    std::iter::once("heads").chain(branch.split('/'))
}

impl GitHubClient {
    async fn get_json<R, P>(&self, route: String, params: Option<&P>) -> Result<R, GatewayError>
    where
        R: serde::de::DeserializeOwned,
        P: Serialize + ?Sized,
    {
        self.client().get(route, params).await.map_err(classify)
    }

    async fn post_json<R, B>(&self, route: String, body: &B) -> Result<R, GatewayError>
    where
        R: serde::de::DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.client().post(route, Some(body)).await.map_err(classify)
    }
}

#[async_trait]
impl RepositoryGateway for GitHubClient {
    async fn get_ref(&self, repo: &RepoSlug, branch: &str) -> Result<ObjectId, GatewayError> {
        // `git/ref` (singular) matches exactly; `git/refs` would prefix-match
        let route = repo_route(repo, ["git", "ref"].into_iter().chain(heads(branch)))?;
        let response: RefResponse = self.get_json(route, None::<&()>).await?;
        debug!(repo = %repo, branch, sha = %response.object.sha, "Resolved branch");
        Ok(response.object.sha)
    }

    async fn create_ref(
        &self,
        repo: &RepoSlug,
        branch: &str,
        sha: &str,
    ) -> Result<(), GatewayError> {
        let route = repo_route(repo, ["git", "refs"])?;
        let body = CreateRefRequest {
            git_ref: format!("refs/heads/{}", branch),
            sha,
        };
        let _: serde_json::Value = self.post_json(route, &body).await?;
        info!(repo = %repo, branch, sha, "Created branch");
        Ok(())
    }

    async fn update_ref(
        &self,
        repo: &RepoSlug,
        branch: &str,
        update: &RefUpdate,
    ) -> Result<(), GatewayError> {
        // The REST API has no compare-and-swap. A non-forced update only
        // succeeds as a fast-forward, and the new commit's parent is the
        // expected head, so a concurrent advance is rejected with 422.
        let route = repo_route(repo, ["git", "refs"].into_iter().chain(heads(branch)))?;
        let body = UpdateRefRequest {
            sha: &update.sha,
            force: false,
        };
        let _: serde_json::Value = self
            .client()
            .patch(route, Some(&body))
            .await
            .map_err(classify)?;
        info!(
            repo = %repo,
            branch,
            sha = %update.sha,
            expected = ?update.expected,
            "Updated branch"
        );
        Ok(())
    }

    async fn get_tree(
        &self,
        repo: &RepoSlug,
        tree_ish: &str,
        recursive: bool,
    ) -> Result<TreeListing, GatewayError> {
        let route = repo_route(repo, ["git", "trees"].into_iter().chain(tree_ish.split('/')))?;
        let response: TreeResponse = if recursive {
            self.get_json(route, Some(&[("recursive", "1")][..])).await?
        } else {
            self.get_json(route, None::<&()>).await?
        };

        Ok(TreeListing {
            sha: response.sha,
            entries: response
                .tree
                .into_iter()
                .map(|item| TreeEntry {
                    path: item.path,
                    kind: item.kind,
                    sha: item.sha,
                })
                .collect(),
            truncated: response.truncated,
        })
    }

    async fn get_commit(&self, repo: &RepoSlug, sha: &str) -> Result<CommitObject, GatewayError> {
        let route = repo_route(repo, ["git", "commits", sha])?;
        let response: GitCommitResponse = self.get_json(route, None::<&()>).await?;
        Ok(CommitObject {
            sha: response.sha,
            tree: response.tree.sha,
            parents: response.parents.into_iter().map(|p| p.sha).collect(),
        })
    }

    async fn create_blob(&self, repo: &RepoSlug, content: &[u8]) -> Result<ObjectId, GatewayError> {
        let route = repo_route(repo, ["git", "blobs"])?;
        let body = CreateBlobRequest {
            content: base64::engine::general_purpose::STANDARD.encode(content),
            encoding: "base64",
        };
        let response: ShaOnly = self.post_json(route, &body).await?;
        debug!(repo = %repo, sha = %response.sha, size = content.len(), "Created blob");
        Ok(response.sha)
    }

    async fn create_tree(
        &self,
        repo: &RepoSlug,
        base_tree: &str,
        entries: &[NewTreeEntry],
    ) -> Result<ObjectId, GatewayError> {
        let route = repo_route(repo, ["git", "trees"])?;
        let body = CreateTreeRequest {
            base_tree,
            tree: entries,
        };
        let response: ShaOnly = self.post_json(route, &body).await?;
        debug!(repo = %repo, sha = %response.sha, entries = entries.len(), "Created tree");
        Ok(response.sha)
    }

    async fn create_commit(
        &self,
        repo: &RepoSlug,
        commit: &NewCommit,
    ) -> Result<ObjectId, GatewayError> {
        let route = repo_route(repo, ["git", "commits"])?;
        let body = CreateCommitRequest {
            message: &commit.message,
            tree: &commit.tree,
            parents: &commit.parents,
            author: &commit.author,
            committer: &commit.committer,
        };
        let response: ShaOnly = self.post_json(route, &body).await?;
        debug!(repo = %repo, sha = %response.sha, "Created commit");
        Ok(response.sha)
    }

    async fn get_content(
        &self,
        repo: &RepoSlug,
        path: &str,
        git_ref: &str,
    ) -> Result<Contents, GatewayError> {
        let route = repo_route(repo, std::iter::once("contents").chain(path.split('/')))?;
        let response: ContentResponse = self.get_json(route, Some(&[("ref", git_ref)][..])).await?;

        Ok(match response {
            ContentResponse::Directory(items) => Contents::Directory(
                items
                    .into_iter()
                    .map(|item| DirectoryEntry {
                        path: item.path,
                        kind: item.kind,
                    })
                    .collect(),
            ),
            ContentResponse::Entry(item) if item.kind == ContentKind::Dir => {
                Contents::Directory(Vec::new())
            }
            ContentResponse::Entry(item) => Contents::File {
                sha: item.sha,
                content: item.content.unwrap_or_default(),
                encoding: item.encoding.unwrap_or_else(|| "base64".to_string()),
            },
        })
    }

    async fn list_branches(&self, repo: &RepoSlug) -> Result<Vec<String>, GatewayError> {
        let page = self
            .client()
            .repos(&repo.owner, &repo.name)
            .list_branches()
            .per_page(100)
            .send()
            .await
            .map_err(classify)?;
        let branches = self.client().all_pages(page).await.map_err(classify)?;
        Ok(branches.into_iter().map(|b| b.name).collect())
    }

    async fn list_commits(
        &self,
        repo: &RepoSlug,
        branch: &str,
    ) -> Result<Vec<CommitSummary>, GatewayError> {
        let route = repo_route(repo, ["commits"])?;
        let params = [("sha", branch), ("per_page", "100")];
        let items: Vec<CommitListItem> = self.get_json(route, Some(&params[..])).await?;

        Ok(items
            .into_iter()
            .map(|item| {
                let (author, date) = match item.commit.author {
                    Some(a) => (a.name, a.date),
                    None => (None, None),
                };
                CommitSummary {
                    sha: item.sha,
                    message: item.commit.message,
                    author,
                    date,
                }
            })
            .collect())
    }

    async fn commit_files(&self, repo: &RepoSlug, sha: &str) -> Result<Vec<String>, GatewayError> {
        let route = repo_route(repo, ["commits", sha])?;
        let response: CommitWithFiles = self.get_json(route, None::<&()>).await?;
        Ok(response.files.into_iter().map(|f| f.filename).collect())
    }

    async fn list_pull_requests(
        &self,
        repo: &RepoSlug,
        query: &PullRequestQuery,
    ) -> Result<Vec<PullRequest>, GatewayError> {
        self.find_pull_requests(repo, query).await
    }

    async fn create_pull_request(
        &self,
        repo: &RepoSlug,
        request: &NewPullRequest,
    ) -> Result<PullRequest, GatewayError> {
        self.open_pull_request(repo, request).await
    }
}
