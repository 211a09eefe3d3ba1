//! Pull request deduplication

use serde::Serialize;
use tracing::{debug, info};

use crate::gateway::{NewPullRequest, PrState, PullRequest, PullRequestQuery};
use crate::workspace::Workspace;
use crate::{Error, Result};

/// Pull request for the active branch, and whether this call opened it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "pull_request", rename_all = "lowercase")]
pub enum EnsuredPullRequest {
    Existing(PullRequest),
    Created(PullRequest),
}

impl EnsuredPullRequest {
    pub fn pull_request(&self) -> &PullRequest {
        match self {
            EnsuredPullRequest::Existing(pr) | EnsuredPullRequest::Created(pr) => pr,
        }
    }

    pub fn into_inner(self) -> PullRequest {
        match self {
            EnsuredPullRequest::Existing(pr) | EnsuredPullRequest::Created(pr) => pr,
        }
    }

    pub fn was_created(&self) -> bool {
        matches!(self, EnsuredPullRequest::Created(_))
    }
}

impl Workspace {
    /// Open a pull request from the active branch into the base branch,
    /// unless one is already open
    ///
    /// An existing pull request is returned as-is; its title and body are
    /// never edited.
    pub async fn ensure_pull_request(&self, title: &str, body: &str) -> Result<EnsuredPullRequest> {
        let branch = self.current_branch();
        let base = self.handle().base_branch();
        if branch == base {
            return Err(Error::Other(format!(
                "Cannot open a pull request from base branch '{}' into itself",
                base
            )));
        }

        let query = PullRequestQuery {
            state: PrState::Open,
            head: self.slug().qualified_head(branch),
            base: base.to_string(),
        };
        debug!(repo = %self.slug(), head = %query.head, base, "Looking for open pull request");

        let open = self
            .call(self.gateway().list_pull_requests(self.slug(), &query))
            .await?;
        if let Some(existing) = open.into_iter().next() {
            info!(number = existing.number, branch, "Reusing open pull request");
            return Ok(EnsuredPullRequest::Existing(existing));
        }

        let request = NewPullRequest {
            title: title.to_string(),
            head: branch.to_string(),
            base: base.to_string(),
            body: body.to_string(),
        };
        let created = self
            .call(self.gateway().create_pull_request(self.slug(), &request))
            .await?;
        info!(number = created.number, branch, base, "Created pull request");
        Ok(EnsuredPullRequest::Created(created))
    }
}
