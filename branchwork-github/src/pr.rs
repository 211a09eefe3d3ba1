//! Pull request listing and creation

use branchwork_core::gateway::{NewPullRequest, PrState, PullRequest, PullRequestQuery};
use branchwork_core::{GatewayError, RepoSlug};
use octocrab::models::pulls::PullRequest as OctocrabPR;
use octocrab::models::IssueState;
use tracing::{debug, info};

use crate::error::classify;
use crate::GitHubClient;

fn pr_state(state: Option<IssueState>) -> PrState {
    match state {
        Some(IssueState::Closed) => PrState::Closed,
        _ => PrState::Open, // Default for unknown states
    }
}

/// Convert an octocrab pull request into the gateway's view of it
pub(crate) fn convert(pr: OctocrabPR) -> PullRequest {
    PullRequest {
        number: pr.number,
        title: pr.title.unwrap_or_default(),
        body: pr.body.unwrap_or_default(),
        state: pr_state(pr.state),
        head: pr.head.ref_field,
        base: pr.base.ref_field,
        url: pr.html_url.map(|u| u.to_string()),
    }
}

impl GitHubClient {
    /// List pull requests matching `query` (first 100)
    pub(crate) async fn find_pull_requests(
        &self,
        repo: &RepoSlug,
        query: &PullRequestQuery,
    ) -> Result<Vec<PullRequest>, GatewayError> {
        let state = match query.state {
            PrState::Open => octocrab::params::State::Open,
            PrState::Closed => octocrab::params::State::Closed,
        };

        let page = self
            .client()
            .pulls(&repo.owner, &repo.name)
            .list()
            .state(state)
            .head(query.head.clone())
            .base(query.base.clone())
            .per_page(100)
            .send()
            .await
            .map_err(classify)?;

        debug!(
            repo = %repo,
            head = %query.head,
            count = page.items.len(),
            "Listed pull requests"
        );
        Ok(page.items.into_iter().map(convert).collect())
    }

    /// Open a pull request
    pub(crate) async fn open_pull_request(
        &self,
        repo: &RepoSlug,
        request: &NewPullRequest,
    ) -> Result<PullRequest, GatewayError> {
        let pr = self
            .client()
            .pulls(&repo.owner, &repo.name)
            .create(&request.title, &request.head, &request.base)
            .body(&request.body)
            .send()
            .await
            .map_err(classify)?;

        info!(repo = %repo, number = pr.number, head = %request.head, "Created pull request");
        Ok(convert(pr))
    }
}
