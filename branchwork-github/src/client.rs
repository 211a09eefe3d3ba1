//! GitHub API client using octocrab

use branchwork_core::{GatewayError, RepoSlug, Secrets};
use octocrab::Octocrab;
use tracing::info;

use crate::{Error, Result};

/// GitHub REST client implementing the repository gateway
#[derive(Clone)]
pub struct GitHubClient {
    client: Octocrab,
}

impl GitHubClient {
    /// Create a client authenticated with `token`
    ///
    /// `api_base` overrides `https://api.github.com`, e.g. for GitHub
    /// Enterprise Server or tests.
    pub fn new(token: impl Into<String>, api_base: Option<&str>) -> Result<Self> {
        let mut builder = Octocrab::builder().personal_token(token.into());
        if let Some(base) = api_base {
            builder = builder
                .base_uri(base)
                .map_err(|e| Error::Config(format!("Invalid API base {}: {}", base, e)))?;
        }

        let client = builder
            .build()
            .map_err(|e| Error::Auth(format!("Failed to create GitHub client: {}", e)))?;

        info!(api_base = api_base.unwrap_or("https://api.github.com"), "Created GitHub client");
        Ok(Self { client })
    }

    /// Create a client with the token from the environment or secrets file
    pub fn from_secrets(api_base: Option<&str>) -> Result<Self> {
        let secrets = Secrets::load().map_err(|e| Error::Auth(e.to_string()))?;
        let token = secrets.github_token().ok_or_else(|| {
            Error::Auth(
                "GitHub token not found. Set BRANCHWORK_GITHUB_TOKEN or GITHUB_TOKEN, \
                 or add a token to ~/.config/branchwork/secrets.toml"
                    .to_string(),
            )
        })?;
        Self::new(token, api_base)
    }

    /// Get the underlying octocrab client
    pub fn client(&self) -> &Octocrab {
        &self.client
    }
}

impl std::fmt::Debug for GitHubClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubClient").finish_non_exhaustive()
    }
}

/// Build `/repos/{owner}/{repo}/...` with each segment percent-encoded
///
/// Empty segments are dropped, so a path of `""` addresses the parent route.
pub(crate) fn repo_route<'a, I>(
    repo: &RepoSlug,
    segments: I,
) -> std::result::Result<String, GatewayError>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut url = url::Url::parse("https://api.github.com/")
        .map_err(|e| GatewayError::Transport(e.to_string()))?;
    url.path_segments_mut()
        .map_err(|_| GatewayError::Transport("cannot build API route".to_string()))?
        .pop_if_empty()
        .extend(["repos", repo.owner.as_str(), repo.name.as_str()])
        .extend(segments.into_iter().filter(|s| !s.is_empty()));
    Ok(url.path().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slug() -> RepoSlug {
        RepoSlug::new("acme", "widgets")
    }

    #[test]
    fn test_repo_route() {
        let route = repo_route(&slug(), ["git", "ref", "heads", "main"]).unwrap();
        assert_eq!(route, "/repos/acme/widgets/git/ref/heads/main");
    }

    #[test]
    fn test_repo_route_splits_nested_paths() {
        let segments = ["contents"].into_iter().chain("docs/My File.md".split('/'));
        let route = repo_route(&slug(), segments).unwrap();
        assert_eq!(route, "/repos/acme/widgets/contents/docs/My%20File.md");
    }

    #[test]
    fn test_repo_route_drops_empty_segments() {
        let route = repo_route(&slug(), ["contents", ""]).unwrap();
        assert_eq!(route, "/repos/acme/widgets/contents");
    }

    #[tokio::test]
    async fn test_new_with_custom_base() {
        assert!(GitHubClient::new("token", Some("http://localhost:9999")).is_ok());
    }
}
