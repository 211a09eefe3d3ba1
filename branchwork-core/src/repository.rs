//! Repository identity

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::guard::ProtectedBranches;
use crate::{Error, Result};

/// Owner and name of a hosted repository
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoSlug {
    pub owner: String,
    pub name: String,
}

impl RepoSlug {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }

    /// Qualify a branch name with the owner, as used by pull request head filters
    pub fn qualified_head(&self, branch: &str) -> String {
        format!("{}:{}", self.owner, branch)
    }
}

impl fmt::Display for RepoSlug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Parses `owner/repo`, `https://host/owner/repo[.git]` and `git@host:owner/repo.git`
impl FromStr for RepoSlug {
    type Err = Error;

    fn from_str(input: &str) -> Result<Self> {
        let input = input.trim();

        let path = if input.starts_with("https://") || input.starts_with("http://") {
            let url = url::Url::parse(input)
                .map_err(|e| Error::Config(format!("Invalid repository URL {}: {}", input, e)))?;
            url.path().trim_matches('/').to_string()
        } else if let Some(rest) = input.strip_prefix("git@") {
            rest.split_once(':')
                .map(|(_, path)| path.to_string())
                .ok_or_else(|| Error::Config(format!("Invalid SSH URL: {}", input)))?
        } else {
            input.to_string()
        };

        let path = path.trim_end_matches(".git");
        let mut parts = path.split('/').filter(|p| !p.is_empty());
        match (parts.next(), parts.next(), parts.next()) {
            (Some(owner), Some(name), None) => Ok(Self::new(owner, name)),
            _ => Err(Error::Config(format!(
                "Invalid repository format: {}. Expected owner/repo",
                input
            ))),
        }
    }
}

/// Immutable identity of the repository a workspace operates on
#[derive(Debug, Clone)]
pub struct RepositoryHandle {
    slug: RepoSlug,
    base_branch: String,
    protected: ProtectedBranches,
}

impl RepositoryHandle {
    /// Create a handle with no protected branches
    pub fn new(slug: RepoSlug, base_branch: impl Into<String>) -> Self {
        Self {
            slug,
            base_branch: base_branch.into(),
            protected: ProtectedBranches::default(),
        }
    }

    /// Set the protected branch names
    pub fn with_protected<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.protected = ProtectedBranches::new(names);
        self
    }

    pub fn slug(&self) -> &RepoSlug {
        &self.slug
    }

    pub fn owner(&self) -> &str {
        &self.slug.owner
    }

    pub fn name(&self) -> &str {
        &self.slug.name
    }

    pub fn base_branch(&self) -> &str {
        &self.base_branch
    }

    pub fn protected(&self) -> &ProtectedBranches {
        &self.protected
    }

    /// Protected names, sorted
    pub fn protected_names(&self) -> &BTreeSet<String> {
        self.protected.names()
    }
}
