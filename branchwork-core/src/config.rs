//! Configuration management for branchwork
//!
//! Configuration is loaded with the following priority (highest to lowest):
//! 1. CLI flags
//! 2. Environment variables (BRANCHWORK_*)
//! 3. Config file (~/.config/branchwork/config.toml)
//! 4. Default values

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::gateway::Signature;
use crate::repository::{RepoSlug, RepositoryHandle};
use crate::{Error, Result};

/// Which repository to work on and which branches to guard
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RepositoryConfig {
    /// `owner/repo` or a clone URL
    pub slug: Option<String>,

    /// Branch new branches fork from and pull requests target
    pub base_branch: String,

    /// Branches that reject direct commits
    pub protected: Vec<String>,

    /// Add the base branch to the protected set
    pub protect_base_branch: bool,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            slug: None,
            base_branch: "main".to_string(),
            protected: Vec::new(),
            protect_base_branch: true,
        }
    }
}

/// Identity recorded as author and committer
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CommitConfig {
    pub author_name: String,
    pub author_email: String,
}

impl Default for CommitConfig {
    fn default() -> Self {
        Self {
            author_name: "Branchwork Agent".to_string(),
            author_email: "branchwork-agent@users.noreply.github.com".to_string(),
        }
    }
}

impl CommitConfig {
    pub fn identity(&self) -> Signature {
        Signature {
            name: self.author_name.clone(),
            email: self.author_email.clone(),
        }
    }
}

/// Remote API settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Deadline for each remote call
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,

    /// API root, for GitHub Enterprise Server
    pub api_base: Option<String>,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            api_base: None,
        }
    }
}

/// Parse a human-readable duration such as `45s` or `2m`
pub fn parse_timeout(value: &str) -> Result<Duration> {
    humantime_serde::re::humantime::parse_duration(value.trim())
        .map_err(|e| Error::Config(format!("'{}' is not a duration: {}", value, e)))
}

/// Values supplied on the command line
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub repo: Option<String>,
    pub base_branch: Option<String>,
    pub protected: Vec<String>,
    pub request_timeout: Option<Duration>,
}

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub repository: RepositoryConfig,
    pub commit: CommitConfig,
    pub remote: RemoteConfig,
}

impl Config {
    /// Load configuration from the default config file location
    ///
    /// Returns default config if file doesn't exist
    pub fn load() -> Result<Self> {
        match Self::default_config_path() {
            Some(path) if path.exists() => Self::load_from_file(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        toml::from_str(&contents).map_err(|e| {
            Error::Config(format!("Failed to parse {}: {}", path.display(), e))
        })
    }

    /// Get the default config file path
    ///
    /// Returns `~/.config/branchwork/config.toml` on Unix
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("branchwork").join("config.toml"))
    }

    /// Apply environment variable overrides
    ///
    /// Supported variables:
    /// - BRANCHWORK_REPO: repository slug or URL
    /// - BRANCHWORK_BASE_BRANCH: base branch
    /// - BRANCHWORK_PROTECTED: comma-separated protected branches
    /// - BRANCHWORK_REQUEST_TIMEOUT: per-call deadline, e.g. `45s`
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_vars(|key| std::env::var(key).ok())
    }

    fn with_vars(mut self, var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(repo) = var("BRANCHWORK_REPO") {
            self.repository.slug = Some(repo);
        }

        if let Some(base) = var("BRANCHWORK_BASE_BRANCH") {
            self.repository.base_branch = base;
        }

        if let Some(protected) = var("BRANCHWORK_PROTECTED") {
            self.repository.protected = protected
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(String::from)
                .collect();
        }

        if let Some(timeout) = var("BRANCHWORK_REQUEST_TIMEOUT") {
            self.remote.request_timeout = parse_timeout(&timeout)?;
        }

        Ok(self)
    }

    /// Apply CLI flag overrides
    pub fn with_cli_overrides(mut self, overrides: ConfigOverrides) -> Self {
        if let Some(repo) = overrides.repo {
            self.repository.slug = Some(repo);
        }

        if let Some(base) = overrides.base_branch {
            self.repository.base_branch = base;
        }

        if !overrides.protected.is_empty() {
            self.repository.protected = overrides.protected;
        }

        if let Some(timeout) = overrides.request_timeout {
            self.remote.request_timeout = timeout;
        }

        self
    }

    /// Load configuration with all overrides applied
    ///
    /// Priority: CLI > env > config file > defaults
    pub fn load_with_overrides(
        config_path: Option<&Path>,
        overrides: ConfigOverrides,
    ) -> Result<Self> {
        let config = match config_path {
            Some(path) => Self::load_from_file(path)?,
            None => Self::load()?,
        };
        Ok(config.with_env_overrides()?.with_cli_overrides(overrides))
    }

    /// Protected branch names, including the base branch when configured
    pub fn protected_branches(&self) -> Vec<String> {
        let mut names = self.repository.protected.clone();
        if self.repository.protect_base_branch
            && !names.contains(&self.repository.base_branch)
        {
            names.push(self.repository.base_branch.clone());
        }
        names
    }

    /// Build the repository handle this configuration describes
    pub fn repository_handle(&self) -> Result<RepositoryHandle> {
        let slug: RepoSlug = self
            .repository
            .slug
            .as_deref()
            .ok_or_else(|| {
                Error::Config(
                    "No repository configured. Pass --repo, set BRANCHWORK_REPO \
                     or add [repository] slug to the config file"
                        .to_string(),
                )
            })?
            .parse()?;

        Ok(RepositoryHandle::new(slug, &self.repository.base_branch)
            .with_protected(self.protected_branches()))
    }
}
