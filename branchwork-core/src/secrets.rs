//! Access token lookup
//!
//! Tokens live apart from configuration so config files can be shared.
//! Lookup order:
//! 1. `BRANCHWORK_GITHUB_TOKEN`
//! 2. `GITHUB_TOKEN`
//! 3. `~/.config/branchwork/secrets.toml`, which must be private to its owner

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::{Error, Result};

const TOKEN_VARS: [&str; 2] = ["BRANCHWORK_GITHUB_TOKEN", "GITHUB_TOKEN"];

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Secrets {
    pub github: GitHubSecrets,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GitHubSecrets {
    pub token: Option<String>,
}

impl Secrets {
    /// Read the default secrets file, or nothing if it is absent
    pub fn load() -> Result<Self> {
        match Self::default_secrets_path() {
            Some(path) if path.exists() => Self::load_from_file(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Read a secrets file, refusing ones readable by group or others
    pub fn load_from_file(path: &Path) -> Result<Self> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;

            let mode = std::fs::metadata(path)?.permissions().mode();
            if mode & 0o077 != 0 {
                return Err(Error::Config(format!(
                    "Secrets file {} has insecure permissions {:o}; run chmod 600 {}",
                    path.display(),
                    mode & 0o777,
                    path.display()
                )));
            }
        }

        let contents = std::fs::read_to_string(path)?;
        toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("Failed to parse secrets: {}", e)))
    }

    /// `~/.config/branchwork/secrets.toml` on Unix
    pub fn default_secrets_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("branchwork").join("secrets.toml"))
    }

    /// Resolve the GitHub token from the environment, then this file
    pub fn github_token(&self) -> Option<String> {
        self.github_token_from(|key| std::env::var(key).ok())
    }

    fn github_token_from(&self, var: impl Fn(&str) -> Option<String>) -> Option<String> {
        for key in TOKEN_VARS {
            if let Some(token) = var(key).map(|t| t.trim().to_string()) {
                if !token.is_empty() {
                    debug!(source = key, "Using GitHub token from environment");
                    return Some(token);
                }
            }
        }

        let token = self.github.token.as_deref().map(str::trim)?;
        if token.is_empty() {
            return None;
        }
        debug!("Using GitHub token from secrets file");
        Some(token.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn file_secrets(token: &str) -> Secrets {
        Secrets {
            github: GitHubSecrets {
                token: Some(token.to_string()),
            },
        }
    }

    #[test]
    fn test_environment_wins_over_file() {
        let secrets = file_secrets("from_file");
        let token = secrets.github_token_from(|key| {
            (key == "GITHUB_TOKEN").then(|| " from_env ".to_string())
        });
        assert_eq!(token.as_deref(), Some("from_env"));
    }

    #[test]
    fn test_branchwork_variable_wins_over_generic() {
        let token = Secrets::default().github_token_from(|key| Some(format!("{key}-value")));
        assert_eq!(token.as_deref(), Some("BRANCHWORK_GITHUB_TOKEN-value"));
    }

    #[test]
    fn test_blank_values_are_skipped() {
        let secrets = file_secrets("  ghp_file  ");
        let token = secrets.github_token_from(|_| Some("   ".to_string()));
        assert_eq!(token.as_deref(), Some("ghp_file"));

        assert!(file_secrets("").github_token_from(|_| None).is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_insecure_permissions_rejected() {
        use std::os::unix::fs::PermissionsExt;

        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[github]\ntoken = \"ghp_test\"").unwrap();
        std::fs::set_permissions(file.path(), std::fs::Permissions::from_mode(0o644)).unwrap();

        let err = Secrets::load_from_file(file.path()).unwrap_err();
        assert!(err.to_string().contains("insecure permissions"));
    }

    #[cfg(unix)]
    #[test]
    fn test_private_file_accepted() {
        use std::os::unix::fs::PermissionsExt;

        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[github]\ntoken = \"ghp_test\"").unwrap();
        std::fs::set_permissions(file.path(), std::fs::Permissions::from_mode(0o600)).unwrap();

        let secrets = Secrets::load_from_file(file.path()).unwrap();
        assert_eq!(secrets.github.token.as_deref(), Some("ghp_test"));
    }
}
