//! Commands that change the remote: branches, commits, pull requests

use std::path::PathBuf;

use anyhow::Context;
use branchwork_core::{Error, FileChange, RepositoryTools};
use clap::Args;
use serde::Serialize;
use tracing::error;

use super::print_json;

/// Switch to a branch, creating it from the base branch if needed
#[derive(Args, Debug)]
pub struct CheckoutArgs {
    /// Branch name
    pub branch: String,
}

#[derive(Serialize)]
struct CheckoutReport<'a> {
    branch: &'a str,
    created: bool,
}

impl CheckoutArgs {
    pub async fn execute(&self, mut tools: RepositoryTools) -> anyhow::Result<()> {
        let checkout = tools.workspace_mut().checkout(&self.branch).await?;
        print_json(&CheckoutReport {
            branch: &self.branch,
            created: checkout.was_created(),
        })
    }
}

/// Commit files to a branch as one commit
#[derive(Args, Debug)]
pub struct CommitArgs {
    /// Target branch (created from the base branch if missing)
    #[arg(short, long)]
    pub branch: String,

    /// Commit message
    #[arg(short, long)]
    pub message: String,

    /// Repository path and local file, as `path=local-file`
    #[arg(short, long = "file", value_name = "PATH=LOCAL")]
    pub files: Vec<String>,

    /// Also read a JSON array of `{"path", "content"}` objects from stdin
    #[arg(long)]
    pub stdin: bool,
}

impl CommitArgs {
    fn collect_changes(&self) -> anyhow::Result<Vec<FileChange>> {
        let mut changes = Vec::new();

        for mapping in &self.files {
            let (path, local) = mapping
                .split_once('=')
                .ok_or_else(|| anyhow::anyhow!("Expected PATH=LOCAL, got '{}'", mapping))?;
            let local = PathBuf::from(local);
            let content = std::fs::read(&local)
                .with_context(|| format!("Failed to read {}", local.display()))?;
            changes.push(FileChange::new(path, content));
        }

        if self.stdin {
            let from_stdin: Vec<FileChange> = serde_json::from_reader(std::io::stdin().lock())
                .context("Failed to parse file changes from stdin")?;
            changes.extend(from_stdin);
        }

        Ok(changes)
    }

    pub async fn execute(&self, mut tools: RepositoryTools) -> anyhow::Result<()> {
        let changes = self.collect_changes()?;
        if changes.is_empty() {
            anyhow::bail!("Nothing to commit. Pass --file PATH=LOCAL or --stdin");
        }

        match tools
            .commit_files(&self.branch, &changes, &self.message)
            .await
        {
            Ok(receipt) => print_json(&receipt),
            Err(e @ Error::AmbiguousCommitOutcome { .. }) => {
                error!(error = %e, "Commit may have landed; inspect the branch before retrying");
                Err(e.into())
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Open a pull request into the base branch, or find the open one
#[derive(Args, Debug)]
pub struct PrArgs {
    /// Source branch
    #[arg(short, long)]
    pub branch: String,

    /// Pull request title
    #[arg(short, long)]
    pub title: String,

    /// Pull request body
    #[arg(long, default_value = "")]
    pub body: String,
}

impl PrArgs {
    pub async fn execute(&self, mut tools: RepositoryTools) -> anyhow::Result<()> {
        let ensured = tools
            .open_pull_request(&self.branch, &self.title, &self.body)
            .await?;
        print_json(&ensured)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn args(files: Vec<String>) -> CommitArgs {
        CommitArgs {
            branch: "feature/x".to_string(),
            message: "msg".to_string(),
            files,
            stdin: false,
        }
    }

    #[test]
    fn test_collect_changes_reads_local_files() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "hello").unwrap();

        let mapping = format!("docs/a.md={}", file.path().display());
        let changes = args(vec![mapping]).collect_changes().unwrap();

        assert_eq!(changes, vec![FileChange::new("docs/a.md", "hello")]);
    }

    #[test]
    fn test_collect_changes_rejects_malformed_mapping() {
        assert!(args(vec!["no-equals-sign".to_string()]).collect_changes().is_err());
    }
}
