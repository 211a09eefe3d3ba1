//! Read-only commands: listings, file contents and history

use std::io::Write;

use branchwork_core::RepositoryTools;
use clap::Args;

use super::print_json;

/// List files on a branch
#[derive(Args, Debug)]
pub struct LsArgs {
    /// Branch to list (defaults to the base branch)
    #[arg(short, long)]
    pub branch: Option<String>,

    /// Include directory entries
    #[arg(short, long)]
    pub all: bool,
}

impl LsArgs {
    pub async fn execute(&self, mut tools: RepositoryTools) -> anyhow::Result<()> {
        let workspace = tools.workspace_mut();
        if let Some(branch) = &self.branch {
            workspace.checkout(branch).await?;
        }
        print_json(&workspace.list_files(!self.all).await?)
    }
}

/// List one directory level
#[derive(Args, Debug)]
pub struct DirArgs {
    /// Directory path (defaults to the repository root)
    #[arg(default_value = "")]
    pub path: String,

    /// Branch to read (defaults to the base branch)
    #[arg(short, long)]
    pub branch: Option<String>,
}

impl DirArgs {
    pub async fn execute(&self, mut tools: RepositoryTools) -> anyhow::Result<()> {
        let workspace = tools.workspace_mut();
        if let Some(branch) = &self.branch {
            workspace.checkout(branch).await?;
        }
        print_json(&workspace.list_directory(&self.path).await?)
    }
}

/// Read several files from a branch
#[derive(Args, Debug)]
pub struct CatArgs {
    /// Branch to read
    pub branch: String,

    /// Paths to read
    #[arg(required = true)]
    pub paths: Vec<String>,
}

impl CatArgs {
    pub async fn execute(&self, mut tools: RepositoryTools) -> anyhow::Result<()> {
        let results = tools.read_files(&self.branch, &self.paths).await?;
        print_json(&results)
    }
}

/// Print one file's raw contents
#[derive(Args, Debug)]
pub struct ShowArgs {
    /// File path
    pub path: String,

    /// Read as of this commit instead of a branch head
    #[arg(short, long, conflicts_with = "branch")]
    pub commit: Option<String>,

    /// Branch to read (defaults to the base branch)
    #[arg(short, long)]
    pub branch: Option<String>,
}

impl ShowArgs {
    pub async fn execute(&self, mut tools: RepositoryTools) -> anyhow::Result<()> {
        let workspace = tools.workspace_mut();
        let content = match (&self.commit, &self.branch) {
            (Some(commit), _) => workspace.read_file_at_commit(&self.path, commit).await?,
            (None, Some(branch)) => {
                workspace.checkout(branch).await?;
                workspace.read_file(&self.path).await?
            }
            (None, None) => workspace.read_file(&self.path).await?,
        };

        let mut stdout = std::io::stdout().lock();
        stdout.write_all(&content)?;
        stdout.flush()?;
        Ok(())
    }
}

/// Show recent commits on a branch
#[derive(Args, Debug)]
pub struct LogArgs {
    /// Branch (defaults to the base branch)
    #[arg(short, long)]
    pub branch: Option<String>,

    /// Show at most this many commits
    #[arg(short = 'n', long, default_value = "20")]
    pub limit: usize,
}

impl LogArgs {
    pub async fn execute(&self, tools: RepositoryTools) -> anyhow::Result<()> {
        let mut commits = tools
            .workspace()
            .list_commits(self.branch.as_deref())
            .await?;
        commits.truncate(self.limit);
        print_json(&commits)
    }
}

/// List paths changed by a commit
#[derive(Args, Debug)]
pub struct ChangedArgs {
    /// Commit SHA
    pub commit: String,
}

impl ChangedArgs {
    pub async fn execute(&self, tools: RepositoryTools) -> anyhow::Result<()> {
        print_json(&tools.workspace().commit_files(&self.commit).await?)
    }
}
