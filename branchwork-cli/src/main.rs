//! Branchwork CLI - branch-scoped access to a hosted repository
//!
//! Reads and commits go through the GitHub API; nothing is cloned locally.

mod commands;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use branchwork_core::config::parse_timeout;
use branchwork_core::{Config, ConfigOverrides, RepositoryTools, Workspace};
use branchwork_github::GitHubClient;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use commands::{
    CatArgs, ChangedArgs, CheckoutArgs, CommitArgs, DirArgs, LogArgs, LsArgs, PrArgs, ShowArgs,
};

/// Branchwork: read and commit to a hosted repository, one branch at a time
#[derive(Parser, Debug)]
#[command(name = "branchwork")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to ~/.config/branchwork/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Repository as owner/repo or URL (overrides config and env)
    #[arg(short, long, global = true)]
    repo: Option<String>,

    /// Base branch (overrides config and env)
    #[arg(long, global = true)]
    base: Option<String>,

    /// Protected branches, comma separated (overrides config and env)
    #[arg(long, global = true, value_delimiter = ',')]
    protected: Vec<String>,

    /// Deadline for each remote call, e.g. 30s
    #[arg(long, global = true, value_parser = parse_timeout_arg)]
    timeout: Option<Duration>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show version information
    Version,

    /// List remote branches
    Branches,

    /// Switch to a branch, creating it from the base branch if needed
    #[command(visible_alias = "co")]
    Checkout(CheckoutArgs),

    /// List files on a branch
    Ls(LsArgs),

    /// List one directory level
    Dir(DirArgs),

    /// Read several files from a branch
    Cat(CatArgs),

    /// Print one file, optionally at a commit
    Show(ShowArgs),

    /// Show recent commits on a branch
    Log(LogArgs),

    /// List paths changed by a commit
    Changed(ChangedArgs),

    /// Commit files to a branch as one commit
    #[command(visible_alias = "ci")]
    Commit(CommitArgs),

    /// Open a pull request into the base branch, or find the open one
    Pr(PrArgs),

    /// Show current configuration
    Config,
}

fn parse_timeout_arg(value: &str) -> Result<Duration, String> {
    parse_timeout(value).map_err(|e| e.to_string())
}

/// Connect to GitHub and open a workspace on the configured repository
fn open_tools(config: &Config) -> anyhow::Result<RepositoryTools> {
    let handle = config.repository_handle()?;
    let client = GitHubClient::from_secrets(config.remote.api_base.as_deref())?;

    let workspace = Workspace::new(handle, Arc::new(client))
        .with_identity(config.commit.identity())
        .with_request_timeout(config.remote.request_timeout);
    Ok(RepositoryTools::new(workspace))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing; RUST_LOG wins over --verbose
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if cli.verbose { "debug" } else { "warn" }));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    if cli.verbose {
        tracing::info!("Verbose mode enabled");
    }

    // Load configuration with overrides
    let overrides = ConfigOverrides {
        repo: cli.repo.clone(),
        base_branch: cli.base.clone(),
        protected: cli.protected.clone(),
        request_timeout: cli.timeout,
    };
    let config = Config::load_with_overrides(cli.config.as_deref(), overrides)?;

    if cli.verbose {
        tracing::info!(
            repo = ?config.repository.slug,
            base_branch = %config.repository.base_branch,
            protected = ?config.protected_branches(),
            "Configuration loaded"
        );
    }

    match cli.command {
        Some(Commands::Version) => {
            println!("branchwork {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Config) => print_config(&config, cli.config.as_deref()),
        Some(Commands::Branches) => {
            let tools = open_tools(&config)?;
            commands::print_json(&tools.branches().await?)?;
        }
        Some(Commands::Checkout(args)) => args.execute(open_tools(&config)?).await?,
        Some(Commands::Ls(args)) => args.execute(open_tools(&config)?).await?,
        Some(Commands::Dir(args)) => args.execute(open_tools(&config)?).await?,
        Some(Commands::Cat(args)) => args.execute(open_tools(&config)?).await?,
        Some(Commands::Show(args)) => args.execute(open_tools(&config)?).await?,
        Some(Commands::Log(args)) => args.execute(open_tools(&config)?).await?,
        Some(Commands::Changed(args)) => args.execute(open_tools(&config)?).await?,
        Some(Commands::Commit(args)) => args.execute(open_tools(&config)?).await?,
        Some(Commands::Pr(args)) => args.execute(open_tools(&config)?).await?,
        None => {
            println!("Branchwork - branch-scoped access to a hosted repository");
            println!();
            println!("Use --help for usage information");
        }
    }

    Ok(())
}

fn print_config(config: &Config, path: Option<&std::path::Path>) {
    println!("Branchwork Configuration");
    println!("========================");
    println!();
    println!("Repository:");
    println!(
        "  slug: {}",
        config.repository.slug.as_deref().unwrap_or("(not set)")
    );
    println!("  base_branch: {}", config.repository.base_branch);
    println!("  protected: {}", config.protected_branches().join(", "));
    println!();
    println!("Commit identity:");
    println!(
        "  {} <{}>",
        config.commit.author_name, config.commit.author_email
    );
    println!();
    println!("Remote:");
    println!("  request_timeout: {:?}", config.remote.request_timeout);
    println!(
        "  api_base: {}",
        config.remote.api_base.as_deref().unwrap_or("https://api.github.com")
    );
    println!();

    let path = path
        .map(std::path::Path::to_path_buf)
        .or_else(Config::default_config_path);
    if let Some(path) = path {
        println!("Config file: {}", path.display());
        if path.exists() {
            println!("  (exists)");
        } else {
            println!("  (not found - using defaults)");
        }
    }
}
