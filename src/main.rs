//! Local devnet bootstrapper CLI
//!
//! Brings up a single-node devnet from a source checkout:
//!
//! 1. `cargo build --release --bin pd`, then `pd --help` to prove it runs
//! 2. `pd testnet generate ...` if `~/.penumbra/testnet_data` does not exist
//! 3. point the node's indexer at Postgres (fresh state only)
//! 4. `process-compose up --config deployments/compose/process-compose.yml ...`
//!
//! # Usage
//!
//! ```bash
//! # Bring up the devnet
//! devnet-bootstrap
//!
//! # Forward arguments to the supervisor
//! devnet-bootstrap --tui=false
//!
//! # Forward arguments that clash with our own options
//! devnet-bootstrap -- --help
//!
//! # Show what the next run would do
//! devnet-bootstrap --status
//! ```
//!
//! Exits with the supervisor's exit code, or a phase-specific code if a
//! phase before the handoff fails.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use devnet_bootstrap::config::{
    self, DevnetConfig, DEFAULT_INDEXER_DATABASE_URL, DEFAULT_NODE_BINARY, DEFAULT_SUPERVISOR,
    DEFAULT_SUPERVISOR_CONFIG,
};
use devnet_bootstrap::error::EXIT_CONFIG;
use devnet_bootstrap::{Bootstrap, BootstrapError, Plan, SystemRunner};

#[derive(Parser)]
#[command(name = "devnet-bootstrap")]
#[command(author, version, about = "Local devnet bootstrapper", long_about = None)]
struct Cli {
    /// Cargo workspace containing the node binary [default: current directory]
    #[arg(long, env = "DEVNET_WORKSPACE")]
    workspace: Option<PathBuf>,

    /// Network state directory [default: ~/.penumbra/testnet_data]
    #[arg(long, env = "DEVNET_STATE_DIR")]
    state_dir: Option<PathBuf>,

    /// Node binary target to build and use for generation
    #[arg(long, env = "DEVNET_NODE_BINARY", default_value = DEFAULT_NODE_BINARY)]
    node_binary: String,

    /// Process supervisor executable
    #[arg(long, env = "DEVNET_SUPERVISOR", default_value = DEFAULT_SUPERVISOR)]
    supervisor: String,

    /// Supervisor config, relative to the workspace unless absolute
    #[arg(long, env = "DEVNET_SUPERVISOR_CONFIG", default_value = DEFAULT_SUPERVISOR_CONFIG)]
    supervisor_config: PathBuf,

    /// Postgres connection string for the node's indexer
    #[arg(
        long,
        env = "PENUMBRA_INDEXER_DATABASE_URL",
        default_value = DEFAULT_INDEXER_DATABASE_URL,
        hide_env_values = true
    )]
    indexer_database_url: String,

    /// Reuse the existing release binary instead of running cargo
    #[arg(long, env = "DEVNET_SKIP_BUILD")]
    skip_build: bool,

    /// Show configuration and what the next run would do, then exit
    #[arg(long)]
    status: bool,

    /// Arguments forwarded verbatim to the supervisor
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, value_name = "SUPERVISOR_ARGS")]
    supervisor_args: Vec<String>,
}

impl Cli {
    fn to_config(&self) -> Result<DevnetConfig> {
        let cwd = std::env::current_dir().context("Failed to determine current directory")?;
        let workspace = match &self.workspace {
            Some(path) => config::resolve(&cwd, path),
            None => cwd.clone(),
        };
        let state_dir = match &self.state_dir {
            Some(path) => config::resolve(&cwd, path),
            None => {
                let home = std::env::var_os("HOME")
                    .map(PathBuf::from)
                    .context("HOME is not set; pass --state-dir")?;
                config::default_state_dir(&home)
            }
        };

        let mut config = DevnetConfig::new(&workspace, state_dir);
        config.node_binary = self.node_binary.clone();
        config.supervisor = self.supervisor.clone();
        config.supervisor_config = config::resolve(&workspace, &self.supervisor_config);
        config.indexer_database_url = self.indexer_database_url.clone();
        config.skip_build = self.skip_build;
        Ok(config)
    }
}

/// Initialize tracing with `RUST_LOG` filtering, logging to stderr.
fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();
    init_tracing();

    let code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            e.downcast_ref::<BootstrapError>()
                .map(BootstrapError::exit_code)
                .unwrap_or(EXIT_CONFIG)
        }
    };

    std::process::exit(code);
}

async fn run(cli: Cli) -> Result<i32> {
    let config = cli.to_config()?;

    if cli.status {
        cmd_status(&config);
        return Ok(0);
    }

    let runner = SystemRunner::new().context("Failed to install signal handlers")?;
    let outcome = Bootstrap::new(&config, &runner)
        .run(cli.supervisor_args)
        .await?;

    Ok(outcome.exit_code())
}

fn cmd_status(config: &DevnetConfig) {
    let plan = Plan::for_config(config);
    let artifact = config.artifact_path();

    println!("Devnet Bootstrap Status");
    println!("=======================");
    println!();
    println!("Configuration:");
    println!("  Workspace:         {}", config.workspace.display());
    println!("  Node binary:       {}", config.node_binary);
    println!("  State dir:         {}", config.state_dir.display());
    println!("  Chain id:          {}", config.genesis.chain_id);
    println!("  Supervisor:        {}", config.supervisor);
    println!("  Supervisor config: {}", config.supervisor_config.display());
    println!();

    println!("Artifacts:");
    if artifact.is_file() {
        println!("  Node binary:       BUILT at {}", artifact.display());
    } else {
        println!("  Node binary:       NOT BUILT");
    }
    if plan.state.exists() {
        println!("  Network state:     FOUND");
        if plan.state == devnet_bootstrap::probe::NetworkState::Unmarked {
            println!("  Completion marker: MISSING (generation may have been interrupted)");
        } else {
            println!("  Completion marker: FOUND");
        }
    } else {
        println!("  Network state:     NOT GENERATED");
    }
    if let Err(e) = config.validate() {
        println!("  Config check:      {}", e);
    }
    println!();

    println!("Next run:");
    if plan.build {
        println!("  1. Build {} (release) and check it runs", config.node_binary);
    } else {
        println!("  1. Check existing {} runs (build skipped)", config.node_binary);
    }
    if plan.generates() {
        println!("  2. Generate network state and patch the indexer");
    } else {
        println!("  2. Reuse existing network state");
    }
    println!("  3. Start {}", config.supervisor);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("devnet-bootstrap").chain(args.iter().copied()))
            .unwrap()
    }

    #[test]
    fn test_unknown_flags_pass_through() {
        let cli = parse(&["--tui=false", "-n", "x"]);
        assert_eq!(cli.supervisor_args, ["--tui=false", "-n", "x"]);
        assert!(!cli.status);
    }

    #[test]
    fn test_own_options_before_passthrough() {
        let cli = parse(&["--skip-build", "--tui=false", "--status"]);
        assert!(cli.skip_build);
        assert!(!cli.status);
        assert_eq!(cli.supervisor_args, ["--tui=false", "--status"]);
    }

    #[test]
    fn test_double_dash_forwards_clashing_flags() {
        let cli = parse(&["--", "--help"]);
        assert_eq!(cli.supervisor_args, ["--help"]);
    }

    #[test]
    fn test_no_arguments() {
        let cli = parse(&[]);
        assert!(cli.supervisor_args.is_empty());
        assert_eq!(cli.supervisor, DEFAULT_SUPERVISOR);
    }
}
