//! Cluster Hunter - wallet clustering and evidence correlation for Stacks forensics
//!
//! Results are probabilistic. A high score means the on-chain evidence points
//! at a shared owner; it is not proof of identity.

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing::{error, info, warn};

use cluster_hunter::cli::commands::{self, InvestigateOptions};
use cluster_hunter::config::Config;
use cluster_hunter::mission::InvestigationRequest;
use cluster_hunter::report::OutputFormat;

/// Cluster Hunter - Stacks wallet clustering and evidence correlation
#[derive(Parser)]
#[command(name = "hunt")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "hunter.toml")]
    config: String,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an investigation against a contract or deployer
    Investigate(InvestigateArgs),

    /// Show current configuration (secrets masked)
    Config,

    /// Check chain indexer health
    Health,

    /// Run the HTTP investigation service
    Serve {
        /// Override server.bind
        #[arg(long)]
        bind: Option<String>,

        /// Serve chain data from a JSON fixture
        #[arg(long)]
        fixture: Option<PathBuf>,
    },
}

#[derive(Args)]
struct InvestigateArgs {
    /// Contract id (<address>.<name>) whose deployer seeds the cluster
    #[arg(long, conflicts_with = "deployer", required_unless_present = "deployer")]
    contract: Option<String>,

    /// Deployer address, skipping contract lookup
    #[arg(long)]
    deployer: Option<String>,

    /// Reference (operator) wallets
    #[arg(long, value_delimiter = ',', num_args = 1..)]
    reference_wallets: Vec<String>,

    /// Additional wallets under watch
    #[arg(long, value_delimiter = ',', num_args = 1..)]
    watch_wallets: Vec<String>,

    /// Transaction ids whose sender is checked against the cluster
    #[arg(long = "linked-tx", value_delimiter = ',', num_args = 1..)]
    linked_tx: Vec<String>,

    /// Maximum expansion depth (default: clustering.max_hops)
    #[arg(long)]
    max_hops: Option<u32>,

    /// Report format
    #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
    format: OutputFormat,

    /// Write the report here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Replay chain data from a JSON fixture
    #[arg(long)]
    fixture: Option<PathBuf>,

    /// Validate inputs and print the plan without querying the chain
    #[arg(long)]
    dry_run: bool,
}

impl From<InvestigateArgs> for InvestigateOptions {
    fn from(args: InvestigateArgs) -> Self {
        Self {
            request: InvestigationRequest {
                contract: args.contract,
                deployer: args.deployer,
                reference_wallets: args.reference_wallets,
                watch_wallets: args.watch_wallets,
                linked_transactions: args.linked_tx,
                max_hops: args.max_hops,
            },
            format: args.format,
            output: args.output,
            fixture: args.fixture,
            dry_run: args.dry_run,
        }
    }
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::from_default_env().add_directive(
        "cluster_hunter=info"
            .parse()
            .unwrap_or_else(|_| tracing_subscriber::filter::LevelFilter::INFO.into()),
    );

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let config = match Config::load(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {:#}", e);
            std::process::exit(1);
        }
    };

    startup_checks(&config);

    let result = match cli.command {
        Commands::Investigate(args) => commands::investigate(config, args.into()).await,
        Commands::Config => commands::show_config(&config),
        Commands::Health => commands::health(&config).await,
        Commands::Serve { bind, fixture } => commands::serve(config, bind, fixture).await,
    };

    if let Err(e) = result {
        error!("Command failed: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}

/// Log the limits this run operates under
fn startup_checks(config: &Config) {
    if config.api.api_key.is_none() {
        warn!(
            "No indexer API key configured; limited to {} requests/min",
            config.api.effective_requests_per_minute()
        );
    }

    info!(
        endpoints = config.api.endpoints.len(),
        max_hops = config.clustering.max_hops,
        max_visited = config.clustering.max_visited,
        "Configuration loaded"
    );
}
