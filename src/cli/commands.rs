//! CLI command implementations

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::analysis::LookupTables;
use crate::chain::{ChainDataProvider, HiroClient, MemoryProvider};
use crate::config::Config;
use crate::mission::{InvestigationRequest, Investigator, MissionPhase};
use crate::report::OutputFormat;
use crate::service::{self, AppState};

/// Options for `hunt investigate`
#[derive(Debug, Clone, Default)]
pub struct InvestigateOptions {
    pub request: InvestigationRequest,
    pub format: OutputFormat,
    pub output: Option<PathBuf>,
    /// Replay chain data from a JSON fixture instead of the indexer
    pub fixture: Option<PathBuf>,
    pub dry_run: bool,
}

fn build_provider(config: &Config, fixture: Option<&PathBuf>) -> Result<Arc<dyn ChainDataProvider>> {
    match fixture {
        Some(path) => {
            info!(path = %path.display(), "Replaying chain data from fixture");
            Ok(Arc::new(MemoryProvider::from_fixture_file(path)?))
        }
        None => {
            let client = HiroClient::new(&config.api)?;
            info!(endpoint = %client.active_endpoint(), "Using chain indexer");
            Ok(Arc::new(client))
        }
    }
}

/// Cancel `token` on Ctrl-C
fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Received interrupt, stopping at the next phase boundary");
            token.cancel();
        }
    });
}

/// Run one investigation and print or write the report
pub async fn investigate(config: Config, options: InvestigateOptions) -> Result<()> {
    let request = &options.request;

    if options.dry_run {
        let target = request.target()?;
        let tables =
            LookupTables::build(&config, &request.reference_wallets, &request.watch_wallets)?;
        let max_hops = request.max_hops.unwrap_or(config.clustering.max_hops);

        println!("\n=== INVESTIGATION PLAN (dry run) ===\n");
        println!("Target:             {}", target);
        println!("Reference wallets:  {}", tables.reference.len());
        println!("Watch wallets:      {}", tables.watch.len());
        println!("Service tags:       {}", tables.service_tags.len());
        println!("Linked txs:         {}", request.linked_transactions.len());
        println!("Max hops:           {}", max_hops);
        println!("Visited cap:        {}", config.clustering.max_visited);
        println!("Reference contracts:");
        for contract in &config.overlap.contracts {
            println!("  {}", contract);
        }
        println!("\nPhases:");
        for phase in MissionPhase::ALL {
            println!("  {}", phase);
        }
        return Ok(());
    }

    let provider = build_provider(&config, options.fixture.as_ref())?;
    let investigator = Investigator::new(provider, Arc::new(config));

    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    let started = Instant::now();
    let report = match investigator.run(request, &cancel).await {
        Ok(report) => report,
        Err(failure) => {
            error!(
                phase = %failure.phase,
                completed = failure.mission_state.completed_phases.len(),
                "Investigation failed: {}",
                failure.cause
            );
            return Err(failure.into());
        }
    };

    info!(
        elapsed_ms = started.elapsed().as_millis() as u64,
        conclusion = %report.conclusion,
        "Investigation finished"
    );

    match &options.output {
        Some(path) => {
            report
                .write_to(path, options.format)
                .with_context(|| format!("Failed to write report to {}", path.display()))?;
            println!(
                "{:.1}% - {} ({})",
                report.confidence_score,
                report.conclusion.description(),
                path.display()
            );
        }
        None => println!("{}", report.render(options.format)?),
    }

    Ok(())
}

/// Show current configuration (secrets masked)
pub fn show_config(config: &Config) -> Result<()> {
    println!("{}", config.masked_display());
    Ok(())
}

/// Check indexer reachability
pub async fn health(config: &Config) -> Result<()> {
    println!("\n=== SYSTEM HEALTH CHECK ===\n");

    let client = HiroClient::new(&config.api)?;

    print!("Chain indexer ({})... ", client.active_endpoint());
    let start = Instant::now();
    match client.status().await {
        Ok(status) => {
            let tip = status
                .chain_tip
                .as_ref()
                .and_then(|t| t.block_height)
                .map(|h| h.to_string())
                .unwrap_or_else(|| "unknown".to_string());
            println!(
                "OK ({}ms, status {}, tip {})",
                start.elapsed().as_millis(),
                status.status.as_deref().unwrap_or("unknown"),
                tip
            );
        }
        Err(e) => {
            println!("FAILED: {}", e);
            return Err(e.into());
        }
    }

    print!("API key... ");
    if config.api.api_key.is_some() {
        println!("CONFIGURED ({}/min)", config.api.effective_requests_per_minute());
    } else {
        println!("NOT SET ({}/min public limit)", config.api.effective_requests_per_minute());
    }

    println!("\nAll systems healthy!");
    Ok(())
}

/// Run the HTTP job service until interrupted
pub async fn serve(config: Config, bind: Option<String>, fixture: Option<PathBuf>) -> Result<()> {
    let bind = bind.unwrap_or_else(|| config.server.bind.clone());
    let provider = build_provider(&config, fixture.as_ref())?;
    let state = AppState::new(Investigator::new(provider, Arc::new(config)));

    cancel_on_ctrl_c(state.shutdown.clone());

    service::serve(state, &bind).await
}
