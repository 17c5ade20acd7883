use std::path;

use anyhow::Context;
use clap::{Parser, Subcommand};
use obit_harvester::{
    CsvSink, DCTERMS_FIELDS, Harvester, HarvesterArgs, OaiPageFetcher, StopReason, TokioPause,
    expand_path,
};
use tracing::info;

/// OAI-PMH ListRecords to CSV harvester
#[derive(Debug, Parser)]
#[command(name = "obit-harvester")]
#[command(about = "OAI-PMH ListRecords to CSV harvester", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Harvest every record into a fresh CSV file
    Harvest(HarvesterArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env first, then .env.local can override
    let _ = dotenvy::from_filename_override(".env");
    let _ = dotenvy::from_filename_override(".env.local");

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Cli::parse();

    match args.command {
        Commands::Harvest(cfg) => {
            info!("Harvesting records from {}", cfg.endpoint);

            let output = path::absolute(expand_path(&cfg.output))?;
            let fetcher = OaiPageFetcher::new(cfg.oai_config())
                .with_context(|| format!("Invalid OAI endpoint {}", cfg.endpoint))?;
            let mut sink = CsvSink::create(&output)?;
            info!("Writing records to {}", output.display());

            let pause = TokioPause;
            let harvester = Harvester::new(&fetcher, &pause, DCTERMS_FIELDS, cfg.options());
            let summary = harvester.run(&mut sink).await?;

            let elapsed = summary.finished_at - summary.started_at;
            match summary.stop {
                StopReason::FinalPage => info!(
                    "Data written successfully: {} records from {} pages in {} minutes",
                    summary.records,
                    summary.pages,
                    elapsed.num_minutes()
                ),
                StopReason::PageLimit => info!(
                    "Stopped at page limit: {} records from {} pages in {} minutes",
                    summary.records,
                    summary.pages,
                    elapsed.num_minutes()
                ),
            }
        }
    }

    Ok(())
}
