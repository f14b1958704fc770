//! Puppet Exporter
//!
//! Serves Puppet last-run summary metrics over HTTP, or prints a single
//! scrape with `--once`.

use clap::Parser;
use puppet_exporter::{
    encode_text, Cli, CollectorRegistry, FileConfig, MetricsServer, PuppetCollector,
};
use std::process::ExitCode;
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = FileConfig::load(&cli)?;

    info!("Puppet Exporter v{}", puppet_exporter::VERSION);
    info!(
        path = %config.puppet.summary_file.display(),
        schema = ?config.puppet.schema,
        "puppet collector configured"
    );

    let mut collectors = CollectorRegistry::new()?;
    collectors.register(
        PuppetCollector::NAME,
        Box::new(PuppetCollector::new(&config.puppet)?),
    )?;

    let registry = prometheus::Registry::new();
    registry.register(Box::new(collectors))?;

    if cli.once {
        print!("{}", encode_text(&registry)?);
        return Ok(());
    }

    MetricsServer::new(&config.web, registry).run().await?;
    Ok(())
}
