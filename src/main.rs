// Entrypoint for the uploader.
// - Keeps `main` small: validate config, connect, then hand over to the
//   batch session.
// - Configuration and connection errors are fatal and end the run before
//   any file is touched; per-file failures never change the exit code.

use anyhow::Context;
use clap::Parser;
use dataset_uploader::api::RoboflowClient;
use dataset_uploader::batch::{run_session, ThreadSleeper};
use dataset_uploader::config::{Cli, API_KEY_ENV};
use dataset_uploader::ui::ConsoleReporter;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = Cli::parse()
        .into_config(std::env::var(API_KEY_ENV).ok())
        .context("Invalid configuration")?;

    let client = RoboflowClient::connect(&config.remote)?;

    run_session(&config.batch, &client, &ThreadSleeper, &ConsoleReporter::new())?;
    Ok(())
}
