//! gcpi-cpi: serve-once front end for Compute Engine network reconciliation.
//!
//! Reads one JSON action request from stdin, runs it against the Compute
//! Engine API and writes one JSON response to stdout. Logs go to stderr.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use gcpi_compute::{NetworkEngine, RestCompute};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod dispatch;

use config::Config;
use dispatch::{ActionError, Dispatcher, Request, Response};

/// Compute Engine network reconciliation CPI
#[derive(Parser, Debug)]
#[command(name = "gcpi-cpi", version, about)]
struct Args {
    /// Path to the JSON configuration file
    #[arg(long)]
    config_path: PathBuf,

    /// OAuth2 access token for the Compute Engine API (overrides the config file)
    #[arg(long, env = "GCPI_ACCESS_TOKEN", hide_env_values = true)]
    access_token: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // stdout is reserved for the response
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gcpi_cpi=info,gcpi_compute=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    let config = Config::from_path(&args.config_path).await?;
    let access_token = args
        .access_token
        .or_else(|| config.google.access_token.clone())
        .context(
            "No access token: pass --access-token, set GCPI_ACCESS_TOKEN or google.access_token",
        )?;

    let compute = RestCompute::new(config.google.endpoint.clone(), access_token)
        .context("Failed to build Compute Engine client")?;
    let mut engine = NetworkEngine::new(
        Arc::new(compute),
        config.google.project.clone(),
        config.operation.waiter_config(),
    );
    if let Some(zone) = &config.google.default_zone {
        engine = engine.with_default_zone(zone.clone());
    }
    let dispatcher = Dispatcher::new(engine);

    info!(
        project = %config.google.project,
        endpoint = %config.google.endpoint,
        "Serving one request"
    );

    let mut input = String::new();
    tokio::io::stdin()
        .read_to_string(&mut input)
        .await
        .context("Failed to read request from stdin")?;

    let response = match serde_json::from_str::<Request>(&input) {
        Ok(request) => dispatcher.dispatch(request).await,
        Err(e) => Response::failure(&ActionError::InvalidRequest(e.to_string())),
    };

    let mut output = serde_json::to_vec(&response).context("Failed to encode response")?;
    output.push(b'\n');

    let mut stdout = tokio::io::stdout();
    stdout
        .write_all(&output)
        .await
        .context("Failed to write response")?;
    stdout.flush().await?;

    Ok(())
}
