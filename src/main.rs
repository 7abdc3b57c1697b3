//! pcd-capture CLI
//!
//! Connects to a LiDAR TCP endpoint, captures point payloads until the
//! stream closes or Ctrl+C is pressed, then saves them as a binary PCD file.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use pcd_capture::control::{prompt_endpoint, prompt_output_path, write_stdout_json};
use pcd_capture::protocol::DEFAULT_MAX_PAYLOAD_SIZE;
use pcd_capture::{CancelToken, Endpoint, Session};

#[derive(Parser)]
#[command(name = "pcd-capture")]
#[command(about = "Capture a LiDAR TCP stream into a PCD file", long_about = None)]
#[command(version)]
struct Cli {
    /// Sensor endpoint as host:port or tcp://host:port (prompted if omitted)
    #[arg(env = "PCD_CAPTURE_ENDPOINT")]
    endpoint: Option<String>,

    /// Output PCD path (prompted after capture if omitted)
    #[arg(short, long, env = "PCD_CAPTURE_OUTPUT")]
    output: Option<PathBuf>,

    /// Bound on each blocking read, in milliseconds
    #[arg(
        long,
        env = "PCD_CAPTURE_READ_TIMEOUT_MS",
        default_value_t = 1000,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    read_timeout_ms: u64,

    /// Bound on establishing the connection, in milliseconds
    #[arg(
        long,
        env = "PCD_CAPTURE_CONNECT_TIMEOUT_MS",
        default_value_t = 10_000,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    connect_timeout_ms: u64,

    /// Largest payload a single PCD header may announce
    #[arg(long, env = "PCD_CAPTURE_MAX_PAYLOAD_BYTES", default_value_t = DEFAULT_MAX_PAYLOAD_SIZE)]
    max_payload_bytes: usize,

    /// Print a JSON summary of the session to stdout
    #[arg(long)]
    json_summary: bool,

    /// Never prompt; use the default endpoint and skip saving without --output
    #[arg(long)]
    no_prompt: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let endpoint = resolve_endpoint(&cli).await?;

    let session = Session::builder()
        .endpoint(endpoint.clone())
        .read_timeout(Duration::from_millis(cli.read_timeout_ms))
        .connect_timeout(Duration::from_millis(cli.connect_timeout_ms))
        .max_payload_size(cli.max_payload_bytes)
        .build();
    watch_interrupts(session.cancel_token());

    let report = session.run().await.context("Capture session failed")?;

    let mut output = None;
    let mut save_error = None;

    if report.capture.is_empty() {
        tracing::info!("No point data captured; nothing to save.");
    } else {
        match choose_output(&cli).await? {
            None => tracing::info!("Save cancelled."),
            Some(path) => match session.save(&report, &path).await {
                Ok(()) => output = Some(path),
                Err(e) => {
                    tracing::error!("Failed to save PCD file: {}", e);
                    save_error = Some(e);
                }
            },
        }
    }

    if cli.json_summary {
        write_stdout_json(&report.summary(&endpoint, output.as_deref()))?;
    }

    match save_error {
        Some(e) => Err(e).context("Failed to save PCD file"),
        None => Ok(()),
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

/// First Ctrl+C stops the capture; a second one exits immediately.
fn watch_interrupts(cancel: CancelToken) {
    let first = cancel.cancel_on_ctrl_c();
    tokio::spawn(async move {
        if first.await.is_err() || !cancel.is_cancelled() {
            return;
        }
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Second interrupt received, exiting without saving");
            std::process::exit(130);
        }
    });
}

async fn resolve_endpoint(cli: &Cli) -> Result<Endpoint> {
    if let Some(input) = &cli.endpoint {
        return Endpoint::parse_or_default(input).context("Invalid endpoint");
    }
    if cli.no_prompt {
        return Ok(Endpoint::default());
    }

    let endpoint = tokio::task::spawn_blocking(|| {
        prompt_endpoint(&mut std::io::stdin().lock(), &mut std::io::stderr())
    })
    .await
    .context("Endpoint prompt failed")??;
    Ok(endpoint)
}

async fn choose_output(cli: &Cli) -> Result<Option<PathBuf>> {
    if let Some(path) = &cli.output {
        return Ok(Some(path.clone()));
    }
    if cli.no_prompt {
        tracing::warn!("No --output given; capture not saved");
        return Ok(None);
    }

    let path = tokio::task::spawn_blocking(|| {
        prompt_output_path(&mut std::io::stdin().lock(), &mut std::io::stderr())
    })
    .await
    .context("Output prompt failed")??;
    Ok(path)
}
