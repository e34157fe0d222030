//! # InvisiFace Command-Line Front End
//!
//! Drives one session against the cloaking and verification services.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin invisiface -- health --wait 10
//! cargo run --bin invisiface -- cloak portrait.jpg --output protected.png
//! cargo run --bin invisiface -- verify portrait.jpg
//! cargo run --bin invisiface -- --config config/client.toml run portrait.jpg --json
//! ```
//!
//! The service address comes from `--api-url`, then `INVISIFACE_API_URL`,
//! then the config file, then `http://localhost:8000`.

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use log::info;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use invisiface::client::ServiceMetrics;
use invisiface::common::config::ClientConfig;
use invisiface::common::logging::init_logger;
use invisiface::session::Download;
use invisiface::view::{project, protection_report};
use invisiface::{HttpServiceClient, ImageSlot, Session, SessionController, SessionError};

const HEALTH_INTERVAL: Duration = Duration::from_secs(2);

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the client configuration file (TOML format)
    #[arg(short, long)]
    config: Option<String>,

    /// Base address of the services, overriding config and environment
    #[arg(long)]
    api_url: Option<String>,

    /// Path to write call metrics JSON (optional)
    #[arg(long)]
    metrics_output: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check that the services are reachable
    Health {
        /// Number of attempts, two seconds apart
        #[arg(long, default_value_t = 1)]
        wait: u32,
    },
    /// Cloak an image and save the result
    Cloak {
        input: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Check an image against the verification service
    Verify { input: PathBuf },
    /// Cloak an image, verify both versions and save the cloaked one
    Run {
        input: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Print the full view model as JSON
        #[arg(long)]
        json: bool,
    },
}

type Controller = SessionController<HttpServiceClient>;

#[tokio::main]
async fn main() -> Result<()> {
    init_logger();

    let args = Args::parse();

    let mut config = ClientConfig::load(args.config.as_deref())?;
    if let Some(url) = args.api_url {
        config.service.base_url = url;
    }

    let client = HttpServiceClient::new(config.service.clone())?;

    if let Command::Health { wait } = args.command {
        let status = client.wait_until_healthy(wait, HEALTH_INTERVAL).await?;
        println!(
            "{}: {}",
            status.service.as_deref().unwrap_or("service"),
            status.status
        );
        return Ok(());
    }

    let mut controller =
        SessionController::new(client).with_download_name(config.output.download_name.clone());

    // Initialize metrics if output path is specified
    let metrics = args.metrics_output.as_ref().map(|_| {
        Arc::new(Mutex::new(ServiceMetrics::new(
            config.service.base_url.clone(),
        )))
    });
    if let Some(metrics) = &metrics {
        controller = controller.with_metrics(metrics.clone());
    }

    let result = match args.command {
        Command::Cloak { input, output } => cloak(&controller, input, output).await,
        Command::Verify { input } => verify(&controller, input).await,
        Command::Run {
            input,
            output,
            json,
        } => run(&controller, input, output, json).await,
        Command::Health { .. } => Ok(()),
    };

    // Export metrics even when the run failed
    if let (Some(metrics), Some(output_path)) = (metrics, args.metrics_output) {
        metrics.lock().await.export_to_json(&output_path)?;
        println!("Metrics exported to: {}", output_path);
    }

    result
}

async fn cloak(controller: &Controller, input: PathBuf, output: Option<PathBuf>) -> Result<()> {
    controller.upload(&input).await.map_err(failure)?;
    controller.cloak().await.map_err(failure)?;

    let path = save(controller.download().await.map_err(failure)?, output).await?;
    println!("Cloaked image written to {}", path.display());
    Ok(())
}

async fn verify(controller: &Controller, input: PathBuf) -> Result<()> {
    controller.upload(&input).await.map_err(failure)?;
    controller
        .verify(ImageSlot::Original)
        .await
        .map_err(failure)?;

    print_summary(&controller.snapshot().await);
    Ok(())
}

async fn run(
    controller: &Controller,
    input: PathBuf,
    output: Option<PathBuf>,
    json: bool,
) -> Result<()> {
    controller.upload(&input).await.map_err(failure)?;
    controller.cloak().await.map_err(failure)?;

    for target in [ImageSlot::Original, ImageSlot::Cloaked] {
        controller.verify(target).await.map_err(failure)?;
        println!("== {} image", target);
        if !json {
            print_summary(&controller.snapshot().await);
        }
    }

    let path = save(controller.download().await.map_err(failure)?, output).await?;
    println!("Cloaked image written to {}", path.display());

    if json {
        let view = project(&controller.snapshot().await);
        println!("{}", serde_json::to_string_pretty(&view)?);
    }
    Ok(())
}

async fn save(download: Download, output: Option<PathBuf>) -> Result<PathBuf> {
    let path = output.unwrap_or_else(|| PathBuf::from(&download.file_name));
    tokio::fs::write(&path, &download.bytes).await?;
    info!(
        "Saved {} ({} bytes, {})",
        path.display(),
        download.bytes.len(),
        download.media_type
    );
    Ok(path)
}

fn failure(err: SessionError) -> anyhow::Error {
    anyhow!("{} ({})", err, err.kind())
}

fn print_summary(session: &Session) {
    let Some(report) = session.verification().map(protection_report) else {
        println!("No verification result");
        return;
    };

    println!("  Level:       {}", report.level.label);
    println!("  Faces:       {}", report.faces_detected);
    println!("  Protected:   {}", report.protected);
    println!("  Confidence:  {}", report.headline_confidence);
    for bar in &report.breakdown {
        println!("    Face {}: {}%", bar.face, bar.percent);
    }
    println!("  {}", report.message);
}
