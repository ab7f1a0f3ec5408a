use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indexer_client::{ArtifactOutcome, Config, IndexerClient, IndexerError, KeywordAggregator};
use reqwest::Url;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "indexer", version, about = "Video indexer client")]
struct Cli {
    /// Log level used when RUST_LOG is not set
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Bundle every available artifact of a video into a zip file
    Artifacts {
        video_id: String,
        output: PathBuf,
    },
    /// Count keywords across videos (all videos in the account when none given)
    Keywords { video_ids: Vec<String> },
    /// Check custom face pictures without enrolling them
    ValidateFaces {
        #[arg(required = true)]
        urls: Vec<Url>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load().context("Failed to load configuration")?;

    let log_level = cli.log_level.as_deref().unwrap_or(&config.service.log_level);
    init_tracing(log_level);

    info!(
        service = %config.service.name,
        account = %config.account.account_id,
        location = %config.account.location,
        "Starting indexer client"
    );

    let client = IndexerClient::from_config(&config).context("Failed to create indexer client")?;

    let cancel = CancellationToken::new();
    let signal_handle = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            shutdown_signal().await;
            cancel.cancel();
        }
    });

    let result = match cli.command {
        Command::Artifacts { video_id, output } => {
            bundle_artifacts(&client, &video_id, &output, &cancel).await
        }
        Command::Keywords { video_ids } => count_keywords(&client, video_ids, &cancel).await,
        Command::ValidateFaces { urls } => validate_faces(&client, &urls, &cancel).await,
    };

    signal_handle.abort();

    if let Err(e) = &result {
        error!(error = %e, "Command failed");
    }
    result
}

async fn bundle_artifacts(
    client: &IndexerClient,
    video_id: &str,
    output: &Path,
    cancel: &CancellationToken,
) -> Result<()> {
    let file = File::create(output)
        .with_context(|| format!("Failed to create {}", output.display()))?;
    let mut sink = BufWriter::new(file);

    let collected = client.download_all_artifacts(video_id, &mut sink, cancel).await;
    sink.flush()
        .with_context(|| format!("Failed to flush {}", output.display()))?;

    let report = match collected {
        Err(IndexerError::Cancelled) => {
            warn!(output = %output.display(), "Interrupted; bundle holds only the artifacts fetched so far");
            return Err(IndexerError::Cancelled.into());
        }
        other => other.context("Failed to build artifact bundle")?,
    };

    for outcome in &report.outcomes {
        match outcome {
            ArtifactOutcome::Retrieved {
                entry_name,
                size_bytes,
                ..
            } => println!("{:<34} {:>10} bytes", entry_name, size_bytes),
            ArtifactOutcome::Skipped { kind, reason } => {
                println!("{:<34} skipped: {}", kind.entry_name(), reason)
            }
        }
    }

    info!(
        video_id = %video_id,
        output = %output.display(),
        entries = report.retrieved_count(),
        "Artifact bundle written"
    );
    Ok(())
}

async fn count_keywords(
    client: &IndexerClient,
    video_ids: Vec<String>,
    cancel: &CancellationToken,
) -> Result<()> {
    let on_new_keyword = |text: &str| println!("new keyword: {}", text);

    let scanned = if video_ids.is_empty() {
        client.all_keywords(on_new_keyword, cancel).await
    } else {
        KeywordAggregator::new(client.clone())
            .aggregate_with(&video_ids, on_new_keyword, cancel)
            .await
    };
    let tally = scanned.context("Keyword scan failed")?;

    println!();
    for (text, count) in tally.iter() {
        println!("{:>6}  {}", count, text);
    }
    Ok(())
}

async fn validate_faces(
    client: &IndexerClient,
    urls: &[Url],
    cancel: &CancellationToken,
) -> Result<()> {
    client
        .face_validator()
        .validate_batch(urls, cancel)
        .await
        .context("Face pictures rejected")?;

    println!("{} picture(s) accepted", urls.len());
    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    // Results go to stdout, logs to stderr
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().json().with_writer(std::io::stderr))
        .init();
}

/// Wait for shutdown signal (SIGINT or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal, cancelling");
        }
        _ = terminate => {
            info!("Received SIGTERM signal, cancelling");
        }
    }
}
