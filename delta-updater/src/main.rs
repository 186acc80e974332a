//! Delta Updater - Main entry point
//!
//! Keeps a local installation in sync with a published manifest.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use delta_updater::{
    build_retriever,
    config::Config,
    events::{EventBus, SyncEvent},
    executor::{CheckReport, CheckStatus, Updater, UpdaterSettings},
    manifest::Manifest,
    shutdown::ShutdownCoordinator,
    sync::apply::{ApplyReport, VersionMarkerStatus},
    transfer::progress::{format_bytes, format_duration, format_speed},
    utils,
};
use std::path::PathBuf;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

/// Number of changes listed by `check`
const CHANGE_PREVIEW: usize = 10;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Installation root (overrides config and DELTA_UPDATER_ROOT)
    #[arg(short, long, value_name = "DIR")]
    root: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Print engine events as JSON lines on stdout
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compare the installation with the remote manifest
    Check,
    /// Check, then download and apply every change
    Apply,
    /// Test the connection to the remote
    Probe,
    /// Print the local manifest as JSON
    Scan,
    /// Write a manifest document for the installation root
    Generate {
        /// Version to stamp into the manifest
        #[arg(long)]
        version: String,

        /// Output file (stdout when omitted)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let mut config = if let Some(config_path) = &args.config {
        Config::from_file(config_path)
            .with_context(|| format!("failed to load {}", config_path.display()))?
    } else {
        Config::default()
    };
    config.apply_env_overrides();
    if let Some(root) = &args.root {
        config.install.root = root.clone();
    }

    // Initialize logging
    let log_level = args.log_level.as_deref().unwrap_or(&config.log.level);
    utils::logger::init(log_level)?;

    tracing::info!(
        "Starting delta-updater v{} (root: {})",
        env!("CARGO_PKG_VERSION"),
        config.install.root.display()
    );

    match args.command {
        Command::Scan => scan(&config).await,
        Command::Generate { version, output } => generate(&config, &version, output).await,
        command @ (Command::Probe | Command::Check | Command::Apply) => {
            run_remote(&config, command, args.json).await
        }
    }
}

async fn run_remote(config: &Config, command: Command, json: bool) -> Result<()> {
    let retriever = build_retriever(config)?;

    let shutdown = ShutdownCoordinator::new();
    let cancel = shutdown.token();
    let signal_handle = tokio::spawn(async move {
        shutdown.wait_for_signal().await;
    });

    let events = EventBus::new();
    let printer = spawn_printer(&events, json);

    let updater = Updater::new(UpdaterSettings::from_config(config), retriever)
        .with_events(events)
        .with_cancel(cancel);

    let result = match command {
        Command::Probe => updater.probe().await.map(|()| {
            println!("Connection OK");
            true
        }),
        Command::Check => updater.check().await.map(|report| {
            if !json {
                print_check(&report);
            }
            true
        }),
        _ => updater.run_update().await.map(|outcome| {
            if !json {
                print_check(&outcome.check);
                if let Some(report) = &outcome.apply {
                    print_apply(report);
                }
            }
            outcome.apply.as_ref().map_or(true, ApplyReport::is_clean)
        }),
    };

    // Dropping the last sender lets the printer drain and stop
    drop(updater);
    let _ = printer.await;
    signal_handle.abort();

    match result {
        Ok(true) => Ok(()),
        Ok(false) => bail!("update incomplete: some files failed or the run was cancelled"),
        Err(e) if e.is_structural() => {
            Err(anyhow::Error::new(e).context("remote unusable, no files were changed"))
        }
        Err(e) => Err(e.into()),
    }
}

/// Render events until the bus closes.
fn spawn_printer(events: &EventBus, json: bool) -> JoinHandle<()> {
    let mut rx = events.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => render_event(&event, json),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!("Event printer lagged, skipped {} events", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

fn render_event(event: &SyncEvent, json: bool) {
    if json {
        match serde_json::to_string(event) {
            Ok(line) => println!("{}", line),
            Err(e) => tracing::warn!("Failed to serialize event: {}", e),
        }
        return;
    }

    if let SyncEvent::ApplyProgress(progress) = event {
        println!(
            "[{}/{}] {:>5.1}% {} {}",
            progress.files_processed,
            progress.total_files,
            progress.percent,
            format_speed(progress.bytes_per_second),
            progress.current_file.as_deref().unwrap_or("")
        );
    }
}

fn print_check(report: &CheckReport) {
    let summary = report.changes.summary();

    println!("Local version:  {} ({} files)", report.local.version, report.local.files.len());
    println!("Remote version: {} ({} files)", report.remote.version, report.remote.files.len());

    match report.status() {
        CheckStatus::UpToDate => println!("Status: up to date"),
        CheckStatus::VersionAnomaly => {
            println!("Status: version differs but all files match");
        }
        CheckStatus::UpdateAvailable => {
            println!(
                "Status: update available ({} added, {} modified, {} deleted, {} to download)",
                summary.added,
                summary.modified,
                summary.deleted,
                format_bytes(summary.download_bytes)
            );
            let sorted = report.changes.sorted();
            for entry in sorted.iter().take(CHANGE_PREVIEW) {
                println!("  {:<9} {}", entry.change_type(), entry.relative_path());
            }
            if sorted.len() > CHANGE_PREVIEW {
                println!("  ...and {} more", sorted.len() - CHANGE_PREVIEW);
            }
        }
    }
}

fn print_apply(report: &ApplyReport) {
    println!(
        "Applied {} change(s), {} failed in {}",
        report.applied(),
        report.failed(),
        format_duration(report.duration)
    );
    for failure in report.failures() {
        if let Some(error) = failure.error() {
            println!("  failed {}: {}", failure.path, error);
        }
    }
    match &report.version_marker {
        VersionMarkerStatus::Written(version) => println!("Version marker set to {}", version),
        VersionMarkerStatus::Skipped(reason) => println!("Version marker unchanged ({})", reason),
        VersionMarkerStatus::Failed(error) => println!("Version marker not written: {}", error),
    }
    if report.cancelled {
        println!("Update cancelled; files already written were kept");
    }
}

async fn local_manifest(config: &Config, version: Option<String>) -> Result<Manifest> {
    let root = config.install.root.clone();
    let version_file = config.install.version_file.clone();
    let options = config.scan_options();

    let manifest = tokio::task::spawn_blocking(move || match version {
        Some(version) => Manifest::generate(&root, &version, &options),
        None => Manifest::current_local(&root, &version_file, &options),
    })
    .await?;
    Ok(manifest)
}

async fn scan(config: &Config) -> Result<()> {
    let manifest = local_manifest(config, None).await?;
    println!("{}", manifest.to_json_pretty()?);
    Ok(())
}

async fn generate(config: &Config, version: &str, output: Option<PathBuf>) -> Result<()> {
    let version = version.trim();
    if version.is_empty() {
        bail!("--version must not be empty");
    }

    let manifest = local_manifest(config, Some(version.to_string())).await?;
    let document = manifest.to_json_pretty()?;

    match output {
        Some(path) => {
            tokio::fs::write(&path, document.as_bytes())
                .await
                .with_context(|| format!("failed to write {}", path.display()))?;
            tracing::info!(
                "Wrote manifest {} ({} files, {}) to {}",
                manifest.version,
                manifest.files.len(),
                format_bytes(manifest.total_bytes()),
                path.display()
            );
        }
        None => println!("{}", document),
    }
    Ok(())
}
