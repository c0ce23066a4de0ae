//! Cache Sync - Main entry point
//!
//! Compare, download and upload the local cache against the remote manifest.

use anyhow::Result;
use cache_sync::config::{data_dir_or_default, Config};
use cache_sync::manifest::diff::{diff, DiffState};
use cache_sync::manifest::scan::scan_and_save;
use cache_sync::manifest::{load_manifest, manifest_path_for, save_manifest};
use cache_sync::transfer::{select_pull_targets, select_push_targets, Fetcher, Pusher, TransferReport};
use cache_sync::{shutdown, utils};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Data directory (overrides config, default: ./.iqb)
    #[arg(short, long, value_name = "DIR")]
    dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show local files that differ from the manifest
    Status {
        /// Also list files that match the manifest
        #[arg(short, long)]
        all: bool,
    },

    /// Download files missing locally (and, with --force, changed ones)
    Pull {
        /// Overwrite local files whose hash differs from the manifest
        #[arg(short, long)]
        force: bool,

        /// Maximum parallel downloads (overrides config)
        #[arg(short, long)]
        jobs: Option<usize>,
    },

    /// Upload local files missing from the manifest (and, with --force, changed ones)
    Push {
        /// Re-upload local files whose hash differs from the manifest
        #[arg(short, long)]
        force: bool,

        /// Maximum parallel uploads (overrides config)
        #[arg(short, long)]
        jobs: Option<usize>,

        /// Target bucket (overrides config)
        #[arg(long)]
        bucket: Option<String>,
    },

    /// Record local files in the manifest without uploading them
    Scan {
        /// Also re-record files whose hash differs from the manifest
        #[arg(short, long)]
        force: bool,
    },

    /// Point every manifest URL at a new base
    RewriteUrls {
        /// New URL prefix, e.g. https://example.org/bucket
        base_url: String,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    // Load configuration
    let mut config = if let Some(config_path) = &args.config {
        Config::from_file(config_path)?
    } else {
        Config::default()
    };

    // Initialize logging
    let log_level = args.log_level.as_deref().unwrap_or(&config.log.level);
    utils::logger::init(log_level)?;

    let data_dir = match args.dir.as_deref() {
        Some(dir) => data_dir_or_default(Some(dir)),
        None => config.data_dir(),
    };
    let manifest_path = manifest_path_for(&data_dir);
    tracing::debug!("data dir {}, manifest {}", data_dir.display(), manifest_path.display());

    let cancel = CancellationToken::new();
    let signal_watcher = shutdown::cancel_on_signal(cancel.clone());

    let code = match args.command {
        Command::Status { all } => {
            let manifest = load_manifest(&manifest_path)?;
            for entry in diff(&manifest, &data_dir)? {
                let entry = entry?;
                if entry.state == DiffState::Matching && !all {
                    continue;
                }
                println!("{} {}", entry.state.status_char(), entry.file);
            }
            ExitCode::SUCCESS
        }

        Command::Pull { force, jobs } => {
            if let Some(jobs) = jobs {
                config.transfer.jobs = jobs;
            }
            let manifest = load_manifest(&manifest_path)?;
            let targets = select_pull_targets(diff(&manifest, &data_dir)?, force)?;
            if targets.is_empty() {
                eprintln!("Nothing to download.");
                ExitCode::SUCCESS
            } else {
                let fetcher = Fetcher::new(&data_dir, &config.transfer)?.with_cancel(cancel.clone());
                print_report(&fetcher.pull(targets).await)
            }
        }

        Command::Push { force, jobs, bucket } => {
            if let Some(jobs) = jobs {
                config.transfer.jobs = jobs;
            }
            if let Some(bucket) = bucket {
                config.remote.bucket = bucket;
            }
            config.validate()?;

            let manifest = load_manifest(&manifest_path)?;
            let targets = select_push_targets(diff(&manifest, &data_dir)?, force)?;
            if targets.is_empty() {
                eprintln!("Nothing to upload.");
                ExitCode::SUCCESS
            } else {
                let pusher = Pusher::new(&data_dir, &config.remote, &config.transfer)?
                    .with_cancel(cancel.clone());
                let (_manifest, report) = pusher.push(manifest, &manifest_path, targets).await;
                print_report(&report)
            }
        }

        Command::Scan { force } => {
            let mut manifest = load_manifest(&manifest_path)?;
            let remote = &config.remote;
            let recorded = scan_and_save(&mut manifest, &data_dir, &manifest_path, force, |key| {
                remote.object_url(key)
            })?;
            for key in &recorded {
                println!("A {key}");
            }
            eprintln!("Recorded {} file(s) in {}.", recorded.len(), manifest_path.display());
            ExitCode::SUCCESS
        }

        Command::RewriteUrls { base_url } => {
            let mut manifest = load_manifest(&manifest_path)?;
            let changed = manifest.rewrite_urls(&base_url);
            save_manifest(&manifest, &manifest_path)?;
            eprintln!("Rewrote {changed} URL(s) in {}.", manifest_path.display());
            ExitCode::SUCCESS
        }
    };

    // Stops the signal watcher
    cancel.cancel();
    let _ = signal_watcher.await;

    Ok(code)
}

/// Print the summary and failures to stderr; exit 1 if anything failed.
fn print_report(report: &TransferReport) -> ExitCode {
    eprintln!("{}", report.summary());
    match report.failure_lines() {
        Some(lines) => {
            for line in lines {
                eprintln!("{line}");
            }
            ExitCode::from(1)
        }
        None => ExitCode::SUCCESS,
    }
}
