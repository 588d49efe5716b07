//! pre-compress - Build-time gzip artifact generator
//!
//! Entry point for the CLI application.

use anyhow::{Context, Result};
use clap::Parser;
use pre_compress::config::{CliArgs, RunConfig};
use pre_compress::progress::{print_header, print_summary, ProgressReporter};
use pre_compress::walker::Precompressor;
use std::process::ExitCode;
use tracing::error;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    // Parse CLI arguments
    let args = CliArgs::parse();

    // Setup logging
    setup_logging(args.verbose)?;

    let m_time = args.m_time.clone();
    let cwd = std::env::current_dir().context("Failed to get current directory")?;

    // Validate and create config
    let config = RunConfig::from_args(args, cwd).context("Invalid configuration")?;

    if config.show_progress {
        print_header(&config.root.display().to_string(), config.concurrency, &m_time);
    }

    let precompressor = Precompressor::from_config(&config);

    let report = if config.show_progress {
        let progress = ProgressReporter::new();
        progress.set_status("Scanning...");
        let report = precompressor.run_with_progress(|p| progress.update(&p));
        if report.is_success() {
            progress.finish("Pre-compression completed");
        } else {
            progress.finish("Pre-compression failed");
        }
        print_summary(&report);
        report
    } else {
        precompressor.run()
    };

    // The count is reported even when the run failed
    println!("{} pre-compressed", report.compressed);

    report.into_result().context("Pre-compression failed")?;

    Ok(())
}

fn setup_logging(verbose: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("pre_compress=debug,warn")
    } else {
        EnvFilter::new("pre_compress=info,warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .init();

    Ok(())
}
