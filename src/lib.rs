//! imgdupe - Near-Duplicate Image Finder
//!
//! Finds visually similar images across directory trees. Every candidate is
//! reduced to a perceptual fingerprint; fingerprints within a Hamming
//! distance derived from the requested similarity end up in the same
//! duplicate group. The engine only reads files.
//!
//! The library entry point is [`coordinator::ScanCoordinator`]; the binary
//! is a thin driver around [`run_app`].

pub mod cli;
pub mod config;
pub mod coordinator;
pub mod duplicates;
pub mod error;
pub mod logging;
pub mod output;
pub mod progress;
pub mod scanner;
pub mod signal;

use std::io;

use anyhow::Context;

use crate::cli::{Cli, Commands, OutputFormat, ScanArgs};
use crate::config::Config;
use crate::coordinator::{ScanCoordinator, ScanOutcome};
use crate::error::ExitCode;
use crate::output::{JsonOutput, TextOutput};
use crate::progress::Progress;
use crate::signal::CancelToken;

/// Run the application for parsed command-line arguments.
///
/// # Errors
///
/// Returns an error if configuration is invalid, the scan fails, or the
/// report cannot be written.
pub fn run_app(cli: Cli) -> anyhow::Result<ExitCode> {
    logging::init_logging(cli.verbose, cli.quiet);

    match cli.command {
        Commands::Scan(args) => run_scan(&args, cli.quiet),
    }
}

fn run_scan(args: &ScanArgs, quiet: bool) -> anyhow::Result<ExitCode> {
    let mut config = Config::load(args.config.as_deref())?;
    args.apply_to(&mut config);
    let options = config.into_scan_options(args.roots.clone())?;

    let cancel = CancelToken::new();
    if let Err(e) = signal::install_handler(&cancel) {
        log::warn!("{}; Ctrl+C will terminate immediately", e);
    }

    let handle = ScanCoordinator::new(options)?.spawn(cancel)?;
    let progress = Progress::new(quiet);
    for event in handle.events() {
        event.deliver_to(&progress);
    }

    let result = match handle.wait() {
        ScanOutcome::Completed(result) | ScanOutcome::Cancelled(result) => result,
        ScanOutcome::Failed(e) => return Err(e.into()),
    };
    let exit_code = ExitCode::from_result(&result);

    let stdout = io::stdout();
    let mut out = stdout.lock();
    match args.output {
        OutputFormat::Text => TextOutput::new(&result)
            .write_to(&mut out)
            .context("failed to write report")?,
        OutputFormat::Json => JsonOutput::new(&result, exit_code).write_to(&mut out, true)?,
    }

    Ok(exit_code)
}
