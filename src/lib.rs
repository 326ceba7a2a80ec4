//! dupesweep - archive-aware duplicate sweeper
//!
//! Walks a directory tree, expands archives in place, fingerprints every
//! in-policy file and keeps the first copy of each content. Later copies are
//! moved to a duplicates directory, out-of-policy files and broken archives
//! to an unsupported directory. A manifest of survivors and an error log are
//! written at the end, and the duplicates directory is packaged into a zip
//! that goes to the trash.
//!
//! # Example
//!
//! ```no_run
//! use dupesweep::duplicates::{DuplicateFinder, FinderConfig};
//! use dupesweep::events::EventSender;
//! use dupesweep::scanner::PolicyConfig;
//! use std::path::Path;
//!
//! let policy = PolicyConfig::new("/sorted/dups", "/sorted/other");
//! let finder = DuplicateFinder::new(FinderConfig::new(policy));
//! let summary = finder.run(Path::new("/inbox"), &EventSender::disconnected())?;
//! println!("{} duplicates moved", summary.files_moved);
//! # Ok::<(), dupesweep::duplicates::FinderError>(())
//! ```

pub mod actions;
pub mod archive;
pub mod cli;
pub mod config;
pub mod duplicates;
pub mod error;
pub mod events;
pub mod finalize;
pub mod frontend;
pub mod logging;
pub mod output;
pub mod progress;
pub mod scanner;
pub mod session;
pub mod signal;

use std::io;

use anyhow::Context;
use figment::providers::Serialized;

use crate::cli::{Cli, Commands, ConfigArgs, OutputFormat, ReportArgs, RunArgs};
use crate::config::Config;
use crate::duplicates::DuplicateFinder;
use crate::error::ExitCode;
use crate::output::JsonOutput;
use crate::session::RunReport;

/// Run the command line and return the process exit code.
///
/// # Errors
///
/// Configuration problems and failures that stop a run before it starts.
/// Failures during a run are counted in its summary instead.
pub fn run_app(cli: Cli) -> anyhow::Result<ExitCode> {
    logging::init_logging(cli.verbose, cli.quiet);
    if cli.no_color {
        yansi::disable();
    }
    log::debug!("Log level: {}", logging::current_level_name());

    match &cli.command {
        Commands::Run(args) => run_sweep(&cli, args),
        Commands::Report(args) => show_report(args),
        Commands::Config(args) => show_config(&cli, args),
    }
}

fn run_sweep(cli: &Cli, args: &RunArgs) -> anyhow::Result<ExitCode> {
    let figment =
        Config::figment(cli.config.as_deref())?.merge(Serialized::defaults(args.overrides()));
    let config = Config::extract(&figment)?;
    log::debug!("Effective configuration: {:?}", config);

    let shutdown = signal::install_handler()?;
    let finder_config = config
        .finder_config()?
        .with_shutdown_flag(shutdown.get_flag());

    let handle = DuplicateFinder::new(finder_config).spawn(args.path.clone())?;
    let quiet = cli.quiet || args.output == OutputFormat::Json;
    let summary = frontend::drive(handle, quiet)?;
    let code = ExitCode::for_summary(&summary);

    match args.output {
        OutputFormat::Text => {
            if !cli.quiet {
                print!("{}", output::render_summary(&summary));
            }
        }
        OutputFormat::Json => {
            JsonOutput::from_summary(&summary, code).write_to(&mut io::stdout(), true)?;
        }
    }
    Ok(code)
}

fn show_report(args: &ReportArgs) -> anyhow::Result<ExitCode> {
    let report = RunReport::load(&args.path)?;
    let code = ExitCode::for_summary(&report.summary);
    match args.output {
        OutputFormat::Text => print!("{}", output::render_report(&report)),
        OutputFormat::Json => {
            JsonOutput::from_report(&report, code).write_to(&mut io::stdout(), true)?;
        }
    }
    Ok(ExitCode::Success)
}

fn show_config(cli: &Cli, args: &ConfigArgs) -> anyhow::Result<ExitCode> {
    if args.path {
        match cli.config.clone().or_else(config::default_config_path) {
            Some(path) => println!("{}", path.display()),
            None => anyhow::bail!("no configuration directory on this platform"),
        }
        return Ok(ExitCode::Success);
    }
    let config = Config::load(cli.config.as_deref())?;
    let rendered = config
        .to_toml()
        .context("Failed to render configuration")?;
    print!("{}", rendered);
    Ok(ExitCode::Success)
}
