use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use tracing::{error, info, warn};
use twain_core::config::{EngineConfig, ScanConfiguration, TransferMode};
use twain_core::dsm::DsmTransport;
use twain_core::hook::{EventSource, HeadlessEventSource};
use twain_core::manager::SessionManager;
use twain_core::protocol::RawEvent;

mod output;
mod simulate;
#[cfg(windows)]
mod window;

use output::{Outcome, RawWriter, SharedOutcome};

#[derive(Parser, Debug)]
#[command(author, version, about = "TWAIN scanning tool", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Drive a scripted scanner instead of the installed source manager
    #[arg(long, global = true)]
    simulate: bool,

    /// Application identity (TOML); built-in defaults otherwise
    #[arg(long, global = true)]
    engine: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List every data source
    List,
    /// Print the default data source
    Default,
    /// Check whether the feeder holds paper
    Paper {
        #[command(flatten)]
        source: SourceArgs,
    },
    /// Run the source's vendor calibration
    Calibrate {
        #[command(flatten)]
        source: SourceArgs,

        /// Only report whether calibration is due
        #[arg(long)]
        check: bool,
    },
    /// Scan to raw files
    Scan {
        /// Scan configuration (TOML)
        #[arg(short, long)]
        config: PathBuf,

        #[command(flatten)]
        source: SourceArgs,

        /// Use chunked memory transfers
        #[arg(long)]
        buffered: bool,

        /// Directory for page-NNN.raw files
        #[arg(short, long, default_value = ".")]
        output_dir: PathBuf,
    },
}

#[derive(Args, Debug)]
struct SourceArgs {
    /// Data source product name (case-insensitive)
    #[arg(short, long)]
    source: Option<String>,

    /// Pick the source with the manager's chooser
    #[arg(long, conflicts_with = "source")]
    choose: bool,
}

fn main() {
    let cli = Cli::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(if cli.verbose {
                    tracing::Level::DEBUG.into()
                } else {
                    tracing::Level::INFO.into()
                })
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("setting default subscriber failed: {e}");
    }

    if let Err(e) = run(&cli) {
        error!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<()> {
    let engine = match &cli.engine {
        Some(path) => EngineConfig::load_from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => EngineConfig::default(),
    };
    let scan = match &cli.command {
        Command::Scan {
            config, buffered, ..
        } => Some(load_scan_config(config, *buffered)?),
        _ => None,
    };

    if cli.simulate {
        info!("Using simulated source manager");
        let dsm = simulate::device();
        if let Some(config) = &scan {
            simulate::load_pages(&dsm, config);
        }
        let manager = SessionManager::new(dsm, HeadlessEventSource::new(), &engine)?;
        return execute(manager, &cli.command, scan, pump_idle);
    }
    run_native(&engine, &cli.command, scan)
}

#[cfg(windows)]
fn run_native(
    engine: &EngineConfig,
    command: &Command,
    scan: Option<ScanConfiguration>,
) -> Result<()> {
    let dsm = twain_core::dsm::NativeDsm::load()?;
    let window = window::MessageWindow::create()?;
    let manager = SessionManager::new(dsm, window, engine)?;
    execute(manager, command, scan, window::pump_messages)
}

#[cfg(not(windows))]
fn run_native(
    _engine: &EngineConfig,
    _command: &Command,
    _scan: Option<ScanConfiguration>,
) -> Result<()> {
    bail!("the platform source manager is only available on Windows; use --simulate")
}

fn load_scan_config(path: &Path, buffered: bool) -> Result<ScanConfiguration> {
    let mut config = ScanConfiguration::load_from_file(path)
        .with_context(|| format!("loading {}", path.display()))?;
    if buffered {
        config.transfer_mode = TransferMode::Buffered;
    }
    Ok(config)
}

fn execute<T: DsmTransport, E: EventSource>(
    mut manager: SessionManager<T, E>,
    command: &Command,
    scan: Option<ScanConfiguration>,
    pump: fn(&mut SessionManager<T, E>) -> Result<()>,
) -> Result<()> {
    match command {
        Command::List => {
            for name in manager.source_names()? {
                println!("{name}");
            }
        }
        Command::Default => println!("{}", manager.default_source_name()?),
        Command::Paper { source } => {
            select(&mut manager, source)?;
            let loaded = manager.is_paper_on()?;
            println!("{}", if loaded { "paper loaded" } else { "feeder empty" });
        }
        Command::Calibrate { source, check } => {
            select(&mut manager, source)?;
            if *check {
                let due = manager.needs_calibration()?;
                println!("{}", if due { "calibration needed" } else { "calibration not needed" });
            } else if manager.calibrate()? {
                info!("Calibration started");
            } else {
                bail!("source refused calibration");
            }
        }
        Command::Scan {
            source, output_dir, ..
        } => {
            let config = scan.context("scan configuration not loaded")?;
            select(&mut manager, source)?;
            std::fs::create_dir_all(output_dir)
                .with_context(|| format!("creating {}", output_dir.display()))?;

            let outcome = SharedOutcome::default();
            let writer = RawWriter::new(output_dir, Arc::clone(&outcome));
            let report = manager.start_scan(config, Box::new(writer))?;
            for warning in &report.warnings {
                warn!("{}", warning);
            }
            pump(&mut manager)?;
            report_outcome(&output::lock(&outcome))?;
        }
    }
    Ok(())
}

fn select<T: DsmTransport, E: EventSource>(
    manager: &mut SessionManager<T, E>,
    args: &SourceArgs,
) -> Result<()> {
    if let Some(name) = &args.source {
        if !manager.select_source_by_name(name)? {
            bail!("no data source named {name:?}");
        }
    } else if args.choose && !manager.select_source_interactive()? {
        bail!("source selection cancelled");
    }
    match manager.selected_source() {
        Some(source) => info!(source = %source, "Using data source"),
        None => bail!("no data source selected and no default available"),
    }
    Ok(())
}

fn pump_idle<T: DsmTransport>(manager: &mut SessionManager<T, HeadlessEventSource>) -> Result<()> {
    while manager.is_scanning() {
        if !manager.on_event(&RawEvent::idle()) {
            manager.shutdown();
            bail!("source went idle before the scan finished");
        }
    }
    Ok(())
}

fn report_outcome(outcome: &Outcome) -> Result<()> {
    if let Some(e) = &outcome.error {
        bail!("scan failed after {} image(s): {e}", outcome.files.len());
    }
    if !outcome.completed {
        bail!("scan ended without completion");
    }
    info!(images = outcome.files.len(), "Scan finished");
    Ok(())
}
