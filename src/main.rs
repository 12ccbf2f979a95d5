use chrono::Utc;
use clap::Parser;
use modem_testbench::config::{self, ConfigError, ConfigLoader, LogFormat, LoggingConfig};
use modem_testbench::{
    declaration, discover, reconcile, ConsoleObserver, HarnessError, HarnessResult, Orchestrator,
    ProcessExecutor, RunReport,
};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

// Command-line arguments
#[derive(Parser, Debug)]
#[command(
    version,
    about = "Discovers attached modems and SIM cards and runs test programs against them.",
    long_about = "Probes serial ports for AT modems and PC/SC readers for SIM cards, matches them \
                  against a declaration file, then runs every test program against every matched \
                  device as `<test> --device <connection> --baudrate <speed> --pin <pin>`."
)]
struct Args {
    /// Declaration file listing the devices the tests need.
    #[arg(required_unless_present = "print_config")]
    declarations: Option<PathBuf>,

    /// Test programs to run against every resolved device.
    tests: Vec<String>,

    /// Configuration file (overrides the standard search locations).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log filter directive, e.g. "debug" or "modem_testbench::probe=trace".
    #[arg(short, long)]
    log_level: Option<String>,

    /// Per-invocation timeout in seconds.
    #[arg(short, long)]
    timeout_secs: Option<u64>,

    /// Write a JSON report of the run to this path.
    #[arg(short, long)]
    report: Option<PathBuf>,

    /// Probe and reconcile, print the bindings, run nothing.
    #[arg(long)]
    probe_only: bool,

    /// Print the effective configuration as TOML and exit.
    #[arg(long)]
    print_config: bool,
}

// --- Main Application Entry Point ---
fn main() -> ExitCode {
    let args = Args::parse();
    match run(args) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> HarnessResult<ExitCode> {
    let mut config = ConfigLoader::load(args.config.as_deref())?.into_config();
    if let Some(secs) = args.timeout_secs {
        config.runner.timeout_secs = secs;
        config::validate(&config)?;
    }

    init_logging(&config.logging, args.log_level.as_deref());

    let declarations_path = match args.declarations {
        Some(path) if !args.print_config => path,
        _ => {
            let rendered = toml::to_string_pretty(&config).map_err(ConfigError::from)?;
            print!("{rendered}");
            return Ok(ExitCode::SUCCESS);
        }
    };

    let declared = declaration::load(&declarations_path, config.declarations.layout)?;
    if declared.is_empty() && args.tests.is_empty() {
        return Err(HarnessError::NothingToDo(declarations_path));
    }
    info!(
        path = %declarations_path.display(),
        declared = declared.len(),
        "Loaded declarations"
    );

    let pool = discover(&config);
    let reconciliation = reconcile(&declared, pool);
    let mut console = ConsoleObserver::stdout();

    if args.probe_only {
        if let Err(e) = console.print_bindings(&reconciliation) {
            warn!(error = %e, "Failed to write transcript");
        }
        return Ok(if reconciliation.is_complete() {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        });
    }

    let started_at = Utc::now();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(HarnessError::Runtime)?;
    let orchestrator = Orchestrator::new(ProcessExecutor::from_config(&config.runner));
    let summary = runtime.block_on(orchestrator.run(&args.tests, &reconciliation, &mut console));

    if let Err(e) = console.print_summary(&summary) {
        warn!(error = %e, "Failed to write transcript");
    }

    if let Some(path) = args.report {
        RunReport::new(started_at, &summary, &reconciliation.unclaimed)
            .write_to(&path)
            .map_err(|source| HarnessError::Report {
                path: path.clone(),
                source,
            })?;
        info!(path = %path.display(), "Report written");
    }

    Ok(ExitCode::from(summary.exit_code() as u8))
}

/// Install the stderr subscriber. `--log-level` beats `RUST_LOG`, which
/// beats `logging.level`.
fn init_logging(logging: &LoggingConfig, level_override: Option<&str>) {
    let filter = match level_override {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level)),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    match logging.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.pretty().init(),
        LogFormat::Compact => builder.compact().init(),
    }
}
