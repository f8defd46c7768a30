use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::LevelFilter;
use std::fs;
use std::path::{Path, PathBuf};

mod config;
mod logger;
mod modules;
mod session;

use config::CliConfig;
use modules::Output;

/// hostlink - run scripts against native modules
#[derive(Parser)]
#[command(name = "hostlink")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Run scripts against native modules through the hostlink bridge")]
struct Cli {
    /// JSON file with `bridge` and `script` sections
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// off, error, warn, info, debug or trace
    #[arg(long, global = true, default_value = "warn")]
    log_level: LevelFilter,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a script and flush the native calls it makes
    Run {
        /// Path to the script file
        file: PathBuf,
        /// Call a registered callable module after loading, as MODULE.METHOD
        #[arg(long, value_name = "TARGET")]
        call: Option<String>,
        /// Arguments for --call as a JSON array
        #[arg(long, default_value = "[]", requires = "call")]
        args: String,
    },
    /// Check a script for syntax errors without running it
    Check {
        /// File to check
        file: PathBuf,
    },
    /// Print the module table handed to scripts
    Config {
        /// Pretty-print the JSON
        #[arg(long)]
        pretty: bool,
    },
}

fn main() {
    let cli = Cli::parse();
    if let Err(err) = logger::init(cli.log_level) {
        eprintln!("Failed to install logger: {}", err);
    }

    if let Err(err) = dispatch(cli) {
        eprintln!("Error: {:#}", err);
        std::process::exit(1);
    }
}

fn dispatch(cli: Cli) -> Result<()> {
    let config = CliConfig::load_or_default(cli.config.as_deref())?;
    match cli.command {
        Commands::Run { file, call, args } => run_command(&config, &file, call.as_deref(), &args),
        Commands::Check { file } => check_command(&file),
        Commands::Config { pretty } => config_command(&config, pretty),
    }
}

fn run_command(config: &CliConfig, file: &Path, call: Option<&str>, args: &str) -> Result<()> {
    let source =
        fs::read(file).with_context(|| format!("Error reading file '{}'", file.display()))?;
    let target = call.map(session::parse_target).transpose()?;
    let args = session::parse_args(args)?;

    let dispatcher = session::dispatcher(config, Output::Stdout)?;
    let outcome = run_script(&dispatcher, &source, &file.display().to_string(), target, args);
    dispatcher.shutdown();
    outcome
}

fn run_script(
    dispatcher: &hostlink_bridge::BatchDispatcher,
    source: &[u8],
    origin: &str,
    target: Option<(String, String)>,
    args: Vec<hostlink_types::Value>,
) -> Result<()> {
    let report = dispatcher.start(source, origin)?;
    report_failures(&report);

    if let Some((module, method)) = target {
        let cycle = dispatcher.call_function(&module, &method, args)?;
        for result in cycle.script {
            println!("{}", result?.to_json());
        }
        report_failures(&cycle.native);
    }

    dispatcher.wait_for_idle()?;
    Ok(())
}

fn report_failures(report: &hostlink_bridge::BatchReport) {
    for err in report.errors() {
        log::warn!("{}", err);
    }
}

fn check_command(file: &Path) -> Result<()> {
    let contents = fs::read_to_string(file)
        .with_context(|| format!("Error reading file '{}'", file.display()))?;

    match hostlink_parser::parse(&contents) {
        Ok(program) => {
            println!("✓ Syntax OK ({} statements)", program.len());
            Ok(())
        }
        Err(err) => {
            eprintln!("✗ Syntax error in '{}':", file.display());
            anyhow::bail!("{}", err)
        }
    }
}

fn config_command(config: &CliConfig, pretty: bool) -> Result<()> {
    let registry = session::registry(config, Output::Stdout)?;
    let table = registry.build_script_config().to_json();
    let text = if pretty {
        serde_json::to_string_pretty(&table)?
    } else {
        table.to_string()
    };
    println!("{}", text);
    registry.invalidate();
    Ok(())
}
