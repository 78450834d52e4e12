//! `planrunner` command line.
//!
//! Extracts plans from AI responses, validates plan files, and executes plans
//! against the local machine while persisting execution state.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::info;

use planrunner::controller::PlanController;
use planrunner::core::condition::{AlwaysTrue, StateConditions};
use planrunner::core::extract::extract;
use planrunner::core::types::{ExecutionState, Plan};
use planrunner::exit_codes;
use planrunner::io::config::{ControllerConfig, DEFAULT_CONFIG_FILE, load_config, write_config};
use planrunner::io::handlers::HandlerRegistry;
use planrunner::io::plan_store::load_plan;
use planrunner::io::state_store::{DEFAULT_STATE_FILE, FileStateStore, load_state};
use planrunner::logging;

#[derive(Parser)]
#[command(
    name = "planrunner",
    version,
    about = "Extract executable plans from AI responses and run them"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Extract a plan or command from an AI response and print it as JSON.
    Extract {
        /// Response file (reads stdin when omitted).
        #[arg(long)]
        input: Option<PathBuf>,
    },
    /// Execute a plan and print the execution report.
    Run(RunArgs),
    /// Check a plan file against the schema and plan invariants.
    Validate {
        /// Plan file (JSON).
        file: PathBuf,
    },
    /// Print the persisted execution state.
    State {
        #[arg(long, default_value = DEFAULT_STATE_FILE)]
        state_file: PathBuf,
    },
    /// Reset the persisted execution state.
    ClearState {
        #[arg(long, default_value = DEFAULT_STATE_FILE)]
        state_file: PathBuf,
    },
    /// Write the default controller config.
    InitConfig {
        #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,
        /// Replace an existing config file.
        #[arg(long)]
        force: bool,
    },
}

#[derive(Args)]
struct RunArgs {
    /// AI response to extract a plan from.
    #[arg(long, required_unless_present = "plan", conflicts_with = "plan")]
    input: Option<PathBuf>,
    /// Plan file, validated strictly.
    #[arg(long)]
    plan: Option<PathBuf>,
    #[arg(long, default_value = DEFAULT_STATE_FILE)]
    state_file: PathBuf,
    #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,
    /// Directory that relative paths and shell commands resolve against.
    #[arg(long, default_value = ".")]
    workdir: PathBuf,
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Extract { input } => cmd_extract(input.as_deref()),
        Command::Run(args) => cmd_run(&args),
        Command::Validate { file } => cmd_validate(&file),
        Command::State { state_file } => cmd_state(&state_file),
        Command::ClearState { state_file } => cmd_clear_state(&state_file),
        Command::InitConfig { config, force } => cmd_init_config(&config, force),
    }
}

fn cmd_extract(input: Option<&Path>) -> Result<i32> {
    let text = read_input(input)?;
    let extraction = extract(&text);
    print_json(&extraction)?;
    Ok(if extraction.success {
        exit_codes::OK
    } else {
        exit_codes::EXTRACTION_FAILED
    })
}

fn cmd_run(args: &RunArgs) -> Result<i32> {
    let config = load_config(&args.config)?;
    let plan = match (&args.plan, &args.input) {
        (Some(path), _) => load_plan(path)?,
        (None, input) => match plan_from_response(input.as_deref())? {
            Some(plan) => plan,
            None => return Ok(exit_codes::EXTRACTION_FAILED),
        },
    };

    let store = FileStateStore::open(&args.state_file)?;
    let handlers = HandlerRegistry::local(&args.workdir, &config);
    let mut controller = PlanController::new(store, handlers, Box::new(StateConditions), config)?;
    let report = controller.execute_plan(&plan);
    print_json(&report)?;
    Ok(exit_codes::for_report(report.status))
}

/// Extract a plan from a response; prints the failed extraction and returns `None` when
/// nothing usable was found.
fn plan_from_response(input: Option<&Path>) -> Result<Option<Plan>> {
    let text = read_input(input)?;
    let extraction = extract(&text);
    let (true, Some(payload)) = (extraction.success, extraction.payload.clone()) else {
        print_json(&extraction)?;
        return Ok(None);
    };
    let confidence = extraction.metadata.confidence;
    info!(source = ?extraction.metadata.source, confidence, "extracted plan");
    Ok(Some(payload.into_plan(confidence)))
}

fn cmd_validate(file: &Path) -> Result<i32> {
    let plan = load_plan(file)?;
    println!("valid: {} steps", plan.steps.len());
    Ok(exit_codes::OK)
}

fn cmd_state(state_file: &Path) -> Result<i32> {
    let state = if state_file.exists() {
        load_state(state_file)?
    } else {
        ExecutionState::default()
    };
    print_json(&state)?;
    Ok(exit_codes::OK)
}

fn cmd_clear_state(state_file: &Path) -> Result<i32> {
    let store = FileStateStore::open(state_file)?;
    let mut controller = PlanController::new(
        store,
        HandlerRegistry::new(),
        Box::new(AlwaysTrue),
        ControllerConfig::default(),
    )?;
    controller.clear_state()?;
    Ok(exit_codes::OK)
}

fn cmd_init_config(path: &Path, force: bool) -> Result<i32> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to replace it)", path.display());
    }
    write_config(path, &ControllerConfig::default())?;
    println!("wrote {}", path.display());
    Ok(exit_codes::OK)
}

fn read_input(input: Option<&Path>) -> Result<String> {
    match input {
        Some(path) => {
            fs::read_to_string(path).with_context(|| format!("read {}", path.display()))
        }
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("read stdin")?;
            Ok(buf)
        }
    }
}

/// Print `value` as pretty JSON on stdout.
fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let payload = serde_json::to_string_pretty(value).context("serialize json")?;
    println!("{payload}");
    Ok(())
}
