//! `genloop`: turn a requirement into a running, containerized project.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing::info;

use genloop::agents::ExecAgents;
use genloop::agents::exec::ExecAgentsConfig;
use genloop::core::bundle::entry_point;
use genloop::core::classifier::classify;
use genloop::core::types::{LogSource, RawOutput};
use genloop::exit_codes;
use genloop::io::config::{DEFAULT_CONFIG_FILE, ExecutionMode, load_config, write_config};
use genloop::io::executor::CommandExecutor;
use genloop::io::json_store::load_bundle;
use genloop::io::project::ProjectLayout;
use genloop::io::sandbox::DockerSandbox;
use genloop::logging;
use genloop::pipeline::{PipelineStop, StepLimitExceededError, run_pipeline};

#[derive(Parser)]
#[command(
    name = "genloop",
    version,
    about = "Generate, containerize and repair a project until it runs"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a default `genloop.toml` in the current directory.
    Init {
        /// Overwrite an existing config file.
        #[arg(short, long)]
        force: bool,
    },
    /// Run the pipeline for a requirement.
    Run {
        /// Requirement text; use `--requirement-file` for longer input.
        requirement: Option<String>,
        /// Read the requirement from a file (`-` for stdin).
        #[arg(long, conflicts_with = "requirement")]
        requirement_file: Option<PathBuf>,
        /// Config file.
        #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,
        /// Project directory; overrides `output_dir`.
        #[arg(long)]
        output: Option<PathBuf>,
        /// Run the program directly instead of through Docker Compose.
        #[arg(long)]
        direct: bool,
    },
    /// Classify captured output and print the error record as JSON (or `null`).
    Classify {
        /// One of `process`, `container-build`, `container-runtime`.
        #[arg(long)]
        source: LogSource,
        /// Exit status of the process that produced the output.
        #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
        exit_code: i32,
        /// File holding the output; stdin when omitted.
        file: Option<PathBuf>,
    },
    /// Check a code bundle JSON file against the schema and bundle rules.
    Validate {
        bundle: PathBuf,
    },
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
        Command::Init { force } => cmd_init(Path::new(DEFAULT_CONFIG_FILE), force),
        Command::Run {
            requirement,
            requirement_file,
            config,
            output,
            direct,
        } => {
            let requirement = read_requirement(requirement, requirement_file.as_deref())?;
            cmd_run(&requirement, &config, output, direct)
        }
        Command::Classify {
            source,
            exit_code,
            file,
        } => cmd_classify(source, exit_code, file.as_deref()),
        Command::Validate { bundle } => cmd_validate(&bundle),
    }
}

fn cmd_init(path: &Path, force: bool) -> Result<i32> {
    if path.exists() && !force {
        println!("{} already exists (use --force to overwrite)", path.display());
        return Ok(exit_codes::OK);
    }
    write_config(path, &Default::default())?;
    println!("wrote {}", path.display());
    Ok(exit_codes::OK)
}

fn cmd_run(
    requirement: &str,
    config_path: &Path,
    output: Option<PathBuf>,
    direct: bool,
) -> Result<i32> {
    let mut cfg = load_config(config_path)?;
    if let Some(output) = output {
        cfg.output_dir = output;
    }
    if direct {
        cfg.execution_mode = ExecutionMode::Direct;
    }
    cfg.validate()?;

    // The agent runs inside the project dir and receives paths under it.
    let root = std::path::absolute(&cfg.output_dir)
        .with_context(|| format!("resolve {}", cfg.output_dir.display()))?;
    let layout = ProjectLayout::new(&root);
    let executor = CommandExecutor::new(cfg.agent.command.clone())?;
    let agents = ExecAgents::new(executor, layout.clone(), ExecAgentsConfig::from(&cfg));
    let sandbox = DockerSandbox::new(
        cfg.docker.program.clone(),
        cfg.command_timeout(),
        cfg.output_limit_bytes,
    );
    info!(project = %layout.root.display(), "starting pipeline");

    let result = run_pipeline(requirement, &cfg, &layout, &agents, &sandbox, |record| {
        let failure = record
            .error
            .as_ref()
            .map(|error| format!(" ({})", error.category))
            .unwrap_or_default();
        eprintln!(
            "[{:03}] {} -> {}{}",
            record.seq, record.step, record.next, failure
        );
    });

    match result {
        Ok(outcome) => match outcome.stop {
            PipelineStop::Success { documented } => {
                println!(
                    "success: {} ({} steps, {} repairs)",
                    outcome.project_dir.display(),
                    outcome.steps_executed,
                    outcome.iteration_count
                );
                if !documented {
                    eprintln!("warning: documentation could not be generated");
                }
                Ok(exit_codes::OK)
            }
            PipelineStop::GaveUp { error } => {
                println!(
                    "gave up after {} repairs: {}",
                    outcome.iteration_count, error
                );
                Ok(exit_codes::GAVE_UP)
            }
        },
        Err(err) => {
            if let Some(limit) = err.downcast_ref::<StepLimitExceededError>() {
                eprintln!("{limit}");
                return Ok(exit_codes::STEP_LIMIT);
            }
            Err(err)
        }
    }
}

fn read_requirement(inline: Option<String>, file: Option<&Path>) -> Result<String> {
    let text = match (inline, file) {
        (Some(text), _) => text,
        (None, Some(path)) => read_input(Some(path))?,
        (None, None) => bail!("a requirement is required (argument or --requirement-file)"),
    };
    let text = text.trim();
    if text.is_empty() {
        bail!("requirement must not be empty");
    }
    Ok(text.to_string())
}

fn read_input(path: Option<&Path>) -> Result<String> {
    match path {
        Some(path) if path != Path::new("-") => {
            fs::read_to_string(path).with_context(|| format!("read {}", path.display()))
        }
        _ => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("read stdin")?;
            Ok(buf)
        }
    }
}

fn cmd_classify(source: LogSource, exit_code: i32, file: Option<&Path>) -> Result<i32> {
    let text = read_input(file)?;
    let output = match source {
        LogSource::ContainerRuntime => RawOutput::logs(text),
        LogSource::Process | LogSource::ContainerBuild => RawOutput {
            exit_code: Some(exit_code),
            stderr: text,
            ..RawOutput::default()
        },
    };
    let record = classify(source, &output);
    println!(
        "{}",
        serde_json::to_string_pretty(&record).context("serialize error record")?
    );
    Ok(exit_codes::OK)
}

fn cmd_validate(path: &Path) -> Result<i32> {
    let bundle = load_bundle(path)?;
    let entry = entry_point(&bundle)
        .map(|unit| unit.filename.as_str())
        .unwrap_or_default();
    println!(
        "ok: {} units, entry point {}, run with `{}`",
        bundle.units.len(),
        entry,
        bundle.execution_command
    );
    Ok(exit_codes::OK)
}
