//! Executor abstraction for agent invocation.
//!
//! The [`Executor`] trait decouples the pipeline from the actual LLM backend
//! (by default an agent CLI such as `codex exec`). Tests use scripted
//! executors that write predetermined outputs without spawning processes.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::de::DeserializeOwned;
use tracing::{debug, info, instrument, warn};

use crate::io::json_store::load_validated;
use crate::io::process::{CommandOutput, run_command_with_timeout};

/// Parameters for an executor invocation.
#[derive(Debug, Clone)]
pub struct ExecRequest {
    /// Working directory for the executor process.
    pub workdir: PathBuf,
    /// Prompt text to feed to the agent.
    pub prompt: String,
    /// Path to the JSON Schema that constrains agent output.
    pub output_schema_path: PathBuf,
    /// Path where the agent must write its output JSON.
    pub output_path: PathBuf,
    /// Path to write executor stdout/stderr log.
    pub executor_log_path: PathBuf,
    /// Maximum time to wait for the executor to complete.
    pub timeout: Duration,
    /// Truncate executor output logs beyond this many bytes.
    pub output_limit_bytes: usize,
}

/// Abstraction over agent execution backends.
pub trait Executor {
    /// Run the agent with the given request. Must write output to `request.output_path`.
    fn exec(&self, request: &ExecRequest) -> Result<()>;
}

/// Executor that spawns a configurable agent CLI.
///
/// The configured command receives `--output-schema <schema>
/// --output-last-message <output> -` and reads the prompt from stdin.
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    command: Vec<String>,
}

impl CommandExecutor {
    pub fn new(command: Vec<String>) -> Result<Self> {
        if command.first().is_none_or(|program| program.trim().is_empty()) {
            return Err(anyhow!("agent command must not be empty"));
        }
        Ok(Self { command })
    }

    fn build_command(&self, request: &ExecRequest) -> Command {
        let mut cmd = Command::new(&self.command[0]);
        cmd.args(&self.command[1..])
            .arg("--output-schema")
            .arg(&request.output_schema_path)
            .arg("--output-last-message")
            .arg(&request.output_path)
            .arg("-")
            .current_dir(&request.workdir);
        cmd
    }
}

impl Executor for CommandExecutor {
    #[instrument(skip_all, fields(program = %self.command[0], timeout_secs = request.timeout.as_secs()))]
    fn exec(&self, request: &ExecRequest) -> Result<()> {
        info!(workdir = %request.workdir.display(), "starting agent");

        if !request.output_schema_path.exists() {
            return Err(anyhow!(
                "missing output schema {}",
                request.output_schema_path.display()
            ));
        }
        if let Some(parent) = request.output_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create output dir {}", parent.display()))?;
        }

        let output = run_command_with_timeout(
            self.build_command(request),
            Some(request.prompt.as_bytes()),
            request.timeout,
            request.output_limit_bytes,
        )
        .with_context(|| format!("run {}", self.command[0]))?;

        write_executor_log(
            &request.executor_log_path,
            &output,
            request.output_limit_bytes,
        )?;

        if output.timed_out {
            warn!(timeout_secs = request.timeout.as_secs(), "agent timed out");
            return Err(anyhow!(
                "{} timed out after {:?}",
                self.command[0],
                request.timeout
            ));
        }
        if !output.status.success() {
            warn!(exit_code = ?output.status.code(), "agent failed");
            return Err(anyhow!(
                "{} failed with status {:?} (see {})",
                self.command[0],
                output.status.code(),
                request.executor_log_path.display()
            ));
        }

        debug!("agent completed successfully");
        Ok(())
    }
}

/// Execute the agent and load its schema-validated output as `T`.
#[instrument(skip_all, fields(output_path = %request.output_path.display()))]
pub fn execute_and_load<E: Executor + ?Sized, T: DeserializeOwned>(
    executor: &E,
    schema: &str,
    request: &ExecRequest,
) -> Result<T> {
    executor.exec(request)?;
    ensure_output_exists(&request.output_path)?;
    load_validated(schema, &request.output_path)
}

fn ensure_output_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        return Err(anyhow!("missing executor output {}", path.display()));
    }
    Ok(())
}

fn write_executor_log(path: &Path, output: &CommandOutput, output_limit: usize) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create executor log dir {}", parent.display()))?;
    }
    let mut buf = String::new();
    buf.push_str("=== stdout ===\n");
    buf.push_str(&String::from_utf8_lossy(&output.stdout));
    buf.push_str("\n=== stderr ===\n");
    buf.push_str(&String::from_utf8_lossy(&output.stderr));
    if output.timed_out {
        buf.push_str("\n[executor timed out]\n");
    }

    if buf.len() > output_limit {
        let mut cut = output_limit;
        while !buf.is_char_boundary(cut) {
            cut -= 1;
        }
        let truncated = format!("{}\n[truncated {} bytes]\n", &buf[..cut], buf.len() - cut);
        fs::write(path, truncated)
            .with_context(|| format!("write executor log {}", path.display()))?;
        return Ok(());
    }

    fs::write(path, buf).with_context(|| format!("write executor log {}", path.display()))
}
