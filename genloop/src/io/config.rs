//! Pipeline configuration stored in `genloop.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::guard::{DEFAULT_MAX_ITERATIONS, IterationGuard};

pub const DEFAULT_CONFIG_FILE: &str = "genloop.toml";

/// How execution steps run the generated program.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Build and start the compose project, then watch its logs.
    Container,
    /// Run the bundle's execution command directly on the host.
    Direct,
}

/// Pipeline configuration (TOML).
///
/// Missing fields default to the values used for interactive runs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PipelineConfig {
    /// Maximum number of repair attempts (code or container) per run.
    pub max_iterations: u32,

    /// Hard ceiling on executed steps; a safety net outside the repair policy.
    pub step_limit: u32,

    /// Project directory the generated files are written to.
    pub output_dir: PathBuf,

    pub execution_mode: ExecutionMode,

    /// Delay between container log polls.
    pub log_poll_interval_ms: u64,

    /// How long container logs are watched before declaring the run clean.
    pub log_monitor_duration_ms: u64,

    /// Timeout for each build/start/run command.
    pub command_timeout_secs: u64,

    /// Truncate captured stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,

    /// Tear the compose project down when the run ends.
    pub stop_on_finish: bool,

    pub agent: AgentConfig,

    pub docker: DockerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AgentConfig {
    /// Agent CLI invocation; schema/output flags and the prompt on stdin are appended.
    pub command: Vec<String>,

    /// Wall-clock budget per agent call.
    pub timeout_secs: u64,

    /// Maximum bytes for a rendered prompt before dropping sections.
    pub prompt_budget_bytes: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            command: vec![
                "codex".to_string(),
                "exec".to_string(),
                "--skip-git-repo-check".to_string(),
            ],
            timeout_secs: 15 * 60,
            prompt_budget_bytes: 60_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DockerConfig {
    /// Docker CLI binary (compose is invoked as `<program> compose`).
    pub program: String,
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            program: "docker".to_string(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            step_limit: 30,
            output_dir: PathBuf::from("generated"),
            execution_mode: ExecutionMode::Container,
            log_poll_interval_ms: 1_000,
            log_monitor_duration_ms: 3_000,
            command_timeout_secs: 10 * 60,
            output_limit_bytes: 100_000,
            stop_on_finish: true,
            agent: AgentConfig::default(),
            docker: DockerConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.step_limit == 0 {
            return Err(anyhow!("step_limit must be > 0"));
        }
        if self.output_dir.as_os_str().is_empty() {
            return Err(anyhow!("output_dir must not be empty"));
        }
        if self.log_poll_interval_ms == 0 {
            return Err(anyhow!("log_poll_interval_ms must be > 0"));
        }
        if self.command_timeout_secs == 0 {
            return Err(anyhow!("command_timeout_secs must be > 0"));
        }
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("output_limit_bytes must be > 0"));
        }
        if self.agent.command.is_empty() || self.agent.command[0].trim().is_empty() {
            return Err(anyhow!("agent.command must be a non-empty array"));
        }
        if self.agent.timeout_secs == 0 {
            return Err(anyhow!("agent.timeout_secs must be > 0"));
        }
        if self.agent.prompt_budget_bytes == 0 {
            return Err(anyhow!("agent.prompt_budget_bytes must be > 0"));
        }
        if self.docker.program.trim().is_empty() {
            return Err(anyhow!("docker.program must not be empty"));
        }
        Ok(())
    }

    pub fn guard(&self) -> IterationGuard {
        IterationGuard::new(self.max_iterations)
    }

    pub fn log_poll_interval(&self) -> Duration {
        Duration::from_millis(self.log_poll_interval_ms)
    }

    pub fn log_monitor_duration(&self) -> Duration {
        Duration::from_millis(self.log_monitor_duration_ms)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn agent_timeout(&self) -> Duration {
        Duration::from_secs(self.agent.timeout_secs)
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `PipelineConfig::default()`.
pub fn load_config(path: &Path) -> Result<PipelineConfig> {
    if !path.exists() {
        let cfg = PipelineConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: PipelineConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &PipelineConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
