//! Container and process runtime adapter.
//!
//! The [`Sandbox`] trait is the only place the pipeline touches Docker or
//! spawns the generated program. Implementations return captured output and
//! the exit indicator; classification happens in `core::classifier`.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, instrument};

use crate::core::classifier::classify_logs;
use crate::core::types::{ErrorRecord, RawOutput};
use crate::io::process::run_command_with_timeout;

pub const COMPOSE_FILE: &str = "docker-compose.yml";

/// A compose project rooted at `project_dir`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deployment {
    pub project_dir: PathBuf,
    pub project_name: String,
}

/// Build/run backend for generated projects.
///
/// `Err` means the backend itself could not be driven (e.g. the Docker CLI is
/// missing); a failing build or program is reported through `RawOutput`.
pub trait Sandbox {
    fn build(&self, deployment: &Deployment) -> Result<RawOutput>;
    fn start(&self, deployment: &Deployment) -> Result<RawOutput>;
    fn restart(&self, deployment: &Deployment) -> Result<RawOutput>;
    /// Everything the services logged at or after `since`.
    ///
    /// A restart keeps the container and its log history, so callers pass
    /// the moment they (re)started the services.
    fn logs(&self, deployment: &Deployment, since: SystemTime) -> Result<String>;
    fn stop(&self, deployment: &Deployment) -> Result<()>;
    /// Run `command` through the shell in `workdir`, outside any container.
    fn run_direct(&self, workdir: &Path, command: &str) -> Result<RawOutput>;
}

/// `docker compose` backed sandbox.
#[derive(Debug, Clone)]
pub struct DockerSandbox {
    program: String,
    timeout: Duration,
    output_limit_bytes: usize,
}

impl DockerSandbox {
    pub fn new(program: impl Into<String>, timeout: Duration, output_limit_bytes: usize) -> Self {
        Self {
            program: program.into(),
            timeout,
            output_limit_bytes,
        }
    }

    fn compose(&self, deployment: &Deployment, args: &[&str]) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg("compose")
            .arg("-p")
            .arg(&deployment.project_name)
            .arg("-f")
            .arg(COMPOSE_FILE)
            .args(args)
            .current_dir(&deployment.project_dir);
        cmd
    }

    fn logs_command(&self, deployment: &Deployment, since: SystemTime) -> Command {
        let since = docker_timestamp(since);
        self.compose(deployment, &["logs", "--no-color", "--since", &since])
    }

    fn run(&self, cmd: Command, what: &str) -> Result<RawOutput> {
        let output = run_command_with_timeout(cmd, None, self.timeout, self.output_limit_bytes)
            .with_context(|| format!("docker compose {what}"))?;
        let raw = output.into_raw_output();
        debug!(what, exit_code = ?raw.exit_code, timed_out = raw.timed_out, "compose finished");
        Ok(raw)
    }
}

impl Sandbox for DockerSandbox {
    #[instrument(skip_all, fields(project = %deployment.project_name))]
    fn build(&self, deployment: &Deployment) -> Result<RawOutput> {
        info!("building images");
        self.run(self.compose(deployment, &["build"]), "build")
    }

    #[instrument(skip_all, fields(project = %deployment.project_name))]
    fn start(&self, deployment: &Deployment) -> Result<RawOutput> {
        info!("starting services");
        self.run(self.compose(deployment, &["up", "-d"]), "up")
    }

    #[instrument(skip_all, fields(project = %deployment.project_name))]
    fn restart(&self, deployment: &Deployment) -> Result<RawOutput> {
        info!("restarting services");
        self.run(self.compose(deployment, &["restart"]), "restart")
    }

    fn logs(&self, deployment: &Deployment, since: SystemTime) -> Result<String> {
        let raw = self.run(self.logs_command(deployment, since), "logs")?;
        if !raw.succeeded() {
            return Err(anyhow!(
                "docker compose logs failed with status {:?}: {}",
                raw.exit_code,
                raw.stderr.trim()
            ));
        }
        Ok(raw.combined())
    }

    #[instrument(skip_all, fields(project = %deployment.project_name))]
    fn stop(&self, deployment: &Deployment) -> Result<()> {
        let raw = self.run(
            self.compose(deployment, &["down", "--remove-orphans"]),
            "down",
        )?;
        if !raw.succeeded() {
            return Err(anyhow!(
                "docker compose down failed with status {:?}: {}",
                raw.exit_code,
                raw.stderr.trim()
            ));
        }
        Ok(())
    }

    #[instrument(skip_all, fields(workdir = %workdir.display()))]
    fn run_direct(&self, workdir: &Path, command: &str) -> Result<RawOutput> {
        info!(command, "running program directly");
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command).current_dir(workdir);
        let output = run_command_with_timeout(cmd, None, self.timeout, self.output_limit_bytes)
            .with_context(|| format!("run '{command}'"))?;
        Ok(output.into_raw_output())
    }
}

/// Poll container logs written since `since` until a runtime failure appears
/// or `duration` elapses.
///
/// Returns `Ok(None)` when the window closes without a match: a quiet window
/// means "no error detected", never a timeout failure.
pub fn monitor_logs<S: Sandbox + ?Sized>(
    sandbox: &S,
    deployment: &Deployment,
    since: SystemTime,
    interval: Duration,
    duration: Duration,
) -> Result<Option<ErrorRecord>> {
    let started = Instant::now();
    let mut polls = 0u32;
    loop {
        let logs = sandbox.logs(deployment, since)?;
        polls += 1;
        if let Some(record) = classify_logs(&logs) {
            debug!(polls, "runtime failure detected in logs");
            return Ok(Some(record));
        }
        let elapsed = started.elapsed();
        if elapsed >= duration {
            debug!(polls, "log window closed without failures");
            return Ok(None);
        }
        thread::sleep(interval.min(duration - elapsed));
    }
}

/// Unix timestamp in the `seconds.nanoseconds` form `docker logs --since` accepts.
pub fn docker_timestamp(at: SystemTime) -> String {
    let elapsed = at.duration_since(UNIX_EPOCH).unwrap_or_default();
    format!("{}.{:09}", elapsed.as_secs(), elapsed.subsec_nanos())
}

/// Derive a compose project name from the project directory.
///
/// Compose names are lowercase `[a-z0-9_-]` and must start with a letter or digit.
pub fn compose_project_name(project_dir: &Path) -> String {
    let raw = project_dir
        .file_name()
        .map(|name| name.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    let sanitized: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect();
    let trimmed = sanitized.trim_start_matches(['-', '_']);
    if trimmed.is_empty() {
        "genloop-project".to_string()
    } else {
        trimmed.to_string()
    }
}
