//! Test-only fixtures and scripted collaborators.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::{Result, anyhow};

use crate::agents::Agents;
use crate::core::types::{
    CodeBundle, CodeUnit, ContainerArtifacts, Documentation, ErrorRecord, Message, RawOutput,
};
use crate::io::sandbox::{Deployment, Sandbox};

/// Create a Python unit whose code is a single comment naming the file.
pub fn unit(filename: &str, executable: bool) -> CodeUnit {
    CodeUnit {
        filename: filename.to_string(),
        code: format!("# {filename}\n"),
        language: "python".to_string(),
        description: format!("{filename} module"),
        executable,
    }
}

/// Wrap units in a bundle run with `python main.py`.
pub fn bundle_with(units: Vec<CodeUnit>) -> CodeBundle {
    CodeBundle {
        description: "sample project".to_string(),
        units,
        execution_command: "python main.py".to_string(),
    }
}

pub fn sample_artifacts() -> ContainerArtifacts {
    ContainerArtifacts {
        description: "python runtime image".to_string(),
        dockerfile: "FROM python:3.12-slim\nWORKDIR /app\nCMD [\"python\", \"main.py\"]"
            .to_string(),
        compose: "services:\n  app:\n    build: .\n    volumes:\n      - ./src:/app".to_string(),
        folder_watching: "./src is bind-mounted at /app".to_string(),
        project_name: String::new(),
    }
}

pub fn sample_docs() -> Documentation {
    Documentation {
        readme: "# Sample\n\nRun with `docker compose up`.".to_string(),
        developer: "# Developer notes".to_string(),
    }
}

type Queue<T> = RefCell<VecDeque<Result<T, String>>>;

fn pop_scripted<T>(queue: &Queue<T>, role: &str) -> Result<T> {
    queue
        .borrow_mut()
        .pop_front()
        .ok_or_else(|| anyhow!("no scripted {role} response"))?
        .map_err(|msg| anyhow!(msg))
}

/// [`Agents`] that replays queued responses per role.
///
/// An empty queue fails the call, which the pipeline records as an
/// `InternalError`.
#[derive(Default)]
pub struct ScriptedAgents {
    generates: Queue<CodeBundle>,
    code_repairs: Queue<CodeBundle>,
    containerizes: Queue<ContainerArtifacts>,
    container_repairs: Queue<ContainerArtifacts>,
    documents: Queue<Documentation>,
    calls: RefCell<Vec<&'static str>>,
    seen_errors: RefCell<Vec<ErrorRecord>>,
}

impl ScriptedAgents {
    /// Agents that generate `bundle`, containerize and document once.
    pub fn happy(bundle: CodeBundle) -> Self {
        let agents = Self::default();
        agents.push_generate(Ok(bundle));
        agents.push_containerize(Ok(sample_artifacts()));
        agents.push_document(Ok(sample_docs()));
        agents
    }

    pub fn push_generate(&self, outcome: Result<CodeBundle, &str>) {
        push(&self.generates, outcome);
    }

    pub fn push_repair_code(&self, outcome: Result<CodeBundle, &str>) {
        push(&self.code_repairs, outcome);
    }

    pub fn push_containerize(&self, outcome: Result<ContainerArtifacts, &str>) {
        push(&self.containerizes, outcome);
    }

    pub fn push_repair_container(&self, outcome: Result<ContainerArtifacts, &str>) {
        push(&self.container_repairs, outcome);
    }

    pub fn push_document(&self, outcome: Result<Documentation, &str>) {
        push(&self.documents, outcome);
    }

    /// Roles called so far, in order.
    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.borrow().clone()
    }

    /// Errors handed to the repair roles, in order.
    pub fn seen_errors(&self) -> Vec<ErrorRecord> {
        self.seen_errors.borrow().clone()
    }

    fn record(&self, role: &'static str, error: Option<&ErrorRecord>) {
        self.calls.borrow_mut().push(role);
        if let Some(error) = error {
            self.seen_errors.borrow_mut().push(error.clone());
        }
    }
}

fn push<T>(queue: &Queue<T>, outcome: Result<T, &str>) {
    queue
        .borrow_mut()
        .push_back(outcome.map_err(str::to_string));
}

impl Agents for ScriptedAgents {
    fn generate(&self, _messages: &[Message]) -> Result<CodeBundle> {
        self.record("generate", None);
        pop_scripted(&self.generates, "generate")
    }

    fn repair_code(
        &self,
        _bundle: &CodeBundle,
        error: &ErrorRecord,
        _messages: &[Message],
    ) -> Result<CodeBundle> {
        self.record("repair_code", Some(error));
        pop_scripted(&self.code_repairs, "repair_code")
    }

    fn containerize(
        &self,
        _bundle: &CodeBundle,
        _messages: &[Message],
    ) -> Result<ContainerArtifacts> {
        self.record("containerize", None);
        pop_scripted(&self.containerizes, "containerize")
    }

    fn repair_container(
        &self,
        _artifacts: &ContainerArtifacts,
        _bundle: &CodeBundle,
        error: &ErrorRecord,
        _messages: &[Message],
    ) -> Result<ContainerArtifacts> {
        self.record("repair_container", Some(error));
        pop_scripted(&self.container_repairs, "repair_container")
    }

    fn document(
        &self,
        _messages: &[Message],
        _bundle: &CodeBundle,
        _artifacts: &ContainerArtifacts,
    ) -> Result<Documentation> {
        self.record("document", None);
        pop_scripted(&self.documents, "document")
    }
}

/// [`Sandbox`] that replays queued outputs.
///
/// Empty queues answer with a successful, silent result. The last queued
/// entry is sticky: it repeats once everything before it was consumed.
///
/// Logs behave like a container's: each successful start or restart appends
/// the next scripted run output to one history that survives restarts, and
/// `logs` returns the part written at or after `since`.
#[derive(Default)]
pub struct ScriptedSandbox {
    builds: Queue<RawOutput>,
    starts: Queue<RawOutput>,
    restarts: Queue<RawOutput>,
    directs: Queue<RawOutput>,
    run_logs: Queue<String>,
    log_history: RefCell<Vec<(SystemTime, String)>>,
    logs_failure: RefCell<Option<String>>,
    log_polls: Cell<u32>,
    calls: RefCell<Vec<String>>,
    direct_workdirs: RefCell<Vec<PathBuf>>,
}

impl ScriptedSandbox {
    pub fn push_build(&self, output: RawOutput) {
        self.builds.borrow_mut().push_back(Ok(output));
    }

    pub fn push_start(&self, output: RawOutput) {
        self.starts.borrow_mut().push_back(Ok(output));
    }

    pub fn push_restart(&self, output: RawOutput) {
        self.restarts.borrow_mut().push_back(Ok(output));
    }

    pub fn push_direct(&self, output: RawOutput) {
        self.directs.borrow_mut().push_back(Ok(output));
    }

    /// What the service logs during its next run.
    pub fn push_logs(&self, logs: &str) {
        self.run_logs.borrow_mut().push_back(Ok(logs.to_string()));
    }

    /// Make the log backend itself fail, e.g. an unreachable daemon.
    pub fn fail_logs(&self, msg: &str) {
        *self.logs_failure.borrow_mut() = Some(msg.to_string());
    }

    /// Backend calls other than log polls, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    pub fn log_polls(&self) -> u32 {
        self.log_polls.get()
    }

    pub fn direct_workdirs(&self) -> Vec<PathBuf> {
        self.direct_workdirs.borrow().clone()
    }

    fn replay<T: Clone + Default>(&self, queue: &Queue<T>) -> Result<T> {
        let mut queue = queue.borrow_mut();
        let next = if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        };
        next.unwrap_or_else(|| Ok(T::default()))
            .map_err(|msg| anyhow!(msg))
    }

    /// Start or restart services; a successful launch begins a new run.
    fn launch(&self, call: &str, queue: &Queue<RawOutput>) -> Result<RawOutput> {
        self.calls.borrow_mut().push(call.to_string());
        let output = self.replay(queue).map(succeed_if_silent)?;
        if output.succeeded() {
            let logs = self.replay(&self.run_logs)?;
            if !logs.is_empty() {
                self.log_history
                    .borrow_mut()
                    .push((SystemTime::now(), logs));
            }
        }
        Ok(output)
    }
}

impl Sandbox for ScriptedSandbox {
    fn build(&self, _deployment: &Deployment) -> Result<RawOutput> {
        self.calls.borrow_mut().push("build".to_string());
        self.replay(&self.builds).map(succeed_if_silent)
    }

    fn start(&self, _deployment: &Deployment) -> Result<RawOutput> {
        self.launch("start", &self.starts)
    }

    fn restart(&self, _deployment: &Deployment) -> Result<RawOutput> {
        self.launch("restart", &self.restarts)
    }

    fn logs(&self, _deployment: &Deployment, since: SystemTime) -> Result<String> {
        self.log_polls.set(self.log_polls.get() + 1);
        if let Some(msg) = self.logs_failure.borrow().as_ref() {
            return Err(anyhow!(msg.clone()));
        }
        let history = self.log_history.borrow();
        let lines: Vec<&str> = history
            .iter()
            .filter(|(at, _)| *at >= since)
            .map(|(_, logs)| logs.as_str())
            .collect();
        Ok(lines.join("\n"))
    }

    fn stop(&self, _deployment: &Deployment) -> Result<()> {
        self.calls.borrow_mut().push("stop".to_string());
        Ok(())
    }

    fn run_direct(&self, workdir: &Path, command: &str) -> Result<RawOutput> {
        self.calls.borrow_mut().push(format!("direct: {command}"));
        self.direct_workdirs.borrow_mut().push(workdir.to_path_buf());
        self.replay(&self.directs).map(succeed_if_silent)
    }
}

/// `RawOutput::default()` has no exit code; treat an unscripted call as exit 0.
fn succeed_if_silent(output: RawOutput) -> RawOutput {
    if output == RawOutput::default() {
        RawOutput::logs("")
    } else {
        output
    }
}
