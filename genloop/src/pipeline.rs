//! Drives one requirement through the step graph until a terminal state.
//!
//! Each step runs against the [`Agents`] and [`Sandbox`] collaborators, records
//! any failure on the [`PipelineState`], and hands control to
//! [`next_step`]. Collaborator errors never abort the run: they become
//! `InternalError` records that the repair policy handles like any other
//! failure. Only journal I/O errors and the step limit end a run early.

use std::fmt;
use std::path::PathBuf;
use std::time::{Instant, SystemTime};

use anyhow::{Result, anyhow};
use tracing::{debug, info, instrument, warn};

use crate::agents::Agents;
use crate::core::bundle::check_bundle;
use crate::core::classifier::classify;
use crate::core::machine::{INITIAL_STEP, Step, Terminal, next_step};
use crate::core::state::PipelineState;
use crate::core::types::{ContainerArtifacts, ErrorRecord, LogSource, Message};
use crate::io::config::{ExecutionMode, PipelineConfig};
use crate::io::journal::{OutcomeRecord, StepRecord, write_outcome, write_step};
use crate::io::project::ProjectLayout;
use crate::io::sandbox::{Sandbox, monitor_logs};

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineStop {
    /// The program ran cleanly. `documented` is false when the documentation
    /// agent failed; the project itself is still complete.
    Success { documented: bool },
    /// The iteration budget ran out; `error` is the last failure, verbatim.
    GaveUp { error: ErrorRecord },
}

/// Summary of a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOutcome {
    pub project_dir: PathBuf,
    pub steps_executed: u32,
    pub iteration_count: u32,
    pub stop: PipelineStop,
}

/// The run executed `step_limit` steps without reaching a terminal state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepLimitExceededError {
    pub steps: u32,
    pub step_limit: u32,
    pub next: Step,
    /// The failure still pending when the limit was hit.
    pub error: Option<ErrorRecord>,
}

impl fmt::Display for StepLimitExceededError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "step limit exceeded: {} steps executed (limit {}), next step {}",
            self.steps, self.step_limit, self.next
        )?;
        if let Some(error) = &self.error {
            write!(f, "; last error: {error}")?;
        }
        Ok(())
    }
}

impl std::error::Error for StepLimitExceededError {}

/// Run the pipeline for `requirement`, writing the project under `layout`.
///
/// `on_step` sees every journal record right after it is written.
#[instrument(skip_all, fields(project = %layout.root.display(), mode = ?config.execution_mode))]
pub fn run_pipeline<A, S, F>(
    requirement: &str,
    config: &PipelineConfig,
    layout: &ProjectLayout,
    agents: &A,
    sandbox: &S,
    mut on_step: F,
) -> Result<PipelineOutcome>
where
    A: Agents + ?Sized,
    S: Sandbox + ?Sized,
    F: FnMut(&StepRecord),
{
    layout.ensure_dirs()?;
    let guard = config.guard();
    let mut runner = StepRunner {
        config,
        layout,
        agents,
        sandbox,
        deployed: false,
        documented: false,
    };
    let mut state = PipelineState::new(requirement);
    let mut step = INITIAL_STEP;
    let mut seq = 0u32;
    let mut gave_up_error = None;

    while !step.is_terminal() {
        if seq >= config.step_limit {
            runner.shutdown();
            return Err(StepLimitExceededError {
                steps: seq,
                step_limit: config.step_limit,
                next: step,
                error: state.current_error().cloned(),
            }
            .into());
        }
        seq += 1;

        let started = Instant::now();
        runner.run_step(step, &mut state);
        let next = next_step(
            step,
            state.current_error(),
            state.iteration_count(),
            &guard,
        );

        let record = StepRecord {
            seq,
            step,
            next,
            iteration_count: state.iteration_count(),
            error: state.current_error().cloned(),
            duration_ms: started.elapsed().as_millis() as u64,
        };
        write_step(layout, &record)?;
        info!(
            seq,
            step = %step,
            next = %next,
            iteration_count = record.iteration_count,
            failed = record.error.is_some(),
            "step finished"
        );
        if next.is_repair() {
            debug!(
                remaining = guard.remaining(state.iteration_count()),
                "repair budget"
            );
        }
        on_step(&record);

        if next == Step::Terminal(Terminal::GaveUp) {
            gave_up_error = state.take_error();
        }
        step = next;
    }

    if config.stop_on_finish {
        runner.shutdown();
    }

    let stop = match step {
        Step::Terminal(Terminal::GaveUp) => PipelineStop::GaveUp {
            error: gave_up_error.ok_or_else(|| anyhow!("run gave up without a recorded error"))?,
        },
        _ => PipelineStop::Success {
            documented: runner.documented,
        },
    };

    write_outcome(
        layout,
        &OutcomeRecord {
            terminal: step,
            steps_executed: seq,
            iteration_count: state.iteration_count(),
            documented: runner.documented,
            error: match &stop {
                PipelineStop::GaveUp { error } => Some(error.clone()),
                PipelineStop::Success { .. } => None,
            },
        },
    )?;

    Ok(PipelineOutcome {
        project_dir: layout.root.clone(),
        steps_executed: seq,
        iteration_count: state.iteration_count(),
        stop,
    })
}

struct StepRunner<'a, A: ?Sized, S: ?Sized> {
    config: &'a PipelineConfig,
    layout: &'a ProjectLayout,
    agents: &'a A,
    sandbox: &'a S,
    /// Services were started and may still be running.
    deployed: bool,
    documented: bool,
}

impl<A: Agents + ?Sized, S: Sandbox + ?Sized> StepRunner<'_, A, S> {
    fn run_step(&mut self, step: Step, state: &mut PipelineState) {
        if state.current_error().is_some() && !step.is_repair() {
            debug!(step = %step, "error pending; skipping step");
            return;
        }

        let result = match step {
            Step::Generate => self.generate(state),
            Step::Persist => self.persist(state),
            Step::Containerize => self.containerize(state),
            Step::Execute => self.execute(state),
            Step::CollectLogs => self.collect_logs(state),
            Step::RepairCode => self.repair_code(state),
            Step::RepairContainer => self.repair_container(state),
            Step::Document => {
                self.document(state);
                Ok(())
            }
            Step::Terminal(_) => Ok(()),
        };

        if let Err(err) = result {
            warn!(step = %step, error = %format!("{err:#}"), "step failed");
            state.record_error(ErrorRecord::internal(&err));
        }
    }

    fn generate(&mut self, state: &mut PipelineState) -> Result<()> {
        let bundle = self.agents.generate(state.messages())?;
        info!(units = bundle.units.len(), "generated code bundle");
        state.push_message(Message::assistant(bundle.description.clone()));
        state.replace_bundle(bundle);
        Ok(())
    }

    fn persist(&mut self, state: &mut PipelineState) -> Result<()> {
        self.layout.write_bundle(state.code_bundle())?;
        Ok(())
    }

    fn containerize(&mut self, state: &mut PipelineState) -> Result<()> {
        let artifacts = self
            .agents
            .containerize(state.code_bundle(), state.messages())?;
        self.store_artifacts(state, artifacts)
    }

    fn store_artifacts(
        &mut self,
        state: &mut PipelineState,
        mut artifacts: ContainerArtifacts,
    ) -> Result<()> {
        if artifacts.project_name.is_empty() {
            artifacts.project_name = self.layout.deployment().project_name;
        }
        self.layout.write_container(&artifacts)?;
        state.push_message(Message::assistant(artifacts.description.clone()));
        state.replace_container_artifacts(artifacts);
        Ok(())
    }

    fn execute(&mut self, state: &mut PipelineState) -> Result<()> {
        if let Some(error) = self.check_runnable(state) {
            state.record_error(error);
            return Ok(());
        }
        let found = match self.config.execution_mode {
            ExecutionMode::Container => self.deploy_and_monitor()?,
            ExecutionMode::Direct => self.run_direct(state)?,
        };
        if let Some(error) = found {
            state.record_error(error);
        }
        Ok(())
    }

    fn collect_logs(&mut self, state: &mut PipelineState) -> Result<()> {
        if let Some(error) = self.check_runnable(state) {
            state.record_error(error);
            return Ok(());
        }
        let found = match self.config.execution_mode {
            ExecutionMode::Container if self.deployed => self.restart_and_monitor()?,
            ExecutionMode::Container => self.deploy_and_monitor()?,
            ExecutionMode::Direct => self.run_direct(state)?,
        };
        if let Some(error) = found {
            state.record_error(error);
        }
        Ok(())
    }

    fn check_runnable(&self, state: &PipelineState) -> Option<ErrorRecord> {
        let Some(error) = check_bundle(state.code_bundle()) else {
            debug!(
                entry_point = state.executable_unit_name().unwrap_or_default(),
                "bundle is runnable"
            );
            return None;
        };
        debug!(details = %error.details, "bundle rejected before execution");
        Some(error)
    }

    fn deploy_and_monitor(&mut self) -> Result<Option<ErrorRecord>> {
        let deployment = self.layout.deployment();
        if self.deployed {
            self.sandbox.stop(&deployment)?;
            self.deployed = false;
        }

        let build = self.sandbox.build(&deployment)?;
        if let Some(error) = classify(LogSource::ContainerBuild, &build) {
            return Ok(Some(error));
        }
        // Compose fails `up` on bad ports, mounts or service definitions.
        let since = SystemTime::now();
        let start = self.sandbox.start(&deployment)?;
        if let Some(error) = classify(LogSource::ContainerBuild, &start) {
            return Ok(Some(error));
        }
        self.deployed = true;
        self.monitor(since)
    }

    fn restart_and_monitor(&mut self) -> Result<Option<ErrorRecord>> {
        let since = SystemTime::now();
        let restart = self.sandbox.restart(&self.layout.deployment())?;
        if let Some(error) = classify(LogSource::ContainerBuild, &restart) {
            return Ok(Some(error));
        }
        self.monitor(since)
    }

    fn monitor(&self, since: SystemTime) -> Result<Option<ErrorRecord>> {
        monitor_logs(
            self.sandbox,
            &self.layout.deployment(),
            since,
            self.config.log_poll_interval(),
            self.config.log_monitor_duration(),
        )
    }

    fn run_direct(&self, state: &PipelineState) -> Result<Option<ErrorRecord>> {
        let command = &state.code_bundle().execution_command;
        let output = self.sandbox.run_direct(&self.layout.src_dir, command)?;
        Ok(classify(LogSource::Process, &output))
    }

    fn repair_code(&mut self, state: &mut PipelineState) -> Result<()> {
        let error = pending_error(state)?;
        let bundle = self
            .agents
            .repair_code(state.code_bundle(), &error, state.messages())?;
        state.complete_repair();
        info!(
            iteration_count = state.iteration_count(),
            units = bundle.units.len(),
            "code repaired"
        );
        state.push_message(Message::assistant(bundle.description.clone()));
        state.replace_bundle(bundle);
        self.layout.write_bundle(state.code_bundle())?;
        Ok(())
    }

    fn repair_container(&mut self, state: &mut PipelineState) -> Result<()> {
        let error = pending_error(state)?;
        let artifacts = self.agents.repair_container(
            state.container_artifacts(),
            state.code_bundle(),
            &error,
            state.messages(),
        )?;
        state.complete_repair();
        info!(
            iteration_count = state.iteration_count(),
            "container configuration repaired"
        );
        self.store_artifacts(state, artifacts)
    }

    fn document(&mut self, state: &mut PipelineState) {
        let result = self
            .agents
            .document(
                state.messages(),
                state.code_bundle(),
                state.container_artifacts(),
            )
            .and_then(|docs| self.layout.write_docs(&docs));
        match result {
            Ok(()) => {
                self.documented = true;
                info!("documentation written");
            }
            Err(err) => warn!(error = %format!("{err:#}"), "documentation failed"),
        }
    }

    /// Stop running services; failures are logged only.
    fn shutdown(&mut self) {
        if !self.deployed {
            return;
        }
        if let Err(err) = self.sandbox.stop(&self.layout.deployment()) {
            warn!(error = %format!("{err:#}"), "failed to stop services");
        }
        self.deployed = false;
    }
}

/// Consume the error a repair step is fixing.
fn pending_error(state: &mut PipelineState) -> Result<ErrorRecord> {
    state
        .take_error()
        .ok_or_else(|| anyhow!("repair step reached without a pending error"))
}
