//! Single-owner state threaded through one pipeline run.

use serde::Serialize;

use crate::core::bundle::entry_point;
use crate::core::types::{CodeBundle, ContainerArtifacts, ErrorRecord, Message};

/// Mutable run state. Created once per run, discarded at the end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineState {
    requirement_messages: Vec<Message>,
    code_bundle: CodeBundle,
    executable_unit_name: Option<String>,
    container_artifacts: ContainerArtifacts,
    current_error: Option<ErrorRecord>,
    iteration_count: u32,
}

impl PipelineState {
    pub fn new(requirement: impl Into<String>) -> Self {
        Self {
            requirement_messages: vec![Message::human(requirement)],
            code_bundle: CodeBundle::default(),
            executable_unit_name: None,
            container_artifacts: ContainerArtifacts::default(),
            current_error: None,
            iteration_count: 0,
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.requirement_messages
    }

    /// The original requirement (first human turn).
    pub fn requirement(&self) -> &str {
        self.requirement_messages
            .first()
            .map(|message| message.content.as_str())
            .unwrap_or_default()
    }

    pub fn push_message(&mut self, message: Message) {
        self.requirement_messages.push(message);
    }

    pub fn code_bundle(&self) -> &CodeBundle {
        &self.code_bundle
    }

    pub fn executable_unit_name(&self) -> Option<&str> {
        self.executable_unit_name.as_deref()
    }

    /// Replace the bundle wholesale and re-derive the entry point.
    ///
    /// The entry point stays `None` when the bundle has zero or several
    /// executable units; execution steps reject such bundles.
    pub fn replace_bundle(&mut self, bundle: CodeBundle) {
        self.executable_unit_name = entry_point(&bundle).map(|unit| unit.filename.clone());
        self.code_bundle = bundle;
    }

    pub fn container_artifacts(&self) -> &ContainerArtifacts {
        &self.container_artifacts
    }

    pub fn replace_container_artifacts(&mut self, artifacts: ContainerArtifacts) {
        self.container_artifacts = artifacts;
    }

    pub fn current_error(&self) -> Option<&ErrorRecord> {
        self.current_error.as_ref()
    }

    /// Record a failure; it is also appended to the conversation so later
    /// agent calls see it.
    pub fn record_error(&mut self, error: ErrorRecord) {
        self.requirement_messages
            .push(Message::human(format!("The last step failed with {error}")));
        self.current_error = Some(error);
    }

    /// Take the pending error, leaving the state clean.
    pub fn take_error(&mut self) -> Option<ErrorRecord> {
        self.current_error.take()
    }

    pub fn iteration_count(&self) -> u32 {
        self.iteration_count
    }

    /// Count one completed repair attempt.
    pub fn complete_repair(&mut self) {
        self.iteration_count = self.iteration_count.saturating_add(1);
    }
}
