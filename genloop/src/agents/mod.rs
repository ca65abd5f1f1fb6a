//! LLM collaborators behind the pipeline's generate, repair and document steps.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

use crate::core::types::{CodeBundle, ContainerArtifacts, Documentation, ErrorRecord, Message};

pub mod exec;

pub use exec::ExecAgents;

/// The five agent roles the pipeline calls.
///
/// Each call returns a complete replacement artifact; an `Err` is recorded by
/// the pipeline as an `InternalError` for the repair policy to handle.
pub trait Agents {
    fn generate(&self, messages: &[Message]) -> Result<CodeBundle>;

    fn repair_code(
        &self,
        bundle: &CodeBundle,
        error: &ErrorRecord,
        messages: &[Message],
    ) -> Result<CodeBundle>;

    fn containerize(&self, bundle: &CodeBundle, messages: &[Message])
    -> Result<ContainerArtifacts>;

    fn repair_container(
        &self,
        artifacts: &ContainerArtifacts,
        bundle: &CodeBundle,
        error: &ErrorRecord,
        messages: &[Message],
    ) -> Result<ContainerArtifacts>;

    fn document(
        &self,
        messages: &[Message],
        bundle: &CodeBundle,
        artifacts: &ContainerArtifacts,
    ) -> Result<Documentation>;
}

pub(crate) fn write_output_schema(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create schema dir {}", parent.display()))?;
    }
    fs::write(path, contents).with_context(|| format!("write schema {}", path.display()))
}
