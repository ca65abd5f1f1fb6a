//! [`Agents`] implementation that drives an [`Executor`] with rendered prompts.

use std::cell::Cell;
use std::fs;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use tracing::{info, instrument};

use crate::core::types::{CodeBundle, ContainerArtifacts, Documentation, ErrorRecord, Message};
use crate::io::config::PipelineConfig;
use crate::io::executor::{ExecRequest, Executor, execute_and_load};
use crate::io::json_store::{CODE_BUNDLE_SCHEMA, CONTAINER_ARTIFACTS_SCHEMA, DOCUMENTATION_SCHEMA};
use crate::io::project::ProjectLayout;
use crate::io::prompt::{PromptBuilder, PromptInputs, PromptKind};

use super::{Agents, write_output_schema};

/// Agent settings taken from the pipeline configuration.
#[derive(Debug, Clone)]
pub struct ExecAgentsConfig {
    pub prompt_budget_bytes: usize,
    pub output_limit_bytes: usize,
    pub timeout: Duration,
}

impl From<&PipelineConfig> for ExecAgentsConfig {
    fn from(cfg: &PipelineConfig) -> Self {
        Self {
            prompt_budget_bytes: cfg.agent.prompt_budget_bytes,
            output_limit_bytes: cfg.output_limit_bytes,
            timeout: cfg.agent_timeout(),
        }
    }
}

/// Runs every agent role through one executor backend.
///
/// Each call gets its own `.genloop/agents/<seq>-<role>/` directory holding
/// the prompt, the output schema, the output and the executor log.
pub struct ExecAgents<E: Executor> {
    executor: E,
    layout: ProjectLayout,
    config: ExecAgentsConfig,
    calls: Cell<u32>,
}

impl<E: Executor> ExecAgents<E> {
    pub fn new(executor: E, layout: ProjectLayout, config: ExecAgentsConfig) -> Self {
        Self {
            executor,
            layout,
            config,
            calls: Cell::new(0),
        }
    }

    #[instrument(skip_all, fields(role = kind.as_str()))]
    fn invoke<T: DeserializeOwned>(
        &self,
        kind: PromptKind,
        schema: &str,
        inputs: &PromptInputs<'_>,
    ) -> Result<T> {
        let seq = self.calls.get() + 1;
        self.calls.set(seq);
        let dir = self.layout.agent_dir(seq, kind.as_str());
        fs::create_dir_all(&dir).with_context(|| format!("create agent dir {}", dir.display()))?;

        let schema_path = dir.join("output.schema.json");
        write_output_schema(&schema_path, schema)?;

        let prompt = PromptBuilder::new(self.config.prompt_budget_bytes).build(kind, inputs)?;
        let prompt_path = dir.join("prompt.md");
        fs::write(&prompt_path, &prompt)
            .with_context(|| format!("write prompt {}", prompt_path.display()))?;
        info!(seq, prompt_bytes = prompt.len(), "invoking agent");

        let request = ExecRequest {
            workdir: self.layout.root.clone(),
            prompt,
            output_schema_path: schema_path,
            output_path: dir.join("output.json"),
            executor_log_path: dir.join("executor.log"),
            timeout: self.config.timeout,
            output_limit_bytes: self.config.output_limit_bytes,
        };
        execute_and_load(&self.executor, schema, &request)
            .with_context(|| format!("{} agent", kind.as_str()))
    }
}

impl<E: Executor> Agents for ExecAgents<E> {
    fn generate(&self, messages: &[Message]) -> Result<CodeBundle> {
        self.invoke(
            PromptKind::Generate,
            CODE_BUNDLE_SCHEMA,
            &PromptInputs::new(messages),
        )
    }

    fn repair_code(
        &self,
        bundle: &CodeBundle,
        error: &ErrorRecord,
        messages: &[Message],
    ) -> Result<CodeBundle> {
        self.invoke(
            PromptKind::RepairCode,
            CODE_BUNDLE_SCHEMA,
            &PromptInputs::new(messages)
                .with_bundle(bundle)
                .with_error(error),
        )
    }

    fn containerize(
        &self,
        bundle: &CodeBundle,
        messages: &[Message],
    ) -> Result<ContainerArtifacts> {
        self.invoke(
            PromptKind::Containerize,
            CONTAINER_ARTIFACTS_SCHEMA,
            &PromptInputs::new(messages).with_bundle(bundle),
        )
    }

    fn repair_container(
        &self,
        artifacts: &ContainerArtifacts,
        bundle: &CodeBundle,
        error: &ErrorRecord,
        messages: &[Message],
    ) -> Result<ContainerArtifacts> {
        self.invoke(
            PromptKind::RepairContainer,
            CONTAINER_ARTIFACTS_SCHEMA,
            &PromptInputs::new(messages)
                .with_bundle(bundle)
                .with_artifacts(artifacts)
                .with_error(error),
        )
    }

    fn document(
        &self,
        messages: &[Message],
        bundle: &CodeBundle,
        artifacts: &ContainerArtifacts,
    ) -> Result<Documentation> {
        self.invoke(
            PromptKind::Document,
            DOCUMENTATION_SCHEMA,
            &PromptInputs::new(messages)
                .with_bundle(bundle)
                .with_artifacts(artifacts),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::ErrorCategory;
    use crate::test_support::{bundle_with, sample_artifacts, unit};
    use serde_json::{Value, json};
    use std::cell::RefCell;

    struct CapturingExecutor {
        output: Value,
        requests: RefCell<Vec<ExecRequest>>,
    }

    impl CapturingExecutor {
        fn new(output: Value) -> Self {
            Self {
                output,
                requests: RefCell::new(Vec::new()),
            }
        }
    }

    impl Executor for CapturingExecutor {
        fn exec(&self, request: &ExecRequest) -> Result<()> {
            self.requests.borrow_mut().push(request.clone());
            fs::write(&request.output_path, serde_json::to_string(&self.output)?)?;
            Ok(())
        }
    }

    fn config() -> ExecAgentsConfig {
        ExecAgentsConfig {
            prompt_budget_bytes: 20_000,
            output_limit_bytes: 2_000,
            timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn generate_writes_prompt_and_schema_per_call() {
        let temp = tempfile::tempdir().expect("tempdir");
        let layout = ProjectLayout::new(temp.path());
        let bundle = bundle_with(vec![unit("main.py", true)]);
        let executor =
            CapturingExecutor::new(serde_json::to_value(&bundle).expect("bundle json"));
        let agents = ExecAgents::new(executor, layout.clone(), config());
        let messages = vec![Message::human("Python hello world program")];

        let first = agents.generate(&messages).expect("generate");
        agents.generate(&messages).expect("generate again");

        assert_eq!(first, bundle);
        let dir = layout.agent_dir(1, "generate");
        assert!(dir.join("output.schema.json").is_file());
        let prompt = fs::read_to_string(dir.join("prompt.md")).expect("prompt");
        assert!(prompt.contains("Python hello world program"));
        assert!(layout.agent_dir(2, "generate").join("output.json").is_file());

        let requests = agents.executor.requests.borrow();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].workdir, layout.root);
        assert_eq!(requests[0].timeout, Duration::from_secs(5));
    }

    #[test]
    fn repair_container_prompt_carries_error_and_files() {
        let temp = tempfile::tempdir().expect("tempdir");
        let layout = ProjectLayout::new(temp.path());
        let artifacts = sample_artifacts();
        let executor =
            CapturingExecutor::new(serde_json::to_value(&artifacts).expect("artifacts json"));
        let agents = ExecAgents::new(executor, layout, config());
        let error = ErrorRecord::new(ErrorCategory::ConfigurationError, "failed to solve");

        let repaired = agents
            .repair_container(
                &artifacts,
                &bundle_with(vec![unit("main.py", true)]),
                &error,
                &[Message::human("req")],
            )
            .expect("repair");

        assert_eq!(repaired.dockerfile, artifacts.dockerfile);
        let requests = agents.executor.requests.borrow();
        assert!(requests[0].prompt.contains("failed to solve"));
        assert!(requests[0].prompt.contains("FROM python"));
        assert!(requests[0].output_path.ends_with("001-repair_container/output.json"));
    }

    #[test]
    fn schema_violations_surface_as_errors() {
        let temp = tempfile::tempdir().expect("tempdir");
        let layout = ProjectLayout::new(temp.path());
        let agents = ExecAgents::new(
            CapturingExecutor::new(json!({"readme": "only"})),
            layout,
            config(),
        );
        let err = agents
            .document(
                &[Message::human("req")],
                &bundle_with(vec![unit("main.py", true)]),
                &sample_artifacts(),
            )
            .expect_err("invalid output");
        let message = format!("{err:#}");
        assert!(message.contains("document agent"));
        assert!(message.contains("schema validation failed"));
    }
}
