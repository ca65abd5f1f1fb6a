//! Shared deterministic types for the pipeline core.
//!
//! These types define stable contracts between the core and its collaborators.
//! They carry no I/O and serialize to the same JSON shapes the agents emit.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Author of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Human,
    Assistant,
}

/// One turn of the requirement conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn human(content: impl Into<String>) -> Self {
        Self {
            role: Role::Human,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A single generated source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeUnit {
    /// Path relative to the project's `src/` directory.
    pub filename: String,
    pub code: String,
    pub language: String,
    pub description: String,
    /// Marks the program entry point. Exactly one unit per bundle.
    pub executable: bool,
}

/// The complete set of generated files for one project version.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeBundle {
    pub description: String,
    pub units: Vec<CodeUnit>,
    pub execution_command: String,
}

impl CodeBundle {
    pub fn executable_units(&self) -> impl Iterator<Item = &CodeUnit> {
        self.units.iter().filter(|unit| unit.executable)
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

/// Dockerfile and compose configuration for the generated project.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerArtifacts {
    pub description: String,
    pub dockerfile: String,
    pub compose: String,
    /// How the container picks up source changes without a rebuild.
    pub folder_watching: String,
    /// Compose project name; also the prefix of derived image/container names.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub project_name: String,
}

/// README and developer notes for the finished project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Documentation {
    pub readme: String,
    pub developer: String,
}

/// Closed failure taxonomy driving the repair policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCategory {
    /// The container or image could not be constructed.
    ConfigurationError,
    /// The container started but the program inside it failed.
    RuntimeError,
    /// A direct process execution failed outside a container.
    ExecutionError,
    /// The orchestration machinery or one of its collaborators failed.
    InternalError,
}

impl ErrorCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCategory::ConfigurationError => "ConfigurationError",
            ErrorCategory::RuntimeError => "RuntimeError",
            ErrorCategory::ExecutionError => "ExecutionError",
            ErrorCategory::InternalError => "InternalError",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed failure produced by the classifier or a step boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub category: ErrorCategory,
    pub details: String,
    pub file: Option<String>,
    pub line: Option<u32>,
    /// Display-only pointer at the offending output; never parsed back.
    pub reference: Option<String>,
    /// The code bundle itself is malformed, so only a code repair can fix it.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub bundle_defect: bool,
}

impl ErrorRecord {
    pub fn new(category: ErrorCategory, details: impl Into<String>) -> Self {
        Self {
            category,
            details: details.into(),
            file: None,
            line: None,
            reference: None,
            bundle_defect: false,
        }
    }

    /// Wrap an unexpected collaborator failure.
    pub fn internal(err: &anyhow::Error) -> Self {
        Self::new(ErrorCategory::InternalError, format!("{err:#}"))
    }

    /// Location suffix such as `main.py:3`, when known.
    pub fn location(&self) -> Option<String> {
        match (&self.file, self.line) {
            (Some(file), Some(line)) => Some(format!("{file}:{line}")),
            (Some(file), None) => Some(file.clone()),
            _ => None,
        }
    }
}

impl fmt::Display for ErrorRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.category)?;
        if let Some(location) = self.location() {
            write!(f, " at {location}")?;
        }
        write!(f, ": {}", self.details)
    }
}

/// Where a piece of raw output came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LogSource {
    Process,
    ContainerBuild,
    ContainerRuntime,
}

impl LogSource {
    pub fn as_str(self) -> &'static str {
        match self {
            LogSource::Process => "process",
            LogSource::ContainerBuild => "container-build",
            LogSource::ContainerRuntime => "container-runtime",
        }
    }
}

impl std::str::FromStr for LogSource {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "process" => Ok(LogSource::Process),
            "container-build" => Ok(LogSource::ContainerBuild),
            "container-runtime" => Ok(LogSource::ContainerRuntime),
            other => Err(anyhow::anyhow!(
                "unknown log source '{other}' (expected process, container-build or container-runtime)"
            )),
        }
    }
}

/// Captured output and exit indicator of a collaborator command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawOutput {
    /// `None` when the process was killed (timeout or signal).
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
}

impl RawOutput {
    /// Successful output with the given stdout (e.g. a log snapshot).
    pub fn logs(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: Some(0),
            stdout: stdout.into(),
            ..Self::default()
        }
    }

    /// Failed output (exit status 1) with the given stderr.
    pub fn failed(stderr: impl Into<String>) -> Self {
        Self {
            exit_code: Some(1),
            stderr: stderr.into(),
            ..Self::default()
        }
    }

    pub fn succeeded(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }

    /// stdout followed by stderr.
    pub fn combined(&self) -> String {
        match (self.stdout.is_empty(), self.stderr.is_empty()) {
            (_, true) => self.stdout.clone(),
            (true, false) => self.stderr.clone(),
            (false, false) => format!("{}\n{}", self.stdout, self.stderr),
        }
    }
}
