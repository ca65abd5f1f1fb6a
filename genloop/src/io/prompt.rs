//! Prompt rendering for the agent collaborators.
//!
//! Templates mark their sections with `<!-- section:KEY required|droppable -->`.
//! When a rendered prompt exceeds the byte budget, droppable sections go first,
//! then the last remaining section is truncated.

use std::sync::LazyLock;

use anyhow::Result;
use minijinja::{Environment, context};
use regex::Regex;
use serde::Serialize;
use tracing::debug;

use crate::core::types::{CodeBundle, ContainerArtifacts, ErrorRecord, Message};

const GENERATE_TEMPLATE: &str = include_str!("prompts/generate.md");
const REPAIR_CODE_TEMPLATE: &str = include_str!("prompts/repair_code.md");
const CONTAINERIZE_TEMPLATE: &str = include_str!("prompts/containerize.md");
const REPAIR_CONTAINER_TEMPLATE: &str = include_str!("prompts/repair_container.md");
const DOCUMENT_TEMPLATE: &str = include_str!("prompts/document.md");

static SECTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<!--\s*section:(\w+)\s+(required|droppable)\s*-->").expect("section regex")
});

/// Which collaborator a prompt is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    Generate,
    RepairCode,
    Containerize,
    RepairContainer,
    Document,
}

impl PromptKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PromptKind::Generate => "generate",
            PromptKind::RepairCode => "repair_code",
            PromptKind::Containerize => "containerize",
            PromptKind::RepairContainer => "repair_container",
            PromptKind::Document => "document",
        }
    }
}

/// Everything a template may reference.
#[derive(Debug, Clone, Copy)]
pub struct PromptInputs<'a> {
    pub messages: &'a [Message],
    pub bundle: Option<&'a CodeBundle>,
    pub artifacts: Option<&'a ContainerArtifacts>,
    pub error: Option<&'a ErrorRecord>,
}

impl<'a> PromptInputs<'a> {
    pub fn new(messages: &'a [Message]) -> Self {
        Self {
            messages,
            bundle: None,
            artifacts: None,
            error: None,
        }
    }

    pub fn with_bundle(mut self, bundle: &'a CodeBundle) -> Self {
        self.bundle = Some(bundle);
        self
    }

    pub fn with_artifacts(mut self, artifacts: &'a ContainerArtifacts) -> Self {
        self.artifacts = Some(artifacts);
        self
    }

    pub fn with_error(mut self, error: &'a ErrorRecord) -> Self {
        self.error = Some(error);
        self
    }

    fn requirement(&self) -> &str {
        self.messages
            .first()
            .map(|message| message.content.trim())
            .unwrap_or_default()
    }

    /// Turns after the initial requirement.
    fn conversation(&self) -> &[Message] {
        self.messages.get(1..).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize)]
struct ErrorContext<'a> {
    category: &'static str,
    details: &'a str,
    location: Option<String>,
    reference: Option<&'a str>,
}

impl<'a> ErrorContext<'a> {
    fn from_record(record: &'a ErrorRecord) -> Self {
        Self {
            category: record.category.as_str(),
            details: record.details.trim(),
            location: record.location(),
            reference: record.reference.as_deref(),
        }
    }
}

/// Template engine wrapper around minijinja.
struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    fn new() -> Self {
        let mut env = Environment::new();
        for (kind, source) in [
            (PromptKind::Generate, GENERATE_TEMPLATE),
            (PromptKind::RepairCode, REPAIR_CODE_TEMPLATE),
            (PromptKind::Containerize, CONTAINERIZE_TEMPLATE),
            (PromptKind::RepairContainer, REPAIR_CONTAINER_TEMPLATE),
            (PromptKind::Document, DOCUMENT_TEMPLATE),
        ] {
            env.add_template(kind.as_str(), source)
                .expect("bundled prompt template should be valid");
        }
        Self { env }
    }

    fn render(&self, kind: PromptKind, input: &PromptInputs<'_>) -> Result<String> {
        let empty_bundle = CodeBundle::default();
        let empty_artifacts = ContainerArtifacts::default();
        let template = self.env.get_template(kind.as_str())?;
        let rendered = template.render(context! {
            requirement => input.requirement(),
            conversation => input.conversation(),
            bundle => input.bundle.unwrap_or(&empty_bundle),
            artifacts => input.artifacts.unwrap_or(&empty_artifacts),
            error => input.error.map(ErrorContext::from_record),
        })?;
        Ok(rendered)
    }
}

/// A parsed section from rendered template output.
#[derive(Debug, Clone)]
struct ParsedSection {
    key: String,
    required: bool,
    content: String,
}

fn parse_sections(rendered: &str) -> Vec<ParsedSection> {
    let markers: Vec<_> = SECTION_RE.captures_iter(rendered).collect();
    let mut sections = Vec::with_capacity(markers.len());

    for (i, caps) in markers.iter().enumerate() {
        let (Some(whole), Some(key), Some(kind)) = (caps.get(0), caps.get(1), caps.get(2)) else {
            continue;
        };
        let end = markers
            .get(i + 1)
            .and_then(|next| next.get(0))
            .map_or(rendered.len(), |m| m.start());
        let content = rendered[whole.end()..end].trim().to_string();
        let required = kind.as_str() == "required";
        if !content.is_empty() || required {
            sections.push(ParsedSection {
                key: key.as_str().to_string(),
                required,
                content,
            });
        }
    }

    sections
}

/// Drop order when over budget.
const DROP_ORDER: [&str; 3] = ["conversation", "requirement", "code"];

fn apply_budget_to_sections(sections: &mut Vec<ParsedSection>, budget: usize) {
    let total_len = |secs: &[ParsedSection]| -> usize { secs.iter().map(|s| s.content.len()).sum() };

    for key in DROP_ORDER {
        if total_len(sections) <= budget {
            return;
        }
        if let Some(idx) = sections.iter().position(|s| s.key == key && !s.required) {
            debug!(
                section = key,
                bytes_dropped = sections[idx].content.len(),
                "dropped section for budget"
            );
            sections.remove(idx);
        }
    }

    if total_len(sections) <= budget {
        return;
    }
    let other_len: usize = sections
        .iter()
        .take(sections.len().saturating_sub(1))
        .map(|s| s.content.len())
        .sum();
    let allowed = budget.saturating_sub(other_len);
    if let Some(last) = sections.last_mut() {
        let before_len = last.content.len();
        let keep = allowed.saturating_sub(12);
        let mut cut = keep.min(last.content.len());
        while !last.content.is_char_boundary(cut) {
            cut -= 1;
        }
        last.content.truncate(cut);
        last.content.push_str("\n[truncated]");
        debug!(
            section = last.key,
            before_len,
            after_len = last.content.len(),
            "truncated section for budget"
        );
    }
}

fn render_sections(sections: &[ParsedSection]) -> String {
    sections
        .iter()
        .map(|s| s.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Builds prompts within a byte budget.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    budget_bytes: usize,
}

impl PromptBuilder {
    pub fn new(budget_bytes: usize) -> Self {
        Self { budget_bytes }
    }

    pub fn build(&self, kind: PromptKind, input: &PromptInputs<'_>) -> Result<String> {
        let rendered = PromptEngine::new().render(kind, input)?;
        let mut sections = parse_sections(&rendered);
        apply_budget_to_sections(&mut sections, self.budget_bytes);
        Ok(render_sections(&sections))
    }
}
