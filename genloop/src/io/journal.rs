//! Step journal helpers for `.genloop/steps/`.

use std::path::PathBuf;

use anyhow::Result;
use serde::Serialize;

use crate::core::machine::Step;
use crate::core::types::ErrorRecord;
use crate::io::json_store::write_json;
use crate::io::project::ProjectLayout;

/// What happened in one executed step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepRecord {
    pub seq: u32,
    pub step: Step,
    pub next: Step,
    pub iteration_count: u32,
    /// Error pending after the step ran, consumed by the next decision.
    pub error: Option<ErrorRecord>,
    pub duration_ms: u64,
}

/// Final summary written once per run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutcomeRecord {
    pub terminal: Step,
    pub steps_executed: u32,
    pub iteration_count: u32,
    pub documented: bool,
    pub error: Option<ErrorRecord>,
}

pub fn step_record_path(layout: &ProjectLayout, record: &StepRecord) -> PathBuf {
    layout
        .steps_dir()
        .join(format!("{:03}-{}.json", record.seq, record.step.as_str()))
}

pub fn write_step(layout: &ProjectLayout, record: &StepRecord) -> Result<PathBuf> {
    let path = step_record_path(layout, record);
    write_json(&path, record)?;
    Ok(path)
}

pub fn write_outcome(layout: &ProjectLayout, outcome: &OutcomeRecord) -> Result<()> {
    write_json(&layout.outcome_path(), outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::ErrorCategory;
    use std::fs;

    #[test]
    fn step_records_are_numbered_by_sequence() {
        let temp = tempfile::tempdir().expect("tempdir");
        let layout = ProjectLayout::new(temp.path());
        let record = StepRecord {
            seq: 4,
            step: Step::Execute,
            next: Step::RepairCode,
            iteration_count: 0,
            error: Some(ErrorRecord::new(ErrorCategory::RuntimeError, "boom")),
            duration_ms: 12,
        };

        let path = write_step(&layout, &record).expect("write");
        assert!(path.ends_with(".genloop/steps/004-execute.json"));
        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).expect("read")).expect("json");
        assert_eq!(value["next"], "repair_code");
        assert_eq!(value["error"]["category"], "RuntimeError");
    }

    #[test]
    fn outcome_lands_in_state_dir() {
        let temp = tempfile::tempdir().expect("tempdir");
        let layout = ProjectLayout::new(temp.path());
        write_outcome(
            &layout,
            &OutcomeRecord {
                terminal: Step::Terminal(crate::core::machine::Terminal::Success),
                steps_executed: 6,
                iteration_count: 0,
                documented: true,
                error: None,
            },
        )
        .expect("write");
        assert!(layout.outcome_path().is_file());
    }
}
