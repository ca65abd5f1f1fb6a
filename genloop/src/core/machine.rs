//! Pipeline transition table.
//!
//! The graph is fixed: the only branching happens after execution-type steps,
//! through [`decide`]. Everything here is a pure function of the current step,
//! the pending error and the iteration counter.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::guard::IterationGuard;
use crate::core::types::{ErrorCategory, ErrorRecord};

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Terminal {
    Success,
    GaveUp,
}

/// Named pipeline steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Generate,
    Persist,
    Containerize,
    Execute,
    CollectLogs,
    RepairCode,
    RepairContainer,
    Document,
    Terminal(Terminal),
}

pub const INITIAL_STEP: Step = Step::Generate;

impl Step {
    pub fn as_str(self) -> &'static str {
        match self {
            Step::Generate => "generate",
            Step::Persist => "persist",
            Step::Containerize => "containerize",
            Step::Execute => "execute",
            Step::CollectLogs => "collect_logs",
            Step::RepairCode => "repair_code",
            Step::RepairContainer => "repair_container",
            Step::Document => "document",
            Step::Terminal(Terminal::Success) => "success",
            Step::Terminal(Terminal::GaveUp) => "gave_up",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Step::Terminal(_))
    }

    /// Steps after which [`decide`] picks the successor.
    pub fn is_execution(self) -> bool {
        matches!(self, Step::Execute | Step::CollectLogs)
    }

    /// Steps that consume one unit of the iteration budget.
    pub fn is_repair(self) -> bool {
        matches!(self, Step::RepairCode | Step::RepairContainer)
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared post-execution decision.
///
/// - No error → `Document`, regardless of the iteration count.
/// - Error with the budget exhausted → `Terminal(GaveUp)`.
/// - A malformed code bundle → `RepairCode`, whatever its category.
/// - Otherwise the repair step for the error category.
pub fn decide(error: Option<&ErrorRecord>, iteration_count: u32, guard: &IterationGuard) -> Step {
    let Some(error) = error else {
        return Step::Document;
    };
    if !guard.may_retry(iteration_count) {
        return Step::Terminal(Terminal::GaveUp);
    }
    if error.bundle_defect {
        return Step::RepairCode;
    }
    repair_step_for(error.category)
}

/// Repair path for each error category.
pub fn repair_step_for(category: ErrorCategory) -> Step {
    match category {
        ErrorCategory::ConfigurationError => Step::RepairContainer,
        ErrorCategory::RuntimeError => Step::RepairCode,
        ErrorCategory::ExecutionError | ErrorCategory::InternalError => Step::RepairCode,
    }
}

/// Successor of `current`.
///
/// `error` and `iteration_count` are the values after `current` completed.
pub fn next_step(
    current: Step,
    error: Option<&ErrorRecord>,
    iteration_count: u32,
    guard: &IterationGuard,
) -> Step {
    match current {
        Step::Generate => Step::Persist,
        Step::Persist => Step::Containerize,
        Step::Containerize => Step::Execute,
        Step::Execute | Step::CollectLogs => decide(error, iteration_count, guard),
        Step::RepairContainer => Step::Execute,
        Step::RepairCode => Step::CollectLogs,
        Step::Document => Step::Terminal(Terminal::Success),
        Step::Terminal(terminal) => Step::Terminal(terminal),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATEGORIES: [ErrorCategory; 4] = [
        ErrorCategory::ConfigurationError,
        ErrorCategory::RuntimeError,
        ErrorCategory::ExecutionError,
        ErrorCategory::InternalError,
    ];

    fn record(category: ErrorCategory) -> ErrorRecord {
        ErrorRecord::new(category, "boom")
    }

    #[test]
    fn decide_routes_each_category_to_its_repair_step() {
        let guard = IterationGuard::new(3);
        let expected = [
            Step::RepairContainer,
            Step::RepairCode,
            Step::RepairCode,
            Step::RepairCode,
        ];
        for (category, want) in CATEGORIES.into_iter().zip(expected) {
            assert_eq!(decide(Some(&record(category)), 0, &guard), want, "{category}");
        }
    }

    #[test]
    fn malformed_bundle_goes_to_code_repair() {
        let guard = IterationGuard::new(3);
        let mut error = record(ErrorCategory::ConfigurationError);
        error.bundle_defect = true;
        assert_eq!(decide(Some(&error), 0, &guard), Step::RepairCode);
        assert_eq!(
            decide(Some(&error), 3, &guard),
            Step::Terminal(Terminal::GaveUp)
        );
    }

    #[test]
    fn decide_without_error_documents_at_any_iteration() {
        let guard = IterationGuard::new(3);
        for n in [0, 1, 3, 10, u32::MAX] {
            assert_eq!(decide(None, n, &guard), Step::Document);
        }
    }

    #[test]
    fn decide_gives_up_once_budget_is_spent() {
        let guard = IterationGuard::new(3);
        for category in CATEGORIES {
            for n in [3, 4, 100] {
                assert_eq!(
                    decide(Some(&record(category)), n, &guard),
                    Step::Terminal(Terminal::GaveUp)
                );
            }
        }
    }

    #[test]
    fn decide_is_idempotent() {
        let guard = IterationGuard::new(2);
        let error = record(ErrorCategory::RuntimeError);
        for n in 0..4 {
            let first = decide(Some(&error), n, &guard);
            let second = decide(Some(&error), n, &guard);
            assert_eq!(first, second);
        }
    }

    #[test]
    fn unconditional_edges_follow_the_fixed_graph() {
        let guard = IterationGuard::default();
        let error = record(ErrorCategory::InternalError);
        assert_eq!(next_step(Step::Generate, Some(&error), 0, &guard), Step::Persist);
        assert_eq!(next_step(Step::Persist, None, 0, &guard), Step::Containerize);
        assert_eq!(next_step(Step::Containerize, Some(&error), 0, &guard), Step::Execute);
        assert_eq!(next_step(Step::RepairContainer, None, 1, &guard), Step::Execute);
        assert_eq!(next_step(Step::RepairCode, None, 1, &guard), Step::CollectLogs);
        assert_eq!(
            next_step(Step::Document, None, 0, &guard),
            Step::Terminal(Terminal::Success)
        );
    }

    #[test]
    fn terminal_states_are_absorbing() {
        let guard = IterationGuard::default();
        for terminal in [Terminal::Success, Terminal::GaveUp] {
            let step = Step::Terminal(terminal);
            assert_eq!(next_step(step, None, 0, &guard), step);
        }
    }

    #[test]
    fn collect_logs_uses_the_same_decision_as_execute() {
        let guard = IterationGuard::new(1);
        let error = record(ErrorCategory::ConfigurationError);
        assert_eq!(
            next_step(Step::CollectLogs, Some(&error), 0, &guard),
            next_step(Step::Execute, Some(&error), 0, &guard)
        );
    }

    /// Every execution fails and every repair succeeds: the walk must end in
    /// `GaveUp` after exactly `max` repairs.
    #[test]
    fn persistent_failure_terminates_after_budget() {
        for category in CATEGORIES {
            let guard = IterationGuard::new(3);
            let error = record(category);
            let mut step = INITIAL_STEP;
            let mut iterations = 0u32;
            let mut visited = 0;
            while !step.is_terminal() {
                let before = iterations;
                if step.is_repair() {
                    iterations += 1;
                }
                assert!(iterations >= before);
                let pending = step.is_execution().then_some(&error);
                step = next_step(step, pending, iterations, &guard);
                visited += 1;
                assert!(visited < 50, "walk did not terminate");
            }
            assert_eq!(step, Step::Terminal(Terminal::GaveUp));
            assert_eq!(iterations, 3);
        }
    }

    #[test]
    fn step_names_are_stable() {
        assert_eq!(Step::CollectLogs.to_string(), "collect_logs");
        assert_eq!(Step::Terminal(Terminal::GaveUp).as_str(), "gave_up");
        let json = serde_json::to_string(&Step::RepairContainer).expect("serialize");
        assert_eq!(json, "\"repair_container\"");
    }
}
