//! Semantic checks on generated code bundles not expressible via JSON Schema.

use std::collections::HashSet;

use crate::core::path::contained_relative_path;
use crate::core::types::{CodeBundle, CodeUnit, ErrorCategory, ErrorRecord};

/// Check bundle invariants:
/// - At least one unit
/// - Exactly one executable unit
/// - Filenames non-empty, relative, contained, unique
/// - Non-empty execution command
pub fn validate_bundle(bundle: &CodeBundle) -> Vec<String> {
    let mut errors = Vec::new();

    if bundle.units.is_empty() {
        errors.push("bundle contains no code units".to_string());
    }

    let executables: Vec<&str> = bundle
        .executable_units()
        .map(|unit| unit.filename.as_str())
        .collect();
    match executables.len() {
        1 => {}
        0 => errors.push("no unit is marked executable".to_string()),
        n => errors.push(format!(
            "{n} units are marked executable ({}); exactly one is required",
            executables.join(", ")
        )),
    }

    let mut seen = HashSet::new();
    for unit in &bundle.units {
        match contained_relative_path(&unit.filename) {
            Ok(path) => {
                if !seen.insert(path) {
                    errors.push(format!("duplicate filename '{}'", unit.filename));
                }
            }
            Err(err) => errors.push(err),
        }
    }

    if bundle.execution_command.trim().is_empty() {
        errors.push("execution_command must not be empty".to_string());
    }

    errors
}

/// The single executable unit, if the bundle has exactly one.
pub fn entry_point(bundle: &CodeBundle) -> Option<&CodeUnit> {
    let mut executables = bundle.executable_units();
    let first = executables.next()?;
    if executables.next().is_some() {
        return None;
    }
    Some(first)
}

/// Convert bundle violations into a `ConfigurationError` record flagged as a
/// bundle defect, which the repair policy sends to code repair.
pub fn check_bundle(bundle: &CodeBundle) -> Option<ErrorRecord> {
    let errors = validate_bundle(bundle);
    if errors.is_empty() {
        return None;
    }
    let mut record = ErrorRecord::new(
        ErrorCategory::ConfigurationError,
        format!("invalid code bundle:\n- {}", errors.join("\n- ")),
    );
    record.reference = Some("code bundle validation".to_string());
    record.bundle_defect = true;
    Some(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{bundle_with, unit};

    #[test]
    fn single_executable_bundle_is_valid() {
        let bundle = bundle_with(vec![unit("main.py", true), unit("util.py", false)]);
        assert!(validate_bundle(&bundle).is_empty());
        assert_eq!(check_bundle(&bundle), None);
        assert_eq!(entry_point(&bundle).map(|u| u.filename.as_str()), Some("main.py"));
    }

    #[test]
    fn zero_executables_is_configuration_error() {
        let bundle = bundle_with(vec![unit("util.py", false)]);
        let record = check_bundle(&bundle).expect("record");
        assert_eq!(record.category, ErrorCategory::ConfigurationError);
        assert!(record.details.contains("no unit is marked executable"));
        assert_eq!(entry_point(&bundle), None);
    }

    #[test]
    fn two_executables_is_configuration_error() {
        let bundle = bundle_with(vec![unit("a.py", true), unit("b.py", true)]);
        let record = check_bundle(&bundle).expect("record");
        assert_eq!(record.category, ErrorCategory::ConfigurationError);
        assert!(record.details.contains("2 units are marked executable (a.py, b.py)"));
        assert!(record.bundle_defect);
        assert_eq!(entry_point(&bundle), None);
    }

    #[test]
    fn reports_path_and_duplicate_violations() {
        let bundle = bundle_with(vec![
            unit("main.py", true),
            unit("./main.py", false),
            unit("../escape.py", false),
        ]);
        let errors = validate_bundle(&bundle);
        assert!(errors.iter().any(|err| err.contains("duplicate filename")));
        assert!(errors.iter().any(|err| err.contains("must not contain '..'")));
    }

    #[test]
    fn empty_bundle_reports_missing_units() {
        let errors = validate_bundle(&CodeBundle::default());
        assert!(errors.iter().any(|err| err.contains("no code units")));
        assert!(errors.iter().any(|err| err.contains("execution_command")));
    }
}
