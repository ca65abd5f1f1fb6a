//! Deterministic classification of raw process output and container logs.
//!
//! The classifier never performs I/O: callers hand it output they already
//! captured. A `None` result means no failure signature was found.

use std::sync::LazyLock;

use regex::Regex;

use crate::core::types::{ErrorCategory, ErrorRecord, LogSource, RawOutput};

/// Upper bound on `ErrorRecord::details`; the tail of the output is kept.
pub const MAX_DETAIL_BYTES: usize = 8_000;

static RUNTIME_MARKER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)traceback|exception|failed|critical|syntaxerror")
        .expect("runtime marker regex")
});

static ERROR_LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)error|traceback|exception|failed|critical").expect("error line regex")
});

/// `File "app/main.py", line 12, in run`
static TRACEBACK_FRAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)file "([^"]+)", line (\d+)"#).expect("traceback frame regex")
});

/// `src/app.js:12: message` and `(index.js:3:9)` style locations.
static FILE_LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?:^|[\s(\[\"'])([\w./\\-]*[A-Za-z_][\w./\\-]*\.[A-Za-z0-9]+):(\d+):"#)
        .expect("file line regex")
});

/// Classify captured output from `source`.
///
/// - `Process`: non-zero (or missing) exit → `ExecutionError`.
/// - `ContainerBuild`: non-zero (or missing) exit → `ConfigurationError`.
/// - `ContainerRuntime`: a runtime marker anywhere in the text → `RuntimeError`.
pub fn classify(source: LogSource, output: &RawOutput) -> Option<ErrorRecord> {
    match source {
        LogSource::Process => classify_exit(ErrorCategory::ExecutionError, output),
        LogSource::ContainerBuild => classify_exit(ErrorCategory::ConfigurationError, output),
        LogSource::ContainerRuntime => classify_logs(&output.combined()),
    }
}

/// Classify a sequence of log lines (already split).
pub fn classify_lines<S: AsRef<str>>(source: LogSource, lines: &[S]) -> Option<ErrorRecord> {
    let text = lines
        .iter()
        .map(|line| line.as_ref())
        .collect::<Vec<_>>()
        .join("\n");
    match source {
        LogSource::ContainerRuntime => classify_logs(&text),
        _ => classify(source, &RawOutput::failed(text)),
    }
}

/// Scan container runtime logs for a stack trace or exception marker.
pub fn classify_logs(text: &str) -> Option<ErrorRecord> {
    let lines: Vec<&str> = text.lines().collect();
    let first = lines.iter().position(|line| is_runtime_marker(line))?;

    let relevant = lines[first..].join("\n");
    let (file, line) = extract_location(&lines);
    Some(ErrorRecord {
        category: ErrorCategory::RuntimeError,
        details: tail(relevant.trim(), MAX_DETAIL_BYTES),
        file,
        line,
        reference: Some(lines[first].trim().to_string()),
        bundle_defect: false,
    })
}

fn classify_exit(category: ErrorCategory, output: &RawOutput) -> Option<ErrorRecord> {
    if output.succeeded() {
        return None;
    }
    let body = if output.stderr.trim().is_empty() {
        output.stdout.as_str()
    } else {
        output.stderr.as_str()
    };
    let mut details = tail(body.trim(), MAX_DETAIL_BYTES);
    if output.timed_out {
        details = format!("[timed out] {details}");
    } else if details.is_empty() {
        details = match output.exit_code {
            Some(code) => format!("exited with status {code}"),
            None => "terminated by signal".to_string(),
        };
    }

    let lines: Vec<&str> = body.lines().collect();
    let (file, line) = extract_location(&lines);
    let reference = lines
        .iter()
        .find(|line| ERROR_LINE_RE.is_match(line))
        .map(|line| line.trim().to_string());
    Some(ErrorRecord {
        category,
        details,
        file,
        line,
        reference,
        bundle_defect: false,
    })
}

fn is_runtime_marker(line: &str) -> bool {
    RUNTIME_MARKER_RE.is_match(line) || FILE_LINE_RE.is_match(line)
}

/// Find a `(file, line)` pair.
///
/// Structured traceback frames win over generic `file:line:` matches, both
/// within a line and across the text; the innermost (last) frame is reported.
/// Without a frame the first generic match is used.
fn extract_location(lines: &[&str]) -> (Option<String>, Option<u32>) {
    let mut frame: Option<(String, u32)> = None;
    let mut generic: Option<(String, u32)> = None;

    for line in lines {
        if let Some(found) = capture_location(&TRACEBACK_FRAME_RE, line) {
            frame = Some(found);
            continue;
        }
        if generic.is_none() {
            generic = capture_location(&FILE_LINE_RE, line);
        }
    }

    match frame.or(generic) {
        Some((file, line)) => (Some(file), Some(line)),
        None => (None, None),
    }
}

fn capture_location(re: &Regex, line: &str) -> Option<(String, u32)> {
    let caps = re.captures(line)?;
    let file = caps.get(1)?.as_str().to_string();
    let line = caps.get(2)?.as_str().parse().ok()?;
    Some((file, line))
}

/// Keep at most `limit` trailing bytes, cut on a char boundary.
fn tail(text: &str, limit: usize) -> String {
    if text.len() <= limit {
        return text.to_string();
    }
    let mut start = text.len() - limit;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    format!("[truncated]\n{}", &text[start..])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exited(code: i32, stdout: &str, stderr: &str) -> RawOutput {
        RawOutput {
            exit_code: Some(code),
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
            timed_out: false,
        }
    }

    #[test]
    fn traceback_lines_from_runtime_are_runtime_errors() {
        let record = classify_lines(
            LogSource::ContainerRuntime,
            &[
                "Traceback (most recent call last):",
                "ZeroDivisionError: division by zero",
            ],
        )
        .expect("error record");
        assert_eq!(record.category, ErrorCategory::RuntimeError);
        assert_eq!(
            record.reference.as_deref(),
            Some("Traceback (most recent call last):")
        );
        assert!(record.details.contains("ZeroDivisionError"));
        assert_eq!(record.file, None);
        assert_eq!(record.line, None);
    }

    #[test]
    fn failed_build_is_configuration_error() {
        let output = exited(
            1,
            "",
            "#5 [2/3] RUN pip install -r requirements.txt\nERROR: failed to solve: process \"/bin/sh -c pip install\" did not complete successfully: exit code: 1",
        );
        let record = classify(LogSource::ContainerBuild, &output).expect("error record");
        assert_eq!(record.category, ErrorCategory::ConfigurationError);
        assert!(
            record
                .reference
                .as_deref()
                .is_some_and(|r| r.starts_with("ERROR: failed to solve"))
        );
    }

    #[test]
    fn successful_build_is_not_an_error() {
        let output = exited(0, "naming to docker.io/library/app", "");
        assert_eq!(classify(LogSource::ContainerBuild, &output), None);
    }

    #[test]
    fn non_zero_process_exit_is_execution_error() {
        let output = exited(
            2,
            "",
            "  File \"main.py\", line 4\n    print('x'\nSyntaxError: '(' was never closed",
        );
        let record = classify(LogSource::Process, &output).expect("error record");
        assert_eq!(record.category, ErrorCategory::ExecutionError);
        assert_eq!(record.file.as_deref(), Some("main.py"));
        assert_eq!(record.line, Some(4));
    }

    #[test]
    fn process_failure_without_stderr_uses_stdout() {
        let output = exited(1, "usage: app [-h]", "");
        let record = classify(LogSource::Process, &output).expect("error record");
        assert_eq!(record.details, "usage: app [-h]");
    }

    #[test]
    fn silent_process_failure_reports_exit_status() {
        let output = exited(137, "", "");
        let record = classify(LogSource::Process, &output).expect("error record");
        assert_eq!(record.details, "exited with status 137");
    }

    #[test]
    fn timed_out_process_is_flagged_in_details() {
        let output = RawOutput {
            exit_code: None,
            stdout: String::new(),
            stderr: "still running".to_string(),
            timed_out: true,
        };
        let record = classify(LogSource::Process, &output).expect("error record");
        assert!(record.details.starts_with("[timed out]"));
    }

    #[test]
    fn clean_runtime_logs_are_not_errors() {
        let logs = "app-1  | Hello, World!\napp-1  | listening on 0.0.0.0:8000\n";
        assert_eq!(classify_logs(logs), None);
    }

    #[test]
    fn keywords_match_case_insensitively() {
        for line in ["CRITICAL: disk full", "job Failed", "java.lang.NullPointerException"] {
            let record = classify_logs(line).expect("error record");
            assert_eq!(record.category, ErrorCategory::RuntimeError, "{line}");
        }
    }

    #[test]
    fn generic_file_line_pattern_is_a_runtime_marker() {
        let record = classify_logs("src/app.js:12: ReferenceError: x is not defined")
            .expect("error record");
        assert_eq!(record.file.as_deref(), Some("src/app.js"));
        assert_eq!(record.line, Some(12));
    }

    #[test]
    fn traceback_frame_wins_over_generic_pattern_on_same_line() {
        let record =
            classify_logs("File \"app.py\", line 7, in run: util.py:12: boom").expect("record");
        assert_eq!(record.file.as_deref(), Some("app.py"));
        assert_eq!(record.line, Some(7));
    }

    #[test]
    fn innermost_traceback_frame_is_reported() {
        let logs = "Traceback (most recent call last):\n  File \"/app/main.py\", line 10, in <module>\n    run()\n  File \"/app/calc.py\", line 3, in run\n    1 / 0\nZeroDivisionError: division by zero";
        let record = classify_logs(logs).expect("record");
        assert_eq!(record.file.as_deref(), Some("/app/calc.py"));
        assert_eq!(record.line, Some(3));
    }

    #[test]
    fn timestamps_are_not_mistaken_for_locations() {
        let record = classify_logs("12:30:45 worker failed").expect("record");
        assert_eq!(record.file, None);
        assert_eq!(record.line, None);
    }

    #[test]
    fn details_are_bounded() {
        let logs = format!("Traceback\n{}", "x".repeat(MAX_DETAIL_BYTES * 2));
        let record = classify_logs(&logs).expect("record");
        assert!(record.details.len() <= MAX_DETAIL_BYTES + "[truncated]\n".len());
        assert!(record.details.starts_with("[truncated]"));
    }
}
