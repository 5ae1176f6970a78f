//! JSON output formatter

use super::OutputFormatter;
use crate::report::{FileError, ScanReport, Summary};
use crate::violation::Violation;
use serde::Serialize;
use std::path::Path;

/// JSON formatter for machine-readable output
#[derive(Default)]
pub struct JsonFormatter {
    /// Pretty print with indentation
    pub pretty: bool,
}

impl JsonFormatter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable pretty printing
    pub fn pretty(mut self) -> Self {
        self.pretty = true;
        self
    }

    fn to_string<T: Serialize>(&self, value: &T) -> String {
        let result = if self.pretty {
            serde_json::to_string_pretty(value)
        } else {
            serde_json::to_string(value)
        };
        result.unwrap_or_default()
    }
}

#[derive(Serialize)]
struct JsonOutput<'a> {
    violations: &'a [Violation],
    file_errors: &'a [FileError],
    #[serde(skip_serializing_if = "Vec::is_empty")]
    unresolved: Vec<JsonUnresolved<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    check_failures: Vec<String>,
    summary: Summary,
}

#[derive(Serialize)]
struct JsonUnresolved<'a> {
    page: &'a str,
    reason: &'a str,
    candidates: Vec<&'a Path>,
}

impl OutputFormatter for JsonFormatter {
    fn format(&self, report: &ScanReport) -> String {
        let output = JsonOutput {
            violations: &report.violations,
            file_errors: &report.file_errors,
            unresolved: report
                .unresolved
                .iter()
                .map(|a| JsonUnresolved {
                    page: &a.identity,
                    reason: &a.reason,
                    candidates: a.candidates.iter().map(|c| c.as_path()).collect(),
                })
                .collect(),
            check_failures: report.faults.iter().map(|f| f.to_string()).collect(),
            summary: report.summary(),
        };
        self.to_string(&output)
    }

    fn format_violation(&self, violation: &Violation) -> String {
        self.to_string(violation)
    }
}
