//! Batch scan report

use crate::checks::Outline;
use crate::engine::{CheckFault, EngineOutput, RuleTiming};
use crate::extract::ExtractionError;
use crate::markup::MarkupError;
use crate::resolver::ResolutionAmbiguity;
use crate::rule::RuleId;
use crate::violation::{Severity, Violation};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Why a file could not be analyzed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum FileErrorKind {
    Read { message: String },
    Extraction { line: usize, message: String },
    Markup { line: usize, message: String },
}

/// A malformed or unreadable template, reported apart from violations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileError {
    pub path: PathBuf,
    #[serde(flatten)]
    pub kind: FileErrorKind,
}

impl FileError {
    pub fn read(path: impl Into<PathBuf>, err: &std::io::Error) -> Self {
        Self {
            path: path.into(),
            kind: FileErrorKind::Read {
                message: err.to_string(),
            },
        }
    }

    pub fn extraction(path: impl Into<PathBuf>, err: &ExtractionError) -> Self {
        Self {
            path: path.into(),
            kind: FileErrorKind::Extraction {
                line: err.line(),
                message: err.to_string(),
            },
        }
    }

    pub fn markup(path: impl Into<PathBuf>, err: &MarkupError) -> Self {
        Self {
            path: path.into(),
            kind: FileErrorKind::Markup {
                line: err.line(),
                message: err.to_string(),
            },
        }
    }

    /// Line the problem was found on, when known
    pub fn line(&self) -> Option<usize> {
        match &self.kind {
            FileErrorKind::Read { .. } => None,
            FileErrorKind::Extraction { line, .. } | FileErrorKind::Markup { line, .. } => {
                Some(*line)
            }
        }
    }

    pub fn message(&self) -> &str {
        match &self.kind {
            FileErrorKind::Read { message }
            | FileErrorKind::Extraction { message, .. }
            | FileErrorKind::Markup { message, .. } => message,
        }
    }
}

impl fmt::Display for FileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line() {
            Some(line) => write!(f, "{}:{}: {}", self.path.display(), line, self.message()),
            None => write!(f, "{}: {}", self.path.display(), self.message()),
        }
    }
}

/// Counts shown at the end of a report
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub total_errors: usize,
    pub total_warnings: usize,
    pub files_scanned: usize,
}

/// Everything one scan produced
#[derive(Debug, Clone, Default)]
pub struct ScanReport {
    pub violations: Vec<Violation>,
    pub file_errors: Vec<FileError>,
    pub faults: Vec<CheckFault>,
    /// Pages that could not be tied to a template
    pub unresolved: Vec<ResolutionAmbiguity>,
    pub files_scanned: usize,
    pub duration: Duration,
    pub timings: HashMap<RuleId, RuleTiming>,
    /// Outlines of the templates that parsed, for page-wide checks
    pub outlines: HashMap<PathBuf, Outline>,
}

impl ScanReport {
    pub fn summary(&self) -> Summary {
        let count = |severity| {
            self.violations
                .iter()
                .filter(|v| v.severity == severity)
                .count()
        };
        Summary {
            total_errors: count(Severity::Error),
            total_warnings: count(Severity::Warning),
            files_scanned: self.files_scanned,
        }
    }

    pub fn has_errors(&self) -> bool {
        self.violations.iter().any(Violation::is_error)
    }

    pub fn is_clean(&self) -> bool {
        self.violations.is_empty() && self.file_errors.is_empty()
    }

    /// 1 if any error-severity violation was found, else 0
    ///
    /// Malformed templates are reported but do not change the status.
    pub fn exit_code(&self) -> i32 {
        if self.has_errors() {
            1
        } else {
            0
        }
    }

    /// Add one engine run
    pub fn absorb(&mut self, output: EngineOutput) {
        self.violations.extend(output.violations);
        self.faults.extend(output.faults);
        for (rule, timing) in output.timings {
            self.timings.entry(rule).or_default().merge(&timing);
        }
    }

    pub fn merge(&mut self, other: ScanReport) {
        self.violations.extend(other.violations);
        self.file_errors.extend(other.file_errors);
        self.faults.extend(other.faults);
        self.unresolved.extend(other.unresolved);
        self.files_scanned += other.files_scanned;
        self.outlines.extend(other.outlines);
        for (rule, timing) in other.timings {
            self.timings.entry(rule).or_default().merge(&timing);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::violation::{ElementContext, PageContext};

    fn violation(rule: RuleId) -> Violation {
        Violation::new(
            rule,
            "message",
            ElementContext::default(),
            &PageContext::for_file("a.html.erb"),
        )
    }

    #[test]
    fn test_summary_counts() {
        let report = ScanReport {
            violations: vec![
                violation(RuleId::ImageAlt),
                violation(RuleId::ImageAlt).with_severity(Severity::Warning),
                violation(RuleId::TableHeaders),
            ],
            files_scanned: 2,
            ..Default::default()
        };
        assert_eq!(
            report.summary(),
            Summary {
                total_errors: 2,
                total_warnings: 1,
                files_scanned: 2,
            }
        );
        assert_eq!(report.exit_code(), 1);
    }

    #[test]
    fn test_warnings_only_exit_zero() {
        let report = ScanReport {
            violations: vec![violation(RuleId::ImageAlt).with_severity(Severity::Warning)],
            ..Default::default()
        };
        assert!(!report.has_errors());
        assert_eq!(report.exit_code(), 0);
    }

    #[test]
    fn test_file_errors_do_not_fail_the_run() {
        let err = crate::extract::extract("<p><%= x").unwrap_err();
        let report = ScanReport {
            file_errors: vec![FileError::extraction("a.html.erb", &err)],
            ..Default::default()
        };
        assert_eq!(report.exit_code(), 0);
        assert!(!report.is_clean());
        assert!(report.file_errors[0].to_string().starts_with("a.html.erb:1:"));
    }

    #[test]
    fn test_merge() {
        let mut a = ScanReport {
            violations: vec![violation(RuleId::ImageAlt)],
            files_scanned: 1,
            ..Default::default()
        };
        let mut timings = HashMap::new();
        timings.insert(
            RuleId::ImageAlt,
            RuleTiming {
                evaluation_count: 1,
                ..Default::default()
            },
        );
        a.merge(ScanReport {
            violations: vec![violation(RuleId::FormLabels)],
            files_scanned: 1,
            timings,
            ..Default::default()
        });
        assert_eq!(a.violations.len(), 2);
        assert_eq!(a.files_scanned, 2);
        assert_eq!(a.timings[&RuleId::ImageAlt].evaluation_count, 1);
    }
}
