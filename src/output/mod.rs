//! Output formatters for scan reports

mod json;
mod text;

pub use json::JsonFormatter;
pub use text::TextFormatter;

use crate::report::ScanReport;
use crate::violation::Violation;

/// Output formatter trait
pub trait OutputFormatter: Send + Sync {
    /// Format a whole report
    fn format(&self, report: &ScanReport) -> String;

    /// Format a single violation
    fn format_violation(&self, violation: &Violation) -> String;
}
