//! Human-readable text output formatter

use super::OutputFormatter;
use crate::report::ScanReport;
use crate::violation::{PageIdentity, Severity, Violation};
use colored::*;

/// Text formatter with optional color support
pub struct TextFormatter {
    /// Enable colored output
    pub colored: bool,

    /// Show remediation text
    pub show_help: bool,

    /// Show statistics
    pub show_stats: bool,
}

impl Default for TextFormatter {
    fn default() -> Self {
        Self {
            colored: true,
            show_help: true,
            show_stats: true,
        }
    }
}

impl TextFormatter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Disable colors
    pub fn without_color(mut self) -> Self {
        self.colored = false;
        self
    }

    fn paint(&self, text: &str, style: fn(&str) -> ColoredString) -> String {
        if self.colored {
            style(text).to_string()
        } else {
            text.to_string()
        }
    }

    fn severity_str(&self, severity: Severity) -> String {
        let s = severity.to_string();
        match severity {
            Severity::Error => self.paint(&s, |s| s.red().bold()),
            Severity::Warning => self.paint(&s, |s| s.yellow().bold()),
        }
    }

    /// File a violation is reported under; the page itself when unresolved
    fn heading(violation: &Violation) -> String {
        match violation.page_context.display_file() {
            Some(file) => file.display().to_string(),
            None => violation.page_context.identity.to_string(),
        }
    }

    fn location(violation: &Violation) -> String {
        let heading = Self::heading(violation);
        match violation.source_line {
            Some(line) => format!("{}:{}:{}", heading, line, violation.element_context.column),
            None => heading,
        }
    }

    fn plural(count: usize, word: &str) -> String {
        if count == 1 {
            format!("{} {}", count, word)
        } else {
            format!("{} {}s", count, word)
        }
    }
}

impl OutputFormatter for TextFormatter {
    fn format(&self, report: &ScanReport) -> String {
        let mut output = String::new();

        // Group by file, keeping first-seen order
        let mut groups: Vec<(String, Vec<&Violation>)> = Vec::new();
        for violation in &report.violations {
            let heading = Self::heading(violation);
            match groups.iter_mut().find(|(h, _)| *h == heading) {
                Some((_, list)) => list.push(violation),
                None => groups.push((heading, vec![violation])),
            }
        }

        for (heading, violations) in &groups {
            output.push_str(&self.paint(heading, |s| s.underline()));
            output.push('\n');
            for violation in violations {
                output.push_str(&self.format_violation(violation));
            }
            output.push('\n');
        }

        if !report.file_errors.is_empty() {
            output.push_str(&self.paint("Malformed templates", |s| s.red().bold()));
            output.push('\n');
            for error in &report.file_errors {
                output.push_str(&format!("  {}\n", error));
            }
            output.push('\n');
        }

        if !report.unresolved.is_empty() {
            output.push_str(&self.paint("Unresolved pages", |s| s.yellow().bold()));
            output.push('\n');
            for ambiguity in &report.unresolved {
                output.push_str(&format!("  {}\n", ambiguity));
                for candidate in &ambiguity.candidates {
                    output.push_str(&format!("    candidate: {}\n", candidate.display()));
                }
            }
            output.push('\n');
        }

        if !report.faults.is_empty() {
            output.push_str(&self.paint("Check failures", |s| s.magenta().bold()));
            output.push('\n');
            for fault in &report.faults {
                output.push_str(&format!("  {}\n", fault));
            }
            output.push('\n');
        }

        if self.show_stats {
            let summary = report.summary();
            output.push_str(&format!(
                "{} scanned",
                Self::plural(summary.files_scanned, "template")
            ));

            let mut counts = Vec::new();
            if summary.total_errors > 0 {
                counts.push(self.paint(&Self::plural(summary.total_errors, "error"), |s| s.red()));
            }
            if summary.total_warnings > 0 {
                counts.push(
                    self.paint(&Self::plural(summary.total_warnings, "warning"), |s| s.yellow()),
                );
            }
            if !counts.is_empty() {
                output.push_str(&format!(": {}", counts.join(", ")));
            }
            output.push('\n');
            output.push_str(&format!(
                "Finished in {:.2}s\n",
                report.duration.as_secs_f64()
            ));
        }

        output
    }

    fn format_violation(&self, violation: &Violation) -> String {
        let mut output = format!(
            "{}: {}[{}]: {}\n",
            Self::location(violation),
            self.severity_str(violation.severity),
            self.paint(violation.rule_id.as_str(), |s| s.cyan()),
            violation.message
        );

        let bar = self.paint("|", |s| s.blue());
        let element = &violation.element_context;
        if element.tag != "#document" {
            output.push_str(&format!("   {} <{}>", bar, element.summary()));
            if let Some(parent) = &element.parent {
                output.push_str(&format!(" in <{}>", parent));
            }
            output.push('\n');
        }

        if let Some(fragment) = &violation.page_context.fragment_file {
            if let Some(view) = &violation.page_context.view_file {
                if view != fragment {
                    output.push_str(&format!("   {} rendered by {}\n", bar, view.display()));
                }
            }
        }
        if let PageIdentity::Route(route) = &violation.page_context.identity {
            output.push_str(&format!("   {} page {}\n", bar, route));
        }

        let eq = self.paint("=", |s| s.blue());
        if self.show_help {
            if let Some(remediation) = &violation.remediation {
                output.push_str(&format!("   {} help: {}\n", eq, remediation));
            }
        }
        if let Some(wcag) = &violation.wcag_reference {
            output.push_str(&format!("   {} wcag: {}\n", eq, wcag));
        }

        output
    }
}
