//! Rule engine
//!
//! Runs the enabled checks against one document. Each check is isolated: an
//! error or panic inside a check becomes a [`CheckFault`] and the remaining
//! checks still run.

use crate::checks::{self, CheckError, CheckFn, PagePart};
use crate::config::{ConfigError, IgnoredRule, RulesConfig};
use crate::markup::Document;
use crate::rule::RuleId;
use crate::violation::{PageContext, Severity, Violation};
use std::collections::HashMap;
use std::fmt::Write as _;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use thiserror::Error;

/// A check that failed instead of producing results
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("check '{rule}' failed{}: {message}", on_file(.file))]
pub struct CheckFault {
    pub rule: RuleId,
    pub file: Option<PathBuf>,
    pub message: String,
}

fn on_file(file: &Option<PathBuf>) -> String {
    file.as_ref()
        .map(|f| format!(" on {}", f.display()))
        .unwrap_or_default()
}

/// Per-rule timing statistics
#[derive(Debug, Clone, Default)]
pub struct RuleTiming {
    /// Total time spent in the check
    pub total_time: Duration,
    /// Number of documents evaluated
    pub evaluation_count: usize,
    /// Number of violations produced
    pub match_count: usize,
}

impl RuleTiming {
    /// Average time per evaluation
    pub fn avg_time(&self) -> Duration {
        if self.evaluation_count > 0 {
            self.total_time / self.evaluation_count as u32
        } else {
            Duration::ZERO
        }
    }

    pub fn merge(&mut self, other: &RuleTiming) {
        self.total_time += other.total_time;
        self.evaluation_count += other.evaluation_count;
        self.match_count += other.match_count;
    }
}

/// Result of running the engine on one document
#[derive(Debug, Clone, Default)]
pub struct EngineOutput {
    pub violations: Vec<Violation>,
    pub faults: Vec<CheckFault>,
    pub timings: HashMap<RuleId, RuleTiming>,
}

/// Format timing statistics as a table, slowest rule first
pub fn format_timings(timings: &HashMap<RuleId, RuleTiming>) -> String {
    if timings.is_empty() {
        return "No timing data available".to_string();
    }

    let mut sorted: Vec<_> = timings.iter().collect();
    sorted.sort_by(|a, b| b.1.total_time.cmp(&a.1.total_time).then(a.0.cmp(b.0)));

    let mut output = String::from("Rule Timing Statistics:\n");
    let _ = writeln!(
        output,
        "{:<24} {:>12} {:>12} {:>10} {:>12}",
        "Rule ID", "Total", "Avg", "Evals", "Matches"
    );
    output.push_str(&"-".repeat(74));
    output.push('\n');

    for (rule, timing) in sorted {
        let total_ms = timing.total_time.as_secs_f64() * 1000.0;
        let avg_us = timing.avg_time().as_secs_f64() * 1_000_000.0;
        let _ = writeln!(
            output,
            "{:<24} {:>10.2}ms {:>10.2}µs {:>10} {:>12}",
            rule.as_str(),
            total_ms,
            avg_us,
            timing.evaluation_count,
            timing.match_count
        );
    }

    output
}

/// The rule engine
#[derive(Clone)]
pub struct RuleEngine {
    /// Checks in execution order
    checks: Vec<(RuleId, CheckFn)>,
    severity_overrides: HashMap<RuleId, Severity>,
}

impl std::fmt::Debug for RuleEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleEngine")
            .field("rules", &self.enabled_rules())
            .field("severity_overrides", &self.severity_overrides)
            .finish()
    }
}

impl Default for RuleEngine {
    fn default() -> Self {
        Self::with_rules(&RuleId::ALL)
    }
}

impl RuleEngine {
    /// Engine running every built-in rule
    pub fn new() -> Self {
        Self::default()
    }

    /// Engine running the given rules, in catalog order
    pub fn with_rules(rules: &[RuleId]) -> Self {
        let checks = RuleId::ALL
            .iter()
            .copied()
            .filter(|rule| rules.contains(rule))
            .map(|rule| (rule, checks::builtin(rule)))
            .collect();
        Self {
            checks,
            severity_overrides: HashMap::new(),
        }
    }

    /// Engine for a rules configuration section
    pub fn from_config(rules: &RulesConfig) -> Result<Self, ConfigError> {
        let active = rules.active_rules()?;
        for ignored in &rules.ignored {
            log::debug!("Rule {} ignored: {}", ignored.rule, ignored.reason);
        }
        let mut engine = Self::with_rules(&active);
        engine.severity_overrides = rules.severity_overrides()?;
        Ok(engine)
    }

    pub fn with_severity_override(mut self, rule: RuleId, severity: Severity) -> Self {
        self.severity_overrides.insert(rule, severity);
        self
    }

    /// Swap the evaluator used for a rule that is already enabled
    pub fn replace_check(&mut self, rule: RuleId, check: CheckFn) -> bool {
        match self.checks.iter_mut().find(|(id, _)| *id == rule) {
            Some(entry) => {
                entry.1 = check;
                true
            }
            None => false,
        }
    }

    pub fn enabled_rules(&self) -> Vec<RuleId> {
        self.checks.iter().map(|(id, _)| *id).collect()
    }

    /// Run every enabled check on a document
    pub fn run(&self, document: &Document, page: &PageContext) -> EngineOutput {
        let mut output = EngineOutput::default();
        for &(rule, check) in &self.checks {
            self.evaluate(rule, page, &mut output, || check(document, page));
        }
        output
    }

    /// Run the page-wide checks of enabled rules over a composed page
    pub fn run_page(&self, parts: &[PagePart<'_>], page: &PageContext) -> EngineOutput {
        let mut output = EngineOutput::default();
        for &(rule, _) in &self.checks {
            if let Some(check) = checks::page_check(rule) {
                self.evaluate(rule, page, &mut output, || Ok(check(parts, page)));
            }
        }
        output
    }

    fn evaluate<F>(&self, rule: RuleId, page: &PageContext, output: &mut EngineOutput, check: F)
    where
        F: FnOnce() -> Result<Vec<Violation>, CheckError>,
    {
        let start = Instant::now();
        let result = panic::catch_unwind(AssertUnwindSafe(check));
        let elapsed = start.elapsed();

        let timing = output.timings.entry(rule).or_default();
        timing.total_time += elapsed;
        timing.evaluation_count += 1;

        let message = match result {
            Ok(Ok(mut violations)) => {
                timing.match_count += violations.len();
                if let Some(&severity) = self.severity_overrides.get(&rule) {
                    for v in &mut violations {
                        v.severity = severity;
                    }
                }
                output.violations.extend(violations);
                return;
            }
            Ok(Err(err)) => err.to_string(),
            Err(payload) => panic_message(payload.as_ref()),
        };

        let fault = CheckFault {
            rule,
            file: page.display_file().cloned(),
            message,
        };
        log::warn!("{}", fault);
        output.faults.push(fault);
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {}", s)
    } else {
        "panicked".to_string()
    }
}

/// Run the selected rules on a document
///
/// Fails only on configuration problems (unknown rule, ignored rule without
/// a reason); check failures are returned as faults.
pub fn run(
    document: &Document,
    page: &PageContext,
    enabled: &[RuleId],
    ignored: &[IgnoredRule],
) -> Result<EngineOutput, ConfigError> {
    let rules = RulesConfig {
        ignored: ignored.to_vec(),
        ..Default::default()
    };
    rules.validate("ignored rules")?;

    let active: Vec<RuleId> = enabled
        .iter()
        .copied()
        .filter(|rule| !ignored.iter().any(|i| i.rule.parse::<RuleId>() == Ok(*rule)))
        .collect();
    Ok(RuleEngine::with_rules(&active).run(document, page))
}
