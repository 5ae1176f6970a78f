//! viewlint - static accessibility analysis for view templates
//!
//! Checks server-side templates (ERB-style `<% %>` markers embedded in HTML)
//! for accessibility problems without rendering them.
//!
//! # Architecture
//!
//! ```text
//! CLI/API -> ScanSession -> ViewResolver -> Scanner -> extract -> markup -> RuleEngine -> checks
//!                 |                                                                  |
//!                 +-------------------- ChangeTracker <---------- ScanReport <-------+
//! ```
//!
//! The session rebuilds the template inclusion graph, asks the change tracker
//! which pages are affected since the last commit, scans their templates in
//! parallel and commits the results. Violations are attributed to the
//! template (layout, view or partial) that produced the offending element.
//!
//! # Example
//!
//! ```no_run
//! use viewlint::{Config, ScanMode, ScanSession};
//!
//! let config = Config::load_default(".".as_ref()).unwrap();
//! let mut session = ScanSession::new(".", config).unwrap();
//! let run = session.run(&[], ScanMode::Full);
//! std::process::exit(run.report.exit_code());
//! ```

pub mod checks;
pub mod config;
pub mod engine;
pub mod extract;
pub mod markup;
pub mod output;
pub mod report;
pub mod resolver;
pub mod rule;
pub mod scanner;
pub mod session;
pub mod tracker;
pub mod violation;
pub mod watch;

// Re-export main types
pub use config::{Config, ConfigError};
pub use engine::{CheckFault, RuleEngine, RuleTiming};
pub use extract::{extract, ExtractionError, PositionMap, DYNAMIC_PLACEHOLDER};
pub use markup::{Document, MarkupError};
pub use report::{FileError, ScanReport, Summary};
pub use resolver::{ResolutionAmbiguity, TemplateGraph, ViewResolver};
pub use rule::RuleId;
pub use scanner::Scanner;
pub use session::{ScanMode, ScanSession, SessionRun};
pub use tracker::{BlastRadius, ChangeSet, ChangeTracker};
pub use violation::{ElementContext, PageContext, PageIdentity, Severity, TemplateKind, Violation};
pub use watch::Watcher;
