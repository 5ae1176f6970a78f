//! Per-file analysis pipeline
//!
//! extract -> parse -> rule engine, for one template or a batch of them.
//! Each file is independent, so batches run on a rayon pool. Nothing shared
//! is written during a batch.

use crate::checks::Outline;
use crate::config::{Config, ConfigError, EngineConfig};
use crate::engine::RuleEngine;
use crate::extract::extract;
use crate::markup::Document;
use crate::report::{FileError, ScanReport};
use crate::resolver::{attribute, Attribution};
use crate::violation::PageContext;
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// One template to analyze, with the page it belongs to
#[derive(Debug, Clone)]
pub struct ScanJob {
    pub path: PathBuf,
    pub page: PageContext,
}

impl ScanJob {
    pub fn new(path: impl Into<PathBuf>, page: PageContext) -> Self {
        Self {
            path: path.into(),
            page,
        }
    }
}

/// Runs the rule engine over templates
#[derive(Debug, Default)]
pub struct Scanner {
    engine: RuleEngine,
    settings: EngineConfig,
}

impl Scanner {
    pub fn new(engine: RuleEngine) -> Self {
        Self {
            engine,
            settings: EngineConfig::default(),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        Ok(Self {
            engine: RuleEngine::from_config(&config.rules)?,
            settings: config.engine.clone(),
        })
    }

    /// Run batches on the calling thread
    pub fn sequential(mut self) -> Self {
        self.settings.parallel = false;
        self
    }

    pub fn engine(&self) -> &RuleEngine {
        &self.engine
    }

    /// Analyze template source
    ///
    /// Malformed templates become file errors; `path` names the file in them.
    pub fn scan_source(&self, path: &Path, source: &str, page: &PageContext) -> ScanReport {
        let start = Instant::now();
        let mut report = ScanReport {
            files_scanned: 1,
            ..Default::default()
        };

        let extraction = match extract(source) {
            Ok(extraction) => extraction,
            Err(e) => {
                log::warn!("{}: {}", path.display(), e);
                report.file_errors.push(FileError::extraction(path, &e));
                return report;
            }
        };

        let document = match Document::parse(&extraction.markup, &extraction.map) {
            Ok(document) => document,
            Err(e) => {
                log::warn!("{}: {}", path.display(), e);
                report.file_errors.push(FileError::markup(path, &e));
                return report;
            }
        };

        report.absorb(self.engine.run(&document, page));
        report
            .outlines
            .insert(path.to_path_buf(), Outline::of(&document));
        log::debug!(
            "Scanned {} in {:.2}ms ({} violations)",
            path.display(),
            start.elapsed().as_secs_f64() * 1000.0,
            report.violations.len()
        );
        report
    }

    /// Read and analyze one template
    pub fn scan_file(&self, path: &Path, page: &PageContext) -> ScanReport {
        match std::fs::read_to_string(path) {
            Ok(source) => self.scan_source(path, &source, page),
            Err(e) => {
                log::warn!("Cannot read {}: {}", path.display(), e);
                ScanReport {
                    file_errors: vec![FileError::read(path, &e)],
                    files_scanned: 1,
                    ..Default::default()
                }
            }
        }
    }

    /// Analyze a batch; results keep the order of `jobs`
    pub fn scan_jobs(&self, jobs: &[ScanJob]) -> ScanReport {
        let start = Instant::now();
        log::info!("Scanning {} template(s)", jobs.len());

        let results: Vec<ScanReport> = if self.settings.parallel && jobs.len() > 1 {
            match rayon::ThreadPoolBuilder::new()
                .num_threads(self.settings.worker_count())
                .build()
            {
                Ok(pool) => pool.install(|| {
                    jobs.par_iter()
                        .map(|job| self.scan_file(&job.path, &job.page))
                        .collect()
                }),
                Err(e) => {
                    log::warn!("Cannot start worker pool, scanning sequentially: {}", e);
                    self.scan_sequential(jobs)
                }
            }
        } else {
            self.scan_sequential(jobs)
        };

        let mut combined = ScanReport::default();
        for result in results {
            combined.merge(result);
        }
        combined.duration = start.elapsed();
        log::info!(
            "Scanned {} template(s) in {:.2}s",
            combined.files_scanned,
            combined.duration.as_secs_f64()
        );
        combined
    }

    fn scan_sequential(&self, jobs: &[ScanJob]) -> Vec<ScanReport> {
        jobs.iter()
            .map(|job| self.scan_file(&job.path, &job.page))
            .collect()
    }

    /// Analyze markup that was already rendered
    ///
    /// There is no position map back to a template, so violations carry no
    /// source line. Each one is attributed to a fragment by naming heuristics
    /// when a single fragment fits.
    pub fn scan_rendered(
        &self,
        path: &Path,
        markup: &str,
        page: &PageContext,
        fragments: &[PathBuf],
    ) -> ScanReport {
        let mut report = ScanReport {
            files_scanned: 1,
            ..Default::default()
        };

        let document = match Document::parse_html(markup) {
            Ok(document) => document,
            Err(e) => {
                log::warn!("{}: {}", path.display(), e);
                report.file_errors.push(FileError::markup(path, &e));
                return report;
            }
        };

        let mut output = self.engine.run(&document, page);
        output.violations = output
            .violations
            .into_iter()
            .map(|violation| {
                let mut violation = violation.without_source_line();
                match attribute(&violation.element_context, fragments) {
                    Attribution::Fragment(fragment) => {
                        log::debug!(
                            "Attributed {} on <{}> to {}",
                            violation.rule_id,
                            violation.element_context.tag,
                            fragment.display()
                        );
                        violation.page_context.fragment_file = Some(fragment);
                    }
                    Attribution::Primary | Attribution::Unknown => {}
                }
                violation
            })
            .collect();
        report.absorb(output);
        report
    }
}
