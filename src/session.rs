//! Scan session
//!
//! Owns the shared structures (template graph, change tracker) and drives one
//! pass: rebuild the graph, ask the tracker what changed, scan the affected
//! pages in parallel, then commit. Only this type writes the graph or the
//! tracker, and never while workers are running.

use crate::checks::PagePart;
use crate::config::{Config, ConfigError};
use crate::engine::EngineOutput;
use crate::report::ScanReport;
use crate::resolver::{normalize_path, Resolution, StaticRoutes, TemplateGraph, ViewResolver};
use crate::scanner::{ScanJob, Scanner};
use crate::tracker::{ChangeSet, ChangeTracker, CommitOutcome, GitStatus, PageResult};
use crate::violation::{PageContext, PageIdentity, TemplateKind};
use globset::GlobSet;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Which pages a pass scans
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanMode {
    /// Every requested page
    Full,
    /// Only pages whose dependencies changed since the last commit
    Incremental,
}

/// Outcome of one pass
#[derive(Debug, Clone)]
pub struct SessionRun {
    /// Fresh results for affected pages and remembered results for the rest
    pub report: ScanReport,
    pub changes: ChangeSet,
    pub outcome: CommitOutcome,
}

impl SessionRun {
    /// A scanned file changed during the pass; the report must not be shown
    pub fn is_stale(&self) -> bool {
        matches!(self.outcome, CommitOutcome::Discarded { .. })
    }
}

/// The driving loop's state
pub struct ScanSession {
    root: PathBuf,
    config: Config,
    scanner: Scanner,
    routes: StaticRoutes,
    exclude: GlobSet,
    graph: TemplateGraph,
    tracker: ChangeTracker,
}

impl ScanSession {
    /// Validate configuration and prepare a session; nothing is scanned yet
    pub fn new(root: impl Into<PathBuf>, config: Config) -> Result<Self, ConfigError> {
        let root = root.into();
        config.validate()?;

        let scanner = Scanner::from_config(&config)?;
        let routes = StaticRoutes::from_config(&config.routes)?;
        let exclude = config.files.exclude_set()?;

        let mut tracker = if config.state.enabled {
            let path = config.state.state_path(&root);
            log::debug!("Scan state at {}", path.display());
            ChangeTracker::open(path)
        } else {
            ChangeTracker::new()
        };
        if config.state.use_vcs {
            let dirs = vec![config.project.views_dir(&root)];
            tracker = tracker.with_vcs(Box::new(GitStatus::new(&root, dirs)));
        }

        Ok(Self {
            root,
            config,
            scanner,
            routes,
            exclude,
            graph: TemplateGraph::default(),
            tracker,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn graph(&self) -> &TemplateGraph {
        &self.graph
    }

    pub fn tracker(&self) -> &ChangeTracker {
        &self.tracker
    }

    /// Make the next pass scan everything
    pub fn force_full_scan(&mut self) {
        self.tracker.force_full_scan();
    }

    /// Rebuild the inclusion graph from disk
    pub fn refresh(&mut self) {
        let start = Instant::now();
        self.graph = TemplateGraph::build(&self.config.project, &self.root, &self.exclude);
        log::debug!(
            "Template graph: {} template(s) in {:.2}ms",
            self.graph.len(),
            start.elapsed().as_secs_f64() * 1000.0
        );
    }

    /// Resolve targets; no targets means every view in the project
    pub fn resolve(&self, targets: &[PageIdentity]) -> Vec<Resolution> {
        let resolver = ViewResolver::new(&self.graph, &self.routes);
        if targets.is_empty() {
            return resolver.resolve_all_views();
        }
        targets.iter().map(|t| resolver.resolve(t)).collect()
    }

    /// One pass over `targets`
    pub fn run(&mut self, targets: &[PageIdentity], mode: ScanMode) -> SessionRun {
        let start = Instant::now();
        self.refresh();

        let resolutions = self.resolve(targets);
        let pages: Vec<_> = resolutions.iter().map(Resolution::to_logical_page).collect();

        let mut files: BTreeSet<PathBuf> = self
            .graph
            .templates()
            .map(|(_, node)| node.path.clone())
            .collect();
        files.extend(pages.iter().flat_map(|p| p.dependency_set.iter().cloned()));
        let files: Vec<PathBuf> = files.into_iter().collect();

        if mode == ScanMode::Full {
            self.tracker.force_full_scan();
        }
        let changes = self.tracker.changed_since(&files, &pages);
        let ticket = self.tracker.begin_scan();

        // Workers only read from here on
        let (jobs, owners) = self.jobs(&resolutions, &changes);
        let fresh = self.scanner.scan_jobs(&jobs);

        let mut results: Vec<PageResult> = pages
            .iter()
            .filter(|p| changes.affects(&p.identity))
            .cloned()
            .map(PageResult::new)
            .collect();
        let slot: HashMap<PageIdentity, usize> = results
            .iter()
            .enumerate()
            .map(|(i, r)| (r.page.identity.clone(), i))
            .collect();
        for violation in &fresh.violations {
            if let Some(&i) = slot.get(&violation.page_context.identity) {
                results[i].violations.push(violation.clone());
            }
        }
        for error in &fresh.file_errors {
            let owner = owners.get(&error.path).and_then(|id| slot.get(id));
            if let Some(&i) = owner {
                results[i].file_errors.push(error.clone());
            }
        }

        let page_wide = self.page_wide(&resolutions, &slot, &fresh);

        let mut report = ScanReport {
            faults: fresh.faults,
            files_scanned: fresh.files_scanned,
            timings: fresh.timings,
            ..Default::default()
        };
        for (i, output) in page_wide {
            results[i].violations.extend(output.violations);
            report.faults.extend(output.faults);
            for (rule, timing) in output.timings {
                report.timings.entry(rule).or_default().merge(&timing);
            }
        }
        for resolution in &resolutions {
            if let Some(ambiguity) = &resolution.ambiguity {
                report.unresolved.push(ambiguity.clone());
            }
        }

        // Report in page order, fresh where affected, remembered elsewhere
        let mut seen = BTreeSet::new();
        let mut shared = HashSet::new();
        for page in &pages {
            if !seen.insert(page.identity.clone()) {
                continue;
            }
            let (violations, file_errors) = if let Some(&i) = slot.get(&page.identity) {
                (&results[i].violations, &results[i].file_errors)
            } else if let Some(record) = self.tracker.cached(&page.identity) {
                (&record.violations, &record.file_errors)
            } else {
                continue;
            };
            // A shared template can be owned by a fresh page and a remembered one
            for violation in violations {
                if let Some(fragment) = &violation.page_context.fragment_file {
                    let key = (
                        violation.rule_id,
                        fragment.clone(),
                        violation.source_line,
                        violation.element_context.column,
                        violation.message.clone(),
                    );
                    if !shared.insert(key) {
                        continue;
                    }
                }
                report.violations.push(violation.clone());
            }
            for error in file_errors {
                if !report.file_errors.contains(error) {
                    report.file_errors.push(error.clone());
                }
            }
        }

        let outcome = self.tracker.commit(ticket, results);
        if outcome == CommitOutcome::Committed {
            if targets.is_empty() {
                self.tracker.retain_pages(&pages);
            }
            if let Err(e) = self.tracker.save() {
                log::warn!("Cannot save scan state: {}", e);
            }
        }

        report.duration = start.elapsed();
        log::info!(
            "{} page(s), {} affected ({:?}), {} template(s) scanned",
            pages.len(),
            changes.affected_pages.len(),
            changes.blast_radius,
            report.files_scanned
        );
        SessionRun {
            report,
            changes,
            outcome,
        }
    }

    /// [`ScanSession::run`], rescanning while a pass goes stale
    ///
    /// Gives up after `retries` rescans; `None` means no pass committed and
    /// there is nothing safe to show.
    pub fn run_settled(
        &mut self,
        targets: &[PageIdentity],
        mode: ScanMode,
        retries: usize,
    ) -> Option<SessionRun> {
        settle(retries, || self.run(targets, mode))
    }

    /// Scan jobs for affected pages; each template is scanned once
    ///
    /// A template shared by several pages is scanned in the context of the
    /// first page that renders it. Returns the jobs and which page owns
    /// each template.
    fn jobs(
        &self,
        resolutions: &[Resolution],
        changes: &ChangeSet,
    ) -> (Vec<ScanJob>, HashMap<PathBuf, PageIdentity>) {
        let mut jobs = Vec::new();
        let mut owners: HashMap<PathBuf, PageIdentity> = HashMap::new();

        for resolution in resolutions {
            if !changes.affects(&resolution.identity) {
                continue;
            }
            let Some(primary) = &resolution.primary_template else {
                continue;
            };

            let mut templates: Vec<(PathBuf, PageContext)> =
                vec![(primary.clone(), resolution.page_context())];
            for other in resolution.layout_template.iter().chain(&resolution.fragments) {
                let context = resolution.fragment_context(other, self.kind_of(other));
                templates.push((other.clone(), context));
            }

            for (path, context) in templates {
                if owners.contains_key(&path) {
                    continue;
                }
                owners.insert(path.clone(), resolution.identity.clone());
                jobs.push(ScanJob::new(path, context));
            }
        }
        (jobs, owners)
    }

    /// Page-wide checks for each affected page, keyed by result slot
    ///
    /// Runs over the layout, the view and its partials in render order,
    /// using the outlines of this pass's scan.
    fn page_wide(
        &self,
        resolutions: &[Resolution],
        slot: &HashMap<PageIdentity, usize>,
        fresh: &ScanReport,
    ) -> Vec<(usize, EngineOutput)> {
        let mut done = HashSet::new();
        let mut outputs = Vec::new();
        for resolution in resolutions {
            let Some(&i) = slot.get(&resolution.identity) else {
                continue;
            };
            let Some(primary) = &resolution.primary_template else {
                continue;
            };
            if !done.insert(i) {
                continue;
            }

            let parts: Vec<PagePart<'_>> = resolution
                .layout_template
                .iter()
                .chain(std::iter::once(primary))
                .chain(&resolution.fragments)
                .filter_map(|path| {
                    let outline = fresh.outlines.get(path)?;
                    Some(PagePart {
                        file: path.as_path(),
                        outline,
                        primary: path == primary,
                    })
                })
                .collect();
            let output = self
                .scanner
                .engine()
                .run_page(&parts, &resolution.page_context());
            outputs.push((i, output));
        }
        outputs
    }

    fn kind_of(&self, path: &Path) -> TemplateKind {
        match self.graph.get(path) {
            Some(id) => self.graph.node(id).kind,
            None => crate::resolver::template_kind(path, self.graph.layouts_dir()),
        }
    }

    /// Check already-rendered markup for a route
    pub fn run_rendered(&mut self, route: &str, rendered: &Path) -> ScanReport {
        self.refresh();
        let identity = PageIdentity::Route(route.to_string());
        let resolution = ViewResolver::new(&self.graph, &self.routes).resolve(&identity);

        let mut report = match std::fs::read_to_string(rendered) {
            Ok(markup) => self.scanner.scan_rendered(
                rendered,
                &markup,
                &resolution.page_context(),
                &resolution.fragments,
            ),
            Err(e) => ScanReport {
                file_errors: vec![crate::report::FileError::read(rendered, &e)],
                files_scanned: 1,
                ..Default::default()
            },
        };
        report.unresolved.extend(resolution.ambiguity);
        report
    }
}

/// Repeat `scan` while its pass is stale, at most `retries` more times
fn settle<F>(retries: usize, mut scan: F) -> Option<SessionRun>
where
    F: FnMut() -> SessionRun,
{
    let mut run = scan();
    for _ in 0..retries {
        if !run.is_stale() {
            break;
        }
        log::info!("Templates changed during the scan, rescanning");
        run = scan();
    }
    (!run.is_stale()).then_some(run)
}

/// Page identities for command-line targets
///
/// Arguments starting with `/` are routes; everything else is a template path.
pub fn targets_from_args(args: &[String]) -> Vec<PageIdentity> {
    args.iter()
        .map(|arg| {
            if arg.starts_with('/') && !Path::new(arg).exists() {
                PageIdentity::Route(arg.clone())
            } else {
                PageIdentity::File(normalize_path(Path::new(arg)))
            }
        })
        .collect()
}
