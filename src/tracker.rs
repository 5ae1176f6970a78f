//! Incremental change tracking
//!
//! Remembers a content signature for every template seen by the last
//! committed scan and decides which pages must be scanned again. A page is
//! affected when its dependency set touches a changed file; a changed file
//! that no page depends on affects every page.
//!
//! Results are committed against the file signatures taken when the scan
//! started. If any of those files changed while the scan ran, the commit is
//! discarded and the next pass picks the change up.

use crate::report::FileError;
use crate::violation::{PageIdentity, Violation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Content signature of one file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSignature {
    /// SHA-256 of the content, hex encoded
    pub hash: String,
    /// Modification time in milliseconds since the epoch
    pub mtime: u64,
    pub size: u64,
}

impl FileSignature {
    pub fn of(path: &Path) -> std::io::Result<Self> {
        let metadata = fs::metadata(path)?;
        let content = fs::read(path)?;
        Ok(Self {
            hash: format!("{:x}", Sha256::digest(&content)),
            mtime: mtime_millis(&metadata),
            size: metadata.len(),
        })
    }

    /// Signature of `path`, reusing `previous` when mtime and size are unchanged
    pub fn refresh(path: &Path, previous: Option<&FileSignature>) -> std::io::Result<Self> {
        if let Some(previous) = previous {
            let metadata = fs::metadata(path)?;
            if previous.mtime == mtime_millis(&metadata) && previous.size == metadata.len() {
                return Ok(previous.clone());
            }
        }
        Self::of(path)
    }
}

fn mtime_millis(metadata: &fs::Metadata) -> u64 {
    metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Last committed state of one file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub signature: FileSignature,
    /// Unix timestamp of the scan that recorded it
    pub scanned_at: u64,
}

/// Last committed state of one page
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageRecord {
    pub identity: PageIdentity,
    pub dependency_set: BTreeSet<PathBuf>,
    /// Results of the last scan
    #[serde(default)]
    pub violations: Vec<Violation>,
    #[serde(default)]
    pub file_errors: Vec<FileError>,
}

/// Everything remembered between scans
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanState {
    pub version: u32,
    /// Keyed by file path
    pub files: BTreeMap<String, FileRecord>,
    /// Keyed by [`PageIdentity::key`]
    pub pages: BTreeMap<String, PageRecord>,
}

impl ScanState {
    /// Bump to invalidate persisted state
    pub const VERSION: u32 = 1;

    pub fn new() -> Self {
        Self {
            version: Self::VERSION,
            ..Default::default()
        }
    }

    /// No scan has been committed yet
    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.pages.is_empty()
    }

    pub fn load(path: &Path) -> Result<Self, std::io::Error> {
        let mut content = Vec::new();
        fs::File::open(path)?.read_to_end(&mut content)?;

        let state: Self = serde_json::from_slice(&content)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        if state.version != Self::VERSION {
            log::info!("Scan state format changed, starting fresh");
            return Ok(Self::new());
        }
        Ok(state)
    }

    pub fn save(&self, path: &Path) -> Result<(), std::io::Error> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_vec_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        fs::File::create(path)?.write_all(&content)
    }

    fn signature(&self, path: &Path) -> Option<&FileSignature> {
        self.files
            .get(path.to_string_lossy().as_ref())
            .map(|r| &r.signature)
    }
}

/// A routable unit and the files it is built from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalPage {
    pub identity: PageIdentity,
    pub primary_template: Option<PathBuf>,
    pub layout_template: Option<PathBuf>,
    /// Primary, layout and every transitively included fragment
    pub dependency_set: BTreeSet<PathBuf>,
}

impl LogicalPage {
    pub fn key(&self) -> String {
        self.identity.key()
    }
}

/// Fresh results for one page
#[derive(Debug, Clone)]
pub struct PageResult {
    pub page: LogicalPage,
    pub violations: Vec<Violation>,
    pub file_errors: Vec<FileError>,
}

impl PageResult {
    pub fn new(page: LogicalPage) -> Self {
        Self {
            page,
            violations: Vec::new(),
            file_errors: Vec::new(),
        }
    }
}

/// How far a change reaches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BlastRadius {
    None,
    SinglePage,
    MultiPage,
    Global,
}

impl BlastRadius {
    fn for_count(pages: usize) -> Self {
        match pages {
            0 => BlastRadius::None,
            1 => BlastRadius::SinglePage,
            _ => BlastRadius::MultiPage,
        }
    }
}

/// Result of comparing the file system against the last committed scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeSet {
    pub changed_files: BTreeSet<PathBuf>,
    pub affected_pages: BTreeSet<PageIdentity>,
    pub blast_radius: BlastRadius,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.affected_pages.is_empty()
    }

    pub fn affects(&self, identity: &PageIdentity) -> bool {
        self.affected_pages.contains(identity)
    }
}

/// Files that are new, modified or gone since the previous state
pub fn changed_files(
    previous: &BTreeMap<String, FileRecord>,
    current: &BTreeMap<PathBuf, FileSignature>,
) -> BTreeSet<PathBuf> {
    let mut changed: BTreeSet<PathBuf> = current
        .iter()
        .filter(|(path, signature)| {
            previous
                .get(path.to_string_lossy().as_ref())
                .map(|record| record.signature.hash != signature.hash)
                .unwrap_or(true)
        })
        .map(|(path, _)| path.clone())
        .collect();

    for path in previous.keys() {
        let path = PathBuf::from(path);
        if !current.contains_key(&path) {
            changed.insert(path);
        }
    }
    changed
}

/// Pages touched by `changed`, and how far the change reaches
///
/// A changed file outside every dependency set may be a helper or a shared
/// style with project-wide effect, so it affects every page.
pub fn classify(
    changed: &BTreeSet<PathBuf>,
    pages: &[LogicalPage],
) -> (BTreeSet<PageIdentity>, BlastRadius) {
    if changed.is_empty() {
        return (BTreeSet::new(), BlastRadius::None);
    }

    let outside = changed
        .iter()
        .any(|file| !pages.iter().any(|p| p.dependency_set.contains(file)));
    if outside {
        let all = pages.iter().map(|p| p.identity.clone()).collect();
        return (all, BlastRadius::Global);
    }

    let affected: BTreeSet<PageIdentity> = pages
        .iter()
        .filter(|p| p.dependency_set.iter().any(|f| changed.contains(f)))
        .map(|p| p.identity.clone())
        .collect();
    let radius = BlastRadius::for_count(affected.len());
    (affected, radius)
}

/// Signatures captured when a scan starts
#[derive(Debug, Clone)]
pub struct ScanTicket {
    signatures: BTreeMap<PathBuf, FileSignature>,
}

impl ScanTicket {
    pub fn files(&self) -> impl Iterator<Item = &Path> {
        self.signatures.keys().map(PathBuf::as_path)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed,
    /// A file changed while the scan ran; its results were dropped
    Discarded { changed: PathBuf },
}

/// Version control query failure; never fatal
#[derive(Debug, Error)]
pub enum VcsError {
    #[error("cannot run git: {0}")]
    Io(#[from] std::io::Error),

    #[error("git {command} failed: {stderr}")]
    Failed { command: String, stderr: String },
}

/// Source of "files with uncommitted changes"
pub trait VcsStatus: Send + Sync {
    /// Absolute paths of files with uncommitted changes
    fn dirty_files(&self) -> Result<BTreeSet<PathBuf>, VcsError>;
}

/// `git status --porcelain` for a set of directories
#[derive(Debug, Clone)]
pub struct GitStatus {
    root: PathBuf,
    dirs: Vec<PathBuf>,
}

impl GitStatus {
    pub fn new(root: impl Into<PathBuf>, dirs: Vec<PathBuf>) -> Self {
        Self {
            root: root.into(),
            dirs,
        }
    }

    fn git(&self, args: &[&str]) -> Result<String, VcsError> {
        let mut command = Command::new("git");
        command.arg("-C").arg(&self.root).args(args);
        let output = command.output()?;
        if !output.status.success() {
            return Err(VcsError::Failed {
                command: args.join(" "),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl VcsStatus for GitStatus {
    fn dirty_files(&self) -> Result<BTreeSet<PathBuf>, VcsError> {
        let toplevel = PathBuf::from(self.git(&["rev-parse", "--show-toplevel"])?.trim());

        let mut args = vec!["status", "--porcelain", "--untracked-files=all", "--"];
        let dirs: Vec<String> = self
            .dirs
            .iter()
            .map(|d| d.to_string_lossy().into_owned())
            .collect();
        args.extend(dirs.iter().map(String::as_str));

        Ok(parse_porcelain(&self.git(&args)?, &toplevel))
    }
}

/// Paths from `git status --porcelain` output, joined onto the repository root
pub fn parse_porcelain(output: &str, toplevel: &Path) -> BTreeSet<PathBuf> {
    output
        .lines()
        .filter(|line| line.len() > 3)
        .map(|line| {
            let path = &line[3..];
            // Renames are reported as `old -> new`
            let path = path.rsplit(" -> ").next().unwrap_or(path);
            toplevel.join(path.trim_matches('"'))
        })
        .collect()
}

/// Decides what to rescan and keeps the scan state
pub struct ChangeTracker {
    state: ScanState,
    state_path: Option<PathBuf>,
    vcs: Option<Box<dyn VcsStatus>>,
    force_full: bool,
    /// Signatures from the latest `changed_since`
    current: BTreeMap<PathBuf, FileSignature>,
}

impl std::fmt::Debug for ChangeTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeTracker")
            .field("state_path", &self.state_path)
            .field("files", &self.state.files.len())
            .field("pages", &self.state.pages.len())
            .field("force_full", &self.force_full)
            .finish()
    }
}

impl Default for ChangeTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeTracker {
    /// Tracker that keeps state in memory only
    pub fn new() -> Self {
        Self {
            state: ScanState::new(),
            state_path: None,
            vcs: None,
            force_full: false,
            current: BTreeMap::new(),
        }
    }

    /// Tracker backed by a state file; unreadable state starts fresh
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let state = if path.exists() {
            ScanState::load(&path).unwrap_or_else(|e| {
                log::warn!("Cannot load scan state {}: {}", path.display(), e);
                ScanState::new()
            })
        } else {
            ScanState::new()
        };
        Self {
            state,
            state_path: Some(path),
            ..Self::new()
        }
    }

    pub fn with_vcs(mut self, vcs: Box<dyn VcsStatus>) -> Self {
        self.vcs = Some(vcs);
        self
    }

    pub fn state(&self) -> &ScanState {
        &self.state
    }

    /// Make the next `changed_since` report every page
    pub fn force_full_scan(&mut self) {
        self.force_full = true;
    }

    /// Compare `files` against the last committed scan
    pub fn changed_since(&mut self, files: &[PathBuf], pages: &[LogicalPage]) -> ChangeSet {
        let dirty = self.dirty_files();

        let mut current = BTreeMap::new();
        for path in files {
            let previous = if is_dirty(&dirty, path) {
                None
            } else {
                self.state.signature(path)
            };
            match FileSignature::refresh(path, previous) {
                Ok(signature) => {
                    current.insert(path.clone(), signature);
                }
                Err(e) => log::debug!("Cannot sign {}: {}", path.display(), e),
            }
        }

        let changed = changed_files(&self.state.files, &current);
        self.current = current;

        if self.force_full || self.state.is_empty() {
            log::debug!(
                "Full scan ({})",
                if self.force_full { "forced" } else { "no previous state" }
            );
            let mut changed_files = changed;
            changed_files.extend(self.current.keys().cloned());
            return ChangeSet {
                changed_files,
                affected_pages: pages.iter().map(|p| p.identity.clone()).collect(),
                blast_radius: BlastRadius::Global,
            };
        }

        // A page is also affected by files it depended on last time
        let known: Vec<LogicalPage> = pages
            .iter()
            .map(|page| {
                let mut page = page.clone();
                if let Some(record) = self.state.pages.get(&page.key()) {
                    page.dependency_set.extend(record.dependency_set.iter().cloned());
                }
                page
            })
            .collect();

        let (mut affected, mut radius) = classify(&changed, &known);
        if radius != BlastRadius::Global {
            let unseen = pages
                .iter()
                .filter(|p| !self.state.pages.contains_key(&p.key()))
                .map(|p| p.identity.clone());
            affected.extend(unseen);
            radius = BlastRadius::for_count(affected.len());
        }

        log::debug!(
            "{} changed file(s), {} affected page(s), {:?}",
            changed.len(),
            affected.len(),
            radius
        );
        ChangeSet {
            changed_files: changed,
            affected_pages: affected,
            blast_radius: radius,
        }
    }

    fn dirty_files(&self) -> BTreeSet<PathBuf> {
        match &self.vcs {
            Some(vcs) => vcs.dirty_files().unwrap_or_else(|e| {
                log::debug!("Ignoring version control status: {}", e);
                BTreeSet::new()
            }),
            None => BTreeSet::new(),
        }
    }

    /// Capture the signatures the coming scan is based on
    pub fn begin_scan(&self) -> ScanTicket {
        ScanTicket {
            signatures: self.current.clone(),
        }
    }

    /// Record scan results unless a scanned file changed in the meantime
    ///
    /// Content is hashed again here; an edit that keeps size and mtime
    /// still discards the pass.
    pub fn commit(&mut self, ticket: ScanTicket, results: Vec<PageResult>) -> CommitOutcome {
        for (path, signature) in &ticket.signatures {
            match FileSignature::of(path) {
                Ok(now) if now.hash == signature.hash => {}
                _ => {
                    log::info!("{} changed during the scan, discarding results", path.display());
                    // Forget it so the next pass hashes it instead of trusting mtime
                    self.state.files.remove(path.to_string_lossy().as_ref());
                    return CommitOutcome::Discarded {
                        changed: path.clone(),
                    };
                }
            }
        }

        let scanned_at = now_secs();
        self.state.files = ticket
            .signatures
            .into_iter()
            .map(|(path, signature)| {
                let key = path.to_string_lossy().into_owned();
                (key, FileRecord { signature, scanned_at })
            })
            .collect();
        for result in results {
            self.record_page(result);
        }
        self.force_full = false;
        CommitOutcome::Committed
    }

    /// Remember the latest results of one page
    pub fn record_page(&mut self, result: PageResult) {
        self.state.pages.insert(
            result.page.key(),
            PageRecord {
                identity: result.page.identity,
                dependency_set: result.page.dependency_set,
                violations: result.violations,
                file_errors: result.file_errors,
            },
        );
    }

    /// Drop pages that are no longer part of the project
    pub fn retain_pages(&mut self, pages: &[LogicalPage]) {
        let keys: BTreeSet<String> = pages.iter().map(LogicalPage::key).collect();
        self.state.pages.retain(|key, _| keys.contains(key));
    }

    /// The last committed scan of a page
    pub fn cached(&self, identity: &PageIdentity) -> Option<&PageRecord> {
        self.state.pages.get(&identity.key())
    }

    /// Write the state file, if there is one
    pub fn save(&self) -> Result<(), std::io::Error> {
        match &self.state_path {
            Some(path) => self.state.save(path),
            None => Ok(()),
        }
    }
}

fn is_dirty(dirty: &BTreeSet<PathBuf>, path: &Path) -> bool {
    if dirty.is_empty() {
        return false;
    }
    let absolute = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    dirty.contains(&absolute)
}
