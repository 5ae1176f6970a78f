//! Configuration system
//!
//! Reads configuration from the first of:
//! - `.viewlint.yml` / `.viewlint.yaml` / `.viewlint.json`
//! - `config/viewlint.yml`
//!
//! in the project root. Configuration problems are reported before any
//! scanning starts.

use crate::rule::RuleId;
use crate::violation::Severity;
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File names searched for, in order
pub const CONFIG_FILE_NAMES: &[&str] = &[
    ".viewlint.yml",
    ".viewlint.yaml",
    ".viewlint.json",
    "config/viewlint.yml",
];

/// Configuration error
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid glob pattern: {0}")]
    Pattern(#[from] globset::Error),

    #[error("Unknown rule '{rule}' in {section}")]
    UnknownRule { rule: String, section: String },

    #[error("Ignored rule '{rule}' needs a non-empty reason")]
    MissingReason { rule: String },

    #[error("Unknown profile '{0}'")]
    UnknownProfile(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Enable parallel processing
    pub parallel: bool,

    /// Number of parallel jobs (0 = auto-detect)
    pub jobs: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            parallel: true,
            jobs: 0,
        }
    }
}

impl EngineConfig {
    /// Worker count after auto-detection
    pub fn worker_count(&self) -> usize {
        if self.jobs > 0 {
            self.jobs
        } else {
            num_cpus::get()
        }
    }
}

/// Where templates live
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    /// Template root, relative to the project root
    pub views_dir: PathBuf,

    /// Layout directory (default: `<views_dir>/layouts`)
    pub layouts_dir: Option<PathBuf>,

    /// Template file suffixes
    pub extensions: Vec<String>,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            views_dir: PathBuf::from("app/views"),
            layouts_dir: None,
            extensions: vec!["html.erb".to_string(), "erb".to_string()],
        }
    }
}

impl ProjectConfig {
    pub fn views_dir(&self, root: &Path) -> PathBuf {
        root.join(&self.views_dir)
    }

    pub fn layouts_dir(&self, root: &Path) -> PathBuf {
        match &self.layouts_dir {
            Some(dir) => root.join(dir),
            None => self.views_dir(root).join("layouts"),
        }
    }

    /// Whether a path looks like a template
    pub fn is_template(&self, path: &Path) -> bool {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return false;
        };
        self.extensions
            .iter()
            .any(|ext| name.ends_with(&format!(".{}", ext.trim_start_matches('.'))))
    }
}

/// File handling settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FilesConfig {
    /// Exclude patterns
    pub exclude: Vec<String>,
}

impl FilesConfig {
    pub fn exclude_set(&self) -> Result<GlobSet, ConfigError> {
        let mut builder = GlobSetBuilder::new();
        for pattern in &self.exclude {
            builder.add(Glob::new(pattern)?);
        }
        Ok(builder.build()?)
    }
}

/// A rule switched off on purpose
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IgnoredRule {
    pub rule: String,
    #[serde(default)]
    pub reason: String,
}

impl IgnoredRule {
    pub fn new(rule: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            rule: rule.into(),
            reason: reason.into(),
        }
    }
}

/// Rule configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    /// Enabled rules (empty = all)
    pub enabled: Vec<String>,

    /// Disabled rules
    pub disabled: Vec<String>,

    /// Ignored rules, each with a reason
    pub ignored: Vec<IgnoredRule>,

    /// Severity overrides (rule_id -> severity)
    pub severity: HashMap<String, Severity>,
}

impl RulesConfig {
    /// Merge another rules section into this one (other takes precedence)
    pub fn merge(&mut self, other: RulesConfig) {
        if !other.enabled.is_empty() {
            self.enabled = other.enabled;
        }
        self.disabled.extend(other.disabled);
        self.ignored.extend(other.ignored);
        self.severity.extend(other.severity);
    }

    /// Check references and reasons
    pub fn validate(&self, section: &str) -> Result<(), ConfigError> {
        let check = |rule: &str, field: &str| -> Result<RuleId, ConfigError> {
            rule.parse::<RuleId>()
                .map_err(|_| ConfigError::UnknownRule {
                    rule: rule.to_string(),
                    section: format!("{}.{}", section, field),
                })
        };

        for rule in &self.enabled {
            check(rule, "enabled")?;
        }
        for rule in &self.disabled {
            check(rule, "disabled")?;
        }
        for ignored in &self.ignored {
            check(&ignored.rule, "ignored")?;
            if ignored.reason.trim().is_empty() {
                return Err(ConfigError::MissingReason {
                    rule: ignored.rule.clone(),
                });
            }
        }
        for rule in self.severity.keys() {
            check(rule, "severity")?;
        }
        Ok(())
    }

    /// Rules that run: enabled (or all), minus disabled and ignored
    pub fn active_rules(&self) -> Result<Vec<RuleId>, ConfigError> {
        self.validate("rules")?;
        let parse = |s: &String| s.parse::<RuleId>().ok();

        let enabled: Vec<RuleId> = if self.enabled.is_empty() {
            RuleId::ALL.to_vec()
        } else {
            self.enabled.iter().filter_map(parse).collect()
        };
        let disabled: Vec<RuleId> = self.disabled.iter().filter_map(parse).collect();
        let ignored: Vec<RuleId> = self
            .ignored
            .iter()
            .filter_map(|i| i.rule.parse::<RuleId>().ok())
            .collect();

        Ok(RuleId::ALL
            .iter()
            .copied()
            .filter(|r| enabled.contains(r) && !disabled.contains(r) && !ignored.contains(r))
            .collect())
    }

    pub fn severity_overrides(&self) -> Result<HashMap<RuleId, Severity>, ConfigError> {
        self.severity
            .iter()
            .map(|(rule, severity)| {
                rule.parse::<RuleId>()
                    .map(|id| (id, *severity))
                    .map_err(|_| ConfigError::UnknownRule {
                        rule: rule.clone(),
                        section: "rules.severity".to_string(),
                    })
            })
            .collect()
    }
}

/// Output settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Output format
    pub format: OutputFormat,

    /// Color mode
    pub color: ColorMode,
}

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "human" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Unknown output format: {}", s)),
        }
    }
}

/// Color mode options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorMode {
    #[default]
    Auto,
    Always,
    Never,
}

/// Scan state persistence
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StateConfig {
    /// Persist scan state between runs
    pub enabled: bool,

    /// State file (default: per-project file in the user cache directory)
    pub path: Option<PathBuf>,

    /// Ask git for files with uncommitted changes
    pub use_vcs: bool,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: None,
            use_vcs: true,
        }
    }
}

impl StateConfig {
    /// Resolve the state file for a project
    pub fn state_path(&self, root: &Path) -> PathBuf {
        if let Some(path) = &self.path {
            return root.join(path);
        }
        let key = {
            let canonical = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
            let digest = Sha256::digest(canonical.to_string_lossy().as_bytes());
            format!("{:x}", digest)[..16].to_string()
        };
        match dirs::cache_dir() {
            Some(cache) => cache.join("viewlint").join(key).join("state.json"),
            None => root.join(".viewlint-state.json"),
        }
    }
}

/// Watch mode settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Debounce window for file events
    pub debounce_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self { debounce_ms: 300 }
    }
}

/// Named overlay selected with `--profile`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Profile {
    pub rules: RulesConfig,
    pub output: Option<OutputConfig>,
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Engine settings
    pub engine: EngineConfig,

    /// Template layout
    pub project: ProjectConfig,

    /// File handling settings
    pub files: FilesConfig,

    /// Rule configuration
    pub rules: RulesConfig,

    /// Output settings
    pub output: OutputConfig,

    /// Scan state persistence
    pub state: StateConfig,

    /// Watch mode
    pub watch: WatchConfig,

    /// Route pattern -> `controller#action`
    pub routes: BTreeMap<String, String>,

    /// Named profiles
    pub profiles: BTreeMap<String, Profile>,
}

impl Config {
    /// Create default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content, path)
    }

    fn parse(content: &str, path: &Path) -> Result<Self, ConfigError> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        match ext {
            "yaml" | "yml" => Ok(serde_yaml::from_str(content)?),
            "json" => Ok(serde_json::from_str(content)?),
            _ => Err(ConfigError::Invalid(format!(
                "Unknown config file format: {}",
                ext
            ))),
        }
    }

    /// Find the configuration file for a project root
    pub fn discover(root: &Path) -> Option<PathBuf> {
        CONFIG_FILE_NAMES
            .iter()
            .map(|name| root.join(name))
            .find(|path| path.is_file())
    }

    /// Load configuration from the default locations, or defaults
    pub fn load_default(root: &Path) -> Result<Self, ConfigError> {
        match Self::discover(root) {
            Some(path) => {
                log::debug!("Loading configuration from {}", path.display());
                Self::load(&path)
            }
            None => Ok(Self::default()),
        }
    }

    /// Apply a named profile on top of this configuration
    pub fn with_profile(mut self, name: &str) -> Result<Self, ConfigError> {
        let profile = self
            .profiles
            .get(name)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownProfile(name.to_string()))?;
        self.rules.merge(profile.rules);
        if let Some(output) = profile.output {
            self.output = output;
        }
        Ok(self)
    }

    /// Merge CLI arguments into configuration
    pub fn merge_cli(&mut self, format: Option<OutputFormat>, jobs: Option<usize>, no_state: bool) {
        if let Some(f) = format {
            self.output.format = f;
        }
        if let Some(j) = jobs {
            self.engine.jobs = j;
        }
        if no_state {
            self.state.enabled = false;
        }
    }

    /// Reject unknown rules, reasonless ignores and bad patterns
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.rules.validate("rules")?;
        for (name, profile) in &self.profiles {
            profile.rules.validate(&format!("profiles.{}.rules", name))?;
        }
        self.files.exclude_set()?;
        for (pattern, target) in &self.routes {
            if !target.contains('#') {
                return Err(ConfigError::Invalid(format!(
                    "Route '{}' must map to controller#action, got '{}'",
                    pattern, target
                )));
            }
        }
        Ok(())
    }

    /// Check if a rule runs under this configuration
    pub fn is_rule_enabled(&self, rule: RuleId) -> bool {
        self.rules
            .active_rules()
            .map(|rules| rules.contains(&rule))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.engine.parallel);
        assert_eq!(config.engine.jobs, 0);
        assert_eq!(config.project.views_dir, PathBuf::from("app/views"));
        assert_eq!(config.watch.debounce_ms, 300);
        assert_eq!(config.output.format, OutputFormat::Text);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_output_format_from_str() {
        assert_eq!("json".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert_eq!("TEXT".parse::<OutputFormat>().unwrap(), OutputFormat::Text);
        assert!("sarif".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_yaml_deserialize() {
        let yaml = r#"
engine:
  jobs: 4
project:
  views_dir: views
rules:
  disabled: [table-headers]
  ignored:
    - rule: image-alt
      reason: Icons are decorative in the admin area
  severity:
    dialog-focus: warning
routes:
  "/login": "sessions#new"
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.engine.jobs, 4);
        assert_eq!(config.project.views_dir, PathBuf::from("views"));
        assert_eq!(config.rules.ignored.len(), 1);
        assert_eq!(config.routes["/login"], "sessions#new");
        assert!(config.validate().is_ok());

        let active = config.rules.active_rules().unwrap();
        assert!(!active.contains(&RuleId::TableHeaders));
        assert!(!active.contains(&RuleId::ImageAlt));
        assert_eq!(active.len(), 9);

        let overrides = config.rules.severity_overrides().unwrap();
        assert_eq!(overrides[&RuleId::DialogFocus], Severity::Warning);
    }

    #[test]
    fn test_ignored_rule_requires_reason() {
        let mut config = Config::default();
        config.rules.ignored.push(IgnoredRule::new("image-alt", "  "));
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::MissingReason { ref rule } if rule == "image-alt"));
    }

    #[test]
    fn test_unknown_rule_is_rejected() {
        let mut config = Config::default();
        config.rules.disabled.push("no-such-rule".to_string());
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::UnknownRule { ref section, .. } if section == "rules.disabled"
        ));
    }

    #[test]
    fn test_unknown_rule_in_profile() {
        let mut config = Config::default();
        let mut profile = Profile::default();
        profile.rules.severity.insert("bogus".to_string(), Severity::Error);
        config.profiles.insert("ci".to_string(), profile);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::UnknownRule { .. })
        ));
    }

    #[test]
    fn test_enabled_list_restricts_rules() {
        let rules = RulesConfig {
            enabled: vec!["form-labels".to_string(), "image-alt".to_string()],
            disabled: vec!["image-alt".to_string()],
            ..Default::default()
        };
        assert_eq!(rules.active_rules().unwrap(), vec![RuleId::FormLabels]);
    }

    #[test]
    fn test_profile_overlay() {
        let mut config = Config::default();
        let mut profile = Profile::default();
        profile.rules.disabled.push("landmark-presence".to_string());
        profile.output = Some(OutputConfig {
            format: OutputFormat::Json,
            color: ColorMode::Never,
        });
        config.profiles.insert("partials".to_string(), profile);

        let config = config.with_profile("partials").unwrap();
        assert!(!config.is_rule_enabled(RuleId::LandmarkPresence));
        assert!(config.is_rule_enabled(RuleId::FormLabels));
        assert_eq!(config.output.format, OutputFormat::Json);
    }

    #[test]
    fn test_unknown_profile() {
        let err = Config::default().with_profile("nope").unwrap_err();
        assert!(matches!(err, ConfigError::UnknownProfile(ref name) if name == "nope"));
    }

    #[test]
    fn test_bad_route_target() {
        let mut config = Config::default();
        config.routes.insert("/x".to_string(), "x-index".to_string());
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_merge_cli() {
        let mut config = Config::default();
        config.merge_cli(Some(OutputFormat::Json), Some(2), true);
        assert_eq!(config.output.format, OutputFormat::Json);
        assert_eq!(config.engine.jobs, 2);
        assert!(!config.state.enabled);
    }

    #[test]
    fn test_discover_order() {
        let dir = TempDir::new().unwrap();
        assert!(Config::discover(dir.path()).is_none());

        std::fs::create_dir_all(dir.path().join("config")).unwrap();
        std::fs::write(dir.path().join("config/viewlint.yml"), "engine:\n  jobs: 1\n").unwrap();
        std::fs::write(dir.path().join(".viewlint.json"), r#"{"engine": {"jobs": 3}}"#).unwrap();

        let found = Config::discover(dir.path()).unwrap();
        assert!(found.ends_with(".viewlint.json"));
        let config = Config::load_default(dir.path()).unwrap();
        assert_eq!(config.engine.jobs, 3);
    }

    #[test]
    fn test_is_template() {
        let project = ProjectConfig::default();
        assert!(project.is_template(Path::new("app/views/users/show.html.erb")));
        assert!(!project.is_template(Path::new("app/assets/site.css")));
    }

    #[test]
    fn test_layouts_dir_default() {
        let project = ProjectConfig::default();
        assert_eq!(
            project.layouts_dir(Path::new("/app")),
            PathBuf::from("/app/app/views/layouts")
        );
    }

    #[test]
    fn test_state_path_override() {
        let state = StateConfig {
            path: Some(PathBuf::from("tmp/state.json")),
            ..Default::default()
        };
        assert_eq!(
            state.state_path(Path::new("/proj")),
            PathBuf::from("/proj/tmp/state.json")
        );
    }
}
