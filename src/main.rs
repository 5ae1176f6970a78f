//! viewlint CLI - accessibility linter for view templates

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use glob::glob;
use std::path::{Path, PathBuf};
use std::time::Duration;
use viewlint::config::{ColorMode, Config, OutputFormat};
use viewlint::engine::format_timings;
use viewlint::output::{JsonFormatter, OutputFormatter, TextFormatter};
use viewlint::report::ScanReport;
use viewlint::session::{targets_from_args, ScanMode, ScanSession};
use viewlint::violation::PageIdentity;
use viewlint::watch::{watch_and_run, Watcher};
use viewlint::{RuleId, Severity};

/// Exit status for configuration and usage errors
const EXIT_USAGE: i32 = 2;

/// Rescans of a one-shot check whose templates changed while it ran
const MAX_STALE_RETRIES: usize = 3;

#[derive(Parser)]
#[command(
    name = "viewlint",
    version,
    about = "Accessibility linter for view templates",
    long_about = "Checks ERB-style view templates for accessibility problems \
                  without rendering them."
)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check templates, routes, or rendered markup
    Check(CheckArgs),
    /// List available rules
    Rules,
    /// Show detailed information about a rule
    Explain {
        /// Rule ID to explain
        rule_id: String,
    },
}

#[derive(Args)]
struct CheckArgs {
    /// Template files, glob patterns, or routes (`/users/:id`)
    files: Vec<String>,

    /// Route to check (repeatable)
    #[arg(short, long = "route")]
    routes: Vec<String>,

    /// Check already-rendered markup for the given --route
    #[arg(long, requires = "routes")]
    rendered: Option<PathBuf>,

    /// Configuration profile to apply
    #[arg(short, long)]
    profile: Option<String>,

    /// Output format
    #[arg(short, long, value_enum)]
    format: Option<Format>,

    /// Number of parallel jobs (0 = auto)
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Ignore remembered results and rescan everything
    #[arg(long)]
    force: bool,

    /// Only rescan pages affected by changes since the last run
    #[arg(long)]
    incremental: bool,

    /// Watch templates and rescan on changes
    #[arg(long, short = 'w')]
    watch: bool,

    /// Clear screen before each pass (use with --watch)
    #[arg(long, requires = "watch")]
    clear: bool,

    /// Neither read nor write persisted scan state
    #[arg(long)]
    no_state: bool,

    /// Show per-rule timing statistics
    #[arg(long)]
    timing: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Text,
    Json,
}

impl From<Format> for OutputFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Text => OutputFormat::Text,
            Format::Json => OutputFormat::Json,
        }
    }
}

fn severity_str(severity: Severity) -> colored::ColoredString {
    match severity {
        Severity::Error => "error".red(),
        Severity::Warning => "warning".yellow(),
    }
}

fn print_rule(rule: RuleId) {
    let marker = if rule.is_placeholder() {
        " [placeholder]".yellow()
    } else {
        "".normal()
    };
    println!(
        "    {} [{}] (WCAG {}){}",
        rule.as_str().cyan(),
        severity_str(rule.default_severity()),
        rule.wcag(),
        marker
    );
    println!("      {}", rule.description());
}

fn list_rules() {
    println!("{}", "Available rules".bold());
    println!();
    for rule in RuleId::ALL {
        print_rule(rule);
    }
}

fn explain_rule(rule_id: &str) -> anyhow::Result<()> {
    let Ok(rule) = rule_id.parse::<RuleId>() else {
        bail!(
            "Rule '{}' not found\n\nUse {} to see all available rules",
            rule_id,
            "viewlint rules".cyan()
        );
    };

    println!("{}", "Rule Details".bold());
    println!();
    println!("  {}: {}", "ID".bold(), rule.as_str().cyan());
    println!("  {}: {}", "Severity".bold(), severity_str(rule.default_severity()));
    println!("  {}: {}", "WCAG".bold(), rule.wcag());
    println!();
    println!("  {}", "Description".bold());
    println!("  {}", rule.description());
    println!();
    println!("  {}", "How to fix".bold());
    println!("  {}", rule.remediation());
    if rule.is_placeholder() {
        println!();
        println!(
            "  {}: this rule is reserved and does not report findings yet",
            "note".blue()
        );
    }
    Ok(())
}

fn load_config(cli: &Cli, args: &CheckArgs, root: &Path) -> anyhow::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => Config::load_default(root).context("Failed to load config")?,
    };
    if let Some(profile) = &args.profile {
        config = config.with_profile(profile)?;
    }
    config.merge_cli(args.format.map(Into::into), args.jobs, args.no_state);
    Ok(config)
}

/// Expand globs; arguments that name routes pass through unchanged
fn expand_targets(args: &CheckArgs) -> anyhow::Result<Vec<PageIdentity>> {
    let mut expanded = Vec::new();
    for pattern in &args.files {
        if pattern.starts_with('/') && !Path::new(pattern).exists() {
            expanded.push(pattern.clone());
            continue;
        }
        let before = expanded.len();
        let paths = glob(pattern).with_context(|| format!("Invalid pattern '{}'", pattern))?;
        for entry in paths.flatten() {
            if entry.is_file() {
                expanded.push(entry.to_string_lossy().into_owned());
            }
        }
        if expanded.len() == before {
            log::warn!("No templates match '{}'", pattern);
        }
    }

    if !args.files.is_empty() && expanded.is_empty() {
        bail!("No files found to check");
    }

    let mut targets = targets_from_args(&expanded);
    targets.extend(args.routes.iter().cloned().map(PageIdentity::Route));
    Ok(targets)
}

fn formatter(config: &Config, no_color: bool) -> Box<dyn OutputFormatter> {
    match config.output.format {
        OutputFormat::Text => {
            let mut f = TextFormatter::new();
            if no_color || config.output.color == ColorMode::Never {
                f = f.without_color();
            }
            Box::new(f)
        }
        OutputFormat::Json => Box::new(JsonFormatter::new().pretty()),
    }
}

fn print_report(formatter: &dyn OutputFormatter, report: &ScanReport, timing: bool) {
    print!("{}", formatter.format(report));
    if timing {
        eprintln!();
        eprintln!("{}", format_timings(&report.timings));
    }
}

fn check(cli: &Cli, args: &CheckArgs) -> anyhow::Result<i32> {
    let root = PathBuf::from(".");
    let config = load_config(cli, args, &root)?;

    match config.output.color {
        ColorMode::Never => colored::control::set_override(false),
        ColorMode::Always if !cli.no_color => colored::control::set_override(true),
        _ => {}
    }

    let formatter = formatter(&config, cli.no_color);
    let mut session = ScanSession::new(&root, config)?;
    if args.force {
        session.force_full_scan();
    }

    if let Some(rendered) = &args.rendered {
        let [route] = args.routes.as_slice() else {
            bail!("--rendered needs exactly one --route");
        };
        let report = session.run_rendered(route, rendered);
        print_report(formatter.as_ref(), &report, args.timing);
        return Ok(report.exit_code());
    }

    let targets = expand_targets(args)?;

    if args.watch {
        let mut paths = vec![session.config().project.views_dir(&root)];
        let layouts = session.config().project.layouts_dir(&root);
        if !layouts.starts_with(&paths[0]) {
            paths.push(layouts);
        }
        let debounce = Duration::from_millis(session.config().watch.debounce_ms);
        let watcher = Watcher::new(&paths, &session.config().project.extensions, debounce)
            .context("Failed to start file watcher")?;

        eprintln!(
            "{} Watching for changes... (press Ctrl+C to stop)",
            "[watch]".cyan().bold()
        );
        watch_and_run(&mut session, &targets, &watcher, |run| {
            if args.clear {
                print!("\x1B[2J\x1B[1;1H");
            }
            if !run.changes.changed_files.is_empty() {
                eprintln!(
                    "{} {} file(s) changed, {} page(s) rescanned",
                    "[watch]".cyan().bold(),
                    run.changes.changed_files.len(),
                    run.changes.affected_pages.len()
                );
            }
            print_report(formatter.as_ref(), &run.report, args.timing);
            eprintln!("{} Watching for changes...", "[watch]".cyan().bold());
        });
        return Ok(0);
    }

    let mode = if args.incremental {
        ScanMode::Incremental
    } else {
        ScanMode::Full
    };
    let Some(run) = session.run_settled(&targets, mode, MAX_STALE_RETRIES) else {
        bail!(
            "Templates kept changing during the scan ({} attempts); no results to show",
            MAX_STALE_RETRIES + 1
        );
    };

    print_report(formatter.as_ref(), &run.report, args.timing);
    Ok(run.report.exit_code())
}

fn main() {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "warn,viewlint=debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    if cli.no_color {
        colored::control::set_override(false);
    }

    let result = match &cli.command {
        Commands::Check(args) => check(&cli, args),
        Commands::Rules => {
            list_rules();
            Ok(0)
        }
        Commands::Explain { rule_id } => explain_rule(rule_id).map(|_| 0),
    };

    match result {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("{}: {:#}", "error".red().bold(), e);
            std::process::exit(EXIT_USAGE);
        }
    }
}
