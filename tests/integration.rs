//! Integration tests for viewlint

use pretty_assertions::assert_eq;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use viewlint::{
    config::Config,
    output::{JsonFormatter, OutputFormatter, TextFormatter},
    report::{FileErrorKind, ScanReport},
    resolver::normalize_path,
    BlastRadius, PageIdentity, RuleId, ScanMode, ScanSession, Severity, DYNAMIC_PLACEHOLDER,
};
use walkdir::WalkDir;

fn fixtures_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn quiet_config() -> Config {
    let mut config = Config::default();
    config.state.enabled = false;
    config.state.use_vcs = false;
    config.engine.parallel = false;
    config
}

fn session(root: &Path) -> ScanSession {
    ScanSession::new(root, quiet_config()).unwrap()
}

/// Copy a fixture app somewhere it can be edited
fn copy_fixture(name: &str) -> TempDir {
    let source = fixtures_path().join(name);
    let temp = TempDir::new().unwrap();
    for entry in WalkDir::new(&source).into_iter().flatten() {
        let relative = entry.path().strip_prefix(&source).unwrap();
        let target = temp.path().join(relative);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).unwrap();
        } else {
            fs::copy(entry.path(), &target).unwrap();
        }
    }
    temp
}

/// (rule, file name, line) for every violation, sorted
fn findings(report: &ScanReport) -> Vec<(RuleId, String, Option<usize>)> {
    let mut found: Vec<_> = report
        .violations
        .iter()
        .map(|v| {
            let file = v
                .page_context
                .display_file()
                .and_then(|f| f.file_name())
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            (v.rule_id, file, v.source_line)
        })
        .collect();
    found.sort();
    found
}

fn shop_findings() -> Vec<(RuleId, String, Option<usize>)> {
    let mut expected = vec![
        (RuleId::FormLabels, "index.html.erb".to_string(), Some(6)),
        (RuleId::ImageAlt, "_nav.html.erb".to_string(), Some(3)),
        (RuleId::InteractiveElements, "_nav.html.erb".to_string(), Some(3)),
        (RuleId::HeadingHierarchy, "show.html.erb".to_string(), Some(2)),
        (RuleId::ImageAlt, "show.html.erb".to_string(), Some(3)),
        (RuleId::TableHeaders, "show.html.erb".to_string(), Some(4)),
    ];
    expected.sort();
    expected
}

#[test]
fn test_full_scan_of_fixture_app() {
    let mut session = session(&fixtures_path().join("shop"));
    let run = session.run(&[], ScanMode::Full);

    assert!(!run.is_stale());
    assert_eq!(findings(&run.report), shop_findings());
    assert!(run.report.file_errors.is_empty());
    assert!(run.report.faults.is_empty());
    assert_eq!(run.report.exit_code(), 1);

    // index, show, _row, the layout and _nav
    assert_eq!(run.report.files_scanned, 5);
}

#[test]
fn test_main_landmark_is_inherited_from_layout() {
    let mut session = session(&fixtures_path().join("shop"));
    let run = session.run(&[], ScanMode::Full);
    assert!(run
        .report
        .violations
        .iter()
        .all(|v| v.rule_id != RuleId::LandmarkPresence));
}

#[test]
fn test_fragment_violation_names_partial_and_page() {
    let mut session = session(&fixtures_path().join("shop"));
    let run = session.run(&[], ScanMode::Full);

    let logo = run
        .report
        .violations
        .iter()
        .find(|v| {
            v.rule_id == RuleId::ImageAlt && v.element_context.src.as_deref() == Some("logo.png")
        })
        .unwrap();
    let fragment = logo.page_context.fragment_file.as_ref().unwrap();
    assert!(fragment.ends_with("shared/_nav.html.erb"));
    assert!(logo.page_context.view_file.is_some());
    assert_eq!(logo.severity, Severity::Error);
}

#[test]
fn test_dynamic_values_are_not_flagged_as_empty() {
    let mut session = session(&fixtures_path().join("shop"));
    let run = session.run(&[], ScanMode::Full);

    // _row only has placeholder alt text and link text
    assert!(run.report.violations.iter().all(|v| {
        v.page_context
            .display_file()
            .map(|f| !f.ends_with("users/_row.html.erb"))
            .unwrap_or(true)
    }));

    let avatar = run
        .report
        .violations
        .iter()
        .find(|v| {
            v.rule_id == RuleId::ImageAlt
                && v.source_line == Some(3)
                && v.element_context.src.as_deref() != Some("logo.png")
        })
        .unwrap();
    assert_eq!(avatar.element_context.src.as_deref(), Some(DYNAMIC_PLACEHOLDER));
}

#[test]
fn test_route_target() {
    let mut session = session(&fixtures_path().join("shop"));
    let route = PageIdentity::Route("/users".to_string());
    let run = session.run(&[route.clone()], ScanMode::Full);

    let label = run
        .report
        .violations
        .iter()
        .find(|v| v.rule_id == RuleId::FormLabels)
        .unwrap();
    assert_eq!(label.page_context.identity, route);
    assert!(label
        .page_context
        .view_file
        .as_ref()
        .unwrap()
        .ends_with("users/index.html.erb"));

    // show.html.erb is not part of /users
    assert!(run
        .report
        .violations
        .iter()
        .all(|v| v.rule_id != RuleId::TableHeaders));
}

#[test]
fn test_file_target() {
    let root = fixtures_path().join("shop");
    let mut session = session(&root);
    let show = normalize_path(&root.join("app/views/users/show.html.erb"));
    let run = session.run(&[PageIdentity::File(show)], ScanMode::Full);

    let rules: Vec<RuleId> = findings(&run.report).into_iter().map(|f| f.0).collect();
    assert!(rules.contains(&RuleId::TableHeaders));
    assert!(!rules.contains(&RuleId::FormLabels));
}

#[test]
fn test_unknown_route_degrades_instead_of_failing() {
    let mut session = session(&fixtures_path().join("shop"));
    let run = session.run(&[PageIdentity::Route("/nowhere".to_string())], ScanMode::Full);

    assert_eq!(run.report.unresolved.len(), 1);
    assert!(run.report.violations.is_empty());
    assert_eq!(run.report.exit_code(), 0);
}

#[test]
fn test_malformed_template_reported_separately() {
    let mut session = session(&fixtures_path().join("broken"));
    let run = session.run(&[], ScanMode::Full);

    assert_eq!(run.report.file_errors.len(), 1);
    let error = &run.report.file_errors[0];
    assert!(error.path.ends_with("pages/broken.html.erb"));
    assert!(matches!(error.kind, FileErrorKind::Extraction { line: 3, .. }));

    // The rest of the batch still ran
    assert_eq!(
        findings(&run.report),
        vec![(RuleId::ImageAlt, "ok.html.erb".to_string(), Some(3))]
    );

    let text = TextFormatter::new().without_color().format(&run.report);
    assert!(text.contains("Malformed templates"));
    assert!(text.contains("broken.html.erb:3:"));
}

#[test]
fn test_runs_are_idempotent() {
    let mut session = session(&fixtures_path().join("shop"));
    let first = session.run(&[], ScanMode::Full);
    let second = session.run(&[], ScanMode::Full);
    assert_eq!(first.report.violations, second.report.violations);
}

#[test]
fn test_incremental_without_changes_reuses_results() {
    let app = copy_fixture("shop");
    let mut session = session(app.path());
    let full = session.run(&[], ScanMode::Full);

    let again = session.run(&[], ScanMode::Incremental);
    assert_eq!(again.changes.blast_radius, BlastRadius::None);
    assert_eq!(again.report.files_scanned, 0);
    assert_eq!(again.report.violations, full.report.violations);
}

#[test]
fn test_lines_follow_edits_above() {
    let app = copy_fixture("shop");
    let mut session = session(app.path());
    session.run(&[], ScanMode::Full);

    let show = app.path().join("app/views/users/show.html.erb");
    let original = fs::read_to_string(&show).unwrap();
    fs::write(&show, format!("<%# shown to admins\n    only %>\n{}", original)).unwrap();

    let run = session.run(&[], ScanMode::Incremental);
    assert_eq!(run.changes.blast_radius, BlastRadius::SinglePage);

    let show_findings: Vec<_> = findings(&run.report)
        .into_iter()
        .filter(|f| f.1 == "show.html.erb")
        .collect();
    assert_eq!(
        show_findings,
        vec![
            (RuleId::ImageAlt, "show.html.erb".to_string(), Some(5)),
            (RuleId::HeadingHierarchy, "show.html.erb".to_string(), Some(4)),
            (RuleId::TableHeaders, "show.html.erb".to_string(), Some(6)),
        ]
    );
    // Untouched pages keep their findings
    assert!(findings(&run.report)
        .iter()
        .any(|f| *f == (RuleId::FormLabels, "index.html.erb".to_string(), Some(6))));
}

#[test]
fn test_shared_partial_change_affects_every_page_using_it() {
    let app = copy_fixture("shop");
    let mut session = session(app.path());
    session.run(&[], ScanMode::Full);

    fs::write(
        app.path().join("app/views/shared/_nav.html.erb"),
        concat!(
            "<nav>\n  <a href=\"/users\">Users</a>\n",
            "  <a href=\"/\"><img src=\"logo.png\" alt=\"Home\"></a>\n</nav>\n"
        ),
    )
    .unwrap();
    let run = session.run(&[], ScanMode::Incremental);

    assert_eq!(run.changes.blast_radius, BlastRadius::MultiPage);
    assert_eq!(run.changes.affected_pages.len(), 2);
    assert!(run
        .report
        .violations
        .iter()
        .all(|v| v.element_context.src.as_deref() != Some("logo.png")));
    assert!(run
        .report
        .violations
        .iter()
        .all(|v| v.rule_id != RuleId::InteractiveElements));
}

#[test]
fn test_partial_only_used_by_one_page() {
    let app = copy_fixture("shop");
    let mut session = session(app.path());
    session.run(&[], ScanMode::Full);

    fs::write(
        app.path().join("app/views/users/_row.html.erb"),
        "<div class=\"row\">\n  <img src=\"<%= user.avatar_url %>\">\n</div>\n",
    )
    .unwrap();
    let run = session.run(&[], ScanMode::Incremental);

    assert_eq!(run.changes.blast_radius, BlastRadius::SinglePage);
    let row = run
        .report
        .violations
        .iter()
        .find(|v| {
            v.rule_id == RuleId::ImageAlt
                && v.page_context
                    .fragment_file
                    .as_ref()
                    .map(|f| f.ends_with("users/_row.html.erb"))
                    .unwrap_or(false)
        })
        .unwrap();
    assert!(row
        .page_context
        .view_file
        .as_ref()
        .unwrap()
        .ends_with("users/index.html.erb"));
}

#[test]
fn test_page_composed_from_view_and_partial() {
    let app = copy_fixture("shop");
    fs::write(
        app.path().join("app/views/users/new.html.erb"),
        "<h1>New user</h1>\n<%= render \"fields\" %>\n<p id=\"hint\">All fields are required</p>\n",
    )
    .unwrap();
    fs::write(
        app.path().join("app/views/users/_fields.html.erb"),
        "<p id=\"hint\">Use your work address</p>\n<h1>Account</h1>\n",
    )
    .unwrap();

    let new = normalize_path(&app.path().join("app/views/users/new.html.erb"));
    let mut session = session(app.path());
    let run = session.run(&[PageIdentity::File(new)], ScanMode::Full);

    let found = findings(&run.report);
    assert!(found.contains(&(RuleId::DuplicateIds, "_fields.html.erb".to_string(), Some(1))));
    assert!(found.contains(&(RuleId::HeadingHierarchy, "_fields.html.erb".to_string(), Some(2))));
    assert!(!found
        .iter()
        .any(|f| f.0 == RuleId::DuplicateIds && f.1 == "new.html.erb"));
}

#[test]
fn test_unknown_file_change_is_global() {
    let app = copy_fixture("shop");
    let mut session = session(app.path());
    session.run(&[], ScanMode::Full);

    fs::write(
        app.path().join("app/views/shared/_footer.html.erb"),
        "<footer>Shop</footer>\n",
    )
    .unwrap();
    let run = session.run(&[], ScanMode::Incremental);
    assert_eq!(run.changes.blast_radius, BlastRadius::Global);
    assert_eq!(run.changes.affected_pages.len(), 2);
    assert_eq!(findings(&run.report), shop_findings());
}

#[test]
fn test_state_survives_a_new_session() {
    let app = copy_fixture("shop");
    let mut config = quiet_config();
    config.state.enabled = true;
    config.state.path = Some(app.path().join("tmp/viewlint-state.json"));

    let mut first = ScanSession::new(app.path(), config.clone()).unwrap();
    first.run(&[], ScanMode::Full);
    assert!(app.path().join("tmp/viewlint-state.json").is_file());

    let mut second = ScanSession::new(app.path(), config).unwrap();
    let run = second.run(&[], ScanMode::Incremental);
    assert_eq!(run.report.files_scanned, 0);
    assert_eq!(findings(&run.report), shop_findings());
}

#[test]
fn test_profile_from_config_file() {
    let app = copy_fixture("shop");
    fs::write(
        app.path().join(".viewlint.yml"),
        r#"engine:
  parallel: false
state:
  enabled: false
  use_vcs: false
profiles:
  lenient:
    rules:
      ignored:
        - rule: image-alt
          reason: product images are described in the caption
      severity:
        table-headers: warning
"#,
    )
    .unwrap();

    let config = Config::load_default(app.path())
        .unwrap()
        .with_profile("lenient")
        .unwrap();
    let mut session = ScanSession::new(app.path(), config).unwrap();
    let run = session.run(&[], ScanMode::Full);

    assert!(run.report.violations.iter().all(|v| v.rule_id != RuleId::ImageAlt));
    let table = run
        .report
        .violations
        .iter()
        .find(|v| v.rule_id == RuleId::TableHeaders)
        .unwrap();
    assert_eq!(table.severity, Severity::Warning);
}

#[test]
fn test_invalid_configuration_fails_before_scanning() {
    let app = copy_fixture("shop");
    fs::write(
        app.path().join(".viewlint.yml"),
        "rules:\n  ignored:\n    - rule: image-alt\n",
    )
    .unwrap();
    let config = Config::load_default(app.path()).unwrap();
    assert!(ScanSession::new(app.path(), config).is_err());

    assert!(Config::default().with_profile("missing").is_err());
}

#[test]
fn test_rendered_markup() {
    let app = copy_fixture("shop");
    let rendered = app.path().join("rendered.html");
    fs::write(
        &rendered,
        "<html><body><main>\n<h1>Ann</h1>\n<img src=\"ann.png\">\n</main></body></html>",
    )
    .unwrap();

    let mut session = session(app.path());
    let report = session.run_rendered("/users/1", &rendered);

    let image = report
        .violations
        .iter()
        .find(|v| v.rule_id == RuleId::ImageAlt)
        .unwrap();
    assert_eq!(image.source_line, None);
    assert_eq!(
        image.page_context.identity,
        PageIdentity::Route("/users/1".to_string())
    );
}

#[test]
fn test_json_report() {
    let mut session = session(&fixtures_path().join("shop"));
    let run = session.run(&[], ScanMode::Full);
    let output = JsonFormatter::new().format(&run.report);
    let value: serde_json::Value = serde_json::from_str(&output).unwrap();

    assert_eq!(value["summary"]["total_errors"], run.report.summary().total_errors);
    assert_eq!(
        value["violations"].as_array().unwrap().len(),
        run.report.violations.len()
    );
}
