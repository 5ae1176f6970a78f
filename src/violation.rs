//! Violation types reported by accessibility checks

use crate::rule::RuleId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

/// Severity of a violation
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Should be fixed, does not fail the run
    #[default]
    Warning,
    /// Fails the run
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "warning" | "warn" => Ok(Severity::Warning),
            "error" | "err" => Ok(Severity::Error),
            _ => Err(()),
        }
    }
}

/// Role a template plays when a page is rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateKind {
    /// Action view, rendered into a layout
    #[default]
    View,
    /// Fragment included by other templates (`_name.html.erb`)
    Partial,
    /// Page shell wrapping views
    Layout,
}

impl TemplateKind {
    /// Page-level checks (single h1, landmarks) only make sense for whole views
    pub fn is_page(&self) -> bool {
        matches!(self, TemplateKind::View)
    }
}

impl fmt::Display for TemplateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemplateKind::View => write!(f, "view"),
            TemplateKind::Partial => write!(f, "partial"),
            TemplateKind::Layout => write!(f, "layout"),
        }
    }
}

/// What a scan is about: a URL route or a template file
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageIdentity {
    Route(String),
    File(PathBuf),
}

impl PageIdentity {
    /// Stable key used in scan state
    pub fn key(&self) -> String {
        match self {
            PageIdentity::Route(route) => format!("route:{}", route),
            PageIdentity::File(path) => format!("file:{}", path.display()),
        }
    }
}

impl fmt::Display for PageIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PageIdentity::Route(route) => write!(f, "{}", route),
            PageIdentity::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// The page a violation was found on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageContext {
    pub identity: PageIdentity,
    /// Primary template of the page
    #[serde(skip_serializing_if = "Option::is_none")]
    pub view_file: Option<PathBuf>,
    /// Template the violation was attributed to, when not the primary one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fragment_file: Option<PathBuf>,
    #[serde(skip)]
    pub kind: TemplateKind,
    /// Landmarks supplied by the surrounding layout
    #[serde(skip)]
    pub inherited_landmarks: BTreeSet<String>,
    /// h1s rendered by the layout and partials
    #[serde(skip)]
    pub inherited_h1s: usize,
}

impl PageContext {
    /// Context for scanning a single template file
    pub fn for_file(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            identity: PageIdentity::File(path.clone()),
            view_file: Some(path),
            fragment_file: None,
            kind: TemplateKind::View,
            inherited_landmarks: BTreeSet::new(),
            inherited_h1s: 0,
        }
    }

    /// Context for a route
    pub fn for_route(route: impl Into<String>) -> Self {
        Self {
            identity: PageIdentity::Route(route.into()),
            view_file: None,
            fragment_file: None,
            kind: TemplateKind::View,
            inherited_landmarks: BTreeSet::new(),
            inherited_h1s: 0,
        }
    }

    pub fn with_kind(mut self, kind: TemplateKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_view_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.view_file = Some(path.into());
        self
    }

    pub fn with_landmarks<I, S>(mut self, landmarks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inherited_landmarks = landmarks.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_inherited_h1s(mut self, count: usize) -> Self {
        self.inherited_h1s = count;
        self
    }

    /// File to point the user at
    pub fn display_file(&self) -> Option<&PathBuf> {
        self.fragment_file.as_ref().or(self.view_file.as_ref())
    }
}

/// Description of the offending element
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementContext {
    pub tag: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub classes: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub src: Option<String>,
    /// Visible text, truncated
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub text: String,
    /// Summary of the nearest parent element
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    /// Summary of the nearest enclosing region (nav, header, footer, ...)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    /// 1-based source line, 0 for page-level findings
    pub line: usize,
    pub column: usize,
}

impl ElementContext {
    /// Context for findings about the page as a whole
    pub fn page() -> Self {
        Self {
            tag: "#document".to_string(),
            ..Default::default()
        }
    }

    /// `tag#id.class`
    pub fn summary(&self) -> String {
        let mut out = self.tag.clone();
        if let Some(id) = &self.id {
            out.push('#');
            out.push_str(id);
        }
        for class in &self.classes {
            out.push('.');
            out.push_str(class);
        }
        out
    }
}

/// A single accessibility problem
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub rule_id: RuleId,
    pub message: String,
    pub severity: Severity,
    pub element_context: ElementContext,
    pub page_context: PageContext,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wcag_reference: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,
    /// Line in the template source, only for statically extracted markup
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_line: Option<usize>,
}

impl Violation {
    /// Create a violation with the rule's default severity and references
    pub fn new(
        rule: RuleId,
        message: impl Into<String>,
        element: ElementContext,
        page: &PageContext,
    ) -> Self {
        let source_line = (element.line > 0).then_some(element.line);
        Self {
            rule_id: rule,
            message: message.into(),
            severity: rule.default_severity(),
            element_context: element,
            page_context: page.clone(),
            wcag_reference: Some(rule.wcag().to_string()),
            remediation: Some(rule.remediation().to_string()),
            source_line,
        }
    }

    /// Violation about the page rather than one element
    pub fn page_level(rule: RuleId, message: impl Into<String>, page: &PageContext) -> Self {
        Self::new(rule, message, ElementContext::page(), page)
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_remediation(mut self, remediation: impl Into<String>) -> Self {
        self.remediation = Some(remediation.into());
        self
    }

    /// Drop the source line, for markup that did not come from a template
    pub fn without_source_line(mut self) -> Self {
        self.source_line = None;
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Error > Severity::Warning);
    }

    #[test]
    fn test_severity_from_str() {
        assert_eq!("error".parse::<Severity>(), Ok(Severity::Error));
        assert_eq!("WARN".parse::<Severity>(), Ok(Severity::Warning));
        assert!("fatal".parse::<Severity>().is_err());
    }

    #[test]
    fn test_violation_defaults_from_rule() {
        let page = PageContext::for_file("app/views/users/new.html.erb");
        let element = ElementContext {
            tag: "input".to_string(),
            id: Some("email".to_string()),
            line: 4,
            column: 5,
            ..Default::default()
        };
        let v = Violation::new(RuleId::FormLabels, "missing label", element, &page);
        assert_eq!(v.severity, Severity::Error);
        assert_eq!(v.wcag_reference.as_deref(), Some("3.3.2"));
        assert_eq!(v.source_line, Some(4));
        assert!(v.remediation.is_some());
    }

    #[test]
    fn test_page_level_violation_has_no_line() {
        let page = PageContext::for_route("/users");
        let v = Violation::page_level(RuleId::LandmarkPresence, "no main", &page);
        assert_eq!(v.source_line, None);
        assert_eq!(v.element_context.tag, "#document");
    }

    #[test]
    fn test_page_identity_key() {
        assert_eq!(PageIdentity::Route("/users".into()).key(), "route:/users");
        assert_eq!(
            PageIdentity::File(PathBuf::from("a.erb")).key(),
            "file:a.erb"
        );
    }

    #[test]
    fn test_element_summary() {
        let element = ElementContext {
            tag: "a".to_string(),
            id: Some("home".to_string()),
            classes: vec!["btn".to_string(), "primary".to_string()],
            ..Default::default()
        };
        assert_eq!(element.summary(), "a#home.btn.primary");
    }

    #[test]
    fn test_display_file_prefers_fragment() {
        let mut page = PageContext::for_file("show.html.erb");
        assert_eq!(page.display_file(), Some(&PathBuf::from("show.html.erb")));
        page.fragment_file = Some(PathBuf::from("_nav.html.erb"));
        assert_eq!(page.display_file(), Some(&PathBuf::from("_nav.html.erb")));
    }
}
