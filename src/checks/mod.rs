//! Accessibility checks
//!
//! Each check is a pure function from a parsed document and its page context
//! to a list of violations. Checks never touch the filesystem or network.

mod advisory;
mod composed;
mod dialogs;
mod forms;
mod headings;
mod ids;
mod images;
mod interactive;
mod landmarks;
mod tables;

use crate::extract::is_dynamic;
use crate::markup::{Document, Node, NodeId};
use crate::rule::RuleId;
use crate::violation::{PageContext, Violation};
use thiserror::Error;

pub use composed::{page_check, Outline, PageCheckFn, PagePart};

/// Signature shared by every check
pub type CheckFn = fn(&Document, &PageContext) -> Result<Vec<Violation>, CheckError>;

/// Error raised by a check that met a tree it cannot evaluate
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CheckError {
    #[error("node {0} is not part of the document")]
    MissingNode(usize),
    #[error("{0}")]
    Unexpected(String),
}

/// The evaluator for a built-in rule
pub fn builtin(rule: RuleId) -> CheckFn {
    match rule {
        RuleId::FormLabels => forms::check_labels,
        RuleId::ImageAlt => images::check,
        RuleId::InteractiveElements => interactive::check,
        RuleId::HeadingHierarchy => headings::check,
        RuleId::DialogFocus => dialogs::check,
        RuleId::LandmarkPresence => landmarks::check,
        RuleId::FormErrors => forms::check_errors,
        RuleId::TableHeaders => tables::check,
        RuleId::DuplicateIds => ids::check,
        RuleId::SkipLink => advisory::check_skip_link,
        RuleId::ColorContrast => advisory::check_color_contrast,
    }
}

/// Landmarks recognised for page-structure purposes
pub fn landmarks_in(doc: &Document) -> impl Iterator<Item = &'static str> + '_ {
    doc.elements().filter_map(|(_, node)| landmark_of(node))
}

fn landmark_of(node: &Node) -> Option<&'static str> {
    match node.role() {
        Some("main") => return Some("main"),
        Some("navigation") => return Some("navigation"),
        Some("banner") => return Some("banner"),
        Some("contentinfo") => return Some("contentinfo"),
        Some("complementary") => return Some("complementary"),
        _ => {}
    }
    match node.name.as_str() {
        "main" => Some("main"),
        "nav" => Some("navigation"),
        "header" => Some("banner"),
        "footer" => Some("contentinfo"),
        "aside" => Some("complementary"),
        _ => None,
    }
}

/// Non-empty once trimmed; a dynamic placeholder always counts
fn has_text(value: &str) -> bool {
    !value.trim().is_empty()
}

/// `aria-labelledby` naming at least one element present on the page
fn labelledby_resolves(doc: &Document, node: &Node) -> bool {
    let Some(ids) = node.non_empty_attr("aria-labelledby") else {
        return false;
    };
    ids.split_whitespace()
        .any(|id| is_dynamic(id) || doc.element_by_id(id).is_some())
}

/// Name from aria-label, aria-labelledby or title
fn has_aria_name(doc: &Document, node: &Node) -> bool {
    node.non_empty_attr("aria-label").is_some()
        || labelledby_resolves(doc, node)
        || node.non_empty_attr("title").is_some()
}

/// An `img` below `id` with non-empty alt text
fn has_named_image(doc: &Document, id: NodeId) -> bool {
    doc.descendants(id).into_iter().any(|d| {
        let node = doc.node(d);
        node.is("img") && node.non_empty_attr("alt").is_some()
    })
}

fn lookup(doc: &Document, id: NodeId) -> Result<&Node, CheckError> {
    doc.get(id).ok_or(CheckError::MissingNode(id.index()))
}
