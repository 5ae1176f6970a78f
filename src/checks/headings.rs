//! Heading structure: one h1 per page, no skipped levels, no empty or decorative headings

use super::{has_aria_name, has_named_image, CheckError};
use crate::extract::is_dynamic;
use crate::markup::{Document, Node};
use crate::rule::RuleId;
use crate::violation::{PageContext, Severity, Violation};

/// Longest punctuation-only text treated as decoration rather than a title
const DECORATIVE_TEXT_MAX: usize = 3;

fn heading_level(node: &Node) -> Option<u8> {
    if !node.is_element() {
        return None;
    }
    match node.name.as_str() {
        "h1" => Some(1),
        "h2" => Some(2),
        "h3" => Some(3),
        "h4" => Some(4),
        "h5" => Some(5),
        "h6" => Some(6),
        _ => None,
    }
}

fn is_decorative(text: &str) -> bool {
    let count = text.chars().count();
    count > 0 && count <= DECORATIVE_TEXT_MAX && text.chars().all(|c| !c.is_alphanumeric())
}

pub(super) fn check(doc: &Document, page: &PageContext) -> Result<Vec<Violation>, CheckError> {
    let mut violations = Vec::new();
    let mut previous: Option<u8> = None;
    let mut h1_count = 0;

    for (id, node) in doc.elements() {
        let Some(level) = heading_level(node) else {
            continue;
        };

        if level == 1 {
            h1_count += 1;
            if h1_count > 1 && page.kind.is_page() {
                violations.push(Violation::new(
                    RuleId::HeadingHierarchy,
                    "Page has more than one <h1>",
                    doc.element_context(id),
                    page,
                ));
            }
        }

        if let Some(prev) = previous {
            if level > prev + 1 {
                violations.push(Violation::new(
                    RuleId::HeadingHierarchy,
                    format!("Heading level jumps from h{} to h{}", prev, level),
                    doc.element_context(id),
                    page,
                ));
            }
        }
        previous = Some(level);

        let text = doc.text_content(id);
        if text.is_empty() {
            if !has_aria_name(doc, node) && !has_named_image(doc, id) {
                violations.push(Violation::new(
                    RuleId::HeadingHierarchy,
                    format!("<{}> is empty", node.name),
                    doc.element_context(id),
                    page,
                ));
            }
        } else if !is_dynamic(&text) && is_decorative(&text) {
            violations.push(
                Violation::new(
                    RuleId::HeadingHierarchy,
                    format!(
                        "<{}> contains only \"{}\"; headings should not be used for styling",
                        node.name, text
                    ),
                    doc.element_context(id),
                    page,
                )
                .with_severity(Severity::Warning),
            );
        }
    }

    if h1_count == 0 && page.kind.is_page() && page.inherited_h1s == 0 {
        violations.push(Violation::page_level(
            RuleId::HeadingHierarchy,
            "Page has no <h1>",
            page,
        ));
    }

    Ok(violations)
}
