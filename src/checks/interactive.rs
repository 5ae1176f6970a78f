//! Links, buttons and their ARIA equivalents need an accessible name

use super::{has_aria_name, has_named_image, has_text, CheckError};
use crate::markup::{Document, Node};
use crate::rule::RuleId;
use crate::violation::{PageContext, Violation};

const HEADINGS: &[&str] = &["h1", "h2", "h3", "h4", "h5", "h6"];

fn is_interactive(node: &Node) -> bool {
    node.is("button")
        || (node.is("a") && node.has_attr("href"))
        || matches!(node.role(), Some("button") | Some("link"))
}

fn acts_as_button(node: &Node) -> bool {
    node.is("button") || node.role() == Some("button")
}

fn label_for(node: &Node) -> String {
    match node.role() {
        Some(role) if !node.is("button") && !node.is("a") => {
            format!("<{} role=\"{}\">", node.name, role)
        }
        _ if node.is("a") => "Link".to_string(),
        _ => "Button".to_string(),
    }
}

pub(super) fn check(doc: &Document, page: &PageContext) -> Result<Vec<Violation>, CheckError> {
    let mut violations = Vec::new();

    for (id, node) in doc.elements() {
        if is_interactive(node) {
            let named = has_text(&doc.text_content(id))
                || has_aria_name(doc, node)
                || has_named_image(doc, id);
            if !named {
                violations.push(Violation::new(
                    RuleId::InteractiveElements,
                    format!("{} has no accessible name", label_for(node)),
                    doc.element_context(id),
                    page,
                ));
            }
        }

        if HEADINGS.contains(&node.name.as_str()) {
            let in_button = doc
                .parent(id)
                .map(|p| acts_as_button(doc.node(p)))
                .unwrap_or(false);
            if in_button {
                violations.push(
                    Violation::new(
                        RuleId::InteractiveElements,
                        format!("<{}> is nested inside a button", node.name),
                        doc.element_context(id),
                        page,
                    )
                    .with_remediation(
                        "Style the button text instead of placing a heading inside the control",
                    ),
                );
            }
        }
    }

    Ok(violations)
}
