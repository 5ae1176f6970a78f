//! Dialogs must contain something keyboard focus can land on

use super::CheckError;
use crate::extract::is_dynamic;
use crate::markup::{Document, Node};
use crate::rule::RuleId;
use crate::violation::{PageContext, Violation};

fn is_dialog(node: &Node) -> bool {
    node.is("dialog") || matches!(node.role(), Some("dialog") | Some("alertdialog"))
}

fn is_focusable(node: &Node) -> bool {
    if !node.is_element() {
        return false;
    }
    if let Some(tabindex) = node.attr("tabindex") {
        let tabindex = tabindex.trim();
        if is_dynamic(tabindex) {
            return true;
        }
        if let Ok(value) = tabindex.parse::<i32>() {
            return value >= 0;
        }
    }
    if node.has_attr("disabled") {
        return false;
    }
    match node.name.as_str() {
        "a" | "area" => node.has_attr("href"),
        "button" | "select" | "textarea" | "summary" => true,
        "input" => !node
            .attr("type")
            .map(|t| t.trim().eq_ignore_ascii_case("hidden"))
            .unwrap_or(false),
        _ => false,
    }
}

pub(super) fn check(doc: &Document, page: &PageContext) -> Result<Vec<Violation>, CheckError> {
    let mut violations = Vec::new();

    for (id, node) in doc.elements().filter(|(_, n)| is_dialog(n)) {
        let focusable = doc
            .descendants(id)
            .into_iter()
            .any(|d| is_focusable(doc.node(d)));
        if !focusable {
            violations.push(Violation::new(
                RuleId::DialogFocus,
                "Dialog contains no keyboard-focusable element",
                doc.element_context(id),
                page,
            ));
        }
    }

    Ok(violations)
}
