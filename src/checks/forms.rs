//! Form labelling and error association

use super::{has_text, labelledby_resolves, lookup, CheckError};
use crate::extract::is_dynamic;
use crate::markup::{Document, Node, NodeId};
use crate::rule::RuleId;
use crate::violation::{PageContext, Violation};
use std::collections::HashSet;

/// Input types that never need a label
const EXEMPT_INPUT_TYPES: &[&str] = &["hidden", "submit", "reset", "button", "image"];

/// Classes frameworks put on invalid fields (or their wrappers)
const INVALID_CLASSES: &[&str] = &["is-invalid", "invalid", "error", "field_with_errors"];

/// Classes used on error message nodes
const ERROR_MESSAGE_CLASSES: &[&str] = &[
    "error",
    "errors",
    "error-message",
    "invalid-feedback",
    "field-error",
    "help-block",
];

fn is_labelable(node: &Node) -> bool {
    match node.name.as_str() {
        "textarea" | "select" => true,
        "input" => {
            let kind = node.attr("type").unwrap_or("text").trim().to_ascii_lowercase();
            !EXEMPT_INPUT_TYPES.contains(&kind.as_str())
        }
        _ => false,
    }
}

fn describe(node: &Node) -> String {
    match node.name.as_str() {
        "input" => format!("<input type=\"{}\">", node.attr("type").unwrap_or("text")),
        other => format!("<{}>", other),
    }
}

/// Every labelable control needs a label, aria-label or resolvable aria-labelledby
pub(super) fn check_labels(
    doc: &Document,
    page: &PageContext,
) -> Result<Vec<Violation>, CheckError> {
    let label_targets: Vec<&str> = doc
        .elements_named("label")
        .filter_map(|(_, label)| label.non_empty_attr("for"))
        .map(str::trim)
        .collect();
    let literal_targets: HashSet<&str> = label_targets
        .iter()
        .copied()
        .filter(|target| !is_dynamic(target))
        .collect();
    let any_dynamic_target = label_targets.iter().any(|target| is_dynamic(target));

    let mut violations = Vec::new();
    for (id, node) in doc.elements().filter(|(_, n)| is_labelable(n)) {
        if node.non_empty_attr("aria-label").is_some() || labelledby_resolves(doc, node) {
            continue;
        }
        if doc.closest(id, |a| a.is("label")).is_some() {
            continue;
        }
        let labelled = match node.id().map(str::trim) {
            // A generated id cannot be matched exactly; a generated `for` is the best we can see
            Some(control_id) if is_dynamic(control_id) => any_dynamic_target,
            Some(control_id) => literal_targets.contains(control_id),
            None => false,
        };
        if labelled {
            continue;
        }

        let message = match node.id() {
            Some(control_id) => format!(
                "{} with id \"{}\" has no associated label",
                describe(node),
                control_id
            ),
            None => format!("{} has no associated label", describe(node)),
        };
        violations.push(Violation::new(
            RuleId::FormLabels,
            message,
            doc.element_context(id),
            page,
        ));
    }

    Ok(violations)
}

fn marked_invalid(doc: &Document, id: NodeId, node: &Node) -> bool {
    let aria_invalid = node
        .attr("aria-invalid")
        .map(|v| v.trim().eq_ignore_ascii_case("true"))
        .unwrap_or(false);
    if aria_invalid || INVALID_CLASSES.iter().any(|c| node.has_class(c)) {
        return true;
    }
    // Rails wraps invalid fields in <div class="field_with_errors">
    doc.parent(id)
        .map(|p| doc.node(p).has_class("field_with_errors"))
        .unwrap_or(false)
}

fn is_error_node(node: &Node) -> bool {
    node.is_element()
        && (ERROR_MESSAGE_CLASSES.iter().any(|c| node.has_class(c))
            || node.role() == Some("alert"))
}

/// An error node among the control's siblings (or its wrapper's siblings)
fn has_adjacent_error(doc: &Document, id: NodeId) -> Result<bool, CheckError> {
    let mut current = id;
    for _ in 0..2 {
        let Some(parent) = doc.parent(current) else {
            return Ok(false);
        };
        let parent_node = lookup(doc, parent)?;
        for &sibling in &parent_node.children {
            if sibling == current {
                continue;
            }
            let node = lookup(doc, sibling)?;
            if is_error_node(node) && has_text(&doc.text_content(sibling)) {
                return Ok(true);
            }
        }
        if !parent_node.has_class("field_with_errors") {
            break;
        }
        current = parent;
    }
    Ok(false)
}

/// Invalid controls must point at an error message
pub(super) fn check_errors(
    doc: &Document,
    page: &PageContext,
) -> Result<Vec<Violation>, CheckError> {
    let mut violations = Vec::new();

    for (id, node) in doc.elements().filter(|(_, n)| is_labelable(n)) {
        if !marked_invalid(doc, id, node) {
            continue;
        }

        if let Some(described_by) = node.non_empty_attr("aria-describedby") {
            let resolves = described_by
                .split_whitespace()
                .any(|target| is_dynamic(target) || doc.element_by_id(target).is_some());
            if resolves {
                continue;
            }
            violations.push(Violation::new(
                RuleId::FormErrors,
                format!(
                    "{} is marked invalid but aria-describedby=\"{}\" does not match any element",
                    describe(node),
                    described_by
                ),
                doc.element_context(id),
                page,
            ));
            continue;
        }

        if has_adjacent_error(doc, id)? {
            continue;
        }

        violations.push(Violation::new(
            RuleId::FormErrors,
            format!(
                "{} is marked invalid but has no associated error message",
                describe(node)
            ),
            doc.element_context(id),
            page,
        ));
    }

    Ok(violations)
}

#[cfg(test)]
mod tests {
    use crate::checks::test_support::run;
    use crate::rule::RuleId;

    #[test]
    fn test_input_without_label() {
        let violations = run(RuleId::FormLabels, r#"<input type="text" id="email">"#);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].rule_id, RuleId::FormLabels);
        assert_eq!(violations[0].element_context.id.as_deref(), Some("email"));
        assert_eq!(violations[0].source_line, Some(1));
    }

    #[test]
    fn test_label_for_matches() {
        let violations = run(
            RuleId::FormLabels,
            r#"<label for="email">Email</label><input type="email" id="email">"#,
        );
        assert!(violations.is_empty());
    }

    #[test]
    fn test_wrapping_label() {
        let violations = run(
            RuleId::FormLabels,
            r#"<label>Remember me <input type="checkbox" name="remember"></label>"#,
        );
        assert!(violations.is_empty());
    }

    #[test]
    fn test_aria_label_and_labelledby() {
        let source = r#"
<input type="search" aria-label="Search">
<span id="qty-label">Quantity</span>
<input type="number" aria-labelledby="qty-label">
<input type="number" aria-labelledby="missing">
"#;
        let violations = run(RuleId::FormLabels, source);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].source_line, Some(5));
    }

    #[test]
    fn test_exempt_input_types() {
        let source = concat!(
            r#"<input type="hidden" name="token"><input type="submit" value="Go">"#,
            r#"<input type="image" src="go.png" alt="Go">"#
        );
        assert!(run(RuleId::FormLabels, source).is_empty());
    }

    #[test]
    fn test_select_and_textarea_need_labels() {
        let source = "<select name=\"country\"></select>\n<textarea name=\"bio\"></textarea>";
        let violations = run(RuleId::FormLabels, source);
        assert_eq!(violations.len(), 2);
        assert_eq!(violations[0].element_context.tag, "select");
        assert_eq!(violations[1].element_context.tag, "textarea");
    }

    #[test]
    fn test_dynamic_id_cannot_match_literal_label() {
        let source =
            r#"<label for="user_1">Name</label><input type="text" id="user_<%= @user.id %>">"#;
        assert_eq!(run(RuleId::FormLabels, source).len(), 1);
    }

    #[test]
    fn test_dynamic_id_with_dynamic_label() {
        let source =
            r#"<label for="<%= field_id %>">Name</label><input type="text" id="<%= field_id %>">"#;
        assert!(run(RuleId::FormLabels, source).is_empty());
    }

    #[test]
    fn test_invalid_field_without_message() {
        let source = r#"<label for="e">Email</label><input id="e" class="is-invalid">"#;
        let violations = run(RuleId::FormErrors, source);
        assert_eq!(violations.len(), 1);
        assert!(violations[0].message.contains("no associated error message"));
    }

    #[test]
    fn test_invalid_field_with_describedby() {
        let source = concat!(
            r#"<input id="e" aria-invalid="true" aria-describedby="e-error">"#,
            r#"<p id="e-error">Email is required</p>"#
        );
        assert!(run(RuleId::FormErrors, source).is_empty());
    }

    #[test]
    fn test_describedby_pointing_nowhere() {
        let source = r#"<input id="e" aria-invalid="true" aria-describedby="gone">"#;
        let violations = run(RuleId::FormErrors, source);
        assert_eq!(violations.len(), 1);
        assert!(violations[0].message.contains("gone"));
    }

    #[test]
    fn test_adjacent_error_node() {
        let source = concat!(
            r#"<div><input id="e" class="is-invalid">"#,
            r#"<div class="invalid-feedback">Required</div></div>"#
        );
        assert!(run(RuleId::FormErrors, source).is_empty());
    }

    #[test]
    fn test_field_with_errors_wrapper() {
        let flagged = r#"<div class="field_with_errors"><input id="name"></div>"#;
        assert_eq!(run(RuleId::FormErrors, flagged).len(), 1);

        let described = concat!(
            r#"<div class="field"><div class="field_with_errors"><input id="name"></div>"#,
            r#"<span class="error">can't be blank</span></div>"#
        );
        assert!(run(RuleId::FormErrors, described).is_empty());
    }

    #[test]
    fn test_valid_fields_are_ignored() {
        let source = r#"<input id="e" class="form-control"><div class="error">Oops</div>"#;
        assert!(run(RuleId::FormErrors, source).is_empty());
    }
}
