//! Literal ids repeated within one template

use super::CheckError;
use crate::extract::is_dynamic;
use crate::markup::Document;
use crate::rule::RuleId;
use crate::violation::{PageContext, Violation};

/// One violation per repeated literal id, anchored at the second occurrence
pub(super) fn check(doc: &Document, page: &PageContext) -> Result<Vec<Violation>, CheckError> {
    let index = doc.id_index();
    let mut repeated: Vec<(&str, &Vec<_>)> = index
        .iter()
        .filter(|(value, nodes)| nodes.len() > 1 && !is_dynamic(value))
        .map(|(value, nodes)| (*value, nodes))
        .collect();
    // Document order, not hash order
    repeated.sort_by_key(|(_, nodes)| nodes[0]);

    let violations = repeated
        .into_iter()
        .map(|(value, nodes)| {
            let lines: Vec<String> = nodes
                .iter()
                .map(|&n| doc.node(n).line.to_string())
                .collect();
            Violation::new(
                RuleId::DuplicateIds,
                format!(
                    "id \"{}\" is used by {} elements (lines {})",
                    value,
                    nodes.len(),
                    lines.join(", ")
                ),
                doc.element_context(nodes[1]),
                page,
            )
        })
        .collect();

    Ok(violations)
}
