//! Data tables need <th> header cells

use super::CheckError;
use crate::markup::Document;
use crate::rule::RuleId;
use crate::violation::{PageContext, Violation};

pub(super) fn check(doc: &Document, page: &PageContext) -> Result<Vec<Violation>, CheckError> {
    let mut violations = Vec::new();

    for (id, table) in doc.elements_named("table") {
        if matches!(table.role(), Some("presentation") | Some("none")) {
            continue;
        }
        let has_header = doc
            .descendants(id)
            .into_iter()
            .any(|d| doc.node(d).is("th"));
        if !has_header {
            violations.push(Violation::new(
                RuleId::TableHeaders,
                "Table has no <th> header cells",
                doc.element_context(id),
                page,
            ));
        }
    }

    Ok(violations)
}
