//! Every page needs a main landmark, from the view or its layout

use super::{landmarks_in, CheckError};
use crate::markup::Document;
use crate::rule::RuleId;
use crate::violation::{PageContext, Violation};

pub(super) fn check(doc: &Document, page: &PageContext) -> Result<Vec<Violation>, CheckError> {
    if !page.kind.is_page() || page.inherited_landmarks.contains("main") {
        return Ok(Vec::new());
    }
    if landmarks_in(doc).any(|landmark| landmark == "main") {
        return Ok(Vec::new());
    }
    Ok(vec![Violation::page_level(
        RuleId::LandmarkPresence,
        "Page has no <main> landmark",
        page,
    )])
}
