//! Rules that need a rendered page to evaluate
//!
//! Skip-link order and color contrast depend on focus order and computed
//! styles. Static markup has neither, so both report nothing.

use super::CheckError;
use crate::markup::Document;
use crate::violation::{PageContext, Violation};

pub(super) fn check_skip_link(
    _doc: &Document,
    _page: &PageContext,
) -> Result<Vec<Violation>, CheckError> {
    Ok(Vec::new())
}

pub(super) fn check_color_contrast(
    _doc: &Document,
    _page: &PageContext,
) -> Result<Vec<Violation>, CheckError> {
    Ok(Vec::new())
}
