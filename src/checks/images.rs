//! Images need alternative text

use super::CheckError;
use crate::markup::Document;
use crate::rule::RuleId;
use crate::violation::{PageContext, Severity, Violation};

pub(super) fn check(doc: &Document, page: &PageContext) -> Result<Vec<Violation>, CheckError> {
    let mut violations = Vec::new();

    for (id, img) in doc.elements_named("img") {
        match img.attr("alt") {
            None => violations.push(Violation::new(
                RuleId::ImageAlt,
                "Image is missing an alt attribute",
                doc.element_context(id),
                page,
            )),
            Some(alt) if alt.trim().is_empty() => violations.push(
                Violation::new(
                    RuleId::ImageAlt,
                    "Image has empty alt text; confirm it is decorative",
                    doc.element_context(id),
                    page,
                )
                .with_severity(Severity::Warning),
            ),
            Some(_) => {}
        }
    }

    Ok(violations)
}

#[cfg(test)]
mod tests {
    use crate::checks::test_support::run;
    use crate::rule::RuleId;
    use crate::violation::Severity;

    #[test]
    fn test_missing_alt_is_error() {
        let violations = run(RuleId::ImageAlt, r#"<img src="/logo.png">"#);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].severity, Severity::Error);
        assert_eq!(violations[0].element_context.src.as_deref(), Some("/logo.png"));
    }

    #[test]
    fn test_empty_alt_is_warning() {
        let violations = run(RuleId::ImageAlt, r#"<img src="/divider.png" alt="">"#);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].severity, Severity::Warning);
    }

    #[test]
    fn test_dynamic_alt_counts_as_present() {
        let source = r#"<img src="<%= @user.avatar %>" alt="<%= @user.name %>">"#;
        let violations = run(RuleId::ImageAlt, source);
        assert!(violations.is_empty());
    }

    #[test]
    fn test_line_points_at_image() {
        let source = "<div>\n  <p>text</p>\n  <img src=\"a.png\">\n</div>";
        let violations = run(RuleId::ImageAlt, source);
        assert_eq!(violations[0].source_line, Some(3));
        assert_eq!(violations[0].element_context.column, 3);
    }
}
