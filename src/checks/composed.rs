//! Checks over a page composed from several templates
//!
//! Each template contributes an [`Outline`]; the page is its layout, view
//! and partials in render order. Repeats inside one template are left to
//! the per-template checks.

use super::landmarks_in;
use crate::extract::is_dynamic;
use crate::markup::Document;
use crate::rule::RuleId;
use crate::violation::{ElementContext, PageContext, Violation};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

/// Page-wide facts about one template
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Outline {
    pub landmarks: BTreeSet<String>,
    /// Literal ids in document order
    pub ids: Vec<(String, ElementContext)>,
    pub h1s: Vec<ElementContext>,
}

impl Outline {
    pub fn of(doc: &Document) -> Self {
        let ids = doc
            .elements()
            .filter_map(|(nid, node)| {
                let value = node.id()?.trim();
                if value.is_empty() || is_dynamic(value) {
                    return None;
                }
                Some((value.to_string(), doc.element_context(nid)))
            })
            .collect();
        Self {
            landmarks: landmarks_in(doc).map(str::to_string).collect(),
            ids,
            h1s: doc
                .elements_named("h1")
                .map(|(nid, _)| doc.element_context(nid))
                .collect(),
        }
    }
}

/// One template of a composed page
#[derive(Debug, Clone, Copy)]
pub struct PagePart<'a> {
    pub file: &'a Path,
    pub outline: &'a Outline,
    /// The page's own view, as opposed to its layout or a partial
    pub primary: bool,
}

/// Signature of checks that look at every template of a page at once
pub type PageCheckFn = fn(&[PagePart<'_>], &PageContext) -> Vec<Violation>;

/// The page-wide evaluator for a rule, if it has one
pub fn page_check(rule: RuleId) -> Option<PageCheckFn> {
    match rule {
        RuleId::DuplicateIds => Some(duplicate_ids),
        RuleId::HeadingHierarchy => Some(single_h1),
        _ => None,
    }
}

/// Context attributing a finding to the template of `part`
fn context_for(part: &PagePart<'_>, page: &PageContext) -> PageContext {
    let mut context = page.clone();
    context.fragment_file = if part.primary {
        None
    } else {
        Some(PathBuf::from(part.file))
    };
    context
}

fn location(part: &PagePart<'_>, element: &ElementContext) -> String {
    format!("{}:{}", part.file.display(), element.line)
}

/// Ids repeated across templates, reported once at the first occurrence
/// outside the template that holds the first one
fn duplicate_ids(parts: &[PagePart<'_>], page: &PageContext) -> Vec<Violation> {
    let mut order: Vec<&str> = Vec::new();
    let mut uses: HashMap<&str, Vec<(usize, &ElementContext)>> = HashMap::new();
    for (i, part) in parts.iter().enumerate() {
        for (value, element) in &part.outline.ids {
            let entry = uses.entry(value.as_str()).or_default();
            if entry.is_empty() {
                order.push(value.as_str());
            }
            entry.push((i, element));
        }
    }

    let mut violations = Vec::new();
    for value in order {
        let occurrences = &uses[value];
        let first = occurrences[0].0;
        let Some(&(at, element)) = occurrences.iter().find(|(i, _)| *i != first) else {
            continue;
        };
        let places: Vec<String> = occurrences
            .iter()
            .map(|&(i, e)| location(&parts[i], e))
            .collect();
        violations.push(Violation::new(
            RuleId::DuplicateIds,
            format!(
                "id \"{}\" is used by {} elements across the page ({})",
                value,
                occurrences.len(),
                places.join(", ")
            ),
            element.clone(),
            &context_for(&parts[at], page),
        ));
    }
    violations
}

/// More than one h1 once layout, view and partials are put together
fn single_h1(parts: &[PagePart<'_>], page: &PageContext) -> Vec<Violation> {
    if !page.kind.is_page() {
        return Vec::new();
    }
    let h1s: Vec<(usize, &ElementContext)> = parts
        .iter()
        .enumerate()
        .flat_map(|(i, part)| part.outline.h1s.iter().map(move |e| (i, e)))
        .collect();
    if h1s.len() < 2 {
        return Vec::new();
    }

    let first = h1s[0].0;
    let single_template = h1s.iter().all(|(i, _)| *i == first);
    // Repeats inside the view are the per-template check's
    if single_template && parts[first].primary {
        return Vec::new();
    }
    let (at, element) = h1s
        .iter()
        .copied()
        .find(|(i, _)| *i != first)
        .unwrap_or(h1s[1]);

    let places: Vec<String> = h1s.iter().map(|&(i, e)| location(&parts[i], e)).collect();
    vec![Violation::new(
        RuleId::HeadingHierarchy,
        format!("Page has more than one <h1> ({})", places.join(", ")),
        element.clone(),
        &context_for(&parts[at], page),
    )]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::extract;
    use crate::violation::TemplateKind;
    use pretty_assertions::assert_eq;

    fn outline(source: &str) -> Outline {
        let extraction = extract(source).unwrap();
        Outline::of(&Document::parse(&extraction.markup, &extraction.map).unwrap())
    }

    fn page() -> PageContext {
        PageContext::for_file("app/views/users/new.html.erb")
    }

    #[test]
    fn test_outline_skips_dynamic_ids() {
        let o = outline(r#"<main id="content"><h1>T</h1><p id="row-<%= r.id %>"></p></main>"#);
        let ids: Vec<&str> = o.ids.iter().map(|(v, _)| v.as_str()).collect();
        assert_eq!(ids, vec!["content"]);
        assert_eq!(o.h1s.len(), 1);
        assert!(o.landmarks.contains("main"));
    }

    #[test]
    fn test_id_shared_by_view_and_partial() {
        let view = outline("<form>\n<p id=\"email\"></p>\n</form>");
        let card = outline("<p id=\"email\"></p>");
        let parts = [
            PagePart {
                file: Path::new("app/views/users/new.html.erb"),
                outline: &view,
                primary: true,
            },
            PagePart {
                file: Path::new("app/views/users/_card.html.erb"),
                outline: &card,
                primary: false,
            },
        ];

        let violations = duplicate_ids(&parts, &page());
        assert_eq!(violations.len(), 1);
        assert_eq!(
            violations[0].message,
            "id \"email\" is used by 2 elements across the page \
             (app/views/users/new.html.erb:2, app/views/users/_card.html.erb:1)"
        );
        assert_eq!(
            violations[0].page_context.fragment_file,
            Some(PathBuf::from("app/views/users/_card.html.erb"))
        );
        assert_eq!(violations[0].source_line, Some(1));
    }

    #[test]
    fn test_repeat_within_one_template_is_left_alone() {
        let view = outline(r#"<p id="x"></p><p id="x"></p>"#);
        let layout = outline(r#"<main id="main"></main>"#);
        let parts = [
            PagePart {
                file: Path::new("app/views/layouts/application.html.erb"),
                outline: &layout,
                primary: false,
            },
            PagePart {
                file: Path::new("app/views/users/new.html.erb"),
                outline: &view,
                primary: true,
            },
        ];
        assert!(duplicate_ids(&parts, &page()).is_empty());
    }

    #[test]
    fn test_h1_in_layout_and_view() {
        let layout = outline("<header><h1>Shop</h1></header>");
        let view = outline("<h1>New user</h1>");
        let parts = [
            PagePart {
                file: Path::new("app/views/layouts/application.html.erb"),
                outline: &layout,
                primary: false,
            },
            PagePart {
                file: Path::new("app/views/users/new.html.erb"),
                outline: &view,
                primary: true,
            },
        ];

        let violations = single_h1(&parts, &page());
        assert_eq!(violations.len(), 1);
        assert!(violations[0].message.starts_with("Page has more than one <h1>"));
        assert_eq!(violations[0].page_context.fragment_file, None);
        assert_eq!(violations[0].element_context.text, "New user");
    }

    #[test]
    fn test_h1s_only_in_view_are_not_repeated() {
        let view = outline("<h1>A</h1><h1>B</h1>");
        let parts = [PagePart {
            file: Path::new("app/views/users/new.html.erb"),
            outline: &view,
            primary: true,
        }];
        assert!(single_h1(&parts, &page()).is_empty());
    }

    #[test]
    fn test_h1s_need_a_page() {
        let a = outline("<h1>A</h1>");
        let b = outline("<h1>B</h1>");
        let parts = [
            PagePart {
                file: Path::new("a.html.erb"),
                outline: &a,
                primary: true,
            },
            PagePart {
                file: Path::new("_b.html.erb"),
                outline: &b,
                primary: false,
            },
        ];
        let partial = page().with_kind(TemplateKind::Partial);
        assert!(single_h1(&parts, &partial).is_empty());
    }
}
