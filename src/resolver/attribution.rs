//! Heuristic fragment attribution
//!
//! Rendered markup carries no record of which template produced which
//! element. These functions guess from naming conventions: an element inside
//! `nav.main-nav` probably came from `_nav.html.erb`. The result is a best
//! guess, never a guarantee.

use super::graph::template_stem;
use crate::violation::ElementContext;
use std::path::{Path, PathBuf};

/// Page region an element seems to belong to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Region {
    Navigation,
    Header,
    Footer,
    Sidebar,
    Flash,
}

impl Region {
    const ALL: [Region; 5] = [
        Region::Navigation,
        Region::Header,
        Region::Footer,
        Region::Sidebar,
        Region::Flash,
    ];

    /// Words that name this region in ids, classes and file names
    pub fn keywords(&self) -> &'static [&'static str] {
        match self {
            Region::Navigation => &["nav", "navbar", "navigation", "menu", "breadcrumb"],
            Region::Header => &["header", "masthead", "banner", "topbar"],
            Region::Footer => &["footer", "colophon"],
            Region::Sidebar => &["sidebar", "aside", "sidenav"],
            Region::Flash => &["flash", "alert", "notice", "messages"],
        }
    }

    fn from_tag(tag: &str) -> Option<Region> {
        match tag {
            "nav" => Some(Region::Navigation),
            "header" => Some(Region::Header),
            "footer" => Some(Region::Footer),
            "aside" => Some(Region::Sidebar),
            _ => None,
        }
    }
}

/// Where a violation most plausibly came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attribution {
    /// The page's own template
    Primary,
    /// A specific fragment
    Fragment(PathBuf),
    /// More than one fragment fits equally well
    Unknown,
}

/// Split an identifier into lowercase words: `main-nav_bar` -> `main`, `nav`, `bar`
fn words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_ascii_lowercase())
}

fn region_in_words(text: &str) -> Option<Region> {
    let found: Vec<String> = words(text).collect();
    Region::ALL.into_iter().find(|region| {
        region
            .keywords()
            .iter()
            .any(|k| found.iter().any(|w| w == k))
    })
}

/// Region named by a `tag#id.class` summary
fn region_in_summary(summary: &str) -> Option<Region> {
    let tag_end = summary.find(['#', '.']).unwrap_or(summary.len());
    Region::from_tag(&summary[..tag_end]).or_else(|| region_in_words(&summary[tag_end..]))
}

/// Guess the region of an element from its tag, id, classes and surroundings
pub fn region_hint(element: &ElementContext) -> Option<Region> {
    Region::from_tag(&element.tag)
        .or_else(|| element.id.as_deref().and_then(region_in_words))
        .or_else(|| element.classes.iter().find_map(|c| region_in_words(c)))
        .or_else(|| element.parent.as_deref().and_then(region_in_summary))
        .or_else(|| element.region.as_deref().and_then(region_in_summary))
}

/// Region a fragment file name suggests: `_main_nav.html.erb` -> Navigation
pub fn fragment_region(path: &Path) -> Option<Region> {
    region_in_words(template_stem(path))
}

/// Attribute an element to the primary template or one of the fragments
pub fn attribute(element: &ElementContext, fragments: &[PathBuf]) -> Attribution {
    let Some(region) = region_hint(element) else {
        return Attribution::Primary;
    };

    let matching: Vec<&PathBuf> = fragments
        .iter()
        .filter(|f| fragment_region(f) == Some(region))
        .collect();

    match matching.as_slice() {
        [] => Attribution::Primary,
        [only] => Attribution::Fragment((*only).clone()),
        _ => Attribution::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn element(tag: &str) -> ElementContext {
        ElementContext {
            tag: tag.to_string(),
            ..Default::default()
        }
    }

    fn fragments() -> Vec<PathBuf> {
        vec![
            PathBuf::from("app/views/shared/_navbar.html.erb"),
            PathBuf::from("app/views/shared/_footer.html.erb"),
            PathBuf::from("app/views/users/_row.html.erb"),
        ]
    }

    #[test]
    fn test_region_from_tag() {
        assert_eq!(region_hint(&element("nav")), Some(Region::Navigation));
        assert_eq!(region_hint(&element("footer")), Some(Region::Footer));
        assert_eq!(region_hint(&element("div")), None);
    }

    #[test]
    fn test_region_from_classes_and_parent() {
        let mut a = element("a");
        a.classes = vec!["site-footer-link".to_string()];
        assert_eq!(region_hint(&a), Some(Region::Footer));

        let mut img = element("img");
        img.parent = Some("div#top.navbar-brand".to_string());
        assert_eq!(region_hint(&img), Some(Region::Navigation));

        let mut li = element("a");
        li.parent = Some("li".to_string());
        li.region = Some("header.site".to_string());
        assert_eq!(region_hint(&li), Some(Region::Header));
    }

    #[test]
    fn test_words_must_match_whole() {
        let mut a = element("a");
        a.classes = vec!["canvas".to_string()];
        assert_eq!(region_hint(&a), None);
    }

    #[test]
    fn test_attribute_to_fragment() {
        let mut a = element("a");
        a.region = Some("nav.main".to_string());
        assert_eq!(
            attribute(&a, &fragments()),
            Attribution::Fragment(PathBuf::from("app/views/shared/_navbar.html.erb"))
        );
    }

    #[test]
    fn test_attribute_to_primary() {
        assert_eq!(attribute(&element("img"), &fragments()), Attribution::Primary);

        let mut aside = element("aside");
        aside.id = Some("related".to_string());
        assert_eq!(attribute(&aside, &fragments()), Attribution::Primary);
    }

    #[test]
    fn test_attribute_ambiguous() {
        let fragments = vec![
            PathBuf::from("app/views/shared/_nav.html.erb"),
            PathBuf::from("app/views/admin/_menu.html.erb"),
        ];
        assert_eq!(attribute(&element("nav"), &fragments), Attribution::Unknown);
    }
}
