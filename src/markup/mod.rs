//! Markup model
//!
//! A lenient HTML tree built on top of quick-xml. Unclosed and mismatched
//! tags are tolerated: void elements never take children, and an end tag
//! closes the nearest open element with the same name or is ignored.

mod document;

pub use document::{Ancestors, Document};

use thiserror::Error;

/// Elements that never have content or an end tag
pub const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param",
    "source", "track", "wbr",
];

/// Elements whose body is raw text, not markup
pub const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style"];

/// Returns true for elements that cannot have children
pub fn is_void(name: &str) -> bool {
    VOID_ELEMENTS.contains(&name)
}

/// Markup parse error
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MarkupError {
    #[error("markup syntax error at line {line}: {message}")]
    Syntax { line: usize, message: String },
}

impl MarkupError {
    pub fn line(&self) -> usize {
        match self {
            MarkupError::Syntax { line, .. } => *line,
        }
    }
}

/// Index of a node in a [`Document`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Element,
    Text,
    Comment,
}

/// A node in the markup tree
#[derive(Debug, Clone)]
pub struct Node {
    pub kind: NodeKind,
    /// Lowercase tag name, `#text` or `#comment`
    pub name: String,
    /// Attributes in source order, names lowercased
    pub attrs: Vec<(String, String)>,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    /// Raw content for text and comment nodes
    pub text: Option<String>,
    /// 1-based line in the template source
    pub line: usize,
    /// 1-based column in the template source
    pub column: usize,
}

impl Node {
    pub fn is_element(&self) -> bool {
        self.kind == NodeKind::Element
    }

    pub fn is_text(&self) -> bool {
        self.kind == NodeKind::Text
    }

    /// Element with the given (lowercase) tag name
    pub fn is(&self, tag: &str) -> bool {
        self.is_element() && self.name == tag
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.attrs.iter().any(|(key, _)| key == name)
    }

    /// Attribute value, ignoring whitespace-only values
    pub fn non_empty_attr(&self, name: &str) -> Option<&str> {
        self.attr(name).filter(|value| !value.trim().is_empty())
    }

    pub fn id(&self) -> Option<&str> {
        self.non_empty_attr("id")
    }

    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.attr("class").unwrap_or("").split_whitespace()
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes().any(|c| c == class)
    }

    pub fn role(&self) -> Option<&str> {
        self.non_empty_attr("role").map(str::trim)
    }

    /// `tag#id.class1.class2`
    pub fn summary(&self) -> String {
        let mut out = self.name.clone();
        if let Some(id) = self.id() {
            out.push('#');
            out.push_str(id);
        }
        for class in self.classes() {
            out.push('.');
            out.push_str(class);
        }
        out
    }
}
