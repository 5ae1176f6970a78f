//! Markup document
//!
//! Nodes live in a flat arena in document order. Parent and child links are
//! indices into that arena.

use super::{is_void, MarkupError, Node, NodeId, NodeKind, RAW_TEXT_ELEMENTS};
use crate::extract::PositionMap;
use crate::violation::ElementContext;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::HashMap;

/// Stands in for a `<` that cannot open a tag, so the reader keeps it as text
const STRAY_LT: u8 = 0x1a;

/// Maximum characters of text kept in an element context
const CONTEXT_TEXT_LIMIT: usize = 80;

/// Tags and roles that mark a page region
const REGION_TAGS: &[&str] = &["nav", "header", "footer", "aside", "main", "dialog"];
const REGION_ROLES: &[&str] = &[
    "navigation",
    "banner",
    "contentinfo",
    "complementary",
    "main",
    "dialog",
    "alertdialog",
];

/// A parsed markup document
#[derive(Debug, Clone, Default)]
pub struct Document {
    nodes: Vec<Node>,
    roots: Vec<NodeId>,
}

impl Document {
    /// Parse extracted markup, positioning nodes through the map
    pub fn parse(markup: &str, map: &PositionMap) -> Result<Self, MarkupError> {
        let masked = mask_stray_lt(&mask_raw_text(markup));
        let mut reader = Reader::from_str(&masked);
        let config = reader.config_mut();
        config.trim_text(false);
        config.check_end_names = false;
        config.allow_unmatched_ends = true;
        config.check_comments = false;

        let mut builder = TreeBuilder::default();

        loop {
            let start = reader.buffer_position() as usize;
            match reader.read_event() {
                Ok(Event::Start(e)) => {
                    let (name, attrs) = read_tag(&e);
                    if name.is_empty() {
                        continue;
                    }
                    let pos = map.source_position(start);
                    let void = is_void(&name);
                    builder.open(name, attrs, pos.line, pos.column, !void);
                }
                Ok(Event::Empty(e)) => {
                    let (name, attrs) = read_tag(&e);
                    if name.is_empty() {
                        continue;
                    }
                    let pos = map.source_position(start);
                    builder.open(name, attrs, pos.line, pos.column, false);
                }
                Ok(Event::End(e)) => {
                    let name = String::from_utf8_lossy(e.name().as_ref()).to_ascii_lowercase();
                    builder.close(&name);
                }
                Ok(Event::Text(e)) => {
                    let text = restore_stray_lt(String::from_utf8_lossy(&e).into_owned());
                    let leading = text.len() - text.trim_start().len();
                    if leading < text.len() {
                        let pos = map.source_position(start + leading);
                        builder.leaf(NodeKind::Text, text, pos.line, pos.column);
                    }
                }
                Ok(Event::CData(e)) => {
                    let text = String::from_utf8_lossy(&e).into_owned();
                    let pos = map.source_position(start);
                    builder.leaf(NodeKind::Text, text, pos.line, pos.column);
                }
                Ok(Event::Comment(e)) => {
                    let text = String::from_utf8_lossy(&e).into_owned();
                    let pos = map.source_position(start);
                    builder.leaf(NodeKind::Comment, text, pos.line, pos.column);
                }
                Ok(Event::Eof) => break,
                Err(e) => {
                    let pos = map.source_position(reader.error_position() as usize);
                    return Err(MarkupError::Syntax {
                        line: pos.line,
                        message: e.to_string(),
                    });
                }
                _ => {}
            }
        }

        Ok(builder.finish())
    }

    /// Parse markup that did not come from a template
    pub fn parse_html(markup: &str) -> Result<Self, MarkupError> {
        Self::parse(markup, &PositionMap::identity(markup))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    /// All nodes in document order
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes.iter().enumerate().map(|(i, n)| (NodeId(i), n))
    }

    /// All elements in document order
    pub fn elements(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.iter().filter(|(_, n)| n.is_element())
    }

    /// Elements with the given tag, in document order
    pub fn elements_named<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = (NodeId, &'a Node)> {
        self.elements().filter(move |(_, n)| n.name == tag)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.get(id).and_then(|n| n.parent)
    }

    /// Element children of a node
    pub fn element_children(&self, id: NodeId) -> impl Iterator<Item = (NodeId, &Node)> {
        self.node(id)
            .children
            .iter()
            .map(move |&child| (child, self.node(child)))
            .filter(|(_, n)| n.is_element())
    }

    /// Walk from the parent of `id` up to the root
    pub fn ancestors(&self, id: NodeId) -> Ancestors<'_> {
        Ancestors {
            doc: self,
            next: self.parent(id),
        }
    }

    /// Every node below `id`, in document order
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.node(id).children.iter().rev().copied().collect();
        while let Some(current) = stack.pop() {
            out.push(current);
            stack.extend(self.node(current).children.iter().rev().copied());
        }
        out
    }

    /// Concatenated text of all text nodes below `id`
    pub fn text_content(&self, id: NodeId) -> String {
        let node = self.node(id);
        if node.is_text() {
            return node.text.clone().unwrap_or_default();
        }
        let mut out = String::new();
        for child in self.descendants(id) {
            let n = self.node(child);
            if let (NodeKind::Text, Some(text)) = (n.kind, &n.text) {
                if !out.is_empty() {
                    out.push(' ');
                }
                out.push_str(text.trim());
            }
        }
        out.trim().to_string()
    }

    /// First element carrying the given id attribute
    pub fn element_by_id(&self, id: &str) -> Option<NodeId> {
        self.elements()
            .find(|(_, n)| n.attr("id").map(str::trim) == Some(id))
            .map(|(nid, _)| nid)
    }

    /// Index of id attribute value -> elements carrying it
    pub fn id_index(&self) -> HashMap<&str, Vec<NodeId>> {
        let mut index: HashMap<&str, Vec<NodeId>> = HashMap::new();
        for (nid, node) in self.elements() {
            if let Some(value) = node.id() {
                index.entry(value.trim()).or_default().push(nid);
            }
        }
        index
    }

    /// Nearest element ancestor matching the predicate
    pub fn closest<F>(&self, id: NodeId, predicate: F) -> Option<NodeId>
    where
        F: Fn(&Node) -> bool,
    {
        self.ancestors(id).find(|&a| predicate(self.node(a)))
    }

    /// Describe an element for reporting
    pub fn element_context(&self, id: NodeId) -> ElementContext {
        let node = self.node(id);
        let mut text = self.text_content(id);
        if text.chars().count() > CONTEXT_TEXT_LIMIT {
            text = text.chars().take(CONTEXT_TEXT_LIMIT).collect::<String>() + "...";
        }

        let region = self
            .closest(id, is_region)
            .map(|r| self.node(r).summary());

        ElementContext {
            tag: node.name.clone(),
            id: node.id().map(str::to_string),
            classes: node.classes().map(str::to_string).collect(),
            href: node.attr("href").map(str::to_string),
            src: node.attr("src").map(str::to_string),
            text,
            parent: self.parent(id).map(|p| self.node(p).summary()),
            region,
            line: node.line,
            column: node.column,
        }
    }
}

fn is_region(node: &Node) -> bool {
    REGION_TAGS.contains(&node.name.as_str())
        || node
            .role()
            .map(|role| REGION_ROLES.contains(&role))
            .unwrap_or(false)
}

/// Iterator over a node's ancestors, nearest first
pub struct Ancestors<'a> {
    doc: &'a Document,
    next: Option<NodeId>,
}

impl Iterator for Ancestors<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let current = self.next?;
        self.next = self.doc.parent(current);
        Some(current)
    }
}

#[derive(Default)]
struct TreeBuilder {
    nodes: Vec<Node>,
    roots: Vec<NodeId>,
    stack: Vec<NodeId>,
}

impl TreeBuilder {
    fn push(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len());
        match node.parent {
            Some(parent) => self.nodes[parent.0].children.push(id),
            None => self.roots.push(id),
        }
        self.nodes.push(node);
        id
    }

    fn open(
        &mut self,
        name: String,
        attrs: Vec<(String, String)>,
        line: usize,
        column: usize,
        keep_open: bool,
    ) {
        let id = self.push(Node {
            kind: NodeKind::Element,
            name,
            attrs,
            parent: self.stack.last().copied(),
            children: Vec::new(),
            text: None,
            line,
            column,
        });
        if keep_open {
            self.stack.push(id);
        }
    }

    fn close(&mut self, name: &str) {
        if let Some(pos) = self
            .stack
            .iter()
            .rposition(|&open| self.nodes[open.0].name == name)
        {
            self.stack.truncate(pos);
        }
    }

    fn leaf(&mut self, kind: NodeKind, text: String, line: usize, column: usize) {
        let name = match kind {
            NodeKind::Comment => "#comment",
            _ => "#text",
        };
        self.push(Node {
            kind,
            name: name.to_string(),
            attrs: Vec::new(),
            parent: self.stack.last().copied(),
            children: Vec::new(),
            text: Some(text),
            line,
            column,
        });
    }

    fn finish(self) -> Document {
        Document {
            nodes: self.nodes,
            roots: self.roots,
        }
    }
}

fn read_tag(e: &BytesStart<'_>) -> (String, Vec<(String, String)>) {
    let name = String::from_utf8_lossy(e.name().as_ref()).to_ascii_lowercase();
    let attrs = e
        .html_attributes()
        .flatten()
        .map(|attr| {
            let key = String::from_utf8_lossy(attr.key.as_ref()).to_ascii_lowercase();
            let value = restore_stray_lt(String::from_utf8_lossy(&attr.value).into_owned());
            (key, value)
        })
        .collect();
    (name, attrs)
}

/// Blank out script and style bodies, keeping byte offsets and newlines
fn mask_raw_text(markup: &str) -> String {
    let lower = markup.to_ascii_lowercase();
    let mut bytes = markup.as_bytes().to_vec();
    let mut cursor = 0;

    while cursor < lower.len() {
        let next = RAW_TEXT_ELEMENTS
            .iter()
            .filter_map(|tag| {
                lower[cursor..]
                    .find(&format!("<{}", tag))
                    .map(|rel| (cursor + rel, *tag))
            })
            .min_by_key(|(pos, _)| *pos);
        let Some((open, tag)) = next else {
            break;
        };
        let Some(body_start) = lower[open..].find('>').map(|rel| open + rel + 1) else {
            break;
        };
        let close_tag = format!("</{}", tag);
        let body_end = lower[body_start..]
            .find(&close_tag)
            .map(|rel| body_start + rel)
            .unwrap_or(lower.len());

        for b in &mut bytes[body_start..body_end] {
            if *b != b'\n' {
                *b = b' ';
            }
        }
        cursor = body_end + close_tag.len().min(lower.len() - body_end);
        if body_end == lower.len() {
            break;
        }
    }

    // Only ASCII bytes were replaced, and whole UTF-8 sequences become spaces
    String::from_utf8(bytes).unwrap_or_else(|_| markup.to_string())
}

/// Mask `<` not followed by a tag name, `/`, `!` or `?` (`a < b`, `x <= 3`)
fn mask_stray_lt(markup: &str) -> String {
    let source = markup.as_bytes();
    let mut bytes = source.to_vec();
    for (i, &b) in source.iter().enumerate() {
        if b != b'<' {
            continue;
        }
        let opens_tag = source
            .get(i + 1)
            .map(|&next| next.is_ascii_alphabetic() || matches!(next, b'/' | b'!' | b'?'))
            .unwrap_or(false);
        if !opens_tag {
            bytes[i] = STRAY_LT;
        }
    }
    String::from_utf8(bytes).unwrap_or_else(|_| markup.to_string())
}

fn restore_stray_lt(text: String) -> String {
    if text.contains(STRAY_LT as char) {
        text.replace(STRAY_LT as char, "<")
    } else {
        text
    }
}
