//! Template-to-markup extraction
//!
//! Strips embedded code regions (`<% %>`, `<%= %>`, `<%# %>`) from template
//! source and produces plain markup plus a [`PositionMap`] back to the
//! original file.
//!
//! Every region is replaced in place by text containing exactly the same
//! number of newlines, so line `N` of the markup is always line `N` of the
//! source. Output regions become [`DYNAMIC_PLACEHOLDER`], which checks treat
//! as "non-empty, value unknown". Logic and comment regions become blank.
//!
//! The end of a region is the first `%>` not written as `%%>`. Quote state
//! inside the embedded code is not tracked, so a `%>` inside a string literal
//! still terminates the region. This is an approximation.

use std::fmt;
use thiserror::Error;

/// Token substituted for every output region
pub const DYNAMIC_PLACEHOLDER: &str = "__viewlint_dynamic__";

/// Returns true if the value was produced (at least partly) by template code
pub fn is_dynamic(value: &str) -> bool {
    value.contains(DYNAMIC_PLACEHOLDER)
}

/// Error raised while extracting markup from one template
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractionError {
    #[error("unterminated {form} region starting at line {line}, column {column}")]
    Unterminated {
        form: CodeForm,
        line: usize,
        column: usize,
    },
}

impl ExtractionError {
    /// Source line the error points at
    pub fn line(&self) -> usize {
        match self {
            ExtractionError::Unterminated { line, .. } => *line,
        }
    }
}

/// Kind of embedded code region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodeForm {
    /// `<%= expr %>`: renders a value
    Output,
    /// `<% stmt %>`: control flow, renders nothing itself
    Logic,
    /// `<%# text %>`
    Comment,
}

impl fmt::Display for CodeForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodeForm::Output => write!(f, "output"),
            CodeForm::Logic => write!(f, "logic"),
            CodeForm::Comment => write!(f, "comment"),
        }
    }
}

/// A code region found in the source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeRegion {
    pub form: CodeForm,
    /// Byte offset of `<%` in the source
    pub start: usize,
    /// Byte offset just past `%>` in the source
    pub end: usize,
    /// 1-based line of `<%`
    pub line: usize,
}

#[derive(Debug, Clone)]
enum SegmentKind {
    /// Copied verbatim, same length on both sides
    Literal,
    /// Source text replaced by different markup text
    Replaced {
        source_len: usize,
        /// Offsets of '\n' inside the source span, relative to its start
        source_newlines: Vec<usize>,
    },
}

#[derive(Debug, Clone)]
struct Segment {
    markup_start: usize,
    source_start: usize,
    kind: SegmentKind,
}

/// A resolved position in the original template
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourcePosition {
    /// Byte offset in the source
    pub offset: usize,
    /// 1-based line
    pub line: usize,
    /// 1-based column (bytes)
    pub column: usize,
}

/// Maps offsets and lines in extracted markup back to the template source.
///
/// Monotonic non-decreasing in both directions. Line mapping is the identity
/// because extraction never changes the number of newlines.
#[derive(Debug, Clone)]
pub struct PositionMap {
    segments: Vec<Segment>,
    markup_len: usize,
    source_len: usize,
    source_line_starts: Vec<usize>,
}

impl PositionMap {
    /// Map for markup that was not extracted from a template
    pub fn identity(text: &str) -> Self {
        Self {
            segments: vec![Segment {
                markup_start: 0,
                source_start: 0,
                kind: SegmentKind::Literal,
            }],
            markup_len: text.len(),
            source_len: text.len(),
            source_line_starts: line_starts(text),
        }
    }

    /// Number of lines covered by the map
    pub fn line_count(&self) -> usize {
        self.source_line_starts.len()
    }

    /// Map a markup byte offset to a source byte offset
    pub fn source_offset(&self, markup_offset: usize) -> usize {
        let markup_offset = markup_offset.min(self.markup_len);
        let idx = self
            .segments
            .partition_point(|s| s.markup_start <= markup_offset)
            .saturating_sub(1);
        let Some(segment) = self.segments.get(idx) else {
            return 0;
        };
        let delta = markup_offset - segment.markup_start;

        let offset = match &segment.kind {
            SegmentKind::Literal => segment.source_start + delta,
            SegmentKind::Replaced {
                source_len,
                source_newlines,
            } => {
                // Land on the start of the same line inside the region
                let markup_newlines = self.markup_newlines_before(segment, markup_offset);
                match markup_newlines.checked_sub(1) {
                    Some(i) => match source_newlines.get(i) {
                        Some(nl) => segment.source_start + nl + 1,
                        None => segment.source_start + source_len,
                    },
                    None => segment.source_start,
                }
            }
        };

        offset.min(self.source_len)
    }

    /// Map a markup byte offset to a full source position
    pub fn source_position(&self, markup_offset: usize) -> SourcePosition {
        let offset = self.source_offset(markup_offset);
        let line = self
            .source_line_starts
            .partition_point(|&start| start <= offset)
            .max(1);
        let line_start = self.source_line_starts[line - 1];
        SourcePosition {
            offset,
            line,
            column: offset - line_start + 1,
        }
    }

    /// Map a 1-based markup line to its 1-based source line
    pub fn source_line(&self, markup_line: usize) -> Option<usize> {
        if markup_line >= 1 && markup_line <= self.line_count() {
            Some(markup_line)
        } else {
            None
        }
    }

    fn markup_newlines_before(&self, segment: &Segment, markup_offset: usize) -> usize {
        // Replacement text is only ever ASCII: placeholder/spaces then newlines
        let len = match &segment.kind {
            SegmentKind::Replaced { source_newlines, .. } => source_newlines.len(),
            SegmentKind::Literal => 0,
        };
        let head = self.replacement_head_len(segment);
        let delta = markup_offset - segment.markup_start;
        delta.saturating_sub(head).min(len)
    }

    fn replacement_head_len(&self, segment: &Segment) -> usize {
        let next_start = self
            .segments
            .iter()
            .find(|s| s.markup_start > segment.markup_start)
            .map(|s| s.markup_start)
            .unwrap_or(self.markup_len);
        let total = next_start - segment.markup_start;
        match &segment.kind {
            SegmentKind::Replaced { source_newlines, .. } => {
                total.saturating_sub(source_newlines.len())
            }
            SegmentKind::Literal => total,
        }
    }
}

/// Result of extracting one template
#[derive(Debug, Clone)]
pub struct Extraction {
    /// Markup with every code region neutralised
    pub markup: String,
    /// Mapping from markup back to the source
    pub map: PositionMap,
    /// Code regions in source order
    pub regions: Vec<CodeRegion>,
}

/// Extract markup from template source
pub fn extract(source: &str) -> Result<Extraction, ExtractionError> {
    let mut builder = Builder::new(source);
    let mut cursor = 0;

    while let Some(rel) = source[cursor..].find("<%") {
        let start = cursor + rel;

        // `<%%` renders a literal `<%`
        if source[start..].starts_with("<%%") {
            builder.literal(start);
            builder.replace(start, start + 3, "&lt;%");
            cursor = start + 3;
            continue;
        }

        let (form, body_start) = classify(source, start);
        let end = find_region_end(source, body_start).ok_or_else(|| {
            let (line, column) = line_col(source, start);
            ExtractionError::Unterminated { form, line, column }
        })?;

        builder.literal(start);
        let head = match form {
            CodeForm::Output => DYNAMIC_PLACEHOLDER,
            CodeForm::Logic | CodeForm::Comment => " ",
        };
        let newlines = source[start..end].matches('\n').count();
        let mut replacement = String::with_capacity(head.len() + newlines);
        replacement.push_str(head);
        replacement.extend(std::iter::repeat('\n').take(newlines));
        builder.replace(start, end, &replacement);
        builder.regions.push(CodeRegion {
            form,
            start,
            end,
            line: line_col(source, start).0,
        });

        cursor = end;
    }

    builder.literal(source.len());
    Ok(builder.finish())
}

/// Determine the region form and where its body starts
fn classify(source: &str, start: usize) -> (CodeForm, usize) {
    let mut pos = start + 2;
    let rest = &source[pos..];
    if rest.starts_with('-') {
        pos += 1;
    }
    match source[pos..].chars().next() {
        Some('=') => {
            let extra = if source[pos + 1..].starts_with('=') { 2 } else { 1 };
            (CodeForm::Output, pos + extra)
        }
        Some('#') => (CodeForm::Comment, pos + 1),
        _ => (CodeForm::Logic, pos),
    }
}

/// Offset just past the first unescaped `%>` at or after `from`
fn find_region_end(source: &str, from: usize) -> Option<usize> {
    let bytes = source.as_bytes();
    let mut search = from;
    while let Some(rel) = source[search..].find("%>") {
        let pos = search + rel;
        if pos > from && bytes[pos - 1] == b'%' {
            search = pos + 2;
            continue;
        }
        return Some(pos + 2);
    }
    None
}

fn line_starts(text: &str) -> Vec<usize> {
    std::iter::once(0)
        .chain(text.match_indices('\n').map(|(i, _)| i + 1))
        .collect()
}

fn line_col(text: &str, offset: usize) -> (usize, usize) {
    let before = &text[..offset];
    let line = before.matches('\n').count() + 1;
    let line_start = before.rfind('\n').map(|i| i + 1).unwrap_or(0);
    (line, offset - line_start + 1)
}

struct Builder<'a> {
    source: &'a str,
    markup: String,
    segments: Vec<Segment>,
    regions: Vec<CodeRegion>,
    copied_to: usize,
}

impl<'a> Builder<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            markup: String::with_capacity(source.len()),
            segments: Vec::new(),
            regions: Vec::new(),
            copied_to: 0,
        }
    }

    /// Copy source text verbatim up to `until`
    fn literal(&mut self, until: usize) {
        if until <= self.copied_to {
            return;
        }
        self.segments.push(Segment {
            markup_start: self.markup.len(),
            source_start: self.copied_to,
            kind: SegmentKind::Literal,
        });
        self.markup.push_str(&self.source[self.copied_to..until]);
        self.copied_to = until;
    }

    fn replace(&mut self, start: usize, end: usize, replacement: &str) {
        let source_newlines = self.source[start..end]
            .match_indices('\n')
            .map(|(i, _)| i)
            .collect();
        self.segments.push(Segment {
            markup_start: self.markup.len(),
            source_start: start,
            kind: SegmentKind::Replaced {
                source_len: end - start,
                source_newlines,
            },
        });
        self.markup.push_str(replacement);
        self.copied_to = end;
    }

    fn finish(self) -> Extraction {
        let mut segments = self.segments;
        if segments.is_empty() {
            segments.push(Segment {
                markup_start: 0,
                source_start: 0,
                kind: SegmentKind::Literal,
            });
        }
        let map = PositionMap {
            segments,
            markup_len: self.markup.len(),
            source_len: self.source.len(),
            source_line_starts: line_starts(self.source),
        };
        Extraction {
            markup: self.markup,
            map,
            regions: self.regions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line_count(s: &str) -> usize {
        s.matches('\n').count() + 1
    }

    #[test]
    fn test_plain_markup_is_unchanged() {
        let source = "<div>\n  <p>Hello</p>\n</div>";
        let result = extract(source).unwrap();
        assert_eq!(result.markup, source);
        assert!(result.regions.is_empty());
        assert_eq!(result.map.source_offset(8), 8);
    }

    #[test]
    fn test_output_region_becomes_placeholder() {
        let result = extract(r#"<h1><%= @title %></h1>"#).unwrap();
        assert_eq!(result.markup, format!("<h1>{}</h1>", DYNAMIC_PLACEHOLDER));
        assert_eq!(result.regions.len(), 1);
        assert_eq!(result.regions[0].form, CodeForm::Output);
    }

    #[test]
    fn test_logic_and_comment_regions_become_blank() {
        let result = extract("<% if x %><p>a</p><% end %><%# note %>").unwrap();
        assert_eq!(result.markup, " <p>a</p>  ");
        assert_eq!(result.regions[0].form, CodeForm::Logic);
        assert_eq!(result.regions[2].form, CodeForm::Comment);
    }

    #[test]
    fn test_double_equals_and_trim_forms() {
        let result = extract("<%== raw %>|<%- x -%>|<%-= y %>").unwrap();
        assert_eq!(
            result.markup,
            format!("{}| |{}", DYNAMIC_PLACEHOLDER, DYNAMIC_PLACEHOLDER)
        );
    }

    #[test]
    fn test_placeholder_in_attribute_value() {
        let result = extract(r#"<input id="user_<%= @user.id %>">"#).unwrap();
        assert!(result
            .markup
            .contains(&format!(r#"id="user_{}""#, DYNAMIC_PLACEHOLDER)));
    }

    #[test]
    fn test_multiline_region_preserves_line_count() {
        let source = concat!(
            "<div>\n<%= link_to \"Home\",\n      root_path,\n",
            "      class: \"nav\" %>\n<p>x</p>\n</div>"
        );
        let result = extract(source).unwrap();
        assert_eq!(line_count(&result.markup), line_count(source));

        let p_markup = result.markup.find("<p>").unwrap();
        let pos = result.map.source_position(p_markup);
        assert_eq!(pos.line, 5);
        assert_eq!(pos.offset, source.find("<p>").unwrap());
    }

    #[test]
    fn test_every_line_maps_to_itself() {
        let source = "a\n<% if x\n  y %>\nb <%= z\n%> c\n";
        let result = extract(source).unwrap();
        assert_eq!(line_count(&result.markup), line_count(source));
        for line in 1..=result.map.line_count() {
            assert_eq!(result.map.source_line(line), Some(line));
        }
        assert_eq!(result.map.source_line(0), None);
        assert_eq!(result.map.source_line(result.map.line_count() + 1), None);
    }

    #[test]
    fn test_offsets_after_region_shift_back() {
        let source = "<%= long_expression_here %><p>x</p>";
        let result = extract(source).unwrap();
        let p_markup = result.markup.find("<p>").unwrap();
        assert_eq!(result.map.source_offset(p_markup), source.find("<p>").unwrap());
    }

    #[test]
    fn test_offsets_are_monotonic() {
        let source = "x<%= a %>\ny<% b\n c %>z\n<%# d %>w";
        let result = extract(source).unwrap();
        let mut last = 0;
        for offset in 0..=result.markup.len() {
            let mapped = result.map.source_offset(offset);
            assert!(mapped >= last, "offset {} mapped backwards", offset);
            last = mapped;
        }
    }

    #[test]
    fn test_unterminated_region_is_an_error() {
        let err = extract("<p>ok</p>\n  <%= oops").unwrap_err();
        assert_eq!(
            err,
            ExtractionError::Unterminated {
                form: CodeForm::Output,
                line: 2,
                column: 3
            }
        );
        assert_eq!(err.line(), 2);
    }

    #[test]
    fn test_escaped_end_marker_does_not_terminate() {
        let result = extract("<% x = '%%>' %><p>after</p>").unwrap();
        assert_eq!(result.regions.len(), 1);
        assert!(result.markup.ends_with("<p>after</p>"));
    }

    #[test]
    fn test_literal_open_marker() {
        let result = extract("<p><%% not code</p>").unwrap();
        assert_eq!(result.markup, "<p>&lt;% not code</p>");
        assert!(result.regions.is_empty());
    }

    #[test]
    fn test_blank_line_prefix_shifts_positions() {
        let source = "<main>\n<%= x %><img src=\"a.png\">\n</main>";
        let shifted = format!("\n{}", source);

        let a = extract(source).unwrap();
        let b = extract(&shifted).unwrap();
        let pa = a.map.source_position(a.markup.find("<img").unwrap());
        let pb = b.map.source_position(b.markup.find("<img").unwrap());
        assert_eq!(pb.line, pa.line + 1);
        assert_eq!(pb.column, pa.column);
    }

    #[test]
    fn test_is_dynamic() {
        assert!(is_dynamic(&format!("row-{}", DYNAMIC_PLACEHOLDER)));
        assert!(!is_dynamic("row-1"));
    }
}
