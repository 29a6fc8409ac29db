//! Word (DOCX) filler with run-aware placeholder matching.
//!
//! Word splits paragraph text into runs (`<w:r>`) whenever formatting,
//! spell-check state or revision ids change, so a typed `{{NOME}}` can
//! easily end up stored as `{{` + `NOME` + `}}` in three separate `<w:t>`
//! elements. Scanning the raw XML would miss it.
//!
//! The engine here therefore works per paragraph:
//!
//! 1. tokenise the part into `<w:t>` text nodes and paragraph boundaries;
//! 2. join the unescaped text of each paragraph's nodes;
//! 3. find placeholders in the joined text;
//! 4. write each value into the node where its placeholder starts and drop
//!    the placeholder fragments from the other nodes.
//!
//! Only nodes that overlap a placeholder are rewritten; everything else in
//! the part is kept byte-for-byte. Line breaks in values become `<w:br/>`.

use crate::error::RenderError;
use crate::pipeline::archive;
use crate::pipeline::template::{DocumentKind, FieldMap, Filler};
use crate::pipeline::xml;
use once_cell::sync::Lazy;
use regex::Regex;
use std::ops::Range;
use tracing::debug;

pub const DOCUMENT_PART: &str = "word/document.xml";

/// A `<w:t>` element with its text captured, or a paragraph boundary.
static TOKEN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"<w:t(?:\s[^>]*)?>([^<]*)</w:t>|<w:p(?:\s[^>]*)?>|</w:p>").unwrap()
});

/// Same key shape as the ODT filler: anything without braces, markup or
/// whitespace.
static PLACEHOLDER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{\s*([^{}<>\s]+)\s*\}\}").unwrap());

const LINE_BREAK: &str = r#"</w:t><w:br/><w:t xml:space="preserve">"#;

#[derive(Debug, Clone, Copy, Default)]
pub struct DocxFiller;

impl Filler for DocxFiller {
    fn kind(&self) -> DocumentKind {
        DocumentKind::Docx
    }

    fn fill(&self, template: &[u8], fields: &FieldMap) -> Result<Vec<u8>, RenderError> {
        archive::rewrite_parts(template, DOCUMENT_PART, is_text_part, |name, xml| {
            let (filled, hits) = fill_part(&xml, fields);
            debug!("{}: {} placeholder(s)", name, hits);
            Ok(filled)
        })
    }
}

/// Body, header and footer parts.
fn is_text_part(name: &str) -> bool {
    if name == DOCUMENT_PART {
        return true;
    }
    let Some(file) = name.strip_prefix("word/") else {
        return false;
    };
    !file.contains('/')
        && file.ends_with(".xml")
        && (file.starts_with("header") || file.starts_with("footer"))
}

struct TextNode {
    /// Whole `<w:t ...>...</w:t>` element.
    element: Range<usize>,
    /// Offset where the element's text starts (end of the open tag).
    text_start: usize,
    text: String,
}

/// Fill one WordprocessingML part. Returns the new XML and the number of
/// placeholders found.
pub(crate) fn fill_part(xml: &str, fields: &FieldMap) -> (String, usize) {
    let mut edits: Vec<(Range<usize>, String)> = Vec::new();
    let mut paragraph: Vec<TextNode> = Vec::new();
    let mut hits = 0;

    for caps in TOKEN_RE.captures_iter(xml) {
        let Some(whole) = caps.get(0) else { continue };
        match caps.get(1) {
            Some(text) => paragraph.push(TextNode {
                element: whole.range(),
                text_start: text.start(),
                text: xml::unescape(text.as_str()).into_owned(),
            }),
            None => {
                hits += fill_paragraph(xml, &paragraph, fields, &mut edits);
                paragraph.clear();
            }
        }
    }
    hits += fill_paragraph(xml, &paragraph, fields, &mut edits);

    if edits.is_empty() {
        return (xml.to_string(), hits);
    }

    let mut out = String::with_capacity(xml.len() + 256);
    let mut last = 0;
    for (range, replacement) in edits {
        out.push_str(&xml[last..range.start]);
        out.push_str(&replacement);
        last = range.end;
    }
    out.push_str(&xml[last..]);
    (out, hits)
}

fn fill_paragraph(
    xml: &str,
    nodes: &[TextNode],
    fields: &FieldMap,
    edits: &mut Vec<(Range<usize>, String)>,
) -> usize {
    if nodes.is_empty() {
        return 0;
    }

    let mut joined = String::new();
    let mut spans = Vec::with_capacity(nodes.len());
    for node in nodes {
        let start = joined.len();
        joined.push_str(&node.text);
        spans.push(start..joined.len());
    }
    if !joined.contains("{{") {
        return 0;
    }

    let matches: Vec<(Range<usize>, &str)> = PLACEHOLDER_RE
        .captures_iter(&joined)
        .filter_map(|c| {
            let span = c.get(0)?.range();
            let value = fields.get(c.get(1)?.as_str()).map(String::as_str);
            Some((span, value.unwrap_or("")))
        })
        .collect();
    if matches.is_empty() {
        return 0;
    }

    for (node, span) in nodes.iter().zip(&spans) {
        let mut touched = false;
        let mut text = String::new();
        let mut pos = span.start;

        for (m, value) in &matches {
            if m.end <= span.start || m.start >= span.end {
                continue;
            }
            touched = true;
            if m.start > pos {
                text.push_str(&joined[pos..m.start]);
            }
            if m.start >= span.start {
                text.push_str(value);
            }
            pos = pos.max(m.end.min(span.end));
        }
        if !touched {
            continue;
        }
        if pos < span.end {
            text.push_str(&joined[pos..span.end]);
        }

        let open_tag = &xml[node.element.start..node.text_start];
        edits.push((node.element.clone(), render_text_node(open_tag, &text)));
    }

    matches.len()
}

/// Rebuild a `<w:t>` element holding `text`, keeping the original
/// attributes and forcing whitespace preservation.
fn render_text_node(open_tag: &str, text: &str) -> String {
    let open = if open_tag.contains("xml:space") {
        open_tag.to_string()
    } else {
        format!(r#"<w:t xml:space="preserve"{}"#, &open_tag["<w:t".len()..])
    };

    let normalized = text.replace("\r\n", "\n").replace('\r', "\n");
    let body = normalized
        .split('\n')
        .map(|line| xml::escape(line).into_owned())
        .collect::<Vec<_>>()
        .join(LINE_BREAK);

    format!("{open}{body}</w:t>")
}
