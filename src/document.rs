//! In-memory rich-text document.
//!
//! Holds editor content as a flat run of tags and decoded text, normalized
//! the way a block-based rich-text editor stores it: every piece of text sits
//! inside a block, empty blocks carry a `<br>`, and an empty document is a
//! single empty paragraph. Offsets count text characters plus one position
//! for the break at the end of each block.

use quick_xml::escape::{partial_escape, resolve_predefined_entity, unescape_with};
use quick_xml::events::Event;
use quick_xml::reader::Reader;
use tracing::debug;

use crate::editor::{RichEditor, Selection};

const VOID_TAGS: &[&str] = &["br", "img", "hr", "input", "meta", "link", "wbr"];

// Blocks that hold text and end in a line break
const TEXT_BLOCKS: &[&str] = &[
    "p", "div", "h1", "h2", "h3", "h4", "h5", "h6", "li", "pre", "blockquote",
];

// Blocks that only hold other blocks
const CONTAINERS: &[&str] = &["ul", "ol"];

fn is_text_block(name: &str) -> bool {
    TEXT_BLOCKS.contains(&name)
}

fn is_block(name: &str) -> bool {
    is_text_block(name) || CONTAINERS.contains(&name)
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Node {
    Open { name: String, attrs: String },
    Close { name: String },
    Void { name: String, attrs: String },
    Text(String),
}

impl Node {
    fn open(name: &str) -> Self {
        Node::Open {
            name: name.to_string(),
            attrs: String::new(),
        }
    }

    fn close(name: &str) -> Self {
        Node::Close {
            name: name.to_string(),
        }
    }

    fn br() -> Self {
        Node::Void {
            name: "br".to_string(),
            attrs: String::new(),
        }
    }

    fn is_br(&self) -> bool {
        matches!(self, Node::Void { name, .. } if name == "br")
    }
}

// ============================================================================
// Parsing
// ============================================================================

fn resolve_entity(entity: &str) -> Option<&'static str> {
    match entity {
        "nbsp" => Some("\u{a0}"),
        other => resolve_predefined_entity(other),
    }
}

fn escape_text(text: &str) -> String {
    partial_escape(text).replace('\u{a0}', "&nbsp;")
}

fn tag_name(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).to_ascii_lowercase()
}

fn tag_attrs(raw: &[u8]) -> String {
    let attrs = String::from_utf8_lossy(raw);
    let attrs = attrs.trim().trim_end_matches('/').trim_end();
    if attrs.is_empty() {
        String::new()
    } else {
        format!(" {}", attrs)
    }
}

fn push_text(nodes: &mut Vec<Node>, text: &str) {
    if text.is_empty() {
        return;
    }
    if let Some(Node::Text(last)) = nodes.last_mut() {
        last.push_str(text);
    } else {
        nodes.push(Node::Text(text.to_string()));
    }
}

fn tokenize(html: &str) -> Vec<Node> {
    let mut reader = Reader::from_str(html);
    let config = reader.config_mut();
    config.trim_text(false);
    config.check_end_names = false;
    config.allow_unmatched_ends = true;
    config.allow_dangling_amp = true;

    let mut nodes = Vec::new();

    loop {
        let position = usize::try_from(reader.buffer_position()).unwrap_or(html.len());

        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = tag_name(e.name().as_ref());
                let attrs = tag_attrs(e.attributes_raw());
                if VOID_TAGS.contains(&name.as_str()) {
                    nodes.push(Node::Void { name, attrs });
                } else {
                    nodes.push(Node::Open { name, attrs });
                }
            }
            Ok(Event::Empty(e)) => {
                let name = tag_name(e.name().as_ref());
                let attrs = tag_attrs(e.attributes_raw());
                nodes.push(Node::Void { name, attrs });
            }
            Ok(Event::End(e)) => {
                nodes.push(Node::Close {
                    name: tag_name(e.name().as_ref()),
                });
            }
            Ok(Event::Text(e)) => {
                if let Ok(text) = e.decode() {
                    push_text(&mut nodes, &text);
                }
            }
            Ok(Event::CData(e)) => {
                if let Ok(text) = e.decode() {
                    push_text(&mut nodes, &text);
                }
            }
            Ok(Event::GeneralRef(e)) => {
                if let Ok(name) = e.decode() {
                    let raw = format!("&{};", name);
                    match unescape_with(&raw, resolve_entity) {
                        Ok(text) => push_text(&mut nodes, &text),
                        // Unknown entities stay as written
                        Err(_) => push_text(&mut nodes, &raw),
                    }
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                // Markup that is not even loosely well-formed is kept as text
                debug!(error = %e, position, "unparseable markup kept as text");
                push_text(&mut nodes, html.get(position..).unwrap_or_default());
                break;
            }
        }
    }

    nodes
}

// ============================================================================
// Normalization
// ============================================================================

fn normalize(nodes: Vec<Node>) -> Vec<Node> {
    let mut out: Vec<Node> = Vec::with_capacity(nodes.len() + 2);
    let mut stack: Vec<String> = Vec::new();
    let mut wrapping = false;

    for node in nodes {
        let at_top = stack.is_empty();

        match &node {
            Node::Text(text) if text.trim().is_empty() => {
                let in_container = stack.last().is_some_and(|n| CONTAINERS.contains(&n.as_str()));
                if (at_top && !wrapping) || in_container {
                    continue;
                }
            }
            Node::Open { name, .. } if at_top && is_block(name) => {
                if wrapping {
                    out.push(Node::close("p"));
                    wrapping = false;
                }
            }
            Node::Close { .. } => {}
            _ if at_top && !wrapping => {
                out.push(Node::open("p"));
                wrapping = true;
            }
            _ => {}
        }

        match node {
            Node::Open { name, attrs } => {
                stack.push(name.clone());
                out.push(Node::Open { name, attrs });
            }
            Node::Close { name } => {
                // Stray closes are dropped, mis-nested ones close everything above
                if let Some(depth) = stack.iter().rposition(|open| *open == name) {
                    while stack.len() > depth {
                        if let Some(open) = stack.pop() {
                            out.push(Node::Close { name: open });
                        }
                    }
                }
            }
            Node::Text(text) => push_text(&mut out, &text),
            void => out.push(void),
        }
    }

    while let Some(open) = stack.pop() {
        out.push(Node::Close { name: open });
    }
    if wrapping {
        out.push(Node::close("p"));
    }

    // Empty text blocks keep a line break so they stay visible
    let mut filled = Vec::with_capacity(out.len());
    for node in out {
        if let Node::Close { name } = &node {
            if is_text_block(name) && matches!(filled.last(), Some(Node::Open { name: open, .. }) if open == name) {
                filled.push(Node::br());
            }
        }
        filled.push(node);
    }

    if !filled.iter().any(|n| matches!(n, Node::Close { name } if is_text_block(name))) {
        filled = vec![Node::open("p"), Node::br(), Node::close("p")];
    }

    filled
}

// ============================================================================
// Document
// ============================================================================

enum InsertAt {
    Text { node: usize, offset: usize },
    BeforeClose { node: usize },
}

/// A headless rich-text editor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HtmlDocument {
    nodes: Vec<Node>,
    selection: Option<Selection>,
}

impl Default for HtmlDocument {
    fn default() -> Self {
        Self::from_html("")
    }
}

impl HtmlDocument {
    pub fn from_html(html: &str) -> Self {
        Self {
            nodes: normalize(tokenize(html)),
            selection: None,
        }
    }

    /// Plain text with a newline after every block.
    pub fn text(&self) -> String {
        let mut text = String::new();
        for node in &self.nodes {
            match node {
                Node::Text(t) => text.push_str(t),
                Node::Close { name } if is_text_block(name) => text.push('\n'),
                _ => {}
            }
        }
        text
    }

    fn locate(&self, index: usize) -> Option<InsertAt> {
        let mut pos = 0;
        for (i, node) in self.nodes.iter().enumerate() {
            match node {
                Node::Text(t) => {
                    let n = t.chars().count();
                    if index <= pos + n {
                        return Some(InsertAt::Text {
                            node: i,
                            offset: index - pos,
                        });
                    }
                    pos += n;
                }
                Node::Close { name } if is_text_block(name) => {
                    if index == pos {
                        return Some(InsertAt::BeforeClose { node: i });
                    }
                    pos += 1;
                }
                _ => {}
            }
        }
        None
    }
}

impl RichEditor for HtmlDocument {
    fn html(&self) -> String {
        let mut html = String::new();
        for node in &self.nodes {
            match node {
                Node::Open { name, attrs } | Node::Void { name, attrs } => {
                    html.push('<');
                    html.push_str(name);
                    html.push_str(attrs);
                    html.push('>');
                }
                Node::Close { name } => {
                    html.push_str("</");
                    html.push_str(name);
                    html.push('>');
                }
                Node::Text(t) => html.push_str(&escape_text(t)),
            }
        }
        html
    }

    fn set_html(&mut self, html: &str) {
        self.nodes = normalize(tokenize(html));
        self.selection = None;
    }

    fn len(&self) -> usize {
        self.nodes
            .iter()
            .map(|node| match node {
                Node::Text(t) => t.chars().count(),
                Node::Close { name } if is_text_block(name) => 1,
                _ => 0,
            })
            .sum()
    }

    fn selection(&self) -> Option<Selection> {
        self.selection
    }

    fn set_selection(&mut self, index: usize) {
        let end = self.len().saturating_sub(1);
        self.selection = Some(Selection::caret(index.min(end)));
    }

    fn insert_text(&mut self, index: usize, text: &str) {
        if text.is_empty() {
            return;
        }
        let index = index.min(self.len().saturating_sub(1));

        match self.locate(index) {
            Some(InsertAt::Text { node, offset }) => {
                if let Node::Text(t) = &mut self.nodes[node] {
                    let byte = t
                        .char_indices()
                        .nth(offset)
                        .map(|(b, _)| b)
                        .unwrap_or(t.len());
                    t.insert_str(byte, text);
                }
            }
            Some(InsertAt::BeforeClose { node }) => {
                // An empty block loses its placeholder break once it has text
                let placeholder = node >= 2
                    && self.nodes[node - 1].is_br()
                    && matches!(self.nodes[node - 2], Node::Open { .. });
                if placeholder {
                    self.nodes[node - 1] = Node::Text(text.to_string());
                } else {
                    self.nodes.insert(node, Node::Text(text.to_string()));
                }
            }
            None => {
                self.nodes.extend([
                    Node::open("p"),
                    Node::Text(text.to_string()),
                    Node::close("p"),
                ]);
            }
        }
    }
}
