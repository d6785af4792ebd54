//! Tag-block scanning.
//!
//! Model output is free-form text with zero or more tool-invocation blocks
//! embedded as `<name>...</name>` markup. This module finds those blocks
//! and parses their contents into an element tree.
//!
//! The scanner is a small explicit tokenizer over tag boundaries — nesting
//! is handled by depth counting, not regex. Candidates that fail structure
//! (bad tag name, no matching close tag) are skipped and scanning resumes,
//! so one malformed block never hides the rest of the text.

/// A parsed element: either raw leaf text or a sequence of named children
/// in document order.
#[derive(Debug, Clone, PartialEq)]
pub enum Element {
    Leaf(String),
    Children(Vec<(String, Element)>),
}

/// One well-formed top-level block found in the text.
#[derive(Debug, Clone, PartialEq)]
pub struct RawBlock {
    /// The outer tag name.
    pub name: String,
    /// Content between the outer tags.
    pub inner: String,
    /// The full block text including the outer tags.
    pub raw: String,
}

/// Tag names are lowercase identifiers: `[a-z][a-z0-9_]*`.
///
/// Case matters — uppercase names are rejected, not coerced.
fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

/// Try to read `<name>` at `pos`. Returns `(name, end_of_open_tag)`.
fn read_open_tag(text: &str, pos: usize) -> Option<(&str, usize)> {
    let bytes = text.as_bytes();
    if bytes.get(pos) != Some(&b'<') {
        return None;
    }
    let rest = &text[pos + 1..];
    let close = rest.find('>')?;
    let name = &rest[..close];
    if !is_valid_name(name) {
        return None;
    }
    Some((name, pos + 1 + close + 1))
}

/// Find the matching `</name>` for an open tag whose content starts at
/// `start`, counting nested same-name opens. Returns
/// `(content_end, end_of_close_tag)`.
fn find_matching_close(text: &str, start: usize, name: &str) -> Option<(usize, usize)> {
    let open = format!("<{name}>");
    let close = format!("</{name}>");
    let mut depth = 1usize;
    let mut pos = start;

    while depth > 0 {
        let rest = &text[pos..];
        let next_open = rest.find(&open);
        let next_close = rest.find(&close)?;

        match next_open {
            Some(o) if o < next_close => {
                depth += 1;
                pos += o + open.len();
            }
            _ => {
                depth -= 1;
                if depth == 0 {
                    return Some((pos + next_close, pos + next_close + close.len()));
                }
                pos += next_close + close.len();
            }
        }
    }
    None
}

/// Scan text for well-formed top-level blocks, in document order.
///
/// A candidate with an invalid tag name is not a candidate at all; one with
/// no matching close tag is skipped and scanning resumes just past its open
/// tag.
pub fn scan_blocks(text: &str) -> Vec<RawBlock> {
    let mut blocks = Vec::new();
    let mut pos = 0;

    while let Some(offset) = text[pos..].find('<') {
        let open_start = pos + offset;
        let Some((name, content_start)) = read_open_tag(text, open_start) else {
            pos = open_start + 1;
            continue;
        };

        match find_matching_close(text, content_start, name) {
            Some((content_end, block_end)) => {
                blocks.push(RawBlock {
                    name: name.to_owned(),
                    inner: text[content_start..content_end].to_owned(),
                    raw: text[open_start..block_end].to_owned(),
                });
                pos = block_end;
            }
            None => {
                // Unclosed: resume just past the open tag so nested or later
                // blocks are still considered.
                pos = content_start;
            }
        }
    }

    blocks
}

/// Parse block content into an element tree.
///
/// Content that consists entirely of well-formed child tags (allowing
/// surrounding whitespace) becomes [`Element::Children`]; anything else is a
/// leaf holding the raw text. Whitespace-only content is an empty container.
pub fn parse_element(inner: &str) -> Element {
    let mut children = Vec::new();
    let mut pos = 0;

    loop {
        // Skip whitespace between children.
        let rest = &inner[pos..];
        let trimmed_offset = rest.len() - rest.trim_start().len();
        pos += trimmed_offset;
        if pos >= inner.len() {
            break;
        }

        let Some((name, content_start)) = read_open_tag(inner, pos) else {
            // Non-tag content: the whole thing is a leaf.
            return Element::Leaf(inner.to_owned());
        };
        let Some((content_end, child_end)) = find_matching_close(inner, content_start, name) else {
            return Element::Leaf(inner.to_owned());
        };

        let child = parse_element(&inner[content_start..content_end]);
        children.push((name.to_owned(), child));
        pos = child_end;
    }

    Element::Children(children)
}
