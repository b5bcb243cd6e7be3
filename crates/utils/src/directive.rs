//! Extraction of configuration directives embedded in rendered templates.
//!
//! A directive is an HTML comment wrapping a tagged block, for instance
//! `<!-- [subject] Monthly report [/subject] -->`. The scanner below turns
//! the template into a sequence of [`Block`] tokens; only blocks whose
//! opening and closing names agree are treated as configuration and
//! stripped from the template, anything else is left untouched.

use std::ops::Range;

use tracing::debug;

/// Opening of the comment wrapper around a directive.
const COMMENT_OPEN: &str = "<!--";

/// Closing of the comment wrapper around a directive.
const COMMENT_CLOSE: &str = "-->";

/// Prefix of a closing tag, `[/name]`.
const TAG_CLOSE: &str = "[/";

/// Reserved directive holding the SMTP relay specification.
pub const RELAY_DIRECTIVE: &str = "relay";

/// Reserved, repeatable directive naming a regular attachment.
pub const ATTACHMENT_DIRECTIVE: &str = "attachment";

/// A tagged block found by [`scan_blocks`].
///
/// `span` covers the whole comment including the line breaks that follow
/// it, `open`, `value` and `close` are the raw (untrimmed) slices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block<'a> {
    pub span: Range<usize>,
    pub open: &'a str,
    pub value: &'a str,
    pub close: &'a str,
}

impl Block<'_> {
    /// Returns the normalized directive name when the opening and closing
    /// names match case-insensitively, `None` for a mismatched block.
    pub fn name(&self) -> Option<String> {
        let open = self.open.trim().to_lowercase();
        if open.is_empty() || open != self.close.trim().to_lowercase() {
            return None;
        }
        Some(open)
    }

}

/// Scans `text` for directive blocks, in order of appearance and without
/// overlap.
pub fn scan_blocks(text: &str) -> Vec<Block<'_>> {
    let mut blocks = Vec::new();
    let mut cursor = 0;
    while let Some(offset) = text[cursor..].find(COMMENT_OPEN) {
        let start = cursor + offset;
        match parse_block(text, start) {
            Some(block) => {
                cursor = block.span.end;
                blocks.push(block);
            }
            None => cursor = start + COMMENT_OPEN.len(),
        }
    }
    blocks
}

/// Parses a single block whose comment opens at `start`.
///
/// The value is the shortest non-empty text followed by a complete closing
/// marker: a non-empty `[/name]`, optional whitespace and `-->`.
fn parse_block(text: &str, start: usize) -> Option<Block<'_>> {
    let open_start = skip_whitespace(text, start + COMMENT_OPEN.len());
    if !text[open_start..].starts_with('[') {
        return None;
    }
    let name_start = open_start + 1;
    let name_end = name_start + text[name_start..].find(']')?;
    if name_end == name_start {
        return None;
    }

    let value_start = name_end + 1;
    let mut search = value_start;
    while let Some(offset) = text[search..].find(TAG_CLOSE) {
        let tag_start = search + offset;
        search = tag_start + 1;
        if tag_start == value_start {
            continue;
        }
        let close_start = tag_start + TAG_CLOSE.len();
        let Some(close_len) = text[close_start..].find(']') else {
            break;
        };
        if close_len == 0 {
            continue;
        }
        let close_end = close_start + close_len;
        let comment_start = skip_whitespace(text, close_end + 1);
        if !text[comment_start..].starts_with(COMMENT_CLOSE) {
            continue;
        }
        let comment_end = comment_start + COMMENT_CLOSE.len();
        let end = comment_end
            + text[comment_end..]
                .bytes()
                .take_while(|byte| matches!(byte, b'\r' | b'\n'))
                .count();
        return Some(Block {
            span: start..end,
            open: &text[name_start..name_end],
            value: &text[value_start..tag_start],
            close: &text[close_start..close_end],
        });
    }
    None
}

fn skip_whitespace(text: &str, from: usize) -> usize {
    from + text[from..]
        .bytes()
        .take_while(|byte| byte.is_ascii_whitespace())
        .count()
}

/// Configuration collected from the directives of a template.
///
/// Header entries keep the position where their name first appeared, a
/// repeated name replaces the previous value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Directives {
    entries: Vec<(String, String)>,
    relay: Option<String>,
    attachments: Vec<String>,
}

impl Directives {
    pub fn new() -> Self {
        Self::default()
    }

    /// Routes a directive by name: `relay` and `attachment` are kept aside,
    /// every other name becomes a header entry.
    pub fn apply(&mut self, name: &str, value: &str) {
        match name {
            RELAY_DIRECTIVE => {
                self.relay = Some(value.to_string()).filter(|relay| !relay.is_empty());
            }
            ATTACHMENT_DIRECTIVE => self.attachments.push(value.to_string()),
            _ => self.insert(name, value),
        }
    }

    /// Sets a header entry, replacing any previous value for `name`.
    pub fn insert(&mut self, name: &str, value: &str) {
        match self.entries.iter_mut().find(|(key, _)| key == name) {
            Some(entry) => {
                debug!(name = %name, "Overriding repeated directive");
                entry.1 = value.to_string();
            }
            None => self.entries.push((name.to_string(), value.to_string())),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        let index = self.entries.iter().position(|(key, _)| key == name)?;
        Some(self.entries.remove(index).1)
    }

    /// Iterates over the header entries in order of first appearance.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn relay(&self) -> Option<&str> {
        self.relay.as_deref()
    }

    pub fn attachments(&self) -> &[String] {
        &self.attachments
    }
}

/// Result of [`extract_directives`]: the configuration and the template
/// with every well-formed block removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    pub directives: Directives,
    pub template: String,
}

/// Mines the directives out of a rendered template.
///
/// Removing a block can join the text around it into a new well-formed
/// block, so the output is scanned again until no block is left to strip.
pub fn extract_directives(text: &str) -> Extraction {
    let mut directives = Directives::new();
    let mut template = strip_blocks(text, &mut directives);
    while let Some(stripped) = template
        .as_deref()
        .and_then(|text| strip_blocks(text, &mut directives))
    {
        template = Some(stripped);
    }

    Extraction {
        directives,
        template: template.unwrap_or_else(|| text.to_string()),
    }
}

/// Strips every well-formed block of `text` into `directives`, returns
/// `None` when there was nothing to strip.
fn strip_blocks(text: &str, directives: &mut Directives) -> Option<String> {
    let mut template = String::with_capacity(text.len());
    let mut start = 0;

    for block in scan_blocks(text) {
        let Some(name) = block.name() else {
            debug!(
                open = %block.open.trim(),
                close = %block.close.trim(),
                "Ignoring directive with mismatched names"
            );
            continue;
        };
        debug!(name = %name, "Found directive");
        directives.apply(&name, block.value.trim());
        template.push_str(&text[start..block.span.start]);
        start = block.span.end;
    }
    if start == 0 {
        return None;
    }
    template.push_str(&text[start..]);
    Some(template)
}
