//! UCFS: paths delimited by an arbitrary Unicode glyph.
//!
//! Grammar: `[<glyph>]<component>([<glyph>]<component>)*`. The glyph is one
//! non-ASCII codepoint, optionally followed by variation selectors (so `🕉️`
//! works as typed). The bracketed literal is repeated verbatim between
//! components. The stable id is the glyph's first codepoint: `U+1F549`.

use std::fmt;

use super::{LogicalPath, split_components};
use crate::error::{FsError, FsResult};

/// A parsed UCFS path.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UcfsPath {
    /// Codepoint identifying the delimiter.
    delimiter: char,
    /// Full glyph between the brackets, including any variation selectors.
    glyph: String,
    components: Vec<String>,
}

impl UcfsPath {
    pub fn delimiter(&self) -> char {
        self.delimiter
    }

    /// UTF-8 length of the delimiter codepoint (1–4).
    pub fn delimiter_len(&self) -> usize {
        self.delimiter.len_utf8()
    }

    /// The glyph as written, e.g. `"🕉\u{FE0F}"`.
    pub fn glyph(&self) -> &str {
        &self.glyph
    }
}

fn is_variation_selector(c: char) -> bool {
    ('\u{FE00}'..='\u{FE0F}').contains(&c)
}

impl LogicalPath for UcfsPath {
    const DEFAULT_ROOT: &'static str = "/ucfs";
    const SCHEME: &'static str = "ucfs";

    fn parse(input: &str) -> FsResult<Self> {
        let invalid = |why: &str| FsError::InvalidArgument(format!("{}: {}", why, input));

        let rest = input
            .strip_prefix('[')
            .ok_or_else(|| invalid("UCFS path must start with a bracketed delimiter"))?;
        let close = rest
            .find(']')
            .ok_or_else(|| invalid("unterminated UCFS delimiter"))?;
        let glyph = &rest[..close];

        let mut chars = glyph.chars();
        let delimiter = chars.next().ok_or_else(|| invalid("empty UCFS delimiter"))?;
        if delimiter.is_ascii() {
            return Err(invalid("ASCII delimiter is not a UCFS path"));
        }
        if !chars.all(is_variation_selector) {
            return Err(invalid("UCFS delimiter must be a single glyph"));
        }

        let separator = format!("[{}]", glyph);
        let components = split_components(&rest[close + 1..], &separator, input)?;

        Ok(Self {
            delimiter,
            glyph: glyph.to_string(),
            components,
        })
    }

    fn stable_id(&self) -> String {
        format!("U+{:04X}", self.delimiter as u32)
    }

    fn separator(&self) -> String {
        format!("[{}]", self.glyph)
    }

    fn separator_for_id(id: &str) -> Option<String> {
        let hex = id.strip_prefix("U+")?;
        if hex.is_empty() || hex.len() > 6 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        let delimiter = char::from_u32(u32::from_str_radix(hex, 16).ok()?)?;
        if delimiter.is_ascii() {
            return None;
        }
        Some(format!("[{}]", delimiter))
    }

    fn components(&self) -> &[String] {
        &self.components
    }

    fn release(&mut self) {
        *self = Self::default();
    }
}

impl fmt::Display for UcfsPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_logical())
    }
}
