//! PXFS: paths delimited by an RGB pixel.
//!
//! Grammar: `{r,g,b}<component>({r,g,b}<component>)*` with each channel a
//! decimal in 0–255. Separators must match the re-rendered token exactly, so
//! `{007,0,0}` opens a path whose separator is `{7,0,0}`. The stable id is the
//! colour as six hex digits: `FF0000`.

use std::fmt;

use super::{LogicalPath, split_components};
use crate::error::{FsError, FsResult};

/// An RGB triplet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// `RRGGBB`, uppercase.
    pub fn hex(&self) -> String {
        format!("{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }

    /// Parse exactly six hex digits.
    pub fn from_hex(hex: &str) -> Option<Self> {
        if hex.len() != 6 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
        Some(Self::new(channel(0)?, channel(2)?, channel(4)?))
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{},{},{}}}", self.r, self.g, self.b)
    }
}

/// A parsed PXFS path.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PxfsPath {
    color: Rgb,
    components: Vec<String>,
}

impl PxfsPath {
    pub fn color(&self) -> Rgb {
        self.color
    }
}

fn parse_channel(text: &str, input: &str) -> FsResult<u8> {
    if text.is_empty() || text.len() > 3 || !text.bytes().all(|b| b.is_ascii_digit()) {
        return Err(FsError::InvalidArgument(format!(
            "malformed colour channel {:?}: {}",
            text, input
        )));
    }
    let value: u16 = text
        .parse()
        .map_err(|_| FsError::InvalidArgument(format!("malformed colour channel: {}", input)))?;
    u8::try_from(value).map_err(|_| {
        FsError::InvalidArgument(format!("colour channel {} out of range: {}", value, input))
    })
}

impl LogicalPath for PxfsPath {
    const DEFAULT_ROOT: &'static str = "/pxfs";
    const SCHEME: &'static str = "pxfs";

    fn parse(input: &str) -> FsResult<Self> {
        let invalid = |why: &str| FsError::InvalidArgument(format!("{}: {}", why, input));

        let rest = input
            .strip_prefix('{')
            .ok_or_else(|| invalid("PXFS path must start with {r,g,b}"))?;
        let close = rest
            .find('}')
            .ok_or_else(|| invalid("unterminated colour token"))?;

        let channels: Vec<&str> = rest[..close].split(',').collect();
        let [r, g, b] = channels.as_slice() else {
            return Err(invalid("colour token needs three channels"));
        };
        let color = Rgb::new(
            parse_channel(r, input)?,
            parse_channel(g, input)?,
            parse_channel(b, input)?,
        );

        let components = split_components(&rest[close + 1..], &color.to_string(), input)?;
        Ok(Self { color, components })
    }

    fn stable_id(&self) -> String {
        self.color.hex()
    }

    fn separator(&self) -> String {
        self.color.to_string()
    }

    fn separator_for_id(id: &str) -> Option<String> {
        Rgb::from_hex(id).map(|c| c.to_string())
    }

    fn components(&self) -> &[String] {
        &self.components
    }

    fn release(&mut self) {
        *self = Self::default();
    }
}

impl fmt::Display for PxfsPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_logical())
    }
}
