//! Logical path codecs.
//!
//! A logical path names a file with a chosen delimiter instead of `/`:
//!
//! ```text
//! UCFS   [🌍]🏠[🌍]documents[🌍]resume.pdf   →  /ucfs/U+1F30D/🏠/documents/resume.pdf
//! PXFS   {255,0,0}photos{255,0,0}beach.jpg   →  /pxfs/FF0000/photos/beach.jpg
//! ```
//!
//! Each codec parses its grammar into owned components, renders the
//! canonical `/`-delimited path under a base prefix, and decodes canonical
//! paths back for display. Decoding never fails: anything it does not
//! recognise comes back verbatim.

mod pxfs;
mod ucfs;

pub use pxfs::{PxfsPath, Rgb};
pub use ucfs::UcfsPath;

use crate::error::{FsError, FsResult};

/// A parsed logical path.
pub trait LogicalPath: Sized {
    /// Backing root used when an overlay has not been given one.
    const DEFAULT_ROOT: &'static str;

    /// Short scheme name for logs and messages.
    const SCHEME: &'static str;

    /// Parse a logical path.
    fn parse(input: &str) -> FsResult<Self>;

    /// The stable identifier of the delimiter (`U+1F30D`, `FF0000`).
    fn stable_id(&self) -> String;

    /// The delimiter literal that separates components in logical form.
    fn separator(&self) -> String;

    /// Map a stable identifier back to its delimiter literal.
    fn separator_for_id(id: &str) -> Option<String>;

    fn components(&self) -> &[String];

    /// Drop all components, leaving an empty path.
    fn release(&mut self);

    /// Render `base/<stable-id>/comp/.../comp`.
    fn canonicalize(&self, base: &str) -> String {
        let base = trim_base(base);
        let mut out = String::with_capacity(base.len() + 16);
        out.push_str(base);
        out.push('/');
        out.push_str(&self.stable_id());
        for component in self.components() {
            out.push('/');
            out.push_str(component);
        }
        out
    }

    /// Render the canonical path into `buf`, returning the bytes written.
    ///
    /// Fails with ENOSPC when `buf` is too small; `buf` is left untouched then.
    fn canonicalize_into(&self, base: &str, buf: &mut [u8]) -> FsResult<usize> {
        let rendered = self.canonicalize(base);
        let len = rendered.len();
        if len > buf.len() {
            return Err(FsError::NoSpace(format!(
                "canonical {} path needs {} bytes, buffer holds {}",
                Self::SCHEME,
                len,
                buf.len()
            )));
        }
        buf[..len].copy_from_slice(rendered.as_bytes());
        Ok(len)
    }

    /// Logical form of this path.
    fn to_logical(&self) -> String {
        let sep = self.separator();
        let mut out = sep.clone();
        out.push_str(&self.components().join(&sep));
        out
    }

    /// Best-effort inverse of [`canonicalize`](Self::canonicalize).
    fn decode(canonical: &str, base: &str) -> String {
        let Some((id, components)) = split_canonical(canonical, base) else {
            return canonical.to_string();
        };
        let Some(sep) = Self::separator_for_id(id) else {
            return canonical.to_string();
        };
        let mut out = sep.clone();
        out.push_str(&components.join(&sep));
        out
    }
}

/// Strip trailing slashes; the root prefix `/` becomes empty.
fn trim_base(base: &str) -> &str {
    base.trim_end_matches('/')
}

/// Split the body of a logical path into components.
///
/// `separator` is the exact delimiter literal. The canonical `/` also splits,
/// so `photos/beach.jpg` yields two components.
fn split_components(body: &str, separator: &str, input: &str) -> FsResult<Vec<String>> {
    if body.is_empty() {
        return Err(FsError::InvalidArgument(format!(
            "no components after delimiter: {}",
            input
        )));
    }
    let mut components = Vec::new();
    for piece in body.split(separator) {
        for component in piece.split('/') {
            validate_component(component, input)?;
            components.push(component.to_string());
        }
    }
    Ok(components)
}

fn validate_component(component: &str, input: &str) -> FsResult<()> {
    if component.is_empty() {
        return Err(FsError::InvalidArgument(format!(
            "empty component between delimiters: {}",
            input
        )));
    }
    if component == "." || component == ".." || component.contains('\0') {
        return Err(FsError::InvalidArgument(format!(
            "invalid component {:?} in {}",
            component, input
        )));
    }
    Ok(())
}

/// Split `base/<id>/comp/...` into the id and its components.
fn split_canonical<'a>(canonical: &'a str, base: &str) -> Option<(&'a str, Vec<&'a str>)> {
    let rest = canonical.strip_prefix(trim_base(base))?;
    let rest = rest.strip_prefix('/')?;
    let mut segments = rest.split('/');
    let id = segments.next()?;
    let components: Vec<&str> = segments.collect();
    if components.is_empty() || components.iter().any(|c| c.is_empty()) {
        return None;
    }
    Some((id, components))
}
