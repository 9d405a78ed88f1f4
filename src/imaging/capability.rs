//! MIME capability sets and the transparency negotiation rule.
//!
//! Also home to [`check_file_name`], the path guard every handler runs before
//! touching the file system.

use super::error::{ImageError, Result};
use image::ImageFormat;
use std::path::Path;

/// The two canonical raster formats that carry transparency.
pub const TRANSPARENCY_MIMES: [&str; 2] = ["image/gif", "image/png"];

/// Characters a path handed to a handler may not contain.
pub const ILLEGAL_FILE_NAME_CHARS: [char; 3] = ['\'', '"', '$'];

/// Static input/output MIME knowledge of one engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MimeCapability {
    input: &'static [&'static str],
    output: &'static [&'static str],
}

impl MimeCapability {
    pub const fn new(input: &'static [&'static str], output: &'static [&'static str]) -> Self {
        Self { input, output }
    }

    pub fn input(&self) -> &'static [&'static str] {
        self.input
    }

    pub fn output(&self) -> &'static [&'static str] {
        self.output
    }

    pub fn allows_input(&self, mime: &str) -> bool {
        contains_mime(self.input, mime)
    }

    pub fn allows_output(&self, mime: &str) -> bool {
        contains_mime(self.output, mime)
    }
}

pub fn is_transparency_capable(mime: &str) -> bool {
    contains_mime(&TRANSPARENCY_MIMES, mime)
}

/// Returns whether converting `in_mime` to `out_mime` must flatten transparent
/// pixels first: the target is set, differs from the source, and only the
/// source can carry transparency.
pub fn needs_transparency_conversion(in_mime: &str, out_mime: Option<&str>) -> bool {
    match out_mime {
        Some(out) => {
            !in_mime.eq_ignore_ascii_case(out)
                && is_transparency_capable(in_mime)
                && !is_transparency_capable(out)
        }
        None => false,
    }
}

/// Reject paths containing `'`, `"` or `$`.
pub fn check_file_name(path: &Path) -> Result<()> {
    let name = path.to_string_lossy();
    if name.contains(ILLEGAL_FILE_NAME_CHARS) {
        return Err(ImageError::InvalidFileName {
            path: name.into_owned(),
        });
    }
    Ok(())
}

/// MIME type implied by a path's extension, if it names a known image format.
pub fn mime_for_path(path: &Path) -> Option<&'static str> {
    ImageFormat::from_path(path).ok().map(|f| f.to_mime_type())
}

/// Preferred file extension for `mime`.
pub fn extension_for_mime(mime: &str) -> Option<&'static str> {
    ImageFormat::from_mime_type(mime).and_then(|f| f.extensions_str().first().copied())
}

fn contains_mime(set: &[&str], mime: &str) -> bool {
    set.iter().any(|m| m.eq_ignore_ascii_case(mime))
}
