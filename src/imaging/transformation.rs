//! Named transformations: a filter chain plus acceptable output formats.
//!
//! These functions sit on top of the handler contract: they pick an output
//! MIME, drive a [`ScopedImage`] through the filters and save the result. They
//! work with any [`ImageHandler`].

use super::error::{ImageError, MimeDirection, Result};
use super::filter::Filter;
use super::handler::ImageHandler;
use super::params::SaveOptions;
use super::scoped::ScopedImage;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq)]
pub struct Transformation {
    pub name: String,
    pub filters: Vec<Filter>,
    /// Acceptable output MIME types, in order of preference. Empty means
    /// "keep the input format".
    pub mimes: Vec<String>,
    pub save_options: SaveOptions,
}

/// What a completed transformation produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformReport {
    pub input: PathBuf,
    pub output: PathBuf,
    pub mime: String,
    pub width: u32,
    pub height: u32,
}

impl Transformation {
    pub fn new(name: impl Into<String>, filters: Vec<Filter>, mimes: Vec<String>) -> Self {
        Self {
            name: name.into(),
            filters,
            mimes,
            save_options: SaveOptions::default(),
        }
    }

    /// Pick the output MIME for an input of `input_mime`.
    ///
    /// The input MIME wins if it is listed (or nothing is listed) and the
    /// handler can write it; otherwise the first listed MIME the handler can
    /// write.
    pub fn output_mime<H: ImageHandler + ?Sized>(&self, input_mime: &str, handler: &H) -> Result<String> {
        let keeps_input = self.mimes.is_empty()
            || self.mimes.iter().any(|m| m.eq_ignore_ascii_case(input_mime));
        if keeps_input && handler.allows_output(input_mime) {
            return Ok(input_mime.to_string());
        }
        self.mimes
            .iter()
            .find(|m| handler.allows_output(m))
            .cloned()
            .ok_or_else(|| ImageError::MimeUnsupported {
                mime: if self.mimes.is_empty() {
                    input_mime.to_string()
                } else {
                    self.mimes.join(", ")
                },
                direction: MimeDirection::Output,
                handler: handler.name().to_string(),
            })
    }

    /// Load `input`, run every filter, convert if needed, save to `output`.
    ///
    /// `save_options` on the call override the transformation's own.
    pub fn transform<H: ImageHandler + ?Sized>(
        &self,
        handler: &mut H,
        input: &Path,
        output: &Path,
        save_options: Option<SaveOptions>,
    ) -> Result<TransformReport> {
        let options = match save_options {
            Some(overlay) => self.save_options.merged_with(overlay),
            None => self.save_options,
        };

        let mut image = ScopedImage::open(handler, input, None)?;
        for filter in &self.filters {
            image.apply(filter)?;
        }

        let input_mime = image.info()?.mime;
        let mime = self.output_mime(&input_mime, image.handler())?;
        if !mime.eq_ignore_ascii_case(&input_mime) {
            image.convert(&mime)?;
        }
        image.save(Some(output), Some(&mime), Some(&options))?;

        let info = image.info()?;
        image.close()?;
        tracing::debug!(
            transformation = %self.name,
            input = %input.display(),
            output = %output.display(),
            %mime,
            "transformation complete"
        );

        Ok(TransformReport {
            input: input.to_path_buf(),
            output: output.to_path_buf(),
            mime,
            width: info.width,
            height: info.height,
        })
    }
}
