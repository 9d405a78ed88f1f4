//! The handler contract every image engine implements.
//!
//! A handler owns the images it loads. Callers get back an
//! [`ImageReference`] and pass it to every later call; the pixel state behind
//! it never leaves the handler. Implementations:
//!
//! | Handler | Engine | Geometry executed |
//! |---|---|---|
//! | [`RasterHandler`](super::raster_handler::RasterHandler) | `image` crate, in process | immediately on the decoded buffer |
//! | [`MagickHandler`](super::magick_handler::MagickHandler) | ImageMagick `convert` | recorded, replayed at `save()` |

use super::capability::MimeCapability;
use super::error::{ImageError, Result};
use super::filter::Filter;
use super::params::SaveOptions;
use super::reference::{ImageInfo, ImageReference};
use std::path::Path;

/// Settings a handler is constructed from.
#[derive(Debug, Clone, PartialEq)]
pub struct HandlerSettings<O> {
    /// Identity label, exposed as the handler's `name` property.
    pub reference_name: String,
    /// Engine-specific options.
    pub options: O,
}

impl<O> HandlerSettings<O> {
    pub fn new(reference_name: impl Into<String>, options: O) -> Self {
        Self {
            reference_name: reference_name.into(),
            options,
        }
    }
}

/// Name of the only handler property.
pub const NAME_PROPERTY: &str = "name";

/// Backend-facing image contract.
///
/// All validation (file name, MIME capability, filter availability and
/// parameter ranges) happens before a backend mutates anything, and a failed
/// filter leaves the reference in its previous state.
pub trait ImageHandler {
    /// Read-only identity, set once from [`HandlerSettings::reference_name`].
    fn name(&self) -> &str;

    fn capability(&self) -> &MimeCapability;

    /// Filters this handler supports, in declaration order.
    fn filter_names(&self) -> &[&'static str];

    /// Open and decode `path`. `mime` overrides detection.
    fn load(&mut self, path: &Path, mime: Option<&str>) -> Result<ImageReference>;

    /// Write the current pixels to `new_path` (or the loaded path) as `mime`
    /// (or the current MIME). The reference stays open.
    fn save(
        &mut self,
        reference: &ImageReference,
        new_path: Option<&Path>,
        mime: Option<&str>,
        options: Option<&SaveOptions>,
    ) -> Result<()>;

    /// Release the reference. A second close fails with `InvalidReference`.
    fn close(&mut self, reference: &ImageReference) -> Result<()>;

    /// Current dimensions, MIME and source path of a loaded image.
    fn info(&self, reference: &ImageReference) -> Result<ImageInfo>;

    fn apply_filter(&mut self, reference: &ImageReference, filter: &Filter) -> Result<()>;

    /// Change the target MIME, flattening transparency when the target
    /// format cannot carry it.
    fn convert(&mut self, reference: &ImageReference, mime: &str) -> Result<()>;

    fn allows_input(&self, mime: &str) -> bool {
        self.capability().allows_input(mime)
    }

    fn allows_output(&self, mime: &str) -> bool {
        self.capability().allows_output(mime)
    }

    fn has_filter(&self, name: &str) -> bool {
        self.filter_names().contains(&name)
    }

    fn has_property(&self, property: &str) -> bool {
        property == NAME_PROPERTY
    }

    fn property(&self, property: &str) -> Result<&str> {
        match property {
            NAME_PROPERTY => Ok(self.name()),
            other => Err(ImageError::PropertyNotFound(other.to_string())),
        }
    }

    fn set_property(&mut self, property: &str, _value: &str) -> Result<()> {
        match property {
            NAME_PROPERTY => Err(ImageError::PropertyReadOnly(property.to_string())),
            other => Err(ImageError::PropertyNotFound(other.to_string())),
        }
    }
}
