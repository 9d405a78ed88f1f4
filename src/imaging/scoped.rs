//! Scope guard that ties a reference's lifetime to a Rust value.
//!
//! [`ScopedImage`] closes its reference when dropped, so early returns and
//! `?` never leak backend resources. Call [`ScopedImage::close`] to observe
//! the close result; a failure during drop is only logged.

use super::error::Result;
use super::filter::Filter;
use super::handler::ImageHandler;
use super::params::SaveOptions;
use super::reference::{ImageInfo, ImageReference};
use std::path::Path;

pub struct ScopedImage<'h, H: ImageHandler + ?Sized> {
    handler: &'h mut H,
    reference: Option<ImageReference>,
}

impl<'h, H: ImageHandler + ?Sized> ScopedImage<'h, H> {
    /// Load `path` through `handler` and guard the resulting reference.
    pub fn open(handler: &'h mut H, path: &Path, mime: Option<&str>) -> Result<Self> {
        let reference = handler.load(path, mime)?;
        Ok(Self {
            handler,
            reference: Some(reference),
        })
    }

    /// The guarded reference. Only valid while the guard lives.
    pub fn reference(&self) -> ImageReference {
        self.live()
    }

    pub fn handler(&self) -> &H {
        &*self.handler
    }

    pub fn info(&self) -> Result<ImageInfo> {
        self.handler.info(&self.live())
    }

    pub fn apply(&mut self, filter: &Filter) -> Result<()> {
        let reference = self.live();
        self.handler.apply_filter(&reference, filter)
    }

    pub fn convert(&mut self, mime: &str) -> Result<()> {
        let reference = self.live();
        self.handler.convert(&reference, mime)
    }

    pub fn save(
        &mut self,
        new_path: Option<&Path>,
        mime: Option<&str>,
        options: Option<&SaveOptions>,
    ) -> Result<()> {
        let reference = self.live();
        self.handler.save(&reference, new_path, mime, options)
    }

    /// Close now and report the outcome.
    pub fn close(mut self) -> Result<()> {
        match self.reference.take() {
            Some(reference) => self.handler.close(&reference),
            None => Ok(()),
        }
    }

    fn live(&self) -> ImageReference {
        // `reference` is only taken by `close(self)`/`drop`, which consume the guard
        self.reference
            .unwrap_or_else(|| unreachable!("scoped image used after close"))
    }
}

impl<H: ImageHandler + ?Sized> Drop for ScopedImage<'_, H> {
    fn drop(&mut self) {
        if let Some(reference) = self.reference.take() {
            if let Err(e) = self.handler.close(&reference) {
                tracing::warn!(%reference, error = %e, "failed to close image on drop");
            }
        }
    }
}
