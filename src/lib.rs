//! # imageconv
//!
//! A backend-agnostic image handler: one contract for loading, transforming,
//! converting and saving raster images, with interchangeable engines behind it.
//!
//! # Architecture
//!
//! ```text
//! Filter ──► dispatch (validate, plan geometry) ──► Step ──► engine
//!                                                           ├── RasterHandler  (image crate)
//!                                                           └── MagickHandler  (ImageMagick CLI)
//! ```
//!
//! Callers never hold pixels. [`imaging::ImageHandler::load`] returns an
//! opaque [`imaging::ImageReference`] that names an image owned by the handler
//! until it is closed. All parameter checking and capability negotiation is
//! shared code, so engines only execute already-valid steps.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`imaging`] | Handler contract, geometry calculations, capabilities, filters, engines |
//! | [`config`] | `imageconv.toml` loading, merging, and validation |
//! | [`batch`] | Parallel directory-wide transformations |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Geometry Is Pure
//!
//! Every scale and crop is reduced to target dimensions by
//! [`imaging::geometry::plan`] before an engine runs. The direction policy,
//! aspect-ratio fitting and bounds checks are unit tested without decoding a
//! single image, and both engines agree on the result to the pixel.
//!
//! ## Transparency Negotiation
//!
//! PNG and GIF carry transparency. Converting either to a format that cannot
//! flattens the image onto the configured background first; see
//! [`imaging::needs_transparency_conversion`].

pub mod batch;
pub mod config;
pub mod imaging;
pub mod output;

#[cfg(test)]
pub(crate) mod test_helpers;
