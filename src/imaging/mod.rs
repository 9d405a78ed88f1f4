//! Image handling: one contract, several engines.
//!
//! | Concern | Module |
//! |---|---|
//! | **Handler contract** | [`handler`]: [`ImageHandler`] trait, [`HandlerSettings`] |
//! | **References** | [`reference`]: [`ImageReference`], per-handler slot table |
//! | **Geometry math** | [`geometry`]: scale / crop planning, pure |
//! | **Capabilities** | [`capability`]: MIME sets, transparency rule, file-name guard |
//! | **Filters** | [`filter`] + [`dispatch`]: typed filters, validation, engine-neutral steps |
//! | **Engines** | [`RasterHandler`] (`image` crate), [`MagickHandler`] (ImageMagick CLI) |
//! | **Pipelines** | [`scoped`] guard, [`transformation`] chains |
//!
//! The module is split into:
//! - **Calculations**: geometry planning and capability checks (unit testable, no I/O)
//! - **Parameters**: value types describing filters and save options
//! - **Handlers**: the trait and its engines
//! - **Operations**: transformations combining the above

pub mod capability;
pub mod dispatch;
pub mod error;
pub mod filter;
pub mod geometry;
pub mod handler;
pub mod magick_handler;
pub mod params;
pub mod raster_handler;
pub mod reference;
pub mod scoped;
pub mod transformation;

pub use capability::{
    MimeCapability, check_file_name, extension_for_mime, mime_for_path,
    needs_transparency_conversion,
};
pub use error::{ImageError, MimeDirection, Result};
pub use filter::{ColorSpace, Filter, FilterRequest};
pub use geometry::{Direction, GeometryOperation};
pub use handler::{HandlerSettings, ImageHandler};
pub use magick_handler::{MagickHandler, MagickOptions};
pub use params::{Background, Compression, Quality, SaveOptions};
pub use raster_handler::{RasterHandler, RasterOptions, Resample};
pub use reference::{ImageInfo, ImageReference};
pub use scoped::ScopedImage;
pub use transformation::{TransformReport, Transformation};
