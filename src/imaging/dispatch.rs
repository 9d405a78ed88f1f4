//! Filter dispatch: availability check, validation, planning.
//!
//! [`prepare`] turns a [`Filter`] into an engine-neutral [`Step`]. Nothing here
//! mutates an image, so every validation error surfaces before a backend runs.

use super::error::{ImageError, Result};
use super::filter::{ColorSpace, Filter, SWIRL};
use super::geometry::{self, CropRect, GeometryPlan};

/// Largest accepted swirl angle, in either direction.
pub const MAX_SWIRL_DEGREES: i64 = 360;

/// An executable instruction for a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Unchanged,
    Resize { width: u32, height: u32 },
    Crop(CropRect),
    Colorspace(ColorSpace),
    Swirl { degrees: i64 },
}

impl Step {
    pub fn resulting_dimensions(&self, current: (u32, u32)) -> (u32, u32) {
        match *self {
            Step::Resize { width, height } => (width, height),
            Step::Crop(rect) => (rect.width, rect.height),
            Step::Unchanged | Step::Colorspace(_) | Step::Swirl { .. } => current,
        }
    }
}

impl From<GeometryPlan> for Step {
    fn from(plan: GeometryPlan) -> Self {
        match plan {
            GeometryPlan::Unchanged => Step::Unchanged,
            GeometryPlan::Resize { width, height } => Step::Resize { width, height },
            GeometryPlan::Crop(rect) => Step::Crop(rect),
        }
    }
}

/// Validate `filter` for a handler declaring `filter_names` and an image of
/// `current` size.
pub fn prepare(
    handler: &str,
    filter_names: &[&str],
    current: (u32, u32),
    filter: &Filter,
) -> Result<Step> {
    let name = filter.name();
    if !filter_names.contains(&name) {
        return Err(ImageError::not_available(name, handler));
    }

    match *filter {
        Filter::Geometry(ref op) => geometry::plan(current, op).map(Step::from),
        Filter::Colorspace(space) => Ok(Step::Colorspace(space)),
        Filter::Swirl { degrees } => {
            if !(-MAX_SWIRL_DEGREES..=MAX_SWIRL_DEGREES).contains(&degrees) {
                return Err(ImageError::out_of_range(
                    SWIRL,
                    "degrees",
                    degrees,
                    format!("must be within ±{MAX_SWIRL_DEGREES}"),
                ));
            }
            Ok(Step::Swirl { degrees })
        }
    }
}
