//! Pure geometry math for the scale and crop filters.
//!
//! Every function here is a function of the current dimensions and a
//! [`GeometryOperation`]; nothing touches pixels or the file system. Handlers
//! execute the resulting [`GeometryPlan`] against their own pixel storage, so
//! the same request produces the same dimensions on every engine.
//!
//! ## Direction policy
//!
//! | Direction | Applies the fit factor `f` when |
//! |---|---|
//! | [`Direction::Both`] | always |
//! | [`Direction::Down`] | `f < 1` |
//! | [`Direction::Up`] | `f > 1` (the result may overflow the box) |

use super::error::{ImageError, Result};
use std::fmt;
use std::str::FromStr;

pub const SCALE: &str = "scale";
pub const SCALE_WIDTH: &str = "scaleWidth";
pub const SCALE_HEIGHT: &str = "scaleHeight";
pub const SCALE_PERCENT: &str = "scalePercent";
pub const SCALE_EXACT: &str = "scaleExact";
pub const CROP: &str = "crop";

/// Canonical geometry filter names, in declaration order.
pub const GEOMETRY_FILTERS: &[&str] = &[
    SCALE,
    SCALE_WIDTH,
    SCALE_HEIGHT,
    SCALE_PERCENT,
    SCALE_EXACT,
    CROP,
];

/// Whether a scale may enlarge, shrink, or both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Both,
    Down,
    Up,
}

impl Direction {
    fn permits(self, factor: f64) -> bool {
        match self {
            Self::Both => true,
            Self::Down => factor < 1.0,
            Self::Up => factor > 1.0,
        }
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "both" => Ok(Self::Both),
            "down" => Ok(Self::Down),
            "up" => Ok(Self::Up),
            other => Err(format!("unknown direction '{other}' (expected both, down or up)")),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Both => "both",
            Self::Down => "down",
            Self::Up => "up",
        })
    }
}

/// A geometry request. Fields are signed so that nonsensical input can be
/// represented and rejected with [`ImageError::OutOfRange`] before any
/// backend runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeometryOperation {
    Scale {
        width: i64,
        height: i64,
        direction: Direction,
    },
    ScaleWidth {
        width: i64,
        direction: Direction,
    },
    ScaleHeight {
        height: i64,
        direction: Direction,
    },
    ScalePercent {
        width: i64,
        height: i64,
    },
    ScaleExact {
        width: i64,
        height: i64,
    },
    Crop {
        x: i64,
        y: i64,
        width: i64,
        height: i64,
    },
}

impl GeometryOperation {
    /// Canonical filter name of this operation.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Scale { .. } => SCALE,
            Self::ScaleWidth { .. } => SCALE_WIDTH,
            Self::ScaleHeight { .. } => SCALE_HEIGHT,
            Self::ScalePercent { .. } => SCALE_PERCENT,
            Self::ScaleExact { .. } => SCALE_EXACT,
            Self::Crop { .. } => CROP,
        }
    }
}

/// Sub-rectangle `[x, x+width) × [y, y+height)`, top-left origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// What a backend has to do to honour a geometry operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeometryPlan {
    /// Direction policy (or an identity factor) leaves the image as is.
    Unchanged,
    /// Resample to exactly these dimensions.
    Resize { width: u32, height: u32 },
    Crop(CropRect),
}

impl GeometryPlan {
    /// Dimensions after the plan runs on an image of `current` size.
    pub fn resulting_dimensions(&self, current: (u32, u32)) -> (u32, u32) {
        match *self {
            Self::Unchanged => current,
            Self::Resize { width, height } => (width, height),
            Self::Crop(rect) => (rect.width, rect.height),
        }
    }
}

/// Validate `operation` against an image of `current` size and compute the plan.
///
/// # Examples
/// ```
/// # use imageconv::imaging::geometry::{plan, Direction, GeometryOperation, GeometryPlan};
/// let op = GeometryOperation::Scale { width: 400, height: 400, direction: Direction::Both };
/// assert_eq!(plan((800, 600), &op).unwrap(), GeometryPlan::Resize { width: 400, height: 300 });
/// ```
pub fn plan(current: (u32, u32), operation: &GeometryOperation) -> Result<GeometryPlan> {
    let (cur_w, cur_h) = current;
    let filter = operation.name();

    match *operation {
        GeometryOperation::Scale {
            width,
            height,
            direction,
        } => {
            let target_w = positive(filter, "width", width)?;
            let target_h = positive(filter, "height", height)?;
            let factor = f64::min(
                target_w as f64 / cur_w as f64,
                target_h as f64 / cur_h as f64,
            );
            scale_by(filter, current, factor, direction)
        }
        GeometryOperation::ScaleWidth { width, direction } => {
            let target_w = positive(filter, "width", width)?;
            scale_by(filter, current, target_w as f64 / cur_w as f64, direction)
        }
        GeometryOperation::ScaleHeight { height, direction } => {
            let target_h = positive(filter, "height", height)?;
            scale_by(filter, current, target_h as f64 / cur_h as f64, direction)
        }
        GeometryOperation::ScalePercent { width, height } => {
            let pct_w = positive(filter, "width", width)?;
            let pct_h = positive(filter, "height", height)?;
            let new_w = scaled(filter, "width", cur_w, pct_w as f64 / 100.0)?;
            let new_h = scaled(filter, "height", cur_h, pct_h as f64 / 100.0)?;
            Ok(resize_or_unchanged(current, new_w, new_h))
        }
        GeometryOperation::ScaleExact { width, height } => {
            let new_w = positive(filter, "width", width)?;
            let new_h = positive(filter, "height", height)?;
            Ok(resize_or_unchanged(current, new_w, new_h))
        }
        GeometryOperation::Crop {
            x,
            y,
            width,
            height,
        } => {
            let rect = crop_rect(current, x, y, width, height)?;
            if rect.x == 0 && rect.y == 0 && (rect.width, rect.height) == current {
                Ok(GeometryPlan::Unchanged)
            } else {
                Ok(GeometryPlan::Crop(rect))
            }
        }
    }
}

/// Validate a crop rectangle against the image bounds.
pub fn crop_rect(current: (u32, u32), x: i64, y: i64, width: i64, height: i64) -> Result<CropRect> {
    let (cur_w, cur_h) = current;
    let width = positive(CROP, "width", width)?;
    let height = positive(CROP, "height", height)?;
    let x = non_negative(CROP, "x", x)?;
    let y = non_negative(CROP, "y", y)?;

    let right = x as u64 + width as u64;
    if right > cur_w as u64 {
        return Err(ImageError::out_of_range(
            CROP,
            "width",
            width,
            format!("x + width = {right} exceeds image width {cur_w}"),
        ));
    }
    let bottom = y as u64 + height as u64;
    if bottom > cur_h as u64 {
        return Err(ImageError::out_of_range(
            CROP,
            "height",
            height,
            format!("y + height = {bottom} exceeds image height {cur_h}"),
        ));
    }

    Ok(CropRect {
        x,
        y,
        width,
        height,
    })
}

fn scale_by(
    filter: &str,
    current: (u32, u32),
    factor: f64,
    direction: Direction,
) -> Result<GeometryPlan> {
    if !direction.permits(factor) {
        return Ok(GeometryPlan::Unchanged);
    }
    let new_w = scaled(filter, "width", current.0, factor)?;
    let new_h = scaled(filter, "height", current.1, factor)?;
    Ok(resize_or_unchanged(current, new_w, new_h))
}

fn resize_or_unchanged(current: (u32, u32), width: u32, height: u32) -> GeometryPlan {
    if (width, height) == current {
        GeometryPlan::Unchanged
    } else {
        GeometryPlan::Resize { width, height }
    }
}

/// `round(value * factor)`, rejecting results that collapse to zero pixels.
fn scaled(filter: &str, parameter: &str, value: u32, factor: f64) -> Result<u32> {
    let result = (value as f64 * factor).round();
    if result < 1.0 {
        return Err(ImageError::out_of_range(
            filter,
            parameter,
            format!("{value} x {factor}"),
            "resulting dimension rounds to 0 pixels",
        ));
    }
    if result > u32::MAX as f64 {
        return Err(ImageError::out_of_range(
            filter,
            parameter,
            format!("{value} x {factor}"),
            "resulting dimension is too large",
        ));
    }
    Ok(result as u32)
}

fn positive(filter: &str, parameter: &str, value: i64) -> Result<u32> {
    if value <= 0 {
        return Err(ImageError::out_of_range(
            filter,
            parameter,
            value,
            "must be greater than 0",
        ));
    }
    u32::try_from(value)
        .map_err(|_| ImageError::out_of_range(filter, parameter, value, "too large"))
}

fn non_negative(filter: &str, parameter: &str, value: i64) -> Result<u32> {
    if value < 0 {
        return Err(ImageError::out_of_range(
            filter,
            parameter,
            value,
            "must not be negative",
        ));
    }
    u32::try_from(value)
        .map_err(|_| ImageError::out_of_range(filter, parameter, value, "too large"))
}
