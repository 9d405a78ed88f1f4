//! Filter descriptions.
//!
//! [`Filter`] is the closed set of operations a handler can be asked to run.
//! [`FilterRequest`] is the loosely-typed `name:key=value,...` form used on the
//! command line and in config files; converting it into a [`Filter`] is where
//! missing or malformed parameters are caught.

use super::error::{ImageError, Result};
use super::geometry::{self, Direction, GeometryOperation};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

pub const COLORSPACE: &str = "colorspace";
pub const SWIRL: &str = "swirl";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorSpace {
    Grey,
    Monochrome,
    Sepia,
}

impl FromStr for ColorSpace {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "grey" | "gray" => Ok(Self::Grey),
            "monochrome" => Ok(Self::Monochrome),
            "sepia" => Ok(Self::Sepia),
            other => Err(format!(
                "unknown colour space '{other}' (expected grey, monochrome or sepia)"
            )),
        }
    }
}

impl fmt::Display for ColorSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Grey => "grey",
            Self::Monochrome => "monochrome",
            Self::Sepia => "sepia",
        })
    }
}

/// One filter application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filter {
    Geometry(GeometryOperation),
    Colorspace(ColorSpace),
    Swirl { degrees: i64 },
}

impl Filter {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Geometry(op) => op.name(),
            Self::Colorspace(_) => COLORSPACE,
            Self::Swirl { .. } => SWIRL,
        }
    }
}

impl From<GeometryOperation> for Filter {
    fn from(op: GeometryOperation) -> Self {
        Self::Geometry(op)
    }
}

impl FromStr for Filter {
    type Err = ImageError;

    fn from_str(s: &str) -> Result<Self> {
        FilterRequest::parse(s)?.to_filter()
    }
}

/// Renders in the same syntax [`FilterRequest::parse`] accepts.
impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.name();
        match *self {
            Filter::Geometry(GeometryOperation::Scale {
                width,
                height,
                direction,
            }) => write!(f, "{name}:width={width},height={height},direction={direction}"),
            Filter::Geometry(GeometryOperation::ScaleWidth { width, direction }) => {
                write!(f, "{name}:width={width},direction={direction}")
            }
            Filter::Geometry(GeometryOperation::ScaleHeight { height, direction }) => {
                write!(f, "{name}:height={height},direction={direction}")
            }
            Filter::Geometry(GeometryOperation::ScalePercent { width, height })
            | Filter::Geometry(GeometryOperation::ScaleExact { width, height }) => {
                write!(f, "{name}:width={width},height={height}")
            }
            Filter::Geometry(GeometryOperation::Crop {
                x,
                y,
                width,
                height,
            }) => write!(f, "{name}:x={x},y={y},width={width},height={height}"),
            Filter::Colorspace(space) => write!(f, "{name}:space={space}"),
            Filter::Swirl { degrees } => write!(f, "{name}:degrees={degrees}"),
        }
    }
}

/// A filter name with a free-form parameter map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterRequest {
    pub name: String,
    pub params: BTreeMap<String, String>,
}

impl FilterRequest {
    /// Parse `name` or `name:key=value,key=value`.
    pub fn parse(text: &str) -> Result<Self> {
        let text = text.trim();
        let (name, rest) = match text.split_once(':') {
            Some((name, rest)) => (name.trim(), rest),
            None => (text, ""),
        };
        if name.is_empty() {
            return Err(ImageError::not_available(text, "-"));
        }

        let mut params = BTreeMap::new();
        for pair in rest.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').ok_or_else(|| {
                ImageError::out_of_range(name, pair, pair, "expected key=value")
            })?;
            params.insert(key.trim().to_string(), value.trim().to_string());
        }

        Ok(Self {
            name: name.to_string(),
            params,
        })
    }

    /// Convert into a typed [`Filter`].
    pub fn to_filter(&self) -> Result<Filter> {
        let filter = match self.name.as_str() {
            geometry::SCALE => {
                self.only(&["width", "height", "direction"])?;
                GeometryOperation::Scale {
                    width: self.int("width")?,
                    height: self.int("height")?,
                    direction: self.direction()?,
                }
                .into()
            }
            geometry::SCALE_WIDTH => {
                self.only(&["width", "direction"])?;
                GeometryOperation::ScaleWidth {
                    width: self.int("width")?,
                    direction: self.direction()?,
                }
                .into()
            }
            geometry::SCALE_HEIGHT => {
                self.only(&["height", "direction"])?;
                GeometryOperation::ScaleHeight {
                    height: self.int("height")?,
                    direction: self.direction()?,
                }
                .into()
            }
            geometry::SCALE_PERCENT => {
                self.only(&["width", "height"])?;
                GeometryOperation::ScalePercent {
                    width: self.int("width")?,
                    height: self.int("height")?,
                }
                .into()
            }
            geometry::SCALE_EXACT => {
                self.only(&["width", "height"])?;
                GeometryOperation::ScaleExact {
                    width: self.int("width")?,
                    height: self.int("height")?,
                }
                .into()
            }
            geometry::CROP => {
                self.only(&["x", "y", "width", "height"])?;
                GeometryOperation::Crop {
                    x: self.int("x")?,
                    y: self.int("y")?,
                    width: self.int("width")?,
                    height: self.int("height")?,
                }
                .into()
            }
            COLORSPACE => {
                self.only(&["space"])?;
                let raw = self.required("space")?;
                let space = raw
                    .parse()
                    .map_err(|e: String| ImageError::out_of_range(COLORSPACE, "space", raw, e))?;
                Filter::Colorspace(space)
            }
            SWIRL => {
                self.only(&["degrees"])?;
                Filter::Swirl {
                    degrees: self.int("degrees")?,
                }
            }
            other => {
                return Err(ImageError::not_available(other, "-"));
            }
        };
        Ok(filter)
    }

    fn required(&self, key: &str) -> Result<&str> {
        self.params
            .get(key)
            .map(String::as_str)
            .ok_or_else(|| ImageError::missing(&self.name, key))
    }

    fn int(&self, key: &str) -> Result<i64> {
        let raw = self.required(key)?;
        raw.parse()
            .map_err(|_| ImageError::out_of_range(&self.name, key, raw, "expected an integer"))
    }

    fn direction(&self) -> Result<Direction> {
        match self.params.get("direction") {
            None => Ok(Direction::Both),
            Some(raw) => raw
                .parse()
                .map_err(|e: String| ImageError::out_of_range(&self.name, "direction", raw, e)),
        }
    }

    fn only(&self, allowed: &[&str]) -> Result<()> {
        match self.params.keys().find(|k| !allowed.contains(&k.as_str())) {
            Some(unknown) => Err(ImageError::out_of_range(
                &self.name,
                unknown,
                &self.params[unknown],
                format!("unknown parameter (expected one of {})", allowed.join(", ")),
            )),
            None => Ok(()),
        }
    }
}
