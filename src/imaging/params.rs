//! Value types passed into handler calls.
//!
//! ## Types
//!
//! - [`Quality`]: Lossy encoding quality (1–100, default 90). Clamped on construction.
//! - [`Compression`]: Lossless compression effort (`fast`, `default`, `best`).
//! - [`SaveOptions`]: Per-save knobs. Handed to `save()`, never stored.
//! - [`Background`]: Colour transparent pixels are flattened onto.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Quality setting for lossy image encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "u32", into = "u32")]
pub struct Quality(u32);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100))
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(90)
    }
}

impl From<u32> for Quality {
    fn from(value: u32) -> Self {
        Self::new(value)
    }
}

impl From<Quality> for u32 {
    fn from(q: Quality) -> Self {
        q.0
    }
}

/// Lossless compression effort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    Fast,
    #[default]
    Default,
    Best,
}

impl FromStr for Compression {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fast" => Ok(Self::Fast),
            "default" => Ok(Self::Default),
            "best" => Ok(Self::Best),
            other => Err(format!("unknown compression '{other}' (expected fast, default or best)")),
        }
    }
}

/// Options for a single `save()` call.
///
/// Each handler documents which fields it honours; the rest are ignored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SaveOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality: Option<Quality>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compression: Option<Compression>,
}

impl SaveOptions {
    pub fn is_empty(&self) -> bool {
        self.quality.is_none() && self.compression.is_none()
    }

    /// Fields set in `overlay` win over fields set here.
    pub fn merged_with(self, overlay: SaveOptions) -> SaveOptions {
        SaveOptions {
            quality: overlay.quality.or(self.quality),
            compression: overlay.compression.or(self.compression),
        }
    }
}

/// Opaque RGB colour written as `#rrggbb`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Background(pub [u8; 3]);

impl Background {
    pub const WHITE: Background = Background([0xff, 0xff, 0xff]);
}

impl Default for Background {
    fn default() -> Self {
        Self::WHITE
    }
}

impl FromStr for Background {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex = s
            .strip_prefix('#')
            .ok_or_else(|| format!("colour '{s}' must start with '#'"))?;
        if hex.len() != 6 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(format!("colour '{s}' must be #rrggbb"));
        }
        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|e| e.to_string());
        Ok(Self([channel(0)?, channel(2)?, channel(4)?]))
    }
}

impl TryFrom<String> for Background {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Background> for String {
    fn from(bg: Background) -> Self {
        bg.to_string()
    }
}

impl fmt::Display for Background {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [r, g, b] = self.0;
        write!(f, "#{r:02x}{g:02x}{b:02x}")
    }
}
