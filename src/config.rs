//! Configuration module.
//!
//! Handles loading, validating, and merging `imageconv.toml`. Stock defaults
//! are the base layer; a user file only needs the keys it changes.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [handler]
//! backend = "raster"        # raster | magick
//! reference_name = ""      # handler's `name` property, empty = backend name
//!
//! [raster]
//! resample = "lanczos3"     # nearest | triangle | catmullrom | gaussian | lanczos3
//! background = "#ffffff"    # flattening colour for PNG/GIF → opaque formats
//! max_pixels = 100000000    # largest filter result, width * height
//!
//! [magick]
//! convert = "convert"
//! identify = "identify"
//! background = "#ffffff"
//!
//! [save]
//! # quality = 90            # 1-100, lossy formats
//! # compression = "default" # fast | default | best, PNG
//!
//! [transformations.thumbnail]
//! filters = ["scale:width=150,height=150,direction=down"]
//! mimes = ["image/jpeg", "image/png"]
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use crate::imaging::{
    Filter, HandlerSettings, ImageHandler, MagickHandler, MagickOptions, RasterHandler,
    RasterOptions, SaveOptions, Transformation,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

/// File looked up in the working directory when no `--config` is given.
pub const DEFAULT_CONFIG_FILE: &str = "imageconv.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Which engine the CLI builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Raster,
    Magick,
}

impl Backend {
    pub fn as_str(self) -> &'static str {
        match self {
            Backend::Raster => "raster",
            Backend::Magick => "magick",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HandlerConfig {
    pub backend: Backend,
    /// Identity label. Empty means "use the backend name".
    pub reference_name: String,
}

/// A named filter chain as written in the config file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransformationConfig {
    /// Filters in `name:key=value,...` form.
    pub filters: Vec<String>,
    /// Output MIME types in order of preference.
    pub mimes: Vec<String>,
    /// Overrides for the global `[save]` options.
    pub save: SaveOptions,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub handler: HandlerConfig,
    pub raster: RasterOptions,
    pub magick: MagickOptions,
    pub save: SaveOptions,
    pub transformations: BTreeMap<String, TransformationConfig>,
}

impl AppConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.raster.max_pixels == 0 {
            return Err(ConfigError::Validation(
                "raster.max_pixels must be non-zero".into(),
            ));
        }
        for (name, t) in &self.transformations {
            for filter in &t.filters {
                filter.parse::<Filter>().map_err(|e| {
                    ConfigError::Validation(format!("transformations.{name}: {e}"))
                })?;
            }
            if let Some(bad) = t.mimes.iter().find(|m| !is_mime(m)) {
                return Err(ConfigError::Validation(format!(
                    "transformations.{name}: '{bad}' is not a type/subtype MIME identifier"
                )));
            }
        }
        Ok(())
    }

    /// Identity label for the selected backend.
    pub fn reference_name(&self) -> String {
        if self.handler.reference_name.is_empty() {
            self.handler.backend.as_str().to_string()
        } else {
            self.handler.reference_name.clone()
        }
    }

    pub fn raster_settings(&self) -> HandlerSettings<RasterOptions> {
        HandlerSettings::new(self.reference_name(), self.raster.clone())
    }

    pub fn magick_settings(&self) -> HandlerSettings<MagickOptions> {
        HandlerSettings::new(self.reference_name(), self.magick.clone())
    }

    /// Construct the configured engine.
    pub fn build_handler(&self) -> Box<dyn ImageHandler> {
        match self.handler.backend {
            Backend::Raster => Box::new(RasterHandler::new(self.raster_settings())),
            Backend::Magick => Box::new(MagickHandler::new(self.magick_settings())),
        }
    }

    /// Build the named transformation, layering its `save` table over `[save]`.
    pub fn transformation(&self, name: &str) -> Result<Transformation, ConfigError> {
        let t = self.transformations.get(name).ok_or_else(|| {
            let known: Vec<&str> = self.transformations.keys().map(String::as_str).collect();
            ConfigError::Validation(format!(
                "unknown transformation '{name}'. Available: {known:?}"
            ))
        })?;
        let filters = t
            .filters
            .iter()
            .map(|f| f.parse::<Filter>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| ConfigError::Validation(format!("transformations.{name}: {e}")))?;
        let mut transformation = Transformation::new(name, filters, t.mimes.clone());
        transformation.save_options = self.save.merged_with(t.save);
        Ok(transformation)
    }
}

fn is_mime(s: &str) -> bool {
    matches!(s.split_once('/'), Some((ty, sub)) if !ty.is_empty() && !sub.is_empty() && !sub.contains('/'))
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
pub fn stock_defaults_value() -> toml::Value {
    toml::Value::try_from(AppConfig::default()).expect("default config must serialize")
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load a config file as a raw TOML value.
///
/// Returns `Ok(None)` if the file does not exist.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<AppConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: AppConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from `path`, or from [`DEFAULT_CONFIG_FILE`] if `path` is `None`.
///
/// An explicitly named file must exist; the default file is optional.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let overlay = match path {
        Some(p) => Some(load_raw_config(p)?.ok_or_else(|| {
            ConfigError::Validation(format!("config file {} not found", p.display()))
        })?),
        None => load_raw_config(Path::new(DEFAULT_CONFIG_FILE))?,
    };
    resolve_config(stock_defaults_value(), overlay)
}

/// Returns a fully-commented stock `imageconv.toml`.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# imageconv configuration
# =======================
#
# Every key is optional; the values below are the built-in defaults.
# Unknown keys are rejected.

[handler]
# Engine used by the CLI: "raster" (built-in, image crate) or
# "magick" (ImageMagick command-line tools).
backend = "raster"
# Identity label exposed as the handler's `name`. Empty = backend name.
reference_name = ""

[raster]
# Resampling kernel: nearest, triangle, catmullrom, gaussian, lanczos3.
resample = "lanczos3"
# Colour transparent pixels are flattened onto when converting
# PNG/GIF to a format without transparency.
background = "#ffffff"
# Largest permitted filter result (width * height).
max_pixels = 100000000

[magick]
convert = "convert"
identify = "identify"
background = "#ffffff"

[save]
# quality = 90            # 1-100, JPEG/WebP/AVIF
# compression = "default" # fast, default, best - PNG

# Named filter chains, used with `imageconv apply <name>`.
# Filter syntax: name:key=value,...
#
#   scale:width=W,height=H[,direction=both|down|up]
#   scaleWidth:width=W[,direction=...]
#   scaleHeight:height=H[,direction=...]
#   scalePercent:width=P,height=P
#   scaleExact:width=W,height=H
#   crop:x=X,y=Y,width=W,height=H
#   colorspace:space=grey|monochrome|sepia
#   swirl:degrees=D            (magick only)
#
# [transformations.thumbnail]
# filters = ["scale:width=150,height=150,direction=down"]
# mimes = ["image/jpeg", "image/png"]
# save = { quality = 80 }
"##
}
