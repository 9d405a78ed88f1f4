//! In-process handler built on the `image` crate.
//!
//! Images are decoded at `load()` and every filter runs immediately on the
//! decoded buffer. A filter computes a new buffer and swaps it in only on
//! success, so a failure never leaves a half-transformed image behind.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode (PNG, JPEG, GIF, TIFF, WebP) | `image::ImageReader` |
//! | Resize | `DynamicImage::resize_exact` with the configured [`Resample`] filter |
//! | Crop | `DynamicImage::crop_imm` |
//! | Grey / monochrome / sepia | `DynamicImage::grayscale` + per-pixel maps |
//! | Encode → JPEG | `JpegEncoder::new_with_quality` |
//! | Encode → PNG | `PngEncoder::new_with_quality` |
//! | Encode → AVIF | `AvifEncoder::new_with_speed_quality` (rav1e, speed 6) |
//! | Encode → GIF, TIFF, WebP | `DynamicImage::write_to` |
//!
//! ## Save options
//!
//! `quality` is honoured for JPEG and AVIF, `compression` for PNG. Options a
//! format does not use are ignored (logged at `debug`).

use super::capability::{MimeCapability, check_file_name, needs_transparency_conversion};
use super::dispatch::{self, Step};
use super::error::{ImageError, MimeDirection, Result};
use super::filter::{COLORSPACE, ColorSpace, Filter};
use super::geometry::{CROP, SCALE, SCALE_EXACT, SCALE_HEIGHT, SCALE_PERCENT, SCALE_WIDTH};
use super::handler::{HandlerSettings, ImageHandler};
use super::params::{Background, Compression, SaveOptions};
use super::reference::{HandlerId, ImageInfo, ImageReference, ReferenceTable};
use image::codecs::png::{CompressionType, FilterType as PngFilter};
use image::imageops::FilterType;
use image::{DynamicImage, ImageEncoder, ImageFormat, ImageReader, Luma, Rgb, RgbImage};
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::path::{Path, PathBuf};

/// Formats whose decoders are compiled in.
///
/// AVIF is output-only: the `image` crate's `"avif"` feature enables the
/// rav1e encoder but no decoder.
const INPUT_MIMES: &[&str] = &[
    "image/png",
    "image/jpeg",
    "image/gif",
    "image/tiff",
    "image/webp",
];

const OUTPUT_MIMES: &[&str] = &[
    "image/png",
    "image/jpeg",
    "image/gif",
    "image/tiff",
    "image/webp",
    "image/avif",
];

const CAPABILITY: MimeCapability = MimeCapability::new(INPUT_MIMES, OUTPUT_MIMES);

const FILTERS: &[&str] = &[
    SCALE,
    SCALE_WIDTH,
    SCALE_HEIGHT,
    SCALE_PERCENT,
    SCALE_EXACT,
    CROP,
    COLORSPACE,
];

/// Resampling kernel used by every resize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resample {
    Nearest,
    Triangle,
    CatmullRom,
    Gaussian,
    #[default]
    Lanczos3,
}

impl From<Resample> for FilterType {
    fn from(r: Resample) -> Self {
        match r {
            Resample::Nearest => FilterType::Nearest,
            Resample::Triangle => FilterType::Triangle,
            Resample::CatmullRom => FilterType::CatmullRom,
            Resample::Gaussian => FilterType::Gaussian,
            Resample::Lanczos3 => FilterType::Lanczos3,
        }
    }
}

/// Engine options for [`RasterHandler`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RasterOptions {
    pub resample: Resample,
    /// Colour transparent pixels are flattened onto.
    pub background: Background,
    /// Upper bound on `width * height` of any filter result.
    pub max_pixels: u64,
}

impl Default for RasterOptions {
    fn default() -> Self {
        Self {
            resample: Resample::default(),
            background: Background::default(),
            max_pixels: 100_000_000,
        }
    }
}

struct RasterImage {
    pixels: DynamicImage,
    mime: String,
    path: PathBuf,
}

/// Handler that decodes into memory with the `image` crate.
pub struct RasterHandler {
    settings: HandlerSettings<RasterOptions>,
    table: ReferenceTable<RasterImage>,
}

impl RasterHandler {
    pub fn new(settings: HandlerSettings<RasterOptions>) -> Self {
        Self {
            settings,
            table: ReferenceTable::new(HandlerId::next()),
        }
    }

    pub fn options(&self) -> &RasterOptions {
        &self.settings.options
    }

    fn unsupported(&self, mime: &str, direction: MimeDirection) -> ImageError {
        ImageError::MimeUnsupported {
            mime: mime.to_string(),
            direction,
            handler: self.settings.reference_name.clone(),
        }
    }
}

impl ImageHandler for RasterHandler {
    fn name(&self) -> &str {
        &self.settings.reference_name
    }

    fn capability(&self) -> &MimeCapability {
        &CAPABILITY
    }

    fn filter_names(&self) -> &[&'static str] {
        FILTERS
    }

    fn load(&mut self, path: &Path, mime: Option<&str>) -> Result<ImageReference> {
        check_file_name(path)?;
        if let Some(hint) = mime {
            if !self.allows_input(hint) {
                return Err(self.unsupported(hint, MimeDirection::Input));
            }
        }

        let mut reader = ImageReader::open(path).map_err(|e| ImageError::io(path, e))?;
        match mime.and_then(ImageFormat::from_mime_type) {
            Some(format) => reader.set_format(format),
            None => {
                reader = reader
                    .with_guessed_format()
                    .map_err(|e| ImageError::io(path, e))?;
            }
        }

        let detected = match mime {
            Some(hint) => hint.to_ascii_lowercase(),
            None => reader
                .format()
                .map(|f| f.to_mime_type().to_string())
                .ok_or_else(|| undecodable(path, "unrecognised image format".to_string()))?,
        };
        if !self.allows_input(&detected) {
            return Err(self.unsupported(&detected, MimeDirection::Input));
        }

        let pixels = reader
            .decode()
            .map_err(|e| undecodable(path, e.to_string()))?;
        tracing::debug!(
            handler = %self.settings.reference_name,
            path = %path.display(),
            mime = %detected,
            width = pixels.width(),
            height = pixels.height(),
            "loaded image"
        );

        Ok(self.table.insert(RasterImage {
            pixels,
            mime: detected,
            path: path.to_path_buf(),
        }))
    }

    fn save(
        &mut self,
        reference: &ImageReference,
        new_path: Option<&Path>,
        mime: Option<&str>,
        options: Option<&SaveOptions>,
    ) -> Result<()> {
        if let Some(path) = new_path {
            check_file_name(path)?;
        }
        let image = self.table.get("save", reference)?;
        let target_mime = mime.unwrap_or(&image.mime).to_ascii_lowercase();
        if !self.allows_output(&target_mime) {
            return Err(self.unsupported(&target_mime, MimeDirection::Output));
        }
        let path = new_path.unwrap_or(&image.path);

        let flattened;
        let pixels = if needs_transparency_conversion(&image.mime, Some(&target_mime)) {
            flattened = flatten(&image.pixels, self.settings.options.background);
            &flattened
        } else {
            &image.pixels
        };

        encode(pixels, path, &target_mime, options.copied().unwrap_or_default())?;
        tracing::debug!(%reference, path = %path.display(), mime = %target_mime, "saved image");
        Ok(())
    }

    fn close(&mut self, reference: &ImageReference) -> Result<()> {
        self.table.remove("close", reference)?;
        tracing::debug!(%reference, "closed image");
        Ok(())
    }

    fn info(&self, reference: &ImageReference) -> Result<ImageInfo> {
        let image = self.table.get("info", reference)?;
        Ok(ImageInfo {
            width: image.pixels.width(),
            height: image.pixels.height(),
            mime: image.mime.clone(),
            path: image.path.clone(),
        })
    }

    fn apply_filter(&mut self, reference: &ImageReference, filter: &Filter) -> Result<()> {
        let resample = FilterType::from(self.settings.options.resample);
        let max_pixels = self.settings.options.max_pixels;
        let image = self.table.get_mut("apply_filter", reference)?;
        let current = (image.pixels.width(), image.pixels.height());
        let step = dispatch::prepare(&self.settings.reference_name, FILTERS, current, filter)
            .map_err(|e| e.on_reference(reference))?;

        let (width, height) = step.resulting_dimensions(current);
        if width as u64 * height as u64 > max_pixels {
            return Err(ImageError::FilterFailed {
                filter: filter.name().to_string(),
                reference: reference.to_string(),
                message: format!("{width}x{height} exceeds the {max_pixels} pixel limit"),
            });
        }

        let next = match step {
            Step::Unchanged => None,
            Step::Resize { width, height } => {
                Some(image.pixels.resize_exact(width, height, resample))
            }
            Step::Crop(rect) => Some(image.pixels.crop_imm(rect.x, rect.y, rect.width, rect.height)),
            Step::Colorspace(space) => Some(recolour(&image.pixels, space)),
            Step::Swirl { .. } => {
                return Err(ImageError::FilterFailed {
                    filter: filter.name().to_string(),
                    reference: reference.to_string(),
                    message: "swirl is not implemented by this engine".to_string(),
                });
            }
        };

        if let Some(pixels) = next {
            image.pixels = pixels;
        }
        tracing::debug!(%reference, filter = %filter, width, height, "applied filter");
        Ok(())
    }

    fn convert(&mut self, reference: &ImageReference, mime: &str) -> Result<()> {
        if !self.allows_output(mime) {
            return Err(self.unsupported(mime, MimeDirection::Output));
        }
        let background = self.settings.options.background;
        let image = self.table.get_mut("convert", reference)?;
        let flatten_needed = needs_transparency_conversion(&image.mime, Some(mime));
        if flatten_needed {
            image.pixels = flatten(&image.pixels, background);
        }
        image.mime = mime.to_ascii_lowercase();
        tracing::debug!(%reference, mime, flattened = flatten_needed, "converted image");
        Ok(())
    }
}

fn undecodable(path: &Path, reason: String) -> ImageError {
    ImageError::InvalidReference {
        operation: "load",
        reference: path.display().to_string(),
        reason,
    }
}

/// Composite every pixel over `background`, dropping the alpha channel.
fn flatten(pixels: &DynamicImage, background: Background) -> DynamicImage {
    let rgba = pixels.to_rgba8();
    let [br, bg, bb] = background.0;
    let out = RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let [r, g, b, a] = rgba.get_pixel(x, y).0;
        let a = a as u32;
        let blend = |c: u8, back: u8| ((c as u32 * a + back as u32 * (255 - a) + 127) / 255) as u8;
        Rgb([blend(r, br), blend(g, bg), blend(b, bb)])
    });
    DynamicImage::ImageRgb8(out)
}

fn recolour(pixels: &DynamicImage, space: ColorSpace) -> DynamicImage {
    match space {
        ColorSpace::Grey => pixels.grayscale(),
        ColorSpace::Monochrome => {
            let mut luma = pixels.to_luma8();
            for Luma([v]) in luma.pixels_mut() {
                *v = if *v >= 128 { 255 } else { 0 };
            }
            DynamicImage::ImageLuma8(luma)
        }
        ColorSpace::Sepia => {
            let mut rgba = pixels.to_rgba8();
            for px in rgba.pixels_mut() {
                let [r, g, b, _] = px.0;
                let (r, g, b) = (r as f32, g as f32, b as f32);
                let tone = |cr: f32, cg: f32, cb: f32| (r * cr + g * cg + b * cb).min(255.0) as u8;
                px.0[0] = tone(0.393, 0.769, 0.189);
                px.0[1] = tone(0.349, 0.686, 0.168);
                px.0[2] = tone(0.272, 0.534, 0.131);
            }
            DynamicImage::ImageRgba8(rgba)
        }
    }
}

fn encode(pixels: &DynamicImage, path: &Path, mime: &str, options: SaveOptions) -> Result<()> {
    let format = ImageFormat::from_mime_type(mime).ok_or_else(|| ImageError::SaveFailed {
        path: path.to_path_buf(),
        message: format!("no encoder for {mime}"),
    })?;
    let quality = options.quality.unwrap_or_default().value() as u8;
    let compression = options.compression.unwrap_or_default();
    if options.quality.is_some() && !matches!(format, ImageFormat::Jpeg | ImageFormat::Avif) {
        tracing::debug!(mime, "quality option ignored");
    }
    if options.compression.is_some() && format != ImageFormat::Png {
        tracing::debug!(mime, "compression option ignored");
    }

    // encode fully before touching the target
    let mut writer = Cursor::new(Vec::new());
    let (width, height) = (pixels.width(), pixels.height());

    let result = match format {
        ImageFormat::Jpeg => {
            let rgb = pixels.to_rgb8();
            image::codecs::jpeg::JpegEncoder::new_with_quality(&mut writer, quality).write_image(
                rgb.as_raw(),
                width,
                height,
                image::ExtendedColorType::Rgb8,
            )
        }
        ImageFormat::Png => {
            let level = match compression {
                Compression::Fast => CompressionType::Fast,
                Compression::Default => CompressionType::Default,
                Compression::Best => CompressionType::Best,
            };
            let encoder =
                image::codecs::png::PngEncoder::new_with_quality(&mut writer, level, PngFilter::Adaptive);
            pixels.write_with_encoder(encoder)
        }
        ImageFormat::Avif => {
            let encoder =
                image::codecs::avif::AvifEncoder::new_with_speed_quality(&mut writer, 6, quality);
            pixels.write_with_encoder(encoder)
        }
        ImageFormat::Gif | ImageFormat::WebP => {
            DynamicImage::ImageRgba8(pixels.to_rgba8()).write_to(&mut writer, format)
        }
        other => pixels.write_to(&mut writer, other),
    };

    result.map_err(|e| ImageError::SaveFailed {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    std::fs::write(path, writer.into_inner()).map_err(|e| ImageError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::geometry::{Direction, GeometryOperation};
    use crate::imaging::params::Quality;
    use crate::test_helpers::{create_test_jpeg, create_test_png};
    use image::GenericImageView;

    fn handler() -> RasterHandler {
        RasterHandler::new(HandlerSettings::new("raster", RasterOptions::default()))
    }

    fn geometry(op: GeometryOperation) -> Filter {
        Filter::Geometry(op)
    }

    #[test]
    fn load_detects_mime_and_dimensions() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("in.png");
        create_test_png(&path, 64, 48, false);

        let mut h = handler();
        let r = h.load(&path, None).unwrap();
        let info = h.info(&r).unwrap();
        assert_eq!(info.dimensions(), (64, 48));
        assert_eq!(info.mime, "image/png");
        assert_eq!(info.path, path);
    }

    #[test]
    fn load_rejects_illegal_name_before_io() {
        let mut h = handler();
        let err = h.load(Path::new("/nonexistent/$HOME.png"), None).unwrap_err();
        assert!(matches!(err, ImageError::InvalidFileName { .. }));
    }

    #[test]
    fn load_undecodable_is_invalid_reference() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("broken.png");
        std::fs::write(&path, b"definitely not a png").unwrap();

        let err = handler().load(&path, None).unwrap_err();
        assert!(matches!(err, ImageError::InvalidReference { operation: "load", .. }));
    }

    #[test]
    fn load_rejects_output_only_mime_hint() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("in.png");
        create_test_png(&path, 8, 8, false);

        let err = handler().load(&path, Some("image/avif")).unwrap_err();
        assert!(matches!(
            err,
            ImageError::MimeUnsupported {
                direction: MimeDirection::Input,
                ..
            }
        ));
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let err = handler().load(Path::new("/nonexistent/in.png"), None).unwrap_err();
        assert!(matches!(err, ImageError::Io { .. }));
    }

    #[test]
    fn end_to_end_scale_percent_crop() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("in.jpg");
        create_test_jpeg(&path, 800, 600);

        let mut h = handler();
        let r = h.load(&path, None).unwrap();
        h.apply_filter(
            &r,
            &geometry(GeometryOperation::Scale {
                width: 400,
                height: 400,
                direction: Direction::Both,
            }),
        )
        .unwrap();
        assert_eq!(h.info(&r).unwrap().dimensions(), (400, 300));

        h.apply_filter(
            &r,
            &geometry(GeometryOperation::ScalePercent {
                width: 50,
                height: 200,
            }),
        )
        .unwrap();
        assert_eq!(h.info(&r).unwrap().dimensions(), (200, 600));

        h.apply_filter(
            &r,
            &geometry(GeometryOperation::Crop {
                x: 10,
                y: 10,
                width: 100,
                height: 50,
            }),
        )
        .unwrap();
        assert_eq!(h.info(&r).unwrap().dimensions(), (100, 50));

        let out = tmp.path().join("out.png");
        h.save(&r, Some(&out), Some("image/png"), None).unwrap();
        assert_eq!(image::image_dimensions(&out).unwrap(), (100, 50));

        h.close(&r).unwrap();
        assert!(matches!(
            h.save(&r, None, None, None),
            Err(ImageError::InvalidReference { operation: "save", .. })
        ));
        assert!(matches!(
            h.close(&r),
            Err(ImageError::InvalidReference { operation: "close", .. })
        ));
    }

    #[test]
    fn failed_filter_keeps_previous_pixels() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("in.png");
        create_test_png(&path, 20, 10, false);

        let mut h = handler();
        let r = h.load(&path, None).unwrap();
        let err = h
            .apply_filter(
                &r,
                &geometry(GeometryOperation::Crop {
                    x: 15,
                    y: 0,
                    width: 10,
                    height: 5,
                }),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            ImageError::OutOfRange { reference: Some(ref name), .. } if *name == r.to_string()
        ));
        assert_eq!(h.info(&r).unwrap().dimensions(), (20, 10));
    }

    #[test]
    fn pixel_limit_fails_filter_without_mutation() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("in.png");
        create_test_png(&path, 10, 10, false);

        let options = RasterOptions {
            max_pixels: 1_000,
            ..RasterOptions::default()
        };
        let mut h = RasterHandler::new(HandlerSettings::new("small", options));
        let r = h.load(&path, None).unwrap();
        let err = h
            .apply_filter(
                &r,
                &geometry(GeometryOperation::ScaleExact {
                    width: 100,
                    height: 100,
                }),
            )
            .unwrap_err();
        assert!(matches!(err, ImageError::FilterFailed { .. }));
        assert_eq!(h.info(&r).unwrap().dimensions(), (10, 10));
    }

    #[test]
    fn swirl_is_not_available() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("in.png");
        create_test_png(&path, 10, 10, false);

        let mut h = handler();
        assert!(!h.has_filter("swirl"));
        let r = h.load(&path, None).unwrap();
        let err = h.apply_filter(&r, &Filter::Swirl { degrees: 90 }).unwrap_err();
        assert!(matches!(err, ImageError::FilterNotAvailable { .. }));
        assert!(err.to_string().contains(&r.to_string()), "{err}");
    }

    #[test]
    fn convert_flattens_transparency_onto_background() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("in.png");
        create_test_png(&path, 4, 4, true);

        let options = RasterOptions {
            background: Background([255, 0, 0]),
            ..RasterOptions::default()
        };
        let mut h = RasterHandler::new(HandlerSettings::new("raster", options));
        let r = h.load(&path, None).unwrap();
        h.convert(&r, "image/jpeg").unwrap();
        assert_eq!(h.info(&r).unwrap().mime, "image/jpeg");

        // write losslessly to inspect the flattened pixels
        let out = tmp.path().join("flat.png");
        h.save(&r, Some(&out), Some("image/png"), None).unwrap();
        let flat = image::open(&out).unwrap();
        // (0, 0) is fully transparent in the fixture
        assert_eq!(flat.get_pixel(0, 0).0, [255, 0, 0, 255]);
    }

    #[test]
    fn convert_between_transparency_formats_keeps_alpha() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("in.png");
        create_test_png(&path, 4, 4, true);

        let mut h = handler();
        let r = h.load(&path, None).unwrap();
        h.convert(&r, "image/gif").unwrap();
        let out = tmp.path().join("still-alpha.png");
        h.save(&r, Some(&out), Some("image/png"), None).unwrap();
        assert_eq!(image::open(&out).unwrap().get_pixel(0, 0).0[3], 0);
    }

    #[test]
    fn convert_to_unsupported_mime_fails() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("in.png");
        create_test_png(&path, 4, 4, false);

        let mut h = handler();
        let r = h.load(&path, None).unwrap();
        assert!(matches!(
            h.convert(&r, "image/bmp"),
            Err(ImageError::MimeUnsupported {
                direction: MimeDirection::Output,
                ..
            })
        ));
        assert_eq!(h.info(&r).unwrap().mime, "image/png");
    }

    #[test]
    fn save_without_path_overwrites_source() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("in.png");
        create_test_png(&path, 30, 20, false);

        let mut h = handler();
        let r = h.load(&path, None).unwrap();
        h.apply_filter(
            &r,
            &geometry(GeometryOperation::ScaleExact {
                width: 3,
                height: 2,
            }),
        )
        .unwrap();
        h.save(&r, None, None, None).unwrap();
        assert_eq!(image::image_dimensions(&path).unwrap(), (3, 2));
        // saving does not close
        assert!(h.info(&r).is_ok());
    }

    #[test]
    fn failed_encode_keeps_existing_target() {
        let tmp = tempfile::TempDir::new().unwrap();
        // JPEG cannot store a side longer than 65535 pixels
        let path = tmp.path().join("wide.png");
        create_test_png(&path, 65_536, 1, false);
        let target = tmp.path().join("keep.jpg");
        create_test_jpeg(&target, 8, 8);
        let before = std::fs::read(&target).unwrap();

        let mut h = handler();
        let r = h.load(&path, None).unwrap();
        assert!(matches!(
            h.save(&r, Some(&target), Some("image/jpeg"), None),
            Err(ImageError::SaveFailed { .. })
        ));
        assert_eq!(std::fs::read(&target).unwrap(), before);

        let png_before = std::fs::read(&path).unwrap();
        assert!(h.save(&r, None, Some("image/jpeg"), None).is_err());
        assert_eq!(std::fs::read(&path).unwrap(), png_before);
    }

    #[test]
    fn jpeg_quality_changes_output_size() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("in.png");
        create_test_png(&path, 128, 128, false);

        let mut h = handler();
        let r = h.load(&path, None).unwrap();
        let low = tmp.path().join("low.jpg");
        let high = tmp.path().join("high.jpg");
        let opts = |q| SaveOptions {
            quality: Some(Quality::new(q)),
            compression: None,
        };
        h.save(&r, Some(&low), Some("image/jpeg"), Some(&opts(10)))
            .unwrap();
        h.save(&r, Some(&high), Some("image/jpeg"), Some(&opts(95)))
            .unwrap();
        let size = |p: &Path| std::fs::metadata(p).unwrap().len();
        assert!(size(&low) < size(&high));
    }

    #[test]
    fn save_rejects_illegal_target_name() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("in.png");
        create_test_png(&path, 4, 4, false);

        let mut h = handler();
        let r = h.load(&path, None).unwrap();
        let bad = tmp.path().join("it's.png");
        assert!(matches!(
            h.save(&r, Some(&bad), None, None),
            Err(ImageError::InvalidFileName { .. })
        ));
        assert!(!bad.exists());
    }

    #[test]
    fn colorspace_filters_recolour_pixels() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("in.png");
        create_test_png(&path, 16, 16, false);

        let mut h = handler();
        let r = h.load(&path, None).unwrap();
        h.apply_filter(&r, &Filter::Colorspace(ColorSpace::Monochrome))
            .unwrap();
        let out = tmp.path().join("mono.png");
        h.save(&r, Some(&out), None, None).unwrap();
        let mono = image::open(&out).unwrap().to_luma8();
        assert!(mono.pixels().all(|p| p.0[0] == 0 || p.0[0] == 255));
    }

    #[test]
    fn grey_produces_equal_channels() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("in.png");
        create_test_png(&path, 8, 8, false);

        let mut h = handler();
        let r = h.load(&path, None).unwrap();
        h.apply_filter(&r, &Filter::Colorspace(ColorSpace::Grey))
            .unwrap();
        let out = tmp.path().join("grey.png");
        h.save(&r, Some(&out), None, None).unwrap();
        let grey = image::open(&out).unwrap().to_rgb8();
        assert!(grey.pixels().all(|p| p.0[0] == p.0[1] && p.0[1] == p.0[2]));
    }

    #[test]
    fn references_from_other_handler_are_rejected() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("in.png");
        create_test_png(&path, 4, 4, false);

        let mut a = handler();
        let mut b = handler();
        let r = a.load(&path, None).unwrap();
        assert!(matches!(
            b.close(&r),
            Err(ImageError::InvalidReference { .. })
        ));
        assert!(a.close(&r).is_ok());
    }

    #[test]
    fn flatten_blends_partial_alpha() {
        let mut img = image::RgbaImage::new(1, 1);
        img.put_pixel(0, 0, image::Rgba([0, 0, 0, 128]));
        let flat = flatten(&DynamicImage::ImageRgba8(img), Background::WHITE);
        // (0 * 128 + 255 * 127 + 127) / 255 = 127
        assert_eq!(flat.to_rgb8().get_pixel(0, 0).0, [127, 127, 127]);
    }
}
