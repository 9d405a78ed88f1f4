//! Handler that drives the ImageMagick command-line tools.
//!
//! `load()` runs `identify` to learn the dimensions and format; filters and
//! conversions are recorded as `convert` arguments and replayed against the
//! source file on every `save()`. The geometry math is the shared planner's,
//! and each resize is issued with `!` so ImageMagick never re-fits the
//! dimensions on its own.
//!
//! Paths reach the tools as separate arguments (no shell), and are still
//! checked with [`check_file_name`] first.
//!
//! ## Save options
//!
//! `quality` is passed as `-quality` for JPEG, WebP and AVIF; `compression`
//! becomes `png:compression-level` for PNG. Other combinations are ignored.

use super::capability::{MimeCapability, check_file_name, needs_transparency_conversion};
use super::dispatch::{self, Step};
use super::error::{ImageError, MimeDirection, Result};
use super::filter::{COLORSPACE, ColorSpace, Filter, SWIRL};
use super::geometry::{CROP, SCALE, SCALE_EXACT, SCALE_HEIGHT, SCALE_PERCENT, SCALE_WIDTH};
use super::handler::{HandlerSettings, ImageHandler};
use super::params::{Background, Compression, SaveOptions};
use super::reference::{HandlerId, ImageInfo, ImageReference, ReferenceTable};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;

/// ImageMagick format codes (`identify %m`) and their MIME types.
const FORMATS: &[(&str, &str)] = &[
    ("PNG", "image/png"),
    ("JPEG", "image/jpeg"),
    ("GIF", "image/gif"),
    ("TIFF", "image/tiff"),
    ("WEBP", "image/webp"),
    ("BMP", "image/bmp"),
    ("AVIF", "image/avif"),
];

const MIMES: &[&str] = &[
    "image/png",
    "image/jpeg",
    "image/gif",
    "image/tiff",
    "image/webp",
    "image/bmp",
    "image/avif",
];

const CAPABILITY: MimeCapability = MimeCapability::new(MIMES, MIMES);

const FILTERS: &[&str] = &[
    SCALE,
    SCALE_WIDTH,
    SCALE_HEIGHT,
    SCALE_PERCENT,
    SCALE_EXACT,
    CROP,
    COLORSPACE,
    SWIRL,
];

/// Engine options for [`MagickHandler`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MagickOptions {
    /// `convert` binary.
    pub convert: PathBuf,
    /// `identify` binary.
    pub identify: PathBuf,
    /// Colour transparent pixels are flattened onto.
    pub background: Background,
}

impl Default for MagickOptions {
    fn default() -> Self {
        Self {
            convert: PathBuf::from("convert"),
            identify: PathBuf::from("identify"),
            background: Background::default(),
        }
    }
}

#[derive(Debug, Clone)]
struct MagickImage {
    source: PathBuf,
    width: u32,
    height: u32,
    mime: String,
    args: Vec<String>,
}

pub struct MagickHandler {
    settings: HandlerSettings<MagickOptions>,
    table: ReferenceTable<MagickImage>,
}

impl MagickHandler {
    pub fn new(settings: HandlerSettings<MagickOptions>) -> Self {
        Self {
            settings,
            table: ReferenceTable::new(HandlerId::next()),
        }
    }

    pub fn options(&self) -> &MagickOptions {
        &self.settings.options
    }

    fn unsupported(&self, mime: &str, direction: MimeDirection) -> ImageError {
        ImageError::MimeUnsupported {
            mime: mime.to_string(),
            direction,
            handler: self.settings.reference_name.clone(),
        }
    }

    /// Run `identify` on the first frame of `path`.
    fn identify(&self, path: &Path) -> Result<(u32, u32, String)> {
        let binary = &self.settings.options.identify;
        let output = Command::new(binary)
            .args(["-format", "%w %h %m"])
            .arg(first_frame(path))
            .output()
            .map_err(|e| ImageError::io(binary, e))?;
        if !output.status.success() {
            return Err(undecodable(
                path,
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        parse_identify(path, &String::from_utf8_lossy(&output.stdout))
    }

    fn register(&mut self, source: PathBuf, width: u32, height: u32, mime: String) -> ImageReference {
        self.table.insert(MagickImage {
            source,
            width,
            height,
            mime,
            args: Vec::new(),
        })
    }
}

impl ImageHandler for MagickHandler {
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
        std::fs::metadata(path).map_err(|e| ImageError::io(path, e))?;

        let (width, height, detected) = self.identify(path)?;
        let mime = mime.map(str::to_ascii_lowercase).unwrap_or(detected);
        if !self.allows_input(&mime) {
            return Err(self.unsupported(&mime, MimeDirection::Input));
        }
        tracing::debug!(
            handler = %self.settings.reference_name,
            path = %path.display(),
            %mime,
            width,
            height,
            "identified image"
        );
        Ok(self.register(path.to_path_buf(), width, height, mime))
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
        let target = new_path.unwrap_or(&image.source);
        let args = command_args(
            image,
            target,
            &target_mime,
            options.copied().unwrap_or_default(),
            self.settings.options.background,
        );

        let binary = &self.settings.options.convert;
        tracing::debug!(%reference, binary = %binary.display(), ?args, "running convert");
        let output = Command::new(binary)
            .args(&args)
            .output()
            .map_err(|e| ImageError::io(binary, e))?;
        if !output.status.success() {
            return Err(ImageError::SaveFailed {
                path: target.to_path_buf(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
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
            width: image.width,
            height: image.height,
            mime: image.mime.clone(),
            path: image.source.clone(),
        })
    }

    fn apply_filter(&mut self, reference: &ImageReference, filter: &Filter) -> Result<()> {
        let image = self.table.get_mut("apply_filter", reference)?;
        let current = (image.width, image.height);
        let step = dispatch::prepare(&self.settings.reference_name, FILTERS, current, filter)
            .map_err(|e| e.on_reference(reference))?;

        image.args.extend(step_args(step));
        (image.width, image.height) = step.resulting_dimensions(current);
        tracing::debug!(%reference, %filter, width = image.width, height = image.height, "recorded filter");
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
            image.args.extend(flatten_args(background));
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

/// `path[0]`: ImageMagick syntax for the first frame.
fn first_frame(path: &Path) -> OsString {
    let mut arg = path.as_os_str().to_owned();
    arg.push("[0]");
    arg
}

fn parse_identify(path: &Path, stdout: &str) -> Result<(u32, u32, String)> {
    let mut fields = stdout.split_whitespace();
    let (Some(w), Some(h), Some(code)) = (fields.next(), fields.next(), fields.next()) else {
        return Err(undecodable(path, format!("unexpected identify output {stdout:?}")));
    };
    let (Ok(width), Ok(height)) = (w.parse::<u32>(), h.parse::<u32>()) else {
        return Err(undecodable(path, format!("unexpected identify output {stdout:?}")));
    };
    let mime = FORMATS
        .iter()
        .find(|(c, _)| c.eq_ignore_ascii_case(code))
        .map(|(_, m)| m.to_string())
        .ok_or_else(|| undecodable(path, format!("unsupported ImageMagick format {code}")))?;
    Ok((width, height, mime))
}

fn format_code(mime: &str) -> Option<&'static str> {
    FORMATS
        .iter()
        .find(|(_, m)| m.eq_ignore_ascii_case(mime))
        .map(|(c, _)| *c)
}

fn step_args(step: Step) -> Vec<String> {
    match step {
        Step::Unchanged => Vec::new(),
        Step::Resize { width, height } => vec!["-resize".into(), format!("{width}x{height}!")],
        Step::Crop(rect) => vec![
            "-crop".into(),
            format!("{}x{}+{}+{}", rect.width, rect.height, rect.x, rect.y),
            "+repage".into(),
        ],
        Step::Colorspace(ColorSpace::Grey) => vec!["-colorspace".into(), "Gray".into()],
        Step::Colorspace(ColorSpace::Monochrome) => vec!["-monochrome".into()],
        Step::Colorspace(ColorSpace::Sepia) => vec!["-sepia-tone".into(), "80%".into()],
        Step::Swirl { degrees } => vec!["-swirl".into(), degrees.to_string()],
    }
}

fn flatten_args(background: Background) -> Vec<String> {
    vec!["-background".into(), background.to_string(), "-flatten".into()]
}

/// Full `convert` argument list for writing `image` to `target` as `mime`.
fn command_args(
    image: &MagickImage,
    target: &Path,
    mime: &str,
    options: SaveOptions,
    background: Background,
) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![first_frame(&image.source)];
    args.extend(image.args.iter().map(OsString::from));
    if needs_transparency_conversion(&image.mime, Some(mime)) {
        args.extend(flatten_args(background).into_iter().map(OsString::from));
    }

    let lossy = matches!(mime, "image/jpeg" | "image/webp" | "image/avif");
    match options.quality {
        Some(q) if lossy => {
            args.push("-quality".into());
            args.push(q.value().to_string().into());
        }
        Some(_) => tracing::debug!(mime, "quality option ignored"),
        None => {}
    }
    match options.compression {
        Some(c) if mime == "image/png" => {
            let level = match c {
                Compression::Fast => 1,
                Compression::Default => 6,
                Compression::Best => 9,
            };
            args.push("-define".into());
            args.push(format!("png:compression-level={level}").into());
        }
        Some(_) => tracing::debug!(mime, "compression option ignored"),
        None => {}
    }

    // explicit FORMAT: prefix so the extension never overrides the MIME
    let mut out = OsString::new();
    if let Some(code) = format_code(mime) {
        out.push(code);
        out.push(":");
    }
    out.push(target.as_os_str());
    args.push(out);
    args
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::geometry::{Direction, GeometryOperation};
    use crate::imaging::params::Quality;
    use crate::test_helpers::create_test_png;

    fn handler() -> MagickHandler {
        MagickHandler::new(HandlerSettings::new("magick", MagickOptions::default()))
    }

    fn magick_available() -> bool {
        Command::new("convert")
            .arg("-version")
            .output()
            .is_ok_and(|o| o.status.success())
    }

    fn strings(args: &[OsString]) -> Vec<String> {
        args.iter().map(|a| a.to_string_lossy().into_owned()).collect()
    }

    #[test]
    fn parses_identify_output() {
        let (w, h, mime) = parse_identify(Path::new("a.png"), "800 600 PNG").unwrap();
        assert_eq!((w, h, mime.as_str()), (800, 600, "image/png"));
    }

    #[test]
    fn identify_output_with_unknown_format_is_invalid_reference() {
        let err = parse_identify(Path::new("a.xcf"), "10 10 XCF").unwrap_err();
        assert!(matches!(err, ImageError::InvalidReference { operation: "load", .. }));
        assert!(parse_identify(Path::new("a.png"), "garbage").is_err());
    }

    #[test]
    fn geometry_is_recorded_as_exact_resizes_and_crops() {
        let mut h = handler();
        let r = h.register("/in.png".into(), 800, 600, "image/png".into());

        h.apply_filter(
            &r,
            &Filter::Geometry(GeometryOperation::Scale {
                width: 400,
                height: 400,
                direction: Direction::Both,
            }),
        )
        .unwrap();
        h.apply_filter(
            &r,
            &Filter::Geometry(GeometryOperation::ScalePercent {
                width: 50,
                height: 200,
            }),
        )
        .unwrap();
        h.apply_filter(
            &r,
            &Filter::Geometry(GeometryOperation::Crop {
                x: 10,
                y: 10,
                width: 100,
                height: 50,
            }),
        )
        .unwrap();

        assert_eq!(h.info(&r).unwrap().dimensions(), (100, 50));
        let image = h.table.get("test", &r).unwrap();
        assert_eq!(
            image.args,
            [
                "-resize", "400x300!", "-resize", "200x600!", "-crop", "100x50+10+10", "+repage"
            ]
        );
    }

    #[test]
    fn noop_scale_records_nothing() {
        let mut h = handler();
        let r = h.register("/in.png".into(), 100, 100, "image/png".into());
        h.apply_filter(
            &r,
            &Filter::Geometry(GeometryOperation::Scale {
                width: 400,
                height: 400,
                direction: Direction::Down,
            }),
        )
        .unwrap();
        assert!(h.table.get("test", &r).unwrap().args.is_empty());
    }

    #[test]
    fn invalid_filter_records_nothing() {
        let mut h = handler();
        let r = h.register("/in.png".into(), 100, 100, "image/png".into());
        let err = h
            .apply_filter(
                &r,
                &Filter::Geometry(GeometryOperation::Crop {
                    x: 0,
                    y: 0,
                    width: 101,
                    height: 10,
                }),
            )
            .unwrap_err();
        assert!(matches!(err, ImageError::OutOfRange { .. }));
        assert!(h.table.get("test", &r).unwrap().args.is_empty());
        assert_eq!(h.info(&r).unwrap().dimensions(), (100, 100));
    }

    #[test]
    fn swirl_and_colorspace_are_available() {
        let mut h = handler();
        assert!(h.has_filter("swirl"));
        let r = h.register("/in.png".into(), 10, 10, "image/png".into());
        h.apply_filter(&r, &Filter::Swirl { degrees: 90 }).unwrap();
        h.apply_filter(&r, &Filter::Colorspace(ColorSpace::Grey))
            .unwrap();
        assert_eq!(
            h.table.get("test", &r).unwrap().args,
            ["-swirl", "90", "-colorspace", "Gray"]
        );
    }

    #[test]
    fn convert_to_opaque_format_flattens() {
        let mut h = handler();
        let r = h.register("/in.png".into(), 10, 10, "image/png".into());
        h.convert(&r, "image/jpeg").unwrap();
        assert_eq!(
            h.table.get("test", &r).unwrap().args,
            ["-background", "#ffffff", "-flatten"]
        );
        assert_eq!(h.info(&r).unwrap().mime, "image/jpeg");
    }

    #[test]
    fn save_args_carry_quality_and_format_prefix() {
        let image = MagickImage {
            source: "/in.png".into(),
            width: 10,
            height: 10,
            mime: "image/png".into(),
            args: vec!["-resize".into(), "5x5!".into()],
        };
        let options = SaveOptions {
            quality: Some(Quality::new(70)),
            compression: Some(Compression::Best),
        };
        let args = command_args(
            &image,
            Path::new("/out.jpg"),
            "image/jpeg",
            options,
            Background::WHITE,
        );
        assert_eq!(
            strings(&args),
            [
                "/in.png[0]",
                "-resize",
                "5x5!",
                "-background",
                "#ffffff",
                "-flatten",
                "-quality",
                "70",
                "JPEG:/out.jpg"
            ]
        );
    }

    #[test]
    fn png_save_args_use_compression_level() {
        let image = MagickImage {
            source: "/in.jpg".into(),
            width: 10,
            height: 10,
            mime: "image/jpeg".into(),
            args: Vec::new(),
        };
        let options = SaveOptions {
            quality: Some(Quality::new(70)),
            compression: Some(Compression::Fast),
        };
        let args = command_args(&image, Path::new("/out.png"), "image/png", options, Background::WHITE);
        assert_eq!(
            strings(&args),
            [
                "/in.jpg[0]",
                "-define",
                "png:compression-level=1",
                "PNG:/out.png"
            ]
        );
    }

    #[test]
    fn load_rejects_illegal_name_without_running_tools() {
        let options = MagickOptions {
            identify: "/nonexistent/identify".into(),
            ..MagickOptions::default()
        };
        let mut h = MagickHandler::new(HandlerSettings::new("magick", options));
        assert!(matches!(
            h.load(Path::new("\"quoted\".jpg"), None),
            Err(ImageError::InvalidFileName { .. })
        ));
    }

    #[test]
    fn missing_tool_is_io_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("in.png");
        create_test_png(&path, 4, 4, false);

        let options = MagickOptions {
            identify: "/nonexistent/identify".into(),
            ..MagickOptions::default()
        };
        let mut h = MagickHandler::new(HandlerSettings::new("magick", options));
        assert!(matches!(h.load(&path, None), Err(ImageError::Io { .. })));
    }

    #[test]
    fn round_trip_through_imagemagick() {
        if !magick_available() {
            eprintln!("skipping: ImageMagick not installed");
            return;
        }
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("in.png");
        create_test_png(&path, 80, 60, true);

        let mut h = handler();
        let r = h.load(&path, None).unwrap();
        assert_eq!(h.info(&r).unwrap().dimensions(), (80, 60));
        h.apply_filter(
            &r,
            &Filter::Geometry(GeometryOperation::Scale {
                width: 40,
                height: 40,
                direction: Direction::Both,
            }),
        )
        .unwrap();
        h.convert(&r, "image/jpeg").unwrap();

        let out = tmp.path().join("out.jpg");
        h.save(&r, Some(&out), None, None).unwrap();
        assert_eq!(image::image_dimensions(&out).unwrap(), (40, 30));
        h.close(&r).unwrap();
    }
}
