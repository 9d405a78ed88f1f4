//! CLI output formatting.
//!
//! Every formatter returns display lines so tests can assert on them; the
//! `print_*` wrappers write them to stdout.
//!
//! ```text
//! photo.png
//!     Size: 800x600
//!     Type: image/png
//!
//! in.png → out.jpg (150x113 image/jpeg)
//! ```

use crate::batch::BatchSummary;
use crate::imaging::{ImageHandler, ImageInfo, TransformReport};

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

pub fn format_info(info: &ImageInfo) -> Vec<String> {
    vec![
        info.path.display().to_string(),
        format!("{}Size: {}x{}", indent(1), info.width, info.height),
        format!("{}Type: {}", indent(1), info.mime),
    ]
}

pub fn format_report(report: &TransformReport) -> String {
    format!(
        "{} → {} ({}x{} {})",
        report.input.display(),
        report.output.display(),
        report.width,
        report.height,
        report.mime
    )
}

/// Filters a handler offers, one per line.
pub fn format_filters(handler: &dyn ImageHandler) -> Vec<String> {
    let mut lines = vec![format!("Filters ({})", handler.name())];
    lines.extend(
        handler
            .filter_names()
            .iter()
            .map(|name| format!("{}{}", indent(1), name)),
    );
    lines
}

/// Readable and writable MIME types of a handler.
pub fn format_formats(handler: &dyn ImageHandler) -> Vec<String> {
    let capability = handler.capability();
    let mut lines = vec![format!("Formats ({})", handler.name()), "Input".to_string()];
    lines.extend(capability.input().iter().map(|m| format!("{}{}", indent(1), m)));
    lines.push("Output".to_string());
    lines.extend(capability.output().iter().map(|m| format!("{}{}", indent(1), m)));
    lines
}

pub fn format_batch_summary(summary: &BatchSummary) -> Vec<String> {
    let mut lines: Vec<String> = summary.reports.iter().map(format_report).collect();
    for (input, error) in &summary.failures {
        lines.push(format!("{} failed", input.display()));
        lines.push(format!("{}{}", indent(1), error));
    }
    lines.push(format!(
        "{} converted, {} failed",
        summary.reports.len(),
        summary.failures.len()
    ));
    lines
}

fn print_lines(lines: &[String]) {
    for line in lines {
        println!("{}", line);
    }
}

pub fn print_info(info: &ImageInfo) {
    print_lines(&format_info(info));
}

pub fn print_report(report: &TransformReport) {
    println!("{}", format_report(report));
}

pub fn print_filters(handler: &dyn ImageHandler) {
    print_lines(&format_filters(handler));
}

pub fn print_formats(handler: &dyn ImageHandler) {
    print_lines(&format_formats(handler));
}

pub fn print_batch_summary(summary: &BatchSummary) {
    print_lines(&format_batch_summary(summary));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::{HandlerSettings, ImageError, RasterHandler, RasterOptions};
    use std::path::PathBuf;

    fn raster() -> RasterHandler {
        RasterHandler::new(HandlerSettings::new("raster", RasterOptions::default()))
    }

    fn report(input: &str, output: &str) -> TransformReport {
        TransformReport {
            input: PathBuf::from(input),
            output: PathBuf::from(output),
            mime: "image/jpeg".to_string(),
            width: 150,
            height: 113,
        }
    }

    #[test]
    fn info_lines() {
        let info = ImageInfo {
            width: 800,
            height: 600,
            mime: "image/png".to_string(),
            path: PathBuf::from("photo.png"),
        };
        assert_eq!(
            format_info(&info),
            vec!["photo.png", "    Size: 800x600", "    Type: image/png"]
        );
    }

    #[test]
    fn report_line() {
        assert_eq!(
            format_report(&report("in.png", "out.jpg")),
            "in.png → out.jpg (150x113 image/jpeg)"
        );
    }

    #[test]
    fn filters_list_starts_with_handler_name() {
        let lines = format_filters(&raster());
        assert_eq!(lines[0], "Filters (raster)");
        assert!(lines.contains(&"    scaleExact".to_string()));
        assert!(lines.contains(&"    colorspace".to_string()));
        assert!(!lines.contains(&"    swirl".to_string()));
    }

    #[test]
    fn formats_list_has_both_directions() {
        let lines = format_formats(&raster());
        let output_at = lines.iter().position(|l| l == "Output").unwrap();
        assert!(lines[..output_at].contains(&"    image/png".to_string()));
        assert!(lines[output_at..].contains(&"    image/avif".to_string()));
    }

    #[test]
    fn batch_summary_counts() {
        let summary = BatchSummary {
            reports: vec![report("a.png", "a.jpg")],
            failures: vec![(
                PathBuf::from("b.png"),
                ImageError::InvalidFileName {
                    path: "b.png".to_string(),
                },
            )],
        };
        let lines = format_batch_summary(&summary);
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[1], "b.png failed");
        assert_eq!(lines.last().unwrap(), "1 converted, 1 failed");
    }
}
