//! Directory-wide transformations.
//!
//! Walks an input tree, runs one [`Transformation`] per image and mirrors the
//! relative layout under the output directory:
//!
//! ```text
//! photos/                       thumbs/
//! ├── a.png          →          ├── a.jpg
//! └── trip/                     └── trip/
//!     └── b.jpeg     →              └── b.jpg
//! ```
//!
//! ## Parallel Processing
//!
//! Files are spread over the global [rayon](https://docs.rs/rayon) pool. A
//! handler is not shared between threads: every file gets a fresh one from the
//! caller's factory, so references never cross handlers.

use crate::imaging::{
    ImageError, ImageHandler, ScopedImage, TransformReport, Transformation, extension_for_mime,
    mime_for_path,
};
use rayon::prelude::*;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Outcome of a batch run, in input order.
#[derive(Debug, Default)]
pub struct BatchSummary {
    pub reports: Vec<TransformReport>,
    pub failures: Vec<(PathBuf, ImageError)>,
}

impl BatchSummary {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// All files under `root` with an image extension, sorted. Hidden entries are
/// skipped.
pub fn collect_inputs(root: &Path) -> Vec<PathBuf> {
    let mut inputs: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'))
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| mime_for_path(p).is_some())
        .collect();
    inputs.sort();
    inputs
}

/// Where `input` lands under `output_root` when written as `mime`.
pub fn output_path(input_root: &Path, output_root: &Path, input: &Path, mime: &str) -> PathBuf {
    let relative = input.strip_prefix(input_root).unwrap_or(input);
    let target = output_root.join(relative);
    match extension_for_mime(mime) {
        Some(ext) => target.with_extension(ext),
        None => target,
    }
}

/// Transform every file in `inputs`.
///
/// `make_handler` is called once per file and step. Output paths are planned
/// from each file's decoded format before anything is written. When several
/// inputs land on the same output, the first in input order wins and the rest
/// are recorded as failures. No failure aborts the run.
pub fn run<F>(
    transformation: &Transformation,
    input_root: &Path,
    output_root: &Path,
    inputs: &[PathBuf],
    make_handler: F,
) -> BatchSummary
where
    F: Fn() -> Box<dyn ImageHandler> + Sync,
{
    let planned: Vec<Result<PathBuf, ImageError>> = inputs
        .par_iter()
        .map(|input| {
            let mut handler = make_handler();
            plan_output(transformation, handler.as_mut(), input_root, output_root, input)
        })
        .collect();

    let mut outcomes: Vec<Option<Result<TransformReport, ImageError>>> =
        inputs.iter().map(|_| None).collect();
    let mut claimed: HashMap<PathBuf, &Path> = HashMap::new();
    let mut jobs = Vec::new();
    for (index, (input, output)) in inputs.iter().zip(planned).enumerate() {
        match output {
            Ok(output) => match claimed.entry(output) {
                Entry::Occupied(first) => {
                    outcomes[index] = Some(Err(ImageError::SaveFailed {
                        path: first.key().clone(),
                        message: format!("already written from {}", first.get().display()),
                    }));
                }
                Entry::Vacant(slot) => {
                    jobs.push((index, input, slot.key().clone()));
                    slot.insert(input.as_path());
                }
            },
            Err(e) => outcomes[index] = Some(Err(e)),
        }
    }

    let written: Vec<(usize, Result<TransformReport, ImageError>)> = jobs
        .par_iter()
        .map(|(index, input, output)| {
            let mut handler = make_handler();
            (*index, write_one(transformation, handler.as_mut(), input, output))
        })
        .collect();
    for (index, result) in written {
        outcomes[index] = Some(result);
    }

    let mut summary = BatchSummary::default();
    for (input, outcome) in inputs.iter().zip(outcomes) {
        match outcome {
            Some(Ok(report)) => summary.reports.push(report),
            Some(Err(e)) => {
                tracing::warn!(input = %input.display(), error = %e, "batch item failed");
                summary.failures.push((input.clone(), e));
            }
            None => {}
        }
    }
    summary
}

/// Decode `input` to learn its real format, then place it under `output_root`
/// with the extension of the MIME the transformation will write.
fn plan_output(
    transformation: &Transformation,
    handler: &mut dyn ImageHandler,
    input_root: &Path,
    output_root: &Path,
    input: &Path,
) -> Result<PathBuf, ImageError> {
    let image = ScopedImage::open(handler, input, None)?;
    let input_mime = image.info()?.mime;
    let mime = transformation.output_mime(&input_mime, image.handler())?;
    image.close()?;
    Ok(output_path(input_root, output_root, input, &mime))
}

fn write_one(
    transformation: &Transformation,
    handler: &mut dyn ImageHandler,
    input: &Path,
    output: &Path,
) -> Result<TransformReport, ImageError> {
    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ImageError::io(parent, e))?;
    }
    transformation.transform(handler, input, output, None)
}
