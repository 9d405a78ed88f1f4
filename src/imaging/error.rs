//! Error taxonomy shared by every handler.
//!
//! Every variant carries enough context (operation, reference, filter,
//! parameter) to reconstruct the failing call from the message alone.

use super::reference::ImageReference;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ImageError {
    #[error("{operation}: invalid image reference {reference}: {reason}")]
    InvalidReference {
        operation: &'static str,
        reference: String,
        reason: String,
    },
    #[error("invalid file name {path:?}: must not contain ', \" or $")]
    InvalidFileName { path: String },
    #[error("filter '{filter}' is not available in handler '{handler}'{}", on(.reference))]
    FilterNotAvailable {
        filter: String,
        handler: String,
        reference: Option<String>,
    },
    #[error("filter '{filter}' is missing required parameter '{parameter}'")]
    MissingParameter { filter: String, parameter: String },
    #[error(
        "filter '{filter}'{}: parameter '{parameter}' = {value} is out of range: {reason}",
        on(.reference)
    )]
    OutOfRange {
        filter: String,
        parameter: String,
        value: String,
        reason: String,
        reference: Option<String>,
    },
    #[error("filter '{filter}' failed on {reference}: {message}")]
    FilterFailed {
        filter: String,
        reference: String,
        message: String,
    },
    #[error("MIME type '{mime}' is not supported as {direction} by handler '{handler}'")]
    MimeUnsupported {
        mime: String,
        direction: MimeDirection,
        handler: String,
    },
    #[error("property '{0}' does not exist")]
    PropertyNotFound(String),
    #[error("property '{0}' is read-only")]
    PropertyReadOnly(String),
    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("saving {} failed: {message}", path.display())]
    SaveFailed { path: PathBuf, message: String },
}

/// Which side of a handler's capability set a MIME check was made against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MimeDirection {
    Input,
    Output,
}

impl std::fmt::Display for MimeDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Input => f.write_str("input"),
            Self::Output => f.write_str("output"),
        }
    }
}

fn on(reference: &Option<String>) -> String {
    reference
        .as_ref()
        .map(|r| format!(" on {r}"))
        .unwrap_or_default()
}

impl ImageError {
    pub(crate) fn not_available(filter: &str, handler: &str) -> Self {
        Self::FilterNotAvailable {
            filter: filter.to_string(),
            handler: handler.to_string(),
            reference: None,
        }
    }

    pub(crate) fn out_of_range(
        filter: &str,
        parameter: &str,
        value: impl ToString,
        reason: impl Into<String>,
    ) -> Self {
        Self::OutOfRange {
            filter: filter.to_string(),
            parameter: parameter.to_string(),
            value: value.to_string(),
            reason: reason.into(),
            reference: None,
        }
    }

    /// Attach the image a filter was applied to. Other variants already name
    /// their reference, or have none.
    pub(crate) fn on_reference(mut self, image: &ImageReference) -> Self {
        if let Self::FilterNotAvailable { reference, .. } | Self::OutOfRange { reference, .. } =
            &mut self
        {
            *reference = Some(image.to_string());
        }
        self
    }

    pub(crate) fn missing(filter: &str, parameter: &str) -> Self {
        Self::MissingParameter {
            filter: filter.to_string(),
            parameter: parameter.to_string(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type for handler operations.
pub type Result<T> = std::result::Result<T, ImageError>;
