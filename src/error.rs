use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use crate::geom::Box3;

/// The pipeline stage an error was raised in.
///
/// Carried by [`GtbotError::SourceUnavailable`] so that the message shown to
/// a user names the step that failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Translation,
    CutoutRead,
    CutoutWrite,
    LabelQuery,
    PayloadStore,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Translation => "translation",
            Stage::CutoutRead => "cutout read",
            Stage::CutoutWrite => "cutout write",
            Stage::LabelQuery => "label query",
            Stage::PayloadStore => "payload store",
        };
        f.write_str(name)
    }
}

/// The main error type for gtbot operations.
#[derive(Debug, Error)]
pub enum GtbotError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid resolution: {message}")]
    InvalidResolution { message: String },

    #[error("Invalid dimensions: {message}")]
    InvalidDimensions { message: String },

    #[error("Empty box {bbox}: the query region has zero volume")]
    EmptyBox { bbox: Box3 },

    #[error(
        "Inconsistent slice shape in {path}: expected {expected_width}x{expected_height}, found {width}x{height}"
    )]
    InconsistentSliceShape {
        path: PathBuf,
        expected_width: u32,
        expected_height: u32,
        width: u32,
        height: u32,
    },

    #[error("No '.{extension}' slices found in {path}")]
    NoSlices { path: PathBuf, extension: String },

    #[error("Label {label} in {path} does not fit a 24-bit RGB slice")]
    LabelOutOfRange { path: PathBuf, label: u64 },

    #[error("The payload has no annotation layer")]
    NoAnnotationLayer,

    #[error("The payload has no visible segmentation layer")]
    NoSegmentationLayer,

    #[error("The payload has no image layer to cut from")]
    NoImageLayer,

    #[error("No cutout metadata found near {path}")]
    MetadataNotFound { path: PathBuf },

    #[error("{stage} failed for {identifier}: {message}")]
    SourceUnavailable {
        stage: Stage,
        identifier: String,
        message: String,
    },

    #[error("Resolution level {mip} is not available in {identifier}")]
    ScaleNotFound { identifier: String, mip: usize },

    #[error("Data type mismatch for {identifier}: expected {expected}, found {found}")]
    UnsupportedDataType {
        identifier: String,
        expected: String,
        found: String,
    },

    #[error("Failed to read image {path}: {source}")]
    ImageRead {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Failed to write image {path}: {source}")]
    ImageWrite {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Failed to parse viewer payload: {source}")]
    PayloadParse {
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid viewer link '{url}': {message}")]
    InvalidLink { url: String, message: String },

    #[error("Failed to parse metadata from {path}: {source}")]
    MetadataParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to write metadata to {path}: {source}")]
    MetadataWrite {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Incomplete metadata in {path}: {message}")]
    MetadataInvalid { path: PathBuf, message: String },

    #[error("Failed to parse config from {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Failed to write segment sizes to {path}: {source}")]
    SegmentCsvWrite {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("Sorry, I do not understand the message: {0}")]
    UnknownCommand(String),
}

impl GtbotError {
    /// Shorthand for a [`GtbotError::SourceUnavailable`] at `stage`.
    pub fn unavailable(
        stage: Stage,
        identifier: impl Into<String>,
        message: impl fmt::Display,
    ) -> Self {
        GtbotError::SourceUnavailable {
            stage,
            identifier: identifier.into(),
            message: message.to_string(),
        }
    }

    /// Returns true for failures of an external collaborator, the only kind
    /// that an idempotent read may retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, GtbotError::SourceUnavailable { .. })
    }

    /// Re-labels a collaborator failure with the stage it surfaced in.
    pub fn at_stage(self, stage: Stage) -> Self {
        match self {
            GtbotError::SourceUnavailable {
                identifier,
                message,
                ..
            } => GtbotError::SourceUnavailable {
                stage,
                identifier,
                message,
            },
            other => other,
        }
    }
}
