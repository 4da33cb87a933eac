use std::path::PathBuf;
use thiserror::Error;

/// Crate-wide result type.
pub type OcrResult<T> = Result<T, OcrError>;

/// Coarse outcome classes surfaced to the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Model, labels, or configuration unusable; no request can be served.
    Initialization,
    /// The input image could not be turned into a bitmap.
    Decode,
    /// A glyph could not be classified; the whole request is void.
    Classification,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Initialization => "initialization",
            Self::Decode => "decode",
            Self::Classification => "classification",
        }
    }
}

#[derive(Debug, Error)]
pub enum OcrError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to load label map {}: {reason}", .path.display())]
    LabelMap { path: PathBuf, reason: String },

    #[error("failed to load classifier {}: {reason}", .path.display())]
    ModelLoad { path: PathBuf, reason: String },

    #[error("crop size {crop_size} does not match classifier input {model_input}")]
    InputShapeMismatch { crop_size: u32, model_input: u32 },

    #[error("label map has {labels} entries but the classifier has {classes} outputs")]
    ClassCountMismatch { labels: usize, classes: usize },

    #[error("failed to decode image {}: {source}", .path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("image is {width}x{height}, larger than the {limit}px limit")]
    ImageTooLarge { width: u32, height: u32, limit: u32 },

    #[error("classification failed for glyph {glyph}: {reason}")]
    Classification { glyph: usize, reason: String },
}

impl OcrError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidConfig(_)
            | Self::LabelMap { .. }
            | Self::ModelLoad { .. }
            | Self::InputShapeMismatch { .. }
            | Self::ClassCountMismatch { .. } => ErrorKind::Initialization,
            Self::Decode { .. } | Self::ImageTooLarge { .. } => ErrorKind::Decode,
            Self::Classification { .. } => ErrorKind::Classification,
        }
    }
}
