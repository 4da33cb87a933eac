//! Brahmi manuscript transcription: glyph segmentation followed by
//! per-glyph classification.
//!
//! [`Segmenter`] turns a page image into an ink mask and a left-to-right
//! [`GlyphSequence`]. [`Transcriber`] classifies each crop of the mask and
//! joins the labels, inserting a space wherever the horizontal gap between
//! neighbouring glyphs exceeds the configured word gap. [`TranscriptionEngine`]
//! owns the loaded classifier and label map and runs both stages per request.

mod config;
mod engine;
mod error;
mod result;
mod segment;
mod transcribe;

pub use config::{
    EngineConfig, LABELS_FILE, ModelConfig, SegmenterConfig, TranscriberConfig, WEIGHTS_FILE,
};
pub use engine::TranscriptionEngine;
pub use error::{ErrorKind, OcrError, OcrResult};
pub use ml::{ClassScores, CnnClassifier, GlyphClassifier, GlyphInput, LabelMap, Prediction};
pub use result::{
    BoundingBox, GlyphReading, GlyphSequence, Recognition, Segmentation, Token, Transcription,
};
pub use segment::Segmenter;
pub use transcribe::Transcriber;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_types_are_send() {
        fn assert_send<T: Send>() {}
        assert_send::<EngineConfig>();
        assert_send::<Recognition>();
        assert_send::<OcrError>();
    }
}
