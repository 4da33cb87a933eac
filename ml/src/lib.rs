#![recursion_limit = "256"]

pub mod inference;
pub mod labels;
pub mod model;

pub use inference::{
    ClassScores, CnnClassifier, GlyphClassifier, GlyphInput, InferenceBackend, ModelConfig,
};
pub use labels::{LabelMap, Prediction};
pub use model::GlyphNet;
