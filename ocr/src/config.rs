use crate::error::{OcrError, OcrResult};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::{Path, PathBuf};

/// File name of the weights inside a model directory (burn appends `.mpk`).
pub const WEIGHTS_FILE: &str = "glyph_net";
/// File name of the label map inside a model directory.
pub const LABELS_FILE: &str = "index_to_label.json";

/// Paths and declared input shape of the trained classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    weights: PathBuf,
    labels: PathBuf,
    #[serde(default = "default_input_size")]
    input_size: u32,
}

fn default_input_size() -> u32 {
    64
}

impl ModelConfig {
    /// Create a new model configuration.
    pub fn new(weights: impl AsRef<Path>, labels: impl AsRef<Path>) -> Self {
        Self {
            weights: weights.as_ref().to_path_buf(),
            labels: labels.as_ref().to_path_buf(),
            input_size: default_input_size(),
        }
    }

    /// Standard layout: `<dir>/glyph_net.mpk` and `<dir>/index_to_label.json`.
    pub fn from_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self::new(dir.join(WEIGHTS_FILE), dir.join(LABELS_FILE))
    }

    /// Override the input side length the network was trained with.
    pub fn with_input_size(mut self, input_size: u32) -> Self {
        self.input_size = input_size;
        self
    }

    /// Weight file written by burn's file recorder.
    pub fn weights(&self) -> &Path {
        &self.weights
    }

    /// JSON label map (`index_to_label.json`).
    pub fn labels(&self) -> &Path {
        &self.labels
    }

    /// Side length of the square input the network expects.
    pub fn input_size(&self) -> u32 {
        self.input_size
    }
}

/// Tunable parameters of the segmentation stage.
///
/// The defaults were tuned empirically on the glyph scale used by the
/// training crops; there is no derivation behind them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmenterConfig {
    /// Side of the adaptive threshold neighbourhood (odd).
    pub block_size: u32,
    /// Constant subtracted from the local mean.
    pub offset: i32,
    /// Side of the square opening element.
    pub open_kernel: u32,
    /// Boxes must be strictly wider than this.
    pub min_width: u32,
    /// Boxes must be strictly taller than this.
    pub min_height: u32,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            block_size: 15,
            offset: 8,
            open_kernel: 2,
            min_width: 8,
            min_height: 15,
        }
    }
}

/// Tunable parameters of the transcription stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriberConfig {
    /// A horizontal gap strictly larger than this many pixels starts a new word.
    pub word_gap: u32,
    /// Side length crops are resized to before classification.
    pub crop_size: u32,
    /// Ranked alternatives kept per glyph.
    pub top_k: usize,
}

impl Default for TranscriberConfig {
    fn default() -> Self {
        Self {
            word_gap: 25,
            crop_size: 64,
            top_k: 4,
        }
    }
}

/// Everything the engine needs, loadable from a JSON file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub model: ModelConfig,
    #[serde(default)]
    pub segmenter: SegmenterConfig,
    #[serde(default)]
    pub transcriber: TranscriberConfig,
    /// Decoded images whose longer side exceeds this are rejected.
    #[serde(default = "default_max_image_side")]
    pub max_image_side: u32,
}

fn default_max_image_side() -> u32 {
    8192
}

impl EngineConfig {
    /// Default tuning for the given model.
    pub fn new(model: ModelConfig) -> Self {
        Self {
            model,
            segmenter: SegmenterConfig::default(),
            transcriber: TranscriberConfig::default(),
            max_image_side: default_max_image_side(),
        }
    }

    /// Reads a JSON configuration file. Omitted sections keep their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> OcrResult<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|err| {
            OcrError::InvalidConfig(format!("cannot open {}: {err}", path.display()))
        })?;
        let config: Self = serde_json::from_reader(file).map_err(|err| {
            OcrError::InvalidConfig(format!("cannot parse {}: {err}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values the pipeline cannot work with.
    pub fn validate(&self) -> OcrResult<()> {
        let seg = &self.segmenter;
        if seg.block_size < 3 || seg.block_size % 2 == 0 {
            return Err(OcrError::InvalidConfig(format!(
                "block_size must be odd and at least 3, got {}",
                seg.block_size
            )));
        }
        if seg.open_kernel == 0 || seg.open_kernel > image_proc::MAX_KERNEL_SIDE {
            return Err(OcrError::InvalidConfig(format!(
                "open_kernel must be between 1 and {}, got {}",
                image_proc::MAX_KERNEL_SIDE,
                seg.open_kernel
            )));
        }
        if self.transcriber.crop_size == 0 {
            return Err(OcrError::InvalidConfig(
                "crop_size must be positive".into(),
            ));
        }
        if self.transcriber.crop_size != self.model.input_size() {
            return Err(OcrError::InputShapeMismatch {
                crop_size: self.transcriber.crop_size,
                model_input: self.model.input_size(),
            });
        }
        if self.max_image_side == 0 {
            return Err(OcrError::InvalidConfig(
                "max_image_side must be positive".into(),
            ));
        }
        Ok(())
    }
}
