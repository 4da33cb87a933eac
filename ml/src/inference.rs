use crate::model::GlyphNet;
use anyhow::{Context, Result, anyhow, ensure};
use burn::module::Module;
use burn::record::{DefaultFileRecorder, FullPrecisionSettings};
use burn::tensor::{Tensor, TensorData, activation::softmax, backend::Backend};
use image::{DynamicImage, GrayImage, imageops::FilterType};
use std::path::PathBuf;
use tracing::info;

/// CPU (NdArray) backend keeps inference free of any graphics API.
pub type InferenceBackend = burn::backend::ndarray::NdArray<f32>;

/// Square single-channel classifier input, row-major, values in `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct GlyphInput {
    size: u32,
    pixels: Vec<f32>,
}

impl GlyphInput {
    /// Wraps an already normalised buffer of `size * size` values.
    pub fn new(size: u32, pixels: Vec<f32>) -> Result<Self> {
        ensure!(size > 0, "input size must be positive");
        ensure!(
            pixels.len() == (size as usize) * (size as usize),
            "expected {} pixels for a {size}x{size} input, got {}",
            size * size,
            pixels.len()
        );
        Ok(Self { size, pixels })
    }

    /// Resizes `image` to `size x size` with bilinear interpolation and
    /// scales intensities to `[0, 1]`.
    ///
    /// # Arguments
    /// - `image`: glyph crop of any size; must not be empty.
    /// - `size`: side length the classifier expects.
    pub fn from_luma(image: &GrayImage, size: u32) -> Self {
        let resized = if image.dimensions() == (size, size) {
            image.clone()
        } else {
            image::imageops::resize(image, size, size, FilterType::Triangle)
        };
        let pixels = resized.pixels().map(|p| p[0] as f32 / 255.0).collect();
        Self { size, pixels }
    }

    /// Grayscale conversion followed by [`GlyphInput::from_luma`].
    pub fn from_dynamic(image: &DynamicImage, size: u32) -> Self {
        Self::from_luma(&image.to_luma8(), size)
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn pixels(&self) -> &[f32] {
        &self.pixels
    }
}

/// Probability per class as produced by a classifier.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassScores {
    probabilities: Vec<f32>,
}

impl ClassScores {
    pub fn new(probabilities: Vec<f32>) -> Self {
        Self { probabilities }
    }

    pub fn probabilities(&self) -> &[f32] {
        &self.probabilities
    }

    /// Index and value of the highest score; the first one wins ties.
    pub fn argmax(&self) -> Result<(usize, f32)> {
        ensure!(!self.probabilities.is_empty(), "classifier returned no scores");
        if let Some(idx) = self.probabilities.iter().position(|p| !p.is_finite()) {
            return Err(anyhow!("score for class {idx} is not finite"));
        }
        let mut best = (0, self.probabilities[0]);
        for (idx, &prob) in self.probabilities.iter().enumerate().skip(1) {
            if prob > best.1 {
                best = (idx, prob);
            }
        }
        Ok(best)
    }

    /// `(index, probability)` sorted by descending probability, stable on ties.
    pub fn ranked(&self) -> Vec<(usize, f32)> {
        let mut ranked: Vec<(usize, f32)> =
            self.probabilities.iter().copied().enumerate().collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked
    }
}

/// Anything that can score a normalised glyph crop.
///
/// Implementations must not mutate shared state; one instance is reused for
/// every request in the process.
pub trait GlyphClassifier {
    fn classify(&self, input: &GlyphInput) -> Result<ClassScores>;

    /// Side length of the square input the classifier was built for, when it
    /// declares one.
    fn input_size(&self) -> Option<u32> {
        None
    }

    /// Number of classes the classifier scores, when it declares one.
    fn num_classes(&self) -> Option<usize> {
        None
    }
}

impl<F> GlyphClassifier for F
where
    F: Fn(&GlyphInput) -> Result<ClassScores>,
{
    fn classify(&self, input: &GlyphInput) -> Result<ClassScores> {
        self(input)
    }
}

/// Where the trained weights live and what shape they expect.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    /// Weight file written by burn's default file recorder (extension optional).
    pub weight_path: PathBuf,
    /// Side length of the square grayscale input the network was trained on.
    pub input_size: u32,
    /// Number of output classes; must equal the label count.
    pub num_classes: usize,
}

/// Burn-backed [`GlyphClassifier`] running [`GlyphNet`] on the CPU.
pub struct CnnClassifier {
    device: <InferenceBackend as Backend>::Device,
    model: GlyphNet<InferenceBackend>,
    input_size: u32,
    num_classes: usize,
}

impl CnnClassifier {
    /// Builds the network for `config` and loads its weights.
    ///
    /// # Arguments
    /// - `config`: weight file, input side and class count.
    ///
    /// # Returns
    /// - A ready classifier, or an error when the weights are missing or
    ///   do not fit the network.
    pub fn load(config: &ModelConfig) -> Result<Self> {
        let device = <InferenceBackend as Backend>::Device::default();
        ensure!(config.num_classes > 0, "model needs at least one class");
        ensure!(
            config.input_size >= 10,
            "input size {} is too small for the network",
            config.input_size
        );

        let model = GlyphNet::<InferenceBackend>::new(
            &device,
            config.input_size as usize,
            config.num_classes,
        )
        .load_file(
            &config.weight_path,
            &DefaultFileRecorder::<FullPrecisionSettings>::new(),
            &device,
        )
        .with_context(|| {
            format!(
                "failed to load model weights {}",
                config.weight_path.display()
            )
        })?;

        info!(
            weights = %config.weight_path.display(),
            input_size = config.input_size,
            classes = config.num_classes,
            "glyph classifier loaded"
        );

        Ok(Self::from_model(
            model,
            device,
            config.input_size,
            config.num_classes,
        ))
    }

    /// Wraps an in-memory network, e.g. one that was just initialised.
    pub fn from_model(
        model: GlyphNet<InferenceBackend>,
        device: <InferenceBackend as Backend>::Device,
        input_size: u32,
        num_classes: usize,
    ) -> Self {
        Self {
            device,
            model,
            input_size,
            num_classes,
        }
    }

    fn to_tensor(&self, input: &GlyphInput) -> Tensor<InferenceBackend, 4> {
        let side = input.size() as usize;
        Tensor::<InferenceBackend, 4>::from_data(
            TensorData::new(input.pixels().to_vec(), [1, 1, side, side]),
            &self.device,
        )
    }
}

impl GlyphClassifier for CnnClassifier {
    fn classify(&self, input: &GlyphInput) -> Result<ClassScores> {
        ensure!(
            input.size() == self.input_size,
            "model expects {0}x{0} input, got {1}x{1}",
            self.input_size,
            input.size()
        );
        let logits = self.model.forward(self.to_tensor(input));
        let probabilities = softmax(logits, 1)
            .into_data()
            .into_vec::<f32>()
            .map_err(|err| anyhow!("failed to read class probabilities: {err:?}"))?;
        Ok(ClassScores::new(probabilities))
    }

    fn input_size(&self) -> Option<u32> {
        Some(self.input_size)
    }

    fn num_classes(&self) -> Option<usize> {
        Some(self.num_classes)
    }
}
