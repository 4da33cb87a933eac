use burn::{
    module::Module,
    nn::{
        Dropout, DropoutConfig, Linear, LinearConfig,
        conv::{Conv2d, Conv2dConfig},
        pool::{MaxPool2d, MaxPool2dConfig},
    },
    tensor::{Tensor, activation::relu, backend::Backend},
};

const CONV1_FILTERS: usize = 16;
const CONV2_FILTERS: usize = 32;
const HIDDEN_UNITS: usize = 64;
const DROPOUT: f64 = 0.5;

/// Small VGG-style CNN for single-channel glyph crops.
///
/// Two unpadded 3x3 convolution blocks with 2x2 max pooling, a 64-unit dense
/// bottleneck with dropout, and one logit per class.
#[derive(Module, Debug)]
pub struct GlyphNet<B: Backend> {
    conv1: Conv2d<B>,
    conv2: Conv2d<B>,
    pool1: MaxPool2d,
    pool2: MaxPool2d,
    fc1: Linear<B>,
    dropout: Dropout,
    fc_out: Linear<B>,
}

/// Length of the flattened feature vector for a square input of `input_size`.
///
/// 64x64 input: 62 -> 31 -> 29 -> 14, giving 32 * 14 * 14 = 6272.
pub fn flattened_features(input_size: usize) -> usize {
    let after_block = |size: usize| size.saturating_sub(2) / 2;
    let side = after_block(after_block(input_size));
    CONV2_FILTERS * side * side
}

impl<B: Backend> GlyphNet<B> {
    /// Creates a freshly initialised network.
    ///
    /// # Arguments
    /// - `device`: where parameters live (the CPU for the NdArray backend).
    /// - `input_size`: side length of the square grayscale input.
    /// - `num_classes`: number of output logits, equal to the label count.
    ///
    /// # Panics
    /// - When `input_size < 10` or `num_classes == 0`.
    pub fn new(device: &B::Device, input_size: usize, num_classes: usize) -> Self {
        assert!(
            input_size >= 10,
            "input must be at least 10x10 to survive two conv/pool blocks, got {input_size}"
        );
        assert!(num_classes > 0, "network needs at least one class");

        let conv1 = Conv2dConfig::new([1, CONV1_FILTERS], [3, 3]).init(device);
        let conv2 = Conv2dConfig::new([CONV1_FILTERS, CONV2_FILTERS], [3, 3]).init(device);

        let pool1 = MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init();
        let pool2 = MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init();

        let fc1 = LinearConfig::new(flattened_features(input_size), HIDDEN_UNITS).init(device);
        let dropout = DropoutConfig::new(DROPOUT).init();
        let fc_out = LinearConfig::new(HIDDEN_UNITS, num_classes).init(device);

        Self {
            conv1,
            conv2,
            pool1,
            pool2,
            fc1,
            dropout,
            fc_out,
        }
    }

    /// Forward pass over a batch of glyph crops.
    ///
    /// # Arguments
    /// - `input`: `[batch, 1, size, size]` tensor with values in `[0, 1]`.
    ///
    /// # Returns
    /// - `[batch, num_classes]` logits (no softmax applied).
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = relu(self.conv1.forward(input));
        let x = self.pool1.forward(x);

        let x = relu(self.conv2.forward(x));
        let x = self.pool2.forward(x);

        let x: Tensor<B, 2> = x.flatten(1, 3);
        let x = relu(self.fc1.forward(x));
        let x = self.dropout.forward(x);
        self.fc_out.forward(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::ndarray::NdArray;
    use burn::tensor::TensorData;

    type TestBackend = NdArray<f32>;

    #[test]
    fn flattened_size_matches_reference_architecture() {
        assert_eq!(flattened_features(64), 6272);
        assert_eq!(flattened_features(32), 32 * 6 * 6);
    }

    #[test]
    fn forward_yields_one_logit_per_class() {
        let device = Default::default();
        let model = GlyphNet::<TestBackend>::new(&device, 64, 11);
        let input = Tensor::<TestBackend, 4>::from_data(
            TensorData::new(vec![0.0f32; 64 * 64], [1, 1, 64, 64]),
            &device,
        );
        assert_eq!(model.forward(input).dims(), [1, 11]);
    }
}
