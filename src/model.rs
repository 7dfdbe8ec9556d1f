use burn::{
    nn::{
        BatchNorm, BatchNormConfig, Dropout, DropoutConfig, Linear, LinearConfig, PaddingConfig2d,
        Relu,
        conv::{Conv2d, Conv2dConfig},
        pool::{MaxPool2d, MaxPool2dConfig},
    },
    prelude::*,
};

use crate::data::{IMAGE_SIZE, NUM_CLASSES};

/// A network mapping a batch of `[batch_size, 1, 28, 28]` images to class logits.
pub trait ImageClassifier<B: Backend>: Module<B> {
    /// Returns unnormalized class scores of shape `[batch_size, num_classes]`.
    fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2>;
}

fn max_pool() -> MaxPool2d {
    MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init()
}

/// Fully-connected classifier, no convolutions.
#[derive(Module, Debug)]
pub struct FcNet<B: Backend> {
    fc1: Linear<B>,
    fc2: Linear<B>,
    dropout: Dropout,
    activation: Relu,
}

#[derive(Config, Debug)]
pub struct FcNetConfig {
    #[config(default = 20)]
    pub hidden_size: usize,
    #[config(default = 0.5)]
    pub dropout: f64,
    #[config(default = "NUM_CLASSES")]
    pub num_classes: usize,
}

impl FcNetConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> FcNet<B> {
        FcNet {
            fc1: LinearConfig::new(IMAGE_SIZE * IMAGE_SIZE, self.hidden_size).init(device),
            fc2: LinearConfig::new(self.hidden_size, self.num_classes).init(device),
            dropout: DropoutConfig::new(self.dropout).init(),
            activation: Relu::new(),
        }
    }
}

impl<B: Backend> ImageClassifier<B> for FcNet<B> {
    fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = images.flatten::<2>(1, 3);

        let x = self.fc1.forward(x);
        let x = self.activation.forward(x);
        let x = self.dropout.forward(x);

        self.fc2.forward(x)
    }
}

/// Two small convolutions followed by a two-layer head.
#[derive(Module, Debug)]
pub struct ConvNet<B: Backend> {
    conv1: Conv2d<B>,
    conv2: Conv2d<B>,
    pool: MaxPool2d,
    dropout1: Dropout,
    dropout2: Dropout,
    fc1: Linear<B>,
    fc2: Linear<B>,
    activation: Relu,
}

#[derive(Config, Debug)]
pub struct ConvNetConfig {
    #[config(default = 8)]
    pub channels: usize,
    #[config(default = 64)]
    pub hidden_size: usize,
    #[config(default = 0.5)]
    pub dropout: f64,
    #[config(default = "NUM_CLASSES")]
    pub num_classes: usize,
}

impl ConvNetConfig {
    // 28 -conv-> 26 -pool-> 13 -conv-> 11 -pool-> 5
    const OUTPUT_SIDE: usize = 5;

    pub fn init<B: Backend>(&self, device: &B::Device) -> ConvNet<B> {
        let flattened = self.channels * Self::OUTPUT_SIDE * Self::OUTPUT_SIDE;

        ConvNet {
            conv1: Conv2dConfig::new([1, self.channels], [3, 3]).init(device),
            conv2: Conv2dConfig::new([self.channels, self.channels], [3, 3]).init(device),
            pool: max_pool(),
            dropout1: DropoutConfig::new(self.dropout).init(),
            dropout2: DropoutConfig::new(self.dropout).init(),
            fc1: LinearConfig::new(flattened, self.hidden_size).init(device),
            fc2: LinearConfig::new(self.hidden_size, self.num_classes).init(device),
            activation: Relu::new(),
        }
    }
}

impl<B: Backend> ImageClassifier<B> for ConvNet<B> {
    fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.conv1.forward(images);
        let x = self.activation.forward(x);
        let x = self.pool.forward(x);
        let x = self.dropout1.forward(x);

        let x = self.conv2.forward(x);
        let x = self.activation.forward(x);
        let x = self.pool.forward(x);
        let x = self.dropout2.forward(x);

        let x = x.flatten::<2>(1, 3);
        let x = self.fc1.forward(x);
        let x = self.activation.forward(x);

        self.fc2.forward(x)
    }
}

/// Two same-padded convolutions with batch norm, then ReLU, pooling and dropout.
///
/// Each block halves the spatial resolution.
#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    conv1: Conv2d<B>,
    norm1: BatchNorm<B, 2>,
    conv2: Conv2d<B>,
    norm2: BatchNorm<B, 2>,
    activation: Relu,
    pool: MaxPool2d,
    dropout: Dropout,
}

impl<B: Backend> ConvBlock<B> {
    pub fn new(channels: [usize; 2], dropout: f64, device: &B::Device) -> Self {
        let [channels_in, channels_out] = channels;
        let conv = |channels| {
            Conv2dConfig::new(channels, [3, 3])
                .with_padding(PaddingConfig2d::Same)
                .init(device)
        };

        Self {
            conv1: conv([channels_in, channels_out]),
            norm1: BatchNormConfig::new(channels_out).init(device),
            conv2: conv([channels_out, channels_out]),
            norm2: BatchNormConfig::new(channels_out).init(device),
            activation: Relu::new(),
            pool: max_pool(),
            dropout: DropoutConfig::new(dropout).init(),
        }
    }

    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv1.forward(input);
        let x = self.norm1.forward(x);
        let x = self.conv2.forward(x);
        let x = self.norm2.forward(x);
        let x = self.activation.forward(x);
        let x = self.pool.forward(x);

        self.dropout.forward(x)
    }
}

/// Deeper custom network: three convolution blocks and a wide fully-connected head.
#[derive(Module, Debug)]
pub struct DeepNet<B: Backend> {
    block1: ConvBlock<B>,
    block2: ConvBlock<B>,
    block3: ConvBlock<B>,
    fc1: Linear<B>,
    fc2: Linear<B>,
    activation: Relu,
}

#[derive(Config, Debug)]
pub struct DeepNetConfig {
    #[config(default = 128)]
    pub channels1: usize,
    #[config(default = 128)]
    pub channels2: usize,
    #[config(default = 1028)]
    pub channels3: usize,
    #[config(default = 4096)]
    pub hidden_size: usize,
    #[config(default = 0.5)]
    pub dropout: f64,
    #[config(default = "NUM_CLASSES")]
    pub num_classes: usize,
}

impl DeepNetConfig {
    // 28 -> 14 -> 7 -> 3
    const OUTPUT_SIDE: usize = 3;

    pub fn init<B: Backend>(&self, device: &B::Device) -> DeepNet<B> {
        let flattened = self.channels3 * Self::OUTPUT_SIDE * Self::OUTPUT_SIDE;

        DeepNet {
            block1: ConvBlock::new([1, self.channels1], self.dropout, device),
            block2: ConvBlock::new([self.channels1, self.channels2], self.dropout, device),
            block3: ConvBlock::new([self.channels2, self.channels3], self.dropout, device),
            fc1: LinearConfig::new(flattened, self.hidden_size).init(device),
            fc2: LinearConfig::new(self.hidden_size, self.num_classes).init(device),
            activation: Relu::new(),
        }
    }
}

impl<B: Backend> ImageClassifier<B> for DeepNet<B> {
    fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.block1.forward(images);
        let x = self.block2.forward(x);
        let x = self.block3.forward(x);

        let x = x.flatten::<2>(1, 3);
        let x = self.fc1.forward(x);
        let x = self.activation.forward(x);

        self.fc2.forward(x)
    }
}

/// Architecture of the classifier to train, with its hyper-parameters.
#[derive(Config, Debug)]
pub enum ModelConfig {
    FullyConnected(FcNetConfig),
    Convolutional(ConvNetConfig),
    Deep(DeepNetConfig),
}

impl ModelConfig {
    pub fn name(&self) -> &'static str {
        match self {
            Self::FullyConnected(_) => "fc",
            Self::Convolutional(_) => "conv",
            Self::Deep(_) => "deep",
        }
    }
}
