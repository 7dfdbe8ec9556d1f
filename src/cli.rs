use std::path::PathBuf;

use burn::optim::AdamConfig;
use clap::{Parser, ValueEnum};

use crate::{
    model::{ConvNetConfig, DeepNetConfig, FcNetConfig, ModelConfig},
    training::TrainingConfig,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModelKind {
    /// Fully-connected network.
    Fc,
    /// Small convolutional network.
    Conv,
    /// Deep convolutional network with batch normalization.
    Deep,
}

impl ModelKind {
    pub fn config(&self) -> ModelConfig {
        match self {
            Self::Fc => ModelConfig::FullyConnected(FcNetConfig::new()),
            Self::Conv => ModelConfig::Convolutional(ConvNetConfig::new()),
            Self::Deep => ModelConfig::Deep(DeepNetConfig::new()),
        }
    }
}

/// Train and evaluate MNIST digit classifiers.
#[derive(Parser, Debug)]
#[command(version, about)]
pub struct Args {
    /// Input batch size for training.
    #[arg(long, default_value_t = 64, value_name = "N")]
    pub batch_size: usize,

    /// Input batch size for validation and testing.
    #[arg(long, default_value_t = 1000, value_name = "N")]
    pub test_batch_size: usize,

    /// Number of epochs to train.
    #[arg(long, default_value_t = 14, value_name = "N")]
    pub epochs: usize,

    /// Initial learning rate.
    #[arg(long, default_value_t = 1e-3, value_name = "LR")]
    pub lr: f64,

    /// Number of epochs between learning rate reductions.
    #[arg(long, default_value_t = 1, value_name = "N")]
    pub step: usize,

    /// Learning rate step gamma.
    #[arg(long, default_value_t = 0.7, value_name = "M")]
    pub gamma: f64,

    /// Disables GPU training.
    #[arg(long)]
    pub no_cuda: bool,

    /// Random seed.
    #[arg(long, default_value_t = 1, value_name = "S")]
    pub seed: u64,

    /// How many batches to wait before logging training status.
    #[arg(long, default_value_t = 10, value_name = "N")]
    pub log_interval: usize,

    /// Evaluate the model on the official test set.
    #[arg(long)]
    pub evaluate: bool,

    /// Model checkpoint path.
    #[arg(long, value_name = "PATH")]
    pub load_model: Option<PathBuf>,

    /// Save the trained model.
    #[arg(long, action = clap::ArgAction::Set, default_value_t = true)]
    pub save_model: bool,

    /// Architecture to train, or to evaluate when no config is stored beside the checkpoint.
    #[arg(long, value_enum, default_value_t = ModelKind::Deep)]
    pub model: ModelKind,

    /// Directory receiving the config, checkpoint, history and plots.
    #[arg(long, default_value = "/tmp/digit-classifier", value_name = "DIR")]
    pub artifact_dir: String,

    /// Number of data loading workers.
    #[arg(long, default_value_t = 1, value_name = "N")]
    pub num_workers: usize,

    /// Fraction of each digit class held out for validation.
    #[arg(long, default_value_t = 0.15, value_name = "F")]
    pub valid_fraction: f64,

    /// Disables training data augmentation.
    #[arg(long)]
    pub no_augment: bool,
}

impl Args {
    pub fn training_config(&self) -> TrainingConfig {
        TrainingConfig::new(self.model.config(), AdamConfig::new())
            .with_num_epochs(self.epochs)
            .with_batch_size(self.batch_size)
            .with_test_batch_size(self.test_batch_size)
            .with_num_workers(self.num_workers)
            .with_seed(self.seed)
            .with_learning_rate(self.lr)
            .with_lr_step(self.step)
            .with_lr_gamma(self.gamma)
            .with_log_interval(self.log_interval)
            .with_valid_fraction(self.valid_fraction)
            .with_save_model(self.save_model)
            .with_augment(!self.no_augment)
    }
}
