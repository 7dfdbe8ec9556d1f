use std::path::PathBuf;

use burn::{config::ConfigError, record::RecorderError};

/// Errors raised while preparing, training or evaluating a digit classifier.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The checkpoint passed to the evaluation mode does not exist.
    #[error("No checkpoint found at {0}")]
    MissingCheckpoint(PathBuf),

    /// The evaluation mode was requested without a checkpoint path.
    #[error("`--evaluate` requires `--load-model <PATH>`")]
    CheckpointRequired,

    /// The stratified split did not partition the dataset.
    #[error("Split covers {train} train + {valid} valid indices, expected {expected}")]
    SplitMismatch {
        train: usize,
        valid: usize,
        expected: usize,
    },

    #[error("Validation fraction must be in [0, 1), got {0}")]
    InvalidFraction(f64),

    #[error("Invalid learning rate schedule: {0}")]
    Scheduler(String),

    #[error("Failed to record the model: {0:?}")]
    Recorder(RecorderError),

    #[error("Failed to load the training config: {0:?}")]
    Config(ConfigError),

    #[error("Failed to plot the training curves: {0}")]
    Plot(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl From<RecorderError> for Error {
    fn from(err: RecorderError) -> Self {
        Self::Recorder(err)
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Self::Config(err)
    }
}

pub type Result<T> = core::result::Result<T, Error>;
