use std::path::{Path, PathBuf};

use burn::{
    data::{
        dataloader::DataLoaderBuilder,
        dataset::{
            Dataset,
            vision::{MnistDataset, MnistItem},
        },
    },
    prelude::*,
    record::CompactRecorder,
};

use crate::{
    data::DigitBatcher,
    error::{Error, Result},
    history::EpochMetrics,
    model::{ImageClassifier, ModelConfig},
    training::{DigitLoader, TrainingConfig, evaluate},
};

const CHECKPOINT_EXTENSION: &str = "mpk";

/// Path of the file written by the recorder for the given checkpoint path.
pub fn checkpoint_file(checkpoint: &Path) -> PathBuf {
    checkpoint.with_extension(CHECKPOINT_EXTENSION)
}

/// The model configuration stored beside the checkpoint, or `fallback` when there is none.
pub fn resolve_model_config(checkpoint: &Path, fallback: ModelConfig) -> Result<ModelConfig> {
    let config_file = checkpoint
        .parent()
        .map(|dir| dir.join("config.json"))
        .filter(|path| path.exists());

    match config_file {
        Some(path) => {
            log::info!("Loading model configuration from {}", path.display());
            Ok(TrainingConfig::load(path)?.model)
        }
        None => Ok(fallback),
    }
}

/// Evaluate a stored checkpoint on the official MNIST test set.
pub fn evaluate_checkpoint<B: Backend>(
    checkpoint: &Path,
    fallback: ModelConfig,
    batch_size: usize,
    num_workers: usize,
    device: &B::Device,
) -> Result<EpochMetrics> {
    evaluate_checkpoint_on::<B, _>(
        checkpoint,
        fallback,
        MnistDataset::test(),
        batch_size,
        num_workers,
        device,
    )
}

/// Evaluate a stored checkpoint on any dataset of MNIST items.
///
/// # Errors
///
/// [Error::MissingCheckpoint] when no recorded model exists at `checkpoint`.
pub fn evaluate_checkpoint_on<B, D>(
    checkpoint: &Path,
    fallback: ModelConfig,
    dataset: D,
    batch_size: usize,
    num_workers: usize,
    device: &B::Device,
) -> Result<EpochMetrics>
where
    B: Backend,
    D: Dataset<MnistItem> + 'static,
{
    let file = checkpoint_file(checkpoint);
    if !file.exists() {
        return Err(Error::MissingCheckpoint(file));
    }

    let config = resolve_model_config(checkpoint, fallback)?;
    log::info!("Evaluating {} model from {}", config.name(), file.display());

    let dataloader: DigitLoader<B> = DataLoaderBuilder::new(DigitBatcher::default())
        .batch_size(batch_size)
        .num_workers(num_workers)
        .set_device(device.clone())
        .build(dataset);

    match config {
        ModelConfig::FullyConnected(config) => {
            evaluate_recorded(config.init::<B>(device), &file, &dataloader, device)
        }
        ModelConfig::Convolutional(config) => {
            evaluate_recorded(config.init::<B>(device), &file, &dataloader, device)
        }
        ModelConfig::Deep(config) => {
            evaluate_recorded(config.init::<B>(device), &file, &dataloader, device)
        }
    }
}

fn evaluate_recorded<B, M>(
    model: M,
    file: &Path,
    dataloader: &DigitLoader<B>,
    device: &B::Device,
) -> Result<EpochMetrics>
where
    B: Backend,
    M: ImageClassifier<B>,
{
    let model = model.load_file(file.to_path_buf(), &CompactRecorder::new(), device)?;

    Ok(evaluate(&model, dataloader))
}
