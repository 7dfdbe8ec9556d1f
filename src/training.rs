use std::{fmt::Display, sync::Arc};

use burn::{
    LearningRate,
    data::{
        dataloader::{DataLoader, DataLoaderBuilder},
        dataset::{
            Dataset,
            transform::MapperDataset,
            vision::{MnistDataset, MnistItem},
        },
    },
    lr_scheduler::{LrScheduler, step::StepLrSchedulerConfig},
    module::AutodiffModule,
    nn::loss::CrossEntropyLossConfig,
    optim::{AdamConfig, GradientsParams, Optimizer},
    prelude::*,
    record::CompactRecorder,
    tensor::backend::AutodiffBackend,
    train::ClassificationOutput,
};
use rand::{SeedableRng, rngs::StdRng};

use crate::{
    augment::AugmentationConfig,
    data::{DigitBatch, DigitBatcher},
    error::Error,
    history::{EpochMetrics, EpochRecord, TrainingHistory, plot_history},
    model::{ImageClassifier, ModelConfig},
    split::{StratifiedSplit, SubsetDataset, stratified_split},
};

pub type DigitLoader<B> = Arc<dyn DataLoader<B, DigitBatch<B>>>;
pub type DigitDataset = Box<dyn Dataset<MnistItem>>;

#[derive(Config)]
pub struct TrainingConfig {
    pub model: ModelConfig,
    pub optimizer: AdamConfig,
    #[config(default = "AugmentationConfig::new()")]
    pub augmentation: AugmentationConfig,
    #[config(default = true)]
    pub augment: bool,
    #[config(default = 14)]
    pub num_epochs: usize,
    #[config(default = 64)]
    pub batch_size: usize,
    #[config(default = 1000)]
    pub test_batch_size: usize,
    #[config(default = 1)]
    pub num_workers: usize,
    #[config(default = 1)]
    pub seed: u64,
    #[config(default = 1e-3)]
    pub learning_rate: LearningRate,
    /// Number of epochs between two learning rate reductions.
    #[config(default = 1)]
    pub lr_step: usize,
    #[config(default = 0.7)]
    pub lr_gamma: f64,
    /// Number of batches between two progress logs.
    #[config(default = 10)]
    pub log_interval: usize,
    #[config(default = 0.15)]
    pub valid_fraction: f64,
    #[config(default = true)]
    pub save_model: bool,
}

/// Running sums over the batches of one epoch.
#[derive(Default)]
struct MetricsAccumulator {
    loss_sum: f64,
    correct: usize,
    total: usize,
}

impl MetricsAccumulator {
    fn update<B: Backend>(&mut self, item: &ClassificationOutput<B>) -> f64 {
        let [batch_size, _num_classes] = item.output.dims();
        let loss = item.loss.clone().into_scalar().elem::<f64>();

        // The loss is a batch mean: weight it back by the batch size.
        self.loss_sum += loss * batch_size as f64;
        self.correct += num_correct(item.output.clone(), item.targets.clone());
        self.total += batch_size;

        loss
    }

    fn accuracy(&self) -> f64 {
        EpochMetrics::new(self.loss_sum, self.correct, self.total).accuracy
    }

    fn finish(self) -> EpochMetrics {
        EpochMetrics::new(self.loss_sum, self.correct, self.total)
    }
}

fn num_correct<B: Backend>(output: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> usize {
    let [batch_size, _num_classes] = output.dims();
    let predictions = output.argmax(1).reshape([batch_size]);

    predictions
        .equal(targets)
        .int()
        .sum()
        .into_scalar()
        .elem::<i64>() as usize
}

/// Forward pass followed by the cross-entropy loss on the logits.
pub fn forward_classification<B, M>(model: &M, batch: DigitBatch<B>) -> ClassificationOutput<B>
where
    B: Backend,
    M: ImageClassifier<B>,
{
    let output = model.forward(batch.images);
    let loss = CrossEntropyLossConfig::new()
        .init(&output.device())
        .forward(output.clone(), batch.targets.clone());

    ClassificationOutput::new(loss, output, batch.targets)
}

fn is_log_step(iteration: usize, log_interval: usize) -> bool {
    iteration % log_interval.max(1) == 0
}

fn percent(count: usize, total: usize) -> f64 {
    100.0 * count as f64 / total.max(1) as f64
}

/// Train the model for one epoch and return it with the epoch metrics.
pub fn train_epoch<B, M, O>(
    mut model: M,
    optim: &mut O,
    dataloader: &DigitLoader<B>,
    learning_rate: LearningRate,
    epoch: usize,
    log_interval: usize,
) -> (M, EpochMetrics)
where
    B: AutodiffBackend,
    M: AutodiffModule<B> + ImageClassifier<B>,
    O: Optimizer<M, B>,
{
    let mut metrics = MetricsAccumulator::default();
    let mut iterator = dataloader.iter();
    let mut iteration = 0;
    let mut items_seen = 0;

    while let Some(batch) = iterator.next() {
        let items_total = iterator.progress().items_total;
        let [batch_size] = batch.targets.dims();
        let item = forward_classification(&model, batch);
        let loss = metrics.update(&item);

        if is_log_step(iteration, log_interval) {
            log::info!(
                "Train Epoch: {epoch} [{items_seen}/{items_total} ({:.0}%)]\tLoss: {loss:.6}\tAccuracy: {:.6}",
                percent(items_seen, items_total),
                metrics.accuracy(),
            );
        }

        let grads = item.loss.backward();
        let grads = GradientsParams::from_grads(grads, &model);
        model = optim.step(learning_rate, model, grads);
        iteration += 1;
        items_seen += batch_size;
    }

    let metrics = metrics.finish();
    log::info!("Train set accuracy: {:.2}%", metrics.accuracy);

    (model, metrics)
}

/// Score the model on every batch of the loader without tracking gradients.
pub fn evaluate<B, M>(model: &M, dataloader: &DigitLoader<B>) -> EpochMetrics
where
    B: Backend,
    M: ImageClassifier<B>,
{
    let mut metrics = MetricsAccumulator::default();

    for batch in dataloader.iter() {
        let item = forward_classification(model, batch);
        metrics.update(&item);
    }

    let metrics = metrics.finish();
    log::info!(
        "Test set: Average loss: {:.4}, Accuracy: {}/{} ({:.0}%)",
        metrics.loss,
        metrics.correct,
        metrics.total,
        metrics.accuracy,
    );

    metrics
}

/// Train `model` on `dataset_train`, scoring it on `dataset_valid` after every epoch.
///
/// The learning rate starts at `config.learning_rate` and is multiplied by
/// `config.lr_gamma` every `config.lr_step` epochs.
pub fn fit<B, M, DT, DV>(
    mut model: M,
    config: &TrainingConfig,
    dataset_train: DT,
    dataset_valid: DV,
    device: &B::Device,
) -> crate::Result<(M, TrainingHistory)>
where
    B: AutodiffBackend,
    M: AutodiffModule<B> + ImageClassifier<B>,
    M::InnerModule: ImageClassifier<B::InnerBackend>,
    DT: Dataset<MnistItem> + 'static,
    DV: Dataset<MnistItem> + 'static,
{
    let dataloader_train: DigitLoader<B> = DataLoaderBuilder::new(DigitBatcher::default())
        .batch_size(config.batch_size)
        .shuffle(config.seed)
        .num_workers(config.num_workers)
        .set_device(device.clone())
        .build(dataset_train);

    let dataloader_valid: DigitLoader<B::InnerBackend> =
        DataLoaderBuilder::new(DigitBatcher::default())
            .batch_size(config.test_batch_size)
            .shuffle(config.seed)
            .num_workers(config.num_workers)
            .set_device(device.clone())
            .build(dataset_valid);

    let mut optim = config.optimizer.init::<B, M>();
    let mut scheduler = StepLrSchedulerConfig::new(config.learning_rate, config.lr_step)
        .with_gamma(config.lr_gamma)
        .init()
        .map_err(Error::Scheduler)?;

    let mut history = TrainingHistory::default();
    for epoch in 1..=config.num_epochs {
        // One scheduler step per epoch
        let learning_rate = scheduler.step();
        log::info!("Epoch {epoch}/{} - learning rate {learning_rate:e}", config.num_epochs);

        let (trained, train) = train_epoch(
            model,
            &mut optim,
            &dataloader_train,
            learning_rate,
            epoch,
            config.log_interval,
        );
        model = trained;

        let valid = evaluate(&model.valid(), &dataloader_valid);
        history.push(EpochRecord {
            epoch,
            learning_rate,
            train,
            valid,
        });
    }

    Ok((model, history))
}

/// Artifacts of a previous run are overwritten, other files are left alone.
fn create_artifact_dir(artifact_dir: &str) -> crate::Result<()> {
    std::fs::create_dir_all(artifact_dir)?;

    Ok(())
}

/// Training and validation views of `dataset` for `split`.
///
/// Only the training view is augmented, and only when `config.augment` is set.
pub fn split_datasets<D>(
    dataset: Arc<D>,
    split: StratifiedSplit,
    config: &TrainingConfig,
) -> (DigitDataset, DigitDataset)
where
    D: Dataset<MnistItem> + 'static,
{
    let dataset_valid = SubsetDataset::<_, MnistItem>::new(dataset.clone(), split.valid);
    let dataset_train = SubsetDataset::<_, MnistItem>::new(dataset, split.train);

    let dataset_train: DigitDataset = if config.augment {
        let augmentation = config.augmentation.init(config.seed.wrapping_add(1));
        Box::new(MapperDataset::new(dataset_train, augmentation))
    } else {
        Box::new(dataset_train)
    };

    (dataset_train, Box::new(dataset_valid))
}

/// Train `model` on MNIST and write its artifacts to `artifact_dir`.
///
/// The official training set is split per digit into training and validation
/// subsets. Artifacts are `config.json`, `model.mpk` (when `save_model` is set),
/// `history.json` and `curves.svg`.
pub fn run<B, M>(
    artifact_dir: &str,
    config: &TrainingConfig,
    model: M,
    device: B::Device,
) -> crate::Result<TrainingHistory>
where
    B: AutodiffBackend,
    M: AutodiffModule<B> + ImageClassifier<B> + Display,
    M::InnerModule: ImageClassifier<B::InnerBackend>,
{
    create_artifact_dir(artifact_dir)?;
    config.save(format!("{artifact_dir}/config.json"))?;

    B::seed(config.seed);

    log::info!(
        "Model summary ({}):\n{model}\nTrainable parameters: {}",
        config.model.name(),
        model.num_params()
    );

    let dataset = Arc::new(MnistDataset::train());
    let labels: Vec<usize> = dataset.iter().map(|item| item.label as usize).collect();
    let mut rng = StdRng::seed_from_u64(config.seed);
    let split = stratified_split(&labels, config.valid_fraction, &mut rng)?;
    log::info!(
        "Split {} training images into {} train / {} valid",
        labels.len(),
        split.train.len(),
        split.valid.len()
    );

    let (dataset_train, dataset_valid) = split_datasets(dataset, split, config);
    let (model, history) = fit(model, config, dataset_train, dataset_valid, &device)?;

    if config.save_model {
        model.save_file(format!("{artifact_dir}/model"), &CompactRecorder::new())?;
        log::info!("Model saved to {artifact_dir}/model.mpk");
    }

    history.save(format!("{artifact_dir}/history.json"))?;
    plot_history(&history, format!("{artifact_dir}/curves.svg"))?;

    Ok(history)
}
