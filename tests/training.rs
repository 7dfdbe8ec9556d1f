use burn::{
    backend::{Autodiff, NdArray},
    config::Config,
    data::dataset::{Dataset, InMemDataset, vision::MnistItem},
    module::Module,
    optim::AdamConfig,
    record::CompactRecorder,
};
use digit_classifier::{
    augment::AugmentationConfig,
    evaluation::evaluate_checkpoint_on,
    model::{ConvNetConfig, DeepNetConfig, FcNetConfig, ModelConfig},
    split::stratified_split,
    training::{TrainingConfig, fit, split_datasets},
};
use rand::{SeedableRng, rngs::StdRng};

type TestBackend = Autodiff<NdArray>;

/// Each digit is a bright horizontal bar whose row depends on the label.
fn bar_digits(count: usize) -> Vec<MnistItem> {
    (0..count)
        .map(|i| {
            let label = i % 10;
            let mut image = [[0f32; 28]; 28];
            let row = 4 + 2 * label;
            for x in 4..24 {
                image[row][x] = 255.0;
                image[row + 1][x] = 200.0;
            }
            MnistItem {
                image,
                label: label as u8,
            }
        })
        .collect()
}

fn fc_config() -> TrainingConfig {
    TrainingConfig::new(
        ModelConfig::FullyConnected(FcNetConfig::new()),
        AdamConfig::new(),
    )
    .with_batch_size(8)
    .with_test_batch_size(16)
    .with_log_interval(1)
}

#[test]
fn fit_records_every_epoch() {
    let device = Default::default();
    let config = fc_config().with_num_epochs(2).with_lr_gamma(0.5);
    let model = FcNetConfig::new().init::<TestBackend>(&device);

    let (_model, history) = fit(
        model,
        &config,
        InMemDataset::new(bar_digits(40)),
        InMemDataset::new(bar_digits(10)),
        &device,
    )
    .unwrap();

    assert_eq!(history.len(), 2);
    assert_eq!(history.epochs[0].epoch, 1);
    assert_eq!(history.epochs[0].learning_rate, 1e-3);
    assert_eq!(history.epochs[1].learning_rate, 5e-4);
    assert_eq!(history.epochs[0].train.total, 40);
    assert_eq!(history.epochs[0].valid.total, 10);
    assert!(
        history
            .epochs
            .iter()
            .all(|record| record.train.loss.is_finite() && record.valid.loss.is_finite())
    );
}

#[test]
fn training_reduces_loss_on_separable_digits() {
    let device = Default::default();
    let model_config = FcNetConfig::new().with_hidden_size(64).with_dropout(0.0);
    let config = fc_config()
        .with_num_epochs(8)
        .with_learning_rate(1e-2)
        .with_lr_gamma(1.0);
    let model = model_config.init::<TestBackend>(&device);

    let (_model, history) = fit(
        model,
        &config,
        InMemDataset::new(bar_digits(100)),
        InMemDataset::new(bar_digits(20)),
        &device,
    )
    .unwrap();

    let losses = history.train_loss();
    assert!(losses[losses.len() - 1] < losses[0]);
}

#[test]
fn stratified_pipeline_with_augmentation() {
    let device = Default::default();
    let items = bar_digits(200);
    let labels: Vec<usize> = items.iter().map(|item| item.label as usize).collect();
    let split = stratified_split(&labels, 0.15, &mut StdRng::seed_from_u64(1)).unwrap();
    assert_eq!(split.valid.len(), 30);
    assert_eq!(split.train.len(), 170);

    let valid_indices = split.valid.clone();

    let config = TrainingConfig::new(
        ModelConfig::Convolutional(ConvNetConfig::new()),
        AdamConfig::new(),
    )
    .with_augmentation(AugmentationConfig::new().with_degrees(30.0))
    .with_num_epochs(1)
    .with_batch_size(32)
    .with_test_batch_size(64);
    let dataset = std::sync::Arc::new(InMemDataset::new(items.clone()));
    let (dataset_train, dataset_valid) = split_datasets(dataset, split, &config);

    for (item, &index) in dataset_valid.iter().zip(&valid_indices) {
        assert_eq!(item.image, items[index].image);
    }
    let model = ConvNetConfig::new().init::<TestBackend>(&device);

    let (_model, history) = fit(model, &config, dataset_train, dataset_valid, &device).unwrap();

    assert_eq!(history.epochs[0].train.total, 170);
    assert_eq!(history.epochs[0].valid.total, 30);
}

#[test]
fn trained_checkpoint_can_be_evaluated() {
    let device = Default::default();
    let dir = tempfile::tempdir().unwrap();
    let config = fc_config().with_num_epochs(1);
    config.save(dir.path().join("config.json")).unwrap();
    let model = FcNetConfig::new().init::<TestBackend>(&device);

    let (model, _history) = fit(
        model,
        &config,
        InMemDataset::new(bar_digits(30)),
        InMemDataset::new(bar_digits(10)),
        &device,
    )
    .unwrap();
    model
        .save_file(dir.path().join("model"), &CompactRecorder::new())
        .unwrap();

    let metrics = evaluate_checkpoint_on::<NdArray, _>(
        &dir.path().join("model.mpk"),
        ModelConfig::Deep(DeepNetConfig::new()),
        InMemDataset::new(bar_digits(25)),
        10,
        1,
        &device,
    )
    .unwrap();

    assert_eq!(metrics.total, 25);
    assert!(metrics.correct <= 25);
}
