use burn::{
    data::{dataloader::batcher::Batcher, dataset::vision::MnistItem},
    prelude::*,
};

/// Mean pixel intensity of the MNIST training images, once scaled to `[0, 1]`.
pub const MNIST_MEAN: f32 = 0.1307;
/// Standard deviation of the MNIST training images, once scaled to `[0, 1]`.
pub const MNIST_STD: f32 = 0.3081;

pub const NUM_CLASSES: usize = 10;
pub const IMAGE_SIZE: usize = 28;

#[derive(Clone, Default)]
pub struct DigitBatcher {}

#[derive(Clone, Debug)]
pub struct DigitBatch<B: Backend> {
    /// Normalized images, `[batch_size, 1, 28, 28]`.
    pub images: Tensor<B, 4>,
    /// Class index of every image, `[batch_size]`.
    pub targets: Tensor<B, 1, Int>,
}

impl<B: Backend> Batcher<B, MnistItem, DigitBatch<B>> for DigitBatcher {
    fn batch(&self, items: Vec<MnistItem>, device: &B::Device) -> DigitBatch<B> {
        let images = items
            .iter()
            .map(|item| TensorData::from(item.image).convert::<B::FloatElem>())
            .map(|data| Tensor::<B, 2>::from_data(data, device))
            .map(|tensor| tensor.reshape([1, 1, IMAGE_SIZE, IMAGE_SIZE]))
            // Scale to [0, 1] then standardize with the dataset statistics
            .map(|tensor| ((tensor / 255) - MNIST_MEAN) / MNIST_STD)
            .collect();

        let targets = items
            .iter()
            .map(|item| {
                Tensor::<B, 1, Int>::from_data(
                    [(item.label as i64).elem::<B::IntElem>()],
                    device,
                )
            })
            .collect();

        let images = Tensor::cat(images, 0);
        let targets = Tensor::cat(targets, 0);

        DigitBatch { images, targets }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn batch_shapes_and_targets() {
        let device = Default::default();
        let items = vec![
            MnistItem {
                image: [[0.0; IMAGE_SIZE]; IMAGE_SIZE],
                label: 3,
            },
            MnistItem {
                image: [[255.0; IMAGE_SIZE]; IMAGE_SIZE],
                label: 9,
            },
        ];

        let batch: DigitBatch<TestBackend> = DigitBatcher::default().batch(items, &device);

        assert_eq!(batch.images.dims(), [2, 1, IMAGE_SIZE, IMAGE_SIZE]);
        assert_eq!(
            batch.targets.into_data().to_vec::<i64>().unwrap(),
            vec![3, 9]
        );
    }

    #[test]
    fn images_are_standardized() {
        let device = Default::default();
        let items = vec![
            MnistItem {
                image: [[0.0; IMAGE_SIZE]; IMAGE_SIZE],
                label: 0,
            },
            MnistItem {
                image: [[255.0; IMAGE_SIZE]; IMAGE_SIZE],
                label: 1,
            },
        ];

        let batch: DigitBatch<TestBackend> = DigitBatcher::default().batch(items, &device);
        let pixels = batch.images.into_data().to_vec::<f32>().unwrap();
        let black = -MNIST_MEAN / MNIST_STD;
        let white = (1.0 - MNIST_MEAN) / MNIST_STD;

        let per_image = IMAGE_SIZE * IMAGE_SIZE;
        assert!(pixels[..per_image].iter().all(|p| (p - black).abs() < 1e-4));
        assert!(pixels[per_image..].iter().all(|p| (p - white).abs() < 1e-4));
    }
}
