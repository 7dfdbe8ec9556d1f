use std::sync::Mutex;

use burn::{
    config::Config,
    data::dataset::{transform::Mapper, vision::MnistItem},
};
use rand::{Rng, SeedableRng, rngs::StdRng};

const WIDTH: usize = 28;
const HEIGHT: usize = 28;
const MAX_PIXEL: f32 = 255.0;

pub type Image = [[f32; WIDTH]; HEIGHT];

/// Ranges of the random perturbations applied to training digits.
///
/// Saturation and hue jitter have no effect on single-channel images, so only the
/// brightness factor is exposed.
#[derive(Config, Debug)]
pub struct AugmentationConfig {
    /// Side of the gaussian blur kernel, in pixels.
    #[config(default = 15)]
    pub blur_kernel_size: usize,
    /// Range the blur standard deviation is drawn from.
    #[config(default = "(0.01, 0.2)")]
    pub blur_sigma: (f64, f64),
    /// Brightness factor is drawn from `[1 - brightness, 1 + brightness]`.
    #[config(default = 0.1)]
    pub brightness: f64,
    /// Rotation angle is drawn from `[-degrees, degrees]`.
    #[config(default = 15.0)]
    pub degrees: f64,
    /// Range the zoom factor is drawn from.
    #[config(default = "(0.9, 1.1)")]
    pub scale: (f64, f64),
}

impl AugmentationConfig {
    /// A configuration that leaves every image untouched.
    pub fn identity() -> Self {
        Self::new()
            .with_blur_kernel_size(1)
            .with_blur_sigma((1.0, 1.0))
            .with_brightness(0.0)
            .with_degrees(0.0)
            .with_scale((1.0, 1.0))
    }

    /// Initialize the augmentation mapper with its own seeded generator.
    pub fn init(&self, seed: u64) -> Augmentation {
        Augmentation {
            config: self.clone(),
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

/// Parameters drawn for a single image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AugmentParams {
    pub sigma: f64,
    pub brightness: f64,
    pub angle: f64,
    pub scale: f64,
}

impl AugmentParams {
    pub fn sample<R: Rng + ?Sized>(config: &AugmentationConfig, rng: &mut R) -> Self {
        Self {
            sigma: uniform(rng, config.blur_sigma),
            brightness: uniform(rng, (1.0 - config.brightness, 1.0 + config.brightness)),
            angle: uniform(rng, (-config.degrees, config.degrees)).to_radians(),
            scale: uniform(rng, config.scale),
        }
    }
}

fn uniform<R: Rng + ?Sized>(rng: &mut R, (low, high): (f64, f64)) -> f64 {
    if low < high {
        rng.random_range(low..=high)
    } else {
        low
    }
}

/// Random blur, brightness jitter and affine transform of MNIST digits.
///
/// Pixel values stay in `[0, 255]`; normalization happens later in the batcher.
pub struct Augmentation {
    config: AugmentationConfig,
    rng: Mutex<StdRng>,
}

impl Augmentation {
    pub fn apply(&self, image: &Image, params: &AugmentParams) -> Image {
        let image = gaussian_blur(image, self.config.blur_kernel_size, params.sigma);
        let image = adjust_brightness(&image, params.brightness);

        affine(&image, params.angle, params.scale)
    }
}

impl Mapper<MnistItem, MnistItem> for Augmentation {
    fn map(&self, item: &MnistItem) -> MnistItem {
        let params = {
            let mut rng = self.rng.lock().unwrap();
            AugmentParams::sample(&self.config, &mut *rng)
        };

        MnistItem {
            image: self.apply(&item.image, &params),
            label: item.label,
        }
    }
}

fn gaussian_kernel(size: usize, sigma: f64) -> Vec<f32> {
    let radius = (size / 2) as f64;
    let weights: Vec<f64> = (0..size)
        .map(|i| {
            let x = i as f64 - radius;
            (-(x * x) / (2.0 * sigma * sigma)).exp()
        })
        .collect();
    let total: f64 = weights.iter().sum();

    weights.iter().map(|w| (w / total) as f32).collect()
}

/// Separable gaussian blur; out-of-bounds pixels replicate the border.
fn gaussian_blur(image: &Image, kernel_size: usize, sigma: f64) -> Image {
    if kernel_size <= 1 || sigma <= 0.0 {
        return *image;
    }

    let kernel = gaussian_kernel(kernel_size, sigma);
    let radius = (kernel_size / 2) as isize;
    let clamp = |v: isize, max: usize| v.clamp(0, max as isize - 1) as usize;

    let mut horizontal = [[0f32; WIDTH]; HEIGHT];
    for y in 0..HEIGHT {
        for x in 0..WIDTH {
            horizontal[y][x] = kernel
                .iter()
                .enumerate()
                .map(|(k, w)| w * image[y][clamp(x as isize + k as isize - radius, WIDTH)])
                .sum();
        }
    }

    let mut output = [[0f32; WIDTH]; HEIGHT];
    for y in 0..HEIGHT {
        for x in 0..WIDTH {
            output[y][x] = kernel
                .iter()
                .enumerate()
                .map(|(k, w)| w * horizontal[clamp(y as isize + k as isize - radius, HEIGHT)][x])
                .sum();
        }
    }

    output
}

fn adjust_brightness(image: &Image, factor: f64) -> Image {
    let mut output = *image;
    for pixel in output.iter_mut().flatten() {
        *pixel = (*pixel * factor as f32).clamp(0.0, MAX_PIXEL);
    }

    output
}

/// Rotate by `angle` radians and zoom by `scale` around the image centre.
///
/// Every output pixel is mapped back into the source and sampled bilinearly; samples
/// falling outside the source are black.
fn affine(image: &Image, angle: f64, scale: f64) -> Image {
    let cx = (WIDTH as f64 - 1.0) / 2.0;
    let cy = (HEIGHT as f64 - 1.0) / 2.0;
    let (sin, cos) = angle.sin_cos();

    let mut output = [[0f32; WIDTH]; HEIGHT];
    for (y, row) in output.iter_mut().enumerate() {
        for (x, pixel) in row.iter_mut().enumerate() {
            let dx = x as f64 - cx;
            let dy = y as f64 - cy;
            let src_x = cx + (cos * dx + sin * dy) / scale;
            let src_y = cy + (-sin * dx + cos * dy) / scale;

            *pixel = bilinear(image, src_x, src_y);
        }
    }

    output
}

fn bilinear(image: &Image, x: f64, y: f64) -> f32 {
    let x0 = x.floor();
    let y0 = y.floor();
    let fx = (x - x0) as f32;
    let fy = (y - y0) as f32;

    let at = |xi: f64, yi: f64| -> f32 {
        if xi < 0.0 || yi < 0.0 || xi >= WIDTH as f64 || yi >= HEIGHT as f64 {
            0.0
        } else {
            image[yi as usize][xi as usize]
        }
    };

    let top = at(x0, y0) * (1.0 - fx) + at(x0 + 1.0, y0) * fx;
    let bottom = at(x0, y0 + 1.0) * (1.0 - fx) + at(x0 + 1.0, y0 + 1.0) * fx;

    top * (1.0 - fy) + bottom * fy
}

#[cfg(test)]
mod tests {
    use super::*;

    fn digit() -> Image {
        let mut image = [[0f32; WIDTH]; HEIGHT];
        for (y, row) in image.iter_mut().enumerate().take(22).skip(6) {
            row[13] = 255.0;
            row[14] = 200.0;
            row[y % 6 + 10] = 128.0;
        }
        image
    }

    #[test]
    fn identity_config_keeps_image() {
        let config = AugmentationConfig::identity();
        let augmentation = config.init(0);
        let item = MnistItem {
            image: digit(),
            label: 4,
        };

        let output = augmentation.map(&item);

        assert_eq!(output.label, 4);
        assert_eq!(output.image, item.image);
    }

    #[test]
    fn default_augmentation_stays_in_pixel_range() {
        let augmentation = AugmentationConfig::new().init(42);
        let item = MnistItem {
            image: digit(),
            label: 7,
        };

        for _ in 0..20 {
            let output = augmentation.map(&item);
            assert_eq!(output.label, 7);
            assert!(
                output
                    .image
                    .iter()
                    .flatten()
                    .all(|p| (0.0..=MAX_PIXEL).contains(p))
            );
        }
    }

    #[test]
    fn sampled_params_respect_ranges() {
        let config = AugmentationConfig::new();
        let mut rng = StdRng::seed_from_u64(3);

        for _ in 0..100 {
            let params = AugmentParams::sample(&config, &mut rng);
            assert!((0.01..=0.2).contains(&params.sigma));
            assert!((0.9..=1.1).contains(&params.brightness));
            assert!(params.angle.abs() <= 15f64.to_radians() + 1e-12);
            assert!((0.9..=1.1).contains(&params.scale));
        }
    }

    #[test]
    fn gaussian_kernel_is_normalized() {
        let kernel = gaussian_kernel(15, 2.0);
        let total: f32 = kernel.iter().sum();

        assert_eq!(kernel.len(), 15);
        assert!((total - 1.0).abs() < 1e-5);
        assert!(kernel[7] > kernel[6] && kernel[6] > kernel[0]);
    }

    #[test]
    fn blur_preserves_constant_image() {
        let image = [[100f32; WIDTH]; HEIGHT];
        let output = gaussian_blur(&image, 15, 3.0);

        assert!(output.iter().flatten().all(|p| (p - 100.0).abs() < 1e-3));
    }

    #[test]
    fn brightness_is_clamped() {
        let image = [[250f32; WIDTH]; HEIGHT];
        let output = adjust_brightness(&image, 1.1);

        assert!(output.iter().flatten().all(|p| *p == MAX_PIXEL));
    }

    #[test]
    fn half_turn_mirrors_both_axes() {
        let image = digit();
        let output = affine(&image, std::f64::consts::PI, 1.0);

        for y in 0..HEIGHT {
            for x in 0..WIDTH {
                let expected = image[HEIGHT - 1 - y][WIDTH - 1 - x];
                assert!((output[y][x] - expected).abs() < 1e-3);
            }
        }
    }
}
