use std::path::Path;

use image::imageops::FilterType;
use image::{DynamicImage, RgbImage};
use ndarray::Array3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::error::ClassifierError;

const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];
const MAX_AUGMENT_VARIANTS: usize = 3;

/// A resized, colour-normalised image laid out as `[channel, height, width]`.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedImage {
    pub tensor: Array3<f32>,
}

impl NormalizedImage {
    pub fn width(&self) -> usize {
        self.tensor.shape()[2]
    }

    pub fn height(&self) -> usize {
        self.tensor.shape()[1]
    }
}

/// Resizes and normalises images for the feature extractor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preprocessor {
    /// Square side length the image is resized to
    pub size: u32,
    /// Contrast adjustment applied before normalisation, 0 disables it
    pub contrast: f32,
    pub mean: [f32; 3],
    pub std: [f32; 3],
}

impl Default for Preprocessor {
    fn default() -> Self {
        Self {
            size: 224,
            contrast: 5.0,
            mean: IMAGENET_MEAN,
            std: IMAGENET_STD,
        }
    }
}

impl Preprocessor {
    pub fn with_size(size: u32) -> Self {
        Self {
            size,
            ..Self::default()
        }
    }

    /// Decodes an image file
    pub fn load(path: impl AsRef<Path>) -> Result<DynamicImage, ClassifierError> {
        let path = path.as_ref();
        image::open(path)
            .map_err(|e| ClassifierError::ImageError(format!("Failed to open {}: {}", path.display(), e)))
    }

    pub fn preprocess(&self, image: &DynamicImage) -> Result<NormalizedImage, ClassifierError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(ClassifierError::ImageError("Image has no pixels".into()));
        }
        if self.size == 0 {
            return Err(ClassifierError::ValidationError("Target size must be positive".into()));
        }
        let mut resized = image.resize_exact(self.size, self.size, FilterType::Triangle);
        if self.contrast != 0.0 {
            resized = resized.adjust_contrast(self.contrast);
        }
        let rgb = resized.to_rgb8();

        let side = self.size as usize;
        let mut tensor = Array3::<f32>::zeros((3, side, side));
        for (x, y, pixel) in rgb.enumerate_pixels() {
            let (x, y) = (x as usize, y as usize);
            for c in 0..3 {
                tensor[[c, y, x]] = (pixel.0[c] as f32 / 255.0 - self.mean[c]) / self.std[c];
            }
        }
        Ok(NormalizedImage { tensor })
    }
}

/// Colour jitter used to build an ensemble embedding from perturbed copies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AugmentOptions {
    pub enabled: bool,
    /// Perturbed copies per image, clamped to 1..=3
    pub variants: usize,
    /// Maximum brightness shift in 8-bit levels
    pub brightness_jitter: i32,
    /// Maximum contrast change in percent
    pub contrast_jitter: f32,
    /// Maximum saturation change as a fraction
    pub saturation_jitter: f32,
    pub seed: u64,
}

impl Default for AugmentOptions {
    fn default() -> Self {
        Self {
            enabled: false,
            variants: 2,
            brightness_jitter: 20,
            contrast_jitter: 15.0,
            saturation_jitter: 0.2,
            seed: 0x7a11,
        }
    }
}

impl AugmentOptions {
    pub fn enabled(variants: usize) -> Self {
        Self {
            enabled: true,
            variants,
            ..Self::default()
        }
    }

    pub fn rng(&self) -> StdRng {
        StdRng::seed_from_u64(self.seed)
    }

    /// Number of variants actually produced
    pub fn variant_count(&self) -> usize {
        if self.enabled {
            self.variants.clamp(1, MAX_AUGMENT_VARIANTS)
        } else {
            0
        }
    }
}

/// Produces the perturbed copies of an image for ensembling
pub fn augment_variants(image: &DynamicImage, options: &AugmentOptions) -> Vec<DynamicImage> {
    let mut rng = options.rng();
    (0..options.variant_count())
        .map(|_| augment_image(image, &mut rng, options))
        .collect()
}

pub fn augment_image(image: &DynamicImage, rng: &mut StdRng, options: &AugmentOptions) -> DynamicImage {
    let brightness = if options.brightness_jitter > 0 {
        rng.random_range(-options.brightness_jitter..=options.brightness_jitter)
    } else {
        0
    };
    let contrast = jitter_range(rng, options.contrast_jitter);
    let saturation = 1.0 + jitter_range(rng, options.saturation_jitter);

    let adjusted = image.brighten(brightness).adjust_contrast(contrast);
    let mut rgb = adjusted.to_rgb8();
    adjust_saturation(&mut rgb, saturation);
    DynamicImage::ImageRgb8(rgb)
}

fn jitter_range(rng: &mut StdRng, range: f32) -> f32 {
    if range <= 0.0 {
        0.0
    } else {
        rng.random_range(-range..=range)
    }
}

fn adjust_saturation(image: &mut RgbImage, factor: f32) {
    for pixel in image.pixels_mut() {
        let [r, g, b] = pixel.0.map(|c| c as f32);
        let luma = 0.299 * r + 0.587 * g + 0.114 * b;
        pixel.0 = [r, g, b].map(|c| (luma + (c - luma) * factor).round().clamp(0.0, 255.0) as u8);
    }
}
