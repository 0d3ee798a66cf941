//! Subject transforms: preprocessing and data augmentation.
//!
//! Every transform consumes a [`Subject`] and returns a new one. Intensity
//! transforms only touch [`ImageKind::Intensity`](crate::image::ImageKind)
//! volumes; spatial transforms move every volume of the subject together.
//!
//! Stochastic transforms draw all their randomness from the RNG passed to
//! [`SubjectTransform::apply`], so a seeded RNG reproduces the same output.

pub mod affine;
pub mod bias_field;
pub mod compose;
pub mod crop_pad;
pub mod gamma;
pub mod motion;
pub mod noise;
pub mod one_hot;
pub mod rescale;

pub use affine::RandomAffine;
pub use bias_field::RandomBiasField;
pub use compose::Compose;
pub use crop_pad::{CropOrPad, EnsureShapeMultiple};
pub use gamma::RandomGamma;
pub use motion::RandomMotion;
pub use noise::RandomNoise;
pub use one_hot::OneHot;
pub use rescale::RescaleIntensity;

pub use crate::error::{Result, TransformError};

use burn::tensor::backend::Backend;
use rand::{Rng, RngCore};

use crate::subject::Subject;

/// A step of a transform pipeline.
pub trait SubjectTransform<B: Backend>: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Transform `subject`, drawing any random parameters from `rng`.
    fn apply(&self, subject: Subject<B>, rng: &mut dyn RngCore) -> Result<Subject<B>>;
}

/// Bernoulli draw deciding whether a transform with probability `p` fires.
pub(crate) fn should_apply(rng: &mut dyn RngCore, p: f64) -> bool {
    rng.gen::<f64>() < p
}

/// Sample from `U(low, high)`; a degenerate range returns `low`.
pub(crate) fn uniform(rng: &mut dyn RngCore, low: f64, high: f64) -> f64 {
    if high > low {
        rng.gen_range(low..high)
    } else {
        low
    }
}

pub(crate) fn check_probability(p: f64) -> Result<()> {
    if (0.0..=1.0).contains(&p) {
        Ok(())
    } else {
        Err(TransformError::invalid_parameter(format!(
            "probability must lie in [0, 1], got {}",
            p
        )))
    }
}

#[cfg(test)]
pub(crate) mod test_util {
    use burn_ndarray::NdArray;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use crate::image::{ImageKind, ImageMetadata, Volume};
    use crate::subject::{Subject, IMAGE, LABEL};

    pub type TestBackend = NdArray<f32>;

    pub fn rng(seed: u64) -> StdRng {
        StdRng::seed_from_u64(seed)
    }

    /// Intensity ramp plus a label map with classes 0, 1 and 2.
    pub fn subject(shape: [usize; 3]) -> Subject<TestBackend> {
        let device = <TestBackend as burn::tensor::backend::Backend>::Device::default();
        let n: usize = shape.iter().product();
        let image: Vec<f32> = (0..n).map(|i| (i % 17) as f32 * 3.0 + 10.0).collect();
        let label: Vec<f32> = (0..n).map(|i| (i % 3) as f32).collect();
        let [d, h, w] = shape;
        let metadata = ImageMetadata::default();
        Subject::new("hippocampus_001")
            .with_image(
                IMAGE,
                Volume::from_voxels(image, [1, d, h, w], ImageKind::Intensity, metadata, &device)
                    .unwrap(),
            )
            .with_image(
                LABEL,
                Volume::from_voxels(label, [1, d, h, w], ImageKind::Label, metadata, &device).unwrap(),
            )
    }
}
