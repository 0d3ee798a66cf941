use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};
use rand::RngCore;
use rand_distr::{Distribution, Normal};

use super::{check_probability, should_apply, uniform, Result, SubjectTransform, TransformError};
use crate::subject::Subject;

/// Additive Gaussian noise with `std ~ U(std.0, std.1)`.
///
/// Samples are drawn on the host from the pipeline RNG so seeded runs are
/// reproducible on every backend.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RandomNoise {
    mean: f64,
    std: (f64, f64),
    p: f64,
}

impl RandomNoise {
    pub fn new() -> Self {
        Self {
            mean: 0.0,
            std: (0.0, 0.25),
            p: 0.5,
        }
    }

    pub fn with_mean(mut self, mean: f64) -> Self {
        self.mean = mean;
        self
    }

    pub fn with_std(mut self, low: f64, high: f64) -> Self {
        self.std = (low, high);
        self
    }

    pub fn with_probability(mut self, p: f64) -> Self {
        self.p = p;
        self
    }
}

impl Default for RandomNoise {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: Backend> SubjectTransform<B> for RandomNoise {
    fn name(&self) -> &'static str {
        "RandomNoise"
    }

    fn apply(&self, subject: Subject<B>, rng: &mut dyn RngCore) -> Result<Subject<B>> {
        check_probability(self.p)?;
        let (low, high) = self.std;
        if low < 0.0 || high < low {
            return Err(TransformError::invalid_parameter(format!(
                "noise std range must satisfy 0 <= low <= high, got ({}, {})",
                low, high
            )));
        }
        if !should_apply(rng, self.p) {
            return Ok(subject);
        }

        let std = uniform(rng, low, high);
        let normal = Normal::new(self.mean as f32, std as f32)
            .map_err(|e| TransformError::invalid_parameter(e.to_string()))?;

        subject.map_volumes(|_, volume| {
            if volume.is_label() {
                return Ok(volume);
            }
            let shape = volume.shape();
            let n: usize = shape.iter().product();
            let samples: Vec<f32> = (0..n).map(|_| normal.sample(&mut *rng)).collect();
            let noise = Tensor::<B, 4>::from_data(
                TensorData::new(samples, shape).convert::<B::FloatElem>(),
                &volume.data().device(),
            );
            let noisy = volume.data().clone() + noise;
            Ok(volume.with_data(noisy))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subject::{IMAGE, LABEL};
    use crate::transforms::test_util::{rng, subject};

    #[test]
    fn test_probability_zero_is_identity() {
        let input = subject([3, 4, 5]);
        let expected = input.get(IMAGE).unwrap().voxels().unwrap();
        let out = RandomNoise::new().with_probability(0.0).apply(input, &mut rng(0)).unwrap();
        assert_eq!(out.get(IMAGE).unwrap().voxels().unwrap(), expected);
    }

    #[test]
    fn test_noise_changes_image_not_label() {
        let input = subject([4, 4, 4]);
        let image = input.get(IMAGE).unwrap().voxels().unwrap();
        let label = input.get(LABEL).unwrap().voxels().unwrap();
        let out = RandomNoise::new()
            .with_std(0.5, 1.0)
            .with_probability(1.0)
            .apply(input, &mut rng(2))
            .unwrap();
        let noisy = out.get(IMAGE).unwrap();
        assert_eq!(noisy.shape(), [1, 4, 4, 4]);
        assert_ne!(noisy.voxels().unwrap(), image);
        assert_eq!(out.get(LABEL).unwrap().voxels().unwrap(), label);
    }

    #[test]
    fn test_seeded_noise_is_reproducible() {
        let transform = RandomNoise::new().with_probability(1.0);
        let a = transform.apply(subject([2, 3, 4]), &mut rng(7)).unwrap();
        let b = transform.apply(subject([2, 3, 4]), &mut rng(7)).unwrap();
        assert_eq!(
            a.get(IMAGE).unwrap().voxels().unwrap(),
            b.get(IMAGE).unwrap().voxels().unwrap()
        );
    }

    #[test]
    fn test_rejects_negative_std() {
        let result = RandomNoise::new().with_std(-1.0, 0.5).apply(subject([2, 2, 2]), &mut rng(0));
        assert!(result.is_err());
    }
}
