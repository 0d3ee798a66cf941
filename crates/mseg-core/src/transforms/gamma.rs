use burn::tensor::backend::Backend;
use rand::RngCore;

use super::{check_probability, should_apply, uniform, Result, SubjectTransform};
use crate::subject::Subject;

/// Random gamma change: `x ↦ sign(x) |x|^γ` with `γ = exp(U(-log_gamma, log_gamma))`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RandomGamma {
    log_gamma: f64,
    p: f64,
}

impl RandomGamma {
    pub fn new() -> Self {
        Self {
            log_gamma: 0.3,
            p: 0.5,
        }
    }

    pub fn with_log_gamma(mut self, log_gamma: f64) -> Self {
        self.log_gamma = log_gamma;
        self
    }

    pub fn with_probability(mut self, p: f64) -> Self {
        self.p = p;
        self
    }
}

impl Default for RandomGamma {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: Backend> SubjectTransform<B> for RandomGamma {
    fn name(&self) -> &'static str {
        "RandomGamma"
    }

    fn apply(&self, subject: Subject<B>, rng: &mut dyn RngCore) -> Result<Subject<B>> {
        check_probability(self.p)?;
        if !should_apply(rng, self.p) {
            return Ok(subject);
        }
        let bound = self.log_gamma.abs();
        let gamma = uniform(rng, -bound, bound).exp();

        subject.map_volumes(|_, volume| {
            if volume.is_label() {
                return Ok(volume);
            }
            let data = volume.data().clone();
            let powered = data.clone().sign() * data.abs().powf_scalar(gamma as f32);
            Ok(volume.with_data(powered))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::{ImageKind, ImageMetadata, Volume};
    use crate::subject::{IMAGE, LABEL};
    use crate::transforms::test_util::{rng, subject, TestBackend};

    #[test]
    fn test_probability_zero_is_identity() {
        let input = subject([3, 4, 5]);
        let expected = input.get(IMAGE).unwrap().voxels().unwrap();
        let out = RandomGamma::new().with_probability(0.0).apply(input, &mut rng(0)).unwrap();
        assert_eq!(out.get(IMAGE).unwrap().voxels().unwrap(), expected);
    }

    #[test]
    fn test_preserves_sign_and_shape() {
        let device = Default::default();
        let volume = Volume::<TestBackend>::from_voxels(
            vec![-0.5, 0.0, 0.25, 1.0],
            [1, 1, 2, 2],
            ImageKind::Intensity,
            ImageMetadata::default(),
            &device,
        )
        .unwrap();
        let input = Subject::new("g").with_image(IMAGE, volume);
        let out = RandomGamma::new()
            .with_probability(1.0)
            .apply(input, &mut rng(9))
            .unwrap();
        let image = out.get(IMAGE).unwrap();
        assert_eq!(image.shape(), [1, 1, 2, 2]);
        let values = image.voxels().unwrap();
        assert!(values[0] < 0.0);
        assert_eq!(values[1], 0.0);
        assert!(values[2] > 0.0);
        assert!((values[3] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_leaves_labels() {
        let input = subject([2, 2, 2]);
        let expected = input.get(LABEL).unwrap().voxels().unwrap();
        let out = RandomGamma::new().with_probability(1.0).apply(input, &mut rng(1)).unwrap();
        assert_eq!(out.get(LABEL).unwrap().voxels().unwrap(), expected);
    }
}
