//! Linear intensity rescaling.

use burn::tensor::backend::Backend;
use burn::tensor::ElementConversion;
use rand::RngCore;

use super::{Result, SubjectTransform, TransformError};
use crate::subject::Subject;

/// Map each intensity volume linearly from its `[min, max]` onto
/// `[out_min, out_max]`.
///
/// A constant volume maps to `out_min`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RescaleIntensity {
    out_min: f32,
    out_max: f32,
}

impl RescaleIntensity {
    pub fn new(out_min: f32, out_max: f32) -> Self {
        Self { out_min, out_max }
    }

    pub fn range(&self) -> (f32, f32) {
        (self.out_min, self.out_max)
    }
}

impl Default for RescaleIntensity {
    fn default() -> Self {
        Self::new(-1.0, 1.0)
    }
}

impl<B: Backend> SubjectTransform<B> for RescaleIntensity {
    fn name(&self) -> &'static str {
        "RescaleIntensity"
    }

    fn apply(&self, subject: Subject<B>, _rng: &mut dyn RngCore) -> Result<Subject<B>> {
        if !(self.out_min < self.out_max) {
            return Err(TransformError::invalid_parameter(format!(
                "output range must be increasing, got ({}, {})",
                self.out_min, self.out_max
            )));
        }

        subject.map_volumes(|_, volume| {
            if volume.is_label() {
                return Ok(volume);
            }
            let data = volume.data().clone();
            let min = data.clone().min().into_scalar().elem::<f32>();
            let max = data.clone().max().into_scalar().elem::<f32>();
            let range = max - min;

            let rescaled = if range <= f32::EPSILON * max.abs().max(1.0) {
                data.zeros_like().add_scalar(self.out_min)
            } else {
                let scale = (self.out_max - self.out_min) / range;
                data.sub_scalar(min)
                    .mul_scalar(scale)
                    .add_scalar(self.out_min)
                    .clamp(self.out_min, self.out_max)
            };
            Ok(volume.with_data(rescaled))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::{ImageKind, ImageMetadata, Volume};
    use crate::subject::{IMAGE, LABEL};
    use crate::transforms::test_util::{rng, subject, TestBackend};
    use proptest::prelude::*;

    #[test]
    fn test_rescale_hits_bounds() {
        let output = RescaleIntensity::default()
            .apply(subject([3, 4, 5]), &mut rng(0))
            .unwrap();
        let values = output.get(IMAGE).unwrap().voxels().unwrap();
        let min = values.iter().cloned().fold(f32::INFINITY, f32::min);
        let max = values.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
        assert!((min + 1.0).abs() < 1e-6);
        assert!((max - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_rescale_leaves_labels() {
        let input = subject([3, 4, 5]);
        let expected = input.get(LABEL).unwrap().voxels().unwrap();
        let output = RescaleIntensity::default().apply(input, &mut rng(0)).unwrap();
        assert_eq!(output.get(LABEL).unwrap().voxels().unwrap(), expected);
    }

    #[test]
    fn test_constant_volume_maps_to_min() {
        let device = Default::default();
        let volume = Volume::<TestBackend>::from_voxels(
            vec![42.0; 8],
            [1, 2, 2, 2],
            ImageKind::Intensity,
            ImageMetadata::default(),
            &device,
        )
        .unwrap();
        let input = Subject::new("flat").with_image(IMAGE, volume);
        let output = RescaleIntensity::new(0.0, 1.0).apply(input, &mut rng(0)).unwrap();
        assert!(output.get(IMAGE).unwrap().voxels().unwrap().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_rejects_inverted_range() {
        let result = RescaleIntensity::new(1.0, -1.0).apply(subject([2, 2, 2]), &mut rng(0));
        assert!(matches!(result, Err(TransformError::InvalidParameter(_))));
    }

    proptest! {
        #[test]
        fn prop_output_within_range(
            values in prop::collection::vec(-1.0e4f32..1.0e4, 8),
            low in -10.0f32..0.0,
            width in 0.1f32..10.0,
        ) {
            let device = Default::default();
            let volume = Volume::<TestBackend>::from_voxels(
                values,
                [1, 2, 2, 2],
                ImageKind::Intensity,
                ImageMetadata::default(),
                &device,
            )
            .unwrap();
            let input = Subject::new("p").with_image(IMAGE, volume);
            let output = RescaleIntensity::new(low, low + width).apply(input, &mut rng(1)).unwrap();
            for v in output.get(IMAGE).unwrap().voxels().unwrap() {
                prop_assert!(v >= low && v <= low + width);
            }
        }
    }
}
