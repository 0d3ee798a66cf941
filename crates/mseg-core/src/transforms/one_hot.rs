//! One-hot encoding of label maps.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use rand::RngCore;

use super::{Result, SubjectTransform, TransformError};
use crate::subject::Subject;

/// Expand each `[1, Z, Y, X]` label volume into `[K, Z, Y, X]` binary masks.
///
/// With `num_classes = None`, `K` is the largest label value plus one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OneHot {
    num_classes: Option<usize>,
}

impl OneHot {
    pub fn new(num_classes: Option<usize>) -> Self {
        Self { num_classes }
    }

    pub fn with_num_classes(num_classes: usize) -> Self {
        Self::new(Some(num_classes))
    }
}

impl<B: Backend> SubjectTransform<B> for OneHot {
    fn name(&self) -> &'static str {
        "OneHot"
    }

    fn apply(&self, subject: Subject<B>, _rng: &mut dyn RngCore) -> Result<Subject<B>> {
        subject.map_volumes(|_, volume| {
            if !volume.is_label() {
                return Ok(volume);
            }
            let [c, d, h, w] = volume.shape();
            if c != 1 {
                return Err(TransformError::ShapeMismatch {
                    expected: vec![1, d, h, w],
                    actual: vec![c, d, h, w],
                });
            }

            let values = volume.voxels()?;
            let num_classes = match self.num_classes {
                Some(k) => k,
                None => values.iter().cloned().fold(0.0f32, f32::max) as usize + 1,
            };
            if let Some(&bad) = values
                .iter()
                .find(|&&v| v.fract() != 0.0 || v < 0.0 || v >= num_classes as f32)
            {
                return Err(TransformError::InvalidLabel {
                    value: bad,
                    num_classes,
                });
            }

            let data = volume.data().clone();
            let masks: Vec<Tensor<B, 4>> = (0..num_classes)
                .map(|k| data.clone().equal_elem(k as f32).float())
                .collect();
            Ok(volume.with_data(Tensor::cat(masks, 0)))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::{ImageKind, ImageMetadata, Volume};
    use crate::subject::{IMAGE, LABEL};
    use crate::transforms::test_util::{rng, subject, TestBackend};

    fn label_subject(values: Vec<f32>) -> Subject<TestBackend> {
        let device = Default::default();
        let n = values.len();
        let volume =
            Volume::from_voxels(values, [1, 1, 1, n], ImageKind::Label, ImageMetadata::default(), &device)
                .unwrap();
        Subject::new("s").with_image(LABEL, volume)
    }

    #[test]
    fn test_channels_sum_to_one() {
        let out = OneHot::with_num_classes(3)
            .apply(subject([2, 3, 4]), &mut rng(0))
            .unwrap();
        let label = out.get(LABEL).unwrap();
        assert_eq!(label.shape(), [3, 2, 3, 4]);

        let sums = label.data().clone().sum_dim(0).into_data();
        assert!(sums.as_slice::<f32>().unwrap().iter().all(|&s| s == 1.0));

        let values = label.voxels().unwrap();
        assert!(values.iter().all(|&v| v == 0.0 || v == 1.0));
    }

    #[test]
    fn test_mask_positions() {
        let out = OneHot::with_num_classes(3)
            .apply(label_subject(vec![0.0, 2.0, 1.0]), &mut rng(0))
            .unwrap();
        let values = out.get(LABEL).unwrap().voxels().unwrap();
        assert_eq!(values, vec![1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_infers_num_classes() {
        let out = OneHot::default()
            .apply(label_subject(vec![0.0, 4.0]), &mut rng(0))
            .unwrap();
        assert_eq!(out.get(LABEL).unwrap().num_channels(), 5);
    }

    #[test]
    fn test_rejects_out_of_range_label() {
        let result = OneHot::with_num_classes(2).apply(label_subject(vec![0.0, 2.0]), &mut rng(0));
        assert!(matches!(result, Err(TransformError::InvalidLabel { num_classes: 2, .. })));
    }

    #[test]
    fn test_rejects_fractional_label() {
        let result = OneHot::with_num_classes(3).apply(label_subject(vec![0.5]), &mut rng(0));
        assert!(matches!(result, Err(TransformError::InvalidLabel { .. })));
    }

    #[test]
    fn test_leaves_intensity() {
        let input = subject([2, 2, 2]);
        let expected = input.get(IMAGE).unwrap().shape();
        let out = OneHot::with_num_classes(3).apply(input, &mut rng(0)).unwrap();
        assert_eq!(out.get(IMAGE).unwrap().shape(), expected);
    }
}
