//! Stack subjects into network batches.

use burn::tensor::backend::{AutodiffBackend, Backend};
use burn::tensor::Tensor;
use mseg_core::{ImageMetadata, Subject, IMAGE, LABEL};

use crate::error::{Result, SegmentationError};

/// A batch of subjects.
#[derive(Debug, Clone)]
pub struct SegmentationBatch<B: Backend> {
    /// `[N, C, D, H, W]` intensities.
    pub images: Tensor<B, 5>,
    /// `[N, K, D, H, W]` one-hot labels, absent for unlabeled subjects.
    pub labels: Option<Tensor<B, 5>>,
    pub ids: Vec<String>,
    /// Grid of each image after preprocessing.
    pub metadata: Vec<ImageMetadata<3>>,
}

impl<B: Backend> SegmentationBatch<B> {
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl<B: AutodiffBackend> SegmentationBatch<B> {
    /// The same batch on the inner backend, detached from the graph.
    pub fn inner(self) -> SegmentationBatch<B::InnerBackend> {
        SegmentationBatch {
            images: self.images.inner(),
            labels: self.labels.map(Tensor::inner),
            ids: self.ids,
            metadata: self.metadata,
        }
    }
}

/// Stacks the `image` and `label` roles of subjects along a new batch axis.
#[derive(Debug, Clone, Copy, Default)]
pub struct SegmentationBatcher;

impl SegmentationBatcher {
    pub fn new() -> Self {
        Self
    }

    /// All subjects must share one shape and either all or none carry a label.
    pub fn batch<B: Backend>(&self, subjects: Vec<Subject<B>>) -> Result<SegmentationBatch<B>> {
        if subjects.is_empty() {
            return Err(SegmentationError::empty_dataset("cannot batch zero subjects"));
        }

        let mut images = Vec::with_capacity(subjects.len());
        let mut labels = Vec::with_capacity(subjects.len());
        let mut ids = Vec::with_capacity(subjects.len());
        let mut metadata = Vec::with_capacity(subjects.len());
        let mut expected_image: Option<[usize; 4]> = None;
        let mut expected_label: Option<[usize; 4]> = None;

        for mut subject in subjects {
            let image = subject.take(IMAGE)?;
            check_shape(&mut expected_image, image.shape())?;
            metadata.push(*image.metadata());
            images.push(image.into_data().unsqueeze_dim::<5>(0));

            if let Some(label) = subject.get(LABEL) {
                check_shape(&mut expected_label, label.shape())?;
                labels.push(label.data().clone().unsqueeze_dim::<5>(0));
            }
            ids.push(subject.id().to_string());
        }

        let labels = match labels.len() {
            0 => None,
            n if n == ids.len() => Some(Tensor::cat(labels, 0)),
            _ => {
                return Err(SegmentationError::invalid_configuration(
                    "batch mixes labeled and unlabeled subjects",
                ))
            }
        };

        Ok(SegmentationBatch {
            images: Tensor::cat(images, 0),
            labels,
            ids,
            metadata,
        })
    }
}

fn check_shape(expected: &mut Option<[usize; 4]>, actual: [usize; 4]) -> Result<()> {
    match expected {
        Some(shape) if *shape != actual => Err(SegmentationError::ShapeMismatch {
            expected: shape.to_vec(),
            actual: actual.to_vec(),
        }),
        Some(_) => Ok(()),
        None => {
            *expected = Some(actual);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;
    use mseg_core::{ImageKind, Volume};

    type TestBackend = NdArray<f32>;

    fn subject(id: &str, shape: [usize; 3], labeled: bool) -> Subject<TestBackend> {
        let device = Default::default();
        let [d, h, w] = shape;
        let image = Volume::new(
            Tensor::zeros([1, d, h, w], &device),
            ImageKind::Intensity,
            ImageMetadata::default(),
        );
        let subject = Subject::new(id).with_image(IMAGE, image);
        if labeled {
            let label = Volume::new(Tensor::zeros([3, d, h, w], &device), ImageKind::Label, ImageMetadata::default());
            subject.with_image(LABEL, label)
        } else {
            subject
        }
    }

    #[test]
    fn test_batch_shapes() {
        let batch = SegmentationBatcher::new()
            .batch(vec![subject("a", [8, 8, 8], true), subject("b", [8, 8, 8], true)])
            .unwrap();
        assert_eq!(batch.images.dims(), [2, 1, 8, 8, 8]);
        assert_eq!(batch.labels.unwrap().dims(), [2, 3, 8, 8, 8]);
        assert_eq!(batch.ids, vec!["a", "b"]);
        assert_eq!(batch.metadata.len(), 2);
    }

    #[test]
    fn test_unlabeled_batch() {
        let batch = SegmentationBatcher::new()
            .batch(vec![subject("t", [8, 8, 16], false)])
            .unwrap();
        assert!(batch.labels.is_none());
    }

    #[test]
    fn test_shape_mismatch() {
        let result = SegmentationBatcher::new().batch(vec![subject("a", [8, 8, 8], true), subject("b", [8, 8, 16], true)]);
        assert!(matches!(result, Err(SegmentationError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_mixed_labels_rejected() {
        let result = SegmentationBatcher::new().batch(vec![subject("a", [8, 8, 8], true), subject("b", [8, 8, 8], false)]);
        assert!(matches!(result, Err(SegmentationError::InvalidConfiguration(_))));
    }
}
