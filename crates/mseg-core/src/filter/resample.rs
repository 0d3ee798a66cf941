//! Resample volume filter.
//!
//! Resamples a volume onto its own voxel grid through a transform that maps
//! output voxel indices to input voxel indices.

use std::marker::PhantomData;

use burn::tensor::backend::Backend;
use burn::tensor::{ElementConversion, Int, Tensor};

use crate::image::Volume;
use crate::interpolation::{sample, Interpolation};
use crate::transform::Transform;

/// Value written where the transform leaves the input field of view.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FillValue {
    Constant(f32),
    /// Minimum of the input volume.
    Minimum,
}

/// Resample volume filter.
///
/// Intensity volumes are read with `interpolation`; label volumes always use
/// nearest-neighbour and a zero fill so that class values survive. For
/// one-hot label maps the fill lands in the background channel.
pub struct ResampleFilter<B, T>
where
    B: Backend,
    T: Transform<B>,
{
    transform: T,
    interpolation: Interpolation,
    fill: FillValue,
    _phantom: PhantomData<B>,
}

impl<B, T> ResampleFilter<B, T>
where
    B: Backend,
    T: Transform<B>,
{
    pub fn new(transform: T) -> Self {
        Self {
            transform,
            interpolation: Interpolation::Linear,
            fill: FillValue::Minimum,
            _phantom: PhantomData,
        }
    }

    pub fn with_interpolation(mut self, interpolation: Interpolation) -> Self {
        self.interpolation = interpolation;
        self
    }

    pub fn with_fill(mut self, fill: FillValue) -> Self {
        self.fill = fill;
        self
    }

    /// Apply filter to an input volume. Shape and metadata are preserved.
    pub fn apply(&self, input: Volume<B>) -> Volume<B> {
        let [c, d, h, w] = input.shape();
        let device = input.data().device();

        let (mode, fill) = if input.is_label() {
            (Interpolation::Nearest, 0.0)
        } else {
            let fill = match self.fill {
                FillValue::Constant(v) => v,
                FillValue::Minimum => input.data().clone().min().into_scalar().elem::<f32>(),
            };
            (self.interpolation, fill)
        };

        let output_indices = grid_indices::<B>([d, h, w], &device);
        let input_indices = self.transform.transform_points(output_indices);
        let mut values = sample(input.data(), input_indices, mode, fill).reshape([c, d, h, w]);

        // One-hot label maps: voxels sampled from outside become background
        if input.is_label() && c > 1 {
            let foreground = values.clone().narrow(0, 1, c - 1);
            let background = foreground.clone().sum_dim(0).neg().add_scalar(1.0);
            values = Tensor::cat(vec![background, foreground], 0);
        }

        input.with_data(values)
    }
}

/// Continuous indices of every voxel of a `[Z, Y, X]` grid as `[N, 3]`
/// rows in `(x, y, z)` order, X fastest.
pub fn grid_indices<B: Backend>(size: [usize; 3], device: &B::Device) -> Tensor<B, 2> {
    let [d, h, w] = size;
    let n = d * h * w;

    let z_range = Tensor::<B, 1, Int>::arange(0..d as i64, device);
    let y_range = Tensor::<B, 1, Int>::arange(0..h as i64, device);
    let x_range = Tensor::<B, 1, Int>::arange(0..w as i64, device);

    let z_grid = z_range.reshape([d, 1, 1]).repeat(&[1, h, w]).reshape([n]).float();
    let y_grid = y_range.reshape([1, h, 1]).repeat(&[d, 1, w]).reshape([n]).float();
    let x_grid = x_range.reshape([1, 1, w]).repeat(&[d, h, 1]).reshape([n]).float();

    Tensor::cat(
        vec![
            x_grid.unsqueeze_dim(1),
            y_grid.unsqueeze_dim(1),
            z_grid.unsqueeze_dim(1),
        ],
        1,
    )
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::{ImageKind, ImageMetadata};
    use crate::transform::AffineTransform;
    use burn_ndarray::NdArray;
    use nalgebra::{Matrix4, Vector3};

    type Backend = NdArray<f32>;

    fn volume(kind: ImageKind) -> Volume<Backend> {
        let device = Default::default();
        let values: Vec<f32> = (0..27).map(|v| v as f32).collect();
        Volume::from_voxels(values, [1, 3, 3, 3], kind, ImageMetadata::default(), &device).unwrap()
    }

    #[test]
    fn test_grid_order() {
        let device = Default::default();
        let grid = grid_indices::<Backend>([2, 1, 3], &device).into_data();
        let values = grid.as_slice::<f32>().unwrap();
        assert_eq!(&values[0..3], &[0.0, 0.0, 0.0]);
        assert_eq!(&values[3..6], &[1.0, 0.0, 0.0]);
        assert_eq!(&values[9..12], &[0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_identity_preserves_volume() {
        let device = Default::default();
        let input = volume(ImageKind::Intensity);
        let expected = input.voxels().unwrap();
        let filter = ResampleFilter::new(AffineTransform::<Backend>::identity(&device));
        let output = filter.apply(input);
        let actual = output.voxels().unwrap();
        for (a, e) in actual.iter().zip(expected.iter()) {
            assert!((a - e).abs() < 1e-4);
        }
    }

    #[test]
    fn test_shift_fills_labels_with_zero() {
        let device = Default::default();
        let shift = Matrix4::new_translation(&Vector3::new(1.0, 0.0, 0.0));
        let transform = AffineTransform::<Backend>::from_homogeneous(&shift, &device);
        let output = ResampleFilter::new(transform).apply(volume(ImageKind::Label));
        let values = output.voxels().unwrap();
        // Output x = 2 reads input x = 3, which is outside
        assert_eq!(values[2], 0.0);
        assert_eq!(values[0], 1.0);
    }

    #[test]
    fn test_shift_fills_one_hot_background() {
        let device = Default::default();
        let volume = Volume::<Backend>::from_voxels(
            vec![1.0, 0.0, 1.0, 0.0, 1.0, 0.0],
            [2, 1, 1, 3],
            ImageKind::Label,
            ImageMetadata::default(),
            &device,
        )
        .unwrap();
        let shift = Matrix4::new_translation(&Vector3::new(1.0, 0.0, 0.0));
        let transform = AffineTransform::<Backend>::from_homogeneous(&shift, &device);
        let values = ResampleFilter::new(transform).apply(volume).voxels().unwrap();
        // Background channel first, then class 1
        assert_eq!(values, vec![0.0, 1.0, 1.0, 1.0, 0.0, 0.0]);
    }
}
