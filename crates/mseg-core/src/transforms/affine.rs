//! Random affine augmentation.

use burn::tensor::backend::Backend;
use nalgebra::Matrix4;
use rand::RngCore;

use super::{check_probability, should_apply, uniform, Result, SubjectTransform, TransformError};
use crate::filter::{FillValue, ResampleFilter};
use crate::image::ImageMetadata;
use crate::interpolation::Interpolation;
use crate::subject::Subject;
use crate::transform::{centered_affine, AffineTransform};

/// Random scaling, rotation and translation about the volume centre.
///
/// Per axis: scale `U(1 - scales, 1 + scales)`, rotation
/// `U(-degrees, degrees)` and translation `U(-translation, translation)`
/// voxels. Intensities are resampled trilinearly with the volume minimum
/// as fill; labels with nearest neighbour and a zero fill.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RandomAffine {
    scales: f64,
    degrees: f64,
    translation: f64,
    p: f64,
}

impl RandomAffine {
    pub fn new() -> Self {
        Self {
            scales: 0.1,
            degrees: 10.0,
            translation: 0.0,
            p: 1.0,
        }
    }

    pub fn with_scales(mut self, scales: f64) -> Self {
        self.scales = scales;
        self
    }

    pub fn with_degrees(mut self, degrees: f64) -> Self {
        self.degrees = degrees;
        self
    }

    pub fn with_translation(mut self, translation: f64) -> Self {
        self.translation = translation;
        self
    }

    pub fn with_probability(mut self, p: f64) -> Self {
        self.p = p;
        self
    }

    fn validate(&self) -> Result<()> {
        check_probability(self.p)?;
        if !(0.0..1.0).contains(&self.scales) {
            return Err(TransformError::invalid_parameter(format!(
                "scales must lie in [0, 1), got {}",
                self.scales
            )));
        }
        if self.degrees < 0.0 || self.translation < 0.0 {
            return Err(TransformError::invalid_parameter(
                "degrees and translation must be non-negative",
            ));
        }
        Ok(())
    }
}

impl Default for RandomAffine {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: Backend> SubjectTransform<B> for RandomAffine {
    fn name(&self) -> &'static str {
        "RandomAffine"
    }

    fn apply(&self, subject: Subject<B>, rng: &mut dyn RngCore) -> Result<Subject<B>> {
        self.validate()?;
        if !should_apply(rng, self.p) {
            return Ok(subject);
        }

        let scales = [(); 3].map(|_| uniform(&mut *rng, 1.0 - self.scales, 1.0 + self.scales));
        let degrees = [(); 3].map(|_| uniform(&mut *rng, -self.degrees, self.degrees));
        let translation = [(); 3].map(|_| uniform(&mut *rng, -self.translation, self.translation));
        tracing::trace!(?scales, ?degrees, ?translation, subject = subject.id(), "random affine");

        subject.map_volumes(|_, volume| {
            let device = volume.data().device();
            let matrix = voxel_affine(volume.metadata(), volume.spatial_shape(), degrees, scales, translation);
            let transform = AffineTransform::from_homogeneous(&matrix, &device);
            Ok(ResampleFilter::new(transform)
                .with_interpolation(Interpolation::Linear)
                .with_fill(FillValue::Minimum)
                .apply(volume))
        })
    }
}

/// Homogeneous matrix mapping output voxel indices to input voxel indices
/// for a rotation/scaling about the grid centre.
///
/// `translation` is in voxels and is converted to physical units with the
/// grid spacing, so rotations stay rigid on anisotropic grids.
pub(crate) fn voxel_affine(
    metadata: &ImageMetadata<3>,
    spatial_shape: [usize; 3],
    degrees: [f64; 3],
    scales: [f64; 3],
    translation: [f64; 3],
) -> Matrix4<f64> {
    let center = metadata.center(spatial_shape).to_array();
    let spacing = metadata.spacing();
    let shift = [0, 1, 2].map(|i| translation[i] * spacing[i]);
    let physical = centered_affine(degrees, scales, shift, center);
    metadata.physical_to_index_matrix() * physical * metadata.index_to_physical_matrix()
}
