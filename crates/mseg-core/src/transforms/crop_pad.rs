//! Spatial cropping and padding.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use rand::RngCore;

use super::{Result, SubjectTransform, TransformError};
use crate::image::Volume;
use crate::spatial::world_axis;
use crate::subject::Subject;

/// Crop or zero-pad every volume to a fixed `[Z, Y, X]` shape.
///
/// Along each axis the difference `target - size` is split with the larger
/// half at the start. The origin moves so that kept voxels stay at the same
/// physical position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropOrPad {
    target: [usize; 3],
}

impl CropOrPad {
    pub fn new(target: [usize; 3]) -> Self {
        Self { target }
    }

    pub fn target(&self) -> [usize; 3] {
        self.target
    }
}

impl<B: Backend> SubjectTransform<B> for CropOrPad {
    fn name(&self) -> &'static str {
        "CropOrPad"
    }

    fn apply(&self, subject: Subject<B>, _rng: &mut dyn RngCore) -> Result<Subject<B>> {
        if self.target.contains(&0) {
            return Err(TransformError::invalid_parameter(format!(
                "target shape must be positive, got {:?}",
                self.target
            )));
        }
        subject.map_volumes(|_, volume| Ok(crop_or_pad(volume, self.target)))
    }
}

/// Pad every axis up to the next multiple of `multiple`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnsureShapeMultiple {
    multiple: usize,
}

impl EnsureShapeMultiple {
    pub fn new(multiple: usize) -> Self {
        Self { multiple }
    }
}

impl Default for EnsureShapeMultiple {
    fn default() -> Self {
        Self::new(8)
    }
}

impl<B: Backend> SubjectTransform<B> for EnsureShapeMultiple {
    fn name(&self) -> &'static str {
        "EnsureShapeMultiple"
    }

    fn apply(&self, subject: Subject<B>, _rng: &mut dyn RngCore) -> Result<Subject<B>> {
        if self.multiple == 0 {
            return Err(TransformError::invalid_parameter("multiple must be positive"));
        }
        let m = self.multiple;
        subject.map_volumes(|_, volume| {
            let target = volume.spatial_shape().map(|n| n.div_ceil(m) * m);
            Ok(crop_or_pad(volume, target))
        })
    }
}

/// Resize `volume` to `target` spatial shape by symmetric crop / zero pad.
pub fn crop_or_pad<B: Backend>(volume: Volume<B>, target: [usize; 3]) -> Volume<B> {
    let spatial = volume.spatial_shape();
    if spatial == target {
        return volume;
    }

    let mut data = volume.data().clone();
    let mut offset = [0.0f64; 3];
    for axis in 0..3 {
        let (resized, start) = resize_axis(data, axis + 1, target[axis]);
        data = resized;
        offset[world_axis(axis)] = start as f64;
    }

    let metadata = volume.metadata().shifted(offset);
    volume.with_data_and_metadata(data, metadata)
}

/// Crop or pad `dim` of `data` to `target`; returns the new data and the
/// index of the old grid that became the first voxel.
fn resize_axis<B: Backend>(data: Tensor<B, 4>, dim: usize, target: usize) -> (Tensor<B, 4>, isize) {
    let size = data.dims()[dim];
    if size == target {
        return (data, 0);
    }

    if size > target {
        let start = (size - target).div_ceil(2);
        (data.narrow(dim, start, target), start as isize)
    } else {
        let before = (target - size).div_ceil(2);
        let after = target - size - before;
        let device = data.device();

        let mut parts = Vec::with_capacity(3);
        let mut pad_shape = data.dims();
        if before > 0 {
            pad_shape[dim] = before;
            parts.push(Tensor::zeros(pad_shape, &device));
        }
        parts.push(data);
        if after > 0 {
            pad_shape[dim] = after;
            parts.push(Tensor::zeros(pad_shape, &device));
        }
        (Tensor::cat(parts, dim), -(before as isize))
    }
}
