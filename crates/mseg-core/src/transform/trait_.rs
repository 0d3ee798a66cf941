//! Transform trait for spatial coordinate mappings.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

/// Maps a batch of 3D coordinates to new coordinates.
///
/// Resampling uses transforms that take *output* voxel indices to *input*
/// voxel indices, both in world axis order `(x, y, z)`.
///
/// # Type Parameters
/// * `B` - The Burn backend
pub trait Transform<B: Backend> {
    /// Apply the transform to points of shape `[N, 3]`.
    fn transform_points(&self, points: Tensor<B, 2>) -> Tensor<B, 2>;
}
