//! Channel-first volumetric image with physical metadata.

use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};
use serde::{Deserialize, Serialize};

use super::metadata::ImageMetadata;
use crate::error::{Result, TransformError};

/// What a volume's voxels mean.
///
/// Intensity transforms only touch `Intensity` volumes. Spatial transforms
/// touch both, but resample `Label` volumes with nearest-neighbour lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ImageKind {
    /// Scalar image such as an MRI.
    Intensity,
    /// Categorical label map.
    Label,
}

/// Volumetric image stored as a `[C, Z, Y, X]` tensor.
///
/// The spatial axes follow storage order `[z, y, x]` while the metadata is in
/// world order `(x, y, z)`; see [`crate::spatial::world_axis`].
///
/// # Examples
/// ```rust
/// use burn::tensor::Tensor;
/// use burn_ndarray::NdArray;
/// use mseg_core::image::{ImageKind, ImageMetadata, Volume};
///
/// type Backend = NdArray<f32>;
///
/// let device = Default::default();
/// let data = Tensor::<Backend, 3>::zeros([4, 5, 6], &device);
/// let volume = Volume::from_spatial(data, ImageKind::Intensity, ImageMetadata::default());
/// assert_eq!(volume.shape(), [1, 4, 5, 6]);
/// assert_eq!(volume.spatial_shape(), [4, 5, 6]);
/// ```
#[derive(Debug, Clone)]
pub struct Volume<B: Backend> {
    data: Tensor<B, 4>,
    kind: ImageKind,
    metadata: ImageMetadata<3>,
}

impl<B: Backend> Volume<B> {
    /// Create a volume from channel-first data.
    pub fn new(data: Tensor<B, 4>, kind: ImageKind, metadata: ImageMetadata<3>) -> Self {
        Self {
            data,
            kind,
            metadata,
        }
    }

    /// Create a single-channel volume from `[Z, Y, X]` data.
    pub fn from_spatial(data: Tensor<B, 3>, kind: ImageKind, metadata: ImageMetadata<3>) -> Self {
        let [d, h, w] = data.dims();
        Self::new(data.reshape([1, d, h, w]), kind, metadata)
    }

    /// Create a volume from row-major voxel values.
    pub fn from_voxels(
        values: Vec<f32>,
        shape: [usize; 4],
        kind: ImageKind,
        metadata: ImageMetadata<3>,
        device: &B::Device,
    ) -> Result<Self> {
        let expected: usize = shape.iter().product();
        if values.len() != expected {
            return Err(TransformError::ShapeMismatch {
                expected: shape.to_vec(),
                actual: vec![values.len()],
            });
        }
        let data = TensorData::new(values, shape).convert::<B::FloatElem>();
        Ok(Self::new(Tensor::from_data(data, device), kind, metadata))
    }

    /// Get the data tensor.
    pub fn data(&self) -> &Tensor<B, 4> {
        &self.data
    }

    /// Consume the volume and return its data tensor.
    pub fn into_data(self) -> Tensor<B, 4> {
        self.data
    }

    pub fn kind(&self) -> ImageKind {
        self.kind
    }

    pub fn is_label(&self) -> bool {
        self.kind == ImageKind::Label
    }

    pub fn metadata(&self) -> &ImageMetadata<3> {
        &self.metadata
    }

    /// Full `[C, Z, Y, X]` shape.
    pub fn shape(&self) -> [usize; 4] {
        self.data.dims()
    }

    /// Spatial `[Z, Y, X]` shape.
    pub fn spatial_shape(&self) -> [usize; 3] {
        let [_, d, h, w] = self.shape();
        [d, h, w]
    }

    pub fn num_channels(&self) -> usize {
        self.shape()[0]
    }

    /// Same kind and metadata, new voxels.
    pub fn with_data(self, data: Tensor<B, 4>) -> Self {
        Self { data, ..self }
    }

    /// Same kind, new voxels on a new grid.
    pub fn with_data_and_metadata(self, data: Tensor<B, 4>, metadata: ImageMetadata<3>) -> Self {
        Self {
            data,
            metadata,
            ..self
        }
    }

    /// Copy the voxels to host memory in row-major `[C, Z, Y, X]` order.
    pub fn voxels(&self) -> Result<Vec<f32>> {
        self.data
            .to_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .map_err(|e| TransformError::Data(format!("{:?}", e)))
    }
}
