//! Affine coordinate transform.
//!
//! `T(x) = A x + t`, evaluated on tensors so a whole sampling grid is mapped
//! in one matmul. Parameters are usually composed on the host with nalgebra
//! (rotations, scales, index/physical conversions) and uploaded once.

use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};
use nalgebra::{Matrix3, Matrix4, Rotation3, Vector3};

use super::trait_::Transform;

/// Affine transform on `[N, 3]` point batches.
#[derive(Debug, Clone)]
pub struct AffineTransform<B: Backend> {
    matrix: Tensor<B, 2>,      // [3, 3]
    translation: Tensor<B, 1>, // [3]
}

impl<B: Backend> AffineTransform<B> {
    /// Create from a `[3, 3]` matrix and a `[3]` translation.
    pub fn new(matrix: Tensor<B, 2>, translation: Tensor<B, 1>) -> Self {
        Self {
            matrix,
            translation,
        }
    }

    /// Upload a homogeneous 4×4 matrix.
    pub fn from_homogeneous(m: &Matrix4<f64>, device: &B::Device) -> Self {
        let mut values = Vec::with_capacity(9);
        for r in 0..3 {
            for c in 0..3 {
                values.push(m[(r, c)] as f32);
            }
        }
        let matrix = Tensor::<B, 2>::from_data(
            TensorData::new(values, [3, 3]).convert::<B::FloatElem>(),
            device,
        );
        let t = [m[(0, 3)] as f32, m[(1, 3)] as f32, m[(2, 3)] as f32];
        let translation =
            Tensor::<B, 1>::from_data(TensorData::new(t.to_vec(), [3]).convert::<B::FloatElem>(), device);
        Self::new(matrix, translation)
    }

    /// Identity transform.
    pub fn identity(device: &B::Device) -> Self {
        Self::from_homogeneous(&Matrix4::identity(), device)
    }

    pub fn matrix(&self) -> Tensor<B, 2> {
        self.matrix.clone()
    }

    pub fn translation(&self) -> Tensor<B, 1> {
        self.translation.clone()
    }
}

impl<B: Backend> Transform<B> for AffineTransform<B> {
    fn transform_points(&self, points: Tensor<B, 2>) -> Tensor<B, 2> {
        // Row vectors: y = x A^T + t
        let t = self.translation.clone().reshape([1, 3]);
        points.matmul(self.matrix.clone().transpose()) + t
    }
}

/// Rotation about the x, y and z axes (degrees), applied in that order.
pub fn euler_rotation(degrees: [f64; 3]) -> Matrix3<f64> {
    let [rx, ry, rz] = degrees.map(f64::to_radians);
    *Rotation3::from_euler_angles(rx, ry, rz).matrix()
}

/// Homogeneous matrix of `x ↦ R S (x - c) + c + t`.
///
/// `R` is the Euler rotation, `S` the per-axis scaling, `c` the centre and
/// `t` the translation, all in physical units.
pub fn centered_affine(
    degrees: [f64; 3],
    scales: [f64; 3],
    translation: [f64; 3],
    center: [f64; 3],
) -> Matrix4<f64> {
    let linear = euler_rotation(degrees) * Matrix3::from_diagonal(&Vector3::from(scales));
    let c = Vector3::from(center);
    let offset = c - linear * c + Vector3::from(translation);
    let mut m = Matrix4::identity();
    m.fixed_view_mut::<3, 3>(0, 0).copy_from(&linear);
    m.fixed_view_mut::<3, 1>(0, 3).copy_from(&offset);
    m
}
