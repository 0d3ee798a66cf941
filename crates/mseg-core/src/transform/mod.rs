//! Spatial coordinate transforms used for resampling.

pub mod trait_;
pub mod affine;

pub use trait_::Transform;
pub use affine::{centered_affine, euler_rotation, AffineTransform};
