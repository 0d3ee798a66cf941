//! Interpolation of volumes at continuous voxel positions.

pub mod sample;

pub use sample::{sample, Interpolation};
