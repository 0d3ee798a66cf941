//! Spatial types for physical positions, voxel spacing and axis orientation.
//!
//! Everything here is expressed in the NIfTI/world axis order `(x, y, z)`.
//! Volumes store voxels as `[z, y, x]`, so storage axis `a` of a spatial
//! shape corresponds to world axis `2 - a`.

pub mod point;
pub mod vector;
pub mod spacing;
pub mod direction;

pub use point::Point;
pub use vector::Vector;
pub use spacing::Spacing;
pub use direction::Direction;

pub type Point3 = Point<3>;
pub type Vector3 = Vector<3>;
pub type Spacing3 = Spacing<3>;
pub type Direction3 = Direction<3>;

/// Map a storage axis of a `[z, y, x]` spatial shape to its world axis.
#[inline]
pub fn world_axis(storage_axis: usize) -> usize {
    2 - storage_axis
}
