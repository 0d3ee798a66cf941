//! Image metadata types.
//!
//! Metadata describes how voxel indices map to physical coordinates:
//! `point = origin + direction * (index ∘ spacing)`, with indices and points
//! in world axis order `(x, y, z)`.

use nalgebra::{Matrix4, Vector4};
use serde::{Deserialize, Serialize};

use crate::spatial::{Direction, Point, Spacing, Vector};

/// Image metadata containing physical space information.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImageMetadata<const D: usize> {
    /// Physical coordinate of the first voxel (index 0, 0, ...).
    origin: Point<D>,
    /// Physical distance between voxels along each axis.
    spacing: Spacing<D>,
    /// Orientation of the image axes.
    direction: Direction<D>,
}

impl<const D: usize> ImageMetadata<D> {
    /// Create new image metadata.
    pub fn new(origin: Point<D>, spacing: Spacing<D>, direction: Direction<D>) -> Self {
        Self {
            origin,
            spacing,
            direction,
        }
    }

    /// Get the origin.
    pub fn origin(&self) -> &Point<D> {
        &self.origin
    }

    /// Get the spacing.
    pub fn spacing(&self) -> &Spacing<D> {
        &self.spacing
    }

    /// Get the direction.
    pub fn direction(&self) -> &Direction<D> {
        &self.direction
    }

    /// Map a continuous index (world axis order) to a physical point.
    pub fn index_to_physical(&self, index: [f64; D]) -> Point<D> {
        let scaled = Vector::new(index).component_mul(&self.spacing);
        self.origin + self.direction * scaled
    }

    /// Metadata of the same grid with its first voxel moved by `offset` voxels.
    ///
    /// Cropping `n` voxels off the start of an axis is an offset of `+n`;
    /// padding `n` voxels is an offset of `-n`.
    pub fn shifted(&self, offset: [f64; D]) -> Self {
        Self {
            origin: self.index_to_physical(offset),
            ..*self
        }
    }
}

impl ImageMetadata<3> {
    /// Homogeneous matrix taking a continuous index `(x, y, z, 1)` to a
    /// physical point.
    pub fn index_to_physical_matrix(&self) -> Matrix4<f64> {
        let mut m = Matrix4::identity();
        for r in 0..3 {
            for c in 0..3 {
                m[(r, c)] = self.direction[(r, c)] * self.spacing[c];
            }
            m[(r, 3)] = self.origin[r];
        }
        m
    }

    /// Homogeneous matrix taking a physical point to a continuous index.
    ///
    /// Falls back to the identity when the grid is degenerate.
    pub fn physical_to_index_matrix(&self) -> Matrix4<f64> {
        self.index_to_physical_matrix()
            .try_inverse()
            .unwrap_or_else(Matrix4::identity)
    }

    /// Physical position of the geometric centre of a `[z, y, x]` grid.
    pub fn center(&self, spatial_shape: [usize; 3]) -> Point<3> {
        let [nz, ny, nx] = spatial_shape;
        let half = |n: usize| (n.max(1) - 1) as f64 / 2.0;
        let p = self.index_to_physical_matrix() * Vector4::new(half(nx), half(ny), half(nz), 1.0);
        Point::new([p.x, p.y, p.z])
    }
}

impl<const D: usize> Default for ImageMetadata<D> {
    fn default() -> Self {
        Self {
            origin: Point::origin(),
            spacing: Spacing::uniform(1.0),
            direction: Direction::identity(),
        }
    }
}
