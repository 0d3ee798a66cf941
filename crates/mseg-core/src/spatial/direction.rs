//! Direction cosine matrix.

use nalgebra::SMatrix;
use serde::{Deserialize, Serialize};

use super::Vector;

/// Orientation of the image axes in physical space.
///
/// Column `i` is the unit direction of image axis `i`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Direction<const D: usize>(pub SMatrix<f64, D, D>);

impl<const D: usize> Direction<D> {
    /// Identity orientation.
    pub fn identity() -> Self {
        Self(SMatrix::identity())
    }

    /// Inverse orientation, if the matrix is invertible.
    pub fn try_inverse(&self) -> Option<Self> {
        self.0.try_inverse().map(Self)
    }

    /// Get the inner nalgebra matrix.
    pub fn inner(&self) -> &SMatrix<f64, D, D> {
        &self.0
    }
}

impl<const D: usize> Default for Direction<D> {
    fn default() -> Self {
        Self::identity()
    }
}

impl<const D: usize> std::ops::Index<(usize, usize)> for Direction<D> {
    type Output = f64;

    fn index(&self, index: (usize, usize)) -> &Self::Output {
        &self.0[index]
    }
}

impl<const D: usize> std::ops::Mul<Vector<D>> for Direction<D> {
    type Output = Vector<D>;

    fn mul(self, rhs: Vector<D>) -> Self::Output {
        Vector(self.0 * rhs.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_inverse() {
        let direction = Direction::<3>::identity();
        assert_eq!(direction.try_inverse(), Some(direction));
        let v = Vector::<3>::new([1.0, 2.0, 3.0]);
        assert_eq!((direction * v).to_array(), [1.0, 2.0, 3.0]);
    }
}
