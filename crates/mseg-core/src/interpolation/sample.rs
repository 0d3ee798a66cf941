//! Sampling of channel-first volumes at continuous voxel indices.

use burn::tensor::backend::Backend;
use burn::tensor::{Int, Tensor};

/// How to read a volume between voxel centres.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interpolation {
    /// Trilinear blend of the eight neighbours.
    Linear,
    /// Value of the closest voxel. Keeps label maps categorical.
    Nearest,
}

/// Sample `data` (`[C, Z, Y, X]`) at `indices` (`[N, 3]`, `(x, y, z)` order).
///
/// Points outside the grid take `fill`. Returns `[C, N]`.
pub fn sample<B: Backend>(
    data: &Tensor<B, 4>,
    indices: Tensor<B, 2>,
    mode: Interpolation,
    fill: f32,
) -> Tensor<B, 2> {
    let [c, d, h, w] = data.dims();
    let n = indices.dims()[0];

    let x = indices.clone().narrow(1, 0, 1).reshape([n]);
    let y = indices.clone().narrow(1, 1, 1).reshape([n]);
    let z = indices.narrow(1, 2, 1).reshape([n]);

    let inside = inside_mask(&x, w) * inside_mask(&y, h) * inside_mask(&z, d);

    let flat = data.clone().reshape([c, d * h * w]);
    let stride_z = (h * w) as i32;
    let stride_y = w as i32;
    let gather = |zi: Tensor<B, 1, Int>, yi: Tensor<B, 1, Int>, xi: Tensor<B, 1, Int>| -> Tensor<B, 2> {
        let idx = zi.mul_scalar(stride_z) + yi.mul_scalar(stride_y) + xi;
        flat.clone().gather(1, idx.reshape([1, n]).repeat(&[c, 1]))
    };

    let values = match mode {
        Interpolation::Nearest => {
            let xi = clamp_index(x.add_scalar(0.5).floor(), w);
            let yi = clamp_index(y.add_scalar(0.5).floor(), h);
            let zi = clamp_index(z.add_scalar(0.5).floor(), d);
            gather(zi, yi, xi)
        }
        Interpolation::Linear => {
            let x0 = x.clone().floor();
            let y0 = y.clone().floor();
            let z0 = z.clone().floor();

            // Weights of the upper neighbour, broadcast over channels
            let wx1 = (x - x0.clone()).reshape([1, n]);
            let wy1 = (y - y0.clone()).reshape([1, n]);
            let wz1 = (z - z0.clone()).reshape([1, n]);
            let wx0 = wx1.clone().neg().add_scalar(1.0);
            let wy0 = wy1.clone().neg().add_scalar(1.0);
            let wz0 = wz1.clone().neg().add_scalar(1.0);

            let x1i = clamp_index(x0.clone().add_scalar(1.0), w);
            let y1i = clamp_index(y0.clone().add_scalar(1.0), h);
            let z1i = clamp_index(z0.clone().add_scalar(1.0), d);
            let x0i = clamp_index(x0, w);
            let y0i = clamp_index(y0, h);
            let z0i = clamp_index(z0, d);

            let v000 = gather(z0i.clone(), y0i.clone(), x0i.clone());
            let v001 = gather(z0i.clone(), y0i.clone(), x1i.clone());
            let v010 = gather(z0i.clone(), y1i.clone(), x0i.clone());
            let v011 = gather(z0i.clone(), y1i.clone(), x1i.clone());
            let v100 = gather(z1i.clone(), y0i.clone(), x0i.clone());
            let v101 = gather(z1i.clone(), y0i.clone(), x1i.clone());
            let v110 = gather(z1i.clone(), y1i.clone(), x0i.clone());
            let v111 = gather(z1i, y1i, x1i);

            // Interpolate X first
            let c00 = v000 * wx0.clone() + v001 * wx1.clone();
            let c01 = v010 * wx0.clone() + v011 * wx1.clone();
            let c10 = v100 * wx0.clone() + v101 * wx1.clone();
            let c11 = v110 * wx0 + v111 * wx1;

            // Then Y, then Z
            let c0 = c00 * wy0.clone() + c01 * wy1.clone();
            let c1 = c10 * wy0 + c11 * wy1;
            c0 * wz0 + c1 * wz1
        }
    };

    let outside = inside.clone().neg().add_scalar(1.0).mul_scalar(fill).reshape([1, n]);
    values * inside.reshape([1, n]) + outside
}

/// 1.0 where `coord` lies on the grid `[0, size - 1]`, else 0.0.
fn inside_mask<B: Backend>(coord: &Tensor<B, 1>, size: usize) -> Tensor<B, 1> {
    const TOLERANCE: f32 = 1e-3;
    let upper = (size.max(1) - 1) as f32 + TOLERANCE;
    let above = coord.clone().greater_equal_elem(-TOLERANCE).float();
    let below = coord.clone().lower_equal_elem(upper).float();
    above * below
}

fn clamp_index<B: Backend>(coord: Tensor<B, 1>, size: usize) -> Tensor<B, 1, Int> {
    coord.clamp(0.0, (size.max(1) - 1) as f32).int()
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::TensorData;
    use burn_ndarray::NdArray;

    type Backend = NdArray<f32>;

    fn ramp(device: &<Backend as burn::tensor::backend::Backend>::Device) -> Tensor<Backend, 4> {
        // value = x along the last axis
        let values: Vec<f32> = (0..2 * 2 * 4).map(|i| (i % 4) as f32).collect();
        Tensor::from_data(TensorData::new(values, [1, 2, 2, 4]), device)
    }

    #[test]
    fn test_linear_midpoint() {
        let device = Default::default();
        let data = ramp(&device);
        let points = Tensor::<Backend, 2>::from_floats([[1.5, 0.0, 0.0], [2.25, 1.0, 1.0]], &device);
        let out = sample(&data, points, Interpolation::Linear, -1.0).into_data();
        let values = out.as_slice::<f32>().unwrap();
        assert!((values[0] - 1.5).abs() < 1e-5);
        assert!((values[1] - 2.25).abs() < 1e-5);
    }

    #[test]
    fn test_nearest_rounds() {
        let device = Default::default();
        let data = ramp(&device);
        let points = Tensor::<Backend, 2>::from_floats([[1.4, 0.0, 0.0], [1.6, 0.0, 0.0]], &device);
        let out = sample(&data, points, Interpolation::Nearest, 0.0).into_data();
        assert_eq!(out.as_slice::<f32>().unwrap(), &[1.0, 2.0]);
    }

    #[test]
    fn test_outside_takes_fill() {
        let device = Default::default();
        let data = ramp(&device);
        let points = Tensor::<Backend, 2>::from_floats([[-3.0, 0.0, 0.0], [1.0, 5.0, 0.0]], &device);
        let out = sample(&data, points, Interpolation::Linear, -7.0).into_data();
        assert_eq!(out.as_slice::<f32>().unwrap(), &[-7.0, -7.0]);
    }
}
