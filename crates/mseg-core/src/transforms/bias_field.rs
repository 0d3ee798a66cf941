//! Smooth multiplicative intensity inhomogeneity.

use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};
use rand::RngCore;

use super::{check_probability, should_apply, uniform, Result, SubjectTransform, TransformError};
use crate::subject::Subject;

/// Multiply intensities by `exp(Σ c_ijk x^i y^j z^k)` over `i + j + k <= order`.
///
/// Coefficients are drawn from `U(-coefficients, coefficients)`; coordinates
/// span `[-1, 1]` along each axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RandomBiasField {
    coefficients: f64,
    order: usize,
    p: f64,
}

impl RandomBiasField {
    pub fn new() -> Self {
        Self {
            coefficients: 0.5,
            order: 3,
            p: 0.25,
        }
    }

    pub fn with_coefficients(mut self, coefficients: f64) -> Self {
        self.coefficients = coefficients;
        self
    }

    pub fn with_order(mut self, order: usize) -> Self {
        self.order = order;
        self
    }

    pub fn with_probability(mut self, p: f64) -> Self {
        self.p = p;
        self
    }

    fn sample_coefficients(&self, rng: &mut dyn RngCore) -> Vec<([i32; 3], f64)> {
        let bound = self.coefficients.abs();
        let mut terms = Vec::new();
        for i in 0..=self.order {
            for j in 0..=self.order - i {
                for k in 0..=self.order - i - j {
                    let c = uniform(&mut *rng, -bound, bound);
                    terms.push(([i as i32, j as i32, k as i32], c));
                }
            }
        }
        terms
    }
}

impl Default for RandomBiasField {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: Backend> SubjectTransform<B> for RandomBiasField {
    fn name(&self) -> &'static str {
        "RandomBiasField"
    }

    fn apply(&self, subject: Subject<B>, rng: &mut dyn RngCore) -> Result<Subject<B>> {
        check_probability(self.p)?;
        if !self.coefficients.is_finite() {
            return Err(TransformError::invalid_parameter("coefficients must be finite"));
        }
        if !should_apply(rng, self.p) {
            return Ok(subject);
        }
        let terms = self.sample_coefficients(rng);

        subject.map_volumes(|_, volume| {
            if volume.is_label() {
                return Ok(volume);
            }
            let [_, d, h, w] = volume.shape();
            let field = bias_field(&terms, [d, h, w]);
            let field = Tensor::<B, 4>::from_data(
                TensorData::new(field, [1, d, h, w]).convert::<B::FloatElem>(),
                &volume.data().device(),
            );
            let biased = volume.data().clone() * field;
            Ok(volume.with_data(biased))
        })
    }
}

/// Field values for a `[Z, Y, X]` grid, X fastest.
///
/// Exponent `[i, j, k]` applies to `(x, y, z)`.
fn bias_field(terms: &[([i32; 3], f64)], shape: [usize; 3]) -> Vec<f32> {
    let [d, h, w] = shape;
    let axis = |n: usize| -> Vec<f64> {
        if n <= 1 {
            vec![0.0; n]
        } else {
            (0..n).map(|i| -1.0 + 2.0 * i as f64 / (n - 1) as f64).collect()
        }
    };
    let (zs, ys, xs) = (axis(d), axis(h), axis(w));

    let mut field = Vec::with_capacity(d * h * w);
    for &z in &zs {
        for &y in &ys {
            for &x in &xs {
                let log: f64 = terms
                    .iter()
                    .map(|&([i, j, k], c)| c * x.powi(i) * y.powi(j) * z.powi(k))
                    .sum();
                field.push(log.exp() as f32);
            }
        }
    }
    field
}
