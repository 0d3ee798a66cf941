use burn::prelude::*;

use crate::loss::spatial_sum;

/// Hard Dice score per sample and class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiceMetric {
    include_background: bool,
}

impl DiceMetric {
    pub fn new(include_background: bool) -> Self {
        Self { include_background }
    }

    pub fn include_background(&self) -> bool {
        self.include_background
    }

    /// `prediction`, `target`: one-hot `[N, K, D, H, W]`.
    ///
    /// Returns `[N, K']` with `K' = K - 1` when the background is excluded.
    /// A class absent from both prediction and target scores 1.
    pub fn forward<B: Backend>(&self, prediction: Tensor<B, 5>, target: Tensor<B, 5>) -> Tensor<B, 2> {
        let [_, k, _, _, _] = prediction.dims();
        let (prediction, target) = if self.include_background || k < 2 {
            (prediction, target)
        } else {
            (prediction.narrow(1, 1, k - 1), target.narrow(1, 1, k - 1))
        };

        let intersection = spatial_sum(prediction.clone() * target.clone());
        let denominator = spatial_sum(prediction) + spatial_sum(target);
        let empty = denominator.clone().equal_elem(0.0);

        intersection
            .mul_scalar(2.0)
            .div(denominator.clamp_min(1e-8))
            .mask_fill(empty, 1.0)
    }
}

impl Default for DiceMetric {
    fn default() -> Self {
        Self::new(false)
    }
}

/// Class index per voxel, `[N, K, D, H, W]` → `[N, 1, D, H, W]`.
pub fn argmax_labels<B: Backend>(logits: Tensor<B, 5>) -> Tensor<B, 5, Int> {
    logits.argmax(1)
}

/// One-hot of the arg-max class, same shape as `logits`.
pub fn one_hot_from_logits<B: Backend>(logits: Tensor<B, 5>) -> Tensor<B, 5> {
    let [_, k, _, _, _] = logits.dims();
    let labels = argmax_labels(logits);
    let masks = (0..k)
        .map(|class| labels.clone().equal_elem(class as i64).float())
        .collect();
    Tensor::cat(masks, 1)
}
