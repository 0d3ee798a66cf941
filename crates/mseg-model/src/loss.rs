use burn::prelude::*;
use burn::tensor::activation::{log_softmax, softmax};

/// Configuration for [`DiceCeLoss`].
#[derive(Config, Debug, PartialEq)]
pub struct DiceCeLossConfig {
    /// Apply softmax over channels to the network output
    #[config(default = "true")]
    pub softmax: bool,
    /// Added to the Dice numerator
    #[config(default = "1e-5")]
    pub smooth_nr: f32,
    /// Added to the Dice denominator
    #[config(default = "1e-5")]
    pub smooth_dr: f32,
    #[config(default = "1.0")]
    pub lambda_dice: f32,
    #[config(default = "1.0")]
    pub lambda_ce: f32,
}

impl DiceCeLossConfig {
    pub fn init(&self) -> DiceCeLoss {
        DiceCeLoss {
            softmax: self.softmax,
            smooth_nr: self.smooth_nr,
            smooth_dr: self.smooth_dr,
            lambda_dice: self.lambda_dice,
            lambda_ce: self.lambda_ce,
        }
    }
}

/// Soft Dice plus cross entropy.
///
/// Dice is computed per sample and channel over the spatial axes and then
/// averaged; cross entropy is averaged over voxels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiceCeLoss {
    softmax: bool,
    smooth_nr: f32,
    smooth_dr: f32,
    lambda_dice: f32,
    lambda_ce: f32,
}

impl DiceCeLoss {
    /// `logits`, `target`: `[batch, classes, D, H, W]`, target one-hot.
    pub fn forward<B: Backend>(&self, logits: Tensor<B, 5>, target: Tensor<B, 5>) -> Tensor<B, 1> {
        let (probs, log_probs) = if self.softmax {
            (softmax(logits.clone(), 1), log_softmax(logits, 1))
        } else {
            (logits.clone(), logits.clamp_min(1e-7).log())
        };

        let dice = self.dice_loss(probs, target.clone());
        let ce = (target * log_probs).sum_dim(1).mean().neg();

        dice.mul_scalar(self.lambda_dice) + ce.mul_scalar(self.lambda_ce)
    }

    /// Mean soft-Dice loss over batch and channels.
    pub fn dice_loss<B: Backend>(&self, probs: Tensor<B, 5>, target: Tensor<B, 5>) -> Tensor<B, 1> {
        let intersection = spatial_sum(probs.clone() * target.clone());
        let denominator = spatial_sum(probs) + spatial_sum(target);

        let dice = intersection
            .mul_scalar(2.0)
            .add_scalar(self.smooth_nr)
            .div(denominator.add_scalar(self.smooth_dr));
        dice.neg().add_scalar(1.0).mean()
    }
}

/// Sum over the three spatial axes, `[N, C, D, H, W]` → `[N, C]`.
pub(crate) fn spatial_sum<B: Backend>(x: Tensor<B, 5>) -> Tensor<B, 2> {
    let [n, c, _, _, _] = x.dims();
    x.sum_dim(4).sum_dim(3).sum_dim(2).reshape([n, c])
}
