use crate::optimizer::Optimizer;
use burn::module::AutodiffModule;
use burn::optim::adaptor::OptimizerAdaptor;
use burn::optim::{AdamW, AdamWConfig, GradientsParams, Optimizer as BurnOptimizer};
use burn::tensor::backend::AutodiffBackend;

/// AdamW optimizer.
///
/// A wrapper around Burn's AdamW optimizer with decoupled weight decay.
pub struct AdamWOptimizer<M: AutodiffModule<B>, B: AutodiffBackend> {
    optimizer: OptimizerAdaptor<AdamW, M, B>,
    learning_rate: f64,
}

impl<M: AutodiffModule<B>, B: AutodiffBackend> AdamWOptimizer<M, B> {
    /// Create a new AdamW optimizer.
    ///
    /// # Arguments
    /// * `learning_rate` - The learning rate
    /// * `weight_decay` - Decoupled weight decay factor
    pub fn new(learning_rate: f64, weight_decay: f32) -> Self {
        Self::with_config(learning_rate, AdamWConfig::new().with_weight_decay(weight_decay))
    }

    /// Create an optimizer from a full burn configuration.
    pub fn with_config(learning_rate: f64, config: AdamWConfig) -> Self {
        Self {
            optimizer: config.init(),
            learning_rate,
        }
    }
}

impl<M, B> Optimizer<M, B> for AdamWOptimizer<M, B>
where
    M: AutodiffModule<B>,
    B: AutodiffBackend,
{
    fn step(&mut self, module: M, gradients: GradientsParams) -> M {
        self.optimizer.step(self.learning_rate, module, gradients)
    }

    fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    fn set_learning_rate(&mut self, lr: f64) {
        self.learning_rate = lr;
    }
}
