//! Epoch loop with AdamW updates, validation, early stopping and checkpoints.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use burn::config::Config;
use burn::tensor::backend::AutodiffBackend;
use mseg_model::{DiceCeLossConfig, UNet3d, UNet3dConfig};
use tracing::{debug, info};

use crate::checkpoint::CheckpointManager;
use crate::data::{MedicalDecathlonDataModule, SubjectLoader};
use crate::error::{Result as SegResult, SegmentationError};
use crate::model::SegmentationModel;
use crate::optimizer::{AdamWOptimizer, Optimizer};
use crate::progress::{
    ConsoleProgressCallback, EarlyStoppingCallback, HistoryCallback, ProgressCallback, ProgressInfo, ProgressTracker,
};
use crate::validation::{validate_epochs, validate_learning_rate, validate_network};

/// Early stopping on `val_loss`.
#[derive(Config, Debug)]
pub struct EarlyStoppingConfig {
    /// Non-improving epochs tolerated before stopping
    #[config(default = "3")]
    pub patience: usize,
    /// Minimum decrease counted as an improvement
    #[config(default = "0.0")]
    pub min_delta: f64,
}

/// Training configuration, saved as JSON next to the checkpoint.
#[derive(Config, Debug)]
pub struct TrainingConfig {
    #[config(default = "UNet3dConfig::new()")]
    pub model: UNet3dConfig,
    #[config(default = "DiceCeLossConfig::new()")]
    pub loss: DiceCeLossConfig,
    #[config(default = "1e-2")]
    pub learning_rate: f64,
    #[config(default = "100")]
    pub max_epochs: usize,
    /// AdamW decoupled weight decay
    #[config(default = "1e-2")]
    pub weight_decay: f32,
    #[config(default = "EarlyStoppingConfig::new()")]
    pub early_stopping: EarlyStoppingConfig,
    #[config(default = "PathBuf::from(\"checkpoints\")")]
    pub checkpoint_dir: PathBuf,
    /// Seed of the backend RNG used for weight initialisation
    #[config(default = "42")]
    pub seed: u64,
}

/// Outcome of [`Trainer::fit`].
#[derive(Debug, Clone)]
pub struct TrainingSummary {
    pub epochs_run: usize,
    pub best_epoch: usize,
    pub best_val_loss: f64,
    pub stopped_early: bool,
    pub history: Vec<ProgressInfo>,
    pub duration: Duration,
}

/// Fits a [`SegmentationModel`] on an autodiff backend.
pub struct Trainer<B: AutodiffBackend> {
    config: TrainingConfig,
    device: B::Device,
    tracker: ProgressTracker,
    checkpoints: CheckpointManager,
}

impl<B: AutodiffBackend> Trainer<B> {
    pub fn new(config: TrainingConfig, device: B::Device) -> SegResult<Self> {
        validate_learning_rate(config.learning_rate)?;
        validate_epochs(config.max_epochs)?;
        validate_network(&config.model)?;

        let mut tracker = ProgressTracker::new();
        tracker.add_callback(Arc::new(ConsoleProgressCallback::default()));
        let checkpoints = CheckpointManager::new(&config.checkpoint_dir);

        Ok(Self {
            config,
            device,
            tracker,
            checkpoints,
        })
    }

    /// Register an additional progress callback.
    pub fn with_callback(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.tracker.add_callback(callback);
        self
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    pub fn checkpoints(&self) -> &CheckpointManager {
        &self.checkpoints
    }

    /// Seed the backend and build a fresh model.
    pub fn init_model(&self) -> SegmentationModel<B> {
        B::seed(self.config.seed);
        SegmentationModel::new(
            &self.config.model,
            &self.config.loss,
            self.config.learning_rate,
            &self.device,
        )
    }

    /// Train on the loaders of a set-up data module.
    pub fn fit(
        &self,
        model: SegmentationModel<B>,
        data: &MedicalDecathlonDataModule<B>,
    ) -> SegResult<(SegmentationModel<B>, TrainingSummary)> {
        let train = data.train_loader()?;
        let val = data.val_loader()?;
        self.fit_loaders(model, &train, &val)
    }

    /// Train and return the model of the best validation epoch.
    pub fn fit_loaders(
        &self,
        model: SegmentationModel<B>,
        train: &SubjectLoader<B>,
        val: &SubjectLoader<B>,
    ) -> SegResult<(SegmentationModel<B>, TrainingSummary)> {
        let result = self.run(model, train, val);
        if let Err(e) = &result {
            self.tracker.error(&e.to_string());
        }
        result
    }

    fn run(
        &self,
        mut model: SegmentationModel<B>,
        train: &SubjectLoader<B>,
        val: &SubjectLoader<B>,
    ) -> SegResult<(SegmentationModel<B>, TrainingSummary)> {
        if train.is_empty() {
            return Err(SegmentationError::empty_dataset("training loader has no subjects"));
        }
        if val.is_empty() {
            return Err(SegmentationError::empty_dataset("validation loader has no subjects"));
        }

        let early_stopping =
            EarlyStoppingCallback::new(self.config.early_stopping.min_delta, self.config.early_stopping.patience);
        let history = HistoryCallback::new();
        let mut tracker = self.tracker.clone();
        tracker.add_callback(Arc::new(early_stopping.clone()));
        tracker.add_callback(Arc::new(history.clone()));

        self.checkpoints.save_config(&self.config)?;
        let mut optimizer =
            AdamWOptimizer::<UNet3d<B>, B>::new(self.config.learning_rate, self.config.weight_decay);

        info!(
            train = train.len(),
            val = val.len(),
            batches = train.num_batches(),
            "fitting for at most {} epochs",
            self.config.max_epochs
        );
        tracker.start();

        let mut best: Option<(usize, f64, SegmentationModel<B>)> = None;
        let mut epochs_run = 0;

        for epoch in 1..=self.config.max_epochs {
            let (next, train_loss) = train_epoch(model, &mut optimizer, train, epoch)?;
            model = next;
            let val_loss = validate_epoch(&model, val, epoch)?;
            epochs_run = epoch;

            // Same criterion as early stopping, checked before the tracker updates it.
            let improved = early_stopping.improves(val_loss);
            if improved {
                self.checkpoints.save_network(model.network())?;
                debug!(epoch, val_loss, "new best model");
                best = Some((epoch, val_loss, model.clone()));
            }

            let info = ProgressInfo::new(
                epoch,
                Some(self.config.max_epochs),
                train_loss,
                val_loss,
                Duration::ZERO,
                optimizer.learning_rate(),
            );
            tracker.update(info);

            if early_stopping.should_stop() {
                break;
            }
        }

        let duration = tracker.elapsed();
        let (best_epoch, best_val_loss, best_model) = best.ok_or_else(|| {
            SegmentationError::empty_dataset("training finished without a validation result")
        })?;

        let mut final_info = ProgressInfo::new(
            epochs_run,
            Some(self.config.max_epochs),
            f64::NAN,
            best_val_loss,
            duration,
            optimizer.learning_rate(),
        );
        final_info.add_metric("best_epoch", best_epoch as f64);
        tracker.complete(&final_info);

        let summary = TrainingSummary {
            epochs_run,
            best_epoch,
            best_val_loss,
            stopped_early: epochs_run < self.config.max_epochs,
            history: history.get_history(),
            duration,
        };
        Ok((best_model, summary))
    }
}

fn train_epoch<B: AutodiffBackend>(
    mut model: SegmentationModel<B>,
    optimizer: &mut AdamWOptimizer<UNet3d<B>, B>,
    loader: &SubjectLoader<B>,
    epoch: usize,
) -> SegResult<(SegmentationModel<B>, f64)> {
    let mut mean = WeightedMean::default();
    for (batch_idx, batch) in loader.iter(epoch).enumerate() {
        let batch = batch?;
        let (output, grads) = model.training_step(&batch, batch_idx)?;
        model = model.map_network(|network| optimizer.step(network, grads));
        mean.push(output.loss, output.batch_size);
    }
    Ok((model, mean.value()))
}

fn validate_epoch<B: AutodiffBackend>(
    model: &SegmentationModel<B>,
    loader: &SubjectLoader<B>,
    epoch: usize,
) -> SegResult<f64> {
    let model = model.valid();
    let mut mean = WeightedMean::default();
    for (batch_idx, batch) in loader.iter(epoch).enumerate() {
        let output = model.validation_step(&batch?.inner(), batch_idx)?;
        mean.push(output.loss, output.batch_size);
    }
    Ok(mean.value())
}

/// Mean of per-batch losses weighted by batch size.
#[derive(Debug, Default)]
struct WeightedMean {
    sum: f64,
    count: usize,
}

impl WeightedMean {
    fn push(&mut self, value: f64, weight: usize) {
        self.sum += value * weight as f64;
        self.count += weight;
    }

    fn value(&self) -> f64 {
        if self.count == 0 {
            f64::NAN
        } else {
            self.sum / self.count as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_training_config_defaults() {
        let config = TrainingConfig::new();
        assert_eq!(config.learning_rate, 1e-2);
        assert_eq!(config.max_epochs, 100);
        assert_eq!(config.early_stopping.patience, 3);
        assert_eq!(config.early_stopping.min_delta, 0.0);
        assert_eq!(config.model.out_channels, 3);
    }

    #[test]
    fn test_weighted_mean() {
        let mut mean = WeightedMean::default();
        assert!(mean.value().is_nan());
        mean.push(1.0, 2);
        mean.push(4.0, 1);
        assert_eq!(mean.value(), 2.0);
    }

    #[test]
    fn test_invalid_config_rejected() {
        type B = burn::backend::Autodiff<burn_ndarray::NdArray<f32>>;
        let config = TrainingConfig::new().with_learning_rate(0.0);
        assert!(Trainer::<B>::new(config, Default::default()).is_err());
        let config = TrainingConfig::new().with_model(UNet3dConfig::new().with_strides(vec![2]));
        assert!(Trainer::<B>::new(config, Default::default()).is_err());
    }
}
