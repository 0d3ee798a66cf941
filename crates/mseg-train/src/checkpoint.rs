//! Saving and restoring network weights and the training configuration.

use std::path::{Path, PathBuf};

use burn::config::Config;
use burn::module::Module;
use burn::record::{CompactRecorder, Recorder};
use burn::tensor::backend::Backend;
use mseg_model::{UNet3d, UNet3dConfig};

use crate::error::{Result, SegmentationError};
use crate::trainer::TrainingConfig;
use crate::validation::validate_network;

/// File stem of the best network; the recorder appends `.mpk`.
/// Weights are stored at half precision.
pub const BEST_MODEL: &str = "best_model";
/// Training configuration saved next to the weights.
pub const CONFIG_FILE: &str = "config.json";

/// Checkpoint files under one directory.
#[derive(Debug, Clone)]
pub struct CheckpointManager {
    dir: PathBuf,
}

impl CheckpointManager {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn model_path(&self) -> PathBuf {
        self.dir.join(BEST_MODEL)
    }

    pub fn config_path(&self) -> PathBuf {
        self.dir.join(CONFIG_FILE)
    }

    fn ensure_dir(&self) -> Result<()> {
        std::fs::create_dir_all(&self.dir).map_err(|e| {
            SegmentationError::checkpoint(format!("cannot create {}: {}", self.dir.display(), e))
        })
    }

    /// Record the network weights, replacing the previous best.
    pub fn save_network<B: Backend>(&self, network: &UNet3d<B>) -> Result<()> {
        self.ensure_dir()?;
        let path = self.model_path();
        CompactRecorder::new()
            .record(network.clone().into_record(), path.clone())
            .map_err(|e| SegmentationError::checkpoint(format!("cannot save {}: {}", path.display(), e)))?;
        tracing::debug!("Saved checkpoint {}", path.display());
        Ok(())
    }

    /// Rebuild a network from `config` and load the recorded weights.
    pub fn load_network<B: Backend>(&self, config: &UNet3dConfig, device: &B::Device) -> Result<UNet3d<B>> {
        validate_network(config)?;
        let path = self.model_path();
        let record = CompactRecorder::new().load(path.clone(), device).map_err(|e| {
            SegmentationError::checkpoint(format!(
                "cannot load {}: {}. Has the model been trained?",
                path.display(),
                e
            ))
        })?;
        Ok(config.init::<B>(device).load_record(record))
    }

    pub fn save_config(&self, config: &TrainingConfig) -> Result<()> {
        self.ensure_dir()?;
        let path = self.config_path();
        config
            .save(&path)
            .map_err(|e| SegmentationError::checkpoint(format!("cannot write {}: {}", path.display(), e)))
    }

    pub fn load_config(&self) -> Result<TrainingConfig> {
        let path = self.config_path();
        TrainingConfig::load(&path)
            .map_err(|e| SegmentationError::checkpoint(format!("cannot read {}: {}", path.display(), e)))
    }
}
