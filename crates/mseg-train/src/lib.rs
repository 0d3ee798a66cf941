//! Data preparation and training of a 3D U-Net on Decathlon tasks.

pub mod checkpoint;
pub mod data;
pub mod error;
pub mod evaluate;
pub mod model;
pub mod optimizer;
pub mod progress;
pub mod trainer;
pub mod validation;

pub use checkpoint::CheckpointManager;
pub use data::{
    DataModuleConfig, MedicalDecathlonDataModule, SegmentationBatch, SegmentationBatcher, SubjectLoader,
    SubjectsDataset,
};
pub use error::{Result, SegmentationError};
pub use evaluate::{evaluate_dice, predict, summarize, DiceRecord, DiceSummary};
pub use model::{SegmentationModel, StepOutput};
pub use progress::{
    ConsoleProgressCallback, EarlyStoppingCallback, HistoryCallback, ProgressCallback, ProgressInfo, ProgressTracker,
};
pub use trainer::{EarlyStoppingConfig, Trainer, TrainingConfig, TrainingSummary};
