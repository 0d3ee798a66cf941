//! Dataset preparation: indexing, splitting, loading and batching.

pub mod batcher;
pub mod dataset;
pub mod index;
pub mod loader;
pub mod module;
pub mod split;

pub use batcher::{SegmentationBatch, SegmentationBatcher};
pub use dataset::{item_seed, load_subject, SubjectsDataset};
pub use index::{index_dataset, list_nifti_files, subject_stem, IndexedDataset};
pub use loader::{loader_pool, BatchIter, SubjectLoader};
pub use module::{max_shape, index_task, DataModuleConfig, MedicalDecathlonDataModule};
pub use split::{random_split, split_counts};
