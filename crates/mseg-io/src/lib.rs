//! Input/output for segmentation datasets: NIfTI volumes and archives.

pub mod archive;
pub mod nifti_io;

pub use archive::{ArchiveManager, DatasetArchive, TaskSummary};
pub use nifti_io::{read_nifti, read_spatial_shape, read_volume, write_volume};
