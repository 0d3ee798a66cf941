pub mod resample;

pub use resample::{grid_indices, FillValue, ResampleFilter};
