//! Core types for volumetric segmentation pipelines.
//!
//! Channel-first [`Volume`]s carry physical metadata; a [`Subject`] bundles
//! the volumes of one participant; [`transforms`] turns subjects into
//! network-ready tensors and augments them.

pub mod error;
pub mod filter;
pub mod image;
pub mod interpolation;
pub mod spatial;
pub mod subject;
pub mod transform;
pub mod transforms;

pub use error::TransformError;
pub use image::{ImageKind, ImageMetadata, Volume};
pub use spatial::{Direction, Point, Spacing, Vector};
pub use subject::{ImageSource, Subject, SubjectRecord, IMAGE, LABEL};
pub use transforms::{Compose, SubjectTransform};
