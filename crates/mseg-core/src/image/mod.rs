//! Volumetric image types.
//!
//! This module provides [`Volume`], the channel-first tensor plus physical
//! metadata that every transform consumes and produces.

pub mod metadata;
pub mod volume;

pub use metadata::ImageMetadata;
pub use volume::{ImageKind, Volume};
