//! Subjects: named bundles of co-registered volumes for one participant.
//!
//! A [`SubjectRecord`] only knows where its files live; it is created once
//! by the dataset indexer and never changes. Loading a record yields a
//! [`Subject`], which transforms consume and return by value.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use burn::tensor::backend::Backend;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TransformError};
use crate::image::{ImageKind, Volume};

/// Role of the intensity image in a subject.
pub const IMAGE: &str = "image";
/// Role of the label map in a subject.
pub const LABEL: &str = "label";

/// A file on disk and how to interpret it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSource {
    pub path: PathBuf,
    pub kind: ImageKind,
}

impl ImageSource {
    pub fn intensity(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: ImageKind::Intensity,
        }
    }

    pub fn label(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: ImageKind::Label,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// File-level description of a subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectRecord {
    id: String,
    images: BTreeMap<String, ImageSource>,
}

impl SubjectRecord {
    /// Create a record with no images.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            images: BTreeMap::new(),
        }
    }

    /// Add an image under `role`.
    pub fn with_image(mut self, role: impl Into<String>, source: ImageSource) -> Self {
        self.images.insert(role.into(), source);
        self
    }

    /// Record holding an intensity image and its label map.
    pub fn labeled(id: impl Into<String>, image: impl Into<PathBuf>, label: impl Into<PathBuf>) -> Self {
        Self::new(id)
            .with_image(IMAGE, ImageSource::intensity(image))
            .with_image(LABEL, ImageSource::label(label))
    }

    /// Record holding only an intensity image.
    pub fn unlabeled(id: impl Into<String>, image: impl Into<PathBuf>) -> Self {
        Self::new(id).with_image(IMAGE, ImageSource::intensity(image))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn get(&self, role: &str) -> Option<&ImageSource> {
        self.images.get(role)
    }

    pub fn has_label(&self) -> bool {
        self.images.contains_key(LABEL)
    }

    /// Iterate `(role, source)` pairs in role order.
    pub fn images(&self) -> impl Iterator<Item = (&str, &ImageSource)> {
        self.images.iter().map(|(role, source)| (role.as_str(), source))
    }
}

/// A loaded subject: role → volume.
#[derive(Debug, Clone)]
pub struct Subject<B: Backend> {
    id: String,
    images: BTreeMap<String, Volume<B>>,
}

impl<B: Backend> Subject<B> {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            images: BTreeMap::new(),
        }
    }

    /// Add or replace the volume under `role`.
    pub fn with_image(mut self, role: impl Into<String>, volume: Volume<B>) -> Self {
        self.images.insert(role.into(), volume);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn get(&self, role: &str) -> Option<&Volume<B>> {
        self.images.get(role)
    }

    /// Get the volume under `role` or fail with [`TransformError::MissingImage`].
    pub fn require(&self, role: &str) -> Result<&Volume<B>> {
        self.images.get(role).ok_or_else(|| TransformError::MissingImage {
            subject: self.id.clone(),
            role: role.to_string(),
        })
    }

    /// Remove and return the volume under `role`.
    pub fn take(&mut self, role: &str) -> Result<Volume<B>> {
        self.images.remove(role).ok_or_else(|| TransformError::MissingImage {
            subject: self.id.clone(),
            role: role.to_string(),
        })
    }

    pub fn roles(&self) -> impl Iterator<Item = &str> {
        self.images.keys().map(String::as_str)
    }

    pub fn volumes(&self) -> impl Iterator<Item = (&str, &Volume<B>)> {
        self.images.iter().map(|(role, volume)| (role.as_str(), volume))
    }

    /// Spatial shape shared by every volume, if they agree.
    pub fn spatial_shape(&self) -> Option<[usize; 3]> {
        let mut shapes = self.images.values().map(Volume::spatial_shape);
        let first = shapes.next()?;
        shapes.all(|s| s == first).then_some(first)
    }

    /// Apply `f` to every volume, keeping roles.
    pub fn map_volumes<F>(self, mut f: F) -> Result<Self>
    where
        F: FnMut(&str, Volume<B>) -> Result<Volume<B>>,
    {
        let mut images = BTreeMap::new();
        for (role, volume) in self.images {
            let mapped = f(&role, volume)?;
            images.insert(role, mapped);
        }
        Ok(Self { id: self.id, images })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::ImageMetadata;
    use burn::tensor::Tensor;
    use burn_ndarray::NdArray;

    type Backend = NdArray<f32>;

    #[test]
    fn test_record_roles() {
        let record = SubjectRecord::labeled("hippocampus_001", "a.nii.gz", "b.nii.gz");
        assert!(record.has_label());
        assert_eq!(record.get(IMAGE).unwrap().kind, ImageKind::Intensity);
        assert_eq!(record.get(LABEL).unwrap().kind, ImageKind::Label);

        let test = SubjectRecord::unlabeled("hippocampus_002", "c.nii.gz");
        assert!(!test.has_label());
        assert_eq!(test.images().count(), 1);
    }

    #[test]
    fn test_subject_missing_role() {
        let subject = Subject::<Backend>::new("s1");
        let err = subject.require(LABEL).unwrap_err();
        assert!(matches!(err, TransformError::MissingImage { .. }));
    }

    #[test]
    fn test_subject_spatial_shape_agreement() {
        let device = Default::default();
        let image = Volume::from_spatial(
            Tensor::<Backend, 3>::zeros([2, 3, 4], &device),
            ImageKind::Intensity,
            ImageMetadata::default(),
        );
        let label = Volume::from_spatial(
            Tensor::<Backend, 3>::zeros([2, 3, 4], &device),
            ImageKind::Label,
            ImageMetadata::default(),
        );
        let subject = Subject::new("s1").with_image(IMAGE, image.clone()).with_image(LABEL, label);
        assert_eq!(subject.spatial_shape(), Some([2, 3, 4]));

        let other = Volume::from_spatial(
            Tensor::<Backend, 3>::zeros([5, 3, 4], &device),
            ImageKind::Label,
            ImageMetadata::default(),
        );
        let subject = subject.with_image(LABEL, other);
        assert_eq!(subject.spatial_shape(), None);
    }
}
