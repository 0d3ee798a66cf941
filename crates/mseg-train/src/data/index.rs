//! Discover image/label file pairs of a Decathlon-style task directory.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use mseg_core::SubjectRecord;
use mseg_io::archive::{is_nifti_name, IMAGES_TR, IMAGES_TS, LABELS_TR};
use tracing::{debug, info};

use crate::error::{Result, SegmentationError};

/// Training and test records of a task.
#[derive(Debug, Clone, Default)]
pub struct IndexedDataset {
    pub training: Vec<SubjectRecord>,
    pub test: Vec<SubjectRecord>,
}

/// NIfTI files in `dir`, hidden files excluded, sorted by name.
pub fn list_nifti_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(SegmentationError::MissingDirectory(dir.to_path_buf()));
    }

    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') || !is_nifti_name(&name) || !entry.file_type()?.is_file() {
            continue;
        }
        files.push(entry.path());
    }
    files.sort();
    Ok(files)
}

/// File name without its `.nii` / `.nii.gz` extension.
pub fn subject_stem(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    name.strip_suffix(".nii.gz")
        .or_else(|| name.strip_suffix(".nii"))
        .unwrap_or(&name)
        .to_string()
}

/// Index `<task_dir>/{imagesTr, labelsTr, imagesTs}`.
///
/// Training images and labels are paired by stem; any file without a
/// partner fails the whole index. A missing `imagesTs` yields an empty test
/// set.
pub fn index_dataset(task_dir: &Path) -> Result<IndexedDataset> {
    let images = list_nifti_files(&task_dir.join(IMAGES_TR))?;
    let labels = list_nifti_files(&task_dir.join(LABELS_TR))?;

    let mut labels_by_stem: BTreeMap<String, PathBuf> =
        labels.into_iter().map(|p| (subject_stem(&p), p)).collect();

    let mut training = Vec::with_capacity(images.len());
    let mut unmatched_images = Vec::new();
    for image in images {
        let stem = subject_stem(&image);
        match labels_by_stem.remove(&stem) {
            Some(label) => training.push(SubjectRecord::labeled(stem, image, label)),
            None => unmatched_images.push(stem),
        }
    }
    let unmatched_labels: Vec<String> = labels_by_stem.into_keys().collect();

    if !unmatched_images.is_empty() || !unmatched_labels.is_empty() {
        return Err(SegmentationError::UnmatchedFiles {
            images: unmatched_images,
            labels: unmatched_labels,
        });
    }

    let test_dir = task_dir.join(IMAGES_TS);
    let test = if test_dir.is_dir() {
        list_nifti_files(&test_dir)?
            .into_iter()
            .map(|p| SubjectRecord::unlabeled(subject_stem(&p), p))
            .collect()
    } else {
        debug!("No {} in {}, test set is empty", IMAGES_TS, task_dir.display());
        Vec::new()
    };

    info!(
        "Indexed {}: {} training subjects, {} test subjects",
        task_dir.display(),
        training.len(),
        test.len()
    );
    Ok(IndexedDataset { training, test })
}
