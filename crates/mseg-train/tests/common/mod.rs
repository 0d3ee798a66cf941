#![allow(dead_code)]

use std::path::Path;

use mseg_train::DataModuleConfig;
use ndarray::Array3;
use nifti::writer::WriterOptions;

pub const TASK: &str = "Task04_Hippocampus";

/// Write a NIfTI volume with storage shape `[z, y, x]`.
pub fn write_nifti(path: &Path, shape: [usize; 3], value: impl Fn(usize, usize, usize) -> f32) {
    let [nz, ny, nx] = shape;
    let array = Array3::from_shape_fn((nx, ny, nz), |(x, y, z)| value(x, y, z));
    WriterOptions::new(path).write_nifti(&array).unwrap();
}

/// Intensity image and matching three-class label map.
pub fn write_pair(task_dir: &Path, name: &str, shape: [usize; 3]) {
    write_nifti(
        &task_dir.join("imagesTr").join(format!("{}.nii.gz", name)),
        shape,
        |x, y, z| (x * 7 + y * 3 + z) as f32 + 10.0,
    );
    write_nifti(
        &task_dir.join("labelsTr").join(format!("{}.nii.gz", name)),
        shape,
        |x, y, _| ((x + y) % 3) as f32,
    );
}

pub fn write_test_image(task_dir: &Path, name: &str, shape: [usize; 3]) {
    write_nifti(
        &task_dir.join("imagesTs").join(format!("{}.nii.gz", name)),
        shape,
        |x, y, z| (x + y + z) as f32,
    );
}

/// A task directory with `shapes.len()` labeled subjects and `tests` test images.
pub fn synthetic_task(root: &Path, shapes: &[[usize; 3]], tests: usize) {
    let task_dir = root.join(TASK);
    for sub in ["imagesTr", "labelsTr", "imagesTs"] {
        std::fs::create_dir_all(task_dir.join(sub)).unwrap();
    }
    for (i, shape) in shapes.iter().enumerate() {
        write_pair(&task_dir, &format!("hippocampus_{:03}", i), *shape);
    }
    for i in 0..tests {
        write_test_image(&task_dir, &format!("hippocampus_{:03}", 100 + i), shapes[i % shapes.len()]);
    }
}

/// Configuration for a synthetic task under `root`, never downloading.
pub fn config(root: &Path) -> DataModuleConfig {
    DataModuleConfig::hippocampus(root)
        .with_batch_size(2)
        .with_augment(false)
}
