mod common;

use std::collections::HashSet;

use burn_ndarray::NdArray;
use mseg_train::{MedicalDecathlonDataModule, SegmentationError};
use tempfile::tempdir;

use common::{config, synthetic_task, write_nifti, TASK};

type B = NdArray<f32>;

#[test]
fn test_three_pairs_split_two_one() {
    let dir = tempdir().unwrap();
    synthetic_task(dir.path(), &[[6, 6, 6]; 3], 0);

    let mut data = MedicalDecathlonDataModule::<B>::new(config(dir.path()), Default::default());
    data.prepare_data().unwrap();
    data.setup().unwrap();

    assert_eq!(data.train_records().len(), 2);
    assert_eq!(data.val_records().len(), 1);

    let ids: HashSet<&str> = data
        .train_records()
        .iter()
        .chain(data.val_records())
        .map(|r| r.id())
        .collect();
    assert_eq!(ids.len(), 3);
    assert!(ids.contains("hippocampus_000"));
    assert!(ids.contains("hippocampus_002"));
}

#[test]
fn test_halfway_split_keeps_validation_subject() {
    let dir = tempdir().unwrap();
    synthetic_task(dir.path(), &[[4, 4, 4]; 5], 0);

    let cfg = config(dir.path()).with_train_val_ratio(0.9);
    let mut data = MedicalDecathlonDataModule::<B>::new(cfg, Default::default());
    data.prepare_data().unwrap();
    data.setup().unwrap();

    assert_eq!(data.train_records().len(), 4);
    assert_eq!(data.val_records().len(), 1);
}

#[test]
fn test_pipelines_keep_step_order() {
    let dir = tempdir().unwrap();
    synthetic_task(dir.path(), &[[6, 6, 6]; 3], 1);

    let cfg = config(dir.path()).with_augment(true);
    let mut data = MedicalDecathlonDataModule::<B>::new(cfg, Default::default());
    data.prepare_data().unwrap();
    data.setup().unwrap();

    let preprocessing = ["RescaleIntensity", "CropOrPad", "EnsureShapeMultiple", "OneHot"];
    let augmentation = [
        "RandomAffine",
        "RandomGamma",
        "RandomNoise",
        "RandomMotion",
        "RandomBiasField",
    ];
    let expected_train: Vec<&str> = preprocessing.iter().chain(augmentation.iter()).copied().collect();

    assert_eq!(data.train_loader().unwrap().dataset().transform().names(), expected_train);
    assert_eq!(data.val_loader().unwrap().dataset().transform().names(), preprocessing);
    assert_eq!(data.test_loader().unwrap().dataset().transform().names(), preprocessing);
    assert_eq!(data.preprocessing().unwrap().names(), preprocessing);
    assert_eq!(data.augmentation().names(), augmentation);
}

#[test]
fn test_training_pipeline_without_augmentation() {
    let dir = tempdir().unwrap();
    synthetic_task(dir.path(), &[[6, 6, 6]; 3], 0);

    let mut data = MedicalDecathlonDataModule::<B>::new(config(dir.path()), Default::default());
    data.prepare_data().unwrap();
    data.setup().unwrap();

    assert_eq!(
        data.train_loader().unwrap().dataset().transform().names(),
        ["RescaleIntensity", "CropOrPad", "EnsureShapeMultiple", "OneHot"]
    );
}

#[test]
fn test_unmatched_label_fails() {
    let dir = tempdir().unwrap();
    synthetic_task(dir.path(), &[[4, 4, 4]], 0);
    let task_dir = dir.path().join(TASK);
    write_nifti(&task_dir.join("imagesTr").join("hippocampus_009.nii.gz"), [4, 4, 4], |_, _, _| 1.0);

    let mut data = MedicalDecathlonDataModule::<B>::new(config(dir.path()), Default::default());
    match data.prepare_data() {
        Err(SegmentationError::UnmatchedFiles { images, labels }) => {
            assert_eq!(images, vec!["hippocampus_009".to_string()]);
            assert!(labels.is_empty());
        }
        other => panic!("expected UnmatchedFiles, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_setup_requires_prepare() {
    let dir = tempdir().unwrap();
    let mut data = MedicalDecathlonDataModule::<B>::new(config(dir.path()), Default::default());
    assert!(matches!(data.setup(), Err(SegmentationError::NotPrepared(_))));
    assert!(matches!(data.train_loader(), Err(SegmentationError::NotPrepared(_))));
}

#[test]
fn test_batches_share_padded_shape() {
    let dir = tempdir().unwrap();
    synthetic_task(dir.path(), &[[5, 7, 6], [6, 6, 9], [4, 8, 7], [6, 5, 5]], 2);

    let cfg = config(dir.path()).with_train_val_ratio(0.5).with_augment(true);
    let mut data = MedicalDecathlonDataModule::<B>::new(cfg, Default::default());
    data.prepare_data().unwrap();
    data.setup().unwrap();
    assert_eq!(data.max_shape(), Some([6, 8, 9]));

    for loader in [data.train_loader().unwrap(), data.val_loader().unwrap()] {
        for batch in loader.iter(0) {
            let batch = batch.unwrap();
            let [n, c, d, h, w] = batch.images.dims();
            assert_eq!(c, 1);
            assert_eq!([d, h, w], [8, 8, 16]);
            let labels = batch.labels.unwrap();
            assert_eq!(labels.dims(), [n, 3, 8, 8, 16]);
            let sums = labels.sum_dim(1).into_data().to_vec::<f32>().unwrap();
            assert!(sums.iter().all(|&s| (s - 1.0).abs() < 1e-6));
        }
    }

    let test = data.test_loader().unwrap();
    assert_eq!(test.len(), 2);
    let batch = test.iter(0).next().unwrap().unwrap();
    assert!(batch.labels.is_none());
    assert_eq!(batch.images.dims(), [2, 1, 8, 8, 16]);
}

#[test]
fn test_training_items_reproducible() {
    let dir = tempdir().unwrap();
    synthetic_task(dir.path(), &[[6, 6, 6]; 3], 0);

    let cfg = config(dir.path()).with_augment(true);
    let mut data = MedicalDecathlonDataModule::<B>::new(cfg, Default::default());
    data.prepare_data().unwrap();
    data.setup().unwrap();

    let loader = data.train_loader().unwrap();
    let first = loader.iter(3).next().unwrap().unwrap().images;
    let second = loader.iter(3).next().unwrap().unwrap().images;
    let a = first.into_data().to_vec::<f32>().unwrap();
    let b = second.into_data().to_vec::<f32>().unwrap();
    assert_eq!(a, b);
}
