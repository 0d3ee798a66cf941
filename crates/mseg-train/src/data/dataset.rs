//! Lazily loaded, transformed subjects.

use std::sync::Arc;

use burn::tensor::backend::Backend;
use mseg_core::transforms::{Compose, SubjectTransform};
use mseg_core::{Subject, SubjectRecord};
use mseg_io::read_volume;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::error::Result;

/// Subjects read from disk on access and passed through a pipeline.
///
/// The pipeline RNG for item `index` in `epoch` is seeded from
/// `(seed, epoch, index)`, so an item looks the same however it is
/// scheduled, while augmentation still varies between epochs.
pub struct SubjectsDataset<B: Backend> {
    records: Vec<SubjectRecord>,
    transform: Arc<Compose<B>>,
    device: B::Device,
    seed: u64,
}

impl<B: Backend> SubjectsDataset<B> {
    pub fn new(records: Vec<SubjectRecord>, transform: Compose<B>, device: B::Device, seed: u64) -> Self {
        Self {
            records,
            transform: Arc::new(transform),
            device,
            seed,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[SubjectRecord] {
        &self.records
    }

    pub fn transform(&self) -> &Compose<B> {
        &self.transform
    }

    pub fn device(&self) -> &B::Device {
        &self.device
    }

    /// Load and transform item `index` for `epoch`.
    ///
    /// Returns `None` past the end.
    pub fn get(&self, index: usize, epoch: usize) -> Option<Result<Subject<B>>> {
        let record = self.records.get(index)?;
        Some(self.load_transformed(record, item_seed(self.seed, epoch, index)))
    }

    fn load_transformed(&self, record: &SubjectRecord, seed: u64) -> Result<Subject<B>> {
        let subject = load_subject(record, &self.device)?;
        let mut rng = StdRng::seed_from_u64(seed);
        Ok(self.transform.apply(subject, &mut rng)?)
    }
}

/// Read every image of a record.
pub fn load_subject<B: Backend>(record: &SubjectRecord, device: &B::Device) -> Result<Subject<B>> {
    let mut subject = Subject::new(record.id());
    for (role, source) in record.images() {
        let volume = read_volume::<B>(source, device)?;
        subject = subject.with_image(role, volume);
    }
    Ok(subject)
}

/// Mix a base seed with epoch and item index (SplitMix64 finaliser).
pub fn item_seed(seed: u64, epoch: usize, index: usize) -> u64 {
    let mut z = seed
        .wrapping_add((epoch as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15))
        .wrapping_add((index as u64).wrapping_mul(0xBF58_476D_1CE4_E5B9));
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}
