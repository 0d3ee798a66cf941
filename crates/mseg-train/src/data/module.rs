//! Medical Segmentation Decathlon data module.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use burn::config::Config;
use burn::tensor::backend::Backend;
use mseg_core::transforms::{
    Compose, CropOrPad, EnsureShapeMultiple, OneHot, RandomAffine, RandomBiasField, RandomGamma, RandomMotion,
    RandomNoise, RescaleIntensity, SubjectTransform,
};
use mseg_core::{SubjectRecord, IMAGE};
use mseg_io::archive::{ArchiveManager, DatasetArchive};
use mseg_io::read_spatial_shape;
use rayon::ThreadPool;
use tracing::{debug, info};

use super::dataset::SubjectsDataset;
use super::index::{index_dataset, IndexedDataset};
use super::loader::{loader_pool, SubjectLoader};
use super::split::random_split;
use crate::error::{Result as SegResult, SegmentationError};
use crate::validation::validate_batch_size;

/// Data module configuration.
#[derive(Config, Debug)]
pub struct DataModuleConfig {
    /// Task directory name, e.g. `Task04_Hippocampus`.
    pub task: String,
    /// Google Drive file id of the task archive.
    pub google_id: String,
    /// Directory holding the extracted task.
    pub root: PathBuf,
    #[config(default = "16")]
    pub batch_size: usize,
    #[config(default = "0.8")]
    pub train_val_ratio: f64,
    #[config(default = "42")]
    pub seed: u64,
    #[config(default = "3")]
    pub num_classes: usize,
    #[config(default = "8")]
    pub shape_multiple: usize,
    #[config(default = "1")]
    pub num_workers: usize,
    #[config(default = "(-1.0, 1.0)")]
    pub intensity_range: (f32, f32),
    /// Apply random augmentation to training subjects.
    #[config(default = "true")]
    pub augment: bool,
    /// Expected SHA-256 of the archive.
    #[config(default = "None")]
    pub sha256: Option<String>,
}

impl DataModuleConfig {
    /// Configuration of the hippocampus task under `root`.
    pub fn hippocampus(root: impl Into<PathBuf>) -> Self {
        let archive = DatasetArchive::hippocampus();
        Self::new(archive.task, archive.file_id, root.into())
    }

    pub fn archive(&self) -> DatasetArchive {
        let archive = DatasetArchive::new(&self.task, &self.google_id);
        match &self.sha256 {
            Some(hash) => archive.with_sha256(hash),
            None => archive,
        }
    }

    pub fn task_dir(&self) -> PathBuf {
        self.root.join(&self.task)
    }
}

/// Download, index, split and serve a Decathlon task.
///
/// Hooks run in order: [`prepare_data`](Self::prepare_data), then
/// [`setup`](Self::setup), then the loaders.
pub struct MedicalDecathlonDataModule<B: Backend> {
    config: DataModuleConfig,
    device: B::Device,
    pool: Option<Arc<ThreadPool>>,
    indexed: Option<IndexedDataset>,
    train_records: Vec<SubjectRecord>,
    val_records: Vec<SubjectRecord>,
    max_shape: Option<[usize; 3]>,
    train_set: Option<Arc<SubjectsDataset<B>>>,
    val_set: Option<Arc<SubjectsDataset<B>>>,
    test_set: Option<Arc<SubjectsDataset<B>>>,
}

impl<B: Backend> MedicalDecathlonDataModule<B> {
    pub fn new(config: DataModuleConfig, device: B::Device) -> Self {
        Self {
            config,
            device,
            pool: None,
            indexed: None,
            train_records: Vec::new(),
            val_records: Vec::new(),
            max_shape: None,
            train_set: None,
            val_set: None,
            test_set: None,
        }
    }

    pub fn config(&self) -> &DataModuleConfig {
        &self.config
    }

    pub fn device(&self) -> &B::Device {
        &self.device
    }

    /// Fetch and extract the task archive unless it is already present.
    pub fn download_data(&self) -> SegResult<PathBuf> {
        let manager = ArchiveManager::new(&self.config.root);
        Ok(manager.acquire(&self.config.archive(), false)?)
    }

    /// Download and index the task.
    pub fn prepare_data(&mut self) -> SegResult<()> {
        let task_dir = self.download_data()?;
        let indexed = index_dataset(&task_dir)?;
        if indexed.training.is_empty() {
            return Err(SegmentationError::empty_dataset(format!(
                "no training subjects in {}",
                task_dir.display()
            )));
        }
        info!(
            training = indexed.training.len(),
            test = indexed.test.len(),
            "indexed {}",
            self.config.task
        );
        self.indexed = Some(indexed);
        Ok(())
    }

    /// Split, compute the common shape and build the datasets.
    pub fn setup(&mut self) -> SegResult<()> {
        validate_batch_size(self.config.batch_size)?;
        let indexed = self
            .indexed
            .as_ref()
            .ok_or_else(|| SegmentationError::not_prepared("setup called before prepare_data"))?;

        let (train, val) = random_split(&indexed.training, self.config.train_val_ratio, self.config.seed)?;
        if train.is_empty() || val.is_empty() {
            return Err(SegmentationError::empty_dataset(format!(
                "split of {} subjects with ratio {} leaves an empty side",
                indexed.training.len(),
                self.config.train_val_ratio
            )));
        }

        // Test subjects take part so that every loader shares one shape.
        let all: Vec<&SubjectRecord> = indexed.training.iter().chain(indexed.test.iter()).collect();
        let max_shape = max_shape(all)?;
        info!(
            train = train.len(),
            val = val.len(),
            test = indexed.test.len(),
            ?max_shape,
            "data module ready"
        );

        // One pipeline per dataset: `Compose` owns boxed steps and is not `Clone`.
        let preprocessing = || self.preprocessing_for(max_shape);
        let train_transform = if self.config.augment {
            preprocessing().then(augmentation())
        } else {
            preprocessing()
        };
        debug!(train = ?train_transform, "training pipeline");

        let seed = self.config.seed;
        let train_set = SubjectsDataset::new(train.clone(), train_transform, self.device.clone(), seed);
        let val_set = SubjectsDataset::new(val.clone(), preprocessing(), self.device.clone(), seed);
        let test_set = SubjectsDataset::new(indexed.test.clone(), preprocessing(), self.device.clone(), seed);

        self.train_set = Some(Arc::new(train_set));
        self.val_set = Some(Arc::new(val_set));
        self.test_set = Some(Arc::new(test_set));
        self.train_records = train;
        self.val_records = val;
        self.max_shape = Some(max_shape);
        self.pool = Some(loader_pool(self.config.num_workers)?);
        Ok(())
    }

    /// Deterministic pipeline applied to every subject.
    ///
    /// Fails until [`setup`](Self::setup) has computed the common shape.
    pub fn preprocessing(&self) -> SegResult<Compose<B>> {
        let shape = self
            .max_shape
            .ok_or_else(|| SegmentationError::not_prepared("preprocessing needs setup"))?;
        Ok(self.preprocessing_for(shape))
    }

    /// Random augmentation applied to training subjects after preprocessing.
    pub fn augmentation(&self) -> Compose<B> {
        augmentation()
    }

    fn preprocessing_for(&self, shape: [usize; 3]) -> Compose<B> {
        let (low, high) = self.config.intensity_range;
        let steps: Vec<Box<dyn SubjectTransform<B>>> = vec![
            Box::new(RescaleIntensity::new(low, high)),
            Box::new(CropOrPad::new(shape)),
            Box::new(EnsureShapeMultiple::new(self.config.shape_multiple)),
            Box::new(OneHot::with_num_classes(self.config.num_classes)),
        ];
        Compose::new(steps)
    }

    pub fn train_loader(&self) -> SegResult<SubjectLoader<B>> {
        self.loader(&self.train_set, "train")
    }

    pub fn val_loader(&self) -> SegResult<SubjectLoader<B>> {
        self.loader(&self.val_set, "validation")
    }

    pub fn test_loader(&self) -> SegResult<SubjectLoader<B>> {
        self.loader(&self.test_set, "test")
    }

    fn loader(&self, set: &Option<Arc<SubjectsDataset<B>>>, name: &str) -> SegResult<SubjectLoader<B>> {
        let dataset = set
            .as_ref()
            .ok_or_else(|| SegmentationError::not_prepared(format!("{} loader needs setup", name)))?;
        let pool = self
            .pool
            .as_ref()
            .ok_or_else(|| SegmentationError::not_prepared(format!("{} loader needs setup", name)))?;
        SubjectLoader::new(Arc::clone(dataset), self.config.batch_size, Arc::clone(pool))
    }

    /// Per-axis maximum `[D, H, W]` over the whole pool, after `setup`.
    pub fn max_shape(&self) -> Option<[usize; 3]> {
        self.max_shape
    }

    pub fn train_records(&self) -> &[SubjectRecord] {
        &self.train_records
    }

    pub fn val_records(&self) -> &[SubjectRecord] {
        &self.val_records
    }

    pub fn test_records(&self) -> &[SubjectRecord] {
        self.indexed.as_ref().map(|i| i.test.as_slice()).unwrap_or(&[])
    }
}

fn augmentation<B: Backend>() -> Compose<B> {
    let steps: Vec<Box<dyn SubjectTransform<B>>> = vec![
        Box::new(RandomAffine::new()),
        Box::new(RandomGamma::new()),
        Box::new(RandomNoise::new()),
        Box::new(RandomMotion::new()),
        Box::new(RandomBiasField::new()),
    ];
    Compose::new(steps)
}

/// Per-axis maximum image shape read from NIfTI headers.
pub fn max_shape<'a>(records: impl IntoIterator<Item = &'a SubjectRecord>) -> SegResult<[usize; 3]> {
    let mut max = [0usize; 3];
    let mut seen = false;
    for record in records {
        let source = record
            .get(IMAGE)
            .ok_or_else(|| SegmentationError::invalid_configuration(format!("{} has no image", record.id())))?;
        let shape = read_spatial_shape(source.path())?;
        for (m, s) in max.iter_mut().zip(shape) {
            *m = (*m).max(s);
        }
        seen = true;
    }
    if !seen {
        return Err(SegmentationError::empty_dataset("cannot compute a shape without subjects"));
    }
    Ok(max)
}

/// Indexed task directory without downloading.
pub fn index_task(root: &Path, task: &str) -> SegResult<IndexedDataset> {
    index_dataset(&root.join(task))
}
