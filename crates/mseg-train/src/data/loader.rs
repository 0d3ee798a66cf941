//! Batch iteration with parallel item loading.

use std::sync::Arc;

use burn::tensor::backend::Backend;
use rayon::prelude::*;
use rayon::ThreadPool;
use tracing::trace;

use super::batcher::{SegmentationBatch, SegmentationBatcher};
use super::dataset::SubjectsDataset;
use crate::error::{Result, SegmentationError};
use crate::validation::validate_batch_size;

/// Build a loading pool with `num_workers` threads.
pub fn loader_pool(num_workers: usize) -> Result<Arc<ThreadPool>> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(num_workers.max(1))
        .thread_name(|i| format!("mseg-loader-{}", i))
        .build()
        .map_err(|e| SegmentationError::invalid_configuration(format!("cannot build loader pool: {}", e)))?;
    Ok(Arc::new(pool))
}

/// Fixed-size batches over a [`SubjectsDataset`], in index order.
///
/// The last batch of an epoch may be shorter than `batch_size`.
pub struct SubjectLoader<B: Backend> {
    dataset: Arc<SubjectsDataset<B>>,
    batcher: SegmentationBatcher,
    batch_size: usize,
    pool: Arc<ThreadPool>,
}

impl<B: Backend> Clone for SubjectLoader<B> {
    fn clone(&self) -> Self {
        Self {
            dataset: Arc::clone(&self.dataset),
            batcher: self.batcher,
            batch_size: self.batch_size,
            pool: Arc::clone(&self.pool),
        }
    }
}

impl<B: Backend> SubjectLoader<B> {
    pub fn new(dataset: Arc<SubjectsDataset<B>>, batch_size: usize, pool: Arc<ThreadPool>) -> Result<Self> {
        validate_batch_size(batch_size)?;
        Ok(Self {
            dataset,
            batcher: SegmentationBatcher::new(),
            batch_size,
            pool,
        })
    }

    pub fn dataset(&self) -> &SubjectsDataset<B> {
        &self.dataset
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Number of items.
    pub fn len(&self) -> usize {
        self.dataset.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dataset.is_empty()
    }

    /// Number of batches per epoch.
    pub fn num_batches(&self) -> usize {
        self.dataset.len().div_ceil(self.batch_size)
    }

    /// Batches of `epoch`.
    pub fn iter(&self, epoch: usize) -> BatchIter<'_, B> {
        BatchIter {
            loader: self,
            epoch,
            next: 0,
        }
    }

    fn load_batch(&self, epoch: usize, start: usize) -> Result<SegmentationBatch<B>> {
        let end = (start + self.batch_size).min(self.dataset.len());
        trace!(epoch, start, end, "loading batch");
        let dataset = &self.dataset;
        let subjects = self.pool.install(|| {
            (start..end)
                .into_par_iter()
                .map(|index| {
                    dataset.get(index, epoch).unwrap_or_else(|| {
                        Err(SegmentationError::empty_dataset(format!("no item at index {}", index)))
                    })
                })
                .collect::<Result<Vec<_>>>()
        })?;
        self.batcher.batch(subjects)
    }
}

/// Iterator over the batches of one epoch.
pub struct BatchIter<'a, B: Backend> {
    loader: &'a SubjectLoader<B>,
    epoch: usize,
    next: usize,
}

impl<B: Backend> Iterator for BatchIter<'_, B> {
    type Item = Result<SegmentationBatch<B>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.loader.dataset.len() {
            return None;
        }
        let start = self.next;
        self.next += self.loader.batch_size;
        Some(self.loader.load_batch(self.epoch, start))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self
            .loader
            .dataset
            .len()
            .saturating_sub(self.next)
            .div_ceil(self.loader.batch_size);
        (remaining, Some(remaining))
    }
}
