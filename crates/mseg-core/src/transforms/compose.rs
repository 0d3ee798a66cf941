use std::fmt;

use burn::tensor::backend::Backend;
use rand::RngCore;

use super::{Result, SubjectTransform};
use crate::subject::Subject;

/// An ordered, immutable sequence of transforms.
pub struct Compose<B: Backend> {
    transforms: Vec<Box<dyn SubjectTransform<B>>>,
}

impl<B: Backend> Compose<B> {
    pub fn new(transforms: Vec<Box<dyn SubjectTransform<B>>>) -> Self {
        Self { transforms }
    }

    /// Pipeline that returns subjects unchanged.
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// `self` followed by `other`.
    pub fn then(mut self, other: Compose<B>) -> Self {
        self.transforms.extend(other.transforms);
        self
    }

    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }

    /// Step names in application order.
    pub fn names(&self) -> Vec<&'static str> {
        self.transforms.iter().map(|t| t.name()).collect()
    }
}

impl<B: Backend> Default for Compose<B> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<B: Backend> fmt::Debug for Compose<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

impl<B: Backend> SubjectTransform<B> for Compose<B> {
    fn name(&self) -> &'static str {
        "Compose"
    }

    fn apply(&self, subject: Subject<B>, rng: &mut dyn RngCore) -> Result<Subject<B>> {
        self.transforms
            .iter()
            .try_fold(subject, |subject, transform| {
                tracing::trace!(transform = transform.name(), subject = subject.id(), "applying");
                transform.apply(subject, &mut *rng)
            })
    }
}
