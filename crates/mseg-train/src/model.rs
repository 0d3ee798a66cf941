//! Segmentation model wrapper: network, loss and step functions.

use burn::module::AutodiffModule;
use burn::optim::GradientsParams;
use burn::tensor::backend::{AutodiffBackend, Backend};
use burn::tensor::{ElementConversion, Tensor};
use mseg_model::{DiceCeLoss, DiceCeLossConfig, UNet3d, UNet3dConfig};

use crate::data::SegmentationBatch;
use crate::error::{Result, SegmentationError};
use crate::validation::validate_loss;

/// Scalar result of a training or validation step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepOutput {
    pub loss: f64,
    pub batch_size: usize,
}

/// A U-Net with its loss and learning rate.
///
/// The optimizer lives in the [`Trainer`](crate::trainer::Trainer).
#[derive(Debug, Clone)]
pub struct SegmentationModel<B: Backend> {
    network: UNet3d<B>,
    loss: DiceCeLoss,
    learning_rate: f64,
    stride_product: usize,
}

impl<B: Backend> SegmentationModel<B> {
    /// Initialise a fresh network.
    pub fn new(
        network: &UNet3dConfig,
        loss: &DiceCeLossConfig,
        learning_rate: f64,
        device: &B::Device,
    ) -> Self {
        Self::from_network(network.init(device), loss.init(), learning_rate, network.stride_product())
    }

    pub fn from_network(network: UNet3d<B>, loss: DiceCeLoss, learning_rate: f64, stride_product: usize) -> Self {
        Self {
            network,
            loss,
            learning_rate,
            stride_product,
        }
    }

    pub fn network(&self) -> &UNet3d<B> {
        &self.network
    }

    pub fn into_network(self) -> UNet3d<B> {
        self.network
    }

    /// Replace the network by `f(network)`, e.g. an optimizer step.
    pub fn map_network<F>(self, f: F) -> Self
    where
        F: FnOnce(UNet3d<B>) -> UNet3d<B>,
    {
        Self {
            network: f(self.network),
            ..self
        }
    }

    pub fn loss(&self) -> &DiceCeLoss {
        &self.loss
    }

    pub fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    /// `(images, labels)` of a labeled batch.
    pub fn prepare_batch(&self, batch: &SegmentationBatch<B>) -> Result<(Tensor<B, 5>, Tensor<B, 5>)> {
        let labels = batch.labels.clone().ok_or_else(|| {
            SegmentationError::invalid_configuration(format!("batch {:?} has no labels", batch.ids))
        })?;
        Ok((batch.images.clone(), labels))
    }

    /// Network logits for `images`.
    pub fn forward(&self, images: Tensor<B, 5>) -> Result<Tensor<B, 5>> {
        let [_, _, d, h, w] = images.dims();
        let stride = self.stride_product.max(1);
        if [d, h, w].iter().any(|s| s % stride != 0) {
            return Err(SegmentationError::invalid_configuration(format!(
                "input shape {:?} is not divisible by {}",
                [d, h, w],
                stride
            )));
        }
        Ok(self.network.forward(images))
    }

    /// `(logits, labels)` of a labeled batch.
    pub fn infer_batch(&self, batch: &SegmentationBatch<B>) -> Result<(Tensor<B, 5>, Tensor<B, 5>)> {
        let (images, labels) = self.prepare_batch(batch)?;
        Ok((self.forward(images)?, labels))
    }

    /// Loss tensor of a labeled batch.
    pub fn batch_loss(&self, batch: &SegmentationBatch<B>) -> Result<Tensor<B, 1>> {
        let (logits, labels) = self.infer_batch(batch)?;
        Ok(self.loss.forward(logits, labels))
    }

    /// Validation loss of a batch.
    pub fn validation_step(&self, batch: &SegmentationBatch<B>, batch_idx: usize) -> Result<StepOutput> {
        let loss = self.batch_loss(batch)?.into_scalar().elem::<f64>();
        let loss = validate_loss(loss, &format!("validation batch {}", batch_idx))?;
        tracing::trace!(batch_idx, val_loss = loss, "validation step");
        Ok(StepOutput {
            loss,
            batch_size: batch.len(),
        })
    }
}

impl<B: AutodiffBackend> SegmentationModel<B> {
    /// Training loss of a batch and the gradients of the network parameters.
    pub fn training_step(
        &self,
        batch: &SegmentationBatch<B>,
        batch_idx: usize,
    ) -> Result<(StepOutput, GradientsParams)> {
        let loss = self.batch_loss(batch)?;
        let value = validate_loss(
            loss.clone().into_scalar().elem::<f64>(),
            &format!("training batch {}", batch_idx),
        )?;
        let grads = loss.backward();
        let grads = GradientsParams::from_grads(grads, &self.network);
        tracing::trace!(batch_idx, train_loss = value, "training step");
        Ok((
            StepOutput {
                loss: value,
                batch_size: batch.len(),
            },
            grads,
        ))
    }

    /// The same model on the inner backend, without a gradient graph.
    pub fn valid(&self) -> SegmentationModel<B::InnerBackend> {
        SegmentationModel {
            network: self.network.valid(),
            loss: self.loss,
            learning_rate: self.learning_rate,
            stride_product: self.stride_product,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::Autodiff;
    use burn_ndarray::NdArray;
    use mseg_core::ImageMetadata;

    type TestBackend = NdArray<f32>;
    type TestAutodiffBackend = Autodiff<TestBackend>;

    fn small_config() -> UNet3dConfig {
        UNet3dConfig::new().with_channels(vec![2, 4]).with_strides(vec![2])
    }

    fn batch<B: Backend>(labeled: bool, device: &B::Device) -> SegmentationBatch<B> {
        let images = Tensor::<B, 5>::ones([1, 1, 4, 4, 4], device);
        let background = Tensor::<B, 5>::ones([1, 1, 4, 4, 4], device);
        let foreground = Tensor::<B, 5>::zeros([1, 2, 4, 4, 4], device);
        SegmentationBatch {
            images,
            labels: labeled.then(|| Tensor::cat(vec![background, foreground], 1)),
            ids: vec!["s0".to_string()],
            metadata: vec![ImageMetadata::default()],
        }
    }

    #[test]
    fn test_validation_step() {
        let device = Default::default();
        let model = SegmentationModel::<TestBackend>::new(&small_config(), &DiceCeLossConfig::new(), 1e-2, &device);
        let output = model.validation_step(&batch(true, &device), 0).unwrap();
        assert!(output.loss.is_finite());
        assert_eq!(output.batch_size, 1);
    }

    #[test]
    fn test_unlabeled_batch_rejected() {
        let device = Default::default();
        let model = SegmentationModel::<TestBackend>::new(&small_config(), &DiceCeLossConfig::new(), 1e-2, &device);
        assert!(model.prepare_batch(&batch(false, &device)).is_err());
    }

    #[test]
    fn test_indivisible_shape_rejected() {
        let device = Default::default();
        let model = SegmentationModel::<TestBackend>::new(&small_config(), &DiceCeLossConfig::new(), 1e-2, &device);
        let images = Tensor::<TestBackend, 5>::zeros([1, 1, 4, 4, 5], &device);
        assert!(matches!(
            model.forward(images),
            Err(SegmentationError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_training_step_gradients() {
        let device = Default::default();
        let model =
            SegmentationModel::<TestAutodiffBackend>::new(&small_config(), &DiceCeLossConfig::new(), 1e-2, &device);
        let (output, grads) = model.training_step(&batch(true, &device), 0).unwrap();
        assert!(output.loss.is_finite());
        assert!(!grads.is_empty());

        let inner = model.valid();
        let val = inner.validation_step(&batch(true, &device), 0).unwrap();
        assert!((val.loss - output.loss).abs() < 1e-4);
    }
}
