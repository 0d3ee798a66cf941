//! Segmentation network, loss and metric on burn.

pub mod loss;
pub mod metric;
pub mod unet;

pub use loss::{DiceCeLoss, DiceCeLossConfig};
pub use metric::{argmax_labels, one_hot_from_logits, DiceMetric};
pub use unet::{UNet3d, UNet3dConfig};
