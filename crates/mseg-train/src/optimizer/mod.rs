//! Optimizers for training the segmentation network.
//!
//! # Examples
//!
//! ```rust,ignore
//! use mseg_train::optimizer::{AdamWOptimizer, Optimizer};
//!
//! let mut optimizer = AdamWOptimizer::new(1e-2, 1e-2);
//! let network = optimizer.step(network, grads);
//! ```

pub mod adamw;
pub mod trait_;

pub use adamw::AdamWOptimizer;
pub use trait_::Optimizer;
