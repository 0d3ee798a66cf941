//! 3D U-Net for volumetric segmentation.
//!
//! # Architecture
//!
//! ```text
//! Input: [batch, in, D, H, W]
//!          │
//!          ▼
//!    ┌──────────────┐                                   ┌──────────────┐
//!    │ Down 0 (s=2) │──────────── skip 0 ──────────────►│ Up 0 (convT) │──► [batch, out, D, H, W]
//!    └──────────────┘                                   └──────────────┘
//!          │                                                   ▲
//!          ▼                                                   │
//!    ┌──────────────┐                                   ┌──────────────┐
//!    │ Down 1 (s=2) │──────────── skip 1 ──────────────►│     Up 1     │
//!    └──────────────┘                                   └──────────────┘
//!          │                                                   ▲
//!          ▼                                                   │
//!    ┌──────────────┐                                   ┌──────────────┐
//!    │ Down 2 (s=2) │──────────── skip 2 ──────────────►│     Up 2     │
//!    └──────────────┘                                   └──────────────┘
//!          │                                                   ▲
//!          ▼                                                   │
//!    ┌──────────────┐                                          │
//!    │ Bottom (s=1) │──────────────────────────────────────────┘
//!    └──────────────┘
//! ```
//!
//! Every up block sees `concat(skip, deeper)` along channels. Spatial
//! dimensions of the input must be divisible by the product of the strides.

use burn::nn::conv::{Conv3d, Conv3dConfig, ConvTranspose3d, ConvTranspose3dConfig};
use burn::nn::{InstanceNorm, InstanceNormConfig, PRelu, PReluConfig, PaddingConfig3d};
use burn::prelude::*;

/// Configuration for [`UNet3d`].
#[derive(Config, Debug, PartialEq)]
pub struct UNet3dConfig {
    /// Number of input channels
    #[config(default = "1")]
    pub in_channels: usize,
    /// Number of output classes, background included
    #[config(default = "3")]
    pub out_channels: usize,
    /// Feature channels per level, last entry is the bottom
    #[config(default = "vec![8, 16, 32, 64]")]
    pub channels: Vec<usize>,
    /// Downsampling stride per level, one fewer than `channels`
    #[config(default = "vec![2, 2, 2]")]
    pub strides: Vec<usize>,
}

impl UNet3dConfig {
    /// Factor every spatial input dimension must be divisible by.
    pub fn stride_product(&self) -> usize {
        self.strides.iter().product()
    }

    /// Initialize a network.
    ///
    /// # Panics
    /// If `channels` has fewer than two entries or `strides` is not one
    /// shorter than `channels`.
    pub fn init<B: Backend>(&self, device: &B::Device) -> UNet3d<B> {
        assert!(self.channels.len() >= 2, "U-Net needs at least two channel levels");
        assert_eq!(
            self.strides.len(),
            self.channels.len() - 1,
            "U-Net needs one stride per down level"
        );

        let levels = self.strides.len();
        let last = self.channels.len() - 1;

        let downs = (0..levels)
            .map(|i| {
                let in_ch = if i == 0 { self.in_channels } else { self.channels[i - 1] };
                ConvBlockConfig::new(in_ch, self.channels[i], self.strides[i]).init(device)
            })
            .collect();

        let bottom = ConvBlockConfig::new(self.channels[last - 1], self.channels[last], 1).init(device);

        let ups = (0..levels)
            .map(|i| {
                let in_ch = if i == levels - 1 {
                    self.channels[i] + self.channels[last]
                } else {
                    2 * self.channels[i]
                };
                let out_ch = if i == 0 { self.out_channels } else { self.channels[i - 1] };
                UpBlockConfig::new(in_ch, out_ch, self.strides[i])
                    .with_conv_only(i == 0)
                    .init(device)
            })
            .collect();

        UNet3d { downs, bottom, ups }
    }
}

/// 3D U-Net.
#[derive(Module, Debug)]
pub struct UNet3d<B: Backend> {
    downs: Vec<ConvBlock<B>>,
    bottom: ConvBlock<B>,
    ups: Vec<UpBlock<B>>,
}

impl<B: Backend> UNet3d<B> {
    /// Forward pass: `[batch, in, D, H, W]` → logits `[batch, out, D, H, W]`.
    pub fn forward(&self, input: Tensor<B, 5>) -> Tensor<B, 5> {
        let mut skips = Vec::with_capacity(self.downs.len());
        let mut x = input;
        for down in &self.downs {
            x = down.forward(x);
            skips.push(x.clone());
        }

        x = self.bottom.forward(x);

        for (up, skip) in self.ups.iter().zip(skips).rev() {
            x = up.forward(Tensor::cat(vec![skip, x], 1));
        }
        x
    }
}

/// Instance norm without learnable scale and shift.
fn instance_norm<B: Backend>(channels: usize, device: &B::Device) -> InstanceNorm<B> {
    InstanceNormConfig::new(channels).with_affine(false).init(device)
}

#[derive(Config, Debug)]
struct ConvBlockConfig {
    in_channels: usize,
    out_channels: usize,
    stride: usize,
}

impl ConvBlockConfig {
    fn init<B: Backend>(&self, device: &B::Device) -> ConvBlock<B> {
        ConvBlock {
            conv: Conv3dConfig::new([self.in_channels, self.out_channels], [3, 3, 3])
                .with_stride([self.stride; 3])
                .with_padding(PaddingConfig3d::Explicit(1, 1, 1))
                .init(device),
            norm: instance_norm(self.out_channels, device),
            activation: PReluConfig::new().init(device),
        }
    }
}

/// Convolution, instance norm, PReLU.
#[derive(Module, Debug)]
struct ConvBlock<B: Backend> {
    conv: Conv3d<B>,
    norm: InstanceNorm<B>,
    activation: PRelu<B>,
}

impl<B: Backend> ConvBlock<B> {
    fn forward(&self, x: Tensor<B, 5>) -> Tensor<B, 5> {
        let x = self.conv.forward(x);
        let x = self.norm.forward(x);
        self.activation.forward(x)
    }
}

#[derive(Config, Debug)]
struct UpBlockConfig {
    in_channels: usize,
    out_channels: usize,
    stride: usize,
    #[config(default = "false")]
    conv_only: bool,
}

impl UpBlockConfig {
    fn init<B: Backend>(&self, device: &B::Device) -> UpBlock<B> {
        let conv = ConvTranspose3dConfig::new([self.in_channels, self.out_channels], [3, 3, 3])
            .with_stride([self.stride; 3])
            .with_padding([1, 1, 1])
            .with_padding_out([self.stride - 1; 3])
            .init(device);
        let (norm, activation) = if self.conv_only {
            (None, None)
        } else {
            (
                Some(instance_norm(self.out_channels, device)),
                Some(PReluConfig::new().init(device)),
            )
        };
        UpBlock {
            conv,
            norm,
            activation,
        }
    }
}

/// Transposed convolution, optionally followed by instance norm and PReLU.
#[derive(Module, Debug)]
struct UpBlock<B: Backend> {
    conv: ConvTranspose3d<B>,
    norm: Option<InstanceNorm<B>>,
    activation: Option<PRelu<B>>,
}

impl<B: Backend> UpBlock<B> {
    fn forward(&self, x: Tensor<B, 5>) -> Tensor<B, 5> {
        let mut x = self.conv.forward(x);
        if let Some(norm) = &self.norm {
            x = norm.forward(x);
        }
        if let Some(activation) = &self.activation {
            x = activation.forward(x);
        }
        x
    }
}
