//! MobileNetV2 image classifier on Candle
//!
//! Tensor names follow the torchvision layout (`features.<i>...`,
//! `classifier.<j>...`), so a state dict exported from the training program
//! loads without renaming once the schema prefix is stripped.

use crate::classifier::ImageClassifier;
use crate::model_config::HeadConfig;
use candle_core::{Tensor, D};
use candle_nn::{BatchNorm, Conv2d, Conv2dConfig, Linear, Module, ModuleT, VarBuilder};
use dermascan_core::{Error, Result};

const BN_EPS: f64 = 1e-5;
const ROUND_NEAREST: usize = 8;

/// (expand ratio, output channels, repeats, first stride)
const INVERTED_RESIDUAL_SETTING: [(usize, usize, usize, usize); 7] = [
    (1, 16, 1, 1),
    (6, 24, 2, 2),
    (6, 32, 3, 2),
    (6, 64, 4, 2),
    (6, 96, 3, 1),
    (6, 160, 3, 2),
    (6, 320, 1, 1),
];

fn load_err(e: candle_core::Error) -> Error {
    Error::model_load(format!("failed to build MobileNetV2: {}", e))
}

fn forward_err(e: candle_core::Error) -> Error {
    Error::inference(format!("MobileNetV2 forward pass failed: {}", e))
}

/// Round channel counts to a multiple of `divisor`, never dropping more than 10%
pub fn make_divisible(value: f64, divisor: usize) -> usize {
    let rounded = ((value + divisor as f64 / 2.0) as usize / divisor) * divisor;
    let rounded = rounded.max(divisor);
    if (rounded as f64) < 0.9 * value {
        rounded + divisor
    } else {
        rounded
    }
}

/// Conv2d -> BatchNorm -> ReLU6
struct ConvBnAct {
    conv: Conv2d,
    bn: BatchNorm,
}

impl ConvBnAct {
    fn new(
        vb: VarBuilder,
        in_channels: usize,
        out_channels: usize,
        kernel: usize,
        stride: usize,
        groups: usize,
    ) -> candle_core::Result<Self> {
        let cfg = Conv2dConfig {
            padding: (kernel - 1) / 2,
            stride,
            groups,
            ..Default::default()
        };
        let conv = candle_nn::conv2d_no_bias(in_channels, out_channels, kernel, cfg, vb.pp("0"))?;
        let bn = candle_nn::batch_norm(out_channels, BN_EPS, vb.pp("1"))?;
        Ok(Self { conv, bn })
    }

    fn forward(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        xs.apply(&self.conv)?.apply_t(&self.bn, false)?.clamp(0f32, 6f32)
    }
}

struct InvertedResidual {
    expand: Option<ConvBnAct>,
    depthwise: ConvBnAct,
    project: Conv2d,
    project_bn: BatchNorm,
    use_residual: bool,
}

impl InvertedResidual {
    fn new(
        vb: VarBuilder,
        in_channels: usize,
        out_channels: usize,
        stride: usize,
        expand_ratio: usize,
    ) -> candle_core::Result<Self> {
        let hidden = in_channels * expand_ratio;
        let vb = vb.pp("conv");

        // torchvision drops the expansion layer when the ratio is 1, which
        // shifts every following index down by one.
        let (expand, offset) = if expand_ratio != 1 {
            let layer = ConvBnAct::new(vb.pp("0"), in_channels, hidden, 1, 1, 1)?;
            (Some(layer), 1)
        } else {
            (None, 0)
        };

        let depthwise = ConvBnAct::new(vb.pp(offset.to_string()), hidden, hidden, 3, stride, hidden)?;
        let project = candle_nn::conv2d_no_bias(
            hidden,
            out_channels,
            1,
            Conv2dConfig::default(),
            vb.pp((offset + 1).to_string()),
        )?;
        let project_bn = candle_nn::batch_norm(out_channels, BN_EPS, vb.pp((offset + 2).to_string()))?;

        Ok(Self {
            expand,
            depthwise,
            project,
            project_bn,
            use_residual: stride == 1 && in_channels == out_channels,
        })
    }

    fn forward(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        let mut ys = match &self.expand {
            Some(expand) => expand.forward(xs)?,
            None => xs.clone(),
        };
        ys = self.depthwise.forward(&ys)?;
        ys = ys.apply(&self.project)?.apply_t(&self.project_bn, false)?;
        if self.use_residual {
            ys + xs
        } else {
            Ok(ys)
        }
    }
}

enum HeadLayer {
    Linear(Linear),
    Relu,
    BatchNorm(BatchNorm),
}

/// Fully connected classification head
struct ClassifierHead {
    layers: Vec<HeadLayer>,
}

impl ClassifierHead {
    fn new(
        vb: VarBuilder,
        in_features: usize,
        num_classes: usize,
        config: &HeadConfig,
    ) -> candle_core::Result<Self> {
        let linear = |i: usize, o: usize, vb: VarBuilder| {
            if config.bias {
                candle_nn::linear(i, o, vb)
            } else {
                candle_nn::linear_no_bias(i, o, vb)
            }
        };

        let mut layers = Vec::new();
        let mut index = usize::from(config.dropout);
        let mut width = in_features;

        for &hidden in &config.hidden {
            layers.push(HeadLayer::Linear(linear(width, hidden, vb.pp(index.to_string()))?));
            layers.push(HeadLayer::Relu);
            index += 2;
            if config.batch_norm {
                layers.push(HeadLayer::BatchNorm(candle_nn::batch_norm(
                    hidden,
                    BN_EPS,
                    vb.pp(index.to_string()),
                )?));
                index += 1;
            }
            width = hidden;
        }

        layers.push(HeadLayer::Linear(linear(width, num_classes, vb.pp(index.to_string()))?));
        index += 1;

        if config.output_batch_norm {
            layers.push(HeadLayer::BatchNorm(candle_nn::batch_norm(
                num_classes,
                BN_EPS,
                vb.pp(index.to_string()),
            )?));
        }

        Ok(Self { layers })
    }

    fn forward(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        let mut xs = xs.clone();
        for layer in &self.layers {
            xs = match layer {
                HeadLayer::Linear(l) => l.forward(&xs)?,
                HeadLayer::Relu => xs.relu()?,
                HeadLayer::BatchNorm(bn) => bn.forward_t(&xs, false)?,
            };
        }
        Ok(xs)
    }
}

/// MobileNetV2 classifier, frozen in inference mode
pub struct MobileNetV2 {
    name: String,
    stem: ConvBnAct,
    blocks: Vec<InvertedResidual>,
    last: ConvBnAct,
    head: ClassifierHead,
    input_size: usize,
    num_classes: usize,
}

impl MobileNetV2 {
    /// Build the network, reading every weight from `vb`
    pub fn new(
        name: impl Into<String>,
        vb: VarBuilder,
        num_classes: usize,
        width_mult: f64,
        head: &HeadConfig,
        input_size: usize,
    ) -> Result<Self> {
        if num_classes == 0 {
            return Err(Error::model_load("num_classes must be at least 1"));
        }
        if width_mult <= 0.0 {
            return Err(Error::model_load("width_mult must be positive"));
        }

        let features = vb.pp("features");
        let mut input_channel = make_divisible(32.0 * width_mult, ROUND_NEAREST);
        let last_channel = make_divisible(1280.0 * width_mult.max(1.0), ROUND_NEAREST);

        let stem = ConvBnAct::new(features.pp("0"), 3, input_channel, 3, 2, 1).map_err(load_err)?;

        let mut blocks = Vec::new();
        let mut index = 1;
        for (t, c, n, s) in INVERTED_RESIDUAL_SETTING {
            let output_channel = make_divisible(c as f64 * width_mult, ROUND_NEAREST);
            for i in 0..n {
                let stride = if i == 0 { s } else { 1 };
                let block = InvertedResidual::new(
                    features.pp(index.to_string()),
                    input_channel,
                    output_channel,
                    stride,
                    t,
                )
                .map_err(load_err)?;
                blocks.push(block);
                input_channel = output_channel;
                index += 1;
            }
        }

        let last = ConvBnAct::new(features.pp(index.to_string()), input_channel, last_channel, 1, 1, 1)
            .map_err(load_err)?;

        let head = ClassifierHead::new(vb.pp("classifier"), last_channel, num_classes, head)
            .map_err(load_err)?;

        Ok(Self {
            name: name.into(),
            stem,
            blocks,
            last,
            head,
            input_size,
            num_classes,
        })
    }

    fn forward_impl(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        let mut xs = self.stem.forward(xs)?;
        for block in &self.blocks {
            xs = block.forward(&xs)?;
        }
        xs = self.last.forward(&xs)?;
        // Global average pool over H and W
        let pooled = xs.mean_keepdim(D::Minus1)?.mean_keepdim(D::Minus2)?.flatten_from(1)?;
        self.head.forward(&pooled)
    }
}

impl ImageClassifier for MobileNetV2 {
    fn forward(&self, input: &Tensor) -> Result<Tensor> {
        self.forward_impl(input).map_err(forward_err)
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn input_size(&self) -> usize {
        self.input_size
    }

    fn output_width(&self) -> usize {
        self.num_classes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};

    #[test]
    fn test_make_divisible() {
        assert_eq!(make_divisible(32.0, 8), 32);
        assert_eq!(make_divisible(1280.0, 8), 1280);
        assert_eq!(make_divisible(32.0 * 0.35, 8), 16);
        assert_eq!(make_divisible(3.0, 8), 8);
    }

    #[test]
    fn test_block_count_matches_torchvision() {
        let vb = VarBuilder::zeros(DType::F32, &Device::Cpu);
        let model = MobileNetV2::new("zeros", vb, 7, 1.0, &HeadConfig::default(), 64).unwrap();
        assert_eq!(model.blocks.len(), 17);
        assert_eq!(model.output_width(), 7);
        assert_eq!(model.input_size(), 64);
    }

    #[test]
    fn test_forward_shape() {
        let vb = VarBuilder::zeros(DType::F32, &Device::Cpu);
        let model = MobileNetV2::new("zeros", vb, 7, 0.5, &HeadConfig::default(), 64).unwrap();

        let input = Tensor::zeros((1, 3, 64, 64), DType::F32, &Device::Cpu).unwrap();
        let logits = model.forward(&input).unwrap();
        assert_eq!(logits.dims(), &[1, 7]);
    }

    #[test]
    fn test_torchvision_head() {
        let vb = VarBuilder::zeros(DType::F32, &Device::Cpu);
        let model = MobileNetV2::new("tv", vb, 3, 0.5, &HeadConfig::torchvision(), 64).unwrap();

        let input = Tensor::zeros((2, 3, 64, 64), DType::F32, &Device::Cpu).unwrap();
        let logits = model.forward(&input).unwrap();
        assert_eq!(logits.dims(), &[2, 3]);
    }
}
