//! Digit classifier network (training-side).
//!
//! Fixed topology: dense 784→128 ReLU, dropout 0.2, dense 128→64 ReLU,
//! dense 64→10. The forward pass returns logits; softmax is folded into the
//! loss while fitting and appended as the output activation on export.

use burn::nn::{Dropout, DropoutConfig, Initializer, Linear, LinearConfig, Relu};
use burn::prelude::*;

use crate::error::DigitError;
use crate::ml::{Activation, DenseNetwork, Layer, INPUT_DIM, NUM_CLASSES};

/// Digit classifier configuration
#[derive(Config, Debug)]
pub struct DigitClassifierConfig {
    /// Flattened image width
    #[config(default = "INPUT_DIM")]
    pub input_dim: usize,
    /// First hidden layer width
    #[config(default = "128")]
    pub hidden_dim: usize,
    /// Second hidden layer width
    #[config(default = "64")]
    pub bottleneck_dim: usize,
    #[config(default = "NUM_CLASSES")]
    pub num_classes: usize,
    /// Dropout probability after the first hidden layer
    #[config(default = "0.2")]
    pub dropout: f64,
}

#[derive(Module, Debug)]
pub struct DigitClassifier<B: Backend> {
    hidden: Linear<B>,
    dropout: Dropout,
    bottleneck: Linear<B>,
    output: Linear<B>,
    activation: Relu,
}

impl DigitClassifierConfig {
    /// Initialize the classifier with Glorot-uniform weights
    pub fn init<B: Backend>(&self, device: &B::Device) -> DigitClassifier<B> {
        let dense = |d_input: usize, d_output: usize| {
            LinearConfig::new(d_input, d_output)
                .with_initializer(Initializer::XavierUniform { gain: 1.0 })
                .init(device)
        };

        DigitClassifier {
            hidden: dense(self.input_dim, self.hidden_dim),
            dropout: DropoutConfig::new(self.dropout).init(),
            bottleneck: dense(self.hidden_dim, self.bottleneck_dim),
            output: dense(self.bottleneck_dim, self.num_classes),
            activation: Relu::new(),
        }
    }
}

impl<B: Backend> DigitClassifier<B> {
    /// Forward pass returning class logits
    pub fn forward(&self, images: Tensor<B, 2>) -> Tensor<B, 2> {
        let x = self.hidden.forward(images);
        let x = self.activation.forward(x);
        let x = self.dropout.forward(x);
        let x = self.bottleneck.forward(x);
        let x = self.activation.forward(x);
        self.output.forward(x)
    }

    /// Class probabilities (softmax over logits)
    pub fn probabilities(&self, images: Tensor<B, 2>) -> Tensor<B, 2> {
        burn::tensor::activation::softmax(self.forward(images), 1)
    }

    /// Flatten the trained weights into the inference artifact layout.
    pub fn to_dense_network(&self, config: &DigitClassifierConfig) -> crate::error::Result<DenseNetwork> {
        Ok(DenseNetwork {
            input_dim: config.input_dim,
            layers: vec![
                export_linear(&self.hidden, Activation::Relu)?,
                Layer::Dropout {
                    rate: config.dropout,
                },
                export_linear(&self.bottleneck, Activation::Relu)?,
                export_linear(&self.output, Activation::Softmax)?,
            ],
            metadata: serde_json::Value::Null,
        })
    }
}

fn tensor_values<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> crate::error::Result<Vec<f32>> {
    tensor
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| DigitError::Model(format!("failed to read tensor data: {e:?}")))
}

fn export_linear<B: Backend>(linear: &Linear<B>, activation: Activation) -> crate::error::Result<Layer> {
    let weight = linear.weight.val();
    let [d_input, d_output] = weight.dims();
    let values = tensor_values(weight)?;

    // burn stores [d_input, d_output]; artifact rows are one per output unit
    let weights = (0..d_output)
        .map(|o| {
            (0..d_input)
                .map(|i| f64::from(values[i * d_output + o]))
                .collect()
        })
        .collect();

    let bias = match &linear.bias {
        Some(bias) => tensor_values(bias.val())?
            .into_iter()
            .map(f64::from)
            .collect(),
        None => vec![0.0; d_output],
    };

    Ok(Layer::Dense {
        weights,
        bias,
        activation,
    })
}
