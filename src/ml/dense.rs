//! Dense neural network inference (CPU-only).
//!
//! The network is an explicit ordered list of typed layer descriptors loaded
//! from a JSON artifact. Inference walks that list once, recording every
//! layer's output so callers get both the final probabilities and the full
//! activation trace from a single pass.
//!
//! Design goals:
//! - Stable, deterministic, dependency-light.
//! - Explicit shape validation (fail fast at load time, not per request).

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{DigitError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    Linear,
    Relu,
    Softmax,
}

impl Default for Activation {
    fn default() -> Self {
        Self::Linear
    }
}

impl Activation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Linear => "linear",
            Self::Relu => "relu",
            Self::Softmax => "softmax",
        }
    }

    fn apply(&self, values: &mut [f64]) {
        match self {
            Self::Linear => {}
            Self::Relu => values.iter_mut().for_each(|v| *v = v.max(0.0)),
            Self::Softmax => softmax_in_place(values),
        }
    }
}

/// One step of the forward pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Layer {
    Dense {
        /// Weights shape: [out_dim][in_dim]
        weights: Vec<Vec<f64>>,
        /// Bias shape: [out_dim]
        bias: Vec<f64>,
        #[serde(default)]
        activation: Activation,
    },
    /// Regularization used while fitting; identity at inference time.
    Dropout { rate: f64 },
}

impl Layer {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Dense { .. } => "dense",
            Self::Dropout { .. } => "dropout",
        }
    }

    /// Output width given the width flowing in.
    pub fn output_dim(&self, input_dim: usize) -> usize {
        match self {
            Self::Dense { weights, .. } => weights.len(),
            Self::Dropout { .. } => input_dim,
        }
    }

    fn forward(&self, x: &[f64]) -> Vec<f64> {
        match self {
            Self::Dense {
                weights,
                bias,
                activation,
            } => {
                let mut y: Vec<f64> = weights
                    .iter()
                    .zip(bias)
                    .map(|(row, b)| row.iter().zip(x).fold(*b, |acc, (w, xi)| acc + w * xi))
                    .collect();
                activation.apply(&mut y);
                y
            }
            Self::Dropout { .. } => x.to_vec(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DenseNetwork {
    /// Expected input dimension.
    pub input_dim: usize,

    pub layers: Vec<Layer>,

    /// Optional free-form metadata (training summary, timestamps, etc).
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl DenseNetwork {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)?;
        let model: Self = serde_json::from_str(&content)?;
        model.validate().map_err(DigitError::Model)?;
        Ok(model)
    }

    /// Write the artifact in one step: serialize to a sibling temp file, then
    /// rename over the target so readers never observe a partial file.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.validate().map_err(DigitError::Model)?;

        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".partial");
        let tmp = std::path::PathBuf::from(tmp);

        let payload = serde_json::to_vec(self)?;
        std::fs::write(&tmp, payload)?;
        if let Err(e) = std::fs::rename(&tmp, path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(e.into());
        }
        Ok(())
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.input_dim == 0 {
            return Err("input_dim must be > 0".to_string());
        }
        if self.layers.is_empty() {
            return Err("layers must not be empty".to_string());
        }

        let mut expected_in = self.input_dim;
        for (idx, layer) in self.layers.iter().enumerate() {
            match layer {
                Layer::Dense { weights, bias, .. } => {
                    if weights.is_empty() {
                        return Err(format!("layer[{idx}] out_dim must be > 0"));
                    }
                    if bias.len() != weights.len() {
                        return Err(format!(
                            "layer[{idx}] bias len {} != out_dim {}",
                            bias.len(),
                            weights.len()
                        ));
                    }
                    for (r, row) in weights.iter().enumerate() {
                        if row.len() != expected_in {
                            return Err(format!(
                                "layer[{idx}] weights row {r} len {} != expected in_dim {expected_in}",
                                row.len()
                            ));
                        }
                        if row.iter().any(|v| !v.is_finite()) {
                            return Err(format!("layer[{idx}] weights contain non-finite values"));
                        }
                    }
                    if bias.iter().any(|v| !v.is_finite()) {
                        return Err(format!("layer[{idx}] bias contain non-finite values"));
                    }
                }
                Layer::Dropout { rate } => {
                    if !(0.0..1.0).contains(rate) {
                        return Err(format!("layer[{idx}] dropout rate {rate} outside [0, 1)"));
                    }
                }
            }
            expected_in = layer.output_dim(expected_in);
        }
        Ok(())
    }

    pub fn output_dim(&self) -> usize {
        self.layers
            .iter()
            .fold(self.input_dim, |dim, layer| layer.output_dim(dim))
    }

    /// Run every layer in order and return each layer's output.
    ///
    /// The trace has exactly `layers.len()` entries; the last one is the
    /// network output.
    pub fn forward_trace(&self, input: &[f64]) -> Result<Vec<Vec<f64>>> {
        if input.len() != self.input_dim {
            return Err(DigitError::Model(format!(
                "DenseNetwork input dim mismatch: got {}, expected {}",
                input.len(),
                self.input_dim
            )));
        }

        let mut trace: Vec<Vec<f64>> = Vec::with_capacity(self.layers.len());
        for layer in &self.layers {
            let x = trace.last().map(Vec::as_slice).unwrap_or(input);
            let y = layer.forward(x);
            trace.push(y);
        }

        if let Some(out) = trace.last() {
            if out.iter().any(|v| !v.is_finite()) {
                return Err(DigitError::Model(
                    "forward pass produced non-finite values".to_string(),
                ));
            }
        }

        Ok(trace)
    }

    pub fn forward(&self, input: &[f64]) -> Result<Vec<f64>> {
        let mut trace = self.forward_trace(input)?;
        trace
            .pop()
            .ok_or_else(|| DigitError::Model("network has no layers".to_string()))
    }
}

fn softmax_in_place(values: &mut [f64]) {
    // Shift by the max for numerical stability.
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let mut sum = 0.0;
    for v in values.iter_mut() {
        *v = (*v - max).exp();
        sum += *v;
    }
    if sum > 0.0 {
        values.iter_mut().for_each(|v| *v /= sum);
    }
}
