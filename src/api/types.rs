use serde::{Deserialize, Serialize};

use crate::ml::{DenseNetwork, Layer};
use crate::services::Prediction;

// ============================================================================
// Prediction Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct PredictRequest {
    /// Base64 image, optionally `data:<mime>;base64,` prefixed
    #[serde(default)]
    pub image: Option<String>,
}

/// Tensors are nested as a batch of one: `prediction` is `[[p0..p9]]` and
/// each activation is `[[...]]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictResponse {
    pub prediction: Vec<Vec<f64>>,
    pub activations: Vec<Vec<Vec<f64>>>,
}

impl From<Prediction> for PredictResponse {
    fn from(p: Prediction) -> Self {
        Self {
            prediction: vec![p.probabilities],
            activations: p.activations.into_iter().map(|a| vec![a]).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

// ============================================================================
// Model Description Types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerSummary {
    pub index: usize,
    pub kind: String,
    pub input_dim: usize,
    pub output_dim: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSummary {
    pub input_dim: usize,
    pub output_dim: usize,
    pub layers: Vec<LayerSummary>,
    pub metadata: serde_json::Value,
}

impl From<&DenseNetwork> for ModelSummary {
    fn from(network: &DenseNetwork) -> Self {
        let mut input_dim = network.input_dim;
        let mut layers = Vec::with_capacity(network.layers.len());

        for (index, layer) in network.layers.iter().enumerate() {
            let output_dim = layer.output_dim(input_dim);
            let (activation, rate) = match layer {
                Layer::Dense { activation, .. } => (Some(activation.as_str().to_string()), None),
                Layer::Dropout { rate } => (None, Some(*rate)),
            };
            layers.push(LayerSummary {
                index,
                kind: layer.kind().to_string(),
                input_dim,
                output_dim,
                activation,
                rate,
            });
            input_dim = output_dim;
        }

        Self {
            input_dim: network.input_dim,
            output_dim: network.output_dim(),
            layers,
            metadata: network.metadata.clone(),
        }
    }
}

// ============================================================================
// Health Types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_seconds: i64,
    pub version: String,
    pub layers: usize,
}
