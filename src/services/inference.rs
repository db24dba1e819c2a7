//! Inference service: owns the loaded network for the lifetime of the server.
//!
//! The network is validated and warmed up once at construction and never
//! mutated afterwards, so a single instance is shared across request workers
//! behind an `Arc` without locking.

use std::path::Path;
use std::time::Instant;

use tracing::{debug, info};

use crate::error::{DigitError, Result};
use crate::ml::{payload_to_tensor, DenseNetwork, INPUT_DIM, NUM_CLASSES};

/// Output of one forward pass over a single image.
#[derive(Debug, Clone)]
pub struct Prediction {
    /// Class probabilities, index = digit.
    pub probabilities: Vec<f64>,
    /// Output of every layer, in layer order. The last entry equals `probabilities`.
    pub activations: Vec<Vec<f64>>,
}

impl Prediction {
    /// Most likely digit.
    pub fn digit(&self) -> usize {
        self.probabilities
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(idx, _)| idx)
            .unwrap_or(0)
    }

    pub fn confidence(&self) -> f64 {
        self.probabilities.get(self.digit()).copied().unwrap_or(0.0)
    }
}

#[derive(Debug)]
pub struct InferenceService {
    network: DenseNetwork,
}

impl InferenceService {
    /// Wrap an already-loaded network, checking it is a digit classifier.
    pub fn new(network: DenseNetwork) -> Result<Self> {
        network.validate().map_err(DigitError::Model)?;

        if network.input_dim != INPUT_DIM {
            return Err(DigitError::Model(format!(
                "expected input_dim {INPUT_DIM}, artifact has {}",
                network.input_dim
            )));
        }
        if network.output_dim() != NUM_CLASSES {
            return Err(DigitError::Model(format!(
                "expected {NUM_CLASSES} output classes, artifact has {}",
                network.output_dim()
            )));
        }

        Ok(Self { network })
    }

    /// Load the artifact from disk and run the warm-up pass.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let network = DenseNetwork::from_file(path)?;
        let service = Self::new(network)?;
        service.warm_up()?;

        info!(
            path = %path.display(),
            layers = service.network.layers.len(),
            "model artifact loaded"
        );
        Ok(service)
    }

    /// One all-zero forward pass so the first real request pays no setup cost.
    pub fn warm_up(&self) -> Result<()> {
        let started = Instant::now();
        let out = self.network.forward(&[0.0; INPUT_DIM])?;
        debug!(
            outputs = out.len(),
            elapsed_us = started.elapsed().as_micros() as u64,
            "warm-up pass complete"
        );
        Ok(())
    }

    pub fn network(&self) -> &DenseNetwork {
        &self.network
    }

    pub fn predict_tensor(&self, input: &[f64]) -> Result<Prediction> {
        let activations = self.network.forward_trace(input)?;
        let probabilities = activations
            .last()
            .cloned()
            .ok_or_else(|| DigitError::Model("network produced no output".to_string()))?;

        Ok(Prediction {
            probabilities,
            activations,
        })
    }

    /// Decode a Base64 (optionally data-URL prefixed) image and classify it.
    pub fn predict(&self, payload: &str) -> Result<Prediction> {
        let input = payload_to_tensor(payload)?;
        self.predict_tensor(&input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::{Activation, Layer};

    /// 784 → 4 → dropout → 10 network with fixed, input-sensitive weights.
    fn small_digit_network() -> DenseNetwork {
        let hidden: Vec<Vec<f64>> = (0..4)
            .map(|o| {
                (0..INPUT_DIM)
                    .map(|i| if i % 4 == o { 0.01 } else { -0.005 })
                    .collect()
            })
            .collect();
        let output: Vec<Vec<f64>> = (0..NUM_CLASSES)
            .map(|o| (0..4).map(|i| ((o + i) % 3) as f64 - 1.0).collect())
            .collect();

        DenseNetwork {
            input_dim: INPUT_DIM,
            layers: vec![
                Layer::Dense {
                    weights: hidden,
                    bias: vec![0.1; 4],
                    activation: Activation::Relu,
                },
                Layer::Dropout { rate: 0.2 },
                Layer::Dense {
                    weights: output,
                    bias: vec![0.0; NUM_CLASSES],
                    activation: Activation::Softmax,
                },
            ],
            metadata: serde_json::Value::Null,
        }
    }

    #[test]
    fn rejects_non_digit_topology() {
        let mut network = small_digit_network();
        network.layers.pop();
        assert!(matches!(
            InferenceService::new(network),
            Err(DigitError::Model(_))
        ));
    }

    #[test]
    fn warm_up_and_predict_zero_image() {
        let service = InferenceService::new(small_digit_network()).unwrap();
        service.warm_up().unwrap();

        let prediction = service.predict_tensor(&[0.0; INPUT_DIM]).unwrap();
        assert_eq!(prediction.activations.len(), 3);
        assert_eq!(prediction.probabilities.len(), NUM_CLASSES);
        assert_eq!(prediction.activations.last(), Some(&prediction.probabilities));

        let sum: f64 = prediction.probabilities.iter().sum();
        assert!((sum - 1.0).abs() < 1e-9);
        assert!(prediction.confidence() >= 1.0 / NUM_CLASSES as f64);
    }

    #[test]
    fn bad_payload_is_an_error_not_a_panic() {
        let service = InferenceService::new(small_digit_network()).unwrap();
        assert!(service.predict("not-base64!!").is_err());
        assert!(service.predict("data:image/png;base64,").is_err());
    }

    fn temp_artifact(contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("digitscope-load-{}.json", uuid::Uuid::new_v4()));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn load_fails_for_missing_artifact() {
        let path = std::env::temp_dir().join(format!("digitscope-absent-{}.json", uuid::Uuid::new_v4()));
        assert!(matches!(InferenceService::load(&path), Err(DigitError::Io(_))));
    }

    #[test]
    fn load_fails_for_malformed_artifact() {
        let path = temp_artifact("{ \"input_dim\": 784, \"layers\": [");
        let result = InferenceService::load(&path);
        std::fs::remove_file(&path).ok();
        assert!(matches!(result, Err(DigitError::Json(_))));
    }

    #[test]
    fn load_fails_for_wrong_input_width() {
        let network = DenseNetwork {
            input_dim: 100,
            layers: vec![Layer::Dense {
                weights: vec![vec![0.01; 100]; NUM_CLASSES],
                bias: vec![0.0; NUM_CLASSES],
                activation: Activation::Softmax,
            }],
            metadata: serde_json::Value::Null,
        };
        network.validate().unwrap();

        let path = temp_artifact(&serde_json::to_string(&network).unwrap());
        let result = InferenceService::load(&path);
        std::fs::remove_file(&path).ok();
        match result {
            Err(DigitError::Model(msg)) => assert!(msg.contains("input_dim"), "{msg}"),
            other => panic!("expected model error, got {other:?}"),
        }
    }
}
