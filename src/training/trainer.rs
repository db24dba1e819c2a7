//! Training Loop
//!
//! Fits the digit classifier with Adam on sparse categorical cross-entropy,
//! then exports the inference artifact. The artifact is only written once
//! every epoch has completed.

use std::path::Path;
use std::sync::Arc;

use burn::backend::Autodiff;
use burn::data::dataloader::{DataLoader, DataLoaderBuilder};
use burn::module::AutodiffModule;
use burn::nn::loss::CrossEntropyLossConfig;
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use burn_ndarray::NdArray;
use serde::Serialize;
use tracing::{info, warn};

use super::data::{load_mnist, DigitBatch, DigitBatcher, DigitSamples};
use super::model::{DigitClassifier, DigitClassifierConfig};
use crate::config::TrainingConfig;
use crate::error::{DigitError, Result};
use crate::ml::DenseNetwork;

/// CPU backend used by the `train` command
pub type TrainingBackend = Autodiff<NdArray<f32>>;

/// Mean loss and top-1 accuracy over one pass
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct EpochMetrics {
    pub loss: f32,
    /// Fraction in [0, 1]
    pub accuracy: f32,
}

#[derive(Debug, Default)]
struct MetricAccumulator {
    loss_sum: f64,
    correct: usize,
    seen: usize,
}

impl MetricAccumulator {
    fn record(&mut self, loss: f32, correct: usize, batch_len: usize) {
        self.loss_sum += f64::from(loss) * batch_len as f64;
        self.correct += correct;
        self.seen += batch_len;
    }

    fn finish(&self) -> EpochMetrics {
        if self.seen == 0 {
            return EpochMetrics::default();
        }
        EpochMetrics {
            loss: (self.loss_sum / self.seen as f64) as f32,
            accuracy: self.correct as f32 / self.seen as f32,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EpochReport {
    pub epoch: usize,
    pub train: EpochMetrics,
    pub valid: Option<EpochMetrics>,
}

/// Training summary, also embedded in the artifact metadata
#[derive(Debug, Clone, Serialize)]
pub struct TrainingSummary {
    pub epochs: Vec<EpochReport>,
    pub train_samples: usize,
    pub validation_samples: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub test: Option<EpochMetrics>,
}

pub struct FitOutcome<B: Backend> {
    /// Trained model without autodiff
    pub model: DigitClassifier<B>,
    pub model_config: DigitClassifierConfig,
    pub summary: TrainingSummary,
}

fn count_correct<B: Backend>(logits: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> usize {
    let predictions = logits.argmax(1).squeeze::<1>(1);
    let correct = predictions.equal(targets).int().sum().into_scalar();
    correct.elem::<i64>().max(0) as usize
}

fn eval_loader<B: Backend>(
    samples: DigitSamples,
    batch_size: usize,
    device: &B::Device,
) -> Arc<dyn DataLoader<DigitBatch<B>>> {
    DataLoaderBuilder::new(DigitBatcher::<B>::new(device.clone()))
        .batch_size(batch_size.max(1))
        .build(samples)
}

fn evaluate_loader<B: Backend>(
    model: &DigitClassifier<B>,
    loader: &Arc<dyn DataLoader<DigitBatch<B>>>,
    device: &B::Device,
) -> EpochMetrics {
    let loss_fn = CrossEntropyLossConfig::new().init(device);
    let mut metrics = MetricAccumulator::default();

    for batch in loader.iter() {
        let batch_len = batch.targets.dims()[0];
        let logits = model.forward(batch.images);
        let loss = loss_fn.forward(logits.clone(), batch.targets.clone());
        let correct = count_correct(logits, batch.targets);
        metrics.record(loss.into_scalar().elem::<f32>(), correct, batch_len);
    }

    metrics.finish()
}

/// Mean loss and accuracy of `model` over `samples`, inference mode.
pub fn evaluate<B: Backend>(
    model: &DigitClassifier<B>,
    samples: &DigitSamples,
    batch_size: usize,
    device: &B::Device,
) -> EpochMetrics {
    let loader = eval_loader::<B>(samples.clone(), batch_size, device);
    evaluate_loader(model, &loader, device)
}

/// Fit a fresh classifier on `samples`.
///
/// The last `validation_split` of the samples is held out (same holdout every
/// epoch); the remainder is reshuffled at the start of each epoch.
pub fn fit<B: AutodiffBackend>(
    samples: DigitSamples,
    config: &TrainingConfig,
    device: &B::Device,
) -> Result<FitOutcome<B::InnerBackend>> {
    if config.epochs == 0 || config.batch_size == 0 {
        return Err(DigitError::Training(
            "epochs and batch_size must be positive".to_string(),
        ));
    }

    let (train, valid) = samples.split_validation(config.validation_split);
    if train.is_empty() {
        return Err(DigitError::Training("no training samples after validation split".to_string()));
    }
    info!(
        train = train.len(),
        valid = valid.len(),
        epochs = config.epochs,
        batch_size = config.batch_size,
        "starting training"
    );

    let model_config = DigitClassifierConfig::new();
    let mut model: DigitClassifier<B> = model_config.init(device);
    let mut optim = AdamConfig::new()
        .with_epsilon(1e-7)
        .init::<B, DigitClassifier<B>>();
    let loss_fn = CrossEntropyLossConfig::new().init(device);

    let (train_samples, valid_samples) = (train.len(), valid.len());
    // Reshuffled on every `iter()`; the seed only fixes the sequence
    let dataloader_train = DataLoaderBuilder::new(DigitBatcher::<B>::new(device.clone()))
        .batch_size(config.batch_size)
        .shuffle(config.seed)
        .build(train);
    let dataloader_valid =
        eval_loader::<B::InnerBackend>(valid, config.batch_size, device);

    let mut epochs = Vec::with_capacity(config.epochs);

    for epoch in 1..=config.epochs {
        let mut metrics = MetricAccumulator::default();

        for batch in dataloader_train.iter() {
            let batch_len = batch.targets.dims()[0];
            let logits = model.forward(batch.images);
            let loss = loss_fn.forward(logits.clone(), batch.targets.clone());

            let loss_value = loss.clone().into_scalar().elem::<f32>();
            if !loss_value.is_finite() {
                return Err(DigitError::Training(format!(
                    "loss diverged in epoch {epoch}"
                )));
            }
            metrics.record(loss_value, count_correct(logits, batch.targets), batch_len);

            // Gradients for the current backward pass
            let grads = loss.backward();
            // Gradients linked to each parameter of the model.
            let grads = GradientsParams::from_grads(grads, &model);
            model = optim.step(config.learning_rate, model, grads);
        }

        let train_metrics = metrics.finish();
        let valid_metrics = (valid_samples > 0)
            .then(|| evaluate_loader(&model.valid(), &dataloader_valid, device));

        match valid_metrics {
            Some(v) => info!(
                epoch,
                loss = train_metrics.loss,
                accuracy = train_metrics.accuracy,
                val_loss = v.loss,
                val_accuracy = v.accuracy,
                "epoch complete"
            ),
            None => info!(
                epoch,
                loss = train_metrics.loss,
                accuracy = train_metrics.accuracy,
                "epoch complete"
            ),
        }

        epochs.push(EpochReport {
            epoch,
            train: train_metrics,
            valid: valid_metrics,
        });
    }

    Ok(FitOutcome {
        model: model.valid(),
        model_config,
        summary: TrainingSummary {
            epochs,
            train_samples,
            validation_samples: valid_samples,
            batch_size: config.batch_size,
            learning_rate: config.learning_rate,
            test: None,
        },
    })
}

/// Convert the trained model to the inference artifact and write it.
pub fn export_artifact<B: Backend>(outcome: &FitOutcome<B>, path: &Path) -> Result<DenseNetwork> {
    let mut network = outcome.model.to_dense_network(&outcome.model_config)?;
    network.metadata = serde_json::json!({
        "trained_at": chrono::Utc::now().to_rfc3339(),
        "architecture": "dense(128,relu) > dropout(0.2) > dense(64,relu) > dense(10,softmax)",
        "training": serde_json::to_value(&outcome.summary)?,
    });

    network.save_to_file(path)?;
    info!(path = %path.display(), "model artifact written");
    Ok(network)
}

/// Entry point of the `train` command: load MNIST, fit, score the test
/// split, write the artifact.
pub fn run(config: &TrainingConfig, artifact_path: &Path) -> Result<TrainingSummary> {
    let device = Default::default();
    let splits = load_mnist(config)?;

    let mut outcome = fit::<TrainingBackend>(splits.train, config, &device)?;

    if splits.test.is_empty() {
        warn!("test split is empty; skipping held-out evaluation");
    } else {
        let test = evaluate(&outcome.model, &splits.test, config.batch_size, &device);
        info!(loss = test.loss, accuracy = test.accuracy, "test split evaluated");
        outcome.summary.test = Some(test);
    }

    export_artifact(&outcome, artifact_path)?;
    Ok(outcome.summary)
}
