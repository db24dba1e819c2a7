//! Offline fitting of the digit classifier on MNIST (`train` feature).

pub mod data;
pub mod model;
pub mod trainer;

pub use data::{load_mnist, DigitBatch, DigitBatcher, DigitItem, DigitSamples, MnistSplits};
pub use model::{DigitClassifier, DigitClassifierConfig};
pub use trainer::{
    evaluate, export_artifact, fit, run, EpochMetrics, EpochReport, FitOutcome, TrainingBackend,
    TrainingSummary,
};
