pub mod adapters;
pub mod api;
pub mod cli;
pub mod config;
pub mod error;
pub mod ml;
pub mod services;

// MNIST fitting (optional, enabled with the "train" feature)
#[cfg(feature = "train")]
pub mod training;

pub use config::AppConfig;
pub use error::{DigitError, Result};
pub use services::{InferenceService, Prediction};
