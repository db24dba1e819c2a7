use thiserror::Error;

/// Main error type for the trainer and the inference server
#[derive(Error, Debug)]
pub enum DigitError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // Payload decoding errors
    #[error("Invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Image decoding failed: {0}")]
    Image(#[from] image::ImageError),

    // Validation errors
    #[error("Validation failed: {0}")]
    Validation(String),

    // Model errors (artifact shape, forward pass)
    #[error("Model error: {0}")]
    Model(String),

    // Dataset / fitting errors
    #[error("Training error: {0}")]
    Training(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for DigitError
pub type Result<T> = std::result::Result<T, DigitError>;
