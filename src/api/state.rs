use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::config::DEFAULT_MAX_BODY_BYTES;
use crate::services::InferenceService;

/// Shared application state for API handlers
#[derive(Clone)]
pub struct AppState {
    /// Loaded, warmed-up model. Read-only for the life of the process.
    pub inference: Arc<InferenceService>,

    /// Application start time
    pub start_time: DateTime<Utc>,

    /// Request body cap applied by the router
    pub max_body_bytes: usize,
}

impl AppState {
    pub fn new(inference: Arc<InferenceService>) -> Self {
        Self {
            inference,
            start_time: Utc::now(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }

    pub fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    /// Get system uptime in seconds
    pub fn uptime_seconds(&self) -> i64 {
        (Utc::now() - self.start_time).num_seconds()
    }
}
