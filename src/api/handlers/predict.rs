use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tracing::{debug, error, warn};

use crate::api::{state::AppState, types::*};
use crate::error::DigitError;

/// Failure modes of `POST /predict`, each with its own status and message.
#[derive(Debug)]
pub enum PredictError {
    /// Body absent, not JSON, or `image` missing/empty
    MissingImage,
    /// Body could not be read (e.g. larger than `server.max_body_bytes`)
    Body(StatusCode, String),
    /// Decode, preprocessing or forward-pass failure
    Processing(DigitError),
    /// Anything outside the processing path (e.g. a panicked worker)
    Server(String),
}

impl PredictError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MissingImage => StatusCode::BAD_REQUEST,
            Self::Body(status, _) => *status,
            Self::Processing(_) | Self::Server(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn message(&self) -> String {
        match self {
            Self::MissingImage => "No image data received".to_string(),
            Self::Body(_, detail) => format!("Request body rejected: {detail}"),
            Self::Processing(e) => format!("Error processing image: {e}"),
            Self::Server(detail) => format!("Server error: {detail}"),
        }
    }
}

impl IntoResponse for PredictError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: self.message(),
        };
        (self.status(), Json(body)).into_response()
    }
}

/// POST /predict
pub async fn predict(
    State(state): State<AppState>,
    payload: std::result::Result<Json<PredictRequest>, JsonRejection>,
) -> std::result::Result<Json<PredictResponse>, PredictError> {
    let request = match payload {
        Ok(Json(request)) => Some(request),
        Err(JsonRejection::BytesRejection(rejection)) => {
            warn!("predict request body rejected: {}", rejection.body_text());
            return Err(PredictError::Body(rejection.status(), rejection.body_text()));
        }
        // Wrong content type or malformed JSON count as "no image"
        Err(_) => None,
    };

    let Some(image) = request
        .and_then(|req| req.image)
        .filter(|image| !image.trim().is_empty())
    else {
        warn!("predict request without image data");
        return Err(PredictError::MissingImage);
    };

    let inference = state.inference.clone();
    let outcome = tokio::task::spawn_blocking(move || inference.predict(&image)).await;

    match outcome {
        Ok(Ok(prediction)) => {
            debug!(
                digit = prediction.digit(),
                confidence = prediction.confidence(),
                "prediction served"
            );
            Ok(Json(prediction.into()))
        }
        Ok(Err(e)) => {
            error!("Error processing image: {}", e);
            Err(PredictError::Processing(e))
        }
        Err(e) => {
            error!("Server error: {}", e);
            Err(PredictError::Server(e.to_string()))
        }
    }
}
