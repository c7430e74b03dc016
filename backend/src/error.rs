use std::path::PathBuf;

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use thiserror::Error;

use crate::models::{ErrorBody, FieldError};

/// Failures of the model handle, at load time or while predicting.
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("model artifact not found: {}", .0.display())]
    ArtifactNotFound(PathBuf),

    #[error("failed to load model from {}: {reason}", .path.display())]
    ModelLoad { path: PathBuf, reason: String },

    #[error("model inputs {found:?} do not match the expected features {expected:?}")]
    InputMismatch {
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[error("model run failed: {0}")]
    Run(String),

    #[error("model produced no label")]
    EmptyOutput,
}

/// Errors surfaced to HTTP clients.
#[derive(Debug, Error)]
pub enum ServingError {
    #[error("malformed request body: {0}")]
    MalformedBody(String),

    #[error("request validation failed")]
    Validation(Vec<FieldError>),

    #[error("prediction failed: {0}")]
    Inference(#[from] InferenceError),

    #[error("prediction failed: blocking worker unavailable")]
    WorkerUnavailable,
}

impl ResponseError for ServingError {
    fn status_code(&self) -> StatusCode {
        match self {
            ServingError::MalformedBody(_) => StatusCode::BAD_REQUEST,
            ServingError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ServingError::Inference(_) | ServingError::WorkerUnavailable => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        let body = match self {
            ServingError::Validation(fields) => ErrorBody::new(self.to_string()).with_detail(fields.clone()),
            _ => ErrorBody::new(self.to_string()),
        };
        HttpResponse::build(self.status_code()).json(body)
    }
}
