use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use log::{error, warn};
use serde_json::json;
use thiserror::Error;

use crate::data::configuration::ConfigError;
use crate::family::form::ValidationError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Configuration(#[from] ConfigError),
    #[error("Error fetching people: {0:#}")]
    Fetch(anyhow::Error),
    #[error("{0:#}")]
    Mutation(anyhow::Error),
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    #[error("User not authenticated")]
    Unauthenticated,
}

impl AppError {
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Configuration(_) => "configuration",
            AppError::Fetch(_) => "fetch",
            AppError::Mutation(_) => "mutation",
            AppError::Invalid(_) => "invalid",
            AppError::Unauthenticated => "unauthenticated",
        }
    }

    /// Whether resubmitting the same request may succeed.
    pub fn retryable(&self) -> bool {
        matches!(self, AppError::Fetch(_) | AppError::Mutation(_))
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Configuration(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Fetch(_) => StatusCode::BAD_GATEWAY,
            AppError::Mutation(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Invalid(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Unauthenticated => StatusCode::UNAUTHORIZED,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("{}: {self}", self.kind());
        } else {
            warn!("{}: {self}", self.kind());
        }
        let body = json!({
            "error": self.to_string(),
            "kind": self.kind(),
            "retry": self.retryable(),
        });
        (status, Json(body)).into_response()
    }
}
