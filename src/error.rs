use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Restaurant ID not found")]
    MissingId,

    #[error("{0}")]
    InvalidInput(String),

    #[error("Restaurant not found")]
    RestaurantNotFound,

    #[error("Review not found")]
    ReviewNotFound,

    #[error("Coordinates have not been found")]
    CoordinatesNotFound,

    #[error("Could not fetch weather info: {0}")]
    WeatherFetch(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::MissingId | Self::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Self::RestaurantNotFound | Self::ReviewNotFound | Self::CoordinatesNotFound => {
                StatusCode::NOT_FOUND
            }
            Self::WeatherFetch(_) => StatusCode::BAD_GATEWAY,
            Self::Store(_) | Self::Config(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message safe to hand back to a client. Internal failures never leak their detail.
    pub fn public_message(&self) -> String {
        match self {
            Self::WeatherFetch(_) => "Could not fetch weather info".to_string(),
            Self::Store(_) | Self::Config(_) | Self::Internal(_) => {
                "Internal server error".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl From<redis::RedisError> for AppError {
    fn from(err: redis::RedisError) -> Self {
        Self::Store(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(format!("malformed stored JSON: {err}"))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        match &self {
            Self::WeatherFetch(detail) => warn!("Upstream weather failure: {detail}"),
            Self::Store(_) | Self::Config(_) | Self::Internal(_) => error!("{self}"),
            _ => {}
        }

        let body = json!({
            "success": false,
            "error": self.public_message(),
        });

        (status, Json(body)).into_response()
    }
}
