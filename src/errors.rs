use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use log::error;
use serde::Serialize;
use thiserror::Error;
use validator::ValidationErrors;

use crate::models::booking::BookingStatus;

#[derive(Debug, Error)]
pub enum BookingError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationErrors),

    #[error("cannot move booking from {from} to {to}")]
    InvalidTransition {
        from: BookingStatus,
        to: BookingStatus,
    },

    #[error("resource unavailable: {0}")]
    ResourceUnavailable(String),

    #[error("unknown vehicle category: {0}")]
    InvalidCategory(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("database error: {0}")]
    Database(#[from] mongodb::error::Error),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<bson::ser::Error> for BookingError {
    fn from(err: bson::ser::Error) -> Self {
        BookingError::Serialization(err.to_string())
    }
}

impl From<bson::de::Error> for BookingError {
    fn from(err: bson::de::Error) -> Self {
        BookingError::Serialization(err.to_string())
    }
}

impl BookingError {
    pub fn code(&self) -> &'static str {
        match self {
            BookingError::Validation(_) => "VALIDATION_ERROR",
            BookingError::InvalidTransition { .. } => "INVALID_TRANSITION",
            BookingError::ResourceUnavailable(_) => "RESOURCE_UNAVAILABLE",
            BookingError::InvalidCategory(_) => "INVALID_CATEGORY",
            BookingError::InvalidInput(_) => "INVALID_INPUT",
            BookingError::NotFound(_) => "NOT_FOUND",
            BookingError::Conflict(_) => "CONFLICT",
            BookingError::Unauthorized(_) => "UNAUTHORIZED",
            BookingError::Forbidden(_) => "FORBIDDEN",
            BookingError::Configuration(_) => "CONFIGURATION_ERROR",
            BookingError::Database(_) => "DB_ERROR",
            BookingError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

impl ResponseError for BookingError {
    fn status_code(&self) -> StatusCode {
        match self {
            BookingError::Validation(_)
            | BookingError::InvalidCategory(_)
            | BookingError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            BookingError::NotFound(_) => StatusCode::NOT_FOUND,
            BookingError::InvalidTransition { .. }
            | BookingError::ResourceUnavailable(_)
            | BookingError::Conflict(_) => StatusCode::CONFLICT,
            BookingError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            BookingError::Forbidden(_) => StatusCode::FORBIDDEN,
            BookingError::Configuration(_)
            | BookingError::Database(_)
            | BookingError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let (message, details) = match self {
            BookingError::Validation(errors) => (
                "The provided data is invalid".to_string(),
                serde_json::to_value(errors).ok(),
            ),
            BookingError::InvalidTransition { from, to } => (
                self.to_string(),
                Some(serde_json::json!({ "from": from, "to": to })),
            ),
            BookingError::Database(_) | BookingError::Serialization(_) => {
                error!("{}", self);
                ("An error occurred while accessing the database".to_string(), None)
            }
            _ => (self.to_string(), None),
        };

        HttpResponse::build(status).json(ErrorResponse {
            error: self.code(),
            message,
            details,
        })
    }
}
