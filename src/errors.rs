//! errors.rs
//! Errores tipados de la capa de servicios y su traducción a HTTP.

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::{json, Value};
use thiserror::Error;

use crate::gateway::GatewayError;

#[derive(Debug, Error)]
pub enum ServiceError {
    /// Falta configuración del gateway (URL/credenciales).
    #[error("configuration error: {0}")]
    Config(String),

    #[error("missing caller identity")]
    Unauthorized,

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("plan limit reached: {current} of {limit} instances in use")]
    Capacity { current: i64, limit: i64 },

    #[error("invalid command: {0}")]
    InvalidCommand(String),

    #[error("unknown command: {0}")]
    UnknownCommand(String),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("persistence error: {0}")]
    Persistence(#[from] sqlx::Error),
}

impl ServiceError {
    /// Payload crudo del upstream (si existe), para diagnóstico.
    pub fn details(&self) -> Value {
        match self {
            ServiceError::Gateway(e) => e.payload().cloned().unwrap_or(Value::Null),
            _ => Value::Null,
        }
    }
}

impl ResponseError for ServiceError {
    fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::Config(_) | ServiceError::Persistence(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ServiceError::Unauthorized => StatusCode::UNAUTHORIZED,
            ServiceError::Forbidden(_) => StatusCode::FORBIDDEN,
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Capacity { .. } => StatusCode::CONFLICT,
            ServiceError::InvalidCommand(_) | ServiceError::UnknownCommand(_) => {
                StatusCode::BAD_REQUEST
            }
            ServiceError::Gateway(_) => StatusCode::BAD_GATEWAY,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({
            "success": false,
            "error": self.to_string(),
            "details": self.details()
        }))
    }
}
