//! Sistema de manejo de errores
//!
//! Este módulo define todos los tipos de errores del sistema
//! y su conversión a respuestas HTTP apropiadas.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

/// Errores principales de la aplicación
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),
}

/// Respuesta de error para la API
#[derive(Debug, serde::Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<String>,
}

impl AppError {
    /// Código estable que viaja en el cuerpo JSON
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Database(_) => "DB_ERROR",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Conflict(_) => "CONFLICT",
            AppError::BadRequest(_) => "BAD_REQUEST",
            AppError::Internal(_) => "INTERNAL_ERROR",
            AppError::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Validation(_) | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = Some(self.code().to_string());

        let error_response = match self {
            AppError::Database(e) => {
                error!("❌ Database error: {}", e);
                ErrorResponse {
                    error: "Database Error".to_string(),
                    message: "An error occurred while accessing the database".to_string(),
                    details: Some(json!({ "sql_error": e.to_string() })),
                    code,
                }
            }

            AppError::Validation(e) => {
                warn!("⚠️ Validation error: {}", e);
                ErrorResponse {
                    error: "Validation Error".to_string(),
                    message: "The provided data is invalid".to_string(),
                    details: Some(json!(e)),
                    code,
                }
            }

            AppError::NotFound(msg) => ErrorResponse {
                error: "Not Found".to_string(),
                message: msg,
                details: None,
                code,
            },

            AppError::Conflict(msg) => {
                warn!("⚠️ Conflict: {}", msg);
                ErrorResponse {
                    error: "Conflict".to_string(),
                    message: msg,
                    details: None,
                    code,
                }
            }

            AppError::BadRequest(msg) => {
                warn!("⚠️ Bad request: {}", msg);
                ErrorResponse {
                    error: "Bad Request".to_string(),
                    message: msg,
                    details: None,
                    code,
                }
            }

            AppError::Internal(msg) => {
                error!("❌ Internal error: {}", msg);
                ErrorResponse {
                    error: "Internal Server Error".to_string(),
                    message: "An unexpected error occurred".to_string(),
                    details: Some(json!({ "internal_error": msg })),
                    code,
                }
            }

            AppError::ServiceUnavailable(msg) => {
                error!("❌ Service unavailable: {}", msg);
                ErrorResponse {
                    error: "Service Unavailable".to_string(),
                    message: msg,
                    details: None,
                    code,
                }
            }
        };

        (status, Json(error_response)).into_response()
    }
}

/// Resultado tipado para operaciones que pueden fallar
pub type AppResult<T> = Result<T, AppError>;

/// Función helper para crear errores de validación
pub fn validation_error(field: &'static str, message: &str) -> AppError {
    use validator::ValidationError;

    let mut error = ValidationError::new("custom");
    error.message = Some(message.to_string().into());
    error.add_param("field".into(), &field);

    let mut errors = validator::ValidationErrors::new();
    errors.add(field, error);

    AppError::Validation(errors)
}

/// Función helper para crear errores de recurso no encontrado
pub fn not_found_error(resource: &str, id: &str) -> AppError {
    AppError::NotFound(format!("{} with id '{}' not found", resource, id))
}

/// Función helper para crear errores de conflicto
pub fn conflict_error(resource: &str, field: &str, value: &str) -> AppError {
    AppError::Conflict(format!("{} with {} '{}' already exists", resource, field, value))
}

/// Función helper para crear errores internos
pub fn internal_error(message: &str) -> AppError {
    AppError::Internal(message.to_string())
}
