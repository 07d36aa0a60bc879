//! Sistema de manejo de errores
//!
//! Este módulo define los errores del dominio de despacho, los errores de
//! colaboradores externos y su conversión a respuestas HTTP apropiadas.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};
use uuid::Uuid;

use crate::models::dispatch_status::{DispatchStatus, UnknownStatus};
use crate::models::transition_validator::{missing_step, TransitionError};

/// Errores del núcleo de despacho
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("Dispatch with id '{0}' not found")]
    NotFound(Uuid),

    /// Estado corrupto en almacenamiento: falla de integridad, nunca se corrige en silencio
    #[error("Unknown dispatch status: {0}")]
    UnknownStatus(String),

    #[error("{}", missing_step(*.current, *.target))]
    IllegalTransition {
        current: DispatchStatus,
        target: DispatchStatus,
        allowed_next: Vec<DispatchStatus>,
    },

    #[error("Collaborator '{collaborator}' failed: {message}")]
    CollaboratorFailure {
        collaborator: &'static str,
        message: String,
    },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl From<TransitionError> for DispatchError {
    fn from(err: TransitionError) -> Self {
        match err {
            TransitionError::UnknownStatus(value) => DispatchError::UnknownStatus(value),
            TransitionError::IllegalTransition {
                current,
                target,
                allowed_next,
            } => DispatchError::IllegalTransition {
                current,
                target,
                allowed_next,
            },
        }
    }
}

impl From<UnknownStatus> for DispatchError {
    fn from(err: UnknownStatus) -> Self {
        DispatchError::UnknownStatus(err.0)
    }
}

impl From<CollaboratorError> for DispatchError {
    fn from(err: CollaboratorError) -> Self {
        DispatchError::CollaboratorFailure {
            collaborator: err.collaborator(),
            message: err.to_string(),
        }
    }
}

/// Errores de colaboradores externos (flota, facturación, proyecciones)
#[derive(Error, Debug)]
pub enum CollaboratorError {
    #[error("fleet lookup failed: {0}")]
    FleetLookup(String),

    #[error("invoice webhook failed: {0}")]
    Invoice(String),

    #[error("event publication failed: {0}")]
    EventPublish(String),
}

impl CollaboratorError {
    pub fn collaborator(&self) -> &'static str {
        match self {
            CollaboratorError::FleetLookup(_) => "fleet_lookup",
            CollaboratorError::Invoice(_) => "invoice",
            CollaboratorError::EventPublish(_) => "event_publisher",
        }
    }
}

/// Errores principales de la aplicación
#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error("Bad request: {0}")]
    BadRequest(String),
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

impl ErrorResponse {
    fn new(error: &str, message: String, details: Option<serde_json::Value>, code: &str) -> Self {
        Self {
            error: error.to_string(),
            message,
            details,
            code: Some(code.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_response) = match self {
            AppError::Dispatch(DispatchError::Validation(e)) => {
                warn!("⚠️ Validation error: {}", e);
                (
                    StatusCode::BAD_REQUEST,
                    ErrorResponse::new(
                        "Validation Error",
                        "The provided data is invalid".to_string(),
                        Some(json!(e)),
                        "VALIDATION_ERROR",
                    ),
                )
            }

            AppError::Dispatch(DispatchError::NotFound(id)) => (
                StatusCode::NOT_FOUND,
                ErrorResponse::new(
                    "Not Found",
                    format!("Dispatch with id '{}' not found", id),
                    None,
                    "NOT_FOUND",
                ),
            ),

            AppError::Dispatch(DispatchError::IllegalTransition {
                current,
                target,
                allowed_next,
            }) => {
                warn!("⛔ Illegal transition {} -> {}", current, target);
                (
                    StatusCode::CONFLICT,
                    ErrorResponse::new(
                        "Illegal Transition",
                        missing_step(current, target),
                        Some(json!({
                            "current": current,
                            "target": target,
                            "allowed_next": allowed_next,
                        })),
                        "ILLEGAL_TRANSITION",
                    ),
                )
            }

            AppError::Dispatch(DispatchError::UnknownStatus(value)) => {
                error!("🚨 Integrity fault: unknown dispatch status '{}'", value);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::new(
                        "Integrity Fault",
                        "Stored dispatch data is inconsistent".to_string(),
                        Some(json!({ "status": value })),
                        "INTEGRITY_FAULT",
                    ),
                )
            }

            AppError::Dispatch(DispatchError::CollaboratorFailure {
                collaborator,
                message,
            }) => {
                error!("❌ Collaborator {} failed: {}", collaborator, message);
                (
                    StatusCode::BAD_GATEWAY,
                    ErrorResponse::new(
                        "Collaborator Failure",
                        "An error occurred while communicating with external service".to_string(),
                        Some(json!({ "collaborator": collaborator })),
                        "COLLABORATOR_FAILURE",
                    ),
                )
            }

            AppError::Dispatch(DispatchError::Database(e)) => {
                error!("❌ Database error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::new(
                        "Database Error",
                        "An error occurred while accessing the database".to_string(),
                        None,
                        "DB_ERROR",
                    ),
                )
            }

            AppError::BadRequest(msg) => {
                warn!("⚠️ Bad request: {}", msg);
                (
                    StatusCode::BAD_REQUEST,
                    ErrorResponse::new("Bad Request", msg, None, "BAD_REQUEST"),
                )
            }
        };

        (status, Json(error_response)).into_response()
    }
}

/// Función helper para crear errores de validación
pub fn validation_error(field: &'static str, message: &'static str) -> DispatchError {
    use validator::ValidationError;

    let mut error = ValidationError::new("custom");
    error.message = Some(message.into());
    error.add_param("field".into(), &field);

    let mut errors = validator::ValidationErrors::new();
    errors.add(field, error);

    DispatchError::Validation(errors)
}
