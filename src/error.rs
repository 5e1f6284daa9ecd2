//! Typed errors and HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing reference: {kind} '{id}'")]
    MissingReference { kind: &'static str, id: String },
    #[error("invalid primary key: model {model} field {field}")]
    InvalidPrimaryKey { model: String, field: String },
    #[error("duplicate {kind}: {name}")]
    Duplicate { kind: &'static str, name: String },
    #[error("unknown action '{0}'")]
    UnknownAction(String),
    #[error("invalid hook name '{0}' (expected before<Action> or after<Action>)")]
    InvalidHookName(String),
    #[error("config load: {0}")]
    Load(String),
    #[error("validation: {0}")]
    Validation(String),
}

/// One rejected field of a request body.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        FieldError {
            field: field.into(),
            message: message.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("{message}")]
    Authentication { status: StatusCode, message: String },
    #[error("{0}")]
    Authorization(String),
    #[error("validation: {message}")]
    Validation {
        message: String,
        details: Vec<FieldError>,
    },
    #[error("not found: {0}")]
    NotFound(String),
    #[error("database: {0}")]
    Db(#[from] sqlx::Error),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("no status or data attached to the response")]
    Envelope,
    #[error("internal: {0}")]
    Internal(String),
}

/// Message that is safe to hand back to the client.
#[derive(Clone, Debug, PartialEq)]
pub struct UserMessage(pub String);

/// Recoverable failures carry a message for the caller; fatal ones only a cause for the logs.
#[derive(Debug)]
pub enum ErrorClass<'a> {
    Recoverable(UserMessage),
    Fatal(&'a AppError),
}

impl AppError {
    pub fn unauthorized(message: impl Into<String>) -> Self {
        AppError::Authentication {
            status: StatusCode::UNAUTHORIZED,
            message: message.into(),
        }
    }

    pub fn locked(message: impl Into<String>) -> Self {
        AppError::Authentication {
            status: StatusCode::LOCKED,
            message: message.into(),
        }
    }

    pub fn validation(details: Vec<FieldError>) -> Self {
        let message = match details.as_slice() {
            [only] => format!("{} {}", only.field, only.message),
            _ => format!("{} fields failed validation", details.len()),
        };
        AppError::Validation { message, details }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Authentication { status, .. } => *status,
            AppError::Authorization(_) => StatusCode::FORBIDDEN,
            AppError::Validation { .. } => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Db(sqlx::Error::RowNotFound) => StatusCode::NOT_FOUND,
            AppError::Db(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Envelope => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            AppError::Config(_) => "config_error",
            AppError::Authentication { .. } => "authentication_error",
            AppError::Authorization(_) => "authorization_error",
            AppError::Validation { .. } => "validation_error",
            AppError::NotFound(_) => "not_found",
            AppError::Db(sqlx::Error::RowNotFound) => "not_found",
            AppError::Db(_) => "database_error",
            AppError::Conflict(_) => "conflict",
            AppError::BadRequest(_) => "bad_request",
            AppError::Envelope => "envelope_error",
            AppError::Internal(_) => "internal_error",
        }
    }

    pub fn class(&self) -> ErrorClass<'_> {
        if self.status().is_server_error() && !matches!(self, AppError::Envelope) {
            ErrorClass::Fatal(self)
        } else {
            ErrorClass::Recoverable(UserMessage(self.to_string()))
        }
    }
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self.class() {
            ErrorClass::Recoverable(UserMessage(m)) => m,
            ErrorClass::Fatal(cause) => {
                tracing::error!(error = %cause, "request failed");
                "internal server error".to_string()
            }
        };
        let details = match &self {
            AppError::Validation { details, .. } => serde_json::to_value(details).ok(),
            _ => None,
        };
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code().to_string(),
                message,
                details,
            },
        };
        (status, Json(body)).into_response()
    }
}
