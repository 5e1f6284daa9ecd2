//! Response envelope carried by the request context. Handlers and hooks attach a status and/or a
//! body; the emitter turns whatever is attached into the HTTP response.

use crate::error::AppError;
use axum::{
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::Value;

#[derive(Clone, Debug, Default)]
pub struct Envelope {
    pub status: Option<StatusCode>,
    pub data: Option<Value>,
    /// Extra response headers (e.g. `Set-Cookie`).
    pub headers: HeaderMap,
}

impl Envelope {
    pub fn set(&mut self, status: StatusCode, data: Value) {
        self.status = Some(status);
        self.data = Some(data);
    }

    /// Status only: the response has an empty body.
    pub fn set_status(&mut self, status: StatusCode) {
        self.status = Some(status);
        self.data = None;
    }

    pub fn insert_header(&mut self, name: HeaderName, value: &str) -> Result<(), AppError> {
        let value = HeaderValue::from_str(value)
            .map_err(|e| AppError::Internal(format!("invalid {} header: {}", name, e)))?;
        self.headers.append(name, value);
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.status.is_none() && self.data.is_none()
    }

    /// Builds the response from what is attached without consuming it, so flushing twice yields
    /// the same response. Data without a status is sent as 200.
    pub fn flush(&self) -> Result<Response, AppError> {
        let mut response = match (self.status, &self.data) {
            (status, Some(data)) => (status.unwrap_or(StatusCode::OK), Json(data.clone())).into_response(),
            (Some(status), None) => status.into_response(),
            (None, None) => return Err(AppError::Envelope),
        };
        for (name, value) in &self.headers {
            response.headers_mut().append(name.clone(), value.clone());
        }
        Ok(response)
    }
}
