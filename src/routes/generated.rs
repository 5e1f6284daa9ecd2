//! Routes generated from composed pipelines. Every endpoint gets a small closure that gathers the
//! request parts into a `RequestContext` and runs the endpoint's pipeline.

use crate::error::{AppError, ConfigError};
use crate::extractors::Credential;
use crate::pipeline::{Pipeline, RequestContext};
use crate::state::AppState;
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, Method},
    response::{IntoResponse, Response},
    routing::{on, MethodFilter, MethodRouter},
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

pub fn pipeline_route(method: &Method, pipeline: Arc<Pipeline>) -> Result<MethodRouter<AppState>, ConfigError> {
    let filter = MethodFilter::try_from(method.clone())
        .map_err(|e| ConfigError::Validation(format!("unsupported method {}: {}", method, e)))?;
    Ok(on(
        filter,
        move |State(state): State<AppState>,
              id: Option<Path<String>>,
              Query(query): Query<HashMap<String, String>>,
              headers: HeaderMap,
              Credential(credential): Credential,
              body: Bytes| {
            let pipeline = pipeline.clone();
            async move { run(pipeline, state, id.map(|Path(id)| id), query, headers, credential, body).await }
        },
    ))
}

async fn run(
    pipeline: Arc<Pipeline>,
    state: AppState,
    id: Option<String>,
    query: HashMap<String, String>,
    headers: HeaderMap,
    credential: Option<String>,
    body: Bytes,
) -> Response {
    // bodies of reads and deletes are ignored
    let body = if body.is_empty() || !pipeline.action.takes_body() {
        Value::Null
    } else {
        match serde_json::from_slice::<Value>(&body) {
            Ok(v) => v,
            Err(e) => return AppError::BadRequest(format!("invalid JSON body: {}", e)).into_response(),
        }
    };
    let ctx = RequestContext::new(state, pipeline.resource.clone(), pipeline.action)
        .with_id(id)
        .with_query(query)
        .with_headers(headers)
        .with_credential(credential)
        .with_body(body);
    pipeline.run(ctx).await
}
