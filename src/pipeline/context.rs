use crate::auth::Identity;
use crate::query::QueryOptions;
use crate::resource::Action;
use crate::response::Envelope;
use crate::state::AppState;
use axum::http::HeaderMap;
use serde_json::Value;
use std::collections::HashMap;

/// Everything one request carries through its pipeline. Stages read the inputs and fill in
/// `identity`, `query_options` and `envelope`.
pub struct RequestContext {
    pub state: AppState,
    pub resource: String,
    pub action: Action,
    pub headers: HeaderMap,
    /// Bearer token from the `Authorization` header or the auth cookie.
    pub credential: Option<String>,
    /// `:id` path segment, when the route has one.
    pub id: Option<String>,
    pub query: HashMap<String, String>,
    /// Parsed JSON body; `Null` when the request had none.
    pub body: Value,
    pub identity: Option<Identity>,
    pub query_options: QueryOptions,
    pub envelope: Envelope,
}

impl RequestContext {
    pub fn new(state: AppState, resource: impl Into<String>, action: Action) -> Self {
        RequestContext {
            state,
            resource: resource.into(),
            action,
            headers: HeaderMap::new(),
            credential: None,
            id: None,
            query: HashMap::new(),
            body: Value::Null,
            identity: None,
            query_options: QueryOptions::default(),
            envelope: Envelope::default(),
        }
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = body;
        self
    }

    pub fn with_id(mut self, id: Option<String>) -> Self {
        self.id = id;
        self
    }

    pub fn with_query(mut self, query: HashMap<String, String>) -> Self {
        self.query = query;
        self
    }

    pub fn with_credential(mut self, credential: Option<String>) -> Self {
        self.credential = credential;
        self
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }
}
