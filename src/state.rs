//! Shared application state for all routes. Built once at startup and read-only afterwards.

use crate::auth::{PermissionTable, TokenService};
use crate::catalog::RelationCatalog;
use crate::config::{ResolvedEntity, ResolvedModel, Settings};
use crate::engine::DataEngine;
use crate::error::AppError;
use crate::resource::AUTH_RESOURCE;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<dyn DataEngine>,
    pub model: Arc<ResolvedModel>,
    pub catalog: Arc<RelationCatalog>,
    pub settings: Arc<Settings>,
    pub tokens: Arc<TokenService>,
    pub permissions: Arc<PermissionTable>,
}

impl AppState {
    /// Entity a resource operates on; the auth surface works on the identity model.
    pub fn entity_for(&self, resource: &str) -> Result<&ResolvedEntity, AppError> {
        let name = if resource == AUTH_RESOURCE {
            self.settings.auth.user_model.as_str()
        } else {
            resource
        };
        self.model
            .entity(name)
            .ok_or_else(|| AppError::Internal(format!("model '{}' is not declared", name)))
    }
}
