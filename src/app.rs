//! Application assembly: validator backend, access table, one pipeline per (resource, action),
//! and the router serving them.

use crate::auth::{PermissionTable, TokenService};
use crate::catalog::RelationCatalog;
use crate::config::{AuthPolicy, ResolvedModel, Settings};
use crate::engine::{DataEngine, MemoryEngine};
use crate::error::ConfigError;
use crate::hooks::HookRegistry;
use crate::pipeline::{Composer, Pipeline, PipelineShape};
use crate::resource::{Action, AuthResource, Resource, AUTH_RESOURCE};
use crate::routes::{common_routes, pipeline_route};
use crate::state::AppState;
use crate::validation::{DescriptorValidator, SchemaValidator, Validator, ValidatorBackend};
use axum::extract::DefaultBodyLimit;
use axum::http::Method;
use axum::routing::MethodRouter;
use axum::Router;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

pub struct AppBuilder {
    settings: Settings,
    model: Arc<ResolvedModel>,
    catalog: Arc<RelationCatalog>,
    engine: Option<Arc<dyn DataEngine>>,
    hooks: HookRegistry,
    descriptors: Option<DescriptorValidator>,
    access: Vec<(String, Action, Vec<String>)>,
    custom: Vec<(Method, String, MethodRouter<AppState>)>,
}

pub struct App {
    pub router: Router,
    pub state: AppState,
    pub pipelines: Vec<Arc<Pipeline>>,
}

impl App {
    pub fn pipeline(&self, resource: &str, action: Action) -> Option<&Pipeline> {
        self.pipelines
            .iter()
            .find(|p| p.resource == resource && p.action == action)
            .map(|p| p.as_ref())
    }
}

impl AppBuilder {
    /// The relation catalog is built here, once, from the resolved model.
    pub fn new(settings: Settings, model: ResolvedModel) -> Self {
        let catalog = Arc::new(RelationCatalog::from_model(&model));
        AppBuilder {
            settings,
            model: Arc::new(model),
            catalog,
            engine: None,
            hooks: HookRegistry::new(),
            descriptors: None,
            access: Vec::new(),
            custom: Vec::new(),
        }
    }

    pub fn model(&self) -> Arc<ResolvedModel> {
        self.model.clone()
    }

    pub fn catalog(&self) -> Arc<RelationCatalog> {
        self.catalog.clone()
    }

    /// A fresh in-memory engine over this builder's model.
    pub fn memory_engine(&self) -> Arc<MemoryEngine> {
        Arc::new(MemoryEngine::new(self.model.clone(), self.catalog.clone()))
    }

    pub fn with_engine(mut self, engine: Arc<dyn DataEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    pub fn hooks(mut self, hooks: HookRegistry) -> Self {
        self.hooks = hooks;
        self
    }

    /// DTOs used when the descriptor backend is configured.
    pub fn descriptors(mut self, descriptors: DescriptorValidator) -> Self {
        self.descriptors = Some(descriptors);
        self
    }

    /// Access entry for a resource that has no declaration file, such as `auth`.
    pub fn access<I, R>(mut self, resource: &str, action: Action, roles: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<String>,
    {
        self.access
            .push((resource.to_string(), action, roles.into_iter().map(Into::into).collect()));
        self
    }

    /// A hand-written route. A generated endpoint with the same method and path is not registered.
    pub fn custom_route(mut self, method: Method, path: &str, route: MethodRouter<AppState>) -> Self {
        self.custom.push((method, path.to_string(), route));
        self
    }

    pub fn build(self) -> Result<App, ConfigError> {
        let settings = Arc::new(self.settings);
        let model = self.model;

        if settings.auth.enabled && model.entity(&settings.auth.user_model).is_none() {
            return Err(ConfigError::MissingReference {
                kind: "identity model",
                id: settings.auth.user_model.clone(),
            });
        }
        for resource in self.hooks.resources() {
            if resource != AUTH_RESOURCE && model.entity(resource).is_none() {
                return Err(ConfigError::MissingReference {
                    kind: "hook resource",
                    id: resource.to_string(),
                });
            }
        }

        let validator: Arc<dyn Validator> = match settings.validator_backend {
            ValidatorBackend::Schema => Arc::new(SchemaValidator::from_model(&model)?),
            ValidatorBackend::Descriptor => Arc::new(self.descriptors.unwrap_or_default()),
        };

        let mut permissions = PermissionTable::from_model(&model, &settings.public_actions);
        for (resource, action, roles) in self.access {
            permissions = permissions.allow(&resource, action, roles);
        }

        let engine = match self.engine {
            Some(engine) => engine,
            None => {
                tracing::info!("no data engine configured, using the in-memory engine");
                Arc::new(MemoryEngine::new(model.clone(), self.catalog.clone()))
            }
        };

        let state = AppState {
            engine,
            model: model.clone(),
            catalog: self.catalog,
            tokens: Arc::new(TokenService::from_settings(&settings.auth)),
            permissions: Arc::new(permissions),
            settings: settings.clone(),
        };

        let mut router: Router<AppState> = Router::new();
        let mut taken: HashSet<(Method, String)> = HashSet::new();
        for (method, path, route) in self.custom {
            taken.insert((method, path.clone()));
            router = router.route(&path, route);
        }

        let composer = Composer::new(settings.auth.enabled, validator, &self.hooks);
        let mut generated: Vec<(Box<dyn Resource>, AuthPolicy)> = model
            .entities
            .iter()
            .map(|e| (Box::new(e.resource()) as Box<dyn Resource>, e.auth.clone()))
            .collect();
        if settings.auth.enabled {
            let auth = AuthResource::default();
            let policy = auth.auth_policy();
            generated.push((Box::new(auth), policy));
        }

        let mut pipelines = Vec::new();
        let mut by_path: BTreeMap<String, MethodRouter<AppState>> = BTreeMap::new();
        for (resource, policy) in &generated {
            for endpoint in resource.endpoints() {
                if !taken.insert((endpoint.method.clone(), endpoint.path.clone())) {
                    tracing::info!(
                        method = %endpoint.method,
                        path = %endpoint.path,
                        "custom handler registered, generated endpoint skipped"
                    );
                    continue;
                }
                let Some(p) = composer.compose(resource.as_ref(), policy, endpoint.action) else {
                    continue;
                };
                let pipeline = Arc::new(p);
                let route = pipeline_route(&endpoint.method, pipeline.clone())?;
                pipelines.push(pipeline);
                let merged = match by_path.remove(&endpoint.path) {
                    Some(existing) => existing.merge(route),
                    None => route,
                };
                by_path.insert(endpoint.path, merged);
            }
        }
        for (path, route) in by_path {
            router = router.route(&path, route);
        }

        log_summary(&pipelines);
        let router = router
            .merge(common_routes())
            .layer(TraceLayer::new_for_http())
            .layer(DefaultBodyLimit::max(settings.body_limit_bytes))
            .layer(RequestBodyLimitLayer::new(settings.body_limit_bytes))
            .with_state(state.clone());

        Ok(App {
            router,
            state,
            pipelines,
        })
    }
}

fn log_summary(pipelines: &[Arc<Pipeline>]) {
    let count = |shape: PipelineShape| pipelines.iter().filter(|p| p.shape == shape).count();
    tracing::info!(
        pipelines = pipelines.len(),
        bare = count(PipelineShape::Bare),
        pre_only = count(PipelineShape::PreOnly),
        post_only = count(PipelineShape::PostOnly),
        both = count(PipelineShape::Both),
        "routes composed"
    );
    for p in pipelines {
        tracing::debug!(resource = %p.resource, action = %p.action, stages = ?p.stage_names(), "pipeline");
    }
}
