//! crudforge: REST backends generated from model declarations. Nested relation payloads are
//! resolved into operation trees, and every route runs a pipeline of gates, validation, query
//! options, hooks and a core handler composed once at startup.

pub mod app;
pub mod auth;
pub mod case;
pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod hooks;
pub mod migration;
pub mod pipeline;
pub mod query;
pub mod relation;
pub mod resource;
pub mod response;
pub mod routes;
pub mod sql;
pub mod state;
pub mod validation;

pub use app::{App, AppBuilder};
pub use auth::{reconcile, ConfirmPolicy, ConflictWarning, PermissionTable, TokenService};
pub use catalog::RelationCatalog;
pub use config::{load_from_dir, resolve, AuthSettings, ModelConfig, ResolvedEntity, ResolvedModel, Settings};
pub use engine::{DataEngine, MemoryEngine, PgEngine};
pub use error::{AppError, ConfigError};
pub use hooks::{Hook, HookPhase, HookRegistry};
pub use migration::apply_migrations;
pub use pipeline::{Pipeline, RequestContext, StageOutcome};
pub use query::QueryOptions;
pub use relation::{RelationResolver, WriteData};
pub use resource::Action;
pub use response::Envelope;
pub use state::AppState;
pub use validation::{Descriptor, DescriptorValidator, SchemaValidator, Validator, ValidatorBackend};
