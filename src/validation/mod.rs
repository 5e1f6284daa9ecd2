//! Request body validation behind one contract: `validate(artifact, body) -> normalized body`.
//! Two backends exist; which one runs is fixed by configuration at startup.

mod descriptor;
mod schema;

pub use descriptor::{Descriptor, DescriptorValidator};
pub use schema::SchemaValidator;

use crate::error::{AppError, ConfigError};
use crate::resource::Action;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValidatorBackend {
    /// Declarative per-field rules from the model declarations.
    Schema,
    /// Typed DTOs registered in code.
    Descriptor,
}

impl FromStr for ValidatorBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "schema" => Ok(ValidatorBackend::Schema),
            "descriptor" | "dto" => Ok(ValidatorBackend::Descriptor),
            _ => Err(ConfigError::Validation(format!(
                "invalid validator backend: {} (expected schema or descriptor)",
                s
            ))),
        }
    }
}

/// Identifies the validation artifact of one (resource, action).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ArtifactId {
    pub resource: String,
    pub action: Action,
}

impl ArtifactId {
    pub fn new(resource: impl Into<String>, action: Action) -> Self {
        ArtifactId {
            resource: resource.into(),
            action,
        }
    }
}

impl fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.resource, self.action)
    }
}

pub trait Validator: Send + Sync {
    fn has_artifact(&self, artifact: &ArtifactId) -> bool;

    /// Returns the normalized body, or `AppError::Validation` with per-field details.
    fn validate(&self, artifact: &ArtifactId, body: Value) -> Result<Value, AppError>;
}

/// Update-style actions validate only the fields that are present.
pub(crate) fn is_partial(action: Action) -> bool {
    matches!(action, Action::UpdateOne | Action::UpdateMany | Action::UpdateMe)
}
