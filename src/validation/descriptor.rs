//! Typed backend: a request body is valid when it deserializes into the registered DTO and the
//! DTO's own checks pass. The normalized body is the DTO serialized back (serde defaults applied,
//! unknown fields dropped unless the DTO denies them).

use crate::error::{AppError, FieldError};
use crate::resource::Action;
use crate::validation::{ArtifactId, Validator};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;

pub trait Descriptor: DeserializeOwned + Serialize + Send + Sync + 'static {
    /// Field-level checks beyond what deserialization enforces.
    fn check(&self) -> Vec<FieldError> {
        Vec::new()
    }
}

type NormalizeFn = Box<dyn Fn(Value) -> Result<Value, AppError> + Send + Sync>;

#[derive(Default)]
pub struct DescriptorValidator {
    descriptors: HashMap<ArtifactId, NormalizeFn>,
}

impl DescriptorValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T: Descriptor>(mut self, resource: impl Into<String>, action: Action) -> Self {
        let normalize: NormalizeFn = Box::new(|body| {
            let dto: T = serde_json::from_value(body).map_err(|e| {
                AppError::validation(vec![field_error_from_serde(&e.to_string())])
            })?;
            let errors = dto.check();
            if !errors.is_empty() {
                return Err(AppError::validation(errors));
            }
            serde_json::to_value(&dto).map_err(|e| AppError::Internal(e.to_string()))
        });
        self.descriptors.insert(ArtifactId::new(resource, action), normalize);
        self
    }
}

impl Validator for DescriptorValidator {
    fn has_artifact(&self, artifact: &ArtifactId) -> bool {
        self.descriptors.contains_key(artifact)
    }

    fn validate(&self, artifact: &ArtifactId, body: Value) -> Result<Value, AppError> {
        match self.descriptors.get(artifact) {
            Some(normalize) => normalize(body),
            None => Ok(body),
        }
    }
}

/// serde messages name the offending field between backticks ("missing field `title`").
fn field_error_from_serde(message: &str) -> FieldError {
    let field = message
        .split('`')
        .nth(1)
        .unwrap_or("body")
        .to_string();
    let message = message
        .split(" at line ")
        .next()
        .unwrap_or(message)
        .to_string();
    FieldError { field, message }
}
