//! Rule-based backend: per-field rules declared under `validation` in the model files.

use crate::config::{ResolvedModel, ValidationRule, ValueType};
use crate::error::{AppError, ConfigError, FieldError};
use crate::resource::{Action, AUTH_RESOURCE};
use crate::validation::{is_partial, ArtifactId, Validator};
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};

struct CompiledRule {
    rule: ValidationRule,
    pattern: Option<Regex>,
}

type RuleSet = BTreeMap<String, CompiledRule>;

#[derive(Default)]
pub struct SchemaValidator {
    artifacts: HashMap<ArtifactId, RuleSet>,
}

impl SchemaValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every `validation` block of the resolved declarations. Rules for auth actions
    /// (`signup`, `updateMe`, ...) belong to the auth resource.
    pub fn from_model(model: &ResolvedModel) -> Result<Self, ConfigError> {
        let mut v = SchemaValidator::new();
        for entity in &model.entities {
            for (action, rules) in &entity.validation {
                let resource = if Action::AUTH.contains(action) {
                    AUTH_RESOURCE.to_string()
                } else {
                    entity.name.clone()
                };
                v = v.with_rules(ArtifactId::new(resource, *action), rules.clone())?;
            }
        }
        Ok(v)
    }

    /// Patterns are compiled here so a bad regex fails at startup rather than per request.
    pub fn with_rules(
        mut self,
        artifact: ArtifactId,
        rules: BTreeMap<String, ValidationRule>,
    ) -> Result<Self, ConfigError> {
        let mut compiled = RuleSet::new();
        for (field, rule) in rules {
            let pattern = match &rule.pattern {
                Some(p) => Some(Regex::new(p).map_err(|e| {
                    ConfigError::Validation(format!("{}: invalid pattern for {}: {}", artifact, field, e))
                })?),
                None => None,
            };
            compiled.insert(field, CompiledRule { rule, pattern });
        }
        self.artifacts.insert(artifact, compiled);
        Ok(self)
    }
}

impl Validator for SchemaValidator {
    fn has_artifact(&self, artifact: &ArtifactId) -> bool {
        self.artifacts.contains_key(artifact)
    }

    fn validate(&self, artifact: &ArtifactId, body: Value) -> Result<Value, AppError> {
        let Some(rules) = self.artifacts.get(artifact) else {
            return Ok(body);
        };
        let mut body = match body {
            Value::Object(m) => m,
            _ => return Err(AppError::BadRequest("body must be a JSON object".into())),
        };
        let errors = check(&mut body, rules, is_partial(artifact.action));
        if errors.is_empty() {
            Ok(Value::Object(body))
        } else {
            tracing::debug!(artifact = %artifact, errors = errors.len(), "body rejected");
            Err(AppError::validation(errors))
        }
    }
}

/// Normalizes `body` in place (trim, defaults) and collects every failing field.
fn check(body: &mut Map<String, Value>, rules: &RuleSet, partial: bool) -> Vec<FieldError> {
    let mut errors = Vec::new();
    for (field, compiled) in rules {
        let rule = &compiled.rule;
        if !body.contains_key(field) && !partial {
            if let Some(default) = &rule.default {
                body.insert(field.clone(), default.clone());
            }
        }
        if rule.trim {
            if let Some(Value::String(s)) = body.get_mut(field) {
                let trimmed = s.trim().to_string();
                if trimmed.len() != s.len() {
                    *s = trimmed;
                }
            }
        }
        match body.get(field) {
            None | Some(Value::Null) => {
                let missing_allowed = partial && body.get(field).is_none();
                if rule.required == Some(true) && !missing_allowed {
                    errors.push(FieldError::new(field, "is required"));
                }
            }
            Some(v) => {
                if let Err(message) = validate_field(v, compiled) {
                    errors.push(FieldError::new(field, message));
                }
            }
        }
    }
    errors
}

fn validate_field(v: &Value, compiled: &CompiledRule) -> Result<(), String> {
    let rule = &compiled.rule;
    if let Some(t) = rule.value_type {
        let ok = match t {
            ValueType::String => v.is_string(),
            ValueType::Number => v.is_number(),
            ValueType::Integer => v.is_i64() || v.is_u64(),
            ValueType::Boolean => v.is_boolean(),
            ValueType::Object => v.is_object(),
            ValueType::Array => v.is_array(),
        };
        if !ok {
            return Err(format!("must be of type {:?}", t).to_lowercase());
        }
    }
    if let Some(format) = &rule.format {
        validate_format(v, format)?;
    }
    if let Some(s) = v.as_str() {
        let len = s.chars().count();
        if let Some(max) = rule.max_length {
            if len > max as usize {
                return Err(format!("must be at most {} characters", max));
            }
        }
        if let Some(min) = rule.min_length {
            if len < min as usize {
                return Err(format!("must be at least {} characters", min));
            }
        }
        if let Some(re) = &compiled.pattern {
            if !re.is_match(s) {
                return Err("does not match required pattern".into());
            }
        }
    }
    if let Some(allowed) = &rule.allowed {
        if !allowed.iter().any(|a| value_eq(v, a)) {
            return Err(format!(
                "must be one of: {:?}",
                allowed.iter().take(5).collect::<Vec<_>>()
            ));
        }
    }
    if let Some(n) = v.as_f64() {
        if let Some(min) = rule.minimum {
            if n < min {
                return Err(format!("must be at least {}", min));
            }
        }
        if let Some(max) = rule.maximum {
            if n > max {
                return Err(format!("must be at most {}", max));
            }
        }
    }
    Ok(())
}

fn value_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(n), Value::Number(m)) => n.as_f64() == m.as_f64(),
        _ => a == b,
    }
}

fn validate_format(v: &Value, format: &str) -> Result<(), String> {
    let Some(s) = v.as_str() else {
        return Ok(());
    };
    match format.to_lowercase().as_str() {
        "email" => {
            let valid = s
                .split_once('@')
                .map(|(local, domain)| !local.is_empty() && domain.contains('.') && !domain.ends_with('.'))
                .unwrap_or(false);
            if !valid {
                return Err("must be a valid email".into());
            }
        }
        "uuid" => {
            if uuid::Uuid::parse_str(s).is_err() {
                return Err("must be a valid UUID".into());
            }
        }
        "date-time" | "datetime" => {
            if chrono::DateTime::parse_from_rfc3339(s).is_err() {
                return Err("must be an RFC 3339 timestamp".into());
            }
        }
        _ => {}
    }
    Ok(())
}
