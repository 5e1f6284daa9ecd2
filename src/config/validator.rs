//! Declaration validation: referential integrity and route consistency.

use crate::config::{AuthPolicyConfig, DisabledConfig, KeyHolder, ModelConfig, RelationKind};
use crate::error::ConfigError;
use crate::resource::Action;
use std::collections::HashSet;

const OPTION_GROUPS: [&str; 2] = ["queries", "mutations"];

pub fn validate(models: &[ModelConfig]) -> Result<(), ConfigError> {
    let mut names = HashSet::new();
    let mut plurals = HashSet::new();
    for m in models {
        if !names.insert(m.name.as_str()) {
            return Err(ConfigError::Duplicate {
                kind: "model",
                name: m.name.clone(),
            });
        }
        let plural = plural_of(m);
        if !plurals.insert(plural.clone()) {
            return Err(ConfigError::Duplicate {
                kind: "path segment",
                name: plural,
            });
        }
    }

    for m in models {
        validate_model(m, &names)?;
    }
    Ok(())
}

fn validate_model(m: &ModelConfig, model_names: &HashSet<&str>) -> Result<(), ConfigError> {
    let field_names: HashSet<&str> = m.fields.iter().map(|f| f.name.as_str()).collect();
    if !m.fields.is_empty() && !field_names.contains(m.primary_key.as_str()) {
        return Err(ConfigError::InvalidPrimaryKey {
            model: m.name.clone(),
            field: m.primary_key.clone(),
        });
    }
    if !m.fields.is_empty() {
        for u in &m.unique {
            if !field_names.contains(u.as_str()) {
                return Err(ConfigError::MissingReference {
                    kind: "unique field",
                    id: format!("{}.{}", m.name, u),
                });
            }
        }
    }

    let mut relation_names = HashSet::new();
    for r in &m.relations {
        if !model_names.contains(r.target.as_str()) {
            return Err(ConfigError::MissingReference {
                kind: "relation target",
                id: format!("{}.{} -> {}", m.name, r.name, r.target),
            });
        }
        if !relation_names.insert(r.name.as_str()) || field_names.contains(r.name.as_str()) {
            return Err(ConfigError::Duplicate {
                kind: "field",
                name: format!("{}.{}", m.name, r.name),
            });
        }
        if let Some(fk) = &r.foreign_key {
            if r.kind == RelationKind::List && fk.holder == KeyHolder::Local {
                return Err(ConfigError::Validation(format!(
                    "{}.{}: a list relation keeps its foreign key on the target",
                    m.name, r.name
                )));
            }
        }
    }

    if let DisabledConfig::Actions(actions) = &m.disabled {
        check_actions(actions.iter())?;
    }
    if let AuthPolicyConfig::Policy { disabled_for } = &m.auth {
        check_actions(disabled_for.iter())?;
    }
    check_actions(m.access.keys())?;
    check_actions(m.validation.keys())?;
    check_actions(
        m.query_options
            .keys()
            .filter(|k| !OPTION_GROUPS.contains(&k.as_str())),
    )?;
    Ok(())
}

fn check_actions<'a>(names: impl Iterator<Item = &'a String>) -> Result<(), ConfigError> {
    for n in names {
        n.parse::<Action>()?;
    }
    Ok(())
}

/// Route segment for a model: declared plural, else `<name>s`.
pub fn plural_of(m: &ModelConfig) -> String {
    m.plural
        .clone()
        .unwrap_or_else(|| crate::case::default_plural(&m.name))
}
