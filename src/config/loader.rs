//! Load model declarations from a directory and resolve them into the runtime model.

use crate::config::resolved::{AuthPolicy, ColumnInfo, PkType, ResolvedEntity, ResolvedModel};
use crate::config::types::*;
use crate::config::{plural_of, validate};
use crate::error::ConfigError;
use crate::resource::{Action, Capabilities};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;

/// Build resolved model from declarations (validates first).
pub fn resolve(models: &[ModelConfig]) -> Result<ResolvedModel, ConfigError> {
    validate(models)?;

    let mut entities = Vec::with_capacity(models.len());
    for m in models {
        let pk_type = m
            .fields
            .iter()
            .find(|f| f.name == m.primary_key)
            .map(|f| infer_pk_type(f.type_.name()))
            .unwrap_or(PkType::Text);

        let columns: Vec<ColumnInfo> = m
            .fields
            .iter()
            .map(|f| {
                let is_pk = f.name == m.primary_key;
                ColumnInfo {
                    name: f.name.clone(),
                    type_name: f.type_.name().to_lowercase(),
                    pk_type: if is_pk { Some(pk_type.clone()) } else { None },
                    nullable: f.nullable && !is_pk,
                    has_default: f.default.is_some(),
                    pg_type: column_pg_type_name(&f.type_),
                    sql_type: column_sql_type(&f.type_),
                    default_sql: f.default.as_ref().map(default_sql),
                }
            })
            .collect();

        let mut unique_fields: Vec<String> = m
            .fields
            .iter()
            .filter(|f| f.unique)
            .map(|f| f.name.clone())
            .collect();
        for u in &m.unique {
            if !unique_fields.contains(u) {
                unique_fields.push(u.clone());
            }
        }

        let capabilities = match &m.disabled {
            DisabledConfig::All(true) => Capabilities::none(),
            DisabledConfig::All(false) => Capabilities::all_crud(),
            DisabledConfig::Actions(names) => Capabilities::all_crud().without(&parse_actions(names)?),
        };
        let auth = match &m.auth {
            AuthPolicyConfig::Enabled(true) => AuthPolicy::Required {
                except: HashSet::new(),
            },
            AuthPolicyConfig::Enabled(false) => AuthPolicy::Disabled,
            AuthPolicyConfig::Policy { disabled_for } => AuthPolicy::Required {
                except: parse_actions(disabled_for)?.into_iter().collect(),
            },
        };

        let mut access = BTreeMap::new();
        for (action, roles) in &m.access {
            access.insert(action.parse::<Action>()?, roles.iter().cloned().collect::<BTreeSet<_>>());
        }
        let mut validation = BTreeMap::new();
        for (action, rules) in &m.validation {
            validation.insert(action.parse::<Action>()?, rules.clone());
        }

        let plural = plural_of(m);
        entities.push(ResolvedEntity {
            name: m.name.clone(),
            table_name: m.table.clone().unwrap_or_else(|| plural.clone()),
            plural,
            schema_name: m.schema.clone().unwrap_or_else(|| "public".into()),
            pk: m.primary_key.clone(),
            pk_type,
            columns,
            unique_fields,
            relations: m.relations.clone(),
            sensitive: m.sensitive.iter().cloned().collect(),
            capabilities,
            auth,
            access,
            query_defaults: m.query_options.clone(),
            validation,
        });
    }

    tracing::info!(models = entities.len(), "model declarations resolved");
    Ok(ResolvedModel::new(entities))
}

fn parse_actions(names: &[String]) -> Result<Vec<Action>, ConfigError> {
    names.iter().map(|n| n.parse()).collect()
}

/// Full type for DDL, parameters included (`varchar(120)`).
fn column_sql_type(ty: &ColumnTypeConfig) -> String {
    match ty {
        ColumnTypeConfig::Simple(s) => s.clone(),
        ColumnTypeConfig::Parameterized { name, params } => match params.as_deref() {
            Some(p) if !p.is_empty() => format!(
                "{}({})",
                name,
                p.iter().map(|n| n.to_string()).collect::<Vec<_>>().join(", ")
            ),
            _ => name.clone(),
        },
    }
}

fn default_sql(d: &ColumnDefaultConfig) -> String {
    match d {
        ColumnDefaultConfig::Expression { expression } => expression.clone(),
        ColumnDefaultConfig::Literal(serde_json::Value::String(s)) => format!("'{}'", s.replace('\'', "''")),
        ColumnDefaultConfig::Literal(v) => v.to_string(),
    }
}

fn column_pg_type_name(ty: &ColumnTypeConfig) -> Option<String> {
    let name = ty.name();
    let lower = name.to_lowercase();
    if lower == "timestamptz" || lower == "timestamp with time zone" {
        Some("timestamptz".into())
    } else if lower == "timestamp" || lower.starts_with("timestamp ") {
        Some("timestamp".into())
    } else if lower == "date" {
        Some("date".into())
    } else if lower.contains("uuid") {
        Some("uuid".into())
    } else if lower == "numeric" || lower == "decimal" {
        Some("numeric".into())
    } else if name.contains('.') {
        // Schema-qualified custom type (e.g. blog.post_status); cast so text binds correctly
        Some(name.to_string())
    } else {
        None
    }
}

fn infer_pk_type(type_name: &str) -> PkType {
    let type_lower = type_name.to_lowercase();
    if type_lower.contains("uuid") {
        PkType::Uuid
    } else if type_lower.contains("bigserial") || type_lower.contains("bigint") {
        PkType::BigInt
    } else if type_lower.contains("serial") || type_lower.contains("int") {
        PkType::Int
    } else {
        PkType::Text
    }
}

/// Read every `*.json` file in `dir` (sorted by name); each holds one model or an array.
pub async fn load_from_dir(dir: &Path) -> Result<Vec<ModelConfig>, ConfigError> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| ConfigError::Load(format!("{}: {}", dir.display(), e)))?;
    let mut paths = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| ConfigError::Load(e.to_string()))?
    {
        let path = entry.path();
        let is_json = path.extension().map(|e| e == "json").unwrap_or(false);
        let hidden = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.starts_with('.'))
            .unwrap_or(false);
        if is_json && !hidden {
            paths.push(path);
        }
    }
    paths.sort();

    let mut models = Vec::new();
    for path in paths {
        tracing::debug!(path = %path.display(), "reading model declaration");
        let text = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))?;
        let file: ModelFile = serde_json::from_str(&text)
            .map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))?;
        models.extend(file.into_models());
    }
    Ok(models)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn models() -> Vec<ModelConfig> {
        serde_json::from_value(json!([
            {
                "name": "post",
                "fields": [
                    {"name": "id", "type": "uuid", "default": "gen_random_uuid()"},
                    {"name": "title", "type": "text"},
                    {"name": "slug", "type": "text", "unique": true}
                ],
                "disabled": ["deleteMany"],
                "auth": {"disabledFor": ["findMany", "findOne"]},
                "access": {"deleteOne": ["admin"]}
            },
            {"name": "tag", "disabled": true, "auth": false}
        ]))
        .unwrap()
    }

    #[test]
    fn resolves_capabilities_and_auth_policy() {
        let model = resolve(&models()).unwrap();
        let post = model.entity("post").unwrap();
        assert_eq!(post.plural, "posts");
        assert_eq!(post.pk_type, PkType::Uuid);
        assert_eq!(post.unique_fields, vec!["slug".to_string()]);
        assert!(!post.capabilities.allows(Action::DeleteMany));
        assert!(post.capabilities.allows(Action::CreateMany));
        assert!(!post.auth.requires_auth(Action::FindMany));
        assert!(post.auth.requires_auth(Action::CreateOne));
        assert_eq!(post.access[&Action::DeleteOne].len(), 1);

        let tag = model.entity_by_path("tags").unwrap();
        assert_eq!(tag.capabilities.iter().count(), 0);
        assert!(!tag.auth.requires_auth(Action::CreateOne));
    }

    #[tokio::test]
    async fn loads_single_and_array_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a_post.json"), r#"{"name": "post"}"#).unwrap();
        std::fs::write(
            dir.path().join("b_more.json"),
            r#"[{"name": "tag"}, {"name": "category", "plural": "categories"}]"#,
        )
        .unwrap();
        std::fs::write(dir.path().join(".permissions.json"), "{}").unwrap();
        let loaded = load_from_dir(dir.path()).await.unwrap();
        let names: Vec<_> = loaded.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["post", "tag", "category"]);
    }
}
