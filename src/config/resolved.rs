//! Resolved model: declarations validated and flattened for runtime use.

use crate::config::{QueryOptionsConfig, RelationConfig, ValidationRule};
use crate::resource::{Action, Capabilities, ModelResource};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

/// Primary key type for parsing path/body ids.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PkType {
    Uuid,
    BigInt,
    Int,
    Text,
}

#[derive(Clone, Debug)]
pub struct ColumnInfo {
    pub name: String,
    /// Declared type, lowercased (e.g. "text", "uuid", "integer").
    pub type_name: String,
    pub pk_type: Option<PkType>,
    pub nullable: bool,
    /// Whether the column has a DB default (e.g. gen_random_uuid(), NOW()).
    pub has_default: bool,
    /// PostgreSQL type name for SQL casts (e.g. "timestamptz") when binding string values.
    pub pg_type: Option<String>,
    /// Type as written in DDL.
    pub sql_type: String,
    pub default_sql: Option<String>,
}

impl ColumnInfo {
    pub fn is_integer(&self) -> bool {
        let t = self.type_name.as_str();
        t.contains("int") || t.contains("serial")
    }

    pub fn is_numeric(&self) -> bool {
        self.is_integer() || matches!(self.type_name.as_str(), "numeric" | "decimal" | "real" | "double precision" | "float")
    }

    pub fn is_bool(&self) -> bool {
        self.type_name.starts_with("bool")
    }

    pub fn is_uuid(&self) -> bool {
        self.type_name.contains("uuid")
    }
}

/// Whether the Auth Gate guards an action.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AuthPolicy {
    Required { except: HashSet<Action> },
    Disabled,
}

impl AuthPolicy {
    pub fn requires_auth(&self, action: Action) -> bool {
        match self {
            AuthPolicy::Required { except } => !except.contains(&action),
            AuthPolicy::Disabled => false,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ResolvedEntity {
    pub name: String,
    pub plural: String,
    pub schema_name: String,
    pub table_name: String,
    pub pk: String,
    pub pk_type: PkType,
    pub columns: Vec<ColumnInfo>,
    /// Scalar fields with a unique constraint.
    pub unique_fields: Vec<String>,
    pub relations: Vec<RelationConfig>,
    /// Field names to strip from all API responses (sensitive data).
    pub sensitive: HashSet<String>,
    pub capabilities: Capabilities,
    pub auth: AuthPolicy,
    /// Declared access table: action -> allowed roles. Empty when none is declared.
    pub access: BTreeMap<Action, BTreeSet<String>>,
    /// `queries` / `mutations` / action name -> defaults
    pub query_defaults: BTreeMap<String, QueryOptionsConfig>,
    pub validation: BTreeMap<Action, BTreeMap<String, ValidationRule>>,
}

impl ResolvedEntity {
    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn relation(&self, name: &str) -> Option<&RelationConfig> {
        self.relations.iter().find(|r| r.name == name)
    }

    /// A key can be filtered on when it is a declared scalar field, or any non-relation key when
    /// the model declares no fields at all.
    pub fn is_scalar_field(&self, name: &str) -> bool {
        if self.columns.is_empty() {
            self.relation(name).is_none()
        } else {
            self.column(name).is_some()
        }
    }

    pub fn resource(&self) -> ModelResource {
        ModelResource {
            model: self.name.clone(),
            plural: self.plural.clone(),
            capabilities: self.capabilities.clone(),
        }
    }

    /// Remove sensitive fields from a record before it leaves the process.
    pub fn strip_sensitive(&self, record: &mut serde_json::Value) {
        if self.sensitive.is_empty() {
            return;
        }
        match record {
            serde_json::Value::Object(map) => {
                for field in &self.sensitive {
                    map.remove(field);
                }
            }
            serde_json::Value::Array(items) => {
                for item in items {
                    self.strip_sensitive(item);
                }
            }
            _ => {}
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ResolvedModel {
    pub entities: Vec<ResolvedEntity>,
    by_name: HashMap<String, usize>,
    by_plural: HashMap<String, usize>,
}

impl ResolvedModel {
    pub fn new(entities: Vec<ResolvedEntity>) -> Self {
        let by_name = entities
            .iter()
            .enumerate()
            .map(|(i, e)| (e.name.clone(), i))
            .collect();
        let by_plural = entities
            .iter()
            .enumerate()
            .map(|(i, e)| (e.plural.clone(), i))
            .collect();
        ResolvedModel {
            entities,
            by_name,
            by_plural,
        }
    }

    pub fn entity(&self, name: &str) -> Option<&ResolvedEntity> {
        self.by_name.get(name).map(|&i| &self.entities[i])
    }

    pub fn entity_by_path(&self, path: &str) -> Option<&ResolvedEntity> {
        self.by_plural.get(path).map(|&i| &self.entities[i])
    }
}
