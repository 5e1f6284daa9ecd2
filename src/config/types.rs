//! Raw model declarations as read from the models directory (one JSON object or array per file).

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelConfig {
    pub name: String,
    /// Path segment of the generated routes. Defaults to `<name>s`.
    #[serde(default)]
    pub plural: Option<String>,
    #[serde(default)]
    pub table: Option<String>,
    #[serde(default)]
    pub schema: Option<String>,
    #[serde(default = "default_primary_key")]
    pub primary_key: String,
    #[serde(default)]
    pub fields: Vec<FieldConfig>,
    /// Scalar fields with a unique constraint (in addition to fields flagged `unique`).
    #[serde(default)]
    pub unique: Vec<String>,
    #[serde(default)]
    pub relations: Vec<RelationConfig>,
    /// Field names that must never be exposed in API responses (e.g. password hashes).
    #[serde(default)]
    pub sensitive: Vec<String>,
    #[serde(default)]
    pub disabled: DisabledConfig,
    #[serde(default)]
    pub auth: AuthPolicyConfig,
    /// action name -> roles allowed to perform it
    #[serde(default)]
    pub access: BTreeMap<String, Vec<String>>,
    /// `queries`, `mutations` or an action name -> default query options
    #[serde(default)]
    pub query_options: BTreeMap<String, QueryOptionsConfig>,
    /// action name -> field -> rule (schema validator backend)
    #[serde(default)]
    pub validation: BTreeMap<String, BTreeMap<String, ValidationRule>>,
}

fn default_primary_key() -> String {
    "id".into()
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DisabledConfig {
    All(bool),
    Actions(Vec<String>),
}

impl Default for DisabledConfig {
    fn default() -> Self {
        DisabledConfig::Actions(Vec::new())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AuthPolicyConfig {
    Enabled(bool),
    #[serde(rename_all = "camelCase")]
    Policy {
        #[serde(default)]
        disabled_for: Vec<String>,
    },
}

impl Default for AuthPolicyConfig {
    fn default() -> Self {
        AuthPolicyConfig::Enabled(true)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColumnTypeConfig {
    Simple(String),
    Parameterized { name: String, params: Option<Vec<u32>> },
}

impl ColumnTypeConfig {
    pub fn name(&self) -> &str {
        match self {
            ColumnTypeConfig::Simple(s) => s,
            ColumnTypeConfig::Parameterized { name, .. } => name,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub enum ColumnDefaultConfig {
    Literal(serde_json::Value),
    Expression { expression: String },
}

impl<'de> Deserialize<'de> for ColumnDefaultConfig {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let v = serde_json::Value::deserialize(deserializer)?;
        match v {
            serde_json::Value::String(s) if s.ends_with(')') => {
                Ok(ColumnDefaultConfig::Expression { expression: s })
            }
            serde_json::Value::Object(mut obj) => {
                if let Some(serde_json::Value::String(s)) = obj.remove("expression") {
                    return Ok(ColumnDefaultConfig::Expression { expression: s });
                }
                if let Some(lit) = obj.remove("value") {
                    return Ok(ColumnDefaultConfig::Literal(lit));
                }
                Err(serde::de::Error::custom(format!(
                    "field default must be a value, {{ \"expression\": \"...\" }}, or {{ \"value\": ... }}; got object with keys: {:?}",
                    obj.keys().collect::<Vec<_>>()
                )))
            }
            other => Ok(ColumnDefaultConfig::Literal(other)),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FieldConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub type_: ColumnTypeConfig,
    #[serde(default = "default_true")]
    pub nullable: bool,
    #[serde(default)]
    pub default: Option<ColumnDefaultConfig>,
    #[serde(default)]
    pub unique: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationKind {
    Singular,
    List,
}

/// Which side of the relation stores the foreign key column.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyHolder {
    Local,
    Target,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ForeignKeyConfig {
    pub holder: KeyHolder,
    pub column: String,
    /// Referenced column on the other side; defaults to its primary key.
    #[serde(default)]
    pub references: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationConfig {
    pub name: String,
    pub target: String,
    pub kind: RelationKind,
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub foreign_key: Option<ForeignKeyConfig>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryOptionsConfig {
    #[serde(default)]
    pub limit: Option<u32>,
    /// Comma list, `-field` for descending.
    #[serde(default)]
    pub sort: Option<String>,
    #[serde(default)]
    pub include: Vec<String>,
    #[serde(default)]
    pub fields: Option<Vec<String>>,
    #[serde(default)]
    pub filters: serde_json::Map<String, serde_json::Value>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    String,
    Number,
    Integer,
    Boolean,
    Object,
    Array,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationRule {
    #[serde(default)]
    pub required: Option<bool>,
    #[serde(default, rename = "type")]
    pub value_type: Option<ValueType>,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub max_length: Option<u32>,
    #[serde(default)]
    pub min_length: Option<u32>,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub allowed: Option<Vec<serde_json::Value>>,
    #[serde(default)]
    pub minimum: Option<f64>,
    #[serde(default)]
    pub maximum: Option<f64>,
    /// Trim surrounding whitespace of string values before checking.
    #[serde(default)]
    pub trim: bool,
    /// Filled in when the field is absent.
    #[serde(default)]
    pub default: Option<serde_json::Value>,
}

/// A declaration file holds either one model or a list of them.
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum ModelFile {
    One(Box<ModelConfig>),
    Many(Vec<ModelConfig>),
}

impl ModelFile {
    pub fn into_models(self) -> Vec<ModelConfig> {
        match self {
            ModelFile::One(m) => vec![*m],
            ModelFile::Many(v) => v,
        }
    }
}
