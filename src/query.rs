//! Query options handed to the data engine: filters, paging, sorting, includes and projection.
//! Built per request from the model's declared defaults and the query string.

use crate::config::{ColumnInfo, PkType, QueryOptionsConfig, ResolvedEntity};
use crate::error::AppError;
use crate::relation::Record;
use crate::resource::{Action, ActionGroup};
use serde_json::Value;
use std::collections::HashMap;

pub const DEFAULT_LIMIT: u32 = 30;
pub const MAX_LIMIT: u32 = 1000;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SortKey {
    pub field: String,
    pub descending: bool,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct QueryOptions {
    /// Equality filters on scalar fields.
    pub filters: Record,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
    pub order_by: Vec<SortKey>,
    /// Relation fields loaded alongside each record.
    pub include: Vec<String>,
    /// Fields kept in the response; `None` keeps everything.
    pub select: Option<Vec<String>>,
}

impl QueryOptions {
    /// Defaults of the action's group, then of the action itself, then the query string.
    pub fn for_request(
        entity: &ResolvedEntity,
        action: Action,
        query: &HashMap<String, String>,
    ) -> Result<Self, AppError> {
        let mut options = QueryOptions::default();
        let group = match action.group() {
            ActionGroup::Queries => "queries",
            ActionGroup::Mutations => "mutations",
        };
        for key in [group, action.as_str()] {
            if let Some(defaults) = entity.query_defaults.get(key) {
                options.merge_defaults(defaults);
            }
        }
        options.apply_query_string(entity, query)?;
        options.check_against(entity)?;
        Ok(options)
    }

    pub fn effective_limit(&self) -> u32 {
        self.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT)
    }

    pub fn effective_offset(&self) -> u32 {
        self.offset.unwrap_or(0)
    }

    pub fn merge_defaults(&mut self, defaults: &QueryOptionsConfig) {
        if defaults.limit.is_some() {
            self.limit = defaults.limit;
        }
        if let Some(sort) = &defaults.sort {
            self.order_by = parse_sort(sort);
        }
        for inc in &defaults.include {
            if !self.include.contains(inc) {
                self.include.push(inc.clone());
            }
        }
        if defaults.fields.is_some() {
            self.select = defaults.fields.clone();
        }
        for (k, v) in &defaults.filters {
            self.filters.insert(k.clone(), v.clone());
        }
    }

    /// Reserved keys drive paging/sorting/includes; any other key naming a scalar field is an
    /// equality filter typed by its column. Unknown keys are ignored.
    pub fn apply_query_string(
        &mut self,
        entity: &ResolvedEntity,
        query: &HashMap<String, String>,
    ) -> Result<(), AppError> {
        if let Some(v) = query.get("limit") {
            self.limit = Some(parse_u32("limit", v)?);
        }
        if let Some(v) = query.get("offset") {
            self.offset = Some(parse_u32("offset", v)?);
        }
        if let Some(v) = query.get("page") {
            let page = parse_u32("page", v)?;
            if page == 0 {
                return Err(AppError::BadRequest("page starts at 1".into()));
            }
            self.offset = Some((page - 1).saturating_mul(self.effective_limit()));
        }
        if let Some(v) = query.get("sort") {
            self.order_by = parse_sort(v);
        }
        if let Some(v) = query.get("include") {
            for inc in split_list(v) {
                if !self.include.contains(&inc) {
                    self.include.push(inc);
                }
            }
        }
        if let Some(v) = query.get("fields") {
            self.select = Some(split_list(v));
        }
        for (k, v) in query {
            if matches!(k.as_str(), "limit" | "offset" | "page" | "sort" | "include" | "fields") {
                continue;
            }
            if entity.is_scalar_field(k) {
                let value = query_value_for_column(entity.column(k), v);
                self.filters.insert(k.clone(), value);
            }
        }
        Ok(())
    }

    fn check_against(&self, entity: &ResolvedEntity) -> Result<(), AppError> {
        for inc in &self.include {
            if entity.relation(inc).is_none() {
                return Err(AppError::BadRequest(format!(
                    "cannot include '{}': not a relation of {}",
                    inc, entity.name
                )));
            }
        }
        for key in &self.order_by {
            if !entity.is_scalar_field(&key.field) {
                return Err(AppError::BadRequest(format!("cannot sort by '{}'", key.field)));
            }
        }
        Ok(())
    }

    /// Keep only selected fields (plus the primary key and included relations).
    pub fn project(&self, record: &mut Record, pk: &str) {
        let Some(select) = &self.select else {
            return;
        };
        record.retain(|k, _| k == pk || select.contains(k) || self.include.contains(k));
    }
}

/// `-createdAt,title` -> createdAt descending, then title ascending.
pub fn parse_sort(s: &str) -> Vec<SortKey> {
    split_list(s)
        .into_iter()
        .map(|f| match f.strip_prefix('-') {
            Some(field) => SortKey {
                field: field.to_string(),
                descending: true,
            },
            None => SortKey {
                field: f.trim_start_matches('+').to_string(),
                descending: false,
            },
        })
        .filter(|k| !k.field.is_empty())
        .collect()
}

fn split_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(String::from)
        .collect()
}

fn parse_u32(name: &str, v: &str) -> Result<u32, AppError> {
    v.parse()
        .map_err(|_| AppError::BadRequest(format!("{} must be a non-negative integer", name)))
}

/// Query string values are strings; convert to the column's JSON type when it is known.
pub fn query_value_for_column(col: Option<&ColumnInfo>, s: &str) -> Value {
    let Some(col) = col else {
        return Value::String(s.to_string());
    };
    if col.is_uuid() || matches!(col.pk_type, Some(PkType::Uuid)) {
        if let Ok(u) = uuid::Uuid::parse_str(s) {
            return Value::String(u.to_string());
        }
    }
    if col.is_integer() || matches!(col.pk_type, Some(PkType::Int | PkType::BigInt)) {
        if let Ok(n) = s.parse::<i64>() {
            return Value::Number(n.into());
        }
    }
    if col.is_numeric() {
        if let Some(n) = s.parse::<f64>().ok().and_then(serde_json::Number::from_f64) {
            return Value::Number(n);
        }
    }
    if col.is_bool() {
        if s.eq_ignore_ascii_case("true") {
            return Value::Bool(true);
        }
        if s.eq_ignore_ascii_case("false") {
            return Value::Bool(false);
        }
    }
    Value::String(s.to_string())
}

/// Path ids are parsed by the primary key type before they reach the engine.
pub fn parse_id(id: &str, pk_type: &PkType) -> Result<Value, AppError> {
    Ok(match pk_type {
        PkType::Uuid => {
            let u = uuid::Uuid::parse_str(id).map_err(|_| AppError::BadRequest("invalid uuid".into()))?;
            Value::String(u.to_string())
        }
        PkType::BigInt | PkType::Int => {
            let n: i64 = id.parse().map_err(|_| AppError::BadRequest("invalid id".into()))?;
            Value::Number(n.into())
        }
        PkType::Text => Value::String(id.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{resolve, ModelConfig};
    use serde_json::json;

    fn post() -> ResolvedEntity {
        let models: Vec<ModelConfig> = serde_json::from_value(json!([
            {
                "name": "post",
                "fields": [
                    {"name": "id", "type": "bigint"},
                    {"name": "title", "type": "text"},
                    {"name": "views", "type": "integer"},
                    {"name": "published", "type": "boolean"}
                ],
                "relations": [{"name": "author", "target": "user", "kind": "singular",
                               "foreignKey": {"holder": "local", "column": "authorId"}}],
                "queryOptions": {
                    "queries": {"include": ["author"], "limit": 10},
                    "findMany": {"sort": "-views"}
                }
            },
            {"name": "user"}
        ]))
        .unwrap();
        resolve(&models).unwrap().entity("post").unwrap().clone()
    }

    fn query(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn defaults_merge_group_then_action_then_query_string() {
        let opts = QueryOptions::for_request(&post(), Action::FindMany, &query(&[("page", "3")])).unwrap();
        assert_eq!(opts.include, vec!["author".to_string()]);
        assert_eq!(opts.limit, Some(10));
        assert_eq!(opts.offset, Some(20));
        assert_eq!(
            opts.order_by,
            vec![SortKey {
                field: "views".into(),
                descending: true
            }]
        );

        let opts = QueryOptions::for_request(&post(), Action::CreateOne, &query(&[])).unwrap();
        assert!(opts.include.is_empty());
    }

    #[test]
    fn filters_are_typed_by_column() {
        let opts = QueryOptions::for_request(
            &post(),
            Action::FindMany,
            &query(&[("views", "5"), ("published", "TRUE"), ("title", "hi"), ("nope", "x")]),
        )
        .unwrap();
        assert_eq!(opts.filters.get("views"), Some(&json!(5)));
        assert_eq!(opts.filters.get("published"), Some(&json!(true)));
        assert_eq!(opts.filters.get("title"), Some(&json!("hi")));
        assert!(!opts.filters.contains_key("nope"));
    }

    #[test]
    fn limit_is_capped_and_bad_input_rejected() {
        let opts = QueryOptions::for_request(&post(), Action::FindMany, &query(&[("limit", "5000")])).unwrap();
        assert_eq!(opts.effective_limit(), MAX_LIMIT);
        assert!(QueryOptions::for_request(&post(), Action::FindMany, &query(&[("limit", "-1")])).is_err());
        assert!(QueryOptions::for_request(&post(), Action::FindMany, &query(&[("include", "comments")])).is_err());
        assert!(QueryOptions::for_request(&post(), Action::FindMany, &query(&[("sort", "author")])).is_err());
    }

    #[test]
    fn projection_keeps_key_and_includes() {
        let opts = QueryOptions {
            select: Some(vec!["title".into()]),
            include: vec!["author".into()],
            ..Default::default()
        };
        let mut record = json!({"id": 1, "title": "t", "views": 2, "author": null})
            .as_object()
            .cloned()
            .unwrap();
        opts.project(&mut record, "id");
        assert_eq!(Value::Object(record), json!({"id": 1, "title": "t", "author": null}));
    }
}
