//! Relation resolution: decides per nested item whether it is created, connected, updated,
//! disconnected or deleted, recursing into the target model's own relations.

use crate::catalog::{RelationCatalog, RelationField};
use crate::config::RelationKind;
use crate::relation::tree::{DeleteMany, ListOps, Record, RelationWrite, SingleOp, UpdateOp, WriteData};
use serde_json::Value;
use std::collections::HashSet;

/// Key of the explicit per-item action tag (`"connect"`, `"disconnect"`, `"delete"`).
pub const ACTION_TAG: &str = "apiAction";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RelationOp {
    Create,
    Connect,
    Update,
    Disconnect,
    Delete,
}

/// Pure resolver over a shared catalog. Items whose decided operation is ignored are dropped.
#[derive(Clone, Debug)]
pub struct RelationResolver<'a> {
    catalog: &'a RelationCatalog,
    ignored: HashSet<RelationOp>,
}

impl<'a> RelationResolver<'a> {
    pub fn new(catalog: &'a RelationCatalog) -> Self {
        RelationResolver {
            catalog,
            ignored: HashSet::new(),
        }
    }

    pub fn ignoring(mut self, ops: &[RelationOp]) -> Self {
        self.ignored.extend(ops.iter().copied());
        self
    }

    /// Resolve every relation field present in `payload`; other keys are kept as scalars.
    pub fn resolve_payload(&self, model: &str, payload: Record) -> WriteData {
        let entry = self.catalog.entry(model);
        let mut data = WriteData::default();
        for (key, value) in payload {
            if key == ACTION_TAG {
                continue;
            }
            match entry.and_then(|e| e.field(&key)) {
                Some((field, kind)) => {
                    if let Some(write) = self.resolve_field(value, field, kind) {
                        data.relations.insert(key, write);
                    }
                }
                None => {
                    data.scalars.insert(key, value);
                }
            }
        }
        data
    }

    /// `None` only when a singular item resolves to an ignored operation.
    pub fn resolve_field(
        &self,
        value: Value,
        field: &RelationField,
        kind: RelationKind,
    ) -> Option<RelationWrite> {
        match (kind, value) {
            (_, Value::Null) => Some(RelationWrite::Passthrough(Value::Null)),
            (RelationKind::List, Value::Array(items)) => {
                if items.iter().all(Value::is_object) {
                    let records = items.into_iter().filter_map(into_record).collect();
                    Some(RelationWrite::List(self.resolve_list(records, field)))
                } else {
                    Some(RelationWrite::Passthrough(Value::Array(items)))
                }
            }
            (RelationKind::Singular, Value::Object(item)) => self.resolve_single(item, field),
            (_, other) => Some(RelationWrite::Passthrough(other)),
        }
    }

    fn resolve_list(&self, items: Vec<Record>, field: &RelationField) -> ListOps {
        let mut ops = ListOps::default();
        let mut deletions: Vec<Value> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        for item in items {
            let op = self.classify(&item, field, true);
            if self.ignored.contains(&op) {
                tracing::debug!(relation = %field.name, ?op, "ignored nested item");
                continue;
            }
            match op {
                RelationOp::Delete => match identifier(&item, field) {
                    Some(id) => {
                        if seen.insert(id.to_string()) {
                            deletions.push(id);
                        }
                    }
                    None => tracing::debug!(relation = %field.name, "delete tag without identifier skipped"),
                },
                RelationOp::Disconnect => ops.disconnect.push(reference_of(item, field)),
                RelationOp::Connect => ops.connect.push(reference_of(item, field)),
                RelationOp::Create => ops.create.push(self.resolve_payload(&field.target_model, strip_tag(item))),
                RelationOp::Update => ops.update.push(self.split_update(item, field)),
            }
        }

        if !deletions.is_empty() {
            ops.delete_many = Some(DeleteMany {
                key: field.target_key.clone(),
                values: deletions,
            });
        }
        ops
    }

    /// Delete and disconnect tags have no singular form; such items pass through untouched so
    /// the write layer rejects them.
    fn resolve_single(&self, item: Record, field: &RelationField) -> Option<RelationWrite> {
        if matches!(
            item.get(ACTION_TAG).and_then(Value::as_str),
            Some("delete" | "disconnect")
        ) {
            tracing::debug!(relation = %field.name, "list-only tag on a singular relation");
            return Some(RelationWrite::Passthrough(Value::Object(item)));
        }
        let op = self.classify(&item, field, false);
        if self.ignored.contains(&op) {
            return None;
        }
        Some(RelationWrite::Single(match op {
            RelationOp::Connect => SingleOp::Connect(reference_of(item, field)),
            RelationOp::Update => SingleOp::Update(self.split_update(item, field)),
            _ => SingleOp::Create(self.resolve_payload(&field.target_model, strip_tag(item))),
        }))
    }

    /// Precedence: delete tag, disconnect tag, connectable, no identifier (create), else update.
    /// Singular items only ever connect, create or update.
    fn classify(&self, item: &Record, field: &RelationField, list: bool) -> RelationOp {
        let tag = item.get(ACTION_TAG).and_then(Value::as_str);
        if list {
            match tag {
                Some("delete") => return RelationOp::Delete,
                Some("disconnect") => return RelationOp::Disconnect,
                _ => {}
            }
        }
        if is_connectable(item, field, tag) {
            RelationOp::Connect
        } else if identifier(item, field).is_none() {
            RelationOp::Create
        } else {
            RelationOp::Update
        }
    }

    fn split_update(&self, item: Record, field: &RelationField) -> UpdateOp {
        let mut rest = strip_tag(item);
        let mut match_ = Record::new();
        if let Some(id) = rest.remove(&field.target_key) {
            match_.insert(field.target_key.clone(), id);
        }
        UpdateOp {
            match_,
            data: self.resolve_payload(&field.target_model, rest),
        }
    }
}

/// An item references an existing record when tagged `connect`, or when its only field is the
/// identifier or one of the target's unique fields holding a scalar value.
fn is_connectable(item: &Record, field: &RelationField, tag: Option<&str>) -> bool {
    if tag == Some("connect") {
        return true;
    }
    let mut populated = item.iter().filter(|(k, _)| k.as_str() != ACTION_TAG);
    match (populated.next(), populated.next()) {
        (Some((name, value)), None) => {
            let identifying = *name == field.target_key || field.unique_field_names.contains(name);
            identifying && is_scalar(value)
        }
        _ => false,
    }
}

fn is_scalar(value: &Value) -> bool {
    matches!(value, Value::String(_) | Value::Number(_) | Value::Bool(_))
}

fn identifier(item: &Record, field: &RelationField) -> Option<Value> {
    item.get(&field.target_key).filter(|v| !v.is_null()).cloned()
}

/// `{id}` when the identifier is present, otherwise the unique fields present, otherwise every
/// remaining field.
fn reference_of(item: Record, field: &RelationField) -> Record {
    let item = strip_tag(item);
    if let Some(id) = identifier(&item, field) {
        let mut r = Record::new();
        r.insert(field.target_key.clone(), id);
        return r;
    }
    let unique: Record = item
        .iter()
        .filter(|(k, _)| field.unique_field_names.contains(*k))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    if unique.is_empty() {
        item
    } else {
        unique
    }
}

fn strip_tag(mut item: Record) -> Record {
    item.remove(ACTION_TAG);
    item
}

fn into_record(value: Value) -> Option<Record> {
    match value {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{resolve, ModelConfig};
    use serde_json::json;

    fn catalog() -> RelationCatalog {
        let models: Vec<ModelConfig> = serde_json::from_value(json!([
            {
                "name": "post",
                "relations": [
                    {"name": "tags", "target": "tag", "kind": "list"},
                    {"name": "comments", "target": "comment", "kind": "list"},
                    {"name": "category", "target": "category", "kind": "singular"}
                ]
            },
            {"name": "tag", "unique": ["name"], "fields": [
                {"name": "id", "type": "uuid"}, {"name": "name", "type": "text"}]},
            {"name": "comment", "relations": [
                {"name": "reactions", "target": "reaction", "kind": "list"},
                {"name": "author", "target": "user", "kind": "singular"}
            ]},
            {"name": "reaction"},
            {"name": "user", "unique": ["email"], "fields": [
                {"name": "id", "type": "uuid"}, {"name": "email", "type": "text"}]},
            {"name": "category", "plural": "categories"}
        ]))
        .unwrap();
        RelationCatalog::from_model(&resolve(&models).unwrap())
    }

    fn record(v: Value) -> Record {
        match v {
            Value::Object(m) => m,
            _ => panic!("not an object"),
        }
    }

    fn resolve_post(catalog: &RelationCatalog, v: Value) -> Value {
        RelationResolver::new(catalog)
            .resolve_payload("post", record(v))
            .to_value()
    }

    #[test]
    fn unique_field_item_connects_and_singular_id_connects() {
        let c = catalog();
        let out = resolve_post(
            &c,
            json!({"name": "A", "tags": [{"name": "x"}], "category": {"id": "7"}}),
        );
        assert_eq!(
            out,
            json!({"name": "A", "tags": {"connect": [{"name": "x"}]}, "category": {"connect": {"id": "7"}}})
        );
    }

    #[test]
    fn identifier_plus_fields_becomes_update() {
        let c = catalog();
        let out = resolve_post(&c, json!({"title": "P", "comments": [{"id": "1", "text": "hi"}]}));
        assert_eq!(
            out,
            json!({"title": "P", "comments": {"update": [{"match": {"id": "1"}, "data": {"text": "hi"}}]}})
        );
    }

    #[test]
    fn delete_tags_collapse_into_one_delete_many() {
        let c = catalog();
        let forward = resolve_post(
            &c,
            json!({"comments": [
                {"id": "1", "apiAction": "delete"},
                {"text": "new"},
                {"id": "2", "apiAction": "delete"},
                {"id": "1", "apiAction": "delete"}
            ]}),
        );
        let reversed = resolve_post(
            &c,
            json!({"comments": [
                {"id": "2", "apiAction": "delete"},
                {"id": "1", "apiAction": "delete"},
                {"text": "new"}
            ]}),
        );
        let ids = |v: &Value| -> Vec<String> {
            let mut ids: Vec<String> = v["comments"]["deleteMany"]["id"]["in"]
                .as_array()
                .unwrap()
                .iter()
                .map(|x| x.as_str().unwrap().to_string())
                .collect();
            ids.sort();
            ids
        };
        assert_eq!(ids(&forward), vec!["1", "2"]);
        assert_eq!(ids(&forward), ids(&reversed));
        assert_eq!(forward["comments"]["create"], json!([{"text": "new"}]));
    }

    #[test]
    fn disconnect_tag_keeps_only_identifier() {
        let c = catalog();
        let out = resolve_post(
            &c,
            json!({"tags": [{"id": "9", "name": "old", "apiAction": "disconnect"}]}),
        );
        assert_eq!(out, json!({"tags": {"disconnect": [{"id": "9"}]}}));
    }

    #[test]
    fn explicit_connect_tag_wins_over_update_and_is_stripped() {
        let c = catalog();
        let out = resolve_post(
            &c,
            json!({"comments": [{"id": "3", "text": "ignored", "apiAction": "connect"}]}),
        );
        assert_eq!(out, json!({"comments": {"connect": [{"id": "3"}]}}));
    }

    #[test]
    fn multi_field_item_without_identifier_is_created_not_connected() {
        let c = catalog();
        let out = resolve_post(&c, json!({"tags": [{"name": "x", "color": "red"}]}));
        assert_eq!(out, json!({"tags": {"create": [{"name": "x", "color": "red"}]}}));
    }

    #[test]
    fn lone_unique_field_with_non_scalar_value_is_not_connectable() {
        let c = catalog();
        let out = resolve_post(&c, json!({"tags": [{"name": {"first": "x"}}]}));
        assert_eq!(out, json!({"tags": {"create": [{"name": {"first": "x"}}]}}));
    }

    #[test]
    fn nested_creates_recurse_into_target_relations() {
        let c = catalog();
        let out = resolve_post(
            &c,
            json!({"comments": [{
                "text": "hi",
                "author": {"email": "a@b.c"},
                "reactions": [{"kind": "like"}, {"id": "r1", "apiAction": "delete"}]
            }]}),
        );
        assert_eq!(
            out,
            json!({"comments": {"create": [{
                "text": "hi",
                "author": {"connect": {"email": "a@b.c"}},
                "reactions": {
                    "create": [{"kind": "like"}],
                    "deleteMany": {"id": {"in": ["r1"]}}
                }
            }]}})
        );
    }

    #[test]
    fn nested_update_data_is_resolved_too() {
        let c = catalog();
        let out = resolve_post(
            &c,
            json!({"comments": [{"id": "1", "author": {"id": "u1"}, "apiAction": "update"}]}),
        );
        assert_eq!(
            out,
            json!({"comments": {"update": [{
                "match": {"id": "1"},
                "data": {"author": {"connect": {"id": "u1"}}}
            }]}})
        );
    }

    #[test]
    fn empty_list_yields_empty_bucket_map_and_null_passes_through() {
        let c = catalog();
        let out = resolve_post(&c, json!({"tags": [], "category": null}));
        assert_eq!(out, json!({"tags": {}, "category": null}));
    }

    #[test]
    fn flat_payload_is_unchanged() {
        let c = catalog();
        let payload = json!({"title": "P", "views": 3, "meta": {"a": [1, 2]}});
        assert_eq!(resolve_post(&c, payload.clone()), payload);
    }

    #[test]
    fn singular_item_with_identifier_and_data_updates() {
        let c = catalog();
        let out = resolve_post(&c, json!({"category": {"id": "7", "label": "News"}}));
        assert_eq!(
            out,
            json!({"category": {"update": {"match": {"id": "7"}, "data": {"label": "News"}}}})
        );
    }

    #[test]
    fn list_only_tags_on_a_singular_item_pass_through() {
        let c = catalog();
        let out = resolve_post(&c, json!({"category": {"id": 7, "apiAction": "disconnect"}}));
        assert_eq!(out, json!({"category": {"id": 7, "apiAction": "disconnect"}}));
        let data = RelationResolver::new(&c)
            .resolve_payload("post", record(json!({"category": {"label": "News", "apiAction": "delete"}})));
        assert!(matches!(data.relations["category"], RelationWrite::Passthrough(Value::Object(_))));
    }

    #[test]
    fn repeated_delete_ids_are_kept_once_in_first_seen_order() {
        let c = catalog();
        let items: Vec<Value> = (0..500)
            .map(|i| json!({"id": (i % 50).to_string(), "apiAction": "delete"}))
            .collect();
        let out = resolve_post(&c, json!({ "comments": items }));
        let ids = out["comments"]["deleteMany"]["id"]["in"].as_array().unwrap();
        assert_eq!(ids.len(), 50);
        assert_eq!(ids[0], json!("0"));
        assert_eq!(ids[49], json!("49"));
    }

    #[test]
    fn ignored_operations_are_dropped() {
        let c = catalog();
        let data = RelationResolver::new(&c)
            .ignoring(&[RelationOp::Delete, RelationOp::Disconnect])
            .resolve_payload(
                "post",
                record(json!({"comments": [
                    {"id": "1", "apiAction": "delete"},
                    {"id": "2", "apiAction": "disconnect"},
                    {"text": "kept"}
                ]})),
            );
        assert_eq!(
            data.to_value(),
            json!({"comments": {"create": [{"text": "kept"}]}})
        );
    }

    #[test]
    fn tags_never_reach_persisted_data() {
        let c = catalog();
        let out = resolve_post(
            &c,
            json!({"apiAction": "update", "comments": [{"text": "t", "apiAction": "create"}]}),
        );
        assert_eq!(out, json!({"comments": {"create": [{"text": "t"}]}}));
    }
}
