//! In-process engine: one vector of records per model. Used by the demo without a database and
//! by the tests, which also read its per-operation call counters.

use crate::catalog::RelationCatalog;
use crate::config::{KeyHolder, PkType, RelationKind, ResolvedEntity, ResolvedModel};
use crate::engine::nested::NestedWrite;
use crate::engine::{loose_eq, DataEngine, Filter, RowWriter};
use crate::error::AppError;
use crate::query::{QueryOptions, SortKey};
use crate::relation::{Record, WriteData};
use async_trait::async_trait;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct Tables {
    rows: HashMap<String, Vec<Record>>,
    sequences: HashMap<String, i64>,
}

impl Tables {
    fn table(&self, model: &str) -> &[Record] {
        self.rows.get(model).map(Vec::as_slice).unwrap_or(&[])
    }

    fn next_id(&mut self, entity: &ResolvedEntity) -> Value {
        match entity.pk_type {
            PkType::Int | PkType::BigInt => {
                let seq = self.sequences.entry(entity.name.clone()).or_insert(0);
                *seq += 1;
                Value::from(*seq)
            }
            PkType::Uuid | PkType::Text => Value::String(uuid::Uuid::new_v4().to_string()),
        }
    }
}

#[async_trait]
impl RowWriter for Tables {
    async fn insert(&mut self, entity: &ResolvedEntity, mut row: Record) -> Result<Record, AppError> {
        match row.get(&entity.pk) {
            None | Some(Value::Null) => {
                let id = self.next_id(entity);
                row.insert(entity.pk.clone(), id);
            }
            Some(Value::Number(n)) => {
                // keep generated ids ahead of explicit ones
                if let Some(n) = n.as_i64() {
                    let seq = self.sequences.entry(entity.name.clone()).or_insert(0);
                    *seq = (*seq).max(n);
                }
            }
            Some(_) => {}
        }
        for column in &entity.columns {
            if !row.contains_key(&column.name) && !column.has_default {
                row.insert(column.name.clone(), Value::Null);
            }
        }
        let table = self.rows.entry(entity.name.clone()).or_default();
        for key in std::iter::once(&entity.pk).chain(entity.unique_fields.iter()) {
            let Some(value) = row.get(key).filter(|v| !v.is_null()) else {
                continue;
            };
            if table
                .iter()
                .any(|r| r.get(key).map(|v| loose_eq(v, value)).unwrap_or(false))
            {
                return Err(AppError::Conflict(format!(
                    "{} with {} {} already exists",
                    entity.name, key, value
                )));
            }
        }
        table.push(row.clone());
        Ok(row)
    }

    async fn select(&mut self, entity: &ResolvedEntity, filter: &Filter) -> Result<Vec<Record>, AppError> {
        Ok(self
            .table(&entity.name)
            .iter()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect())
    }

    async fn update(
        &mut self,
        entity: &ResolvedEntity,
        filter: &Filter,
        set: Record,
    ) -> Result<Vec<Record>, AppError> {
        let Some(table) = self.rows.get_mut(&entity.name) else {
            return Ok(Vec::new());
        };
        let matched = table.iter().filter(|r| filter.matches(r)).count();
        for key in std::iter::once(&entity.pk).chain(entity.unique_fields.iter()) {
            let Some(value) = set.get(key).filter(|v| !v.is_null()) else {
                continue;
            };
            let taken = table
                .iter()
                .filter(|r| !filter.matches(r))
                .any(|r| r.get(key).map(|v| loose_eq(v, value)).unwrap_or(false));
            if taken || matched > 1 {
                return Err(AppError::Conflict(format!(
                    "{} with {} {} already exists",
                    entity.name, key, value
                )));
            }
        }
        let mut out = Vec::new();
        for row in table.iter_mut().filter(|r| filter.matches(r)) {
            for (k, v) in &set {
                row.insert(k.clone(), v.clone());
            }
            out.push(row.clone());
        }
        Ok(out)
    }

    async fn delete(&mut self, entity: &ResolvedEntity, filter: &Filter) -> Result<Vec<Record>, AppError> {
        let Some(table) = self.rows.get_mut(&entity.name) else {
            return Ok(Vec::new());
        };
        let (removed, kept): (Vec<Record>, Vec<Record>) =
            table.drain(..).partition(|r| filter.matches(r));
        *table = kept;
        Ok(removed)
    }
}

pub struct MemoryEngine {
    model: Arc<ResolvedModel>,
    catalog: Arc<RelationCatalog>,
    tables: tokio::sync::Mutex<Tables>,
    calls: Mutex<HashMap<&'static str, usize>>,
}

impl MemoryEngine {
    pub fn new(model: Arc<ResolvedModel>, catalog: Arc<RelationCatalog>) -> Self {
        MemoryEngine {
            model,
            catalog,
            tables: tokio::sync::Mutex::new(Tables::default()),
            calls: Mutex::new(HashMap::new()),
        }
    }

    /// How many times `op` (e.g. "find_many") was called.
    pub fn calls(&self, op: &str) -> usize {
        self.calls
            .lock()
            .map(|c| c.get(op).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().map(|c| c.values().sum()).unwrap_or(0)
    }

    /// Snapshot of every stored record of `model`, in insertion order.
    pub async fn records(&self, model: &str) -> Vec<Record> {
        self.tables.lock().await.table(model).to_vec()
    }

    fn record_call(&self, op: &'static str) {
        if let Ok(mut calls) = self.calls.lock() {
            *calls.entry(op).or_insert(0) += 1;
        }
    }

    fn entity(&self, model: &str) -> Result<&ResolvedEntity, AppError> {
        self.model
            .entity(model)
            .ok_or_else(|| AppError::NotFound(format!("model {}", model)))
    }

    fn load_includes(&self, tables: &Tables, entity: &ResolvedEntity, row: &mut Record, include: &[String]) {
        let Some(entry) = self.catalog.entry(&entity.name) else {
            return;
        };
        for name in include {
            let Some((field, kind)) = entry.field(name) else {
                continue;
            };
            let Some(fk) = &field.foreign_key else {
                continue;
            };
            let related = tables.table(&field.target_model);
            let value = match fk.holder {
                KeyHolder::Local => {
                    let key = row.get(&fk.column).cloned().unwrap_or(Value::Null);
                    if key.is_null() {
                        Value::Null
                    } else {
                        let filter = Filter::by_key(&fk.references, &key);
                        related
                            .iter()
                            .find(|r| filter.matches(r))
                            .cloned()
                            .map(Value::Object)
                            .unwrap_or(Value::Null)
                    }
                }
                KeyHolder::Target => {
                    let key = row.get(&fk.references).cloned().unwrap_or(Value::Null);
                    let filter = Filter::by_key(&fk.column, &key);
                    let mut children = related
                        .iter()
                        .filter(|r| !key.is_null() && filter.matches(r))
                        .cloned()
                        .map(Value::Object);
                    match kind {
                        RelationKind::List => Value::Array(children.collect()),
                        RelationKind::Singular => children.next().unwrap_or(Value::Null),
                    }
                }
            };
            row.insert(name.clone(), value);
        }
    }
}

#[async_trait]
impl DataEngine for MemoryEngine {
    async fn create(&self, model: &str, data: WriteData) -> Result<Record, AppError> {
        self.record_call("create");
        let mut tables = self.tables.lock().await;
        NestedWrite::new(&mut *tables, &self.model, &self.catalog)
            .create(model, data)
            .await
    }

    async fn create_many(&self, model: &str, items: Vec<WriteData>) -> Result<Vec<Record>, AppError> {
        self.record_call("create_many");
        let mut tables = self.tables.lock().await;
        let mut writer = NestedWrite::new(&mut *tables, &self.model, &self.catalog);
        let mut out = Vec::with_capacity(items.len());
        for data in items {
            out.push(writer.create(model, data).await?);
        }
        Ok(out)
    }

    async fn find_many(&self, model: &str, options: &QueryOptions) -> Result<Vec<Record>, AppError> {
        self.record_call("find_many");
        let entity = self.entity(model)?;
        let tables = self.tables.lock().await;
        let filter = Filter::from_record(&options.filters);
        let mut rows: Vec<Record> = tables
            .table(model)
            .iter()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        sort_rows(&mut rows, &options.order_by, &entity.pk);
        let mut page: Vec<Record> = rows
            .into_iter()
            .skip(options.effective_offset() as usize)
            .take(options.effective_limit() as usize)
            .collect();
        for row in &mut page {
            self.load_includes(&tables, entity, row, &options.include);
        }
        Ok(page)
    }

    async fn count(&self, model: &str, filters: &Record) -> Result<u64, AppError> {
        self.record_call("count");
        let tables = self.tables.lock().await;
        let filter = Filter::from_record(filters);
        Ok(tables.table(model).iter().filter(|r| filter.matches(r)).count() as u64)
    }

    async fn find_one(
        &self,
        model: &str,
        id: &Value,
        options: &QueryOptions,
    ) -> Result<Option<Record>, AppError> {
        self.record_call("find_one");
        let entity = self.entity(model)?;
        let tables = self.tables.lock().await;
        let filter = Filter::by_key(&entity.pk, id);
        let Some(mut row) = tables.table(model).iter().find(|r| filter.matches(r)).cloned() else {
            return Ok(None);
        };
        self.load_includes(&tables, entity, &mut row, &options.include);
        Ok(Some(row))
    }

    async fn find_first(&self, model: &str, filters: &Record) -> Result<Option<Record>, AppError> {
        self.record_call("find_first");
        let tables = self.tables.lock().await;
        let filter = Filter::from_record(filters);
        Ok(tables.table(model).iter().find(|r| filter.matches(r)).cloned())
    }

    async fn update(&self, model: &str, id: &Value, data: WriteData) -> Result<Option<Record>, AppError> {
        self.record_call("update");
        let entity = self.entity(model)?;
        let filter = Filter::by_key(&entity.pk, id);
        let mut tables = self.tables.lock().await;
        NestedWrite::new(&mut *tables, &self.model, &self.catalog)
            .update(model, filter, data)
            .await
    }

    async fn update_many(&self, model: &str, filters: &Record, mut data: Record) -> Result<u64, AppError> {
        self.record_call("update_many");
        let entity = self.entity(model)?;
        data.remove(&entity.pk);
        let mut tables = self.tables.lock().await;
        let updated = tables.update(entity, &Filter::from_record(filters), data).await?;
        Ok(updated.len() as u64)
    }

    async fn delete(&self, model: &str, id: &Value) -> Result<Option<Record>, AppError> {
        self.record_call("delete");
        let entity = self.entity(model)?;
        let mut tables = self.tables.lock().await;
        let removed = tables.delete(entity, &Filter::by_key(&entity.pk, id)).await?;
        Ok(removed.into_iter().next())
    }

    async fn delete_many(&self, model: &str, filters: &Record) -> Result<u64, AppError> {
        self.record_call("delete_many");
        let entity = self.entity(model)?;
        let mut tables = self.tables.lock().await;
        let removed = tables.delete(entity, &Filter::from_record(filters)).await?;
        Ok(removed.len() as u64)
    }
}

fn sort_rows(rows: &mut [Record], order_by: &[SortKey], pk: &str) {
    let default_order = [SortKey {
        field: pk.to_string(),
        descending: false,
    }];
    let keys = if order_by.is_empty() { &default_order[..] } else { order_by };
    rows.sort_by(|a, b| {
        for key in keys {
            let ord = compare_values(
                a.get(&key.field).unwrap_or(&Value::Null),
                b.get(&key.field).unwrap_or(&Value::Null),
            );
            let ord = if key.descending { ord.reverse() } else { ord };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
}

/// Nulls first, then booleans, numbers, strings; anything else compares equal.
fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Less,
        (_, Value::Null) => Ordering::Greater,
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => Ordering::Equal,
    }
}
