//! Translation of one nested write (scalars plus relation operation trees) into row primitives.
//!
//! Order per record: relations whose key lives on this record are settled first so the key can be
//! written with the row; the row is written; then relations keyed on the target side are applied
//! against the written row's referenced column.

use crate::catalog::{ForeignKey, RelationCatalog, RelationField};
use crate::config::{KeyHolder, ResolvedEntity, ResolvedModel};
use crate::engine::{BoxFuture, Filter, RowWriter};
use crate::error::AppError;
use crate::relation::{ListOps, Record, RelationWrite, SingleOp, WriteData};
use serde_json::Value;
use std::collections::BTreeMap;

type Planned<'a> = (&'a RelationField, &'a ForeignKey, RelationWrite);

pub(crate) struct NestedWrite<'a, W: RowWriter> {
    rows: &'a mut W,
    model: &'a ResolvedModel,
    catalog: &'a RelationCatalog,
}

impl<'a, W: RowWriter> NestedWrite<'a, W> {
    pub fn new(rows: &'a mut W, model: &'a ResolvedModel, catalog: &'a RelationCatalog) -> Self {
        NestedWrite { rows, model, catalog }
    }

    fn entity(&self, name: &str) -> Result<&'a ResolvedEntity, AppError> {
        let model: &'a ResolvedModel = self.model;
        model
            .entity(name)
            .ok_or_else(|| AppError::NotFound(format!("model {}", name)))
    }

    pub fn create<'s>(&'s mut self, model: &'s str, data: WriteData) -> BoxFuture<'s, Result<Record, AppError>> {
        Box::pin(async move {
            let entity = self.entity(model)?;
            let WriteData { mut scalars, relations } = data;
            let (local, remote) = self.plan(entity, relations)?;
            for (field, fk, write) in local {
                let key = self.settle_local(field, fk, write).await?;
                scalars.insert(fk.column.clone(), key);
            }
            let row = self.rows.insert(entity, scalars).await?;
            self.apply_remote(entity, &row, remote).await?;
            Ok(row)
        })
    }

    /// Updates every row matching `filter`; `None` when nothing matched (and nothing was written).
    pub fn update<'s>(
        &'s mut self,
        model: &'s str,
        filter: Filter,
        data: WriteData,
    ) -> BoxFuture<'s, Result<Option<Record>, AppError>> {
        Box::pin(async move {
            let entity = self.entity(model)?;
            if self.rows.select(entity, &filter).await?.is_empty() {
                return Ok(None);
            }
            let WriteData { mut scalars, relations } = data;
            let (local, remote) = self.plan(entity, relations)?;
            for (field, fk, write) in local {
                let key = self.settle_local(field, fk, write).await?;
                scalars.insert(fk.column.clone(), key);
            }
            scalars.remove(&entity.pk);
            let rows = self.rows.update(entity, &filter, scalars).await?;
            for row in &rows {
                self.apply_remote(entity, row, remote.clone()).await?;
            }
            Ok(rows.into_iter().next())
        })
    }

    /// Splits relation writes by which side holds the key.
    fn plan(
        &self,
        entity: &ResolvedEntity,
        relations: BTreeMap<String, RelationWrite>,
    ) -> Result<(Vec<Planned<'a>>, Vec<Planned<'a>>), AppError> {
        let catalog: &'a RelationCatalog = self.catalog;
        let entry = catalog.entry(&entity.name);
        let mut local = Vec::new();
        let mut remote = Vec::new();
        for (name, write) in relations {
            let Some((field, _)) = entry.and_then(|e| e.field(&name)) else {
                return Err(AppError::BadRequest(format!(
                    "unknown relation '{}' on {}",
                    name, entity.name
                )));
            };
            let Some(fk) = field.foreign_key.as_ref() else {
                return Err(AppError::BadRequest(format!(
                    "relation '{}' of {} declares no foreign key and cannot be written",
                    name, entity.name
                )));
            };
            match fk.holder {
                KeyHolder::Local => local.push((field, fk, write)),
                KeyHolder::Target => remote.push((field, fk, write)),
            }
        }
        Ok((local, remote))
    }

    /// Resolves a locally held relation to the key value to store on the parent row.
    async fn settle_local(
        &mut self,
        field: &'a RelationField,
        fk: &'a ForeignKey,
        write: RelationWrite,
    ) -> Result<Value, AppError> {
        let target = self.entity(&field.target_model)?;
        let row = match write {
            RelationWrite::Single(SingleOp::Connect(reference)) => self
                .rows
                .select(target, &Filter::from_record(&reference))
                .await?
                .into_iter()
                .next()
                .ok_or_else(|| missing_reference(field, &reference))?,
            RelationWrite::Single(SingleOp::Create(data)) => self.create(&field.target_model, data).await?,
            RelationWrite::Single(SingleOp::Update(op)) => {
                let filter = Filter::from_record(&op.match_);
                self.update(&field.target_model, filter, op.data)
                    .await?
                    .ok_or_else(|| missing_reference(field, &op.match_))?
            }
            RelationWrite::Passthrough(Value::Null) => return Ok(Value::Null),
            _ => {
                return Err(AppError::BadRequest(format!(
                    "relation '{}' expects a single object",
                    field.name
                )))
            }
        };
        Ok(row.get(&fk.references).cloned().unwrap_or(Value::Null))
    }

    async fn apply_remote(
        &mut self,
        parent: &ResolvedEntity,
        row: &Record,
        writes: Vec<Planned<'a>>,
    ) -> Result<(), AppError> {
        for (field, fk, write) in writes {
            let key = row.get(&fk.references).cloned().unwrap_or(Value::Null);
            if key.is_null() {
                return Err(AppError::BadRequest(format!(
                    "{}.{} is empty; relation '{}' cannot be written",
                    parent.name, fk.references, field.name
                )));
            }
            let target = self.entity(&field.target_model)?;
            match write {
                RelationWrite::List(ops) => self.apply_list(field, fk, target, &key, ops).await?,
                RelationWrite::Single(SingleOp::Create(mut data)) => {
                    data.scalars.insert(fk.column.clone(), key.clone());
                    self.create(&field.target_model, data).await?;
                }
                RelationWrite::Single(SingleOp::Connect(reference)) => {
                    self.connect(field, fk, target, reference, &key).await?
                }
                RelationWrite::Single(SingleOp::Update(op)) => {
                    let filter = Filter::from_record(&op.match_).and_eq(&fk.column, &key);
                    self.update(&field.target_model, filter, op.data)
                        .await?
                        .ok_or_else(|| missing_reference(field, &op.match_))?;
                }
                RelationWrite::Passthrough(Value::Null) => {
                    let scope = Filter::by_key(&fk.column, &key);
                    self.rows.update(target, &scope, key_set(fk, Value::Null)).await?;
                }
                RelationWrite::Passthrough(_) => {
                    return Err(AppError::BadRequest(format!(
                        "relation '{}' expects objects",
                        field.name
                    )))
                }
            }
        }
        Ok(())
    }

    /// Removals run before additions so an item can be detached and re-attached in one request.
    async fn apply_list(
        &mut self,
        field: &'a RelationField,
        fk: &'a ForeignKey,
        target: &'a ResolvedEntity,
        key: &Value,
        ops: ListOps,
    ) -> Result<(), AppError> {
        let ListOps {
            create,
            connect,
            update,
            disconnect,
            delete_many,
        } = ops;
        if let Some(dm) = delete_many {
            let filter = Filter::by_key(&fk.column, key).and_in(&dm.key, dm.values);
            let removed = self.rows.delete(target, &filter).await?;
            tracing::debug!(relation = %field.name, removed = removed.len(), "nested deleteMany");
        }
        for reference in disconnect {
            let filter = Filter::from_record(&reference).and_eq(&fk.column, key);
            self.rows.update(target, &filter, key_set(fk, Value::Null)).await?;
        }
        for reference in connect {
            self.connect(field, fk, target, reference, key).await?;
        }
        for op in update {
            let filter = Filter::from_record(&op.match_).and_eq(&fk.column, key);
            self.update(&field.target_model, filter, op.data)
                .await?
                .ok_or_else(|| missing_reference(field, &op.match_))?;
        }
        for mut data in create {
            data.scalars.insert(fk.column.clone(), key.clone());
            self.create(&field.target_model, data).await?;
        }
        Ok(())
    }

    async fn connect(
        &mut self,
        field: &'a RelationField,
        fk: &'a ForeignKey,
        target: &'a ResolvedEntity,
        reference: Record,
        key: &Value,
    ) -> Result<(), AppError> {
        let filter = Filter::from_record(&reference);
        let connected = self.rows.update(target, &filter, key_set(fk, key.clone())).await?;
        if connected.is_empty() {
            return Err(missing_reference(field, &reference));
        }
        Ok(())
    }
}

fn key_set(fk: &ForeignKey, value: Value) -> Record {
    let mut set = Record::new();
    set.insert(fk.column.clone(), value);
    set
}

fn missing_reference(field: &RelationField, reference: &Record) -> AppError {
    AppError::NotFound(format!(
        "{} matching {} (relation '{}')",
        field.target_model,
        Value::Object(reference.clone()),
        field.name
    ))
}
