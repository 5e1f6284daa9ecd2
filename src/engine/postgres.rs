//! PostgreSQL engine. Every nested write runs in one transaction.

use crate::catalog::RelationCatalog;
use crate::config::{KeyHolder, RelationKind, ResolvedEntity, ResolvedModel};
use crate::engine::nested::NestedWrite;
use crate::engine::{DataEngine, Filter, RowWriter};
use crate::error::AppError;
use crate::query::QueryOptions;
use crate::relation::{Record, WriteData};
use crate::sql::{self, IncludeDirection, IncludeSelect, PgBindValue, QueryBuf};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::query::Query;
use sqlx::{PgConnection, PgPool, Postgres};
use std::sync::Arc;

const BULK_LIMIT: usize = 100;

pub struct PgEngine {
    pool: PgPool,
    model: Arc<ResolvedModel>,
    catalog: Arc<RelationCatalog>,
}

impl PgEngine {
    pub fn new(pool: PgPool, model: Arc<ResolvedModel>, catalog: Arc<RelationCatalog>) -> Self {
        PgEngine { pool, model, catalog }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn entity(&self, model: &str) -> Result<&ResolvedEntity, AppError> {
        self.model
            .entity(model)
            .ok_or_else(|| AppError::NotFound(format!("model {}", model)))
    }

    fn includes<'a>(&'a self, entity: &ResolvedEntity, names: &'a [String]) -> Vec<IncludeSelect<'a>> {
        let Some(entry) = self.catalog.entry(&entity.name) else {
            return Vec::new();
        };
        names
            .iter()
            .filter_map(|name| {
                let (field, kind) = entry.field(name)?;
                let fk = field.foreign_key.as_ref()?;
                let related = self.model.entity(&field.target_model)?;
                Some(match fk.holder {
                    KeyHolder::Local => IncludeSelect {
                        name: name.as_str(),
                        direction: IncludeDirection::ToOne,
                        related,
                        our_key: &fk.column,
                        their_key: &fk.references,
                    },
                    KeyHolder::Target => IncludeSelect {
                        name: name.as_str(),
                        direction: match kind {
                            RelationKind::List => IncludeDirection::ToMany,
                            RelationKind::Singular => IncludeDirection::ToOne,
                        },
                        related,
                        our_key: &fk.references,
                        their_key: &fk.column,
                    },
                })
            })
            .collect()
    }

    async fn fetch_all(&self, q: &QueryBuf) -> Result<Vec<Record>, AppError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let rows = bind_all(&q.sql, &q.params).fetch_all(&self.pool).await?;
        Ok(rows.iter().map(row_to_record).collect())
    }
}

#[async_trait]
impl DataEngine for PgEngine {
    async fn create(&self, model: &str, data: WriteData) -> Result<Record, AppError> {
        let mut tx = self.pool.begin().await?;
        let row = {
            let mut writer = PgWriter { conn: &mut *tx };
            NestedWrite::new(&mut writer, &self.model, &self.catalog)
                .create(model, data)
                .await?
        };
        tx.commit().await?;
        Ok(row)
    }

    async fn create_many(&self, model: &str, items: Vec<WriteData>) -> Result<Vec<Record>, AppError> {
        if items.len() > BULK_LIMIT {
            return Err(AppError::BadRequest(format!(
                "createMany limited to {} items",
                BULK_LIMIT
            )));
        }
        let mut tx = self.pool.begin().await?;
        let mut out = Vec::with_capacity(items.len());
        {
            let mut writer = PgWriter { conn: &mut *tx };
            let mut nested = NestedWrite::new(&mut writer, &self.model, &self.catalog);
            for data in items {
                out.push(nested.create(model, data).await?);
            }
        }
        tx.commit().await?;
        Ok(out)
    }

    async fn find_many(&self, model: &str, options: &QueryOptions) -> Result<Vec<Record>, AppError> {
        let entity = self.entity(model)?;
        let includes = self.includes(entity, &options.include);
        let q = sql::select(
            entity,
            &Filter::from_record(&options.filters),
            &options.order_by,
            Some(options.effective_limit()),
            Some(options.effective_offset()),
            &includes,
        )?;
        self.fetch_all(&q).await
    }

    async fn count(&self, model: &str, filters: &Record) -> Result<u64, AppError> {
        let entity = self.entity(model)?;
        let q = sql::count(entity, &Filter::from_record(filters))?;
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let row = bind_all(&q.sql, &q.params).fetch_one(&self.pool).await?;
        let n: i64 = sqlx::Row::try_get(&row, 0)?;
        Ok(n.max(0) as u64)
    }

    async fn find_one(
        &self,
        model: &str,
        id: &Value,
        options: &QueryOptions,
    ) -> Result<Option<Record>, AppError> {
        let entity = self.entity(model)?;
        let includes = self.includes(entity, &options.include);
        let q = sql::select(entity, &Filter::by_key(&entity.pk, id), &[], Some(1), None, &includes)?;
        Ok(self.fetch_all(&q).await?.into_iter().next())
    }

    async fn find_first(&self, model: &str, filters: &Record) -> Result<Option<Record>, AppError> {
        let entity = self.entity(model)?;
        let q = sql::select(entity, &Filter::from_record(filters), &[], Some(1), None, &[])?;
        Ok(self.fetch_all(&q).await?.into_iter().next())
    }

    async fn update(&self, model: &str, id: &Value, data: WriteData) -> Result<Option<Record>, AppError> {
        let entity = self.entity(model)?;
        let filter = Filter::by_key(&entity.pk, id);
        let mut tx = self.pool.begin().await?;
        let row = {
            let mut writer = PgWriter { conn: &mut *tx };
            NestedWrite::new(&mut writer, &self.model, &self.catalog)
                .update(model, filter, data)
                .await?
        };
        tx.commit().await?;
        Ok(row)
    }

    async fn update_many(&self, model: &str, filters: &Record, data: Record) -> Result<u64, AppError> {
        let entity = self.entity(model)?;
        let q = sql::update(entity, &Filter::from_record(filters), &data)?;
        Ok(self.fetch_all(&q).await?.len() as u64)
    }

    async fn delete(&self, model: &str, id: &Value) -> Result<Option<Record>, AppError> {
        let entity = self.entity(model)?;
        let q = sql::delete(entity, &Filter::by_key(&entity.pk, id))?;
        Ok(self.fetch_all(&q).await?.into_iter().next())
    }

    async fn delete_many(&self, model: &str, filters: &Record) -> Result<u64, AppError> {
        let entity = self.entity(model)?;
        let q = sql::delete(entity, &Filter::from_record(filters))?;
        Ok(self.fetch_all(&q).await?.len() as u64)
    }

    async fn ping(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1").fetch_optional(&self.pool).await?;
        Ok(())
    }
}

/// Row primitives bound to an open transaction.
struct PgWriter<'c> {
    conn: &'c mut PgConnection,
}

impl PgWriter<'_> {
    async fn run(&mut self, q: QueryBuf) -> Result<Vec<Record>, AppError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query (tx)");
        let rows = bind_all(&q.sql, &q.params).fetch_all(&mut *self.conn).await?;
        Ok(rows.iter().map(row_to_record).collect())
    }
}

#[async_trait]
impl RowWriter for PgWriter<'_> {
    async fn insert(&mut self, entity: &ResolvedEntity, row: Record) -> Result<Record, AppError> {
        let q = sql::insert(entity, &row)?;
        self.run(q)
            .await?
            .into_iter()
            .next()
            .ok_or(AppError::Db(sqlx::Error::RowNotFound))
    }

    async fn select(&mut self, entity: &ResolvedEntity, filter: &Filter) -> Result<Vec<Record>, AppError> {
        let q = sql::select(entity, filter, &[], None, None, &[])?;
        self.run(q).await
    }

    async fn update(
        &mut self,
        entity: &ResolvedEntity,
        filter: &Filter,
        set: Record,
    ) -> Result<Vec<Record>, AppError> {
        let q = sql::update(entity, filter, &set)?;
        self.run(q).await
    }

    async fn delete(&mut self, entity: &ResolvedEntity, filter: &Filter) -> Result<Vec<Record>, AppError> {
        let q = sql::delete(entity, filter)?;
        self.run(q).await
    }
}

fn bind_all<'q>(sql: &'q str, params: &[Value]) -> Query<'q, Postgres, PgArguments> {
    let mut query = sqlx::query(sql);
    for p in params {
        query = query.bind(PgBindValue::from(p));
    }
    query
}

fn row_to_record(row: &PgRow) -> Record {
    use sqlx::Column;
    use sqlx::Row;
    let mut map = Record::new();
    for col in row.columns() {
        let name = col.name();
        map.insert(name.to_string(), cell_to_value(row, name));
    }
    map
}

fn cell_to_value(row: &PgRow, name: &str) -> Value {
    use sqlx::Row;
    if let Ok(Some(n)) = row.try_get::<Option<i16>, _>(name) {
        return Value::from(n);
    }
    if let Ok(Some(n)) = row.try_get::<Option<i32>, _>(name) {
        return Value::from(n);
    }
    if let Ok(Some(n)) = row.try_get::<Option<i64>, _>(name) {
        return Value::from(n);
    }
    if let Ok(Some(n)) = row.try_get::<Option<f32>, _>(name) {
        if let Some(n) = serde_json::Number::from_f64(n as f64) {
            return Value::Number(n);
        }
    }
    if let Ok(Some(n)) = row.try_get::<Option<f64>, _>(name) {
        if let Some(n) = serde_json::Number::from_f64(n) {
            return Value::Number(n);
        }
    }
    if let Ok(Some(b)) = row.try_get::<Option<bool>, _>(name) {
        return Value::Bool(b);
    }
    if let Ok(Some(u)) = row.try_get::<Option<uuid::Uuid>, _>(name) {
        return Value::String(u.to_string());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(name) {
        return Value::String(d.to_rfc3339());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::NaiveDateTime>, _>(name) {
        return Value::String(d.format("%Y-%m-%dT%H:%M:%S%.f").to_string());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::NaiveDate>, _>(name) {
        return Value::String(d.format("%Y-%m-%d").to_string());
    }
    if let Ok(Some(s)) = row.try_get::<Option<String>, _>(name) {
        return Value::String(s);
    }
    if let Ok(Some(j)) = row.try_get::<Option<Value>, _>(name) {
        return j;
    }
    Value::Null
}
