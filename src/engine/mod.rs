//! Data engines. The operation tree produced by the relation resolver is accepted as-is; each
//! engine only supplies row primitives and the nested write is translated once in `nested`.

mod filter;
mod memory;
mod nested;
mod postgres;

pub use filter::{loose_eq, Condition, Filter};
pub use memory::MemoryEngine;
pub use postgres::PgEngine;

use crate::config::ResolvedEntity;
use crate::error::AppError;
use crate::query::QueryOptions;
use crate::relation::{Record, WriteData};
use async_trait::async_trait;
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;

pub(crate) type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[async_trait]
pub trait DataEngine: Send + Sync {
    /// Insert one record together with its nested relation writes.
    async fn create(&self, model: &str, data: WriteData) -> Result<Record, AppError>;

    async fn create_many(&self, model: &str, items: Vec<WriteData>) -> Result<Vec<Record>, AppError>;

    async fn find_many(&self, model: &str, options: &QueryOptions) -> Result<Vec<Record>, AppError>;

    async fn count(&self, model: &str, filters: &Record) -> Result<u64, AppError>;

    async fn find_one(
        &self,
        model: &str,
        id: &Value,
        options: &QueryOptions,
    ) -> Result<Option<Record>, AppError>;

    async fn find_first(&self, model: &str, filters: &Record) -> Result<Option<Record>, AppError>;

    /// `None` when no record has this id.
    async fn update(&self, model: &str, id: &Value, data: WriteData) -> Result<Option<Record>, AppError>;

    /// Scalar update of every matching record; returns how many matched.
    async fn update_many(&self, model: &str, filters: &Record, data: Record) -> Result<u64, AppError>;

    async fn delete(&self, model: &str, id: &Value) -> Result<Option<Record>, AppError>;

    async fn delete_many(&self, model: &str, filters: &Record) -> Result<u64, AppError>;

    /// Readiness probe.
    async fn ping(&self) -> Result<(), AppError> {
        Ok(())
    }
}

/// Row-level primitives the nested write is expressed in. Implemented over a transaction for
/// PostgreSQL and over the locked tables for the in-memory engine.
#[async_trait]
pub(crate) trait RowWriter: Send {
    async fn insert(&mut self, entity: &ResolvedEntity, row: Record) -> Result<Record, AppError>;

    async fn select(&mut self, entity: &ResolvedEntity, filter: &Filter) -> Result<Vec<Record>, AppError>;

    /// Returns the rows after the update. An empty `set` returns the matching rows unchanged.
    async fn update(
        &mut self,
        entity: &ResolvedEntity,
        filter: &Filter,
        set: Record,
    ) -> Result<Vec<Record>, AppError>;

    async fn delete(&mut self, entity: &ResolvedEntity, filter: &Filter) -> Result<Vec<Record>, AppError>;
}
