//! DDL for the declared models: schemas, tables, then foreign keys for relations that declare one.
//! Idempotent; existing tables are left as they are.

use crate::config::{KeyHolder, RelationConfig, ResolvedEntity, ResolvedModel};
use crate::error::AppError;
use crate::sql::{qualified_table, quoted};
use sqlx::PgPool;
use std::collections::BTreeSet;

pub async fn apply_migrations(pool: &PgPool, model: &ResolvedModel) -> Result<(), AppError> {
    let schemas: BTreeSet<&str> = model.entities.iter().map(|e| e.schema_name.as_str()).collect();
    for schema in schemas {
        sqlx::query(&format!("CREATE SCHEMA IF NOT EXISTS {}", quoted(schema)))
            .execute(pool)
            .await?;
    }

    for entity in &model.entities {
        let Some(sql) = create_table_sql(entity) else {
            tracing::debug!(model = %entity.name, "no fields declared, table not managed");
            continue;
        };
        tracing::debug!(sql = %sql, "create table");
        sqlx::query(&sql).execute(pool).await?;
    }

    for entity in &model.entities {
        for relation in &entity.relations {
            let Some(sql) = foreign_key_sql(model, entity, relation) else {
                continue;
            };
            // fails when the constraint already exists
            if let Err(e) = sqlx::query(&sql).execute(pool).await {
                tracing::debug!(model = %entity.name, relation = %relation.name, error = %e, "foreign key not added");
            }
        }
    }
    tracing::info!(tables = model.entities.len(), "migrations applied");
    Ok(())
}

/// `None` for models declared without fields.
pub fn create_table_sql(entity: &ResolvedEntity) -> Option<String> {
    if entity.columns.is_empty() {
        return None;
    }
    let mut defs: Vec<String> = entity
        .columns
        .iter()
        .map(|c| {
            let mut def = format!("{} {}", quoted(&c.name), c.sql_type);
            if !c.nullable {
                def.push_str(" NOT NULL");
            }
            if let Some(d) = &c.default_sql {
                def.push_str(" DEFAULT ");
                def.push_str(d);
            }
            def
        })
        .collect();
    defs.push(format!("PRIMARY KEY ({})", quoted(&entity.pk)));
    for field in &entity.unique_fields {
        defs.push(format!("UNIQUE ({})", quoted(field)));
    }
    Some(format!(
        "CREATE TABLE IF NOT EXISTS {} (\n  {}\n)",
        qualified_table(entity),
        defs.join(",\n  ")
    ))
}

fn foreign_key_sql(model: &ResolvedModel, entity: &ResolvedEntity, relation: &RelationConfig) -> Option<String> {
    let fk = relation.foreign_key.as_ref()?;
    let target = model.entity(&relation.target)?;
    let (holder, referenced) = match fk.holder {
        KeyHolder::Local => (entity, target),
        KeyHolder::Target => (target, entity),
    };
    let references = fk.references.as_deref().unwrap_or(&referenced.pk);
    Some(format!(
        "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({}) ON DELETE SET NULL",
        qualified_table(holder),
        quoted(&format!("{}_{}_fkey", holder.table_name, fk.column)),
        quoted(&fk.column),
        qualified_table(referenced),
        quoted(references)
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{resolve, ModelConfig};
    use serde_json::json;

    fn model() -> ResolvedModel {
        let models: Vec<ModelConfig> = serde_json::from_value(json!([
            {"name": "post", "fields": [
                {"name": "id", "type": "uuid", "default": "gen_random_uuid()"},
                {"name": "title", "type": {"name": "varchar", "params": [120]}, "nullable": false},
                {"name": "slug", "type": "text", "unique": true},
                {"name": "status", "type": "text", "default": "draft"}
             ],
             "relations": [{"name": "comments", "target": "comment", "kind": "list",
                            "foreignKey": {"holder": "target", "column": "postId"}}]},
            {"name": "comment", "fields": [
                {"name": "id", "type": "bigserial"},
                {"name": "postId", "type": "uuid"}
            ]}
        ]))
        .unwrap();
        resolve(&models).unwrap()
    }

    #[test]
    fn table_ddl_carries_types_defaults_and_constraints() {
        let model = model();
        let sql = create_table_sql(model.entity("post").unwrap()).unwrap();
        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS \"public\".\"posts\""));
        assert!(sql.contains("\"id\" uuid NOT NULL DEFAULT gen_random_uuid()"));
        assert!(sql.contains("\"title\" varchar(120) NOT NULL"));
        assert!(sql.contains("\"status\" text DEFAULT 'draft'"));
        assert!(sql.contains("PRIMARY KEY (\"id\")"));
        assert!(sql.contains("UNIQUE (\"slug\")"));
    }

    #[test]
    fn target_held_keys_constrain_the_target_table() {
        let model = model();
        let post = model.entity("post").unwrap();
        let sql = foreign_key_sql(&model, post, &post.relations[0]).unwrap();
        assert!(sql.starts_with("ALTER TABLE \"public\".\"comments\""));
        assert!(sql.contains("FOREIGN KEY (\"postId\") REFERENCES \"public\".\"posts\" (\"id\")"));
    }
}
