//! Builds parameterized SELECT, COUNT, INSERT, UPDATE, DELETE from a resolved entity.

use crate::config::ResolvedEntity;
use crate::engine::{Condition, Filter};
use crate::error::AppError;
use crate::query::SortKey;
use crate::relation::Record;
use serde_json::Value;

const MAIN_ALIAS: &str = "main";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IncludeDirection {
    ToOne,
    ToMany,
}

/// One include loaded in the same query: name, direction, related entity, our key column, their key column.
pub struct IncludeSelect<'a> {
    pub name: &'a str,
    pub direction: IncludeDirection,
    pub related: &'a ResolvedEntity,
    pub our_key: &'a str,
    pub their_key: &'a str,
}

/// Quote identifier for PostgreSQL (safe: only from declarations).
pub fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

pub fn qualified_table(entity: &ResolvedEntity) -> String {
    format!("{}.{}", quoted(&entity.schema_name), quoted(&entity.table_name))
}

#[derive(Debug)]
pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<Value>,
}

impl QueryBuf {
    fn new() -> Self {
        QueryBuf {
            sql: String::new(),
            params: Vec::new(),
        }
    }

    /// Pushes a parameter and returns its placeholder, cast to the column type when one is declared.
    fn placeholder(&mut self, entity: &ResolvedEntity, column: &str, v: Value) -> String {
        self.params.push(v);
        let n = self.params.len();
        entity
            .column(column)
            .and_then(|c| c.pg_type.as_deref())
            .map(|t| format!("${}::{}", n, t))
            .unwrap_or_else(|| format!("${}", n))
    }
}

fn known_column(entity: &ResolvedEntity, column: &str) -> Result<(), AppError> {
    if entity.column(column).is_some() {
        Ok(())
    } else {
        Err(AppError::BadRequest(format!(
            "unknown column '{}' on {}",
            column, entity.name
        )))
    }
}

/// Column list; custom enum (schema.typename) and numeric come back as text so they decode as strings.
fn select_column_list(entity: &ResolvedEntity, alias: Option<&str>) -> String {
    entity
        .columns
        .iter()
        .map(|c| {
            let q = quoted(&c.name);
            let expr = match alias {
                Some(a) => format!("{}.{}", a, q),
                None => q.clone(),
            };
            let pg_type = c.pg_type.as_deref().unwrap_or("");
            if pg_type.contains('.') || pg_type == "numeric" {
                format!("{}::text AS {}", expr, q)
            } else if alias.is_some() {
                format!("{} AS {}", expr, q)
            } else {
                expr
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn where_clause(
    q: &mut QueryBuf,
    entity: &ResolvedEntity,
    filter: &Filter,
    alias: Option<&str>,
) -> Result<String, AppError> {
    let prefix = alias.map(|a| format!("{}.", a)).unwrap_or_default();
    let mut parts = Vec::with_capacity(filter.0.len());
    for cond in &filter.0 {
        known_column(entity, cond.column())?;
        match cond {
            Condition::Eq(col, Value::Null) => parts.push(format!("{}{} IS NULL", prefix, quoted(col))),
            Condition::Eq(col, v) => {
                let ph = q.placeholder(entity, col, v.clone());
                parts.push(format!("{}{} = {}", prefix, quoted(col), ph));
            }
            Condition::In(_, vs) if vs.is_empty() => parts.push("1 = 0".into()),
            Condition::In(col, vs) => {
                let phs: Vec<String> = vs
                    .iter()
                    .map(|v| q.placeholder(entity, col, v.clone()))
                    .collect();
                parts.push(format!("{}{} IN ({})", prefix, quoted(col), phs.join(", ")));
            }
        }
    }
    Ok(if parts.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", parts.join(" AND "))
    })
}

fn order_clause(entity: &ResolvedEntity, order_by: &[SortKey]) -> Result<String, AppError> {
    if order_by.is_empty() {
        return Ok(format!(" ORDER BY {}.{}", MAIN_ALIAS, quoted(&entity.pk)));
    }
    let mut parts = Vec::with_capacity(order_by.len());
    for key in order_by {
        known_column(entity, &key.field)?;
        let dir = if key.descending { "DESC" } else { "ASC" };
        parts.push(format!("{}.{} {}", MAIN_ALIAS, quoted(&key.field), dir));
    }
    Ok(format!(" ORDER BY {}", parts.join(", ")))
}

/// SELECT with includes as scalar subqueries (json_agg for to-many, row_to_json for to-one),
/// main table aliased as "main".
pub fn select(
    entity: &ResolvedEntity,
    filter: &Filter,
    order_by: &[SortKey],
    limit: Option<u32>,
    offset: Option<u32>,
    includes: &[IncludeSelect<'_>],
) -> Result<QueryBuf, AppError> {
    let mut q = QueryBuf::new();
    let mut select_parts = vec![select_column_list(entity, Some(MAIN_ALIAS))];
    for inc in includes {
        let sub_from = format!(
            "{} WHERE {} = {}.{}",
            qualified_table(inc.related),
            quoted(inc.their_key),
            MAIN_ALIAS,
            quoted(inc.our_key)
        );
        let rel_cols = select_column_list(inc.related, None);
        let subquery = match inc.direction {
            IncludeDirection::ToOne => format!(
                "(SELECT row_to_json(sub) FROM (SELECT {} FROM {} LIMIT 1) sub)",
                rel_cols, sub_from
            ),
            IncludeDirection::ToMany => format!(
                "(SELECT COALESCE(json_agg(row_to_json(sub)), '[]'::json) FROM (SELECT {} FROM {}) sub)",
                rel_cols, sub_from
            ),
        };
        select_parts.push(format!("{} AS {}", subquery, quoted(inc.name)));
    }

    let where_sql = where_clause(&mut q, entity, filter, Some(MAIN_ALIAS))?;
    let order_sql = order_clause(entity, order_by)?;
    let limit_sql = limit.map(|n| format!(" LIMIT {}", n)).unwrap_or_default();
    let offset_sql = offset.map(|n| format!(" OFFSET {}", n)).unwrap_or_default();
    q.sql = format!(
        "SELECT {} FROM {} {}{}{}{}{}",
        select_parts.join(", "),
        qualified_table(entity),
        MAIN_ALIAS,
        where_sql,
        order_sql,
        limit_sql,
        offset_sql
    );
    Ok(q)
}

pub fn count(entity: &ResolvedEntity, filter: &Filter) -> Result<QueryBuf, AppError> {
    let mut q = QueryBuf::new();
    let where_sql = where_clause(&mut q, entity, filter, None)?;
    q.sql = format!("SELECT COUNT(*) FROM {}{}", qualified_table(entity), where_sql);
    Ok(q)
}

/// INSERT of the declared columns. Columns absent from `row` are left to their DB default when
/// one exists (serial included), otherwise written as NULL. Undeclared keys are ignored.
pub fn insert(entity: &ResolvedEntity, row: &Record) -> Result<QueryBuf, AppError> {
    let mut q = QueryBuf::new();
    let mut cols = Vec::new();
    let mut placeholders = Vec::new();
    for c in &entity.columns {
        let val = row.get(&c.name).cloned();
        if val.is_none() && (c.has_default || c.type_name.contains("serial")) {
            continue;
        }
        let ph = q.placeholder(entity, &c.name, val.unwrap_or(Value::Null));
        cols.push(quoted(&c.name));
        placeholders.push(ph);
    }
    let returning = select_column_list(entity, None);
    q.sql = if cols.is_empty() {
        format!("INSERT INTO {} DEFAULT VALUES RETURNING {}", qualified_table(entity), returning)
    } else {
        format!(
            "INSERT INTO {} ({}) VALUES ({}) RETURNING {}",
            qualified_table(entity),
            cols.join(", "),
            placeholders.join(", "),
            returning
        )
    };
    Ok(q)
}

/// UPDATE of the declared columns present in `set`; with nothing to set this is a plain SELECT of
/// the matching rows.
pub fn update(entity: &ResolvedEntity, filter: &Filter, set: &Record) -> Result<QueryBuf, AppError> {
    let mut q = QueryBuf::new();
    let mut sets = Vec::new();
    for (k, v) in set {
        if *k == entity.pk || entity.column(k).is_none() {
            continue;
        }
        let rhs = q.placeholder(entity, k, v.clone());
        sets.push(format!("{} = {}", quoted(k), rhs));
    }
    let returning = select_column_list(entity, None);
    if sets.is_empty() {
        let where_sql = where_clause(&mut q, entity, filter, None)?;
        q.sql = format!("SELECT {} FROM {}{}", returning, qualified_table(entity), where_sql);
        return Ok(q);
    }
    let where_sql = where_clause(&mut q, entity, filter, None)?;
    q.sql = format!(
        "UPDATE {} SET {}{} RETURNING {}",
        qualified_table(entity),
        sets.join(", "),
        where_sql,
        returning
    );
    Ok(q)
}

pub fn delete(entity: &ResolvedEntity, filter: &Filter) -> Result<QueryBuf, AppError> {
    let mut q = QueryBuf::new();
    let where_sql = where_clause(&mut q, entity, filter, None)?;
    q.sql = format!(
        "DELETE FROM {}{} RETURNING {}",
        qualified_table(entity),
        where_sql,
        select_column_list(entity, None)
    );
    Ok(q)
}
