//! Core handlers: the one stage of a pipeline that talks to the data engine. Each handler reads
//! the request context and attaches its result to `ctx.envelope`.

pub mod auth;
pub mod crud;

use crate::auth::PASSWORD_FIELD;
use crate::config::ResolvedEntity;
use crate::error::AppError;
use crate::pipeline::RequestContext;
use crate::query::{parse_id, QueryOptions};
use crate::relation::Record;
use crate::resource::AUTH_RESOURCE;
use crate::state::AppState;
use serde_json::Value;

pub(crate) async fn dispatch(ctx: &mut RequestContext) -> Result<(), AppError> {
    if ctx.resource == AUTH_RESOURCE {
        auth::handle(ctx).await
    } else {
        crud::handle(ctx).await
    }
}

/// Projects a record and strips what must not leave the process, including inside included
/// relations.
pub(crate) fn present(state: &AppState, entity: &ResolvedEntity, mut record: Record, options: &QueryOptions) -> Value {
    options.project(&mut record, &entity.pk);
    let mut value = Value::Object(record);
    strip(state, entity, &mut value);
    for name in &options.include {
        let Some(target) = entity.relation(name).and_then(|r| state.model.entity(&r.target)) else {
            continue;
        };
        if let Some(nested) = value.get_mut(name) {
            strip(state, target, nested);
        }
    }
    value
}

fn strip(state: &AppState, entity: &ResolvedEntity, value: &mut Value) {
    entity.strip_sensitive(value);
    if entity.name == state.settings.auth.user_model {
        remove_field(value, PASSWORD_FIELD);
    }
}

fn remove_field(value: &mut Value, field: &str) {
    match value {
        Value::Object(map) => {
            map.remove(field);
        }
        Value::Array(items) => {
            for item in items {
                remove_field(item, field);
            }
        }
        _ => {}
    }
}

/// Body of a single-record write; the body is left in the context for post-hooks.
pub(crate) fn body_object(ctx: &RequestContext) -> Result<Record, AppError> {
    match &ctx.body {
        Value::Object(map) => Ok(map.clone()),
        _ => Err(AppError::BadRequest("body must be a JSON object".into())),
    }
}

pub(crate) fn path_id(ctx: &RequestContext, entity: &ResolvedEntity) -> Result<Value, AppError> {
    let raw = ctx
        .id
        .as_deref()
        .ok_or_else(|| AppError::BadRequest("missing id".into()))?;
    parse_id(raw, &entity.pk_type)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn remove_field_reaches_into_lists() {
        let mut v = json!([{"id": 1, "password": "x"}, {"id": 2, "password": "y"}]);
        remove_field(&mut v, "password");
        assert_eq!(v, json!([{"id": 1}, {"id": 2}]));
    }
}
