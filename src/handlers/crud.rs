//! Handlers for the eight generated model actions.

use crate::error::AppError;
use crate::handlers::{body_object, path_id, present};
use crate::pipeline::RequestContext;
use crate::relation::{RelationOp, RelationResolver, WriteData};
use crate::resource::Action;
use axum::http::StatusCode;
use serde_json::{json, Value};

pub(crate) async fn handle(ctx: &mut RequestContext) -> Result<(), AppError> {
    let state = ctx.state.clone();
    let entity = state.entity_for(&ctx.resource)?;
    let engine = state.engine.as_ref();
    let model = entity.name.as_str();

    match ctx.action {
        Action::CreateOne => {
            // nothing exists yet to disconnect from or delete
            let data = RelationResolver::new(&state.catalog)
                .ignoring(&[RelationOp::Delete, RelationOp::Disconnect])
                .resolve_payload(model, body_object(ctx)?);
            tracing::debug!(model, tree = %data.to_value(), "create");
            let record = engine.create(model, data).await?;
            ctx.envelope
                .set(StatusCode::CREATED, present(&state, entity, record, &ctx.query_options));
        }
        Action::FindMany => {
            let records = engine.find_many(model, &ctx.query_options).await?;
            let total = engine.count(model, &ctx.query_options.filters).await?;
            let data: Vec<Value> = records
                .into_iter()
                .map(|r| present(&state, entity, r, &ctx.query_options))
                .collect();
            ctx.envelope
                .set(StatusCode::OK, json!({ "data": data, "total": total }));
        }
        Action::FindOne => {
            let id = path_id(ctx, entity)?;
            let record = engine
                .find_one(model, &id, &ctx.query_options)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("{} {}", model, id)))?;
            ctx.envelope
                .set(StatusCode::OK, present(&state, entity, record, &ctx.query_options));
        }
        Action::UpdateOne => {
            let id = path_id(ctx, entity)?;
            let data = RelationResolver::new(&state.catalog).resolve_payload(model, body_object(ctx)?);
            tracing::debug!(model, %id, tree = %data.to_value(), "update");
            let record = engine
                .update(model, &id, data)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("{} {}", model, id)))?;
            ctx.envelope
                .set(StatusCode::OK, present(&state, entity, record, &ctx.query_options));
        }
        Action::DeleteOne => {
            let id = path_id(ctx, entity)?;
            engine
                .delete(model, &id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("{} {}", model, id)))?;
            ctx.envelope.set_status(StatusCode::NO_CONTENT);
        }
        Action::CreateMany => {
            let Value::Array(items) = &ctx.body else {
                return Err(AppError::BadRequest("body must be a JSON array".into()));
            };
            let resolver = RelationResolver::new(&state.catalog)
                .ignoring(&[RelationOp::Delete, RelationOp::Disconnect]);
            let mut batch: Vec<WriteData> = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                let Value::Object(map) = item else {
                    return Err(AppError::BadRequest(format!("item {} must be a JSON object", i)));
                };
                batch.push(resolver.resolve_payload(model, map.clone()));
            }
            let records = engine.create_many(model, batch).await?;
            let total = records.len();
            let data: Vec<Value> = records
                .into_iter()
                .map(|r| present(&state, entity, r, &ctx.query_options))
                .collect();
            ctx.envelope
                .set(StatusCode::CREATED, json!({ "data": data, "total": total }));
        }
        Action::UpdateMany => {
            let filters = &ctx.query_options.filters;
            if filters.is_empty() {
                return Err(AppError::BadRequest(
                    "updateMany needs at least one filter in the query string".into(),
                ));
            }
            let set = body_object(ctx)?;
            if let Some(key) = set.keys().find(|k| entity.relation(k).is_some()) {
                return Err(AppError::BadRequest(format!(
                    "updateMany takes scalar fields only; '{}' is a relation",
                    key
                )));
            }
            let total = engine.update_many(model, filters, set).await?;
            ctx.envelope.set(StatusCode::OK, json!({ "total": total }));
        }
        Action::DeleteMany => {
            let filters = &ctx.query_options.filters;
            if filters.is_empty() {
                return Err(AppError::BadRequest(
                    "deleteMany needs at least one filter in the query string".into(),
                ));
            }
            let total = engine.delete_many(model, filters).await?;
            ctx.envelope.set(StatusCode::OK, json!({ "total": total }));
        }
        other => {
            return Err(AppError::Internal(format!("{} is not a model action", other)));
        }
    }
    Ok(())
}
