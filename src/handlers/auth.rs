//! Handlers for the auth surface: signup, login, logout, password change and `/users/me`.

use crate::auth::{
    hash_password, is_verified, verify_password, Identity, PASSWORD_CHANGED_AT_FIELD, PASSWORD_FIELD,
    ROLES_FIELD, VERIFIED_FIELD,
};
use crate::error::{AppError, FieldError};
use crate::handlers::{body_object, present};
use crate::pipeline::RequestContext;
use crate::relation::{Record, RelationOp, RelationResolver, WriteData};
use crate::resource::Action;
use axum::http::{header, StatusCode};
use serde_json::{json, Value};

/// Fields an identity can log in with, in lookup order.
const LOGIN_FIELDS: [&str; 2] = ["email", "username"];

/// Fields only the server sets on an identity.
const PROTECTED_FIELDS: [&str; 3] = [ROLES_FIELD, VERIFIED_FIELD, PASSWORD_CHANGED_AT_FIELD];

pub(crate) async fn handle(ctx: &mut RequestContext) -> Result<(), AppError> {
    match ctx.action {
        Action::Signup => signup(ctx).await,
        Action::Login => login(ctx).await,
        Action::Logout => {
            ctx.envelope.set_status(StatusCode::NO_CONTENT);
            expire_cookie(ctx)
        }
        Action::UpdatePassword => update_password(ctx).await,
        Action::GetMe => get_me(ctx).await,
        Action::UpdateMe => update_me(ctx).await,
        Action::DeleteMe => delete_me(ctx).await,
        other => Err(AppError::Internal(format!("{} is not an auth action", other))),
    }
}

async fn signup(ctx: &mut RequestContext) -> Result<(), AppError> {
    let state = ctx.state.clone();
    let users = state.entity_for(&ctx.resource)?;
    let mut body = body_object(ctx)?;
    for field in PROTECTED_FIELDS {
        body.remove(field);
    }
    let password = required_str(&body, PASSWORD_FIELD)?.to_string();

    for field in LOGIN_FIELDS {
        let Some(value) = body.get(field).filter(|v| !v.is_null()) else {
            continue;
        };
        let filter = Record::from_iter([(field.to_string(), value.clone())]);
        if state.engine.find_first(&users.name, &filter).await?.is_some() {
            return Err(AppError::Conflict(format!("{} is already registered", field)));
        }
    }

    body.insert(PASSWORD_FIELD.into(), Value::String(hash_password(&password)?));
    body.insert(ROLES_FIELD.into(), json!(state.settings.auth.default_roles));
    let data = RelationResolver::new(&state.catalog)
        .ignoring(&[RelationOp::Delete, RelationOp::Disconnect])
        .resolve_payload(&users.name, body);
    let record = state.engine.create(&users.name, data).await?;
    tracing::info!(model = %users.name, "identity signed up");
    ctx.envelope
        .set(StatusCode::CREATED, present(&state, users, record, &ctx.query_options));
    Ok(())
}

async fn login(ctx: &mut RequestContext) -> Result<(), AppError> {
    let state = ctx.state.clone();
    let users = state.entity_for(&ctx.resource)?;
    let body = body_object(ctx)?;
    let password = required_str(&body, PASSWORD_FIELD)?;
    let (field, login) = LOGIN_FIELDS
        .iter()
        .find_map(|f| body.get(*f).and_then(Value::as_str).map(|v| (*f, v)))
        .ok_or_else(|| {
            AppError::validation(vec![FieldError::new("email", "email or username is required")])
        })?;

    let filter = Record::from_iter([(field.to_string(), Value::String(login.to_string()))]);
    let record = state
        .engine
        .find_first(&users.name, &filter)
        .await?
        .ok_or_else(|| AppError::unauthorized("invalid credentials"))?;
    let hash = record.get(PASSWORD_FIELD).and_then(Value::as_str).unwrap_or_default();
    if !verify_password(password, hash) {
        return Err(AppError::unauthorized("invalid credentials"));
    }
    if state.settings.auth.require_verification && !is_verified(&record) {
        return Err(AppError::locked("identity is not verified"));
    }

    let id = record.get(&users.pk).cloned().unwrap_or(Value::Null);
    let token = state.tokens.issue(&subject(&id))?;
    tracing::debug!(%id, "login");
    ctx.envelope.set(StatusCode::OK, json!({ "accessToken": token }));
    set_cookie(ctx, &token)
}

async fn update_password(ctx: &mut RequestContext) -> Result<(), AppError> {
    let state = ctx.state.clone();
    let users = state.entity_for(&ctx.resource)?;
    let identity = current(ctx)?.clone();
    let body = body_object(ctx)?;
    let current_password = required_str(&body, "currentPassword")?;
    let new_password = required_str(&body, "newPassword")?;

    let hash = identity
        .record
        .get(PASSWORD_FIELD)
        .and_then(Value::as_str)
        .unwrap_or_default();
    if !verify_password(current_password, hash) {
        return Err(AppError::unauthorized("current password is incorrect"));
    }

    let set = Record::from_iter([
        (PASSWORD_FIELD.to_string(), Value::String(hash_password(new_password)?)),
        (
            PASSWORD_CHANGED_AT_FIELD.to_string(),
            Value::String(chrono::Utc::now().to_rfc3339()),
        ),
    ]);
    state
        .engine
        .update(&users.name, &identity.id, WriteData::from_scalars(set))
        .await?
        .ok_or_else(|| AppError::unauthorized("identity no longer exists"))?;

    // issued after the change, so it survives the staleness check
    let token = state.tokens.issue(&subject(&identity.id))?;
    tracing::info!(id = %identity.id, "password changed");
    ctx.envelope.set(StatusCode::OK, json!({ "accessToken": token }));
    set_cookie(ctx, &token)
}

async fn get_me(ctx: &mut RequestContext) -> Result<(), AppError> {
    let state = ctx.state.clone();
    let users = state.entity_for(&ctx.resource)?;
    let id = current(ctx)?.id.clone();
    let record = state
        .engine
        .find_one(&users.name, &id, &ctx.query_options)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("{} {}", users.name, id)))?;
    ctx.envelope
        .set(StatusCode::OK, present(&state, users, record, &ctx.query_options));
    Ok(())
}

async fn update_me(ctx: &mut RequestContext) -> Result<(), AppError> {
    let state = ctx.state.clone();
    let users = state.entity_for(&ctx.resource)?;
    let id = current(ctx)?.id.clone();
    let body = body_object(ctx)?;
    let refused: Vec<FieldError> = [PASSWORD_FIELD]
        .into_iter()
        .chain(PROTECTED_FIELDS)
        .filter(|f| body.contains_key(*f))
        .map(|f| FieldError::new(f, "cannot be changed here"))
        .collect();
    if !refused.is_empty() {
        return Err(AppError::validation(refused));
    }
    let data = RelationResolver::new(&state.catalog).resolve_payload(&users.name, body);
    let record = state
        .engine
        .update(&users.name, &id, data)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("{} {}", users.name, id)))?;
    ctx.envelope
        .set(StatusCode::OK, present(&state, users, record, &ctx.query_options));
    Ok(())
}

async fn delete_me(ctx: &mut RequestContext) -> Result<(), AppError> {
    let state = ctx.state.clone();
    let users = state.entity_for(&ctx.resource)?;
    let id = current(ctx)?.id.clone();
    state
        .engine
        .delete(&users.name, &id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("{} {}", users.name, id)))?;
    tracing::info!(%id, "identity deleted");
    ctx.envelope.set_status(StatusCode::NO_CONTENT);
    expire_cookie(ctx)
}

fn current(ctx: &RequestContext) -> Result<&Identity, AppError> {
    ctx.identity
        .as_ref()
        .ok_or_else(|| AppError::unauthorized("missing credential"))
}

fn required_str<'a>(body: &'a Record, field: &str) -> Result<&'a str, AppError> {
    body.get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::validation(vec![FieldError::new(field, "is required")]))
}

/// Token subject: the primary key as a string.
fn subject(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn set_cookie(ctx: &mut RequestContext, token: &str) -> Result<(), AppError> {
    let cookie = format!(
        "{}={}; Max-Age={}; Path=/; HttpOnly; SameSite=Lax",
        ctx.state.settings.auth.cookie_name,
        token,
        ctx.state.tokens.ttl_secs()
    );
    ctx.envelope.insert_header(header::SET_COOKIE, &cookie)
}

fn expire_cookie(ctx: &mut RequestContext) -> Result<(), AppError> {
    let cookie = format!(
        "{}=; Max-Age=0; Path=/; HttpOnly; SameSite=Lax",
        ctx.state.settings.auth.cookie_name
    );
    ctx.envelope.insert_header(header::SET_COOKIE, &cookie)
}
