use crate::auth::{is_verified, issued_before_password_change, Identity};
use crate::error::AppError;
use crate::pipeline::{RequestContext, Stage, StageOutcome};
use crate::query::{parse_id, QueryOptions};
use async_trait::async_trait;

/// Resolves the bearer credential to an identity or terminates with 401/423.
pub struct Authenticate;

#[async_trait]
impl Stage for Authenticate {
    fn name(&self) -> &'static str {
        "authenticate"
    }

    async fn run(&self, ctx: &mut RequestContext) -> Result<StageOutcome, AppError> {
        let token = ctx
            .credential
            .as_deref()
            .ok_or_else(|| AppError::unauthorized("missing credential"))?;
        let claims = ctx.state.tokens.verify(token)?;

        let settings = &ctx.state.settings.auth;
        let users = ctx.state.model.entity(&settings.user_model).ok_or_else(|| {
            AppError::Internal(format!("identity model '{}' is not declared", settings.user_model))
        })?;
        let id = parse_id(&claims.sub, &users.pk_type)
            .map_err(|_| AppError::unauthorized("invalid credential"))?;
        let record = ctx
            .state
            .engine
            .find_one(&users.name, &id, &QueryOptions::default())
            .await?
            .ok_or_else(|| AppError::unauthorized("identity no longer exists"))?;

        if !ctx.action.accepts_stale_credential() && issued_before_password_change(&record, claims.iat) {
            return Err(AppError::unauthorized(
                "credential predates the last password change",
            ));
        }
        if settings.require_verification && !is_verified(&record) {
            return Err(AppError::locked("identity is not verified"));
        }

        tracing::debug!(sub = %claims.sub, action = %ctx.action, "authenticated");
        ctx.identity = Some(Identity::from_record(id, record, claims));
        Ok(StageOutcome::Continue)
    }
}
