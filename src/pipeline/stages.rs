use crate::error::{AppError, FieldError};
use crate::handlers;
use crate::hooks::{Hook, HookPhase};
use crate::pipeline::{HandlerMode, RequestContext, Stage, StageOutcome};
use crate::query::QueryOptions;
use crate::validation::{ArtifactId, Validator};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// Replaces the body with its normalized form, or rejects the request with per-field details.
pub struct Validate {
    pub validator: Arc<dyn Validator>,
    pub artifact: ArtifactId,
}

#[async_trait]
impl Stage for Validate {
    fn name(&self) -> &'static str {
        "validate"
    }

    async fn run(&self, ctx: &mut RequestContext) -> Result<StageOutcome, AppError> {
        let body = std::mem::take(&mut ctx.body);
        ctx.body = match body {
            // batch bodies: every item against the same artifact, errors prefixed by index
            Value::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                let mut details = Vec::new();
                for (i, item) in items.into_iter().enumerate() {
                    match self.validator.validate(&self.artifact, item) {
                        Ok(v) => out.push(v),
                        Err(AppError::Validation { details: errs, .. }) => details.extend(
                            errs.into_iter()
                                .map(|e| FieldError::new(format!("[{}].{}", i, e.field), e.message)),
                        ),
                        Err(e) => return Err(e),
                    }
                }
                if !details.is_empty() {
                    return Err(AppError::validation(details));
                }
                Value::Array(out)
            }
            Value::Null => self
                .validator
                .validate(&self.artifact, Value::Object(Default::default()))?,
            other => self.validator.validate(&self.artifact, other)?,
        };
        Ok(StageOutcome::Continue)
    }
}

/// Computes the query options from the declared defaults and the query string.
pub struct InjectQuery;

#[async_trait]
impl Stage for InjectQuery {
    fn name(&self) -> &'static str {
        "inject_query"
    }

    async fn run(&self, ctx: &mut RequestContext) -> Result<StageOutcome, AppError> {
        let entity = ctx.state.entity_for(&ctx.resource)?;
        ctx.query_options = QueryOptions::for_request(entity, ctx.action, &ctx.query)?;
        Ok(StageOutcome::Continue)
    }
}

pub struct HookStage {
    pub phase: HookPhase,
    pub hook: Arc<dyn Hook>,
}

#[async_trait]
impl Stage for HookStage {
    fn name(&self) -> &'static str {
        match self.phase {
            HookPhase::Before => "before_hook",
            HookPhase::After => "after_hook",
        }
    }

    async fn run(&self, ctx: &mut RequestContext) -> Result<StageOutcome, AppError> {
        self.hook.call(ctx).await
    }
}

/// Runs the action's handler. Without a post-hook it emits right away; otherwise the result
/// stays in the envelope for the post-hook and the emitter.
pub struct CoreHandler {
    pub mode: HandlerMode,
}

#[async_trait]
impl Stage for CoreHandler {
    fn name(&self) -> &'static str {
        "handler"
    }

    async fn run(&self, ctx: &mut RequestContext) -> Result<StageOutcome, AppError> {
        handlers::dispatch(ctx).await?;
        match self.mode {
            HandlerMode::EmitDirect => Ok(StageOutcome::Respond(ctx.envelope.flush()?)),
            HandlerMode::Defer => Ok(StageOutcome::Continue),
        }
    }
}

/// Terminal stage: sends whatever the envelope holds.
pub struct Emit;

#[async_trait]
impl Stage for Emit {
    fn name(&self) -> &'static str {
        "emit"
    }

    async fn run(&self, ctx: &mut RequestContext) -> Result<StageOutcome, AppError> {
        Ok(StageOutcome::Respond(ctx.envelope.flush()?))
    }
}
