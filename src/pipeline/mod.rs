//! Request pipelines: an ordered list of stages composed once per (resource, action) at startup
//! and shared by every request on that route.

mod compose;
mod context;
mod stages;

pub use compose::{Composer, HandlerMode, PipelineShape};
pub use context::RequestContext;
pub use stages::{CoreHandler, Emit, HookStage, InjectQuery, Validate};

use crate::error::{AppError, ErrorClass};
use crate::resource::Action;
use async_trait::async_trait;
use axum::response::{IntoResponse, Response};
use std::sync::Arc;

/// What a stage wants to happen next.
pub enum StageOutcome {
    Continue,
    /// Stop here and send this response.
    Respond(Response),
}

impl std::fmt::Debug for StageOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StageOutcome::Continue => f.write_str("Continue"),
            StageOutcome::Respond(r) => write!(f, "Respond({})", r.status()),
        }
    }
}

#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> &'static str;

    async fn run(&self, ctx: &mut RequestContext) -> Result<StageOutcome, AppError>;
}

pub struct Pipeline {
    pub resource: String,
    pub action: Action,
    pub shape: PipelineShape,
    stages: Vec<Arc<dyn Stage>>,
}

impl Pipeline {
    pub(crate) fn new(resource: String, action: Action, shape: PipelineShape, stages: Vec<Arc<dyn Stage>>) -> Self {
        Pipeline {
            resource,
            action,
            shape,
            stages,
        }
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Runs the stages in order. The first stage that responds or fails ends the request; errors
    /// are converted to responses here and nowhere else.
    pub async fn run(&self, mut ctx: RequestContext) -> Response {
        for stage in &self.stages {
            match stage.run(&mut ctx).await {
                Ok(StageOutcome::Continue) => {
                    tracing::trace!(stage = stage.name(), "continue");
                }
                Ok(StageOutcome::Respond(response)) => {
                    tracing::debug!(
                        resource = %self.resource,
                        action = %self.action,
                        stage = stage.name(),
                        status = %response.status(),
                        "responded"
                    );
                    return response;
                }
                Err(e) => {
                    match e.class() {
                        ErrorClass::Recoverable(msg) => tracing::warn!(
                            resource = %self.resource,
                            action = %self.action,
                            stage = stage.name(),
                            status = %e.status(),
                            "rejected: {}",
                            msg.0
                        ),
                        // logged with its cause by into_response
                        ErrorClass::Fatal(_) => {}
                    }
                    return e.into_response();
                }
            }
        }
        // the emitter is always last and always responds
        AppError::Envelope.into_response()
    }
}
