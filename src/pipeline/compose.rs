//! Pipeline composition. Stage order is fixed:
//! authenticate, authorize, validate, inject_query, before_hook, handler, after_hook, emit.
//! Optional stages are left out when they have nothing to do.

use crate::auth::{Authenticate, Authorize};
use crate::config::AuthPolicy;
use crate::hooks::{HookPhase, HookRegistry};
use crate::pipeline::stages::{CoreHandler, Emit, HookStage, InjectQuery, Validate};
use crate::pipeline::{Pipeline, Stage};
use crate::resource::{Action, Resource};
use crate::validation::{ArtifactId, Validator};
use std::sync::Arc;

/// Which hook slots a pipeline has.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineShape {
    Bare,
    PreOnly,
    PostOnly,
    Both,
}

/// Whether the core handler sends the response itself or leaves it to the emitter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HandlerMode {
    EmitDirect,
    Defer,
}

impl PipelineShape {
    pub fn from_hooks(has_pre: bool, has_post: bool) -> Self {
        match (has_pre, has_post) {
            (false, false) => PipelineShape::Bare,
            (true, false) => PipelineShape::PreOnly,
            (false, true) => PipelineShape::PostOnly,
            (true, true) => PipelineShape::Both,
        }
    }

    pub fn handler_mode(self) -> HandlerMode {
        match self {
            PipelineShape::Bare | PipelineShape::PreOnly => HandlerMode::EmitDirect,
            PipelineShape::PostOnly | PipelineShape::Both => HandlerMode::Defer,
        }
    }
}

pub struct Composer<'a> {
    auth_enabled: bool,
    validator: Arc<dyn Validator>,
    hooks: &'a HookRegistry,
}

impl<'a> Composer<'a> {
    pub fn new(auth_enabled: bool, validator: Arc<dyn Validator>, hooks: &'a HookRegistry) -> Self {
        Composer {
            auth_enabled,
            validator,
            hooks,
        }
    }

    /// `None` when the resource does not offer `action`.
    pub fn compose(&self, resource: &dyn Resource, auth: &AuthPolicy, action: Action) -> Option<Pipeline> {
        if !resource.capabilities().allows(action) {
            return None;
        }
        let name = resource.name();
        let mut stages: Vec<Arc<dyn Stage>> = Vec::with_capacity(8);

        if self.auth_enabled && auth.requires_auth(action) {
            stages.push(Arc::new(Authenticate));
        }
        stages.push(Arc::new(Authorize));

        let artifact = ArtifactId::new(name, action);
        if self.validator.has_artifact(&artifact) {
            stages.push(Arc::new(Validate {
                validator: self.validator.clone(),
                artifact,
            }));
        }
        stages.push(Arc::new(InjectQuery));

        let before = self.hooks.get(name, action, HookPhase::Before);
        let after = self.hooks.get(name, action, HookPhase::After);
        let shape = PipelineShape::from_hooks(before.is_some(), after.is_some());

        if let Some(hook) = before {
            stages.push(Arc::new(HookStage {
                phase: HookPhase::Before,
                hook,
            }));
        }
        stages.push(Arc::new(CoreHandler {
            mode: shape.handler_mode(),
        }));
        if let Some(hook) = after {
            stages.push(Arc::new(HookStage {
                phase: HookPhase::After,
                hook,
            }));
        }
        stages.push(Arc::new(Emit));

        Some(Pipeline::new(name.to_string(), action, shape, stages))
    }
}
