//! Hook registry. Hooks are registered by name at startup (`beforeCreateOne`, `afterFindMany`,
//! ...) and looked up by (resource, action, phase) when pipelines are composed.

use crate::case::{lower_first, upper_first};
use crate::error::{AppError, ConfigError};
use crate::pipeline::{RequestContext, StageOutcome};
use crate::resource::Action;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HookPhase {
    Before,
    After,
}

/// A pre-hook may terminate the request with `StageOutcome::Respond`; a post-hook may replace
/// the deferred status and body in `ctx.envelope`.
#[async_trait]
pub trait Hook: Send + Sync {
    async fn call(&self, ctx: &mut RequestContext) -> Result<StageOutcome, AppError>;
}

struct FnHook<F>(F);

#[async_trait]
impl<F> Hook for FnHook<F>
where
    F: Fn(&mut RequestContext) -> Result<StageOutcome, AppError> + Send + Sync,
{
    async fn call(&self, ctx: &mut RequestContext) -> Result<StageOutcome, AppError> {
        (self.0)(ctx)
    }
}

/// `beforeCreateOne` -> (Before, CreateOne).
pub fn parse_hook_name(name: &str) -> Result<(HookPhase, Action), ConfigError> {
    let (phase, rest) = if let Some(rest) = name.strip_prefix("before") {
        (HookPhase::Before, rest)
    } else if let Some(rest) = name.strip_prefix("after") {
        (HookPhase::After, rest)
    } else {
        return Err(ConfigError::InvalidHookName(name.to_string()));
    };
    // the action part must be written with a leading capital: `beforecreateOne` is rejected
    if rest.is_empty() || upper_first(rest) != rest {
        return Err(ConfigError::InvalidHookName(name.to_string()));
    }
    let action = lower_first(rest)
        .parse::<Action>()
        .map_err(|_| ConfigError::InvalidHookName(name.to_string()))?;
    Ok((phase, action))
}

#[derive(Clone, Default)]
pub struct HookRegistry {
    hooks: HashMap<(String, Action, HookPhase), Arc<dyn Hook>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `hook` under a conventional name; a second hook for the same slot replaces the first.
    pub fn register<H: Hook + 'static>(mut self, resource: &str, name: &str, hook: H) -> Result<Self, ConfigError> {
        let (phase, action) = parse_hook_name(name)?;
        if self
            .hooks
            .insert((resource.to_string(), action, phase), Arc::new(hook))
            .is_some()
        {
            tracing::warn!(resource, hook = name, "hook replaced");
        }
        Ok(self)
    }

    /// Same as `register` for a synchronous closure.
    pub fn on<F>(self, resource: &str, name: &str, f: F) -> Result<Self, ConfigError>
    where
        F: Fn(&mut RequestContext) -> Result<StageOutcome, AppError> + Send + Sync + 'static,
    {
        self.register(resource, name, FnHook(f))
    }

    pub fn get(&self, resource: &str, action: Action, phase: HookPhase) -> Option<Arc<dyn Hook>> {
        self.hooks.get(&(resource.to_string(), action, phase)).cloned()
    }

    pub fn before(&self, resource: &str, action: Action) -> Option<Arc<dyn Hook>> {
        self.get(resource, action, HookPhase::Before)
    }

    pub fn after(&self, resource: &str, action: Action) -> Option<Arc<dyn Hook>> {
        self.get(resource, action, HookPhase::After)
    }

    /// Resource names hooks were registered for.
    pub fn resources(&self) -> impl Iterator<Item = &str> + '_ {
        self.hooks.keys().map(|(resource, _, _)| resource.as_str())
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_follow_phase_and_action() {
        assert_eq!(
            parse_hook_name("beforeCreateOne").unwrap(),
            (HookPhase::Before, Action::CreateOne)
        );
        assert_eq!(
            parse_hook_name("afterUpdatePassword").unwrap(),
            (HookPhase::After, Action::UpdatePassword)
        );
        for bad in ["onCreateOne", "before", "beforecreateOne", "afterFindAll"] {
            assert!(matches!(
                parse_hook_name(bad),
                Err(ConfigError::InvalidHookName(_))
            ));
        }
    }

    #[test]
    fn lookup_by_resource_action_and_phase() {
        let registry = HookRegistry::new()
            .on("post", "afterFindMany", |_| Ok(StageOutcome::Continue))
            .unwrap();
        assert!(registry.after("post", Action::FindMany).is_some());
        assert!(registry.before("post", Action::FindMany).is_none());
        assert!(registry.after("comment", Action::FindMany).is_none());
        assert!(HookRegistry::new().on("post", "whenever", |_| Ok(StageOutcome::Continue)).is_err());
    }
}
