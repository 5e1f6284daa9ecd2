use crate::auth::Identity;
use crate::config::ResolvedModel;
use crate::error::AppError;
use crate::pipeline::{RequestContext, Stage, StageOutcome};
use crate::resource::Action;
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};

/// resource -> action -> roles allowed to perform it.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PermissionTable {
    entries: BTreeMap<String, BTreeMap<Action, BTreeSet<String>>>,
    /// Allowed without an entry, for resources that declare a table.
    public: BTreeSet<Action>,
}

impl PermissionTable {
    pub fn from_model(model: &ResolvedModel, public: &[Action]) -> Self {
        let entries = model
            .entities
            .iter()
            .filter(|e| !e.access.is_empty())
            .map(|e| (e.name.clone(), e.access.clone()))
            .collect();
        PermissionTable {
            entries,
            public: public.iter().copied().collect(),
        }
    }

    /// Adds or replaces one entry; used for resources without declarations (e.g. `auth`).
    pub fn allow<I, R>(mut self, resource: &str, action: Action, roles: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<String>,
    {
        self.entries
            .entry(resource.to_string())
            .or_default()
            .insert(action, roles.into_iter().map(Into::into).collect());
        self
    }

    pub fn entries(&self) -> &BTreeMap<String, BTreeMap<Action, BTreeSet<String>>> {
        &self.entries
    }

    pub fn check(&self, resource: &str, action: Action, identity: Option<&Identity>) -> Result<(), AppError> {
        let Some(table) = self.entries.get(resource) else {
            return Ok(());
        };
        match table.get(&action) {
            None if self.public.contains(&action) => Ok(()),
            None => Err(AppError::Authorization(format!(
                "{} on {} is not permitted",
                action, resource
            ))),
            Some(allowed) => match identity {
                Some(identity) if identity.has_any_role(allowed) => Ok(()),
                _ => Err(AppError::Authorization(format!(
                    "{} on {} requires one of the roles: {}",
                    action,
                    resource,
                    allowed.iter().cloned().collect::<Vec<_>>().join(", ")
                ))),
            },
        }
    }
}

/// Role check against the permission table; a no-op for resources that declare none.
pub struct Authorize;

#[async_trait]
impl Stage for Authorize {
    fn name(&self) -> &'static str {
        "authorize"
    }

    async fn run(&self, ctx: &mut RequestContext) -> Result<StageOutcome, AppError> {
        ctx.state
            .permissions
            .check(&ctx.resource, ctx.action, ctx.identity.as_ref())?;
        Ok(StageOutcome::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Claims;
    use serde_json::json;

    fn identity(roles: &[&str]) -> Identity {
        let record = json!({"id": 1, "roles": roles}).as_object().cloned().unwrap();
        let claims = Claims {
            sub: "1".into(),
            iat: 0,
            exp: 0,
        };
        Identity::from_record(json!(1), record, claims)
    }

    #[test]
    fn roles_must_intersect_the_entry() {
        let table = PermissionTable::default().allow("post", Action::DeleteOne, ["admin"]);
        assert!(table.check("post", Action::DeleteOne, Some(&identity(&["admin", "user"]))).is_ok());
        let err = table
            .check("post", Action::DeleteOne, Some(&identity(&["user"])))
            .unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::FORBIDDEN);
        assert!(table.check("post", Action::DeleteOne, None).is_err());
    }

    #[test]
    fn missing_entry_is_allowed_only_when_public() {
        let mut table = PermissionTable::default().allow("post", Action::DeleteOne, ["admin"]);
        assert!(table.check("post", Action::FindMany, None).is_err());
        table.public.insert(Action::FindMany);
        assert!(table.check("post", Action::FindMany, None).is_ok());
        assert!(table.check("comment", Action::DeleteOne, None).is_ok());
    }
}
