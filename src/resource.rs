//! Actions, capability sets and the resources that expose them as endpoints.
//! A resource is a small struct describing which actions it offers and where; standard models and
//! the auth surface are separate variants behind one trait.

use crate::config::AuthPolicy;
use crate::error::ConfigError;
use axum::http::Method;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::str::FromStr;

/// Resource name under which the auth surface registers hooks, validators and access entries.
pub const AUTH_RESOURCE: &str = "auth";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Action {
    CreateOne,
    FindMany,
    FindOne,
    UpdateOne,
    DeleteOne,
    CreateMany,
    UpdateMany,
    DeleteMany,
    Login,
    Logout,
    Signup,
    UpdatePassword,
    GetMe,
    UpdateMe,
    DeleteMe,
}

/// Option groups used by `queryOptions` declarations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActionGroup {
    Queries,
    Mutations,
}

impl Action {
    pub const CRUD: [Action; 8] = [
        Action::CreateOne,
        Action::FindMany,
        Action::FindOne,
        Action::UpdateOne,
        Action::DeleteOne,
        Action::CreateMany,
        Action::UpdateMany,
        Action::DeleteMany,
    ];

    pub const AUTH: [Action; 7] = [
        Action::Login,
        Action::Logout,
        Action::Signup,
        Action::UpdatePassword,
        Action::GetMe,
        Action::UpdateMe,
        Action::DeleteMe,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Action::CreateOne => "createOne",
            Action::FindMany => "findMany",
            Action::FindOne => "findOne",
            Action::UpdateOne => "updateOne",
            Action::DeleteOne => "deleteOne",
            Action::CreateMany => "createMany",
            Action::UpdateMany => "updateMany",
            Action::DeleteMany => "deleteMany",
            Action::Login => "login",
            Action::Logout => "logout",
            Action::Signup => "signup",
            Action::UpdatePassword => "updatePassword",
            Action::GetMe => "getMe",
            Action::UpdateMe => "updateMe",
            Action::DeleteMe => "deleteMe",
        }
    }

    pub fn group(self) -> ActionGroup {
        match self {
            Action::FindMany | Action::FindOne | Action::GetMe => ActionGroup::Queries,
            _ => ActionGroup::Mutations,
        }
    }

    /// Actions that read a request body.
    pub fn takes_body(self) -> bool {
        matches!(
            self,
            Action::CreateOne
                | Action::UpdateOne
                | Action::CreateMany
                | Action::UpdateMany
                | Action::Login
                | Action::Signup
                | Action::UpdatePassword
                | Action::UpdateMe
        )
    }

    /// Logout must still work with a credential invalidated by a password change.
    pub fn accepts_stale_credential(self) -> bool {
        matches!(self, Action::Logout)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Action::CRUD
            .iter()
            .chain(Action::AUTH.iter())
            .copied()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| ConfigError::UnknownAction(s.to_string()))
    }
}

/// The set of actions a resource offers.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Capabilities(BTreeSet<Action>);

impl Capabilities {
    pub fn all_crud() -> Self {
        Capabilities(Action::CRUD.into_iter().collect())
    }

    pub fn none() -> Self {
        Capabilities(BTreeSet::new())
    }

    pub fn without(mut self, disabled: &[Action]) -> Self {
        for a in disabled {
            self.0.remove(a);
        }
        self
    }

    pub fn allows(&self, action: Action) -> bool {
        self.0.contains(&action)
    }

    pub fn iter(&self) -> impl Iterator<Item = Action> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<Action> for Capabilities {
    fn from_iter<I: IntoIterator<Item = Action>>(iter: I) -> Self {
        Capabilities(iter.into_iter().collect())
    }
}

/// One generated route: verb + path bound to an action.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoint {
    pub action: Action,
    pub method: Method,
    pub path: String,
}

pub trait Resource {
    /// Name used for hooks, validator artifacts and access entries.
    fn name(&self) -> &str;

    fn capabilities(&self) -> &Capabilities;

    fn endpoint_for(&self, action: Action) -> Option<Endpoint>;

    /// Endpoints for every enabled action, in a stable order.
    fn endpoints(&self) -> Vec<Endpoint> {
        self.capabilities()
            .iter()
            .filter_map(|a| self.endpoint_for(a))
            .collect()
    }
}

/// Standard CRUD resource generated for a declared model.
#[derive(Clone, Debug)]
pub struct ModelResource {
    pub model: String,
    pub plural: String,
    pub capabilities: Capabilities,
}

impl Resource for ModelResource {
    fn name(&self) -> &str {
        &self.model
    }

    fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    fn endpoint_for(&self, action: Action) -> Option<Endpoint> {
        let base = format!("/{}", self.plural);
        let (method, path) = match action {
            Action::CreateOne => (Method::POST, base),
            Action::FindMany => (Method::GET, base),
            Action::FindOne => (Method::GET, format!("{}/:id", base)),
            Action::UpdateOne => (Method::PATCH, format!("{}/:id", base)),
            Action::DeleteOne => (Method::DELETE, format!("{}/:id", base)),
            Action::CreateMany => (Method::POST, format!("{}/many", base)),
            Action::UpdateMany => (Method::PATCH, format!("{}/many", base)),
            Action::DeleteMany => (Method::DELETE, format!("{}/many", base)),
            _ => return None,
        };
        Some(Endpoint { action, method, path })
    }
}

/// Login/signup/session endpoints plus the `/users/me` surface.
#[derive(Clone, Debug)]
pub struct AuthResource {
    pub capabilities: Capabilities,
}

impl Default for AuthResource {
    fn default() -> Self {
        AuthResource {
            capabilities: Action::AUTH.into_iter().collect(),
        }
    }
}

impl AuthResource {
    /// Everything but login and signup needs an authenticated identity.
    pub fn auth_policy(&self) -> AuthPolicy {
        AuthPolicy::Required {
            except: HashSet::from([Action::Login, Action::Signup]),
        }
    }
}

impl Resource for AuthResource {
    fn name(&self) -> &str {
        AUTH_RESOURCE
    }

    fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    fn endpoint_for(&self, action: Action) -> Option<Endpoint> {
        let (method, path) = match action {
            Action::Login => (Method::POST, "/auth/login"),
            Action::Logout => (Method::DELETE, "/auth/logout"),
            Action::Signup => (Method::POST, "/auth/signup"),
            Action::UpdatePassword => (Method::POST, "/auth/update-password"),
            Action::GetMe => (Method::GET, "/users/me"),
            Action::UpdateMe => (Method::PATCH, "/users/me"),
            Action::DeleteMe => (Method::DELETE, "/users/me"),
            _ => return None,
        };
        Some(Endpoint {
            action,
            method,
            path: path.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_names_round_trip() {
        for a in Action::CRUD.iter().chain(Action::AUTH.iter()) {
            assert_eq!(a.as_str().parse::<Action>().unwrap(), *a);
        }
        assert!("findAll".parse::<Action>().is_err());
    }

    #[test]
    fn model_resource_generates_batch_and_item_routes() {
        let res = ModelResource {
            model: "post".into(),
            plural: "posts".into(),
            capabilities: Capabilities::all_crud().without(&[Action::DeleteMany]),
        };
        let eps = res.endpoints();
        assert_eq!(eps.len(), 7);
        assert!(eps
            .iter()
            .any(|e| e.method == Method::PATCH && e.path == "/posts/many"));
        assert!(eps
            .iter()
            .all(|e| !(e.method == Method::DELETE && e.path == "/posts/many")));
    }

    #[test]
    fn auth_resource_exposes_me_routes() {
        let eps = AuthResource::default().endpoints();
        assert_eq!(eps.len(), 7);
        assert_eq!(eps.iter().filter(|e| e.path == "/users/me").count(), 3);
    }
}
