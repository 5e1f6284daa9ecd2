//! Extract the bearer credential from the `Authorization` header or the auth cookie.

use crate::state::AppState;
use async_trait::async_trait;
use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap},
};

/// Raw token, not yet verified. The header wins over the cookie.
#[derive(Clone, Debug, Default)]
pub struct Credential(pub Option<String>);

impl Credential {
    pub fn from_headers(headers: &HeaderMap, cookie_name: &str) -> Self {
        let bearer = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| {
                let (scheme, token) = s.trim().split_once(' ')?;
                scheme.eq_ignore_ascii_case("bearer").then(|| token.trim().to_string())
            })
            .filter(|s| !s.is_empty());
        if bearer.is_some() {
            return Credential(bearer);
        }
        let cookie = headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|s| s.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, _)| *name == cookie_name)
            .map(|(_, value)| value.trim().to_string())
            .filter(|s| !s.is_empty());
        Credential(cookie)
    }
}

#[async_trait]
impl FromRequestParts<AppState> for Credential {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        Ok(Credential::from_headers(&parts.headers, &state.settings.auth.cookie_name))
    }
}
