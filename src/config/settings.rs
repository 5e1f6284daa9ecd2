//! Process settings read from the environment (`.env` is loaded by the binary via dotenvy).

use crate::error::ConfigError;
use crate::resource::Action;
use crate::validation::ValidatorBackend;
use std::path::PathBuf;

const DEFAULT_TOKEN_TTL_SECS: i64 = 90 * 24 * 60 * 60;
const DEFAULT_BODY_LIMIT: usize = 2 * 1024 * 1024;

#[derive(Clone, Debug)]
pub struct AuthSettings {
    pub enabled: bool,
    pub jwt_secret: String,
    pub expires_in_secs: i64,
    pub cookie_name: String,
    /// Identities whose verification flag is not set are rejected with 423.
    pub require_verification: bool,
    /// Model holding the identities.
    pub user_model: String,
    pub default_roles: Vec<String>,
}

impl AuthSettings {
    pub fn with_secret(secret: impl Into<String>) -> Self {
        AuthSettings {
            enabled: true,
            jwt_secret: secret.into(),
            expires_in_secs: DEFAULT_TOKEN_TTL_SECS,
            cookie_name: "access_token".into(),
            require_verification: false,
            user_model: "user".into(),
            default_roles: vec!["user".into()],
        }
    }

    pub fn disabled() -> Self {
        AuthSettings {
            enabled: false,
            ..AuthSettings::with_secret("")
        }
    }
}

#[derive(Clone, Debug)]
pub struct Settings {
    pub database_url: Option<String>,
    pub bind_addr: String,
    pub models_dir: PathBuf,
    pub auth: AuthSettings,
    pub validator_backend: ValidatorBackend,
    /// Actions allowed to everyone when a model declares an access table without an entry for them.
    pub public_actions: Vec<Action>,
    pub auto_approve_permission_changes: bool,
    pub body_limit_bytes: usize,
}

impl Settings {
    pub fn new(auth: AuthSettings) -> Self {
        Settings {
            database_url: None,
            bind_addr: "0.0.0.0:3000".into(),
            models_dir: PathBuf::from("models"),
            auth,
            validator_backend: ValidatorBackend::Schema,
            public_actions: Vec::new(),
            auto_approve_permission_changes: false,
            body_limit_bytes: DEFAULT_BODY_LIMIT,
        }
    }

    /// Fails when auth is enabled without a signing secret, instead of rejecting every request later.
    pub fn from_env() -> Result<Self, ConfigError> {
        let enabled = env_bool("AUTH_ENABLED", true);
        let jwt_secret = env_opt("JWT_SECRET").unwrap_or_default();
        if enabled && jwt_secret.is_empty() {
            return Err(ConfigError::Validation(
                "AUTH_ENABLED is true but JWT_SECRET is not set".into(),
            ));
        }
        let expires_in_secs = match env_opt("JWT_EXPIRES_IN_SECS") {
            Some(v) => v
                .parse()
                .map_err(|_| ConfigError::Validation(format!("JWT_EXPIRES_IN_SECS: invalid number '{}'", v)))?,
            None => DEFAULT_TOKEN_TTL_SECS,
        };
        let auth = AuthSettings {
            enabled,
            jwt_secret,
            expires_in_secs,
            cookie_name: env_opt("AUTH_COOKIE_NAME").unwrap_or_else(|| "access_token".into()),
            require_verification: env_bool("REQUIRE_VERIFICATION", false),
            user_model: env_opt("AUTH_USER_MODEL").unwrap_or_else(|| "user".into()),
            default_roles: env_list("AUTH_DEFAULT_ROLES").unwrap_or_else(|| vec!["user".into()]),
        };

        let validator_backend = match env_opt("VALIDATOR_BACKEND") {
            Some(v) => v.parse()?,
            None => ValidatorBackend::Schema,
        };
        let public_actions = env_list("PUBLIC_ACTIONS")
            .unwrap_or_default()
            .iter()
            .map(|a| a.parse::<Action>())
            .collect::<Result<Vec<_>, _>>()?;
        let body_limit_bytes = env_opt("BODY_LIMIT_BYTES")
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_BODY_LIMIT);

        let settings = Settings {
            database_url: env_opt("DATABASE_URL"),
            bind_addr: env_opt("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:3000".into()),
            models_dir: PathBuf::from(env_opt("MODELS_DIR").unwrap_or_else(|| "models".into())),
            auth,
            validator_backend,
            public_actions,
            auto_approve_permission_changes: env_bool("AUTO_APPROVE_PERMISSION_CHANGES", false),
            body_limit_bytes,
        };
        tracing::debug!(
            auth_enabled = settings.auth.enabled,
            validator = ?settings.validator_backend,
            models_dir = %settings.models_dir.display(),
            "settings loaded"
        );
        Ok(settings)
    }
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_bool(key: &str, default: bool) -> bool {
    env_opt(key)
        .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}

fn env_list(key: &str) -> Option<Vec<String>> {
    env_opt(key).map(|v| {
        v.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect()
    })
}
