//! Authentication metadata for the query endpoint.
//!
//! The trigger names the modes it wants in `authModes`; the credential
//! material itself comes from the auth-parameter map, which the secret
//! resolver fills in before parsing.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::error::{ConfigError, ConfigResult};

/// Trigger metadata key listing the enabled authentication modes.
pub const AUTH_MODES: &str = "authModes";

const USERNAME: &str = "username";
const PASSWORD: &str = "password";
const BEARER_TOKEN: &str = "bearerToken";

/// An authentication mode named in `authModes`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    Basic,
    Bearer,
}

impl FromStr for AuthMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "basic" => Ok(AuthMode::Basic),
            "bearer" => Ok(AuthMode::Bearer),
            other => Err(ConfigError::UnsupportedAuthMode(other.to_string())),
        }
    }
}

/// Resolved credentials attached to every query request.
#[derive(Clone, PartialEq, Eq)]
pub enum AuthMeta {
    Basic { username: String, password: String },
    Bearer { token: String },
}

impl AuthMeta {
    /// Build authentication metadata from the trigger and auth parameters.
    ///
    /// Returns `Ok(None)` when the trigger does not set `authModes`.
    pub fn parse(
        trigger: &HashMap<String, String>,
        auth_params: &HashMap<String, String>,
    ) -> ConfigResult<Option<Self>> {
        let modes = match trigger.get(AUTH_MODES) {
            Some(raw) if !raw.trim().is_empty() => raw,
            _ => return Ok(None),
        };

        let mut basic = false;
        let mut bearer = false;
        for mode in modes.split(',') {
            match mode.parse::<AuthMode>()? {
                AuthMode::Basic => basic = true,
                AuthMode::Bearer => bearer = true,
            }
        }

        if basic && bearer {
            return Err(ConfigError::invalid(
                AUTH_MODES,
                "basic and bearer authentication cannot both be enabled",
            ));
        }

        if basic {
            let username = match auth_params.get(USERNAME) {
                Some(u) if !u.is_empty() => u.clone(),
                _ => return Err(ConfigError::Missing(USERNAME)),
            };
            // An empty password is allowed.
            let password = auth_params.get(PASSWORD).cloned().unwrap_or_default();
            return Ok(Some(AuthMeta::Basic { username, password }));
        }

        match auth_params.get(BEARER_TOKEN) {
            Some(t) if !t.is_empty() => Ok(Some(AuthMeta::Bearer { token: t.clone() })),
            _ => Err(ConfigError::Missing(BEARER_TOKEN)),
        }
    }

    /// Value for the `Authorization` request header.
    pub fn authorization_header(&self) -> String {
        match self {
            AuthMeta::Basic { username, password } => {
                format!("Basic {}", STANDARD.encode(format!("{username}:{password}")))
            }
            AuthMeta::Bearer { token } => format!("Bearer {token}"),
        }
    }
}

impl fmt::Debug for AuthMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthMeta::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
            AuthMeta::Bearer { .. } => f
                .debug_struct("Bearer")
                .field("token", &"<redacted>")
                .finish(),
        }
    }
}
