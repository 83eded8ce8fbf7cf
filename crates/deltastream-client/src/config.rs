//! Provider-level connection configuration

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub const ENV_SERVER: &str = "DELTASTREAM_SERVER";
pub const ENV_API_KEY: &str = "DELTASTREAM_API_KEY";
pub const ENV_INSECURE_SKIP_VERIFY: &str = "DELTASTREAM_INSECURE_SKIP_VERIFY";
pub const ENV_ORGANIZATION: &str = "DELTASTREAM_ORGANIZATION";
pub const ENV_ROLE: &str = "DELTASTREAM_ROLE";
pub const ENV_SESSION_ID: &str = "DELTASTREAM_SESSION_ID";

/// Connection settings shared by every lifecycle call.
#[derive(Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Server base URL, e.g. `https://api.deltastream.io/v2`
    #[serde(default)]
    pub server: Option<String>,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default)]
    pub insecure_skip_verify: bool,

    /// Organization id (UUID) or name
    #[serde(default)]
    pub organization: Option<String>,

    /// Role to execute statements as when a resource does not set an owner
    #[serde(default)]
    pub role: Option<String>,

    #[serde(default)]
    pub session_id: Option<String>,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("server", &self.server)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("insecure_skip_verify", &self.insecure_skip_verify)
            .field("organization", &self.organization)
            .field("role", &self.role)
            .field("session_id", &self.session_id)
            .finish()
    }
}

impl Config {
    /// Load configuration from `DELTASTREAM_*` environment variables.
    ///
    /// Nothing is validated here; a missing server or API key is reported
    /// when a connection is opened.
    pub fn from_env() -> Self {
        Self {
            server: env_non_empty(ENV_SERVER),
            api_key: env_non_empty(ENV_API_KEY),
            insecure_skip_verify: env_non_empty(ENV_INSECURE_SKIP_VERIFY)
                .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
            organization: env_non_empty(ENV_ORGANIZATION),
            role: env_non_empty(ENV_ROLE),
            session_id: env_non_empty(ENV_SESSION_ID),
        }
    }

    pub fn organization_ref(&self) -> Option<OrganizationRef> {
        self.organization.as_deref().map(OrganizationRef::parse)
    }

    /// Role for a resource operation: the resource owner, else the configured role.
    pub fn effective_role(&self, owner: Option<&str>) -> Option<String> {
        owner
            .filter(|o| !o.is_empty())
            .map(str::to_string)
            .or_else(|| self.role.clone().filter(|r| !r.is_empty()))
    }
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// An organization addressed either by id or by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrganizationRef {
    Id(Uuid),
    Name(String),
}

impl OrganizationRef {
    pub fn parse(value: &str) -> Self {
        match Uuid::parse_str(value.trim()) {
            Ok(id) => Self::Id(id),
            Err(_) => Self::Name(value.trim().to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_env() {
        temp_env::with_vars(
            [
                (ENV_SERVER, Some("https://api.deltastream.io/v2")),
                (ENV_API_KEY, Some("secret-token")),
                (ENV_INSECURE_SKIP_VERIFY, Some("true")),
                (ENV_ORGANIZATION, Some("0d3a8a5e-3f5c-4d7e-9f00-1b2c3d4e5f60")),
                (ENV_ROLE, None),
                (ENV_SESSION_ID, Some("")),
            ],
            || {
                let config = Config::from_env();
                assert_eq!(
                    config.server.as_deref(),
                    Some("https://api.deltastream.io/v2")
                );
                assert_eq!(config.api_key.as_deref(), Some("secret-token"));
                assert!(config.insecure_skip_verify);
                assert!(matches!(
                    config.organization_ref(),
                    Some(OrganizationRef::Id(_))
                ));
                assert_eq!(config.role, None);
                assert_eq!(config.session_id, None);
            },
        );
    }

    #[test]
    fn test_from_env_defaults() {
        temp_env::with_vars_unset(
            [
                ENV_SERVER,
                ENV_API_KEY,
                ENV_INSECURE_SKIP_VERIFY,
                ENV_ORGANIZATION,
                ENV_ROLE,
                ENV_SESSION_ID,
            ],
            || {
                assert_eq!(Config::from_env(), Config::default());
            },
        );
    }

    #[test]
    fn test_organization_by_name() {
        assert_eq!(
            OrganizationRef::parse(" acme "),
            OrganizationRef::Name("acme".to_string())
        );
    }

    #[test]
    fn test_effective_role() {
        let config = Config {
            role: Some("sysadmin".into()),
            ..Default::default()
        };
        assert_eq!(
            config.effective_role(Some("analyst")).as_deref(),
            Some("analyst")
        );
        assert_eq!(config.effective_role(None).as_deref(), Some("sysadmin"));
        assert_eq!(config.effective_role(Some("")).as_deref(), Some("sysadmin"));
        assert_eq!(Config::default().effective_role(None), None);
    }

    #[test]
    fn test_camel_case_keys() {
        let config: Config = serde_json::from_value(serde_json::json!({
            "server": "https://example.invalid",
            "apiKey": "k",
            "insecureSkipVerify": true,
            "sessionId": "abc"
        }))
        .unwrap();
        assert_eq!(config.api_key.as_deref(), Some("k"));
        assert_eq!(config.session_id.as_deref(), Some("abc"));
        assert!(config.insecure_skip_verify);
        assert!(!format!("{config:?}").contains("\"k\""));
    }
}
