//! PostgreSQL store inputs and connection URI normalization

use super::{StoreOptions, diff_field};
use crate::diff::DiffResponse;
use crate::error::{ProviderError, Result};
use crate::resource::CheckFailure;
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

const DEFAULT_PORT: u16 = 5432;
const DEFAULT_SCHEME: &str = "postgresql://";

const URIS: &str = "uris";
const USERNAME: &str = "postgres.username";
const PASSWORD: &str = "postgres.password";
const TLS_DISABLED: &str = "tls.disabled";
const TLS_VERIFY_HOSTNAME: &str = "tls.verify_server_hostname";

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostgresInputs {
    /// `host[:port]/database`, scheme optional
    #[serde(default)]
    pub uris: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls_disabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls_verify_server_hostname: Option<bool>,
}

impl fmt::Debug for PostgresInputs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostgresInputs")
            .field("uris", &self.uris)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("tls_disabled", &self.tls_disabled)
            .field("tls_verify_server_hostname", &self.tls_verify_server_hostname)
            .finish()
    }
}

/// Canonical `postgresql://host:port/database` form of a store URI.
///
/// Only the first comma-separated entry is used. Scheme and port 5432 are
/// filled in when absent, and the path is cut to its first segment, which
/// names the database.
pub fn normalize_uri(raw: &str) -> Result<String> {
    let mut entries = raw.split(',').map(str::trim).filter(|s| !s.is_empty());
    let first = entries
        .next()
        .ok_or_else(|| ProviderError::invalid_input("postgres uris cannot be empty"))?;
    if entries.next().is_some() {
        tracing::warn!("Multiple postgres uris given, using only the first: {}", first);
    }

    let with_scheme = if first.contains("://") {
        first.to_string()
    } else {
        format!("{DEFAULT_SCHEME}{first}")
    };
    let url = Url::parse(&with_scheme)
        .map_err(|e| ProviderError::invalid_input(format!("invalid postgres uri {first:?}: {e}")))?;
    let host = match url.host_str() {
        Some(host) if !host.is_empty() => host.to_string(),
        _ => {
            return Err(ProviderError::invalid_input(format!(
                "invalid postgres uri {first:?}: missing host"
            )));
        }
    };

    let segments: Vec<String> = url
        .path_segments()
        .map(|s| s.filter(|seg| !seg.is_empty()).map(str::to_string).collect())
        .unwrap_or_default();
    let Some(database) = segments.first() else {
        return Err(ProviderError::invalid_input(format!(
            "postgres uri must include a database name: {first:?}"
        )));
    };
    if segments.len() > 1 {
        tracing::warn!(
            "Postgres uri path {:?} has extra segments, keeping database {:?}",
            url.path(),
            database
        );
    }

    let port = url.port().unwrap_or(DEFAULT_PORT);
    Ok(format!("{}://{host}:{port}/{database}", url.scheme()))
}

impl PostgresInputs {
    pub(super) fn validate(&self) -> Vec<CheckFailure> {
        let mut failures = Vec::new();
        for (field, value) in [
            ("uris", &self.uris),
            ("username", &self.username),
            ("password", &self.password),
        ] {
            if value.trim().is_empty() {
                failures.push(CheckFailure::new(
                    format!("postgres.{field}"),
                    format!("{field} is required"),
                ));
            }
        }
        if !self.uris.trim().is_empty() {
            if let Err(err) = normalize_uri(&self.uris) {
                failures.push(CheckFailure::new("postgres.uris", err.to_string()));
            }
        }
        failures
    }

    /// URIs are compared in normalized form.
    pub(super) fn diff(&self, new: &Self, diff: &mut DiffResponse) -> Result<()> {
        if normalize_uri(&self.uris)? != normalize_uri(&new.uris)? {
            diff.update("postgres.uris");
        }
        diff_field(diff, "postgres", "username", &self.username, &new.username);
        diff_field(diff, "postgres", "password", &self.password, &new.password);
        diff_field(diff, "postgres", "tlsDisabled", &self.tls_disabled, &new.tls_disabled);
        diff_field(
            diff,
            "postgres",
            "tlsVerifyServerHostname",
            &self.tls_verify_server_hostname,
            &new.tls_verify_server_hostname,
        );
        Ok(())
    }

    /// Expects `uris` already normalized.
    pub(super) fn create_options(&self) -> Result<StoreOptions> {
        let mut out = StoreOptions::default();
        out.options
            .raw("type", "POSTGRESQL")
            .string(USERNAME, &self.username)
            .string(PASSWORD, &self.password)
            .string(URIS, &self.uris);
        if let Some(disabled) = self.tls_disabled {
            out.options.boolean(TLS_DISABLED, disabled);
        }
        if self.tls_disabled == Some(true) {
            out.options.boolean(TLS_VERIFY_HOSTNAME, false);
        } else if let Some(verify) = self.tls_verify_server_hostname {
            out.options.boolean(TLS_VERIFY_HOSTNAME, verify);
        }
        Ok(out)
    }

    pub(super) fn update_options(&self, new: &Self) -> StoreOptions {
        let mut out = StoreOptions::default();
        let opts = &mut out.options;
        if self.username != new.username {
            opts.string(USERNAME, &new.username);
        }
        if self.password != new.password {
            opts.string(PASSWORD, &new.password);
        }
        if self.uris != new.uris {
            opts.string(URIS, &new.uris);
        }
        if self.tls_disabled != new.tls_disabled {
            match new.tls_disabled {
                Some(true) => {
                    opts.boolean(TLS_DISABLED, true);
                    opts.boolean(TLS_VERIFY_HOSTNAME, false);
                }
                _ => {
                    opts.boolean(TLS_DISABLED, false);
                }
            }
        }
        if self.tls_verify_server_hostname != new.tls_verify_server_hostname {
            match new.tls_verify_server_hostname {
                None => {
                    opts.null(TLS_VERIFY_HOSTNAME);
                }
                Some(verify) if new.tls_disabled != Some(true) => {
                    opts.boolean(TLS_VERIFY_HOSTNAME, verify);
                }
                Some(_) => {}
            }
        }
        out
    }
}
