//! Archive credential resolution.
//!
//! This module is the **single source of truth** for runtime secret resolution.
//!
//! # Contract
//! - Config YAML stores only **env var NAMES** (e.g. `"AMR_ARCHIVE_USER"`).
//! - Callers invoke [`resolve_archive_credentials`] once per batch and hand
//!   the result to the archive client; never scatter `std::env::var` calls.
//! - `Debug` on [`ArchiveCredentials`] **redacts** values.
//! - Error messages reference env var NAMES or file paths, never values.
//!
//! # Precedence
//! 1. Credentials file: if the env var named by `/archive/credentials/file_env`
//!    points at an existing file, it must contain `email password`.
//! 2. Otherwise the env vars named by `/archive/credentials/user_env` and
//!    `/archive/credentials/pass_env`.
//! 3. Otherwise `None`: the client runs against the anonymous tier.

use anyhow::{bail, Context, Result};
use serde_json::Value;
use std::path::Path;

use crate::read_str_at;

pub const DEFAULT_USER_ENV: &str = "AMR_ARCHIVE_USER";
pub const DEFAULT_PASS_ENV: &str = "AMR_ARCHIVE_PASS";
pub const DEFAULT_CREDENTIALS_FILE_ENV: &str = "AMR_ARCHIVE_CREDENTIALS";

/// Login pair exchanged for an archive token.
/// **Values are redacted in `Debug` output.**
#[derive(Clone, PartialEq, Eq)]
pub struct ArchiveCredentials {
    pub email: String,
    pub password: String,
}

impl std::fmt::Debug for ArchiveCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveCredentials")
            .field("email", &"<REDACTED>")
            .field("password", &"<REDACTED>")
            .finish()
    }
}

/// Env var names extracted from the config JSON (names, not values).
struct CredentialEnvNames {
    user_var: String,
    pass_var: String,
    file_var: String,
}

fn parse_env_names(config_json: &Value) -> CredentialEnvNames {
    CredentialEnvNames {
        user_var: read_str_at(config_json, "/archive/credentials/user_env")
            .unwrap_or_else(|| DEFAULT_USER_ENV.to_string()),
        pass_var: read_str_at(config_json, "/archive/credentials/pass_env")
            .unwrap_or_else(|| DEFAULT_PASS_ENV.to_string()),
        file_var: read_str_at(config_json, "/archive/credentials/file_env")
            .unwrap_or_else(|| DEFAULT_CREDENTIALS_FILE_ENV.to_string()),
    }
}

/// Resolve a named environment variable.
/// Returns `None` if the variable is unset or its value is blank.
pub(crate) fn resolve_env(var_name: &str) -> Option<String> {
    match std::env::var(var_name) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => None,
    }
}

/// Resolve archive credentials from the process environment.
pub fn resolve_archive_credentials(config_json: &Value) -> Result<Option<ArchiveCredentials>> {
    resolve_archive_credentials_with_env(config_json, &resolve_env)
}

/// Same as [`resolve_archive_credentials`] with an explicit env lookup.
pub fn resolve_archive_credentials_with_env(
    config_json: &Value,
    env: &dyn Fn(&str) -> Option<String>,
) -> Result<Option<ArchiveCredentials>> {
    let names = parse_env_names(config_json);

    if let Some(file) = env(&names.file_var) {
        let path = Path::new(file.trim());
        if path.exists() {
            return read_credentials_file(path).map(Some);
        }
    }

    let email = env(&names.user_var);
    let password = env(&names.pass_var);
    match (email, password) {
        (Some(email), Some(password)) => Ok(Some(ArchiveCredentials {
            email: email.trim().to_string(),
            password,
        })),
        _ => Ok(None),
    }
}

/// Parse a credentials file holding `email password` on one line.
fn read_credentials_file(path: &Path) -> Result<ArchiveCredentials> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("read credentials file failed: {}", path.display()))?;
    let mut parts = raw.split_whitespace();
    match (parts.next(), parts.next(), parts.next()) {
        (Some(email), Some(password), None) => Ok(ArchiveCredentials {
            email: email.to_string(),
            password: password.to_string(),
        }),
        _ => bail!(
            "SECRETS_MALFORMED: credentials file '{}' must contain exactly `email password`",
            path.display()
        ),
    }
}
