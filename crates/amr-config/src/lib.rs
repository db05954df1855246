//! amr-config
//!
//! Layered YAML configuration for the archive mirror.
//!
//! - YAML layers are deep-merged in order (later layers override earlier ones).
//! - Literal secret-looking values are rejected; YAML stores env var NAMES only.
//! - The effective config is canonicalized and hashed for run attribution.
//! - [`FetchSettings`] is the typed view every other crate consumes.

pub mod secrets;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fs;

/// Known secret-like prefixes. If any leaf string value in the effective config
/// starts with one of these, loading aborts with CONFIG_SECRET_DETECTED.
const SECRET_PREFIXES: &[&str] = &[
    "sk-",        // OpenAI style
    "sk_live",    // Stripe live
    "sk_test",    // Stripe test
    "AKIA",       // AWS access key ID
    "-----BEGIN", // PEM private keys
    "ghp_",       // GitHub PAT
    "gho_",       // GitHub OAuth
    "glpat-",     // GitLab PAT
    "xoxb-",      // Slack bot token
    "xoxp-",      // Slack user token
];

/// Public archive API root used when neither config nor env names one.
pub const DEFAULT_ARCHIVE_BASE_URL: &str = "https://astroarchive.noirlab.edu/api";

/// Env var that overrides `/archive/base_url`.
pub const ENV_ARCHIVE_URL: &str = "AMR_ARCHIVE_URL";

pub const DEFAULT_WORKERS: usize = 4;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_READ_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_HASH_COLUMN: &str = "md5sum";
pub const DEFAULT_NAME_COLUMN: &str = "archive_filename";

// ---------------------------------------------------------------------------
// Typed settings
// ---------------------------------------------------------------------------

/// Everything a fetch run needs from configuration (secrets excluded; see
/// [`secrets::resolve_archive_credentials`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchSettings {
    pub archive_base_url: String,
    pub connect_timeout_secs: u64,
    pub read_timeout_secs: u64,
    pub workers: usize,
    pub hash_column: String,
    pub name_column: String,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            archive_base_url: DEFAULT_ARCHIVE_BASE_URL.to_string(),
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            read_timeout_secs: DEFAULT_READ_TIMEOUT_SECS,
            workers: DEFAULT_WORKERS,
            hash_column: DEFAULT_HASH_COLUMN.to_string(),
            name_column: DEFAULT_NAME_COLUMN.to_string(),
        }
    }
}

impl FetchSettings {
    /// Build settings from the merged config JSON, honouring
    /// [`ENV_ARCHIVE_URL`] from the process environment.
    pub fn from_config_json(config_json: &Value) -> Result<Self> {
        Self::from_config_json_with_env(config_json, &|name| secrets::resolve_env(name))
    }

    /// Same as [`FetchSettings::from_config_json`] with an explicit env lookup,
    /// so tests never mutate the process environment.
    pub fn from_config_json_with_env(
        config_json: &Value,
        env: &dyn Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let d = Self::default();

        let archive_base_url = env(ENV_ARCHIVE_URL)
            .or_else(|| read_str_at(config_json, "/archive/base_url"))
            .unwrap_or(d.archive_base_url);

        let workers = match read_positive_at(config_json, "/fetch/workers")? {
            Some(n) => usize::try_from(n).context("CONFIG_INVALID /fetch/workers out of range")?,
            None => d.workers,
        };

        Ok(Self {
            archive_base_url,
            connect_timeout_secs: read_positive_at(config_json, "/archive/connect_timeout_secs")?
                .unwrap_or(d.connect_timeout_secs),
            read_timeout_secs: read_positive_at(config_json, "/archive/read_timeout_secs")?
                .unwrap_or(d.read_timeout_secs),
            workers,
            hash_column: read_str_at(config_json, "/catalog/hash_column")
                .unwrap_or(d.hash_column),
            name_column: read_str_at(config_json, "/catalog/name_column")
                .unwrap_or(d.name_column),
        })
    }
}

/// Read a non-empty trimmed string at `pointer`.
pub(crate) fn read_str_at(config: &Value, pointer: &str) -> Option<String> {
    let s = config.pointer(pointer)?.as_str()?;
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Read a strictly positive integer at `pointer`. Absent is `Ok(None)`;
/// present but malformed is an error naming the pointer.
fn read_positive_at(config: &Value, pointer: &str) -> Result<Option<u64>> {
    let Some(v) = config.pointer(pointer) else {
        return Ok(None);
    };
    match v.as_u64() {
        Some(n) if n > 0 => Ok(Some(n)),
        _ => bail!("CONFIG_INVALID {pointer}: expected a positive integer, got {v}"),
    }
}

// ---------------------------------------------------------------------------
// Unused-key guard
// ---------------------------------------------------------------------------

/// JSON-pointer prefixes read by code. A leaf under any of these is consumed;
/// anything else is reported as unused.
pub const CONSUMED_POINTERS: &[&str] = &[
    "/archive/base_url",
    "/archive/connect_timeout_secs",
    "/archive/read_timeout_secs",
    "/archive/credentials/user_env",
    "/archive/credentials/pass_env",
    "/archive/credentials/file_env",
    "/fetch/workers",
    "/catalog/hash_column",
    "/catalog/name_column",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnusedKeyPolicy {
    Warn,
    Fail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnusedKeyReport {
    /// Consumed JSON-pointer prefixes used for this analysis (sorted, unique)
    pub consumed_prefixes: Vec<String>,
    /// Unused leaf pointers (sorted)
    pub unused_leaf_pointers: Vec<String>,
}

impl UnusedKeyReport {
    pub fn is_clean(&self) -> bool {
        self.unused_leaf_pointers.is_empty()
    }
}

/// Produce an unused-key report.
/// If `policy == Fail`, returns an error when unused keys exist.
pub fn report_unused_keys(config_json: &Value, policy: UnusedKeyPolicy) -> Result<UnusedKeyReport> {
    let consumed: BTreeSet<String> = CONSUMED_POINTERS
        .iter()
        .map(|p| normalize_pointer(p))
        .collect();
    let consumed_prefixes: Vec<String> = consumed.into_iter().collect();

    let mut leaves: Vec<String> = Vec::new();
    collect_leaf_pointers(config_json, "", &mut leaves);

    let mut unused: Vec<String> = leaves
        .into_iter()
        // A bare scalar document yields the root pointer; never report the root.
        .filter(|lp| lp != "/")
        .filter(|lp| !consumed_prefixes.iter().any(|cp| is_prefix_pointer(cp, lp)))
        .collect();
    unused.sort();
    unused.dedup();

    let report = UnusedKeyReport {
        consumed_prefixes,
        unused_leaf_pointers: unused,
    };

    if policy == UnusedKeyPolicy::Fail && !report.is_clean() {
        bail!(
            "CONFIG_UNUSED_KEYS: {} unused config leaf key(s) detected. \
            Remove them or update the consumed registry. First few: {}",
            report.unused_leaf_pointers.len(),
            preview_list(&report.unused_leaf_pointers, 12)
        );
    }

    Ok(report)
}

/// Normalize JSON pointer: leading "/", no trailing "/" unless it is just "/".
fn normalize_pointer(p: &str) -> String {
    let mut s = p.trim().to_string();
    if s.is_empty() {
        return "/".to_string();
    }
    if !s.starts_with('/') {
        s.insert(0, '/');
    }
    while s.ends_with('/') && s.len() > 1 {
        s.pop();
    }
    s
}

/// "/a/b" consumes "/a/b" and "/a/b/c" but NOT "/a/bc".
fn is_prefix_pointer(prefix: &str, leaf: &str) -> bool {
    if prefix == "/" || leaf == prefix {
        return true;
    }
    leaf.strip_prefix(prefix)
        .map(|rest| rest.starts_with('/'))
        .unwrap_or(false)
}

fn collect_leaf_pointers(v: &Value, prefix: &str, out: &mut Vec<String>) {
    match v {
        Value::Object(map) => {
            for (k, vv) in map.iter() {
                let next = format!("{}/{}", prefix, escape_pointer_token(k));
                collect_leaf_pointers(vv, &next, out);
            }
        }
        Value::Array(arr) => {
            for (i, vv) in arr.iter().enumerate() {
                let next = format!("{}/{}", prefix, i);
                collect_leaf_pointers(vv, &next, out);
            }
        }
        _ => {
            let p = if prefix.is_empty() {
                "/".to_string()
            } else {
                prefix.to_string()
            };
            out.push(p);
        }
    }
}

fn escape_pointer_token(s: &str) -> String {
    s.replace('~', "~0").replace('/', "~1")
}

fn preview_list(items: &[String], n: usize) -> String {
    let take = items.iter().take(n).cloned().collect::<Vec<_>>();
    format!("{:?}", take)
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config_hash: String,
    pub canonical_json: String,
    pub config_json: Value,
}

pub fn load_layered_yaml(paths: &[&str]) -> Result<LoadedConfig> {
    let mut docs: Vec<String> = Vec::new();
    for p in paths {
        let raw =
            fs::read_to_string(p).with_context(|| format!("failed to read yaml path: {p}"))?;
        docs.push(raw);
    }

    let doc_refs: Vec<&str> = docs.iter().map(|s| s.as_str()).collect();
    load_layered_yaml_from_strings(&doc_refs)
}

/// Merge YAML docs in order: earlier docs are base, later docs override.
/// Zero docs yields the empty object (all defaults).
pub fn load_layered_yaml_from_strings(yaml_docs: &[&str]) -> Result<LoadedConfig> {
    let mut merged = serde_json::json!({});
    for raw in yaml_docs {
        if raw.trim().is_empty() {
            continue;
        }
        let v_yaml: serde_yaml::Value = serde_yaml::from_str(raw).context("invalid yaml")?;
        let v_json = serde_json::to_value(v_yaml).context("yaml->json conversion failed")?;
        // An empty YAML document parses to null; treat it as "no overrides".
        if v_json.is_null() {
            continue;
        }
        merged = deep_merge(merged, v_json);
    }

    enforce_no_secret_literals(&merged)?;

    // serde_json::Map is key-ordered (no preserve_order feature), so this is canonical.
    let canonical_json = serde_json::to_string(&merged).context("canonical json serialize failed")?;
    let config_hash = sha256_hex(canonical_json.as_bytes());
    Ok(LoadedConfig {
        config_hash,
        canonical_json,
        config_json: merged,
    })
}

fn deep_merge(a: Value, b: Value) -> Value {
    match (a, b) {
        (Value::Object(mut a_map), Value::Object(b_map)) => {
            for (k, b_val) in b_map {
                let a_val = a_map.remove(&k).unwrap_or(Value::Null);
                a_map.insert(k, deep_merge(a_val, b_val));
            }
            Value::Object(a_map)
        }
        (_, b_other) => b_other,
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

fn enforce_no_secret_literals(v: &Value) -> Result<()> {
    let mut leaves = Vec::new();
    collect_leaf_pointers(v, "", &mut leaves);

    for ptr in leaves {
        if let Some(s) = v.pointer(&ptr).and_then(Value::as_str) {
            if looks_like_secret(s) {
                bail!("CONFIG_SECRET_DETECTED leaf={} value=REDACTED", ptr);
            }
        }
    }
    Ok(())
}

fn looks_like_secret(s: &str) -> bool {
    let t = s.trim();
    if t.len() < 8 {
        return false;
    }
    SECRET_PREFIXES.iter().any(|p| t.starts_with(p))
}
