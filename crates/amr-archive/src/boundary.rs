//! Archive boundary consumed by the reconciliation engine.
//!
//! This module defines **only** the client trait, the shared auth header map,
//! the byte-stream type, and the error taxonomy. The HTTP implementation lives
//! in `lib.rs`; in-memory doubles live in `amr-testkit`.

use std::collections::BTreeMap;
use std::fmt;

use bytes::Bytes;
use futures_util::stream::BoxStream;

// ---------------------------------------------------------------------------
// Byte stream
// ---------------------------------------------------------------------------

/// Streamed file body returned by [`ArchiveClient::fetch`].
///
/// Finite and single-pass. Dropping it before exhaustion releases the
/// underlying connection.
pub type ByteStream = BoxStream<'static, Result<Bytes, ArchiveError>>;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors an [`ArchiveClient`] may return. Every variant means "archive
/// unavailable" to callers; the split only sharpens the log line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveError {
    /// Network, TLS, timeout, or mid-body transport failure.
    Transport(String),
    /// The archive answered with a non-success HTTP status.
    Status { code: u16, message: String },
    /// A response payload could not be decoded.
    Decode(String),
    /// Token exchange was refused or returned garbage.
    Auth(String),
    /// The client could not be built from the supplied settings.
    Config(String),
}

impl fmt::Display for ArchiveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArchiveError::Transport(msg) => write!(f, "archive transport error: {msg}"),
            ArchiveError::Status { code, message } => {
                write!(f, "archive http error status={code}: {message}")
            }
            ArchiveError::Decode(msg) => write!(f, "archive decode error: {msg}"),
            ArchiveError::Auth(msg) => write!(f, "archive auth error: {msg}"),
            ArchiveError::Config(msg) => write!(f, "archive config error: {msg}"),
        }
    }
}

impl std::error::Error for ArchiveError {}

// ---------------------------------------------------------------------------
// Auth headers
// ---------------------------------------------------------------------------

/// Header name carrying the archive token.
pub const AUTHORIZATION: &str = "Authorization";

/// Request headers obtained once per batch and passed unchanged to every call.
///
/// Empty means anonymous. **Values are redacted in `Debug` output.**
#[derive(Clone, Default, PartialEq, Eq)]
pub struct AuthHeaders {
    entries: BTreeMap<String, String>,
}

impl AuthHeaders {
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Headers carrying an archive token as the `Authorization` value.
    pub fn with_token(token: impl Into<String>) -> Self {
        let mut h = Self::default();
        h.insert(AUTHORIZATION, token);
        h
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(String::as_str)
    }

    pub fn is_anonymous(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl fmt::Debug for AuthHeaders {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.entries.keys().map(|k| (k, "<REDACTED>")))
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Client trait
// ---------------------------------------------------------------------------

/// Remote archive contract.
///
/// Object-safe so callers can share an `Arc<dyn ArchiveClient>` across worker
/// tasks; `Send + Sync` because every worker holds the same instance.
#[async_trait::async_trait]
pub trait ArchiveClient: Send + Sync {
    /// Human-readable name identifying this archive (e.g. `"http"`).
    fn name(&self) -> &'static str;

    /// Ask whether content under `content_hash` is currently retrievable and intact.
    async fn check_valid(
        &self,
        content_hash: &str,
        headers: &AuthHeaders,
    ) -> Result<bool, ArchiveError>;

    /// Open a streamed download of the content under `content_hash`.
    async fn fetch(&self, content_hash: &str, headers: &AuthHeaders)
        -> Result<ByteStream, ArchiveError>;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::{stream, StreamExt};

    /// Minimal in-process archive that satisfies the trait.
    struct StaticArchive {
        body: &'static [u8],
    }

    #[async_trait::async_trait]
    impl ArchiveClient for StaticArchive {
        fn name(&self) -> &'static str {
            "static"
        }

        async fn check_valid(&self, _hash: &str, _h: &AuthHeaders) -> Result<bool, ArchiveError> {
            Ok(true)
        }

        async fn fetch(&self, _hash: &str, _h: &AuthHeaders) -> Result<ByteStream, ArchiveError> {
            Ok(stream::iter(vec![Ok(Bytes::from_static(self.body))]).boxed())
        }
    }

    #[test]
    fn archive_error_display_status() {
        let err = ArchiveError::Status {
            code: 404,
            message: "not found".to_string(),
        };
        assert_eq!(err.to_string(), "archive http error status=404: not found");
    }

    #[test]
    fn archive_error_display_transport() {
        let err = ArchiveError::Transport("connection refused".to_string());
        assert_eq!(err.to_string(), "archive transport error: connection refused");
    }

    #[test]
    fn auth_headers_debug_redacts_token() {
        let h = AuthHeaders::with_token("tok-abc123");
        let dbg = format!("{h:?}");
        assert!(dbg.contains(AUTHORIZATION));
        assert!(!dbg.contains("tok-abc123"));
        assert_eq!(h.get(AUTHORIZATION), Some("tok-abc123"));
        assert!(!h.is_anonymous());
        assert!(AuthHeaders::anonymous().is_anonymous());
    }

    #[tokio::test]
    async fn client_is_object_safe_and_streams() {
        let c: Box<dyn ArchiveClient> = Box::new(StaticArchive { body: b"abc" });
        let h = AuthHeaders::anonymous();
        assert!(c.check_valid("x", &h).await.unwrap());
        let chunks: Vec<_> = c.fetch("x", &h).await.unwrap().collect().await;
        assert_eq!(chunks, vec![Ok(Bytes::from_static(b"abc"))]);
    }
}
