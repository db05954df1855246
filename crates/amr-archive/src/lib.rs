//! amr-archive
//!
//! Remote archive boundary plus the HTTP-backed client.
//!
//! This crate owns the [`ArchiveClient`] abstraction and its concrete HTTP
//! implementation. It does **not** touch the local cache or the state ledger;
//! the reconciliation engine decides when to call it.

pub mod boundary;

pub use boundary::{ArchiveClient, ArchiveError, AuthHeaders, ByteStream, AUTHORIZATION};

use std::time::Duration;

use amr_config::secrets::ArchiveCredentials;
use amr_config::FetchSettings;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Longest response-body excerpt carried into a status error.
const MAX_ERROR_BODY_CHARS: usize = 200;

/// HTTP-backed archive client.
///
/// Credentials are exchanged for a token by [`HttpArchiveClient::auth_headers`];
/// the resulting headers are never logged.
#[derive(Debug, Clone)]
pub struct HttpArchiveClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpArchiveClient {
    /// Client with default timeouts against `base_url`.
    pub fn new(base_url: impl Into<String>) -> Result<Self, ArchiveError> {
        let d = FetchSettings::default();
        Self::with_timeouts(
            base_url,
            Duration::from_secs(d.connect_timeout_secs),
            Duration::from_secs(d.read_timeout_secs),
        )
    }

    pub fn from_settings(settings: &FetchSettings) -> Result<Self, ArchiveError> {
        Self::with_timeouts(
            settings.archive_base_url.clone(),
            Duration::from_secs(settings.connect_timeout_secs),
            Duration::from_secs(settings.read_timeout_secs),
        )
    }

    /// The read timeout applies per socket read, so long streamed bodies are
    /// fine as long as bytes keep arriving.
    pub fn with_timeouts(
        base_url: impl Into<String>,
        connect_timeout: Duration,
        read_timeout: Duration,
    ) -> Result<Self, ArchiveError> {
        let http = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .read_timeout(read_timeout)
            .build()
            .map_err(|e| ArchiveError::Config(format!("build http client: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.into(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }

    fn check_url(&self, content_hash: &str) -> String {
        self.endpoint(&format!("check/{content_hash}/"))
    }

    fn retrieve_url(&self, content_hash: &str) -> String {
        self.endpoint(&format!("retrieve/{content_hash}/"))
    }

    fn get(&self, url: &str, headers: &AuthHeaders) -> reqwest::RequestBuilder {
        headers
            .iter()
            .fold(self.http.get(url), |req, (name, value)| req.header(name, value))
    }

    /// Exchange credentials for the batch-wide auth headers.
    ///
    /// `None` yields anonymous headers without any network call.
    pub async fn auth_headers(
        &self,
        credentials: Option<&ArchiveCredentials>,
    ) -> Result<AuthHeaders, ArchiveError> {
        let Some(creds) = credentials else {
            info!("no archive credentials configured; using anonymous access");
            return Ok(AuthHeaders::anonymous());
        };

        let url = self.endpoint("get_token/");
        let resp = self
            .http
            .post(&url)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&TokenRequest {
                email: &creds.email,
                password: &creds.password,
            })
            .send()
            .await
            .map_err(transport)?;

        let resp = ensure_success(resp).await.map_err(|e| match e {
            ArchiveError::Status { code, message } => {
                ArchiveError::Auth(format!("token request refused status={code}: {message}"))
            }
            other => other,
        })?;

        let body: TokenResponse = resp
            .json()
            .await
            .map_err(|e| ArchiveError::Auth(format!("token response decode failed: {e}")))?;

        let token = body.into_token();
        if token.trim().is_empty() {
            return Err(ArchiveError::Auth("archive returned an empty token".to_string()));
        }

        info!("archive token acquired");
        Ok(AuthHeaders::with_token(token))
    }
}

#[async_trait::async_trait]
impl ArchiveClient for HttpArchiveClient {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn check_valid(
        &self,
        content_hash: &str,
        headers: &AuthHeaders,
    ) -> Result<bool, ArchiveError> {
        let url = self.check_url(content_hash);
        debug!(hash = content_hash, url = %url, "archive check");

        let resp = self.get(&url, headers).send().await.map_err(transport)?;
        let resp = ensure_success(resp).await?;

        let body: CheckResponse = resp
            .json()
            .await
            .map_err(|e| ArchiveError::Decode(format!("check response: {e}")))?;
        Ok(body.valid)
    }

    async fn fetch(
        &self,
        content_hash: &str,
        headers: &AuthHeaders,
    ) -> Result<ByteStream, ArchiveError> {
        let url = self.retrieve_url(content_hash);
        debug!(hash = content_hash, url = %url, "archive retrieve");

        let resp = self.get(&url, headers).send().await.map_err(transport)?;
        let resp = ensure_success(resp).await?;

        Ok(resp
            .bytes_stream()
            .map(|chunk| chunk.map_err(transport))
            .boxed())
    }
}

fn transport(e: reqwest::Error) -> ArchiveError {
    if e.is_timeout() {
        ArchiveError::Transport(format!("timed out: {e}"))
    } else {
        ArchiveError::Transport(e.to_string())
    }
}

/// Turn a non-2xx response into [`ArchiveError::Status`] with a short body excerpt.
async fn ensure_success(resp: reqwest::Response) -> Result<reqwest::Response, ArchiveError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    let message: String = body.trim().chars().take(MAX_ERROR_BODY_CHARS).collect();
    Err(ArchiveError::Status {
        code: status.as_u16(),
        message: if message.is_empty() {
            status.canonical_reason().unwrap_or("unknown").to_string()
        } else {
            message
        },
    })
}

#[derive(Serialize)]
struct TokenRequest<'a> {
    email: &'a str,
    password: &'a str,
}

/// The token endpoint answers with a bare JSON string; some deployments wrap it.
#[derive(Deserialize)]
#[serde(untagged)]
enum TokenResponse {
    Bare(String),
    Wrapped { token: String },
}

impl TokenResponse {
    fn into_token(self) -> String {
        match self {
            TokenResponse::Bare(t) | TokenResponse::Wrapped { token: t } => t,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CheckResponse {
    valid: bool,
}

// -----------------
// Tests (no network)
// -----------------
