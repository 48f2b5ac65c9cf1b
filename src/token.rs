//! WeCom application client and access_token acquisition.
//!
//! Design:
//! - `WxcomClient` owns the application identity (corpid, corpsecret, agentid), a
//!   `reqwest::Client` and a [`TokenCache`]. It is cheap to clone; clones share the cache.
//! - `get_access_token` serves from the cache and only calls upstream on a miss. A failed
//!   fetch is never cached and never retried here.
//! - Errors are unified via `Error`.
//!
//! Endpoint:
//! - GET https://qyapi.weixin.qq.com/cgi-bin/gettoken?corpid=CORP_ID&corpsecret=CORP_SECRET
//!
//! Example:
//! ```ignore
//! use wxcom_rs::WxcomClient;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = WxcomClient::new("ww_corp_id", "app_secret", 1000002)?;
//!     let token = client.get_access_token().await?;
//!     println!("access_token len: {}", token.len());
//!     Ok(())
//! }
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use reqwest::{StatusCode, Url};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::errors;
use crate::token_cache::TokenCache;

/// Default API host
pub const DEFAULT_BASE_URL: &str = "https://qyapi.weixin.qq.com/";

const GETTOKEN_PATH: &str = "/cgi-bin/gettoken";

/// Application identity. The secret never appears in `Debug` output or logs.
#[derive(Clone)]
pub struct Credentials {
    corp_id: String,
    corp_secret: String,
    agent_id: i64,
}

impl Credentials {
    /// Validate and build credentials.
    ///
    /// Fails only when corpid and corpsecret are both blank.
    pub fn new(
        corp_id: impl Into<String>,
        corp_secret: impl Into<String>,
        agent_id: i64,
    ) -> Result<Self> {
        let corp_id = corp_id.into();
        let corp_secret = corp_secret.into();
        if corp_id.trim().is_empty() && corp_secret.trim().is_empty() {
            return Err(Error::Configuration(
                "corpid and corpsecret cannot be empty".to_string(),
            ));
        }
        if !corp_id.is_empty() && !corp_id.starts_with("ww") {
            warn!(
                corp_id_hint = %redact_id(&corp_id),
                "corpid does not start with 'ww'; WeCom corpids are shown under 'My Company' in the admin console"
            );
        }
        Ok(Self {
            corp_id,
            corp_secret,
            agent_id,
        })
    }

    pub fn corp_id(&self) -> &str {
        &self.corp_id
    }

    pub fn agent_id(&self) -> i64 {
        self.agent_id
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("corp_id", &redact_id(&self.corp_id))
            .field("corp_secret", &"[redacted]")
            .field("agent_id", &self.agent_id)
            .finish()
    }
}

/// gettoken response
#[derive(Clone, Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    errcode: i64,
    #[serde(default)]
    errmsg: String,
    #[serde(default)]
    access_token: String,
    #[serde(default)]
    expires_in: u64,
}

/// Unified error type
#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Transport failure. The request URL is stripped: it carries corpsecret or access_token.
    #[error("http error: {0}")]
    Http(#[source] reqwest::Error),

    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("unexpected response (status {status}): {error}; body: {body}")]
    UnexpectedResponse {
        status: u16,
        error: String,
        body: String,
    },

    #[error("authentication failed {code}: {message}")]
    Authentication { code: i64, message: String },

    #[error("weixin error {code}: {message}")]
    Domain { code: i64, message: String },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl Error {
    /// errcode reported by the remote API, if any
    pub fn errcode(&self) -> Option<i64> {
        match self {
            Error::Authentication { code, .. } | Error::Domain { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Network failure or an undecodable response
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Error::Http(_) | Error::UnexpectedResponse { .. } | Error::InvalidUrl(_)
        )
    }

    /// Human-readable guidance for remote errors
    pub fn explain(&self) -> Option<String> {
        match self {
            Error::Authentication { code, message } | Error::Domain { code, message } => {
                Some(errors::explain(*code, message))
            }
            _ => None,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Http(e.without_url())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// WeCom application client
///
/// - Wraps `reqwest::Client` and the application's credentials
/// - Caches access_token per agentid and refreshes it on demand
/// - Every authenticated call goes through [`WxcomClient::execute`]
#[derive(Clone, Debug)]
pub struct WxcomClient {
    pub(crate) http: reqwest::Client,
    pub(crate) base_url: Url,
    pub(crate) credentials: Arc<Credentials>,
    pub(crate) cache: Arc<TokenCache>,
}

/// Builder for [`WxcomClient`]
#[derive(Debug)]
pub struct WxcomClientBuilder {
    corp_id: String,
    corp_secret: String,
    agent_id: i64,
    base_url: String,
    timeout: Option<Duration>,
    http: Option<reqwest::Client>,
    cache: Option<Arc<TokenCache>>,
}

impl WxcomClientBuilder {
    /// Override the API host (e.g. a mock server in tests or an egress proxy)
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Per-request timeout for the default HTTP client
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Use a custom `reqwest::Client`; `timeout` is ignored in that case
    pub fn http_client(mut self, http: reqwest::Client) -> Self {
        self.http = Some(http);
        self
    }

    /// Share a token cache between several clients
    pub fn token_cache(mut self, cache: Arc<TokenCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn build(self) -> Result<WxcomClient> {
        let credentials = Credentials::new(self.corp_id, self.corp_secret, self.agent_id)?;
        let base_url = Url::parse(&self.base_url)
            .map_err(|e| Error::Configuration(format!("invalid base url: {e}")))?;
        let http = match self.http {
            Some(http) => http,
            None => {
                let mut builder = reqwest::Client::builder().gzip(true);
                if let Some(timeout) = self.timeout {
                    builder = builder.timeout(timeout);
                }
                builder.build()?
            }
        };
        Ok(WxcomClient {
            http,
            base_url,
            credentials: Arc::new(credentials),
            cache: self.cache.unwrap_or_default(),
        })
    }
}

impl WxcomClient {
    /// Client with default settings
    pub fn new(
        corp_id: impl Into<String>,
        corp_secret: impl Into<String>,
        agent_id: i64,
    ) -> Result<Self> {
        Self::builder(corp_id, corp_secret, agent_id).build()
    }

    pub fn builder(
        corp_id: impl Into<String>,
        corp_secret: impl Into<String>,
        agent_id: i64,
    ) -> WxcomClientBuilder {
        WxcomClientBuilder {
            corp_id: corp_id.into(),
            corp_secret: corp_secret.into(),
            agent_id,
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: None,
            http: None,
            cache: None,
        }
    }

    pub fn agent_id(&self) -> i64 {
        self.credentials.agent_id
    }

    pub fn corp_id(&self) -> &str {
        &self.credentials.corp_id
    }

    pub fn token_cache(&self) -> &Arc<TokenCache> {
        &self.cache
    }

    /// Get a valid access_token, from cache when possible.
    ///
    /// On a miss, one task fetches from upstream while concurrent callers wait and then
    /// reuse the stored value.
    #[instrument(level = "debug", skip(self), fields(agent_id = self.credentials.agent_id))]
    pub async fn get_access_token(&self) -> Result<String> {
        let agent_id = self.credentials.agent_id;
        if let Some(token) = self.cache.get(agent_id) {
            return Ok(token);
        }

        let _guard = self.cache.lock_refresh().await;
        // another task may have refreshed while we waited
        if let Some(token) = self.cache.get(agent_id) {
            return Ok(token);
        }

        debug!("no usable token in cache; fetching from upstream");
        let resp = self.fetch_access_token().await?;
        self.cache
            .insert(agent_id, resp.access_token.clone(), resp.expires_in);
        Ok(resp.access_token)
    }

    /// Drop the cached token and fetch a new one
    pub async fn refresh_access_token(&self) -> Result<String> {
        self.invalidate_access_token();
        self.get_access_token().await
    }

    /// Drop the cached token for this application
    pub fn invalidate_access_token(&self) {
        self.cache.invalidate(self.credentials.agent_id);
    }

    pub(crate) fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| Error::InvalidUrl(e.to_string()))
    }

    /// GET /cgi-bin/gettoken (params: corpid, corpsecret; never logged)
    async fn fetch_access_token(&self) -> Result<TokenResponse> {
        let mut url = self.endpoint(GETTOKEN_PATH)?;
        {
            let mut qp = url.query_pairs_mut();
            qp.append_pair("corpid", &self.credentials.corp_id);
            qp.append_pair("corpsecret", &self.credentials.corp_secret);
        }
        debug!(
            corp_id_hint = %redact_id(&self.credentials.corp_id),
            "requesting WeCom access_token"
        );

        let resp = self.http.get(url).send().await?;
        let status = resp.status();
        let bytes = resp.bytes().await?;
        ensure_success(status, &bytes)?;

        let token = match serde_json::from_slice::<TokenResponse>(&bytes) {
            Ok(token) => token,
            Err(de_err) => {
                return Err(Error::UnexpectedResponse {
                    status: status.as_u16(),
                    error: de_err.to_string(),
                    body: redacted_body(&bytes),
                });
            }
        };

        if token.errcode != 0 {
            warn!(errcode = token.errcode, errmsg = %token.errmsg, "gettoken rejected");
            return Err(Error::Authentication {
                code: token.errcode,
                message: token.errmsg,
            });
        }
        if token.access_token.is_empty() {
            return Err(Error::UnexpectedResponse {
                status: status.as_u16(),
                error: "missing access_token".to_string(),
                body: redacted_body(&bytes),
            });
        }
        debug!(expires_in = token.expires_in, "access_token issued");
        Ok(token)
    }
}

/// Non-2xx replies are transport failures whatever their body says
pub(crate) fn ensure_success(status: StatusCode, bytes: &[u8]) -> Result<()> {
    if status.is_success() {
        return Ok(());
    }
    warn!(status = status.as_u16(), "non-success http status");
    Err(Error::UnexpectedResponse {
        status: status.as_u16(),
        error: format!("http status {status}"),
        body: redacted_body(bytes),
    })
}

/// Response body for error reports: access_token redacted, truncated to 2 KiB
pub(crate) fn redacted_body(bytes: &[u8]) -> String {
    let mut body = String::from_utf8_lossy(bytes).to_string();
    if let Ok(mut v) = serde_json::from_str::<serde_json::Value>(&body) {
        if let Some(obj) = v.as_object_mut() {
            if obj.contains_key("access_token") {
                obj.insert(
                    "access_token".to_string(),
                    serde_json::Value::String("[redacted]".into()),
                );
            }
        }
        if let Ok(s) = serde_json::to_string(&v) {
            body = s;
        }
    }
    if body.len() > 2048 {
        let mut cut = 2048;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
        body.push_str("...");
    }
    body
}

/// Redact an ID for logs: keep first 2 and last 2 chars where possible
pub(crate) fn redact_id(id: &str) -> String {
    let chars: Vec<char> = id.chars().collect();
    if chars.len() <= 4 {
        format!("{}***", id)
    } else {
        let head: String = chars[..2].iter().collect();
        let tail: String = chars[chars.len() - 2..].iter().collect();
        format!("{}***{}", head, tail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_id_and_secret_is_a_configuration_error() {
        let err = WxcomClient::new("", "", 1).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
        let err = WxcomClient::new("  ", "", 1).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn one_blank_credential_is_accepted() {
        assert!(WxcomClient::new("ww123", "", 1).is_ok());
        assert!(WxcomClient::new("", "secret", 1).is_ok());
    }

    #[test]
    fn invalid_base_url_is_a_configuration_error() {
        let err = WxcomClient::builder("ww123", "s", 1)
            .base_url("not a url")
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn debug_never_prints_the_secret() {
        let creds = Credentials::new("ww1234abcd", "topsecret", 5).unwrap();
        let s = format!("{:?}", creds);
        assert!(!s.contains("topsecret"));
        assert!(s.contains("ww***cd"));
    }

    #[test]
    fn redacted_body_hides_token() {
        let body = redacted_body(br#"{"access_token":"abc","expires_in":"x"}"#);
        assert!(!body.contains("abc"));
        assert!(body.contains("[redacted]"));
    }

    #[test]
    fn redact_short_ids() {
        assert_eq!(redact_id("ww1"), "ww1***");
        assert_eq!(redact_id("ww12345678"), "ww***78");
    }

    #[test]
    fn error_helpers() {
        let err = Error::Domain {
            code: 81013,
            message: "user & party & tag all invalid".into(),
        };
        assert_eq!(err.errcode(), Some(81013));
        assert!(!err.is_transport());
        assert!(err.explain().unwrap().contains("Recipient"));
        assert!(Error::InvalidUrl("x".into()).is_transport());
    }
}
