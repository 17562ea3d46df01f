//! HTTP access to the content API and the auth service.

mod auth;
mod resources;

pub use auth::{DEFAULT_LOGIN_ERROR, HttpAuthBackend};

use reqwest::header::AUTHORIZATION;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use curator_api_types::DetailBody;

use crate::error::{DEFAULT_HTTP_MESSAGE, SyncError};
use crate::session::SessionManager;

const DEFAULT_BASE_URL: &str = "http://localhost:8000";
const DEFAULT_AUTH_URL: &str = "http://localhost:4000";

/// Backend endpoints from `curator.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Content API root.
    pub base_url: String,
    /// Auth service root.
    pub auth_url: String,
    /// Send the session token as a bearer header on content API calls.
    pub attach_session_token: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_owned(),
            auth_url: DEFAULT_AUTH_URL.to_owned(),
            attach_session_token: false,
        }
    }
}

pub fn user_agent() -> &'static str {
    concat!("curator/", env!("CARGO_PKG_VERSION"))
}

/// Parse `raw` as a base URL whose path ends in `/`, so joins keep any prefix.
pub(crate) fn base_url(raw: &str) -> Result<Url, SyncError> {
    let mut base =
        Url::parse(raw).map_err(|err| SyncError::config(format!("invalid URL `{raw}`: {err}")))?;
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    Ok(base)
}

pub(crate) fn http_client() -> Result<Client, SyncError> {
    Client::builder()
        .user_agent(user_agent())
        .build()
        .map_err(SyncError::from)
}

/// Content API client.
#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    base: Url,
    session: Option<SessionManager>,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self, SyncError> {
        Ok(Self {
            http: http_client()?,
            base: self::base_url(base_url)?,
            session: None,
        })
    }

    /// Attach the current session token to every request. Calls fail with
    /// `StaleSession` while no valid session exists.
    pub fn with_session(mut self, session: SessionManager) -> Self {
        self.session = Some(session);
        self
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    pub fn url(&self, path: &str) -> Result<Url, SyncError> {
        self.base
            .join(path.trim_start_matches('/'))
            .map_err(|err| SyncError::config(format!("invalid path `{path}`: {err}")))
    }

    fn build(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<Value>,
    ) -> Result<RequestBuilder, SyncError> {
        let mut url = self.url(path)?;
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (name, value) in query {
                pairs.append_pair(name, value);
            }
        }

        let mut req = self.http.request(method, url);
        if let Some(session) = &self.session {
            let session = session.require()?;
            req = req.header(AUTHORIZATION, format!("Bearer {}", session.token));
        }
        if let Some(body) = body {
            req = req.json(&body);
        }
        Ok(req)
    }

    pub async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<Value>,
    ) -> Result<T, SyncError> {
        debug!(%method, path, "API request");
        let resp = self.build(method, path, query, body)?.send().await?;
        Self::handle(resp).await
    }

    /// Request whose success body is ignored (e.g. `204 No Content`).
    pub async fn request_unit(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<Value>,
    ) -> Result<(), SyncError> {
        debug!(%method, path, "API request");
        let resp = self.build(method, path, query, body)?.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let bytes = resp.bytes().await?;
            return Err(content_error(status, &bytes));
        }
        Ok(())
    }

    pub async fn get(&self, path: &str, query: &[(&str, String)]) -> Result<Value, SyncError> {
        self.request(Method::GET, path, query, None).await
    }

    async fn handle<T: DeserializeOwned>(resp: Response) -> Result<T, SyncError> {
        let status = resp.status();
        let bytes = resp.bytes().await?;
        if !status.is_success() {
            return Err(content_error(status, &bytes));
        }
        if bytes.is_empty() || status == StatusCode::NO_CONTENT {
            return serde_json::from_value(Value::Null).map_err(SyncError::from);
        }
        serde_json::from_slice(&bytes).map_err(SyncError::from)
    }
}

/// Build an `Http` error from a content API error body.
///
/// The message comes from `detail`: a string is used as is, a validation
/// list contributes its first `msg`. Anything else yields the generic message.
pub fn content_error(status: StatusCode, body: &[u8]) -> SyncError {
    let message = serde_json::from_slice::<DetailBody>(body)
        .ok()
        .and_then(|body| match body.detail {
            Value::String(message) if !message.is_empty() => Some(message),
            Value::Array(items) => items
                .first()
                .and_then(|item| item.get("msg"))
                .and_then(Value::as_str)
                .map(str::to_owned),
            _ => None,
        })
        .unwrap_or_else(|| DEFAULT_HTTP_MESSAGE.to_owned());
    SyncError::http(status.as_u16(), message)
}
