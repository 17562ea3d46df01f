use async_trait::async_trait;
use curator_api_types::{AuthErrorBody, LoginRequest, LoginResponse};
use reqwest::{Client, StatusCode, Url};
use tracing::{debug, warn};

use crate::error::SyncError;
use crate::session::AuthBackend;

use super::{base_url, http_client};

pub const DEFAULT_LOGIN_ERROR: &str = "Login failed. Please check your credentials.";

const LOGIN_PATH: &str = "api/users/login";

/// Auth service client used by the session manager.
#[derive(Clone)]
pub struct HttpAuthBackend {
    http: Client,
    base: Url,
}

impl HttpAuthBackend {
    pub fn new(auth_url: &str) -> Result<Self, SyncError> {
        Ok(Self {
            http: http_client()?,
            base: base_url(auth_url)?,
        })
    }
}

#[async_trait]
impl AuthBackend for HttpAuthBackend {
    async fn login(&self, credentials: &LoginRequest) -> Result<LoginResponse, SyncError> {
        let url = self
            .base
            .join(LOGIN_PATH)
            .map_err(|err| SyncError::config(err.to_string()))?;
        debug!(%url, email = %credentials.email, "Logging in");

        let resp = self.http.post(url).json(credentials).send().await?;
        let status = resp.status();
        let bytes = resp.bytes().await?;
        if !status.is_success() {
            let err = login_error(status, &bytes);
            warn!(status = status.as_u16(), message = %err.message(), "Login rejected");
            return Err(err);
        }
        serde_json::from_slice(&bytes).map_err(SyncError::from)
    }
}

/// First `errors[].message` of the auth service body, else the generic hint.
fn login_error(status: StatusCode, body: &[u8]) -> SyncError {
    let message = serde_json::from_slice::<AuthErrorBody>(body)
        .ok()
        .and_then(|body| body.errors.into_iter().next())
        .and_then(|item| item.message)
        .filter(|message| !message.is_empty())
        .unwrap_or_else(|| DEFAULT_LOGIN_ERROR.to_owned());
    SyncError::http(status.as_u16(), message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_error_uses_first_message() {
        let err = login_error(
            StatusCode::UNAUTHORIZED,
            br#"{"errors":[{"message":"The email or password provided is incorrect."},{"message":"x"}]}"#,
        );
        assert_eq!(err.status(), Some(401));
        assert_eq!(err.message(), "The email or password provided is incorrect.");
    }

    #[test]
    fn login_error_falls_back_to_default() {
        assert_eq!(
            login_error(StatusCode::INTERNAL_SERVER_ERROR, b"oops").message(),
            DEFAULT_LOGIN_ERROR
        );
        assert_eq!(
            login_error(StatusCode::UNAUTHORIZED, br#"{"errors":[]}"#).message(),
            DEFAULT_LOGIN_ERROR
        );
    }
}
