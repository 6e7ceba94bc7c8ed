//! Bearer-attaching HTTP helper for authorized backend calls.
//!
//! Every call site reads the access token from the session manager's
//! snapshot at call time, never from a copy cached earlier, so a refreshed
//! or cleared session takes effect on the very next request. Requests are
//! refused locally when no valid session exists; a rejected token (401/403)
//! maps to `SessionError::Unauthorized` and is not retried here, since
//! prompting for re-authentication is the calling screen's concern.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::ApiConfig;
use crate::error::{SessionError, SessionResult};
use crate::session::manager::SessionManager;

/// Network timeout for backend calls.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// HTTP client for the protected backend API.
pub struct AuthorizedClient {
    http: reqwest::Client,
    base_url: String,
    manager: Arc<SessionManager>,
}

impl AuthorizedClient {
    pub fn new(config: &ApiConfig, manager: Arc<SessionManager>) -> SessionResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| SessionError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            manager,
        })
    }

    /// Resolve a path against the backend base URL.
    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// The bearer token for the current request, read from the snapshot at
    /// call time. Refuses instead of sending an unauthenticated request to
    /// a protected endpoint.
    async fn bearer(&self) -> SessionResult<String> {
        let snapshot = self.manager.snapshot().await;
        match snapshot.access_token() {
            Some(token) => Ok(token.to_string()),
            None => Err(SessionError::Unauthorized(
                "no valid session; sign in before calling the backend".into(),
            )),
        }
    }

    /// GET a JSON resource.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> SessionResult<T> {
        let token = self.bearer().await?;
        let url = self.endpoint(path);
        debug!(url = %url, "authorized GET");

        let response = self.http.get(&url).bearer_auth(token).send().await?;
        let response = check(response).await?;
        Ok(response.json().await?)
    }

    /// POST a JSON body and decode the JSON response.
    pub async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> SessionResult<T> {
        let token = self.bearer().await?;
        let url = self.endpoint(path);
        debug!(url = %url, "authorized POST");

        let response = self
            .http
            .post(&url)
            .bearer_auth(token)
            .json(body)
            .send()
            .await?;
        let response = check(response).await?;
        Ok(response.json().await?)
    }

    /// PATCH a JSON body, discarding the response body.
    pub async fn patch_json<B: Serialize>(&self, path: &str, body: &B) -> SessionResult<()> {
        let token = self.bearer().await?;
        let url = self.endpoint(path);
        debug!(url = %url, "authorized PATCH");

        let response = self
            .http
            .patch(&url)
            .bearer_auth(token)
            .json(body)
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    /// DELETE a resource.
    pub async fn delete(&self, path: &str) -> SessionResult<()> {
        let token = self.bearer().await?;
        let url = self.endpoint(path);
        debug!(url = %url, "authorized DELETE");

        let response = self.http.delete(&url).bearer_auth(token).send().await?;
        check(response).await?;
        Ok(())
    }
}

/// Map a backend response onto the error taxonomy.
async fn check(response: reqwest::Response) -> SessionResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    warn!(status = status.as_u16(), "backend request failed");
    match status.as_u16() {
        401 | 403 => Err(SessionError::Unauthorized(format!(
            "backend rejected the access token ({status})"
        ))),
        s if s >= 500 => Err(SessionError::ProviderUnavailable(format!("{s}: {body}"))),
        s => Err(SessionError::Unexpected(format!("{s}: {body}"))),
    }
}
