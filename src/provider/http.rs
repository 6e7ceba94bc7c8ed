//! Identity-provider client speaking the REST surface of a
//! Supabase-compatible identity service.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::ProviderConfig;
use crate::error::{SessionError, SessionResult};
use crate::events::{EventStream, Subscriber, EVENT_CHANNEL_CAPACITY, EVENT_REPLAY_BUFFER_SIZE};
use crate::provider::{IdentityProvider, OAuthProvider, ProviderEvent, SignUpOutcome};
use crate::session::state::{Session, User};

/// Seconds before expiry at which the background task refreshes the token.
const REFRESH_LEAD_SECS: i64 = 60;
/// Extra jitter added to the lead time so a fleet of clients spreads out.
const REFRESH_JITTER_SECS: i64 = 15;
/// Retry attempts per refresh wake before giving up until the next one.
const REFRESH_RETRY_ATTEMPTS: u32 = 3;
/// Base delay between refresh retries.
const REFRESH_RETRY_BASE_MS: u64 = 500;
/// Pause after an absorbed transient failure before trying again.
const REFRESH_TRANSIENT_PAUSE_SECS: u64 = 30;
/// Network timeout for provider calls.
const REQUEST_TIMEOUT_SECS: u64 = 15;

/// HTTP client for a Supabase-style identity service.
///
/// Holds the most recently issued session in memory and keeps it fresh with
/// a background refresh task. Durable persistence of the session belongs to
/// the hosting shell, which can hand a stored session back through
/// [`HttpProvider::restore_session`].
#[derive(Clone)]
pub struct HttpProvider {
    http: reqwest::Client,
    base_url: String,
    anon_key: String,
    redirect_to: Option<String>,
    events: EventStream<ProviderEvent>,
    current: Arc<RwLock<Option<Session>>>,
    refresh_task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl HttpProvider {
    /// Create a provider client from configuration.
    pub fn new(config: &ProviderConfig) -> SessionResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| SessionError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: config.url.trim_end_matches('/').to_string(),
            anon_key: config.anon_key.clone(),
            redirect_to: config.redirect_to.clone(),
            events: EventStream::new(EVENT_CHANNEL_CAPACITY, EVENT_REPLAY_BUFFER_SIZE),
            current: Arc::new(RwLock::new(None)),
            refresh_task: Arc::new(Mutex::new(None)),
        })
    }

    /// Build the URL for an identity endpoint.
    fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.base_url, path)
    }

    /// The URL a shell should open to start a browser OAuth flow.
    pub fn authorize_url(&self, provider: OAuthProvider) -> String {
        let mut url = format!(
            "{}?provider={}",
            self.auth_url("authorize"),
            provider.as_str()
        );
        if let Some(redirect) = &self.redirect_to {
            url.push_str("&redirect_to=");
            url.push_str(redirect);
        }
        url
    }

    /// Hand a shell-persisted session back to the provider, e.g. one read
    /// from browser storage at startup. The session is validated (and
    /// refreshed when already expired) on the next `current_session` call.
    pub async fn restore_session(&self, session: Session) {
        debug!(user = %session.user.id, "restoring persisted session");
        *self.current.write().await = Some(session);
    }

    /// Complete a browser OAuth flow with the tokens the redirect carried.
    ///
    /// Fetches the user bound to the access token, commits the session
    /// internally, and delivers it through the event channel, which is the
    /// only path OAuth sessions reach the session manager by.
    pub async fn complete_oauth(
        &self,
        access_token: &str,
        refresh_token: Option<String>,
        expires_in: Option<u64>,
    ) -> SessionResult<Session> {
        let user = self.fetch_user(access_token).await?;

        let mut session = Session::new(access_token, user);
        session.refresh_token = refresh_token;
        if let Some(secs) = expires_in {
            session.set_expiration(secs);
        }

        self.install_session(session.clone()).await;
        self.events
            .publish(ProviderEvent::SignedIn(session.clone()))
            .await;
        info!(user = %session.user.id, "OAuth sign-in completed");
        Ok(session)
    }

    /// Stop the background refresh task.
    pub fn shutdown(&self) {
        if let Some(task) = self.refresh_task.lock().unwrap().take() {
            task.abort();
        }
    }

    /// Store a session and (re)start the refresh task for it.
    async fn install_session(&self, session: Session) {
        *self.current.write().await = Some(session);
        self.start_refresh_loop();
    }

    /// Fetch the user bound to an access token.
    async fn fetch_user(&self, access_token: &str) -> SessionResult<User> {
        let response = self
            .http
            .get(self.auth_url("user"))
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(map_error(status, &body));
        }

        let wire: WireUser = response.json().await?;
        Ok(wire.into_user())
    }

    /// Send a token-grant request and turn the response into a session.
    async fn token_request(&self, grant_type: &str, payload: Value) -> SessionResult<Session> {
        let url = format!("{}?grant_type={}", self.auth_url("token"), grant_type);
        let response = self
            .http
            .post(&url)
            .header("apikey", &self.anon_key)
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(map_error(status, &body));
        }

        let wire: TokenResponse = response.json().await?;
        Ok(wire.into_session())
    }

    /// Exchange a refresh token for a fresh session.
    async fn refresh(&self, refresh_token: &str) -> SessionResult<Session> {
        self.token_request("refresh_token", json!({ "refresh_token": refresh_token }))
            .await
    }

    /// Refresh with bounded retries; only transient failures are retried.
    async fn refresh_with_backoff(&self, refresh_token: &str) -> SessionResult<Session> {
        let mut delay_ms = REFRESH_RETRY_BASE_MS;
        let mut attempt = 1;
        loop {
            match self.refresh(refresh_token).await {
                Ok(session) => return Ok(session),
                Err(e) if e.is_transient() && attempt < REFRESH_RETRY_ATTEMPTS => {
                    let jitter = fastrand::u64(0..=delay_ms / 2);
                    debug!(
                        attempt,
                        delay_ms = delay_ms + jitter,
                        error = %e,
                        "refresh attempt failed, retrying"
                    );
                    sleep(Duration::from_millis(delay_ms + jitter)).await;
                    delay_ms *= 2;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Spawn (or replace) the task that refreshes the session ahead of its
    /// expiry. Transient failures are absorbed: the session is only torn
    /// down when the provider rejects the refresh token outright.
    fn start_refresh_loop(&self) {
        let provider = self.clone();
        let handle = tokio::spawn(async move {
            loop {
                let (expires_at, refresh_token) = {
                    let guard = provider.current.read().await;
                    match guard.as_ref() {
                        Some(session) => match (session.expires_at, session.refresh_token.clone()) {
                            (Some(expires), Some(token)) => (expires, token),
                            _ => {
                                debug!("session has no expiry or refresh token; refresh loop idle");
                                return;
                            }
                        },
                        None => return,
                    }
                };

                wait_until_refresh_due(expires_at).await;

                match provider.refresh_with_backoff(&refresh_token).await {
                    Ok(session) => {
                        *provider.current.write().await = Some(session.clone());
                        provider
                            .events
                            .publish(ProviderEvent::TokenRefreshed(session))
                            .await;
                        debug!("session refreshed ahead of expiry");
                    }
                    Err(e) if e.is_transient() => {
                        // Absorbed: a network blip must not log the user out.
                        warn!(error = %e, "background refresh failed; keeping session");
                        sleep(Duration::from_secs(REFRESH_TRANSIENT_PAUSE_SECS)).await;
                    }
                    Err(e) => {
                        warn!(error = %e, "refresh token rejected; session is invalid");
                        *provider.current.write().await = None;
                        provider
                            .events
                            .publish(ProviderEvent::SessionInvalid {
                                reason: e.to_string(),
                            })
                            .await;
                        return;
                    }
                }
            }
        });

        if let Some(previous) = self.refresh_task.lock().unwrap().replace(handle) {
            previous.abort();
        }
    }
}

/// Sleep until shortly before the given expiry, with jitter.
async fn wait_until_refresh_due(expires_at: DateTime<Utc>) {
    let lead = REFRESH_LEAD_SECS + fastrand::i64(0..=REFRESH_JITTER_SECS);
    let wait = (expires_at - Utc::now()).num_seconds() - lead;
    if wait > 0 {
        sleep(Duration::from_secs(wait as u64)).await;
    }
}

#[async_trait]
impl IdentityProvider for HttpProvider {
    async fn current_session(&self) -> SessionResult<Option<Session>> {
        let stored = self.current.read().await.clone();
        let session = match stored {
            Some(session) => session,
            None => return Ok(None),
        };

        if session.is_valid() {
            return Ok(Some(session));
        }

        // Expired restore: try one refresh before giving up on it.
        let Some(refresh_token) = session.refresh_token.clone() else {
            *self.current.write().await = None;
            return Ok(None);
        };

        match self.refresh(&refresh_token).await {
            Ok(fresh) => {
                self.install_session(fresh.clone()).await;
                Ok(Some(fresh))
            }
            Err(e) if e.is_transient() => Err(e),
            Err(e) => {
                debug!(error = %e, "restored session could not be refreshed; discarding");
                *self.current.write().await = None;
                Ok(None)
            }
        }
    }

    fn subscribe(&self) -> Subscriber<ProviderEvent> {
        self.events.subscribe()
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> SessionResult<Session> {
        let session = self
            .token_request("password", json!({ "email": email, "password": password }))
            .await?;
        self.install_session(session.clone()).await;
        info!(user = %session.user.id, "password sign-in succeeded");
        Ok(session)
    }

    async fn sign_up(&self, email: &str, password: &str) -> SessionResult<SignUpOutcome> {
        let response = self
            .http
            .post(self.auth_url("signup"))
            .header("apikey", &self.anon_key)
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(map_error(status, &body));
        }

        let body: Value = response.json().await?;
        if body.get("access_token").and_then(Value::as_str).is_some() {
            let wire: TokenResponse = serde_json::from_value(body)
                .map_err(|e| SessionError::Unexpected(format!("malformed signup response: {e}")))?;
            let session = wire.into_session();
            self.install_session(session.clone()).await;
            info!(user = %session.user.id, "sign-up issued a session");
            return Ok(SignUpOutcome::Session(session));
        }

        // Confirmation-required deployments answer with the bare user.
        let confirmed_email = body
            .get("email")
            .and_then(Value::as_str)
            .unwrap_or(email)
            .to_string();
        info!(email = %confirmed_email, "sign-up pending confirmation");
        Ok(SignUpOutcome::ConfirmationRequired {
            email: confirmed_email,
        })
    }

    async fn sign_in_with_oauth(&self, provider: OAuthProvider) -> SessionResult<()> {
        let url = self.authorize_url(provider);
        // The shell owns the browser; the resulting session arrives through
        // complete_oauth and the event channel.
        info!(provider = provider.as_str(), url = %url, "OAuth flow started");
        Ok(())
    }

    async fn sign_out(&self) -> SessionResult<()> {
        let previous = self.current.write().await.take();
        self.shutdown();
        self.events.publish(ProviderEvent::SignedOut).await;

        let Some(session) = previous else {
            debug!("sign-out with no active session; nothing to revoke");
            return Ok(());
        };

        let response = self
            .http
            .post(self.auth_url("logout"))
            .header("apikey", &self.anon_key)
            .bearer_auth(&session.access_token)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            // Local state is already cleared; the caller decides whether a
            // failed revocation is worth surfacing.
            warn!(status, "provider-side sign-out failed");
            return Err(map_error(status, &body));
        }

        info!("signed out");
        Ok(())
    }
}

impl Drop for HttpProvider {
    fn drop(&mut self) {
        // Only the last clone tears the refresh task down.
        if Arc::strong_count(&self.refresh_task) == 1 {
            self.shutdown();
        }
    }
}

/// Token-grant response wire format.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<u64>,
    expires_at: Option<i64>,
    user: WireUser,
}

impl TokenResponse {
    fn into_session(self) -> Session {
        let mut session = Session::new(self.access_token, self.user.into_user());
        session.refresh_token = self.refresh_token;
        session.expires_at = match self.expires_at {
            Some(epoch) => DateTime::<Utc>::from_timestamp(epoch, 0),
            None => self
                .expires_in
                .map(|secs| Utc::now() + chrono::Duration::seconds(secs as i64)),
        };
        session
    }
}

/// User wire format.
#[derive(Debug, Deserialize)]
struct WireUser {
    id: String,
    email: Option<String>,
    #[serde(default)]
    user_metadata: HashMap<String, Value>,
}

impl WireUser {
    fn into_user(self) -> User {
        User {
            id: self.id,
            email: self.email,
            metadata: self.user_metadata,
        }
    }
}

/// Error payload wire format. The identity service is inconsistent about
/// field names across endpoints, so every known spelling is accepted.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    msg: Option<String>,
}

/// Map an HTTP failure onto the crate's error taxonomy.
fn map_error(status: u16, body: &str) -> SessionError {
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    let code = parsed
        .error_code
        .or(parsed.error)
        .unwrap_or_default();
    let message = parsed
        .error_description
        .or(parsed.msg)
        .unwrap_or_else(|| body.trim().to_string());

    if code == "invalid_grant"
        || code == "invalid_credentials"
        || message.contains("Invalid login credentials")
    {
        return SessionError::InvalidCredentials;
    }
    if code == "user_already_exists" || message.contains("already registered") {
        return SessionError::EmailInUse;
    }
    if code == "weak_password" || message.contains("Password should be") {
        return SessionError::WeakPassword;
    }

    match status {
        401 | 403 => SessionError::Unauthorized(message),
        429 => SessionError::ProviderUnavailable(format!("rate limited: {message}")),
        s if s >= 500 => SessionError::ProviderUnavailable(format!("{s}: {message}")),
        s => SessionError::Unexpected(format!("{s}: {message}")),
    }
}
