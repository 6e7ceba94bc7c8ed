//! Identity-provider capability surface consumed by the session manager.
//!
//! Two implementations ship in-tree: `http::HttpProvider` speaks the REST
//! surface of a Supabase-compatible identity service, and `test::TestProvider`
//! is a scriptable stand-in for deterministic tests.

pub mod http;
pub mod test;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::SessionResult;
use crate::events::Subscriber;
use crate::session::state::Session;

/// External identity services a browser-flow sign-in can delegate to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OAuthProvider {
    Google,
}

impl OAuthProvider {
    /// The provider slug used in authorize URLs.
    pub fn as_str(&self) -> &'static str {
        match self {
            OAuthProvider::Google => "google",
        }
    }
}

/// Result of a sign-up attempt. The provider decides whether an account is
/// usable immediately or needs a confirmation step first.
#[derive(Debug, Clone, PartialEq)]
pub enum SignUpOutcome {
    /// The account exists and a session was issued.
    Session(Session),

    /// The account was created but no session exists until the user
    /// confirms out of band (e.g. an email link).
    ConfirmationRequired { email: String },
}

/// Change notifications emitted by an identity provider.
///
/// Ordering contract: events are delivered in emission order. The manager
/// assigns each event a fresh generation on arrival, so a provider event
/// always supersedes any imperative operation that was issued before it.
///
/// `SessionInvalid` is emitted only when the provider positively asserts
/// the session is no longer usable (e.g. the refresh token was rejected).
/// Transient transport failures during background refresh are absorbed by
/// the provider client and never surface here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ProviderEvent {
    /// A session materialized outside an imperative call's direct return,
    /// e.g. the completion of a browser OAuth flow.
    SignedIn(Session),

    /// Background refresh replaced the session's credentials.
    TokenRefreshed(Session),

    /// The session ended, locally or elsewhere.
    SignedOut,

    /// The provider positively asserted the session is invalid.
    SessionInvalid { reason: String },
}

/// Capability surface of an external identity provider.
///
/// All calls suspend at network boundaries; none of them touch the
/// manager's committed state directly.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// The provider's current persisted session, if any. May hit the
    /// network to validate or refresh a restored credential.
    async fn current_session(&self) -> SessionResult<Option<Session>>;

    /// Subscribe to the provider's change notifications.
    fn subscribe(&self) -> Subscriber<ProviderEvent>;

    /// Exchange an email/password pair for a session.
    async fn sign_in_with_password(&self, email: &str, password: &str)
        -> SessionResult<Session>;

    /// Register a new account. See [`SignUpOutcome`].
    async fn sign_up(&self, email: &str, password: &str) -> SessionResult<SignUpOutcome>;

    /// Start a browser OAuth flow. The resulting session is delivered via
    /// [`IdentityProvider::subscribe`], not this call's return value.
    async fn sign_in_with_oauth(&self, provider: OAuthProvider) -> SessionResult<()>;

    /// End the current session. Local state clearing proceeds regardless
    /// of whether the provider-side revocation succeeds.
    async fn sign_out(&self) -> SessionResult<()>;
}
