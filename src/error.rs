use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type SessionResult<T> = Result<T, SessionError>;

/// Error taxonomy for the session core.
///
/// Credential and validation errors are returned to the immediate caller for
/// inline display and never mutate the committed auth state. Transport-level
/// failures during background refresh are absorbed by the provider client and
/// logged; see `SessionError::is_transient`.
#[derive(Error, Debug)]
pub enum SessionError {
    /// The provider rejected the supplied email/password pair.
    #[error("invalid email or password")]
    InvalidCredentials,

    /// Sign-up was attempted with an email that already has an account.
    #[error("email address is already registered")]
    EmailInUse,

    /// The password does not meet the provider's minimum policy.
    #[error("password does not meet the minimum requirements")]
    WeakPassword,

    /// A network-level failure reaching the identity provider or backend.
    #[error("network failure: {0}")]
    Network(String),

    /// The provider could not service the request (5xx, aborted OAuth flow).
    #[error("identity provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// No usable credential, or the backend rejected the bearer token.
    /// Detected at authorized call sites; never auto-retried by the core.
    #[error("not authorized: {0}")]
    Unauthorized(String),

    /// Missing or malformed configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// The provider or backend answered with something this client cannot
    /// interpret.
    #[error("unexpected response: {0}")]
    Unexpected(String),
}

impl SessionError {
    /// Create a network error from any displayable cause.
    pub fn network(cause: impl std::fmt::Display) -> Self {
        SessionError::Network(cause.to_string())
    }

    /// Create a provider-unavailable error from any displayable cause.
    pub fn unavailable(cause: impl std::fmt::Display) -> Self {
        SessionError::ProviderUnavailable(cause.to_string())
    }

    /// Whether this failure is transport-level and may succeed on retry.
    ///
    /// The provider's background refresh loop absorbs transient errors
    /// instead of invalidating the session; only a positive rejection of the
    /// credential degrades the committed state.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SessionError::Network(_) | SessionError::ProviderUnavailable(_)
        )
    }

    /// Stable machine-readable code for surfacing across the UI boundary.
    pub fn code(&self) -> ErrorCode {
        match self {
            SessionError::InvalidCredentials => ErrorCode::InvalidCredentials,
            SessionError::EmailInUse => ErrorCode::EmailInUse,
            SessionError::WeakPassword => ErrorCode::WeakPassword,
            SessionError::Network(_) => ErrorCode::Network,
            SessionError::ProviderUnavailable(_) => ErrorCode::ProviderUnavailable,
            SessionError::Unauthorized(_) => ErrorCode::Unauthorized,
            SessionError::Config(_) => ErrorCode::Config,
            SessionError::Unexpected(_) => ErrorCode::Unexpected,
        }
    }
}

impl From<reqwest::Error> for SessionError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() || err.is_request() {
            SessionError::Network(err.to_string())
        } else if err.is_decode() {
            SessionError::Unexpected(err.to_string())
        } else {
            SessionError::Network(err.to_string())
        }
    }
}

/// Error codes for programmatic handling on the UI side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidCredentials,
    EmailInUse,
    WeakPassword,
    Network,
    ProviderUnavailable,
    Unauthorized,
    Config,
    Unexpected,
}
