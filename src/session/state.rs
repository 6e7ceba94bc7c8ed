use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The authenticated principal bound to a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Stable unique identifier, immutable once created.
    pub id: String,

    /// Email address, used as the UI-facing display identity.
    pub email: Option<String>,

    /// Optional provider-supplied profile fields (display name, avatar).
    /// Kept loosely typed so required invariants stay on the fields above.
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl User {
    /// Create a user with the required fields and an empty metadata bag.
    pub fn new(id: impl Into<String>, email: Option<String>) -> Self {
        Self {
            id: id.into(),
            email,
            metadata: HashMap::new(),
        }
    }

    /// Best display name available: profile metadata, then email, then id.
    pub fn display_name(&self) -> &str {
        for key in ["display_name", "full_name", "name"] {
            if let Some(name) = self.metadata.get(key).and_then(Value::as_str) {
                if !name.is_empty() {
                    return name;
                }
            }
        }
        self.email.as_deref().unwrap_or(&self.id)
    }
}

/// One authenticated grant: a bearer token and the identity bound to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Opaque bearer credential attached to every authorized request.
    pub access_token: String,

    /// Opaque credential the provider client uses for background refresh.
    pub refresh_token: Option<String>,

    /// Instant after which the access token must no longer be used.
    /// `None` means the provider did not report an expiry.
    pub expires_at: Option<DateTime<Utc>>,

    /// The identity this grant belongs to.
    pub user: User,
}

impl Session {
    /// Create a session with no known expiry.
    pub fn new(access_token: impl Into<String>, user: User) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            expires_at: None,
            user,
        }
    }

    /// Set the expiry from a provider-reported lifetime in seconds.
    pub fn set_expiration(&mut self, expires_in_secs: u64) {
        self.expires_at = Some(Utc::now() + chrono::Duration::seconds(expires_in_secs as i64));
    }

    /// Check if the access token is past its expiry.
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(expires) => expires <= Utc::now(),
            // Unknown expiry is treated as still valid; the provider's
            // refresh loop is the authority on staleness.
            None => false,
        }
    }

    /// Check if the token will expire within the given number of seconds.
    pub fn expires_soon(&self, within_secs: i64) -> bool {
        match self.expires_at {
            Some(expires) => (expires - Utc::now()).num_seconds() < within_secs,
            None => false,
        }
    }

    /// A session with an empty or expired token is never presented to
    /// dependents as valid; the manager commits it as absent instead.
    pub fn is_valid(&self) -> bool {
        !self.access_token.is_empty() && !self.is_expired()
    }
}

/// Coarse lifecycle state of the session core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthPhase {
    /// Session restoration is in flight; identity unknown. Dependents must
    /// not decide anything while this phase is observed.
    Initializing,

    /// A valid session is committed.
    Authenticated,

    /// The absence of a session is confirmed.
    Unauthenticated,
}

/// The committed `{phase, session}` pair, replaced atomically on every
/// transition. `generation` tags the commit so stale asynchronous results
/// can be detected and discarded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthSnapshot {
    pub phase: AuthPhase,
    pub session: Option<Session>,
    pub generation: u64,
}

impl AuthSnapshot {
    /// The snapshot every manager starts from.
    pub fn initializing() -> Self {
        Self {
            phase: AuthPhase::Initializing,
            session: None,
            generation: 0,
        }
    }

    /// The committed user, if any.
    pub fn user(&self) -> Option<&User> {
        self.session.as_ref().map(|s| &s.user)
    }

    /// The bearer token, only while the committed session is still valid.
    pub fn access_token(&self) -> Option<&str> {
        self.session
            .as_ref()
            .filter(|s| s.is_valid())
            .map(|s| s.access_token.as_str())
    }

    pub fn is_authenticated(&self) -> bool {
        self.phase == AuthPhase::Authenticated
    }
}
