//! Session and authentication core for the Shelfmark library client.
//!
//! The crate owns one thing: the authenticated-session state machine the
//! rest of the client hangs off. `SessionManager` is the single writer of
//! the committed `{phase, session}` snapshot; identity providers plug in
//! behind the `IdentityProvider` trait; `guard` and `api` are the two
//! boundary collaborators (screen gating and bearer-attaching fetch).

use std::sync::Arc;

use tracing::info;

// Export modules
pub mod api;
pub mod callbacks;
pub mod config;
pub mod error;
pub mod events;
pub mod guard;
pub mod provider;
pub mod session;

#[cfg(test)]
mod tests;

pub use api::AuthorizedClient;
pub use config::{ApiConfig, AppConfig, ProviderConfig};
pub use error::{ErrorCode, SessionError, SessionResult};
pub use events::{EventStream, Subscriber};
pub use guard::{decide, RouteDecision, RouteGuard};
pub use provider::http::HttpProvider;
pub use provider::{IdentityProvider, OAuthProvider, ProviderEvent, SignUpOutcome};
pub use session::{AuthPhase, AuthSnapshot, Session, SessionManager, User};

/// Fully wired session core: configuration turned into a provider client,
/// the manager that owns the committed state, and the authorized backend
/// client. Shells construct one of these at startup and pass the pieces
/// down to whoever needs them.
pub struct SessionCore {
    /// The identity-provider client, kept so shells can complete OAuth
    /// flows and hand back persisted sessions.
    pub provider: Arc<HttpProvider>,
    /// The session manager, already started.
    pub manager: Arc<SessionManager>,
    /// Bearer-attaching client for the protected backend API.
    pub api: AuthorizedClient,
}

impl SessionCore {
    /// Build and start the core from configuration.
    pub fn from_config(config: &AppConfig) -> SessionResult<Self> {
        config.validate()?;

        let provider = Arc::new(HttpProvider::new(&config.provider)?);
        let manager = SessionManager::new(Arc::clone(&provider) as Arc<dyn IdentityProvider>);
        manager.start();
        let api = AuthorizedClient::new(&config.api, Arc::clone(&manager))?;

        info!("session core started");
        Ok(Self {
            provider,
            manager,
            api,
        })
    }

    /// Release the provider subscription and background refresh work.
    pub fn shutdown(&self) {
        self.manager.shutdown();
        self.provider.shutdown();
        info!("session core shut down");
    }
}
