//! Route-guard decisions over the committed auth state.
//!
//! The shell's router owns navigation; this module only decides. Keeping
//! the decision pure makes the guard trivially testable and guarantees the
//! same behavior for every protected screen.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::session::manager::SessionManager;
use crate::session::state::{AuthPhase, AuthSnapshot};

/// What the shell should render or do for the current navigation target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "action")]
pub enum RouteDecision {
    /// Session restoration is in flight: render a neutral placeholder.
    /// Never protected content, never a redirect.
    ShowLoading,

    /// Render the requested screen.
    Render,

    /// Send the user to the login screen, replacing history so back
    /// navigation cannot return to the protected screen.
    RedirectToLogin { replace: bool },

    /// The user is signed in but sitting on the login screen: send them
    /// into the app.
    RedirectToApp { replace: bool },
}

/// Decide what to do for a navigation target given the committed snapshot.
/// `at_login` is whether the target is the login screen itself.
pub fn decide(snapshot: &AuthSnapshot, at_login: bool) -> RouteDecision {
    match snapshot.phase {
        AuthPhase::Initializing => RouteDecision::ShowLoading,
        AuthPhase::Authenticated => {
            if at_login {
                RouteDecision::RedirectToApp { replace: true }
            } else {
                RouteDecision::Render
            }
        }
        AuthPhase::Unauthenticated => {
            if at_login {
                RouteDecision::Render
            } else {
                RouteDecision::RedirectToLogin { replace: true }
            }
        }
    }
}

/// Guard bound to a session manager, for shells that prefer a handle over
/// threading snapshots through.
pub struct RouteGuard {
    manager: Arc<SessionManager>,
}

impl RouteGuard {
    pub fn new(manager: Arc<SessionManager>) -> Self {
        Self { manager }
    }

    /// Decide against the latest committed snapshot.
    pub async fn decide(&self, at_login: bool) -> RouteDecision {
        decide(&self.manager.snapshot().await, at_login)
    }
}
