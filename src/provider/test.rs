//! A scriptable identity provider for exercising the session manager
//! without external services. Compiled in-tree so integration tests and
//! downstream shells can drive deterministic auth scenarios.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{oneshot, Mutex};
use tracing::debug;

use crate::error::{SessionError, SessionResult};
use crate::events::{EventStream, Subscriber, EVENT_CHANNEL_CAPACITY, EVENT_REPLAY_BUFFER_SIZE};
use crate::provider::{IdentityProvider, OAuthProvider, ProviderEvent, SignUpOutcome};
use crate::session::state::{Session, User};

/// Scripted responses and gates for the test provider.
#[derive(Default)]
struct Script {
    restore_results: VecDeque<SessionResult<Option<Session>>>,
    sign_in_results: VecDeque<SessionResult<Session>>,
    sign_up_results: VecDeque<SessionResult<SignUpOutcome>>,
    sign_out_results: VecDeque<SessionResult<()>>,
    restore_gate: Option<oneshot::Receiver<()>>,
    sign_in_gate: Option<oneshot::Receiver<()>>,
}

/// Call counters, for asserting how often each operation was invoked.
#[derive(Default)]
struct CallCounts {
    restore: AtomicUsize,
    sign_in: AtomicUsize,
    sign_up: AtomicUsize,
    sign_out: AtomicUsize,
    oauth: AtomicUsize,
}

/// Identity provider whose every response is scripted by the test.
///
/// Responses are queued per operation and consumed in order; operations with
/// an empty queue fall back to a benign default (`Ok(None)` for restore,
/// `Ok(())` for sign-out, an error for credential exchanges). A gate makes
/// the next call suspend until the test releases it, which is how races
/// between overlapping operations are scripted deterministically.
pub struct TestProvider {
    events: EventStream<ProviderEvent>,
    script: Mutex<Script>,
    calls: CallCounts,
}

impl TestProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            events: EventStream::new(EVENT_CHANNEL_CAPACITY, EVENT_REPLAY_BUFFER_SIZE),
            script: Mutex::new(Script::default()),
            calls: CallCounts::default(),
        })
    }

    /// Build a session usable in tests, valid for one hour.
    pub fn session_for(email: &str) -> Session {
        let user = User::new(format!("user-{email}"), Some(email.to_string()));
        let mut session = Session::new(format!("token-{email}"), user);
        session.refresh_token = Some(format!("refresh-{email}"));
        session.expires_at = Some(Utc::now() + chrono::Duration::hours(1));
        session
    }

    /// Queue the result of the next `current_session` call.
    pub async fn queue_restore(&self, result: SessionResult<Option<Session>>) {
        self.script.lock().await.restore_results.push_back(result);
    }

    /// Queue the result of the next `sign_in_with_password` call.
    pub async fn queue_sign_in(&self, result: SessionResult<Session>) {
        self.script.lock().await.sign_in_results.push_back(result);
    }

    /// Queue the result of the next `sign_up` call.
    pub async fn queue_sign_up(&self, result: SessionResult<SignUpOutcome>) {
        self.script.lock().await.sign_up_results.push_back(result);
    }

    /// Queue the result of the next `sign_out` call.
    pub async fn queue_sign_out(&self, result: SessionResult<()>) {
        self.script.lock().await.sign_out_results.push_back(result);
    }

    /// Make the next `current_session` call block until the returned sender
    /// fires (or is dropped).
    pub async fn hold_next_restore(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.script.lock().await.restore_gate = Some(rx);
        tx
    }

    /// Make the next `sign_in_with_password` call block until the returned
    /// sender fires (or is dropped).
    pub async fn hold_next_sign_in(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.script.lock().await.sign_in_gate = Some(rx);
        tx
    }

    /// Emit a provider event, as the real provider would on refresh,
    /// OAuth completion, or remote sign-out.
    pub async fn emit(&self, event: ProviderEvent) {
        self.events.publish(event).await;
    }

    pub fn sign_in_calls(&self) -> usize {
        self.calls.sign_in.load(Ordering::SeqCst)
    }

    pub fn sign_out_calls(&self) -> usize {
        self.calls.sign_out.load(Ordering::SeqCst)
    }

    pub fn oauth_calls(&self) -> usize {
        self.calls.oauth.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityProvider for TestProvider {
    async fn current_session(&self) -> SessionResult<Option<Session>> {
        self.calls.restore.fetch_add(1, Ordering::SeqCst);
        let (gate, result) = {
            let mut script = self.script.lock().await;
            (
                script.restore_gate.take(),
                script.restore_results.pop_front(),
            )
        };
        if let Some(gate) = gate {
            debug!("restore held by test gate");
            let _ = gate.await;
        }
        result.unwrap_or(Ok(None))
    }

    fn subscribe(&self) -> Subscriber<ProviderEvent> {
        self.events.subscribe()
    }

    async fn sign_in_with_password(
        &self,
        _email: &str,
        _password: &str,
    ) -> SessionResult<Session> {
        self.calls.sign_in.fetch_add(1, Ordering::SeqCst);
        let (gate, result) = {
            let mut script = self.script.lock().await;
            (
                script.sign_in_gate.take(),
                script.sign_in_results.pop_front(),
            )
        };
        if let Some(gate) = gate {
            debug!("sign-in held by test gate");
            let _ = gate.await;
        }
        result.unwrap_or(Err(SessionError::InvalidCredentials))
    }

    async fn sign_up(&self, email: &str, _password: &str) -> SessionResult<SignUpOutcome> {
        self.calls.sign_up.fetch_add(1, Ordering::SeqCst);
        let result = self.script.lock().await.sign_up_results.pop_front();
        result.unwrap_or(Ok(SignUpOutcome::ConfirmationRequired {
            email: email.to_string(),
        }))
    }

    async fn sign_in_with_oauth(&self, _provider: OAuthProvider) -> SessionResult<()> {
        self.calls.oauth.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn sign_out(&self) -> SessionResult<()> {
        self.calls.sign_out.fetch_add(1, Ordering::SeqCst);
        let result = self.script.lock().await.sign_out_results.pop_front();
        result.unwrap_or(Ok(()))
    }
}
