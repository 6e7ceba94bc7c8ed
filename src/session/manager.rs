use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::callbacks::{CallbackId, CallbackRegistry};
use crate::error::{SessionError, SessionResult};
use crate::events::{EventStream, Subscriber, EVENT_CHANNEL_CAPACITY, EVENT_REPLAY_BUFFER_SIZE};
use crate::provider::{IdentityProvider, OAuthProvider, ProviderEvent, SignUpOutcome};
use crate::session::state::{AuthPhase, AuthSnapshot, Session};

/// The single authoritative source of "who is signed in right now".
///
/// The manager owns the committed `{phase, session}` snapshot for the
/// lifetime of the process. All mutation flows through the four operations
/// or the provider event channel; dependents read snapshots and subscribe
/// to change notifications. It is an explicitly constructed value meant to
/// be passed down (`Arc<SessionManager>`), not an ambient singleton.
///
/// Every commit carries a generation. Imperative operations take their
/// generation when they are issued and provider events take theirs on
/// arrival, so a response that resolves after it has been superseded (a
/// sign-in landing after a sign-out, a restore landing after a fresher
/// provider event) is discarded instead of clobbering newer state.
///
/// The manager imposes no timeout of its own on operations; callers rely
/// on the provider's network timeout.
pub struct SessionManager {
    provider: Arc<dyn IdentityProvider>,
    state: Arc<RwLock<AuthSnapshot>>,
    generation: AtomicU64,
    changes: EventStream<AuthSnapshot>,
    callbacks: CallbackRegistry<AuthSnapshot>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl SessionManager {
    /// Create a manager in the `Initializing` phase. Call
    /// [`SessionManager::start`] to wire the provider subscription and kick
    /// off session restoration.
    pub fn new(provider: Arc<dyn IdentityProvider>) -> Arc<Self> {
        Arc::new(Self {
            provider,
            state: Arc::new(RwLock::new(AuthSnapshot::initializing())),
            generation: AtomicU64::new(0),
            changes: EventStream::new(EVENT_CHANNEL_CAPACITY, EVENT_REPLAY_BUFFER_SIZE),
            callbacks: CallbackRegistry::with_group("session"),
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// Run the one-time initialization protocol: subscribe to provider
    /// events, then request the persisted session. Whichever resolves
    /// first commits and moves the phase out of `Initializing`; the loser
    /// of that race is discarded by its stale generation.
    pub fn start(self: &Arc<Self>) {
        let mut provider_events = self.provider.subscribe();
        let weak = Arc::downgrade(self);
        let listener = tokio::spawn(async move {
            loop {
                match provider_events.recv().await {
                    Ok(event) => {
                        let Some(manager) = weak.upgrade() else { break };
                        manager.apply_provider_event(event).await;
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "provider event listener lagged, continuing");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            debug!("provider event listener stopped");
        });

        // The restore's generation is taken when the request is issued, so
        // any provider event arriving afterwards supersedes its result.
        let generation = self.next_generation();
        let provider = Arc::clone(&self.provider);
        let weak = Arc::downgrade(self);
        let restore = tokio::spawn(async move {
            let restored = provider.current_session().await;

            let Some(manager) = weak.upgrade() else { return };
            match restored {
                Ok(session) => {
                    let present = session.is_some();
                    if manager.commit(generation, session).await {
                        info!(present, "session restore resolved");
                    }
                }
                Err(e) => {
                    warn!(error = %e, "session restore failed; treating as signed out");
                    manager.commit(generation, None).await;
                }
            }
        });

        let mut tasks = self.tasks.lock().unwrap();
        tasks.push(listener);
        tasks.push(restore);
    }

    /// Release the provider subscription and any in-flight restore work.
    /// After shutdown the committed snapshot stays readable but no longer
    /// tracks the provider.
    pub fn shutdown(&self) {
        for task in self.tasks.lock().unwrap().drain(..) {
            task.abort();
        }
        self.callbacks.clear();
        debug!("session manager shut down");
    }

    /// The latest committed snapshot.
    pub async fn snapshot(&self) -> AuthSnapshot {
        self.state.read().await.clone()
    }

    /// Subscribe to committed snapshots as a stream.
    pub fn subscribe(&self) -> Subscriber<AuthSnapshot> {
        self.changes.subscribe()
    }

    /// Register a callback invoked on every commit. Returns an id for
    /// [`SessionManager::remove_callback`].
    pub fn on_change<F>(&self, callback: F) -> CallbackId
    where
        F: Fn(AuthSnapshot) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.callbacks.register(callback)
    }

    /// Stop delivering commits to a registered callback.
    pub fn remove_callback(&self, id: CallbackId) -> bool {
        self.callbacks.unregister(id)
    }

    /// Exchange credentials for a session and commit it.
    ///
    /// Validation and credential errors propagate to the caller for inline
    /// display; the committed state is untouched on failure. A success that
    /// resolves after a newer operation (e.g. the user signed out while the
    /// call was in flight) still returns the session but is not committed.
    pub async fn sign_in(&self, email: &str, password: &str) -> SessionResult<Session> {
        if email.trim().is_empty() || password.is_empty() {
            return Err(SessionError::InvalidCredentials);
        }

        let generation = self.next_generation();
        debug!(generation, email, "sign-in requested");
        let session = self.provider.sign_in_with_password(email, password).await?;
        if !self.commit(generation, Some(session.clone())).await {
            debug!(generation, "sign-in result arrived after being superseded");
        }
        Ok(session)
    }

    /// Register a new account. Commits only when the provider issues a
    /// session immediately; a confirmation-pending outcome leaves the
    /// committed state untouched.
    pub async fn sign_up(&self, email: &str, password: &str) -> SessionResult<SignUpOutcome> {
        if email.trim().is_empty() {
            return Err(SessionError::InvalidCredentials);
        }
        if password.is_empty() {
            return Err(SessionError::WeakPassword);
        }

        let generation = self.next_generation();
        debug!(generation, email, "sign-up requested");
        let outcome = self.provider.sign_up(email, password).await?;
        match &outcome {
            SignUpOutcome::Session(session) => {
                if !self.commit(generation, Some(session.clone())).await {
                    debug!(generation, "sign-up result arrived after being superseded");
                }
            }
            SignUpOutcome::ConfirmationRequired { email } => {
                info!(email = %email, "sign-up awaiting confirmation; no session committed");
            }
        }
        Ok(outcome)
    }

    /// Start the provider's Google OAuth flow. The session, if the flow
    /// completes, arrives through the provider event channel; an abandoned
    /// or denied flow simply never produces one.
    pub async fn sign_in_with_google(&self) -> SessionResult<()> {
        debug!("google sign-in requested");
        self.provider.sign_in_with_oauth(OAuthProvider::Google).await
    }

    /// Clear the committed session and revoke it with the provider.
    ///
    /// The local clear happens first and sticks even when the provider
    /// call fails: a stale "signed in" UI is worse than a redundant
    /// revocation retry. The failure still propagates so the caller can
    /// surface it. Benign when already signed out.
    pub async fn sign_out(&self) -> SessionResult<()> {
        let generation = self.next_generation();
        debug!(generation, "sign-out requested");
        self.commit(generation, None).await;

        match self.provider.sign_out().await {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!(error = %e, "provider sign-out failed; local session already cleared");
                Err(e)
            }
        }
    }

    /// Apply a provider notification. Events always carry a fresh
    /// generation taken on arrival, so they supersede any operation that
    /// was issued earlier and is still in flight.
    async fn apply_provider_event(&self, event: ProviderEvent) {
        let generation = self.next_generation();
        match event {
            ProviderEvent::SignedIn(session) => {
                debug!(generation, user = %session.user.id, "provider reported sign-in");
                self.commit(generation, Some(session)).await;
            }
            ProviderEvent::TokenRefreshed(session) => {
                debug!(generation, "provider refreshed the session");
                self.commit(generation, Some(session)).await;
            }
            ProviderEvent::SignedOut => {
                debug!(generation, "provider reported sign-out");
                self.commit(generation, None).await;
            }
            ProviderEvent::SessionInvalid { reason } => {
                warn!(generation, reason = %reason, "provider invalidated the session");
                self.commit(generation, None).await;
            }
        }
    }

    /// Replace the committed snapshot if `generation` has not been
    /// superseded. A session that fails its own validity invariant is
    /// committed as absent. Returns whether the commit was applied.
    ///
    /// Change notifications go out before the state lock is released, so
    /// subscribers observe commits in commit order and a snapshot read
    /// after an operation returns always reflects it.
    async fn commit(&self, generation: u64, session: Option<Session>) -> bool {
        let mut state = self.state.write().await;
        if generation <= state.generation {
            debug!(
                generation,
                committed = state.generation,
                "discarding stale commit"
            );
            return false;
        }

        let session = session.filter(|s| {
            if s.is_valid() {
                true
            } else {
                warn!("refusing to commit an invalid session; treating as absent");
                false
            }
        });
        let phase = match session {
            Some(_) => AuthPhase::Authenticated,
            None => AuthPhase::Unauthenticated,
        };

        *state = AuthSnapshot {
            phase,
            session,
            generation,
        };
        let snapshot = state.clone();

        self.changes.publish(snapshot.clone()).await;
        self.callbacks.trigger(snapshot);
        true
    }

    fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        for task in self.tasks.lock().unwrap().drain(..) {
            task.abort();
        }
    }
}
