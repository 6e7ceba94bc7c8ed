//! Integration test harness for the session core.
//! Provides a fixture wiring a scriptable provider to a manager and a
//! subscriber that records every committed snapshot.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::sleep;

use shelfmark::provider::test::TestProvider;
use shelfmark::{AuthPhase, AuthSnapshot, SessionManager};

/// Subscriber that collects committed snapshots for assertions.
pub struct SnapshotLog {
    snapshots: Arc<Mutex<Vec<AuthSnapshot>>>,
}

impl SnapshotLog {
    /// Start collecting commits from the manager in the background.
    pub fn attach(manager: &SessionManager) -> Self {
        let snapshots = Arc::new(Mutex::new(Vec::new()));
        let mut subscriber = manager.subscribe();
        let collected = Arc::clone(&snapshots);
        tokio::spawn(async move {
            while let Ok(snapshot) = subscriber.recv().await {
                collected.lock().await.push(snapshot);
            }
        });
        Self { snapshots }
    }

    pub async fn phases(&self) -> Vec<AuthPhase> {
        self.snapshots.lock().await.iter().map(|s| s.phase).collect()
    }

    pub async fn len(&self) -> usize {
        self.snapshots.lock().await.len()
    }
}

/// A provider/manager pair plus a snapshot log.
pub struct SessionFixture {
    pub provider: Arc<TestProvider>,
    pub manager: Arc<SessionManager>,
    pub log: SnapshotLog,
}

impl SessionFixture {
    /// Build the fixture without starting the manager, so tests can script
    /// the restore before initialization runs.
    pub fn new() -> Self {
        let provider = TestProvider::new();
        let manager = SessionManager::new(provider.clone());
        let log = SnapshotLog::attach(&manager);
        Self {
            provider,
            manager,
            log,
        }
    }

    /// Start the manager and wait for the restore to resolve.
    pub async fn started(self) -> Self {
        self.manager.start();
        assert!(
            self.wait_for(|s| s.phase != AuthPhase::Initializing, 1000).await,
            "session restore never resolved"
        );
        self
    }

    /// Poll the snapshot until the predicate holds or the timeout hits.
    pub async fn wait_for<F>(&self, predicate: F, timeout_ms: u64) -> bool
    where
        F: Fn(&AuthSnapshot) -> bool,
    {
        let deadline = std::time::Instant::now() + Duration::from_millis(timeout_ms);
        while std::time::Instant::now() < deadline {
            if predicate(&self.manager.snapshot().await) {
                return true;
            }
            sleep(Duration::from_millis(5)).await;
        }
        false
    }
}
