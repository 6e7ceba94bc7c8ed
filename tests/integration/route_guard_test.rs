//! Route-guard behavior across the whole session lifecycle, including the
//! initialization window.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;

use shelfmark::provider::test::TestProvider;
use shelfmark::{AuthPhase, RouteDecision, RouteGuard};

use crate::test_harness::SessionFixture;

#[tokio::test]
async fn loading_for_the_entire_initializing_window() {
    let fixture = SessionFixture::new();
    let release = fixture.provider.hold_next_restore().await;
    fixture.manager.start();
    let guard = RouteGuard::new(Arc::clone(&fixture.manager));

    // For as long as the restore is in flight, the guard never renders
    // protected content and never redirects, on any screen.
    for _ in 0..10 {
        assert_eq!(guard.decide(false).await, RouteDecision::ShowLoading);
        assert_eq!(guard.decide(true).await, RouteDecision::ShowLoading);
        sleep(Duration::from_millis(10)).await;
    }

    release.send(()).unwrap();
    assert!(
        fixture
            .wait_for(|s| s.phase == AuthPhase::Unauthenticated, 1000)
            .await
    );
    assert_eq!(
        guard.decide(false).await,
        RouteDecision::RedirectToLogin { replace: true }
    );
}

#[tokio::test]
async fn signed_in_users_are_sent_away_from_login() {
    let fixture = SessionFixture::new();
    fixture
        .provider
        .queue_restore(Ok(Some(TestProvider::session_for("a@example.com"))))
        .await;
    let fixture = fixture.started().await;
    let guard = RouteGuard::new(Arc::clone(&fixture.manager));

    assert_eq!(guard.decide(false).await, RouteDecision::Render);
    assert_eq!(
        guard.decide(true).await,
        RouteDecision::RedirectToApp { replace: true }
    );
}

#[tokio::test]
async fn signing_out_flips_the_guard_decision() {
    let fixture = SessionFixture::new();
    fixture
        .provider
        .queue_restore(Ok(Some(TestProvider::session_for("a@example.com"))))
        .await;
    let fixture = fixture.started().await;
    let guard = RouteGuard::new(Arc::clone(&fixture.manager));
    assert_eq!(guard.decide(false).await, RouteDecision::Render);

    fixture.manager.sign_out().await.unwrap();
    assert_eq!(
        guard.decide(false).await,
        RouteDecision::RedirectToLogin { replace: true }
    );
}
