//! End-to-end flows through the session manager: bootstrap, sign-in,
//! provider-driven changes, and teardown, observed the way a UI shell
//! would observe them.

use std::time::Duration;

use tokio::time::sleep;

use shelfmark::provider::test::TestProvider;
use shelfmark::{AuthPhase, ProviderEvent, SessionError};

use crate::test_harness::SessionFixture;

#[tokio::test]
async fn full_password_lifecycle() {
    let fixture = SessionFixture::new().started().await;
    assert_eq!(
        fixture.manager.snapshot().await.phase,
        AuthPhase::Unauthenticated
    );

    fixture
        .provider
        .queue_sign_in(Ok(TestProvider::session_for("a@example.com")))
        .await;
    let session = fixture
        .manager
        .sign_in("a@example.com", "pw123456")
        .await
        .unwrap();
    assert_eq!(session.user.email.as_deref(), Some("a@example.com"));
    assert_eq!(
        fixture.manager.snapshot().await.phase,
        AuthPhase::Authenticated
    );

    fixture.manager.sign_out().await.unwrap();
    assert_eq!(
        fixture.manager.snapshot().await.phase,
        AuthPhase::Unauthenticated
    );

    // The log saw resolve, sign-in, and sign-out as distinct commits in
    // order, with no torn intermediate state.
    sleep(Duration::from_millis(50)).await;
    assert_eq!(
        fixture.log.phases().await,
        vec![
            AuthPhase::Unauthenticated,
            AuthPhase::Authenticated,
            AuthPhase::Unauthenticated,
        ]
    );
}

#[tokio::test]
async fn remote_sign_out_reaches_every_observer() {
    let fixture = SessionFixture::new();
    fixture
        .provider
        .queue_restore(Ok(Some(TestProvider::session_for("a@example.com"))))
        .await;
    let fixture = fixture.started().await;
    assert_eq!(
        fixture.manager.snapshot().await.phase,
        AuthPhase::Authenticated
    );

    // Sign-out from another device arrives over the event channel.
    fixture.provider.emit(ProviderEvent::SignedOut).await;
    assert!(
        fixture
            .wait_for(|s| s.phase == AuthPhase::Unauthenticated, 1000)
            .await
    );
    assert!(fixture.manager.snapshot().await.session.is_none());
}

#[tokio::test]
async fn token_rotation_is_visible_to_call_sites_immediately() {
    let fixture = SessionFixture::new();
    fixture
        .provider
        .queue_restore(Ok(Some(TestProvider::session_for("a@example.com"))))
        .await;
    let fixture = fixture.started().await;

    let mut rotated = TestProvider::session_for("a@example.com");
    rotated.access_token = "token-rotated".into();
    fixture
        .provider
        .emit(ProviderEvent::TokenRefreshed(rotated))
        .await;

    assert!(
        fixture
            .wait_for(|s| s.access_token() == Some("token-rotated"), 1000)
            .await
    );
}

#[tokio::test]
async fn failed_sign_in_is_inline_feedback_not_a_state_change() {
    let fixture = SessionFixture::new().started().await;
    let commits_before = fixture.log.len().await;

    fixture
        .provider
        .queue_sign_in(Err(SessionError::InvalidCredentials))
        .await;
    let err = fixture
        .manager
        .sign_in("a@example.com", "wrong")
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::InvalidCredentials));

    sleep(Duration::from_millis(50)).await;
    assert_eq!(fixture.log.len().await, commits_before);
}

#[tokio::test]
async fn shutdown_releases_the_provider_subscription() {
    let fixture = SessionFixture::new().started().await;
    fixture.manager.shutdown();

    // Events emitted after shutdown no longer reach the manager.
    fixture
        .provider
        .emit(ProviderEvent::SignedIn(TestProvider::session_for(
            "late@example.com",
        )))
        .await;
    sleep(Duration::from_millis(100)).await;
    assert_eq!(
        fixture.manager.snapshot().await.phase,
        AuthPhase::Unauthenticated
    );
}
