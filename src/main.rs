use anyhow::{Context, Result};
use tracing::{debug, info, warn};
use tracing_subscriber::{filter::EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use shelfmark::{AppConfig, AuthPhase, SessionCore};

/// Demo driver for the session core: signs in with credentials from the
/// environment, prints every committed snapshot, and signs out again.
#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file if it exists
    let env_file_path = dotenvy::dotenv().ok();

    // Initialize the tracing subscriber for structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            if cfg!(debug_assertions) {
                "shelfmark=debug,warn".into()
            } else {
                "shelfmark=info,warn".into()
            }
        }))
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();

    info!("Shelfmark session core starting");
    match env_file_path {
        Some(path) => info!("Loaded environment variables from {}", path.display()),
        None => debug!("No .env file found. Using existing environment variables."),
    }

    let config = AppConfig::from_env().context("configuration")?;
    let core = SessionCore::from_config(&config).context("session core bootstrap")?;

    // Print every commit the way a UI shell would re-render from it.
    let watcher = core.manager.on_change(|snapshot| {
        let who = snapshot
            .user()
            .map(|u| u.display_name().to_string())
            .unwrap_or_else(|| "nobody".to_string());
        println!("[{:?}] signed in: {}", snapshot.phase, who);
        Ok(())
    });

    // Wait for the initial restore to resolve before doing anything.
    let mut changes = core.manager.subscribe();
    while core.manager.snapshot().await.phase == AuthPhase::Initializing {
        let _ = changes.recv().await;
    }
    info!(phase = ?core.manager.snapshot().await.phase, "session restore resolved");

    let email = std::env::var("SHELFMARK_DEMO_EMAIL").ok();
    let password = std::env::var("SHELFMARK_DEMO_PASSWORD").ok();
    if let (Some(email), Some(password)) = (email, password) {
        info!(email = %email, "signing in with demo credentials");
        match core.manager.sign_in(&email, &password).await {
            Ok(session) => {
                info!(user = %session.user.display_name(), "signed in");
                core.manager.sign_out().await.ok();
                info!("signed out");
            }
            Err(e) => warn!(error = %e, "demo sign-in failed"),
        }
    } else {
        debug!("SHELFMARK_DEMO_EMAIL / SHELFMARK_DEMO_PASSWORD not set; skipping sign-in demo");
    }

    core.manager.remove_callback(watcher);
    core.shutdown();
    Ok(())
}
