//! `stockdash-watch` -- terminal job watcher.
//!
//! Restores (or creates) a session, verifies it with the identity service,
//! starts the job sync engine and logs every sync event until Ctrl-C.
//! Optionally submits one job on startup.
//!
//! # Environment variables
//!
//! Everything [`ClientConfig::from_env`] reads, plus:
//!
//! | Variable             | Required | Description                                   |
//! |----------------------|----------|-----------------------------------------------|
//! | `STOCKDASH_EMAIL`    | no       | Log in with these credentials when needed     |
//! | `STOCKDASH_PASSWORD` | no       | Password for `STOCKDASH_EMAIL`                |
//! | `STOCKDASH_SUBMIT`   | no       | Text to submit as a new job after start       |

use std::sync::Arc;

use stockdash_client::sync::NoticeLevel;
use stockdash_client::{
    ClientConfig, FileSessionStore, JobSyncEngine, SessionManager, SyncEvent,
};
use stockdash_core::session::Session;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stockdash_client=info,stockdash_watch=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ClientConfig::from_env();
    tracing::info!(
        user_api = %config.user_api_url,
        job_api = %config.job_api_url,
        job_ws = %config.job_ws_url,
        "Starting stockdash-watch",
    );

    let store = Arc::new(FileSessionStore::new(&config.session_dir));
    let manager = SessionManager::new(&config, store).unwrap_or_else(|e| {
        tracing::error!(error = %e, "Failed to build HTTP client");
        std::process::exit(1);
    });

    let session = establish_session(&manager).await.unwrap_or_else(|| {
        tracing::error!("No valid session; set STOCKDASH_EMAIL and STOCKDASH_PASSWORD");
        std::process::exit(1);
    });
    tracing::info!(user_id = session.id, email = %session.email, "Signed in");

    let engine = JobSyncEngine::connect(&config, &session)
        .await
        .unwrap_or_else(|e| {
            tracing::error!(error = %e, "Failed to start job sync engine");
            std::process::exit(1);
        });
    let mut events = engine.subscribe();

    if let Ok(text) = std::env::var("STOCKDASH_SUBMIT") {
        match engine.submit(&text).await {
            Ok(job_id) => tracing::info!(job_id = %job_id, "Submitted job"),
            Err(e) => tracing::error!(error = %e, "Failed to submit job"),
        }
    }

    for job in engine.jobs().await {
        tracing::info!(
            job_id = %job.job_id,
            status = %job.status,
            progress = job.progress,
            "Tracking job",
        );
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received Ctrl-C, stopping");
                break;
            }
            event = events.recv() => match event {
                Ok(event) => log_event(&event),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event stream lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    }

    engine.shutdown().await;
}

/// Restore the persisted session and check it; log in again when it is
/// missing or rejected and credentials are available.
async fn establish_session(manager: &SessionManager) -> Option<Session> {
    if let Some(session) = manager.restore().await {
        if manager.verify_token().await {
            return Some(session);
        }
        tracing::warn!("Persisted session rejected, signing out");
        manager.sign_out().await;
    }

    let email = std::env::var("STOCKDASH_EMAIL").ok()?;
    let password = std::env::var("STOCKDASH_PASSWORD").ok()?;
    match manager.login(&email, &password).await {
        Ok(session) => Some(session),
        Err(e) => {
            tracing::error!(error = %e, "Login failed");
            None
        }
    }
}

fn log_event(event: &SyncEvent) {
    match event {
        SyncEvent::JobUpdated { job, source } => tracing::info!(
            job_id = %job.job_id,
            status = %job.status,
            progress = job.progress,
            worker = ?job.worker_id,
            ?source,
            "Job updated",
        ),
        SyncEvent::JobCreated { job } => {
            tracing::info!(job_id = %job.job_id, text = ?job.search_text, "Job created");
        }
        SyncEvent::JobDeleted { job_id } => tracing::info!(job_id = %job_id, "Job deleted"),
        SyncEvent::Cleared => tracing::info!("All jobs cleared"),
        SyncEvent::Notice {
            level: NoticeLevel::Info,
            message,
        } => tracing::info!("{message}"),
        SyncEvent::Notice {
            level: NoticeLevel::Error,
            message,
        } => tracing::warn!("{message}"),
        SyncEvent::ConnectionChanged { state } => {
            tracing::info!(?state, "Push channel state");
        }
    }
}
