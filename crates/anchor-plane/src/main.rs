//! Anchor Plane Server Binary
//!
//! Runs the anchor ledger HTTP server and its token expiry sweep.

use anchor_core::{Clock, StaticKeyProvider, SystemClock};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::FmtSubscriber;

use anchor_plane::{
    create_router, storage, AccessTokenIssuer, AnchorLedger, AppState, LocalProvisioner,
    PlaneConfig, StaticMfaDirectory,
};

#[tokio::main]
async fn main() -> ExitCode {
    let config = match PlaneConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("anchor-plane: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(config.log_level)
        .with_target(true)
        .with_thread_ids(true)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("anchor-plane: failed to set tracing subscriber: {}", e);
        return ExitCode::FAILURE;
    }

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Anchor plane stopped");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: PlaneConfig) -> Result<(), Box<dyn std::error::Error>> {
    let store = storage::open(&config.store).await?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let keys = Arc::new(StaticKeyProvider::new(config.signing_secret.clone()));

    let ledger = Arc::new(
        AnchorLedger::new(store, keys, clock.clone())
            .with_append_attempts(config.append_attempts),
    );

    let mfa = match &config.mfa_enrolled {
        Some(subjects) => StaticMfaDirectory::with_enrolled(subjects.iter().cloned()),
        None => {
            warn!("ANCHOR_PLANE_MFA_ENROLLED unset, every subject is treated as MFA-enrolled");
            StaticMfaDirectory::allow_all()
        }
    };
    let issuer = Arc::new(AccessTokenIssuer::new(
        ledger.clone(),
        Arc::new(mfa),
        Arc::new(LocalProvisioner),
        config.issuer_policy(),
    ));

    if let Some(period) = config.sweep_interval {
        let issuer = issuer.clone();
        let clock = clock.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                issuer.sweep(clock.now_ms());
            }
        });
    }

    info!(
        store = config.store.name(),
        height = ledger.height().await?,
        port = config.port,
        "Starting anchor plane server"
    );

    let state = Arc::new(AppState::new(ledger, issuer));
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!(addr = %addr, "Anchor plane listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Anchor plane shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
