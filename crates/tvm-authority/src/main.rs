//! TVM Authority Server Binary
//!
//! Runs the ticket-vending authority HTTP server.

use std::env;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use tvm_authority::{
    create_router, AppState, AuthorityConfig, GrantStore, MemoryStore, MokaTicketCache,
    ServiceStore,
};
use tvm_core::Ed25519KeyManager;

/// Read an integer environment variable, falling back when unset
fn env_u64(name: &str) -> Result<Option<u64>, String> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| format!("{} must be a non-negative integer, got '{}'", name, raw)),
        Err(_) => Ok(None),
    }
}

fn load_config() -> Result<AuthorityConfig, String> {
    let mut config = AuthorityConfig::default();

    if let Some(secs) = env_u64("TVM_TICKET_TTL_SECS")? {
        config = config.with_ticket_ttl(Duration::from_secs(secs));
    }
    if let Some(secs) = env_u64("TVM_ROTATION_GRACE_SECS")? {
        config = config.with_rotation_grace(Duration::from_secs(secs));
    }
    if let Some(ms) = env_u64("TVM_STORE_TIMEOUT_MS")? {
        config = config.with_store_timeout(Duration::from_millis(ms));
    }

    config.validate().map_err(|e| e.to_string())?;
    Ok(config)
}

#[cfg(feature = "postgres")]
async fn open_stores() -> Result<(Arc<dyn ServiceStore>, Arc<dyn GrantStore>), String> {
    match env::var("TVM_DATABASE_URL") {
        Ok(url) => {
            let store = Arc::new(
                tvm_authority::PostgresStore::new(&url)
                    .await
                    .map_err(|e| format!("database setup failed: {}", e))?,
            );
            info!("Using PostgreSQL store");
            let services: Arc<dyn ServiceStore> = store.clone();
            let grants: Arc<dyn GrantStore> = store;
            Ok((services, grants))
        }
        Err(_) => Ok(memory_stores()),
    }
}

#[cfg(not(feature = "postgres"))]
async fn open_stores() -> Result<(Arc<dyn ServiceStore>, Arc<dyn GrantStore>), String> {
    Ok(memory_stores())
}

fn memory_stores() -> (Arc<dyn ServiceStore>, Arc<dyn GrantStore>) {
    info!("Using in-memory store; state is lost on restart");
    let store = Arc::new(MemoryStore::new());
    let services: Arc<dyn ServiceStore> = store.clone();
    let grants: Arc<dyn GrantStore> = store;
    (services, grants)
}

async fn run() -> Result<(), String> {
    let port: u16 = env::var("TVM_PORT")
        .unwrap_or_else(|_| "8080".into())
        .parse()
        .map_err(|_| "TVM_PORT must be a valid port number".to_string())?;

    let config = load_config()?;
    let (services, grants) = open_stores().await?;
    let cache = Arc::new(MokaTicketCache::new(config.cache_capacity));

    info!(
        port,
        ticket_ttl_secs = config.ticket_ttl.as_secs(),
        rotation_grace_secs = config.rotation_grace.as_secs(),
        store_timeout_ms = config.store_timeout.as_millis() as u64,
        "Starting TVM authority"
    );

    let state = AppState::build(
        services,
        grants,
        Arc::new(Ed25519KeyManager::new()),
        cache,
        config,
    )
    .map_err(|e| e.to_string())?;

    let app = create_router(Arc::new(state));

    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| format!("failed to bind {}: {}", addr, e))?;

    info!(addr = %addr, "TVM authority listening");

    axum::serve(listener, app)
        .await
        .map_err(|e| format!("server error: {}", e))
}

#[tokio::main]
async fn main() -> ExitCode {
    let log_level = env::var("TVM_LOG_LEVEL")
        .unwrap_or_else(|_| "info".into())
        .parse()
        .unwrap_or(Level::INFO);

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(true)
        .with_thread_ids(true)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("failed to set tracing subscriber: {}", e);
        return ExitCode::FAILURE;
    }

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "TVM authority exited");
            ExitCode::FAILURE
        }
    }
}
