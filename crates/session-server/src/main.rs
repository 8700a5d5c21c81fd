use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use session_core::ExpiryReconciler;
use session_infrastructure::{
    create_pool, create_redis_pool, run_migrations, PgSessionLedger, RedisExpiryFeed,
    RedisSessionCache,
};
use session_server::{router, state::AppState};
use session_shared::config::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env
    dotenvy::dotenv().ok();

    // Load configuration (telemetry depends on it)
    let config = match AppConfig::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    session_shared::telemetry::init_telemetry(&config.log)?;
    info!("{} starting ({})...", config.app.name, config.app.env);

    // Durable ledger
    info!("Connecting to database...");
    let pool = create_pool(&config.database).await?;
    run_migrations(&pool).await?;
    info!("Database connection established, migrations applied.");

    // Cache and expiry notifications
    let redis_pool = create_redis_pool(&config.redis)?;
    let cache = Arc::new(RedisSessionCache::new(redis_pool));
    let ledger = Arc::new(PgSessionLedger::new(pool));
    let feed = Arc::new(RedisExpiryFeed::new(&config.redis)?);

    let reconciler = ExpiryReconciler::new(
        cache,
        ledger,
        feed,
        config.reconciler.clone(),
        &config.session,
    );
    let state = AppState::new(config.app.name.clone(), reconciler.health());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let reconciler_task = tokio::spawn(reconciler.run(shutdown_rx));

    let app = router(state).layer(TraceLayer::new_for_http());

    let host: std::net::IpAddr = config.app.host.parse()?;
    let addr = SocketAddr::from((host, config.app.port));
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("HTTP server stopped, stopping expiry reconciler...");
    let _ = shutdown_tx.send(true);
    if let Err(e) = reconciler_task.await {
        error!("Expiry reconciler task failed: {}", e);
    }

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("Received shutdown signal");
}
