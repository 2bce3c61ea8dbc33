use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;

use clap::Parser;
use monolith::{
    app::{build_app, serve},
    auth::{password::Argon2Hasher, AuthService},
    cli::{self, Cli, Command},
    config::AppConfig,
    db::{self, Pools},
    state::AppState,
    store::SqliteStore,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "monolith=debug,axum=info,tower_http=info,sqlx=warn".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let args = Cli::parse();
    match args.command {
        Command::Server => run_server().await,
        Command::Migrate { direction } => {
            let config = AppConfig::from_env().context("load configuration")?;
            cli::migrate(config.database, &direction)
                .await
                .with_context(|| format!("migrate {direction:?}"))
        }
        Command::Info => {
            let info = db::engine_info().await.context("query sqlite engine")?;
            cli::write_info(&mut std::io::stdout().lock(), &info)?;
            Ok(())
        }
    }
}

async fn run_server() -> anyhow::Result<()> {
    let config = AppConfig::from_env().context("load configuration")?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "hello from monolith");

    let pools = Pools::open(&config.database)
        .await
        .context("open database pools")?;
    pools.migrate().await.context("apply migrations")?;

    let hasher = Argon2Hasher::new(&config.hasher).context("configure password hasher")?;
    let store = Arc::new(SqliteStore::new(pools.clone()));
    let service = Arc::new(AuthService::new(store, hasher));

    let shutdown = CancellationToken::new();
    tokio::spawn(watch_signals(shutdown.clone()));

    let app = build_app(AppState::new(service, shutdown.clone()));
    let result = serve(app, config.addr()?, shutdown).await;

    pools.close().await;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "goodbye from monolith");
    result
}

async fn watch_signals(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received SIGINT"),
        _ = terminate => tracing::info!("received SIGTERM"),
    }
    tracing::info!("gracefully shutting down the server");
    shutdown.cancel();
}
