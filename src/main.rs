use std::sync::Arc;

use axum::Router;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use anyhow::Context;
use clap::Parser;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use jobharvest::config::{Command, Config};
use jobharvest::db;
use jobharvest::fetch::FetchChain;
use jobharvest::routes::{self, AppState};
use jobharvest::runner::SourceRunner;
use jobharvest::scheduler::{Scheduler, interval_to_cron};
use jobharvest::store::PgStore;

async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn readyz(pool: PgPool) -> impl IntoResponse {
    let result: Result<(i32,), _> = sqlx::query_as("SELECT 1").fetch_one(&pool).await;
    match result {
        Ok(_) => (StatusCode::OK, "ready"),
        Err(_) => (StatusCode::SERVICE_UNAVAILABLE, "not ready"),
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("jobharvest=info,tower_http=info"));
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();
    init_tracing(config.log_json);

    let command = config.resolved_command();
    if let Command::SchedulePreview { minutes } = command {
        println!("{}", interval_to_cron(minutes));
        return Ok(());
    }

    let database_url = config
        .database_url()
        .context("DATABASE_URL is required to serve or scrape")?;
    tracing::info!("Connecting to database...");
    let pool = db::create_pool(database_url).await?;

    if config.run_migrations {
        tracing::info!("Running database migrations...");
        db::run_migrations(&pool).await?;
        tracing::info!("Migrations complete");
    }

    let pipeline = Arc::new(config.pipeline.clone());
    let chain = FetchChain::from_config(&pipeline)?;
    tracing::info!(strategies = ?chain.available(), "Fetch chain ready");
    let store = Arc::new(PgStore::new(pool.clone()));
    let runner = Arc::new(SourceRunner::new(store, chain, pipeline.clone()));

    match command {
        Command::Scrape { source_id } => {
            let result = runner.trigger(source_id).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
        Command::Serve { listen_addr } => serve(&config, pool, runner, &listen_addr).await,
        Command::SchedulePreview { .. } => Ok(()),
    }
}

async fn serve(
    config: &Config,
    pool: PgPool,
    runner: Arc<SourceRunner>,
    listen_addr: &str,
) -> anyhow::Result<()> {
    let scheduler = Arc::new(Scheduler::new(runner).await?);
    let report = scheduler.reconcile().await?;
    tracing::info!(created = report.created.len(), "Initial schedule reconciled");
    scheduler.start().await?;

    let shutdown = CancellationToken::new();
    let reconcile_loop =
        scheduler.spawn_reconcile_loop(config.pipeline.reconcile_interval(), shutdown.clone());

    let state = AppState::new(scheduler.clone(), config.admin_token.as_deref());
    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(move || readyz(pool.clone())))
        .merge(routes::api::router(state))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        );

    let listener = tokio::net::TcpListener::bind(listen_addr).await?;
    tracing::info!("Listening on {listen_addr}");

    let signal = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {e}");
            }
            tracing::info!("Shutdown requested");
            signal.cancel();
        })
        .await?;

    shutdown.cancel();
    if let Err(e) = reconcile_loop.await {
        tracing::error!("Reconcile loop ended abnormally: {e}");
    }
    for pass in scheduler.runner().running() {
        scheduler.runner().cancel(pass.source_id);
    }
    scheduler.shutdown().await?;

    Ok(())
}
