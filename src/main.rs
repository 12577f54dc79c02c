use std::sync::Arc;

use axum::{
    routing::{get, post, put},
    Router,
};
use sqlx::postgres::PgPoolOptions;
use tokio::sync::RwLock;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

mod config;
mod db;
mod error;
mod handlers;
mod history;
mod inventory;
mod models;
mod seed;

use crate::config::Config;
use crate::handlers::catalog;
use crate::history::RunHistory;
use crate::inventory::{PgInventoryStore, RebalanceScheduler, Rebalancer, ReplenishmentFiler};
use crate::models::{HospitalService, Medication, Staff, Supplier};

/// Shared application state. Clones share the pool and the Arcs.
#[derive(Clone)]
pub struct AppState {
    pub db: sqlx::PgPool,
    pub config: Arc<Config>,
    pub rebalancer: Arc<Rebalancer>,
    pub history: Arc<RwLock<RunHistory>>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present (ignored in production where env vars are injected)
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,hospital_supply=debug")),
        )
        .with_target(false)
        .compact()
        .init();

    let config = Config::from_env()?;
    info!(
        credit_policy = ?config.stock_credit_policy,
        window_hours = config.requisition_window.num_hours(),
        "Hospital supply service starting"
    );

    info!("Connecting to PostgreSQL...");
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await?;
    info!("Database connection pool established.");

    info!("Running migrations...");
    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Migrations complete.");

    let store = Arc::new(PgInventoryStore::new(pool.clone(), config.delivery_lead));
    let filer = ReplenishmentFiler::new(store.clone(), config.requisition_window, config.retry);
    let rebalancer = Arc::new(Rebalancer::new(store, filer, config.retry));
    let history = Arc::new(RwLock::new(RunHistory::default()));

    let scheduler = config.rebalance_interval.map(|period| {
        let scheduler = RebalanceScheduler::new(rebalancer.clone(), history.clone(), period);
        let shutdown = scheduler.shutdown_handle();
        (scheduler.start(), shutdown)
    });
    if scheduler.is_none() {
        info!("REBALANCE_INTERVAL_SECS is 0, background rebalancing disabled");
    }

    let addr = format!("{}:{}", config.host, config.port);
    let state = AppState {
        db: pool,
        config: Arc::new(config),
        rebalancer,
        history,
    };
    let app = build_router(state);

    info!("Listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("Shutdown signal received");
        })
        .await?;

    if let Some((handle, shutdown)) = scheduler {
        shutdown.notify_one();
        handle.await?;
    }

    Ok(())
}

fn build_router(state: AppState) -> Router {
    Router::new()
        // ── Health ──────────────────────────────────────────────────────────
        .route("/health", get(handlers::health))

        // ── Catalog CRUD ────────────────────────────────────────────────────
        .route(
            "/api/medications",
            get(catalog::list::<Medication>).post(catalog::create_medication),
        )
        .route(
            "/api/medications/:id",
            get(catalog::get_one::<Medication>)
                .put(catalog::update_medication)
                .delete(catalog::delete_one::<Medication>),
        )
        .route(
            "/api/services",
            get(catalog::list::<HospitalService>).post(catalog::create_service),
        )
        .route(
            "/api/services/:id",
            get(catalog::get_one::<HospitalService>)
                .put(catalog::update_service)
                .delete(catalog::delete_one::<HospitalService>),
        )
        .route(
            "/api/suppliers",
            get(catalog::list::<Supplier>).post(catalog::create_supplier),
        )
        .route(
            "/api/suppliers/:id",
            get(catalog::get_one::<Supplier>)
                .put(catalog::update_supplier)
                .delete(catalog::delete_one::<Supplier>),
        )
        .route(
            "/api/staff",
            get(catalog::list::<Staff>).post(catalog::create_staff),
        )
        .route(
            "/api/staff/:id",
            get(catalog::get_one::<Staff>)
                .put(catalog::update_staff)
                .delete(catalog::delete_one::<Staff>),
        )

        // ── Stock ───────────────────────────────────────────────────────────
        .route(
            "/api/stock",
            get(handlers::stock::list_stock).post(handlers::stock::upsert_level),
        )
        .route("/api/stock/add", put(handlers::stock::add_stock))
        .route("/api/stock/remove", put(handlers::stock::remove_stock))
        .route("/api/stock/minimum", put(handlers::stock::set_minimum))
        .route("/api/stock/transfers", get(handlers::stock::list_transfers))
        .route(
            "/api/stock/service/:service_id",
            get(handlers::stock::stock_for_service),
        )
        .route(
            "/api/stock/:medication_id/:service_id",
            get(handlers::stock::get_level),
        )

        // ── Requisitions ────────────────────────────────────────────────────
        .route(
            "/api/requisitions",
            get(handlers::requisitions::list_requisitions)
                .post(handlers::requisitions::create_requisition),
        )
        .route(
            "/api/requisitions/pending-approval",
            get(handlers::requisitions::pending_approval),
        )
        .route(
            "/api/requisitions/service/:service_id",
            get(handlers::requisitions::requisitions_for_service),
        )
        .route(
            "/api/requisitions/:id",
            get(handlers::requisitions::get_requisition)
                .delete(handlers::requisitions::delete_requisition),
        )
        .route("/api/requisitions/:id/approve", put(handlers::requisitions::approve))
        .route("/api/requisitions/:id/fulfill", put(handlers::requisitions::fulfill))
        .route("/api/requisitions/:id/complete", put(handlers::requisitions::complete))
        .route("/api/requisitions/:id/cancel", put(handlers::requisitions::cancel))

        // ── Alerts ──────────────────────────────────────────────────────────
        .route("/api/alerts", get(handlers::alerts::alerts))

        // ── Stock balancer ──────────────────────────────────────────────────
        .route("/api/stock-balancer/balance", post(handlers::rebalance::balance))
        .route("/api/stock-balancer/history", get(handlers::rebalance::history))
        .route(
            "/api/stock-balancer/history/csv",
            get(handlers::rebalance::history_csv),
        )

        // ── Seed ────────────────────────────────────────────────────────────
        .route("/api/seed", post(handlers::seed::seed_data))

        // ── Middleware ──────────────────────────────────────────────────────
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
