use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use mintour_api::{app, middleware::JwtIdentity, AppState, Backends, Settings};
use mintour_store::app_config::Config;
use mintour_store::{
    DbClient, StoreCartRepository, StoreOrderRepository, StoreProductRepository,
    TossPaymentsClient,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "mintour_api=debug,mintour_order=debug,tower_http=debug,axum::rejection=trace"
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting Mintour API on port {}", config.server.port);

    let db = DbClient::new(&config.database)
        .await
        .context("Failed to connect to Postgres")?;
    db.migrate().await.context("Failed to run migrations")?;

    let gateway =
        TossPaymentsClient::new(&config.payments).context("Failed to build payment client")?;
    let identity = JwtIdentity::from_config(&config.auth)?;

    let backends = Backends {
        carts: Arc::new(StoreCartRepository::new(db.pool.clone())),
        products: Arc::new(StoreProductRepository::new(db.pool.clone())),
        orders: Arc::new(StoreOrderRepository::new(db.pool.clone())),
        gateway: Arc::new(gateway),
    };
    let state = AppState::new(backends, Arc::new(identity), Settings::from_config(&config));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app(state)).await?;

    Ok(())
}
