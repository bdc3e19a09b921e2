//! Service entry point: configuration, tracing, database pool, and the
//! axum server wired with concrete adapters.

use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use servicesource::adapters::http::{billing_router, BillingAppState};
use servicesource::adapters::postgres::PostgresEntitlementStore;
use servicesource::adapters::stripe::{StripeBillingProvider, StripeConfig};
use servicesource::config::AppConfig;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;
    config.validate()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.server.log_level)),
        )
        .init();

    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .acquire_timeout(config.database.acquire_timeout())
        .connect(&config.database.url)
        .await?;

    if config.database.run_migrations {
        sqlx::migrate!().run(&pool).await?;
        tracing::info!("database migrations applied");
    }

    let stripe_config = StripeConfig::new(
        config.payment.stripe_api_key.clone(),
        config.payment.stripe_webhook_secret.clone(),
    )
    .with_api_timeout(Duration::from_secs(config.payment.stripe_api_timeout_secs));

    let state = BillingAppState {
        entitlement_store: Arc::new(PostgresEntitlementStore::new(pool)),
        billing_provider: Arc::new(StripeBillingProvider::new(stripe_config)),
    };

    let app = billing_router()
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.server.request_timeout_secs,
        )))
        .layer(CorsLayer::permissive());

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(
        %addr,
        environment = ?config.server.environment,
        test_mode = config.payment.is_test_mode(),
        "billing service listening"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
