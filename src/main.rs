//! community-support - subscription lifecycle service
//!
//! - Serves the subscription API and provider webhooks over HTTP
//! - Applies `migrations/` on startup when configured
//! - Purges the webhook dedup ledger on an interval

use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::EnvFilter;

use community_support::adapters::http::{app, SubscriptionAppState};
use community_support::adapters::postgres::{
    PostgresCommunityDirectory, PostgresSubscriptionReader, PostgresSubscriptionRepository,
    PostgresWebhookEventRepository,
};
use community_support::adapters::stripe::{
    StripeConfig, StripePaymentAdapter, StripeWebhookNormalizer,
};
use community_support::application::{PersistRetry, PurgeWebhookEventsHandler};
use community_support::config::AppConfig;
use community_support::domain::foundation::Timestamp;
use community_support::ports::{NormalizerRegistry, ProviderRegistry};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let config = AppConfig::load()?;
    config.validate()?;

    init_tracing(&config);
    tracing::info!(
        environment = ?config.server.environment,
        stripe_test_mode = config.payment.is_test_mode(),
        "Starting community-support"
    );

    let pool = PgPoolOptions::new()
        .min_connections(config.database.min_connections)
        .max_connections(config.database.max_connections)
        .acquire_timeout(config.database.connect_timeout())
        .connect(&config.database.url)
        .await?;

    if config.database.run_migrations {
        sqlx::migrate!("./migrations").run(&pool).await?;
        tracing::info!("Migrations applied");
    }

    let stripe = StripePaymentAdapter::new(
        StripeConfig::new(config.payment.stripe_api_key.clone())
            .with_base_url(config.payment.stripe_api_base_url.clone())
            .with_timeout(config.payment.provider_timeout()),
    )?;
    let normalizer = StripeWebhookNormalizer::new(config.payment.stripe_webhook_secret.clone())
        .with_tolerance_secs(config.webhooks.signature_tolerance_secs)
        .with_require_livemode(config.payment.require_livemode);

    let ledger = Arc::new(PostgresWebhookEventRepository::new(pool.clone()));
    let state = SubscriptionAppState {
        repository: Arc::new(PostgresSubscriptionRepository::new(pool.clone())),
        reader: Arc::new(PostgresSubscriptionReader::new(pool.clone())),
        directory: Arc::new(PostgresCommunityDirectory::new(pool.clone())),
        ledger: ledger.clone(),
        providers: ProviderRegistry::new().with(Arc::new(stripe)),
        normalizers: NormalizerRegistry::new().with(Arc::new(normalizer)),
        retry: PersistRetry::default(),
    };

    // Periodic ledger purge
    let purge = PurgeWebhookEventsHandler::new(ledger, config.webhooks.retention_days);
    let purge_interval = config.webhooks.purge_interval();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(purge_interval);
        loop {
            interval.tick().await;
            if let Err(e) = purge.handle(Timestamp::now()).await {
                tracing::warn!(error = %e, "Webhook ledger purge failed");
            }
        }
    });

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "HTTP listening");

    axum::serve(listener, app(state, config.server.request_timeout()))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shut down");
    Ok(())
}

/// JSON lines in production, human-readable output elsewhere.
fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.server.log_level));

    if config.is_production() {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().pretty().with_env_filter(filter).init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
}
