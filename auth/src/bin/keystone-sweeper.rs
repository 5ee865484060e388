//! Keystone sweeper
//!
//! Standalone process that purges expired one-time codes, token registry
//! records and blacklist entries from `PostgreSQL`.
//!
//! # Usage
//!
//! ```bash
//! DATABASE_URL=postgres://localhost/keystone cargo run --features postgres --bin keystone-sweeper
//! ```
//!
//! Several instances may run against the same database.

use anyhow::Context;
use keystone_auth::config::SweeperConfig;
use keystone_auth::revocation::RevocationStore;
use keystone_auth::stores::PostgresStores;
use keystone_auth::sweeper::Sweeper;
use keystone_core::environment::SystemClock;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,keystone_auth=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
    let config = SweeperConfig::from_env()?;

    let stores = PostgresStores::connect(&database_url)
        .await
        .context("connecting to PostgreSQL")?;
    stores.migrate().await.context("running migrations")?;
    tracing::info!("Connected to PostgreSQL");

    let revocation = RevocationStore::new(stores.blacklist(), SystemClock);
    let sweeper = Sweeper::new(stores.otp(), stores.tokens(), revocation, SystemClock)
        .with_config(config);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = sweeper.spawn(shutdown_rx);

    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Shutdown signal received"),
        Err(e) => tracing::error!(error = %e, "Unable to listen for shutdown signal"),
    }

    let _ = shutdown_tx.send(true);
    if let Err(e) = handle.await {
        tracing::warn!(error = %e, "Sweeper task ended abnormally");
    }

    Ok(())
}
