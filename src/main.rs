use anyhow::{Error, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

use notify_service::{
    clients::{
        database::DatabaseClient, notify::NotifyClient, queue::HttpQueueClient,
        state_store::RedisStateStore,
    },
    config::Config,
    pipeline,
};

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::load()?;

    info!("Notification dispatch service triggered by scheduler");

    let queue_client = HttpQueueClient::new(&config)?;
    let state_store = RedisStateStore::connect(&config).await?;
    let notify_client = NotifyClient::new(&config)?;
    let database_client = match &config.database_url {
        Some(database_url) => Some(DatabaseClient::connect(database_url).await?),
        None => None,
    };

    pipeline::run(
        &config,
        &queue_client,
        &state_store,
        &notify_client,
        database_client.as_ref(),
    )
    .await
}
