use fulfillment::api::Server;
use fulfillment::batch::BatchOrchestrator;
use fulfillment::config::Config;
use fulfillment::notify::ChannelNotifier;
use fulfillment::store::SqliteStore;
use std::sync::Arc;
use tracing::info;

/// Entry point: initializes logging, loads configuration, connects the
/// store, wires the orchestrator and notification drain, and starts the API
/// server.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config = Config::load("config/default.toml")?;
    info!("fulfillment scheduler starting with config: {:?}", config);

    let store = Arc::new(SqliteStore::connect(&config.database.url).await?);

    // Order-status events flow out through this channel; the drain task
    // stands in for the external notification publisher.
    let (notifier, mut events) = ChannelNotifier::new();
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            info!(
                order_id = %event.order_id,
                display_id = %event.display_id,
                status = %event.status,
                "order status changed"
            );
        }
    });

    let orchestrator = Arc::new(BatchOrchestrator::new(store, Arc::new(notifier)));

    let server = Server::new(config, orchestrator);
    server.start().await?;

    Ok(())
}
