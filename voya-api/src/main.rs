use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use voya_api::{app, AppState};
use voya_core::{SystemClock, WaitlistRepository};
use voya_shared::models::events::Notification;
use voya_store::app_config::Config;
use voya_store::{
    BroadcastNotifier, DbClient, FanoutNotifier, InMemoryWaitlistRepository, LogNotifier,
    PgWaitlistRepository,
};
use voya_waitlist::{ExpirySweeper, RetryPolicy, WaitlistService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "voya_api=debug,voya_waitlist=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting Voya waitlist API on port {}", config.server.port);

    let repo: Arc<dyn WaitlistRepository> = match &config.database {
        Some(db) => {
            let client = DbClient::new(&db.url, db.max_connections)
                .await
                .context("Failed to connect to Postgres")?;
            client.migrate().await.context("Failed to run migrations")?;
            Arc::new(PgWaitlistRepository::new(client.pool.clone()))
        }
        None => {
            tracing::warn!("No database configured, state lives in memory and is lost on restart");
            Arc::new(InMemoryWaitlistRepository::new())
        }
    };

    // SSE Broadcast Channel
    let (sse_tx, _) = broadcast::channel(256);
    let notifier = build_notifier(&config, sse_tx.clone())?;

    let rules = &config.waitlist;
    let service = WaitlistService::new(repo, Arc::new(notifier), Arc::new(SystemClock))
        .with_policy(rules.allocation_policy())
        .with_retry(RetryPolicy::new(
            rules.conflict_retry_attempts,
            Duration::from_millis(rules.conflict_retry_backoff_ms),
        ));
    let service = Arc::new(service);

    let sweeper = ExpirySweeper::new(service.clone(), rules.sweep_interval()).spawn();

    let app = app(AppState { service, sse_tx });

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweeper.shutdown_and_join().await;
    tracing::info!("Shut down cleanly");
    Ok(())
}

fn build_notifier(
    config: &Config,
    sse_tx: broadcast::Sender<Notification>,
) -> anyhow::Result<FanoutNotifier> {
    let notifier = FanoutNotifier::default()
        .with(Arc::new(LogNotifier))
        .with(Arc::new(BroadcastNotifier::new(sse_tx)));

    #[cfg(feature = "kafka")]
    let notifier = match &config.kafka {
        Some(kafka) => {
            tracing::info!("Publishing notifications to Kafka topic {}", kafka.topic);
            let producer = voya_store::KafkaNotifier::new(&kafka.brokers, kafka.topic.clone())
                .context("Failed to create Kafka producer")?;
            notifier.with(Arc::new(producer))
        }
        None => notifier,
    };

    #[cfg(not(feature = "kafka"))]
    {
        if config.kafka.is_some() {
            tracing::warn!(
                "Kafka is configured but this build has no `kafka` feature; ignoring it"
            );
        }
    }

    Ok(notifier)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
