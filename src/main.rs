use std::sync::Arc;

use modwatch::bus::MessageBus;
use modwatch::classifier::build_classifier;
use modwatch::config::AppConfig;
use modwatch::notify::{ApiState, NotificationHub, api_routes};
use modwatch::pipeline::{
    ClassificationStage, IngestionStage, StatsTracker, register_consumers,
};
use modwatch::store::{LibSqlStore, Storage, seed_defaults};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = AppConfig::from_env()?;

    eprintln!("🛡  Modwatch v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   WS:  ws://0.0.0.0:{}/ws", config.port);
    eprintln!("   API: http://0.0.0.0:{}/api", config.port);

    // ── Storage ─────────────────────────────────────────────────────
    let store: Arc<dyn Storage> = Arc::new(
        LibSqlStore::open(std::path::Path::new(&config.db_path))
            .await
            .unwrap_or_else(|e| {
                eprintln!("Error: Failed to open database at {}: {}", config.db_path, e);
                std::process::exit(1);
            }),
    );
    seed_defaults(&store).await?;
    eprintln!("   Database: {}", config.db_path);

    // ── Classifier ──────────────────────────────────────────────────
    let classifier = build_classifier(config.llm.as_ref())?;
    eprintln!("   Classifier: {}", classifier.name());

    // ── Pipeline ────────────────────────────────────────────────────
    let bus = Arc::new(MessageBus::new());
    let hub = NotificationHub::new_shared();
    let stats = Arc::new(StatsTracker::new(Arc::clone(&store)));

    let ingestion = Arc::new(IngestionStage::new(
        Arc::clone(&store),
        Arc::clone(&bus),
        Arc::clone(&stats),
    ));
    let classification = Arc::new(ClassificationStage::new(
        Arc::clone(&store),
        classifier,
        Arc::clone(&stats),
        Arc::clone(&hub),
        config.sync_page_size,
    ));
    register_consumers(&bus, Arc::clone(&ingestion), classification).await;

    // ── HTTP/WS server ──────────────────────────────────────────────
    let state = ApiState {
        store,
        hub,
        ingestion,
        bus,
        sync_page_size: config.sync_page_size,
        heartbeat_interval: config.heartbeat_interval,
        max_missed_probes: config.max_missed_probes,
        feed_url: config.feed_url.clone(),
    };
    let app = api_routes(state);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port)).await?;
    tracing::info!(port = config.port, "Modwatch server started");
    axum::serve(listener, app).await?;

    Ok(())
}
