use anyhow::Context;
use std::{net::SocketAddr, sync::Arc, time::Instant};
use tracing_subscriber::EnvFilter;

use traffic_risk::{
    api::{self, AppState},
    config::Settings,
    rate_limit::{RateLimiter, PURGE_INTERVAL},
    types::FeatureVector,
    SqliteStore, TrafficModel, TrafficService,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load()?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.log_level.to_lowercase()));
    tracing_subscriber::fmt().with_env_filter(filter).init();
    tracing::info!("starting {} with {:?}", settings.app_name, settings);

    let store = SqliteStore::open_location(&settings.database_path)
        .with_context(|| format!("failed to open prediction store at {}", settings.database_path))?;

    let model = TrafficModel::new(settings.model_seed)
        .with_context(|| format!("initial training with seed {} failed", settings.model_seed))?;
    // Warmup so the first request doesn't pay for anything lazy
    let warm = model.predict(&[FeatureVector([8.0, 1.0, 0.0, 0.0, 60.0, 50.0, 5.0])])?;
    tracing::info!("warmup predict ok (p={:.3})", warm[0].probability);

    let service = TrafficService::new(Arc::new(model), Arc::new(store), settings.model_seed);
    let limiter = Arc::new(RateLimiter::new(settings.rate_limit_per_min));
    let sweeper = Arc::clone(&limiter);
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(PURGE_INTERVAL);
        loop {
            tick.tick().await;
            let dropped = sweeper.purge_expired(Instant::now());
            if dropped > 0 {
                tracing::debug!("rate limiter dropped {} idle clients", dropped);
            }
        }
    });

    let state = AppState {
        service,
        limiter,
        app_name: Arc::from(settings.app_name.as_str()),
    };

    let app = api::router(state, &settings.api_prefix);

    let addr = SocketAddr::from(([0, 0, 0, 0], settings.port));
    tracing::info!("listening on {}{}", addr, settings.api_prefix);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}
