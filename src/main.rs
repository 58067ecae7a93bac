//! Skywatch daemon
//!
//! Periodic collector for aviation weather, local forecast, home sensor,
//! network traffic and energy price data, persisted to InfluxDB with an
//! optional read-side HTTP API.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use skywatch::config::AppConfig;
use skywatch::providers::{
    EnergyClient, FileTokenStore, NetatmoClient, TrafficClient, YrNoClient,
};
use skywatch::reconcile::Reconciler;
use skywatch::scheduler::{FastCycle, SlowCycle};
use skywatch::sink::{InfluxSink, PointWriter};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::load()?;
    info!(config = %config.digest(), "Starting skywatch");

    let timeout = Duration::from_secs(config.scheduler.http_timeout_secs);
    let sink = Arc::new(InfluxSink::new(&config.influx, timeout));
    let writer: Arc<dyn PointWriter> = sink.clone();

    let providers = skywatch::providers::metar_providers(&config, timeout)?;
    let reconciler = Reconciler::new(config.provider_priority()?);

    let forecast = YrNoClient::new(
        config.yrno.latitude.clone(),
        config.yrno.longitude.clone(),
        config.yrno.user_agent.clone(),
        timeout,
    );
    let sensor = NetatmoClient::new(
        config.netatmo.client_id.clone(),
        config.netatmo.client_secret.clone(),
        Box::new(FileTokenStore::new(&config.netatmo.token_path)),
        timeout,
    );
    let energy = EnergyClient::new(config.energy.region.clone(), timeout);
    let traffic = TrafficClient::new(
        config.vatsim.datafeed_url.clone(),
        config.vatsim.max_retries,
        Duration::from_secs(config.vatsim.initial_backoff_secs),
        timeout,
    );

    let slow = SlowCycle::new(
        providers,
        reconciler,
        forecast,
        sensor,
        energy,
        config.stations.icao.clone(),
        writer.clone(),
        Duration::from_secs(config.scheduler.slow_interval_secs),
    );
    let fast = FastCycle::new(
        Box::new(traffic),
        writer,
        Duration::from_secs(config.scheduler.fast_interval_secs),
    );

    tokio::spawn(slow.run());
    tokio::spawn(fast.run());

    #[cfg(feature = "api")]
    if config.api.enabled {
        let state = Arc::new(skywatch::api::ApiState {
            store: sink,
            default_station: config.stations.default_station.clone(),
            energy_region: config.energy.region.clone(),
        });
        let port = config.api.port;
        tokio::spawn(async move {
            if let Err(e) = skywatch::api::start_server(state, port).await {
                tracing::error!(error = %e, "Read API server exited");
            }
        });
    }

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, stopping");
    Ok(())
}
