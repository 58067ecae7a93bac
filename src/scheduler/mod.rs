//! Dual-cadence scheduler
//!
//! Two independent loops share one process: the slow cycle collects
//! METAR, forecast, home-sensor and energy data every few minutes; the
//! fast cycle snapshots network traffic every few seconds. Each tick is
//! sequential inside its own cycle, and every error is absorbed at the
//! tick boundary so a bad upstream can never kill a loop.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::providers::{CensusSource, EnergyClient, MetarProvider, NetatmoClient, YrNoClient};
use crate::reconcile::Reconciler;
use crate::sink::{points, PointWriter};
use crate::types::{ProviderId, StationObservation};

/// Per-tick lifecycle of a cycle, logged on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    Idle,
    Fetching,
    Reconciling,
    Writing,
    Failed,
}

impl fmt::Display for CycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CycleState::Idle => "idle",
            CycleState::Fetching => "fetching",
            CycleState::Reconciling => "reconciling",
            CycleState::Writing => "writing",
            CycleState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Tracks and logs one cycle's state transitions. `Failed` is sticky
/// within a tick: once entered, only the end-of-tick reset to `Idle`
/// leaves it.
struct CycleTracker {
    cycle: &'static str,
    state: CycleState,
}

impl CycleTracker {
    fn new(cycle: &'static str) -> Self {
        Self {
            cycle,
            state: CycleState::Idle,
        }
    }

    fn advance(&mut self, next: CycleState) {
        if self.state == CycleState::Failed && next != CycleState::Idle {
            return;
        }
        debug!(cycle = self.cycle, from = %self.state, to = %next, "Cycle state transition");
        self.state = next;
    }

    fn state(&self) -> CycleState {
        self.state
    }
}

/// Fetch every METAR provider, reconcile per station, write one point
/// per reconciled station. A provider failure drops that provider from
/// this tick; a write failure drops that station. Returns the number of
/// points written and whether anything failed along the way.
async fn collect_metar(
    providers: &[Box<dyn MetarProvider>],
    reconciler: &Reconciler,
    stations: &[String],
    writer: &dyn PointWriter,
    tracker: &mut CycleTracker,
) -> (usize, bool) {
    let mut failed = false;

    tracker.advance(CycleState::Fetching);
    let mut per_provider: HashMap<ProviderId, Vec<StationObservation>> = HashMap::new();
    for provider in providers {
        match provider.fetch(stations).await {
            Ok(observations) => {
                debug!(
                    provider = %provider.id(),
                    count = observations.len(),
                    "Fetched METAR observations"
                );
                per_provider.insert(provider.id(), observations);
            }
            Err(e) => {
                warn!(provider = %provider.id(), error = %e, "METAR fetch failed");
                failed = true;
            }
        }
    }

    tracker.advance(CycleState::Reconciling);
    let reconciled = reconciler.reconcile(stations, &per_provider);

    tracker.advance(CycleState::Writing);
    let mut written = 0;
    for (station, observation) in &reconciled {
        match writer.write_point(&points::metar_point(observation)).await {
            Ok(()) => written += 1,
            Err(e) => {
                warn!(station = %station, error = %e, "Failed to write METAR point");
                failed = true;
            }
        }
    }

    (written, failed)
}

/// The slow cycle: aviation weather, forecast, home sensor and energy
/// prices on one shared interval.
pub struct SlowCycle {
    providers: Vec<Box<dyn MetarProvider>>,
    reconciler: Reconciler,
    forecast: YrNoClient,
    sensor: NetatmoClient,
    energy: EnergyClient,
    stations: Vec<String>,
    writer: Arc<dyn PointWriter>,
    interval: Duration,
}

impl SlowCycle {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        providers: Vec<Box<dyn MetarProvider>>,
        reconciler: Reconciler,
        forecast: YrNoClient,
        sensor: NetatmoClient,
        energy: EnergyClient,
        stations: Vec<String>,
        writer: Arc<dyn PointWriter>,
        interval: Duration,
    ) -> Self {
        Self {
            providers,
            reconciler,
            forecast,
            sensor,
            energy,
            stations,
            writer,
            interval,
        }
    }

    pub async fn run(self) {
        info!(
            interval_secs = self.interval.as_secs(),
            stations = ?self.stations,
            "Starting slow collection cycle"
        );
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            self.run_once().await;
        }
    }

    /// One full slow tick. Stages run sequentially; each failure is
    /// logged and the remaining stages still run.
    pub async fn run_once(&self) {
        let mut tracker = CycleTracker::new("slow");

        let (metar_written, mut failed) = collect_metar(
            &self.providers,
            &self.reconciler,
            &self.stations,
            self.writer.as_ref(),
            &mut tracker,
        )
        .await;
        info!(written = metar_written, "METAR stage complete");

        match self.forecast.fetch().await {
            Ok(snapshot) => {
                if let Err(e) = self
                    .writer
                    .write_point(&points::forecast_point(&snapshot.current))
                    .await
                {
                    warn!(error = %e, "Failed to write forecast point");
                    failed = true;
                }
            }
            Err(e) => {
                warn!(error = %e, "Forecast fetch failed");
                failed = true;
            }
        }

        match self.sensor.fetch().await {
            Ok(reading) => {
                if let Err(e) = self
                    .writer
                    .write_point(&points::netatmo_point(&reading))
                    .await
                {
                    warn!(error = %e, "Failed to write home station point");
                    failed = true;
                }
            }
            Err(e) => {
                warn!(error = %e, "Home station fetch failed");
                failed = true;
            }
        }

        match self.energy.fetch().await {
            Ok(series) => {
                if write_energy_series(self.writer.as_ref(), &series).await {
                    failed = true;
                }
            }
            Err(e) => {
                warn!(error = %e, "Energy price fetch failed");
                failed = true;
            }
        }

        if failed {
            tracker.advance(CycleState::Failed);
            error!(cycle = "slow", "Tick finished with failures");
        }
        tracker.advance(CycleState::Idle);
    }
}

/// Write every hourly price in the series. Each point is an independent
/// write: one rejected hour never drops the remaining hours. Returns
/// whether any write failed.
async fn write_energy_series(
    writer: &dyn PointWriter,
    series: &crate::types::EnergyPriceSeries,
) -> bool {
    let mut failed = false;
    for point in &series.points {
        if let Err(e) = writer
            .write_point(&points::energy_point(&series.region, point))
            .await
        {
            warn!(error = %e, "Failed to write energy price point");
            failed = true;
        }
    }
    failed
}

/// The fast cycle: one traffic census per tick. Retry/backoff against a
/// flaky datafeed lives inside the client; this loop only absorbs the
/// final outcome.
pub struct FastCycle {
    traffic: Box<dyn CensusSource>,
    writer: Arc<dyn PointWriter>,
    interval: Duration,
}

impl FastCycle {
    pub fn new(
        traffic: Box<dyn CensusSource>,
        writer: Arc<dyn PointWriter>,
        interval: Duration,
    ) -> Self {
        Self {
            traffic,
            writer,
            interval,
        }
    }

    pub async fn run(self) {
        info!(
            interval_secs = self.interval.as_secs(),
            "Starting fast collection cycle"
        );
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            self.run_once().await;
        }
    }

    pub async fn run_once(&self) {
        let mut tracker = CycleTracker::new("fast");
        tracker.advance(CycleState::Fetching);

        match self.traffic.fetch().await {
            Ok(census) => {
                tracker.advance(CycleState::Writing);
                match self.writer.write_point(&points::traffic_point(&census)).await {
                    Ok(()) => {
                        debug!(clients = census.total_clients, "Traffic census written");
                    }
                    Err(e) => {
                        warn!(error = %e, "Failed to write traffic census");
                        tracker.advance(CycleState::Failed);
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "Traffic census fetch failed");
                tracker.advance(CycleState::Failed);
            }
        }
        tracker.advance(CycleState::Idle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::MockMetarProvider;
    use crate::sink::MockPointWriter;
    use crate::types::ProviderId;

    fn observation(station: &str, temp: f64) -> StationObservation {
        StationObservation {
            station_id: station.to_string(),
            observation_time: None,
            temp_c: Some(temp),
            dewpoint_c: None,
            wind_dir_deg: None,
            wind_speed_kt: None,
            altim_hpa: None,
            altim_inhg: None,
            visibility_statute_mi: None,
            raw_text: format!("{station} 171450Z"),
        }
    }

    fn mock_provider(
        id: ProviderId,
        result: Result<Vec<StationObservation>, crate::error::ProviderError>,
    ) -> Box<dyn MetarProvider> {
        let mut provider = MockMetarProvider::new();
        provider.expect_id().return_const(id);
        provider.expect_fetch().return_once(move |_| result);
        Box::new(provider)
    }

    #[tokio::test]
    async fn test_collect_metar_writes_one_point_per_station() {
        let providers = vec![mock_provider(
            ProviderId::Faa,
            Ok(vec![observation("ENZV", 10.0), observation("KJFK", 5.0)]),
        )];
        let reconciler = Reconciler::new(vec![ProviderId::Faa]);
        let stations = vec!["ENZV".to_string(), "KJFK".to_string()];

        let mut writer = MockPointWriter::new();
        writer
            .expect_write_point()
            .times(2)
            .returning(|_| Ok(()));

        let mut tracker = CycleTracker::new("slow");
        let (written, failed) =
            collect_metar(&providers, &reconciler, &stations, &writer, &mut tracker).await;

        assert_eq!(written, 2);
        assert!(!failed);
        assert_eq!(tracker.state(), CycleState::Writing);
    }

    #[tokio::test]
    async fn test_collect_metar_survives_provider_failure() {
        let providers = vec![
            mock_provider(
                ProviderId::Faa,
                Err(crate::error::ProviderError::no_data("upstream empty")),
            ),
            mock_provider(ProviderId::Vatsim, Ok(vec![observation("ENZV", 8.0)])),
        ];
        let reconciler = Reconciler::new(vec![ProviderId::Faa, ProviderId::Vatsim]);
        let stations = vec!["ENZV".to_string()];

        let mut writer = MockPointWriter::new();
        writer
            .expect_write_point()
            .times(1)
            .withf(|point| {
                point.tags.get("provider").map(String::as_str) == Some("VATSIM")
            })
            .returning(|_| Ok(()));

        let mut tracker = CycleTracker::new("slow");
        let (written, failed) =
            collect_metar(&providers, &reconciler, &stations, &writer, &mut tracker).await;

        assert_eq!(written, 1);
        assert!(failed);
    }

    #[tokio::test]
    async fn test_collect_metar_write_failure_keeps_going() {
        let providers = vec![mock_provider(
            ProviderId::Faa,
            Ok(vec![observation("ENZV", 10.0), observation("KJFK", 5.0)]),
        )];
        let reconciler = Reconciler::new(vec![ProviderId::Faa]);
        let stations = vec!["ENZV".to_string(), "KJFK".to_string()];

        let mut writer = MockPointWriter::new();
        let mut first = true;
        writer.expect_write_point().times(2).returning(move |_| {
            if first {
                first = false;
                Err(anyhow::anyhow!("store unavailable"))
            } else {
                Ok(())
            }
        });

        let mut tracker = CycleTracker::new("slow");
        let (written, failed) =
            collect_metar(&providers, &reconciler, &stations, &writer, &mut tracker).await;

        assert_eq!(written, 1);
        assert!(failed);
    }

    #[tokio::test]
    async fn test_energy_series_write_failure_keeps_remaining_hours() {
        use chrono::{FixedOffset, TimeZone};

        let offset = FixedOffset::east_opt(3600).unwrap();
        let series = crate::types::EnergyPriceSeries {
            region: "NO2".to_string(),
            points: (0..3)
                .map(|hour| crate::types::EnergyPricePoint {
                    time_start: offset.with_ymd_and_hms(2024, 1, 17, hour, 0, 0).unwrap(),
                    nok_per_kwh: 1.0,
                })
                .collect(),
        };

        let mut writer = MockPointWriter::new();
        let mut first = true;
        writer.expect_write_point().times(3).returning(move |_| {
            if first {
                first = false;
                Err(anyhow::anyhow!("store unavailable"))
            } else {
                Ok(())
            }
        });

        let failed = write_energy_series(&writer, &series).await;
        assert!(failed);
    }

    fn census() -> crate::types::TrafficCensus {
        crate::types::TrafficCensus {
            total_clients: 10,
            pilot_count: 8,
            controller_count: 2,
            atis_count: 0,
            supervisor_count: 1,
            most_popular_aircraft: "B738".to_string(),
            most_popular_departure: "ENZV".to_string(),
            most_popular_arrival: "ENGM".to_string(),
        }
    }

    #[tokio::test]
    async fn test_fast_tick_absorbs_fetch_failure() {
        let mut source = crate::providers::MockCensusSource::new();
        source
            .expect_fetch()
            .returning(|| Err(crate::error::ProviderError::no_data("datafeed down")));

        let mut writer = MockPointWriter::new();
        writer.expect_write_point().times(0);

        let cycle = FastCycle::new(Box::new(source), Arc::new(writer), Duration::from_secs(30));
        // Must return normally so the loop reaches its next tick.
        cycle.run_once().await;
    }

    #[tokio::test]
    async fn test_fast_tick_absorbs_write_failure() {
        let mut source = crate::providers::MockCensusSource::new();
        source.expect_fetch().returning(|| Ok(census()));

        let mut writer = MockPointWriter::new();
        writer
            .expect_write_point()
            .times(1)
            .returning(|_| Err(anyhow::anyhow!("store unavailable")));

        let cycle = FastCycle::new(Box::new(source), Arc::new(writer), Duration::from_secs(30));
        cycle.run_once().await;
    }

    #[test]
    fn test_tracker_failed_is_sticky_until_reset() {
        let mut tracker = CycleTracker::new("slow");
        tracker.advance(CycleState::Fetching);
        tracker.advance(CycleState::Failed);
        tracker.advance(CycleState::Writing);
        assert_eq!(tracker.state(), CycleState::Failed);

        tracker.advance(CycleState::Idle);
        assert_eq!(tracker.state(), CycleState::Idle);
    }
}
