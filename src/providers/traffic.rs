//! VATSIM datafeed traffic census adapter
//!
//! The fast cycle's only upstream. Transient transport failures are
//! retried inside the adapter with bounded exponential backoff; the final
//! failure propagates for that tick only and no backoff state survives
//! the call.

use async_trait::async_trait;
use rand::Rng;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

use crate::error::ProviderError;
use crate::types::TrafficCensus;

/// Seam between the fast cycle and the datafeed client.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CensusSource: Send + Sync {
    async fn fetch(&self) -> Result<TrafficCensus, ProviderError>;
}

/// Controller/ATIS rating at or above which a client counts as a
/// supervisor or administrator
const SUPERVISOR_RATING: i64 = 7;

#[derive(Debug, Default, Deserialize)]
struct Datafeed {
    #[serde(default)]
    pilots: Vec<Pilot>,
    #[serde(default)]
    controllers: Vec<Controller>,
    #[serde(default)]
    atis: Vec<Controller>,
}

#[derive(Debug, Deserialize)]
struct Pilot {
    flight_plan: Option<FlightPlan>,
}

#[derive(Debug, Deserialize)]
struct FlightPlan {
    aircraft: Option<String>,
    departure: Option<String>,
    arrival: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Controller {
    #[serde(default)]
    rating: i64,
}

pub struct TrafficClient {
    client: reqwest::Client,
    url: String,
    max_retries: u32,
    initial_backoff: Duration,
}

impl TrafficClient {
    pub fn new(url: String, max_retries: u32, initial_backoff: Duration, timeout: Duration) -> Self {
        Self {
            client: super::http_client(timeout),
            url,
            max_retries,
            initial_backoff,
        }
    }

    /// Fetch the datafeed and derive one census. Each attempt's backoff
    /// doubles from the initial delay, with a small jitter so restarts
    /// don't synchronize against the upstream.
    pub async fn fetch(&self) -> Result<TrafficCensus, ProviderError> {
        retry_with_backoff(self.max_retries, self.initial_backoff, || {
            self.fetch_once()
        })
        .await
    }

    async fn fetch_once(&self) -> Result<TrafficCensus, ProviderError> {
        tracing::debug!(url = %self.url, "Fetching VATSIM datafeed");
        let response = self.client.get(&self.url).send().await?.error_for_status()?;
        let body = response.text().await?;

        let feed: Datafeed = serde_json::from_str(&body)
            .map_err(|e| ProviderError::parse(format!("VATSIM datafeed payload: {e}")))?;

        Ok(Self::census(feed))
    }

    fn census(feed: Datafeed) -> TrafficCensus {
        let pilot_count = feed.pilots.len() as i64;
        let controller_count = feed.controllers.len() as i64;
        let atis_count = feed.atis.len() as i64;

        let supervisor_count = feed
            .controllers
            .iter()
            .chain(feed.atis.iter())
            .filter(|c| c.rating >= SUPERVISOR_RATING)
            .count() as i64;

        let mut aircraft: HashMap<String, usize> = HashMap::new();
        let mut departures: HashMap<String, usize> = HashMap::new();
        let mut arrivals: HashMap<String, usize> = HashMap::new();

        for pilot in &feed.pilots {
            let fp = pilot.flight_plan.as_ref();
            let field = |v: Option<&String>| v.cloned().unwrap_or_else(|| "Unknown".to_string());
            *aircraft
                .entry(field(fp.and_then(|p| p.aircraft.as_ref())))
                .or_default() += 1;
            *departures
                .entry(field(fp.and_then(|p| p.departure.as_ref())))
                .or_default() += 1;
            *arrivals
                .entry(field(fp.and_then(|p| p.arrival.as_ref())))
                .or_default() += 1;
        }

        TrafficCensus {
            total_clients: pilot_count + controller_count + atis_count,
            pilot_count,
            controller_count,
            atis_count,
            supervisor_count,
            most_popular_aircraft: most_frequent(&aircraft),
            most_popular_departure: most_frequent(&departures),
            most_popular_arrival: most_frequent(&arrivals),
        }
    }
}

/// Highest count wins; ties break lexicographically so the census is
/// deterministic for a given snapshot.
fn most_frequent(counts: &HashMap<String, usize>) -> String {
    counts
        .iter()
        .max_by(|(ka, va), (kb, vb)| va.cmp(vb).then_with(|| kb.cmp(ka)))
        .map(|(k, _)| k.clone())
        .unwrap_or_else(|| "N/A".to_string())
}

#[async_trait]
impl CensusSource for TrafficClient {
    async fn fetch(&self) -> Result<TrafficCensus, ProviderError> {
        TrafficClient::fetch(self).await
    }
}

/// Run an operation with bounded exponential backoff. Only transient
/// (transport) failures are retried; the final attempt's error propagates
/// as-is, and no backoff state outlives the call.
async fn retry_with_backoff<T, F, Fut>(
    max_retries: u32,
    initial_backoff: Duration,
    mut op: F,
) -> Result<T, ProviderError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, ProviderError>>,
{
    let mut backoff = initial_backoff;

    for attempt in 1..=max_retries {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < max_retries => {
                tracing::warn!(
                    attempt,
                    max_retries,
                    error = %e,
                    "Traffic datafeed attempt failed, backing off"
                );
                tokio::time::sleep(with_jitter(backoff)).await;
                backoff *= 2;
            }
            Err(e) => return Err(e),
        }
    }

    // 1..=max_retries with max_retries >= 1 always returns above.
    Err(ProviderError::no_data("traffic datafeed retries exhausted"))
}

fn with_jitter(backoff: Duration) -> Duration {
    let factor: f64 = rand::thread_rng().gen_range(0.9..1.1);
    backoff.mul_f64(factor)
}
