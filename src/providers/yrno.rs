//! yr.no (met.no locationforecast) adapter
//!
//! Produces one `ForecastSnapshot`: the first timeseries entry becomes the
//! current record, the next five hourly entries the horizon. met.no
//! requires an identifying User-Agent on every request.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::time::Duration;

use crate::error::ProviderError;
use crate::types::{ForecastEntry, ForecastSnapshot};

const LOCATIONFORECAST_URL: &str =
    "https://api.met.no/weatherapi/locationforecast/2.0/compact";

/// Hourly horizon entries carried beyond the current record
const HORIZON_HOURS: usize = 5;

#[derive(Debug, Deserialize)]
struct LocationForecast {
    #[serde(default)]
    properties: Option<Properties>,
}

#[derive(Debug, Deserialize)]
struct Properties {
    #[serde(default)]
    timeseries: Vec<TimeseriesEntry>,
}

#[derive(Debug, Deserialize)]
struct TimeseriesEntry {
    time: Option<String>,
    #[serde(default)]
    data: EntryData,
}

#[derive(Debug, Default, Deserialize)]
struct EntryData {
    #[serde(default)]
    instant: Instant,
    next_1_hours: Option<NextHours>,
    next_6_hours: Option<NextHours>,
    next_12_hours: Option<NextHours>,
}

#[derive(Debug, Default, Deserialize)]
struct Instant {
    #[serde(default)]
    details: InstantDetails,
}

#[derive(Debug, Default, Deserialize)]
struct InstantDetails {
    air_temperature: Option<f64>,
    wind_speed: Option<f64>,
    cloud_area_fraction: Option<f64>,
    air_pressure_at_sea_level: Option<f64>,
    relative_humidity: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct NextHours {
    details: Option<PrecipDetails>,
}

#[derive(Debug, Deserialize)]
struct PrecipDetails {
    precipitation_amount: Option<f64>,
}

pub struct YrNoClient {
    client: reqwest::Client,
    base_url: String,
    latitude: String,
    longitude: String,
    user_agent: String,
}

impl YrNoClient {
    pub fn new(latitude: String, longitude: String, user_agent: String, timeout: Duration) -> Self {
        Self {
            client: super::http_client(timeout),
            base_url: LOCATIONFORECAST_URL.to_string(),
            latitude,
            longitude,
            user_agent,
        }
    }

    pub async fn fetch(&self) -> Result<ForecastSnapshot, ProviderError> {
        let url = format!(
            "{}?lat={}&lon={}",
            self.base_url, self.latitude, self.longitude
        );
        tracing::debug!(url = %url, "Fetching forecast data from yr.no");

        let response = self
            .client
            .get(&url)
            .header(reqwest::header::USER_AGENT, &self.user_agent)
            .send()
            .await?
            .error_for_status()?;
        let body = response.text().await?;

        let parsed: LocationForecast = serde_json::from_str(&body)
            .map_err(|e| ProviderError::parse(format!("yr.no payload: {e}")))?;

        Self::normalize(parsed)
    }

    fn normalize(parsed: LocationForecast) -> Result<ForecastSnapshot, ProviderError> {
        let timeseries = parsed
            .properties
            .map(|p| p.timeseries)
            .unwrap_or_default();

        let mut entries = timeseries.into_iter();
        let current = match entries.next() {
            Some(entry) => entry_from(entry),
            None => return Err(ProviderError::no_data("yr.no returned no timeseries")),
        };
        let horizon: Vec<ForecastEntry> = entries.take(HORIZON_HOURS).map(entry_from).collect();

        Ok(ForecastSnapshot { current, horizon })
    }
}

fn entry_from(entry: TimeseriesEntry) -> ForecastEntry {
    let details = entry.data.instant.details;
    ForecastEntry {
        time: entry.time.as_deref().and_then(parse_time),
        temp_c: details.air_temperature,
        wind_speed_m_s: details.wind_speed,
        cloud_fraction_percent: details.cloud_area_fraction,
        pressure_hpa: details.air_pressure_at_sea_level,
        relative_humidity_percent: details.relative_humidity,
        precip_1h_mm: precip(&entry.data.next_1_hours),
        precip_6h_mm: precip(&entry.data.next_6_hours),
        precip_12h_mm: precip(&entry.data.next_12_hours),
    }
}

fn precip(window: &Option<NextHours>) -> Option<f64> {
    window
        .as_ref()
        .and_then(|w| w.details.as_ref())
        .and_then(|d| d.precipitation_amount)
}

fn parse_time(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
