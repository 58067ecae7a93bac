//! CheckWX decoded-METAR adapter
//!
//! Batched like the FAA adapter, authenticated with a static X-API-Key
//! header. The decoded endpoint already carries both barometer units and
//! visibility in statute miles, so no conversion is needed here.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::time::Duration;

use crate::error::ProviderError;
use crate::providers::MetarProvider;
use crate::types::{ProviderId, StationObservation};
use async_trait::async_trait;

const CHECKWX_METAR_URL: &str = "https://api.checkwx.com/metar";

#[derive(Debug, Deserialize)]
struct CheckWxResponse {
    #[serde(default)]
    data: Vec<CheckWxMetar>,
}

#[derive(Debug, Deserialize)]
struct CheckWxMetar {
    icao: Option<String>,
    observed: Option<String>,
    temperature: Option<Celsius>,
    dewpoint: Option<Celsius>,
    wind: Option<Wind>,
    barometer: Option<Barometer>,
    visibility: Option<Visibility>,
    #[serde(default)]
    raw_text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Celsius {
    celsius: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct Wind {
    degrees: Option<f64>,
    speed_kts: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct Barometer {
    hpa: Option<f64>,
    hg: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct Visibility {
    miles_float: Option<f64>,
}

pub struct CheckWxClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl CheckWxClient {
    pub fn new(api_key: String, timeout: Duration) -> Self {
        Self {
            client: super::http_client(timeout),
            base_url: CHECKWX_METAR_URL.to_string(),
            api_key,
        }
    }

    fn normalize(item: CheckWxMetar) -> Option<StationObservation> {
        let station_id = item.icao?;
        Some(StationObservation {
            station_id,
            observation_time: item.observed.as_deref().and_then(|raw| {
                DateTime::parse_from_rfc3339(raw)
                    .ok()
                    .map(|dt| dt.with_timezone(&Utc))
            }),
            temp_c: item.temperature.and_then(|t| t.celsius),
            dewpoint_c: item.dewpoint.and_then(|d| d.celsius),
            wind_dir_deg: item.wind.as_ref().and_then(|w| w.degrees),
            wind_speed_kt: item.wind.as_ref().and_then(|w| w.speed_kts),
            altim_hpa: item.barometer.as_ref().and_then(|b| b.hpa),
            altim_inhg: item.barometer.as_ref().and_then(|b| b.hg),
            visibility_statute_mi: item.visibility.and_then(|v| v.miles_float),
            raw_text: item.raw_text.unwrap_or_default(),
        })
    }
}

#[async_trait]
impl MetarProvider for CheckWxClient {
    fn id(&self) -> ProviderId {
        ProviderId::CheckWx
    }

    async fn fetch(
        &self,
        stations: &[String],
    ) -> Result<Vec<StationObservation>, ProviderError> {
        let url = format!("{}/{}/decoded", self.base_url, stations.join(","));
        tracing::debug!(provider = %self.id(), url = %url, "Fetching METAR data");

        let response = self
            .client
            .get(&url)
            .header("X-API-Key", &self.api_key)
            .send()
            .await?
            .error_for_status()?;
        let body = response.text().await?;

        let parsed: CheckWxResponse = serde_json::from_str(&body)
            .map_err(|e| ProviderError::parse(format!("CheckWX payload: {e}")))?;

        if parsed.data.is_empty() {
            tracing::debug!(provider = %self.id(), "No METAR data returned");
        }

        Ok(parsed.data.into_iter().filter_map(Self::normalize).collect())
    }
}
