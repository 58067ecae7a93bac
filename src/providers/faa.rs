//! FAA aviationweather.gov METAR adapter
//!
//! Batched: all requested stations go out in a single comma-joined
//! request. The API is loosely typed - numeric fields arrive as numbers
//! or strings depending on the report - so extraction is tolerant and a
//! bad value only blanks that field.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

use crate::error::ProviderError;
use crate::providers::units;
use crate::providers::MetarProvider;
use crate::types::{ProviderId, StationObservation};
use async_trait::async_trait;

const FAA_METAR_URL: &str = "https://aviationweather.gov/api/data/metar";

#[derive(Debug, Deserialize)]
struct FaaMetar {
    #[serde(rename = "icaoId")]
    icao_id: Option<String>,
    #[serde(rename = "reportTime")]
    report_time: Option<String>,
    temp: Option<Value>,
    dewp: Option<Value>,
    wdir: Option<Value>,
    wspd: Option<Value>,
    altim: Option<Value>,
    visib: Option<Value>,
    #[serde(rename = "rawOb", default)]
    raw_ob: Option<String>,
}

pub struct FaaClient {
    client: reqwest::Client,
    base_url: String,
}

impl FaaClient {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: super::http_client(timeout),
            base_url: FAA_METAR_URL.to_string(),
        }
    }

    fn normalize(item: FaaMetar) -> Option<StationObservation> {
        let station_id = item.icao_id?;

        // Altimeter arrives in hPa; both canonical units get populated.
        let altim_hpa = units::value_to_f64(item.altim.as_ref());
        let altim_inhg = altim_hpa.map(units::hpa_to_inhg);

        Some(StationObservation {
            station_id,
            observation_time: item.report_time.as_deref().and_then(parse_report_time),
            temp_c: units::value_to_f64(item.temp.as_ref()),
            dewpoint_c: units::value_to_f64(item.dewp.as_ref()),
            wind_dir_deg: units::value_to_f64(item.wdir.as_ref()),
            wind_speed_kt: units::value_to_f64(item.wspd.as_ref()),
            altim_hpa,
            altim_inhg,
            visibility_statute_mi: units::parse_visibility_mi(item.visib.as_ref()),
            raw_text: item.raw_ob.unwrap_or_default(),
        })
    }
}

/// FAA reports "2024-01-17 14:51:00" style timestamps; RFC 3339 is
/// accepted as a fallback. An unparseable time blanks the field only.
fn parse_report_time(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[async_trait]
impl MetarProvider for FaaClient {
    fn id(&self) -> ProviderId {
        ProviderId::Faa
    }

    async fn fetch(
        &self,
        stations: &[String],
    ) -> Result<Vec<StationObservation>, ProviderError> {
        let url = format!(
            "{}?ids={}&format=json",
            self.base_url,
            stations.join(",")
        );
        tracing::debug!(provider = %self.id(), url = %url, "Fetching METAR data");

        let response = self.client.get(&url).send().await?.error_for_status()?;
        let body = response.text().await?;

        let items: Vec<FaaMetar> = serde_json::from_str(&body)
            .map_err(|e| ProviderError::parse(format!("FAA METAR payload: {e}")))?;

        if items.is_empty() {
            tracing::debug!(provider = %self.id(), "No METAR data returned");
        }

        Ok(items.into_iter().filter_map(Self::normalize).collect())
    }
}
