//! hvakosterstrommen.no spot-price adapter
//!
//! Prices publish once per day per region; tomorrow's prices appear
//! around 13:00 Norwegian time, so the adapter fetches today's day-file
//! every tick and adds tomorrow's once the local clock passes 13:00.
//! A failed day-file is skipped, not fatal to the other day.

use chrono::{DateTime, Datelike, Duration as ChronoDuration, FixedOffset, TimeZone, Timelike, Utc};
use serde::Deserialize;
use std::time::Duration;

use crate::error::ProviderError;
use crate::types::{EnergyPricePoint, EnergyPriceSeries};

const PRICE_API_BASE: &str = "https://www.hvakosterstrommen.no/api/v1/prices";

/// Hour past which the next day's prices are expected to exist
const TOMORROW_PUBLISH_HOUR: u32 = 13;

/// Norwegian standard time offset used for the publish-hour check
const NORWAY_UTC_OFFSET_SECS: i32 = 3600;

#[derive(Debug, Deserialize)]
struct PriceEntry {
    time_start: Option<String>,
    #[serde(rename = "NOK_per_kWh")]
    nok_per_kwh: Option<f64>,
}

pub struct EnergyClient {
    client: reqwest::Client,
    base_url: String,
    region: String,
}

impl EnergyClient {
    pub fn new(region: String, timeout: Duration) -> Self {
        Self {
            client: super::http_client(timeout),
            base_url: PRICE_API_BASE.to_string(),
            region,
        }
    }

    /// Fetch today's (and, after 13:00 local, tomorrow's) hourly prices.
    pub async fn fetch(&self) -> Result<EnergyPriceSeries, ProviderError> {
        let offset =
            FixedOffset::east_opt(NORWAY_UTC_OFFSET_SECS).expect("valid fixed offset");
        let local_now = Utc::now().with_timezone(&offset);
        self.fetch_at(local_now).await
    }

    async fn fetch_at(
        &self,
        local_now: DateTime<FixedOffset>,
    ) -> Result<EnergyPriceSeries, ProviderError> {
        let mut days = vec![local_now];
        if local_now.time().hour() >= TOMORROW_PUBLISH_HOUR {
            days.push(local_now + ChronoDuration::days(1));
        }

        let mut points = Vec::new();
        for day in days {
            let url = self.day_url(&day);
            match self.fetch_day(&url).await {
                Ok(mut day_points) => points.append(&mut day_points),
                Err(e) => {
                    tracing::warn!(url = %url, error = %e, "Skipping energy price day-file");
                }
            }
        }

        if points.is_empty() {
            return Err(ProviderError::no_data("no energy prices available"));
        }
        Ok(EnergyPriceSeries {
            region: self.region.clone(),
            points,
        })
    }

    fn day_url(&self, day: &DateTime<FixedOffset>) -> String {
        format!(
            "{}/{}/{:02}-{:02}_{}.json",
            self.base_url,
            day.year(),
            day.month(),
            day.day(),
            self.region
        )
    }

    async fn fetch_day(&self, url: &str) -> Result<Vec<EnergyPricePoint>, ProviderError> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        let body = response.text().await?;

        let entries: Vec<PriceEntry> = serde_json::from_str(&body)
            .map_err(|e| ProviderError::parse(format!("energy price payload: {e}")))?;

        tracing::info!(url = %url, entries = entries.len(), "Fetched energy prices");
        Ok(normalize_entries(entries))
    }
}

fn normalize_entries(entries: Vec<PriceEntry>) -> Vec<EnergyPricePoint> {
    entries
        .into_iter()
        .filter_map(|entry| {
            let raw_time = entry.time_start?;
            let time_start = match parse_hour_start(&raw_time) {
                Some(t) => t,
                None => {
                    tracing::warn!(time = %raw_time, "Unparseable price hour-start, skipping");
                    return None;
                }
            };
            let nok_per_kwh = match entry.nok_per_kwh {
                Some(p) => p,
                None => {
                    tracing::warn!(time = %raw_time, "Missing NOK price, skipping");
                    return None;
                }
            };
            Some(EnergyPricePoint {
                time_start,
                nok_per_kwh,
            })
        })
        .collect()
}

/// Hour starts normally carry an offset (`2024-01-01T00:00:00+01:00`);
/// a bare local timestamp is taken as Norwegian standard time.
fn parse_hour_start(raw: &str) -> Option<DateTime<FixedOffset>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt);
    }
    let naive = chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S").ok()?;
    FixedOffset::east_opt(NORWAY_UTC_OFFSET_SECS)?
        .from_local_datetime(&naive)
        .single()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_skips_missing_prices() {
        let entries: Vec<PriceEntry> = serde_json::from_str(
            r#"[
                {"time_start": "2024-01-01T00:00:00+01:00", "NOK_per_kWh": 1.2345},
                {"time_start": "2024-01-01T01:00:00+01:00"},
                {"NOK_per_kWh": 0.5}
            ]"#,
        )
        .unwrap();

        let points = normalize_entries(entries);
        assert_eq!(points.len(), 1);
        assert!((points[0].nok_per_kwh - 1.2345).abs() < 1e-12);
    }

    #[test]
    fn test_bare_timestamp_assumed_norwegian() {
        let parsed = parse_hour_start("2024-01-01T00:00:00").unwrap();
        assert_eq!(parsed.offset().local_minus_utc(), 3600);
        assert_eq!(parsed.hour(), 0);
    }

    #[test]
    fn test_day_url_format() {
        let client = EnergyClient::new("NO2".into(), Duration::from_secs(5));
        let day = DateTime::parse_from_rfc3339("2024-03-07T10:00:00+01:00").unwrap();
        assert_eq!(
            client.day_url(&day),
            "https://www.hvakosterstrommen.no/api/v1/prices/2024/03-07_NO2.json"
        );
    }
}
