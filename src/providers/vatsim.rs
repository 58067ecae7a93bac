//! VATSIM METAR adapter
//!
//! The endpoint serves one raw METAR string per station and supports no
//! batching, so this adapter issues one request per station and skips
//! stations that fail without aborting the rest. Parsing is deliberately
//! minimal: the handful of fields the data model needs are extracted from
//! the raw tokens and anything unrecognized stays absent.

use std::time::Duration;

use crate::error::ProviderError;
use crate::providers::units;
use crate::providers::MetarProvider;
use crate::types::{ProviderId, StationObservation};
use async_trait::async_trait;

pub struct VatsimMetarClient {
    client: reqwest::Client,
    base_url: String,
}

impl VatsimMetarClient {
    pub fn new(base_url: String, timeout: Duration) -> Self {
        Self {
            client: super::http_client(timeout),
            base_url,
        }
    }

    /// Parse a raw METAR line like
    /// `ENZV 171450Z 25011KT 9999 FEW020 10/07 Q1013 NOSIG`.
    ///
    /// The feed carries no full date, so `observation_time` stays absent.
    pub fn parse_raw_metar(raw: &str) -> Option<StationObservation> {
        let raw = raw.trim();
        let mut parts = raw.split_whitespace();
        let station_id = parts.next()?.to_string();

        let mut obs = StationObservation {
            station_id,
            observation_time: None,
            temp_c: None,
            dewpoint_c: None,
            wind_dir_deg: None,
            wind_speed_kt: None,
            altim_hpa: None,
            altim_inhg: None,
            visibility_statute_mi: None,
            raw_text: raw.to_string(),
        };

        for token in parts {
            if obs.temp_c.is_none() {
                if let Some((t, d)) = parse_temp_dew(token) {
                    obs.temp_c = Some(t);
                    obs.dewpoint_c = Some(d);
                    continue;
                }
            }
            if obs.wind_dir_deg.is_none() {
                if let Some((dir, spd)) = parse_wind(token) {
                    obs.wind_dir_deg = Some(dir);
                    obs.wind_speed_kt = Some(spd);
                    continue;
                }
            }
            if obs.altim_hpa.is_none() {
                if let Some((hpa, inhg)) = parse_altimeter(token) {
                    obs.altim_hpa = Some(hpa);
                    obs.altim_inhg = Some(inhg);
                    continue;
                }
            }
            if obs.visibility_statute_mi.is_none() {
                if let Some(vis) = parse_visibility_sm(token) {
                    obs.visibility_statute_mi = Some(vis);
                }
            }
        }

        Some(obs)
    }
}

/// Temperature/dewpoint group, e.g. `10/07` or `M02/M05` (M = minus).
fn parse_temp_dew(token: &str) -> Option<(f64, f64)> {
    let (t, d) = token.split_once('/')?;
    Some((parse_signed_temp(t)?, parse_signed_temp(d)?))
}

fn parse_signed_temp(part: &str) -> Option<f64> {
    let (neg, digits) = match part.strip_prefix('M') {
        Some(rest) => (true, rest),
        None => (false, part),
    };
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let value: f64 = digits.parse().ok()?;
    Some(if neg { -value } else { value })
}

/// Wind group `dddffKT` or `dddffGggKT`; variable winds (`VRB...`) carry
/// no usable direction and are left absent.
fn parse_wind(token: &str) -> Option<(f64, f64)> {
    let body = token.strip_suffix("KT")?;
    if body.len() < 5 || !body.is_char_boundary(3) {
        return None;
    }
    let dir: f64 = body[..3].parse().ok()?;
    let speed_part = &body[3..];
    let speed_digits = match speed_part.split_once('G') {
        Some((spd, _gust)) => spd,
        None => speed_part,
    };
    let speed: f64 = speed_digits.parse().ok()?;
    Some((dir, speed))
}

/// Altimeter group `A3014` (30.14 inHg) or `Q1014` (1014 hPa); both
/// canonical units are populated either way. Non-ASCII tokens (mojibake,
/// upstream error pages) can never be an altimeter group and must not be
/// byte-sliced.
fn parse_altimeter(token: &str) -> Option<(f64, f64)> {
    if token.len() != 5 || !token.is_ascii() {
        return None;
    }
    let value: f64 = token[1..].parse().ok()?;
    match token.as_bytes()[0] {
        b'A' => {
            let inhg = value / 100.0;
            Some((units::inhg_to_hpa(inhg), inhg))
        }
        b'Q' => Some((value, units::hpa_to_inhg(value))),
        _ => None,
    }
}

/// Statute-mile visibility group, e.g. `8SM` or `P6SM` (P = more than).
fn parse_visibility_sm(token: &str) -> Option<f64> {
    let body = token.strip_suffix("SM")?;
    let body = body.strip_prefix('P').unwrap_or(body);
    body.parse().ok()
}

#[async_trait]
impl MetarProvider for VatsimMetarClient {
    fn id(&self) -> ProviderId {
        ProviderId::Vatsim
    }

    async fn fetch(
        &self,
        stations: &[String],
    ) -> Result<Vec<StationObservation>, ProviderError> {
        let mut observations = Vec::with_capacity(stations.len());

        for icao in stations {
            let url = format!("{}?id={}", self.base_url, icao);
            tracing::debug!(provider = %self.id(), station = %icao, "Fetching METAR data");

            // One station failing must not block the rest.
            let raw = match self.fetch_one(&url).await {
                Ok(raw) => raw,
                Err(e) => {
                    tracing::warn!(provider = %self.id(), station = %icao, error = %e,
                        "Skipping station after fetch failure");
                    continue;
                }
            };

            match Self::parse_raw_metar(&raw) {
                Some(obs) => observations.push(obs),
                None => {
                    tracing::debug!(provider = %self.id(), station = %icao, "Empty METAR response")
                }
            }
        }

        Ok(observations)
    }
}

impl VatsimMetarClient {
    async fn fetch_one(&self, url: &str) -> Result<String, ProviderError> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        Ok(response.text().await?)
    }
}
