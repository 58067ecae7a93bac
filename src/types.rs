//! Core types used throughout skywatch
//!
//! Defines the per-tick data model: observations, census snapshots and
//! price series. All of these are transient - constructed during one
//! scheduler tick, handed to the sink, then dropped.

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Upstream METAR providers, in no particular order.
///
/// The reconciliation priority is injected separately as an ordered list;
/// this enum only identifies where a reading came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProviderId {
    Faa,
    CheckWx,
    Vatsim,
}

impl ProviderId {
    /// Stable name used in logs and store tags
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::Faa => "FAA",
            ProviderId::CheckWx => "CheckWX",
            ProviderId::Vatsim => "VATSIM",
        }
    }

    /// Parse from a config string (case-insensitive)
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "FAA" => Some(ProviderId::Faa),
            "CHECKWX" => Some(ProviderId::CheckWx),
            "VATSIM" => Some(ProviderId::Vatsim),
            _ => None,
        }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One weather reading for one airport station from one provider.
///
/// Every numeric field is optional: "unavailable" is a legitimate value,
/// not an error. At most one observation exists per (provider, station)
/// per fetch, and an observation is never mutated after the adapter
/// produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StationObservation {
    /// ICAO station identifier, e.g. "ENZV"
    pub station_id: String,
    /// Provider-supplied report time; some feeds carry none
    pub observation_time: Option<DateTime<Utc>>,
    pub temp_c: Option<f64>,
    pub dewpoint_c: Option<f64>,
    pub wind_dir_deg: Option<f64>,
    pub wind_speed_kt: Option<f64>,
    pub altim_hpa: Option<f64>,
    pub altim_inhg: Option<f64>,
    pub visibility_statute_mi: Option<f64>,
    /// Provider's original METAR encoding
    pub raw_text: String,
}

/// The single chosen reading per station per tick, annotated with the
/// provider it came from. Written once to the sink, never mutated.
#[derive(Debug, Clone)]
pub struct ReconciledObservation {
    pub provider: ProviderId,
    pub observation: StationObservation,
}

/// Forecast conditions at one point in time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ForecastEntry {
    pub time: Option<DateTime<Utc>>,
    pub temp_c: Option<f64>,
    pub wind_speed_m_s: Option<f64>,
    pub cloud_fraction_percent: Option<f64>,
    pub pressure_hpa: Option<f64>,
    pub relative_humidity_percent: Option<f64>,
    pub precip_1h_mm: Option<f64>,
    pub precip_6h_mm: Option<f64>,
    pub precip_12h_mm: Option<f64>,
}

/// Current conditions plus a short hourly horizon from the forecast
/// provider. Only the current record is persisted each tick.
#[derive(Debug, Clone)]
pub struct ForecastSnapshot {
    pub current: ForecastEntry,
    pub horizon: Vec<ForecastEntry>,
}

/// One reading from the home weather station.
///
/// Wind modules are an optional accessory, so wind fields are always
/// optional. Absent optionals are persisted as 0.0 to keep the stored
/// field set type-stable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StationSensorReading {
    pub station_name: String,
    pub temperature_c: Option<f64>,
    pub humidity_percent: Option<f64>,
    pub pressure_hpa: Option<f64>,
    pub rain_mm: Option<f64>,
    pub wind_strength_kmh: Option<f64>,
    pub wind_angle_deg: Option<f64>,
    pub time_utc: Option<i64>,
}

/// Aggregate counts from one traffic snapshot, derived entirely in-memory
/// per tick and never merged across ticks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrafficCensus {
    pub total_clients: i64,
    pub pilot_count: i64,
    pub controller_count: i64,
    pub atis_count: i64,
    pub supervisor_count: i64,
    pub most_popular_aircraft: String,
    pub most_popular_departure: String,
    pub most_popular_arrival: String,
}

/// One hourly spot price. The hour-start timestamp carries the source
/// offset (Norwegian local time) and is written explicitly to the store.
#[derive(Debug, Clone)]
pub struct EnergyPricePoint {
    pub time_start: DateTime<FixedOffset>,
    pub nok_per_kwh: f64,
}

/// Ordered hourly prices for a fixed region, today plus (after 13:00
/// local) tomorrow.
#[derive(Debug, Clone)]
pub struct EnergyPriceSeries {
    pub region: String,
    pub points: Vec<EnergyPricePoint>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_id_roundtrip() {
        for id in [ProviderId::Faa, ProviderId::CheckWx, ProviderId::Vatsim] {
            assert_eq!(ProviderId::parse(id.as_str()), Some(id));
        }
        assert_eq!(ProviderId::parse("checkwx"), Some(ProviderId::CheckWx));
        assert_eq!(ProviderId::parse("NOAA"), None);
    }
}
