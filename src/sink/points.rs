//! Mapping from domain entities to store points
//!
//! One function per measurement. Field and tag names here are the
//! contract between the write path and the read API; change them in both
//! places or not at all.

use chrono::Utc;

use crate::types::{
    EnergyPricePoint, ForecastEntry, ReconciledObservation, StationSensorReading, TrafficCensus,
};

use super::DataPoint;

pub const MEASUREMENT_METAR: &str = "metar";
pub const MEASUREMENT_FORECAST: &str = "yr_forecast";
pub const MEASUREMENT_NETATMO: &str = "netatmo";
pub const MEASUREMENT_TRAFFIC: &str = "vatsim_stats";
pub const MEASUREMENT_ENERGY: &str = "energy_prices";

/// The forecast covers a single configured location.
pub const FORECAST_LOCATION_TAG: &str = "Home";

/// One reconciled METAR reading. Absent readings stay absent; the raw
/// report is kept verbatim as a string field.
pub fn metar_point(reconciled: &ReconciledObservation) -> DataPoint {
    let obs = &reconciled.observation;
    DataPoint::new(MEASUREMENT_METAR)
        .tag("station_id", &obs.station_id)
        .tag("provider", reconciled.provider.as_str())
        .maybe_field_f64("temp_c", obs.temp_c)
        .maybe_field_f64("dewpoint_c", obs.dewpoint_c)
        .maybe_field_f64("wind_dir_deg", obs.wind_dir_deg)
        .maybe_field_f64("wind_speed_kt", obs.wind_speed_kt)
        .maybe_field_f64("altim_hpa", obs.altim_hpa)
        .maybe_field_f64("altim_in_hg", obs.altim_inhg)
        .maybe_field_f64("visibility_statute_mi", obs.visibility_statute_mi)
        .field_text("raw_text", &obs.raw_text)
}

/// The current forecast record. Only present values are written.
pub fn forecast_point(entry: &ForecastEntry) -> DataPoint {
    DataPoint::new(MEASUREMENT_FORECAST)
        .tag("location", FORECAST_LOCATION_TAG)
        .maybe_field_f64("temp_c", entry.temp_c)
        .maybe_field_f64("wind_speed_m_s", entry.wind_speed_m_s)
        .maybe_field_f64("cloud_fraction_percent", entry.cloud_fraction_percent)
        .maybe_field_f64("pressure_hpa", entry.pressure_hpa)
        .maybe_field_f64("relative_humidity_percent", entry.relative_humidity_percent)
        .maybe_field_f64("precip_1h_mm", entry.precip_1h_mm)
        .maybe_field_f64("precip_6h_mm", entry.precip_6h_mm)
        .maybe_field_f64("precip_12h_mm", entry.precip_12h_mm)
}

/// One home-station reading. Absent sensors (a missing wind module, a
/// rain gauge offline) are written as 0.0 so the stored field set never
/// changes shape.
pub fn netatmo_point(reading: &StationSensorReading) -> DataPoint {
    DataPoint::new(MEASUREMENT_NETATMO)
        .tag("station_name", &reading.station_name)
        .field_f64("temperature_c", reading.temperature_c.unwrap_or(0.0))
        .field_f64("humidity_percent", reading.humidity_percent.unwrap_or(0.0))
        .field_f64("pressure_hpa", reading.pressure_hpa.unwrap_or(0.0))
        .field_f64("rain_mm", reading.rain_mm.unwrap_or(0.0))
        .field_f64("wind_strength_kmh", reading.wind_strength_kmh.unwrap_or(0.0))
        .field_f64("wind_angle_deg", reading.wind_angle_deg.unwrap_or(0.0))
}

/// One traffic census snapshot. Counts are integers; the most-popular
/// strings go in as tags so they can be grouped on.
pub fn traffic_point(census: &TrafficCensus) -> DataPoint {
    DataPoint::new(MEASUREMENT_TRAFFIC)
        .tag("most_popular_aircraft", &census.most_popular_aircraft)
        .tag("most_popular_departure", &census.most_popular_departure)
        .tag("most_popular_arrival", &census.most_popular_arrival)
        .field_i64("total_clients", census.total_clients)
        .field_i64("pilot_count", census.pilot_count)
        .field_i64("controller_count", census.controller_count)
        .field_i64("atis_count", census.atis_count)
        .field_i64("supervisor_count", census.supervisor_count)
}

/// One hourly spot price, stored as integer øre per kWh at the hour-start
/// timestamp rather than ingestion time.
pub fn energy_point(region: &str, point: &EnergyPricePoint) -> DataPoint {
    let ore = (point.nok_per_kwh * 100.0).round() as i64;
    DataPoint::new(MEASUREMENT_ENERGY)
        .tag("region", region)
        .tag("currency", "NOK")
        .field_i64("price_per_kwh_ore", ore)
        .timestamp(point.time_start.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::FieldValue;
    use crate::types::{ProviderId, StationObservation};
    use chrono::{FixedOffset, TimeZone};

    fn observation(station: &str) -> StationObservation {
        StationObservation {
            station_id: station.to_string(),
            observation_time: None,
            temp_c: Some(10.0),
            dewpoint_c: Some(7.0),
            wind_dir_deg: None,
            wind_speed_kt: Some(12.0),
            altim_hpa: Some(1013.0),
            altim_inhg: None,
            visibility_statute_mi: None,
            raw_text: "ENZV 171450Z 12012KT".to_string(),
        }
    }

    #[test]
    fn test_metar_point_skips_absent_fields() {
        let point = metar_point(&ReconciledObservation {
            provider: ProviderId::Faa,
            observation: observation("ENZV"),
        });

        assert_eq!(point.tags.get("station_id"), Some(&"ENZV".to_string()));
        assert_eq!(point.tags.get("provider"), Some(&"FAA".to_string()));
        assert_eq!(
            point.fields.get("temp_c"),
            Some(&FieldValue::Float(10.0))
        );
        assert!(!point.fields.contains_key("wind_dir_deg"));
        assert_eq!(
            point.fields.get("raw_text"),
            Some(&FieldValue::Text("ENZV 171450Z 12012KT".to_string()))
        );
    }

    #[test]
    fn test_netatmo_point_zero_fills_missing_sensors() {
        let point = netatmo_point(&StationSensorReading {
            station_name: "Home".to_string(),
            temperature_c: Some(21.5),
            humidity_percent: Some(40.0),
            pressure_hpa: None,
            rain_mm: None,
            wind_strength_kmh: None,
            wind_angle_deg: None,
            time_utc: None,
        });

        assert_eq!(
            point.fields.get("temperature_c"),
            Some(&FieldValue::Float(21.5))
        );
        assert_eq!(point.fields.get("rain_mm"), Some(&FieldValue::Float(0.0)));
        assert_eq!(
            point.fields.get("wind_strength_kmh"),
            Some(&FieldValue::Float(0.0))
        );
    }

    #[test]
    fn test_energy_point_rounds_to_integer_ore() {
        let time_start = FixedOffset::east_opt(3600)
            .unwrap()
            .with_ymd_and_hms(2024, 1, 17, 14, 0, 0)
            .unwrap();
        let point = energy_point(
            "NO2",
            &EnergyPricePoint {
                time_start,
                nok_per_kwh: 1.2345,
            },
        );

        assert_eq!(
            point.fields.get("price_per_kwh_ore"),
            Some(&FieldValue::Integer(123))
        );
        assert_eq!(point.tags.get("currency"), Some(&"NOK".to_string()));
        assert_eq!(
            point.timestamp.unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 17, 13, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_traffic_point_fields_are_integers() {
        let point = traffic_point(&TrafficCensus {
            total_clients: 812,
            pilot_count: 700,
            controller_count: 100,
            atis_count: 12,
            supervisor_count: 4,
            most_popular_aircraft: "B738".to_string(),
            most_popular_departure: "EGLL".to_string(),
            most_popular_arrival: "KJFK".to_string(),
        });

        assert_eq!(
            point.fields.get("total_clients"),
            Some(&FieldValue::Integer(812))
        );
        assert_eq!(
            point.tags.get("most_popular_aircraft"),
            Some(&"B738".to_string())
        );
    }
}
