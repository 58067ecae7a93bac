//! End-to-end pipeline tests
//!
//! Exercises the public surface from raw observations through
//! reconciliation to rendered store points, without any network.

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::{FixedOffset, TimeZone, Utc};

    use skywatch::providers::VatsimMetarClient;
    use skywatch::reconcile::Reconciler;
    use skywatch::sink::{points, DataPoint, FieldValue, PointWriter};
    use skywatch::types::{EnergyPricePoint, ProviderId, StationObservation};

    /// In-memory writer capturing every point for assertions.
    struct RecordingWriter {
        points: Mutex<Vec<DataPoint>>,
    }

    impl RecordingWriter {
        fn new() -> Self {
            Self {
                points: Mutex::new(Vec::new()),
            }
        }

        fn recorded(&self) -> Vec<DataPoint> {
            self.points.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PointWriter for RecordingWriter {
        async fn write_point(&self, point: &DataPoint) -> anyhow::Result<()> {
            self.points.lock().unwrap().push(point.clone());
            Ok(())
        }
    }

    fn observation(station: &str, temp: Option<f64>) -> StationObservation {
        StationObservation {
            station_id: station.to_string(),
            observation_time: None,
            temp_c: temp,
            dewpoint_c: None,
            wind_dir_deg: None,
            wind_speed_kt: None,
            altim_hpa: None,
            altim_inhg: None,
            visibility_statute_mi: None,
            raw_text: format!("{station} 171450Z"),
        }
    }

    #[tokio::test]
    async fn test_three_provider_reconciliation_prefers_first_in_priority() {
        let stations = vec!["ENZV".to_string()];
        let per_provider = HashMap::from([
            (ProviderId::Faa, vec![observation("ENZV", Some(10.0))]),
            (ProviderId::CheckWx, vec![observation("ENZV", Some(9.0))]),
            (ProviderId::Vatsim, vec![observation("ENZV", Some(8.0))]),
        ]);

        let reconciler = Reconciler::new(vec![
            ProviderId::Faa,
            ProviderId::CheckWx,
            ProviderId::Vatsim,
        ]);
        let reconciled = reconciler.reconcile(&stations, &per_provider);

        let chosen = reconciled.get("ENZV").unwrap();
        assert_eq!(chosen.provider, ProviderId::Faa);
        assert_eq!(chosen.observation.temp_c, Some(10.0));

        let writer = RecordingWriter::new();
        writer
            .write_point(&points::metar_point(chosen))
            .await
            .unwrap();

        let recorded = writer.recorded();
        assert_eq!(recorded.len(), 1);
        assert_eq!(
            recorded[0].fields.get("temp_c"),
            Some(&FieldValue::Float(10.0))
        );
        assert_eq!(
            recorded[0].tags.get("provider"),
            Some(&"FAA".to_string())
        );
    }

    #[tokio::test]
    async fn test_raw_metar_feeds_reconciliation_as_fallback() {
        let raw = "ENZV 171450Z 12015G25KT 9999 OVC020 10/07 Q1013";
        let parsed = VatsimMetarClient::parse_raw_metar(raw).unwrap();
        assert_eq!(parsed.temp_c, Some(10.0));
        assert_eq!(parsed.wind_speed_kt, Some(15.0));

        let stations = vec!["ENZV".to_string()];
        let per_provider = HashMap::from([(ProviderId::Vatsim, vec![parsed])]);
        let reconciler = Reconciler::new(vec![
            ProviderId::Faa,
            ProviderId::CheckWx,
            ProviderId::Vatsim,
        ]);
        let reconciled = reconciler.reconcile(&stations, &per_provider);

        let chosen = reconciled.get("ENZV").unwrap();
        assert_eq!(chosen.provider, ProviderId::Vatsim);
        assert_eq!(chosen.observation.raw_text, raw);
    }

    #[test]
    fn test_energy_price_renders_as_integer_ore_line() {
        let time_start = FixedOffset::east_opt(3600)
            .unwrap()
            .with_ymd_and_hms(2024, 1, 17, 14, 0, 0)
            .unwrap();
        let point = points::energy_point(
            "NO2",
            &EnergyPricePoint {
                time_start,
                nok_per_kwh: 1.2345,
            },
        );

        let line = point.to_line_protocol().unwrap();
        let expected_ts = Utc
            .with_ymd_and_hms(2024, 1, 17, 13, 0, 0)
            .unwrap()
            .timestamp_millis();
        assert_eq!(
            line,
            format!("energy_prices,currency=NOK,region=NO2 price_per_kwh_ore=123i {expected_ts}")
        );
    }

    #[test]
    fn test_station_missing_everywhere_is_omitted() {
        let stations = vec!["ENZV".to_string(), "ENGM".to_string()];
        let per_provider = HashMap::from([(ProviderId::Faa, vec![observation("ENZV", Some(4.0))])]);

        let reconciler = Reconciler::new(vec![ProviderId::Faa]);
        let reconciled = reconciler.reconcile(&stations, &per_provider);

        assert_eq!(reconciled.len(), 1);
        assert!(!reconciled.contains_key("ENGM"));
    }
}
