//! Persistence sink - InfluxDB 2.x write and query client
//!
//! The write path speaks line protocol against `/api/v2/write`; the read
//! path runs Flux queries against `/api/v2/query` and parses the
//! annotated-CSV responses. Every write is a self-contained call: no
//! retries, no cross-point atomicity, and the client is safe to share
//! between both scheduler cycles.

pub mod points;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use csv::ReaderBuilder;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use crate::config::InfluxConfig;

/// A single typed field value, matching what the store distinguishes on
/// the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Float(f64),
    Integer(i64),
    Text(String),
}

/// One point in the store's write format: measurement + tags + fields +
/// optional explicit timestamp (the store assigns ingestion time when
/// absent).
#[derive(Debug, Clone)]
pub struct DataPoint {
    pub measurement: String,
    pub tags: BTreeMap<String, String>,
    pub fields: BTreeMap<String, FieldValue>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl DataPoint {
    pub fn new<S: Into<String>>(measurement: S) -> Self {
        Self {
            measurement: measurement.into(),
            tags: BTreeMap::new(),
            fields: BTreeMap::new(),
            timestamp: None,
        }
    }

    pub fn tag<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn field_f64<K: Into<String>>(mut self, key: K, value: f64) -> Self {
        self.fields.insert(key.into(), FieldValue::Float(value));
        self
    }

    /// Insert a float field only when the reading is present;
    /// "unavailable" stays out of the store rather than masquerading as a
    /// number.
    pub fn maybe_field_f64<K: Into<String>>(self, key: K, value: Option<f64>) -> Self {
        match value {
            Some(v) => self.field_f64(key, v),
            None => self,
        }
    }

    pub fn field_i64<K: Into<String>>(mut self, key: K, value: i64) -> Self {
        self.fields.insert(key.into(), FieldValue::Integer(value));
        self
    }

    pub fn field_text<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.fields.insert(key.into(), FieldValue::Text(value.into()));
        self
    }

    pub fn timestamp(mut self, ts: DateTime<Utc>) -> Self {
        self.timestamp = Some(ts);
        self
    }

    /// Render as one line of InfluxDB line protocol (millisecond
    /// precision). A point with no fields is unrepresentable and
    /// rejected by the caller.
    pub fn to_line_protocol(&self) -> Result<String> {
        if self.fields.is_empty() {
            bail!("point '{}' has no fields", self.measurement);
        }

        let mut line = escape_measurement(&self.measurement);
        for (key, value) in &self.tags {
            line.push(',');
            line.push_str(&escape_key(key));
            line.push('=');
            line.push_str(&escape_key(value));
        }
        line.push(' ');

        let rendered: Vec<String> = self
            .fields
            .iter()
            .map(|(key, value)| {
                let rendered_value = match value {
                    FieldValue::Float(v) => format!("{v}"),
                    FieldValue::Integer(v) => format!("{v}i"),
                    FieldValue::Text(v) => format!("\"{}\"", escape_string_field(v)),
                };
                format!("{}={}", escape_key(key), rendered_value)
            })
            .collect();
        line.push_str(&rendered.join(","));

        if let Some(ts) = self.timestamp {
            line.push(' ');
            line.push_str(&ts.timestamp_millis().to_string());
        }
        Ok(line)
    }
}

fn escape_measurement(s: &str) -> String {
    s.replace(',', "\\,").replace(' ', "\\ ")
}

fn escape_key(s: &str) -> String {
    s.replace(',', "\\,").replace('=', "\\=").replace(' ', "\\ ")
}

fn escape_string_field(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Write seam between the scheduler and the store. Each call is
/// independent; a failure is the caller's to log and never rolls back
/// sibling writes in the same tick.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PointWriter: Send + Sync {
    async fn write_point(&self, point: &DataPoint) -> Result<()>;
}

/// One field's latest value as returned by the read path.
#[derive(Debug, Clone, PartialEq)]
pub struct FluxRecord {
    pub field: String,
    pub value: serde_json::Value,
    pub time: Option<DateTime<Utc>>,
}

pub struct InfluxSink {
    client: reqwest::Client,
    base_url: String,
    token: String,
    org: String,
    bucket: String,
}

impl InfluxSink {
    pub fn new(config: &InfluxConfig, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to create HTTP client");
        Self {
            client,
            base_url: config.base_url(),
            token: config.token.clone(),
            org: config.org.clone(),
            bucket: config.bucket.clone(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Run a Flux query and return the parsed annotated-CSV records.
    pub async fn query(&self, flux: &str) -> Result<Vec<FluxRecord>> {
        let url = format!("{}/api/v2/query?org={}", self.base_url, self.org);
        let body = serde_json::json!({ "query": flux, "type": "flux" });

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Token {}", self.token))
            .header("Accept", "application/csv")
            .json(&body)
            .send()
            .await
            .context("Failed to send Flux query")?;

        let status = response.status();
        let text = response.text().await.context("Failed to read query body")?;
        if !status.is_success() {
            bail!("Flux query failed: {} [{}]", status, text);
        }

        parse_annotated_csv(&text)
    }

    /// Latest value per field for one measurement within the last hour,
    /// optionally filtered by tags.
    pub async fn latest_fields(
        &self,
        measurement: &str,
        fields: &[&str],
        tags: &[(&str, &str)],
    ) -> Result<HashMap<String, serde_json::Value>> {
        let tag_filters: String = tags
            .iter()
            .map(|(k, v)| format!(" and r[\"{k}\"] == \"{v}\""))
            .collect();
        let field_filter = fields
            .iter()
            .map(|f| format!("r._field == \"{f}\""))
            .collect::<Vec<_>>()
            .join(" or ");

        let flux = format!(
            "from(bucket: \"{bucket}\")\n\
             |> range(start: -1h)\n\
             |> filter(fn: (r) => r._measurement == \"{measurement}\"{tag_filters} and ({field_filter}))\n\
             |> last()",
            bucket = self.bucket,
        );

        let records = self.query(&flux).await?;
        Ok(records
            .into_iter()
            .map(|r| (r.field, r.value))
            .collect())
    }

    /// All values of one field over a time window, ascending by time.
    pub async fn range_values(
        &self,
        measurement: &str,
        field: &str,
        tags: &[(&str, &str)],
        start: DateTime<Utc>,
        stop: DateTime<Utc>,
    ) -> Result<Vec<FluxRecord>> {
        let tag_filters: String = tags
            .iter()
            .map(|(k, v)| format!(" and r[\"{k}\"] == \"{v}\""))
            .collect();

        let flux = format!(
            "from(bucket: \"{bucket}\")\n\
             |> range(start: {start}, stop: {stop})\n\
             |> filter(fn: (r) => r._measurement == \"{measurement}\"{tag_filters} and r._field == \"{field}\")\n\
             |> sort(columns: [\"_time\"], desc: false)",
            bucket = self.bucket,
            start = start.to_rfc3339(),
            stop = stop.to_rfc3339(),
        );

        let mut records = self.query(&flux).await?;
        records.sort_by_key(|r| r.time);
        Ok(records)
    }
}

#[async_trait]
impl PointWriter for InfluxSink {
    async fn write_point(&self, point: &DataPoint) -> Result<()> {
        let line = point.to_line_protocol()?;
        let url = format!(
            "{}/api/v2/write?org={}&bucket={}&precision=ms",
            self.base_url, self.org, self.bucket
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Token {}", self.token))
            .header("Content-Type", "text/plain; charset=utf-8")
            .body(line)
            .send()
            .await
            .with_context(|| format!("Failed to write point '{}'", point.measurement))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            bail!(
                "Store rejected point '{}': {} [{}]",
                point.measurement,
                status,
                body
            );
        }
        Ok(())
    }
}

/// Parse Influx annotated CSV. Annotation lines start with '#'; each
/// result table re-issues its header row, recognized by the `_value`
/// column marker.
pub fn parse_annotated_csv(text: &str) -> Result<Vec<FluxRecord>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .comment(Some(b'#'))
        .from_reader(text.as_bytes());

    let mut field_idx: Option<usize> = None;
    let mut value_idx: Option<usize> = None;
    let mut time_idx: Option<usize> = None;
    let mut records = Vec::new();

    for row in reader.records() {
        let row = row.context("Malformed annotated CSV row")?;
        if row.iter().all(|cell| cell.is_empty()) {
            continue;
        }

        if row.iter().any(|cell| cell == "_value") {
            field_idx = row.iter().position(|c| c == "_field");
            value_idx = row.iter().position(|c| c == "_value");
            time_idx = row.iter().position(|c| c == "_time");
            continue;
        }

        let (Some(fi), Some(vi)) = (field_idx, value_idx) else {
            bail!("Annotated CSV data row before any header row");
        };

        let field = row.get(fi).unwrap_or_default().to_string();
        let raw_value = row.get(vi).unwrap_or_default();
        let time = time_idx
            .and_then(|ti| row.get(ti))
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|dt| dt.with_timezone(&Utc));

        records.push(FluxRecord {
            field,
            value: parse_cell(raw_value),
            time,
        });
    }

    Ok(records)
}

/// Store values come back untyped in CSV; recover numbers where possible.
fn parse_cell(raw: &str) -> serde_json::Value {
    if let Ok(i) = raw.parse::<i64>() {
        return serde_json::Value::from(i);
    }
    if let Ok(f) = raw.parse::<f64>() {
        return serde_json::Value::from(f);
    }
    serde_json::Value::from(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_line_protocol_rendering() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let point = DataPoint::new("energy_prices")
            .tag("region", "NO2")
            .tag("currency", "NOK")
            .field_i64("price_per_kwh_ore", 123)
            .timestamp(ts);

        assert_eq!(
            point.to_line_protocol().unwrap(),
            "energy_prices,currency=NOK,region=NO2 price_per_kwh_ore=123i 1704067200000"
        );
    }

    #[test]
    fn test_line_protocol_escaping() {
        let point = DataPoint::new("my measurement")
            .tag("station name", "Home, base")
            .field_text("raw_text", "say \"hi\" \\ bye");

        let line = point.to_line_protocol().unwrap();
        assert_eq!(
            line,
            "my\\ measurement,station\\ name=Home\\,\\ base raw_text=\"say \\\"hi\\\" \\\\ bye\""
        );
    }

    #[test]
    fn test_point_without_fields_rejected() {
        let point = DataPoint::new("metar").tag("station_id", "ENZV");
        assert!(point.to_line_protocol().is_err());
    }

    #[test]
    fn test_float_fields_have_no_suffix() {
        let point = DataPoint::new("metar").field_f64("temp_c", 10.0);
        assert_eq!(point.to_line_protocol().unwrap(), "metar temp_c=10");
    }

    #[test]
    fn test_parse_annotated_csv_single_table() {
        let text = "\
#datatype,string,long,dateTime:RFC3339,dateTime:RFC3339,dateTime:RFC3339,double,string,string\n\
#group,false,false,true,true,false,false,true,true\n\
#default,_result,,,,,,,\n\
,result,table,_start,_stop,_time,_value,_field,_measurement\n\
,_result,0,2024-01-01T00:00:00Z,2024-01-01T01:00:00Z,2024-01-01T00:30:00Z,10.5,temp_c,metar\n\
,_result,1,2024-01-01T00:00:00Z,2024-01-01T01:00:00Z,2024-01-01T00:30:00Z,7,dewpoint_c,metar\n";

        let records = parse_annotated_csv(text).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].field, "temp_c");
        assert_eq!(records[0].value, serde_json::json!(10.5));
        assert_eq!(records[1].value, serde_json::json!(7));
        assert!(records[0].time.is_some());
    }

    #[test]
    fn test_parse_annotated_csv_multiple_tables() {
        let text = "\
,result,table,_time,_value,_field,_measurement\n\
,_result,0,2024-01-01T00:30:00Z,10.5,temp_c,metar\n\
\n\
,result,table,_time,_value,_field,_measurement,station_id\n\
,_result,0,2024-01-01T00:30:00Z,ENZV 171450Z,raw_text,metar,ENZV\n";

        let records = parse_annotated_csv(text).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].field, "raw_text");
        assert_eq!(records[1].value, serde_json::json!("ENZV 171450Z"));
    }

    #[test]
    fn test_parse_cell_types() {
        assert_eq!(parse_cell("123"), serde_json::json!(123));
        assert_eq!(parse_cell("1.5"), serde_json::json!(1.5));
        assert_eq!(parse_cell("B738"), serde_json::json!("B738"));
    }
}
