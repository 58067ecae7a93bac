//! Netatmo home weather station adapter
//!
//! OAuth2 refresh-token flow: tokens live in an injected `TokenStore`
//! (a JSON file by default), are refreshed unconditionally before every
//! data fetch, and the rotated pair is persisted immediately. Token state
//! is never process-global.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ProviderError;
use crate::types::StationSensorReading;

const TOKEN_URL: &str = "https://api.netatmo.com/oauth2/token";
const STATIONS_URL: &str = "https://api.netatmo.com/api/getstationsdata";

/// Access/refresh token pair as persisted between runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default)]
    pub updated_at: Option<String>,
}

/// Persistence seam for the OAuth tokens. The default store is a file;
/// tests and alternative deployments (secret managers) inject their own.
pub trait TokenStore: Send + Sync {
    fn load(&self) -> anyhow::Result<Option<TokenPair>>;
    fn save(&self, tokens: &TokenPair) -> anyhow::Result<()>;
}

/// File-backed token store at a fixed path.
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> anyhow::Result<Option<TokenPair>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(&self.path)?;
        Ok(Some(serde_json::from_str(&raw)?))
    }

    fn save(&self, tokens: &TokenPair) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(tokens)?)?;
        tracing::info!(path = %self.path.display(), "Netatmo tokens saved");
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access_token: String,
    refresh_token: String,
}

#[derive(Debug, Deserialize)]
struct StationsResponse {
    #[serde(default)]
    body: StationsBody,
}

#[derive(Debug, Default, Deserialize)]
struct StationsBody {
    #[serde(default)]
    devices: Vec<Device>,
}

#[derive(Debug, Deserialize)]
struct Device {
    station_name: Option<String>,
    #[serde(default)]
    dashboard_data: DashboardData,
}

#[derive(Debug, Default, Deserialize)]
struct DashboardData {
    #[serde(rename = "Temperature")]
    temperature: Option<f64>,
    #[serde(rename = "Humidity")]
    humidity: Option<f64>,
    #[serde(rename = "Pressure")]
    pressure: Option<f64>,
    #[serde(rename = "Rain")]
    rain: Option<f64>,
    #[serde(rename = "WindStrength")]
    wind_strength: Option<f64>,
    #[serde(rename = "WindAngle")]
    wind_angle: Option<f64>,
    time_utc: Option<i64>,
}

pub struct NetatmoClient {
    client: reqwest::Client,
    client_id: String,
    client_secret: String,
    store: Box<dyn TokenStore>,
}

impl NetatmoClient {
    pub fn new(
        client_id: String,
        client_secret: String,
        store: Box<dyn TokenStore>,
        timeout: Duration,
    ) -> Self {
        Self {
            client: super::http_client(timeout),
            client_id,
            client_secret,
            store,
        }
    }

    /// Refresh the access token unconditionally and persist the rotated
    /// pair. Any failure here is fatal to this tick's fetch only.
    async fn refresh_token(&self) -> Result<String, ProviderError> {
        let current = self
            .store
            .load()
            .map_err(|e| ProviderError::auth(format!("token store load failed: {e}")))?
            .ok_or_else(|| ProviderError::auth("no refresh token available"))?;

        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", current.refresh_token.as_str()),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
        ];

        let response = self.client.post(TOKEN_URL).form(&params).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::auth(format!(
                "token refresh rejected: {status} [{body}]"
            )));
        }

        let refreshed: RefreshResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::auth(format!("token refresh payload: {e}")))?;

        let pair = TokenPair {
            access_token: refreshed.access_token.clone(),
            refresh_token: refreshed.refresh_token,
            updated_at: Some(Utc::now().to_rfc3339()),
        };
        self.store
            .save(&pair)
            .map_err(|e| ProviderError::auth(format!("token store save failed: {e}")))?;

        tracing::info!("Netatmo access token refreshed");
        Ok(pair.access_token)
    }

    pub async fn fetch(&self) -> Result<StationSensorReading, ProviderError> {
        let token = self.refresh_token().await?;

        let response = self
            .client
            .get(STATIONS_URL)
            .bearer_auth(&token)
            .query(&[("get_favorites", "false")])
            .send()
            .await?
            .error_for_status()?;
        let body = response.text().await?;

        let parsed: StationsResponse = serde_json::from_str(&body)
            .map_err(|e| ProviderError::parse(format!("Netatmo payload: {e}")))?;

        Self::normalize(parsed)
    }

    fn normalize(parsed: StationsResponse) -> Result<StationSensorReading, ProviderError> {
        let device = parsed
            .body
            .devices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::no_data("no Netatmo devices found"))?;

        let dash = device.dashboard_data;
        Ok(StationSensorReading {
            station_name: device
                .station_name
                .unwrap_or_else(|| "Unknown Station".to_string()),
            temperature_c: dash.temperature,
            humidity_percent: dash.humidity,
            pressure_hpa: dash.pressure,
            rain_mm: dash.rain,
            wind_strength_kmh: dash.wind_strength,
            wind_angle_deg: dash.wind_angle,
            time_utc: dash.time_utc,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_file_token_store_round_trip() {
        let dir = std::env::temp_dir().join("skywatch-token-test");
        let path = dir.join("netatmo_tokens.json");
        let _ = std::fs::remove_file(&path);

        let store = FileTokenStore::new(&path);
        assert!(store.load().unwrap().is_none());

        let pair = TokenPair {
            access_token: "access".into(),
            refresh_token: "refresh".into(),
            updated_at: None,
        };
        store.save(&pair).unwrap();

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.access_token, "access");
        assert_eq!(loaded.refresh_token, "refresh");

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_normalize_first_device_wins() {
        let parsed: StationsResponse = serde_json::from_value(json!({
            "body": { "devices": [
                {
                    "station_name": "Home",
                    "dashboard_data": {
                        "Temperature": 21.5,
                        "Humidity": 45.0,
                        "Pressure": 1012.3,
                        "Rain": 0.4,
                        "time_utc": 1_705_500_000
                    }
                },
                { "station_name": "Cabin", "dashboard_data": { "Temperature": 5.0 } }
            ]}
        }))
        .unwrap();

        let reading = NetatmoClient::normalize(parsed).unwrap();
        assert_eq!(reading.station_name, "Home");
        assert_eq!(reading.temperature_c, Some(21.5));
        // Wind modules are optional accessories
        assert_eq!(reading.wind_strength_kmh, None);
        assert_eq!(reading.wind_angle_deg, None);
    }

    #[test]
    fn test_no_devices_is_no_data() {
        let parsed: StationsResponse =
            serde_json::from_value(json!({ "body": { "devices": [] } })).unwrap();
        assert!(matches!(
            NetatmoClient::normalize(parsed).unwrap_err(),
            ProviderError::NoData { .. }
        ));
    }
}
