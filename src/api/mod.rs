//! Read-side HTTP API
//!
//! Thin REST surface over the store: every endpoint queries the latest
//! persisted data and never touches an upstream provider. No data in the
//! queried window is a 404, a store failure is a 502.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::sink::points::{
    FORECAST_LOCATION_TAG, MEASUREMENT_ENERGY, MEASUREMENT_FORECAST, MEASUREMENT_METAR,
    MEASUREMENT_NETATMO,
};
use crate::sink::{FluxRecord, InfluxSink};

const METAR_FIELDS: &[&str] = &[
    "temp_c",
    "dewpoint_c",
    "wind_dir_deg",
    "wind_speed_kt",
    "altim_hpa",
    "altim_in_hg",
    "visibility_statute_mi",
    "raw_text",
];

const FORECAST_FIELDS: &[&str] = &[
    "temp_c",
    "wind_speed_m_s",
    "cloud_fraction_percent",
    "pressure_hpa",
    "relative_humidity_percent",
    "precip_1h_mm",
    "precip_6h_mm",
    "precip_12h_mm",
];

const NETATMO_FIELDS: &[&str] = &[
    "temperature_c",
    "humidity_percent",
    "pressure_hpa",
    "rain_mm",
    "wind_strength_kmh",
    "wind_angle_deg",
];

/// How far ahead /energy/future looks. Prices publish at most one day
/// out, so two days always covers the full known horizon.
const FUTURE_WINDOW_HOURS: i64 = 48;

/// Read access to the store, as the handlers need it. Split out from the
/// concrete client so handlers can be tested without a running store.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ReadStore: Send + Sync {
    async fn latest_fields(
        &self,
        measurement: String,
        fields: Vec<String>,
        tags: Vec<(String, String)>,
    ) -> anyhow::Result<HashMap<String, Value>>;

    async fn range_values(
        &self,
        measurement: String,
        field: String,
        tags: Vec<(String, String)>,
        start: DateTime<Utc>,
        stop: DateTime<Utc>,
    ) -> anyhow::Result<Vec<FluxRecord>>;
}

#[async_trait]
impl ReadStore for InfluxSink {
    async fn latest_fields(
        &self,
        measurement: String,
        fields: Vec<String>,
        tags: Vec<(String, String)>,
    ) -> anyhow::Result<HashMap<String, Value>> {
        let fields: Vec<&str> = fields.iter().map(String::as_str).collect();
        let tags: Vec<(&str, &str)> = tags
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        InfluxSink::latest_fields(self, &measurement, &fields, &tags).await
    }

    async fn range_values(
        &self,
        measurement: String,
        field: String,
        tags: Vec<(String, String)>,
        start: DateTime<Utc>,
        stop: DateTime<Utc>,
    ) -> anyhow::Result<Vec<FluxRecord>> {
        let tags: Vec<(&str, &str)> = tags
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        InfluxSink::range_values(self, &measurement, &field, &tags, start, stop).await
    }
}

pub struct ApiState {
    pub store: Arc<dyn ReadStore>,
    pub default_station: String,
    pub energy_region: String,
}

#[derive(Debug)]
enum ApiError {
    NotFound,
    Store(anyhow::Error),
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        ApiError::Store(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::NotFound => (
                StatusCode::NOT_FOUND,
                Json(json!({ "error": "no data available" })),
            )
                .into_response(),
            ApiError::Store(e) => {
                tracing::error!(error = %e, "Store query failed");
                (
                    StatusCode::BAD_GATEWAY,
                    Json(json!({ "error": "store unavailable" })),
                )
                    .into_response()
            }
        }
    }
}

/// Create the API router with all endpoints
pub fn create_router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/weather/metar/:station", get(get_metar))
        .route("/weather/forecast", get(get_forecast))
        .route("/weather/netatmo", get(get_netatmo))
        .route("/weather/current", get(get_current))
        .route("/energy/current", get(get_energy_current))
        .route("/energy/future", get(get_energy_future))
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

fn owned(fields: &[&str]) -> Vec<String> {
    fields.iter().map(|f| f.to_string()).collect()
}

async fn metar_for(store: &dyn ReadStore, station: &str) -> anyhow::Result<HashMap<String, Value>> {
    store
        .latest_fields(
            MEASUREMENT_METAR.to_string(),
            owned(METAR_FIELDS),
            vec![("station_id".to_string(), station.to_string())],
        )
        .await
}

/// GET /weather/metar/{station} - Latest reconciled observation
async fn get_metar(
    Path(station): Path<String>,
    State(state): State<Arc<ApiState>>,
) -> Result<Json<Value>, ApiError> {
    let station = station.to_uppercase();
    let fields = metar_for(state.store.as_ref(), &station).await?;
    if fields.is_empty() {
        return Err(ApiError::NotFound);
    }

    let mut body = json!(fields);
    body["station_id"] = json!(station);
    Ok(Json(body))
}

/// GET /weather/forecast - Latest forecast record
async fn get_forecast(State(state): State<Arc<ApiState>>) -> Result<Json<Value>, ApiError> {
    let fields = state
        .store
        .latest_fields(
            MEASUREMENT_FORECAST.to_string(),
            owned(FORECAST_FIELDS),
            vec![("location".to_string(), FORECAST_LOCATION_TAG.to_string())],
        )
        .await?;
    if fields.is_empty() {
        return Err(ApiError::NotFound);
    }
    Ok(Json(json!(fields)))
}

/// GET /weather/netatmo - Latest home station reading
async fn get_netatmo(State(state): State<Arc<ApiState>>) -> Result<Json<Value>, ApiError> {
    let fields = state
        .store
        .latest_fields(MEASUREMENT_NETATMO.to_string(), owned(NETATMO_FIELDS), vec![])
        .await?;
    if fields.is_empty() {
        return Err(ApiError::NotFound);
    }
    Ok(Json(json!(fields)))
}

/// GET /weather/current - Merged view: default-station METAR, forecast
/// and home sensor in one response. 404 only when all three are empty.
async fn get_current(State(state): State<Arc<ApiState>>) -> Result<Json<Value>, ApiError> {
    let metar = metar_for(state.store.as_ref(), &state.default_station).await?;
    let forecast = state
        .store
        .latest_fields(
            MEASUREMENT_FORECAST.to_string(),
            owned(FORECAST_FIELDS),
            vec![("location".to_string(), FORECAST_LOCATION_TAG.to_string())],
        )
        .await?;
    let netatmo = state
        .store
        .latest_fields(MEASUREMENT_NETATMO.to_string(), owned(NETATMO_FIELDS), vec![])
        .await?;

    if metar.is_empty() && forecast.is_empty() && netatmo.is_empty() {
        return Err(ApiError::NotFound);
    }

    Ok(Json(json!({
        "station_id": state.default_station,
        "metar": metar,
        "forecast": forecast,
        "netatmo": netatmo,
    })))
}

/// GET /energy/current - Spot price for the current hour
async fn get_energy_current(State(state): State<Arc<ApiState>>) -> Result<Json<Value>, ApiError> {
    let fields = state
        .store
        .latest_fields(
            MEASUREMENT_ENERGY.to_string(),
            vec!["price_per_kwh_ore".to_string()],
            vec![("region".to_string(), state.energy_region.clone())],
        )
        .await?;

    match fields.get("price_per_kwh_ore") {
        Some(price) => Ok(Json(json!({
            "region": state.energy_region,
            "currency": "NOK",
            "price_per_kwh_ore": price,
        }))),
        None => Err(ApiError::NotFound),
    }
}

/// GET /energy/future - Known upcoming hourly prices
async fn get_energy_future(State(state): State<Arc<ApiState>>) -> Result<Json<Value>, ApiError> {
    let now = Utc::now();
    let records = state
        .store
        .range_values(
            MEASUREMENT_ENERGY.to_string(),
            "price_per_kwh_ore".to_string(),
            vec![("region".to_string(), state.energy_region.clone())],
            now,
            now + ChronoDuration::hours(FUTURE_WINDOW_HOURS),
        )
        .await?;

    if records.is_empty() {
        return Err(ApiError::NotFound);
    }

    let prices: Vec<Value> = records
        .iter()
        .map(|r| {
            json!({
                "time": r.time.map(|t| t.to_rfc3339()),
                "price_per_kwh_ore": r.value,
            })
        })
        .collect();

    Ok(Json(json!({
        "region": state.energy_region,
        "currency": "NOK",
        "prices": prices,
    })))
}

/// Start the read API server
pub async fn start_server(state: Arc<ApiState>, port: u16) -> anyhow::Result<()> {
    let app = create_router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!("Read API listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
