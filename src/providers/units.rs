//! Canonical unit conversions shared by the METAR adapters

use serde_json::Value;

/// Hectopascals per inch of mercury
pub const HPA_PER_INHG: f64 = 33.8639;

/// Visibility reported as the sentinel "9999" means >= 10 km
pub const VISIBILITY_SENTINEL_MI: f64 = 6.2;

pub fn hpa_to_inhg(hpa: f64) -> f64 {
    hpa / HPA_PER_INHG
}

pub fn inhg_to_hpa(inhg: f64) -> f64 {
    inhg * HPA_PER_INHG
}

/// Extract an f64 from a JSON value that may be a number or a numeric
/// string. Anything else is treated as field-level absence.
pub fn value_to_f64(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Parse a raw visibility value into statute miles.
///
/// Two documented special cases: the sentinel "9999" (>= 10 km) maps to a
/// fixed 6.2 mi, and a "greater-than" suffix like "10+" is stripped before
/// parsing the numeric remainder.
pub fn parse_visibility_mi(raw: Option<&Value>) -> Option<f64> {
    let text = match raw? {
        Value::Number(n) => return n.as_f64(),
        Value::String(s) => s.trim().to_string(),
        _ => return None,
    };
    if text == "9999" {
        return Some(VISIBILITY_SENTINEL_MI);
    }
    if let Some(base) = text.strip_suffix('+') {
        return base.trim().parse::<f64>().ok();
    }
    text.parse::<f64>().ok()
}
