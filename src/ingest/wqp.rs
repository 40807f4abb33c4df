/// Water Quality Portal (WQP) client: URL construction and feed parsing.
///
/// The portal's result search endpoint returns a GeoJSON FeatureCollection;
/// each feature is one monitoring location with measured parameters in its
/// `properties`. The feed is messy in two ways this module has to absorb:
/// numeric parameters arrive as JSON numbers or as strings depending on the
/// upstream lab, and individual features can lack geometry, an identifier,
/// or any given parameter. Parsing is therefore maximally lenient per
/// field; record-level completeness rules live in the importer.

use serde::Deserialize;
use std::time::Duration;

use crate::model::{GeoPoint, WaterSourceKind, WqpError};

// ---------------------------------------------------------------------------
// URL construction
// ---------------------------------------------------------------------------

/// Builds the result search URL for a point-radius query. The portal speaks
/// miles for `within` and uses `long`, not `lng`.
pub fn result_url(base_url: &str, lat: f64, lng: f64, within_miles: f64) -> String {
    format!(
        "{}?lat={}&long={}&within={}&mimeType=json&zip=no",
        base_url, lat, lng, within_miles
    )
}

// ---------------------------------------------------------------------------
// Feed structures
// ---------------------------------------------------------------------------

/// One monitoring location flattened out of the feed. Everything is
/// optional; the importer decides which absences disqualify a record.
#[derive(Debug, Clone, Default)]
pub struct FeatureRecord {
    pub external_id: Option<String>,
    pub name: Option<String>,
    pub location_type: Option<String>,
    pub location: Option<GeoPoint>,
    pub ph: Option<f64>,
    pub dissolved_oxygen: Option<f64>,
    pub turbidity: Option<f64>,
    pub temperature: Option<f64>,
    pub fecal_coliform: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ResultFeed {
    #[serde(default)]
    features: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct Feature {
    #[serde(default, deserialize_with = "lenient_geometry")]
    geometry: Option<Geometry>,
    #[serde(default, deserialize_with = "lenient_properties")]
    properties: Properties,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    #[serde(default, deserialize_with = "flexible_coordinates")]
    coordinates: Vec<Option<f64>>,
}

#[derive(Debug, Default, Deserialize)]
struct Properties {
    #[serde(rename = "MonitoringLocationIdentifier")]
    monitoring_location_identifier: Option<String>,
    #[serde(rename = "MonitoringLocationName")]
    monitoring_location_name: Option<String>,
    #[serde(rename = "MonitoringLocationTypeName")]
    monitoring_location_type_name: Option<String>,
    #[serde(rename = "pH", default, deserialize_with = "flexible_number")]
    ph: Option<f64>,
    #[serde(rename = "DissolvedOxygen", default, deserialize_with = "flexible_number")]
    dissolved_oxygen: Option<f64>,
    #[serde(rename = "Turbidity", default, deserialize_with = "flexible_number")]
    turbidity: Option<f64>,
    #[serde(rename = "Temperature", default, deserialize_with = "flexible_number")]
    temperature: Option<f64>,
    #[serde(rename = "FecalColiform", default, deserialize_with = "flexible_number")]
    fecal_coliform: Option<f64>,
}

/// Accepts a JSON number or a numeric string. Anything else (labs send
/// "N/A" and worse) reads as absent rather than failing the whole feature.
fn flexible_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = serde_json::Value::deserialize(deserializer)?;
    Ok(coerce_number(&raw))
}

/// Coordinates are coerced one member at a time; a non-numeric member keeps
/// a hole at its position, so junk can never shift the [lng, lat] pairing.
fn flexible_coordinates<'de, D>(deserializer: D) -> Result<Vec<Option<f64>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Array(items) => Ok(items.iter().map(coerce_number).collect()),
        _ => Ok(Vec::new()),
    }
}

/// A geometry of the wrong shape entirely (a number, a string) reads as no
/// geometry; the importer reports the record as a skip.
fn lenient_geometry<'de, D>(deserializer: D) -> Result<Option<Geometry>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = serde_json::Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(raw).unwrap_or_default())
}

/// Properties that are not an object read as empty, leaving the record to
/// be skipped for its missing identifier.
fn lenient_properties<'de, D>(deserializer: D) -> Result<Properties, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = serde_json::Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(raw).unwrap_or_default())
}

fn coerce_number(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parses a result feed into flat records.
///
/// A missing `features` member is an empty feed, not an error. Malformed
/// pieces inside a feature (geometry of the wrong shape, junk measurement
/// values) read as absent, so the record still reaches the importer and is
/// skipped there with a reason. Only a feature that is not a JSON object at
/// all is dropped here, with a warning.
pub fn parse_result_feed(json: &str) -> Result<Vec<FeatureRecord>, WqpError> {
    let feed: ResultFeed = serde_json::from_str(json)
        .map_err(|e| WqpError::Parse(format!("invalid result feed: {}", e)))?;

    let mut records = Vec::with_capacity(feed.features.len());
    for raw in feed.features {
        match serde_json::from_value::<Feature>(raw) {
            Ok(feature) => records.push(flatten(feature)),
            Err(e) => log::warn!("dropping unparseable feature: {}", e),
        }
    }

    Ok(records)
}

fn flatten(feature: Feature) -> FeatureRecord {
    let location = feature.geometry.and_then(|g| match g.coordinates.as_slice() {
        // GeoJSON order: [longitude, latitude], extra members ignored.
        [Some(longitude), Some(latitude), ..] => Some(GeoPoint {
            longitude: *longitude,
            latitude: *latitude,
        }),
        _ => None,
    });

    let p = feature.properties;
    FeatureRecord {
        external_id: non_blank(p.monitoring_location_identifier),
        name: non_blank(p.monitoring_location_name),
        location_type: p.monitoring_location_type_name,
        location,
        ph: p.ph,
        dissolved_oxygen: p.dissolved_oxygen,
        turbidity: p.turbidity,
        temperature: p.temperature,
        fecal_coliform: p.fecal_coliform,
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

// ---------------------------------------------------------------------------
// Location type mapping
// ---------------------------------------------------------------------------

/// Maps the portal's free-text location type to a source kind.
///
/// Substring chain, first match wins: "Great Lake Reservoir" is a lake.
/// Unknown or absent types default to stream.
pub fn map_location_type(type_name: &str) -> WaterSourceKind {
    let lowered = type_name.to_lowercase();

    if lowered.contains("ocean") || lowered.contains("marine") {
        WaterSourceKind::Ocean
    } else if lowered.contains("lake") {
        WaterSourceKind::Lake
    } else if lowered.contains("river") {
        WaterSourceKind::River
    } else if lowered.contains("stream") {
        WaterSourceKind::Stream
    } else if lowered.contains("reservoir") {
        WaterSourceKind::Reservoir
    } else if lowered.contains("well") {
        WaterSourceKind::Well
    } else {
        WaterSourceKind::Stream
    }
}

// ---------------------------------------------------------------------------
// Fetching
// ---------------------------------------------------------------------------

/// Builds the blocking HTTP client used for portal calls.
pub fn http_client(timeout_seconds: u64) -> Result<reqwest::blocking::Client, WqpError> {
    reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(timeout_seconds))
        .build()
        .map_err(WqpError::from)
}

/// Fetches and parses monitoring locations around a point.
pub fn fetch_features(
    http: &reqwest::blocking::Client,
    base_url: &str,
    lat: f64,
    lng: f64,
    within_miles: f64,
) -> Result<Vec<FeatureRecord>, WqpError> {
    let url = result_url(base_url, lat, lng, within_miles);
    log::debug!("fetching WQP results: {}", url);

    let response = http.get(&url).send()?;
    if !response.status().is_success() {
        return Err(WqpError::Http(response.status().as_u16()));
    }

    let body = response.text()?;
    parse_result_feed(&body)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
