/// Shared domain types for the water quality mapping service.
///
/// Everything the store modules, the importer, and the endpoint exchange
/// lives here: the WaterSource / WaterReport / WaterAlert records, the
/// closed enums behind their TEXT columns, GeoJSON point handling, and
/// the service-wide error types.
///
/// Wire convention: JSON keys are camelCase (`purityScore`, `isSafeForUse`),
/// enum values are snake_case strings (`user_reported`, `new_source`), and
/// the raw pH parameter keeps its capitalized `pH` key.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Geographic point (GeoJSON wire format)
// ---------------------------------------------------------------------------

/// A WGS84 coordinate pair.
///
/// Serialized as a GeoJSON Point:
/// `{"type": "Point", "coordinates": [longitude, latitude]}`.
///
/// Query strings carry `lat` / `lng` as separate degree values; the stored
/// and returned document form is always `[longitude, latitude]`. That
/// ordering inversion is part of the client contract and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "GeoJsonPoint", into = "GeoJsonPoint")]
pub struct GeoPoint {
    pub longitude: f64,
    pub latitude: f64,
}

/// Wire mirror of `GeoPoint`. The `type` member defaults to `"Point"`
/// when absent; any other geometry type is rejected.
#[derive(Serialize, Deserialize)]
struct GeoJsonPoint {
    #[serde(rename = "type", default = "default_geometry_type")]
    geometry_type: String,
    coordinates: [f64; 2],
}

fn default_geometry_type() -> String {
    "Point".to_string()
}

impl TryFrom<GeoJsonPoint> for GeoPoint {
    type Error = String;

    fn try_from(p: GeoJsonPoint) -> Result<Self, Self::Error> {
        if p.geometry_type != "Point" {
            return Err(format!("unsupported geometry type '{}'", p.geometry_type));
        }
        Ok(GeoPoint {
            longitude: p.coordinates[0],
            latitude: p.coordinates[1],
        })
    }
}

impl From<GeoPoint> for GeoJsonPoint {
    fn from(p: GeoPoint) -> Self {
        GeoJsonPoint {
            geometry_type: "Point".to_string(),
            coordinates: [p.longitude, p.latitude],
        }
    }
}

// ---------------------------------------------------------------------------
// Closed enums behind the TEXT columns
// ---------------------------------------------------------------------------

/// Kind of physical water body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaterSourceKind {
    River,
    Lake,
    Ocean,
    Reservoir,
    Pond,
    Well,
    Stream,
}

impl WaterSourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WaterSourceKind::River => "river",
            WaterSourceKind::Lake => "lake",
            WaterSourceKind::Ocean => "ocean",
            WaterSourceKind::Reservoir => "reservoir",
            WaterSourceKind::Pond => "pond",
            WaterSourceKind::Well => "well",
            WaterSourceKind::Stream => "stream",
        }
    }
}

impl std::str::FromStr for WaterSourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "river" => Ok(WaterSourceKind::River),
            "lake" => Ok(WaterSourceKind::Lake),
            "ocean" => Ok(WaterSourceKind::Ocean),
            "reservoir" => Ok(WaterSourceKind::Reservoir),
            "pond" => Ok(WaterSourceKind::Pond),
            "well" => Ok(WaterSourceKind::Well),
            "stream" => Ok(WaterSourceKind::Stream),
            other => Err(format!("unknown water source kind '{}'", other)),
        }
    }
}

/// Categorical bucket of the purity score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollutionLevel {
    Low,
    Moderate,
    High,
    Severe,
}

impl PollutionLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            PollutionLevel::Low => "low",
            PollutionLevel::Moderate => "moderate",
            PollutionLevel::High => "high",
            PollutionLevel::Severe => "severe",
        }
    }
}

impl std::str::FromStr for PollutionLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(PollutionLevel::Low),
            "moderate" => Ok(PollutionLevel::Moderate),
            "high" => Ok(PollutionLevel::High),
            "severe" => Ok(PollutionLevel::Severe),
            other => Err(format!("unknown pollution level '{}'", other)),
        }
    }
}

/// Where a source record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    Api,
    UserReported,
    Government,
    Sensor,
}

impl DataSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataSource::Api => "api",
            DataSource::UserReported => "user_reported",
            DataSource::Government => "government",
            DataSource::Sensor => "sensor",
        }
    }
}

impl std::str::FromStr for DataSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "api" => Ok(DataSource::Api),
            "user_reported" => Ok(DataSource::UserReported),
            "government" => Ok(DataSource::Government),
            "sensor" => Ok(DataSource::Sensor),
            other => Err(format!("unknown data source '{}'", other)),
        }
    }
}

/// What a user report is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportKind {
    NewSource,
    QualityUpdate,
    PollutionAlert,
    CleanupUpdate,
}

impl ReportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportKind::NewSource => "new_source",
            ReportKind::QualityUpdate => "quality_update",
            ReportKind::PollutionAlert => "pollution_alert",
            ReportKind::CleanupUpdate => "cleanup_update",
        }
    }
}

impl std::str::FromStr for ReportKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new_source" => Ok(ReportKind::NewSource),
            "quality_update" => Ok(ReportKind::QualityUpdate),
            "pollution_alert" => Ok(ReportKind::PollutionAlert),
            "cleanup_update" => Ok(ReportKind::CleanupUpdate),
            other => Err(format!("unknown report type '{}'", other)),
        }
    }
}

/// Moderation state of a report. Only external moderation moves a report
/// out of `Pending`; the core never changes status itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Pending,
    Verified,
    Rejected,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::Pending => "pending",
            ReportStatus::Verified => "verified",
            ReportStatus::Rejected => "rejected",
        }
    }
}

impl std::str::FromStr for ReportStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ReportStatus::Pending),
            "verified" => Ok(ReportStatus::Verified),
            "rejected" => Ok(ReportStatus::Rejected),
            other => Err(format!("unknown report status '{}'", other)),
        }
    }
}

/// Category of a quality alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    HighPollution,
    Contamination,
    Unsafe,
    SevereDegradation,
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::HighPollution => "high_pollution",
            AlertKind::Contamination => "contamination",
            AlertKind::Unsafe => "unsafe",
            AlertKind::SevereDegradation => "severe_degradation",
        }
    }
}

impl std::str::FromStr for AlertKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "high_pollution" => Ok(AlertKind::HighPollution),
            "contamination" => Ok(AlertKind::Contamination),
            "unsafe" => Ok(AlertKind::Unsafe),
            "severe_degradation" => Ok(AlertKind::SevereDegradation),
            other => Err(format!("unknown alert type '{}'", other)),
        }
    }
}

/// Alert severity. Ordering is semantic (critical outranks high outranks
/// medium outranks low), not lexicographic — use `rank()` for sorting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl AlertSeverity {
    /// Numeric rank for ordering: higher is more severe.
    pub fn rank(&self) -> u8 {
        match self {
            AlertSeverity::Low => 0,
            AlertSeverity::Medium => 1,
            AlertSeverity::High => 2,
            AlertSeverity::Critical => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSeverity::Low => "low",
            AlertSeverity::Medium => "medium",
            AlertSeverity::High => "high",
            AlertSeverity::Critical => "critical",
        }
    }
}

impl std::str::FromStr for AlertSeverity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(AlertSeverity::Low),
            "medium" => Ok(AlertSeverity::Medium),
            "high" => Ok(AlertSeverity::High),
            "critical" => Ok(AlertSeverity::Critical),
            other => Err(format!("unknown alert severity '{}'", other)),
        }
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// Raw and derived quality metrics for a source.
///
/// The derived trio (`purityScore`, `pollutionLevel`, `severityScore`) is
/// computed at write time and stored — never recomputed on read — so it
/// always reflects the last metrics-producing event (import or merge).
/// Raw parameters are independently nullable; most feeds carry a subset.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityMetrics {
    pub purity_score: f64,
    pub pollution_level: PollutionLevel,
    pub severity_score: f64,
    #[serde(rename = "pH", skip_serializing_if = "Option::is_none")]
    pub ph: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dissolved_oxygen: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub turbidity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conductivity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tds: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bod: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cod: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nitrate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phosphate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fecal_coliform: Option<f64>,
}

/// The canonical record for a physical water body or access point.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaterSource {
    pub id: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: WaterSourceKind,
    pub location: GeoPoint,
    pub quality_metrics: QualityMetrics,
    pub data_source: DataSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    pub is_verified: bool,
    pub is_safe_for_use: bool,
    pub reports_count: i32,
    pub last_updated: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Free-form observations attached to a user report. Every field is
/// optional; an absent `estimatedPurity` means the report carries no
/// metric and merges without changing the source's purity.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportObservations {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub water_color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub odor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visible_pollution: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pollution_type: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_purity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub water_type: Option<WaterSourceKind>,
}

/// A user-submitted observation about a source (existing or new).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaterReport {
    pub id: i64,
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub water_source_id: Option<i64>,
    pub report_type: ReportKind,
    pub location: GeoPoint,
    pub observations: ReportObservations,
    pub description: String,
    pub photos: Vec<String>,
    pub status: ReportStatus,
    pub upvotes: i32,
    pub downvotes: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verified_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verified_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// An active or resolved quality alert tied to one source.
///
/// `resolved_at` is set exactly when `is_active` transitions to false;
/// the core never auto-resolves.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaterAlert {
    pub id: i64,
    pub water_source_id: i64,
    pub alert_type: AlertKind,
    pub severity: AlertSeverity,
    pub message: String,
    pub affected_radius: f64,
    pub is_active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Water Quality Portal client error.
#[derive(Debug, Error)]
pub enum WqpError {
    /// Non-success HTTP status from the provider.
    #[error("provider returned HTTP status {0}")]
    Http(u16),
    /// Transport-level failure (connect, timeout, TLS).
    #[error("provider request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// Response body did not match the expected feed structure.
    #[error("failed to parse provider response: {0}")]
    Parse(String),
}

/// Service-level error, one variant per failure class the endpoint maps
/// to a status code. NotFound is never a server error; Upstream surfaces
/// only on the importer path.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("upstream provider error: {0}")]
    Upstream(#[from] WqpError),
    #[error("store operation failed: {0}")]
    Persistence(String),
}

impl From<postgres::Error> for ServiceError {
    fn from(e: postgres::Error) -> Self {
        ServiceError::Persistence(e.to_string())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
