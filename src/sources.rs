/// Water source store: geospatial search, upsert, and CRUD over
/// `water.sources`.
///
/// Geospatial strategy: PostgreSQL narrows candidates with a plain
/// latitude/longitude window (served by `idx_sources_coords`), then exact
/// Haversine filtering and ranking happen in Rust. The degree window
/// over-selects slightly near the corners; the Haversine pass makes the
/// final radius exact.

use postgres::types::ToSql;
use postgres::{GenericClient, Row};
use std::str::FromStr;

use crate::geo::{self, BoundingBox};
use crate::model::{
    DataSource, GeoPoint, PollutionLevel, QualityMetrics, ServiceError, WaterSource,
    WaterSourceKind,
};
use crate::quality;

// ---------------------------------------------------------------------------
// Drafts and filters
// ---------------------------------------------------------------------------

/// Everything needed to create or upsert a source record. The store derives
/// `is_safe_for_use` from the draft's purity at write time; `reports_count`
/// always starts at zero and is owned by the report merge path afterwards.
#[derive(Debug, Clone)]
pub struct SourceDraft {
    pub name: String,
    pub kind: WaterSourceKind,
    pub location: GeoPoint,
    pub metrics: QualityMetrics,
    pub data_source: DataSource,
    pub external_id: Option<String>,
    pub is_verified: bool,
}

/// Attribute filters for `search`. All optional; an empty filter set with
/// no center point returns the best-rated sources service-wide.
#[derive(Debug, Clone, Copy, Default)]
pub struct SourceFilters {
    pub kind: Option<WaterSourceKind>,
    pub min_purity: Option<f64>,
    pub max_severity: Option<f64>,
}

/// A source paired with its distance from a query point. The distance is
/// computed per query and never persisted.
#[derive(Debug, Clone)]
pub struct NearestSource {
    pub source: WaterSource,
    pub distance_km: f64,
}

// ---------------------------------------------------------------------------
// Search
// ---------------------------------------------------------------------------

/// Searches sources by optional proximity and attribute filters.
///
/// Results are ordered best-purity-first and capped at `max_results`. With a
/// center point, the radius filter is applied before the cap, so a large
/// search never starves nearby-but-mediocre sources in favor of distant
/// pristine ones that are outside the radius anyway.
pub fn search(
    client: &mut impl GenericClient,
    near: Option<(GeoPoint, f64)>,
    filters: &SourceFilters,
    max_results: usize,
) -> Result<Vec<WaterSource>, ServiceError> {
    let kind = filters.kind.map(|k| k.as_str());
    let bbox = near
        .as_ref()
        .map(|(center, radius_m)| BoundingBox::around(center, *radius_m));

    let mut conditions: Vec<String> = Vec::new();
    let mut params: Vec<&(dyn ToSql + Sync)> = Vec::new();

    if let Some(ref kind) = kind {
        params.push(kind);
        conditions.push(format!("kind = ${}", params.len()));
    }
    if let Some(ref min_purity) = filters.min_purity {
        params.push(min_purity);
        conditions.push(format!("purity_score >= ${}", params.len()));
    }
    if let Some(ref max_severity) = filters.max_severity {
        params.push(max_severity);
        conditions.push(format!("severity_score <= ${}", params.len()));
    }
    if let Some(ref bbox) = bbox {
        params.push(&bbox.min_lat);
        params.push(&bbox.max_lat);
        conditions.push(format!(
            "latitude BETWEEN ${} AND ${}",
            params.len() - 1,
            params.len()
        ));
        params.push(&bbox.min_lon);
        params.push(&bbox.max_lon);
        conditions.push(format!(
            "longitude BETWEEN ${} AND ${}",
            params.len() - 1,
            params.len()
        ));
    }

    let mut sql = String::from("SELECT * FROM water.sources");
    if !conditions.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&conditions.join(" AND "));
    }
    sql.push_str(" ORDER BY purity_score DESC");
    if near.is_none() {
        // Without a radius to enforce, the cap can be pushed into SQL.
        sql.push_str(&format!(" LIMIT {}", max_results));
    }

    let rows = client.query(sql.as_str(), &params)?;
    let mut sources = rows
        .iter()
        .map(source_from_row)
        .collect::<Result<Vec<_>, _>>()?;

    if let Some((center, radius_m)) = near {
        sources = filter_within_radius(sources, &center, radius_m);
        sources.truncate(max_results);
    }

    Ok(sources)
}

/// Exact-radius filter applied after the SQL window prefilter. Preserves the
/// incoming purity-descending order.
fn filter_within_radius(
    sources: Vec<WaterSource>,
    center: &GeoPoint,
    radius_m: f64,
) -> Vec<WaterSource> {
    let radius_km = radius_m / 1000.0;
    sources
        .into_iter()
        .filter(|s| geo::distance_between_km(center, &s.location) <= radius_km)
        .collect()
}

/// Finds the closest source that is both rated at or above `min_purity` and
/// flagged safe for use. Distance is Haversine, reported in km rounded to
/// two decimals.
///
/// This is a service-wide scan on purpose: "nearest clean water" must not
/// come back empty just because the nearest qualifying source is far away.
pub fn find_nearest_safe(
    client: &mut impl GenericClient,
    point: &GeoPoint,
    min_purity: f64,
) -> Result<Option<NearestSource>, ServiceError> {
    let rows = client.query(
        "SELECT * FROM water.sources WHERE purity_score >= $1 AND is_safe_for_use",
        &[&min_purity],
    )?;

    let mut nearest: Option<NearestSource> = None;
    for row in &rows {
        let source = source_from_row(row)?;
        let distance_km = geo::distance_between_km(point, &source.location);
        let closer = nearest
            .as_ref()
            .map(|n| distance_km < n.distance_km)
            .unwrap_or(true);
        if closer {
            nearest = Some(NearestSource {
                source,
                distance_km,
            });
        }
    }

    Ok(nearest.map(|mut n| {
        n.distance_km = round_two_decimals(n.distance_km);
        n
    }))
}

fn round_two_decimals(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Returns ids of all sources within `radius_m` of `center`. Used by the
/// alert layer to scope "alerts near me" queries.
pub fn ids_within_radius(
    client: &mut impl GenericClient,
    center: &GeoPoint,
    radius_m: f64,
) -> Result<Vec<i64>, ServiceError> {
    let bbox = BoundingBox::around(center, radius_m);
    let rows = client.query(
        "SELECT id, longitude, latitude FROM water.sources
         WHERE latitude BETWEEN $1 AND $2 AND longitude BETWEEN $3 AND $4",
        &[&bbox.min_lat, &bbox.max_lat, &bbox.min_lon, &bbox.max_lon],
    )?;

    let radius_km = radius_m / 1000.0;
    let ids = rows
        .iter()
        .filter(|row| {
            let location = GeoPoint {
                longitude: row.get("longitude"),
                latitude: row.get("latitude"),
            };
            geo::distance_between_km(center, &location) <= radius_km
        })
        .map(|row| row.get("id"))
        .collect();

    Ok(ids)
}

// ---------------------------------------------------------------------------
// Writes
// ---------------------------------------------------------------------------

const SOURCE_COLUMNS: &str = "name, kind, longitude, latitude, \
     purity_score, pollution_level, severity_score, \
     ph, dissolved_oxygen, turbidity, temperature, conductivity, tds, \
     bod, cod, nitrate, phosphate, fecal_coliform, \
     data_source, external_id, is_verified, is_safe_for_use";

const SOURCE_PLACEHOLDERS: &str = "$1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, \
     $12, $13, $14, $15, $16, $17, $18, $19, $20, $21, $22";

/// Shared insert path for `create` and `upsert_by_external_id`; the two
/// differ only in their ON CONFLICT clause.
fn write_source(
    client: &mut impl GenericClient,
    draft: &SourceDraft,
    sql: &str,
) -> Result<WaterSource, ServiceError> {
    let kind = draft.kind.as_str();
    let pollution_level = draft.metrics.pollution_level.as_str();
    let data_source = draft.data_source.as_str();
    let is_safe = quality::is_safe_for_use(draft.metrics.purity_score);
    let m = &draft.metrics;

    let row = client.query_one(
        sql,
        &[
            &draft.name,
            &kind,
            &draft.location.longitude,
            &draft.location.latitude,
            &m.purity_score,
            &pollution_level,
            &m.severity_score,
            &m.ph,
            &m.dissolved_oxygen,
            &m.turbidity,
            &m.temperature,
            &m.conductivity,
            &m.tds,
            &m.bod,
            &m.cod,
            &m.nitrate,
            &m.phosphate,
            &m.fecal_coliform,
            &data_source,
            &draft.external_id,
            &draft.is_verified,
            &is_safe,
        ],
    )?;

    source_from_row(&row)
}

/// Inserts a brand-new source and returns the stored record.
pub fn create(client: &mut impl GenericClient, draft: &SourceDraft) -> Result<WaterSource, ServiceError> {
    let sql = format!(
        "INSERT INTO water.sources ({}) VALUES ({}) RETURNING *",
        SOURCE_COLUMNS, SOURCE_PLACEHOLDERS
    );
    write_source(client, draft, &sql)
}

/// Inserts or updates a source keyed by its external provider identifier.
///
/// Re-importing refreshes every measured and derived field but deliberately
/// leaves `reports_count` and `created_at` alone: user report history
/// belongs to the community, not the provider. Imported records are always
/// marked verified.
pub fn upsert_by_external_id(
    client: &mut impl GenericClient,
    draft: &SourceDraft,
) -> Result<WaterSource, ServiceError> {
    if draft.external_id.is_none() {
        return Err(ServiceError::Validation(
            "external id is required for upsert".to_string(),
        ));
    }

    let sql = format!(
        "INSERT INTO water.sources ({}) VALUES ({})
         ON CONFLICT (external_id) DO UPDATE SET
             name = EXCLUDED.name,
             kind = EXCLUDED.kind,
             longitude = EXCLUDED.longitude,
             latitude = EXCLUDED.latitude,
             purity_score = EXCLUDED.purity_score,
             pollution_level = EXCLUDED.pollution_level,
             severity_score = EXCLUDED.severity_score,
             ph = EXCLUDED.ph,
             dissolved_oxygen = EXCLUDED.dissolved_oxygen,
             turbidity = EXCLUDED.turbidity,
             temperature = EXCLUDED.temperature,
             conductivity = EXCLUDED.conductivity,
             tds = EXCLUDED.tds,
             bod = EXCLUDED.bod,
             cod = EXCLUDED.cod,
             nitrate = EXCLUDED.nitrate,
             phosphate = EXCLUDED.phosphate,
             fecal_coliform = EXCLUDED.fecal_coliform,
             data_source = EXCLUDED.data_source,
             is_verified = EXCLUDED.is_verified,
             is_safe_for_use = EXCLUDED.is_safe_for_use,
             last_updated = NOW()
         RETURNING *",
        SOURCE_COLUMNS, SOURCE_PLACEHOLDERS
    );
    write_source(client, draft, &sql)
}

/// Fetches one source by id.
pub fn get(client: &mut impl GenericClient, id: i64) -> Result<Option<WaterSource>, ServiceError> {
    let row = client.query_opt("SELECT * FROM water.sources WHERE id = $1", &[&id])?;
    row.as_ref().map(source_from_row).transpose()
}

/// Deletes a source, detaching its reports and removing its alerts.
/// Reports survive as standalone records with no source link. Returns
/// false if the id did not exist.
pub fn delete(client: &mut impl GenericClient, id: i64) -> Result<bool, ServiceError> {
    let mut tx = client.transaction()?;
    tx.execute(
        "UPDATE water.reports SET water_source_id = NULL WHERE water_source_id = $1",
        &[&id],
    )?;
    tx.execute("DELETE FROM water.alerts WHERE water_source_id = $1", &[&id])?;
    let deleted = tx.execute("DELETE FROM water.sources WHERE id = $1", &[&id])?;
    tx.commit()?;

    Ok(deleted > 0)
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

/// Maps a `water.sources` row (from `SELECT *` or `RETURNING *`) to the
/// domain record. A row with an unrecognized enum value is a persistence
/// error, not a panic: it means the table was written by something newer
/// or by hand.
pub(crate) fn source_from_row(row: &Row) -> Result<WaterSource, ServiceError> {
    let kind: String = row.get("kind");
    let pollution_level: String = row.get("pollution_level");
    let data_source: String = row.get("data_source");

    Ok(WaterSource {
        id: row.get("id"),
        name: row.get("name"),
        kind: WaterSourceKind::from_str(&kind).map_err(ServiceError::Persistence)?,
        location: GeoPoint {
            longitude: row.get("longitude"),
            latitude: row.get("latitude"),
        },
        quality_metrics: QualityMetrics {
            purity_score: row.get("purity_score"),
            pollution_level: PollutionLevel::from_str(&pollution_level)
                .map_err(ServiceError::Persistence)?,
            severity_score: row.get("severity_score"),
            ph: row.get("ph"),
            dissolved_oxygen: row.get("dissolved_oxygen"),
            turbidity: row.get("turbidity"),
            temperature: row.get("temperature"),
            conductivity: row.get("conductivity"),
            tds: row.get("tds"),
            bod: row.get("bod"),
            cod: row.get("cod"),
            nitrate: row.get("nitrate"),
            phosphate: row.get("phosphate"),
            fecal_coliform: row.get("fecal_coliform"),
        },
        data_source: DataSource::from_str(&data_source).map_err(ServiceError::Persistence)?,
        external_id: row.get("external_id"),
        is_verified: row.get("is_verified"),
        is_safe_for_use: row.get("is_safe_for_use"),
        reports_count: row.get("reports_count"),
        last_updated: row.get("last_updated"),
        created_at: row.get("created_at"),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use crate::model::PollutionLevel;

    fn test_source(id: i64, longitude: f64, latitude: f64, purity: f64) -> WaterSource {
        WaterSource {
            id,
            name: format!("Test Source {}", id),
            kind: WaterSourceKind::River,
            location: GeoPoint {
                longitude,
                latitude,
            },
            quality_metrics: QualityMetrics {
                purity_score: purity,
                pollution_level: PollutionLevel::Moderate,
                severity_score: 5.0,
                ph: None,
                dissolved_oxygen: None,
                turbidity: None,
                temperature: None,
                conductivity: None,
                tds: None,
                bod: None,
                cod: None,
                nitrate: None,
                phosphate: None,
                fecal_coliform: None,
            },
            data_source: DataSource::UserReported,
            external_id: None,
            is_verified: false,
            is_safe_for_use: purity >= quality::SAFE_PURITY_THRESHOLD,
            reports_count: 0,
            last_updated: Utc::now(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_radius_filter_drops_sources_outside_radius() {
        let center = GeoPoint {
            longitude: -89.6,
            latitude: 40.7,
        };
        // ~0 km, ~8 km, and ~96 km east of the center at this latitude.
        let sources = vec![
            test_source(1, -89.6, 40.7, 90.0),
            test_source(2, -89.5, 40.7, 80.0),
            test_source(3, -88.45, 40.7, 70.0),
        ];

        let kept = filter_within_radius(sources, &center, 50_000.0);
        let ids: Vec<i64> = kept.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![1, 2], "only sources within 50km should remain");
    }

    #[test]
    fn test_radius_filter_preserves_order() {
        let center = GeoPoint {
            longitude: -89.6,
            latitude: 40.7,
        };
        // Purity-descending input order must survive the filter.
        let sources = vec![
            test_source(7, -89.61, 40.71, 95.0),
            test_source(8, -89.59, 40.69, 85.0),
            test_source(9, -89.6, 40.7, 75.0),
        ];

        let kept = filter_within_radius(sources, &center, 10_000.0);
        let ids: Vec<i64> = kept.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![7, 8, 9]);
    }

    #[test]
    fn test_radius_filter_includes_boundary_source() {
        let center = GeoPoint {
            longitude: 0.0,
            latitude: 0.0,
        };
        // One degree of longitude at the equator is ~111.19 km.
        let sources = vec![test_source(1, 1.0, 0.0, 50.0)];

        assert!(
            filter_within_radius(sources.clone(), &center, 112_000.0).len() == 1,
            "source just inside the radius should be kept"
        );
        assert!(
            filter_within_radius(sources, &center, 110_000.0).is_empty(),
            "source just outside the radius should be dropped"
        );
    }

    #[test]
    fn test_round_two_decimals() {
        assert_eq!(round_two_decimals(3.14159), 3.14);
        assert_eq!(round_two_decimals(0.0), 0.0);
        assert_eq!(round_two_decimals(210.196), 210.2);
    }
}
