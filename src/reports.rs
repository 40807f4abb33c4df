/// Report ingestion and the incremental quality merge.
///
/// A submitted report takes one of three paths:
/// - a `new_source` report spawns an unverified user-reported source and
///   links to it (a source id in the body is ignored, not merged into);
/// - it targets an existing source, whose purity becomes a running mean
///   over the original measurement and every report estimate since;
/// - otherwise it stands alone as a plain observation record.
///
/// The merge runs inside a transaction with the source row locked
/// (`SELECT ... FOR UPDATE`), so two reports landing on the same source at
/// once serialize instead of losing an update. The running mean is
/// order-independent, which the lifecycle tests lean on.

use chrono::Utc;
use postgres::{GenericClient, Row};
use serde::Deserialize;
use std::str::FromStr;

use crate::alerts::{self, AlertPolicy};
use crate::model::{
    DataSource, GeoPoint, PollutionLevel, QualityMetrics, ReportKind, ReportObservations,
    ReportStatus, ServiceError, WaterReport, WaterSource, WaterSourceKind,
};
use crate::quality;
use crate::sources::{self, SourceDraft};

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// Deserialized body of POST /water/report. The three required fields are
/// optional here so the handler can report them missing with one message
/// instead of a serde parse error per field.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportInput {
    pub report_type: Option<ReportKind>,
    pub location: Option<GeoPoint>,
    #[serde(default)]
    pub observations: ReportObservations,
    pub description: Option<String>,
    pub water_source_id: Option<i64>,
    #[serde(default)]
    pub photos: Vec<String>,
}

/// What a successful submission produced. `source` is populated only when
/// the report spawned a new source; merges update the store silently and
/// respond with the report alone.
#[derive(Debug)]
pub struct SubmitOutcome {
    pub report: WaterReport,
    pub source: Option<WaterSource>,
}

/// Checks the required-field and range rules, returning the validated
/// (kind, location, description) triple.
fn validated_input(input: &ReportInput) -> Result<(ReportKind, GeoPoint, String), ServiceError> {
    let description = input
        .description
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty());

    let (report_type, location, description) =
        match (input.report_type, input.location, description) {
            (Some(t), Some(l), Some(d)) => (t, l, d.to_string()),
            _ => {
                return Err(ServiceError::Validation(
                    "Report type, location, and description are required".to_string(),
                ));
            }
        };

    if let Some(estimate) = input.observations.estimated_purity {
        if !(0.0..=100.0).contains(&estimate) {
            return Err(ServiceError::Validation(
                "estimatedPurity must be between 0 and 100".to_string(),
            ));
        }
    }

    Ok((report_type, location, description))
}

// ---------------------------------------------------------------------------
// Submission
// ---------------------------------------------------------------------------

/// Persists a report for `user_id` and applies its effect on the source
/// store. Alert evaluation runs after the commit; a failed alert write must
/// not take down an accepted report, so it is logged and swallowed.
pub fn submit_report(
    client: &mut impl GenericClient,
    user_id: &str,
    input: &ReportInput,
    policy: &AlertPolicy,
) -> Result<SubmitOutcome, ServiceError> {
    let (report_type, location, description) = validated_input(input)?;

    let mut tx = client.transaction()?;

    let report;
    let mut created: Option<WaterSource> = None;
    let alert_source: Option<WaterSource>;

    if report_type == ReportKind::NewSource {
        // A new_source report always spawns its own source; a source id in
        // the body does not turn it into a merge.
        let draft = source_draft_from_report(&location, &input.observations);
        let source = sources::create(&mut tx, &draft)?;
        report = insert_report(
            &mut tx,
            user_id,
            report_type,
            &location,
            &description,
            input,
            Some(source.id),
        )?;
        alert_source = Some(source.clone());
        created = Some(source);
    } else {
        // Resolve and lock the target source up front. An id pointing at
        // nothing is not an error: the report is still worth keeping, it
        // just stands alone (stored with no source link).
        let locked = match input.water_source_id {
            Some(id) => lock_source(&mut tx, id)?,
            None => None,
        };
        let linked_id = locked.as_ref().map(|s| s.id);

        report = insert_report(
            &mut tx,
            user_id,
            report_type,
            &location,
            &description,
            input,
            linked_id,
        )?;

        alert_source = match locked {
            Some(locked) => Some(apply_merge(
                &mut tx,
                &locked,
                input.observations.estimated_purity,
            )?),
            None => None,
        };
    }

    tx.commit()?;

    if let Some(source) = alert_source {
        if let Err(e) = alerts::raise_if_degraded(client, &source, policy) {
            log::warn!("alert check failed for source {}: {}", source.id, e);
        }
    }

    Ok(SubmitOutcome {
        report,
        source: created,
    })
}

/// Returns all reports submitted by one user, most recent first.
pub fn reports_for_user(
    client: &mut impl GenericClient,
    user_id: &str,
) -> Result<Vec<WaterReport>, ServiceError> {
    let rows = client.query(
        "SELECT * FROM water.reports WHERE user_id = $1 ORDER BY created_at DESC",
        &[&user_id],
    )?;
    rows.iter().map(report_from_row).collect()
}

// ---------------------------------------------------------------------------
// Merge
// ---------------------------------------------------------------------------

struct LockedSource {
    id: i64,
    purity_score: f64,
    reports_count: i32,
}

fn lock_source(
    tx: &mut impl GenericClient,
    id: i64,
) -> Result<Option<LockedSource>, ServiceError> {
    let row = tx.query_opt(
        "SELECT id, purity_score, reports_count FROM water.sources WHERE id = $1 FOR UPDATE",
        &[&id],
    )?;
    Ok(row.map(|r| LockedSource {
        id: r.get("id"),
        purity_score: r.get("purity_score"),
        reports_count: r.get("reports_count"),
    }))
}

/// Folds one report into the locked source. Every merged report counts
/// toward `reports_count`; only reports carrying an estimate move the
/// purity (an estimate of exactly 0 is present and merges like any other
/// value). The derived trio is recomputed from the new purity in the same
/// statement, so readers never see the fields disagree.
fn apply_merge(
    tx: &mut impl GenericClient,
    locked: &LockedSource,
    estimate: Option<f64>,
) -> Result<WaterSource, ServiceError> {
    let new_purity = match estimate {
        Some(e) => quality::merged_purity(locked.purity_score, locked.reports_count, e),
        None => locked.purity_score,
    };
    let pollution_level = quality::classify_pollution(new_purity).as_str();
    let severity = quality::severity_score(new_purity);
    let is_safe = quality::is_safe_for_use(new_purity);

    let row = tx.query_one(
        "UPDATE water.sources
         SET purity_score = $2,
             pollution_level = $3,
             severity_score = $4,
             is_safe_for_use = $5,
             reports_count = reports_count + 1,
             last_updated = NOW()
         WHERE id = $1
         RETURNING *",
        &[&locked.id, &new_purity, &pollution_level, &severity, &is_safe],
    )?;

    sources::source_from_row(&row)
}

// ---------------------------------------------------------------------------
// New-source drafts
// ---------------------------------------------------------------------------

/// Builds the source draft for a `new_source` report. User-spawned sources
/// start unverified with today's date in the name; the purity best-guess is
/// the reporter's estimate, 50 when they gave none.
fn source_draft_from_report(
    location: &GeoPoint,
    observations: &ReportObservations,
) -> SourceDraft {
    let purity = observations.estimated_purity.unwrap_or(50.0);
    let visible_pollution = observations.visible_pollution.unwrap_or(false);
    let (pollution_level, severity) = if visible_pollution {
        (PollutionLevel::High, 7.0)
    } else {
        (PollutionLevel::Moderate, 4.0)
    };

    SourceDraft {
        name: format!("User Reported - {}", Utc::now().format("%Y-%m-%d")),
        kind: observations.water_type.unwrap_or(WaterSourceKind::Stream),
        location: *location,
        metrics: QualityMetrics {
            purity_score: purity,
            pollution_level,
            severity_score: severity,
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
    }
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

fn insert_report(
    tx: &mut impl GenericClient,
    user_id: &str,
    report_type: ReportKind,
    location: &GeoPoint,
    description: &str,
    input: &ReportInput,
    water_source_id: Option<i64>,
) -> Result<WaterReport, ServiceError> {
    let obs = &input.observations;
    let kind = report_type.as_str();
    let water_kind = obs.water_type.map(|k| k.as_str());

    let row = tx.query_one(
        "INSERT INTO water.reports
             (user_id, water_source_id, report_type, longitude, latitude,
              description, water_color, odor, visible_pollution,
              pollution_type, estimated_purity, water_kind, photos)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
         RETURNING *",
        &[
            &user_id,
            &water_source_id,
            &kind,
            &location.longitude,
            &location.latitude,
            &description,
            &obs.water_color,
            &obs.odor,
            &obs.visible_pollution,
            &obs.pollution_type,
            &obs.estimated_purity,
            &water_kind,
            &input.photos,
        ],
    )?;

    report_from_row(&row)
}

/// Maps a `water.reports` row to the domain record.
pub(crate) fn report_from_row(row: &Row) -> Result<WaterReport, ServiceError> {
    let report_type: String = row.get("report_type");
    let status: String = row.get("status");
    let water_kind: Option<String> = row.get("water_kind");

    Ok(WaterReport {
        id: row.get("id"),
        user_id: row.get("user_id"),
        water_source_id: row.get("water_source_id"),
        report_type: ReportKind::from_str(&report_type).map_err(ServiceError::Persistence)?,
        location: GeoPoint {
            longitude: row.get("longitude"),
            latitude: row.get("latitude"),
        },
        observations: ReportObservations {
            water_color: row.get("water_color"),
            odor: row.get("odor"),
            visible_pollution: row.get("visible_pollution"),
            pollution_type: row.get("pollution_type"),
            estimated_purity: row.get("estimated_purity"),
            water_type: water_kind
                .as_deref()
                .map(WaterSourceKind::from_str)
                .transpose()
                .map_err(ServiceError::Persistence)?,
        },
        description: row.get("description"),
        photos: row.get("photos"),
        status: ReportStatus::from_str(&status).map_err(ServiceError::Persistence)?,
        upvotes: row.get("upvotes"),
        downvotes: row.get("downvotes"),
        admin_notes: row.get("admin_notes"),
        verified_by: row.get("verified_by"),
        verified_at: row.get("verified_at"),
        created_at: row.get("created_at"),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_input() -> ReportInput {
        ReportInput {
            report_type: Some(ReportKind::QualityUpdate),
            location: Some(GeoPoint {
                longitude: -89.6,
                latitude: 40.7,
            }),
            description: Some("Water looks clear today".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_validation_accepts_complete_input() {
        let (kind, location, description) =
            validated_input(&minimal_input()).expect("complete input should validate");
        assert_eq!(kind, ReportKind::QualityUpdate);
        assert_eq!(location.latitude, 40.7);
        assert_eq!(description, "Water looks clear today");
    }

    #[test]
    fn test_validation_rejects_missing_required_fields() {
        for broken in [
            ReportInput {
                report_type: None,
                ..minimal_input()
            },
            ReportInput {
                location: None,
                ..minimal_input()
            },
            ReportInput {
                description: None,
                ..minimal_input()
            },
        ] {
            let err = validated_input(&broken).unwrap_err();
            match err {
                ServiceError::Validation(msg) => assert_eq!(
                    msg,
                    "Report type, location, and description are required"
                ),
                other => panic!("expected validation error, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_validation_rejects_blank_description() {
        let input = ReportInput {
            description: Some("   ".to_string()),
            ..minimal_input()
        };
        assert!(
            validated_input(&input).is_err(),
            "whitespace-only description must not pass validation"
        );
    }

    #[test]
    fn test_validation_trims_description() {
        let input = ReportInput {
            description: Some("  murky near the bank  ".to_string()),
            ..minimal_input()
        };
        let (_, _, description) = validated_input(&input).expect("should validate");
        assert_eq!(description, "murky near the bank");
    }

    #[test]
    fn test_validation_bounds_estimated_purity() {
        let mut input = minimal_input();
        input.observations.estimated_purity = Some(101.0);
        assert!(validated_input(&input).is_err(), "101 is out of range");

        input.observations.estimated_purity = Some(-0.1);
        assert!(validated_input(&input).is_err(), "negative is out of range");

        input.observations.estimated_purity = Some(0.0);
        assert!(
            validated_input(&input).is_ok(),
            "zero is a legitimate estimate"
        );
        input.observations.estimated_purity = Some(100.0);
        assert!(validated_input(&input).is_ok());
    }

    #[test]
    fn test_new_source_draft_defaults() {
        let location = GeoPoint {
            longitude: -89.6,
            latitude: 40.7,
        };
        let draft = source_draft_from_report(&location, &ReportObservations::default());

        assert!(
            draft.name.starts_with("User Reported - "),
            "name should carry the user-reported prefix, got '{}'",
            draft.name
        );
        assert_eq!(draft.kind, WaterSourceKind::Stream, "default kind is stream");
        assert_eq!(draft.metrics.purity_score, 50.0, "no estimate defaults to 50");
        assert_eq!(draft.metrics.pollution_level, PollutionLevel::Moderate);
        assert_eq!(draft.metrics.severity_score, 4.0);
        assert_eq!(draft.data_source, DataSource::UserReported);
        assert!(!draft.is_verified, "user-spawned sources start unverified");
        assert!(draft.external_id.is_none());
    }

    #[test]
    fn test_new_source_draft_with_visible_pollution() {
        let location = GeoPoint {
            longitude: 0.0,
            latitude: 0.0,
        };
        let observations = ReportObservations {
            visible_pollution: Some(true),
            estimated_purity: Some(35.0),
            water_type: Some(WaterSourceKind::Pond),
            ..Default::default()
        };
        let draft = source_draft_from_report(&location, &observations);

        assert_eq!(draft.kind, WaterSourceKind::Pond);
        assert_eq!(draft.metrics.purity_score, 35.0);
        assert_eq!(
            draft.metrics.pollution_level,
            PollutionLevel::High,
            "visible pollution maps straight to high"
        );
        assert_eq!(draft.metrics.severity_score, 7.0);
    }

    #[test]
    fn test_new_source_draft_keeps_zero_estimate() {
        let location = GeoPoint {
            longitude: 0.0,
            latitude: 0.0,
        };
        let observations = ReportObservations {
            estimated_purity: Some(0.0),
            ..Default::default()
        };
        let draft = source_draft_from_report(&location, &observations);
        assert_eq!(
            draft.metrics.purity_score, 0.0,
            "an explicit zero estimate is not the same as no estimate"
        );
    }

    #[test]
    fn test_report_input_deserializes_camel_case() {
        let input: ReportInput = serde_json::from_str(
            r#"{
                "reportType": "pollution_alert",
                "location": {"type": "Point", "coordinates": [-89.6, 40.7]},
                "description": "Oil sheen along the east bank",
                "observations": {
                    "visiblePollution": true,
                    "pollutionType": ["oil"],
                    "estimatedPurity": 25
                },
                "waterSourceId": 42,
                "photos": ["https://example.com/sheen.jpg"]
            }"#,
        )
        .expect("well-formed body should deserialize");

        assert_eq!(input.report_type, Some(ReportKind::PollutionAlert));
        assert_eq!(input.water_source_id, Some(42));
        assert_eq!(input.observations.visible_pollution, Some(true));
        assert_eq!(input.observations.estimated_purity, Some(25.0));
        assert_eq!(input.photos.len(), 1);
    }

    #[test]
    fn test_report_input_tolerates_minimal_body() {
        let input: ReportInput = serde_json::from_str(
            r#"{
                "reportType": "quality_update",
                "location": {"coordinates": [1.0, 2.0]},
                "description": "clear"
            }"#,
        )
        .expect("observations and photos should default");

        assert!(input.observations.estimated_purity.is_none());
        assert!(input.photos.is_empty());
        assert!(input.water_source_id.is_none());
    }
}
