/// Integration tests for the provider import pipeline
///
/// These tests verify:
/// 1. Feed JSON → records → scored drafts, with typed skips for records
///    the importer cannot place or identify
/// 2. Lenient parsing of string-encoded and junk metric values
/// 3. Re-import against a live database updates in place and raises an
///    alert when a source comes back degraded
///
/// The scoring tests run standalone. The database test is ignored by
/// default; it needs PostgreSQL with the water schema applied
/// (sql/001_initial_schema.sql) and DATABASE_URL set in .env:
///   cargo test --test import_pipeline -- --ignored

use aquamap_service::alerts::{self, AlertPolicy};
use aquamap_service::importer::{self, SkipReason};
use aquamap_service::ingest::wqp::{self, FeatureRecord};
use aquamap_service::model::{DataSource, GeoPoint, PollutionLevel, WaterSourceKind};

// Trimmed-down result feed: one complete location, one with no geometry,
// one with no identifier.
const TEST_FEED: &str = r#"{
  "type": "FeatureCollection",
  "features": [
    {
      "type": "Feature",
      "geometry": {"type": "Point", "coordinates": [-89.3985, 43.0731]},
      "properties": {
        "MonitoringLocationIdentifier": "WIDNR_WQX-133120",
        "MonitoringLocationName": "Lake Monona Nearshore",
        "MonitoringLocationTypeName": "Lake",
        "pH": 7.4,
        "DissolvedOxygen": 9.1,
        "Turbidity": 4.0,
        "Temperature": 21.5
      }
    },
    {
      "type": "Feature",
      "geometry": null,
      "properties": {
        "MonitoringLocationIdentifier": "WIDNR_WQX-NOGEO",
        "MonitoringLocationName": "Retired Culvert Site"
      }
    },
    {
      "type": "Feature",
      "geometry": {"type": "Point", "coordinates": [-89.41, 43.08]},
      "properties": {
        "MonitoringLocationName": "Unnamed Ditch"
      }
    }
  ]
}"#;

// ---------------------------------------------------------------------------
// Feed → Drafts
// ---------------------------------------------------------------------------

#[test]
fn test_feed_parses_into_scored_drafts_with_typed_skips() {
    let records = wqp::parse_result_feed(TEST_FEED).expect("feed should parse");
    assert_eq!(records.len(), 3);

    let (drafts, skipped) = importer::prepare_batch(&records);

    assert_eq!(drafts.len(), 1);
    assert_eq!(skipped.len(), 2);

    let draft = &drafts[0];
    assert_eq!(draft.external_id.as_deref(), Some("WIDNR_WQX-133120"));
    assert_eq!(draft.name, "Lake Monona Nearshore");
    assert_eq!(draft.kind, WaterSourceKind::Lake);
    assert_eq!(draft.data_source, DataSource::Api);
    assert!(draft.is_verified);
    assert_eq!(draft.location.longitude, -89.3985);
    assert_eq!(draft.location.latitude, 43.0731);
    assert_eq!(
        draft.metrics.purity_score, 100.0,
        "all parameters in range means no penalties"
    );
    assert_eq!(draft.metrics.ph, Some(7.4));
    assert_eq!(draft.metrics.temperature, Some(21.5));

    assert_eq!(skipped[0].reason, SkipReason::MissingGeometry);
    assert_eq!(skipped[0].external_id.as_deref(), Some("WIDNR_WQX-NOGEO"));
    assert_eq!(skipped[1].reason, SkipReason::MissingIdentifier);
    assert!(skipped[1].external_id.is_none());
}

#[test]
fn test_string_metrics_parse_and_penalize() {
    let feed = r#"{
      "features": [
        {
          "geometry": {"coordinates": [-89.5, 43.1]},
          "properties": {
            "MonitoringLocationIdentifier": "WIDNR_WQX-STR1",
            "MonitoringLocationName": "Stringly Typed Slough",
            "MonitoringLocationTypeName": "Stream",
            "pH": "9.0",
            "DissolvedOxygen": "6.5",
            "Turbidity": "30",
            "FecalColiform": "N/A"
          }
        }
      ]
    }"#;

    let records = wqp::parse_result_feed(feed).expect("feed should parse");
    let (drafts, skipped) = importer::prepare_batch(&records);
    assert!(skipped.is_empty());

    let draft = &drafts[0];
    // pH 9.0 (-20), DO 6.5 (-15), turbidity 30 (-15); "N/A" coliform reads
    // as unmeasured and costs nothing.
    assert_eq!(draft.metrics.purity_score, 50.0);
    assert_eq!(draft.metrics.pollution_level, PollutionLevel::High);
    assert_eq!(draft.metrics.severity_score, 5.0);
    assert!(draft.metrics.fecal_coliform.is_none());
    assert_eq!(draft.kind, WaterSourceKind::Stream);
}

#[test]
fn test_drafts_keep_feed_order() {
    let feed = r#"{
      "features": [
        {
          "geometry": {"coordinates": [-89.0, 43.0]},
          "properties": {"MonitoringLocationIdentifier": "A-1"}
        },
        {
          "geometry": {"coordinates": [-89.1, 43.1]},
          "properties": {"MonitoringLocationIdentifier": "B-2"}
        }
      ]
    }"#;

    let records = wqp::parse_result_feed(feed).expect("feed should parse");
    let (drafts, _) = importer::prepare_batch(&records);

    assert_eq!(drafts[0].external_id.as_deref(), Some("A-1"));
    assert_eq!(drafts[1].external_id.as_deref(), Some("B-2"));
}

// ---------------------------------------------------------------------------
// Live Re-import
// ---------------------------------------------------------------------------

#[test]
#[ignore] // Only run when database is available
fn test_reimport_updates_same_source_and_raises_alert() {
    use aquamap_service::db::connect_and_verify;

    let mut client = connect_and_verify(&["water"]).unwrap_or_else(|e| {
        eprintln!("\n{}\n", e);
        panic!("Database setup validation failed");
    });
    // Remove leftovers from earlier runs.
    client
        .execute(
            "DELETE FROM water.alerts WHERE water_source_id IN (
                SELECT id FROM water.sources WHERE external_id LIKE 'TEST-%'
             )",
            &[],
        )
        .ok();
    client
        .execute(
            "DELETE FROM water.sources WHERE external_id LIKE 'TEST-%'",
            &[],
        )
        .ok();

    let policy = AlertPolicy::default();
    let location = Some(GeoPoint {
        longitude: -89.3985,
        latitude: 43.0731,
    });

    let clean = FeatureRecord {
        external_id: Some("TEST-WQX-RE1".to_string()),
        name: Some("TEST-Reimport Station".to_string()),
        location_type: Some("River/Stream".to_string()),
        location,
        ph: Some(7.0),
        dissolved_oxygen: Some(8.0),
        ..Default::default()
    };

    let outcome = importer::import_batch(&mut client, &[clean], &policy);
    assert_eq!(outcome.sources.len(), 1);
    assert!(outcome.skipped.is_empty());

    let first = &outcome.sources[0];
    assert_eq!(first.quality_metrics.purity_score, 100.0);
    let active = alerts::active_alerts(&mut client, None).expect("listing should succeed");
    assert!(
        !active.iter().any(|a| a.water_source_id == first.id),
        "a clean import must not alert"
    );

    let degraded = FeatureRecord {
        external_id: Some("TEST-WQX-RE1".to_string()),
        name: Some("TEST-Reimport Station".to_string()),
        location_type: Some("River/Stream".to_string()),
        location,
        ph: Some(9.5),
        dissolved_oxygen: Some(4.0),
        turbidity: Some(60.0),
        fecal_coliform: Some(250.0),
        ..Default::default()
    };

    let outcome = importer::import_batch(&mut client, &[degraded], &policy);
    assert_eq!(outcome.sources.len(), 1);

    let second = &outcome.sources[0];
    assert_eq!(second.id, first.id, "re-import should update, not duplicate");
    assert_eq!(second.quality_metrics.purity_score, 0.0);
    assert_eq!(second.quality_metrics.severity_score, 10.0);
    assert!(!second.is_safe_for_use);

    let active = alerts::active_alerts(&mut client, None).expect("listing should succeed");
    assert!(
        active.iter().any(|a| a.water_source_id == second.id),
        "the degraded re-import should raise an alert"
    );
}
