/// External feed batch import: prepare drafts from provider records,
/// upsert them by external id, and run the alert check on each stored
/// source.
///
/// Import is a fold with per-record isolation. One broken record — no
/// geometry, no identifier, or a store failure — becomes a typed skip in
/// the outcome and never aborts the rest of the batch. Preparation is a
/// pure function so the scoring pipeline is testable without a database.

use postgres::GenericClient;
use std::fmt;

use crate::alerts::{self, AlertPolicy};
use crate::config::ProviderConfig;
use crate::ingest::wqp::{self, FeatureRecord};
use crate::model::{DataSource, QualityMetrics, ServiceError, WaterSource};
use crate::quality::{self, SampleParams};
use crate::sources::{self, SourceDraft};

// ---------------------------------------------------------------------------
// Skips
// ---------------------------------------------------------------------------

/// Why one record was left out of the import.
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    MissingGeometry,
    MissingIdentifier,
    Store(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::MissingGeometry => write!(f, "missing geometry"),
            SkipReason::MissingIdentifier => write!(f, "missing identifier"),
            SkipReason::Store(detail) => write!(f, "store failure: {}", detail),
        }
    }
}

/// One skipped record, with whatever identity it had.
#[derive(Debug, Clone)]
pub struct ImportSkip {
    pub external_id: Option<String>,
    pub reason: SkipReason,
}

impl fmt::Display for ImportSkip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.external_id {
            Some(id) => write!(f, "{}: {}", id, self.reason),
            None => write!(f, "(unidentified record): {}", self.reason),
        }
    }
}

// ---------------------------------------------------------------------------
// Preparation (pure)
// ---------------------------------------------------------------------------

/// Turns one provider record into a storable draft, scoring its measured
/// parameters. Records without geometry or without an identifier cannot be
/// placed or upserted and become typed skips.
pub fn prepare_source(record: &FeatureRecord) -> Result<SourceDraft, ImportSkip> {
    let Some(location) = record.location else {
        return Err(ImportSkip {
            external_id: record.external_id.clone(),
            reason: SkipReason::MissingGeometry,
        });
    };
    let Some(external_id) = record.external_id.clone() else {
        return Err(ImportSkip {
            external_id: None,
            reason: SkipReason::MissingIdentifier,
        });
    };

    let params = SampleParams {
        ph: record.ph,
        dissolved_oxygen: record.dissolved_oxygen,
        turbidity: record.turbidity,
        fecal_coliform: record.fecal_coliform,
    };
    let purity = quality::purity_score(&params);

    Ok(SourceDraft {
        name: record
            .name
            .clone()
            .unwrap_or_else(|| "Unknown Source".to_string()),
        kind: wqp::map_location_type(record.location_type.as_deref().unwrap_or("")),
        location,
        metrics: QualityMetrics {
            purity_score: purity,
            pollution_level: quality::classify_pollution(purity),
            severity_score: quality::severity_score(purity),
            ph: record.ph,
            dissolved_oxygen: record.dissolved_oxygen,
            turbidity: record.turbidity,
            temperature: record.temperature,
            conductivity: None,
            tds: None,
            bod: None,
            cod: None,
            nitrate: None,
            phosphate: None,
            fecal_coliform: record.fecal_coliform,
        },
        data_source: DataSource::Api,
        external_id: Some(external_id),
        is_verified: true,
    })
}

/// Splits a batch into storable drafts and typed skips, preserving the
/// feed's record order on both sides.
pub fn prepare_batch(records: &[FeatureRecord]) -> (Vec<SourceDraft>, Vec<ImportSkip>) {
    let mut drafts = Vec::new();
    let mut skipped = Vec::new();

    for record in records {
        match prepare_source(record) {
            Ok(draft) => drafts.push(draft),
            Err(skip) => skipped.push(skip),
        }
    }

    (drafts, skipped)
}

// ---------------------------------------------------------------------------
// Import
// ---------------------------------------------------------------------------

/// Result of one import run.
#[derive(Debug)]
pub struct ImportOutcome {
    pub sources: Vec<WaterSource>,
    pub skipped: Vec<ImportSkip>,
}

/// Upserts every prepared draft, adding store failures to the skip list
/// instead of aborting. Each stored source gets the alert check; an alert
/// write failure is logged but does not fail the record.
pub fn import_batch(
    client: &mut impl GenericClient,
    records: &[FeatureRecord],
    policy: &AlertPolicy,
) -> ImportOutcome {
    let (drafts, skipped) = prepare_batch(records);
    let mut outcome = ImportOutcome {
        sources: Vec::with_capacity(drafts.len()),
        skipped,
    };

    for draft in &drafts {
        match sources::upsert_by_external_id(client, draft) {
            Ok(source) => {
                if let Err(e) = alerts::raise_if_degraded(client, &source, policy) {
                    log::warn!("alert check failed for source {}: {}", source.id, e);
                }
                outcome.sources.push(source);
            }
            Err(e) => {
                let id = draft.external_id.as_deref().unwrap_or("?");
                log::error!("failed to store imported source {}: {}", id, e);
                outcome.skipped.push(ImportSkip {
                    external_id: draft.external_id.clone(),
                    reason: SkipReason::Store(e.to_string()),
                });
            }
        }
    }

    outcome
}

/// Fetches monitoring locations around a point from the portal and imports
/// them. Provider failures surface as `ServiceError::Upstream`; this is the
/// only path in the service that produces one.
pub fn fetch_and_import(
    client: &mut impl GenericClient,
    http: &reqwest::blocking::Client,
    provider: &ProviderConfig,
    lat: f64,
    lng: f64,
    within_miles: f64,
    policy: &AlertPolicy,
) -> Result<ImportOutcome, ServiceError> {
    let records = wqp::fetch_features(http, &provider.base_url, lat, lng, within_miles)?;
    log::info!(
        "fetched {} monitoring locations around ({}, {})",
        records.len(),
        lat,
        lng
    );

    Ok(import_batch(client, &records, policy))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::fixtures::*;
    use crate::model::{PollutionLevel, WaterSourceKind};

    #[test]
    fn test_prepare_batch_splits_valid_and_missing_geometry() {
        let records = wqp::parse_result_feed(fixture_result_feed_json()).unwrap();
        let (drafts, skipped) = prepare_batch(&records);

        assert_eq!(drafts.len(), 1, "only the located record becomes a draft");
        assert_eq!(skipped.len(), 1);
        assert_eq!(skipped[0].reason, SkipReason::MissingGeometry);
        assert_eq!(
            skipped[0].external_id.as_deref(),
            Some("ILEPA_WQX-D-32"),
            "the skip should keep the identity it had"
        );
    }

    #[test]
    fn test_prepare_scores_clean_site_at_full_purity() {
        let records = wqp::parse_result_feed(fixture_result_feed_json()).unwrap();
        let (drafts, _) = prepare_batch(&records);
        let draft = &drafts[0];

        assert_eq!(draft.metrics.purity_score, 100.0);
        assert_eq!(draft.metrics.pollution_level, PollutionLevel::Low);
        assert_eq!(draft.metrics.severity_score, 0.0);
        assert_eq!(draft.kind, WaterSourceKind::River);
        assert_eq!(draft.data_source, DataSource::Api);
        assert!(draft.is_verified, "imported records are provider-verified");
        assert_eq!(draft.external_id.as_deref(), Some("USGS-05553700"));
        assert_eq!(draft.metrics.temperature, Some(18.5), "raw values ride along");
        assert_eq!(draft.metrics.fecal_coliform, Some(0.0));
    }

    #[test]
    fn test_prepare_scores_degraded_site_at_zero() {
        let records = wqp::parse_result_feed(fixture_degraded_site_json()).unwrap();
        let (drafts, skipped) = prepare_batch(&records);
        assert!(skipped.is_empty());

        let draft = &drafts[0];
        // Penalties: pH 9.5 (-20), DO 4 (-30), turbidity 60 (-25),
        // fecal coliform 250 (-40) — total 115, clamped to 0.
        assert_eq!(draft.metrics.purity_score, 0.0);
        assert_eq!(draft.metrics.severity_score, 10.0);
        assert_eq!(draft.metrics.pollution_level, PollutionLevel::Severe);
    }

    #[test]
    fn test_prepare_missing_identifier_is_typed_skip() {
        let records = wqp::parse_result_feed(
            r#"{"features": [{
                "geometry": {"coordinates": [-88.0, 41.0]},
                "properties": {"MonitoringLocationName": "Anonymous Creek"}
            }]}"#,
        )
        .unwrap();
        let (drafts, skipped) = prepare_batch(&records);

        assert!(drafts.is_empty());
        assert_eq!(skipped.len(), 1);
        assert_eq!(skipped[0].reason, SkipReason::MissingIdentifier);
        assert!(skipped[0].external_id.is_none());
    }

    #[test]
    fn test_prepare_skips_unlocatable_geometry_with_reason() {
        // Coordinates that cannot be read as numbers leave the record
        // unlocatable; it must surface as a skip, not disappear in parsing.
        let records = wqp::parse_result_feed(
            r#"{"features": [{
                "geometry": {"coordinates": ["N/A", "x"]},
                "properties": {"MonitoringLocationIdentifier": "JUNK-GEO-1"}
            }]}"#,
        )
        .unwrap();
        let (drafts, skipped) = prepare_batch(&records);

        assert!(drafts.is_empty());
        assert_eq!(skipped.len(), 1);
        assert_eq!(skipped[0].reason, SkipReason::MissingGeometry);
        assert_eq!(skipped[0].external_id.as_deref(), Some("JUNK-GEO-1"));
    }

    #[test]
    fn test_prepare_unnamed_record_gets_fallback_name() {
        let records = wqp::parse_result_feed(
            r#"{"features": [{
                "geometry": {"coordinates": [-88.0, 41.0]},
                "properties": {"MonitoringLocationIdentifier": "X-1"}
            }]}"#,
        )
        .unwrap();
        let (drafts, _) = prepare_batch(&records);

        assert_eq!(drafts[0].name, "Unknown Source");
        assert_eq!(
            drafts[0].kind,
            WaterSourceKind::Stream,
            "absent location type falls back to stream"
        );
    }

    #[test]
    fn test_prepare_unmeasured_record_scores_full_purity() {
        // No measured parameters means no penalties. The record stores as
        // pristine until better data arrives; re-import overwrites it.
        let records = wqp::parse_result_feed(
            r#"{"features": [{
                "geometry": {"coordinates": [-88.0, 41.0]},
                "properties": {"MonitoringLocationIdentifier": "X-2"}
            }]}"#,
        )
        .unwrap();
        let (drafts, _) = prepare_batch(&records);
        assert_eq!(drafts[0].metrics.purity_score, 100.0);
        assert!(drafts[0].metrics.ph.is_none());
    }

    #[test]
    fn test_skip_display_formats() {
        let skip = ImportSkip {
            external_id: Some("USGS-1".to_string()),
            reason: SkipReason::MissingGeometry,
        };
        assert_eq!(skip.to_string(), "USGS-1: missing geometry");

        let skip = ImportSkip {
            external_id: None,
            reason: SkipReason::MissingIdentifier,
        };
        assert_eq!(skip.to_string(), "(unidentified record): missing identifier");
    }
}
