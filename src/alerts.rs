/// Quality alert policy, retrieval, and resolution.
///
/// Alerts are raised automatically whenever a metrics-producing write
/// (import or report merge) leaves a source at or above the severity
/// threshold. Each source carries at most one active alert; the partial
/// unique index on `water.alerts` enforces that even under concurrent
/// writers, so raising is a plain insert-or-ignore. Alerts never
/// auto-resolve: `resolve` is the only path that deactivates one.

use postgres::{GenericClient, Row};
use std::str::FromStr;

use crate::config::AlertConfig;
use crate::model::{
    AlertKind, AlertSeverity, GeoPoint, ServiceError, WaterAlert, WaterSource,
};
use crate::sources;

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// Thresholds that decide when a source's state warrants an alert.
#[derive(Debug, Clone, Copy)]
pub struct AlertPolicy {
    /// Severity score (0-10) at or above which an alert is raised.
    pub severity_threshold: f64,
    /// Affected radius stamped on new alerts, meters.
    pub affected_radius_m: f64,
}

impl AlertPolicy {
    pub fn from_config(config: &AlertConfig) -> Self {
        AlertPolicy {
            severity_threshold: config.severity_threshold,
            affected_radius_m: config.default_affected_radius_m,
        }
    }
}

impl Default for AlertPolicy {
    fn default() -> Self {
        AlertPolicy::from_config(&AlertConfig::default())
    }
}

/// A would-be alert, before persistence.
#[derive(Debug, Clone, PartialEq)]
pub struct AlertDraft {
    pub kind: AlertKind,
    pub severity: AlertSeverity,
    pub message: String,
}

/// Decides whether `source`'s current state warrants an alert.
///
/// At or above the policy threshold an alert is due: `critical` when the
/// severity score has pegged at 10, `high` otherwise. Purity under 20
/// points to contamination rather than gradual degradation.
pub fn evaluate(policy: &AlertPolicy, source: &WaterSource) -> Option<AlertDraft> {
    let metrics = &source.quality_metrics;
    if metrics.severity_score < policy.severity_threshold {
        return None;
    }

    let severity = if metrics.severity_score >= 10.0 {
        AlertSeverity::Critical
    } else {
        AlertSeverity::High
    };
    let kind = if metrics.purity_score < 20.0 {
        AlertKind::Contamination
    } else {
        AlertKind::SevereDegradation
    };

    Some(AlertDraft {
        kind,
        severity,
        message: format!(
            "Water quality degraded at {}: purity {:.0}/100, severity {:.0}/10",
            source.name, metrics.purity_score, metrics.severity_score
        ),
    })
}

// ---------------------------------------------------------------------------
// Raising
// ---------------------------------------------------------------------------

/// Raises an alert for `source` if its state warrants one and it has no
/// active alert yet. Returns the stored alert when a new one was created.
pub fn raise_if_degraded(
    client: &mut impl GenericClient,
    source: &WaterSource,
    policy: &AlertPolicy,
) -> Result<Option<WaterAlert>, ServiceError> {
    let Some(draft) = evaluate(policy, source) else {
        return Ok(None);
    };

    let kind = draft.kind.as_str();
    let severity = draft.severity.as_str();

    // The partial unique index turns "already has an active alert" into a
    // conflict, so dedup needs no separate existence check.
    let row = client.query_opt(
        "INSERT INTO water.alerts
             (water_source_id, kind, severity, message, affected_radius)
         VALUES ($1, $2, $3, $4, $5)
         ON CONFLICT (water_source_id) WHERE is_active DO NOTHING
         RETURNING *",
        &[
            &source.id,
            &kind,
            &severity,
            &draft.message,
            &policy.affected_radius_m,
        ],
    )?;

    match row {
        Some(row) => {
            let alert = alert_from_row(&row)?;
            log::info!(
                "raised {} {} alert for source {} ({})",
                alert.severity.as_str(),
                alert.alert_type.as_str(),
                source.id,
                source.name
            );
            Ok(Some(alert))
        }
        None => {
            log::debug!("source {} already has an active alert", source.id);
            Ok(None)
        }
    }
}

// ---------------------------------------------------------------------------
// Retrieval and resolution
// ---------------------------------------------------------------------------

/// Returns active alerts, optionally limited to sources within `radius_m`
/// of a point. Ordered most severe first, newest first within a severity.
pub fn active_alerts(
    client: &mut impl GenericClient,
    near: Option<(GeoPoint, f64)>,
) -> Result<Vec<WaterAlert>, ServiceError> {
    let rows = match near {
        Some((center, radius_m)) => {
            let ids = sources::ids_within_radius(client, &center, radius_m)?;
            if ids.is_empty() {
                return Ok(Vec::new());
            }
            client.query(
                "SELECT * FROM water.alerts WHERE is_active AND water_source_id = ANY($1)",
                &[&ids],
            )?
        }
        None => client.query("SELECT * FROM water.alerts WHERE is_active", &[])?,
    };

    let mut alerts = rows
        .iter()
        .map(alert_from_row)
        .collect::<Result<Vec<_>, _>>()?;
    order_alerts(&mut alerts);

    Ok(alerts)
}

/// Severity outranks recency; `medium` sorts above `low` even though the
/// strings say otherwise, hence the rank-based comparison.
fn order_alerts(alerts: &mut [WaterAlert]) {
    alerts.sort_by(|a, b| {
        b.severity
            .rank()
            .cmp(&a.severity.rank())
            .then(b.created_at.cmp(&a.created_at))
    });
}

/// Deactivates one alert, stamping `resolved_at` exactly once. Returns
/// false when the id is unknown or the alert was already resolved.
pub fn resolve(client: &mut impl GenericClient, alert_id: i64) -> Result<bool, ServiceError> {
    let updated = client.execute(
        "UPDATE water.alerts SET is_active = FALSE, resolved_at = NOW()
         WHERE id = $1 AND is_active",
        &[&alert_id],
    )?;
    Ok(updated > 0)
}

/// Maps a `water.alerts` row to the domain record.
fn alert_from_row(row: &Row) -> Result<WaterAlert, ServiceError> {
    let kind: String = row.get("kind");
    let severity: String = row.get("severity");

    Ok(WaterAlert {
        id: row.get("id"),
        water_source_id: row.get("water_source_id"),
        alert_type: AlertKind::from_str(&kind).map_err(ServiceError::Persistence)?,
        severity: AlertSeverity::from_str(&severity).map_err(ServiceError::Persistence)?,
        message: row.get("message"),
        affected_radius: row.get("affected_radius"),
        is_active: row.get("is_active"),
        resolved_at: row.get("resolved_at"),
        created_at: row.get("created_at"),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use crate::model::{
        DataSource, PollutionLevel, QualityMetrics, WaterSourceKind,
    };

    fn source_with_scores(purity: f64, severity: f64) -> WaterSource {
        WaterSource {
            id: 1,
            name: "Test Creek".to_string(),
            kind: WaterSourceKind::Stream,
            location: GeoPoint {
                longitude: -89.6,
                latitude: 40.7,
            },
            quality_metrics: QualityMetrics {
                purity_score: purity,
                pollution_level: PollutionLevel::Severe,
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
            data_source: DataSource::Api,
            external_id: Some("TEST-001".to_string()),
            is_verified: true,
            is_safe_for_use: false,
            reports_count: 0,
            last_updated: Utc::now(),
            created_at: Utc::now(),
        }
    }

    fn alert(id: i64, severity: AlertSeverity, age_minutes: i64) -> WaterAlert {
        WaterAlert {
            id,
            water_source_id: id,
            alert_type: AlertKind::SevereDegradation,
            severity,
            message: "test".to_string(),
            affected_radius: 5000.0,
            is_active: true,
            resolved_at: None,
            created_at: Utc::now() - Duration::minutes(age_minutes),
        }
    }

    #[test]
    fn test_evaluate_below_threshold_is_quiet() {
        let policy = AlertPolicy::default();
        let source = source_with_scores(25.0, 7.9);
        assert!(
            evaluate(&policy, &source).is_none(),
            "severity under the threshold must not alert"
        );
    }

    #[test]
    fn test_evaluate_at_threshold_raises_high() {
        let policy = AlertPolicy::default();
        let source = source_with_scores(25.0, 8.0);
        let draft = evaluate(&policy, &source).expect("threshold is inclusive");
        assert_eq!(draft.severity, AlertSeverity::High);
        assert_eq!(draft.kind, AlertKind::SevereDegradation);
    }

    #[test]
    fn test_evaluate_pegged_severity_is_critical() {
        let policy = AlertPolicy::default();
        let source = source_with_scores(5.0, 10.0);
        let draft = evaluate(&policy, &source).expect("should alert");
        assert_eq!(draft.severity, AlertSeverity::Critical);
        assert_eq!(
            draft.kind,
            AlertKind::Contamination,
            "purity under 20 reads as contamination"
        );
    }

    #[test]
    fn test_evaluate_kind_boundary_at_purity_20() {
        let policy = AlertPolicy::default();

        let draft = evaluate(&policy, &source_with_scores(19.9, 9.0)).unwrap();
        assert_eq!(draft.kind, AlertKind::Contamination);

        let draft = evaluate(&policy, &source_with_scores(20.0, 9.0)).unwrap();
        assert_eq!(draft.kind, AlertKind::SevereDegradation);
    }

    #[test]
    fn test_evaluate_message_names_the_source() {
        let policy = AlertPolicy::default();
        let draft = evaluate(&policy, &source_with_scores(12.0, 9.0)).unwrap();
        assert!(
            draft.message.contains("Test Creek"),
            "message should name the source: {}",
            draft.message
        );
        assert!(draft.message.contains("12/100"));
        assert!(draft.message.contains("9/10"));
    }

    #[test]
    fn test_evaluate_respects_configured_threshold() {
        let policy = AlertPolicy {
            severity_threshold: 5.0,
            affected_radius_m: 5000.0,
        };
        assert!(
            evaluate(&policy, &source_with_scores(50.0, 5.0)).is_some(),
            "a lowered threshold should alert earlier"
        );
    }

    #[test]
    fn test_order_alerts_severity_outranks_recency() {
        // A fresh medium alert must not outrank an older critical one.
        let mut alerts = vec![
            alert(1, AlertSeverity::Medium, 1),
            alert(2, AlertSeverity::Critical, 120),
            alert(3, AlertSeverity::High, 5),
        ];
        order_alerts(&mut alerts);
        let ids: Vec<i64> = alerts.iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![2, 3, 1]);
    }

    #[test]
    fn test_order_alerts_newest_first_within_severity() {
        let mut alerts = vec![
            alert(1, AlertSeverity::High, 60),
            alert(2, AlertSeverity::High, 5),
            alert(3, AlertSeverity::High, 30),
        ];
        order_alerts(&mut alerts);
        let ids: Vec<i64> = alerts.iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![2, 3, 1]);
    }
}
