/// Water quality scoring engine.
///
/// Pure, total functions mapping raw chemical/physical parameters to the
/// derived trio stored on every source: a 0-100 purity score, a 0-10
/// severity score, and a categorical pollution level. Also home to the
/// incremental merge that folds a user-estimated purity into a source's
/// running average.
///
/// No I/O and no failure modes; callers decide what to do with the
/// numbers.

use crate::model::PollutionLevel;

/// Purity at or above this is considered safe for use.
pub const SAFE_PURITY_THRESHOLD: f64 = 70.0;

/// Raw parameters that carry scoring penalties. Each is independently
/// optional; absent parameters contribute no penalty.
#[derive(Debug, Clone, Copy, Default)]
pub struct SampleParams {
    pub ph: Option<f64>,
    pub dissolved_oxygen: Option<f64>,
    pub turbidity: Option<f64>,
    pub fecal_coliform: Option<f64>,
}

// ---------------------------------------------------------------------------
// Scoring
// ---------------------------------------------------------------------------

/// Computes the 0-100 purity score: start at 100, subtract a fixed
/// penalty per out-of-band parameter, clamp.
///
/// Penalties are additive across parameters but exclusive within one
/// (the severe band swallows the mild band):
///
///   pH               outside 6.5-8.5        -20
///   pH               outside 7-8            -10
///   dissolvedOxygen  below 5 mg/L           -30
///   dissolvedOxygen  below 7 mg/L           -15
///   turbidity        above 50 NTU           -25
///   turbidity        above 25 NTU           -15
///   fecalColiform    above 200              -40
///   fecalColiform    above 100              -20
pub fn purity_score(params: &SampleParams) -> f64 {
    let mut score: f64 = 100.0;

    if let Some(ph) = params.ph {
        if ph < 6.5 || ph > 8.5 {
            score -= 20.0;
        } else if ph < 7.0 || ph > 8.0 {
            score -= 10.0;
        }
    }

    if let Some(dox) = params.dissolved_oxygen {
        if dox < 5.0 {
            score -= 30.0;
        } else if dox < 7.0 {
            score -= 15.0;
        }
    }

    if let Some(turbidity) = params.turbidity {
        if turbidity > 50.0 {
            score -= 25.0;
        } else if turbidity > 25.0 {
            score -= 15.0;
        }
    }

    if let Some(coliform) = params.fecal_coliform {
        if coliform > 200.0 {
            score -= 40.0;
        } else if coliform > 100.0 {
            score -= 20.0;
        }
    }

    score.clamp(0.0, 100.0)
}

/// Severity on a 0-10 scale, inverse of purity: `round((100 - p) / 10)`.
pub fn severity_score(purity: f64) -> f64 {
    ((100.0 - purity) / 10.0).round()
}

/// Buckets a purity score into the categorical pollution level.
pub fn classify_pollution(purity: f64) -> PollutionLevel {
    if purity >= 80.0 {
        PollutionLevel::Low
    } else if purity >= 60.0 {
        PollutionLevel::Moderate
    } else if purity >= 40.0 {
        PollutionLevel::High
    } else {
        PollutionLevel::Severe
    }
}

/// A source is safe for use when its purity is at least 70.
pub fn is_safe_for_use(purity: f64) -> bool {
    purity >= SAFE_PURITY_THRESHOLD
}

// ---------------------------------------------------------------------------
// Incremental merge
// ---------------------------------------------------------------------------

/// Folds one user-estimated purity into a source's running average.
///
/// The stored score carries one unit of weight plus one per previously
/// merged report, so merging k equal estimates `p` into a fresh source
/// at `p0` yields `(p0 + k*p) / (k + 1)`. A plain running mean: every
/// historical report keeps equal weight, one outlier among many has
/// bounded influence, and an early report on a young source can swing
/// the score substantially.
pub fn merged_purity(current: f64, prior_reports: i32, estimate: f64) -> f64 {
    let weight = (prior_reports + 1) as f64;
    (current * weight + estimate) / (weight + 1.0)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
