// PftLens - core/pattern.rs
//
// Spirometry pattern classification from the FEV1/FVC ratio and FVC %
// predicted. Core layer: pure logic.
//
// Rule order is fixed; Mixed must be tested before the single-category
// rules. Thresholds are inclusive on the ">=" side: a value exactly at a
// threshold is the non-abnormal category.

use crate::core::measurement::MeasurementSet;
use crate::core::model::{
    fmt_compared, fmt_number, Axis, AxisOutcome, DataGap, Parameter, PatternLabel, Thresholds,
};

/// Decide the pattern from the two numbers.
pub fn decide(ratio: f64, fvc_percent: f64, thresholds: &Thresholds) -> PatternLabel {
    let low_ratio = ratio < thresholds.ratio_threshold;
    let low_fvc = fvc_percent < thresholds.fvc_threshold;
    match (low_ratio, low_fvc) {
        (true, true) => PatternLabel::Mixed,
        (true, false) => PatternLabel::Obstructive,
        (false, true) => PatternLabel::Restrictive,
        (false, false) => PatternLabel::Normal,
    }
}

/// Classify the spirometry pattern of a measurement set.
pub fn classify(set: &MeasurementSet, thresholds: &Thresholds) -> AxisOutcome<PatternLabel> {
    let ratio = set.ratio();
    let fvc = set.percent_predicted(Parameter::Fvc);

    let (ratio, fvc) = match (ratio, fvc) {
        (Some(r), Some(f)) => (r, f),
        (r, f) => {
            let mut missing = Vec::new();
            if r.is_none() {
                missing.push(Parameter::Fev1FvcRatio);
            }
            if f.is_none() {
                missing.push(Parameter::Fvc);
            }
            tracing::debug!(missing = ?missing, "Pattern classification skipped");
            return AxisOutcome::Unavailable(DataGap::missing(Axis::Pattern, missing));
        }
    };

    let label = decide(ratio.percent, fvc, thresholds);
    let ratio_threshold = fmt_number(thresholds.ratio_threshold);
    let fvc_threshold = fmt_number(thresholds.fvc_threshold);

    let mut rationale = Vec::with_capacity(3);

    let ratio_source = if ratio.derived {
        " (derived from FEV1 / FVC)"
    } else {
        ""
    };
    let ratio_text = fmt_compared(ratio.percent, &[thresholds.ratio_threshold]);
    if ratio.percent < thresholds.ratio_threshold {
        rationale.push(format!(
            "FEV1/FVC ratio {ratio_text}%{ratio_source} is below the {ratio_threshold}% \
             threshold: airflow obstruction present."
        ));
    } else {
        rationale.push(format!(
            "FEV1/FVC ratio {ratio_text}%{ratio_source} is at or above the {ratio_threshold}% \
             threshold: no airflow obstruction."
        ));
    }

    let fvc_text = fmt_compared(fvc, &[thresholds.fvc_threshold]);
    if fvc < thresholds.fvc_threshold {
        rationale.push(format!(
            "FVC {fvc_text}% predicted is below the {fvc_threshold}% threshold: \
             vital capacity reduced."
        ));
    } else {
        rationale.push(format!(
            "FVC {fvc_text}% predicted is at or above the {fvc_threshold}% threshold: \
             vital capacity preserved."
        ));
    }

    rationale.push(match label {
        PatternLabel::Mixed => "Pattern: Mixed (low ratio with reduced FVC).".to_string(),
        PatternLabel::Obstructive => {
            "Pattern: Obstructive (low ratio, FVC preserved).".to_string()
        }
        PatternLabel::Restrictive => {
            "Pattern: Restrictive (ratio preserved, FVC reduced).".to_string()
        }
        PatternLabel::Normal => "Pattern: Normal (ratio and FVC preserved).".to_string(),
    });

    tracing::debug!(pattern = %label, "Pattern classified");
    AxisOutcome::classified(label, rationale)
}
