// PftLens - core/volumes.rs
//
// Lung volume interpretation. TLC corroborates (or fails to corroborate)
// the spirometric pattern; it never overrides it.

use crate::core::measurement::MeasurementSet;
use crate::core::model::{
    fmt_compared, fmt_number, Axis, AxisOutcome, DataGap, Parameter, PatternLabel, Thresholds,
    VolumeLabel,
};

/// Interpret TLC and RV against the spirometric pattern.
pub fn interpret(
    set: &MeasurementSet,
    pattern: &AxisOutcome<PatternLabel>,
    thresholds: &Thresholds,
) -> AxisOutcome<VolumeLabel> {
    let Some(tlc) = set.percent_predicted(Parameter::Tlc) else {
        tracing::debug!("Volume interpretation skipped: TLC % predicted missing");
        return AxisOutcome::Unavailable(DataGap::missing(Axis::Volumes, vec![Parameter::Tlc]));
    };
    let rv = set.percent_predicted(Parameter::Rv);
    let obstruction = set
        .ratio()
        .map(|r| r.percent < thresholds.ratio_threshold);

    let tlc_text = fmt_compared(
        tlc,
        &[
            thresholds.tlc_restriction_threshold,
            thresholds.tlc_hyperinflation_threshold,
        ],
    );
    let restriction = fmt_number(thresholds.tlc_restriction_threshold);
    let mut rationale = Vec::with_capacity(3);

    let label = if tlc < thresholds.tlc_restriction_threshold {
        rationale.push(format!(
            "TLC {tlc_text}% predicted is below {restriction}%: true restriction confirmed."
        ));
        rationale.push(match pattern.label() {
            Some(p) if p.is_restrictive() => {
                "Consistent with the reduced FVC on spirometry.".to_string()
            }
            Some(p) => format!(
                "Spirometric pattern is {p}; reduced TLC is not reflected in the FVC."
            ),
            None => "Spirometric pattern unavailable for comparison.".to_string(),
        });
        VolumeLabel::ConfirmsRestriction
    } else if obstruction == Some(true) {
        rationale.push(format!(
            "TLC {tlc_text}% predicted is at or above {restriction}%: no restriction by volumes."
        ));
        match rv {
            Some(rv) if rv > thresholds.rv_air_trapping_threshold => {
                rationale.push(format!(
                    "RV {}% predicted exceeds {}% with airflow obstruction: air trapping.",
                    fmt_compared(rv, &[thresholds.rv_air_trapping_threshold]),
                    fmt_number(thresholds.rv_air_trapping_threshold)
                ));
                VolumeLabel::AirTrapping
            }
            _ => {
                rationale.push(
                    "Preserved TLC with airflow obstruction: volumes support obstruction."
                        .to_string(),
                );
                VolumeLabel::ConfirmsObstruction
            }
        }
    } else {
        rationale.push(format!(
            "TLC {tlc_text}% predicted is at or above {restriction}%: no restriction by volumes."
        ));
        rationale.push(match pattern.label() {
            Some(p) if p.is_restrictive() => {
                "Reduced FVC with preserved TLC suggests pseudo-restriction (e.g. poor effort or \
                 air trapping not captured by RV)."
                    .to_string()
            }
            _ if obstruction.is_none() => {
                "FEV1/FVC unavailable; volumes cannot corroborate a pattern.".to_string()
            }
            _ => "Lung volumes within normal limits.".to_string(),
        });
        VolumeLabel::Indeterminate
    };

    if tlc > thresholds.tlc_hyperinflation_threshold {
        rationale.push(format!(
            "TLC above {}% predicted indicates hyperinflation.",
            fmt_number(thresholds.tlc_hyperinflation_threshold)
        ));
    }

    tracing::debug!(volumes = %label, "Lung volumes interpreted");
    AxisOutcome::classified(label, rationale)
}
