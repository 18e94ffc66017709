// PftLens - core/severity.rs
//
// Severity grading from FEV1 % predicted using the thresholds table's
// ordered bands. A Normal pattern is reported as Normal without grading.

use crate::core::measurement::MeasurementSet;
use crate::core::model::{
    Axis, AxisOutcome, DataGap, Parameter, PatternLabel, SeverityBand, Thresholds,
};

/// Grade an FEV1 % predicted value.
pub fn grade(fev1_percent: f64, thresholds: &Thresholds) -> SeverityBand {
    thresholds
        .severity
        .classify(fev1_percent)
        .map_or(SeverityBand::VerySevere, |m| m.band)
}

/// Classify severity given the pattern outcome.
pub fn classify(
    set: &MeasurementSet,
    pattern: &AxisOutcome<PatternLabel>,
    thresholds: &Thresholds,
) -> AxisOutcome<SeverityBand> {
    if pattern.label() == Some(&PatternLabel::Normal) {
        return AxisOutcome::classified(
            SeverityBand::Normal,
            vec!["Spirometric pattern is Normal: severity grading does not apply.".to_string()],
        );
    }

    let Some(fev1) = set.percent_predicted(Parameter::Fev1) else {
        tracing::debug!("Severity grading skipped: FEV1 % predicted missing");
        return AxisOutcome::Unavailable(DataGap::missing(Axis::Severity, vec![Parameter::Fev1]));
    };

    let mut rationale = Vec::with_capacity(2);
    if !pattern.is_available() {
        rationale.push(
            "Spirometric pattern could not be established; FEV1 graded without pattern context."
                .to_string(),
        );
    }

    let Some(matched) = thresholds.severity.classify(fev1) else {
        // Validated tables always have at least one band.
        return AxisOutcome::Unavailable(DataGap::missing(Axis::Severity, vec![Parameter::Fev1]));
    };
    rationale.push(format!(
        "FEV1 {}% predicted falls in the {} band ({}).",
        matched.value_text(fev1),
        matched.band,
        matched.interval()
    ));

    tracing::debug!(severity = %matched.band, "Severity graded");
    AxisOutcome::classified(matched.band, rationale)
}
