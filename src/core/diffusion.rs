// PftLens - core/diffusion.rs
//
// DLCO grading and isolated diffusion defect detection.

use crate::core::measurement::MeasurementSet;
use crate::core::model::{
    Axis, AxisOutcome, DataGap, DiffusionBand, DiffusionFinding, Parameter, PatternLabel,
    Thresholds,
};

/// Grade DLCO % predicted and flag an isolated defect.
pub fn interpret(
    set: &MeasurementSet,
    pattern: &AxisOutcome<PatternLabel>,
    thresholds: &Thresholds,
) -> AxisOutcome<DiffusionFinding> {
    let Some(dlco) = set.percent_predicted(Parameter::Dlco) else {
        tracing::debug!("Diffusion interpretation skipped: DLCO % predicted missing");
        return AxisOutcome::Unavailable(DataGap::missing(Axis::Diffusion, vec![Parameter::Dlco]));
    };
    let Some(matched) = thresholds.diffusion.classify(dlco) else {
        return AxisOutcome::Unavailable(DataGap::missing(Axis::Diffusion, vec![Parameter::Dlco]));
    };

    let band = matched.band;
    let mut rationale = vec![format!(
        "DLCO {}% predicted falls in the {} band ({}).",
        matched.value_text(dlco),
        band,
        matched.interval()
    )];

    let isolated_defect = match pattern.label() {
        Some(PatternLabel::Normal) if band.is_impaired() => {
            rationale.push(
                "Impaired gas transfer with normal spirometry: isolated diffusion defect."
                    .to_string(),
            );
            true
        }
        Some(_) => false,
        None if band.is_impaired() => {
            rationale.push(
                "Spirometric pattern unavailable; an isolated diffusion defect cannot be assessed."
                    .to_string(),
            );
            false
        }
        None => false,
    };

    let finding = DiffusionFinding {
        band,
        isolated_defect,
    };
    tracing::debug!(diffusion = %finding, "Diffusion interpreted");
    AxisOutcome::classified(finding, rationale)
}

/// Convenience for callers that only need the band.
pub fn grade(dlco_percent: f64, thresholds: &Thresholds) -> DiffusionBand {
    thresholds
        .diffusion
        .classify(dlco_percent)
        .map_or(DiffusionBand::SevereImpairment, |m| m.band)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::input::RawInput;

    fn dlco(percent: f64) -> MeasurementSet {
        MeasurementSet::from_input(&RawInput::new().with_percent(Parameter::Dlco, percent)).unwrap()
    }

    fn pattern(label: PatternLabel) -> AxisOutcome<PatternLabel> {
        AxisOutcome::classified(label, Vec::new())
    }

    #[test]
    fn test_band_edges() {
        let t = Thresholds::default();
        assert_eq!(grade(75.0, &t), DiffusionBand::Normal);
        assert_eq!(grade(74.9, &t), DiffusionBand::MildImpairment);
        assert_eq!(grade(60.0, &t), DiffusionBand::MildImpairment);
        assert_eq!(grade(59.9, &t), DiffusionBand::ModerateImpairment);
        assert_eq!(grade(40.0, &t), DiffusionBand::ModerateImpairment);
        assert_eq!(grade(39.9, &t), DiffusionBand::SevereImpairment);
    }

    #[test]
    fn test_isolated_defect_with_normal_spirometry() {
        let outcome = interpret(
            &dlco(55.0),
            &pattern(PatternLabel::Normal),
            &Thresholds::default(),
        );
        let finding = *outcome.label().unwrap();
        assert_eq!(finding.band, DiffusionBand::ModerateImpairment);
        assert!(finding.isolated_defect);
    }

    #[test]
    fn test_not_isolated_with_abnormal_spirometry() {
        let outcome = interpret(
            &dlco(55.0),
            &pattern(PatternLabel::Obstructive),
            &Thresholds::default(),
        );
        assert!(!outcome.label().unwrap().isolated_defect);
    }

    #[test]
    fn test_normal_dlco_never_isolated() {
        let outcome = interpret(
            &dlco(90.0),
            &pattern(PatternLabel::Normal),
            &Thresholds::default(),
        );
        let finding = outcome.label().unwrap();
        assert_eq!(finding.band, DiffusionBand::Normal);
        assert!(!finding.isolated_defect);
    }

    #[test]
    fn test_unavailable_pattern_noted() {
        let unavailable =
            AxisOutcome::Unavailable(DataGap::missing(Axis::Pattern, vec![Parameter::Fvc]));
        let outcome = interpret(&dlco(50.0), &unavailable, &Thresholds::default());
        let result = outcome.result().unwrap();
        assert!(!result.label.isolated_defect);
        assert!(result.rationale[1].contains("cannot be assessed"));
    }

    #[test]
    fn test_missing_dlco_is_gap() {
        let outcome = interpret(
            &MeasurementSet::default(),
            &pattern(PatternLabel::Normal),
            &Thresholds::default(),
        );
        assert_eq!(outcome.gap().unwrap().axis, Axis::Diffusion);
    }
}
