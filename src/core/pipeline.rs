// PftLens - core/pipeline.rs
//
// End-to-end interpretation: measurements -> findings -> differentials ->
// report. Each call is an independent pure computation; nothing is shared
// between calls except the read-only rule tables.

use crate::core::differential;
use crate::core::diffusion;
use crate::core::input::RawInput;
use crate::core::measurement::MeasurementSet;
use crate::core::model::{Findings, InterpretationReport, Parameter, RuleTables, Thresholds};
use crate::core::pattern;
use crate::core::report;
use crate::core::severity;
use crate::core::volumes;

/// Run the four classifiers. The pattern outcome feeds the other three.
pub fn classify_all(set: &MeasurementSet, thresholds: &Thresholds) -> Findings {
    let pattern = pattern::classify(set, thresholds);
    let severity = severity::classify(set, &pattern, thresholds);
    let volumes = volumes::interpret(set, &pattern, thresholds);
    let diffusion = diffusion::interpret(set, &pattern, thresholds);
    Findings {
        pattern,
        severity,
        volumes,
        diffusion,
    }
}

/// Interpret an already-validated measurement set.
pub fn interpret(set: &MeasurementSet, tables: &RuleTables) -> InterpretationReport {
    let findings = classify_all(set, &tables.thresholds);
    let differentials = differential::generate(&findings, &tables.differentials);
    report::compose(findings, differentials, tables, Vec::new())
}

/// Interpret raw input. Never fails: invalid values are dropped, reported
/// as input warnings, and surface as "rejected as invalid" data gaps on the
/// axes that needed them.
pub fn interpret_input(input: &RawInput, tables: &RuleTables) -> InterpretationReport {
    let screened = MeasurementSet::screen(input);
    let rejected = screened.rejected_parameters();

    let mut findings = classify_all(&screened.set, &tables.thresholds);
    if !rejected.is_empty() {
        mark_rejected(&mut findings, &rejected);
    }

    let mut warnings: Vec<String> = screened.rejected.iter().map(|e| e.to_string()).collect();
    warnings.extend(
        input
            .ignored_keys
            .iter()
            .map(|key| format!("'{key}' is not a recognised parameter and was ignored")),
    );

    tracing::debug!(
        rejected = rejected.len(),
        gaps = findings.gaps().len(),
        "Interpretation complete"
    );

    let differentials = differential::generate(&findings, &tables.differentials);
    report::compose(findings, differentials, tables, warnings)
}

fn mark_rejected(findings: &mut Findings, rejected: &[Parameter]) {
    let gaps = [
        findings.pattern.gap_mut(),
        findings.severity.gap_mut(),
        findings.volumes.gap_mut(),
        findings.diffusion.gap_mut(),
    ];
    for gap in gaps.into_iter().flatten() {
        gap.mark_invalid(rejected);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::{
        Axis, DiffusionBand, PatternLabel, SectionKind, SectionStatus, SeverityBand, VolumeLabel,
    };
    use crate::core::tables::load_builtin_tables;

    fn mixed_input() -> RawInput {
        RawInput::new()
            .with_ratio(55.0)
            .with_percent(Parameter::Fvc, 70.0)
            .with_percent(Parameter::Fev1, 58.0)
            .with_percent(Parameter::Tlc, 75.0)
            .with_percent(Parameter::Dlco, 65.0)
    }

    #[test]
    fn test_mixed_defect_findings() {
        let tables = load_builtin_tables();
        let report = interpret_input(&mixed_input(), &tables);
        let f = &report.findings;
        assert_eq!(f.pattern.label(), Some(&PatternLabel::Mixed));
        assert_eq!(f.severity.label(), Some(&SeverityBand::ModeratelySevere));
        assert_eq!(f.volumes.label(), Some(&VolumeLabel::ConfirmsRestriction));
        let d = f.diffusion.label().unwrap();
        assert_eq!(d.band, DiffusionBand::MildImpairment);
        assert!(!d.isolated_defect);
        assert!(report.is_complete());
        assert!(report.input_warnings.is_empty());
    }

    #[test]
    fn test_idempotent() {
        let tables = load_builtin_tables();
        let a = interpret_input(&mixed_input(), &tables);
        let b = interpret_input(&mixed_input(), &tables);
        assert_eq!(a, b);
    }

    #[test]
    fn test_rejected_value_marks_gap_invalid() {
        let tables = load_builtin_tables();
        let input = mixed_input().with_percent(Parameter::Dlco, -3.0);
        let report = interpret_input(&input, &tables);
        let gap = report.findings.diffusion.gap().unwrap();
        assert_eq!(gap.invalid, vec![Parameter::Dlco]);
        assert!(gap.missing.is_empty());
        assert_eq!(report.input_warnings.len(), 1);
        assert_eq!(
            report.section(SectionKind::Spirometry).unwrap().status,
            SectionStatus::Complete
        );
        assert_eq!(
            report.section(SectionKind::Diffusion).unwrap().status,
            SectionStatus::Unavailable
        );
    }

    #[test]
    fn test_empty_input_all_gaps() {
        let tables = load_builtin_tables();
        let report = interpret_input(&RawInput::new(), &tables);
        assert_eq!(
            report.findings.gaps(),
            vec![Axis::Pattern, Axis::Severity, Axis::Volumes, Axis::Diffusion]
        );
        assert!(report.differentials.entries.is_empty());
        assert_eq!(
            report.section(SectionKind::Summary).unwrap().status,
            SectionStatus::Unavailable
        );
    }

    #[test]
    fn test_ignored_keys_warned() {
        let tables = load_builtin_tables();
        let mut input = mixed_input();
        input.ignored_keys.push("KCO".to_string());
        let report = interpret_input(&input, &tables);
        assert_eq!(
            report.input_warnings,
            vec!["'KCO' is not a recognised parameter and was ignored".to_string()]
        );
    }
}
