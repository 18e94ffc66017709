// PftLens - core/report.rs
//
// Assembles findings and differentials into the sectioned narrative report.
// Pure function: identical inputs give identical output.

use crate::core::differential;
use crate::core::model::{
    join_parameters, Axis, AxisOutcome, DataGap, DifferentialList, Findings,
    InterpretationReport, PatternLabel, ReportSection, RuleTables, SectionKind, SectionStatus,
    SeverityBand, VolumeLabel,
};
use std::collections::HashSet;

/// Compose the full report.
pub fn compose(
    findings: Findings,
    differentials: DifferentialList,
    tables: &RuleTables,
    input_warnings: Vec<String>,
) -> InterpretationReport {
    let recommendations = recommendations(&findings, &differentials, tables);

    let sections = SectionKind::all()
        .iter()
        .map(|&kind| {
            let (status, lines) = match kind {
                SectionKind::Summary => summary(&findings, &input_warnings),
                SectionKind::Spirometry => spirometry(&findings),
                SectionKind::LungVolumes => dependent_axis(&findings.volumes, &findings),
                SectionKind::Diffusion => dependent_axis(&findings.diffusion, &findings),
                SectionKind::FinalImpression => final_impression(&findings),
                SectionKind::DifferentialDiagnoses => differential_section(&differentials),
                SectionKind::Recommendations => {
                    recommendation_section(&recommendations, &findings)
                }
            };
            ReportSection {
                kind,
                title: kind.title().to_string(),
                status,
                lines,
            }
        })
        .collect();

    InterpretationReport {
        findings,
        differentials,
        recommendations,
        input_warnings,
        thresholds_table: tables.thresholds.id.clone(),
        differentials_table: tables.differentials.id.clone(),
        sections,
    }
}

/// Follow-ups in rank order, then table recommendations, then one request
/// per data gap. Duplicates are dropped, first occurrence kept.
pub fn recommendations(
    findings: &Findings,
    differentials: &DifferentialList,
    tables: &RuleTables,
) -> Vec<String> {
    let mut items: Vec<String> = Vec::new();
    items.extend(
        differentials
            .entries
            .iter()
            .filter_map(|e| e.follow_up.clone()),
    );
    items.extend(
        differential::matching_recommendations(findings, &tables.differentials)
            .into_iter()
            .map(str::to_string),
    );
    for gap in axis_gaps(findings) {
        items.extend(gap_requests(gap));
    }

    let mut seen = HashSet::new();
    items.retain(|item| seen.insert(item.clone()));
    items
}

fn gap_requests(gap: &DataGap) -> Vec<String> {
    let mut requests = Vec::with_capacity(2);
    if !gap.missing.is_empty() {
        requests.push(format!(
            "Obtain {} to complete the {}.",
            join_parameters(&gap.missing),
            gap.axis
        ));
    }
    if !gap.invalid.is_empty() {
        requests.push(format!(
            "Verify {} (rejected as invalid) and repeat the {}.",
            join_parameters(&gap.invalid),
            gap.axis
        ));
    }
    requests
}

fn axis_gaps(findings: &Findings) -> Vec<&DataGap> {
    [
        findings.pattern.gap(),
        findings.severity.gap(),
        findings.volumes.gap(),
        findings.diffusion.gap(),
    ]
    .into_iter()
    .flatten()
    .collect()
}

fn status_from_gaps(gaps: usize, total: usize) -> SectionStatus {
    if gaps == 0 {
        SectionStatus::Complete
    } else if gaps >= total {
        SectionStatus::Unavailable
    } else {
        SectionStatus::Degraded
    }
}

fn push_outcome<L>(lines: &mut Vec<String>, outcome: &AxisOutcome<L>) {
    match outcome {
        AxisOutcome::Classified(result) => lines.extend(result.rationale.iter().cloned()),
        AxisOutcome::Unavailable(gap) => lines.push(gap.note()),
    }
}

fn headline<L: std::fmt::Display>(name: &str, outcome: &AxisOutcome<L>) -> String {
    match outcome.label() {
        Some(label) => format!("{name}: {label}"),
        None => format!("{name}: insufficient data"),
    }
}

// =============================================================================
// Sections
// =============================================================================

fn summary(findings: &Findings, warnings: &[String]) -> (SectionStatus, Vec<String>) {
    let mut lines = vec![
        headline("Pattern", &findings.pattern),
        headline("Severity", &findings.severity),
        headline("Lung volumes", &findings.volumes),
        headline("Diffusion", &findings.diffusion),
    ];
    lines.extend(warnings.iter().map(|w| format!("Input warning: {w}")));
    (status_from_gaps(findings.gaps().len(), 4), lines)
}

fn spirometry(findings: &Findings) -> (SectionStatus, Vec<String>) {
    let mut lines = Vec::new();
    push_outcome(&mut lines, &findings.pattern);
    push_outcome(&mut lines, &findings.severity);
    let gaps = [
        findings.pattern.is_available(),
        findings.severity.is_available(),
    ]
    .iter()
    .filter(|&&available| !available)
    .count();
    (status_from_gaps(gaps, 2), lines)
}

/// Volumes and diffusion are read against the pattern; a missing pattern
/// degrades them without making them unavailable.
fn dependent_axis<L>(
    outcome: &AxisOutcome<L>,
    findings: &Findings,
) -> (SectionStatus, Vec<String>) {
    let mut lines = Vec::new();
    push_outcome(&mut lines, outcome);
    let status = if !outcome.is_available() {
        SectionStatus::Unavailable
    } else if !findings.pattern.is_available() {
        SectionStatus::Degraded
    } else {
        SectionStatus::Complete
    };
    (status, lines)
}

fn final_impression(findings: &Findings) -> (SectionStatus, Vec<String>) {
    let mut lines = Vec::new();

    if let Some(pattern) = findings.pattern.label() {
        let mut sentence = capitalise(pattern.defect_phrase());
        match findings.severity.label() {
            Some(severity)
                if *pattern != PatternLabel::Normal && *severity != SeverityBand::Normal =>
            {
                sentence.push_str(&format!(", graded {}", severity.label().to_lowercase()));
            }
            _ => {}
        }
        sentence.push('.');
        lines.push(sentence);
    }

    if let Some(volumes) = findings.volumes.label() {
        lines.push(
            match volumes {
                VolumeLabel::ConfirmsRestriction => {
                    "Reduced TLC confirms a true restrictive process."
                }
                VolumeLabel::ConfirmsObstruction => {
                    "Lung volumes are consistent with obstruction."
                }
                VolumeLabel::AirTrapping => "Elevated RV indicates air trapping.",
                VolumeLabel::Indeterminate => {
                    "Lung volumes do not confirm restriction."
                }
            }
            .to_string(),
        );
    }

    if let Some(diffusion) = findings.diffusion.label() {
        if diffusion.isolated_defect {
            lines.push(format!(
                "Isolated diffusion defect: {} with normal spirometry.",
                diffusion.band.label().to_lowercase()
            ));
        } else if diffusion.band.is_impaired() {
            lines.push(format!(
                "{} of diffusing capacity.",
                capitalise(&diffusion.band.label().to_lowercase())
            ));
        } else {
            lines.push("Diffusing capacity is preserved.".to_string());
        }
    }

    let gaps = axis_gaps(findings);
    lines.extend(gaps.iter().map(|gap| gap.note()));
    (status_from_gaps(gaps.len(), 4), lines)
}

fn differential_section(list: &DifferentialList) -> (SectionStatus, Vec<String>) {
    let mut lines: Vec<String> = list
        .entries
        .iter()
        .map(|entry| {
            let support = entry
                .supporting_findings
                .iter()
                .map(|f| f.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            if support.is_empty() {
                format!("{}. {} [{}]", entry.rank, entry.name, entry.category)
            } else {
                format!(
                    "{}. {} [{}] (supported by: {support})",
                    entry.rank, entry.name, entry.category
                )
            }
        })
        .collect();

    if lines.is_empty() {
        lines.push("No differential diagnoses suggested by the available findings.".to_string());
    }
    if !list.degraded_axes.is_empty() {
        let axes = list
            .degraded_axes
            .iter()
            .map(Axis::label)
            .collect::<Vec<_>>()
            .join(", ");
        lines.push(format!(
            "Differentials depending on {axes} were omitted (insufficient data)."
        ));
    }

    let status = match (list.entries.is_empty(), list.degraded_axes.len()) {
        (_, 0) => SectionStatus::Complete,
        (true, 4) => SectionStatus::Unavailable,
        _ => SectionStatus::Degraded,
    };
    (status, lines)
}

fn recommendation_section(
    recommendations: &[String],
    findings: &Findings,
) -> (SectionStatus, Vec<String>) {
    let lines = recommendations.iter().map(|r| format!("- {r}")).collect();
    let status = if findings.gaps().is_empty() {
        SectionStatus::Complete
    } else {
        SectionStatus::Degraded
    };
    (status, lines)
}

fn capitalise(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::{DiffusionBand, DiffusionFinding, Parameter};
    use crate::core::tables::load_builtin_tables;

    fn complete_findings() -> Findings {
        Findings {
            pattern: AxisOutcome::classified(PatternLabel::Obstructive, vec!["p".to_string()]),
            severity: AxisOutcome::classified(SeverityBand::Severe, vec!["s".to_string()]),
            volumes: AxisOutcome::classified(VolumeLabel::AirTrapping, vec!["v".to_string()]),
            diffusion: AxisOutcome::classified(
                DiffusionFinding {
                    band: DiffusionBand::MildImpairment,
                    isolated_defect: false,
                },
                vec!["d".to_string()],
            ),
        }
    }

    #[test]
    fn test_sections_in_fixed_order() {
        let tables = load_builtin_tables();
        let findings = complete_findings();
        let list = differential::generate(&findings, &tables.differentials);
        let report = compose(findings, list, &tables, Vec::new());
        let kinds: Vec<SectionKind> = report.sections.iter().map(|s| s.kind).collect();
        assert_eq!(kinds, SectionKind::all());
        assert!(report.is_complete());
    }

    #[test]
    fn test_impression_sentence() {
        let (status, lines) = final_impression(&complete_findings());
        assert_eq!(status, SectionStatus::Complete);
        assert_eq!(lines[0], "Obstructive ventilatory defect, graded severe.");
        assert_eq!(lines[1], "Elevated RV indicates air trapping.");
        assert_eq!(lines[2], "Mild impairment of diffusing capacity.");
    }

    #[test]
    fn test_missing_diffusion_section_unavailable() {
        let tables = load_builtin_tables();
        let mut findings = complete_findings();
        findings.diffusion =
            AxisOutcome::Unavailable(DataGap::missing(Axis::Diffusion, vec![Parameter::Dlco]));
        let list = differential::generate(&findings, &tables.differentials);
        let report = compose(findings, list, &tables, Vec::new());

        let diffusion = report.section(SectionKind::Diffusion).unwrap();
        assert_eq!(diffusion.status, SectionStatus::Unavailable);
        assert_eq!(
            diffusion.lines,
            vec![
                "Insufficient data for diffusion assessment: DLCO % predicted not provided."
                    .to_string()
            ]
        );
        assert_eq!(
            report.section(SectionKind::Spirometry).unwrap().status,
            SectionStatus::Complete
        );
        assert_eq!(
            report.section(SectionKind::LungVolumes).unwrap().status,
            SectionStatus::Complete
        );
        let obtain_dlco = "Obtain DLCO % predicted to complete the diffusion assessment.";
        assert!(report.recommendations.contains(&obtain_dlco.to_string()));
    }

    #[test]
    fn test_recommendations_deduplicated_in_order() {
        let tables = load_builtin_tables();
        let findings = complete_findings();
        let list = differential::generate(&findings, &tables.differentials);
        let recs = recommendations(&findings, &list, &tables);
        let unique: HashSet<&String> = recs.iter().collect();
        assert_eq!(unique.len(), recs.len());
        // Follow-ups of ranked entries come before table recommendations.
        let first_follow_up = list.entries.iter().find_map(|e| e.follow_up.clone()).unwrap();
        assert_eq!(recs[0], first_follow_up);
    }

    #[test]
    fn test_capitalise() {
        assert_eq!(capitalise("mixed defect"), "Mixed defect");
        assert_eq!(capitalise(""), "");
    }
}
