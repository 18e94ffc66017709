// PftLens - core/differential.rs
//
// Differential diagnosis generation from the classified findings.
//
// Evaluation is a deterministic walk of the differential table. A rule
// applies when every axis it constrains matches. A rule that constrains an
// axis with no data is omitted rather than guessed at; unconstrained axes
// never block.

use crate::core::model::{
    Axis, Criteria, DifferentialEntry, DifferentialList, DifferentialTable, Finding, Findings,
};
use std::cmp::Reverse;
use std::collections::HashSet;

/// Outcome of testing one rule's criteria against the findings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleMatch {
    Matched,
    NotMatched,

    /// A constrained axis is a data gap.
    Blocked,
}

fn axis_match<L: PartialEq>(accepted: &[L], actual: Option<&L>) -> RuleMatch {
    if accepted.is_empty() {
        return RuleMatch::Matched;
    }
    match actual {
        None => RuleMatch::Blocked,
        Some(label) if accepted.contains(label) => RuleMatch::Matched,
        Some(_) => RuleMatch::NotMatched,
    }
}

/// Test criteria against the findings.
///
/// Any mismatch wins over a block: a rule that would fail on available data
/// is reported as not matched.
pub fn evaluate(criteria: &Criteria, findings: &Findings) -> RuleMatch {
    let diffusion = findings.diffusion.label();

    let isolated = match criteria.isolated_defect {
        None => RuleMatch::Matched,
        // The flag is only meaningful when both inputs to it were available.
        Some(_) if !findings.pattern.is_available() => RuleMatch::Blocked,
        Some(required) => match diffusion {
            None => RuleMatch::Blocked,
            Some(d) if d.isolated_defect == required => RuleMatch::Matched,
            Some(_) => RuleMatch::NotMatched,
        },
    };

    let checks = [
        axis_match(&criteria.pattern, findings.pattern.label()),
        axis_match(&criteria.severity, findings.severity.label()),
        axis_match(&criteria.volumes, findings.volumes.label()),
        axis_match(&criteria.diffusion, diffusion.map(|d| &d.band)),
        isolated,
    ];

    if checks.contains(&RuleMatch::NotMatched) {
        RuleMatch::NotMatched
    } else if checks.contains(&RuleMatch::Blocked) {
        RuleMatch::Blocked
    } else {
        RuleMatch::Matched
    }
}

/// Labels of the axes a matched rule constrained, in axis order.
fn supporting_findings(criteria: &Criteria, findings: &Findings) -> Vec<Finding> {
    let mut supporting = Vec::new();
    if !criteria.pattern.is_empty() {
        if let Some(&label) = findings.pattern.label() {
            supporting.push(Finding::Pattern(label));
        }
    }
    if !criteria.severity.is_empty() {
        if let Some(&band) = findings.severity.label() {
            supporting.push(Finding::Severity(band));
        }
    }
    if !criteria.volumes.is_empty() {
        if let Some(&label) = findings.volumes.label() {
            supporting.push(Finding::Volumes(label));
        }
    }
    if !criteria.diffusion.is_empty() {
        if let Some(d) = findings.diffusion.label() {
            supporting.push(Finding::Diffusion(d.band));
        }
    }
    if criteria.isolated_defect == Some(true) {
        supporting.push(Finding::IsolatedDiffusionDefect);
    }
    supporting
}

/// Generate the ranked differential list.
///
/// Order: more constrained axes first, then category precedence, then table
/// order. Duplicate names keep their best-ranked occurrence. Ranks are
/// 1-based and contiguous.
pub fn generate(findings: &Findings, table: &DifferentialTable) -> DifferentialList {
    let mut matched: Vec<(usize, usize)> = Vec::new();
    let mut blocked = 0usize;

    for (index, rule) in table.rules.iter().enumerate() {
        match evaluate(&rule.criteria, findings) {
            RuleMatch::Matched => matched.push((index, rule.criteria.specificity())),
            RuleMatch::Blocked => blocked += 1,
            RuleMatch::NotMatched => {}
        }
    }

    // Stable sort keeps table order as the final tie-break.
    matched.sort_by_key(|&(index, specificity)| {
        (Reverse(specificity), table.rules[index].category)
    });

    let mut seen: HashSet<&str> = HashSet::new();
    let mut entries = Vec::with_capacity(matched.len());
    for (index, _) in matched {
        let rule = &table.rules[index];
        if !seen.insert(rule.name.as_str()) {
            continue;
        }
        entries.push(DifferentialEntry {
            rank: entries.len() + 1,
            name: rule.name.clone(),
            category: rule.category,
            supporting_findings: supporting_findings(&rule.criteria, findings),
            follow_up: rule.follow_up.clone(),
        });
    }

    let degraded_axes: Vec<Axis> = findings.gaps();

    tracing::debug!(
        table_id = %table.id,
        matched = entries.len(),
        blocked,
        degraded = degraded_axes.len(),
        "Differential list generated"
    );

    DifferentialList {
        entries,
        degraded_axes,
    }
}

/// General recommendation texts whose criteria match, in table order.
pub fn matching_recommendations<'a>(
    findings: &Findings,
    table: &'a DifferentialTable,
) -> Vec<&'a str> {
    table
        .recommendations
        .iter()
        .filter(|r| evaluate(&r.criteria, findings) == RuleMatch::Matched)
        .map(|r| r.text.as_str())
        .collect()
}
