// PftLens - tests/e2e_pipeline.rs
//
// End-to-end tests for the interpretation pipeline.
//
// These tests read real fixture documents from disk, load the real built-in
// rule tables, and run the full path from raw JSON/CSV to a rendered report.
// The final group drives the compiled `pftlens` binary.

use pftlens::app::{batch, tables_mgr};
use pftlens::core::export::{self, ReportFormat};
use pftlens::core::input::{parse_csv, parse_json};
use pftlens::core::model::{
    Axis, DiagnosisCategory, DiffusionBand, InterpretationReport, PatternLabel, RuleTables,
    SectionKind, SectionStatus, SeverityBand, VolumeLabel,
};
use pftlens::core::opinion::{build_prompt, consult, SecondOpinion};
use pftlens::core::pipeline;
use pftlens::platform::fs::read_capped;
use pftlens::util::constants;
use pftlens::util::error::ExternalServiceError;
use std::path::PathBuf;
use std::process::Command;

// =============================================================================
// Helpers
// =============================================================================

/// Absolute path to the on-disk fixture files.
fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn tables() -> RuleTables {
    let (tables, errors) = tables_mgr::load_tables(None);
    assert!(errors.is_empty(), "built-in tables failed: {errors:?}");
    tables
}

fn interpret_fixture(name: &str) -> InterpretationReport {
    let text = read_capped(&fixture(name), constants::MAX_INPUT_FILE_SIZE).unwrap();
    let input = parse_json(&text).unwrap();
    pipeline::interpret_input(&input, &tables())
}

fn differential_names(report: &InterpretationReport) -> Vec<&str> {
    report
        .differentials
        .entries
        .iter()
        .map(|e| e.name.as_str())
        .collect()
}

fn render_text(report: &InterpretationReport) -> String {
    let mut buf = Vec::new();
    export::render_text(report, &mut buf, &PathBuf::from("<test>"), true).unwrap();
    String::from_utf8(buf).unwrap()
}

// =============================================================================
// Single documents
// =============================================================================

/// Ratio 55, FVC 70%, FEV1 58%, TLC 75%, DLCO 65%: mixed defect with
/// restriction confirmed, mild diffusion impairment, obstructive and
/// interstitial differentials ranked first.
#[test]
fn e2e_mixed_defect() {
    let report = interpret_fixture("mixed_defect.json");
    let findings = &report.findings;

    assert_eq!(findings.pattern.label(), Some(&PatternLabel::Mixed));
    assert_eq!(
        findings.severity.label(),
        Some(&SeverityBand::ModeratelySevere)
    );
    assert_eq!(
        findings.volumes.label(),
        Some(&VolumeLabel::ConfirmsRestriction)
    );
    let diffusion = findings.diffusion.label().unwrap();
    assert_eq!(diffusion.band, DiffusionBand::MildImpairment);
    assert!(!diffusion.isolated_defect);
    assert!(report.differentials.degraded_axes.is_empty());
    assert!(report.is_complete());

    let names = differential_names(&report);
    assert_eq!(names[0], "COPD, emphysema-predominant");
    assert_eq!(
        names[1],
        "Interstitial lung disease (e.g. idiopathic pulmonary fibrosis)"
    );
    assert!(names.contains(&"Pleural disease"));
    assert!(!report
        .differentials
        .entries
        .iter()
        .any(|e| e.category == DiagnosisCategory::IsolatedDiffusion));
    let ranks: Vec<usize> = report.differentials.entries.iter().map(|e| e.rank).collect();
    assert_eq!(ranks, (1..=names.len()).collect::<Vec<_>>());

    let text = render_text(&report);
    assert!(text.contains("Mixed"));
    assert!(text.contains("Moderately Severe"));
    assert!(text.contains("Confirms Restriction"));
    assert!(text.trim_end().ends_with(constants::DISCLAIMER));
}

/// Normal spirometry with DLCO 55%: isolated diffusion defect.
#[test]
fn e2e_isolated_diffusion_defect() {
    let report = interpret_fixture("isolated_dlco.json");
    let findings = &report.findings;

    assert_eq!(findings.pattern.label(), Some(&PatternLabel::Normal));
    assert_eq!(findings.severity.label(), Some(&SeverityBand::Normal));
    assert_eq!(findings.volumes.label(), Some(&VolumeLabel::Indeterminate));
    let diffusion = findings.diffusion.label().unwrap();
    assert_eq!(diffusion.band, DiffusionBand::ModerateImpairment);
    assert!(diffusion.isolated_defect);
    assert!(report.is_complete());

    let names = differential_names(&report);
    assert!(names.contains(&"Early interstitial lung disease"));
    assert!(names.contains(&"Anaemia"));
    assert!(!names.iter().any(|n| n.contains("COPD")));
}

/// Without DLCO the diffusion axis is a gap, diffusion-dependent rules are
/// omitted, and the report asks for the missing value.
#[test]
fn e2e_missing_dlco_degrades_gracefully() {
    let report = interpret_fixture("missing_dlco.json");

    assert_eq!(
        report.findings.pattern.label(),
        Some(&PatternLabel::Obstructive)
    );
    assert_eq!(report.findings.severity.label(), Some(&SeverityBand::Moderate));
    assert!(report
        .differentials
        .degraded_axes
        .contains(&Axis::Diffusion));

    let names = differential_names(&report);
    assert!(names.contains(&"Bronchiectasis"));
    assert!(!names.contains(&"Asthma"), "diffusion-constrained rule leaked: {names:?}");

    assert!(report
        .recommendations
        .contains(&"Obtain DLCO % predicted to complete the diffusion assessment.".to_string()));
    assert_eq!(
        report.section(SectionKind::Diffusion).unwrap().status,
        SectionStatus::Unavailable
    );

    // The unrecognised KCO key is surfaced, not silently dropped.
    assert!(report
        .input_warnings
        .iter()
        .any(|w| w.contains("'KCO' is not a recognised parameter")));
}

/// Flat keys inside a fenced block: zeros mean "not reported", RV > 120%
/// with obstruction reads as air trapping.
#[test]
fn e2e_legacy_flat_document() {
    let report = interpret_fixture("legacy_flat.json");
    let findings = &report.findings;

    assert_eq!(findings.pattern.label(), Some(&PatternLabel::Mixed));
    assert_eq!(findings.severity.label(), Some(&SeverityBand::Severe));
    assert_eq!(findings.volumes.label(), Some(&VolumeLabel::AirTrapping));
    assert!(findings.diffusion.gap().is_some());
}

/// A ratio written under a `percent` key is still the ratio.
#[test]
fn e2e_ratio_under_percent_key() {
    let report = interpret_fixture("ratio_percent_key.json");

    assert_eq!(report.findings.pattern.label(), Some(&PatternLabel::Mixed));
    assert!(report.input_warnings.is_empty());
    let text = render_text(&report);
    assert!(!text.contains("FEV1/FVC not provided"));
}

/// The same document always yields the same report.
#[test]
fn e2e_interpretation_is_deterministic() {
    let first = interpret_fixture("mixed_defect.json");
    let second = interpret_fixture("mixed_defect.json");
    assert_eq!(first, second);
}

#[test]
fn e2e_markdown_and_json_exports() {
    let report = interpret_fixture("missing_dlco.json");
    let path = PathBuf::from("<test>");

    let mut markdown = Vec::new();
    export::render_markdown(&report, &mut markdown, &path, false).unwrap();
    let markdown = String::from_utf8(markdown).unwrap();
    assert!(markdown.contains("## Differential Diagnoses"));
    assert!(!markdown.contains(constants::DISCLAIMER));

    let mut json = Vec::new();
    export::export_json(&report, &mut json, &path).unwrap();
    let value: serde_json::Value = serde_json::from_slice(&json).unwrap();
    assert_eq!(value["findings"]["pattern"]["status"], "classified");
    assert_eq!(value["findings"]["diffusion"]["status"], "unavailable");
    assert_eq!(value["sections"].as_array().unwrap().len(), 7);
}

// =============================================================================
// Batch
// =============================================================================

#[test]
fn e2e_batch_csv() {
    let text = read_capped(&fixture("batch.csv"), constants::MAX_BATCH_FILE_SIZE).unwrap();
    let records = parse_csv(text.as_bytes(), constants::MAX_BATCH_ROWS).unwrap();
    assert_eq!(records.len(), 3);

    let results = batch::run(&records, &tables(), 2);
    let ids: Vec<&str> = results.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["mixed", "blank", "restrictive"]);

    assert_eq!(
        results[0].report.findings.pattern.label(),
        Some(&PatternLabel::Mixed)
    );
    assert!(results[1].looks_empty);
    assert!(results[1].report.findings.pattern.gap().is_some());

    let restrictive = &results[2].report.findings;
    assert_eq!(restrictive.pattern.label(), Some(&PatternLabel::Restrictive));
    assert_eq!(
        restrictive.volumes.label(),
        Some(&VolumeLabel::ConfirmsRestriction)
    );

    let pairs: Vec<(&str, &InterpretationReport)> =
        results.iter().map(|r| (r.id.as_str(), &r.report)).collect();
    let mut csv_out = Vec::new();
    let rows =
        export::export_differentials_csv(&pairs, &mut csv_out, &PathBuf::from("<test>")).unwrap();
    let csv_text = String::from_utf8(csv_out).unwrap();
    assert_eq!(csv_text.lines().count(), rows + 1);
    assert!(csv_text.starts_with("id,rank,name,category,supporting_findings,follow_up"));
    assert!(!csv_text.contains("\nblank,"));
}

// =============================================================================
// Second opinion
// =============================================================================

struct Failing;

impl SecondOpinion for Failing {
    fn name(&self) -> &str {
        "failing"
    }

    fn summarize(&self, _report: &InterpretationReport) -> Result<String, ExternalServiceError> {
        Err(ExternalServiceError::Rejected {
            service: "failing".to_string(),
            reason: "quota exceeded".to_string(),
        })
    }
}

/// A failing collaborator never changes the core report.
#[test]
fn e2e_second_opinion_failure_keeps_core_report() {
    let report = interpret_fixture("mixed_defect.json");
    let reviewed = consult(report.clone(), &Failing);
    assert_eq!(reviewed.report, report);
    assert!(reviewed.warning().unwrap().contains("quota exceeded"));

    let mut buf = Vec::new();
    export::render_reviewed_text(&reviewed, &mut buf, &PathBuf::from("<test>"), false).unwrap();
    let text = String::from_utf8(buf).unwrap();
    assert!(text.contains("Second Opinion [unavailable]"));
    assert!(text.contains("COPD, emphysema-predominant"));
}

#[test]
fn e2e_prompt_carries_findings() {
    let report = interpret_fixture("isolated_dlco.json");
    let prompt = build_prompt(&report);
    assert!(prompt.contains("Isolated Diffusion Defect"));
    assert!(prompt.contains("Early interstitial lung disease"));
}

// =============================================================================
// Binary
// =============================================================================

/// Run the binary with an isolated config home so a developer's own
/// config.toml never leaks into the test.
fn pftlens(args: &[&str]) -> std::process::Output {
    let home = tempfile::tempdir().unwrap();
    let tables_dir = home.path().join("tables");
    Command::new(env!("CARGO_BIN_EXE_pftlens"))
        .args(args)
        .arg("--tables-dir")
        .arg(&tables_dir)
        .env("XDG_CONFIG_HOME", home.path())
        .env("XDG_DATA_HOME", home.path())
        .env_remove("RUST_LOG")
        .output()
        .unwrap()
}

#[test]
fn e2e_cli_text_report() {
    let input = fixture("mixed_defect.json");
    let output = pftlens(&[input.to_str().unwrap()]);
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("Final Impression"));
    assert!(stdout.contains("COPD, emphysema-predominant"));
}

#[test]
fn e2e_cli_json_to_file() {
    let out_dir = tempfile::tempdir().unwrap();
    let out = out_dir.path().join("report.json");
    let input = fixture("isolated_dlco.json");
    let output = pftlens(&[
        input.to_str().unwrap(),
        "--format",
        ReportFormat::Json.label(),
        "--output",
        out.to_str().unwrap(),
    ]);
    assert!(output.status.success());
    let value: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
    assert_eq!(value["findings"]["diffusion"]["label"]["isolated_defect"], true);
}

#[test]
fn e2e_cli_batch_warns_on_empty_row() {
    let input = fixture("batch.csv");
    let output = pftlens(&["--batch", input.to_str().unwrap(), "-f", "csv"]);
    assert!(output.status.success());
    let stderr = String::from_utf8(output.stderr).unwrap();
    assert!(stderr.contains("blank: the values seem to be empty"));
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.lines().next().unwrap().starts_with("id,rank"));
}

#[test]
fn e2e_cli_missing_file_exits_nonzero() {
    let output = pftlens(&["/definitely/not/here.json"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8(output.stderr).unwrap().contains("Error:"));
}

#[test]
fn e2e_cli_failed_run_leaves_output_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let bad = dir.path().join("bad.json");
    std::fs::write(&bad, "{ not json").unwrap();
    let out = dir.path().join("report.txt");
    std::fs::write(&out, "previous report").unwrap();

    let output = pftlens(&[bad.to_str().unwrap(), "--output", out.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(1));
    assert_eq!(std::fs::read_to_string(&out).unwrap(), "previous report");

    let fresh = dir.path().join("never.txt");
    let output = pftlens(&[bad.to_str().unwrap(), "-o", fresh.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(1));
    assert!(!fresh.exists());
}
