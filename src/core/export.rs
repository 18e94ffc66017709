// PftLens - core/export.rs
//
// Rendering and export of interpretation reports.
// Core layer: writes to any Write trait object. The path argument is used
// for error context only.

use crate::core::model::{InterpretationReport, SectionKind, SectionStatus};
use crate::core::opinion::{OpinionOutcome, ReviewedReport};
use crate::util::constants;
use crate::util::error::ExportError;
use serde::Serialize;
use std::fmt::Write as _;
use std::io::Write;
use std::path::PathBuf;

/// Output format selectable from the CLI and config.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    Text,
    Markdown,
    Json,
    Csv,
}

impl ReportFormat {
    pub fn from_name(name: &str) -> Option<ReportFormat> {
        match name.trim().to_ascii_lowercase().as_str() {
            "text" | "txt" => Some(ReportFormat::Text),
            "markdown" | "md" => Some(ReportFormat::Markdown),
            "json" => Some(ReportFormat::Json),
            "csv" => Some(ReportFormat::Csv),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ReportFormat::Text => "text",
            ReportFormat::Markdown => "markdown",
            ReportFormat::Json => "json",
            ReportFormat::Csv => "csv",
        }
    }
}

// =============================================================================
// Plain text
// =============================================================================

fn text_body(report: &InterpretationReport, out: &mut String) {
    let _ = writeln!(out, "{} interpretation report", constants::APP_NAME);
    let _ = writeln!(
        out,
        "Thresholds: {} | Differentials: {}",
        report.thresholds_table, report.differentials_table
    );
    for section in &report.sections {
        out.push('\n');
        match section.status {
            SectionStatus::Complete => {
                let _ = writeln!(out, "== {} ==", section.title);
            }
            status => {
                let _ = writeln!(out, "== {} [{status}] ==", section.title);
            }
        }
        for line in &section.lines {
            let _ = writeln!(out, "{line}");
        }
    }
}

fn write_out<W: Write>(mut writer: W, text: &str, path: &PathBuf) -> Result<(), ExportError> {
    writer
        .write_all(text.as_bytes())
        .and_then(|()| writer.flush())
        .map_err(|e| ExportError::Io {
            path: path.clone(),
            source: e,
        })
}

/// Render the report as plain text, sections in fixed order.
pub fn render_text<W: Write>(
    report: &InterpretationReport,
    writer: W,
    path: &PathBuf,
    include_disclaimer: bool,
) -> Result<(), ExportError> {
    let mut out = String::new();
    text_body(report, &mut out);
    if include_disclaimer {
        let _ = write!(out, "\n{}\n", constants::DISCLAIMER);
    }
    write_out(writer, &out, path)
}

/// Render a reviewed report: the core report, then the supplementary
/// second opinion (or the warning explaining its absence).
pub fn render_reviewed_text<W: Write>(
    reviewed: &ReviewedReport,
    writer: W,
    path: &PathBuf,
    include_disclaimer: bool,
) -> Result<(), ExportError> {
    let mut out = String::new();
    text_body(&reviewed.report, &mut out);
    match &reviewed.opinion {
        OpinionOutcome::Supplement { service, text } => {
            let _ = write!(
                out,
                "\n== Second Opinion (supplementary, from '{service}') ==\n\
                 Not part of the rule-based interpretation above.\n\n{text}\n"
            );
        }
        OpinionOutcome::Unavailable { warning, .. } => {
            let _ = write!(out, "\n== Second Opinion [unavailable] ==\nWarning: {warning}\n");
        }
    }
    if include_disclaimer {
        let _ = write!(out, "\n{}\n", constants::DISCLAIMER);
    }
    write_out(writer, &out, path)
}

// =============================================================================
// Markdown
// =============================================================================

fn markdown_body(report: &InterpretationReport, out: &mut String) {
    let _ = writeln!(out, "# {} Interpretation Report", constants::APP_NAME);
    let _ = writeln!(
        out,
        "\n_Thresholds: `{}` | Differentials: `{}`_",
        report.thresholds_table, report.differentials_table
    );
    for section in &report.sections {
        match section.status {
            SectionStatus::Complete => {
                let _ = writeln!(out, "\n## {}\n", section.title);
            }
            status => {
                let _ = writeln!(out, "\n## {} _({status})_\n", section.title);
            }
        }
        for line in &section.lines {
            if section.kind == SectionKind::DifferentialDiagnoses
                && line.split_once(". ").map_or(false, |(n, _)| n.parse::<usize>().is_ok())
            {
                let _ = writeln!(out, "{line}");
            } else if let Some(item) = line.strip_prefix("- ") {
                let _ = writeln!(out, "- {item}");
            } else {
                let _ = writeln!(out, "- {line}");
            }
        }
    }
}

/// Render the report as Markdown.
pub fn render_markdown<W: Write>(
    report: &InterpretationReport,
    writer: W,
    path: &PathBuf,
    include_disclaimer: bool,
) -> Result<(), ExportError> {
    let mut out = String::new();
    markdown_body(report, &mut out);
    if include_disclaimer {
        let _ = write!(out, "\n> {}\n", constants::DISCLAIMER);
    }
    write_out(writer, &out, path)
}

/// Markdown counterpart of `render_reviewed_text`.
pub fn render_reviewed_markdown<W: Write>(
    reviewed: &ReviewedReport,
    writer: W,
    path: &PathBuf,
    include_disclaimer: bool,
) -> Result<(), ExportError> {
    let mut out = String::new();
    markdown_body(&reviewed.report, &mut out);
    match &reviewed.opinion {
        OpinionOutcome::Supplement { service, text } => {
            let _ = write!(
                out,
                "\n---\n\n## Second Opinion (supplementary)\n\n\
                 _Provided by `{service}`; not part of the rule-based interpretation above._\n\n\
                 {text}\n"
            );
        }
        OpinionOutcome::Unavailable { warning, .. } => {
            let _ = write!(
                out,
                "\n---\n\n## Second Opinion _(unavailable)_\n\n> Warning: {warning}\n"
            );
        }
    }
    if include_disclaimer {
        let _ = write!(out, "\n> {}\n", constants::DISCLAIMER);
    }
    write_out(writer, &out, path)
}

// =============================================================================
// JSON and CSV
// =============================================================================

/// Export any serialisable report shape as pretty JSON.
pub fn export_json<T: Serialize + ?Sized, W: Write>(
    value: &T,
    mut writer: W,
    export_path: &PathBuf,
) -> Result<(), ExportError> {
    serde_json::to_writer_pretty(&mut writer, value).map_err(|e| ExportError::Json {
        path: export_path.clone(),
        source: e,
    })?;
    writeln!(writer).map_err(|e| ExportError::Io {
        path: export_path.clone(),
        source: e,
    })
}

/// Export the differential entries of one or more reports as CSV.
///
/// Writes: id, rank, name, category, supporting_findings, follow_up.
/// Returns the number of data rows written.
pub fn export_differentials_csv<W: Write>(
    reports: &[(&str, &InterpretationReport)],
    writer: W,
    export_path: &PathBuf,
) -> Result<usize, ExportError> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    let csv_err = |e: csv::Error| ExportError::Csv {
        path: export_path.clone(),
        source: e,
    };

    csv_writer
        .write_record([
            "id",
            "rank",
            "name",
            "category",
            "supporting_findings",
            "follow_up",
        ])
        .map_err(csv_err)?;

    let mut count = 0;
    for (id, report) in reports {
        for entry in &report.differentials.entries {
            let supporting = entry
                .supporting_findings
                .iter()
                .map(|f| f.to_string())
                .collect::<Vec<_>>()
                .join("; ");
            csv_writer
                .write_record([
                    *id,
                    entry.rank.to_string().as_str(),
                    entry.name.as_str(),
                    entry.category.label(),
                    supporting.as_str(),
                    entry.follow_up.as_deref().unwrap_or(""),
                ])
                .map_err(csv_err)?;
            count += 1;
        }
    }

    csv_writer.flush().map_err(|e| ExportError::Io {
        path: export_path.clone(),
        source: e,
    })?;

    Ok(count)
}
