// PftLens - core/opinion.rs
//
// Optional second-opinion collaborator.
//
// The deterministic report is always produced first and is never modified
// here. A collaborator's narrative is attached beside it, clearly labelled
// as supplementary; a collaborator failure becomes a warning, never an error
// of the interpretation.

use crate::core::model::{AxisOutcome, InterpretationReport};
use crate::util::constants;
use crate::util::error::ExternalServiceError;
use serde::Serialize;
use std::fmt::Write as _;

/// A service that turns a finished report into supplementary narrative.
pub trait SecondOpinion {
    /// Short name for labelling the supplement and log events.
    fn name(&self) -> &str;

    fn summarize(&self, report: &InterpretationReport) -> Result<String, ExternalServiceError>;
}

/// What the collaborator contributed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OpinionOutcome {
    Supplement { service: String, text: String },
    Unavailable { service: String, warning: String },
}

/// The core report plus the collaborator's contribution, side by side.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewedReport {
    pub report: InterpretationReport,
    pub opinion: OpinionOutcome,
}

impl ReviewedReport {
    pub fn supplement(&self) -> Option<&str> {
        match &self.opinion {
            OpinionOutcome::Supplement { text, .. } => Some(text),
            OpinionOutcome::Unavailable { .. } => None,
        }
    }

    pub fn warning(&self) -> Option<&str> {
        match &self.opinion {
            OpinionOutcome::Supplement { .. } => None,
            OpinionOutcome::Unavailable { warning, .. } => Some(warning),
        }
    }
}

/// Ask `service` for a supplementary narrative.
pub fn consult(report: InterpretationReport, service: &dyn SecondOpinion) -> ReviewedReport {
    let name = service.name().to_string();
    let result = service
        .summarize(&report)
        .and_then(|text| check_response(&name, text));

    let opinion = match result {
        Ok(text) => {
            tracing::info!(service = %name, bytes = text.len(), "Second opinion received");
            OpinionOutcome::Supplement {
                service: name,
                text,
            }
        }
        Err(e) => {
            tracing::warn!(service = %name, error = %e, "Second opinion unavailable");
            OpinionOutcome::Unavailable {
                service: name,
                warning: e.to_string(),
            }
        }
    };

    ReviewedReport { report, opinion }
}

fn check_response(service: &str, text: String) -> Result<String, ExternalServiceError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ExternalServiceError::EmptyResponse {
            service: service.to_string(),
        });
    }
    if trimmed.len() > constants::MAX_OPINION_RESPONSE_BYTES {
        return Err(ExternalServiceError::ResponseTooLarge {
            service: service.to_string(),
            size: trimmed.len(),
            max: constants::MAX_OPINION_RESPONSE_BYTES,
        });
    }
    Ok(trimmed.to_string())
}

/// Render the report's findings as a single prompt for a language-model
/// collaborator: role, data, interpretation guidelines, output format.
pub fn build_prompt(report: &InterpretationReport) -> String {
    let mut prompt = String::new();
    let f = &report.findings;

    prompt.push_str(
        "You are an expert pulmonologist. Review the following pulmonary function test \
         findings and provide a structured clinical interpretation.\n\n",
    );

    prompt.push_str("FINDINGS (rule-based, thresholds table ");
    let _ = writeln!(prompt, "'{}'):", report.thresholds_table);
    push_axis(&mut prompt, "Spirometry pattern", &f.pattern);
    push_axis(&mut prompt, "Severity", &f.severity);
    push_axis(&mut prompt, "Lung volumes", &f.volumes);
    push_axis(&mut prompt, "Diffusion", &f.diffusion);

    if !report.differentials.entries.is_empty() {
        prompt.push_str("\nRULE-BASED DIFFERENTIALS:\n");
        for entry in &report.differentials.entries {
            let _ = writeln!(prompt, "{}. {} ({})", entry.rank, entry.name, entry.category);
        }
    }

    if !report.input_warnings.is_empty() {
        prompt.push_str("\nINPUT WARNINGS:\n");
        for warning in &report.input_warnings {
            let _ = writeln!(prompt, "- {warning}");
        }
    }

    prompt.push_str(
        "\nGUIDELINES:\n\
         1. Spirometry: evaluate for obstruction (FEV1/FVC < 70% or below LLN), restriction \
         (FVC < 80% predicted) or a mixed pattern. Grade severity from FEV1 % predicted.\n\
         2. Lung volumes: confirm restriction if TLC < 80% predicted. Check for hyperinflation \
         or air trapping if TLC or RV are high.\n\
         3. Diffusion: evaluate DLCO and whether any impairment is isolated.\n\
         Do not contradict the findings above without stating why.\n\
         \nOUTPUT FORMAT (Markdown):\n\
         ### 1. Technical Quality & Pattern\n\
         [Concise summary of the pattern]\n\
         \n\
         ### 2. Detailed Interpretation\n\
         * **Airflow:** [Analysis]\n\
         * **Volumes:** [Analysis]\n\
         * **Gas Exchange:** [Analysis]\n\
         \n\
         ### 3. Impression & Severity\n\
         [Final impression]\n\
         \n\
         ### 4. Differential Diagnosis & Recommendations\n\
         [Potential causes and next steps]\n",
    );

    prompt
}

fn push_axis<L: std::fmt::Display>(prompt: &mut String, name: &str, outcome: &AxisOutcome<L>) {
    match outcome {
        AxisOutcome::Classified(result) => {
            let _ = writeln!(prompt, "- {name}: {}", result.label);
            for line in &result.rationale {
                let _ = writeln!(prompt, "    {line}");
            }
        }
        AxisOutcome::Unavailable(gap) => {
            let _ = writeln!(prompt, "- {name}: {}", gap.note());
        }
    }
}
