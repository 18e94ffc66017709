// PftLens - core/model.rs
//
// Core data model types. Pure data definitions with no I/O and no
// platform dependencies.
//
// These types are the shared vocabulary across all layers.

use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// Parameters
// =============================================================================

/// A measured pulmonary function parameter.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum Parameter {
    #[serde(rename = "FEV1")]
    Fev1,
    #[serde(rename = "FVC")]
    Fvc,
    #[serde(rename = "FEV1/FVC")]
    Fev1FvcRatio,
    #[serde(rename = "TLC")]
    Tlc,
    #[serde(rename = "RV")]
    Rv,
    #[serde(rename = "DLCO")]
    Dlco,
}

impl Parameter {
    /// Returns all parameters in canonical report order.
    pub fn all() -> &'static [Parameter] {
        &[
            Parameter::Fev1,
            Parameter::Fvc,
            Parameter::Fev1FvcRatio,
            Parameter::Tlc,
            Parameter::Rv,
            Parameter::Dlco,
        ]
    }

    /// Canonical short name, as printed on PFT reports.
    pub fn label(&self) -> &'static str {
        match self {
            Parameter::Fev1 => "FEV1",
            Parameter::Fvc => "FVC",
            Parameter::Fev1FvcRatio => "FEV1/FVC",
            Parameter::Tlc => "TLC",
            Parameter::Rv => "RV",
            Parameter::Dlco => "DLCO",
        }
    }

    /// Long-form name for narrative text.
    pub fn description(&self) -> &'static str {
        match self {
            Parameter::Fev1 => "Forced Expiratory Volume in 1 second",
            Parameter::Fvc => "Forced Vital Capacity",
            Parameter::Fev1FvcRatio => "FEV1/FVC ratio",
            Parameter::Tlc => "Total Lung Capacity",
            Parameter::Rv => "Residual Volume",
            Parameter::Dlco => "Diffusing Capacity for Carbon Monoxide",
        }
    }

    /// Resolve an input name (case-insensitive, common aliases accepted).
    pub fn from_name(name: &str) -> Option<Parameter> {
        let normalised: String = name
            .trim()
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_ascii_uppercase();
        match normalised.as_str() {
            "FEV1" => Some(Parameter::Fev1),
            "FVC" => Some(Parameter::Fvc),
            "FEV1/FVC" | "FEV1_FVC" | "FEV1FVC" | "RATIO" => Some(Parameter::Fev1FvcRatio),
            "TLC" => Some(Parameter::Tlc),
            "RV" => Some(Parameter::Rv),
            "DLCO" => Some(Parameter::Dlco),
            _ => None,
        }
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Which number of a measurement an input or error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Value,
    PercentPredicted,
}

impl Field {
    pub fn label(&self) -> &'static str {
        match self {
            Field::Value => "value",
            Field::PercentPredicted => "% predicted",
        }
    }
}

// =============================================================================
// Measurements
// =============================================================================

/// A validated physiological quantity.
///
/// Both numbers are finite and non-negative. At least one of them is present;
/// an input entry carrying neither is treated as absent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Measurement {
    /// Observed value in the parameter's native units (litres, mL/min/mmHg).
    pub value: Option<f64>,

    /// Observed value as a percentage of the predicted normal.
    pub percent_predicted: Option<f64>,
}

/// FEV1/FVC ratio expressed as a percentage in [0, 100].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Ratio {
    pub percent: f64,

    /// True when computed from the FEV1 and FVC absolute values rather
    /// than reported directly.
    pub derived: bool,
}

// =============================================================================
// Classification labels
// =============================================================================

/// Spirometry pattern.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum PatternLabel {
    Normal,
    Obstructive,
    Restrictive,
    Mixed,
}

impl PatternLabel {
    pub fn label(&self) -> &'static str {
        match self {
            PatternLabel::Normal => "Normal",
            PatternLabel::Obstructive => "Obstructive",
            PatternLabel::Restrictive => "Restrictive",
            PatternLabel::Mixed => "Mixed",
        }
    }

    /// True for patterns with a reduced FVC.
    pub fn is_restrictive(&self) -> bool {
        matches!(self, PatternLabel::Restrictive | PatternLabel::Mixed)
    }

    /// Noun phrase used in impressions.
    pub fn defect_phrase(&self) -> &'static str {
        match self {
            PatternLabel::Normal => "normal spirometry",
            PatternLabel::Obstructive => "obstructive ventilatory defect",
            PatternLabel::Restrictive => "restrictive ventilatory defect",
            PatternLabel::Mixed => "mixed obstructive and restrictive ventilatory defect",
        }
    }
}

impl fmt::Display for PatternLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Severity grade from FEV1 % predicted, mildest first.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum SeverityBand {
    Normal,
    Mild,
    Moderate,
    ModeratelySevere,
    Severe,
    VerySevere,
}

impl SeverityBand {
    pub fn all() -> &'static [SeverityBand] {
        &[
            SeverityBand::Normal,
            SeverityBand::Mild,
            SeverityBand::Moderate,
            SeverityBand::ModeratelySevere,
            SeverityBand::Severe,
            SeverityBand::VerySevere,
        ]
    }

    pub fn label(&self) -> &'static str {
        match self {
            SeverityBand::Normal => "Normal",
            SeverityBand::Mild => "Mild",
            SeverityBand::Moderate => "Moderate",
            SeverityBand::ModeratelySevere => "Moderately Severe",
            SeverityBand::Severe => "Severe",
            SeverityBand::VerySevere => "Very Severe",
        }
    }
}

impl fmt::Display for SeverityBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Lung volume corroboration of the spirometric pattern.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum VolumeLabel {
    ConfirmsRestriction,
    ConfirmsObstruction,
    AirTrapping,
    Indeterminate,
}

impl VolumeLabel {
    pub fn label(&self) -> &'static str {
        match self {
            VolumeLabel::ConfirmsRestriction => "Confirms Restriction",
            VolumeLabel::ConfirmsObstruction => "Confirms Obstruction",
            VolumeLabel::AirTrapping => "Air Trapping",
            VolumeLabel::Indeterminate => "Indeterminate",
        }
    }
}

impl fmt::Display for VolumeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Diffusing capacity grade from DLCO % predicted, mildest first.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum DiffusionBand {
    Normal,
    MildImpairment,
    ModerateImpairment,
    SevereImpairment,
}

impl DiffusionBand {
    pub fn all() -> &'static [DiffusionBand] {
        &[
            DiffusionBand::Normal,
            DiffusionBand::MildImpairment,
            DiffusionBand::ModerateImpairment,
            DiffusionBand::SevereImpairment,
        ]
    }

    pub fn label(&self) -> &'static str {
        match self {
            DiffusionBand::Normal => "Normal",
            DiffusionBand::MildImpairment => "Mild impairment",
            DiffusionBand::ModerateImpairment => "Moderate impairment",
            DiffusionBand::SevereImpairment => "Severe impairment",
        }
    }

    pub fn is_impaired(&self) -> bool {
        !matches!(self, DiffusionBand::Normal)
    }
}

impl fmt::Display for DiffusionBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Output label of the diffusion interpreter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DiffusionFinding {
    pub band: DiffusionBand,

    /// Impaired DLCO with Normal spirometry.
    pub isolated_defect: bool,
}

impl fmt::Display for DiffusionFinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.isolated_defect {
            write!(f, "{} (Isolated Diffusion Defect)", self.band)
        } else {
            write!(f, "{}", self.band)
        }
    }
}

// =============================================================================
// Classification results
// =============================================================================

/// One interpretation axis of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Axis {
    Pattern,
    Severity,
    Volumes,
    Diffusion,
}

impl Axis {
    pub fn label(&self) -> &'static str {
        match self {
            Axis::Pattern => "spirometry pattern",
            Axis::Severity => "severity grading",
            Axis::Volumes => "lung volume assessment",
            Axis::Diffusion => "diffusion assessment",
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A classifier's verdict plus the statements that justify it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationResult<L> {
    pub label: L,

    /// Ordered statements naming the values and thresholds compared.
    pub rationale: Vec<String>,
}

/// Marker for an axis whose required inputs were not available.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DataGap {
    pub axis: Axis,

    /// Parameters that were never provided.
    pub missing: Vec<Parameter>,

    /// Parameters that were provided but rejected by validation.
    pub invalid: Vec<Parameter>,
}

impl DataGap {
    pub fn missing(axis: Axis, missing: Vec<Parameter>) -> Self {
        Self {
            axis,
            missing,
            invalid: Vec::new(),
        }
    }

    /// Move parameters that were rejected at validation from `missing`
    /// to `invalid`.
    pub fn mark_invalid(&mut self, rejected: &[Parameter]) {
        let (invalid, missing): (Vec<_>, Vec<_>) =
            self.missing.iter().partition(|p| rejected.contains(p));
        self.missing = missing;
        self.invalid.extend(invalid);
    }

    /// The explicit "insufficient data" note rendered in place of a result.
    pub fn note(&self) -> String {
        let mut reasons = Vec::new();
        if !self.missing.is_empty() {
            reasons.push(format!("{} not provided", join_parameters(&self.missing)));
        }
        if !self.invalid.is_empty() {
            reasons.push(format!("{} rejected as invalid", join_parameters(&self.invalid)));
        }
        format!(
            "Insufficient data for {}: {}.",
            self.axis,
            reasons.join("; ")
        )
    }
}

impl fmt::Display for DataGap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.note())
    }
}

/// "FEV1 % predicted, DLCO % predicted" style list for notes.
pub(crate) fn join_parameters(params: &[Parameter]) -> String {
    params
        .iter()
        .map(|p| match p {
            Parameter::Fev1FvcRatio => p.label().to_string(),
            _ => format!("{} % predicted", p.label()),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Result of one axis: classified, or unavailable because of a data gap.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AxisOutcome<L> {
    Classified(ClassificationResult<L>),
    Unavailable(DataGap),
}

impl<L> AxisOutcome<L> {
    pub fn classified(label: L, rationale: Vec<String>) -> Self {
        AxisOutcome::Classified(ClassificationResult { label, rationale })
    }

    pub fn label(&self) -> Option<&L> {
        match self {
            AxisOutcome::Classified(result) => Some(&result.label),
            AxisOutcome::Unavailable(_) => None,
        }
    }

    pub fn result(&self) -> Option<&ClassificationResult<L>> {
        match self {
            AxisOutcome::Classified(result) => Some(result),
            AxisOutcome::Unavailable(_) => None,
        }
    }

    pub fn gap(&self) -> Option<&DataGap> {
        match self {
            AxisOutcome::Classified(_) => None,
            AxisOutcome::Unavailable(gap) => Some(gap),
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, AxisOutcome::Classified(_))
    }

    pub(crate) fn gap_mut(&mut self) -> Option<&mut DataGap> {
        match self {
            AxisOutcome::Classified(_) => None,
            AxisOutcome::Unavailable(gap) => Some(gap),
        }
    }
}

/// The four classifier outcomes for one measurement set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Findings {
    pub pattern: AxisOutcome<PatternLabel>,
    pub severity: AxisOutcome<SeverityBand>,
    pub volumes: AxisOutcome<VolumeLabel>,
    pub diffusion: AxisOutcome<DiffusionFinding>,
}

impl Findings {
    /// Axes whose outcome is a data gap, in axis order.
    pub fn gaps(&self) -> Vec<Axis> {
        let mut gaps = Vec::new();
        if !self.pattern.is_available() {
            gaps.push(Axis::Pattern);
        }
        if !self.severity.is_available() {
            gaps.push(Axis::Severity);
        }
        if !self.volumes.is_available() {
            gaps.push(Axis::Volumes);
        }
        if !self.diffusion.is_available() {
            gaps.push(Axis::Diffusion);
        }
        gaps
    }
}

// =============================================================================
// Differential diagnoses
// =============================================================================

/// Diagnosis categories in tie-break precedence order.
///
/// The derived `Ord` is the precedence: obstructive airway diseases rank
/// ahead of restrictive/interstitial, then extraparenchymal restriction,
/// then vascular, then isolated-diffusion causes.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosisCategory {
    ObstructiveAirway,
    RestrictiveInterstitial,
    ExtraparenchymalRestriction,
    PulmonaryVascular,
    IsolatedDiffusion,
}

impl DiagnosisCategory {
    pub fn label(&self) -> &'static str {
        match self {
            DiagnosisCategory::ObstructiveAirway => "Obstructive airway",
            DiagnosisCategory::RestrictiveInterstitial => "Restrictive / interstitial",
            DiagnosisCategory::ExtraparenchymalRestriction => "Extraparenchymal restriction",
            DiagnosisCategory::PulmonaryVascular => "Pulmonary vascular",
            DiagnosisCategory::IsolatedDiffusion => "Isolated diffusion",
        }
    }
}

impl fmt::Display for DiagnosisCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Reference to a classification label that supports a diagnosis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(tag = "axis", content = "label", rename_all = "snake_case")]
pub enum Finding {
    Pattern(PatternLabel),
    Severity(SeverityBand),
    Volumes(VolumeLabel),
    Diffusion(DiffusionBand),
    IsolatedDiffusionDefect,
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Finding::Pattern(label) => write!(f, "Pattern: {label}"),
            Finding::Severity(band) => write!(f, "Severity: {band}"),
            Finding::Volumes(label) => write!(f, "Volumes: {label}"),
            Finding::Diffusion(band) => write!(f, "Diffusion: {band}"),
            Finding::IsolatedDiffusionDefect => f.write_str("Isolated Diffusion Defect"),
        }
    }
}

/// A candidate diagnosis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DifferentialEntry {
    /// 1 = most consistent with the full finding set.
    pub rank: usize,
    pub name: String,
    pub category: DiagnosisCategory,
    pub supporting_findings: Vec<Finding>,
    pub follow_up: Option<String>,
}

/// Ordered output of the differential generator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Default)]
pub struct DifferentialList {
    pub entries: Vec<DifferentialEntry>,

    /// Axes that were data gaps; rules constraining them were omitted.
    pub degraded_axes: Vec<Axis>,
}

// =============================================================================
// Interpretation report
// =============================================================================

/// Report sections, in their fixed output order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionKind {
    Summary,
    Spirometry,
    LungVolumes,
    Diffusion,
    FinalImpression,
    DifferentialDiagnoses,
    Recommendations,
}

impl SectionKind {
    pub fn all() -> &'static [SectionKind] {
        &[
            SectionKind::Summary,
            SectionKind::Spirometry,
            SectionKind::LungVolumes,
            SectionKind::Diffusion,
            SectionKind::FinalImpression,
            SectionKind::DifferentialDiagnoses,
            SectionKind::Recommendations,
        ]
    }

    pub fn title(&self) -> &'static str {
        match self {
            SectionKind::Summary => "Summary",
            SectionKind::Spirometry => "Spirometry (step by step)",
            SectionKind::LungVolumes => "Lung Volumes (step by step)",
            SectionKind::Diffusion => "Diffusion (step by step)",
            SectionKind::FinalImpression => "Final Impression",
            SectionKind::DifferentialDiagnoses => "Differential Diagnoses",
            SectionKind::Recommendations => "Recommendations",
        }
    }
}

/// Whether a section was computed from full, partial, or no data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionStatus {
    Complete,
    Degraded,
    Unavailable,
}

impl SectionStatus {
    pub fn label(&self) -> &'static str {
        match self {
            SectionStatus::Complete => "complete",
            SectionStatus::Degraded => "degraded",
            SectionStatus::Unavailable => "unavailable",
        }
    }
}

impl fmt::Display for SectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One labelled block of narrative text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportSection {
    pub kind: SectionKind,
    pub title: String,
    pub status: SectionStatus,
    pub lines: Vec<String>,
}

/// The externally visible output of one interpretation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InterpretationReport {
    pub findings: Findings,
    pub differentials: DifferentialList,
    pub recommendations: Vec<String>,

    /// Rejected or ignored inputs, in input order.
    pub input_warnings: Vec<String>,

    /// Identifier of the thresholds table used.
    pub thresholds_table: String,

    /// Identifier of the differential table used.
    pub differentials_table: String,

    /// Narrative sections, always in `SectionKind::all()` order.
    pub sections: Vec<ReportSection>,
}

impl InterpretationReport {
    pub fn section(&self, kind: SectionKind) -> Option<&ReportSection> {
        self.sections.iter().find(|s| s.kind == kind)
    }

    /// True when every section is complete.
    pub fn is_complete(&self) -> bool {
        self.sections
            .iter()
            .all(|s| s.status == SectionStatus::Complete)
    }
}

// =============================================================================
// Rule tables (runtime representation)
// =============================================================================

/// A band matched by a `BandTable` lookup, with the interval it covers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BandMatch<B> {
    pub band: B,
    pub lower: f64,

    /// Exclusive upper bound; `None` for the top band.
    pub upper: Option<f64>,
}

impl<B> BandMatch<B> {
    /// `value` formatted so it never prints equal to a bound it differs from.
    pub fn value_text(&self, value: f64) -> String {
        let mut bounds = vec![self.lower];
        bounds.extend(self.upper);
        fmt_compared(value, &bounds)
    }

    /// Interval text for rationale, e.g. `>= 50% and < 60%`.
    pub fn interval(&self) -> String {
        match (self.lower, self.upper) {
            (lower, None) => format!(">= {}%", fmt_number(lower)),
            (lower, Some(upper)) if lower <= 0.0 => format!("< {}%", fmt_number(upper)),
            (lower, Some(upper)) => {
                format!(">= {}% and < {}%", fmt_number(lower), fmt_number(upper))
            }
        }
    }
}

/// Ordered (lower bound, band) pairs, highest bound first, last bound 0.
///
/// Lookup tests `value >= lower` from the top down and the first match wins,
/// so the bands partition [0, inf) without gaps or overlaps.
#[derive(Debug, Clone, PartialEq)]
pub struct BandTable<B> {
    bands: Vec<(f64, B)>,
}

impl<B: Copy> BandTable<B> {
    /// Build from already-validated bands (see `core::tables`).
    pub fn new(bands: Vec<(f64, B)>) -> Self {
        Self { bands }
    }

    pub fn bands(&self) -> &[(f64, B)] {
        &self.bands
    }

    /// Classify a non-negative percentage. Values below every bound (only
    /// possible for negative input) fall into the lowest band.
    pub fn classify(&self, value: f64) -> Option<BandMatch<B>> {
        let mut upper = None;
        for &(lower, band) in &self.bands {
            if value >= lower {
                return Some(BandMatch { band, lower, upper });
            }
            upper = Some(lower);
        }
        let &(lower, band) = self.bands.last()?;
        let upper = self
            .bands
            .len()
            .checked_sub(2)
            .map(|i| self.bands[i].0);
        Some(BandMatch { band, lower, upper })
    }
}

/// Numeric thresholds and bands used by the four classifiers.
#[derive(Debug, Clone, PartialEq)]
pub struct Thresholds {
    pub id: String,
    pub name: String,
    pub version: String,
    pub description: String,

    /// FEV1/FVC (%) below which obstruction is present.
    pub ratio_threshold: f64,

    /// FVC % predicted below which restriction is suggested.
    pub fvc_threshold: f64,

    pub severity: BandTable<SeverityBand>,

    pub tlc_restriction_threshold: f64,
    pub tlc_hyperinflation_threshold: f64,
    pub rv_air_trapping_threshold: f64,

    pub diffusion: BandTable<DiffusionBand>,

    pub is_builtin: bool,
}

impl Default for Thresholds {
    /// Compiled-in fallback, identical to the built-in thresholds table.
    fn default() -> Self {
        use crate::util::constants;
        Self {
            id: "fallback".to_string(),
            name: "Compiled-in fallback thresholds".to_string(),
            version: "1.0".to_string(),
            description: String::new(),
            ratio_threshold: constants::DEFAULT_RATIO_THRESHOLD,
            fvc_threshold: constants::DEFAULT_FVC_THRESHOLD,
            severity: BandTable::new(vec![
                (80.0, SeverityBand::Normal),
                (70.0, SeverityBand::Mild),
                (60.0, SeverityBand::Moderate),
                (50.0, SeverityBand::ModeratelySevere),
                (35.0, SeverityBand::Severe),
                (0.0, SeverityBand::VerySevere),
            ]),
            tlc_restriction_threshold: constants::DEFAULT_TLC_RESTRICTION_THRESHOLD,
            tlc_hyperinflation_threshold: constants::DEFAULT_TLC_HYPERINFLATION_THRESHOLD,
            rv_air_trapping_threshold: constants::DEFAULT_RV_AIR_TRAPPING_THRESHOLD,
            diffusion: BandTable::new(vec![
                (75.0, DiffusionBand::Normal),
                (60.0, DiffusionBand::MildImpairment),
                (40.0, DiffusionBand::ModerateImpairment),
                (0.0, DiffusionBand::SevereImpairment),
            ]),
            is_builtin: true,
        }
    }
}

/// Conditions on classifier outcomes. An empty list accepts any label.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Criteria {
    pub pattern: Vec<PatternLabel>,
    pub severity: Vec<SeverityBand>,
    pub volumes: Vec<VolumeLabel>,
    pub diffusion: Vec<DiffusionBand>,
    pub isolated_defect: Option<bool>,
}

impl Criteria {
    /// Number of constrained axes; the rule's specificity.
    pub fn specificity(&self) -> usize {
        [
            !self.pattern.is_empty(),
            !self.severity.is_empty(),
            !self.volumes.is_empty(),
            !self.diffusion.is_empty(),
            self.isolated_defect.is_some(),
        ]
        .iter()
        .filter(|&&constrained| constrained)
        .count()
    }
}

/// A candidate diagnosis and the findings that suggest it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DifferentialRule {
    pub name: String,
    pub category: DiagnosisCategory,
    pub criteria: Criteria,
    pub follow_up: Option<String>,
}

/// A general recommendation triggered by findings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecommendationRule {
    pub text: String,
    pub criteria: Criteria,
}

/// Differential diagnosis and recommendation rules, in table order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DifferentialTable {
    pub id: String,
    pub name: String,
    pub version: String,
    pub rules: Vec<DifferentialRule>,
    pub recommendations: Vec<RecommendationRule>,
    pub is_builtin: bool,
}

/// Everything the pipeline needs besides the measurements.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RuleTables {
    pub thresholds: Thresholds,
    pub differentials: DifferentialTable,
}

// =============================================================================
// Number formatting
// =============================================================================

/// Format a measurement for narrative text: at most two decimals, trailing
/// zeros removed (`58.0` -> `58`, `69.90` -> `69.9`).
pub fn fmt_number(value: f64) -> String {
    let text = format!("{value:.2}");
    let trimmed = text.trim_end_matches('0').trim_end_matches('.');
    if trimmed == "-0" {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Format a value that is compared against `bounds`. Two decimals are used
/// unless that would print the value identical to a bound it differs from;
/// then the full value is printed so the comparison stays visible.
pub fn fmt_compared(value: f64, bounds: &[f64]) -> String {
    let text = fmt_number(value);
    let collides = bounds
        .iter()
        .any(|&bound| bound != value && fmt_number(bound) == text);
    if collides {
        format!("{value}")
    } else {
        text
    }
}
