// PftLens - core/tables.rs
//
// Rule table loading and validation.
// Core layer: accepts TOML strings, never touches the filesystem.
// I/O is handled by app::tables_mgr which feeds content here.
//
// Clinical thresholds and differential rules are data, not code: changing a
// cut-off means editing a table, not a classifier.

use crate::core::model::{
    BandTable, Criteria, DiagnosisCategory, DifferentialRule, DifferentialTable, DiffusionBand,
    PatternLabel, RecommendationRule, RuleTables, SeverityBand, Thresholds, VolumeLabel,
};
use crate::util::constants;
use crate::util::error::TableError;
use serde::Deserialize;
use std::path::PathBuf;

// =============================================================================
// TOML deserialization structures (raw input)
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct TableMeta {
    pub id: String,
    pub name: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub description: String,
}

fn default_version() -> String {
    "1.0".to_string()
}

/// Raw thresholds table as deserialized from thresholds.toml.
#[derive(Debug, Deserialize)]
pub struct ThresholdsDefinition {
    pub table: TableMeta,
    pub pattern: PatternDef,
    pub severity: Vec<BandDef<SeverityBand>>,
    pub volumes: VolumesDef,
    pub diffusion: Vec<BandDef<DiffusionBand>>,
}

#[derive(Debug, Deserialize)]
pub struct PatternDef {
    pub ratio_threshold: f64,
    pub fvc_threshold: f64,
}

#[derive(Debug, Deserialize)]
pub struct BandDef<B> {
    pub lower_bound: f64,
    pub band: B,
}

#[derive(Debug, Deserialize)]
pub struct VolumesDef {
    pub tlc_restriction_threshold: f64,
    pub tlc_hyperinflation_threshold: f64,
    pub rv_air_trapping_threshold: f64,
}

/// Raw differential table as deserialized from differentials.toml.
#[derive(Debug, Deserialize)]
pub struct DifferentialsDefinition {
    pub table: TableMeta,
    #[serde(default, rename = "rule")]
    pub rules: Vec<RuleDef>,
    #[serde(default, rename = "recommendation")]
    pub recommendations: Vec<RecommendationDef>,
}

#[derive(Debug, Deserialize, Default)]
pub struct CriteriaDef {
    #[serde(default)]
    pub pattern: Vec<PatternLabel>,
    #[serde(default)]
    pub severity: Vec<SeverityBand>,
    #[serde(default)]
    pub volumes: Vec<VolumeLabel>,
    #[serde(default)]
    pub diffusion: Vec<DiffusionBand>,
    #[serde(default)]
    pub isolated_defect: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct RuleDef {
    pub name: String,
    pub category: DiagnosisCategory,
    #[serde(default)]
    pub when: CriteriaDef,
    #[serde(default)]
    pub follow_up: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RecommendationDef {
    pub text: String,
    #[serde(default)]
    pub when: CriteriaDef,
}

// =============================================================================
// Parsing
// =============================================================================

/// Parse a TOML string into a `ThresholdsDefinition`.
///
/// `source_path` is used for error messages only (not for I/O).
pub fn parse_thresholds_toml(
    toml_content: &str,
    source_path: &PathBuf,
) -> Result<ThresholdsDefinition, TableError> {
    toml::from_str(toml_content).map_err(|e| TableError::TomlParse {
        path: source_path.clone(),
        source: e,
    })
}

/// Parse a TOML string into a `DifferentialsDefinition`.
pub fn parse_differentials_toml(
    toml_content: &str,
    source_path: &PathBuf,
) -> Result<DifferentialsDefinition, TableError> {
    toml::from_str(toml_content).map_err(|e| TableError::TomlParse {
        path: source_path.clone(),
        source: e,
    })
}

// =============================================================================
// Validation and compilation
// =============================================================================

fn validate_meta(meta: &TableMeta) -> Result<(), TableError> {
    if meta.id.trim().is_empty() {
        return Err(TableError::MissingField {
            table_id: "(empty)".to_string(),
            field: "table.id",
        });
    }
    if meta.name.trim().is_empty() {
        return Err(TableError::MissingField {
            table_id: meta.id.clone(),
            field: "table.name",
        });
    }
    Ok(())
}

fn validate_threshold(table_id: &str, field: &'static str, value: f64) -> Result<f64, TableError> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(TableError::InvalidThreshold {
            table_id: table_id.to_string(),
            field,
            value,
        })
    }
}

/// Validate a band list and compile it into a `BandTable`.
///
/// Checks: non-empty, first band is `normal`, bands listed mildest first
/// without duplicates, lower bounds finite and strictly descending, and the
/// last lower bound exactly 0 so [0, inf) is fully covered.
fn compile_bands<B>(
    table_id: &str,
    field: &'static str,
    defs: Vec<BandDef<B>>,
    normal: B,
) -> Result<BandTable<B>, TableError>
where
    B: Copy + Ord + std::fmt::Debug,
{
    let Some(first) = defs.first() else {
        return Err(TableError::EmptyBands {
            table_id: table_id.to_string(),
            field,
        });
    };
    if first.band != normal {
        return Err(TableError::FirstBandNotNormal {
            table_id: table_id.to_string(),
            field,
        });
    }

    let mut bands: Vec<(f64, B)> = Vec::with_capacity(defs.len());
    for def in defs {
        if !def.lower_bound.is_finite() || def.lower_bound < 0.0 {
            return Err(TableError::InvalidThreshold {
                table_id: table_id.to_string(),
                field,
                value: def.lower_bound,
            });
        }
        if let Some(&(previous, previous_band)) = bands.last() {
            if def.lower_bound >= previous {
                return Err(TableError::BandsNotDescending {
                    table_id: table_id.to_string(),
                    field,
                    previous,
                    next: def.lower_bound,
                });
            }
            if def.band <= previous_band {
                return Err(TableError::BandOrder {
                    table_id: table_id.to_string(),
                    field,
                    band: format!("{:?}", def.band),
                });
            }
        }
        bands.push((def.lower_bound, def.band));
    }

    if let Some(&(lowest, _)) = bands.last() {
        if lowest != 0.0 {
            return Err(TableError::BandsIncomplete {
                table_id: table_id.to_string(),
                field,
                lowest,
            });
        }
    }

    Ok(BandTable::new(bands))
}

/// Validate a `ThresholdsDefinition` and compile it into runtime `Thresholds`.
pub fn validate_thresholds(
    def: ThresholdsDefinition,
    is_builtin: bool,
) -> Result<Thresholds, TableError> {
    validate_meta(&def.table)?;
    let id = def.table.id.as_str();

    let ratio_threshold =
        validate_threshold(id, "pattern.ratio_threshold", def.pattern.ratio_threshold)?;
    let fvc_threshold = validate_threshold(id, "pattern.fvc_threshold", def.pattern.fvc_threshold)?;
    let tlc_restriction_threshold = validate_threshold(
        id,
        "volumes.tlc_restriction_threshold",
        def.volumes.tlc_restriction_threshold,
    )?;
    let tlc_hyperinflation_threshold = validate_threshold(
        id,
        "volumes.tlc_hyperinflation_threshold",
        def.volumes.tlc_hyperinflation_threshold,
    )?;
    let rv_air_trapping_threshold = validate_threshold(
        id,
        "volumes.rv_air_trapping_threshold",
        def.volumes.rv_air_trapping_threshold,
    )?;

    if ratio_threshold > constants::MAX_RATIO_PERCENT {
        return Err(TableError::InvalidThreshold {
            table_id: id.to_string(),
            field: "pattern.ratio_threshold",
            value: ratio_threshold,
        });
    }
    if tlc_hyperinflation_threshold <= tlc_restriction_threshold {
        return Err(TableError::InvalidThreshold {
            table_id: id.to_string(),
            field: "volumes.tlc_hyperinflation_threshold",
            value: tlc_hyperinflation_threshold,
        });
    }

    let severity = compile_bands(id, "severity", def.severity, SeverityBand::Normal)?;
    let diffusion = compile_bands(id, "diffusion", def.diffusion, DiffusionBand::Normal)?;

    Ok(Thresholds {
        id: def.table.id,
        name: def.table.name,
        version: def.table.version,
        description: def.table.description,
        ratio_threshold,
        fvc_threshold,
        severity,
        tlc_restriction_threshold,
        tlc_hyperinflation_threshold,
        rv_air_trapping_threshold,
        diffusion,
        is_builtin,
    })
}

fn compile_criteria(def: CriteriaDef) -> Criteria {
    Criteria {
        pattern: def.pattern,
        severity: def.severity,
        volumes: def.volumes,
        diffusion: def.diffusion,
        isolated_defect: def.isolated_defect,
    }
}

/// Validate a `DifferentialsDefinition` and compile it into a runtime
/// `DifferentialTable`. Rule order is preserved; it is the final tie-break.
pub fn validate_differentials(
    def: DifferentialsDefinition,
    is_builtin: bool,
) -> Result<DifferentialTable, TableError> {
    validate_meta(&def.table)?;
    let id = def.table.id.clone();

    if def.rules.len() > constants::MAX_DIFFERENTIAL_RULES {
        return Err(TableError::TooManyRules {
            table_id: id,
            field: "rule",
            count: def.rules.len(),
            max: constants::MAX_DIFFERENTIAL_RULES,
        });
    }
    if def.recommendations.len() > constants::MAX_RECOMMENDATION_RULES {
        return Err(TableError::TooManyRules {
            table_id: id,
            field: "recommendation",
            count: def.recommendations.len(),
            max: constants::MAX_RECOMMENDATION_RULES,
        });
    }

    let mut rules = Vec::with_capacity(def.rules.len());
    for (index, rule) in def.rules.into_iter().enumerate() {
        if rule.name.trim().is_empty() {
            return Err(TableError::EmptyRule {
                table_id: id,
                field: "rule.name",
                index,
            });
        }
        if rule.when.isolated_defect.is_none()
            && rule.when.pattern.is_empty()
            && rule.when.severity.is_empty()
            && rule.when.volumes.is_empty()
            && rule.when.diffusion.is_empty()
        {
            tracing::warn!(
                table_id = %id,
                rule = %rule.name,
                "Differential rule has no criteria; it applies to every report"
            );
        }
        rules.push(DifferentialRule {
            name: rule.name.trim().to_string(),
            category: rule.category,
            criteria: compile_criteria(rule.when),
            follow_up: rule
                .follow_up
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
        });
    }

    let mut recommendations = Vec::with_capacity(def.recommendations.len());
    for (index, rec) in def.recommendations.into_iter().enumerate() {
        if rec.text.trim().is_empty() {
            return Err(TableError::EmptyRule {
                table_id: id,
                field: "recommendation.text",
                index,
            });
        }
        recommendations.push(RecommendationRule {
            text: rec.text.trim().to_string(),
            criteria: compile_criteria(rec.when),
        });
    }

    Ok(DifferentialTable {
        id,
        name: def.table.name,
        version: def.table.version,
        rules,
        recommendations,
        is_builtin,
    })
}

/// Parse and validate a thresholds table in one step.
pub fn load_thresholds(
    toml_content: &str,
    source_path: &PathBuf,
    is_builtin: bool,
) -> Result<Thresholds, TableError> {
    parse_thresholds_toml(toml_content, source_path)
        .and_then(|def| validate_thresholds(def, is_builtin))
}

/// Parse and validate a differential table in one step.
pub fn load_differentials(
    toml_content: &str,
    source_path: &PathBuf,
    is_builtin: bool,
) -> Result<DifferentialTable, TableError> {
    parse_differentials_toml(toml_content, source_path)
        .and_then(|def| validate_differentials(def, is_builtin))
}

// =============================================================================
// Built-in tables (embedded at compile time)
// =============================================================================

/// Embedded TOML content of the built-in thresholds table.
pub const BUILTIN_THRESHOLDS: &str = include_str!("../../tables/thresholds.toml");

/// Embedded TOML content of the built-in differential table.
pub const BUILTIN_DIFFERENTIALS: &str = include_str!("../../tables/differentials.toml");

/// Load and validate the built-in tables.
///
/// A built-in table that fails to load is a bug; it is logged at error level
/// and the compiled-in fallback is used so interpretation still works.
pub fn load_builtin_tables() -> RuleTables {
    let thresholds_path = PathBuf::from(format!("<builtin>/{}", constants::THRESHOLDS_TABLE_FILE));
    let thresholds = match load_thresholds(BUILTIN_THRESHOLDS, &thresholds_path, true) {
        Ok(t) => {
            tracing::debug!(table_id = %t.id, "Loaded built-in thresholds table");
            t
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to load built-in thresholds; using fallback");
            Thresholds::default()
        }
    };

    let differentials_path =
        PathBuf::from(format!("<builtin>/{}", constants::DIFFERENTIALS_TABLE_FILE));
    let differentials = match load_differentials(BUILTIN_DIFFERENTIALS, &differentials_path, true) {
        Ok(t) => {
            tracing::debug!(
                table_id = %t.id,
                rules = t.rules.len(),
                "Loaded built-in differential table"
            );
            t
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to load built-in differential table");
            DifferentialTable {
                id: "empty".to_string(),
                name: "No differential rules".to_string(),
                version: "0".to_string(),
                is_builtin: true,
                ..Default::default()
            }
        }
    };

    RuleTables {
        thresholds,
        differentials,
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn thresholds_with_severity(severity: &str) -> String {
        format!(
            r#"
[table]
id = "test"
name = "Test thresholds"

[pattern]
ratio_threshold = 70.0
fvc_threshold = 80.0

{severity}

[volumes]
tlc_restriction_threshold = 80.0
tlc_hyperinflation_threshold = 120.0
rv_air_trapping_threshold = 120.0

[[diffusion]]
lower_bound = 75.0
band = "normal"

[[diffusion]]
lower_bound = 0.0
band = "severe_impairment"
"#
        )
    }

    const TWO_SEVERITY_BANDS: &str = r#"
[[severity]]
lower_bound = 80.0
band = "normal"

[[severity]]
lower_bound = 0.0
band = "severe"
"#;

    #[test]
    fn test_builtin_tables_load() {
        let path = PathBuf::from("thresholds.toml");
        let thresholds = load_thresholds(BUILTIN_THRESHOLDS, &path, true).unwrap();
        assert_eq!(thresholds.id, "builtin-thresholds");
        assert_eq!(thresholds.ratio_threshold, 70.0);
        assert_eq!(thresholds.severity.bands().len(), 6);
        assert_eq!(thresholds.diffusion.bands().len(), 4);

        let path = PathBuf::from("differentials.toml");
        let differentials = load_differentials(BUILTIN_DIFFERENTIALS, &path, true).unwrap();
        assert!(!differentials.rules.is_empty());
        assert!(!differentials.recommendations.is_empty());
        assert!(differentials.is_builtin);
    }

    #[test]
    fn test_builtin_thresholds_match_fallback() {
        let tables = load_builtin_tables();
        let fallback = Thresholds::default();
        assert_eq!(tables.thresholds.severity, fallback.severity);
        assert_eq!(tables.thresholds.diffusion, fallback.diffusion);
        assert_eq!(tables.thresholds.fvc_threshold, fallback.fvc_threshold);
        assert_eq!(
            tables.thresholds.rv_air_trapping_threshold,
            fallback.rv_air_trapping_threshold
        );
    }

    #[test]
    fn test_custom_band_table() {
        let toml = thresholds_with_severity(TWO_SEVERITY_BANDS);
        let t = load_thresholds(&toml, &PathBuf::from("t.toml"), false).unwrap();
        assert!(!t.is_builtin);
        assert_eq!(t.severity.classify(50.0).unwrap().band, SeverityBand::Severe);
    }

    #[test]
    fn test_bands_must_descend() {
        let severity = r#"
[[severity]]
lower_bound = 80.0
band = "normal"

[[severity]]
lower_bound = 85.0
band = "mild"

[[severity]]
lower_bound = 0.0
band = "severe"
"#;
        let toml = thresholds_with_severity(severity);
        let err = load_thresholds(&toml, &PathBuf::from("t.toml"), false).unwrap_err();
        assert!(matches!(err, TableError::BandsNotDescending { .. }));
    }

    #[test]
    fn test_bands_must_reach_zero() {
        let severity = r#"
[[severity]]
lower_bound = 80.0
band = "normal"

[[severity]]
lower_bound = 35.0
band = "severe"
"#;
        let toml = thresholds_with_severity(severity);
        let err = load_thresholds(&toml, &PathBuf::from("t.toml"), false).unwrap_err();
        match err {
            TableError::BandsIncomplete { lowest, field, .. } => {
                assert_eq!(lowest, 35.0);
                assert_eq!(field, "severity");
            }
            other => panic!("Expected BandsIncomplete, got: {other:?}"),
        }
    }

    #[test]
    fn test_first_band_must_be_normal() {
        let severity = r#"
[[severity]]
lower_bound = 80.0
band = "mild"

[[severity]]
lower_bound = 0.0
band = "severe"
"#;
        let toml = thresholds_with_severity(severity);
        let err = load_thresholds(&toml, &PathBuf::from("t.toml"), false).unwrap_err();
        assert!(matches!(err, TableError::FirstBandNotNormal { .. }));
    }

    #[test]
    fn test_band_order_enforced() {
        let severity = r#"
[[severity]]
lower_bound = 80.0
band = "normal"

[[severity]]
lower_bound = 60.0
band = "severe"

[[severity]]
lower_bound = 0.0
band = "mild"
"#;
        let toml = thresholds_with_severity(severity);
        let err = load_thresholds(&toml, &PathBuf::from("t.toml"), false).unwrap_err();
        assert!(matches!(err, TableError::BandOrder { .. }));
    }

    #[test]
    fn test_unknown_band_is_parse_error() {
        let severity = r#"
[[severity]]
lower_bound = 0.0
band = "catastrophic"
"#;
        let toml = thresholds_with_severity(severity);
        let err = load_thresholds(&toml, &PathBuf::from("t.toml"), false).unwrap_err();
        assert!(matches!(err, TableError::TomlParse { .. }));
    }

    #[test]
    fn test_invalid_threshold() {
        let toml = thresholds_with_severity(TWO_SEVERITY_BANDS)
            .replace("fvc_threshold = 80.0", "fvc_threshold = -1.0");
        let err = load_thresholds(&toml, &PathBuf::from("t.toml"), false).unwrap_err();
        match err {
            TableError::InvalidThreshold { field, .. } => {
                assert_eq!(field, "pattern.fvc_threshold")
            }
            other => panic!("Expected InvalidThreshold, got: {other:?}"),
        }
    }

    #[test]
    fn test_differential_rule_compiles_criteria() {
        let toml = r#"
[table]
id = "diff"
name = "Diff"

[[rule]]
name = "  Asthma  "
category = "obstructive_airway"
when = { pattern = ["obstructive"], diffusion = ["normal"] }
follow_up = ""
"#;
        let table = load_differentials(toml, &PathBuf::from("d.toml"), false).unwrap();
        let rule = &table.rules[0];
        assert_eq!(rule.name, "Asthma");
        assert_eq!(rule.criteria.pattern, vec![PatternLabel::Obstructive]);
        assert_eq!(rule.criteria.specificity(), 2);
        assert_eq!(rule.follow_up, None);
        assert!(table.recommendations.is_empty());
    }

    #[test]
    fn test_empty_rule_name_rejected() {
        let toml = r#"
[table]
id = "diff"
name = "Diff"

[[rule]]
name = " "
category = "pulmonary_vascular"
"#;
        let err = load_differentials(toml, &PathBuf::from("d.toml"), false).unwrap_err();
        assert!(matches!(err, TableError::EmptyRule { index: 0, .. }));
    }

    #[test]
    fn test_missing_table_id() {
        let toml = r#"
[table]
id = ""
name = "No id"
"#;
        let err = load_differentials(toml, &PathBuf::from("d.toml"), false).unwrap_err();
        match err {
            TableError::MissingField { field, .. } => assert_eq!(field, "table.id"),
            other => panic!("Expected MissingField, got: {other:?}"),
        }
    }
}
