// PftLens - app/tables_mgr.rs
//
// Manages loading of rule tables from both built-in sources (embedded in the
// binary) and user-supplied TOML files on disk.
// A user file named like a built-in table replaces that table wholesale.

use crate::core::model::RuleTables;
use crate::core::tables;
use crate::util::constants;
use crate::util::error::TableError;
use std::path::Path;

/// Load the rule tables: built-in first, then user overrides.
///
/// Invalid user tables are logged and skipped (non-fatal); the built-in
/// table stays in effect.
///
/// Returns the tables in effect and any non-fatal errors encountered.
pub fn load_tables(user_table_dir: Option<&Path>) -> (RuleTables, Vec<TableError>) {
    let mut rule_tables = tables::load_builtin_tables();
    let mut errors = Vec::new();

    tracing::info!(
        thresholds = %rule_tables.thresholds.id,
        differentials = %rule_tables.differentials.id,
        rules = rule_tables.differentials.rules.len(),
        "Loaded built-in rule tables"
    );

    let Some(dir) = user_table_dir else {
        return (rule_tables, errors);
    };
    if !dir.is_dir() {
        tracing::debug!(
            dir = %dir.display(),
            "User table directory does not exist (skipping)"
        );
        return (rule_tables, errors);
    }

    let thresholds_path = dir.join(constants::THRESHOLDS_TABLE_FILE);
    if thresholds_path.is_file() {
        match read_table(&thresholds_path)
            .and_then(|content| tables::load_thresholds(&content, &thresholds_path, false))
        {
            Ok(thresholds) => {
                tracing::info!(
                    table_id = %thresholds.id,
                    path = %thresholds_path.display(),
                    "User thresholds table overrides built-in"
                );
                rule_tables.thresholds = thresholds;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring invalid user thresholds table");
                errors.push(e);
            }
        }
    }

    let differentials_path = dir.join(constants::DIFFERENTIALS_TABLE_FILE);
    if differentials_path.is_file() {
        match read_table(&differentials_path)
            .and_then(|content| tables::load_differentials(&content, &differentials_path, false))
        {
            Ok(differentials) => {
                tracing::info!(
                    table_id = %differentials.id,
                    rules = differentials.rules.len(),
                    path = %differentials_path.display(),
                    "User differential table overrides built-in"
                );
                rule_tables.differentials = differentials;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring invalid user differential table");
                errors.push(e);
            }
        }
    }

    (rule_tables, errors)
}

/// Read a table file, enforcing the size limit before reading.
fn read_table(path: &Path) -> Result<String, TableError> {
    let metadata = std::fs::metadata(path).map_err(|e| TableError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;

    if metadata.len() > constants::MAX_TABLE_FILE_SIZE {
        return Err(TableError::FileTooLarge {
            path: path.to_path_buf(),
            size: metadata.len(),
            max_size: constants::MAX_TABLE_FILE_SIZE,
        });
    }

    std::fs::read_to_string(path).map_err(|e| TableError::Io {
        path: path.to_path_buf(),
        source: e,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::{DiagnosisCategory, SeverityBand};
    use crate::core::tables::BUILTIN_THRESHOLDS;

    #[test]
    fn test_builtin_only() {
        let (rule_tables, errors) = load_tables(None);
        assert!(errors.is_empty());
        assert_eq!(rule_tables.thresholds.id, "builtin-thresholds");
        assert!(rule_tables.thresholds.is_builtin);
        assert!(!rule_tables.differentials.rules.is_empty());
    }

    #[test]
    fn test_missing_dir_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let (rule_tables, errors) = load_tables(Some(&dir.path().join("absent")));
        assert!(errors.is_empty());
        assert!(rule_tables.differentials.is_builtin);
    }

    #[test]
    fn test_user_thresholds_override() {
        let dir = tempfile::tempdir().unwrap();
        let custom = BUILTIN_THRESHOLDS
            .replace("id = \"builtin-thresholds\"", "id = \"clinic-thresholds\"")
            .replace("ratio_threshold = 70.0", "ratio_threshold = 72.0");
        std::fs::write(dir.path().join(constants::THRESHOLDS_TABLE_FILE), custom).unwrap();

        let (rule_tables, errors) = load_tables(Some(dir.path()));
        assert!(errors.is_empty(), "{errors:?}");
        assert_eq!(rule_tables.thresholds.id, "clinic-thresholds");
        assert!(!rule_tables.thresholds.is_builtin);
        assert_eq!(rule_tables.thresholds.ratio_threshold, 72.0);
        assert_eq!(rule_tables.differentials.id, "builtin-differentials");
    }

    #[test]
    fn test_invalid_user_table_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(constants::THRESHOLDS_TABLE_FILE),
            "this is not toml = = =",
        )
        .unwrap();

        let (rule_tables, errors) = load_tables(Some(dir.path()));
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], TableError::TomlParse { .. }));
        assert_eq!(rule_tables.thresholds.id, "builtin-thresholds");
        assert_eq!(
            rule_tables.thresholds.severity.classify(79.9).unwrap().band,
            SeverityBand::Mild
        );
    }

    #[test]
    fn test_user_differentials_override() {
        let dir = tempfile::tempdir().unwrap();
        let custom = r#"
[table]
id = "clinic-differentials"
name = "Clinic rules"

[[rule]]
name = "Asthma"
category = "obstructive_airway"
when = { pattern = ["obstructive"] }
"#;
        std::fs::write(dir.path().join(constants::DIFFERENTIALS_TABLE_FILE), custom).unwrap();

        let (rule_tables, errors) = load_tables(Some(dir.path()));
        assert!(errors.is_empty());
        assert_eq!(rule_tables.differentials.id, "clinic-differentials");
        assert_eq!(rule_tables.differentials.rules.len(), 1);
        assert_eq!(
            rule_tables.differentials.rules[0].category,
            DiagnosisCategory::ObstructiveAirway
        );
    }

    #[test]
    fn test_oversized_table_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let big = "#".repeat(constants::MAX_TABLE_FILE_SIZE as usize + 1);
        std::fs::write(dir.path().join(constants::DIFFERENTIALS_TABLE_FILE), big).unwrap();

        let (rule_tables, errors) = load_tables(Some(dir.path()));
        assert!(matches!(errors[0], TableError::FileTooLarge { .. }));
        assert!(rule_tables.differentials.is_builtin);
    }
}
