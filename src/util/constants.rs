// PftLens - util/constants.rs
//
// Single source of truth for all named constants, limits, and defaults.
// Clinical thresholds live in the rule tables (tables/*.toml); the values
// here are the compiled-in fallbacks and resource bounds.

// =============================================================================
// Application metadata
// =============================================================================

/// Application display name.
pub const APP_NAME: &str = "PftLens";

/// Application identifier used for config/data directories.
pub const APP_ID: &str = "PftLens";

/// Current application version (updated by release script).
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

// =============================================================================
// Fallback clinical thresholds
// =============================================================================
//
// Used only when the built-in thresholds table fails to load, which is a bug.
// Keep these in step with tables/thresholds.toml.

/// FEV1/FVC ratio (%) below which airflow obstruction is present.
pub const DEFAULT_RATIO_THRESHOLD: f64 = 70.0;

/// FVC % predicted below which a restrictive pattern is suggested.
pub const DEFAULT_FVC_THRESHOLD: f64 = 80.0;

/// TLC % predicted below which restriction is confirmed.
pub const DEFAULT_TLC_RESTRICTION_THRESHOLD: f64 = 80.0;

/// TLC % predicted above which hyperinflation is reported.
pub const DEFAULT_TLC_HYPERINFLATION_THRESHOLD: f64 = 120.0;

/// RV % predicted above which air trapping is reported.
pub const DEFAULT_RV_AIR_TRAPPING_THRESHOLD: f64 = 120.0;

/// Upper bound of a valid FEV1/FVC ratio expressed as a percentage.
pub const MAX_RATIO_PERCENT: f64 = 100.0;

// =============================================================================
// Rule table limits
// =============================================================================

/// Maximum size of a rule table TOML file in bytes.
pub const MAX_TABLE_FILE_SIZE: u64 = 256 * 1024; // 256 KB

/// Maximum number of differential rules in a single table.
pub const MAX_DIFFERENTIAL_RULES: usize = 500;

/// Maximum number of general recommendation rules in a single table.
pub const MAX_RECOMMENDATION_RULES: usize = 200;

/// File name of the thresholds table (built-in and user override).
pub const THRESHOLDS_TABLE_FILE: &str = "thresholds.toml";

/// File name of the differential diagnosis table (built-in and user override).
pub const DIFFERENTIALS_TABLE_FILE: &str = "differentials.toml";

// =============================================================================
// Input limits
// =============================================================================

/// Maximum size of a single measurement input file in bytes.
pub const MAX_INPUT_FILE_SIZE: u64 = 1024 * 1024; // 1 MB

/// Maximum size of a batch CSV file in bytes.
pub const MAX_BATCH_FILE_SIZE: u64 = 64 * 1024 * 1024; // 64 MB

/// Maximum number of rows interpreted in one batch.
pub const MAX_BATCH_ROWS: usize = 100_000;

/// Default number of worker threads for batch interpretation.
/// 0 means auto-detect (use available CPU cores).
pub const DEFAULT_WORKER_THREADS: usize = 0;

/// Hard upper bound on configured worker threads.
pub const MAX_WORKER_THREADS: usize = 256;

// =============================================================================
// Second opinion
// =============================================================================

/// Maximum bytes accepted from a second-opinion collaborator's response.
pub const MAX_OPINION_RESPONSE_BYTES: usize = 256 * 1024; // 256 KiB

/// Maximum bytes of collaborator stderr kept in an error message.
pub const MAX_OPINION_STDERR_PREVIEW: usize = 500;

// =============================================================================
// Report
// =============================================================================

/// Disclaimer appended to rendered text and Markdown reports.
pub const DISCLAIMER: &str = "Disclaimer: This tool applies rule-based thresholds to assist in \
interpretation. It is not a medical device and should not replace professional medical \
advice. Always verify results with the original report and clinical presentation.";

// =============================================================================
// Logging
// =============================================================================

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

// =============================================================================
// Configuration
// =============================================================================

/// Configuration file name.
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// User rule-table subdirectory name.
pub const TABLES_DIR_NAME: &str = "tables";
