// PftLens - util/error.rs
//
// Typed error hierarchy with context-preserving error chains.
// No string-based error propagation.
// All errors preserve the causal chain for diagnostic logging.

use crate::core::model::{Field, Parameter};
use std::fmt;
use std::io;
use std::path::PathBuf;

/// Top-level error type for all PftLens operations.
/// Errors are categorised by the subsystem that produced them.
#[derive(Debug)]
pub enum PftError {
    /// A measurement failed validation.
    Measurement(MeasurementError),

    /// Input decoding failed.
    Input(InputError),

    /// Rule table loading or validation failed.
    Table(TableError),

    /// Export operation failed.
    Export(ExportError),

    /// Configuration loading or validation failed.
    Config(ConfigError),

    /// The second-opinion collaborator failed.
    ExternalService(ExternalServiceError),

    /// I/O error with path context.
    Io {
        path: PathBuf,
        operation: &'static str,
        source: io::Error,
    },
}

impl fmt::Display for PftError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Measurement(e) => write!(f, "Invalid measurement: {e}"),
            Self::Input(e) => write!(f, "Input error: {e}"),
            Self::Table(e) => write!(f, "Rule table error: {e}"),
            Self::Export(e) => write!(f, "Export error: {e}"),
            Self::Config(e) => write!(f, "Configuration error: {e}"),
            Self::ExternalService(e) => write!(f, "Second opinion unavailable: {e}"),
            Self::Io {
                path,
                operation,
                source,
            } => write!(
                f,
                "I/O error during {operation} on '{}': {source}",
                path.display()
            ),
        }
    }
}

impl std::error::Error for PftError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Measurement(e) => Some(e),
            Self::Input(e) => Some(e),
            Self::Table(e) => Some(e),
            Self::Export(e) => Some(e),
            Self::Config(e) => Some(e),
            Self::ExternalService(e) => Some(e),
            Self::Io { source, .. } => Some(source),
        }
    }
}

// ---------------------------------------------------------------------------
// Measurement errors (InvalidMeasurement)
// ---------------------------------------------------------------------------

/// A provided value violates the numeric or range invariants.
#[derive(Debug, Clone, PartialEq)]
pub enum MeasurementError {
    /// The value is not a number.
    NotANumber {
        parameter: Parameter,
        field: Field,
        raw: String,
    },

    /// The value is NaN or infinite.
    NonFinite { parameter: Parameter, field: Field },

    /// The value is below zero.
    Negative {
        parameter: Parameter,
        field: Field,
        value: f64,
    },

    /// A reported FEV1/FVC ratio outside [0, 100].
    RatioOutOfRange { value: f64 },

    /// FEV1 / FVC produced a ratio outside [0, 100] (FEV1 larger than FVC).
    DerivedRatioOutOfRange { fev1: f64, fvc: f64, ratio: f64 },
}

impl MeasurementError {
    /// The parameter this error disqualifies.
    pub fn parameter(&self) -> Parameter {
        match self {
            Self::NotANumber { parameter, .. }
            | Self::NonFinite { parameter, .. }
            | Self::Negative { parameter, .. } => *parameter,
            Self::RatioOutOfRange { .. } | Self::DerivedRatioOutOfRange { .. } => {
                Parameter::Fev1FvcRatio
            }
        }
    }
}

impl fmt::Display for MeasurementError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotANumber {
                parameter,
                field,
                raw,
            } => write!(f, "{parameter} {}: '{raw}' is not a number", field.label()),
            Self::NonFinite { parameter, field } => {
                write!(f, "{parameter} {}: value is not finite", field.label())
            }
            Self::Negative {
                parameter,
                field,
                value,
            } => write!(
                f,
                "{parameter} {}: {value} is negative; values must be >= 0",
                field.label()
            ),
            Self::RatioOutOfRange { value } => {
                write!(f, "FEV1/FVC ratio {value} is outside the range 0-100%")
            }
            Self::DerivedRatioOutOfRange { fev1, fvc, ratio } => write!(
                f,
                "FEV1 {fev1} / FVC {fvc} gives a ratio of {ratio:.1}%, outside the range 0-100%"
            ),
        }
    }
}

impl std::error::Error for MeasurementError {}

impl From<MeasurementError> for PftError {
    fn from(e: MeasurementError) -> Self {
        Self::Measurement(e)
    }
}

// ---------------------------------------------------------------------------
// Input errors
// ---------------------------------------------------------------------------

/// Errors decoding a measurement document.
#[derive(Debug)]
pub enum InputError {
    /// The document is not valid JSON.
    Json { source: serde_json::Error },

    /// The JSON document is not an object.
    NotAnObject { found: &'static str },

    /// A batch CSV could not be decoded.
    Csv { row: usize, source: csv::Error },

    /// Batch exceeds the maximum row count.
    TooManyRows { max: usize },

    /// The input file exceeds the size limit.
    TooLarge {
        path: PathBuf,
        size: u64,
        max_size: u64,
    },

    /// I/O error reading the input.
    Io { path: PathBuf, source: io::Error },
}

impl fmt::Display for InputError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json { source } => write!(f, "Invalid JSON: {source}"),
            Self::NotAnObject { found } => {
                write!(
                    f,
                    "Expected a JSON object of measurements, found {found}"
                )
            }
            Self::Csv { row, source } => write!(f, "CSV row {row}: {source}"),
            Self::TooManyRows { max } => write!(
                f,
                "Batch exceeds maximum of {max} rows. Split the file and retry."
            ),
            Self::TooLarge {
                path,
                size,
                max_size,
            } => write!(
                f,
                "Input '{}' is {size} bytes, exceeds maximum of {max_size} bytes",
                path.display()
            ),
            Self::Io { path, source } => {
                write!(f, "I/O error reading '{}': {source}", path.display())
            }
        }
    }
}

impl std::error::Error for InputError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Json { source } => Some(source),
            Self::Csv { source, .. } => Some(source),
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<InputError> for PftError {
    fn from(e: InputError) -> Self {
        Self::Input(e)
    }
}

// ---------------------------------------------------------------------------
// Table errors
// ---------------------------------------------------------------------------

/// Errors related to rule table loading and validation.
#[derive(Debug)]
pub enum TableError {
    /// TOML file could not be parsed.
    TomlParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    /// Table file exceeds the maximum allowed size.
    FileTooLarge {
        path: PathBuf,
        size: u64,
        max_size: u64,
    },

    /// A required field is missing or empty.
    MissingField {
        table_id: String,
        field: &'static str,
    },

    /// A threshold is not a finite, positive number.
    InvalidThreshold {
        table_id: String,
        field: &'static str,
        value: f64,
    },

    /// A band list is empty.
    EmptyBands {
        table_id: String,
        field: &'static str,
    },

    /// Band lower bounds are not strictly descending.
    BandsNotDescending {
        table_id: String,
        field: &'static str,
        previous: f64,
        next: f64,
    },

    /// The last band does not reach zero, leaving part of [0, inf) unclassified.
    BandsIncomplete {
        table_id: String,
        field: &'static str,
        lowest: f64,
    },

    /// A band is duplicated or listed out of severity order.
    BandOrder {
        table_id: String,
        field: &'static str,
        band: String,
    },

    /// The first (highest) band is not the Normal band.
    FirstBandNotNormal {
        table_id: String,
        field: &'static str,
    },

    /// A rule has an empty name or text.
    EmptyRule {
        table_id: String,
        field: &'static str,
        index: usize,
    },

    /// Too many rules in one table.
    TooManyRules {
        table_id: String,
        field: &'static str,
        count: usize,
        max: usize,
    },

    /// I/O error reading a table file.
    Io { path: PathBuf, source: io::Error },
}

impl fmt::Display for TableError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TomlParse { path, source } => {
                write!(f, "Failed to parse TOML '{}': {source}", path.display())
            }
            Self::FileTooLarge {
                path,
                size,
                max_size,
            } => write!(
                f,
                "Table '{}' is {size} bytes, exceeds maximum of {max_size} bytes",
                path.display()
            ),
            Self::MissingField { table_id, field } => {
                write!(f, "Table '{table_id}': missing required field '{field}'")
            }
            Self::InvalidThreshold {
                table_id,
                field,
                value,
            } => write!(
                f,
                "Table '{table_id}': '{field}' = {value} must be a finite number greater than 0"
            ),
            Self::EmptyBands { table_id, field } => {
                write!(f, "Table '{table_id}': '{field}' defines no bands")
            }
            Self::BandsNotDescending {
                table_id,
                field,
                previous,
                next,
            } => write!(
                f,
                "Table '{table_id}': '{field}' lower bounds must be strictly descending \
                 ({next} follows {previous})"
            ),
            Self::BandsIncomplete {
                table_id,
                field,
                lowest,
            } => write!(
                f,
                "Table '{table_id}': last band in '{field}' starts at {lowest}; \
                 it must start at 0 so every value is classified"
            ),
            Self::BandOrder {
                table_id,
                field,
                band,
            } => write!(
                f,
                "Table '{table_id}': band '{band}' in '{field}' is duplicated or out of order"
            ),
            Self::FirstBandNotNormal { table_id, field } => write!(
                f,
                "Table '{table_id}': the first band in '{field}' must be 'normal'"
            ),
            Self::EmptyRule {
                table_id,
                field,
                index,
            } => write!(
                f,
                "Table '{table_id}': entry {index} in '{field}' has empty text"
            ),
            Self::TooManyRules {
                table_id,
                field,
                count,
                max,
            } => write!(
                f,
                "Table '{table_id}': {count} entries in '{field}', maximum is {max}"
            ),
            Self::Io { path, source } => {
                write!(f, "I/O error reading table '{}': {source}", path.display())
            }
        }
    }
}

impl std::error::Error for TableError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::TomlParse { source, .. } => Some(source),
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<TableError> for PftError {
    fn from(e: TableError) -> Self {
        Self::Table(e)
    }
}

// ---------------------------------------------------------------------------
// Export errors
// ---------------------------------------------------------------------------

/// Errors related to export operations.
#[derive(Debug)]
pub enum ExportError {
    /// I/O error writing the export.
    Io { path: PathBuf, source: io::Error },

    /// CSV serialisation error.
    Csv { path: PathBuf, source: csv::Error },

    /// JSON serialisation error.
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
}

impl fmt::Display for ExportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "Export I/O error '{}': {source}", path.display())
            }
            Self::Csv { path, source } => {
                write!(f, "CSV export error '{}': {source}", path.display())
            }
            Self::Json { path, source } => {
                write!(f, "JSON export error '{}': {source}", path.display())
            }
        }
    }
}

impl std::error::Error for ExportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Csv { source, .. } => Some(source),
            Self::Json { source, .. } => Some(source),
        }
    }
}

impl From<ExportError> for PftError {
    fn from(e: ExportError) -> Self {
        Self::Export(e)
    }
}

// ---------------------------------------------------------------------------
// Config errors
// ---------------------------------------------------------------------------

/// Errors related to configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    /// TOML parsing failed.
    TomlParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    /// I/O error reading config file.
    Io { path: PathBuf, source: io::Error },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TomlParse { path, source } => {
                write!(f, "Config parse error '{}': {source}", path.display())
            }
            Self::Io { path, source } => {
                write!(f, "Config I/O error '{}': {source}", path.display())
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::TomlParse { source, .. } => Some(source),
            Self::Io { source, .. } => Some(source),
        }
    }
}

impl From<ConfigError> for PftError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

// ---------------------------------------------------------------------------
// External service errors
// ---------------------------------------------------------------------------

/// Failures of the optional second-opinion collaborator.
///
/// Never fatal: reported as a warning beside the core report.
#[derive(Debug)]
pub enum ExternalServiceError {
    /// No collaborator is configured.
    NotConfigured,

    /// The collaborator process could not be started.
    Spawn { program: String, source: io::Error },

    /// I/O error exchanging data with the collaborator.
    Io { service: String, source: io::Error },

    /// The collaborator exited unsuccessfully.
    Failed {
        service: String,
        status: Option<i32>,
        stderr: String,
    },

    /// The collaborator returned nothing.
    EmptyResponse { service: String },

    /// The response is not valid UTF-8.
    InvalidUtf8 {
        service: String,
        source: std::string::FromUtf8Error,
    },

    /// The response exceeds the size limit.
    ResponseTooLarge {
        service: String,
        size: usize,
        max: usize,
    },

    /// Any other collaborator-reported failure (quota, invalid key, ...).
    Rejected { service: String, reason: String },
}

impl fmt::Display for ExternalServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotConfigured => write!(
                f,
                "no second-opinion command configured; set [second_opinion] command in config.toml"
            ),
            Self::Spawn { program, source } => {
                write!(f, "failed to start '{program}': {source}")
            }
            Self::Io { service, source } => write!(f, "'{service}': I/O error: {source}"),
            Self::Failed {
                service,
                status,
                stderr,
            } => {
                match status {
                    Some(code) => write!(f, "'{service}' exited with status {code}")?,
                    None => write!(f, "'{service}' was terminated by a signal")?,
                }
                if !stderr.is_empty() {
                    write!(f, ": {stderr}")?;
                }
                Ok(())
            }
            Self::EmptyResponse { service } => write!(f, "'{service}' returned an empty response"),
            Self::InvalidUtf8 { service, source } => {
                write!(f, "'{service}' returned invalid UTF-8: {source}")
            }
            Self::ResponseTooLarge { service, size, max } => write!(
                f,
                "'{service}' returned {size} bytes, exceeds maximum of {max} bytes"
            ),
            Self::Rejected { service, reason } => write!(f, "'{service}': {reason}"),
        }
    }
}

impl std::error::Error for ExternalServiceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Spawn { source, .. } => Some(source),
            Self::Io { source, .. } => Some(source),
            Self::InvalidUtf8 { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<ExternalServiceError> for PftError {
    fn from(e: ExternalServiceError) -> Self {
        Self::ExternalService(e)
    }
}

/// Convenience type alias for PftLens results.
pub type Result<T> = std::result::Result<T, PftError>;
