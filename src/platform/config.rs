// PftLens - platform/config.rs
//
// Platform-specific configuration, data directory resolution, and config.toml
// loading with startup validation.
//
// Uses the `directories` crate for XDG (Linux), AppData (Windows),
// Library (macOS) compliance.

use crate::util::constants;
use crate::util::error::ConfigError;
use directories::ProjectDirs;
use std::path::{Path, PathBuf};

/// Resolved platform paths for PftLens data and configuration.
#[derive(Debug, Clone)]
pub struct PlatformPaths {
    /// Configuration directory (e.g. ~/.config/pftlens/ or %APPDATA%\PftLens\config\)
    pub config_dir: PathBuf,

    /// User rule-table directory (e.g. ~/.config/pftlens/tables/)
    pub user_tables_dir: PathBuf,

    /// Data directory for logs.
    pub data_dir: PathBuf,
}

impl PlatformPaths {
    /// Resolve platform-appropriate paths.
    ///
    /// Falls back to current directory if platform dirs cannot be determined.
    pub fn resolve() -> Self {
        if let Some(proj_dirs) = ProjectDirs::from("", "", constants::APP_ID) {
            let config_dir = proj_dirs.config_dir().to_path_buf();
            let user_tables_dir = config_dir.join(constants::TABLES_DIR_NAME);
            let data_dir = proj_dirs.data_dir().to_path_buf();

            tracing::debug!(
                config = %config_dir.display(),
                tables = %user_tables_dir.display(),
                data = %data_dir.display(),
                "Platform paths resolved"
            );

            Self {
                config_dir,
                user_tables_dir,
                data_dir,
            }
        } else {
            tracing::warn!("Could not determine platform directories, using current directory");
            let fallback = PathBuf::from(".");
            Self {
                config_dir: fallback.clone(),
                user_tables_dir: fallback.join(constants::TABLES_DIR_NAME),
                data_dir: fallback,
            }
        }
    }

    /// Resolve a configured log file; relative paths land in the data dir.
    pub fn log_file_path(&self, file: &str) -> PathBuf {
        let path = Path::new(file);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.data_dir.join(path)
        }
    }

    /// Location of config.toml for this set of paths.
    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join(constants::CONFIG_FILE_NAME)
    }
}

// =============================================================================
// config.toml loading and validation
// =============================================================================

/// Raw deserialisable shape of config.toml.
///
/// Unknown keys are silently ignored for forward compatibility -- a newer
/// config file can be used with an older binary without crashing.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct RawConfig {
    /// `[report]` section.
    pub report: ReportSection,
    /// `[tables]` section.
    pub tables: TablesSection,
    /// `[batch]` section.
    pub batch: BatchSection,
    /// `[second_opinion]` section.
    pub second_opinion: SecondOpinionSection,
    /// `[logging]` section.
    pub logging: LoggingSection,
}

/// `[report]` config section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct ReportSection {
    /// Default output format: "text", "markdown", "json" or "csv".
    pub format: Option<String>,
    /// Append the disclaimer to text and Markdown output.
    pub include_disclaimer: Option<bool>,
}

/// `[tables]` config section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct TablesSection {
    /// Directory holding thresholds.toml / differentials.toml overrides.
    pub user_table_directory: Option<String>,
}

/// `[batch]` config section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct BatchSection {
    /// Number of worker threads (0 = auto).
    pub worker_threads: Option<usize>,
}

/// `[second_opinion]` config section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct SecondOpinionSection {
    /// Program that reads the prompt on stdin and writes the narrative to stdout.
    pub command: Option<String>,
    /// Arguments passed to the program.
    pub args: Option<Vec<String>>,
}

/// `[logging]` config section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub level: Option<String>,
    /// Log file path (empty = stderr only).
    pub file: Option<String>,
}

/// Validated application configuration derived from `config.toml`.
///
/// All values are validated against named constants at load time.
/// Invalid values produce actionable warnings and fall back to defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    // -- Report --
    /// Output format name, already validated.
    pub format: String,
    pub include_disclaimer: bool,

    // -- Tables --
    /// Additional table directory; overrides the platform tables directory.
    pub user_table_directory: Option<PathBuf>,

    // -- Batch --
    pub worker_threads: usize,

    // -- Second opinion --
    pub second_opinion_command: Option<String>,
    pub second_opinion_args: Vec<String>,

    // -- Logging --
    /// Logging level string (for init before tracing is available).
    pub log_level: Option<String>,
    /// Log file path.
    pub log_file: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            format: "text".to_string(),
            include_disclaimer: true,
            user_table_directory: None,
            worker_threads: constants::DEFAULT_WORKER_THREADS,
            second_opinion_command: None,
            second_opinion_args: Vec::new(),
            log_level: None,
            log_file: None,
        }
    }
}

const VALID_FORMATS: [&str; 4] = ["text", "markdown", "json", "csv"];
const VALID_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

/// Load and validate config.toml for the given platform paths.
///
/// Returns `AppConfig` with validated values and a list of non-fatal warnings.
/// If the file does not exist, returns defaults with no warnings (first run).
/// If the file is unparseable, returns defaults with a warning: the
/// application still starts but the user is informed.
pub fn load_config(paths: &PlatformPaths) -> (AppConfig, Vec<String>) {
    load_config_file(&paths.config_file())
}

/// Load and validate a specific config file.
pub fn load_config_file(config_path: &Path) -> (AppConfig, Vec<String>) {
    let mut warnings: Vec<String> = Vec::new();

    if !config_path.exists() {
        tracing::debug!(path = %config_path.display(), "No config.toml found; using defaults");
        return (AppConfig::default(), warnings);
    }

    let raw = match read_raw_config(config_path) {
        Ok(raw) => raw,
        Err(e) => {
            let msg = format!(
                "{e}. Using defaults. See config.example.toml for the expected format."
            );
            tracing::warn!("{}", msg);
            warnings.push(msg);
            return (AppConfig::default(), warnings);
        }
    };

    tracing::info!(path = %config_path.display(), "Loaded config.toml");

    let (config, field_warnings) = validate(raw);
    warnings.extend(field_warnings);

    if !warnings.is_empty() {
        tracing::warn!(
            count = warnings.len(),
            "Config validation produced warnings"
        );
    }

    (config, warnings)
}

fn read_raw_config(config_path: &Path) -> Result<RawConfig, ConfigError> {
    let content = std::fs::read_to_string(config_path).map_err(|e| ConfigError::Io {
        path: config_path.to_path_buf(),
        source: e,
    })?;
    toml::from_str(&content).map_err(|e| ConfigError::TomlParse {
        path: config_path.to_path_buf(),
        source: e,
    })
}

/// Validate each field against named constants, accumulating all problems.
fn validate(raw: RawConfig) -> (AppConfig, Vec<String>) {
    let mut config = AppConfig::default();
    let mut warnings = Vec::new();

    // -- Report: format --
    if let Some(ref format) = raw.report.format {
        let lower = format.trim().to_lowercase();
        if VALID_FORMATS.contains(&lower.as_str()) {
            config.format = lower;
        } else {
            warnings.push(format!(
                "[report] format = \"{format}\" is not recognised. \
                 Valid values: text, markdown, json, csv. Using default (text).",
            ));
        }
    }

    // -- Report: include_disclaimer --
    if let Some(include) = raw.report.include_disclaimer {
        config.include_disclaimer = include;
    }

    // -- Tables: user_table_directory --
    if let Some(ref dir) = raw.tables.user_table_directory {
        if !dir.trim().is_empty() {
            config.user_table_directory = Some(PathBuf::from(dir.trim()));
        }
    }

    // -- Batch: worker_threads --
    if let Some(threads) = raw.batch.worker_threads {
        if threads <= constants::MAX_WORKER_THREADS {
            config.worker_threads = threads;
        } else {
            warnings.push(format!(
                "[batch] worker_threads = {threads} is out of range (0-{}). Using default ({}).",
                constants::MAX_WORKER_THREADS,
                constants::DEFAULT_WORKER_THREADS,
            ));
        }
    }

    // -- Second opinion --
    if let Some(ref command) = raw.second_opinion.command {
        if !command.trim().is_empty() {
            config.second_opinion_command = Some(command.trim().to_string());
        }
    }
    if let Some(args) = raw.second_opinion.args {
        if config.second_opinion_command.is_none() && !args.is_empty() {
            warnings.push(
                "[second_opinion] args is set but command is empty; args ignored.".to_string(),
            );
        } else {
            config.second_opinion_args = args;
        }
    }

    // -- Logging: level --
    if let Some(ref level) = raw.logging.level {
        if VALID_LEVELS.contains(&level.to_lowercase().as_str()) {
            config.log_level = Some(level.clone());
        } else {
            warnings.push(format!(
                "[logging] level = \"{level}\" is not recognised. \
                 Valid values: error, warn, info, debug, trace. Using default (info).",
            ));
        }
    }

    // -- Logging: file --
    if let Some(ref file) = raw.logging.file {
        if !file.is_empty() {
            config.log_file = Some(file.clone());
        }
    }

    (config, warnings)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(content: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(constants::CONFIG_FILE_NAME);
        std::fs::write(&path, content).unwrap();
        (dir, path)
    }

    #[test]
    fn test_log_file_path() {
        let paths = PlatformPaths {
            config_dir: PathBuf::from("/cfg"),
            user_tables_dir: PathBuf::from("/cfg/tables"),
            data_dir: PathBuf::from("/data"),
        };
        assert_eq!(paths.log_file_path("pftlens.log"), PathBuf::from("/data/pftlens.log"));
        assert_eq!(paths.config_file(), PathBuf::from("/cfg/config.toml"));
        #[cfg(unix)]
        assert_eq!(paths.log_file_path("/var/log/p.log"), PathBuf::from("/var/log/p.log"));
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let (config, warnings) = load_config_file(&dir.path().join("absent.toml"));
        assert_eq!(config, AppConfig::default());
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_valid_config() {
        let (_dir, path) = write_config(
            r#"
[report]
format = "Markdown"
include_disclaimer = false

[tables]
user_table_directory = "/srv/pft/tables"

[batch]
worker_threads = 8

[second_opinion]
command = "pft-review"
args = ["--model", "large"]

[logging]
level = "debug"
"#,
        );
        let (config, warnings) = load_config_file(&path);
        assert!(warnings.is_empty(), "{warnings:?}");
        assert_eq!(config.format, "markdown");
        assert!(!config.include_disclaimer);
        assert_eq!(
            config.user_table_directory,
            Some(PathBuf::from("/srv/pft/tables"))
        );
        assert_eq!(config.worker_threads, 8);
        assert_eq!(config.second_opinion_command.as_deref(), Some("pft-review"));
        assert_eq!(config.second_opinion_args, vec!["--model", "large"]);
        assert_eq!(config.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn test_invalid_values_fall_back_with_warnings() {
        let (_dir, path) = write_config(
            r#"
[report]
format = "pdf"

[batch]
worker_threads = 100000

[logging]
level = "loud"

[unknown_section]
key = 1
"#,
        );
        let (config, warnings) = load_config_file(&path);
        assert_eq!(warnings.len(), 3);
        assert_eq!(config.format, "text");
        assert_eq!(config.worker_threads, constants::DEFAULT_WORKER_THREADS);
        assert_eq!(config.log_level, None);
    }

    #[test]
    fn test_unparseable_config_uses_defaults() {
        let (_dir, path) = write_config("[report\nformat = ");
        let (config, warnings) = load_config_file(&path);
        assert_eq!(config, AppConfig::default());
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("Config parse error"));
    }

    #[test]
    fn test_args_without_command_warned() {
        let (_dir, path) = write_config("[second_opinion]\nargs = [\"-x\"]\n");
        let (config, warnings) = load_config_file(&path);
        assert!(config.second_opinion_args.is_empty());
        assert_eq!(warnings.len(), 1);
    }
}
