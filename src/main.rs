// PftLens - main.rs
//
// Command-line entry point. Handles:
// 1. CLI argument parsing
// 2. config.toml loading and logging initialisation (debug mode support)
// 3. Rule table loading (built-in + user overrides)
// 4. Single-document or batch interpretation and rendering

use pftlens::app;
use pftlens::core::export::{self, ReportFormat};
use pftlens::core::input::{self, RawInput};
use pftlens::core::model::{InterpretationReport, RuleTables};
use pftlens::core::opinion::{self, OpinionOutcome, ReviewedReport};
use pftlens::core::pipeline;
use pftlens::platform;
use pftlens::util;

use clap::Parser;
use std::io::Write;
use std::path::{Path, PathBuf};
use util::error::{ExportError, PftError, Result};

/// PftLens - rule-based pulmonary function test interpreter.
///
/// Reads spirometry, lung volume and diffusion measurements and prints a
/// structured interpretation with ranked differential diagnoses.
#[derive(Parser, Debug)]
#[command(name = "pftlens", version, about)]
struct Cli {
    /// Measurement document (JSON), or '-' for stdin.
    #[arg(required_unless_present = "batch", conflicts_with = "batch")]
    input: Option<String>,

    /// Interpret every row of a CSV file.
    #[arg(long = "batch", value_name = "CSV")]
    batch: Option<PathBuf>,

    /// Output format (defaults to [report] format in config.toml, then text).
    #[arg(
        short = 'f',
        long = "format",
        value_parser = ["text", "txt", "markdown", "md", "json", "csv"]
    )]
    format: Option<String>,

    /// Write output to a file instead of stdout.
    #[arg(short = 'o', long = "output", value_name = "PATH")]
    output: Option<PathBuf>,

    /// Directory containing user rule tables (thresholds.toml, differentials.toml).
    #[arg(short = 't', long = "tables-dir", value_name = "DIR")]
    tables_dir: Option<PathBuf>,

    /// Ask the configured second-opinion command for a supplementary narrative.
    #[arg(long = "second-opinion", conflicts_with = "print_prompt")]
    second_opinion: bool,

    /// Print the second-opinion prompt instead of the report.
    #[arg(long = "print-prompt")]
    print_prompt: bool,

    /// Enable debug logging (equivalent to RUST_LOG=debug).
    #[arg(short = 'd', long = "debug")]
    debug: bool,
}

fn main() {
    let cli = Cli::parse();

    let platform_paths = platform::config::PlatformPaths::resolve();
    let (config, config_warnings) = platform::config::load_config(&platform_paths);

    let log_file = config.log_file.as_deref().map(|file| {
        let path = platform_paths.log_file_path(file);
        if let Some(parent) = path.parent() {
            // A failure here surfaces when the logger opens the file.
            let _ = std::fs::create_dir_all(parent);
        }
        path.to_string_lossy().into_owned()
    });

    util::logging::init(cli.debug, config.log_level.as_deref(), log_file.as_deref());

    tracing::info!(
        version = util::constants::APP_VERSION,
        debug = cli.debug,
        "PftLens starting"
    );

    for warning in &config_warnings {
        tracing::warn!("{}", warning);
        eprintln!("Warning: {warning}");
    }

    if let Err(e) = run(&cli, &config, &platform_paths) {
        tracing::error!(error = %e, "Interpretation failed");
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn run(
    cli: &Cli,
    config: &platform::config::AppConfig,
    platform_paths: &platform::config::PlatformPaths,
) -> Result<()> {
    // Table directory: CLI override > config > platform default
    let table_dir = cli
        .tables_dir
        .as_deref()
        .or(config.user_table_directory.as_deref())
        .unwrap_or(platform_paths.user_tables_dir.as_path());

    let (tables, table_errors) = app::tables_mgr::load_tables(Some(table_dir));
    for err in &table_errors {
        eprintln!("Warning: {err}");
    }

    let format_name = cli.format.as_deref().unwrap_or(config.format.as_str());
    let format = ReportFormat::from_name(format_name).unwrap_or(ReportFormat::Text);

    // Rendered in memory so a failed run never creates or truncates the
    // output file.
    let out_path = cli.output.clone().unwrap_or_else(|| PathBuf::from("<stdout>"));
    let mut rendered = Vec::new();

    match (&cli.batch, &cli.input) {
        (Some(batch_path), _) => {
            run_batch(cli, config, &tables, format, batch_path, &mut rendered, &out_path)?
        }
        (None, Some(source)) => {
            run_single(cli, config, &tables, format, source, &mut rendered, &out_path)?
        }
        // clap enforces one of the two.
        (None, None) => return Ok(()),
    }

    emit(cli.output.as_deref(), &rendered)?;

    if cli.output.is_some() {
        tracing::info!(path = %out_path.display(), format = format.label(), "Report written");
    }
    Ok(())
}

/// Write the finished output to the requested file, or to stdout.
fn emit(output: Option<&Path>, rendered: &[u8]) -> Result<()> {
    match output {
        Some(path) => std::fs::write(path, rendered).map_err(|e| PftError::Io {
            path: path.to_path_buf(),
            operation: "write output file",
            source: e,
        })?,
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout
                .write_all(rendered)
                .and_then(|()| stdout.flush())
                .map_err(|e| ExportError::Io {
                    path: PathBuf::from("<stdout>"),
                    source: e,
                })?;
        }
    }
    Ok(())
}

/// Read one JSON document, from a file or stdin.
fn read_input(source: &str) -> Result<RawInput> {
    let text = if source == "-" {
        platform::fs::read_stdin_capped(util::constants::MAX_INPUT_FILE_SIZE)?
    } else {
        platform::fs::read_capped(Path::new(source), util::constants::MAX_INPUT_FILE_SIZE)?
    };
    Ok(input::parse_json(&text)?)
}

fn warn_if_empty(label: &str, raw: &RawInput) {
    if raw.looks_empty() {
        tracing::warn!(input = label, "Neither FEV1/FVC ratio nor FVC % predicted supplied");
        eprintln!(
            "Warning: {label}: the values seem to be empty. \
             Check that the FEV1/FVC ratio and FVC % predicted were supplied."
        );
    }
}

fn run_single<W: Write>(
    cli: &Cli,
    config: &platform::config::AppConfig,
    tables: &RuleTables,
    format: ReportFormat,
    input_arg: &str,
    writer: &mut W,
    out_path: &PathBuf,
) -> Result<()> {
    let raw = read_input(input_arg)?;
    warn_if_empty(input_arg, &raw);

    let report = pipeline::interpret_input(&raw, tables);

    if cli.print_prompt {
        let prompt = opinion::build_prompt(&report);
        writer
            .write_all(prompt.as_bytes())
            .map_err(|e| ExportError::Io {
                path: out_path.clone(),
                source: e,
            })?;
        return Ok(());
    }

    if cli.second_opinion {
        let reviewed = review(report, config);
        if let Some(warning) = reviewed.warning() {
            eprintln!("Warning: {warning}");
        }
        return write_reviewed(&reviewed, format, config, writer, out_path);
    }

    write_report("input", &report, format, config, writer, out_path)
}

/// Consult the configured command; a missing configuration becomes the
/// warning shown in place of the supplement.
fn review(report: InterpretationReport, config: &platform::config::AppConfig) -> ReviewedReport {
    match app::opinion_cmd::CommandService::from_config(
        config.second_opinion_command.as_deref(),
        &config.second_opinion_args,
    ) {
        Ok(service) => opinion::consult(report, &service),
        Err(e) => {
            tracing::warn!(error = %e, "Second opinion requested but not available");
            ReviewedReport {
                report,
                opinion: OpinionOutcome::Unavailable {
                    service: "second opinion".to_string(),
                    warning: e.to_string(),
                },
            }
        }
    }
}

fn write_report<W: Write>(
    id: &str,
    report: &InterpretationReport,
    format: ReportFormat,
    config: &platform::config::AppConfig,
    writer: &mut W,
    out_path: &PathBuf,
) -> Result<()> {
    match format {
        ReportFormat::Text => {
            export::render_text(report, writer, out_path, config.include_disclaimer)?
        }
        ReportFormat::Markdown => {
            export::render_markdown(report, writer, out_path, config.include_disclaimer)?
        }
        ReportFormat::Json => export::export_json(report, writer, out_path)?,
        ReportFormat::Csv => {
            export::export_differentials_csv(&[(id, report)], writer, out_path)?;
        }
    }
    Ok(())
}

fn write_reviewed<W: Write>(
    reviewed: &ReviewedReport,
    format: ReportFormat,
    config: &platform::config::AppConfig,
    writer: &mut W,
    out_path: &PathBuf,
) -> Result<()> {
    match format {
        ReportFormat::Text => {
            export::render_reviewed_text(reviewed, writer, out_path, config.include_disclaimer)?
        }
        ReportFormat::Markdown => export::render_reviewed_markdown(
            reviewed,
            writer,
            out_path,
            config.include_disclaimer,
        )?,
        ReportFormat::Json => export::export_json(reviewed, writer, out_path)?,
        // The differential table carries no narrative column.
        ReportFormat::Csv => {
            export::export_differentials_csv(&[("input", &reviewed.report)], writer, out_path)?;
        }
    }
    Ok(())
}

fn run_batch<W: Write>(
    cli: &Cli,
    config: &platform::config::AppConfig,
    tables: &RuleTables,
    format: ReportFormat,
    batch_path: &Path,
    writer: &mut W,
    out_path: &PathBuf,
) -> Result<()> {
    if cli.second_opinion || cli.print_prompt {
        tracing::warn!("Second opinion options apply to single documents; ignored for --batch");
        eprintln!("Warning: --second-opinion and --print-prompt are ignored with --batch.");
    }

    let text = platform::fs::read_capped(batch_path, util::constants::MAX_BATCH_FILE_SIZE)?;
    let records = input::parse_csv(text.as_bytes(), util::constants::MAX_BATCH_ROWS)?;
    for record in &records {
        warn_if_empty(&record.id, &record.input);
    }

    let results = app::batch::run(&records, tables, config.worker_threads);

    let io_err = |e: std::io::Error| ExportError::Io {
        path: out_path.clone(),
        source: e,
    };

    match format {
        ReportFormat::Text | ReportFormat::Markdown => {
            for (index, result) in results.iter().enumerate() {
                if index > 0 {
                    writeln!(writer).map_err(io_err)?;
                }
                if format == ReportFormat::Text {
                    writeln!(writer, "##### Record: {} #####", result.id).map_err(io_err)?;
                    export::render_text(&result.report, &mut *writer, out_path, false)?;
                } else {
                    writeln!(writer, "# Record: {}\n", result.id).map_err(io_err)?;
                    export::render_markdown(&result.report, &mut *writer, out_path, false)?;
                }
            }
            if config.include_disclaimer {
                let prefix = if format == ReportFormat::Markdown { "> " } else { "" };
                writeln!(writer, "\n{prefix}{}", util::constants::DISCLAIMER).map_err(io_err)?;
            }
        }
        ReportFormat::Json => export::export_json(&results, &mut *writer, out_path)?,
        ReportFormat::Csv => {
            let pairs: Vec<(&str, &InterpretationReport)> = results
                .iter()
                .map(|r| (r.id.as_str(), &r.report))
                .collect();
            export::export_differentials_csv(&pairs, &mut *writer, out_path)?;
        }
    }

    let stats = app::batch::BatchStats::from_results(&results);
    eprintln!(
        "Interpreted {} record(s): {} complete, {} with data gaps, {} with input warnings.",
        stats.records, stats.complete, stats.with_gaps, stats.with_warnings
    );
    Ok(())
}
