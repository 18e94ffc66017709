// PftLens - app/opinion_cmd.rs
//
// Second-opinion collaborator backed by an external command.
//
// The prompt is written to the command's stdin and its stdout is taken as
// the narrative. Any wrapper script (an LLM CLI, a curl call to a hosted
// model) can be plugged in through `[second_opinion]` in config.toml.

use crate::core::model::InterpretationReport;
use crate::core::opinion::{build_prompt, SecondOpinion};
use crate::util::constants;
use crate::util::error::ExternalServiceError;
use std::io::Write;
use std::process::{Command, Stdio};

/// Runs `program args...` once per consultation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandService {
    program: String,
    args: Vec<String>,
}

impl CommandService {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Build from configuration; `None` or a blank command is NotConfigured.
    pub fn from_config(
        command: Option<&str>,
        args: &[String],
    ) -> Result<Self, ExternalServiceError> {
        match command.map(str::trim) {
            Some(program) if !program.is_empty() => Ok(Self::new(program, args.to_vec())),
            _ => Err(ExternalServiceError::NotConfigured),
        }
    }

    fn run(&self, prompt: &str) -> Result<String, ExternalServiceError> {
        let io_err = |e: std::io::Error| ExternalServiceError::Io {
            service: self.program.clone(),
            source: e,
        };

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| ExternalServiceError::Spawn {
                program: self.program.clone(),
                source: e,
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            // A command that exits without reading its input closes the pipe;
            // its exit status reports the real problem.
            if let Err(e) = stdin.write_all(prompt.as_bytes()) {
                if e.kind() != std::io::ErrorKind::BrokenPipe {
                    return Err(io_err(e));
                }
            }
        }

        let output = child.wait_with_output().map_err(io_err)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ExternalServiceError::Failed {
                service: self.program.clone(),
                status: output.status.code(),
                stderr: preview(stderr.trim(), constants::MAX_OPINION_STDERR_PREVIEW),
            });
        }

        if output.stdout.len() > constants::MAX_OPINION_RESPONSE_BYTES {
            return Err(ExternalServiceError::ResponseTooLarge {
                service: self.program.clone(),
                size: output.stdout.len(),
                max: constants::MAX_OPINION_RESPONSE_BYTES,
            });
        }

        String::from_utf8(output.stdout).map_err(|e| ExternalServiceError::InvalidUtf8 {
            service: self.program.clone(),
            source: e,
        })
    }
}

impl SecondOpinion for CommandService {
    fn name(&self) -> &str {
        &self.program
    }

    fn summarize(&self, report: &InterpretationReport) -> Result<String, ExternalServiceError> {
        let prompt = build_prompt(report);
        tracing::info!(
            program = %self.program,
            prompt_bytes = prompt.len(),
            "Requesting second opinion"
        );
        self.run(&prompt)
    }
}

/// Truncate to at most `max` bytes on a char boundary.
fn preview(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::input::RawInput;
    use crate::core::model::Parameter;
    use crate::core::opinion::consult;
    use crate::core::pipeline;
    use crate::core::tables::load_builtin_tables;

    fn report() -> InterpretationReport {
        let input = RawInput::new()
            .with_ratio(78.0)
            .with_percent(Parameter::Fvc, 95.0)
            .with_percent(Parameter::Dlco, 55.0);
        pipeline::interpret_input(&input, &load_builtin_tables())
    }

    #[test]
    fn test_not_configured() {
        assert!(matches!(
            CommandService::from_config(None, &[]),
            Err(ExternalServiceError::NotConfigured)
        ));
        assert!(matches!(
            CommandService::from_config(Some("  "), &[]),
            Err(ExternalServiceError::NotConfigured)
        ));
    }

    #[test]
    fn test_spawn_failure_is_warning() {
        let service = CommandService::new("pftlens-no-such-program-xyz", Vec::new());
        let reviewed = consult(report(), &service);
        assert!(reviewed.supplement().is_none());
        assert!(reviewed.warning().unwrap().contains("failed to start"));
    }

    #[cfg(unix)]
    #[test]
    fn test_command_receives_prompt() {
        let service = CommandService::new("cat", Vec::new());
        let reviewed = consult(report(), &service);
        let text = reviewed.supplement().unwrap();
        assert!(text.contains("GUIDELINES:"));
        assert!(text.contains("Diffusion"));
    }

    #[cfg(unix)]
    #[test]
    fn test_nonzero_exit_reports_status_and_stderr() {
        let service = CommandService::new(
            "sh",
            vec!["-c".to_string(), "echo quota exceeded >&2; exit 3".to_string()],
        );
        let err = service.summarize(&report()).unwrap_err();
        match err {
            ExternalServiceError::Failed { status, stderr, .. } => {
                assert_eq!(status, Some(3));
                assert_eq!(stderr, "quota exceeded");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_preview_truncates_on_char_boundary() {
        assert_eq!(preview("short", 10), "short");
        assert_eq!(preview("ééé", 3), "é...");
    }
}
