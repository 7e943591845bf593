use super::{CommandOutput, IncrementalCheck, Sandbox, SandboxError, ValidationReport};
use crate::context_window::ContextWindow;
use crate::graph::build_dependency_graph;
use crate::graph::imports::normalize_path;
use crate::plan::{BuildPlan, StepAction};
use async_trait::async_trait;
use indexmap::IndexSet;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::OnceLock;
use std::time::Duration;
use tokio::fs;
use tokio::process::Command;
use tracing::{debug, warn};

/// Placeholder substituted with the file path in the incremental check command
pub const FILE_PLACEHOLDER: &str = "{file}";

fn diagnostic_regex() -> &'static Regex {
    static DIAGNOSTIC_REGEX: OnceLock<Regex> = OnceLock::new();
    DIAGNOSTIC_REGEX.get_or_init(|| {
        Regex::new(r"(?i)\berror\b|error:|\bTS\d+\b").expect("Invalid diagnostic regex")
    })
}

/// Quotes `input` as one POSIX shell word; plain path characters pass through unchanged
pub fn shell_escape(input: &str) -> String {
    let plain = |ch: char| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.' | '/' | ':' | '@');
    if !input.is_empty() && input.chars().all(plain) {
        return input.to_string();
    }
    let mut escaped = String::from("'");
    for ch in input.chars() {
        if ch == '\'' {
            escaped.push_str("'\\''");
        } else {
            escaped.push(ch);
        }
    }
    escaped.push('\'');
    escaped
}

/// Lines of tool output that look like compiler or linter errors, deduplicated
pub fn parse_diagnostics(output: &str) -> Vec<String> {
    let mut errors: Vec<String> = Vec::new();
    for line in output.lines() {
        let line = line.trim();
        if line.is_empty() || !diagnostic_regex().is_match(line) {
            continue;
        }
        if !errors.iter().any(|e| e == line) {
            errors.push(line.to_string());
        }
    }
    errors
}

/// Sandbox rooted at a local directory.
///
/// Commands run through `sh -c` inside the root. Without a configured check or
/// validate command the corresponding call trivially passes.
#[derive(Debug, Clone)]
pub struct LocalSandbox {
    root: PathBuf,
    check_command: Option<String>,
    validate_command: Option<String>,
    command_timeout_secs: u64,
}

impl LocalSandbox {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            check_command: None,
            validate_command: None,
            command_timeout_secs: 300,
        }
    }

    /// Command run after each checked file is written; `{file}` is replaced by its
    /// shell-quoted path
    pub fn with_check_command(mut self, command: impl Into<String>) -> Self {
        self.check_command = Some(command.into());
        self
    }

    pub fn with_validate_command(mut self, command: impl Into<String>) -> Self {
        self.validate_command = Some(command.into());
        self
    }

    pub fn with_command_timeout(mut self, seconds: u64) -> Self {
        self.command_timeout_secs = seconds;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, SandboxError> {
        if Path::new(path).is_absolute() {
            return Err(SandboxError::PathEscape(path.to_string()));
        }
        match normalize_path(path) {
            Some(relative) if !relative.is_empty() => Ok(self.root.join(relative)),
            _ => Err(SandboxError::PathEscape(path.to_string())),
        }
    }

    /// Current content of the files `plan` builds on: every modified file and
    /// every plan file another step imports. Files not on disk yet are skipped.
    pub async fn existing_files(&self, plan: &BuildPlan) -> Result<ContextWindow, SandboxError> {
        let graph = build_dependency_graph(&plan.steps);
        let mut paths: IndexSet<&str> = plan
            .steps
            .iter()
            .filter(|step| step.action == StepAction::ModifyFile)
            .filter_map(|step| step.file_path.as_deref())
            .collect();
        for (_, deps) in graph.iter() {
            paths.extend(deps.iter().map(String::as_str));
        }

        let mut window = ContextWindow::new();
        for path in paths {
            let target = match self.resolve(path) {
                Ok(target) => target,
                Err(e) => {
                    warn!(path, "Not reading existing file: {}", e);
                    continue;
                }
            };
            match fs::read_to_string(&target).await {
                Ok(content) => window.insert(path, content),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(Self::io_error(path, e)),
            }
        }
        debug!(files = window.len(), "Read existing files");
        Ok(window)
    }

    fn io_error(path: &str, source: std::io::Error) -> SandboxError {
        SandboxError::Io {
            path: path.to_string(),
            source,
        }
    }

    async fn exec(&self, command: &str, timeout_secs: u64) -> Result<CommandOutput, SandboxError> {
        debug!(command, timeout_secs, "Running sandbox command");

        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(command)
            .current_dir(&self.root)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let output = tokio::time::timeout(Duration::from_secs(timeout_secs), cmd.output())
            .await
            .map_err(|_| SandboxError::Timeout {
                command: command.to_string(),
                seconds: timeout_secs,
            })?
            .map_err(|e| SandboxError::Spawn {
                command: command.to_string(),
                message: e.to_string(),
            })?;

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code: output.status.code().unwrap_or(-1),
        })
    }

    /// Diagnostics of a failed run, or a generic line when nothing matched
    fn failure_errors(output: &CommandOutput) -> Vec<String> {
        let combined = output.combined();
        let errors = parse_diagnostics(&combined);
        if !errors.is_empty() {
            return errors;
        }
        if combined.is_empty() {
            vec![format!("Command exited with code {}", output.exit_code)]
        } else {
            vec![combined]
        }
    }
}

#[async_trait]
impl Sandbox for LocalSandbox {
    async fn write_file(&self, path: &str, content: &str) -> Result<(), SandboxError> {
        let target = self.resolve(path)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| Self::io_error(path, e))?;
        }
        fs::write(&target, content)
            .await
            .map_err(|e| Self::io_error(path, e))
    }

    async fn delete_file(&self, path: &str) -> Result<(), SandboxError> {
        let target = self.resolve(path)?;
        match fs::remove_file(&target).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path, "Delete target already absent");
                Ok(())
            }
            Err(e) => Err(Self::io_error(path, e)),
        }
    }

    async fn run_command(
        &self,
        command: &str,
        timeout_secs: u64,
    ) -> Result<CommandOutput, SandboxError> {
        self.exec(command, timeout_secs).await
    }

    async fn validate_incremental(&self, path: &str) -> Result<IncrementalCheck, SandboxError> {
        let Some(template) = &self.check_command else {
            return Ok(IncrementalCheck::passed());
        };
        self.resolve(path)?;

        let command = template.replace(FILE_PLACEHOLDER, &shell_escape(path));
        let output = self.exec(&command, self.command_timeout_secs).await?;
        if output.success() {
            Ok(IncrementalCheck::passed())
        } else {
            Ok(IncrementalCheck::failed(Self::failure_errors(&output)))
        }
    }

    async fn validate(&self) -> Result<ValidationReport, SandboxError> {
        let Some(command) = &self.validate_command else {
            warn!("No validation command configured, treating project as valid");
            return Ok(ValidationReport::passed("no validation command configured"));
        };

        let output = self.exec(command, self.command_timeout_secs).await?;
        let combined = output.combined();
        if output.success() {
            Ok(ValidationReport::passed(combined))
        } else {
            let errors = Self::failure_errors(&output);
            Ok(ValidationReport::failed(combined, errors))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_diagnostics() {
        let output = "\
src/app.ts(3,5): error TS2304: Cannot find name 'foo'.
Found 1 error.
src/app.ts(3,5): error TS2304: Cannot find name 'foo'.
compiling...
TypeError: x is not a function
";
        let errors = parse_diagnostics(output);
        assert_eq!(
            errors,
            vec![
                "src/app.ts(3,5): error TS2304: Cannot find name 'foo'.",
                "Found 1 error.",
                "TypeError: x is not a function",
            ]
        );
    }

    #[test]
    fn test_shell_escape() {
        assert_eq!(shell_escape("src/app.ts"), "src/app.ts");
        assert_eq!(shell_escape("@scope/pkg-1.ts"), "@scope/pkg-1.ts");
        assert_eq!(shell_escape("a.ts;touch x"), "'a.ts;touch x'");
        assert_eq!(shell_escape("it's $(x).ts"), "'it'\\''s $(x).ts'");
        assert_eq!(shell_escape(""), "''");
    }

    #[test]
    fn test_error_words_inside_identifiers_ignored() {
        assert!(parse_diagnostics("no_errors_here\nterror").is_empty());
    }

    #[test]
    fn test_resolve_rejects_escape() {
        let sandbox = LocalSandbox::new("/tmp/root");
        assert!(matches!(
            sandbox.resolve("../etc/passwd"),
            Err(SandboxError::PathEscape(_))
        ));
        assert!(matches!(
            sandbox.resolve("/etc/passwd"),
            Err(SandboxError::PathEscape(_))
        ));
        assert_eq!(
            sandbox.resolve("./src/../src/app.ts").unwrap(),
            PathBuf::from("/tmp/root/src/app.ts")
        );
    }
}
