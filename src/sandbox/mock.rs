use super::{CommandOutput, IncrementalCheck, Sandbox, SandboxError, ValidationReport};
use async_trait::async_trait;
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

#[derive(Default)]
struct MockState {
    files: IndexMap<String, String>,
    writes: Vec<(String, String)>,
    deletes: Vec<String>,
    commands: Vec<String>,
    check_calls: Vec<String>,
    validate_calls: usize,
    queued_checks: HashMap<String, VecDeque<IncrementalCheck>>,
    sticky_checks: HashMap<String, IncrementalCheck>,
    queued_validations: VecDeque<ValidationReport>,
    default_validation: Option<ValidationReport>,
    failing_writes: HashSet<String>,
    failing_commands: Vec<String>,
    validate_error: Option<String>,
}

/// In-memory sandbox with scripted check and validation outcomes.
///
/// Unscripted checks and validations pass. Queued outcomes are consumed in
/// order before falling back to the sticky or default outcome.
#[derive(Default)]
pub struct MockSandbox {
    state: Mutex<MockState>,
}

impl MockSandbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(self, path: impl Into<String>, content: impl Into<String>) -> Self {
        self.state
            .lock()
            .unwrap()
            .files
            .insert(path.into(), content.into());
        self
    }

    /// Next incremental check of `path` returns `check`
    pub fn queue_check(&self, path: impl Into<String>, check: IncrementalCheck) {
        self.state
            .lock()
            .unwrap()
            .queued_checks
            .entry(path.into())
            .or_default()
            .push_back(check);
    }

    /// Every unqueued check of `path` fails with `errors`
    pub fn fail_checks(&self, path: impl Into<String>, errors: Vec<String>) {
        self.state
            .lock()
            .unwrap()
            .sticky_checks
            .insert(path.into(), IncrementalCheck::failed(errors));
    }

    pub fn queue_validation(&self, report: ValidationReport) {
        self.state
            .lock()
            .unwrap()
            .queued_validations
            .push_back(report);
    }

    /// Outcome of every validation once the queue is empty
    pub fn set_default_validation(&self, report: ValidationReport) {
        self.state.lock().unwrap().default_validation = Some(report);
    }

    pub fn fail_write(&self, path: impl Into<String>) {
        self.state.lock().unwrap().failing_writes.insert(path.into());
    }

    /// Commands containing `pattern` exit with code 1
    pub fn fail_command(&self, pattern: impl Into<String>) {
        self.state
            .lock()
            .unwrap()
            .failing_commands
            .push(pattern.into());
    }

    /// Full validation returns a sandbox error instead of a report
    pub fn fail_validate_with(&self, message: impl Into<String>) {
        self.state.lock().unwrap().validate_error = Some(message.into());
    }

    pub fn file(&self, path: &str) -> Option<String> {
        self.state.lock().unwrap().files.get(path).cloned()
    }

    pub fn files(&self) -> IndexMap<String, String> {
        self.state.lock().unwrap().files.clone()
    }

    /// Every write in call order
    pub fn writes(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().writes.clone()
    }

    pub fn written_paths(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .writes
            .iter()
            .map(|(path, _)| path.clone())
            .collect()
    }

    pub fn write_count(&self, path: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .writes
            .iter()
            .filter(|(p, _)| p == path)
            .count()
    }

    pub fn deletes(&self) -> Vec<String> {
        self.state.lock().unwrap().deletes.clone()
    }

    pub fn commands(&self) -> Vec<String> {
        self.state.lock().unwrap().commands.clone()
    }

    pub fn check_calls(&self) -> Vec<String> {
        self.state.lock().unwrap().check_calls.clone()
    }

    pub fn validate_calls(&self) -> usize {
        self.state.lock().unwrap().validate_calls
    }
}

#[async_trait]
impl Sandbox for MockSandbox {
    async fn write_file(&self, path: &str, content: &str) -> Result<(), SandboxError> {
        let mut state = self.state.lock().unwrap();
        if state.failing_writes.contains(path) {
            return Err(SandboxError::Io {
                path: path.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
            });
        }
        state.writes.push((path.to_string(), content.to_string()));
        state.files.insert(path.to_string(), content.to_string());
        Ok(())
    }

    async fn delete_file(&self, path: &str) -> Result<(), SandboxError> {
        let mut state = self.state.lock().unwrap();
        state.deletes.push(path.to_string());
        state.files.shift_remove(path);
        Ok(())
    }

    async fn run_command(
        &self,
        command: &str,
        _timeout_secs: u64,
    ) -> Result<CommandOutput, SandboxError> {
        let mut state = self.state.lock().unwrap();
        state.commands.push(command.to_string());
        if state.failing_commands.iter().any(|p| command.contains(p.as_str())) {
            return Ok(CommandOutput {
                stdout: String::new(),
                stderr: format!("{}: command failed", command),
                exit_code: 1,
            });
        }
        Ok(CommandOutput::default())
    }

    async fn validate_incremental(&self, path: &str) -> Result<IncrementalCheck, SandboxError> {
        let mut state = self.state.lock().unwrap();
        state.check_calls.push(path.to_string());
        if let Some(check) = state
            .queued_checks
            .get_mut(path)
            .and_then(VecDeque::pop_front)
        {
            return Ok(check);
        }
        Ok(state
            .sticky_checks
            .get(path)
            .cloned()
            .unwrap_or_else(IncrementalCheck::passed))
    }

    async fn validate(&self) -> Result<ValidationReport, SandboxError> {
        let mut state = self.state.lock().unwrap();
        state.validate_calls += 1;
        if let Some(message) = &state.validate_error {
            return Err(SandboxError::Unavailable(message.clone()));
        }
        if let Some(report) = state.queued_validations.pop_front() {
            return Ok(report);
        }
        Ok(state
            .default_validation
            .clone()
            .unwrap_or_else(|| ValidationReport::passed("ok")))
    }
}
