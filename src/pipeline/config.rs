/// Bounds and commands the build pipeline runs with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildConfig {
    /// Repair attempts per file after its first generation
    pub max_fix_attempts: u32,
    /// Whole-project validation passes in the integrate phase
    pub max_integration_iterations: u32,
    /// Most recent errors handed to a single repair request
    pub max_fix_errors: usize,
    pub command_timeout_secs: u64,
    /// Prefix of the batched install issued for detected packages
    pub install_command: String,
    /// Extensions that get an incremental check after every write
    pub checked_extensions: Vec<String>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            max_fix_attempts: 3,
            max_integration_iterations: 3,
            max_fix_errors: 5,
            command_timeout_secs: 300,
            install_command: "npm install".to_string(),
            checked_extensions: [".ts", ".tsx", ".mts", ".cts"]
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
        }
    }
}

impl BuildConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_fix_attempts(mut self, attempts: u32) -> Self {
        self.max_fix_attempts = attempts;
        self
    }

    pub fn with_max_integration_iterations(mut self, iterations: u32) -> Self {
        self.max_integration_iterations = iterations;
        self
    }

    pub fn with_max_fix_errors(mut self, errors: usize) -> Self {
        self.max_fix_errors = errors;
        self
    }

    pub fn with_command_timeout(mut self, seconds: u64) -> Self {
        self.command_timeout_secs = seconds;
        self
    }

    pub fn with_install_command(mut self, command: impl Into<String>) -> Self {
        self.install_command = command.into();
        self
    }

    pub fn with_checked_extensions(mut self, extensions: Vec<String>) -> Self {
        self.checked_extensions = extensions;
        self
    }

    /// Whether `path` gets an incremental check after being written
    pub fn is_checked(&self, path: &str) -> bool {
        self.checked_extensions
            .iter()
            .any(|ext| path.ends_with(ext.as_str()))
    }
}
