use super::{CodeOracle, FixRequest, GenerateRequest, Generation, OracleError};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

const DEFAULT_TOKENS: u64 = 100;
const DEFAULT_COST: f64 = 0.01;

#[derive(Default)]
struct MockOracleState {
    generations: HashMap<String, VecDeque<String>>,
    fixes: HashMap<String, VecDeque<String>>,
    failing_generates: HashMap<String, String>,
    failing_fixes: HashSet<String>,
    generate_calls: Vec<GenerateRequest>,
    fix_calls: Vec<FixRequest>,
}

/// Scripted oracle.
///
/// Unscripted generations return `// generated <path>` and unscripted fixes
/// return `// fixed <path> (<n>)`, each costing a fixed token amount.
#[derive(Default)]
pub struct MockOracle {
    state: Mutex<MockOracleState>,
}

impl MockOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_generation(&self, path: impl Into<String>, content: impl Into<String>) {
        self.state
            .lock()
            .unwrap()
            .generations
            .entry(path.into())
            .or_default()
            .push_back(content.into());
    }

    pub fn queue_fix(&self, path: impl Into<String>, content: impl Into<String>) {
        self.state
            .lock()
            .unwrap()
            .fixes
            .entry(path.into())
            .or_default()
            .push_back(content.into());
    }

    pub fn fail_generate(&self, path: impl Into<String>, message: impl Into<String>) {
        self.state
            .lock()
            .unwrap()
            .failing_generates
            .insert(path.into(), message.into());
    }

    pub fn fail_fix(&self, path: impl Into<String>) {
        self.state.lock().unwrap().failing_fixes.insert(path.into());
    }

    pub fn generate_calls(&self) -> Vec<GenerateRequest> {
        self.state.lock().unwrap().generate_calls.clone()
    }

    pub fn fix_calls(&self) -> Vec<FixRequest> {
        self.state.lock().unwrap().fix_calls.clone()
    }

    pub fn generated_paths(&self) -> Vec<String> {
        self.generate_calls().into_iter().map(|r| r.path).collect()
    }

    pub fn fix_count(&self, path: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .fix_calls
            .iter()
            .filter(|r| r.path == path)
            .count()
    }
}

#[async_trait]
impl CodeOracle for MockOracle {
    async fn generate_file(&self, request: GenerateRequest) -> Result<Generation, OracleError> {
        let mut state = self.state.lock().unwrap();
        let path = request.path.clone();
        state.generate_calls.push(request);

        if let Some(message) = state.failing_generates.get(&path) {
            return Err(OracleError::Unavailable(message.clone()));
        }
        let content = state
            .generations
            .get_mut(&path)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| format!("// generated {}\n", path));
        Ok(Generation::new(content, DEFAULT_TOKENS, DEFAULT_COST))
    }

    async fn fix_file(&self, request: FixRequest) -> Result<Generation, OracleError> {
        let mut state = self.state.lock().unwrap();
        let path = request.path.clone();
        state.fix_calls.push(request);

        if state.failing_fixes.contains(&path) {
            return Err(OracleError::Unavailable(format!("fix refused for {}", path)));
        }
        let attempt = state.fix_calls.iter().filter(|r| r.path == path).count();
        let content = state
            .fixes
            .get_mut(&path)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| format!("// fixed {} ({})\n", path, attempt));
        Ok(Generation::new(content, DEFAULT_TOKENS, DEFAULT_COST))
    }
}
