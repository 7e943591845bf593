use super::{CodeOracle, FixRequest, GenerateRequest, Generation, OracleError};
use crate::llm::{ChatMessage, LLMClient, LLMRequest, TokenUsage};
use async_trait::async_trait;
use indexmap::IndexMap;
use std::fmt::Write;
use std::sync::Arc;
use tracing::debug;

const SYSTEM_PROMPT: &str = "You are a senior software engineer implementing one file of a larger change. \
Respond with the complete content of the requested file and nothing else: no explanations, \
no surrounding prose. Keep imports consistent with the other files shown.";

const DEFAULT_MAX_TOKENS: u32 = 8192;
const DEFAULT_TEMPERATURE: f32 = 0.2;

/// USD per million tokens
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pricing {
    pub input_per_million: f64,
    pub output_per_million: f64,
}

impl Default for Pricing {
    fn default() -> Self {
        Self {
            input_per_million: 3.0,
            output_per_million: 15.0,
        }
    }
}

impl Pricing {
    pub fn cost(&self, usage: &TokenUsage) -> f64 {
        (usage.prompt_tokens as f64 * self.input_per_million
            + usage.completion_tokens as f64 * self.output_per_million)
            / 1_000_000.0
    }
}

/// Body of the outermost fenced code block, or the trimmed text when unfenced
pub fn strip_code_fences(content: &str) -> &str {
    let trimmed = content.trim();

    let Some(start_idx) = trimmed.find("```") else {
        return trimmed;
    };
    let after_fence = &trimmed[start_idx + 3..];
    // skip the language tag line
    let body = match after_fence.find('\n') {
        Some(newline) => &after_fence[newline + 1..],
        None => return trimmed,
    };
    match body.rfind("```") {
        Some(end_idx) => body[..end_idx].trim_end_matches(['\n', '\r']),
        None => body,
    }
}

fn push_context(prompt: &mut String, context: &IndexMap<String, String>) {
    if context.is_empty() {
        return;
    }
    prompt.push_str("\n## Related files\n");
    for (path, content) in context {
        let _ = write!(prompt, "\n### {}\n```\n{}\n```\n", path, content);
    }
}

fn generation_prompt(request: &GenerateRequest) -> String {
    let mut prompt = String::new();
    let _ = writeln!(prompt, "## Task\n{}\n", request.task_description);
    let _ = writeln!(prompt, "## File\n{}", request.path);
    if let Some(intent) = &request.intent {
        let _ = writeln!(prompt, "\n## Purpose\n{}", intent);
    }
    if let Some(existing) = &request.existing_content {
        let _ = writeln!(prompt, "\n## Current content\n```\n{}\n```", existing);
    }
    if !request.known_files.is_empty() {
        let _ = writeln!(
            prompt,
            "\n## Files in this change\n{}",
            request.known_files.join("\n")
        );
    }
    push_context(&mut prompt, &request.context);
    let _ = write!(prompt, "\nWrite the full content of {}.", request.path);
    prompt
}

fn fix_prompt(request: &FixRequest) -> String {
    let mut prompt = String::new();
    let _ = writeln!(prompt, "## Task\n{}\n", request.task_description);
    let _ = writeln!(
        prompt,
        "## File\n{}\n```\n{}\n```",
        request.path, request.content
    );
    prompt.push_str("\n## Errors\n");
    for error in &request.errors {
        let _ = writeln!(prompt, "- {}", error);
    }
    push_context(&mut prompt, &request.context);
    let _ = write!(
        prompt,
        "\nFix the errors and return the full corrected content of {}.",
        request.path
    );
    prompt
}

/// [`CodeOracle`] backed by any chat-style [`LLMClient`]
pub struct LlmOracle {
    client: Arc<dyn LLMClient>,
    pricing: Pricing,
    max_tokens: u32,
}

impl LlmOracle {
    pub fn new(client: Arc<dyn LLMClient>) -> Self {
        Self {
            client,
            pricing: Pricing::default(),
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    pub fn with_pricing(mut self, pricing: Pricing) -> Self {
        self.pricing = pricing;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    async fn complete(
        &self,
        path: &str,
        prompt: String,
        model: Option<&str>,
    ) -> Result<Generation, OracleError> {
        let mut request = LLMRequest::new(vec![
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(prompt),
        ])
        .with_temperature(DEFAULT_TEMPERATURE)
        .with_max_tokens(self.max_tokens);
        if let Some(model) = model {
            request = request.with_model(model);
        }

        let response = self.client.chat(request).await?;
        let content = strip_code_fences(&response.content);
        if content.trim().is_empty() {
            return Err(OracleError::EmptyResponse(path.to_string()));
        }

        let usage = response.usage.unwrap_or_default();
        debug!(
            file = path,
            client = self.client.name(),
            tokens = usage.total(),
            response_time_ms = response.response_time.as_millis() as u64,
            "Oracle response received"
        );

        Ok(Generation::new(
            format!("{}\n", content.trim_end()),
            usage.total(),
            self.pricing.cost(&usage),
        ))
    }
}

#[async_trait]
impl CodeOracle for LlmOracle {
    async fn generate_file(&self, request: GenerateRequest) -> Result<Generation, OracleError> {
        let prompt = generation_prompt(&request);
        self.complete(&request.path, prompt, request.model.as_deref())
            .await
    }

    async fn fix_file(&self, request: FixRequest) -> Result<Generation, OracleError> {
        let prompt = fix_prompt(&request);
        self.complete(&request.path, prompt, request.model.as_deref())
            .await
    }
}
