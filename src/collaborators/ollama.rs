use super::{CostEstimate, CostOptions, GenerationContext, LanguageModel, MutantRecord};
use crate::config::OllamaEndpoint;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Request timeouts for completions and for the model listing.
const GENERATE_TIMEOUT: Duration = Duration::from_secs(600);
const TAGS_TIMEOUT: Duration = Duration::from_secs(5);

/// Sampling temperature for every completion.
const TEMPERATURE: f32 = 0.2;

const SYSTEM_PROMPT: &str = "You write unit tests. Reply with source code only.";

/// One configured Ollama endpoint.
pub struct OllamaClient {
    http: Client,
    name: String,
    base_url: String,
    model: String,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    system: &'a str,
    prompt: &'a str,
    stream: bool,
    options: SamplingOptions,
}

#[derive(Serialize)]
struct SamplingOptions {
    temperature: f32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<InstalledModel>,
}

#[derive(Deserialize)]
struct InstalledModel {
    name: String,
}

/// Ollama lists untagged models with an implicit `:latest`.
fn model_matches(installed: &str, wanted: &str) -> bool {
    installed == wanted || installed.strip_suffix(":latest") == Some(wanted)
}

impl OllamaClient {
    pub fn new(http: Client, endpoint: &OllamaEndpoint) -> Self {
        Self {
            http,
            name: endpoint.name.clone(),
            base_url: endpoint.url.trim_end_matches('/').to_string(),
            model: endpoint.model.clone(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Send one non-streaming completion request.
    pub async fn generate(&self, prompt: &str) -> Result<String> {
        let request = GenerateRequest {
            model: &self.model,
            system: SYSTEM_PROMPT,
            prompt,
            stream: false,
            options: SamplingOptions {
                temperature: TEMPERATURE,
            },
        };

        let response = self
            .http
            .post(format!("{}/api/generate", self.base_url))
            .timeout(GENERATE_TIMEOUT)
            .json(&request)
            .send()
            .await
            .with_context(|| format!("Endpoint '{}' unreachable at {}", self.name, self.base_url))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Endpoint '{}' returned {}: {}", self.name, status, body);
        }

        let body: GenerateResponse = response
            .json()
            .await
            .with_context(|| format!("Endpoint '{}' sent an unreadable response", self.name))?;
        Ok(body.response)
    }

    /// Reachable and serving the configured model.
    pub async fn has_model(&self) -> bool {
        let response = match self
            .http
            .get(format!("{}/api/tags", self.base_url))
            .timeout(TAGS_TIMEOUT)
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => response,
            _ => return false,
        };
        match response.json::<TagsResponse>().await {
            Ok(tags) => tags.models.iter().any(|m| model_matches(&m.name, &self.model)),
            Err(_) => false,
        }
    }
}

/// Language model backed by one or more Ollama endpoints.
///
/// Endpoints are tried in configuration order; a failing endpoint falls
/// through to the next one.
pub struct OllamaModel {
    endpoints: Vec<OllamaClient>,
    cost_per_1k_tokens: f64,
}

impl OllamaModel {
    pub fn new(endpoints: &[OllamaEndpoint], cost_per_1k_tokens: f64) -> Self {
        let http = Client::new();
        Self {
            endpoints: endpoints
                .iter()
                .filter(|e| e.enabled)
                .map(|e| OllamaClient::new(http.clone(), e))
                .collect(),
            cost_per_1k_tokens,
        }
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        if self.endpoints.is_empty() {
            anyhow::bail!("No Ollama endpoints configured");
        }

        let mut last_error = None;
        for client in &self.endpoints {
            match client.generate(prompt).await {
                Ok(response) => return Ok(extract_code_block(&response)),
                Err(e) => {
                    tracing::warn!("Endpoint '{}' failed, trying next: {:#}", client.name(), e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| anyhow::anyhow!("No Ollama endpoint produced a response")))
    }
}

#[async_trait]
impl LanguageModel for OllamaModel {
    async fn generate_tests(
        &self,
        source_code: &str,
        file_name: &str,
        context: &GenerationContext,
    ) -> Result<String> {
        self.generate(&generation_prompt(source_code, file_name, context))
            .await
    }

    async fn improve_tests(
        &self,
        source_code: &str,
        existing_tests: &str,
        survived_mutants: &[MutantRecord],
    ) -> Result<String> {
        self.generate(&improvement_prompt(
            source_code,
            existing_tests,
            survived_mutants,
        ))
        .await
    }

    async fn estimate_cost(&self, input: &str, options: &CostOptions) -> Result<CostEstimate> {
        // Roughly four characters per token; output is about the size of the input.
        let per_call = (input.chars().count() as u64).div_ceil(4) * 2;
        let tokens = per_call * (1 + u64::from(options.improvement_rounds));
        Ok(CostEstimate {
            tokens,
            cost: tokens as f64 / 1000.0 * self.cost_per_1k_tokens,
        })
    }

    async fn is_healthy(&self) -> bool {
        for client in &self.endpoints {
            if client.has_model().await {
                return true;
            }
            tracing::debug!("Endpoint '{}' cannot serve its model, trying next", client.name());
        }
        false
    }
}

/// Add line numbers to code for better LLM alignment.
fn add_line_numbers(code: &str) -> String {
    code.lines()
        .enumerate()
        .map(|(i, line)| format!("{:4} | {}", i + 1, line))
        .collect::<Vec<_>>()
        .join("\n")
}

fn generation_prompt(source_code: &str, file_name: &str, context: &GenerationContext) -> String {
    let numbered_code = add_line_numbers(source_code);
    let signatures = if context.function_signatures.is_empty() {
        "(none detected)".to_string()
    } else {
        context
            .function_signatures
            .iter()
            .map(|s| format!("- {s}"))
            .collect::<Vec<_>>()
            .join("\n")
    };
    let existing = context
        .existing_tests
        .as_deref()
        .map(|t| format!("\nExisting tests (keep them, add to them):\n```\n{t}\n```\n"))
        .unwrap_or_default();
    let extra = context
        .extra
        .as_ref()
        .map(|v| format!("\nAdditional context:\n{v}\n"))
        .unwrap_or_default();

    format!(
        r#"You are an expert in {language} testing. Write a complete {framework} test suite for the file below.

File: {file_name}
Complexity: {complexity:.2} ({functions} functions, {conditionals} conditionals)

Functions:
{signatures}

```{fence}
{numbered_code}
```
{existing}{extra}
RULES:
- Group all tests in a single top-level test group
- Cover normal cases, boundary values and error paths
- Every test must contain at least one assertion
- Do not include the line numbers in your output
- Respond with the test file only, in one code block"#,
        language = context.language,
        framework = context.test_framework,
        complexity = context.complexity.score,
        functions = context.complexity.functions,
        conditionals = context.complexity.conditionals,
        fence = context.language.fence_tag(),
    )
}

fn improvement_prompt(
    source_code: &str,
    existing_tests: &str,
    survived_mutants: &[MutantRecord],
) -> String {
    let numbered_code = add_line_numbers(source_code);
    let mutants = survived_mutants
        .iter()
        .map(|m| {
            format!(
                "- line {} ({}): {} -> `{}`",
                m.position_label(),
                m.status,
                m.mutator_name,
                m.replacement
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"The test suite below does not detect these mutations of the source code:

{mutants}

Source:
```
{numbered_code}
```

Existing tests:
```
{existing_tests}
```

Write NEW test cases that fail for each mutation above and pass for the original code.
Use the same framework and style as the existing tests.
Wrap the new cases in a single top-level test group with the same name as the existing one.
Do not repeat existing tests. Respond with the new tests only, in one code block."#
    )
}

/// Strip a surrounding Markdown code fence from a model response.
///
/// Returns the contents of the first fenced block, or the trimmed response
/// when there is none.
pub fn extract_code_block(response: &str) -> String {
    let Some(start) = response.find("```") else {
        return response.trim().to_string();
    };
    let after_fence = &response[start + 3..];
    // Skip the info string (language tag) on the fence line.
    let body_start = after_fence.find('\n').map(|i| i + 1).unwrap_or(after_fence.len());
    let body = &after_fence[body_start..];
    match body.find("```") {
        Some(end) => body[..end].trim_end().to_string(),
        None => body.trim_end().to_string(),
    }
}
