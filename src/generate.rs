//! Natural language to Mermaid source via a hosted text-generation model.

use crate::kind::DiagramKind;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};
use ureq::Agent;

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_API_KEY_ENV: &str = "GEMINI_API_KEY";

/// Errors surfaced to callers of [`Generator::generate`].
///
/// Transport details never leave this module; they are logged and collapsed
/// into [`GenerateError::Failed`].
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum GenerateError {
    #[error("no API key configured (set the {var} environment variable)")]
    MissingCredential { var: String },
    #[error("failed to generate Mermaid code from the API")]
    Failed,
}

/// Failure of a single remote call.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("request failed: {0}")]
    Transport(#[from] ureq::Error),
    #[error("response contained no text")]
    EmptyResponse,
}

pub struct CompletionRequest<'a> {
    pub model: &'a str,
    pub api_key: &'a str,
    pub prompt: &'a str,
}

/// One prompt in, one text blob out.
pub trait CompletionBackend: Send + Sync {
    fn complete(&self, request: &CompletionRequest<'_>) -> Result<String, BackendError>;
}

/// Anything that can turn free text into diagram source for a kind.
pub trait Generator {
    fn generate(&self, input: &str, kind: DiagramKind) -> Result<String, GenerateError>;
}

impl<F> Generator for F
where
    F: Fn(&str, DiagramKind) -> Result<String, GenerateError>,
{
    fn generate(&self, input: &str, kind: DiagramKind) -> Result<String, GenerateError> {
        self(input, kind)
    }
}

pub struct GenerationClient<B> {
    backend: B,
    model: String,
    api_key: Option<String>,
    api_key_env: String,
}

impl<B: CompletionBackend> GenerationClient<B> {
    pub fn new(backend: B, model: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            backend,
            model: model.into(),
            api_key: api_key.filter(|key| !key.trim().is_empty()),
            api_key_env: DEFAULT_API_KEY_ENV.to_string(),
        }
    }

    /// Read the credential from the environment variable `var`.
    pub fn from_env(backend: B, model: impl Into<String>, var: &str) -> Self {
        let mut client = Self::new(backend, model, std::env::var(var).ok());
        client.api_key_env = var.to_string();
        client
    }

    pub fn has_credential(&self) -> bool {
        self.api_key.is_some()
    }
}

impl<B: CompletionBackend> Generator for GenerationClient<B> {
    /// Callers are expected to reject blank input before getting here.
    fn generate(&self, input: &str, kind: DiagramKind) -> Result<String, GenerateError> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(GenerateError::MissingCredential {
                var: self.api_key_env.clone(),
            });
        };

        let prompt = build_prompt(input, kind);
        let request = CompletionRequest {
            model: &self.model,
            api_key,
            prompt: &prompt,
        };

        match self.backend.complete(&request) {
            Ok(raw) => {
                debug!(kind = %kind, bytes = raw.len(), "generation succeeded");
                Ok(clean_response(&raw, kind))
            }
            Err(e) => {
                error!(kind = %kind, error = %e, "error generating content");
                Err(GenerateError::Failed)
            }
        }
    }
}

pub fn build_prompt(input: &str, kind: DiagramKind) -> String {
    format!(
        r#"You are an expert in Mermaid.js. Convert the following text into valid Mermaid.js code for a **{name}**.

Constraints:
- Output **only the Mermaid code**.
- Do **not** include ```mermaid fences or any explanation before the code.
- Do **not** include any explanation or commentary after the code.
- Always produce the requested diagram kind ({keyword}).

Input text:
---
{input}
---
"#,
        name = kind.display_name(),
        keyword = kind.keyword(),
        input = input,
    )
}

/// Strip Markdown fences the model may add and make sure the result starts
/// with the kind's declaration keyword.
pub fn clean_response(raw: &str, kind: DiagramKind) -> String {
    let mut code = raw.trim();
    if let Some(rest) = code.strip_prefix("```mermaid") {
        code = rest.trim();
    } else if let Some(rest) = code.strip_prefix("```") {
        code = rest.trim();
    }
    if let Some(rest) = code.strip_suffix("```") {
        code = rest.trim();
    }

    let keyword = kind.keyword();
    if code.to_lowercase().starts_with(&keyword.to_lowercase()) {
        code.to_string()
    } else {
        format!("{}\n{}", keyword, code)
    }
}

#[derive(Serialize)]
struct GenerateContentRequest<'a> {
    contents: [Content<'a>; 1],
}

#[derive(Serialize)]
struct Content<'a> {
    parts: [RequestPart<'a>; 1],
}

#[derive(Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

impl GenerateContentResponse {
    fn into_text(self) -> Option<String> {
        let content = self.candidates.into_iter().next()?.content?;
        let text: String = content.parts.into_iter().filter_map(|p| p.text).collect();
        if text.trim().is_empty() { None } else { Some(text) }
    }
}

/// Google Generative Language API over HTTPS.
pub struct GeminiBackend {
    agent: Agent,
    endpoint: String,
}

impl GeminiBackend {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            agent: Agent::new_with_defaults(),
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
        }
    }
}

impl Default for GeminiBackend {
    fn default() -> Self {
        Self::new(DEFAULT_ENDPOINT)
    }
}

impl CompletionBackend for GeminiBackend {
    fn complete(&self, request: &CompletionRequest<'_>) -> Result<String, BackendError> {
        let url = format!("{}/models/{}:generateContent", self.endpoint, request.model);
        let body = GenerateContentRequest {
            contents: [Content {
                parts: [RequestPart {
                    text: request.prompt,
                }],
            }],
        };

        debug!(%url, "sending generation request");
        let mut response = self
            .agent
            .post(&url)
            .header("x-goog-api-key", request.api_key)
            .send_json(&body)?;
        let parsed: GenerateContentResponse = response.body_mut().read_json()?;
        parsed.into_text().ok_or(BackendError::EmptyResponse)
    }
}
