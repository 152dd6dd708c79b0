//! HTTP-based LLM providers.
//!
//! Supports Google's native Gemini `generateContent` API and
//! OpenAI-compatible chat completion APIs (OpenAI, DeepSeek, local proxies).

use crate::provider::{
    ChatMessage, CompletionRequest, CompletionResponse, FinishReason, LlmError, LlmProvider, Role,
};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;

/// Inferred provider kind from model name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Gemini,
    OpenAi,
    DeepSeek,
    /// Falls back to OpenAI-compatible format.
    Unknown,
}

impl ProviderKind {
    /// Infer provider from model name prefix.
    pub fn from_model(model: &str) -> Self {
        let m = model.to_lowercase();
        if m.starts_with("gemini-") || m.starts_with("models/gemini-") {
            Self::Gemini
        } else if m.starts_with("gpt-")
            || m.starts_with("o1-")
            || m.starts_with("o3-")
            || m.starts_with("o4-")
        {
            Self::OpenAi
        } else if m.starts_with("deepseek-") {
            Self::DeepSeek
        } else {
            Self::Unknown
        }
    }

    fn default_base_url(self) -> &'static str {
        match self {
            Self::Gemini => "https://generativelanguage.googleapis.com/v1beta",
            Self::OpenAi | Self::Unknown => "https://api.openai.com/v1",
            Self::DeepSeek => "https://api.deepseek.com",
        }
    }
}

// ── Gemini generateContent types ──

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    contents: Vec<GeminiContent>,
    generation_config: GeminiGenerationConfig,
}

#[derive(Serialize, Deserialize)]
struct GeminiContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Serialize, Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    max_output_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    usage_metadata: Option<GeminiUsage>,
    prompt_feedback: Option<GeminiPromptFeedback>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    content: Option<GeminiContent>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiUsage {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPromptFeedback {
    block_reason: Option<String>,
}

// ── OpenAI-compatible request/response types ──

#[derive(Serialize)]
struct OaiRequest {
    model: String,
    messages: Vec<OaiMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct OaiMessage {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct OaiResponse {
    choices: Vec<OaiChoice>,
    usage: Option<OaiUsage>,
}

#[derive(Deserialize)]
struct OaiChoice {
    message: OaiChoiceMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct OaiChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct OaiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

// ── Provider ──

/// HTTP-based LLM provider. Handles both Gemini-native and OpenAI-compatible APIs.
pub struct HttpProvider {
    kind: ProviderKind,
    model: String,
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpProvider {
    /// Build from model name + API key + optional base URL override.
    pub fn new(model: String, api_key: String, base_url: Option<String>) -> Self {
        let kind = ProviderKind::from_model(&model);
        let base = base_url.unwrap_or_else(|| kind.default_base_url().to_owned());
        let model = model.trim_start_matches("models/").to_owned();
        Self {
            kind,
            model,
            client: reqwest::Client::new(),
            base_url: base.trim_end_matches('/').to_owned(),
            api_key,
        }
    }

    fn endpoint(&self) -> String {
        match self.kind {
            ProviderKind::Gemini => {
                format!("{}/models/{}:generateContent", self.base_url, self.model)
            }
            _ => format!("{}/chat/completions", self.base_url),
        }
    }
}

fn role_str(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}

/// Parse error response, returning RateLimited for 429.
fn check_error(status: reqwest::StatusCode, body: String) -> LlmError {
    if status.as_u16() == 429 {
        LlmError::RateLimited
    } else {
        LlmError::RequestFailed(format!("{status}: {body}"))
    }
}

/// Split system messages out (Gemini takes them as `systemInstruction`) and
/// map the rest onto Gemini's `user`/`model` roles.
fn gemini_body(request: &CompletionRequest) -> GeminiRequest {
    let system: Vec<&str> = request
        .messages
        .iter()
        .filter(|m| m.role == Role::System)
        .map(|m| m.content.as_str())
        .collect();
    let system_instruction = (!system.is_empty()).then(|| GeminiContent {
        role: None,
        parts: vec![GeminiPart { text: system.join("\n\n") }],
    });

    let contents = request
        .messages
        .iter()
        .filter(|m| m.role != Role::System)
        .map(|m: &ChatMessage| GeminiContent {
            role: Some(if m.role == Role::Assistant { "model" } else { "user" }.to_owned()),
            parts: vec![GeminiPart { text: m.content.clone() }],
        })
        .collect();

    GeminiRequest {
        system_instruction,
        contents,
        generation_config: GeminiGenerationConfig {
            max_output_tokens: request.max_tokens,
            temperature: request.temperature,
        },
    }
}

fn gemini_finish_reason(raw: Option<&str>) -> FinishReason {
    match raw {
        Some("MAX_TOKENS") => FinishReason::MaxTokens,
        Some("SAFETY") | Some("RECITATION") | Some("BLOCKLIST") | Some("PROHIBITED_CONTENT") => {
            FinishReason::Blocked
        }
        _ => FinishReason::Stop,
    }
}

impl LlmProvider for HttpProvider {
    fn name(&self) -> &str {
        match self.kind {
            ProviderKind::Gemini => "gemini",
            ProviderKind::OpenAi => "openai",
            ProviderKind::DeepSeek => "deepseek",
            ProviderKind::Unknown => "unknown",
        }
    }

    fn complete(
        &self,
        request: CompletionRequest,
    ) -> Pin<Box<dyn Future<Output = Result<CompletionResponse, LlmError>> + Send + '_>> {
        if self.kind == ProviderKind::Gemini {
            Box::pin(self.complete_gemini(request))
        } else {
            Box::pin(self.complete_openai(request))
        }
    }
}

impl HttpProvider {
    /// Native Gemini `generateContent` call.
    async fn complete_gemini(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let body = gemini_body(&request);

        let resp = self.client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(check_error(status, text));
        }

        let api: GeminiResponse = resp.json().await
            .map_err(|e| LlmError::RequestFailed(e.to_string()))?;

        if let Some(reason) = api.prompt_feedback.and_then(|f| f.block_reason) {
            return Err(LlmError::Blocked(reason));
        }

        let candidate = api.candidates.into_iter().next();
        let finish_reason = gemini_finish_reason(
            candidate.as_ref().and_then(|c| c.finish_reason.as_deref()),
        );
        let content: String = candidate
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().map(|p| p.text).collect::<Vec<_>>().join(""))
            .unwrap_or_default();

        if content.is_empty() && finish_reason == FinishReason::Blocked {
            return Err(LlmError::Blocked("candidate withheld".into()));
        }

        let (input_tokens, output_tokens) = api.usage_metadata
            .map(|u| (u.prompt_token_count, u.candidates_token_count)).unwrap_or((0, 0));

        tracing::debug!(
            provider = "gemini",
            model = %self.model,
            input_tokens,
            output_tokens,
            "completion received"
        );

        Ok(CompletionResponse { content, finish_reason, input_tokens, output_tokens })
    }

    /// OpenAI-compatible completion (OpenAI, DeepSeek, Unknown).
    async fn complete_openai(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let body = OaiRequest {
            model: self.model.clone(),
            messages: request.messages.iter().map(|m| OaiMessage {
                role: role_str(m.role),
                content: m.content.clone(),
            }).collect(),
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        let resp = self.client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(check_error(status, text));
        }

        let api: OaiResponse = resp.json().await
            .map_err(|e| LlmError::RequestFailed(e.to_string()))?;

        let choice = api.choices.into_iter().next();
        let finish_reason = match choice.as_ref().and_then(|c| c.finish_reason.as_deref()) {
            Some("length") => FinishReason::MaxTokens,
            Some("content_filter") => FinishReason::Blocked,
            _ => FinishReason::Stop,
        };
        let content = choice.and_then(|c| c.message.content).unwrap_or_default();
        let (input_tokens, output_tokens) = api.usage
            .map(|u| (u.prompt_tokens, u.completion_tokens)).unwrap_or((0, 0));

        Ok(CompletionResponse { content, finish_reason, input_tokens, output_tokens })
    }
}

/// Build an LlmProvider from environment variables.
/// Reads `STEWARD_LLM_MODEL`, `STEWARD_LLM_API_KEY`, optionally `STEWARD_LLM_BASE_URL`.
/// Returns `None` if model or key is not set.
pub fn from_env() -> Option<HttpProvider> {
    let model = std::env::var("STEWARD_LLM_MODEL").ok()?;
    let api_key = std::env::var("STEWARD_LLM_API_KEY").ok()?;
    let base_url = std::env::var("STEWARD_LLM_BASE_URL").ok();
    Some(HttpProvider::new(model, api_key, base_url))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infer_gemini_models() {
        assert_eq!(ProviderKind::from_model("gemini-2.0-flash"), ProviderKind::Gemini);
        assert_eq!(ProviderKind::from_model("models/gemini-1.5-pro"), ProviderKind::Gemini);
        assert_eq!(ProviderKind::from_model("Gemini-Pro"), ProviderKind::Gemini);
    }

    #[test]
    fn infer_other_models() {
        assert_eq!(ProviderKind::from_model("gpt-4o"), ProviderKind::OpenAi);
        assert_eq!(ProviderKind::from_model("o3-mini"), ProviderKind::OpenAi);
        assert_eq!(ProviderKind::from_model("deepseek-chat"), ProviderKind::DeepSeek);
        assert_eq!(ProviderKind::from_model("llama-3"), ProviderKind::Unknown);
    }

    #[test]
    fn gemini_endpoint_strips_models_prefix() {
        let p = HttpProvider::new("models/gemini-2.0-flash".into(), "key".into(), None);
        assert_eq!(
            p.endpoint(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:generateContent"
        );
        assert_eq!(p.name(), "gemini");
    }

    #[test]
    fn openai_endpoint_with_override() {
        let p = HttpProvider::new(
            "gpt-4o".into(),
            "sk-test".into(),
            Some("https://my-proxy.com/v1/".into()),
        );
        assert_eq!(p.endpoint(), "https://my-proxy.com/v1/chat/completions");
    }

    #[test]
    fn gemini_body_moves_system_to_instruction() {
        let req = CompletionRequest {
            messages: vec![
                ChatMessage::system("be kind"),
                ChatMessage::user("hello"),
                ChatMessage::assistant("hi!"),
                ChatMessage::user("add a task"),
            ],
            max_tokens: 256,
            temperature: 0.2,
        };
        let body = serde_json::to_value(gemini_body(&req)).unwrap();
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "be kind");
        let contents = body["contents"].as_array().unwrap();
        assert_eq!(contents.len(), 3);
        assert_eq!(contents[1]["role"], "model");
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 256);
    }

    #[test]
    fn gemini_finish_reasons() {
        assert_eq!(gemini_finish_reason(Some("STOP")), FinishReason::Stop);
        assert_eq!(gemini_finish_reason(Some("MAX_TOKENS")), FinishReason::MaxTokens);
        assert_eq!(gemini_finish_reason(Some("SAFETY")), FinishReason::Blocked);
        assert_eq!(gemini_finish_reason(None), FinishReason::Stop);
    }

    #[test]
    fn gemini_response_parses() {
        let raw = r#"{
            "candidates": [{"content": {"role": "model", "parts": [{"text": "Hello "}, {"text": "there"}]}, "finishReason": "STOP"}],
            "usageMetadata": {"promptTokenCount": 12, "candidatesTokenCount": 3}
        }"#;
        let api: GeminiResponse = serde_json::from_str(raw).unwrap();
        let text: String = api.candidates[0]
            .content
            .as_ref()
            .unwrap()
            .parts
            .iter()
            .map(|p| p.text.as_str())
            .collect();
        assert_eq!(text, "Hello there");
        assert_eq!(api.usage_metadata.unwrap().prompt_token_count, 12);
    }
}
