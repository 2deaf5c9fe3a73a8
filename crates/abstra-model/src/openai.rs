//! OpenAI-compatible model server backend (vLLM-style).
//!
//! - `GET  /v1/models`           : load-time check that the model is served
//! - `POST /v1/chat/completions` : generation with the server's chat template
//! - `POST /v1/completions`      : generation with a local template, and
//!                                 target scoring via `echo` + `logprobs`

use crate::{
    ChatTemplate, ModelBackend, ModelConfig, ModelError, ModelInfo, ModelSession, SamplingParams,
};
use reqwest::blocking::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

pub struct OpenAiCompatBackend {
    config: ModelConfig,
}

impl OpenAiCompatBackend {
    pub fn new(config: ModelConfig) -> Self {
        Self { config }
    }

    fn load_error(&self, reason: impl Into<String>) -> ModelError {
        ModelError::Load {
            model: self.config.name.clone(),
            reason: reason.into(),
        }
    }
}

impl ModelBackend for OpenAiCompatBackend {
    fn name(&self) -> &str {
        "openai"
    }

    fn load(&self) -> Result<Box<dyn ModelSession>, ModelError> {
        let mut builder = Client::builder();
        if let Some(timeout) = self.config.timeout() {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| self.load_error(format!("failed to build http client: {e}")))?;

        let session = OpenAiCompatSession {
            client,
            base_url: normalize_base_url(&self.config.base_url),
            api_key: self.config.api_key(),
            config: self.config.clone(),
        };

        let served = session
            .served_models()
            .map_err(|e| self.load_error(e.to_string()))?;
        if !served.iter().any(|id| id == &self.config.name) {
            return Err(self.load_error(format!(
                "not served at {} (available: {})",
                session.base_url,
                served.join(", ")
            )));
        }
        Ok(Box::new(session))
    }
}

pub struct OpenAiCompatSession {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    config: ModelConfig,
}

#[derive(Deserialize)]
struct ModelList {
    data: Vec<ModelEntry>,
}

#[derive(Deserialize)]
struct ModelEntry {
    id: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    text: String,
    #[serde(default)]
    logprobs: Option<PromptLogprobs>,
}

#[derive(Debug, Deserialize)]
struct PromptLogprobs {
    tokens: Vec<String>,
    /// The first prompt token has no conditional probability and comes back null.
    token_logprobs: Vec<Option<f64>>,
    text_offset: Vec<usize>,
}

impl OpenAiCompatSession {
    fn authorized(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => req.bearer_auth(key),
            None => req,
        }
    }

    fn served_models(&self) -> Result<Vec<String>, ModelError> {
        let url = format!("{}/v1/models", self.base_url);
        let resp = self
            .authorized(self.client.get(&url))
            .send()
            .map_err(|e| ModelError::Network(format!("failed to reach {url}: {e}")))?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().unwrap_or_default();
            return Err(ModelError::Api(format!("http error {status}: {text}")));
        }
        let list: ModelList = resp
            .json()
            .map_err(|e| ModelError::InvalidResponse(format!("model list: {e}")))?;
        Ok(list.data.into_iter().map(|m| m.id).collect())
    }

    fn post(&self, path: &str, body: &Value) -> Result<reqwest::blocking::Response, ModelError> {
        let url = format!("{}{path}", self.base_url);
        let resp = self
            .authorized(self.client.post(&url))
            .json(body)
            .send()
            .map_err(|e| ModelError::Network(format!("failed to reach {url}: {e}")))?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().unwrap_or_default();
            return Err(ModelError::Api(format!("http error {status}: {text}")));
        }
        Ok(resp)
    }

    fn chat_endpoint(&self, prompt: &str, params: &SamplingParams) -> Result<String, ModelError> {
        let body = json!({
            "model": self.config.name,
            "messages": [{ "role": "user", "content": prompt }],
            "max_tokens": params.max_length,
            "temperature": params.temperature,
            "repetition_penalty": params.repetition_penalty,
            "skip_special_tokens": true,
            "stream": false,
        });
        let out: ChatResponse = self
            .post("/v1/chat/completions", &body)?
            .json()
            .map_err(|e| ModelError::InvalidResponse(format!("chat completion: {e}")))?;
        out.choices
            .into_iter()
            .next()
            .map(|c| c.message.content.unwrap_or_default())
            .ok_or_else(|| ModelError::InvalidResponse("no choices returned".to_string()))
    }

    fn templated_completion(
        &self,
        template: ChatTemplate,
        prompt: &str,
        params: &SamplingParams,
    ) -> Result<String, ModelError> {
        let body = json!({
            "model": self.config.name,
            "prompt": template.render_user_turn(prompt),
            "max_tokens": params.max_length,
            "temperature": params.temperature,
            "repetition_penalty": params.repetition_penalty,
            "stop": template.stop_sequences(),
            "skip_special_tokens": true,
        });
        let out: CompletionResponse = self
            .post("/v1/completions", &body)?
            .json()
            .map_err(|e| ModelError::InvalidResponse(format!("completion: {e}")))?;
        out.choices
            .into_iter()
            .next()
            .map(|c| c.text)
            .ok_or_else(|| ModelError::InvalidResponse("no choices returned".to_string()))
    }
}

impl ModelSession for OpenAiCompatSession {
    fn chat(&mut self, prompt: &str, params: &SamplingParams) -> Result<String, ModelError> {
        let text = match self.config.chat_template {
            Some(template) => self.templated_completion(template, prompt, params)?,
            None => self.chat_endpoint(prompt, params)?,
        };
        Ok(text.trim().to_string())
    }

    fn log_likelihood(&mut self, context: &str, target: &str) -> Result<f64, ModelError> {
        if target.trim().is_empty() {
            return Err(ModelError::Unsupported("empty target".to_string()));
        }
        let (prompt, target_start) = join_context_target(context, target);
        let body = json!({
            "model": self.config.name,
            "prompt": prompt,
            "max_tokens": 1,
            "temperature": 0.0,
            "echo": true,
            "logprobs": 0,
        });
        let out: CompletionResponse = self
            .post("/v1/completions", &body)?
            .json()
            .map_err(|e| ModelError::InvalidResponse(format!("scoring completion: {e}")))?;
        let logprobs = out
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.logprobs)
            .ok_or_else(|| ModelError::InvalidResponse("no prompt logprobs returned".to_string()))?;
        let prompt_chars = prompt.chars().count();
        let score = sum_target_logprobs(&logprobs, target_start, prompt_chars)?;
        debug!(
            "scored target over {} prompt tokens: {score:.4}",
            logprobs.tokens.len()
        );
        Ok(score)
    }

    fn info(&self) -> ModelInfo {
        ModelInfo {
            name: self.config.name.clone(),
            backend: "openai".to_string(),
            precision: self.config.dtype,
            device: self.config.device,
        }
    }
}

fn normalize_base_url(base_url: &str) -> String {
    let mut host = base_url.trim().to_string();
    if host.is_empty() {
        host = crate::config::DEFAULT_BASE_URL.to_string();
    }
    if !host.starts_with("http://") && !host.starts_with("https://") {
        host = format!("http://{host}");
    }
    host.trim_end_matches('/').to_string()
}

/// Fixed lead-in for every scoring prompt. The first prompt token never gets
/// a logprob, so the target must not be able to land there.
const SCORING_PREFIX: &str = "Text:";

/// Returns the scoring prompt and the character offset of the separator in
/// front of the target. Tokenizers usually glue that space onto the first
/// target token, so the span starts there. An empty context still carries
/// the prefix, so every coalition scores the same target tokens.
fn join_context_target(context: &str, target: &str) -> (String, usize) {
    let context = context.trim();
    let head = if context.is_empty() {
        SCORING_PREFIX.to_string()
    } else {
        format!("{SCORING_PREFIX} {context}")
    };
    let target_start = head.chars().count();
    (format!("{head} {target}"), target_start)
}

/// Sum the echoed log-probabilities of tokens that start inside
/// `[target_start, prompt_chars)`. Tokens past the prompt are the one
/// generated token and are ignored.
fn sum_target_logprobs(
    logprobs: &PromptLogprobs,
    target_start: usize,
    prompt_chars: usize,
) -> Result<f64, ModelError> {
    if logprobs.token_logprobs.len() != logprobs.text_offset.len() {
        return Err(ModelError::InvalidResponse(
            "logprobs and offsets differ in length".to_string(),
        ));
    }
    let mut total = 0.0;
    let mut counted = 0usize;
    for (lp, &offset) in logprobs.token_logprobs.iter().zip(&logprobs.text_offset) {
        if offset < target_start || offset >= prompt_chars {
            continue;
        }
        if let Some(lp) = lp {
            total += lp;
            counted += 1;
        }
    }
    if counted == 0 {
        return Err(ModelError::InvalidResponse(
            "no target tokens in echoed prompt".to_string(),
        ));
    }
    Ok(total)
}
