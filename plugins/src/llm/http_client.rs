use std::{error::Error as StdError, fmt};

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{GenerationPrompt, TextGenerator};

const BODY_PREVIEW_LIMIT: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationHttpErrorKind {
    Timeout,
    Connect,
    Request,
    Body,
    Decode,
    Status,
    EmptyCompletion,
    Unknown,
}

impl GenerationHttpErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Connect => "connect",
            Self::Request => "request",
            Self::Body => "body",
            Self::Decode => "decode",
            Self::Status => "status",
            Self::EmptyCompletion => "empty_completion",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for GenerationHttpErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
pub struct GenerationHttpError {
    kind: GenerationHttpErrorKind,
    status: Option<u16>,
    url: Option<String>,
    message: String,
    source: Option<anyhow::Error>,
}

impl GenerationHttpError {
    pub fn kind(&self) -> GenerationHttpErrorKind {
        self.kind
    }

    pub fn status(&self) -> Option<u16> {
        self.status
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    fn from_reqwest(err: reqwest::Error, url: String) -> Self {
        let kind = if err.is_timeout() {
            GenerationHttpErrorKind::Timeout
        } else if err.is_connect() {
            GenerationHttpErrorKind::Connect
        } else if err.is_request() {
            GenerationHttpErrorKind::Request
        } else if err.is_body() {
            GenerationHttpErrorKind::Body
        } else if err.is_decode() {
            GenerationHttpErrorKind::Decode
        } else {
            GenerationHttpErrorKind::Unknown
        };
        Self {
            kind,
            status: err.status().map(|s| s.as_u16()),
            url: Some(url),
            message: err.to_string(),
            source: Some(anyhow::Error::new(err)),
        }
    }

    pub(crate) fn status_error(status: u16, url: String, preview: String) -> Self {
        Self {
            kind: GenerationHttpErrorKind::Status,
            status: Some(status),
            url: Some(url),
            message: preview,
            source: None,
        }
    }

    fn decode_error(status: u16, url: String, err: serde_json::Error, preview: String) -> Self {
        Self {
            kind: GenerationHttpErrorKind::Decode,
            status: Some(status),
            url: Some(url),
            message: format!("failed to decode response body: {} | body={}", err, preview),
            source: Some(anyhow::Error::new(err)),
        }
    }

    fn empty_completion(status: u16, url: String, preview: String) -> Self {
        Self {
            kind: GenerationHttpErrorKind::EmptyCompletion,
            status: Some(status),
            url: Some(url),
            message: format!("response has no choices[0].message.content | body={}", preview),
            source: None,
        }
    }

    /// Worth another attempt: network trouble, rate limiting or a server error.
    pub fn is_transient(&self) -> bool {
        match self.kind {
            GenerationHttpErrorKind::Timeout
            | GenerationHttpErrorKind::Connect
            | GenerationHttpErrorKind::Body => true,
            GenerationHttpErrorKind::Status => {
                matches!(self.status, Some(429) | Some(500..=599))
            }
            _ => false,
        }
    }
}

impl fmt::Display for GenerationHttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "generation http error kind={}", self.kind)?;
        if let Some(status) = self.status {
            write!(f, " status={}", status)?;
        }
        if let Some(url) = &self.url {
            write!(f, " url={}", url)?;
        }
        write!(f, ": {}", self.message)
    }
}

impl StdError for GenerationHttpError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|err| &**err as &(dyn StdError + 'static))
    }
}

fn preview_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "<empty body>".to_string();
    }

    let mut out: String = trimmed.chars().take(BODY_PREVIEW_LIMIT).collect();
    if trimmed.chars().count() > BODY_PREVIEW_LIMIT {
        out.push_str("...");
    }
    out
}

/// Client for any server speaking the OpenAI chat completions protocol
/// (OpenAI, Ollama, vLLM, LM Studio, ...).
#[derive(Clone)]
pub struct ChatCompletionsClient {
    api_key: String,
    model: String,
    temperature: f32,
    http: reqwest::Client,
    url_chat: String,
}

impl ChatCompletionsClient {
    pub fn new(
        base_url: &str,
        api_key: impl Into<String>,
        model: impl Into<String>,
        temperature: f32,
        timeout_ms: u64,
    ) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_millis(timeout_ms))
            .build()?;
        let normalized = base_url.trim_end_matches('/');
        Ok(Self {
            api_key: api_key.into(),
            model: model.into(),
            temperature,
            http,
            url_chat: format!("{}/chat/completions", normalized),
        })
    }

    fn auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.api_key.trim().is_empty() {
            req
        } else {
            req.bearer_auth(&self.api_key)
        }
    }

    fn payload(&self, prompt: &GenerationPrompt) -> Value {
        let mut messages = Vec::with_capacity(2);
        if !prompt.system.trim().is_empty() {
            messages.push(json!({ "role": "system", "content": prompt.system }));
        }
        messages.push(json!({ "role": "user", "content": prompt.user }));
        json!({
            "model": self.model,
            "messages": messages,
            "temperature": self.temperature,
            "stream": false,
        })
    }
}

#[async_trait]
impl TextGenerator for ChatCompletionsClient {
    fn name(&self) -> &str {
        "chat-completions"
    }

    async fn generate(&self, prompt: &GenerationPrompt) -> anyhow::Result<String> {
        let url = &self.url_chat;
        tracing::debug!(
            target: "taleforge.llm",
            stage = "llm.http.chat.in",
            url = %url,
            purpose = %prompt.purpose,
            model = %self.model,
            prompt_len = prompt.user.len()
        );

        let req = self.http.post(url).json(&self.payload(prompt));
        let resp = self
            .auth(req)
            .send()
            .await
            .map_err(|err| GenerationHttpError::from_reqwest(err, url.clone()))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|err| GenerationHttpError::from_reqwest(err, url.clone()))?;
        if !status.is_success() {
            return Err(
                GenerationHttpError::status_error(status.as_u16(), url.clone(), preview_body(&body))
                    .into(),
            );
        }

        let value: Value = serde_json::from_str(&body).map_err(|err| {
            GenerationHttpError::decode_error(status.as_u16(), url.clone(), err, preview_body(&body))
        })?;
        let content = value
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| {
                GenerationHttpError::empty_completion(status.as_u16(), url.clone(), preview_body(&body))
            })?;

        tracing::debug!(
            target: "taleforge.llm",
            stage = "llm.http.chat.out",
            status = %status,
            completion_len = content.len()
        );
        Ok(content.to_string())
    }
}
