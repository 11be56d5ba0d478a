//! Retry-then-fallback policy shared by the generating stages.
//!
//! A generation step never fails the task because of the model: failed calls
//! and unparsable output are retried, and once retries run out a deterministic
//! fallback value marked `"degraded": true` takes its place.

use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::llm::{GenerationHttpError, GenerationPrompt, TextGenerator};

pub const DEGRADED_KEY: &str = "degraded";

#[derive(Debug, Clone, Copy)]
pub struct GenerationPolicy {
    pub max_retries: u32,
    pub retry_backoff: Duration,
}

impl GenerationPolicy {
    pub fn new(max_retries: u32, retry_backoff_ms: u64) -> Self {
        Self {
            max_retries,
            retry_backoff: Duration::from_millis(retry_backoff_ms),
        }
    }
}

impl Default for GenerationPolicy {
    fn default() -> Self {
        Self::new(2, 500)
    }
}

/// Asks for JSON and returns the parsed object, or `None` when every attempt
/// failed or the task was cancelled while waiting.
pub async fn generate_json(
    generator: &dyn TextGenerator,
    prompt: &GenerationPrompt,
    policy: GenerationPolicy,
    cancel: &CancellationToken,
) -> Option<Map<String, Value>> {
    let attempts = policy.max_retries.saturating_add(1);
    for attempt in 1..=attempts {
        let res = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(purpose = %prompt.purpose, "generation call dropped after cancellation");
                return None;
            }
            res = generator.generate(prompt) => res,
        };

        match res {
            Ok(text) => match extract_json_object(&text) {
                Some(obj) => return Some(obj),
                None => warn!(
                    purpose = %prompt.purpose,
                    generator = generator.name(),
                    attempt,
                    "generated text is not a JSON object"
                ),
            },
            Err(e) => {
                warn!(
                    purpose = %prompt.purpose,
                    generator = generator.name(),
                    attempt,
                    error = %e,
                    "generation call failed"
                );
                if !is_retryable(&e) {
                    return None;
                }
            }
        }

        if attempt < attempts {
            let backoff = policy.retry_backoff.saturating_mul(attempt);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return None,
                _ = tokio::time::sleep(backoff) => {}
            }
        }
    }
    None
}

/// HTTP errors carry their own classification (bad credentials or a rejected
/// request fail the same way every time); anything else gets another attempt.
fn is_retryable(err: &anyhow::Error) -> bool {
    err.downcast_ref::<GenerationHttpError>()
        .map(GenerationHttpError::is_transient)
        .unwrap_or(true)
}

/// [`generate_json`], falling back to `fallback()` marked as degraded.
pub async fn generate_or_fallback(
    generator: &dyn TextGenerator,
    prompt: &GenerationPrompt,
    policy: GenerationPolicy,
    cancel: &CancellationToken,
    fallback: impl FnOnce() -> Value,
) -> Value {
    if let Some(obj) = generate_json(generator, prompt, policy, cancel).await {
        return Value::Object(obj);
    }
    warn!(purpose = %prompt.purpose, "using fallback content");
    mark_degraded(fallback())
}

pub fn mark_degraded(value: Value) -> Value {
    let mut obj = match value {
        Value::Object(obj) => obj,
        other => {
            let mut obj = Map::new();
            obj.insert("value".to_string(), other);
            obj
        }
    };
    obj.insert(DEGRADED_KEY.to_string(), Value::Bool(true));
    Value::Object(obj)
}

pub fn is_degraded(value: &Value) -> bool {
    value.get(DEGRADED_KEY).and_then(Value::as_bool).unwrap_or(false)
}

static FENCED_BLOCK_REGEX: OnceLock<Regex> = OnceLock::new();

fn fenced_block_regex() -> &'static Regex {
    FENCED_BLOCK_REGEX.get_or_init(|| {
        Regex::new(r"(?s)```(?:json|JSON)?\s*(.*?)```").expect("FENCED_BLOCK_REGEX is valid")
    })
}

/// Pulls a JSON object out of model output: a fenced ```json block, the
/// whole text, or the outermost `{...}` span, in that order.
pub fn extract_json_object(text: &str) -> Option<Map<String, Value>> {
    let mut candidates = Vec::with_capacity(3);
    if let Some(caps) = fenced_block_regex().captures(text) {
        if let Some(body) = caps.get(1) {
            candidates.push(body.as_str().trim());
        }
    }
    candidates.push(text.trim());
    if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) {
        if start < end {
            candidates.push(&text[start..=end]);
        }
    }

    candidates.into_iter().find_map(|candidate| {
        match serde_json::from_str::<Value>(candidate) {
            Ok(Value::Object(obj)) => Some(obj),
            _ => None,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use taleforge_core::api::SubjectType;

    struct Scripted {
        replies: Vec<anyhow::Result<String>>,
        calls: AtomicU32,
    }

    impl Scripted {
        fn new(replies: Vec<anyhow::Result<String>>) -> Self {
            Self {
                replies,
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl TextGenerator for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn generate(&self, _prompt: &GenerationPrompt) -> anyhow::Result<String> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) as usize;
            match self.replies.get(n) {
                Some(Ok(text)) => Ok(text.clone()),
                Some(Err(e)) => Err(anyhow::anyhow!("{e}")),
                None => Err(anyhow::anyhow!("no more replies")),
            }
        }
    }

    fn prompt() -> GenerationPrompt {
        GenerationPrompt::new("world_building", "Alpha", SubjectType::World)
    }

    #[test]
    fn extracts_fenced_json() {
        let text = "Sure! Here it is:\n```json\n{\"name\": \"Alpha\"}\n```\nEnjoy.";
        let obj = extract_json_object(text).unwrap();
        assert_eq!(obj["name"], "Alpha");
    }

    #[test]
    fn extracts_embedded_object() {
        let obj = extract_json_object("The world: {\"a\": {\"b\": 1}} done").unwrap();
        assert_eq!(obj["a"]["b"], 1);
    }

    #[test]
    fn rejects_non_objects() {
        assert!(extract_json_object("[1, 2, 3]").is_none());
        assert!(extract_json_object("no json here").is_none());
        assert!(extract_json_object("{broken").is_none());
    }

    #[test]
    fn degraded_marker_wraps_scalars() {
        let v = mark_degraded(json!("plain"));
        assert_eq!(v, json!({ "value": "plain", "degraded": true }));
        assert!(is_degraded(&v));
        assert!(!is_degraded(&json!({ "name": "x" })));
    }

    #[tokio::test]
    async fn retries_until_parsable() {
        let gen = Scripted::new(vec![
            Err(anyhow::anyhow!("timeout")),
            Ok("not json".into()),
            Ok("{\"name\": \"Alpha\"}".into()),
        ]);
        let value = generate_or_fallback(
            &gen,
            &prompt(),
            GenerationPolicy::new(2, 1),
            &CancellationToken::new(),
            || json!({ "name": "fallback" }),
        )
        .await;
        assert_eq!(value, json!({ "name": "Alpha" }));
        assert_eq!(gen.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn falls_back_after_retries() {
        let gen = Scripted::new(vec![Ok("nope".into()), Ok("still nope".into())]);
        let value = generate_or_fallback(
            &gen,
            &prompt(),
            GenerationPolicy::new(1, 1),
            &CancellationToken::new(),
            || json!({ "name": "fallback" }),
        )
        .await;
        assert_eq!(value, json!({ "name": "fallback", "degraded": true }));
        assert_eq!(gen.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn cancelled_token_skips_the_call() {
        let gen = Scripted::new(vec![Ok("{}".into())]);
        let token = CancellationToken::new();
        token.cancel();
        let got = generate_json(&gen, &prompt(), GenerationPolicy::default(), &token).await;
        assert!(got.is_none());
    }

    struct Unauthorized {
        calls: AtomicU32,
    }

    #[async_trait]
    impl TextGenerator for Unauthorized {
        fn name(&self) -> &str {
            "unauthorized"
        }

        async fn generate(&self, _prompt: &GenerationPrompt) -> anyhow::Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(GenerationHttpError::status_error(
                401,
                "http://localhost/v1/chat/completions".into(),
                "invalid api key".into(),
            )
            .into())
        }
    }

    #[tokio::test]
    async fn client_errors_fall_back_without_retrying() {
        let gen = Unauthorized {
            calls: AtomicU32::new(0),
        };
        let value = generate_or_fallback(
            &gen,
            &prompt(),
            GenerationPolicy::new(3, 1),
            &CancellationToken::new(),
            || json!({ "name": "fallback" }),
        )
        .await;
        assert!(is_degraded(&value));
        assert_eq!(gen.calls.load(Ordering::SeqCst), 1);
    }
}
