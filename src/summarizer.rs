use itertools::Itertools;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::grouping::Group;
use crate::normalize::sanitize_speech;
use crate::retry::{with_retries, CallError, RetryPolicy};

pub const NO_EVENTS_TEXT: &str = "There were no relevant events in this period.";
pub const ERROR_TEXT: &str = "Error processing events.";
pub const NOT_CONFIGURED_TEXT: &str = "The summarizer is not configured.";

/// Items submitted per call are capped to bound payload size.
pub const MAX_ITEMS: usize = 100;

pub const MAX_SCORE: f64 = 10.0;

/// Fixed system instruction for per-window reports. The model is asked for
/// strict JSON so the severity score travels with the text.
pub const REPORT_INSTRUCTION: &str = "You receive a JSON array of grouped event reports from a \
premises monitoring feed. Each item has a sample text, an occurrence count and first/last seen \
timestamps. Reply with a single JSON object {\"text\": \"...\", \"score\": N} and nothing else: \
text is a short spoken-style summary of what happened (plain sentences, no markup, no lists), \
score is an integer 0-10 rating the overall severity of the period.";

/// Distinct instruction for the daily rollup call.
pub const DAILY_INSTRUCTION: &str = "You receive the concatenated block summaries of one \
monitoring day. Reply with a single JSON object {\"text\": \"...\", \"score\": N} and nothing \
else: text is an executive summary of the whole day in a few spoken-style sentences (no markup), \
score is an integer 0-10 rating the day's overall severity.";

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("summarizer call failed after retries: {0}")]
    Exhausted(#[from] CallError),
    #[error("http client init error: {0}")]
    Init(#[from] reqwest::Error),
}

/// Structured summarization result.
#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub text: String,
    pub score: f64,
}

impl Summary {
    pub fn no_events() -> Self {
        Summary { text: NO_EVENTS_TEXT.to_string(), score: 0.0 }
    }

    pub fn fallback(reason: &str) -> Self {
        warn!("summarizer fallback: {reason}");
        Summary { text: ERROR_TEXT.to_string(), score: 0.0 }
    }
}

#[derive(Debug, Clone)]
pub struct SummarizerSettings {
    pub api_base: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for SummarizerSettings {
    fn default() -> Self {
        SummarizerSettings {
            api_base: "https://api.openai.com/v1".to_string(),
            api_key: None,
            timeout: Duration::from_secs(40),
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatContent,
}

#[derive(Deserialize)]
struct ChatContent {
    #[serde(default)]
    content: String,
}

#[derive(Deserialize)]
struct ModelAnswer {
    text: String,
    #[serde(default)]
    score: Option<f64>,
}

/// Gateway to the external text-generation service. Transient failures are
/// retried with backoff; only retry exhaustion surfaces to the caller as an
/// error, everything else degrades to a safe fallback `Summary`.
pub struct SummaryClient {
    settings: SummarizerSettings,
    http: reqwest::blocking::Client,
}

impl SummaryClient {
    pub fn new(settings: SummarizerSettings) -> Result<Self, GatewayError> {
        if settings.api_key.is_none() {
            warn!("no summarizer credential configured; all calls will return the fallback text");
        }
        let http = reqwest::blocking::Client::builder()
            .timeout(settings.timeout)
            .build()?;
        Ok(SummaryClient { settings, http })
    }

    /// Summarize a grouped batch. Empty input short-circuits to the
    /// deterministic no-events result without any outbound call.
    pub fn summarize_groups(
        &self,
        groups: &[Group],
        model: &str,
    ) -> Result<Summary, GatewayError> {
        if groups.is_empty() {
            return Ok(Summary::no_events());
        }
        let payload = serde_json::to_value(groups)
            .unwrap_or_else(|_| Value::Array(Vec::new()));
        self.summarize_payload(&payload, REPORT_INSTRUCTION, model)
    }

    /// Summarize an arbitrary serialized payload under a given instruction.
    pub fn summarize_payload(
        &self,
        payload: &Value,
        instruction: &str,
        model: &str,
    ) -> Result<Summary, GatewayError> {
        if payload_is_empty(payload) {
            return Ok(Summary::no_events());
        }
        if self.settings.api_key.is_none() {
            return Ok(Summary { text: NOT_CONFIGURED_TEXT.to_string(), score: 0.0 });
        }

        let capped = cap_items(payload);
        let body = capped.to_string();
        debug!("summarizer request - model={model}, payload={} chars", body.len());

        let start = std::time::Instant::now();
        let response = with_retries(&self.settings.retry, |_attempt| {
            self.send(model, instruction, &body)
        })?;
        info!(
            "summarizer call completed - model={}, duration={:.2}s",
            model,
            start.elapsed().as_secs_f64()
        );

        Ok(self.extract(response))
    }

    fn send(
        &self,
        model: &str,
        instruction: &str,
        user_content: &str,
    ) -> Result<reqwest::blocking::Response, CallError> {
        let key = self.settings.api_key.as_deref().ok_or(CallError::NotConfigured)?;
        let request = ChatRequest {
            model,
            messages: vec![
                ChatMessage { role: "system", content: instruction },
                ChatMessage { role: "user", content: user_content },
            ],
        };
        let response = self
            .http
            .post(format!("{}/chat/completions", self.settings.api_base))
            .bearer_auth(key)
            .json(&request)
            .send()
            .map_err(|e| CallError::Network(e.to_string()))?;
        let status = response.status();
        if status.is_server_error() {
            return Err(CallError::Status(status.as_u16()));
        }
        Ok(response)
    }

    fn extract(&self, response: reqwest::blocking::Response) -> Summary {
        let status = response.status();
        if !status.is_success() {
            return Summary::fallback(&format!(
                "summarizer rejected the request (status {})",
                status.as_u16()
            ));
        }
        let envelope: ChatResponse = match response.json() {
            Ok(v) => v,
            Err(e) => return Summary::fallback(&format!("unreadable summarizer response: {e}")),
        };
        let content = match envelope.choices.into_iter().next() {
            Some(choice) => choice.message.content,
            None => return Summary::fallback("summarizer response carried no choices"),
        };
        // The instruction asks for strict JSON; an answer that is not valid
        // JSON is used verbatim with score 0.
        match serde_json::from_str::<ModelAnswer>(&content) {
            Ok(answer) => Summary {
                text: sanitize_speech(&answer.text),
                score: answer.score.unwrap_or(0.0).clamp(0.0, MAX_SCORE),
            },
            Err(_) => Summary { text: sanitize_speech(&content), score: 0.0 },
        }
    }
}

fn payload_is_empty(payload: &Value) -> bool {
    match payload {
        Value::Null => true,
        Value::Array(items) => items.is_empty(),
        Value::String(s) => s.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

/// Bound the submitted batch: arrays of counted items keep the top
/// `MAX_ITEMS` by count descending, anything else gets a plain prefix cap.
pub fn cap_items(payload: &Value) -> Value {
    match payload {
        Value::Array(items) if items.len() > MAX_ITEMS => {
            let counted = items
                .iter()
                .all(|item| item.get("count").and_then(Value::as_u64).is_some());
            if counted {
                let capped: Vec<Value> = items
                    .iter()
                    .sorted_by_key(|item| {
                        std::cmp::Reverse(item.get("count").and_then(Value::as_u64).unwrap_or(0))
                    })
                    .take(MAX_ITEMS)
                    .cloned()
                    .collect();
                Value::Array(capped)
            } else {
                Value::Array(items.iter().take(MAX_ITEMS).cloned().collect())
            }
        }
        other => other.clone(),
    }
}
