//! Gemini-backed icon classifier.
//!
//! One call per image, no retries: the retry controller in
//! `crate::services::retry` decides what to do with a [`ServiceError`].

use std::{fmt, num::NonZeroU32, sync::Arc, time::Duration};

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use governor::{
    Quota, RateLimiter,
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
};
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::debug;

use crate::config::ClassifierConfig;
use crate::constants::{ASSET_CONTENT_TYPE, FALLBACK_DESCRIPTION, FALLBACK_KEY};
use crate::pipeline::ClassificationResult;

type ClassifierRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

const CLASSIFY_PROMPT: &str = "You are an icon naming assistant for a cloud architecture diagramming tool.\n\
Analyze this image and return a JSON object with two fields:\n\
1. \"name\": A short, specific, snake_case key for this icon (e.g., 'compute_engine', 'cloud_sql_postgres', 'generic_user_blue').\n\
2. \"description\": A very brief (5-10 words) description of what this icon represents visually and semantically.";

/// Whether a classifier failure is worth retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceErrorKind {
    /// Quota or rate-limit exhaustion.
    Transient,
    Terminal,
}

impl fmt::Display for ServiceErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transient => f.write_str("transient"),
            Self::Terminal => f.write_str("terminal"),
        }
    }
}

#[derive(Debug, Clone, Error)]
#[error("{kind} classifier error: {message}")]
pub struct ServiceError {
    pub kind: ServiceErrorKind,
    pub message: String,
}

impl ServiceError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: ServiceErrorKind::Transient,
            message: message.into(),
        }
    }

    pub fn terminal(message: impl Into<String>) -> Self {
        Self {
            kind: ServiceErrorKind::Terminal,
            message: message.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind == ServiceErrorKind::Transient
    }
}

/// Errors raised while constructing a classifier. These are fatal at startup.
#[derive(Debug, Error)]
pub enum ClassifierInitError {
    #[error("missing GOOGLE_AI_API_KEY or GEMINI_API_KEY environment variable")]
    MissingApiKey,
    #[error("invalid classifier endpoint `{0}`")]
    InvalidEndpoint(String),
    #[error("requests_per_minute must be greater than zero")]
    ZeroQuota,
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, content: &[u8]) -> Result<ClassificationResult, ServiceError>;
}

#[derive(Debug, Clone)]
pub struct GeminiClassifier {
    http: Client,
    endpoint: Url,
    api_key: String,
    limiter: Arc<ClassifierRateLimiter>,
}

impl GeminiClassifier {
    pub fn from_env(config: &ClassifierConfig) -> Result<Self, ClassifierInitError> {
        let api_key = std::env::var("GOOGLE_AI_API_KEY")
            .or_else(|_| std::env::var("GEMINI_API_KEY"))
            .map_err(|_| ClassifierInitError::MissingApiKey)?;
        Self::new(config, api_key)
    }

    pub fn new(
        config: &ClassifierConfig,
        api_key: impl Into<String>,
    ) -> Result<Self, ClassifierInitError> {
        let endpoint = generate_content_url(&config.api_base, &config.model)?;
        let per_minute =
            NonZeroU32::new(config.requests_per_minute).ok_or(ClassifierInitError::ZeroQuota)?;
        let limiter = Arc::new(RateLimiter::direct(Quota::per_minute(per_minute)));
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent("emblem-classifier/0.1")
            .build()
            .map_err(ClassifierInitError::Client)?;

        Ok(Self {
            http,
            endpoint,
            api_key: api_key.into(),
            limiter,
        })
    }
}

#[async_trait]
impl Classifier for GeminiClassifier {
    async fn classify(&self, content: &[u8]) -> Result<ClassificationResult, ServiceError> {
        let body = json!({
            "contents": [{
                "role": "user",
                "parts": [
                    {
                        "inline_data": {
                            "mime_type": ASSET_CONTENT_TYPE,
                            "data": BASE64_STANDARD.encode(content),
                        }
                    },
                    { "text": CLASSIFY_PROMPT }
                ]
            }],
            "generationConfig": { "responseMimeType": "application/json" }
        });

        self.limiter.until_ready().await;
        let response = self
            .http
            .post(self.endpoint.clone())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| ServiceError::terminal(format!("request failed: {err}")))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|err| ServiceError::terminal(format!("failed to read response: {err}")))?;

        if !status.is_success() {
            return Err(error_from_status(status, &text));
        }

        let parsed: GenerateContentResponse = serde_json::from_str(&text)
            .map_err(|err| ServiceError::terminal(format!("malformed response envelope: {err}")))?;
        let answer = parsed
            .first_text()
            .ok_or_else(|| ServiceError::terminal("response carried no text candidate"))?;
        debug!(bytes = content.len(), answer = %answer, "gemini classification");

        parse_suggestion(&answer)
    }
}

fn generate_content_url(api_base: &str, model: &str) -> Result<Url, ClassifierInitError> {
    let mut url =
        Url::parse(api_base).map_err(|_| ClassifierInitError::InvalidEndpoint(api_base.into()))?;
    let method = format!("{model}:generateContent");
    url.path_segments_mut()
        .map_err(|_| ClassifierInitError::InvalidEndpoint(api_base.into()))?
        .pop_if_empty()
        .extend(["v1beta", "models", method.as_str()]);
    Ok(url)
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
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

impl GenerateContentResponse {
    fn first_text(&self) -> Option<String> {
        let content = self.candidates.first()?.content.as_ref()?;
        let text: String = content
            .parts
            .iter()
            .filter_map(|part| part.text.as_deref())
            .collect();
        (!text.trim().is_empty()).then_some(text)
    }
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<u16>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

/// Map a non-success HTTP response to a tagged error.
///
/// Structured signals win: the HTTP status, then the `error.status` code of the
/// Google error envelope. Message inspection is only a last resort for bodies
/// that are not well-formed envelopes.
pub(crate) fn error_from_status(status: StatusCode, body: &str) -> ServiceError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return ServiceError::transient(format!("HTTP {status}: {}", summarize(body)));
    }

    if let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(body) {
        let message = envelope
            .error
            .message
            .unwrap_or_else(|| "no error message".to_string());
        let exhausted = envelope.error.status.as_deref() == Some("RESOURCE_EXHAUSTED")
            || envelope.error.code == Some(429);
        return if exhausted {
            ServiceError::transient(format!("HTTP {status}: {message}"))
        } else {
            ServiceError::terminal(format!("HTTP {status}: {message}"))
        };
    }

    if looks_rate_limited(body) {
        ServiceError::transient(format!("HTTP {status}: {}", summarize(body)))
    } else {
        ServiceError::terminal(format!("HTTP {status}: {}", summarize(body)))
    }
}

fn looks_rate_limited(text: &str) -> bool {
    ["429", "ResourceExhausted", "RESOURCE_EXHAUSTED", "Quota", "quota", "Too Many Requests"]
        .iter()
        .any(|needle| text.contains(needle))
}

fn summarize(body: &str) -> &str {
    const MAX: usize = 200;
    let trimmed = body.trim();
    match trimmed.char_indices().nth(MAX) {
        Some((idx, _)) => &trimmed[..idx],
        None => trimmed,
    }
}

#[derive(Debug, Deserialize)]
struct RawSuggestion {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

/// Parse the model's JSON answer into a classification result.
///
/// The answer must be a JSON object; a missing or unusable `name` falls back to
/// `generic_icon` instead of failing.
pub fn parse_suggestion(answer: &str) -> Result<ClassificationResult, ServiceError> {
    let raw: RawSuggestion = serde_json::from_str(answer.trim())
        .map_err(|err| ServiceError::terminal(format!("answer is not a JSON object: {err}")))?;

    let key = raw.name.as_deref().map(sanitize_key).unwrap_or_default();
    let key = if key.is_empty() {
        FALLBACK_KEY.to_string()
    } else {
        key
    };
    let description = raw
        .description
        .filter(|text| !text.trim().is_empty())
        .unwrap_or_else(|| FALLBACK_DESCRIPTION.to_string());

    Ok(ClassificationResult::new(key, description))
}

/// Restrict a suggested key to lowercase ASCII letters, digits, `-` and `_`.
pub fn sanitize_key(raw: &str) -> String {
    raw.chars()
        .filter_map(|ch| match ch {
            'a'..='z' | '0'..='9' | '-' | '_' => Some(ch),
            'A'..='Z' => Some(ch.to_ascii_lowercase()),
            _ => None,
        })
        .collect()
}
