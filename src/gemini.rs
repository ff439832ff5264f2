//! Gemini client and the bounded-time analysis runner.
//!
//! One model call is made per analysis request. It runs in its own tokio
//! task raced against a deadline: when the deadline wins the handler answers
//! with a timeout right away, and the task is left to finish on its own with
//! nobody waiting for its result.

use crate::analysis::{build_prompt, normalize, parse_json_response, AnalysisError, AnalysisResult};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

const WARMUP_LIMIT: Duration = Duration::from_secs(20);
const DIAG_LIMIT: Duration = Duration::from_secs(30);
const DIAG_PREVIEW_CHARS: usize = 120;

/// Extra time a request may run past the caller's deadline before the HTTP
/// client gives up on it. Abandoned calls still end, just a little later.
pub const REQUEST_GRACE: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },
    #[error("API key cannot be sent as a header: {0}")]
    InvalidKey(String),
}

/// A generative model reachable with a single-turn prompt.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// Send one prompt and return the model's raw text.
    async fn generate(&self, prompt: &str) -> Result<String, BackendError>;
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

fn request_body(system_instruction: &str, prompt: &str) -> serde_json::Value {
    json!({
        "systemInstruction": { "parts": [{ "text": system_instruction }] },
        "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
        "generationConfig": { "responseMimeType": "application/json" }
    })
}

fn response_text(response: GenerateResponse) -> String {
    response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|content| content.parts.into_iter().map(|p| p.text).collect())
        .unwrap_or_default()
}

/// Gemini `generateContent` over REST.
pub struct GeminiBackend {
    client: reqwest::Client,
    url: String,
    model: String,
    system_instruction: String,
}

impl GeminiBackend {
    /// `api_key` must already be sanitized; it is sent in `x-goog-api-key`.
    ///
    /// `request_timeout` caps every request, including ones the analyzer has
    /// already stopped waiting for.
    pub fn new(
        api_key: &str,
        api_base: &str,
        model: &str,
        system_instruction: impl Into<String>,
        request_timeout: Duration,
    ) -> Result<Self, BackendError> {
        let mut key = HeaderValue::from_str(api_key)
            .map_err(|e| BackendError::InvalidKey(e.to_string()))?;
        key.set_sensitive(true);
        let mut headers = HeaderMap::new();
        headers.insert("x-goog-api-key", key);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(request_timeout)
            .build()?;

        Ok(Self {
            client,
            url: format!(
                "{}/v1beta/models/{}:generateContent",
                api_base.trim_end_matches('/'),
                model
            ),
            model: model.to_string(),
            system_instruction: system_instruction.into(),
        })
    }
}

#[async_trait]
impl ModelBackend for GeminiBackend {
    async fn generate(&self, prompt: &str) -> Result<String, BackendError> {
        debug!(model = %self.model, prompt_len = prompt.len(), "Sending generateContent request");

        let response = self
            .client
            .post(&self.url)
            .json(&request_body(&self.system_instruction, prompt))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let parsed: GenerateResponse = response.json().await?;
        Ok(response_text(parsed))
    }
}

/// Outcome of a timed ping for `/api/diag`.
#[derive(Debug, Clone, Serialize)]
pub struct DiagReport {
    pub call_ms: u128,
    pub text: String,
}

/// Runs analyses against the configured backend under a deadline.
pub struct EmotionAnalyzer {
    backend: Option<Arc<dyn ModelBackend>>,
    timeout: Duration,
    ready: AtomicBool,
}

impl EmotionAnalyzer {
    /// `backend` is `None` when no usable API key is configured.
    pub fn new(backend: Option<Arc<dyn ModelBackend>>, timeout: Duration) -> Self {
        Self {
            backend,
            timeout,
            ready: AtomicBool::new(false),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.backend.is_some()
    }

    /// Set once a warm-up call has succeeded.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Relaxed)
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn backend(&self) -> Result<Arc<dyn ModelBackend>, AnalysisError> {
        self.backend.clone().ok_or(AnalysisError::ConfigurationMissing)
    }

    /// Analyze user text, optionally steered by the user's music taste.
    pub async fn analyze(
        &self,
        text: &str,
        music_taste: Option<&str>,
    ) -> Result<AnalysisResult, AnalysisError> {
        let backend = self.backend()?;
        let prompt = build_prompt(text, music_taste);

        let started = Instant::now();
        let raw = call_bounded(backend, prompt, self.timeout).await;
        info!("⏱️ Gemini call finished in {:.2}s", started.elapsed().as_secs_f64());

        let result = normalize(&parse_json_response(&raw?));
        if result.is_empty() {
            return Err(AnalysisError::EmptyResult);
        }
        Ok(result)
    }

    /// Short ping to open the connection and flag readiness.
    pub async fn warm_up(&self) -> bool {
        let ok = match self.backend() {
            Ok(backend) => {
                let limit = self.timeout.min(WARMUP_LIMIT);
                match call_bounded(backend, "ping".to_string(), limit).await {
                    Ok(_) => true,
                    Err(e) => {
                        warn!("Gemini warm-up failed: {}", e);
                        false
                    }
                }
            }
            Err(_) => false,
        };
        self.ready.store(ok, Ordering::Relaxed);
        if ok {
            info!("✅ Gemini warm-up succeeded");
        }
        ok
    }

    /// Timed ping reporting latency and a preview of the reply.
    pub async fn diagnose(&self) -> Result<DiagReport, AnalysisError> {
        let backend = self.backend()?;
        let limit = self.timeout.min(DIAG_LIMIT);
        let started = Instant::now();
        let text = call_bounded(backend, "ping".to_string(), limit).await?;
        Ok(DiagReport {
            call_ms: started.elapsed().as_millis(),
            text: text.chars().take(DIAG_PREVIEW_CHARS).collect(),
        })
    }
}

/// Run one model call in its own task and wait at most `limit` for it.
///
/// On timeout the task is detached, not aborted; whatever it returns later
/// is dropped with the task.
async fn call_bounded(
    backend: Arc<dyn ModelBackend>,
    prompt: String,
    limit: Duration,
) -> Result<String, AnalysisError> {
    let handle = tokio::spawn(async move { backend.generate(&prompt).await });

    match tokio::time::timeout(limit, handle).await {
        Err(_) => {
            warn!("Gemini call exceeded {:?}, abandoning it", limit);
            Err(AnalysisError::Timeout { limit })
        }
        Ok(Err(join_err)) => Err(AnalysisError::CallFailed(join_err.to_string())),
        Ok(Ok(Err(e))) => Err(AnalysisError::CallFailed(e.to_string())),
        Ok(Ok(Ok(text))) => Ok(text),
    }
}
