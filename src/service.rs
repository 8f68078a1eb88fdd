//! Vision/LLM service: payload encoding, retry policy, usage accounting.
//!
//! The transport lives behind [`VisionBackend`] — one request in, content and
//! token usage out — so the retry loop is a plain function over an explicit
//! result type and a budget, independent of any particular API's failure
//! signalling. [`ServiceError`] distinguishes the two failure classes the
//! loop cares about:
//!
//! * **Transient** (timeout, rate-limit): retried up to `max_retries`
//!   attempts with linearly increasing backoff (`attempt × retry_wait`).
//! * **Permanent** (auth, malformed request): abandoned immediately.
//!
//! Calls are synchronous; backoff blocks the calling stage with
//! `std::thread::sleep`. Parallelism belongs to independent documents in
//! separate processes, never to one document's pipeline.

use crate::block::Block;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use image::DynamicImage;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::io::Cursor;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

// ── Payload encoding ─────────────────────────────────────────────────────

/// A base64-encoded raster ready for a multimodal request body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageData {
    pub data: String,
    pub mime_type: String,
}

impl ImageData {
    /// Encode a raster as base64 PNG.
    ///
    /// PNG over JPEG: lossless compression keeps rendered text crisp, which
    /// matters far more than payload size for OCR accuracy.
    pub fn from_image(img: &DynamicImage) -> Result<Self, image::ImageError> {
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
        let b64 = STANDARD.encode(&buf);
        debug!("encoded image crop, {} bytes base64", b64.len());
        Ok(Self {
            data: b64,
            mime_type: "image/png".to_string(),
        })
    }
}

// ── Failure classes & retry policy ───────────────────────────────────────

/// Failure classes a backend call can report.
#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    /// Timeout, rate-limit, overloaded backend. Worth retrying.
    #[error("transient service failure: {reason}")]
    Transient { reason: String },

    /// Authentication, malformed request, content policy. Retrying is
    /// pointless; the request is abandoned.
    #[error("permanent service failure: {reason}")]
    Permanent { reason: String },
}

/// One successful backend response.
#[derive(Debug, Clone)]
pub struct BackendResponse {
    pub content: String,
    pub total_tokens: u64,
}

/// The transport seam: exactly one request per call, one optional image.
///
/// The single-image shape is deliberate — several vision backends reject
/// multi-image requests, so the service layer fans multi-image prompts out
/// into sequential per-image calls.
pub trait VisionBackend {
    fn send(&self, prompt: &str, image: Option<&ImageData>)
        -> Result<BackendResponse, ServiceError>;
}

/// Retry budget and backoff shape for transient failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per request, including the first.
    pub max_retries: u32,
    /// Base wait; the n-th retry waits `n × retry_wait`.
    pub retry_wait: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            retry_wait: Duration::from_secs(3),
        }
    }
}

impl RetryPolicy {
    /// Backoff before the n-th retry (1-based): linear in `n`.
    pub fn delay_for(&self, retry: u32) -> Duration {
        self.retry_wait.saturating_mul(retry)
    }
}

/// Drive one request to completion under `policy`.
///
/// Pure over the closure's result type: transient failures burn budget and
/// sleep, permanent failures return immediately, and the final transient
/// failure is returned once the budget is spent.
pub fn call_with_retry<T>(
    policy: &RetryPolicy,
    mut request: impl FnMut() -> Result<T, ServiceError>,
) -> Result<T, ServiceError> {
    let attempts = policy.max_retries.max(1);
    let mut last_err = None;
    for attempt in 1..=attempts {
        match request() {
            Ok(value) => return Ok(value),
            Err(ServiceError::Transient { reason }) => {
                warn!("attempt {attempt}/{attempts} failed transiently: {reason}");
                last_err = Some(ServiceError::Transient { reason });
                if attempt < attempts {
                    std::thread::sleep(policy.delay_for(attempt));
                }
            }
            Err(err @ ServiceError::Permanent { .. }) => return Err(err),
        }
    }
    Err(last_err.unwrap_or(ServiceError::Permanent {
        reason: "no attempts made".to_string(),
    }))
}

// ── The service ──────────────────────────────────────────────────────────

/// Synchronous request/response front over a [`VisionBackend`].
///
/// `generate` is the one entry point builders and processors use; it owns
/// per-image fan-out, retries, response parsing, and usage accounting on the
/// originating block.
pub struct VisionService {
    backend: Box<dyn VisionBackend + Send + Sync>,
    policy: RetryPolicy,
}

impl VisionService {
    pub fn new(backend: Box<dyn VisionBackend + Send + Sync>, policy: RetryPolicy) -> Self {
        Self { backend, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Send `prompt` (optionally with images) and return parsed results.
    ///
    /// * Zero images: a single text-only request under the shared retry
    ///   policy; at most one parsed result.
    /// * N images: one request per image, sent sequentially. Results from
    ///   earlier images survive a later image's failure.
    ///
    /// Usage counters on `block` reflect successful requests only. An empty
    /// return means "nothing to apply" — callers must not treat it as an
    /// error.
    pub fn generate(&self, prompt: &str, images: &[ImageData], block: &mut Block) -> Vec<Value> {
        let mut results = Vec::new();
        let mut total_tokens = 0u64;
        let mut ok_requests = 0u64;

        if images.is_empty() {
            match call_with_retry(&self.policy, || self.backend.send(prompt, None)) {
                Ok(response) => {
                    total_tokens += response.total_tokens;
                    ok_requests += 1;
                    results.push(parse_response_content(&response.content));
                }
                Err(e) => warn!("text-only request for block {} failed: {e}", block.id),
            }
        } else {
            for (idx, image) in images.iter().enumerate() {
                match call_with_retry(&self.policy, || self.backend.send(prompt, Some(image))) {
                    Ok(response) => {
                        total_tokens += response.total_tokens;
                        ok_requests += 1;
                        results.push(parse_response_content(&response.content));
                    }
                    Err(e) => {
                        // Keep whatever earlier images produced.
                        warn!(
                            "image {}/{} for block {} failed: {e}",
                            idx + 1,
                            images.len(),
                            block.id
                        );
                    }
                }
            }
        }

        block.metadata.record_llm_usage(total_tokens, ok_requests);
        results
    }
}

// ── Response parsing ─────────────────────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```(?:json|markdown)?\n(.*)\n```\s*$").unwrap());

/// Strip model-emitted artefacts that would break JSON parsing: outer code
/// fences and invisible Unicode (zero-width spaces, BOM, soft hyphens).
fn clean_response(content: &str) -> String {
    let trimmed = content.trim();
    let unfenced = match RE_OUTER_FENCES.captures(trimmed) {
        Some(caps) => caps[1].to_string(),
        None => trimmed.to_string(),
    };
    unfenced.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}

/// Parse a response body as JSON where possible, falling back to the raw
/// cleaned text so plain-text answers are still usable.
fn parse_response_content(content: &str) -> Value {
    let cleaned = clean_response(content);
    match serde_json::from_str::<Value>(&cleaned) {
        Ok(v @ (Value::Object(_) | Value::Array(_))) => v,
        _ => Value::String(cleaned),
    }
}

/// Pull the usable text out of a parsed result.
///
/// Accepts plain strings and the `{"text": …}` / `{"description": …}`
/// shapes structured prompts ask for. Returns `None` when nothing usable is
/// present (the caller applies nothing).
pub fn extract_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Object(map) => map
            .get("text")
            .or_else(|| map.get("description"))
            .and_then(Value::as_str)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty()),
        _ => None,
    }
}
