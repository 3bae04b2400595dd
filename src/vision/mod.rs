//! Cloud text detection used when local recognition finds no era date.

mod retry;

use anyhow::{Result, anyhow};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Deserialize;
use serde_json::json;
use std::future::Future;
use std::pin::Pin;
use tracing::debug;

use retry::{
    RATE_LIMIT_BASE_DELAY, RATE_LIMIT_MAX_RETRIES, is_rate_limited, retry_after, wait_with_backoff,
};

const ANNOTATE_URL: &str = "https://vision.googleapis.com/v1/images:annotate";

pub type AnnotateFuture<'a> = Pin<Box<dyn Future<Output = Result<Option<String>>> + Send + 'a>>;

pub trait CloudRecognizer: Send + Sync {
    /// Returns the detected text, `None` when the service found none.
    fn annotate<'a>(
        &'a self,
        credential: &'a str,
        image: &'a [u8],
        language_hint: &'a str,
    ) -> AnnotateFuture<'a>;
}

/// Google Cloud Vision `images:annotate` with `TEXT_DETECTION`.
#[derive(Debug, Clone)]
pub struct GoogleVision {
    client: reqwest::Client,
    endpoint: String,
}

impl Default for GoogleVision {
    fn default() -> Self {
        Self::new()
    }
}

impl GoogleVision {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: ANNOTATE_URL.to_string(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        let endpoint = endpoint.into();
        if !endpoint.trim().is_empty() {
            self.endpoint = endpoint;
        }
        self
    }
}

impl CloudRecognizer for GoogleVision {
    fn annotate<'a>(
        &'a self,
        credential: &'a str,
        image: &'a [u8],
        language_hint: &'a str,
    ) -> AnnotateFuture<'a> {
        Box::pin(async move {
            let body = json!({
                "requests": [
                    {
                        "image": { "content": BASE64.encode(image) },
                        "features": [{ "type": "TEXT_DETECTION" }],
                        "imageContext": { "languageHints": [language_hint] }
                    }
                ]
            });

            let mut attempt = 0usize;
            let mut delay = RATE_LIMIT_BASE_DELAY;
            loop {
                attempt += 1;
                let response = self
                    .client
                    .post(&self.endpoint)
                    .query(&[("key", credential)])
                    .json(&body)
                    .send()
                    .await?;

                let status = response.status();
                let retry_after = retry_after(response.headers());
                let text = response.text().await.unwrap_or_default();
                if status.is_success() {
                    let detected = extract_text(&text)?;
                    debug!(
                        "Vision returned {} chars",
                        detected.as_deref().map_or(0, |t| t.chars().count())
                    );
                    return Ok(detected);
                }
                if is_rate_limited(status, &text) && attempt < RATE_LIMIT_MAX_RETRIES {
                    delay = wait_with_backoff(attempt, delay, retry_after).await;
                    continue;
                }
                return Err(anyhow!(
                    "Vision API error ({}): {}",
                    status,
                    extract_error(&text).unwrap_or(text)
                ));
            }
        })
    }
}

pub(crate) fn extract_text(body: &str) -> Result<Option<String>> {
    let payload: AnnotateResponse = serde_json::from_str(body)
        .map_err(|err| anyhow!("failed to parse Vision response JSON: {}", err))?;
    let Some(response) = payload.responses.into_iter().next() else {
        return Ok(None);
    };
    if let Some(error) = response.error {
        return Err(anyhow!(
            "Vision request failed: {}",
            error.message.unwrap_or_else(|| "unknown error".to_string())
        ));
    }
    let text = response
        .full_text_annotation
        .and_then(|annotation| annotation.text)
        .or_else(|| {
            response
                .text_annotations
                .into_iter()
                .find_map(|annotation| annotation.description)
        })
        .filter(|text| !text.trim().is_empty());
    Ok(text)
}

fn extract_error(body: &str) -> Option<String> {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: Option<VisionError>,
    }

    let parsed: ErrorBody = serde_json::from_str(body).ok()?;
    let error = parsed.error?;
    let mut parts = Vec::new();
    if let Some(message) = error.message
        && !message.trim().is_empty()
    {
        parts.push(message);
    }
    if let Some(status) = error.status
        && !status.trim().is_empty()
    {
        parts.push(format!("status: {}", status));
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(" | "))
    }
}

#[derive(Debug, Deserialize)]
struct AnnotateResponse {
    #[serde(default)]
    responses: Vec<ImageResponse>,
}

#[derive(Debug, Deserialize)]
struct ImageResponse {
    #[serde(rename = "fullTextAnnotation")]
    full_text_annotation: Option<FullTextAnnotation>,
    #[serde(rename = "textAnnotations", default)]
    text_annotations: Vec<TextAnnotation>,
    error: Option<VisionError>,
}

#[derive(Debug, Deserialize)]
struct FullTextAnnotation {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TextAnnotation {
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VisionError {
    message: Option<String>,
    status: Option<String>,
}
