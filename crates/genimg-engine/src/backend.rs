use std::time::Duration;

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use genimg_contracts::config::non_empty_env;
use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use serde_json::{json, Value};

use crate::payload::{ImagePayload, SourceImage};
use crate::remote_store::truncate_text;

const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_IMAGE_MODEL: &str = "gemini-2.0-flash-exp-image-generation";
const DEFAULT_TEXT_MODEL: &str = "gemini-1.5-flash";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(90);

/// The generative model behind the tools.
pub trait GenerativeBackend: Send + Sync {
    fn name(&self) -> &str;
    fn generate_image(&self, prompt: &str, source: Option<&SourceImage>) -> Result<ImagePayload>;
    fn complete_text(&self, prompt: &str) -> Result<String>;
}

#[derive(Clone)]
pub struct GeminiBackend {
    api_base: String,
    api_key: Option<String>,
    image_model: String,
    text_model: String,
    http: HttpClient,
}

impl GeminiBackend {
    pub fn new(api_base: impl Into<String>, api_key: Option<String>) -> Result<Self> {
        let http = HttpClient::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to build Gemini HTTP client")?;
        Ok(Self::with_http_client(api_base, api_key, http))
    }

    pub fn with_http_client(
        api_base: impl Into<String>,
        api_key: Option<String>,
        http: HttpClient,
    ) -> Self {
        Self {
            api_base: api_base.into().trim().trim_end_matches('/').to_string(),
            api_key,
            image_model: DEFAULT_IMAGE_MODEL.to_string(),
            text_model: DEFAULT_TEXT_MODEL.to_string(),
            http,
        }
    }

    pub fn from_env() -> Result<Self> {
        let api_base = non_empty_env("GEMINI_API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.to_string());
        let api_key = non_empty_env("GEMINI_API_KEY").or_else(|| non_empty_env("GOOGLE_API_KEY"));
        if api_key.is_none() {
            tracing::warn!("GEMINI_API_KEY / GOOGLE_API_KEY not set; generation calls will fail");
        }
        let mut backend = Self::new(api_base, api_key)?;
        if let Some(model) = non_empty_env("GEMINI_IMAGE_MODEL") {
            backend.image_model = model;
        }
        if let Some(model) = non_empty_env("GEMINI_TEXT_MODEL") {
            backend.text_model = model;
        }
        Ok(backend)
    }

    pub fn with_models(mut self, image_model: &str, text_model: &str) -> Self {
        self.image_model = image_model.to_string();
        self.text_model = text_model.to_string();
        self
    }

    fn endpoint_for_model(&self, model: &str) -> String {
        let trimmed = model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!("{}/{}:generateContent", self.api_base, model_path)
    }

    fn post(&self, model: &str, payload: &Value) -> Result<Value> {
        let Some(api_key) = self.api_key.as_deref() else {
            bail!("GEMINI_API_KEY environment variable not set");
        };
        let endpoint = self.endpoint_for_model(model);
        let response = self
            .http
            .post(&endpoint)
            .query(&[("key", api_key)])
            .timeout(REQUEST_TIMEOUT)
            .json(payload)
            .send()
            .map_err(reqwest::Error::without_url)
            .with_context(|| format!("Gemini request failed ({model})"))?;
        let parsed = response_json_or_error("Gemini", response)?;
        tracing::info!(model, "response received from Gemini");
        Ok(parsed)
    }
}

impl GenerativeBackend for GeminiBackend {
    fn name(&self) -> &str {
        "gemini"
    }

    fn generate_image(&self, prompt: &str, source: Option<&SourceImage>) -> Result<ImagePayload> {
        let mut parts = vec![json!({ "text": prompt })];
        if let Some(source) = source {
            parts.push(json!({
                "inlineData": {
                    "mimeType": source.mime_type,
                    "data": BASE64.encode(&source.bytes),
                }
            }));
        }
        let payload = json!({
            "contents": [{ "role": "user", "parts": parts }],
            "generationConfig": { "responseModalities": ["TEXT", "IMAGE"] },
        });
        let response = self.post(&self.image_model, &payload)?;
        extract_image(&response)
    }

    fn complete_text(&self, prompt: &str) -> Result<String> {
        let payload = json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
        });
        let response = self.post(&self.text_model, &payload)?;
        extract_text(&response)
    }
}

fn candidate_parts(response: &Value) -> Vec<Value> {
    response
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|candidates| candidates.first())
        .and_then(|candidate| candidate.get("content"))
        .and_then(|content| content.get("parts"))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

fn extract_image(response: &Value) -> Result<ImagePayload> {
    for part in candidate_parts(response) {
        let Some(inline) = part
            .get("inlineData")
            .or_else(|| part.get("inline_data"))
            .and_then(Value::as_object)
        else {
            continue;
        };
        let data = inline.get("data").and_then(Value::as_str).unwrap_or_default();
        if data.is_empty() {
            continue;
        }
        let bytes = BASE64
            .decode(data.as_bytes())
            .context("Gemini image base64 decode failed")?;
        return Ok(ImagePayload::new(bytes));
    }
    bail!("no image data found in Gemini response")
}

fn extract_text(response: &Value) -> Result<String> {
    let text = candidate_parts(response)
        .first()
        .and_then(|part| part.get("text"))
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or_default()
        .to_string();
    if text.is_empty() {
        bail!("no text found in Gemini response");
    }
    Ok(text)
}

fn response_json_or_error(provider: &str, response: HttpResponse) -> Result<Value> {
    let status = response.status();
    let code = status.as_u16();
    let body = response
        .text()
        .map_err(reqwest::Error::without_url)
        .with_context(|| format!("{provider} response body read failed"))?;
    if !status.is_success() {
        bail!("{provider} request failed ({code}): {}", truncate_text(&body, 512));
    }
    let parsed: Value = serde_json::from_str(&body)
        .with_context(|| format!("{provider} returned invalid JSON payload"))?;
    Ok(parsed)
}
