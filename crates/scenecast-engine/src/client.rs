use anyhow::{Context, Result};
use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use scenecast_contracts::gallery::GeneratedImage;
use scenecast_contracts::prompt::{AspectRatio, GenerationRequest};
use scenecast_contracts::slots::SelectedImage;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::EngineConfig;

const API_KEY_HEADER: &str = "x-goog-api-key";

pub const NO_IMAGE_FALLBACK: &str =
    "The model did not return an image. Try rephrasing the prompt or using different references.";

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("GEMINI_API_KEY or GOOGLE_API_KEY not set")]
    MissingApiKey,
    #[error("{provider} request failed ({status}): {message}")]
    Api {
        provider: &'static str,
        status: u16,
        message: String,
    },
    #[error("{0}")]
    NoImageProduced(String),
}

/// Anything that can turn a [`GenerationRequest`] into images.
pub trait ImageProvider: Send + Sync {
    fn name(&self) -> &str;
    fn generate(&self, request: &GenerationRequest) -> Result<Vec<GeneratedImage>>;
}

/// Talks to the Google generative-language REST API: Gemini
/// `generateContent` for composition, Imagen `predict` for text-to-image.
pub struct GoogleGenerationClient {
    config: EngineConfig,
    http: HttpClient,
}

impl GoogleGenerationClient {
    pub fn new(config: EngineConfig) -> Result<Self> {
        let http = HttpClient::builder()
            .timeout(config.request_timeout)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { config, http })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn endpoint(&self, model: &str, method: &str) -> String {
        let trimmed = model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!("{}/{}:{}", self.config.api_base, model_path, method)
    }

    fn post(&self, provider: &'static str, endpoint: &str, payload: &Value) -> Result<Value> {
        let api_key = self.config.require_api_key()?;
        debug!(provider, endpoint, "posting generation payload");
        let response = self
            .http
            .post(endpoint)
            .header(API_KEY_HEADER, api_key)
            .json(payload)
            .send()
            .map_err(reqwest::Error::without_url)
            .with_context(|| format!("{provider} request failed ({endpoint})"))?;
        response_json_or_error(provider, response)
    }

    fn compose(&self, images: &[SelectedImage], prompt: &str) -> Result<Vec<GeneratedImage>> {
        let endpoint = self.endpoint(&self.config.composition_model, "generateContent");
        let payload = build_composition_payload(images, prompt);
        let response = self.post("Gemini", &endpoint, &payload)?;
        Ok(extract_composition_images(&response)?)
    }

    fn text_to_image(
        &self,
        prompt: &str,
        count: u32,
        aspect_ratio: AspectRatio,
        output_mime: &str,
    ) -> Result<Vec<GeneratedImage>> {
        let endpoint = self.endpoint(&self.config.image_model, "predict");
        let payload = build_text_to_image_payload(prompt, count, aspect_ratio, output_mime);
        let response = self.post("Imagen", &endpoint, &payload)?;
        Ok(extract_predictions(&response))
    }
}

impl ImageProvider for GoogleGenerationClient {
    fn name(&self) -> &str {
        "google"
    }

    fn generate(&self, request: &GenerationRequest) -> Result<Vec<GeneratedImage>> {
        match request {
            GenerationRequest::Composition { images, prompt } => {
                info!(
                    model = %self.config.composition_model,
                    references = images.len(),
                    "requesting image composition"
                );
                self.compose(images, prompt)
            }
            GenerationRequest::TextToImage {
                prompt,
                count,
                aspect_ratio,
                output_mime,
            } => {
                info!(
                    model = %self.config.image_model,
                    count,
                    aspect_ratio = %aspect_ratio,
                    "requesting text-to-image generation"
                );
                self.text_to_image(prompt, *count, *aspect_ratio, output_mime)
            }
        }
    }
}

pub(crate) fn build_composition_payload(images: &[SelectedImage], prompt: &str) -> Value {
    let mut parts: Vec<Value> = images
        .iter()
        .map(|entry| {
            json!({
                "inlineData": {
                    "mimeType": entry.image.mime_type,
                    "data": entry.image.data,
                }
            })
        })
        .collect();
    parts.push(json!({ "text": prompt }));

    json!({
        "contents": [{
            "role": "user",
            "parts": parts,
        }],
        "generationConfig": {
            "responseModalities": ["IMAGE", "TEXT"],
        },
    })
}

pub(crate) fn build_text_to_image_payload(
    prompt: &str,
    count: u32,
    aspect_ratio: AspectRatio,
    output_mime: &str,
) -> Value {
    json!({
        "instances": [{
            "prompt": prompt,
        }],
        "parameters": {
            "sampleCount": count,
            "aspectRatio": aspect_ratio.as_str(),
            "outputOptions": {
                "mimeType": output_mime,
            },
        },
    })
}

/// Inline image parts from a `generateContent` response. When there are
/// none the model's own text becomes the error explanation.
pub(crate) fn extract_composition_images(
    response: &Value,
) -> std::result::Result<Vec<GeneratedImage>, GenerationError> {
    let parts = response
        .pointer("/candidates/0/content/parts")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let images: Vec<GeneratedImage> = parts
        .iter()
        .filter_map(|part| {
            part.get("inlineData")
                .or_else(|| part.get("inline_data"))
                .and_then(Value::as_object)
        })
        .map(|inline| GeneratedImage {
            data: inline
                .get("data")
                .and_then(Value::as_str)
                .map(str::to_string),
            mime_type: inline
                .get("mimeType")
                .or_else(|| inline.get("mime_type"))
                .and_then(Value::as_str)
                .map(str::to_string),
        })
        .collect();
    if !images.is_empty() {
        return Ok(images);
    }

    let explanation = parts
        .iter()
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect::<Vec<_>>()
        .join("")
        .trim()
        .to_string();
    if !explanation.is_empty() {
        return Err(GenerationError::NoImageProduced(explanation));
    }

    let block_reason = response
        .pointer("/promptFeedback/blockReason")
        .and_then(Value::as_str)
        .or_else(|| {
            response
                .pointer("/candidates/0/finishReason")
                .and_then(Value::as_str)
                .filter(|reason| *reason != "STOP")
        });
    match block_reason {
        Some(reason) => Err(GenerationError::NoImageProduced(format!(
            "{NO_IMAGE_FALLBACK} (reason: {reason})"
        ))),
        None => Err(GenerationError::NoImageProduced(
            NO_IMAGE_FALLBACK.to_string(),
        )),
    }
}

/// Every Imagen prediction, in order. Filtered predictions come back
/// without bytes and are kept as-is.
pub(crate) fn extract_predictions(response: &Value) -> Vec<GeneratedImage> {
    response
        .get("predictions")
        .and_then(Value::as_array)
        .map(|predictions| {
            predictions
                .iter()
                .map(|row| GeneratedImage {
                    data: row
                        .get("bytesBase64Encoded")
                        .or_else(|| row.get("bytes_base64_encoded"))
                        .and_then(Value::as_str)
                        .map(str::to_string),
                    mime_type: row
                        .get("mimeType")
                        .or_else(|| row.get("mime_type"))
                        .and_then(Value::as_str)
                        .map(str::to_string),
                })
                .collect()
        })
        .unwrap_or_default()
}

fn response_json_or_error(provider: &'static str, response: HttpResponse) -> Result<Value> {
    let status = response.status();
    let body = response
        .text()
        .with_context(|| format!("{provider} response body read failed"))?;
    if !status.is_success() {
        return Err(GenerationError::Api {
            provider,
            status: status.as_u16(),
            message: api_error_message(&body),
        }
        .into());
    }
    let parsed: Value = serde_json::from_str(&body)
        .with_context(|| format!("{provider} returned invalid JSON payload"))?;
    Ok(parsed)
}

fn api_error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|json| {
            json.pointer("/error/message")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .filter(|message| !message.trim().is_empty())
        .unwrap_or_else(|| truncate_text(body.trim(), 512))
}

fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}
