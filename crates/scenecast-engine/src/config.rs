use std::env;
use std::time::Duration;

use crate::client::GenerationError;

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_COMPOSITION_MODEL: &str = "gemini-2.5-flash-image-preview";
pub const DEFAULT_IMAGE_MODEL: &str = "imagen-4.0-generate-001";

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub api_key: Option<String>,
    pub api_base: String,
    pub composition_model: String,
    pub image_model: String,
    /// `None` leaves requests without a deadline.
    pub request_timeout: Option<Duration>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: DEFAULT_API_BASE.to_string(),
            composition_model: DEFAULT_COMPOSITION_MODEL.to_string(),
            image_model: DEFAULT_IMAGE_MODEL.to_string(),
            request_timeout: None,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(non_empty_env)
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            api_key: lookup("GEMINI_API_KEY").or_else(|| lookup("GOOGLE_API_KEY")),
            api_base: lookup("GEMINI_API_BASE")
                .map(|value| value.trim_end_matches('/').to_string())
                .filter(|value| !value.is_empty())
                .unwrap_or(defaults.api_base),
            composition_model: lookup("SCENECAST_COMPOSITION_MODEL")
                .unwrap_or(defaults.composition_model),
            image_model: lookup("SCENECAST_IMAGE_MODEL").unwrap_or(defaults.image_model),
            request_timeout: lookup("SCENECAST_REQUEST_TIMEOUT_SECS")
                .and_then(|raw| raw.parse::<f64>().ok())
                .filter(|secs| secs.is_finite() && *secs > 0.0)
                .map(Duration::from_secs_f64),
        }
    }

    pub fn with_composition_model(mut self, model: Option<String>) -> Self {
        if let Some(model) = model.filter(|value| !value.trim().is_empty()) {
            self.composition_model = model.trim().to_string();
        }
        self
    }

    pub fn with_image_model(mut self, model: Option<String>) -> Self {
        if let Some(model) = model.filter(|value| !value.trim().is_empty()) {
            self.image_model = model.trim().to_string();
        }
        self
    }

    pub fn require_api_key(&self) -> Result<&str, GenerationError> {
        self.api_key
            .as_deref()
            .ok_or(GenerationError::MissingApiKey)
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
