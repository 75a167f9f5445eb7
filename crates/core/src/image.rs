use std::fmt;

use async_trait::async_trait;
use thiserror::Error;

/// Text describing the image a user wants generated.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImagePrompt(String);

impl ImagePrompt {
    /// Returns `None` when the prompt is blank. Otherwise the text is kept exactly as typed.
    pub fn new(text: impl Into<String>) -> Option<Self> {
        let text = text.into();
        if text.trim().is_empty() {
            return None;
        }
        Some(Self(text))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ImagePrompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageResult {
    pub url: String,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ImageGenerationError {
    #[error("image request failed: {0}")]
    Request(String),
    #[error("image api returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("could not decode image api response: {0}")]
    Decode(String),
    #[error("image api returned no images")]
    EmptyResponse,
}

/// Turns a prompt into a hosted image URL.
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate(&self, prompt: &ImagePrompt) -> Result<ImageResult, ImageGenerationError>;
}
