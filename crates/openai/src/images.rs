use std::time::Duration;

use async_trait::async_trait;
use imagine_core::{
    config::OpenAiConfig, ImageGenerationError, ImageGenerator, ImagePrompt, ImageResult,
};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;

const ORGANIZATION_HEADER: &str = "OpenAI-Organization";

/// Every request asks for exactly one image at a fixed resolution.
const IMAGES_PER_REQUEST: u8 = 1;
const IMAGE_SIZE: &str = "512x512";

#[derive(Debug, Serialize)]
struct GenerationRequest<'a> {
    prompt: &'a str,
    n: u8,
    size: &'static str,
}

#[derive(Debug, Deserialize)]
struct GenerationResponse {
    #[serde(default)]
    data: Vec<GeneratedImage>,
}

#[derive(Debug, Deserialize)]
struct GeneratedImage {
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

pub struct OpenAiImageGenerator {
    client: Client,
    api_key: SecretString,
    organization: Option<String>,
    endpoint: String,
}

impl OpenAiImageGenerator {
    pub fn from_config(config: &OpenAiConfig) -> Result<Self, ImageGenerationError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|error| ImageGenerationError::Request(error.to_string()))?;

        Ok(Self::new(
            client,
            config.api_key.clone(),
            config.organization.clone(),
            &config.base_url,
        ))
    }

    pub fn new(
        client: Client,
        api_key: SecretString,
        organization: Option<String>,
        base_url: &str,
    ) -> Self {
        let endpoint = format!("{}/images/generations", base_url.trim_end_matches('/'));
        let organization = organization.filter(|value| !value.trim().is_empty());
        Self { client, api_key, organization, endpoint }
    }
}

#[async_trait]
impl ImageGenerator for OpenAiImageGenerator {
    async fn generate(&self, prompt: &ImagePrompt) -> Result<ImageResult, ImageGenerationError> {
        let body =
            GenerationRequest { prompt: prompt.as_str(), n: IMAGES_PER_REQUEST, size: IMAGE_SIZE };

        debug!(
            endpoint = %self.endpoint,
            size = IMAGE_SIZE,
            prompt_len = prompt.as_str().len(),
            "sending image generation request to OpenAI"
        );

        let mut request =
            self.client.post(&self.endpoint).bearer_auth(self.api_key.expose_secret()).json(&body);
        if let Some(organization) = &self.organization {
            request = request.header(ORGANIZATION_HEADER, organization);
        }

        let response = request
            .send()
            .await
            .map_err(|error| ImageGenerationError::Request(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let raw = response
                .text()
                .await
                .unwrap_or_else(|_| "failed to read error body".to_string());
            let message = serde_json::from_str::<ErrorResponse>(&raw)
                .map(|parsed| parsed.error.message)
                .unwrap_or(raw);
            return Err(ImageGenerationError::Api { status: status.as_u16(), message });
        }

        let parsed: GenerationResponse = response
            .json()
            .await
            .map_err(|error| ImageGenerationError::Decode(error.to_string()))?;

        let url = parsed
            .data
            .into_iter()
            .next()
            .and_then(|image| image.url)
            .ok_or(ImageGenerationError::EmptyResponse)?;

        debug!(url = %url, "received generated image");
        Ok(ImageResult { url })
    }
}
