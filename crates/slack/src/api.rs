//! Outbound calls to the Slack Web API and slash-command response URLs.

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::blocks::{CommandResponse, HomeView, MessageTemplate};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SlackApiError {
    #[error("slack request failed: {0}")]
    Transport(String),
    #[error("slack returned http status {0}")]
    Status(u16),
    #[error("slack api error: {0}")]
    Api(String),
    #[error("could not decode slack response: {0}")]
    Decode(String),
}

#[async_trait]
pub trait SlackClient: Send + Sync {
    /// `views.publish` for the given user's Home tab.
    async fn publish_view(&self, user_id: &str, view: &HomeView) -> Result<(), SlackApiError>;

    /// `chat.postMessage` into a channel.
    async fn post_message(
        &self,
        channel_id: &str,
        message: &MessageTemplate,
    ) -> Result<(), SlackApiError>;

    /// POST to a slash command `response_url`.
    async fn respond(
        &self,
        response_url: &str,
        response: &CommandResponse,
    ) -> Result<(), SlackApiError>;
}

#[derive(Serialize)]
struct PublishViewRequest<'a> {
    user_id: &'a str,
    view: &'a HomeView,
}

#[derive(Serialize)]
struct PostMessageRequest<'a> {
    channel: &'a str,
    #[serde(flatten)]
    message: &'a MessageTemplate,
}

#[derive(Debug, Deserialize)]
struct SlackResponse {
    ok: bool,
    error: Option<String>,
}

pub struct SlackWebClient {
    client: Client,
    bot_token: SecretString,
    api_base_url: String,
}

impl SlackWebClient {
    pub fn new(client: Client, bot_token: SecretString, api_base_url: impl Into<String>) -> Self {
        let api_base_url = api_base_url.into().trim_end_matches('/').to_owned();
        Self { client, bot_token, api_base_url }
    }

    async fn call_method<T>(&self, method: &str, body: &T) -> Result<(), SlackApiError>
    where
        T: Serialize + Sync,
    {
        let response = self
            .client
            .post(format!("{}/{method}", self.api_base_url))
            .bearer_auth(self.bot_token.expose_secret())
            .json(body)
            .send()
            .await
            .map_err(|error| SlackApiError::Transport(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SlackApiError::Status(status.as_u16()));
        }

        let parsed: SlackResponse =
            response.json().await.map_err(|error| SlackApiError::Decode(error.to_string()))?;
        if !parsed.ok {
            return Err(SlackApiError::Api(parsed.error.unwrap_or_else(|| "unknown error".into())));
        }

        debug!(method, "slack api call succeeded");
        Ok(())
    }
}

#[async_trait]
impl SlackClient for SlackWebClient {
    async fn publish_view(&self, user_id: &str, view: &HomeView) -> Result<(), SlackApiError> {
        self.call_method("views.publish", &PublishViewRequest { user_id, view }).await
    }

    async fn post_message(
        &self,
        channel_id: &str,
        message: &MessageTemplate,
    ) -> Result<(), SlackApiError> {
        self.call_method("chat.postMessage", &PostMessageRequest { channel: channel_id, message })
            .await
    }

    async fn respond(
        &self,
        response_url: &str,
        response: &CommandResponse,
    ) -> Result<(), SlackApiError> {
        // Response URLs are pre-authorised and answer with a plain-text body, not the
        // Web API `{ok, error}` envelope.
        let result = self
            .client
            .post(response_url)
            .json(response)
            .send()
            .await
            .map_err(|error| SlackApiError::Transport(error.to_string()))?;

        let status = result.status();
        if !status.is_success() {
            return Err(SlackApiError::Status(status.as_u16()));
        }
        Ok(())
    }
}
