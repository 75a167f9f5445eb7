use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::{
    commands::SlashCommandPayload,
    events::{AppMentionEvent, HomeOpenedEvent, SlackEnvelope, SlackEvent},
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PayloadError {
    #[error("invalid events api body: {0}")]
    InvalidJson(String),
    #[error("invalid slash command form: {0}")]
    InvalidForm(String),
    #[error("event callback has no `type`")]
    MissingEventType,
    #[error("invalid `{event_type}` event: {message}")]
    InvalidEvent { event_type: String, message: String },
}

/// Top-level body of an Events API request.
#[derive(Debug, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventsApiRequest {
    UrlVerification {
        challenge: String,
    },
    EventCallback {
        #[serde(default)]
        event_id: Option<String>,
        event: Value,
    },
    #[serde(other)]
    Unsupported,
}

#[derive(Deserialize)]
struct SslCheckForm {
    #[serde(default)]
    ssl_check: Option<String>,
}

#[derive(Deserialize)]
struct AppHomeOpenedFields {
    user: String,
}

#[derive(Deserialize)]
struct AppMentionFields {
    user: String,
    channel: String,
}

pub fn parse_events_api_body(body: &[u8]) -> Result<EventsApiRequest, PayloadError> {
    serde_json::from_slice(body).map_err(|error| PayloadError::InvalidJson(error.to_string()))
}

pub fn parse_slash_command_body(body: &[u8]) -> Result<SlashCommandPayload, PayloadError> {
    serde_urlencoded::from_bytes(body).map_err(|error| PayloadError::InvalidForm(error.to_string()))
}

/// Slack periodically posts `ssl_check=1` to command URLs to verify the certificate.
pub fn is_ssl_check(body: &[u8]) -> bool {
    serde_urlencoded::from_bytes::<SslCheckForm>(body)
        .is_ok_and(|form| form.ssl_check.as_deref() == Some("1"))
}

pub fn event_from_callback(event: Value) -> Result<SlackEvent, PayloadError> {
    let event_type =
        event.get("type").and_then(Value::as_str).ok_or(PayloadError::MissingEventType)?.to_owned();

    match event_type.as_str() {
        "app_home_opened" => {
            let fields: AppHomeOpenedFields =
                serde_json::from_value(event).map_err(|error| invalid(&event_type, error))?;
            Ok(SlackEvent::HomeOpened(HomeOpenedEvent { user_id: fields.user }))
        }
        "app_mention" => {
            let fields: AppMentionFields =
                serde_json::from_value(event).map_err(|error| invalid(&event_type, error))?;
            Ok(SlackEvent::AppMention(AppMentionEvent {
                channel_id: fields.channel,
                user_id: fields.user,
            }))
        }
        _ => Ok(SlackEvent::Unsupported { event_type }),
    }
}

pub fn envelope_from_callback(
    event_id: Option<String>,
    event: Value,
    fallback_id: impl FnOnce() -> String,
) -> Result<SlackEnvelope, PayloadError> {
    let event = event_from_callback(event)?;
    Ok(SlackEnvelope { envelope_id: event_id.unwrap_or_else(fallback_id), event })
}

pub fn envelope_from_command(
    payload: SlashCommandPayload,
    fallback_id: impl FnOnce() -> String,
) -> SlackEnvelope {
    let envelope_id =
        if payload.trigger_id.is_empty() { fallback_id() } else { payload.trigger_id.clone() };
    SlackEnvelope { envelope_id, event: SlackEvent::SlashCommand(payload) }
}

fn invalid(event_type: &str, error: serde_json::Error) -> PayloadError {
    PayloadError::InvalidEvent { event_type: event_type.to_owned(), message: error.to_string() }
}
