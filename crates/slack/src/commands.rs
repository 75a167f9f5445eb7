use imagine_core::ImagePrompt;
use serde::Deserialize;
use thiserror::Error;

pub const IMAGINE_COMMAND: &str = "/imagine";

/// Form fields Slack posts for a slash command invocation.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct SlashCommandPayload {
    pub command: String,
    #[serde(default)]
    pub text: String,
    pub user_id: String,
    #[serde(default)]
    pub channel_id: String,
    pub response_url: String,
    #[serde(default)]
    pub trigger_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ImagineCommand {
    Generate { prompt: ImagePrompt, user_id: String, response_url: String },
    Usage { response_url: String },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandParseError {
    #[error("unsupported slash command: {0}")]
    UnsupportedCommand(String),
    #[error("slash command is missing a response_url")]
    MissingResponseUrl,
}

pub fn parse_imagine_command(
    payload: &SlashCommandPayload,
) -> Result<ImagineCommand, CommandParseError> {
    if payload.command.trim() != IMAGINE_COMMAND {
        return Err(CommandParseError::UnsupportedCommand(payload.command.clone()));
    }
    if payload.response_url.trim().is_empty() {
        return Err(CommandParseError::MissingResponseUrl);
    }

    let response_url = payload.response_url.clone();
    Ok(match ImagePrompt::new(payload.text.as_str()) {
        Some(prompt) => {
            ImagineCommand::Generate { prompt, user_id: payload.user_id.clone(), response_url }
        }
        None => ImagineCommand::Usage { response_url },
    })
}
