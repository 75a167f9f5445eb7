use std::{sync::Arc, time::Duration};

use axum::Router;
use imagine_core::{config::AppConfig, ImageGenerationError};
use imagine_openai::OpenAiImageGenerator;
use imagine_slack::{
    api::SlackWebClient,
    events::{imagine_dispatcher, EventDispatcher},
};
use reqwest::Client;
use thiserror::Error;
use tracing::info;

use crate::{
    health::{self, HealthState},
    webhook::{self, InFlightTasks, WebhookState},
};

const SLACK_HTTP_TIMEOUT_SECS: u64 = 10;

pub struct Application {
    pub config: AppConfig,
    pub dispatcher: Arc<EventDispatcher>,
    pub in_flight: InFlightTasks,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("slack http client could not be built: {0}")]
    SlackClient(#[source] reqwest::Error),
    #[error("image generator could not be built: {0}")]
    ImageGenerator(#[source] ImageGenerationError),
}

pub fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let http = Client::builder()
        .timeout(Duration::from_secs(SLACK_HTTP_TIMEOUT_SECS))
        .build()
        .map_err(BootstrapError::SlackClient)?;
    let slack = SlackWebClient::new(
        http,
        config.slack.bot_token.clone(),
        config.slack.api_base_url.clone(),
    );
    let generator =
        OpenAiImageGenerator::from_config(&config.openai).map_err(BootstrapError::ImageGenerator)?;

    let dispatcher = imagine_dispatcher(Arc::new(slack), Arc::new(generator));
    info!(
        event_name = "system.bootstrap.handlers_registered",
        correlation_id = "bootstrap",
        handler_count = dispatcher.handler_count(),
        "slack handlers registered"
    );

    let in_flight = InFlightTasks::default();
    Ok(Application { config, dispatcher: Arc::new(dispatcher), in_flight })
}

impl Application {
    /// Webhook routes plus `/health`.
    pub fn router(&self) -> Router {
        let webhook_state = WebhookState::new(
            self.config.slack.signing_secret.clone(),
            self.dispatcher.clone(),
            Duration::from_millis(self.config.server.ack_timeout_ms),
            self.in_flight.clone(),
        );

        webhook::router(webhook_state)
            .merge(health::router(HealthState::starting_now()))
    }
}
