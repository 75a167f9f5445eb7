//! Slack HTTP callbacks: `POST /slack/events` and `POST /slack/commands`.
//!
//! Every request is checked against the signing secret before its body is decoded. Dispatch
//! runs on its own task; the command route holds the HTTP response until the handler
//! acknowledges (or the ack deadline passes) so Slack sees a 200 inside its three-second window.

use std::{
    future::Future,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use chrono::Utc;
use imagine_slack::{
    events::{Acknowledger, EventContext, EventDispatcher, SlackEnvelope},
    payload::{
        envelope_from_callback, envelope_from_command, is_ssl_check, parse_events_api_body,
        parse_slash_command_body, EventsApiRequest, PayloadError,
    },
    signature::{verify_request_signature, SignatureError, SIGNATURE_HEADER, TIMESTAMP_HEADER},
};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct WebhookState {
    signing_secret: SecretString,
    dispatcher: Arc<EventDispatcher>,
    ack_timeout: Duration,
    in_flight: InFlightTasks,
}

impl WebhookState {
    pub fn new(
        signing_secret: SecretString,
        dispatcher: Arc<EventDispatcher>,
        ack_timeout: Duration,
        in_flight: InFlightTasks,
    ) -> Self {
        Self { signing_secret, dispatcher, ack_timeout, in_flight }
    }

    fn spawn_dispatch(&self, envelope: SlackEnvelope, ctx: EventContext) {
        let dispatcher = self.dispatcher.clone();
        self.in_flight.spawn(async move {
            match dispatcher.dispatch(&envelope, &ctx).await {
                Ok(result) => debug!(
                    event_name = "slack.dispatch.completed",
                    correlation_id = %ctx.correlation_id,
                    event_type = ?envelope.event.event_type(),
                    result = ?result,
                    "slack envelope dispatched"
                ),
                Err(error) => warn!(
                    event_name = "slack.dispatch.failed",
                    correlation_id = %ctx.correlation_id,
                    event_type = ?envelope.event.event_type(),
                    error = %error,
                    "slack handler failed"
                ),
            }
        });
    }
}

/// Dispatch tasks that may still be running after their HTTP response went out.
#[derive(Clone, Default)]
pub struct InFlightTasks {
    tasks: Arc<Mutex<JoinSet<()>>>,
}

impl InFlightTasks {
    fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        while tasks.try_join_next().is_some() {}
        tasks.spawn(task);
    }

    /// Waits up to `timeout` for running tasks, aborts the rest and returns how many were cut off.
    pub async fn drain(&self, timeout: Duration) -> usize {
        let mut tasks =
            std::mem::take(&mut *self.tasks.lock().unwrap_or_else(PoisonError::into_inner));

        let finished =
            tokio::time::timeout(timeout, async { while tasks.join_next().await.is_some() {} })
                .await;
        if finished.is_ok() {
            return 0;
        }

        let abandoned = tasks.len();
        tasks.abort_all();
        abandoned
    }
}

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error(transparent)]
    Signature(#[from] SignatureError),
    #[error(transparent)]
    Payload(#[from] PayloadError),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let status = match self {
            Self::Signature(_) => StatusCode::UNAUTHORIZED,
            Self::Payload(_) => StatusCode::BAD_REQUEST,
        };
        warn!(
            event_name = "slack.webhook.rejected",
            status = status.as_u16(),
            error = %self,
            "rejected slack webhook"
        );
        (status, Json(ErrorBody { error: self.to_string() })).into_response()
    }
}

pub fn router(state: WebhookState) -> Router {
    Router::new()
        .route("/slack/events", post(events))
        .route("/slack/commands", post(commands))
        .with_state(state)
}

async fn events(
    State(state): State<WebhookState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, WebhookError> {
    verify(&state, &headers, &body)?;

    match parse_events_api_body(&body)? {
        EventsApiRequest::UrlVerification { challenge } => {
            Ok(Json(json!({ "challenge": challenge })).into_response())
        }
        EventsApiRequest::EventCallback { event_id, event } => {
            let envelope = envelope_from_callback(event_id, event, new_correlation_id)?;
            let ctx = EventContext::new(envelope.envelope_id.clone(), Acknowledger::default());
            state.spawn_dispatch(envelope, ctx);
            Ok(StatusCode::OK.into_response())
        }
        EventsApiRequest::Unsupported => Ok(StatusCode::OK.into_response()),
    }
}

async fn commands(
    State(state): State<WebhookState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, WebhookError> {
    verify(&state, &headers, &body)?;
    if is_ssl_check(&body) {
        debug!(event_name = "slack.command.ssl_check", "answered slack ssl check");
        return Ok(StatusCode::OK);
    }

    let envelope = envelope_from_command(parse_slash_command_body(&body)?, new_correlation_id);
    let correlation_id = envelope.envelope_id.clone();
    let (ack, acknowledged) = Acknowledger::channel();
    state.spawn_dispatch(envelope, EventContext::new(correlation_id.clone(), ack));

    match tokio::time::timeout(state.ack_timeout, acknowledged).await {
        Ok(Ok(())) => {}
        Ok(Err(_)) => debug!(
            event_name = "slack.command.unacknowledged",
            correlation_id = %correlation_id,
            "handler finished without acknowledging"
        ),
        Err(_) => warn!(
            event_name = "slack.command.ack_timeout",
            correlation_id = %correlation_id,
            ack_timeout_ms = state.ack_timeout.as_millis() as u64,
            "handler did not acknowledge before the deadline"
        ),
    }

    Ok(StatusCode::OK)
}

fn verify(state: &WebhookState, headers: &HeaderMap, body: &[u8]) -> Result<(), SignatureError> {
    let (Some(timestamp), Some(signature)) =
        (header_value(headers, TIMESTAMP_HEADER), header_value(headers, SIGNATURE_HEADER))
    else {
        return Err(SignatureError::MissingHeaders);
    };

    verify_request_signature(
        state.signing_secret.expose_secret(),
        timestamp,
        body,
        signature,
        Utc::now().timestamp(),
    )
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

fn new_correlation_id() -> String {
    Uuid::new_v4().to_string()
}
