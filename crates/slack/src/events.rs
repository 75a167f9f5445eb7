use std::{
    collections::HashMap,
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
};

use async_trait::async_trait;
use imagine_core::{ImageGenerationError, ImageGenerator};
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, info};

use crate::{
    api::{SlackApiError, SlackClient},
    blocks::{self, CommandResponse},
    commands::{parse_imagine_command, CommandParseError, ImagineCommand, SlashCommandPayload},
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlackEnvelope {
    pub envelope_id: String,
    pub event: SlackEvent,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SlackEvent {
    HomeOpened(HomeOpenedEvent),
    AppMention(AppMentionEvent),
    SlashCommand(SlashCommandPayload),
    Unsupported { event_type: String },
}

impl SlackEvent {
    pub fn event_type(&self) -> SlackEventType {
        match self {
            Self::HomeOpened(_) => SlackEventType::HomeOpened,
            Self::AppMention(_) => SlackEventType::AppMention,
            Self::SlashCommand(_) => SlackEventType::SlashCommand,
            Self::Unsupported { .. } => SlackEventType::Unsupported,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SlackEventType {
    HomeOpened,
    AppMention,
    SlashCommand,
    Unsupported,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HomeOpenedEvent {
    pub user_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppMentionEvent {
    pub channel_id: String,
    pub user_id: String,
}

/// One-shot acknowledgement handed to a handler.
///
/// The transport holds the receiving half and answers Slack's HTTP request once the handler
/// acknowledges; later work runs after the response has been sent.
#[derive(Clone, Default)]
pub struct Acknowledger {
    inner: Arc<AckState>,
}

#[derive(Default)]
struct AckState {
    acknowledged: AtomicBool,
    signal: Mutex<Option<oneshot::Sender<()>>>,
}

impl Acknowledger {
    pub fn channel() -> (Self, oneshot::Receiver<()>) {
        let (sender, receiver) = oneshot::channel();
        let inner =
            AckState { acknowledged: AtomicBool::new(false), signal: Mutex::new(Some(sender)) };
        (Self { inner: Arc::new(inner) }, receiver)
    }

    /// Returns `false` if this invocation was already acknowledged.
    pub fn acknowledge(&self) -> bool {
        if self.inner.acknowledged.swap(true, Ordering::SeqCst) {
            return false;
        }
        if let Some(sender) = self.inner.signal.lock().ok().and_then(|mut signal| signal.take()) {
            let _ = sender.send(());
        }
        true
    }

    pub fn is_acknowledged(&self) -> bool {
        self.inner.acknowledged.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for Acknowledger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Acknowledger").field("acknowledged", &self.is_acknowledged()).finish()
    }
}

#[derive(Clone, Debug)]
pub struct EventContext {
    pub correlation_id: String,
    pub ack: Acknowledger,
}

impl EventContext {
    pub fn new(correlation_id: impl Into<String>, ack: Acknowledger) -> Self {
        Self { correlation_id: correlation_id.into(), ack }
    }
}

impl Default for EventContext {
    fn default() -> Self {
        Self { correlation_id: "unknown-correlation-id".to_owned(), ack: Acknowledger::default() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandlerResult {
    Processed,
    Ignored,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventHandlerError {
    #[error(transparent)]
    Parse(#[from] CommandParseError),
    #[error("slack call failed: {0}")]
    Slack(#[from] SlackApiError),
    #[error("image generation failed: {0}")]
    ImageGeneration(#[from] ImageGenerationError),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error(transparent)]
    Handler(#[from] EventHandlerError),
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    fn event_type(&self) -> SlackEventType;
    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError>;
}

#[derive(Default)]
pub struct EventDispatcher {
    handlers: HashMap<SlackEventType, Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H>(&mut self, handler: H)
    where
        H: EventHandler + 'static,
    {
        self.handlers.insert(handler.event_type(), Arc::new(handler));
    }

    pub async fn dispatch(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, DispatchError> {
        let Some(handler) = self.handlers.get(&envelope.event.event_type()) else {
            debug!(
                envelope_id = %envelope.envelope_id,
                event_type = ?envelope.event.event_type(),
                "no handler registered; ignoring envelope"
            );
            return Ok(HandlerResult::Ignored);
        };

        handler.handle(envelope, ctx).await.map_err(DispatchError::from)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

/// Dispatcher with the home tab, mention and `/imagine` handlers registered.
pub fn imagine_dispatcher(
    client: Arc<dyn SlackClient>,
    generator: Arc<dyn ImageGenerator>,
) -> EventDispatcher {
    let mut dispatcher = EventDispatcher::new();
    dispatcher.register(HomeViewRenderer::new(client.clone()));
    dispatcher.register(MentionResponder::new(client.clone()));
    dispatcher.register(ImagineCommandHandler::new(client, generator));
    dispatcher
}

pub struct HomeViewRenderer {
    client: Arc<dyn SlackClient>,
}

impl HomeViewRenderer {
    pub fn new(client: Arc<dyn SlackClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl EventHandler for HomeViewRenderer {
    fn event_type(&self) -> SlackEventType {
        SlackEventType::HomeOpened
    }

    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let SlackEvent::HomeOpened(event) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };

        self.client.publish_view(&event.user_id, &blocks::home_view()).await?;
        info!(
            event_name = "slack.home.published",
            correlation_id = %ctx.correlation_id,
            user_id = %event.user_id,
            "published home tab"
        );
        Ok(HandlerResult::Processed)
    }
}

pub struct MentionResponder {
    client: Arc<dyn SlackClient>,
}

impl MentionResponder {
    pub fn new(client: Arc<dyn SlackClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl EventHandler for MentionResponder {
    fn event_type(&self) -> SlackEventType {
        SlackEventType::AppMention
    }

    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let SlackEvent::AppMention(event) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };

        info!(
            event_name = "slack.mention.received",
            correlation_id = %ctx.correlation_id,
            channel_id = %event.channel_id,
            user_id = %event.user_id,
            "got an app_mention event"
        );
        let greeting = blocks::mention_greeting(&event.user_id);
        self.client.post_message(&event.channel_id, &greeting).await?;
        Ok(HandlerResult::Processed)
    }
}

pub struct ImagineCommandHandler {
    client: Arc<dyn SlackClient>,
    generator: Arc<dyn ImageGenerator>,
}

impl ImagineCommandHandler {
    pub fn new(client: Arc<dyn SlackClient>, generator: Arc<dyn ImageGenerator>) -> Self {
        Self { client, generator }
    }
}

#[async_trait]
impl EventHandler for ImagineCommandHandler {
    fn event_type(&self) -> SlackEventType {
        SlackEventType::SlashCommand
    }

    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let SlackEvent::SlashCommand(payload) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };

        // Slack drops the invocation unless it is acknowledged within three seconds, so this
        // must happen before any outbound call.
        ctx.ack.acknowledge();

        let (prompt, user_id, response_url) = match parse_imagine_command(payload)? {
            ImagineCommand::Usage { response_url } => {
                let usage = CommandResponse::ephemeral(blocks::usage_message());
                self.client.respond(&response_url, &usage).await?;
                return Ok(HandlerResult::Processed);
            }
            ImagineCommand::Generate { prompt, user_id, response_url } => {
                (prompt, user_id, response_url)
            }
        };

        let working = CommandResponse::ephemeral(blocks::working_message(prompt.as_str()));
        self.client.respond(&response_url, &working).await?;

        info!(
            event_name = "imagine.generation.started",
            correlation_id = %ctx.correlation_id,
            user_id = %user_id,
            prompt = %prompt,
            "requesting image generation"
        );
        let image = self.generator.generate(&prompt).await?;

        let result = CommandResponse::in_channel(blocks::generated_image_message(
            &user_id,
            prompt.as_str(),
            &image.url,
        ));
        self.client.respond(&response_url, &result).await?;
        info!(
            event_name = "imagine.generation.posted",
            correlation_id = %ctx.correlation_id,
            user_id = %user_id,
            "posted generated image"
        );
        Ok(HandlerResult::Processed)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use imagine_core::{ImageGenerationError, ImageGenerator, ImagePrompt, ImageResult};
    use tokio::sync::Mutex;

    use super::{
        imagine_dispatcher, Acknowledger, AppMentionEvent, DispatchError, EventContext,
        EventDispatcher, EventHandlerError, HandlerResult, HomeOpenedEvent, SlackEnvelope,
        SlackEvent,
    };
    use crate::{
        api::{SlackApiError, SlackClient},
        blocks::{self, Block, CommandResponse, HomeView, MessageTemplate, ResponseType},
        commands::SlashCommandPayload,
    };

    #[derive(Clone, Debug, PartialEq)]
    enum SlackCall {
        PublishView { user_id: String, view: HomeView },
        PostMessage { channel_id: String, message: MessageTemplate },
        Respond { response_url: String, response: CommandResponse, acknowledged: bool },
    }

    #[derive(Default)]
    struct RecordingSlackClient {
        calls: Mutex<Vec<SlackCall>>,
        failure: Option<SlackApiError>,
        ack: Acknowledger,
    }

    impl RecordingSlackClient {
        fn observing(ack: Acknowledger) -> Self {
            Self { ack, ..Self::default() }
        }

        fn failing(error: SlackApiError) -> Self {
            Self { failure: Some(error), ..Self::default() }
        }

        async fn calls(&self) -> Vec<SlackCall> {
            self.calls.lock().await.clone()
        }

        fn outcome(&self) -> Result<(), SlackApiError> {
            match &self.failure {
                Some(error) => Err(error.clone()),
                None => Ok(()),
            }
        }
    }

    #[async_trait]
    impl SlackClient for RecordingSlackClient {
        async fn publish_view(&self, user_id: &str, view: &HomeView) -> Result<(), SlackApiError> {
            self.outcome()?;
            self.calls
                .lock()
                .await
                .push(SlackCall::PublishView { user_id: user_id.to_owned(), view: view.clone() });
            Ok(())
        }

        async fn post_message(
            &self,
            channel_id: &str,
            message: &MessageTemplate,
        ) -> Result<(), SlackApiError> {
            self.outcome()?;
            self.calls.lock().await.push(SlackCall::PostMessage {
                channel_id: channel_id.to_owned(),
                message: message.clone(),
            });
            Ok(())
        }

        async fn respond(
            &self,
            response_url: &str,
            response: &CommandResponse,
        ) -> Result<(), SlackApiError> {
            self.outcome()?;
            self.calls.lock().await.push(SlackCall::Respond {
                response_url: response_url.to_owned(),
                response: response.clone(),
                acknowledged: self.ack.is_acknowledged(),
            });
            Ok(())
        }
    }

    struct FakeGenerator {
        result: Result<ImageResult, ImageGenerationError>,
        prompts: Mutex<Vec<String>>,
    }

    impl FakeGenerator {
        fn returning(url: &str) -> Self {
            let result = Ok(ImageResult { url: url.to_owned() });
            Self { result, prompts: Mutex::new(Vec::new()) }
        }

        fn failing(error: ImageGenerationError) -> Self {
            Self { result: Err(error), prompts: Mutex::new(Vec::new()) }
        }
    }

    #[async_trait]
    impl ImageGenerator for FakeGenerator {
        async fn generate(
            &self,
            prompt: &ImagePrompt,
        ) -> Result<ImageResult, ImageGenerationError> {
            self.prompts.lock().await.push(prompt.as_str().to_owned());
            self.result.clone()
        }
    }

    fn home_opened(user_id: &str) -> SlackEnvelope {
        SlackEnvelope {
            envelope_id: "Ev-home".to_owned(),
            event: SlackEvent::HomeOpened(HomeOpenedEvent { user_id: user_id.to_owned() }),
        }
    }

    fn mention(channel_id: &str, user_id: &str) -> SlackEnvelope {
        SlackEnvelope {
            envelope_id: "Ev-mention".to_owned(),
            event: SlackEvent::AppMention(AppMentionEvent {
                channel_id: channel_id.to_owned(),
                user_id: user_id.to_owned(),
            }),
        }
    }

    fn imagine(text: &str, user_id: &str) -> SlackEnvelope {
        SlackEnvelope {
            envelope_id: "trigger-1".to_owned(),
            event: SlackEvent::SlashCommand(SlashCommandPayload {
                command: "/imagine".to_owned(),
                text: text.to_owned(),
                user_id: user_id.to_owned(),
                channel_id: "C1".to_owned(),
                response_url: "https://hooks.slack.test/commands/1".to_owned(),
                trigger_id: "trigger-1".to_owned(),
            }),
        }
    }

    fn dispatcher(
        client: Arc<RecordingSlackClient>,
        generator: Arc<FakeGenerator>,
    ) -> EventDispatcher {
        imagine_dispatcher(client, generator)
    }

    #[test]
    fn imagine_dispatcher_registers_three_handlers() {
        let dispatcher = dispatcher(
            Arc::new(RecordingSlackClient::default()),
            Arc::new(FakeGenerator::returning("https://images.test/a.png")),
        );
        assert_eq!(dispatcher.handler_count(), 3);
    }

    #[test]
    fn acknowledger_signals_receiver_once() {
        let (ack, mut receiver) = Acknowledger::channel();
        assert!(!ack.is_acknowledged());
        assert!(ack.acknowledge());
        assert!(!ack.acknowledge());
        assert!(ack.is_acknowledged());
        assert_eq!(receiver.try_recv(), Ok(()));
    }

    #[tokio::test]
    async fn home_opened_publishes_fixed_view_to_user() {
        let client = Arc::new(RecordingSlackClient::default());
        let generator = Arc::new(FakeGenerator::returning("https://images.test/a.png"));
        let dispatcher = dispatcher(client.clone(), generator);

        let result =
            dispatcher.dispatch(&home_opened("U1"), &EventContext::default()).await.expect("ok");

        assert_eq!(result, HandlerResult::Processed);
        assert_eq!(
            client.calls().await,
            vec![SlackCall::PublishView { user_id: "U1".to_owned(), view: blocks::home_view() }]
        );
    }

    #[tokio::test]
    async fn home_publish_failure_is_returned_and_nothing_else_is_sent() {
        let client = Arc::new(RecordingSlackClient::failing(SlackApiError::Api(
            "not_authed".to_owned(),
        )));
        let generator = Arc::new(FakeGenerator::returning("https://images.test/a.png"));
        let dispatcher = dispatcher(client.clone(), generator);

        let error = dispatcher
            .dispatch(&home_opened("U1"), &EventContext::default())
            .await
            .expect_err("publish failure should surface");

        assert_eq!(
            error,
            DispatchError::Handler(EventHandlerError::Slack(SlackApiError::Api(
                "not_authed".to_owned()
            )))
        );
        assert!(client.calls().await.is_empty());
    }

    #[tokio::test]
    async fn mention_posts_welcome_template_to_channel() {
        let client = Arc::new(RecordingSlackClient::default());
        let generator = Arc::new(FakeGenerator::returning("https://images.test/a.png"));
        let dispatcher = dispatcher(client.clone(), generator);

        dispatcher.dispatch(&mention("C42", "U7"), &EventContext::default()).await.expect("ok");

        assert_eq!(
            client.calls().await,
            vec![SlackCall::PostMessage {
                channel_id: "C42".to_owned(),
                message: MessageTemplate::text("Welcome, <@U7>!"),
            }]
        );
    }

    #[tokio::test]
    async fn mention_post_failure_is_a_silent_no_op_for_the_user() {
        let client =
            Arc::new(RecordingSlackClient::failing(SlackApiError::Transport("reset".to_owned())));
        let generator = Arc::new(FakeGenerator::returning("https://images.test/a.png"));
        let dispatcher = dispatcher(client.clone(), generator);

        let result = dispatcher.dispatch(&mention("C42", "U7"), &EventContext::default()).await;

        assert!(matches!(
            result,
            Err(DispatchError::Handler(EventHandlerError::Slack(SlackApiError::Transport(_))))
        ));
        assert!(client.calls().await.is_empty());
    }

    #[tokio::test]
    async fn imagine_acks_then_sends_working_then_final_image() {
        let (ack, mut ack_receiver) = Acknowledger::channel();
        let client = Arc::new(RecordingSlackClient::observing(ack.clone()));
        let generator = Arc::new(FakeGenerator::returning("https://images.test/fox.png"));
        let dispatcher = dispatcher(client.clone(), generator.clone());

        let result = dispatcher
            .dispatch(&imagine("a red fox", "U9"), &EventContext::new("trigger-1", ack))
            .await
            .expect("ok");

        assert_eq!(result, HandlerResult::Processed);
        assert_eq!(ack_receiver.try_recv(), Ok(()));
        assert_eq!(*generator.prompts.lock().await, vec!["a red fox".to_owned()]);

        let calls = client.calls().await;
        assert_eq!(calls.len(), 2);
        match &calls[0] {
            SlackCall::Respond { response, acknowledged, .. } => {
                assert!(acknowledged, "ack must precede the interim message");
                assert_eq!(response.response_type, ResponseType::Ephemeral);
                assert!(response.message.fallback_text.contains("a red fox"));
            }
            other => panic!("expected interim response, got {other:?}"),
        }
        match &calls[1] {
            SlackCall::Respond { response_url, response, .. } => {
                assert_eq!(response_url, "https://hooks.slack.test/commands/1");
                assert_eq!(response.response_type, ResponseType::InChannel);
                let image = response
                    .message
                    .blocks
                    .iter()
                    .find(|block| matches!(block, Block::Image { .. }))
                    .expect("image block");
                assert_eq!(
                    image,
                    &Block::Image {
                        block_id: "image4".to_owned(),
                        title: blocks::TextObject::plain("a red fox"),
                        image_url: "https://images.test/fox.png".to_owned(),
                        alt_text: "a red fox".to_owned(),
                    }
                );
            }
            other => panic!("expected final response, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn imagine_generation_failure_sends_no_final_message() {
        let (ack, _receiver) = Acknowledger::channel();
        let client = Arc::new(RecordingSlackClient::observing(ack.clone()));
        let generator = Arc::new(FakeGenerator::failing(ImageGenerationError::Api {
            status: 400,
            message: "content policy".to_owned(),
        }));
        let dispatcher = dispatcher(client.clone(), generator);

        let error = dispatcher
            .dispatch(&imagine("a red fox", "U9"), &EventContext::new("trigger-1", ack.clone()))
            .await
            .expect_err("generation failure should propagate");

        assert!(matches!(
            error,
            DispatchError::Handler(EventHandlerError::ImageGeneration(
                ImageGenerationError::Api { status: 400, .. }
            ))
        ));
        assert!(ack.is_acknowledged());
        let calls = client.calls().await;
        assert_eq!(calls.len(), 1, "only the interim message should be sent");
        assert!(matches!(
            &calls[0],
            SlackCall::Respond { response, .. } if response.response_type == ResponseType::Ephemeral
        ));
    }

    #[tokio::test]
    async fn imagine_sends_the_prompt_to_the_generator_untrimmed() {
        let (ack, _receiver) = Acknowledger::channel();
        let client = Arc::new(RecordingSlackClient::observing(ack.clone()));
        let generator = Arc::new(FakeGenerator::returning("https://images.test/fox.png"));
        let dispatcher = dispatcher(client.clone(), generator.clone());

        dispatcher
            .dispatch(&imagine("  a red fox ", "U9"), &EventContext::new("trigger-1", ack))
            .await
            .expect("ok");

        assert_eq!(*generator.prompts.lock().await, vec!["  a red fox ".to_owned()]);
    }

    #[tokio::test]
    async fn imagine_with_blank_prompt_replies_with_usage_and_skips_generation() {
        let (ack, _receiver) = Acknowledger::channel();
        let client = Arc::new(RecordingSlackClient::observing(ack.clone()));
        let generator = Arc::new(FakeGenerator::returning("https://images.test/unused.png"));
        let dispatcher = dispatcher(client.clone(), generator.clone());

        dispatcher
            .dispatch(&imagine("   ", "U9"), &EventContext::new("trigger-1", ack))
            .await
            .expect("ok");

        assert!(generator.prompts.lock().await.is_empty());
        assert_eq!(
            client.calls().await,
            vec![SlackCall::Respond {
                response_url: "https://hooks.slack.test/commands/1".to_owned(),
                response: CommandResponse::ephemeral(blocks::usage_message()),
                acknowledged: true,
            }]
        );
    }

    #[tokio::test]
    async fn unsupported_command_is_acknowledged_then_rejected() {
        let (ack, _receiver) = Acknowledger::channel();
        let client = Arc::new(RecordingSlackClient::default());
        let generator = Arc::new(FakeGenerator::returning("https://images.test/a.png"));
        let dispatcher = dispatcher(client.clone(), generator);
        let mut envelope = imagine("a red fox", "U9");
        if let SlackEvent::SlashCommand(payload) = &mut envelope.event {
            payload.command = "/quote".to_owned();
        }

        let result =
            dispatcher.dispatch(&envelope, &EventContext::new("trigger-1", ack.clone())).await;

        assert!(matches!(result, Err(DispatchError::Handler(EventHandlerError::Parse(_)))));
        assert!(ack.is_acknowledged());
        assert!(client.calls().await.is_empty());
    }

    #[tokio::test]
    async fn dispatcher_returns_ignored_when_no_handler_registered() {
        let dispatcher = EventDispatcher::new();

        let result =
            dispatcher.dispatch(&home_opened("U1"), &EventContext::default()).await.expect("ok");

        assert_eq!(result, HandlerResult::Ignored);
    }

    #[tokio::test]
    async fn unsupported_events_are_ignored() {
        let client = Arc::new(RecordingSlackClient::default());
        let generator = Arc::new(FakeGenerator::returning("https://images.test/a.png"));
        let dispatcher = dispatcher(client.clone(), generator);
        let envelope = SlackEnvelope {
            envelope_id: "Ev-other".to_owned(),
            event: SlackEvent::Unsupported { event_type: "reaction_added".to_owned() },
        };

        let result = dispatcher.dispatch(&envelope, &EventContext::default()).await.expect("ok");

        assert_eq!(result, HandlerResult::Ignored);
        assert!(client.calls().await.is_empty());
    }
}
