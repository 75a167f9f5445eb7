use serde::Serialize;

pub const HOME_VIEW_CALLBACK_ID: &str = "home_view";
pub const IMAGE_BLOCK_ID: &str = "image4";

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TextObject {
    #[serde(rename = "plain_text")]
    Plain { text: String },
    Mrkdwn { text: String },
}

impl TextObject {
    pub fn plain(text: impl Into<String>) -> Self {
        Self::Plain { text: text.into() }
    }

    pub fn mrkdwn(text: impl Into<String>) -> Self {
        Self::Mrkdwn { text: text.into() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ButtonElement {
    pub text: TextObject,
}

impl ButtonElement {
    pub fn new(label: impl Into<String>) -> Self {
        Self { text: TextObject::plain(label) }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionElement {
    Button(ButtonElement),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Section {
        text: TextObject,
    },
    Divider,
    Actions {
        elements: Vec<ActionElement>,
    },
    Image {
        block_id: String,
        title: TextObject,
        image_url: String,
        alt_text: String,
    },
    Context {
        elements: Vec<TextObject>,
    },
}

/// A chat message: plain-text fallback plus optional Block Kit layout.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MessageTemplate {
    #[serde(rename = "text")]
    pub fallback_text: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub blocks: Vec<Block>,
}

impl MessageTemplate {
    pub fn text(fallback_text: impl Into<String>) -> Self {
        Self { fallback_text: fallback_text.into(), blocks: Vec::new() }
    }
}

/// A Home tab surface as accepted by `views.publish`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename = "home")]
pub struct HomeView {
    pub callback_id: String,
    pub blocks: Vec<Block>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseType {
    Ephemeral,
    InChannel,
}

/// Payload posted to a slash command's `response_url`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CommandResponse {
    pub response_type: ResponseType,
    #[serde(flatten)]
    pub message: MessageTemplate,
}

impl CommandResponse {
    pub fn ephemeral(message: MessageTemplate) -> Self {
        Self { response_type: ResponseType::Ephemeral, message }
    }

    pub fn in_channel(message: MessageTemplate) -> Self {
        Self { response_type: ResponseType::InChannel, message }
    }
}

pub struct MessageBuilder {
    fallback_text: String,
    blocks: Vec<Block>,
}

impl MessageBuilder {
    pub fn new(fallback_text: impl Into<String>) -> Self {
        Self { fallback_text: fallback_text.into(), blocks: Vec::new() }
    }

    pub fn section<F>(mut self, build: F) -> Self
    where
        F: FnOnce(&mut SectionBuilder),
    {
        let mut builder = SectionBuilder::default();
        build(&mut builder);
        self.blocks.push(Block::Section { text: builder.build() });
        self
    }

    pub fn divider(mut self) -> Self {
        self.blocks.push(Block::Divider);
        self
    }

    pub fn actions<F>(mut self, build: F) -> Self
    where
        F: FnOnce(&mut ActionsBuilder),
    {
        let mut builder = ActionsBuilder::default();
        build(&mut builder);
        self.blocks.push(Block::Actions { elements: builder.build() });
        self
    }

    pub fn image(
        mut self,
        block_id: impl Into<String>,
        image_url: impl Into<String>,
        title: impl Into<String>,
        alt_text: impl Into<String>,
    ) -> Self {
        self.blocks.push(Block::Image {
            block_id: block_id.into(),
            title: TextObject::plain(title),
            image_url: image_url.into(),
            alt_text: alt_text.into(),
        });
        self
    }

    pub fn context<F>(mut self, build: F) -> Self
    where
        F: FnOnce(&mut ContextBuilder),
    {
        let mut builder = ContextBuilder::default();
        build(&mut builder);
        self.blocks.push(Block::Context { elements: builder.build() });
        self
    }

    pub fn build(self) -> MessageTemplate {
        MessageTemplate { fallback_text: self.fallback_text, blocks: self.blocks }
    }

    pub fn build_home_view(self, callback_id: impl Into<String>) -> HomeView {
        HomeView { callback_id: callback_id.into(), blocks: self.blocks }
    }
}

#[derive(Default)]
pub struct SectionBuilder {
    text: Option<TextObject>,
}

impl SectionBuilder {
    pub fn mrkdwn(&mut self, text: impl Into<String>) -> &mut Self {
        self.text = Some(TextObject::mrkdwn(text));
        self
    }

    fn build(self) -> TextObject {
        self.text.unwrap_or_else(|| TextObject::plain(""))
    }
}

#[derive(Default)]
pub struct ActionsBuilder {
    elements: Vec<ActionElement>,
}

impl ActionsBuilder {
    pub fn button(&mut self, button: ButtonElement) -> &mut Self {
        self.elements.push(ActionElement::Button(button));
        self
    }

    fn build(self) -> Vec<ActionElement> {
        self.elements
    }
}

#[derive(Default)]
pub struct ContextBuilder {
    elements: Vec<TextObject>,
}

impl ContextBuilder {
    pub fn plain(&mut self, text: impl Into<String>) -> &mut Self {
        self.elements.push(TextObject::plain(text));
        self
    }

    fn build(self) -> Vec<TextObject> {
        self.elements
    }
}

pub fn home_view() -> HomeView {
    MessageBuilder::new("App Home")
        .section(|section| {
            section.mrkdwn("*Welcome to your _App's Home_* :tada:");
        })
        .divider()
        .section(|section| {
            section.mrkdwn(
                "This button won't do much for now but you can set up a listener for it using the `actions()` method and passing its unique `action_id`. See an example in the `examples` folder within your Bolt app.",
            );
        })
        .actions(|actions| {
            actions.button(ButtonElement::new("Click me!"));
        })
        .build_home_view(HOME_VIEW_CALLBACK_ID)
}

pub fn mention_greeting(user_id: &str) -> MessageTemplate {
    MessageTemplate::text(format!("Welcome, <@{user_id}>!"))
}

pub fn working_message(prompt: &str) -> MessageTemplate {
    MessageTemplate::text(format!("Working on generating an image of \"{prompt}\"..."))
}

pub fn generated_image_message(user_id: &str, prompt: &str, image_url: &str) -> MessageTemplate {
    MessageBuilder::new(format!("Generated image: {image_url} for <@{user_id}>"))
        .section(|section| {
            section.mrkdwn(format!("<@{user_id}> requested image for \"{prompt}\""));
        })
        .image(IMAGE_BLOCK_ID, image_url, prompt, prompt)
        .build()
}

pub fn usage_message() -> MessageTemplate {
    MessageBuilder::new("Usage: /imagine <description of the image>")
        .section(|section| {
            section.mrkdwn("*Describe the image you want*\n`/imagine <description>`");
        })
        .context(|context| {
            context.plain("Example: /imagine a red fox sleeping in the snow");
        })
        .build()
}
