//! OpenAI image generation client.
//!
//! Implements [`imagine_core::ImageGenerator`] on top of `POST /images/generations`.

pub mod images;

pub use images::OpenAiImageGenerator;
