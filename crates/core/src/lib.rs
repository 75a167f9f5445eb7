pub mod config;
pub mod image;

pub use image::{ImageGenerationError, ImageGenerator, ImagePrompt, ImageResult};
